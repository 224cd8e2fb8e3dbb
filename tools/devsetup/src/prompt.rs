use crate::errors::DevsetupError;
use crate::runtime::Terminal;
use crate::types::Answer;

/// Ask a yes/no/skip question. Anything other than an explicit yes counts as
/// declining, including end of input.
pub fn ask(terminal: &dyn Terminal, question: &str) -> Result<Answer, DevsetupError> {
    let Some(reply) = terminal.read_line(&format!("{question} [y/N/s] "))? else {
        return Ok(Answer::No);
    };
    Ok(parse_answer(&reply))
}

pub fn confirm(terminal: &dyn Terminal, question: &str) -> Result<bool, DevsetupError> {
    let Some(reply) = terminal.read_line(&format!("{question} [y/N] "))? else {
        return Ok(false);
    };
    Ok(parse_answer(&reply) == Answer::Yes)
}

/// Numbered choice over `options`; blank input selects the first entry.
/// Returns the zero-based index.
pub fn choose(
    terminal: &dyn Terminal,
    heading: &str,
    options: &[String],
) -> Result<usize, DevsetupError> {
    if options.is_empty() {
        return Err(DevsetupError::Cli("nothing to choose from".to_string()));
    }
    terminal.write_line(heading)?;
    for (idx, option) in options.iter().enumerate() {
        terminal.write_line(&format!("  {}) {option}", idx + 1))?;
    }
    let reply = terminal
        .read_line(&format!("Select [1-{}] (default 1): ", options.len()))?
        .unwrap_or_default();
    let reply = reply.trim();
    if reply.is_empty() {
        return Ok(0);
    }
    match reply.parse::<usize>() {
        Ok(n) if (1..=options.len()).contains(&n) => Ok(n - 1),
        _ => Err(DevsetupError::Cli(format!(
            "invalid selection `{reply}`; expected a number between 1 and {}",
            options.len()
        ))),
    }
}

fn parse_answer(reply: &str) -> Answer {
    match reply.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "s" | "skip" => Answer::Skip,
        _ => Answer::No,
    }
}
