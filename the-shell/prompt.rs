//! What the prompt shows and inserts for a completion request.

use the_core::chars::char_is_quote;
use the_lib::{
  completion::CompletionOutcome,
  format::{
    common_prefix,
    format,
    quote_decision,
  },
  options::CompletionOptions,
};

/// The lines to show below the prompt for `outcome`.
pub fn render(
  outcome: &CompletionOutcome,
  terminal_width: usize,
  options: &CompletionOptions,
) -> Vec<String> {
  match outcome {
    CompletionOutcome::Candidates(completions) => {
      let presentation = format(completions, terminal_width, options);
      presentation
        .header
        .into_iter()
        .chain(presentation.lines)
        .collect()
    },
    CompletionOutcome::Hint(hint) => hint.lines().map(str::to_string).collect(),
    CompletionOutcome::Error(err) => vec![format!("Error: {err}")],
    CompletionOutcome::Empty => Vec::new(),
  }
}

/// `line` with the text between `begidx` and `endidx` replaced by what the
/// matches have in common, quoted when needed.
///
/// A single match is inserted whole and followed by a space when the cursor
/// is at the end of the line. Returns `None` when nothing would change.
pub fn completed_line(
  line: &str,
  begidx: usize,
  endidx: usize,
  matches: &[String],
) -> Option<String> {
  let typed = line.get(begidx..endidx)?;
  let unquoted = typed.strip_prefix(char_is_quote).unwrap_or(typed);
  let prefix = common_prefix(matches);
  if matches.is_empty() || prefix.len() < unquoted.len() {
    return None;
  }

  let replacement = match quote_decision(matches, typed) {
    Some(quoting) if quoting.insert_opening => quoting.apply(&prefix),
    Some(quoting) => format!("{}{}", quoting.quote, quoting.apply(&prefix)),
    None => prefix,
  };
  if replacement == typed && matches.len() > 1 {
    return None;
  }

  let mut completed = format!("{}{replacement}{}", &line[..begidx], &line[endidx..]);
  if matches.len() == 1 && endidx == line.len() {
    completed.push(' ');
  }
  Some(completed)
}
