//! Turning completions into what the user sees.
//!
//! Matches are deduplicated and sorted unless the completion says they are
//! already in order. Candidates with descriptions are laid out as a two column
//! table when there are few enough of them:
//!
//! ```text
//! ITEM_ID  Description
//! A1       The first item
//! 日本     Wide characters line up too
//! ```
//!
//! Columns are measured in terminal cells, so ANSI styling and wide
//! characters do not break the alignment.

use std::collections::HashSet;

use the_core::{
  chars::{
    char_is_quote,
    char_is_whitespace,
  },
  grapheme::{
    TAB_WIDTH,
    display_width,
    pad_to_width,
    truncate_to_width,
  },
};

use crate::{
  completion::Completions,
  grammar::Candidate,
  options::CompletionOptions,
};

const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
  /// Values to insert, deduplicated and in display order.
  pub matches: Vec<String>,
  /// One line per match, or per flag for grouped flag aliases.
  pub lines:   Vec<String>,
  /// Column titles above `lines` when descriptions are shown.
  pub header:  Option<String>,
}

pub fn format(
  completions: &Completions,
  terminal_width: usize,
  options: &CompletionOptions,
) -> Presentation {
  let mut seen = HashSet::new();
  let mut candidates: Vec<&Candidate> = completions
    .candidates
    .iter()
    .filter(|candidate| seen.insert(candidate.value.as_str()))
    .collect();
  let mut seen = HashSet::new();
  let mut display: Vec<&str> = completions
    .display
    .iter()
    .map(String::as_str)
    .filter(|line| seen.insert(*line))
    .collect();

  if !completions.sorted {
    candidates.sort_by(|a, b| options.sort.cmp(&a.value, &b.value));
    display.sort_by(|a, b| options.sort.cmp(a, b));
  }

  let matches: Vec<String> = candidates.iter().map(|c| c.value.clone()).collect();
  let described = display.is_empty()
    && (2..=options.max_described_items).contains(&candidates.len())
    && candidates.iter().any(|c| c.description.is_some());

  if !described {
    let lines = if display.is_empty() {
      matches.clone()
    } else {
      display.into_iter().map(str::to_string).collect()
    };
    return Presentation {
      matches,
      lines,
      header: None,
    };
  }

  let metavar = completions.metavar.as_deref().unwrap_or("");
  let label = completions
    .descriptive_header
    .as_deref()
    .unwrap_or(&options.default_descriptive_header);
  let width = candidates
    .iter()
    .map(|candidate| display_width(&candidate.value))
    .chain(std::iter::once(display_width(metavar)))
    .max()
    .unwrap_or(0);
  let description_width = terminal_width.saturating_sub(width + COLUMN_GAP.len());

  let header = format!("{}{COLUMN_GAP}{label}", pad_to_width(metavar, width));
  let lines = candidates
    .iter()
    .map(|candidate| {
      let description = candidate
        .description
        .as_deref()
        .and_then(|description| description.lines().next())
        .unwrap_or("")
        .replace('\t', &" ".repeat(TAB_WIDTH));
      let line = format!(
        "{}{COLUMN_GAP}{}",
        pad_to_width(&candidate.value, width),
        truncate_to_width(&description, description_width)
      );
      line.trim_end().to_string()
    })
    .collect();

  Presentation {
    matches,
    lines,
    header: Some(truncate_to_width(&header, terminal_width).into_owned()),
  }
}

/// How matches are quoted when inserted into the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quoting {
  pub quote:          char,
  /// The user has not typed the opening quote yet.
  pub insert_opening: bool,
  /// A single match is final, so its quote can be closed.
  pub close:          bool,
}

impl Quoting {
  pub fn apply(&self, value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    if self.insert_opening {
      quoted.push(self.quote);
    }
    quoted.push_str(value);
    if self.close {
      quoted.push(self.quote);
    }
    quoted
  }
}

/// Decides whether matches need quoting given the token as the user typed it.
///
/// A quote the user opened is kept. Otherwise matches containing whitespace
/// are wrapped in double quotes, or single quotes when a match contains a
/// double quote.
pub fn quote_decision<S: AsRef<str>>(matches: &[S], raw_token: &str) -> Option<Quoting> {
  if matches.is_empty() {
    return None;
  }
  let close = matches.len() == 1;

  if let Some(quote) = raw_token.chars().next().filter(|ch| char_is_quote(*ch)) {
    return Some(Quoting {
      quote,
      insert_opening: false,
      close,
    });
  }

  if !matches
    .iter()
    .any(|value| value.as_ref().contains(char_is_whitespace))
  {
    return None;
  }
  let quote = if matches.iter().any(|value| value.as_ref().contains('"')) {
    '\''
  } else {
    '"'
  };
  Some(Quoting {
    quote,
    insert_opening: true,
    close,
  })
}

/// The longest prefix shared by every match.
pub fn common_prefix<S: AsRef<str>>(matches: &[S]) -> String {
  let Some((first, rest)) = matches.split_first() else {
    return String::new();
  };
  let first = first.as_ref();
  let mut end = first.len();
  for value in rest {
    let shared = first
      .char_indices()
      .zip(value.as_ref().chars())
      .find(|((_, a), b)| a != b)
      .map_or_else(|| first.len().min(value.as_ref().len()), |((idx, _), _)| idx);
    end = end.min(shared);
  }
  first[..end].to_string()
}
