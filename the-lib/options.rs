use std::cmp::Ordering;

use serde::{
  Deserialize,
  Serialize,
};
use the_core::natural::{
  alphabetical_cmp,
  natural_cmp,
};

/// Label used above candidate descriptions when an argument has none.
pub const DEFAULT_DESCRIPTIVE_HEADER: &str = "Description";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
  /// Case-folded lexical order.
  #[default]
  Alphabetical,
  /// Case-folded order where digit runs compare as numbers.
  Natural,
}

impl SortOrder {
  pub fn cmp(&self, a: &str, b: &str) -> Ordering {
    match self {
      Self::Alphabetical => alphabetical_cmp(a, b),
      Self::Natural => natural_cmp(a, b),
    }
  }
}

/// Switches that change how a line is completed and presented.
///
/// These are passed explicitly to every completion call; nothing is read from
/// global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CompletionOptions {
  /// Resolve `--ty` to `--type` when exactly one flag starts with the text.
  pub abbreviation_allowed:       bool,
  /// Match candidates against the typed text ignoring case.
  pub case_insensitive:           bool,
  pub sort:                       SortOrder,
  /// Above this many candidates descriptions are not laid out as a table.
  pub max_described_items:        usize,
  pub default_descriptive_header: String,
}

impl Default for CompletionOptions {
  fn default() -> Self {
    Self {
      abbreviation_allowed:       true,
      case_insensitive:           false,
      sort:                       SortOrder::Alphabetical,
      max_described_items:        50,
      default_descriptive_header: DEFAULT_DESCRIPTIVE_HEADER.to_string(),
    }
  }
}

impl CompletionOptions {
  /// Whether `candidate` is a completion of the typed `text`.
  pub fn matches_prefix(&self, candidate: &str, text: &str) -> bool {
    if self.case_insensitive {
      candidate.to_lowercase().starts_with(&text.to_lowercase())
    } else {
      candidate.starts_with(text)
    }
  }
}
