//! Splitting a command line into tokens.
//!
//! Tokens are separated by blanks (spaces and tabs). A single or double quote
//! opens a region that runs until the matching quote and may contain blanks;
//! the region does not end the token, so `a"b c"d` is one token. Quotes are
//! never escaped: the text between a pair of quotes is taken literally.
//!
//! Every token keeps two views of its text:
//!
//! | View      | `"hello world"` | `it's` |
//! |-----------|-----------------|--------|
//! | `raw`     | `"hello world"` | `it's` |
//! | `content` | `hello world`   | `it's` |
//!
//! `content` only drops a quote pair that wraps the entire token. The raw view
//! is what completion looks at to decide whether the user already opened a
//! quote.
//!
//! # Completion
//!
//! [`scan`] tokenizes the text before the cursor. A line that ends inside a
//! quoted region cannot be tokenized as is, so the scanner retries with each
//! closing quote appended (single first, then double) and keeps the first one
//! that works. Raw tokens are always sliced from the original line, so the
//! opening quote of the token under the cursor is preserved while the
//! synthetic closing quote is not.

use std::borrow::Cow;

use the_core::chars::{
  QUOTES,
  char_is_blank,
  char_is_quote,
};
use thiserror::Error;

/// Splits a command line into the command and arguments parts.
///
/// The third tuple member describes whether the command part is finished. When
/// this boolean is true the completion code for the command line should
/// complete command names, otherwise command arguments.
pub fn split(line: &str) -> (&str, &str, bool) {
  const SEPARATOR_PATTERN: [char; 2] = [' ', '\t'];

  let line = line.trim_start_matches(SEPARATOR_PATTERN);
  let (command, rest) = line.split_once(SEPARATOR_PATTERN).unwrap_or((line, ""));

  let complete_command =
    command.is_empty() || (rest.trim().is_empty() && !line.ends_with(SEPARATOR_PATTERN));

  (command, rest, complete_command)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
  #[error("unterminated {quote} quote starting at byte {start}")]
  UnterminatedQuote { quote: char, start: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
  /// Byte index of the first character of the token, including any quote.
  pub start:      usize,
  /// Byte index one past the last character of the token.
  pub end:        usize,
  /// The token exactly as written.
  pub raw:        &'a str,
  /// The token with a surrounding pair of quotes removed.
  pub content:    Cow<'a, str>,
  /// The quote that is still open at the end of the input, if any.
  pub open_quote: Option<char>,
}

impl<'a> Token<'a> {
  pub fn empty_at(start: usize) -> Self {
    Self {
      start,
      end: start,
      raw: "",
      content: Cow::Borrowed(""),
      open_quote: None,
    }
  }

  /// Whether the token starts with a quote, closed or not.
  pub fn is_quoted(&self) -> bool {
    self.raw.starts_with(QUOTES)
  }
}

/// Removes one pair of quotes wrapping the whole of `raw`.
pub fn strip_quotes(raw: &str) -> &str {
  let mut chars = raw.chars();
  match (chars.next(), chars.next_back()) {
    (Some(first), Some(last)) if char_is_quote(first) && first == last => {
      &raw[first.len_utf8()..raw.len() - last.len_utf8()]
    },
    _ => raw,
  }
}

#[derive(Debug)]
pub struct Tokenizer<'a> {
  input:    &'a str,
  /// Whether an unterminated quote is an error. When this is set to `false`
  /// the iterator never returns `Err` and the unterminated token's content is
  /// everything after its opening quote.
  validate: bool,
  /// The current byte index of the input being considered.
  pos:      usize,
}

impl<'a> Tokenizer<'a> {
  pub fn new(input: &'a str, validate: bool) -> Self {
    Self {
      input,
      validate,
      pos: 0,
    }
  }

  /// Returns the current byte index position of the tokenizer in the input.
  pub fn pos(&self) -> usize {
    self.pos
  }

  fn skip_blanks(&mut self) {
    while let Some(b' ' | b'\t') = self.input.as_bytes().get(self.pos) {
      self.pos += 1;
    }
  }

  /// Advances to the end of the token under the cursor, returning the quote
  /// that is still open when the input runs out and where it was opened.
  fn parse_token(&mut self) -> Option<(char, usize)> {
    let mut open: Option<(char, usize)> = None;

    for (offset, ch) in self.input[self.pos..].char_indices() {
      let idx = self.pos + offset;
      match open {
        Some((quote, _)) if ch == quote => open = None,
        Some(_) => {},
        None if char_is_blank(ch) => {
          self.pos = idx;
          return None;
        },
        None if char_is_quote(ch) => open = Some((ch, idx)),
        None => {},
      }
    }

    self.pos = self.input.len();
    open
  }
}

impl<'a> Iterator for Tokenizer<'a> {
  type Item = Result<Token<'a>, ScanError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.skip_blanks();
    if self.pos >= self.input.len() {
      return None;
    }

    let start = self.pos;
    let open = self.parse_token();
    let raw = &self.input[start..self.pos];

    let token = match open {
      None => {
        Token {
          start,
          end: self.pos,
          raw,
          content: Cow::Borrowed(strip_quotes(raw)),
          open_quote: None,
        }
      },
      Some((quote, quote_start)) if self.validate => {
        return Some(Err(ScanError::UnterminatedQuote {
          quote,
          start: quote_start,
        }));
      },
      Some((quote, quote_start)) => {
        let content = if quote_start == start {
          &raw[quote.len_utf8()..]
        } else {
          raw
        };
        Token {
          start,
          end: self.pos,
          raw,
          content: Cow::Borrowed(content),
          open_quote: Some(quote),
        }
      },
    };

    Some(Ok(token))
  }
}

pub fn tokenize(input: &str, validate: bool) -> Result<Vec<Token<'_>>, ScanError> {
  Tokenizer::new(input, validate).collect()
}

/// The tokens before the cursor, ready for completion.
///
/// `tokens` and `raw_tokens` always have the same, non-zero length and the last
/// entry is the token under completion. It is empty when the cursor sits after
/// a blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
  pub tokens:      Vec<String>,
  pub raw_tokens:  Vec<String>,
  /// Byte index where the token under completion begins.
  pub token_start: usize,
  /// Byte index of the cursor.
  pub token_end:   usize,
}

impl Scan {
  /// The unquoted text being completed.
  pub fn text(&self) -> &str {
    self.tokens.last().map_or("", String::as_str)
  }

  /// The text being completed as written, including an opening quote.
  pub fn raw_text(&self) -> &str {
    self.raw_tokens.last().map_or("", String::as_str)
  }

  /// Whether the token under completion is the command name.
  pub fn completing_command(&self) -> bool {
    self.tokens.len() == 1
  }
}

/// Tokenizes `line` up to the byte index `end_index` for completion.
///
/// Fails only when the line ends inside a quote that neither closing quote
/// character can terminate, which callers treat as "nothing to complete".
pub fn scan(line: &str, end_index: usize) -> Result<Scan, ScanError> {
  let mut end = end_index.min(line.len());
  while !line.is_char_boundary(end) {
    end -= 1;
  }
  let prefix = &line[..end];

  let spans = match tokenize(prefix, true) {
    Ok(tokens) => spans(&tokens),
    Err(err) => {
      QUOTES
        .iter()
        .find_map(|quote| {
          let closed = format!("{prefix}{quote}");
          tokenize(&closed, true).ok().map(|tokens| spans(&tokens))
        })
        .ok_or(err)?
    },
  };

  let mut tokens = Vec::with_capacity(spans.len() + 1);
  let mut raw_tokens = Vec::with_capacity(spans.len() + 1);
  let mut token_start = end;
  let mut last_end = 0;

  for (start, token_end, content) in spans {
    tokens.push(content);
    raw_tokens.push(prefix[start..token_end.min(end)].to_string());
    token_start = start;
    last_end = token_end;
  }

  // The cursor is past the last token: complete a new, empty one.
  if tokens.is_empty() || last_end < end {
    tokens.push(String::new());
    raw_tokens.push(String::new());
    token_start = end;
  }

  tracing::trace!(?tokens, token_start, "scanned command line");

  Ok(Scan {
    tokens,
    raw_tokens,
    token_start,
    token_end: end,
  })
}

fn spans(tokens: &[Token<'_>]) -> Vec<(usize, usize, String)> {
  tokens
    .iter()
    .map(|token| (token.start, token.end, token.content.to_string()))
    .collect()
}
