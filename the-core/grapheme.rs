//! Display width of text as rendered by a terminal.
//!
//! Widths are measured per grapheme cluster so wide (e.g. East Asian)
//! characters count as two columns, and ANSI escape sequences (SGR styling,
//! OSC hyperlinks) count as zero columns.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Columns a tab occupies in candidate tables.
pub const TAB_WIDTH: usize = 4;

const ESC: char = '\u{1b}';
const BEL: char = '\u{7}';

/// Marker appended to text that was cut short to fit a column.
pub const ELLIPSIS: &str = "…";

/// A piece of a string: either visible text or an escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
  Text(&'a str),
  Escape(&'a str),
}

/// Iterator splitting a string into text and ANSI escape segments.
#[derive(Debug)]
struct Segments<'a> {
  input: &'a str,
  pos:   usize,
}

impl<'a> Segments<'a> {
  fn new(input: &'a str) -> Self {
    Self { input, pos: 0 }
  }

  /// Byte length of the escape sequence starting at `start`.
  fn escape_len(&self, start: usize) -> usize {
    let rest = &self.input[start..];
    let mut chars = rest.char_indices().skip(1);
    match chars.next() {
      // CSI: ESC [ parameters intermediates final-byte
      Some((_, '[')) => {
        for (idx, ch) in chars {
          if ('\u{40}'..='\u{7e}').contains(&ch) {
            return idx + ch.len_utf8();
          }
        }
        rest.len()
      },
      // OSC: ESC ] ... terminated by BEL or ESC \
      Some((_, ']')) => {
        let mut prev_esc = false;
        for (idx, ch) in chars {
          if ch == BEL || (prev_esc && ch == '\\') {
            return idx + ch.len_utf8();
          }
          prev_esc = ch == ESC;
        }
        rest.len()
      },
      Some((idx, ch)) => idx + ch.len_utf8(),
      None => rest.len(),
    }
  }
}

impl<'a> Iterator for Segments<'a> {
  type Item = Segment<'a>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.pos >= self.input.len() {
      return None;
    }

    let start = self.pos;
    if self.input[start..].starts_with(ESC) {
      self.pos += self.escape_len(start);
      return Some(Segment::Escape(&self.input[start..self.pos]));
    }

    self.pos = self.input[start..]
      .find(ESC)
      .map_or(self.input.len(), |offset| start + offset);
    Some(Segment::Text(&self.input[start..self.pos]))
  }
}

#[must_use]
pub fn grapheme_width(g: &str) -> usize {
  if g == "\t" {
    TAB_WIDTH
  } else if g.is_ascii() {
    // Fast-path for pure ASCII: each byte renders with width 1.
    g.len()
  } else {
    UnicodeWidthStr::width(g)
  }
}

/// Returns the number of terminal columns `text` occupies.
#[must_use]
pub fn display_width(text: &str) -> usize {
  Segments::new(text)
    .map(|segment| {
      match segment {
        Segment::Text(text) => text.graphemes(true).map(grapheme_width).sum(),
        Segment::Escape(_) => 0,
      }
    })
    .sum()
}

/// Cuts `text` so that it occupies at most `width` columns, ending it with
/// [`ELLIPSIS`] when anything was removed.
///
/// Escape sequences are kept so that styling which is opened before the cut
/// is still closed by any reset sequence that follows it.
pub fn truncate_to_width(text: &str, width: usize) -> Cow<'_, str> {
  if display_width(text) <= width {
    return Cow::Borrowed(text);
  }
  if width == 0 {
    return Cow::Borrowed("");
  }

  let budget = width - 1;
  let mut used = 0;
  let mut truncated = String::with_capacity(text.len());
  let mut cut = false;

  for segment in Segments::new(text) {
    match segment {
      Segment::Escape(escape) => truncated.push_str(escape),
      Segment::Text(_) if cut => {},
      Segment::Text(text) => {
        for g in text.graphemes(true) {
          let g_width = grapheme_width(g);
          if used + g_width > budget {
            truncated.push_str(ELLIPSIS);
            cut = true;
            break;
          }
          used += g_width;
          truncated.push_str(g);
        }
      },
    }
  }

  Cow::Owned(truncated)
}

/// Left-justifies `text` in a column of `width` display columns.
pub fn pad_to_width(text: &str, width: usize) -> String {
  let padding = width.saturating_sub(display_width(text));
  let mut padded = String::with_capacity(text.len() + padding);
  padded.push_str(text);
  padded.extend(std::iter::repeat_n(' ', padding));
  padded
}
