/// Quote characters recognized by the command line scanner, in the order they
/// are tried when closing an unterminated token.
pub const QUOTES: [char; 2] = ['\'', '"'];

/// The default set of characters that introduce a flag.
pub const DEFAULT_PREFIX_CHARS: &str = "-";

/// Token separators on a command line.
#[inline]
pub fn char_is_blank(ch: char) -> bool {
  matches!(ch, ' ' | '\t')
}

#[inline]
pub fn char_is_quote(ch: char) -> bool {
  QUOTES.contains(&ch)
}

/// Blanks that make a completion candidate need quoting, including the
/// Unicode spaces that render as a gap.
#[inline]
pub fn char_is_whitespace(ch: char) -> bool {
  matches!(
    ch,
    '\t' | ' ' | '\u{00A0}' | '\u{180E}' | '\u{2000}'..='\u{200B}' | '\u{202F}' | '\u{205F}'
      | '\u{3000}' | '\u{FEFF}'
  )
}

/// Whether `ch` is one of the flag prefix characters in `prefix_chars`.
#[inline]
pub fn char_is_prefix(ch: char, prefix_chars: &str) -> bool {
  prefix_chars.contains(ch)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn blanks_and_quotes() {
    assert!(char_is_blank(' '));
    assert!(char_is_blank('\t'));
    assert!(!char_is_blank('\u{00A0}'));
    assert!(char_is_quote('"'));
    assert!(char_is_quote('\''));
    // Backticks are not quotes on a command line.
    assert!(!char_is_quote('`'));
  }

  #[test]
  fn whitespace() {
    assert!(char_is_whitespace(' '));
    assert!(char_is_whitespace('\u{3000}'));
    assert!(char_is_whitespace('\u{2009}'));
    assert!(!char_is_whitespace('a'));
    // Newlines are never inside a single command line.
    assert!(!char_is_whitespace('\n'));
  }

  #[test]
  fn prefix() {
    assert!(char_is_prefix('-', DEFAULT_PREFIX_CHARS));
    assert!(!char_is_prefix('+', DEFAULT_PREFIX_CHARS));
    assert!(char_is_prefix('+', "-+"));
  }
}
