//! String orderings for presenting completion candidates.
//!
//! Both orderings fold case first and fall back to the raw strings so that the
//! result is total and deterministic. The natural ordering additionally
//! compares runs of ASCII digits by their numeric value, which puts `"2"`
//! before `"11"`.

use std::{
  cmp::Ordering,
  iter::Peekable,
  str::Chars,
};

/// Case-folded lexical comparison.
pub fn alphabetical_cmp(a: &str, b: &str) -> Ordering {
  a.chars()
    .flat_map(char::to_lowercase)
    .cmp(b.chars().flat_map(char::to_lowercase))
    .then_with(|| a.cmp(b))
}

/// Case-folded comparison treating digit runs as integers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
  let mut left = a.chars().peekable();
  let mut right = b.chars().peekable();

  loop {
    match (left.peek().copied(), right.peek().copied()) {
      (None, None) => return a.cmp(b),
      (None, Some(_)) => return Ordering::Less,
      (Some(_), None) => return Ordering::Greater,
      (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
        let ordering = cmp_digit_runs(&digit_run(&mut left), &digit_run(&mut right));
        if ordering != Ordering::Equal {
          return ordering;
        }
      },
      (Some(l), Some(r)) => {
        left.next();
        right.next();
        let ordering = l.to_lowercase().cmp(r.to_lowercase());
        if ordering != Ordering::Equal {
          return ordering;
        }
      },
    }
  }
}

fn digit_run(chars: &mut Peekable<Chars<'_>>) -> String {
  let mut run = String::new();
  while let Some(ch) = chars.next_if(char::is_ascii_digit) {
    run.push(ch);
  }
  run
}

// Runs are arbitrarily long, so compare them without parsing: strip leading
// zeros, then a longer run is a bigger number.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
  let a_trimmed = a.trim_start_matches('0');
  let b_trimmed = b.trim_start_matches('0');
  a_trimmed
    .len()
    .cmp(&b_trimmed.len())
    .then_with(|| a_trimmed.cmp(b_trimmed))
    .then_with(|| a.len().cmp(&b.len()))
}

/// Parses `text` as a number the way a user would type one.
pub fn parse_number(text: &str) -> Option<f64> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }
  text.parse::<f64>().ok().filter(|value| value.is_finite())
}
