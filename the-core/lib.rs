//! Text primitives shared by the shell crates: character classes used while
//! scanning command lines, terminal display width and human-friendly string
//! ordering.

pub mod chars;
pub mod grapheme;
pub mod natural;
