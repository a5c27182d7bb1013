//! Argument-aware command line completion.
//!
//! A command's arguments are declared once as a [`grammar::Grammar`]. The same
//! grammar drives tab completion of a partially typed line
//! ([`completion::complete`]) and parsing of a finished one
//! ([`grammar::Grammar::parse`]), so both agree on which argument every token
//! belongs to.

pub mod args;
pub mod completion;
pub mod format;
pub mod grammar;
pub mod options;
pub mod scanner;

mod replay;
