//! An interactive command shell built on the completion engine of `the-lib`.
//!
//! Commands are registered with a grammar. The registry completes partial
//! lines against those grammars and dispatches finished lines to handlers.

pub mod commands;
pub mod config;
pub mod prompt;
pub mod registry;
