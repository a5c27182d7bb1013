use std::path::PathBuf;

use anyhow::{
  Result,
  bail,
};
use clap::{
  ArgAction,
  Parser,
};

#[derive(Clone, Debug)]
pub struct CliOptions {
  pub verbosity:      u8,
  pub log_file:       Option<PathBuf>,
  pub config_file:    Option<PathBuf>,
  pub terminal_width: Option<usize>,
  /// A line to complete instead of reading commands, with its cursor.
  pub complete:       Option<(String, usize)>,
}

impl CliOptions {
  pub fn parse() -> Result<Self> {
    let raw = RawCli::parse();
    raw.try_into()
  }
}

#[derive(Parser, Debug)]
#[command(name = "the-shell", about, long_about = None, version)]
struct RawCli {
  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count)]
  verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE")]
  log_file: Option<PathBuf>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE")]
  config_file: Option<PathBuf>,

  /// Lay out completions for a terminal this many columns wide
  #[arg(short = 'w', long = "width", value_name = "COLUMNS")]
  terminal_width: Option<usize>,

  /// Print the completions for LINE and exit
  #[arg(long = "complete", value_name = "LINE")]
  complete: Option<String>,

  /// Byte offset of the cursor in the completed line (defaults to its end)
  #[arg(long = "cursor", value_name = "OFFSET", requires = "complete")]
  cursor: Option<usize>,
}

impl TryFrom<RawCli> for CliOptions {
  type Error = anyhow::Error;

  fn try_from(raw: RawCli) -> Result<Self> {
    let complete = match raw.complete {
      Some(line) => {
        let cursor = raw.cursor.unwrap_or(line.len());
        if cursor > line.len() || !line.is_char_boundary(cursor) {
          bail!(
            "cursor {cursor} is not a character boundary of a {} byte line",
            line.len()
          );
        }
        Some((line, cursor))
      },
      None => None,
    };

    Ok(Self {
      verbosity: raw.verbosity,
      log_file: raw.log_file,
      config_file: raw.config_file,
      terminal_width: raw.terminal_width,
      complete,
    })
  }
}
