mod cli;

use std::{
  fs::OpenOptions,
  io::{
    self,
    BufRead,
    Write,
  },
  path::Path,
  sync::Mutex,
};

use anyhow::{
  Context,
  Result,
  anyhow,
};
use the_lib::{
  completion::CompletionOutcome,
  format::format,
  options::CompletionOptions,
  scanner::scan,
};
use the_shell::{
  commands::{
    self,
    Session,
  },
  config::ShellConfig,
  prompt,
  registry::{
    CommandRegistry,
    ShellContext,
  },
};
use tracing_subscriber::EnvFilter;

use crate::cli::CliOptions;

const DEFAULT_TERMINAL_WIDTH: usize = 80;

fn main() -> Result<()> {
  let options = CliOptions::parse()?;
  setup_logging(options.verbosity, options.log_file.as_deref())?;

  let config =
    ShellConfig::load_user(options.config_file.as_deref()).context("failed to load config")?;
  let width = options
    .terminal_width
    .or(config.terminal_width)
    .or_else(|| std::env::var("COLUMNS").ok()?.parse().ok())
    .unwrap_or(DEFAULT_TERMINAL_WIDTH);

  let mut session = Session::new(io::stdout());
  let registry = commands::registry(session.shelves()).context("invalid command grammar")?;

  if let Some((line, cursor)) = &options.complete {
    let mut out = io::stdout().lock();
    return print_completions(&registry, line, *cursor, width, &config.completion, &mut out);
  }
  run(&registry, &mut session, &config, width, io::stdin().lock(), &mut io::stdout())
}

fn setup_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
  let level = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

  match log_file {
    Some(path) => {
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
      subscriber.with_ansi(false).with_writer(Mutex::new(file)).init();
    },
    None => subscriber.with_writer(io::stderr).init(),
  }
  Ok(())
}

/// Reads commands from `input` until it ends or `quit` is entered. A line
/// ending in a tab shows the completions for the text before the tab.
fn run<W: Write + 'static>(
  registry: &CommandRegistry<Session<W>>,
  session: &mut Session<W>,
  config: &ShellConfig,
  width: usize,
  input: impl BufRead,
  out: &mut impl Write,
) -> Result<()> {
  let mut lines = input.lines();
  loop {
    write!(out, "{}", config.prompt)?;
    out.flush()?;

    let Some(line) = lines.next() else {
      break;
    };
    let line = line.context("failed to read from stdin")?;
    let line = line.trim_end_matches('\r');
    if matches!(line.trim(), "quit" | "exit") {
      break;
    }

    if let Some(partial) = line.strip_suffix('\t') {
      if let Err(err) =
        print_completions(registry, partial, partial.len(), width, &config.completion, out)
      {
        tracing::warn!(%err, line = partial, "completion failed");
        eprintln!("error: {err}");
      }
      continue;
    }
    if let Err(err) = registry.execute(session, line) {
      tracing::debug!(%err, line, "command failed");
      eprintln!("error: {err}");
    }
  }
  Ok(())
}

fn print_completions<Ctx: ShellContext + 'static>(
  registry: &CommandRegistry<Ctx>,
  line: &str,
  cursor: usize,
  width: usize,
  options: &CompletionOptions,
  out: &mut impl Write,
) -> Result<()> {
  let begidx = scan(line, cursor).map_or(cursor, |scan| scan.token_start);
  let outcome = registry
    .complete_line(line, begidx, cursor, options)
    .map_err(|err| anyhow!("completion failed: {err}"))?;

  for rendered in prompt::render(&outcome, width, options) {
    writeln!(out, "{rendered}")?;
  }
  if let CompletionOutcome::Candidates(completions) = &outcome {
    let matches = format(completions, width, options).matches;
    if let Some(completed) = prompt::completed_line(line, begidx, cursor, &matches) {
      writeln!(out, "{completed}")?;
    }
  }
  Ok(())
}
