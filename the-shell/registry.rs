use std::{
  collections::HashMap,
  sync::Arc,
};

use the_lib::{
  args::{
    Args,
    ParseArgsError,
  },
  completion::{
    CompletionOutcome,
    Completions,
    complete,
  },
  grammar::{
    Argument,
    Candidate,
    Choices,
    Grammar,
    Nargs,
    ProviderError,
  },
  options::CompletionOptions,
  scanner::split,
};
use thiserror::Error;

/// What a command handler can do to the shell it runs in.
pub trait ShellContext {
  /// Shows `text` to the user.
  fn print(&mut self, text: &str);
}

pub type CommandFn<Ctx> = fn(&mut Ctx, &Args, &CommandRegistry<Ctx>) -> CommandResult;

pub type CommandResult = Result<(), CommandError>;

#[derive(Debug, Error)]
pub enum CommandError {
  #[error("command not found: {name}")]
  NotFound { name: String },
  #[error("{name}: {source}")]
  InvalidArgs {
    name:   String,
    #[source]
    source: ParseArgsError,
  },
  #[error("{0}")]
  Failed(String),
}

impl CommandError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed(message.into())
  }
}

pub struct Command<Ctx: 'static> {
  pub name:    &'static str,
  pub aliases: &'static [&'static str],
  pub doc:     &'static str,
  pub grammar: Grammar,
  pub handler: CommandFn<Ctx>,
}

impl<Ctx: 'static> Command<Ctx> {
  pub fn new(
    name: &'static str,
    aliases: &'static [&'static str],
    doc: &'static str,
    grammar: Grammar,
    handler: CommandFn<Ctx>,
  ) -> Self {
    Self {
      name,
      aliases,
      doc,
      grammar,
      handler,
    }
  }
}

impl<Ctx> std::fmt::Debug for Command<Ctx> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Command")
      .field("name", &self.name)
      .field("aliases", &self.aliases)
      .field("grammar", &self.grammar)
      .finish_non_exhaustive()
  }
}

/// Commands by name and alias.
///
/// A `help` command is always present. Its argument completes the names of
/// the registered commands, so it is rebuilt whenever a command is added.
pub struct CommandRegistry<Ctx: 'static> {
  commands: HashMap<&'static str, Arc<Command<Ctx>>>,
}

impl<Ctx: ShellContext + 'static> CommandRegistry<Ctx> {
  pub fn new() -> Self {
    let mut registry = Self {
      commands: HashMap::new(),
    };
    registry.refresh_help();
    registry
  }

  pub fn register(&mut self, command: Command<Ctx>) {
    let command = Arc::new(command);
    self.insert(command);
    self.refresh_help();
  }

  pub fn get(&self, name: &str) -> Option<&Command<Ctx>> {
    self.commands.get(name).map(Arc::as_ref)
  }

  /// Names of all commands, without aliases, sorted.
  pub fn command_names(&self) -> Vec<&'static str> {
    let mut names: Vec<_> = self.commands.values().map(|command| command.name).collect();
    names.sort_unstable();
    names.dedup();
    names
  }

  /// Completes `line` at the cursor.
  ///
  /// The first word completes to command names. After it, completion is
  /// driven by the grammar of the named command; unknown commands complete to
  /// nothing.
  pub fn complete_line(
    &self,
    line: &str,
    begidx: usize,
    endidx: usize,
    options: &CompletionOptions,
  ) -> Result<CompletionOutcome, ProviderError> {
    let mut end = endidx.min(line.len());
    while !line.is_char_boundary(end) {
      end -= 1;
    }
    let (name, _, completing_command) = split(&line[..end]);

    if completing_command {
      let candidates: Vec<Candidate> = self
        .command_names()
        .into_iter()
        .filter(|candidate| options.matches_prefix(candidate, name))
        .filter_map(|candidate| self.get(candidate))
        .map(|command| Candidate::described(command.name, command.doc))
        .collect();
      if candidates.is_empty() {
        return Ok(CompletionOutcome::Empty);
      }
      return Ok(CompletionOutcome::Candidates(Completions {
        candidates,
        metavar: Some("COMMAND".to_string()),
        ..Completions::default()
      }));
    }

    match self.get(name) {
      Some(command) => complete(&command.grammar, line, begidx, endidx, options),
      None => {
        tracing::debug!(command = name, "no completion for unknown command");
        Ok(CompletionOutcome::Empty)
      },
    }
  }

  /// Parses `line` with the grammar of the command it names and runs the
  /// command. A blank line does nothing.
  pub fn execute(&self, ctx: &mut Ctx, line: &str) -> CommandResult {
    let (name, rest, _) = split(line);
    if name.is_empty() {
      return Ok(());
    }
    let command = self.get(name).ok_or_else(|| {
      CommandError::NotFound {
        name: name.to_string(),
      }
    })?;

    let args = command.grammar.parse_line(rest).map_err(|source| {
      CommandError::InvalidArgs {
        name: command.name.to_string(),
        source,
      }
    })?;
    if args.help_requested() {
      ctx.print(&command.grammar.help());
      return Ok(());
    }

    tracing::debug!(command = command.name, "executing command");
    (command.handler)(ctx, &args, self)
  }

  fn insert(&mut self, command: Arc<Command<Ctx>>) {
    self.commands.insert(command.name, command.clone());
    for alias in command.aliases {
      self.commands.insert(*alias, command.clone());
    }
  }

  fn refresh_help(&mut self) {
    let mut names: Vec<Candidate> = self
      .command_names()
      .into_iter()
      .filter(|name| *name != "help")
      .filter_map(|name| self.get(name))
      .map(|command| Candidate::described(command.name, command.doc))
      .collect();
    names.push(Candidate::described("help", HELP_DOC));

    let grammar = Grammar::builder("help")
      .description(HELP_DOC)
      .argument(
        Argument::positional("command")
          .nargs(Nargs::Optional)
          .choices(Choices::Static(names))
          .help("command to describe"),
      )
      .build();
    match grammar {
      Ok(grammar) => self.insert(Arc::new(Command::new("help", &[], HELP_DOC, grammar, help))),
      Err(err) => tracing::warn!(%err, "cannot build the help command"),
    }
  }
}

impl<Ctx: ShellContext + 'static> Default for CommandRegistry<Ctx> {
  fn default() -> Self {
    Self::new()
  }
}

const HELP_DOC: &str = "show the commands, or the usage of one command";

fn help<Ctx: ShellContext>(
  ctx: &mut Ctx,
  args: &Args,
  registry: &CommandRegistry<Ctx>,
) -> CommandResult {
  let Some(name) = args.get("command") else {
    let width = registry
      .command_names()
      .iter()
      .map(|name| name.len())
      .max()
      .unwrap_or(0);
    let lines: Vec<String> = registry
      .command_names()
      .into_iter()
      .filter_map(|name| registry.get(name))
      .map(|command| format!("  {:width$}  {}", command.name, command.doc))
      .collect();
    ctx.print(&format!("commands:\n{}", lines.join("\n")));
    return Ok(());
  };

  let command = registry.get(name).ok_or_else(|| {
    CommandError::NotFound {
      name: name.to_string(),
    }
  })?;
  let mut text = command.grammar.help();
  if !command.aliases.is_empty() {
    text.push_str(&format!("\n\naliases: {}", command.aliases.join(", ")));
  }
  ctx.print(&text);
  Ok(())
}

#[cfg(test)]
mod tests {
  use the_lib::grammar::ArgAction;

  use super::*;

  #[derive(Default)]
  struct Recorder {
    printed: Vec<String>,
    greeted: Vec<String>,
  }

  impl ShellContext for Recorder {
    fn print(&mut self, text: &str) {
      self.printed.push(text.to_string());
    }
  }

  fn greet(ctx: &mut Recorder, args: &Args, _: &CommandRegistry<Recorder>) -> CommandResult {
    let name = args.get("name").unwrap_or("world");
    let times = args.count("loud") + 1;
    ctx.greeted.push(format!("hello {name}{}", "!".repeat(times)));
    Ok(())
  }

  fn fail(_: &mut Recorder, _: &Args, _: &CommandRegistry<Recorder>) -> CommandResult {
    Err(CommandError::failed("it broke"))
  }

  fn registry() -> CommandRegistry<Recorder> {
    let grammar = Grammar::builder("greet")
      .help_flag()
      .argument(Argument::flag(["-l", "--loud"]).action(ArgAction::Count))
      .argument(
        Argument::positional("name")
          .nargs(Nargs::Optional)
          .choices(Choices::from_values(["alice", "bob"])),
      )
      .build()
      .unwrap();
    let mut registry = CommandRegistry::new();
    registry.register(Command::new("greet", &["hi"], "say hello", grammar, greet));
    registry.register(Command::new(
      "fail",
      &[],
      "always fails",
      Grammar::builder("fail").build().unwrap(),
      fail,
    ));
    registry
  }

  #[track_caller]
  fn assert_values(outcome: CompletionOutcome, expected: &[&str]) {
    let completions = outcome.completions().cloned().unwrap_or_default();
    let values: Vec<&str> = completions.values().collect();
    assert_eq!(values, expected);
  }

  #[test]
  fn test_command_names() {
    let registry = registry();
    assert_eq!(registry.command_names(), ["fail", "greet", "help"]);
    assert_eq!(registry.get("hi").map(|command| command.name), Some("greet"));
  }

  #[test]
  fn test_complete_command_name() {
    let registry = registry();
    let options = CompletionOptions::default();
    assert_values(registry.complete_line("gr", 0, 2, &options).unwrap(), &["greet"]);
    assert_values(registry.complete_line("", 0, 0, &options).unwrap(), &[
      "fail", "greet", "help",
    ]);
    assert_eq!(
      registry.complete_line("zz", 0, 2, &options).unwrap(),
      CompletionOutcome::Empty
    );
  }

  #[test]
  fn test_complete_arguments() {
    let registry = registry();
    let options = CompletionOptions::default();
    let line = "greet a";
    assert_values(registry.complete_line(line, 6, 7, &options).unwrap(), &["alice"]);
    let line = "hi -";
    assert_values(registry.complete_line(line, 3, 4, &options).unwrap(), &[
      "-h", "--help", "-l", "--loud",
    ]);
    let line = "nope x";
    assert_eq!(
      registry.complete_line(line, 5, 6, &options).unwrap(),
      CompletionOutcome::Empty
    );
    let line = "help g";
    assert_values(registry.complete_line(line, 5, 6, &options).unwrap(), &["greet"]);
  }

  #[test]
  fn test_execute() {
    let registry = registry();
    let mut ctx = Recorder::default();
    registry.execute(&mut ctx, "greet bob").unwrap();
    registry.execute(&mut ctx, "hi -l --loud").unwrap();
    registry.execute(&mut ctx, "   ").unwrap();
    assert_eq!(ctx.greeted, ["hello bob!", "hello world!!!"]);

    registry.execute(&mut ctx, "greet --help").unwrap();
    assert!(ctx.printed[0].starts_with("usage: greet"));
    assert_eq!(ctx.greeted.len(), 2);
  }

  #[test]
  fn test_execute_errors() {
    let registry = registry();
    let mut ctx = Recorder::default();
    assert!(matches!(
      registry.execute(&mut ctx, "nope"),
      Err(CommandError::NotFound { name }) if name == "nope"
    ));
    assert!(matches!(
      registry.execute(&mut ctx, "greet carol"),
      Err(CommandError::InvalidArgs { name, source: ParseArgsError::InvalidChoice { .. } })
        if name == "greet"
    ));
    let err = registry.execute(&mut ctx, "fail").unwrap_err();
    assert_eq!(err.to_string(), "it broke");
  }

  #[test]
  fn test_help() {
    let registry = registry();
    let mut ctx = Recorder::default();
    registry.execute(&mut ctx, "help").unwrap();
    assert_eq!(ctx.printed[0], [
      "commands:",
      "  fail   always fails",
      "  greet  say hello",
      "  help   show the commands, or the usage of one command",
    ]
    .join("\n"));

    registry.execute(&mut ctx, "help greet").unwrap();
    assert!(ctx.printed[1].starts_with("usage: greet [-h] [-l] [{alice,bob}]"));
    assert!(ctx.printed[1].ends_with("aliases: hi"));
  }
}
