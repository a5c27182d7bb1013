//! Parsing a finished command line against its [`Grammar`].
//!
//! Parsing drives the same token replay as completion, but strictly: anything
//! completion would shrug off (an unknown flag, a missing value, a second
//! member of an exclusive group) is an error here.

use std::collections::HashMap;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{
  completion::{
    Malformed,
    format_range_error,
  },
  grammar::{
    ArgAction,
    Grammar,
  },
  replay::{
    Replay,
    Step,
  },
  scanner::{
    ScanError,
    tokenize,
  },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseArgsError {
  #[error("unknown flag '{flag}'")]
  UnknownFlag { flag: String },
  #[error("argument {flag}: {} ({count} entered)", format_range_error(*.min, *.max))]
  FlagMissingArgument {
    flag:  String,
    min:   usize,
    max:   Option<usize>,
    count: usize,
  },
  #[error("unrecognized argument '{token}'")]
  UnexpectedArgument { token: String },
  #[error("the following argument is required: {argument}")]
  MissingRequired { argument: String },
  #[error("argument {argument}: invalid choice '{value}' (choose from {choices})")]
  InvalidChoice {
    argument: String,
    value:    String,
    choices:  String,
  },
  #[error("unknown subcommand '{name}' (choose from {choices})")]
  UnknownSubcommand { name: String, choices: String },
  #[error("argument {argument}: not allowed with argument {other}")]
  NotAllowedWith { argument: String, other: String },
  #[error(transparent)]
  UnterminatedQuote(#[from] ScanError),
}

impl From<Malformed> for ParseArgsError {
  fn from(malformed: Malformed) -> Self {
    match malformed {
      Malformed::UnfinishedFlag {
        flag,
        min,
        max,
        count,
      } => {
        Self::FlagMissingArgument {
          flag,
          min,
          max,
          count,
        }
      },
      Malformed::NotAllowedWith { argument, other } => Self::NotAllowedWith { argument, other },
    }
  }
}

/// Parsed values, looked up by argument name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
  values:      IndexMap<String, Vec<String>>,
  counts:      HashMap<String, usize>,
  positionals: Vec<String>,
  subcommand:  Option<(String, Box<Args>)>,
  help:        bool,
}

impl Args {
  /// The last value given for `name`.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .values
      .get(name)
      .and_then(|values| values.last())
      .map(String::as_str)
  }

  pub fn get_all(&self, name: &str) -> &[String] {
    self.values.get(name).map_or(&[], Vec::as_slice)
  }

  pub fn has(&self, name: &str) -> bool {
    self.count(name) > 0
  }

  /// How many times `name` was given.
  pub fn count(&self, name: &str) -> usize {
    self.counts.get(name).copied().unwrap_or(0)
  }

  /// Values of every positional, in command line order.
  pub fn positionals(&self) -> &[String] {
    &self.positionals
  }

  /// The chosen subcommand's name and its own arguments.
  pub fn subcommand(&self) -> Option<(&str, &Args)> {
    self
      .subcommand
      .as_ref()
      .map(|(name, args)| (name.as_str(), args.as_ref()))
  }

  /// Whether a help flag was given, at this level or below.
  pub fn help_requested(&self) -> bool {
    self.help || self.subcommand().is_some_and(|(_, args)| args.help_requested())
  }
}

impl Grammar {
  pub fn parse<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Args, ParseArgsError> {
    self.parse_with(tokens, true)
  }

  /// Tokenizes and parses the arguments part of a command line.
  pub fn parse_line(&self, line: &str) -> Result<Args, ParseArgsError> {
    let tokens = tokenize(line, true)?;
    let tokens: Vec<&str> = tokens.iter().map(|token| token.content.as_ref()).collect();
    self.parse(&tokens)
  }

  pub fn parse_with<S: AsRef<str>>(
    &self,
    tokens: &[S],
    abbreviation_allowed: bool,
  ) -> Result<Args, ParseArgsError> {
    let mut replay = Replay::new(self, abbreviation_allowed);
    let mut positionals = Vec::new();
    let mut subcommand = None;

    for (idx, token) in tokens.iter().enumerate() {
      let token = token.as_ref();
      match replay.step(token)? {
        Step::UnknownFlag => {
          return Err(ParseArgsError::UnknownFlag {
            flag: token.to_string(),
          });
        },
        Step::Extra => {
          return Err(ParseArgsError::UnexpectedArgument {
            token: token.to_string(),
          });
        },
        Step::UnknownSubcommand(id) => {
          let choices = self
            .argument(id)
            .subcommand_set()
            .map(|subcommands| {
              let names: Vec<_> = subcommands.iter().map(|c| format!("'{}'", c.name)).collect();
              names.join(", ")
            })
            .unwrap_or_default();
          return Err(ParseArgsError::UnknownSubcommand {
            name: token.to_string(),
            choices,
          });
        },
        Step::Subcommand { command, .. } => {
          let nested = command
            .grammar
            .parse_with(&tokens[idx + 1..], abbreviation_allowed)?;
          subcommand = Some((command.name.clone(), Box::new(nested)));
          break;
        },
        Step::Value(id) if !self.argument(id).is_flag() => positionals.push(token.to_string()),
        Step::Flag(_) | Step::Value(_) | Step::Separator => {},
      }
    }

    let help = self
      .arguments()
      .any(|(id, arg)| arg.action == ArgAction::Help && replay.occurrences(id) > 0);
    if !help {
      self.validate(&replay)?;
    }

    let values = replay
      .values()
      .map(|(id, values)| (self.argument(id).dest.clone(), values.to_vec()))
      .collect();
    let counts = self
      .arguments()
      .filter(|(id, _)| replay.occurrences(*id) > 0)
      .map(|(id, arg)| (arg.dest.clone(), replay.occurrences(id)))
      .collect();

    Ok(Args {
      values,
      counts,
      positionals,
      subcommand,
      help,
    })
  }

  fn validate(&self, replay: &Replay<'_>) -> Result<(), ParseArgsError> {
    if let Some(state) = replay.unfinished_flag() {
      return Err(Malformed::unfinished(self, state).into());
    }

    let missing_positional = replay
      .pos_state
      .filter(|state| state.is_unfinished())
      .map(|state| state.id)
      .or_else(|| {
        replay
          .remaining()
          .iter()
          .copied()
          .find(|id| self.argument(*id).is_required())
      });
    let missing_flag = self
      .arguments()
      .find(|(id, arg)| arg.is_flag() && arg.required && replay.occurrences(*id) == 0)
      .map(|(id, _)| id);
    if let Some(id) = missing_flag.or(missing_positional) {
      return Err(ParseArgsError::MissingRequired {
        argument: self.argument(id).display_name(),
      });
    }

    for (id, values) in replay.values() {
      let argument = self.argument(id);
      let Some(choices) = argument.choices.static_values() else {
        continue;
      };
      let choices: Vec<&str> = choices.collect();
      if let Some(value) = values.iter().find(|value| !choices.contains(&value.as_str())) {
        let choices: Vec<_> = choices.iter().map(|choice| format!("'{choice}'")).collect();
        return Err(ParseArgsError::InvalidChoice {
          argument: argument.display_name(),
          value:    value.clone(),
          choices:  choices.join(", "),
        });
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::grammar::{
    Argument,
    Choices,
    Nargs,
    Subcommands,
  };

  fn copy() -> Grammar {
    Grammar::builder("copy")
      .help_flag()
      .argument(Argument::flag(["-v", "--verbose"]).action(ArgAction::Count))
      .argument(Argument::flag(["-f", "--force"]).action(ArgAction::StoreTrue))
      .argument(
        Argument::flag(["-e", "--exclude"])
          .action(ArgAction::Append)
          .metavar("GLOB"),
      )
      .argument(
        Argument::flag(["-m", "--mode"])
          .choices(Choices::from_values(["fast", "safe"]))
          .required(),
      )
      .argument(Argument::positional("sources").nargs(Nargs::OneOrMore))
      .build()
      .unwrap()
  }

  #[track_caller]
  fn parse(grammar: &Grammar, line: &str) -> Result<Args, ParseArgsError> {
    grammar.parse_line(line)
  }

  #[test]
  fn flags_and_positionals() {
    let args = parse(&copy(), "-v -v -m fast a.txt -v b.txt -e '*.tmp' --exclude x").unwrap();
    assert_eq!(args.count("verbose"), 3);
    assert!(!args.has("force"));
    assert_eq!(args.get("mode"), Some("fast"));
    assert_eq!(args.get_all("exclude"), ["*.tmp", "x"]);
    assert_eq!(args.get_all("sources"), ["a.txt", "b.txt"]);
    assert_eq!(args.positionals(), ["a.txt", "b.txt"]);
    assert!(!args.help_requested());
  }

  #[test]
  fn store_keeps_last_occurrence() {
    let args = parse(&copy(), "-m fast -m safe a --force").unwrap();
    assert_eq!(args.get_all("mode"), ["safe"]);
    assert!(args.has("force"));
  }

  #[test]
  fn errors() {
    let grammar = copy();
    assert_eq!(
      parse(&grammar, "-m fast a --nope"),
      Err(ParseArgsError::UnknownFlag {
        flag: "--nope".to_string(),
      })
    );
    assert_eq!(
      parse(&grammar, "a").unwrap_err().to_string(),
      "the following argument is required: -m/--mode"
    );
    assert_eq!(
      parse(&grammar, "-m fast").unwrap_err().to_string(),
      "the following argument is required: sources"
    );
    assert_eq!(
      parse(&grammar, "a -m").unwrap_err().to_string(),
      "argument -m/--mode: expected 1 argument (0 entered)"
    );
    assert_eq!(
      parse(&grammar, "-m slow a").unwrap_err().to_string(),
      "argument -m/--mode: invalid choice 'slow' (choose from 'fast', 'safe')"
    );
    assert!(matches!(
      parse(&grammar, "-m 'fast a"),
      Err(ParseArgsError::UnterminatedQuote(_))
    ));
  }

  #[test]
  fn help_skips_validation() {
    let args = parse(&copy(), "--help").unwrap();
    assert!(args.help_requested());
  }

  #[test]
  fn too_many_positionals() {
    let grammar = Grammar::builder("rename")
      .argument(Argument::positional("from"))
      .argument(Argument::positional("to"))
      .build()
      .unwrap();
    assert_eq!(
      grammar.parse(&["a", "b", "c"]),
      Err(ParseArgsError::UnexpectedArgument {
        token: "c".to_string(),
      })
    );
    let args = grammar.parse(&["--", "-a", "b"]).unwrap();
    assert_eq!(args.get("from"), Some("-a"));
  }

  #[test]
  fn subcommands() {
    let add = Grammar::builder("add")
      .argument(Argument::positional("item"))
      .argument(Argument::flag(["-n"]).action(ArgAction::StoreTrue))
      .build()
      .unwrap();
    let grammar = Grammar::builder("library")
      .argument(Argument::flag(["-u", "--user"]))
      .subcommands(Subcommands::new("action").command("add", add).alias("a", "add"))
      .build()
      .unwrap();

    let args = grammar.parse(&["-u", "bob", "a", "book", "-n"]).unwrap();
    assert_eq!(args.get("user"), Some("bob"));
    assert_eq!(args.get("action"), Some("a"));
    let (name, nested) = args.subcommand().unwrap();
    assert_eq!(name, "add");
    assert_eq!(nested.get("item"), Some("book"));
    assert!(nested.has("n"));

    assert_eq!(
      grammar.parse(&["rm"]).unwrap_err().to_string(),
      "unknown subcommand 'rm' (choose from 'add')"
    );
    assert_eq!(
      grammar.parse::<&str>(&[]).unwrap_err().to_string(),
      "the following argument is required: action"
    );
    assert!(matches!(
      grammar.parse(&["add"]),
      Err(ParseArgsError::MissingRequired { .. })
    ));
  }

  #[test]
  fn exclusive_and_remainder() {
    let grammar = Grammar::builder("run")
      .argument(Argument::flag(["--json"]).action(ArgAction::StoreTrue))
      .argument(Argument::flag(["--yaml"]).action(ArgAction::StoreTrue))
      .argument(Argument::positional("program"))
      .argument(Argument::positional("args").nargs(Nargs::Remainder))
      .exclusive(&["json", "yaml"])
      .build()
      .unwrap();
    assert_eq!(
      grammar.parse(&["--json", "--yaml", "x"]).unwrap_err().to_string(),
      "argument --yaml: not allowed with argument --json"
    );

    let args = grammar.parse(&["--json", "ls", "-la", "--json"]).unwrap();
    assert_eq!(args.get_all("args"), ["-la", "--json"]);
    assert_eq!(args.count("json"), 1);
  }
}
