//! Assigning tokens to the arguments of a grammar, one token at a time.
//!
//! Completion and parsing both feed tokens through [`Replay::step`] so they
//! agree on which argument a token belongs to. The replay is always in one of
//! four states:
//!
//! | State              | Meaning                                                |
//! |--------------------|--------------------------------------------------------|
//! | `Neutral`          | nothing is collecting values                           |
//! | `InFlag`           | a flag is collecting values                            |
//! | `InPositional`     | a positional is collecting values                      |
//! | `RemainderLocked`  | a remainder argument swallows every token              |
//!
//! A remainder positional can be closed with `--`. A remainder flag runs to
//! the end of the line.

use std::collections::HashMap;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
  completion::Malformed,
  grammar::{
    ArgAction,
    ArgId,
    Argument,
    Grammar,
    Subcommand,
  },
};

/// Progress of one argument through its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArgumentState {
  pub id:        ArgId,
  pub min:       usize,
  pub max:       Option<usize>,
  pub count:     usize,
  pub remainder: bool,
}

impl ArgumentState {
  pub fn new(id: ArgId, argument: &Argument) -> Self {
    Self {
      id,
      min: argument.min_args(),
      max: argument.max_args(),
      count: 0,
      remainder: argument.is_remainder(),
    }
  }

  pub fn is_full(&self) -> bool {
    self.max.is_some_and(|max| self.count >= max)
  }

  pub fn is_unfinished(&self) -> bool {
    self.count < self.min
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplayState {
  Neutral,
  InFlag,
  InPositional,
  RemainderLocked,
}

/// What a single token turned out to be.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step<'g> {
  /// A `--` that ended flag parsing or a remainder positional.
  Separator,
  Flag(ArgId),
  UnknownFlag,
  Value(ArgId),
  /// The token selected a subcommand; the rest of the line belongs to it.
  Subcommand {
    id:      ArgId,
    command: &'g Subcommand,
  },
  UnknownSubcommand(ArgId),
  /// A value with no positional left to take it.
  Extra,
}

#[derive(Debug)]
pub(crate) struct Replay<'g> {
  grammar:              &'g Grammar,
  abbreviation_allowed: bool,
  pub flag_state:       Option<ArgumentState>,
  pub pos_state:        Option<ArgumentState>,
  /// Positionals that have not started collecting values, in order.
  remaining:            SmallVec<[ArgId; 4]>,
  /// Set after `--` or once a remainder started: nothing is a flag anymore.
  pub skip_flags:       bool,
  /// Whether a `--` outside any remainder was seen.
  separator_seen:       bool,
  /// Flags that are no longer offered for completion.
  matched_flags:        SmallVec<[ArgId; 8]>,
  /// Values of the current occurrence of each argument.
  consumed:             HashMap<ArgId, Vec<String>>,
  /// Values kept for each argument, following its action.
  values:               IndexMap<ArgId, Vec<String>>,
  occurrences:          HashMap<ArgId, usize>,
  /// Exclusive group index to the member that was used.
  completed_groups:     HashMap<usize, ArgId>,
}

impl<'g> Replay<'g> {
  pub fn new(grammar: &'g Grammar, abbreviation_allowed: bool) -> Self {
    Self {
      grammar,
      abbreviation_allowed,
      flag_state: None,
      pos_state: None,
      remaining: grammar.positional_ids().iter().copied().collect(),
      skip_flags: false,
      separator_seen: false,
      matched_flags: SmallVec::new(),
      consumed: HashMap::new(),
      values: IndexMap::new(),
      occurrences: HashMap::new(),
      completed_groups: HashMap::new(),
    }
  }

  pub fn state(&self) -> ReplayState {
    match (self.flag_state, self.pos_state) {
      (Some(flag), _) if flag.remainder => ReplayState::RemainderLocked,
      (Some(_), _) => ReplayState::InFlag,
      (None, Some(pos)) if pos.remainder => ReplayState::RemainderLocked,
      (None, Some(_)) => ReplayState::InPositional,
      (None, None) => ReplayState::Neutral,
    }
  }

  /// The open flag, if it still needs more values.
  pub fn unfinished_flag(&self) -> Option<ArgumentState> {
    self.flag_state.filter(ArgumentState::is_unfinished)
  }

  /// The positional the next value would go to.
  pub fn next_positional(&self) -> Option<ArgumentState> {
    self.pos_state.or_else(|| {
      self
        .remaining
        .first()
        .map(|id| ArgumentState::new(*id, self.grammar.argument(*id)))
    })
  }

  pub fn remaining(&self) -> &[ArgId] {
    &self.remaining
  }

  pub fn is_matched(&self, id: ArgId) -> bool {
    self.matched_flags.contains(&id)
  }

  pub fn consumed(&self, id: ArgId) -> &[String] {
    self.consumed.get(&id).map_or(&[], Vec::as_slice)
  }

  pub fn values(&self) -> impl Iterator<Item = (ArgId, &[String])> {
    self.values.iter().map(|(id, values)| (*id, values.as_slice()))
  }

  pub fn occurrences(&self, id: ArgId) -> usize {
    self.occurrences.get(&id).copied().unwrap_or(0)
  }

  /// Values keyed by argument name, as handed to completers.
  pub fn arg_tokens(&self) -> IndexMap<String, Vec<String>> {
    self
      .values
      .iter()
      .map(|(id, values)| (self.grammar.argument(*id).dest.clone(), values.clone()))
      .collect()
  }

  pub fn step(&mut self, token: &str) -> Result<Step<'g>, Malformed> {
    tracing::trace!(token, state = ?self.state(), skip_flags = self.skip_flags, "replaying token");

    if let Some(state) = self.flag_state.as_mut().filter(|state| state.remainder) {
      state.count += 1;
      let id = state.id;
      self.push_value(id, token);
      return Ok(Step::Value(id));
    }

    if let Some(state) = self.pos_state.as_mut().filter(|state| state.remainder) {
      if token == "--" {
        self.pos_state = None;
        self.skip_flags = self.separator_seen;
        return Ok(Step::Separator);
      }
      state.count += 1;
      let id = state.id;
      self.push_value(id, token);
      return Ok(Step::Value(id));
    }

    if token == "--" && !self.skip_flags {
      if let Some(state) = self.unfinished_flag() {
        return Err(Malformed::unfinished(self.grammar, state));
      }
      self.flag_state = None;
      self.skip_flags = true;
      self.separator_seen = true;
      return Ok(Step::Separator);
    }

    if !self.skip_flags && self.grammar.looks_like_flag(token) {
      if let Some(state) = self.unfinished_flag() {
        return Err(Malformed::unfinished(self.grammar, state));
      }
      // An open positional survives: flags may sit between its values.
      self.flag_state = None;

      let Some(id) = self
        .grammar
        .lookup_flag(token, self.abbreviation_allowed)
      else {
        return Ok(Step::UnknownFlag);
      };
      self.open_flag(id)?;
      return Ok(Step::Flag(id));
    }

    if let Some(mut state) = self.flag_state {
      state.count += 1;
      self.push_value(state.id, token);
      self.flag_state = (!state.is_full()).then_some(state);
      return Ok(Step::Value(state.id));
    }

    let mut state = match self.pos_state {
      Some(state) => state,
      None => {
        if self.remaining.is_empty() {
          return Ok(Step::Extra);
        }
        let id = self.remaining.remove(0);
        self.update_groups(id)?;

        let argument = self.grammar.argument(id);
        if let Some(subcommands) = argument.subcommand_set() {
          self.values.insert(id, vec![token.to_string()]);
          *self.occurrences.entry(id).or_default() += 1;
          return Ok(match subcommands.get(token) {
            Some(command) => Step::Subcommand { id, command },
            None => Step::UnknownSubcommand(id),
          });
        }

        let state = ArgumentState::new(id, argument);
        *self.occurrences.entry(id).or_default() += 1;
        self.skip_flags |= state.remainder;
        state
      },
    };

    state.count += 1;
    self.push_value(state.id, token);
    if state.is_full() {
      self.pos_state = None;
      // A trailing remainder may claim flag-shaped tokens, so stop parsing
      // flags as soon as it is next in line.
      if let Some(next) = self.remaining.first()
        && self.grammar.argument(*next).is_remainder()
      {
        self.skip_flags = true;
      }
    } else {
      self.pos_state = Some(state);
    }
    Ok(Step::Value(state.id))
  }

  fn open_flag(&mut self, id: ArgId) -> Result<(), Malformed> {
    self.update_groups(id)?;

    let argument = self.grammar.argument(id);
    *self.occurrences.entry(id).or_default() += 1;
    self.consumed.insert(id, Vec::new());
    match argument.action {
      ArgAction::Store => {
        self.values.insert(id, Vec::new());
      },
      ArgAction::Append => {
        self.values.entry(id).or_default();
      },
      ArgAction::AppendConst => {
        let constant = argument.constant.clone().unwrap_or_default();
        self.values.entry(id).or_default().push(constant);
      },
      ArgAction::StoreTrue | ArgAction::Count | ArgAction::Help => {},
    }

    if !argument.action.is_repeatable() && !self.matched_flags.contains(&id) {
      self.matched_flags.push(id);
    }

    if argument.max_args() != Some(0) {
      let state = ArgumentState::new(id, argument);
      self.skip_flags |= state.remainder;
      self.flag_state = Some(state);
    }
    Ok(())
  }

  fn push_value(&mut self, id: ArgId, token: &str) {
    self.consumed.entry(id).or_default().push(token.to_string());
    self.values.entry(id).or_default().push(token.to_string());
  }

  /// Records `id` as the used member of its exclusive group, if it has one.
  fn update_groups(&mut self, id: ArgId) -> Result<(), Malformed> {
    let Some((index, group)) = self
      .grammar
      .groups()
      .iter()
      .enumerate()
      .find(|(_, group)| group.contains(&id))
    else {
      return Ok(());
    };

    if let Some(&used) = self.completed_groups.get(&index) {
      if used == id {
        return Ok(());
      }
      return Err(Malformed::NotAllowedWith {
        argument: self.grammar.argument(id).display_name(),
        other:    self.grammar.argument(used).display_name(),
      });
    }

    self.completed_groups.insert(index, id);
    for &member in group.iter().filter(|member| **member != id) {
      if self.grammar.argument(member).is_flag() {
        if !self.matched_flags.contains(&member) {
          self.matched_flags.push(member);
        }
      } else {
        self.remaining.retain(|remaining| *remaining != member);
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::grammar::{
    Choices,
    Nargs,
    Subcommands,
  };

  fn replay_all<'g>(grammar: &'g Grammar, tokens: &[&str]) -> Result<Replay<'g>, Malformed> {
    let mut replay = Replay::new(grammar, true);
    for token in tokens {
      replay.step(token)?;
    }
    Ok(replay)
  }

  fn values<'r>(replay: &'r Replay<'_>, grammar: &Grammar, dest: &str) -> &'r [String] {
    let id = grammar.find(dest).unwrap();
    replay
      .values()
      .find(|(value_id, _)| *value_id == id)
      .map_or(&[], |(_, values)| values)
  }

  fn runner() -> Grammar {
    Grammar::builder("run")
      .argument(Argument::flag(["-v", "--verbose"]).action(ArgAction::Count))
      .argument(Argument::flag(["-e", "--env"]).nargs(Nargs::Exactly(2)))
      .argument(Argument::positional("program"))
      .argument(Argument::positional("args").nargs(Nargs::Remainder))
      .build()
      .unwrap()
  }

  #[test]
  fn states() {
    let grammar = runner();
    let mut replay = Replay::new(&grammar, true);
    assert_eq!(replay.state(), ReplayState::Neutral);

    replay.step("-e").unwrap();
    assert_eq!(replay.state(), ReplayState::InFlag);
    replay.step("KEY").unwrap();
    assert_eq!(replay.state(), ReplayState::InFlag);
    replay.step("value").unwrap();
    assert_eq!(replay.state(), ReplayState::Neutral);

    replay.step("python").unwrap();
    // The program is full and the remainder is next in line.
    assert_eq!(replay.state(), ReplayState::Neutral);
    assert!(replay.skip_flags);

    replay.step("-c").unwrap();
    assert_eq!(replay.state(), ReplayState::RemainderLocked);
    assert_eq!(values(&replay, &grammar, "args"), ["-c"]);
  }

  #[test]
  fn positional_remainder_ends_at_separator() {
    let grammar = runner();
    let replay = replay_all(&grammar, &["python", "-c", "-v", "--", "-v"]).unwrap();
    assert_eq!(values(&replay, &grammar, "args"), ["-c", "-v"]);
    assert_eq!(replay.occurrences(grammar.find("verbose").unwrap()), 1);
    assert_eq!(replay.state(), ReplayState::Neutral);
  }

  #[test]
  fn closing_remainder_keeps_earlier_separator() {
    let grammar = runner();
    let replay = replay_all(&grammar, &["--", "python", "a", "--", "-v"]).unwrap();
    assert_eq!(values(&replay, &grammar, "args"), ["a"]);
    assert!(replay.skip_flags);
    assert_eq!(replay.occurrences(grammar.find("verbose").unwrap()), 0);
  }

  #[test]
  fn flag_remainder_runs_to_end_of_line() {
    let grammar = Grammar::builder("exec")
      .argument(Argument::flag(["-x", "--exec"]).nargs(Nargs::Remainder))
      .argument(Argument::flag(["-q"]).action(ArgAction::StoreTrue))
      .build()
      .unwrap();
    let replay = replay_all(&grammar, &["-x", "ls", "--", "-q"]).unwrap();
    assert_eq!(values(&replay, &grammar, "exec"), ["ls", "--", "-q"]);
    assert_eq!(replay.occurrences(grammar.find("q").unwrap()), 0);
    assert_eq!(replay.state(), ReplayState::RemainderLocked);
  }

  #[test]
  fn unfinished_flags() {
    let grammar = runner();
    let err = replay_all(&grammar, &["-e", "KEY", "--"]).unwrap_err();
    assert_eq!(err, Malformed::UnfinishedFlag {
      flag:  "-e/--env".to_string(),
      min:   2,
      max:   Some(2),
      count: 1,
    });
    assert!(replay_all(&grammar, &["-e", "-v"]).is_err());

    // Unknown flags are skipped without consuming a positional.
    let replay = replay_all(&grammar, &["--nope", "python"]).unwrap();
    assert_eq!(values(&replay, &grammar, "program"), ["python"]);
  }

  #[test]
  fn separator_stops_flag_parsing() {
    let grammar = runner();
    let replay = replay_all(&grammar, &["--", "-v"]).unwrap();
    assert_eq!(values(&replay, &grammar, "program"), ["-v"]);
    assert_eq!(replay.occurrences(grammar.find("verbose").unwrap()), 0);
  }

  #[test]
  fn occurrences_and_exclusion() {
    let grammar = Grammar::builder("tag")
      .argument(
        Argument::flag(["-t", "--tag"])
          .action(ArgAction::Append)
          .nargs(Nargs::OneOrMore)
          .choices(Choices::from_values(["a", "b", "c"])),
      )
      .argument(Argument::flag(["-n", "--name"]))
      .argument(Argument::flag(["-v"]).action(ArgAction::Count))
      .build()
      .unwrap();
    let tag = grammar.find("tag").unwrap();
    let name = grammar.find("name").unwrap();

    let replay = replay_all(&grammar, &["-t", "a", "b", "-n", "x", "-v", "-v", "-t", "c"]).unwrap();
    // Exclusion only remembers the current occurrence.
    assert_eq!(replay.consumed(tag), ["c"]);
    assert_eq!(values(&replay, &grammar, "tag"), ["a", "b", "c"]);
    assert_eq!(replay.occurrences(tag), 2);
    assert!(replay.is_matched(name));
    assert!(!replay.is_matched(tag));
  }

  #[test]
  fn exclusive_groups() {
    let grammar = Grammar::builder("out")
      .argument(Argument::flag(["--json"]).action(ArgAction::StoreTrue))
      .argument(Argument::flag(["--yaml"]).action(ArgAction::StoreTrue))
      .argument(Argument::positional("format").nargs(Nargs::Optional))
      .exclusive(&["json", "yaml", "format"])
      .build()
      .unwrap();

    let replay = replay_all(&grammar, &["--json", "--json"]).unwrap();
    assert!(replay.is_matched(grammar.find("yaml").unwrap()));
    assert!(replay.remaining().is_empty());

    let err = replay_all(&grammar, &["--json", "--yaml"]).unwrap_err();
    assert_eq!(
      err.to_string(),
      "argument --yaml: not allowed with argument --json"
    );
  }

  #[test]
  fn subcommand_selection() {
    let grammar = Grammar::builder("library")
      .argument(Argument::flag(["-q"]).action(ArgAction::StoreTrue))
      .subcommands(
        Subcommands::new("action")
          .command("add", Grammar::builder("add").build().unwrap())
          .alias("a", "add"),
      )
      .build()
      .unwrap();

    let mut replay = Replay::new(&grammar, true);
    replay.step("-q").unwrap();
    match replay.step("a").unwrap() {
      Step::Subcommand { command, .. } => assert_eq!(command.name, "add"),
      step => panic!("unexpected step {step:?}"),
    }
    assert_eq!(replay.arg_tokens().get("action").unwrap(), &["a"]);

    let mut replay = Replay::new(&grammar, true);
    assert!(matches!(replay.step("nope").unwrap(), Step::UnknownSubcommand(_)));
    assert!(matches!(replay.step("more").unwrap(), Step::Extra));
  }
}
