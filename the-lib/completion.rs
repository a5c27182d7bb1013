//! Completing the token under the cursor against a [`Grammar`].
//!
//! The tokens before the cursor are replayed through the grammar to find out
//! which argument is being filled. The last token is then completed:
//!
//! 1. Flag-shaped text completes flag names, unless an open flag still needs
//!    values, which is reported as [`Malformed::UnfinishedFlag`].
//! 2. An open flag completes its values.
//! 3. Otherwise the current or next positional completes its values.
//! 4. A lone prefix character (`-`) falls back to flag names.
//!
//! When an argument has nothing to offer, the user gets a hint describing it
//! instead of silence. Tokens after a subcommand name are completed by the
//! subcommand's own grammar, so positionals are always counted from the
//! nearest subcommand.

use indexmap::IndexMap;
use the_core::natural::parse_number;
use thiserror::Error;

use crate::{
  grammar::{
    ArgId,
    Candidate,
    Grammar,
    ProviderError,
  },
  options::CompletionOptions,
  replay::{
    ArgumentState,
    Replay,
    Step,
  },
  scanner,
};

/// What a completer callable gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct CompletionContext<'a> {
  /// The unquoted text being completed.
  pub text:       &'a str,
  pub line:       &'a str,
  pub begidx:     usize,
  pub endidx:     usize,
  /// Values given so far, by argument name, including those of parent
  /// commands and the names of the chosen subcommands.
  pub arg_tokens: &'a IndexMap<String, Vec<String>>,
}

/// A command line that cannot be completed as typed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
  #[error("argument {flag}: {} ({count} entered)", format_range_error(*.min, *.max))]
  UnfinishedFlag {
    flag:  String,
    min:   usize,
    max:   Option<usize>,
    count: usize,
  },
  #[error("argument {argument}: not allowed with argument {other}")]
  NotAllowedWith { argument: String, other: String },
}

impl Malformed {
  pub(crate) fn unfinished(grammar: &Grammar, state: ArgumentState) -> Self {
    Self::UnfinishedFlag {
      flag:  grammar.argument(state.id).display_name(),
      min:   state.min,
      max:   state.max,
      count: state.count,
    }
  }
}

pub(crate) fn format_range_error(min: usize, max: Option<usize>) -> String {
  let plural = |n| if n == 1 { "" } else { "s" };
  match max {
    Some(max) if max == min => format!("expected {min} argument{}", plural(min)),
    Some(max) => format!("expected {min} to {max} arguments"),
    None => format!("expected at least {min} argument{}", plural(min)),
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completions {
  pub candidates:         Vec<Candidate>,
  /// Lines to list instead of the candidate values, e.g. `[-t, --type]`.
  pub display:            Vec<String>,
  /// Whether the candidates are already in display order.
  pub sorted:             bool,
  /// Column header naming the argument being completed.
  pub metavar:            Option<String>,
  pub descriptive_header: Option<String>,
}

impl Completions {
  pub fn values(&self) -> impl Iterator<Item = &str> {
    self.candidates.iter().map(|candidate| candidate.value.as_str())
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
  Candidates(Completions),
  /// Help for the argument being completed, shown instead of candidates.
  Hint(String),
  /// Nothing to offer; the line is left alone.
  Empty,
  Error(Malformed),
}

impl CompletionOutcome {
  pub fn completions(&self) -> Option<&Completions> {
    match self {
      Self::Candidates(completions) => Some(completions),
      _ => None,
    }
  }
}

/// Completes `line` at the cursor `endidx` for a command declared by
/// `grammar`. The first token is the command name and is not completed here.
///
/// Only a failing choices provider makes this return `Err`.
pub fn complete(
  grammar: &Grammar,
  line: &str,
  begidx: usize,
  endidx: usize,
  options: &CompletionOptions,
) -> Result<CompletionOutcome, ProviderError> {
  let scan = match scanner::scan(line, endidx) {
    Ok(scan) => scan,
    Err(err) => {
      tracing::debug!(%err, "cannot tokenize command line for completion");
      return Ok(CompletionOutcome::Empty);
    },
  };
  if scan.completing_command() {
    return Ok(CompletionOutcome::Empty);
  }

  Completer::new(grammar, options).complete(
    scan.text(),
    line,
    begidx,
    scan.token_end,
    &scan.tokens[1..],
  )
}

/// Completion for one grammar level.
///
/// Holds nothing between calls; a completer can be reused for any number of
/// lines.
#[derive(Debug, Clone)]
pub struct Completer<'g> {
  grammar:       &'g Grammar,
  options:       &'g CompletionOptions,
  parent_tokens: IndexMap<String, Vec<String>>,
}

impl<'g> Completer<'g> {
  pub fn new(grammar: &'g Grammar, options: &'g CompletionOptions) -> Self {
    Self {
      grammar,
      options,
      parent_tokens: IndexMap::new(),
    }
  }

  /// Values given to parent commands, visible to completers as `arg_tokens`.
  pub fn with_parent_tokens(mut self, parent_tokens: IndexMap<String, Vec<String>>) -> Self {
    self.parent_tokens = parent_tokens;
    self
  }

  /// Completes `text`, the last of `tokens`. `tokens` excludes the command
  /// name.
  pub fn complete(
    &self,
    text: &str,
    line: &str,
    begidx: usize,
    endidx: usize,
    tokens: &[String],
  ) -> Result<CompletionOutcome, ProviderError> {
    let preceding = tokens.split_last().map_or(&[][..], |(_, preceding)| preceding);
    let mut replay = Replay::new(self.grammar, self.options.abbreviation_allowed);

    for (idx, token) in preceding.iter().enumerate() {
      match replay.step(token) {
        Err(malformed) => {
          tracing::debug!(%malformed, "malformed command line");
          return Ok(CompletionOutcome::Error(malformed));
        },
        Ok(Step::Subcommand { command, .. }) => {
          tracing::debug!(
            prog = %self.grammar.prog,
            subcommand = %command.name,
            "delegating completion to subcommand"
          );
          let mut parent_tokens = self.parent_tokens.clone();
          parent_tokens.extend(replay.arg_tokens());
          let completer = Completer::new(&command.grammar, self.options).with_parent_tokens(parent_tokens);
          return completer.complete(text, line, begidx, endidx, &tokens[idx + 1..]);
        },
        Ok(Step::UnknownSubcommand(_)) => return Ok(CompletionOutcome::Empty),
        Ok(_) => {},
      }
    }

    let mut arg_tokens = self.parent_tokens.clone();
    arg_tokens.extend(replay.arg_tokens());
    let context = CompletionContext {
      text,
      line,
      begidx,
      endidx,
      arg_tokens: &arg_tokens,
    };
    self.complete_last(&replay, &context)
  }

  fn complete_last(
    &self,
    replay: &Replay<'_>,
    context: &CompletionContext<'_>,
  ) -> Result<CompletionOutcome, ProviderError> {
    let text = context.text;
    let grammar = self.grammar;

    if !replay.skip_flags && grammar.looks_like_flag(text) {
      if let Some(state) = replay.unfinished_flag() {
        let malformed = Malformed::unfinished(grammar, state);
        tracing::debug!(%malformed, "flag is missing values");
        return Ok(CompletionOutcome::Error(malformed));
      }
      return Ok(self.complete_flags(text, replay));
    }

    if let Some(state) = replay.flag_state {
      let completions = self.complete_argument(state, replay, context)?;
      if !completions.is_empty() {
        return Ok(CompletionOutcome::Candidates(completions));
      }
      if state.is_unfinished() || !grammar.is_single_prefix(text) || replay.skip_flags {
        return Ok(self.hint(state));
      }
    } else if let Some(state) = replay.next_positional() {
      let completions = self.complete_argument(state, replay, context)?;
      if !completions.is_empty() {
        return Ok(CompletionOutcome::Candidates(completions));
      }
      if !grammar.is_single_prefix(text) || replay.skip_flags {
        return Ok(self.hint(state));
      }
    }

    if !replay.skip_flags && grammar.is_single_prefix(text) {
      return Ok(self.complete_flags(text, replay));
    }
    Ok(CompletionOutcome::Empty)
  }

  /// Flag aliases starting with `text`, grouped per argument for display.
  fn complete_flags(&self, text: &str, replay: &Replay<'_>) -> CompletionOutcome {
    let mut groups: IndexMap<ArgId, Vec<&str>> = IndexMap::new();
    for (alias, id) in self.grammar.flag_aliases() {
      let argument = self.grammar.argument(id);
      if argument.hidden || replay.is_matched(id) || !self.options.matches_prefix(alias, text) {
        continue;
      }
      groups.entry(id).or_default().push(alias);
    }
    if groups.is_empty() {
      return CompletionOutcome::Empty;
    }

    let candidates = groups
      .values()
      .flatten()
      .map(|alias| Candidate::new(*alias))
      .collect();
    let display = groups
      .iter()
      .map(|(id, aliases)| {
        let aliases = aliases.join(", ");
        if self.grammar.argument(*id).is_required() {
          aliases
        } else {
          format!("[{aliases}]")
        }
      })
      .collect();

    CompletionOutcome::Candidates(Completions {
      candidates,
      display,
      ..Completions::default()
    })
  }

  fn complete_argument(
    &self,
    state: ArgumentState,
    replay: &Replay<'_>,
    context: &CompletionContext<'_>,
  ) -> Result<Completions, ProviderError> {
    let argument = self.grammar.argument(state.id);
    let resolved = self
      .grammar
      .resolve_choices(state.id, replay.consumed(state.id), context)?;

    let mut candidates: Vec<Candidate> = resolved
      .candidates
      .into_iter()
      .filter(|candidate| self.options.matches_prefix(&candidate.value, context.text))
      .collect();
    let mut sorted = resolved.presorted;

    if !sorted && !candidates.is_empty() {
      let numbers: Option<Vec<f64>> = candidates
        .iter()
        .map(|candidate| parse_number(&candidate.value))
        .collect();
      if let Some(numbers) = numbers {
        let mut keyed: Vec<_> = numbers.into_iter().zip(candidates).collect();
        keyed.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        candidates = keyed.into_iter().map(|(_, candidate)| candidate).collect();
        sorted = true;
      }
    }

    Ok(Completions {
      candidates,
      display: Vec::new(),
      sorted,
      metavar: Some(argument.header_name()),
      descriptive_header: argument.descriptive_header.clone(),
    })
  }

  fn hint(&self, state: ArgumentState) -> CompletionOutcome {
    let argument = self.grammar.argument(state.id);
    if argument.hidden || argument.suppress_hint {
      return CompletionOutcome::Empty;
    }

    let invocation = argument.invocation();
    match &argument.help {
      Some(help) => CompletionOutcome::Hint(format!("Hint:\n  {invocation}  {help}")),
      None if state.is_unfinished() => CompletionOutcome::Hint(format!("Hint:\n  {invocation}")),
      None => CompletionOutcome::Empty,
    }
  }
}
