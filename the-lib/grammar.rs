//! Declarative description of a command's arguments.
//!
//! A [`Grammar`] lists the flags and positionals a command accepts, the number
//! of values each one takes ([`Nargs`]) and where completion candidates for
//! those values come from ([`Choices`]). The last positional may instead be a
//! set of [`Subcommands`], each carrying a nested grammar of its own.
//!
//! Grammars are built once with a [`GrammarBuilder`], which rejects structural
//! mistakes up front, and are read-only afterwards.
//!
//! ```ignore
//! let grammar = Grammar::builder("suggest")
//!   .argument(
//!     Argument::flag(["-t", "--type"])
//!       .required()
//!       .choices(Choices::from_values(["movie", "show"]))
//!       .help("what to suggest"),
//!   )
//!   .argument(Argument::flag(["-d", "--duration"]).nargs(Nargs::Range(1, Some(2))))
//!   .build()?;
//! ```

use std::{
  fmt,
  slice,
  sync::Arc,
};

use indexmap::IndexMap;
use the_core::{
  chars::{
    DEFAULT_PREFIX_CHARS,
    char_is_prefix,
  },
  grapheme::{
    display_width,
    pad_to_width,
  },
};
use thiserror::Error;

use crate::completion::CompletionContext;

/// Failure raised by application code that supplies choices.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;
pub type ProviderResult = Result<Vec<Candidate>, ProviderError>;

pub type ProviderFn = Arc<dyn Fn() -> ProviderResult + Send + Sync>;
pub type CompleterFn = Arc<dyn Fn(&CompletionContext<'_>) -> ProviderResult + Send + Sync>;

// Invocations wider than this put their help text on the next line.
const MAX_HELP_POSITION: usize = 24;

/// A completion value, optionally paired with a description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
  pub value:       String,
  pub description: Option<String>,
}

impl Candidate {
  pub fn new(value: impl Into<String>) -> Self {
    Self {
      value:       value.into(),
      description: None,
    }
  }

  pub fn described(value: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      value:       value.into(),
      description: Some(description.into()),
    }
  }
}

impl From<&str> for Candidate {
  fn from(value: &str) -> Self {
    Self::new(value)
  }
}

impl From<String> for Candidate {
  fn from(value: String) -> Self {
    Self::new(value)
  }
}

impl From<(&str, &str)> for Candidate {
  fn from((value, description): (&str, &str)) -> Self {
    Self::described(value, description)
  }
}

impl From<(String, String)> for Candidate {
  fn from((value, description): (String, String)) -> Self {
    Self::described(value, description)
  }
}

/// How many values an argument consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nargs {
  Exactly(usize),
  /// Zero or one value.
  Optional,
  ZeroOrMore,
  OneOrMore,
  /// At least `min` values and at most `max`, unbounded when `max` is `None`.
  Range(usize, Option<usize>),
  /// Every remaining token, including ones that look like flags.
  Remainder,
}

impl Nargs {
  pub fn min(self) -> usize {
    match self {
      Self::Exactly(n) => n,
      Self::Optional | Self::ZeroOrMore | Self::Remainder => 0,
      Self::OneOrMore => 1,
      Self::Range(min, _) => min,
    }
  }

  pub fn max(self) -> Option<usize> {
    match self {
      Self::Exactly(n) => Some(n),
      Self::Optional => Some(1),
      Self::ZeroOrMore | Self::OneOrMore | Self::Remainder => None,
      Self::Range(_, max) => max,
    }
  }

  pub fn is_remainder(self) -> bool {
    self == Self::Remainder
  }

  /// Renders the values this arity accepts, e.g. `FILE [FILE ...]`.
  pub fn format(self, metavar: &str) -> String {
    match self {
      Self::Exactly(0) => String::new(),
      Self::Exactly(n) => vec![metavar; n].join(" "),
      Self::Optional => format!("[{metavar}]"),
      Self::ZeroOrMore => format!("[{metavar} ...]"),
      Self::OneOrMore => format!("{metavar} [{metavar} ...]"),
      Self::Range(min, Some(max)) => format!("{metavar}{{{min}..{max}}}"),
      Self::Range(min, None) => format!("{metavar}{{{min}..}}"),
      Self::Remainder => "...".to_string(),
    }
  }
}

/// What a flag does when it appears on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgAction {
  /// Keep the values of the last occurrence.
  #[default]
  Store,
  /// Takes no values; records that the flag was given.
  StoreTrue,
  /// Takes no values; counts occurrences, e.g. `-vvv`.
  Count,
  /// Collect the values of every occurrence.
  Append,
  /// Takes no values; appends the argument's constant on every occurrence.
  AppendConst,
  /// Takes no values; asks for the command's help text.
  Help,
}

impl ArgAction {
  pub fn takes_values(self) -> bool {
    matches!(self, Self::Store | Self::Append)
  }

  /// Repeatable flags stay available for completion after they were used.
  pub fn is_repeatable(self) -> bool {
    matches!(self, Self::Count | Self::Append | Self::AppendConst)
  }
}

/// Where completion candidates for an argument's values come from.
#[derive(Clone, Default)]
pub enum Choices {
  #[default]
  None,
  Static(Vec<Candidate>),
  /// Computed on every completion, without context.
  Provider { fun: ProviderFn, presorted: bool },
  /// Computed on every completion from the text and line being completed.
  Completer { fun: CompleterFn, presorted: bool },
}

impl Choices {
  pub fn from_values<I, C>(values: I) -> Self
  where
    I: IntoIterator<Item = C>,
    C: Into<Candidate>,
  {
    Self::Static(values.into_iter().map(Into::into).collect())
  }

  pub fn provider(fun: impl Fn() -> ProviderResult + Send + Sync + 'static) -> Self {
    Self::Provider {
      fun:       Arc::new(fun),
      presorted: false,
    }
  }

  pub fn completer(
    fun: impl Fn(&CompletionContext<'_>) -> ProviderResult + Send + Sync + 'static,
  ) -> Self {
    Self::Completer {
      fun:       Arc::new(fun),
      presorted: false,
    }
  }

  /// Marks a provider's output as already ordered for display.
  pub fn presorted(self) -> Self {
    match self {
      Self::Provider { fun, .. } => Self::Provider {
        fun,
        presorted: true,
      },
      Self::Completer { fun, .. } => Self::Completer {
        fun,
        presorted: true,
      },
      choices => choices,
    }
  }

  pub fn is_presorted(&self) -> bool {
    matches!(
      self,
      Self::Provider {
        presorted: true,
        ..
      } | Self::Completer {
        presorted: true,
        ..
      }
    )
  }

  pub fn static_values(&self) -> Option<impl Iterator<Item = &str>> {
    match self {
      Self::Static(candidates) => Some(candidates.iter().map(|c| c.value.as_str())),
      _ => None,
    }
  }
}

impl fmt::Debug for Choices {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::None => f.write_str("None"),
      Self::Static(candidates) => f.debug_tuple("Static").field(candidates).finish(),
      Self::Provider { presorted, .. } => {
        f.debug_struct("Provider")
          .field("presorted", presorted)
          .finish_non_exhaustive()
      },
      Self::Completer { presorted, .. } => {
        f.debug_struct("Completer")
          .field("presorted", presorted)
          .finish_non_exhaustive()
      },
    }
  }
}

/// Candidates for one argument's values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedChoices {
  pub candidates: Vec<Candidate>,
  pub presorted:  bool,
}

#[derive(Debug, Clone)]
pub enum ArgKind {
  Flag { aliases: Vec<String> },
  Positional,
  Subcommands(Subcommands),
}

/// A flag, a positional or a subcommand selector.
///
/// Use [`Argument::flag`], [`Argument::positional`] or
/// [`Argument::subcommands`] and the builder methods to declare one.
#[derive(Debug, Clone)]
pub struct Argument {
  pub kind:               ArgKind,
  /// Name values are stored under. Derived from the longest alias for flags
  /// when left empty.
  pub dest:               String,
  pub nargs:              Nargs,
  pub action:             ArgAction,
  pub choices:            Choices,
  pub help:               Option<String>,
  pub metavar:            Option<String>,
  /// Label shown above candidate descriptions for this argument.
  pub descriptive_header: Option<String>,
  /// Value appended by [`ArgAction::AppendConst`].
  pub constant:           Option<String>,
  pub required:           bool,
  /// Hidden arguments are never offered by completion and left out of help.
  pub hidden:             bool,
  pub suppress_hint:      bool,
}

impl Argument {
  fn new(kind: ArgKind, dest: String) -> Self {
    Self {
      kind,
      dest,
      nargs: Nargs::Exactly(1),
      action: ArgAction::Store,
      choices: Choices::None,
      help: None,
      metavar: None,
      descriptive_header: None,
      constant: None,
      required: false,
      hidden: false,
      suppress_hint: false,
    }
  }

  pub fn flag<I, S>(aliases: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let aliases = aliases.into_iter().map(Into::into).collect();
    Self::new(ArgKind::Flag { aliases }, String::new())
  }

  pub fn positional(name: impl Into<String>) -> Self {
    Self::new(ArgKind::Positional, name.into())
  }

  pub fn subcommands(subcommands: Subcommands) -> Self {
    let dest = subcommands.dest.clone();
    let mut argument = Self::new(ArgKind::Subcommands(subcommands), dest);
    argument.required = true;
    argument
  }

  pub fn nargs(mut self, nargs: Nargs) -> Self {
    self.nargs = nargs;
    self
  }

  pub fn action(mut self, action: ArgAction) -> Self {
    self.action = action;
    self
  }

  pub fn choices(mut self, choices: Choices) -> Self {
    self.choices = choices;
    self
  }

  pub fn help(mut self, help: impl Into<String>) -> Self {
    self.help = Some(help.into());
    self
  }

  pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
    self.metavar = Some(metavar.into());
    self
  }

  pub fn dest(mut self, dest: impl Into<String>) -> Self {
    self.dest = dest.into();
    self
  }

  pub fn descriptive_header(mut self, header: impl Into<String>) -> Self {
    self.descriptive_header = Some(header.into());
    self
  }

  pub fn constant(mut self, constant: impl Into<String>) -> Self {
    self.constant = Some(constant.into());
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  /// Lets a subcommand selector be left out.
  pub fn optional(mut self) -> Self {
    self.required = false;
    self
  }

  pub fn hidden(mut self) -> Self {
    self.hidden = true;
    self
  }

  pub fn suppress_hint(mut self) -> Self {
    self.suppress_hint = true;
    self
  }

  pub fn aliases(&self) -> &[String] {
    match &self.kind {
      ArgKind::Flag { aliases } => aliases,
      _ => &[],
    }
  }

  pub fn is_flag(&self) -> bool {
    matches!(self.kind, ArgKind::Flag { .. })
  }

  pub fn subcommand_set(&self) -> Option<&Subcommands> {
    match &self.kind {
      ArgKind::Subcommands(subcommands) => Some(subcommands),
      _ => None,
    }
  }

  pub fn min_args(&self) -> usize {
    match self.kind {
      ArgKind::Subcommands(_) => 1,
      _ if !self.action.takes_values() => 0,
      _ => self.nargs.min(),
    }
  }

  pub fn max_args(&self) -> Option<usize> {
    match self.kind {
      ArgKind::Subcommands(_) => Some(1),
      _ if !self.action.takes_values() => Some(0),
      _ => self.nargs.max(),
    }
  }

  pub fn is_remainder(&self) -> bool {
    self.action.takes_values() && self.nargs.is_remainder()
  }

  pub fn is_required(&self) -> bool {
    match self.kind {
      ArgKind::Positional => self.min_args() > 0,
      _ => self.required,
    }
  }

  /// The name used in error messages: `-t/--type` or `item`.
  pub fn display_name(&self) -> String {
    match &self.kind {
      ArgKind::Flag { aliases } => aliases.join("/"),
      _ => self.metavar.clone().unwrap_or_else(|| self.dest.clone()),
    }
  }

  /// The placeholder for this argument's values in usage and hints.
  pub fn metavar_or_default(&self) -> String {
    if let Some(metavar) = &self.metavar {
      return metavar.clone();
    }
    if let Some(values) = self.choices.static_values() {
      return format!("{{{}}}", values.collect::<Vec<_>>().join(","));
    }
    match &self.kind {
      ArgKind::Flag { .. } => self.dest.to_uppercase(),
      ArgKind::Positional => self.dest.clone(),
      ArgKind::Subcommands(subcommands) => {
        let names: Vec<_> = subcommands.iter().map(|c| c.name.as_str()).collect();
        format!("{{{}}}", names.join(","))
      },
    }
  }

  /// The column header above this argument's candidates.
  pub fn header_name(&self) -> String {
    self
      .metavar
      .as_deref()
      .unwrap_or(&self.dest)
      .to_uppercase()
  }

  pub fn format_args(&self) -> String {
    let metavar = self.metavar_or_default();
    match self.kind {
      ArgKind::Subcommands(_) => format!("{metavar} ..."),
      _ if !self.action.takes_values() => String::new(),
      _ => self.nargs.format(&metavar),
    }
  }

  /// How the argument is written on a command line, e.g. `-t, --type TYPE`.
  pub fn invocation(&self) -> String {
    let args = self.format_args();
    match &self.kind {
      ArgKind::Flag { aliases } if args.is_empty() => aliases.join(", "),
      ArgKind::Flag { aliases } => format!("{} {args}", aliases.join(", ")),
      ArgKind::Positional => self.metavar_or_default(),
      ArgKind::Subcommands(_) => self.metavar_or_default(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Subcommand {
  pub name:    String,
  pub help:    Option<String>,
  pub grammar: Grammar,
}

/// A positional that selects a nested grammar by name.
#[derive(Debug, Clone)]
pub struct Subcommands {
  pub dest: String,
  commands: Vec<Subcommand>,
  aliases:  Vec<(String, String)>,
}

impl Subcommands {
  pub fn new(dest: impl Into<String>) -> Self {
    Self {
      dest:     dest.into(),
      commands: Vec::new(),
      aliases:  Vec::new(),
    }
  }

  pub fn command(self, name: impl Into<String>, grammar: Grammar) -> Self {
    self.push(name.into(), None, grammar)
  }

  pub fn command_with_help(
    self,
    name: impl Into<String>,
    help: impl Into<String>,
    grammar: Grammar,
  ) -> Self {
    self.push(name.into(), Some(help.into()), grammar)
  }

  fn push(mut self, name: String, help: Option<String>, grammar: Grammar) -> Self {
    self.commands.push(Subcommand {
      name,
      help,
      grammar,
    });
    self
  }

  pub fn alias(mut self, alias: impl Into<String>, name: impl Into<String>) -> Self {
    self.aliases.push((alias.into(), name.into()));
    self
  }

  pub fn iter(&self) -> slice::Iter<'_, Subcommand> {
    self.commands.iter()
  }

  /// Finds the subcommand selected by `token`, by name or alias.
  pub fn get(&self, token: &str) -> Option<&Subcommand> {
    let name = self
      .aliases
      .iter()
      .find(|(alias, _)| alias == token)
      .map_or(token, |(_, name)| name.as_str());
    self.commands.iter().find(|command| command.name == name)
  }

  /// Names and aliases, in declaration order.
  pub fn candidates(&self) -> Vec<Candidate> {
    let names = self.commands.iter().map(|command| {
      Candidate {
        value:       command.name.clone(),
        description: command.help.clone(),
      }
    });
    let aliases = self.aliases.iter().map(|(alias, _)| Candidate::new(alias.as_str()));
    names.chain(aliases).collect()
  }

  fn validate(&self) -> Result<(), GrammarError> {
    let mut seen: Vec<&str> = Vec::new();
    let names = self
      .commands
      .iter()
      .map(|command| command.name.as_str())
      .chain(self.aliases.iter().map(|(alias, _)| alias.as_str()));
    for name in names {
      if seen.contains(&name) {
        return Err(GrammarError::DuplicateSubcommand {
          name: name.to_string(),
        });
      }
      seen.push(name);
    }

    for (alias, name) in &self.aliases {
      if !self.commands.iter().any(|command| &command.name == name) {
        return Err(GrammarError::UnknownAliasTarget {
          alias: alias.clone(),
          name:  name.clone(),
        });
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
  #[error("argument '{name}': invalid nargs range {min}..{max}, the maximum must exceed the minimum")]
  InvalidRange {
    name: String,
    min:  usize,
    max:  usize,
  },
  #[error(
    "positional '{name}' takes an unbounded number of values or selects a subcommand, so it must \
     be the last positional"
  )]
  UnboundedNotLast { name: String },
  #[error("flag alias '{alias}' is declared more than once")]
  DuplicateAlias { alias: String },
  #[error("flag alias '{alias}' must start with one of '{prefix_chars}' followed by a name")]
  InvalidFlagAlias {
    alias:        String,
    prefix_chars: String,
  },
  #[error("a flag must declare at least one alias")]
  MissingAlias,
  #[error("subcommand '{name}' is declared more than once")]
  DuplicateSubcommand { name: String },
  #[error("subcommand alias '{alias}' refers to unknown subcommand '{name}'")]
  UnknownAliasTarget { alias: String, name: String },
  #[error("positional '{name}' uses {action:?}, which takes no values")]
  ValuelessPositional { name: String, action: ArgAction },
  #[error("mutually exclusive group member '{name}' is not an argument")]
  UnknownExclusiveMember { name: String },
  #[error("positional '{name}' is required so it cannot be in a mutually exclusive group")]
  PositionalInExclusiveGroup { name: String },
}

/// Index of an argument within its [`Grammar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(usize);

/// A command's flags, positionals and subcommands.
#[derive(Debug, Clone)]
pub struct Grammar {
  pub prog:                  String,
  pub description:           Option<String>,
  prefix_chars:              String,
  arguments:                 Vec<Argument>,
  /// Every flag alias, in declaration order.
  flags:                     IndexMap<String, ArgId>,
  positionals:               Vec<ArgId>,
  groups:                    Vec<Vec<ArgId>>,
  has_negative_number_flags: bool,
}

impl Grammar {
  pub fn builder(prog: impl Into<String>) -> GrammarBuilder {
    GrammarBuilder::new(prog)
  }

  pub fn prefix_chars(&self) -> &str {
    &self.prefix_chars
  }

  pub fn has_negative_number_flags(&self) -> bool {
    self.has_negative_number_flags
  }

  pub fn argument(&self, id: ArgId) -> &Argument {
    &self.arguments[id.0]
  }

  pub fn arguments(&self) -> impl Iterator<Item = (ArgId, &Argument)> {
    self
      .arguments
      .iter()
      .enumerate()
      .map(|(idx, argument)| (ArgId(idx), argument))
  }

  /// Finds an argument by the name its values are stored under.
  pub fn find(&self, dest: &str) -> Option<ArgId> {
    self.arguments().find(|(_, arg)| arg.dest == dest).map(|(id, _)| id)
  }

  /// Every flag alias, in declaration order.
  pub fn flags(&self) -> impl Iterator<Item = &str> {
    self.flags.keys().map(String::as_str)
  }

  pub(crate) fn flag_aliases(&self) -> impl Iterator<Item = (&str, ArgId)> {
    self.flags.iter().map(|(alias, id)| (alias.as_str(), *id))
  }

  pub fn positionals(&self) -> impl Iterator<Item = &Argument> {
    self.positionals.iter().map(|id| self.argument(*id))
  }

  pub(crate) fn positional_ids(&self) -> &[ArgId] {
    &self.positionals
  }

  pub(crate) fn groups(&self) -> &[Vec<ArgId>] {
    &self.groups
  }

  pub fn subcommands(&self) -> Option<&Subcommands> {
    self.positionals().find_map(Argument::subcommand_set)
  }

  /// Resolves a flag token to its argument.
  ///
  /// An exact alias always wins. Otherwise, when abbreviations are allowed, a
  /// prefix resolves if every alias starting with it belongs to the same
  /// argument.
  pub fn lookup_flag(&self, token: &str, abbreviation_allowed: bool) -> Option<ArgId> {
    if let Some(id) = self.flags.get(token) {
      return Some(*id);
    }
    if !abbreviation_allowed || !self.looks_like_flag(token) {
      return None;
    }

    let mut matches = self
      .flags
      .iter()
      .filter(|(alias, _)| alias.starts_with(token))
      .map(|(_, id)| *id);
    let first = matches.next()?;
    matches.all(|id| id == first).then_some(first)
  }

  /// Whether `token` should be read as a flag rather than a value.
  pub fn looks_like_flag(&self, token: &str) -> bool {
    let mut chars = token.chars();
    let (Some(first), Some(_)) = (chars.next(), chars.next()) else {
      return false;
    };
    if !char_is_prefix(first, &self.prefix_chars) {
      return false;
    }
    if is_negative_number(token) && !self.has_negative_number_flags {
      return false;
    }
    !token.contains(' ')
  }

  /// Whether `text` is a lone prefix character such as `-`.
  pub fn is_single_prefix(&self, text: &str) -> bool {
    let mut chars = text.chars();
    matches!(
      (chars.next(), chars.next()),
      (Some(ch), None) if char_is_prefix(ch, &self.prefix_chars)
    )
  }

  /// Collects the candidates for an argument's values, leaving out `consumed`.
  ///
  /// Errors raised by the argument's provider are returned unchanged.
  pub fn resolve_choices(
    &self,
    id: ArgId,
    consumed: &[String],
    context: &CompletionContext<'_>,
  ) -> Result<ResolvedChoices, ProviderError> {
    let argument = self.argument(id);
    let (mut candidates, presorted) = match (&argument.kind, &argument.choices) {
      (ArgKind::Subcommands(subcommands), _) => (subcommands.candidates(), false),
      (_, Choices::None) => (Vec::new(), false),
      (_, Choices::Static(candidates)) => (candidates.clone(), false),
      (_, Choices::Provider { fun, presorted }) => (fun()?, *presorted),
      (_, Choices::Completer { fun, presorted }) => (fun(context)?, *presorted),
    };

    candidates.retain(|candidate| !consumed.contains(&candidate.value));
    Ok(ResolvedChoices {
      candidates,
      presorted,
    })
  }

  /// A one line summary such as `usage: suggest -t {movie,show} [-d D{1..2}]`.
  pub fn usage(&self) -> String {
    let mut parts = vec![self.prog.clone()];

    for argument in self.arguments.iter().filter(|arg| arg.is_flag() && !arg.hidden) {
      let alias = argument.aliases().first().map_or("", String::as_str);
      let args = argument.format_args();
      let part = if args.is_empty() {
        alias.to_string()
      } else {
        format!("{alias} {args}")
      };
      parts.push(if argument.is_required() {
        part
      } else {
        format!("[{part}]")
      });
    }

    for argument in self.positionals().filter(|arg| !arg.hidden) {
      parts.push(argument.format_args());
    }

    format!("usage: {}", parts.join(" "))
  }

  /// The full help text: usage, description and one entry per argument.
  pub fn help(&self) -> String {
    let mut positional_rows = Vec::new();
    for argument in self.positionals().filter(|arg| !arg.hidden) {
      positional_rows.push((argument.invocation(), argument.help.clone()));
      if let Some(subcommands) = argument.subcommand_set() {
        for command in subcommands.iter() {
          positional_rows.push((format!("  {}", command.name), command.help.clone()));
        }
      }
    }
    let option_rows: Vec<_> = self
      .arguments
      .iter()
      .filter(|arg| arg.is_flag() && !arg.hidden)
      .map(|arg| (arg.invocation(), arg.help.clone()))
      .collect();

    let width = positional_rows
      .iter()
      .chain(&option_rows)
      .map(|(invocation, _)| display_width(invocation))
      .filter(|width| *width <= MAX_HELP_POSITION)
      .max()
      .unwrap_or(0);

    let mut help = self.usage();
    if let Some(description) = &self.description {
      help.push_str("\n\n");
      help.push_str(description);
    }
    for (title, rows) in [
      ("positional arguments", &positional_rows),
      ("options", &option_rows),
    ] {
      if rows.is_empty() {
        continue;
      }
      help.push_str(&format!("\n\n{title}:"));
      for (invocation, text) in rows {
        help.push_str("\n  ");
        match text {
          None => help.push_str(invocation),
          Some(text) if display_width(invocation) > width => {
            help.push_str(invocation);
            help.push_str("\n  ");
            help.push_str(&" ".repeat(width + 2));
            help.push_str(text);
          },
          Some(text) => {
            help.push_str(&pad_to_width(invocation, width));
            help.push_str("  ");
            help.push_str(text);
          },
        }
      }
    }
    help
  }

  fn rename(&mut self, prog: String) {
    self.prog = prog;
    let parent = self.prog.clone();
    for argument in &mut self.arguments {
      if let ArgKind::Subcommands(subcommands) = &mut argument.kind {
        for command in &mut subcommands.commands {
          command
            .grammar
            .rename(format!("{parent} {}", command.name));
        }
      }
    }
  }
}

/// Builds a [`Grammar`], validating it on [`GrammarBuilder::build`].
#[derive(Debug)]
pub struct GrammarBuilder {
  prog:         String,
  description:  Option<String>,
  prefix_chars: String,
  arguments:    Vec<Argument>,
  groups:       Vec<Vec<String>>,
  help_flag:    bool,
}

impl GrammarBuilder {
  pub fn new(prog: impl Into<String>) -> Self {
    Self {
      prog:         prog.into(),
      description:  None,
      prefix_chars: DEFAULT_PREFIX_CHARS.to_string(),
      arguments:    Vec::new(),
      groups:       Vec::new(),
      help_flag:    false,
    }
  }

  pub fn description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// Characters that start a flag. Defaults to `-`.
  pub fn prefix_chars(mut self, prefix_chars: impl Into<String>) -> Self {
    self.prefix_chars = prefix_chars.into();
    self
  }

  pub fn argument(mut self, argument: Argument) -> Self {
    self.arguments.push(argument);
    self
  }

  pub fn subcommands(self, subcommands: Subcommands) -> Self {
    self.argument(Argument::subcommands(subcommands))
  }

  /// Declares arguments, by name, of which at most one may be given.
  pub fn exclusive<S: AsRef<str>>(mut self, names: &[S]) -> Self {
    self
      .groups
      .push(names.iter().map(|name| name.as_ref().to_string()).collect());
    self
  }

  /// Adds `-h, --help` in front of the declared arguments.
  pub fn help_flag(mut self) -> Self {
    self.help_flag = true;
    self
  }

  pub fn build(self) -> Result<Grammar, GrammarError> {
    let Self {
      prog,
      description,
      prefix_chars,
      mut arguments,
      groups,
      help_flag,
    } = self;

    if help_flag {
      let prefix = prefix_chars.chars().next().unwrap_or('-');
      arguments.insert(
        0,
        Argument::flag([format!("{prefix}h"), format!("{prefix}{prefix}help")])
          .action(ArgAction::Help)
          .help("show this help message and exit"),
      );
    }

    let mut flags = IndexMap::new();
    let mut positionals = Vec::new();
    let mut has_negative_number_flags = false;

    for (idx, argument) in arguments.iter_mut().enumerate() {
      let id = ArgId(idx);
      match &argument.kind {
        ArgKind::Flag { aliases } => {
          if aliases.is_empty() {
            return Err(GrammarError::MissingAlias);
          }
          for alias in aliases {
            if !is_valid_alias(alias, &prefix_chars) {
              return Err(GrammarError::InvalidFlagAlias {
                alias:        alias.clone(),
                prefix_chars: prefix_chars.clone(),
              });
            }
            if flags.insert(alias.clone(), id).is_some() {
              return Err(GrammarError::DuplicateAlias {
                alias: alias.clone(),
              });
            }
            has_negative_number_flags |= is_negative_number(alias);
          }
          if argument.dest.is_empty() {
            argument.dest = flag_dest(aliases, &prefix_chars);
          }
        },
        ArgKind::Positional => {
          if !argument.action.takes_values() {
            return Err(GrammarError::ValuelessPositional {
              name:   argument.dest.clone(),
              action: argument.action,
            });
          }
          positionals.push(id);
        },
        ArgKind::Subcommands(subcommands) => {
          subcommands.validate()?;
          positionals.push(id);
        },
      }

      let invalid_range = match argument.nargs {
        Nargs::Range(min, Some(max)) if max <= min => Some((min, max)),
        Nargs::Exactly(0) => Some((0, 0)),
        _ => None,
      };
      if argument.action.takes_values()
        && let Some((min, max)) = invalid_range
      {
        return Err(GrammarError::InvalidRange {
          name: argument.display_name(),
          min,
          max,
        });
      }
    }

    if let Some((_, leading)) = positionals.split_last() {
      for id in leading {
        let argument = &arguments[id.0];
        if argument.max_args().is_none() || argument.subcommand_set().is_some() {
          return Err(GrammarError::UnboundedNotLast {
            name: argument.dest.clone(),
          });
        }
      }
    }

    let mut resolved_groups = Vec::with_capacity(groups.len());
    for group in groups {
      let mut members = Vec::with_capacity(group.len());
      for name in group {
        let Some(idx) = arguments.iter().position(|arg| arg.dest == name) else {
          return Err(GrammarError::UnknownExclusiveMember { name });
        };
        if !arguments[idx].is_flag() && arguments[idx].min_args() > 0 {
          return Err(GrammarError::PositionalInExclusiveGroup { name });
        }
        members.push(ArgId(idx));
      }
      resolved_groups.push(members);
    }

    let mut grammar = Grammar {
      prog: String::new(),
      description,
      prefix_chars,
      arguments,
      flags,
      positionals,
      groups: resolved_groups,
      has_negative_number_flags,
    };
    grammar.rename(prog);
    Ok(grammar)
  }
}

/// Builds a grammar from separate flag and positional declarations.
pub fn build_grammar(
  prog: impl Into<String>,
  flags: impl IntoIterator<Item = Argument>,
  positionals: impl IntoIterator<Item = Argument>,
  subcommands: Option<Subcommands>,
) -> Result<Grammar, GrammarError> {
  let mut builder = Grammar::builder(prog);
  for argument in flags.into_iter().chain(positionals) {
    builder = builder.argument(argument);
  }
  if let Some(subcommands) = subcommands {
    builder = builder.subcommands(subcommands);
  }
  builder.build()
}

fn is_valid_alias(alias: &str, prefix_chars: &str) -> bool {
  let mut chars = alias.chars();
  matches!(chars.next(), Some(ch) if char_is_prefix(ch, prefix_chars))
    && alias.chars().count() >= 2
    && !alias.contains(char::is_whitespace)
}

/// `--dry-run` becomes `dry_run`; without a long alias the first one is used.
fn flag_dest(aliases: &[String], prefix_chars: &str) -> String {
  let is_long = |alias: &&String| {
    let mut chars = alias.chars();
    matches!(
      (chars.next(), chars.next(), chars.next()),
      (Some(a), Some(b), Some(_)) if char_is_prefix(a, prefix_chars) && char_is_prefix(b, prefix_chars)
    )
  };
  let alias = aliases
    .iter()
    .find(is_long)
    .or(aliases.first())
    .map_or("", String::as_str);
  alias
    .trim_start_matches(|ch| char_is_prefix(ch, prefix_chars))
    .replace('-', "_")
}

/// Matches `-5`, `-1.5` and `-.5`.
fn is_negative_number(token: &str) -> bool {
  let Some(number) = token.strip_prefix('-') else {
    return false;
  };
  let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
  match number.split_once('.') {
    None => !number.is_empty() && all_digits(number),
    Some((int, frac)) => all_digits(int) && !frac.is_empty() && all_digits(frac),
  }
}

#[cfg(test)]
mod test {
  use indexmap::IndexMap;

  use super::*;

  fn suggest() -> Grammar {
    Grammar::builder("suggest")
      .argument(
        Argument::flag(["-t", "--type"])
          .required()
          .choices(Choices::from_values(["movie", "show"]))
          .help("what to suggest"),
      )
      .argument(Argument::flag(["-d", "--duration"]).nargs(Nargs::Range(1, Some(2))))
      .argument(Argument::flag(["--dry-run"]).action(ArgAction::StoreTrue))
      .build()
      .unwrap()
  }

  fn context(arg_tokens: &IndexMap<String, Vec<String>>) -> CompletionContext<'_> {
    CompletionContext {
      text: "",
      line: "",
      begidx: 0,
      endidx: 0,
      arg_tokens,
    }
  }

  #[test]
  fn nargs_bounds() {
    assert_eq!((Nargs::Exactly(2).min(), Nargs::Exactly(2).max()), (2, Some(2)));
    assert_eq!((Nargs::Optional.min(), Nargs::Optional.max()), (0, Some(1)));
    assert_eq!((Nargs::OneOrMore.min(), Nargs::OneOrMore.max()), (1, None));
    assert_eq!(Nargs::Range(1, None).max(), None);
    assert!(Nargs::Remainder.is_remainder());

    assert_eq!(Nargs::Exactly(2).format("F"), "F F");
    assert_eq!(Nargs::ZeroOrMore.format("F"), "[F ...]");
    assert_eq!(Nargs::OneOrMore.format("F"), "F [F ...]");
    assert_eq!(Nargs::Range(1, Some(2)).format("D"), "D{1..2}");
  }

  #[test]
  fn derived_names() {
    let grammar = suggest();
    let type_flag = grammar.argument(grammar.find("type").unwrap());
    assert_eq!(type_flag.display_name(), "-t/--type");
    assert_eq!(type_flag.metavar_or_default(), "{movie,show}");
    assert_eq!(type_flag.invocation(), "-t, --type {movie,show}");

    let duration = grammar.argument(grammar.find("duration").unwrap());
    assert_eq!(duration.invocation(), "-d, --duration DURATION{1..2}");
    assert_eq!(duration.header_name(), "DURATION");

    let dry_run = grammar.argument(grammar.find("dry_run").unwrap());
    assert_eq!(dry_run.invocation(), "--dry-run");
    assert_eq!(dry_run.max_args(), Some(0));
  }

  #[test]
  fn lookup() {
    let grammar = suggest();
    let type_id = grammar.find("type");
    assert_eq!(grammar.lookup_flag("-t", false), type_id);
    assert_eq!(grammar.lookup_flag("--type", false), type_id);
    assert_eq!(grammar.lookup_flag("--ty", true), type_id);
    assert_eq!(grammar.lookup_flag("--ty", false), None);
    // `--d` could be `--duration` or `--dry-run`.
    assert_eq!(grammar.lookup_flag("--d", true), None);
    assert_eq!(grammar.lookup_flag("--du", true), grammar.find("duration"));
    assert_eq!(grammar.lookup_flag("--nope", true), None);
  }

  #[test]
  fn flag_shape() {
    let grammar = suggest();
    assert!(grammar.looks_like_flag("-t"));
    assert!(grammar.looks_like_flag("--anything"));
    assert!(!grammar.looks_like_flag("-"));
    assert!(!grammar.looks_like_flag("movie"));
    assert!(!grammar.looks_like_flag("-5"));
    assert!(!grammar.looks_like_flag("-1.5"));
    assert!(!grammar.looks_like_flag("-t movie"));

    assert!(grammar.is_single_prefix("-"));
    assert!(!grammar.is_single_prefix("--"));
    assert!(!grammar.is_single_prefix(""));

    let numeric = Grammar::builder("calc")
      .argument(Argument::flag(["-1"]).action(ArgAction::StoreTrue))
      .build()
      .unwrap();
    assert!(numeric.has_negative_number_flags());
    assert!(numeric.looks_like_flag("-5"));
  }

  #[test]
  fn custom_prefix_chars() {
    let grammar = Grammar::builder("dos")
      .prefix_chars("/")
      .argument(Argument::flag(["/q", "//quiet"]).action(ArgAction::StoreTrue))
      .help_flag()
      .build()
      .unwrap();
    assert!(grammar.looks_like_flag("/q"));
    assert!(!grammar.looks_like_flag("-q"));
    assert_eq!(grammar.flags().collect::<Vec<_>>(), ["/h", "//help", "/q", "//quiet"]);
    assert!(grammar.find("quiet").is_some());
  }

  #[test]
  fn separate_declarations() {
    let grammar = build_grammar(
      "library",
      [Argument::flag(["-u", "--user"])],
      [Argument::positional("shelf").nargs(Nargs::Optional)],
      None,
    )
    .unwrap();
    assert_eq!(grammar.flags().collect::<Vec<_>>(), ["-u", "--user"]);
    assert_eq!(grammar.positionals().map(|arg| arg.dest.as_str()).collect::<Vec<_>>(), ["shelf"]);
    assert!(grammar.subcommands().is_none());

    // The subcommand positional goes last, after the declared ones.
    let add = Grammar::builder("add").build().unwrap();
    let grammar = build_grammar(
      "library",
      [],
      [Argument::positional("shelf")],
      Some(Subcommands::new("action").command("add", add)),
    )
    .unwrap();
    assert_eq!(grammar.positionals().count(), 2);
    assert_eq!(grammar.subcommands().unwrap().get("add").unwrap().grammar.prog, "library add");

    let unbounded = build_grammar(
      "x",
      [],
      [Argument::positional("files").nargs(Nargs::ZeroOrMore)],
      Some(Subcommands::new("action")),
    );
    assert!(matches!(unbounded, Err(GrammarError::UnboundedNotLast { .. })));
  }

  #[test]
  fn invalid_grammars() {
    let range = Grammar::builder("x")
      .argument(Argument::flag(["-r"]).nargs(Nargs::Range(3, Some(2))))
      .build();
    assert!(matches!(range, Err(GrammarError::InvalidRange { min: 3, max: 2, .. })));

    let equal = Grammar::builder("x")
      .argument(Argument::positional("p").nargs(Nargs::Range(2, Some(2))))
      .build();
    assert!(matches!(equal, Err(GrammarError::InvalidRange { .. })));

    let zero = Grammar::builder("x")
      .argument(Argument::flag(["-z"]).nargs(Nargs::Exactly(0)))
      .build();
    assert!(matches!(zero, Err(GrammarError::InvalidRange { .. })));

    let unbounded = Grammar::builder("x")
      .argument(Argument::positional("files").nargs(Nargs::OneOrMore))
      .argument(Argument::positional("dest"))
      .build();
    assert_eq!(
      unbounded.unwrap_err(),
      GrammarError::UnboundedNotLast {
        name: "files".to_string(),
      }
    );

    let subcommand_first = Grammar::builder("x")
      .subcommands(Subcommands::new("cmd"))
      .argument(Argument::positional("after"))
      .build();
    assert!(matches!(subcommand_first, Err(GrammarError::UnboundedNotLast { .. })));

    let duplicate = Grammar::builder("x")
      .argument(Argument::flag(["-a", "--all"]))
      .argument(Argument::flag(["-a"]))
      .build();
    assert_eq!(
      duplicate.unwrap_err(),
      GrammarError::DuplicateAlias {
        alias: "-a".to_string(),
      }
    );

    let no_prefix = Grammar::builder("x").argument(Argument::flag(["all"])).build();
    assert!(matches!(no_prefix, Err(GrammarError::InvalidFlagAlias { .. })));

    let bare = Grammar::builder("x")
      .argument(Argument::flag(Vec::<String>::new()))
      .build();
    assert_eq!(bare.unwrap_err(), GrammarError::MissingAlias);

    let switch = Grammar::builder("x")
      .argument(Argument::positional("verbose").action(ArgAction::Count))
      .build();
    assert_eq!(
      switch.unwrap_err(),
      GrammarError::ValuelessPositional {
        name:   "verbose".to_string(),
        action: ArgAction::Count,
      }
    );
    let appended = Grammar::builder("x")
      .argument(Argument::positional("files").action(ArgAction::Append).nargs(Nargs::ZeroOrMore))
      .build();
    assert!(appended.is_ok());
  }

  #[test]
  fn invalid_subcommands_and_groups() {
    let leaf = || Grammar::builder("leaf").build().unwrap();

    let duplicate = Grammar::builder("x")
      .subcommands(
        Subcommands::new("cmd")
          .command("add", leaf())
          .command("rm", leaf())
          .alias("add", "rm"),
      )
      .build();
    assert!(matches!(duplicate, Err(GrammarError::DuplicateSubcommand { .. })));

    let dangling = Grammar::builder("x")
      .subcommands(Subcommands::new("cmd").alias("a", "add"))
      .build();
    assert!(matches!(dangling, Err(GrammarError::UnknownAliasTarget { .. })));

    let unknown = Grammar::builder("x")
      .argument(Argument::flag(["-a"]))
      .exclusive(&["a", "b"])
      .build();
    assert_eq!(
      unknown.unwrap_err(),
      GrammarError::UnknownExclusiveMember {
        name: "b".to_string(),
      }
    );

    let required = Grammar::builder("x")
      .argument(Argument::flag(["-a"]))
      .argument(Argument::positional("p"))
      .exclusive(&["a", "p"])
      .build();
    assert!(matches!(required, Err(GrammarError::PositionalInExclusiveGroup { .. })));

    let optional = Grammar::builder("x")
      .argument(Argument::flag(["-a"]))
      .argument(Argument::positional("p").nargs(Nargs::Optional))
      .exclusive(&["a", "p"])
      .build();
    assert!(optional.is_ok());
  }

  #[test]
  fn subcommand_progs() {
    let grammar = Grammar::builder("library")
      .subcommands(
        Subcommands::new("action")
          .command_with_help("add", "add an item", Grammar::builder("add").build().unwrap())
          .command("remove", Grammar::builder("remove").build().unwrap())
          .alias("rm", "remove"),
      )
      .build()
      .unwrap();
    let subcommands = grammar.subcommands().unwrap();
    assert_eq!(subcommands.get("add").unwrap().grammar.prog, "library add");
    assert_eq!(subcommands.get("rm").unwrap().name, "remove");
    assert!(subcommands.get("re").is_none());
    assert_eq!(subcommands.candidates(), vec![
      Candidate::described("add", "add an item"),
      Candidate::new("remove"),
      Candidate::new("rm"),
    ]);
  }

  #[test]
  fn choices_resolution() {
    let grammar = Grammar::builder("x")
      .argument(
        Argument::flag(["-s"])
          .action(ArgAction::Append)
          .choices(Choices::from_values(["a", "b", "c"])),
      )
      .argument(
        Argument::flag(["-p"]).choices(Choices::provider(|| Ok(vec!["2".into(), "1".into()])).presorted()),
      )
      .argument(Argument::flag(["-c"]).choices(Choices::completer(|ctx| {
        Ok(vec![Candidate::new(format!("{}!", ctx.text))])
      })))
      .argument(Argument::flag(["-e"]).choices(Choices::provider(|| Err("database is down".into()))))
      .build()
      .unwrap();
    let arg_tokens = IndexMap::new();
    let ctx = context(&arg_tokens);

    let resolved = grammar
      .resolve_choices(grammar.find("s").unwrap(), &["b".to_string()], &ctx)
      .unwrap();
    assert_eq!(resolved.candidates, vec![Candidate::new("a"), Candidate::new("c")]);
    assert!(!resolved.presorted);

    let resolved = grammar.resolve_choices(grammar.find("p").unwrap(), &[], &ctx).unwrap();
    assert!(resolved.presorted);
    assert_eq!(resolved.candidates[0].value, "2");

    let resolved = grammar.resolve_choices(grammar.find("c").unwrap(), &[], &ctx).unwrap();
    assert_eq!(resolved.candidates, vec![Candidate::new("!")]);

    let err = grammar
      .resolve_choices(grammar.find("e").unwrap(), &[], &ctx)
      .unwrap_err();
    assert_eq!(err.to_string(), "database is down");
  }

  #[test]
  fn usage_and_help() {
    let grammar = suggest();
    assert_eq!(
      grammar.usage(),
      "usage: suggest -t {movie,show} [-d DURATION{1..2}] [--dry-run]"
    );

    let grammar = Grammar::builder("library")
      .description("Manage the library.")
      .help_flag()
      .argument(Argument::flag(["-q", "--quiet"]).action(ArgAction::StoreTrue))
      .subcommands(
        Subcommands::new("action")
          .command_with_help("add", "add an item", Grammar::builder("add").build().unwrap()),
      )
      .build()
      .unwrap();
    let expected = [
      "usage: library [-h] [-q] {add} ...",
      "",
      "Manage the library.",
      "",
      "positional arguments:",
      "  {add}",
      "    add        add an item",
      "",
      "options:",
      "  -h, --help   show this help message and exit",
      "  -q, --quiet",
    ];
    assert_eq!(grammar.help(), expected.join("\n"));
  }
}
