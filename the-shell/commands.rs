//! The commands of the demo shell.
//!
//! They exist to exercise the completion engine: static choices, numeric
//! choices, subcommands, choices computed from shared state, and free-form
//! argument lists.

use std::{
  collections::BTreeMap,
  io::Write,
  sync::{
    Arc,
    Mutex,
  },
};

use the_lib::{
  args::Args,
  grammar::{
    ArgAction,
    Argument,
    Candidate,
    Choices,
    Grammar,
    GrammarError,
    Nargs,
    Subcommands,
  },
};

use crate::registry::{
  Command,
  CommandError,
  CommandRegistry,
  CommandResult,
  ShellContext,
};

/// Items on the library shelves, by item id.
pub type Shelves = Arc<Mutex<BTreeMap<String, String>>>;

const CATALOG: &[(&str, &str)] = &[
  ("A1", "The Rust Programming Language"),
  ("A2", "Programming Rust"),
  ("B1", "Rust for Rustaceans"),
  ("B2", "Rust Atomics and Locks"),
  ("C1", "Zero To Production In Rust"),
];

/// State shared by the demo commands.
pub struct Session<W> {
  out:     W,
  shelves: Shelves,
}

impl<W: Write> Session<W> {
  pub fn new(out: W) -> Self {
    Self {
      out,
      shelves: Shelves::default(),
    }
  }

  pub fn shelves(&self) -> &Shelves {
    &self.shelves
  }

  pub fn into_output(self) -> W {
    self.out
  }
}

impl<W: Write> ShellContext for Session<W> {
  fn print(&mut self, text: &str) {
    if let Err(err) = writeln!(self.out, "{text}") {
      tracing::warn!(%err, "cannot write command output");
    }
  }
}

/// A registry with every demo command, sharing `shelves` with the session.
pub fn registry<W: Write + 'static>(
  shelves: &Shelves,
) -> Result<CommandRegistry<Session<W>>, GrammarError> {
  let mut registry = CommandRegistry::new();
  registry.register(Command::new(
    "suggest",
    &[],
    "suggest something to watch",
    suggest_grammar()?,
    suggest,
  ));
  registry.register(Command::new(
    "library",
    &["lib"],
    "manage the library shelves",
    library_grammar(shelves)?,
    library,
  ));
  registry.register(Command::new(
    "speak",
    &["say"],
    "repeat what you say",
    speak_grammar()?,
    speak,
  ));
  Ok(registry)
}

fn suggest_grammar() -> Result<Grammar, GrammarError> {
  Grammar::builder("suggest")
    .description("Suggests a movie or a show.")
    .help_flag()
    .argument(
      Argument::flag(["-t", "--type"])
        .required()
        .choices(Choices::from_values(["movie", "show"]))
        .help("what to suggest"),
    )
    .argument(
      Argument::flag(["-d", "--duration"])
        .nargs(Nargs::Range(1, Some(2)))
        .metavar("MINUTES")
        .choices(Choices::provider(|| {
          Ok(["90", "120", "30", "45", "60"].into_iter().map(Candidate::from).collect())
        }))
        .help("shortest and longest running time"),
    )
    .build()
}

fn suggest<W: Write>(
  session: &mut Session<W>,
  args: &Args,
  _: &CommandRegistry<Session<W>>,
) -> CommandResult {
  let kind = args.get("type").unwrap_or("movie");
  let minutes = args
    .get_all("duration")
    .iter()
    .map(|value| {
      value.parse::<u32>().map_err(|_| {
        CommandError::failed(format!("duration must be a number of minutes: {value}"))
      })
    })
    .collect::<Result<Vec<_>, _>>()?;

  let text = match minutes.as_slice() {
    [] => format!("suggesting a {kind}"),
    [max] => format!("suggesting a {kind} of at most {max} minutes"),
    [min, max, ..] => format!("suggesting a {kind} between {min} and {max} minutes"),
  };
  session.print(&text);
  Ok(())
}

fn library_grammar(shelves: &Shelves) -> Result<Grammar, GrammarError> {
  let add = Grammar::builder("add")
    .help_flag()
    .argument(
      Argument::positional("item_id")
        .choices(
          Choices::provider(|| {
            Ok(
              CATALOG
                .iter()
                .map(|(id, title)| Candidate::described(*id, *title))
                .collect(),
            )
          })
          .presorted(),
        )
        .descriptive_header("Title")
        .help("item to shelve"),
    )
    .argument(
      Argument::positional("shelf")
        .nargs(Nargs::Optional)
        .choices(Choices::from_values(["top", "middle", "bottom"]))
        .help("shelf to put it on"),
    )
    .build()?;

  let shelved = shelves.clone();
  let remove = Grammar::builder("remove")
    .help_flag()
    .argument(
      Argument::positional("item_id")
        .nargs(Nargs::OneOrMore)
        .choices(Choices::completer(move |context| {
          let shelves = shelved.lock().map_err(|_| "library shelves are unavailable")?;
          let chosen = context.arg_tokens.get("item_id");
          Ok(
            shelves
              .iter()
              .filter(|(id, _)| !chosen.is_some_and(|chosen| chosen.contains(id)))
              .map(|(id, shelf)| Candidate::described(id.as_str(), format!("on the {shelf} shelf")))
              .collect(),
          )
        }))
        .help("items to take off the shelves"),
    )
    .build()?;

  let list = Grammar::builder("list").help_flag().build()?;

  Grammar::builder("library")
    .help_flag()
    .argument(
      Argument::flag(["-u", "--user"])
        .choices(Choices::from_values(["alice", "bob"]))
        .help("who is asking"),
    )
    .subcommands(
      Subcommands::new("action")
        .command_with_help("add", "put an item on a shelf", add)
        .command_with_help("remove", "take items off the shelves", remove)
        .command_with_help("list", "show what is shelved", list)
        .alias("rm", "remove"),
    )
    .build()
}

fn library<W: Write>(
  session: &mut Session<W>,
  args: &Args,
  _: &CommandRegistry<Session<W>>,
) -> CommandResult {
  let Some((action, action_args)) = args.subcommand() else {
    return Err(CommandError::failed("library: missing action"));
  };
  let user = args.get("user").unwrap_or("someone");

  let lines = {
    let mut shelves = session
      .shelves
      .lock()
      .map_err(|_| CommandError::failed("library shelves are unavailable"))?;
    match action {
      "add" => {
        let item = action_args.get("item_id").unwrap_or_default().to_string();
        let shelf = action_args.get("shelf").unwrap_or("top").to_string();
        let line = format!("{user} put {item} on the {shelf} shelf");
        shelves.insert(item, shelf);
        vec![line]
      },
      "remove" => {
        action_args
          .get_all("item_id")
          .iter()
          .map(|item| {
            match shelves.remove(item) {
              Some(shelf) => format!("{user} took {item} off the {shelf} shelf"),
              None => format!("{item} is not on a shelf"),
            }
          })
          .collect()
      },
      _ => {
        shelves
          .iter()
          .map(|(item, shelf)| format!("{item}: {shelf}"))
          .collect()
      },
    }
  };

  for line in lines {
    session.print(&line);
  }
  Ok(())
}

fn speak_grammar() -> Result<Grammar, GrammarError> {
  Grammar::builder("speak")
    .help_flag()
    .argument(
      Argument::flag(["-u", "--upper"])
        .action(ArgAction::StoreTrue)
        .help("shout the words"),
    )
    .argument(
      Argument::flag(["-r", "--repeat"])
        .metavar("N")
        .choices(Choices::from_values(["1", "2", "3", "10"]))
        .help("how many times to say it"),
    )
    .argument(
      Argument::positional("words")
        .nargs(Nargs::OneOrMore)
        .help("words to say"),
    )
    .build()
}

fn speak<W: Write>(
  session: &mut Session<W>,
  args: &Args,
  _: &CommandRegistry<Session<W>>,
) -> CommandResult {
  let mut text = args.get_all("words").join(" ");
  if args.has("upper") {
    text = text.to_uppercase();
  }
  let repeat = args
    .get("repeat")
    .map_or(Ok(1), str::parse::<usize>)
    .map_err(|err| CommandError::failed(format!("bad repeat count: {err}")))?;
  for _ in 0..repeat {
    session.print(&text);
  }
  Ok(())
}
