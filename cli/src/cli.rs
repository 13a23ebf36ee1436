//! Hand-rolled argument parsing over `Peekable<std::env::Args>`, the same `ArgIter` convention
//! used elsewhere in the corpus in place of a declarative parser: a `next()`/`peek()` loop with a
//! small set of `get_next_*` helpers and a `match` over the flag string.

use crate::games::GameChoice;
use anyhow::{anyhow, bail, Result};
use std::env::Args;
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::FromStr;

pub type ArgIter = Peekable<Args>;

pub fn get_next_arg(args: &mut ArgIter, name: &str) -> Result<String> {
    match args.next() {
        None => Err(anyhow!("missing value for {name} (args ended)")),
        Some(arg) => {
            if arg.starts_with('-') {
                Err(anyhow!("missing value for {name} (next arg was '{arg}')"))
            } else {
                Ok(arg)
            }
        }
    }
}

pub fn get_next_int<T: FromStr>(args: &mut ArgIter, name: &str) -> Result<T> {
    get_next_arg(args, name)?.parse::<T>().map_err(|_| anyhow!("'{name}' is not a valid number"))
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Command {
    Solve,
    Analyze,
    Query,
    GetStart,
    GetRandom,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "solve" => Ok(Command::Solve),
            "analyze" => Ok(Command::Analyze),
            "query" => Ok(Command::Query),
            "getstart" => Ok(Command::GetStart),
            "getrandom" => Ok(Command::GetRandom),
            x => bail!("unrecognized command '{x}'. Expected one of solve, analyze, query, getstart, getrandom"),
        }
    }
}

#[derive(Debug, Clone)]
#[must_use]
pub struct Opts {
    pub command: Command,
    pub game: GameChoice,
    pub variant: u64,
    pub position: Option<u64>,
    pub tier: Option<u64>,
    pub data_path: PathBuf,
    pub memory: Option<usize>,
    pub force: bool,
    pub output: Option<PathBuf>,
    pub quiet: bool,
    pub verbose: bool,
}

impl Opts {
    fn for_command(command: Command, game: GameChoice) -> Self {
        Self {
            command,
            game,
            variant: 0,
            position: None,
            tier: None,
            data_path: PathBuf::from("gamesman-data"),
            memory: None,
            force: false,
            output: None,
            quiet: false,
            verbose: false,
        }
    }
}

fn parse_option(args: &mut ArgIter, opts: &mut Opts) -> Result<()> {
    let mut key = args.next().expect("peek confirmed another argument exists");
    if key.starts_with("--") {
        key = key[2..].to_string();
    } else if let Some(stripped) = key.strip_prefix('-') {
        key = stripped.to_string();
    }
    match key.as_str() {
        "data-path" => opts.data_path = PathBuf::from(get_next_arg(args, "data-path")?),
        "memory" => opts.memory = Some(get_next_int(args, "memory")?),
        "force" => opts.force = true,
        "output" => opts.output = Some(PathBuf::from(get_next_arg(args, "output")?)),
        "quiet" | "q" => opts.quiet = true,
        "verbose" | "v" => opts.verbose = true,
        "variant" => opts.variant = get_next_int(args, "variant")?,
        "tier" => opts.tier = Some(get_next_int(args, "tier")?),
        x => bail!("unrecognized option '{x}'"),
    }
    Ok(())
}

/// `gamesman <command> <game> [variant] [position] [options...]`. `variant`/`position` are
/// positional and only meaningful for commands that use them (`query`, and an optional variant
/// override for any command); everything starting with `-`/`--` is an option and can appear
/// anywhere after the two required positionals.
pub fn parse_cli(mut args: ArgIter) -> Result<Opts> {
    let program = args.next();
    let command_str = args.next().ok_or_else(|| anyhow!("missing command; usage: {} <command> <game> ...", program.as_deref().unwrap_or("gamesman")))?;
    let command = Command::from_str(&command_str)?;

    let game_str = get_next_arg(&mut args, "game")?;
    let game = GameChoice::parse(&game_str)
        .ok_or_else(|| anyhow!("unknown game '{game_str}'; expected one of: {}", GameChoice::names()))?;

    let mut opts = Opts::for_command(command, game);

    // Positional `[variant] [position]`: consume leading non-flag tokens before falling into the
    // flag loop, mirroring the engine binary's own optional positional-then-flags layout.
    if let Some(peeked) = args.peek() {
        if !peeked.starts_with('-') {
            opts.variant = get_next_int(&mut args, "variant")?;
        }
    }
    if matches!(command, Command::Query) {
        if let Some(peeked) = args.peek() {
            if !peeked.starts_with('-') {
                opts.position = Some(get_next_int(&mut args, "position")?);
            }
        }
    }

    while args.peek().is_some() {
        parse_option(&mut args, &mut opts)?;
    }
    Ok(opts)
}
