//! Headless CLI front-end for the tiered retrograde solver core: a thin `main.rs` parses `argv`
//! with the hand-rolled [`cli::ArgIter`] convention and dispatches to [`gamesman_core`] directly,
//! the way a small engine binary stays a dumb wrapper around its library crate.

pub mod cli;
pub mod games;

use anyhow::Result;
use cli::{Command, Opts};
use gamesman_core::db::{DbPaths, Probe, TierDatabase};
use gamesman_core::manager::{SolverConfig, SolverManager};
use gamesman_core::output::Progress;
use gamesman_core::{Error, GameApi, Position, Res, Tier, TierPosition};
use rand::seq::IteratorRandom;

fn db_paths(opts: &Opts) -> DbPaths {
    DbPaths::new(opts.data_path.clone(), opts.game.to_string(), opts.variant, "db")
}

fn progress(opts: &Opts) -> Progress {
    Progress::new(opts.quiet, opts.verbose)
}

fn write_result(opts: &Opts, text: &str) -> Result<()> {
    match &opts.output {
        Some(path) => Ok(std::fs::write(path, format!("{text}\n"))?),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

/// Runs one invocation and returns the process exit code: 0 on success, otherwise the failing
/// [`Error::code`] (argument-parsing failures that never reach the core map to `HeadlessError`'s
/// own ordinal, 18).
pub fn run(args: cli::ArgIter) -> Result<i32> {
    let opts = match cli::parse_cli(args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(Error::HeadlessError(e.to_string()).code());
        }
    };
    let progress = progress(&opts);

    let outcome: Res<()> = match opts.command {
        Command::Solve => solve(&opts, &progress),
        Command::Analyze => analyze(&opts, &progress),
        Command::Query => query(&opts),
        Command::GetStart => getstart(&opts),
        Command::GetRandom => getrandom(&opts),
    };

    match outcome {
        Ok(()) => Ok(0),
        Err(e) => {
            progress.error(&e.to_string());
            Ok(e.code())
        }
    }
}

fn solve(opts: &Opts, progress: &Progress) -> Res<()> {
    let game = opts.game.game();
    let mut config = SolverConfig { force: opts.force, ..SolverConfig::default() };
    if let Some(memory) = opts.memory {
        config.max_loaded_tiers = memory;
    }
    let mut manager = SolverManager::new(db_paths(opts), game.as_ref(), config);
    manager.solve(progress)?;
    Ok(())
}

fn analyze(opts: &Opts, progress: &Progress) -> Res<()> {
    let game = opts.game.game();
    let db = TierDatabase::new(db_paths(opts));
    let mut seen = std::collections::BTreeSet::new();
    let mut frontier = vec![game.initial_tier()];
    while let Some(tier) = frontier.pop() {
        if !seen.insert(tier) {
            continue;
        }
        let name = game.tier_name(tier);
        let status = db.tier_status(&name);
        progress.info(&format!("tier {name}: {status} ({} positions)", game.tier_size(tier)));
        frontier.extend(game.child_tiers(tier));
    }
    Ok(())
}

fn query(opts: &Opts) -> Res<()> {
    let game = opts.game.game();
    let tier = Tier(opts.tier.unwrap_or(game.initial_tier().0));
    let position = opts
        .position
        .ok_or_else(|| Error::IllegalArgument("query requires a position argument".into()))?;
    let tp = TierPosition::new(tier, Position(position));

    let mut probe = Probe::new(db_paths(opts));
    let record = probe.probe_record(tp, &game.tier_name(tier))?;
    let (value, remoteness) = record.decode();
    write_result(opts, &format!("{tp} -> {value} in {remoteness}")).map_err(|e| Error::runtime(e.to_string()))
}

fn getstart(opts: &Opts) -> Res<()> {
    let game = opts.game.game();
    let tp = TierPosition::new(game.initial_tier(), game.initial_position());
    write_result(opts, &tp.to_string()).map_err(|e| Error::runtime(e.to_string()))
}

fn getrandom(opts: &Opts) -> Res<()> {
    let game = opts.game.game();
    let tier = game.initial_tier();
    let size = game.tier_size(tier);
    let mut rng = rand::rng();
    let position = (0..size)
        .map(Position)
        .filter(|&p| game.is_legal_position(TierPosition::new(tier, p)))
        .choose(&mut rng)
        .ok_or_else(|| Error::Runtime("initial tier has no legal positions".into()))?;
    write_result(opts, &TierPosition::new(tier, position).to_string()).map_err(|e| Error::runtime(e.to_string()))
}
