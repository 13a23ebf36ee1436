//! Shared steps between the two `TierWorker` variants: loading children and scanning their
//! maxima (Step 0), the initial primitive/legality scan (Step 2), and the draw-marking sweep
//! (Step 5) are byte-for-byte the same regardless of which backward-induction strategy drives
//! Steps 3-4.

use crate::db::TierDatabase;
use crate::error::{Error, Res};
use crate::model::{GameApi, Position, Remoteness, Tier, TierPosition, Value, MAX_REMOTENESS};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// `rayon`'s work-stealing thread pool replaces a hand-rolled OpenMP-style parallel-for, with a
/// configurable chunk size (128-256 positions is a reasonable default) standing in for a tunable
/// scheduling granularity.
#[derive(Copy, Clone, Debug)]
pub struct WorkerConfig {
    pub chunk_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { chunk_size: 256 }
    }
}

/// The global maxima of child win/lose and tie remoteness, used as Step 3/4's termination bound.
#[derive(Copy, Clone, Debug, Default)]
pub struct ChildMaxima {
    pub max_win_lose_remoteness: Remoteness,
    pub max_tie_remoteness: Remoteness,
}

/// Step 0: load every child tier into the database and scan it once for the maxima Steps 3-4
/// terminate on. Tiers that canonicalize to `tier` itself (same-tier edges) are not "children" to
/// load — their positions live in the solving tier's own slot.
pub fn load_children(db: &mut TierDatabase, game: &dyn GameApi, tier: Tier) -> Res<(Vec<Tier>, ChildMaxima)> {
    let mut children: Vec<Tier> = game
        .child_tiers(tier)
        .into_iter()
        .map(|t| game.canonical_tier(t))
        .filter(|&t| t != tier)
        .collect();
    children.sort();
    children.dedup();

    let mut maxima = ChildMaxima::default();
    for &child in &children {
        let size = game.tier_size(child);
        db.load_tier(child, &game.tier_name(child), size)?;
        for pos in 0..size {
            let tp = TierPosition::new(child, Position(pos));
            let value = db.get_value_from_loaded(tp)?;
            let remoteness = db.get_remoteness_from_loaded(tp)?;
            match value {
                Value::Win | Value::Lose => {
                    maxima.max_win_lose_remoteness = maxima.max_win_lose_remoteness.max(remoteness);
                }
                Value::Tie => {
                    maxima.max_tie_remoteness = maxima.max_tie_remoteness.max(remoteness);
                }
                Value::Undecided | Value::Draw => {}
            }
        }
    }
    Ok((children, maxima))
}

/// Step 2: scan. Illegal or non-canonical positions get the temporary `Draw` sentinel (restored
/// to `Undecided` in Step 5); primitive positions get their terminal value at remoteness 0;
/// everything else is left `Undecided` (the record's zero default).
pub fn scan_initial(db: &TierDatabase, game: &dyn GameApi, tier: Tier, size: u64, cfg: WorkerConfig) -> Res<()> {
    (0..size)
        .collect::<Vec<_>>()
        .par_chunks(cfg.chunk_size.max(1))
        .try_for_each(|chunk| -> Res<()> {
            for &pos in chunk {
                let tp = TierPosition::new(tier, Position(pos));
                let is_canonical = game.canonical_position(tp) == Position(pos);
                if !game.is_legal_position(tp) || !is_canonical {
                    db.set_value(Position(pos), Value::Draw)?;
                    continue;
                }
                let primitive = game.primitive(tp);
                if primitive != Value::Undecided {
                    db.set_value(Position(pos), primitive)?;
                    db.set_remoteness(Position(pos), 0)?;
                }
            }
            Ok(())
        })
}

/// Step 5: `Undecided -> Draw` (true draws) and the sentinel `Draw -> Undecided` (restoring
/// illegal/non-canonical slots to "no meaningful record" — they are never looked up by a parent,
/// since `GetCanonicalChildPositions` only ever yields canonical legal positions).
pub fn mark_draws(db: &TierDatabase, size: u64, cfg: WorkerConfig) -> Res<()> {
    (0..size)
        .collect::<Vec<_>>()
        .par_chunks(cfg.chunk_size.max(1))
        .try_for_each(|chunk| -> Res<()> {
            for &pos in chunk {
                match db.get_value(Position(pos))? {
                    Value::Undecided => db.set_value(Position(pos), Value::Draw)?,
                    Value::Draw => db.set_value(Position(pos), Value::Undecided)?,
                    _ => {}
                }
            }
            Ok(())
        })
}

/// Step 7: unload every loaded child, best-effort (used on both the success and the error path).
pub fn unload_children(db: &mut TierDatabase, children: &[Tier]) {
    for &child in children {
        let _ = db.unload_tier(child);
    }
}

/// A child may live in the solving tier itself (a same-tier move) or in an already-loaded
/// sibling; either way `TierDatabase` knows how to find it.
pub fn read_child(db: &TierDatabase, child: TierPosition) -> Res<(Value, Remoteness)> {
    let value = db.get_value_from_loaded(child)?;
    let remoteness = db.get_remoteness_from_loaded(child)?;
    Ok((value, remoteness))
}

/// Step 4, shared by both algorithms: an `Undecided` position with a child at remoteness `i`
/// labeled `Tie` becomes `Tie@i + 1`. A tie only ever needs one tying child, never all of them, so
/// this never needs the BFS machinery Step 3 uses — both workers run the identical forward sweep
/// here. As in `sweep_win_lose`, `max_tie_remoteness` (from already-solved child *tiers*) is only a
/// lower bound: a same-tier tie chain can resolve positions past it, each such resolution pushing
/// the bound further out, so the loop tracks its own running maximum and an "updated" flag per
/// pass instead of assuming a fixed pass count.
pub fn sweep_tie(db: &TierDatabase, game: &dyn GameApi, tier: Tier, size: u64, max_tie_remoteness: Remoteness, cfg: WorkerConfig) -> Res<()> {
    if size == 0 {
        return Ok(());
    }

    let mut running_max = max_tie_remoteness;
    let mut i: Remoteness = 0;
    loop {
        let updated = AtomicBool::new(false);
        (0..size).collect::<Vec<_>>().par_chunks(cfg.chunk_size.max(1)).try_for_each(|chunk| -> Res<()> {
            for &pos in chunk {
                if db.get_value(Position(pos))? != Value::Undecided {
                    continue;
                }
                let tp = TierPosition::new(tier, Position(pos));
                let mut tying = false;
                for child in game.canonical_child_positions(tp) {
                    let (value, remoteness) = read_child(db, child)?;
                    if value == Value::Tie && remoteness == i {
                        tying = true;
                        break;
                    }
                }
                if tying {
                    db.set_value(Position(pos), Value::Tie)?;
                    db.set_remoteness(Position(pos), i + 1)?;
                    updated.store(true, Ordering::Relaxed);
                }
            }
            Ok(())
        })?;

        let updated = updated.load(Ordering::Relaxed);
        if updated {
            running_max = running_max.max(i + 1);
        }
        if !updated && i > running_max + 1 {
            break;
        }
        if i == MAX_REMOTENESS {
            return Err(Error::IntegerOverflow);
        }
        i += 1;
    }
    Ok(())
}
