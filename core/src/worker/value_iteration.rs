//! Value iteration: a forward fixed-point sweep. Each outer pass re-scans every
//! `Undecided` position of the solving tier, looks at its canonical children (already fully
//! solved, since the tier graph only ever hands out tiers whose children finished), and assigns
//! `Win`/`Lose` at the current remoteness the moment any/every child forces it. The pass count
//! doubles as the remoteness being assigned this round, so the loop needs no explicit work queue.

use super::common::{self, ChildMaxima, WorkerConfig};
use crate::db::TierDatabase;
use crate::error::{Error, Res};
use crate::model::{GameApi, Position, Remoteness, Tier, TierPosition, Value, MAX_REMOTENESS};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Solves `tier` end to end: loads children (Step 0), creates the solving array (Step 1), scans
/// primitives (Step 2), runs the Win/Lose and Tie sweeps (Steps 3-4), marks remaining positions
/// as draws (Step 5), flushes (Step 6), and unloads children (Step 7). On any error the solving
/// tier and any loaded children are cleaned up before the error propagates.
pub fn solve_tier_value_iteration(db: &mut TierDatabase, game: &dyn GameApi, tier: Tier, cfg: WorkerConfig) -> Res<()> {
    let size = game.tier_size(tier);
    let run = || -> Res<()> {
        let (children, maxima) = common::load_children(db, game, tier)?;
        db.create_solving_tier(tier, size)?;
        common::scan_initial(db, game, tier, size, cfg)?;
        sweep_win_lose(db, game, tier, size, maxima, cfg)?;
        common::sweep_tie(db, game, tier, size, maxima.max_tie_remoteness, cfg)?;
        common::mark_draws(db, size, cfg)?;
        db.flush_solving_tier(&game.tier_name(tier))?;
        common::unload_children(db, &children);
        Ok(())
    };
    match run() {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = db.free_solving_tier();
            Err(e)
        }
    }
}

/// Step 3: for `i = 0, 1, 2, …`, any `Undecided` position with a child at remoteness `i` labeled
/// `Lose` becomes `Win@i+1`; a position all of whose children are `Win` with maximum remoteness
/// `i` becomes `Lose@i+1`. `maxima.max_win_lose_remoteness` (computed from already-solved child
/// *tiers* in Step 0) is only a lower bound on how far the sweep must run: a same-tier (quiet-move)
/// chain can resolve positions whose win/lose remoteness exceeds every child tier's maximum, and
/// each such resolution can in turn push the bound further out. The loop therefore tracks its own
/// running maximum and an "updated" flag per pass, continuing while either a position updated in
/// the last pass or `i` has not yet run one past the running maximum — mirroring the BFS-driven
/// one-bit worker's unbounded intra-tier chain handling instead of assuming a fixed pass count.
fn sweep_win_lose(
    db: &TierDatabase,
    game: &dyn GameApi,
    tier: Tier,
    size: u64,
    maxima: ChildMaxima,
    cfg: WorkerConfig,
) -> Res<()> {
    if size == 0 {
        return Ok(());
    }

    let mut running_max = maxima.max_win_lose_remoteness;
    let mut i: Remoteness = 0;
    loop {
        let updated = AtomicBool::new(false);
        (0..size).collect::<Vec<_>>().par_chunks(cfg.chunk_size.max(1)).try_for_each(|chunk| -> Res<()> {
            for &pos in chunk {
                if db.get_value(Position(pos))? != Value::Undecided {
                    continue;
                }
                let tp = TierPosition::new(tier, Position(pos));
                let children = game.canonical_child_positions(tp);
                if children.is_empty() {
                    continue;
                }
                let mut all_win = true;
                let mut max_win_remoteness: Remoteness = 0;
                let mut found_losing_child = false;
                for child in &children {
                    let (value, remoteness) = common::read_child(db, *child)?;
                    if value == Value::Lose && remoteness == i {
                        found_losing_child = true;
                        break;
                    }
                    if value == Value::Win {
                        max_win_remoteness = max_win_remoteness.max(remoteness);
                    } else {
                        all_win = false;
                    }
                }
                if found_losing_child {
                    db.set_value(Position(pos), Value::Win)?;
                    db.set_remoteness(Position(pos), i + 1)?;
                    updated.store(true, Ordering::Relaxed);
                } else if all_win && max_win_remoteness == i {
                    db.set_value(Position(pos), Value::Lose)?;
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
