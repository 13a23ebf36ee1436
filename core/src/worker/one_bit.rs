//! One-bit retrograde analysis: instead of value iteration's repeated full-tier rescans, walk the
//! move graph backwards from already-decided positions via
//! [`GameApi::canonical_parent_positions`]. A [`ConcurrentBitset`] marks which positions are
//! permanently settled (their final `Win`/`Lose` record is already written) — the "one bit" of
//! the name — and a plain remaining-children counter per position tells us when the last of a
//! position's children has turned out to be `Win`, at which point that position is forced `Lose`.
//! This reaches every decidable Win/Lose position in work proportional to the edges touched
//! rather than `diameter * tier_size`, at the cost of the counter array's `O(tier_size)` memory —
//! the same space/time tradeoff a packed transposition-table entry trades against a full one.

use super::common::{self, WorkerConfig};
use crate::bitset::ConcurrentBitset;
use crate::db::TierDatabase;
use crate::error::Res;
use crate::model::{GameApi, Position, Tier, TierPosition, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

/// Solves `tier` with the BFS/counter retrograde strategy in place of value iteration's repeated
/// sweeps for Step 3; Steps 0-2, 4-7 are identical to [`super::value_iteration`].
pub fn solve_tier_one_bit(db: &mut TierDatabase, game: &dyn GameApi, tier: Tier, cfg: WorkerConfig) -> Res<()> {
    let size = game.tier_size(tier);
    let run = || -> Res<()> {
        let (children, maxima) = common::load_children(db, game, tier)?;
        db.create_solving_tier(tier, size)?;
        common::scan_initial(db, game, tier, size, cfg)?;
        retrograde_win_lose(db, game, tier, size, &children)?;
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

/// Step 3, one-bit variant. `settled` is the per-solving-tier-position "final value already
/// written" flag; `remaining` counts, for each still-unsettled position, how many of its
/// canonical children have not yet been shown to force a `Win` for the opponent. The BFS frontier
/// is seeded from two sources: this tier's own primitive positions (Step 2), and every already
/// fully-decided position of the children tiers loaded in Step 0 — those children are complete
/// results the moment they're loaded, so there is no reason to wait for a same-tier neighbor to
/// discover them. Draining the frontier breadth-first guarantees a position's `remaining` counter
/// only reaches zero once every child has actually been visited at its true remoteness —
/// `child_solved`-style decrement-to-zero, generalized from tiers to positions.
fn retrograde_win_lose(db: &TierDatabase, game: &dyn GameApi, tier: Tier, size: u64, children: &[Tier]) -> Res<()> {
    let settled = ConcurrentBitset::create(size)?;
    let remaining: Vec<AtomicU32> = (0..size)
        .map(|pos| {
            let tp = TierPosition::new(tier, Position(pos));
            AtomicU32::new(game.num_canonical_child_positions(tp) as u32)
        })
        .collect();

    let mut queue: VecDeque<TierPosition> = VecDeque::new();
    for pos in 0..size {
        if db.get_value(Position(pos))? != Value::Undecided {
            settled.set(pos, Ordering::Release);
            queue.push_back(TierPosition::new(tier, Position(pos)));
        }
    }
    for &child_tier in children {
        let child_size = game.tier_size(child_tier);
        for pos in 0..child_size {
            let child_tp = TierPosition::new(child_tier, Position(pos));
            if matches!(db.get_value_from_loaded(child_tp)?, Value::Win | Value::Lose) {
                queue.push_back(child_tp);
            }
        }
    }

    while let Some(child_tp) = queue.pop_front() {
        let (child_value, child_remoteness) = if child_tp.tier == tier {
            (db.get_value(child_tp.position)?, db.get_remoteness(child_tp.position)?)
        } else {
            (db.get_value_from_loaded(child_tp)?, db.get_remoteness_from_loaded(child_tp)?)
        };

        for parent_pos in game.canonical_parent_positions(child_tp, tier) {
            if settled.test(parent_pos.0, Ordering::Acquire) {
                continue;
            }
            let parent_tp = TierPosition::new(tier, parent_pos);
            if !game.is_legal_position(parent_tp) || game.canonical_position(parent_tp) != parent_pos {
                continue;
            }

            match child_value {
                Value::Lose => {
                    // The parent has a move into a position where the opponent loses: the parent
                    // wins, one ply further out than this child's own remoteness.
                    db.set_value(parent_pos, Value::Win)?;
                    db.set_remoteness(parent_pos, child_remoteness + 1)?;
                    settled.set(parent_pos.0, Ordering::AcqRel);
                    queue.push_back(parent_tp);
                }
                Value::Win => {
                    let left = remaining[parent_pos.0 as usize].fetch_sub(1, Ordering::AcqRel) - 1;
                    if left == 0 {
                        db.set_value(parent_pos, Value::Lose)?;
                        db.set_remoteness(parent_pos, child_remoteness + 1)?;
                        settled.set(parent_pos.0, Ordering::AcqRel);
                        queue.push_back(parent_tp);
                    }
                }
                Value::Undecided | Value::Tie | Value::Draw => {}
            }
        }
    }
    Ok(())
}
