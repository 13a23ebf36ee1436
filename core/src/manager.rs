//! [`SolverManager`]: the five-step orchestration loop — validate, build the tier graph, seed
//! the ready queue, drain it dispatching a worker per ready tier, and finish by marking the game
//! solved and printing a summary. `Summary` is modeled on a search engine's own run-statistics
//! struct: a small plain aggregate of counters collected over the run, `Display`-formatted for
//! the CLI rather than fed to a metrics backend.

use crate::db::{DbPaths, TierDatabase, XzOptions};
use crate::error::{Error, Res};
use crate::graph::TierGraph;
use crate::model::{GameApi, Tier};
use crate::output::Progress;
use crate::worker::{solve_tier_one_bit, solve_tier_value_iteration, WorkerConfig};
use std::fmt;
use std::time::{Duration, Instant};

/// Tunables threaded down into the database and workers. `one_bit_threshold` picks, per tier,
/// which of the two `TierWorker` strategies handles it: tiers at or above the threshold use the
/// memory-frugal one-bit retrograde worker, everything smaller uses value iteration. `None`
/// always uses value iteration.
#[derive(Copy, Clone, Debug)]
pub struct SolverConfig {
    pub max_loaded_tiers: usize,
    pub xz_options: XzOptions,
    pub worker: WorkerConfig,
    pub one_bit_threshold: Option<u64>,
    /// Re-solve tiers even if an on-disk `.adb` already reports [`crate::db::TierStatus::Solved`].
    pub force: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_loaded_tiers: crate::db::DEFAULT_MAX_LOADED,
            xz_options: XzOptions::default(),
            worker: WorkerConfig::default(),
            one_bit_threshold: None,
            force: false,
        }
    }
}

/// Aggregate counters over one `Solve` run.
#[derive(Debug, Default, Clone)]
pub struct Summary {
    pub tiers_solved: u64,
    pub tiers_resumed: u64,
    pub tiers_skipped: u64,
    pub tiers_failed: u64,
    pub wall_time: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "solved {} tiers ({} resumed from disk, {} skipped as non-canonical, {} failed) in {:.2}s",
            self.tiers_solved,
            self.tiers_resumed,
            self.tiers_skipped,
            self.tiers_failed,
            self.wall_time.as_secs_f64(),
        )
    }
}

pub struct SolverManager<'a> {
    game: &'a dyn GameApi,
    db: TierDatabase,
    config: SolverConfig,
}

impl<'a> SolverManager<'a> {
    pub fn new(paths: DbPaths, game: &'a dyn GameApi, config: SolverConfig) -> Self {
        let db = TierDatabase::with_options(paths, config.xz_options, config.max_loaded_tiers);
        Self { game, db, config }
    }

    pub fn db(&self) -> &TierDatabase {
        &self.db
    }

    /// Step 1-5: build the tier DAG (fatal on a cycle), drain the ready queue dispatching a
    /// worker per tier, and finish. Per-tier `OutOfMemory`/runtime failures are recorded and do
    /// not abort the run; everything else propagates.
    pub fn solve(&mut self, progress: &Progress) -> Res<Summary> {
        let started = Instant::now();
        progress.debug(&format!("solve started at {}", chrono::offset::Utc::now().to_rfc2822()));
        validate_game(self.game)?;
        if !self.config.force && self.db.game_status() == crate::db::GameStatus::Solved {
            progress.info("game already solved; pass --force to re-solve");
            return Ok(Summary { wall_time: started.elapsed(), ..Summary::default() });
        }

        let graph = TierGraph::build(self.game)?;
        let mut summary = Summary { tiers_skipped: graph.skipped_tier_count(), ..Summary::default() };

        while let Some(tier) = graph.take_ready() {
            let name = self.game.tier_name(tier);
            if !self.config.force && self.db.tier_status(&name) == crate::db::TierStatus::Solved {
                progress.debug(&format!("tier {name} already solved, resuming"));
                summary.tiers_resumed += 1;
                graph.child_solved(tier);
                continue;
            }

            let size = self.game.tier_size(tier);
            let use_one_bit = self.config.one_bit_threshold.is_some_and(|t| size >= t);
            let result = if use_one_bit {
                solve_tier_one_bit(&mut self.db, self.game, tier, self.config.worker)
            } else {
                solve_tier_value_iteration(&mut self.db, self.game, tier, self.config.worker)
            };

            match result {
                Ok(()) => {
                    progress.info(&format!("solved tier {name} ({size} positions)"));
                    summary.tiers_solved += 1;
                    graph.child_solved(tier);
                }
                Err(e) if e.tier_local() => {
                    progress.warning(&format!("tier {name} failed ({e}), continuing"));
                    summary.tiers_failed += 1;
                    // A failed tier never calls `ChildSolved`; anything depending on it simply
                    // never becomes ready, which correctly starves only that subgraph.
                }
                Err(e) => return Err(e),
            }
        }

        self.db.mark_game_solved()?;
        summary.wall_time = started.elapsed();
        progress.info(&summary.to_string());
        Ok(summary)
    }
}

/// A minimal well-formedness check for Step 1's "validate the game API" — `Tier(0)`'s size and
/// the initial position must at least be self-consistent. Full semantic validation of a `dyn
/// GameApi` is necessarily best-effort; glaring misconfigurations (an initial tier reporting zero
/// size) are caught here rather than surfacing as a confusing panic deep in a worker.
pub fn validate_game(game: &dyn GameApi) -> Res<()> {
    let initial = game.initial_tier();
    if game.tier_size(initial) == 0 {
        return Err(Error::IllegalArgument("initial tier reports zero size".into()));
    }
    if game.initial_position().0 >= game.tier_size(initial) {
        return Err(Error::IllegalArgument("initial position is out of range for the initial tier".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Move, Position, TierPosition, Value};
    use tempfile::tempdir;

    /// Two independent binary cells; tier = remaining moves, exactly like the worker tests, kept
    /// self-contained here so `manager` tests don't depend on `worker`'s private fixtures.
    struct Ladder;

    impl GameApi for Ladder {
        fn initial_tier(&self) -> Tier {
            Tier(2)
        }
        fn initial_position(&self) -> Position {
            Position(0)
        }
        fn tier_size(&self, _tier: Tier) -> u64 {
            4
        }
        fn generate_moves(&self, position: TierPosition) -> Vec<Move> {
            (0..2).filter(|b| position.position.0 & (1 << b) == 0).map(Move).collect()
        }
        fn primitive(&self, position: TierPosition) -> Value {
            if position.position.0.count_ones() == 1 && position.tier.0 == 0 {
                Value::Lose
            } else {
                Value::Undecided
            }
        }
        fn do_move(&self, position: TierPosition, mv: Move) -> TierPosition {
            TierPosition::new(Tier(position.tier.0 - 1), Position(position.position.0 | (1 << mv.0)))
        }
        fn is_legal_position(&self, position: TierPosition) -> bool {
            (2 - position.tier.0) as u32 == position.position.0.count_ones()
        }
        fn canonical_parent_positions(&self, _child: TierPosition, _parent_tier: Tier) -> Vec<Position> {
            vec![]
        }
        fn child_tiers(&self, tier: Tier) -> Vec<Tier> {
            if tier.0 == 0 {
                vec![]
            } else {
                vec![Tier(tier.0 - 1)]
            }
        }
        fn tier_name(&self, tier: Tier) -> String {
            format!("t{}", tier.0)
        }
    }

    #[test]
    fn solves_whole_game_and_writes_finish_marker() {
        let dir = tempdir().unwrap();
        let game = Ladder;
        let paths = DbPaths::new(dir.path(), "ladder", 0, "db");
        let mut manager = SolverManager::new(paths, &game, SolverConfig::default());
        let progress = Progress::new(true, false);

        let summary = manager.solve(&progress).unwrap();
        assert_eq!(summary.tiers_solved, 3);
        assert_eq!(summary.tiers_failed, 0);
        assert_eq!(manager.db().game_status(), crate::db::GameStatus::Solved);
    }

    #[test]
    fn second_run_resumes_without_force() {
        let dir = tempdir().unwrap();
        let game = Ladder;
        let paths = DbPaths::new(dir.path(), "ladder", 0, "db");
        let progress = Progress::new(true, false);
        {
            let mut manager = SolverManager::new(paths.clone(), &game, SolverConfig::default());
            manager.solve(&progress).unwrap();
        }
        let mut manager = SolverManager::new(paths, &game, SolverConfig::default());
        let summary = manager.solve(&progress).unwrap();
        assert_eq!(summary.tiers_solved, 0);
    }

    #[test]
    fn rejects_zero_size_initial_tier() {
        struct Empty;
        impl GameApi for Empty {
            fn initial_tier(&self) -> Tier {
                Tier(0)
            }
            fn initial_position(&self) -> Position {
                Position(0)
            }
            fn tier_size(&self, _tier: Tier) -> u64 {
                0
            }
            fn generate_moves(&self, _position: TierPosition) -> Vec<Move> {
                vec![]
            }
            fn primitive(&self, _position: TierPosition) -> Value {
                Value::Undecided
            }
            fn do_move(&self, position: TierPosition, _mv: Move) -> TierPosition {
                position
            }
            fn is_legal_position(&self, _position: TierPosition) -> bool {
                false
            }
            fn canonical_parent_positions(&self, _child: TierPosition, _parent_tier: Tier) -> Vec<Position> {
                vec![]
            }
            fn child_tiers(&self, _tier: Tier) -> Vec<Tier> {
                vec![]
            }
            fn tier_name(&self, tier: Tier) -> String {
                format!("t{}", tier.0)
            }
        }
        assert!(validate_game(&Empty).is_err());
    }
}
