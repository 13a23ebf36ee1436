//! [`TierGraph`]: the tier DAG, built by iterative DFS with three-color marking, exposing a
//! `TakeReady`/`ChildSolved` ready-queue protocol. The packed `(status, num_unsolved_children)`
//! word per tier is a single `AtomicI64`, CAS-looped in `ChildSolved` — the same "CAS loop races a
//! shared counter to zero" shape as a search engine's atomic `currently_searching` polling flag,
//! generalized from a boolean to a decrementing counter.

use crate::error::{Error, Res};
use crate::model::{GameApi, Tier};
use crossbeam_channel::{unbounded, Receiver, Sender};
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(i64)]
enum Color {
    NotVisited = 0,
    InProgress = 1,
    Closed = 2,
}

/// Parent edges rarely exceed a handful per tier, so a small inline buffer avoids a heap
/// allocation for the common case — the same reasoning that favors `SmallVec` over a plain `Vec`
/// for short move lists.
type ParentList = SmallVec<[Tier; 4]>;

pub struct TierGraph {
    /// Packed `(status, num_unsolved_children)` per canonical tier, `count * 4 + status`.
    state: HashMap<Tier, AtomicI64>,
    /// canonical child -> deduplicated canonical parents.
    parents: HashMap<Tier, ParentList>,
    ready_tx: Sender<Tier>,
    ready_rx: Receiver<Tier>,
    root: Tier,
    /// Distinct raw (pre-canonicalization) tiers discovered during [`Self::build`] whose
    /// canonical form differs from themselves — tier-symmetry siblings that never get their own
    /// graph node and are never dispatched to a worker.
    skipped_tiers: u64,
}

impl TierGraph {
    /// Iterative DFS from `game.initial_tier()`. Detects cycles via a back-edge to an
    /// `InProgress` node (fatal: [`Error::IllegalTierGraph`]).
    pub fn build(game: &dyn GameApi) -> Res<Self> {
        let root = game.canonical_tier(game.initial_tier());
        let mut color: HashMap<Tier, Color> = HashMap::new();
        let mut children_of: HashMap<Tier, Vec<Tier>> = HashMap::new();
        let mut skipped: HashSet<Tier> = HashSet::new();

        // Explicit stack of (tier, next child index to visit) for iterative DFS. Indexed
        // in-place rather than held as a live `&mut` across the loop body, so pushing new
        // frames never fights the borrow checker.
        let mut stack: Vec<(Tier, usize)> = Vec::new();
        color.insert(root, Color::InProgress);
        let children = canonical_children(game, root, &mut skipped);
        children_of.insert(root, children);
        stack.push((root, 0));

        while !stack.is_empty() {
            let top = stack.len() - 1;
            let (tier, next) = stack[top];
            let children = &children_of[&tier];
            if next < children.len() {
                let child = children[next];
                stack[top].1 += 1;
                match color.get(&child).copied() {
                    Some(Color::InProgress) => return Err(Error::IllegalTierGraph),
                    Some(Color::Closed) => continue,
                    Some(Color::NotVisited) | None => {
                        color.insert(child, Color::InProgress);
                        let grandchildren = canonical_children(game, child, &mut skipped);
                        children_of.insert(child, grandchildren);
                        stack.push((child, 0));
                    }
                }
            } else {
                color.insert(tier, Color::Closed);
                stack.pop();
            }
        }

        let mut parents: HashMap<Tier, ParentList> = HashMap::new();
        let mut state = HashMap::new();
        for (&tier, children) in &children_of {
            let unique_children: Vec<Tier> = children.iter().copied().unique().collect();
            for &child in &unique_children {
                let entry = parents.entry(child).or_default();
                if !entry.contains(&tier) {
                    entry.push(tier);
                }
            }
            let packed = (unique_children.len() as i64) * 4 + Color::Closed as i64;
            state.insert(tier, AtomicI64::new(packed));
        }

        let (ready_tx, ready_rx) = unbounded();
        let graph = Self { state, parents, ready_tx, ready_rx, root, skipped_tiers: skipped.len() as u64 };
        for (&tier, atomic) in &graph.state {
            if unsolved_children(atomic.load(Ordering::Relaxed)) == 0 {
                let _ = graph.ready_tx.send(tier);
            }
        }
        Ok(graph)
    }

    pub fn root(&self) -> Tier {
        self.root
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn child_tiers(&self, tier: Tier) -> Vec<Tier> {
        self.parents
            .iter()
            .filter_map(|(child, parents)| parents.contains(&tier).then_some(*child))
            .collect()
    }

    pub fn unsolved_children(&self, tier: Tier) -> Option<i64> {
        self.state.get(&tier).map(|a| unsolved_children(a.load(Ordering::Acquire)))
    }

    /// Count of distinct raw tiers that canonicalized away to some other tier during [`Self::build`]
    /// — non-canonical siblings, counted as "skipped" by [`crate::manager::SolverManager::solve`],
    /// since they never get their own graph node and [`Self::take_ready`] can never yield them.
    pub fn skipped_tier_count(&self) -> u64 {
        self.skipped_tiers
    }

    /// Pops a tier with zero unsolved children from the ready queue, or `None` if the queue is
    /// currently empty (which may change as concurrent `ChildSolved` calls push more work).
    pub fn take_ready(&self) -> Option<Tier> {
        self.ready_rx.try_recv().ok()
    }

    /// Decrements the unsolved-children counter of every canonical parent of `tier`, pushing any
    /// parent that reaches zero onto the ready queue. A CAS loop makes each decrement atomic
    /// without serializing unrelated parents against each other — two siblings of the same parent
    /// finishing concurrently must not both observe (and act on) the transition to zero.
    pub fn child_solved(&self, tier: Tier) {
        let Some(parents) = self.parents.get(&tier) else { return };
        for &parent in parents {
            let Some(atomic) = self.state.get(&parent) else { continue };
            loop {
                let current = atomic.load(Ordering::Acquire);
                let count = unsolved_children(current);
                let status = current & 0b11;
                debug_assert!(count > 0, "child_solved called more times than a parent has children");
                let new_count = (count - 1).max(0);
                let new = new_count * 4 + status;
                if atomic.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                    if new_count == 0 {
                        let _ = self.ready_tx.send(parent);
                    }
                    break;
                }
            }
        }
    }
}

fn unsolved_children(packed: i64) -> i64 {
    packed / 4
}

/// Canonicalizes `tier`'s raw child-tier list, recording in `skipped` every raw tier whose
/// canonical form differs from itself (a non-canonical sibling collapsed away), and dropping
/// same-tier edges (the child canonicalizes back to `tier` itself).
fn canonical_children(game: &dyn GameApi, tier: Tier, skipped: &mut HashSet<Tier>) -> Vec<Tier> {
    game.child_tiers(tier)
        .into_iter()
        .filter_map(|raw| {
            let canonical = game.canonical_tier(raw);
            if canonical != raw {
                skipped.insert(raw);
            }
            (canonical != tier).then_some(canonical)
        })
        .collect()
}

/// Property-tested DAG validity, used by [`tests`] below against randomly generated game graphs.
#[cfg(test)]
fn assert_acyclic(edges: &HashMap<Tier, Vec<Tier>>, root: Tier) {
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    let mut stack = vec![(root, 0usize)];
    visiting.insert(root);
    while !stack.is_empty() {
        let top = stack.len() - 1;
        let (tier, idx) = stack[top];
        let children = edges.get(&tier).cloned().unwrap_or_default();
        if idx < children.len() {
            let child = children[idx];
            stack[top].1 += 1;
            assert!(!visiting.contains(&child) || done.contains(&child), "cycle through {child:?}");
            if !done.contains(&child) {
                visiting.insert(child);
                stack.push((child, 0));
            }
        } else {
            visiting.remove(&tier);
            done.insert(tier);
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Move, Position, TierPosition, Value};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Minimal `GameApi` fixture that only exercises tier-level structure; position-level
    /// methods are unused by `TierGraph` and stubbed out.
    struct LayeredGame {
        edges: BTreeMap<u64, Vec<u64>>,
    }

    impl GameApi for LayeredGame {
        fn initial_tier(&self) -> Tier {
            Tier(0)
        }
        fn initial_position(&self) -> Position {
            Position(0)
        }
        fn tier_size(&self, _tier: Tier) -> u64 {
            1
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
            true
        }
        fn canonical_parent_positions(&self, _child: TierPosition, _parent_tier: Tier) -> Vec<Position> {
            vec![]
        }
        fn child_tiers(&self, tier: Tier) -> Vec<Tier> {
            self.edges.get(&tier.0).cloned().unwrap_or_default().into_iter().map(Tier).collect()
        }
        fn tier_name(&self, tier: Tier) -> String {
            format!("t{}", tier.0)
        }
    }

    #[test]
    fn cycle_is_rejected() {
        let game = LayeredGame { edges: BTreeMap::from([(0, vec![1]), (1, vec![0])]) };
        assert!(matches!(TierGraph::build(&game), Err(Error::IllegalTierGraph)));
    }

    #[test]
    fn chain_solves_in_order() {
        let game = LayeredGame { edges: BTreeMap::from([(0, vec![1, 2]), (1, vec![3]), (2, vec![3]), (3, vec![])]) };
        let graph = TierGraph::build(&game).unwrap();
        let ready = graph.take_ready();
        assert_eq!(ready, Some(Tier(3)));
        assert_eq!(graph.take_ready(), None);
        graph.child_solved(Tier(3));
        let mut next: Vec<_> = std::iter::from_fn(|| graph.take_ready()).collect();
        next.sort();
        assert_eq!(next, vec![Tier(1), Tier(2)]);
        graph.child_solved(Tier(1));
        assert_eq!(graph.take_ready(), None);
        graph.child_solved(Tier(2));
        assert_eq!(graph.take_ready(), Some(Tier(0)));
    }

    #[test]
    fn shared_child_decrements_once_per_parent() {
        let game = LayeredGame { edges: BTreeMap::from([(0, vec![1, 1]), (1, vec![])]) };
        let graph = TierGraph::build(&game).unwrap();
        assert_eq!(graph.take_ready(), Some(Tier(1)));
        graph.child_solved(Tier(1));
        assert_eq!(graph.take_ready(), Some(Tier(0)));
    }

    /// Tiers 2 and 3 are symmetric siblings of tier 1 (tier symmetry removal maps odd tiers down
    /// to the preceding even one): both should be counted skipped without ever becoming their own
    /// graph node or appearing in the ready queue.
    struct SymmetricGame {
        edges: BTreeMap<u64, Vec<u64>>,
    }

    impl GameApi for SymmetricGame {
        fn initial_tier(&self) -> Tier {
            Tier(0)
        }
        fn initial_position(&self) -> Position {
            Position(0)
        }
        fn tier_size(&self, _tier: Tier) -> u64 {
            1
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
            true
        }
        fn canonical_parent_positions(&self, _child: TierPosition, _parent_tier: Tier) -> Vec<Position> {
            vec![]
        }
        fn child_tiers(&self, tier: Tier) -> Vec<Tier> {
            self.edges.get(&tier.0).cloned().unwrap_or_default().into_iter().map(Tier).collect()
        }
        fn canonical_tier(&self, tier: Tier) -> Tier {
            if tier.0 % 2 == 1 {
                Tier(tier.0 - 1)
            } else {
                tier
            }
        }
        fn tier_name(&self, tier: Tier) -> String {
            format!("t{}", tier.0)
        }
    }

    #[test]
    fn non_canonical_siblings_are_counted_skipped() {
        let game = SymmetricGame { edges: BTreeMap::from([(0, vec![2, 3]), (2, vec![])]) };
        let graph = TierGraph::build(&game).unwrap();
        // Tier 2 is already canonical; tier 3 canonicalizes to tier 2. Both raw references
        // collapse onto the same canonical child, so the graph has exactly two nodes (0 and 2)
        // and exactly one raw tier — 3 — ever needed canonicalizing.
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.skipped_tier_count(), 1);
        assert_eq!(graph.take_ready(), Some(Tier(2)));
        graph.child_solved(Tier(2));
        assert_eq!(graph.take_ready(), Some(Tier(0)));
    }

    proptest! {
        /// Random DAGs (by construction: edges only point to strictly larger tier ids) never
        /// trip cycle detection and always converge to every tier solved.
        #[test]
        fn random_dag_has_acyclic_transitive_closure(n in 2usize..12, seed in any::<u64>()) {
            use std::collections::BTreeSet;
            let mut edges = BTreeMap::new();
            let mut rng = seed;
            let mut next = || { rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1); rng };
            for i in 0..n as u64 {
                let mut outs = BTreeSet::new();
                for j in (i + 1)..n as u64 {
                    if next() % 3 == 0 {
                        outs.insert(j);
                    }
                }
                edges.insert(i, outs.into_iter().collect());
            }
            let game = LayeredGame { edges };
            let full_edges: HashMap<Tier, Vec<Tier>> = game
                .edges
                .iter()
                .map(|(&t, cs)| (Tier(t), cs.iter().copied().map(Tier).collect()))
                .collect();
            assert_acyclic(&full_edges, Tier(0));
            let graph = TierGraph::build(&game).unwrap();

            // Topological readiness: draining the ready queue and calling `child_solved` after
            // each pop must eventually make every tier ready exactly once.
            let mut solved = HashSet::new();
            let mut solved_count = 0;
            while solved_count < graph.len() {
                let Some(tier) = graph.take_ready() else { break };
                let no_children: Vec<Tier> = Vec::new();
                for &child in full_edges.get(&tier).unwrap_or(&no_children) {
                    prop_assert!(solved.contains(&child) || child == tier, "tier {:?} went ready before child {:?}", tier, child);
                }
                prop_assert!(solved.insert(tier), "tier {:?} went ready twice", tier);
                solved_count += 1;
                graph.child_solved(tier);
            }
            prop_assert_eq!(solved_count, graph.len());
        }
    }
}
