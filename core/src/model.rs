//! Core value types: [`Position`], [`Tier`], [`TierPosition`], [`Move`], [`Value`], [`Remoteness`]
//! and [`Record`], plus the [`GameApi`] contract the solver consumes.
//!
//! `Position`, `Tier`, and `Move` are `derive_more`-based 64-bit newtypes rather than bare
//! `u64`s, the same way small wrapped primitive values get their own `Copy` type with derived
//! traits instead of hand-written boilerplate impls elsewhere in the corpus.

use derive_more::{Display, From, Into};
use std::fmt::{Debug, Formatter};

/// 64-bit hash identifying a board configuration within a tier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Display, From, Into)]
pub struct Position(pub u64);

impl Debug for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Position({})", self.0)
    }
}

/// 64-bit identifier of a tier. The tier DAG is finite, acyclic, and has exactly one root.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Display, From, Into)]
pub struct Tier(pub u64);

impl Debug for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tier({})", self.0)
    }
}

/// 64-bit opaque move token; interpretation belongs to the game.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Display, From, Into)]
pub struct Move(pub u64);

impl Debug for Move {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Move({})", self.0)
    }
}

/// The canonical identity of a game state: a tier together with a position inside it.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Debug)]
pub struct TierPosition {
    pub tier: Tier,
    pub position: Position,
}

impl TierPosition {
    pub fn new(tier: Tier, position: Position) -> Self {
        Self { tier, position }
    }
}

impl std::fmt::Display for TierPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tier, self.position)
    }
}

/// Finite sum type of game-theoretic outcomes. `Undecided` is numeric 0 by convention: a
/// freshly allocated [`crate::record_array::RecordArray`] reads as "every position undecided"
/// without an explicit initialization pass.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, strum_macros::EnumIter,
)]
#[repr(u8)]
pub enum Value {
    Undecided = 0,
    Lose = 1,
    Draw = 2,
    Tie = 3,
    Win = 4,
}

impl Value {
    pub const COUNT: u16 = 5;

    pub const fn ordinal(self) -> u16 {
        self as u16
    }

    pub fn from_ordinal(ord: u16) -> Option<Self> {
        match ord {
            0 => Some(Value::Undecided),
            1 => Some(Value::Lose),
            2 => Some(Value::Draw),
            3 => Some(Value::Tie),
            4 => Some(Value::Win),
            _ => None,
        }
    }

    /// The value seen by the player to move at the parent of a child labeled `self`.
    pub fn flip(self) -> Self {
        match self {
            Value::Win => Value::Lose,
            Value::Lose => Value::Win,
            other => other,
        }
    }
}

/// Plies to forced terminal under optimal play (0 for primitive positions). Unused for `Draw`.
pub type Remoteness = u16;

/// Bound on remoteness imposed by the 16-bit [`Record`] encoding: 13 bits are left after the
/// 3 bits needed to distinguish 5 values, i.e. `remoteness < 2^13`.
pub const MAX_REMOTENESS: Remoteness = (1 << 13) - 1;

/// Sentinel remoteness returned by a failed probe.
pub const ERROR_REMOTENESS: i32 = -1;

/// Fixed 16-bit packed encoding of a `(Value, Remoteness)` pair: `remoteness * 5 + value_ordinal`.
#[derive(Copy, Clone, Eq, PartialEq, Default, Debug, From, Into)]
pub struct Record(pub u16);

impl Record {
    pub fn encode(value: Value, remoteness: Remoteness) -> Self {
        debug_assert!(remoteness <= MAX_REMOTENESS, "remoteness {remoteness} exceeds tier diameter bound");
        Record(remoteness * Value::COUNT + value.ordinal())
    }

    pub fn decode(self) -> (Value, Remoteness) {
        let value = Value::from_ordinal(self.0 % Value::COUNT).expect("corrupt record: bad value ordinal");
        let remoteness = self.0 / Value::COUNT;
        (value, remoteness)
    }

    pub fn value(self) -> Value {
        self.decode().0
    }

    pub fn remoteness(self) -> Remoteness {
        self.decode().1
    }
}

/// The game collaborator the solver core consumes. Implementations own move generation,
/// primitive-value detection and hashing; the core never inspects a [`Move`]'s bit layout.
///
/// `IsLegalPosition` is allowed to be pessimistic (return `true` when unsure), but `Primitive`
/// must be exact: the solver trusts it to seed Step 2 of value iteration.
pub trait GameApi: Send + Sync {
    fn initial_tier(&self) -> Tier;
    fn initial_position(&self) -> Position;
    fn tier_size(&self, tier: Tier) -> u64;
    fn generate_moves(&self, position: TierPosition) -> Vec<Move>;
    fn primitive(&self, position: TierPosition) -> Value;
    fn do_move(&self, position: TierPosition, mv: Move) -> TierPosition;
    fn is_legal_position(&self, position: TierPosition) -> bool;

    /// Identity unless the game implements position-symmetry removal.
    fn canonical_position(&self, position: TierPosition) -> Position {
        position.position
    }

    /// Default derivation: generate moves, apply, canonicalize, dedup. Games with a cheaper
    /// direct enumeration should override this.
    fn canonical_child_positions(&self, position: TierPosition) -> Vec<TierPosition> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for mv in self.generate_moves(position) {
            let child = self.do_move(position, mv);
            let canon_tier = self.canonical_tier(child.tier);
            let canon_pos = self.canonical_position(TierPosition::new(canon_tier, child.position));
            let canon = TierPosition::new(canon_tier, canon_pos);
            if seen.insert(canon) {
                out.push(canon);
            }
        }
        out
    }

    fn num_canonical_child_positions(&self, position: TierPosition) -> usize {
        self.canonical_child_positions(position).len()
    }

    fn canonical_parent_positions(&self, child: TierPosition, parent_tier: Tier) -> Vec<Position>;

    fn child_tiers(&self, tier: Tier) -> Vec<Tier>;

    /// Identity unless tier symmetry is enabled.
    fn canonical_tier(&self, tier: Tier) -> Tier {
        tier
    }

    /// A filename-safe name for `tier`, at most 63 bytes.
    fn tier_name(&self, tier: Tier) -> String;
}
