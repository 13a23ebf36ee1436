//! Bundled demonstration games for the `gamesman` binary: a one-move win and 3x3 tic-tac-toe.
//! Neither is exposed as a library API; they exist so the CLI has something to solve and query
//! out of the box, the way a chess engine binary ships a starting position without a GUI attached.

use gamesman_core::{GameApi, Move, Position, Tier, TierPosition, Value};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum GameChoice {
    TrivialWin,
    TicTacToe,
}

impl GameChoice {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "trivial-win" | "trivialwin" => Some(GameChoice::TrivialWin),
            "tic-tac-toe" | "tictactoe" | "ttt" => Some(GameChoice::TicTacToe),
            _ => None,
        }
    }

    pub fn names() -> String {
        GameChoice::iter().map(|g| g.to_string()).collect::<Vec<_>>().join(", ")
    }

    pub fn game(self) -> Box<dyn GameApi> {
        match self {
            GameChoice::TrivialWin => Box::new(TrivialWin),
            GameChoice::TicTacToe => Box::new(TicTacToe),
        }
    }
}

/// A single position from which the only move leads directly to a primitive loss for the mover
/// who receives it — so the root is a win in one ply. One tier, two positions: `0` (the start)
/// and `1` (after the move).
pub struct TrivialWin;

impl GameApi for TrivialWin {
    fn initial_tier(&self) -> Tier {
        Tier(0)
    }

    fn initial_position(&self) -> Position {
        Position(0)
    }

    fn tier_size(&self, _tier: Tier) -> u64 {
        2
    }

    fn generate_moves(&self, position: TierPosition) -> Vec<Move> {
        if position.position == Position(0) {
            vec![Move(0)]
        } else {
            vec![]
        }
    }

    fn primitive(&self, position: TierPosition) -> Value {
        if position.position == Position(1) {
            Value::Lose
        } else {
            Value::Undecided
        }
    }

    fn do_move(&self, position: TierPosition, _mv: Move) -> TierPosition {
        TierPosition::new(position.tier, Position(1))
    }

    fn is_legal_position(&self, _position: TierPosition) -> bool {
        true
    }

    fn canonical_parent_positions(&self, child: TierPosition, parent_tier: Tier) -> Vec<Position> {
        if parent_tier == Tier(0) && child.position == Position(1) {
            vec![Position(0)]
        } else {
            vec![]
        }
    }

    fn child_tiers(&self, _tier: Tier) -> Vec<Tier> {
        vec![]
    }

    fn tier_name(&self, tier: Tier) -> String {
        format!("trivial-win-t{}", tier.0)
    }
}

/// Player mark on a tic-tac-toe cell: `0` empty, `1` X, `2` O.
const EMPTY: u64 = 0;
const X: u64 = 1;
const O: u64 = 2;

fn decode(position: Position) -> [u64; 9] {
    let mut cells = [EMPTY; 9];
    let mut n = position.0;
    for c in cells.iter_mut() {
        *c = n % 4;
        n /= 4;
    }
    cells
}

fn encode(cells: [u64; 9]) -> Position {
    let mut n = 0u64;
    for &c in cells.iter().rev() {
        n = n * 4 + c;
    }
    Position(n)
}

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

fn winner(cells: &[u64; 9]) -> Option<u64> {
    LINES
        .iter()
        .map(|line| line.map(|i| cells[i]))
        .find(|[a, b, c]| *a != EMPTY && a == b && b == c)
        .map(|[a, ..]| a)
}

/// Standard 3x3 tic-tac-toe. Tier is the number of pieces already placed (`0..=9`); X always
/// moves on even tiers. Positions are base-4 encodings of the 9 cells, oversized against the
/// legal subset the way a generic-hash scheme leaves gaps for illegal piece counts rather than
/// enumerating only reachable boards.
pub struct TicTacToe;

impl GameApi for TicTacToe {
    fn initial_tier(&self) -> Tier {
        Tier(0)
    }

    fn initial_position(&self) -> Position {
        Position(0)
    }

    fn tier_size(&self, _tier: Tier) -> u64 {
        4u64.pow(9)
    }

    fn generate_moves(&self, position: TierPosition) -> Vec<Move> {
        if self.primitive(position) != Value::Undecided {
            return vec![];
        }
        let cells = decode(position.position);
        (0..9).filter(|&i| cells[i] == EMPTY).map(|i| Move(i as u64)).collect()
    }

    fn primitive(&self, position: TierPosition) -> Value {
        let cells = decode(position.position);
        if winner(&cells).is_some() {
            Value::Lose
        } else if position.tier.0 >= 9 {
            Value::Tie
        } else {
            Value::Undecided
        }
    }

    fn do_move(&self, position: TierPosition, mv: Move) -> TierPosition {
        let mark = if position.tier.0 % 2 == 0 { X } else { O };
        let mut cells = decode(position.position);
        cells[mv.0 as usize] = mark;
        TierPosition::new(Tier(position.tier.0 + 1), encode(cells))
    }

    fn is_legal_position(&self, position: TierPosition) -> bool {
        let cells = decode(position.position);
        let placed = position.tier.0 as usize;
        let xs = cells.iter().filter(|&&c| c == X).count();
        let os = cells.iter().filter(|&&c| c == O).count();
        xs + os == placed && (xs == os || xs == os + 1)
    }

    /// A parent placed one mark, on one empty-now-filled cell of `child`, to reach `child`; only
    /// `parent_tier == child.tier - 1` can be a parent at all. Mirrors [`TrivialWin`]'s pattern:
    /// undo each candidate cell and keep it only if the result is itself a legal position.
    fn canonical_parent_positions(&self, child: TierPosition, parent_tier: Tier) -> Vec<Position> {
        if parent_tier.0 + 1 != child.tier.0 {
            return vec![];
        }
        let mark = if parent_tier.0 % 2 == 0 { X } else { O };
        let cells = decode(child.position);
        (0..9)
            .filter(|&i| cells[i] == mark)
            .filter_map(|i| {
                let mut parent_cells = cells;
                parent_cells[i] = EMPTY;
                let parent = TierPosition::new(parent_tier, encode(parent_cells));
                self.is_legal_position(parent).then_some(parent.position)
            })
            .collect()
    }

    fn child_tiers(&self, tier: Tier) -> Vec<Tier> {
        if tier.0 < 9 {
            vec![Tier(tier.0 + 1)]
        } else {
            vec![]
        }
    }

    fn tier_name(&self, tier: Tier) -> String {
        format!("ttt-{}", tier.0)
    }
}
