use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::schema::{Outcome, Role};

/// Cells one side occupies on the 3x3 board, one bit per cell.
///
/// Bit `0` is the top-left cell, bit `8` the bottom-right one; rows are
/// packed three bits at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board(u16);

impl Board {
    pub const EMPTY: Board = Board(0);
    pub const FULL: Board = Board(0x01FF);

    /// Rows, columns and both diagonals.
    pub const LINES: [Board; 8] = [
        Board(0x0007),
        Board(0x0007 << 3),
        Board(0x0007 << 6),
        Board(0x0049),
        Board(0x0049 << 1),
        Board(0x0049 << 2),
        Board(0x0111),
        Board(0x0054),
    ];

    /// Accepts any mask that stays inside the nine cells.
    pub fn from_bits(bits: u16) -> Option<Self> {
        (bits & !Self::FULL.0 == 0).then_some(Board(bits))
    }

    /// A single-cell mask, as sent by a player making a move.
    pub fn cell(bits: u16) -> Option<Self> {
        Self::from_bits(bits).filter(|b| b.len() == 1)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersects(self, other: Board) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, other: Board) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn has_line(self) -> bool {
        Self::LINES.iter().any(|line| self.contains(*line))
    }
}

impl BitOr for Board {
    type Output = Board;

    fn bitor(self, rhs: Board) -> Board {
        Board(self.0 | rhs.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            if row > 0 {
                writeln!(f)?;
            }
            for col in 0..3 {
                let bit = 1 << (row * 3 + col);
                write!(f, "{}", if self.0 & bit != 0 { '1' } else { '0' })?;
            }
        }
        Ok(())
    }
}

/// Result of scoring a position from the point of view of the side that just
/// moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Going,
    Draw,
    MoverWins,
    OpponentWins,
}

impl Verdict {
    /// Translates the mover-relative verdict into an absolute outcome.
    pub fn for_mover(self, mover: Role) -> Outcome {
        match self {
            Verdict::Going => Outcome::Going,
            Verdict::Draw => Outcome::Draw,
            Verdict::MoverWins => Outcome::win_for(mover),
            Verdict::OpponentWins => Outcome::win_for(mover.other()),
        }
    }
}

/// Pure scoring function consulted by the move transition.
pub trait OutcomeEvaluator: Send + Sync {
    fn evaluate(&self, mover: Board, opponent: Board) -> Verdict;
}

/// Classic three-in-a-row scoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lines;

impl OutcomeEvaluator for Lines {
    fn evaluate(&self, mover: Board, opponent: Board) -> Verdict {
        if mover.has_line() {
            Verdict::MoverWins
        } else if opponent.has_line() {
            Verdict::OpponentWins
        } else if (mover | opponent).contains(Board::FULL) {
            Verdict::Draw
        } else {
            Verdict::Going
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(bits: u16) -> Board {
        Board::from_bits(bits).unwrap()
    }

    #[test]
    fn cell_requires_exactly_one_bit_on_the_board() {
        assert_eq!(Board::cell(0b1), Some(board(1)));
        assert_eq!(Board::cell(1 << 8), Some(board(0x100)));
        assert_eq!(Board::cell(0), None);
        assert_eq!(Board::cell(0b11), None);
        assert_eq!(Board::cell(1 << 9), None);
    }

    #[test]
    fn every_line_is_detected() {
        for line in Board::LINES {
            assert!(line.has_line(), "{line}");
            assert_eq!(line.len(), 3);
        }
        assert!(!board(0b000_010_101).has_line());
    }

    #[test]
    fn evaluator_scores_from_the_movers_side() {
        let lines = Lines;
        assert_eq!(lines.evaluate(board(0b111), board(0b11000)), Verdict::MoverWins);
        assert_eq!(lines.evaluate(board(0b11000), board(0b111)), Verdict::OpponentWins);
        assert_eq!(lines.evaluate(board(0b1), board(0b10)), Verdict::Going);
    }

    #[test]
    fn full_board_without_line_is_a_draw() {
        // x o x / x o o / o x x
        let x = board(0b110_001_101);
        let o = board(0b001_110_010);
        assert!(!x.intersects(o));
        assert_eq!(Lines.evaluate(x, o), Verdict::Draw);
    }

    #[test]
    fn verdict_maps_onto_roles() {
        assert_eq!(Verdict::MoverWins.for_mover(Role::SideB), Outcome::SideBWin);
        assert_eq!(Verdict::OpponentWins.for_mover(Role::SideB), Outcome::SideAWin);
        assert_eq!(Verdict::Draw.for_mover(Role::SideA), Outcome::Draw);
    }

    #[test]
    fn display_renders_rows() {
        assert_eq!(board(0b100_010_001).to_string(), "100\n010\n001");
    }
}
