//! Oracle output normalized to White's point of view.

use std::fmt;

use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::win_probability::CENTIPAWN_CLIP;

/// Value used for forced mates on the evaluation graph
pub const MATE_DISPLAY_VALUE: i32 = 450;

/// Position evaluation. Positive centipawns favour White.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    Centipawns(i32),
    /// Forced mate for `winner`; `moves == 0` means the loser is already mated
    Mate { winner: Side, moves: u32 },
    /// Drawn or dead position
    Neutral,
}

impl Evaluation {
    /// Convert a UCI-style score (relative to the side to move).
    pub fn from_side_to_move(cp: Option<i32>, mate: Option<i32>, side_to_move: Side) -> Option<Self> {
        if let Some(m) = mate {
            let winner = if m > 0 {
                side_to_move
            } else {
                side_to_move.opponent()
            };
            return Some(Evaluation::Mate {
                winner,
                moves: m.unsigned_abs(),
            });
        }
        cp.map(|c| match side_to_move {
            Side::White => Evaluation::Centipawns(c),
            Side::Black => Evaluation::Centipawns(-c),
        })
    }

    /// Mate distance signed from White's point of view. Zero means the side
    /// to move is mated.
    pub fn from_white_mate(mate: i32, side_to_move: Side) -> Self {
        let winner = match mate.signum() {
            1 => Side::White,
            -1 => Side::Black,
            _ => side_to_move.opponent(),
        };
        Evaluation::Mate {
            winner,
            moves: mate.unsigned_abs(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Evaluation::Centipawns(_) => "cp",
            Evaluation::Mate { .. } => "mate",
            Evaluation::Neutral => "neutral",
        }
    }

    /// Exactly level: a neutral verdict or a raw score of zero.
    pub fn is_neutral_zero(&self) -> bool {
        matches!(self, Evaluation::Neutral | Evaluation::Centipawns(0))
    }

    /// Value plotted on the evaluation graph: centipawns clipped to the
    /// probability model's range, mates pinned just outside it.
    pub fn display_value(&self) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => (*cp).clamp(-CENTIPAWN_CLIP, CENTIPAWN_CLIP),
            Evaluation::Mate { winner: Side::White, .. } => MATE_DISPLAY_VALUE,
            Evaluation::Mate { winner: Side::Black, .. } => -MATE_DISPLAY_VALUE,
            Evaluation::Neutral => 0,
        }
    }

    /// Persisted value column. Mates always carry an explicit sign so that
    /// "mated now" keeps its winner.
    pub fn encode_value(&self) -> String {
        match self {
            Evaluation::Centipawns(cp) => cp.to_string(),
            Evaluation::Mate { winner: Side::White, moves } => format!("+{moves}"),
            Evaluation::Mate { winner: Side::Black, moves } => format!("-{moves}"),
            Evaluation::Neutral => "0".to_string(),
        }
    }

    pub fn decode(kind: &str, value: &str) -> Option<Self> {
        match kind {
            "cp" => value.parse().ok().map(Evaluation::Centipawns),
            "mate" => {
                let (winner, digits) = match value.as_bytes().first()? {
                    b'+' => (Side::White, &value[1..]),
                    b'-' => (Side::Black, &value[1..]),
                    _ => return None,
                };
                let moves = digits.parse().ok()?;
                Some(Evaluation::Mate { winner, moves })
            }
            "neutral" => Some(Evaluation::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Evaluation::Mate { winner: Side::White, moves } => write!(f, "+M{moves}"),
            Evaluation::Mate { winner: Side::Black, moves } => write!(f, "-M{moves}"),
            Evaluation::Neutral => f.write_str("draw"),
        }
    }
}

/// Win/draw/loss distribution (per mille) from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub win: u32,
    pub draw: u32,
    pub loss: u32,
}

impl OutcomeCounts {
    /// Convert a UCI `wdl` triple reported for the side to move.
    pub fn from_side_to_move(win: u32, draw: u32, loss: u32, side_to_move: Side) -> Self {
        match side_to_move {
            Side::White => Self { win, draw, loss },
            Side::Black => Self {
                win: loss,
                draw,
                loss: win,
            },
        }
    }

    pub fn total(&self) -> u32 {
        self.win + self.draw + self.loss
    }

    /// Expected score for White, counting a draw as half a win.
    pub fn expected_score(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some((self.win as f64 + 0.5 * self.draw as f64) / total as f64)
    }
}

/// Everything the oracle reports about one position.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub evaluation: Evaluation,
    /// Suggested move in UCI notation
    pub best_move: Option<String>,
    /// Principal continuation in UCI notation
    pub continuation: Vec<String>,
    pub outcomes: Option<OutcomeCounts>,
}

impl EvaluationResult {
    pub fn new(evaluation: Evaluation) -> Self {
        Self {
            evaluation,
            best_move: None,
            continuation: Vec::new(),
            outcomes: None,
        }
    }

    pub fn with_best_move(mut self, best_move: impl Into<String>) -> Self {
        self.best_move = Some(best_move.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_to_move_normalization() {
        assert_eq!(
            Evaluation::from_side_to_move(Some(35), None, Side::White),
            Some(Evaluation::Centipawns(35))
        );
        assert_eq!(
            Evaluation::from_side_to_move(Some(35), None, Side::Black),
            Some(Evaluation::Centipawns(-35))
        );
        assert_eq!(
            Evaluation::from_side_to_move(None, Some(3), Side::Black),
            Some(Evaluation::Mate { winner: Side::Black, moves: 3 })
        );
        // Mate 0: the side to move is already mated
        assert_eq!(
            Evaluation::from_side_to_move(None, Some(0), Side::White),
            Some(Evaluation::Mate { winner: Side::Black, moves: 0 })
        );
        assert_eq!(Evaluation::from_side_to_move(None, None, Side::White), None);
    }

    #[test]
    fn test_white_mate_sign() {
        assert_eq!(
            Evaluation::from_white_mate(-2, Side::White),
            Evaluation::Mate { winner: Side::Black, moves: 2 }
        );
        assert_eq!(
            Evaluation::from_white_mate(0, Side::Black),
            Evaluation::Mate { winner: Side::White, moves: 0 }
        );
    }

    #[test]
    fn test_encode_decode() {
        for eval in [
            Evaluation::Centipawns(-120),
            Evaluation::Mate { winner: Side::White, moves: 0 },
            Evaluation::Mate { winner: Side::Black, moves: 0 },
            Evaluation::Mate { winner: Side::Black, moves: 7 },
            Evaluation::Neutral,
        ] {
            assert_eq!(Evaluation::decode(eval.kind(), &eval.encode_value()), Some(eval));
        }
        assert_eq!(Evaluation::decode("mate", "3"), None);
        assert_eq!(Evaluation::decode("bogus", "3"), None);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(Evaluation::Centipawns(1200).display_value(), 400);
        assert_eq!(Evaluation::Centipawns(-35).display_value(), -35);
        assert_eq!(
            Evaluation::Mate { winner: Side::Black, moves: 4 }.display_value(),
            -450
        );
    }

    #[test]
    fn test_outcome_counts() {
        let counts = OutcomeCounts::from_side_to_move(600, 300, 100, Side::Black);
        assert_eq!(counts, OutcomeCounts { win: 100, draw: 300, loss: 600 });
        assert_eq!(counts.expected_score(), Some(0.25));
        assert_eq!(OutcomeCounts { win: 0, draw: 0, loss: 0 }.expected_score(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Evaluation::Centipawns(35).to_string(), "+0.35");
        assert_eq!(Evaluation::Mate { winner: Side::Black, moves: 2 }.to_string(), "-M2");
    }
}
