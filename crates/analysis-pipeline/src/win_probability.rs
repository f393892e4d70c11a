//! Win-probability model: evaluations mapped onto [0, 1].

use std::str::FromStr;

use chess_core::Side;

use crate::evaluation::{Evaluation, EvaluationResult};

/// Centipawn scores saturate beyond this bound
pub const CENTIPAWN_CLIP: i32 = 400;

/// Logistic slope of the Lichess winning-chances curve
const LOGISTIC_SLOPE: f64 = 0.00368208;

/// Probability that White wins for a centipawn score.
pub fn centipawn_win_probability(cp: i32) -> f64 {
    let clipped = cp.clamp(-CENTIPAWN_CLIP, CENTIPAWN_CLIP) as f64;
    1.0 / (1.0 + (-LOGISTIC_SLOPE * clipped).exp())
}

/// Probability that White wins. Mates saturate, neutral positions sit at 0.5.
pub fn white_win_probability(evaluation: &Evaluation) -> f64 {
    match evaluation {
        Evaluation::Centipawns(cp) => centipawn_win_probability(*cp),
        Evaluation::Mate { winner: Side::White, .. } => 1.0,
        Evaluation::Mate { winner: Side::Black, .. } => 0.0,
        Evaluation::Neutral => 0.5,
    }
}

/// Probability that `side` wins.
pub fn win_probability(evaluation: &Evaluation, side: Side) -> f64 {
    from_white(white_win_probability(evaluation), side)
}

fn from_white(p: f64, side: Side) -> f64 {
    match side {
        Side::White => p,
        Side::Black => 1.0 - p,
    }
}

/// Where win probabilities come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProbabilitySource {
    /// Clipped centipawn curve
    #[default]
    Evaluation,
    /// Engine win/draw/loss distribution when available, else the curve
    Outcomes,
}

impl ProbabilitySource {
    pub fn probability(self, result: &EvaluationResult, side: Side) -> f64 {
        match (self, &result.evaluation, result.outcomes) {
            (ProbabilitySource::Outcomes, Evaluation::Centipawns(_), Some(counts)) => counts
                .expected_score()
                .map(|p| from_white(p, side))
                .unwrap_or_else(|| win_probability(&result.evaluation, side)),
            _ => win_probability(&result.evaluation, side),
        }
    }
}

impl FromStr for ProbabilitySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evaluation" | "eval" | "cp" => Ok(ProbabilitySource::Evaluation),
            "outcomes" | "wdl" => Ok(ProbabilitySource::Outcomes),
            other => Err(format!("unknown probability source '{other}'")),
        }
    }
}

/// Mover's win probability before and after a ply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinProbabilityPair {
    pub before: f64,
    pub after: f64,
}
