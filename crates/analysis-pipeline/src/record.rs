//! Per-ply analysis rows and the per-game result they make up.

use chess_core::Side;
use serde::Serialize;

use crate::classification::Label;
use crate::evaluation::EvaluationResult;
use crate::win_probability::WinProbabilityPair;

/// One analysed ply. Fields the oracle could not provide stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    pub ply: usize,
    /// Colour that played the move
    pub side: Side,
    /// Move as written in the game
    pub notation: String,
    pub uci: String,
    /// Oracle verdict on the position before the move
    pub evaluation: Option<EvaluationResult>,
    pub prob_before: Option<f64>,
    pub prob_after: Option<f64>,
    pub prob_drop: Option<f64>,
    pub label: Option<Label>,
}

impl MoveRecord {
    /// 0 for the game's first mover, 1 for the second. A game set up with
    /// Black to move has Black as player 0.
    pub fn player(&self) -> u8 {
        (self.ply % 2) as u8
    }

    pub fn best_move(&self) -> Option<&str> {
        self.evaluation.as_ref()?.best_move.as_deref()
    }

    pub fn probabilities(&self) -> Option<WinProbabilityPair> {
        Some(WinProbabilityPair {
            before: self.prob_before?,
            after: self.prob_after?,
        })
    }

    /// True when an oracle failure left this row without a label.
    pub fn is_degraded(&self) -> bool {
        self.label.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    pub best: u32,
    pub excellent: u32,
    pub good: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
    pub miss: u32,
    pub great_move: u32,
    pub unclassified: u32,
}

impl LabelCounts {
    fn add(&mut self, label: Option<Label>) {
        match label {
            Some(Label::Best) => self.best += 1,
            Some(Label::Excellent) => self.excellent += 1,
            Some(Label::Good) => self.good += 1,
            Some(Label::Inaccuracy) => self.inaccuracy += 1,
            Some(Label::Mistake) => self.mistake += 1,
            Some(Label::Blunder) => self.blunder += 1,
            Some(Label::Miss) => self.miss += 1,
            Some(Label::GreatMove) => self.great_move += 1,
            None => self.unclassified += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.best
            + self.excellent
            + self.good
            + self.inaccuracy
            + self.mistake
            + self.blunder
            + self.miss
            + self.great_move
            + self.unclassified
    }
}

/// Ordered analysis of one game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub game_key: String,
    pub records: Vec<MoveRecord>,
}

impl AnalysisResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn label_counts(&self, player: Side) -> LabelCounts {
        let mut counts = LabelCounts::default();
        for record in self.records.iter().filter(|r| r.side == player) {
            counts.add(record.label);
        }
        counts
    }

    pub fn degraded_plies(&self) -> Vec<usize> {
        self.records
            .iter()
            .filter(|r| r.is_degraded())
            .map(|r| r.ply)
            .collect()
    }

    /// Graph values per ply (see [`Evaluation::display_value`]).
    /// A level final value repeats the previous point instead of dropping
    /// to zero.
    ///
    /// [`Evaluation::display_value`]: crate::evaluation::Evaluation::display_value
    pub fn evaluation_series(&self) -> Vec<Option<i32>> {
        let mut series: Vec<Option<i32>> = self
            .records
            .iter()
            .map(|r| r.evaluation.as_ref().map(|e| e.evaluation.display_value()))
            .collect();

        let n = series.len();
        if n >= 2 && series[n - 1] == Some(0) {
            series[n - 1] = series[n - 2];
        }
        series
    }
}
