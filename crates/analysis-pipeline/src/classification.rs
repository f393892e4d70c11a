//! Move classification. Pure functions only
//! (No Position/Cache/Oracle dependencies)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification thresholds (win-probability drop, upper bound inclusive)
const THRESHOLD_EXCELLENT: f64 = 0.02;
const THRESHOLD_GOOD: f64 = 0.05;
const THRESHOLD_INACCURACY: f64 = 0.10;
const THRESHOLD_MISTAKE: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Best,
    Excellent,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
    Miss,
    #[serde(rename = "Great Move")]
    GreatMove,
}

impl Label {
    pub const ALL: [Label; 8] = [
        Label::Best,
        Label::Excellent,
        Label::Good,
        Label::Inaccuracy,
        Label::Mistake,
        Label::Blunder,
        Label::Miss,
        Label::GreatMove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Best => "Best",
            Label::Excellent => "Excellent",
            Label::Good => "Good",
            Label::Inaccuracy => "Inaccuracy",
            Label::Mistake => "Mistake",
            Label::Blunder => "Blunder",
            Label::Miss => "Miss",
            Label::GreatMove => "Great Move",
        }
    }

    /// Labels after which the next move is judged with hysteresis
    pub fn is_serious_error(self) -> bool {
        matches!(self, Label::Mistake | Label::Blunder | Label::Miss)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("unknown label '{s}'"))
    }
}

/// Win-probability lost by the mover; gains count as zero.
pub fn probability_drop(prob_before: f64, prob_after: f64) -> f64 {
    (prob_before - prob_after).max(0.0)
}

/// Label from the drop alone, before looking at the previous ply.
pub fn base_label(drop: f64, played_best: bool) -> Label {
    if drop == 0.0 || played_best {
        Label::Best
    } else if drop <= THRESHOLD_EXCELLENT {
        Label::Excellent
    } else if drop <= THRESHOLD_GOOD {
        Label::Good
    } else if drop <= THRESHOLD_INACCURACY {
        Label::Inaccuracy
    } else if drop <= THRESHOLD_MISTAKE {
        Label::Mistake
    } else {
        Label::Blunder
    }
}

/// A best move straight after a serious error is a Great Move; a second
/// serious error in a row is a Miss.
pub fn apply_hysteresis(base: Label, previous: Option<Label>) -> Label {
    match previous {
        Some(prev) if prev.is_serious_error() => match base {
            Label::Best => Label::GreatMove,
            Label::Mistake | Label::Blunder => Label::Miss,
            other => other,
        },
        _ => base,
    }
}

pub fn label_for(drop: f64, played_best: bool, previous: Option<Label>) -> Label {
    apply_hysteresis(base_label(drop, played_best), previous)
}

/// Classify one ply. Returns the probability drop and the label.
pub fn classify(
    prob_before: f64,
    prob_after: f64,
    move_played: &str,
    best_move: Option<&str>,
    previous: Option<Label>,
) -> (f64, Label) {
    let drop = probability_drop(prob_before, prob_after);
    let played_best = best_move == Some(move_played);
    (drop, label_for(drop, played_best, previous))
}
