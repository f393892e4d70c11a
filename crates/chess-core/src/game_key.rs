//! Stable, human-readable keys identifying a reviewed game.
//!
//! Format: `2024.09.15 - 20.30.05 [⬜ - ✅ vs opponent]`, i.e. the shifted UTC
//! timestamp, the reviewing player's colour, the outcome for that player and
//! the opponent's name.

use chrono::{NaiveDateTime, TimeDelta};

use crate::error::ChessError;
use crate::game_data::GameMetadata;
use crate::position::Side;

pub const WHITE_SYMBOL: &str = "⬜";
pub const BLACK_SYMBOL: &str = "⬛";

pub const WIN_SYMBOL: &str = "✅";
pub const DRAW_SYMBOL: &str = "🟰";
pub const LOSE_SYMBOL: &str = "⛔";

const TIMESTAMP_IN: &str = "%Y.%m.%d %H:%M:%S";
const TIMESTAMP_OUT: &str = "%Y.%m.%d - %H.%M.%S";

/// Outcome of a game from the reviewing player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn symbol(self) -> &'static str {
        match self {
            Outcome::Win => WIN_SYMBOL,
            Outcome::Draw => DRAW_SYMBOL,
            Outcome::Loss => LOSE_SYMBOL,
        }
    }
}

/// Colour played by `username` (anyone not listed as White is Black).
pub fn player_side(metadata: &GameMetadata, username: &str) -> Side {
    if metadata.white == username {
        Side::White
    } else {
        Side::Black
    }
}

/// The winner's name appears in the termination text; draws say "drawn".
pub fn outcome_for(termination: &str, username: &str) -> Outcome {
    if termination.contains(username) {
        Outcome::Win
    } else if termination.contains("drawn") {
        Outcome::Draw
    } else {
        Outcome::Loss
    }
}

/// Build the game key for `username`'s game, shifting the UTC timestamp by
/// `utc_offset_hours`.
pub fn game_key(
    metadata: &GameMetadata,
    username: &str,
    utc_offset_hours: i64,
) -> Result<String, ChessError> {
    let date = metadata
        .utc_date
        .as_deref()
        .ok_or(ChessError::MissingHeader("UTCDate"))?;
    let time = metadata
        .utc_time
        .as_deref()
        .ok_or(ChessError::MissingHeader("UTCTime"))?;
    let termination = metadata
        .termination
        .as_deref()
        .ok_or(ChessError::MissingHeader("Termination"))?;

    let stamp = format!("{date} {time}");
    let played_at = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_IN)
        .map_err(|e| ChessError::InvalidTimestamp(format!("{stamp}: {e}")))?;
    let key_date = TimeDelta::try_hours(utc_offset_hours)
        .and_then(|offset| played_at.checked_add_signed(offset))
        .ok_or_else(|| {
            ChessError::InvalidTimestamp(format!("{stamp} shifted by {utc_offset_hours}h"))
        })?
        .format(TIMESTAMP_OUT);

    let (colour, opponent) = match player_side(metadata, username) {
        Side::White => (WHITE_SYMBOL, metadata.black.as_str()),
        Side::Black => (BLACK_SYMBOL, metadata.white.as_str()),
    };
    let outcome = outcome_for(termination, username).symbol();

    Ok(format!("{key_date} [{colour} - {outcome} vs {opponent}]"))
}
