//! Immutable board positions backed by shakmaty.

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position as _};

use crate::error::ChessError;

/// A player's colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// Side that plays the ply with the given zero-based index, for games
    /// starting with White to move.
    pub fn of_ply(index: usize) -> Self {
        if index % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// Whether the game can continue from a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Ongoing,
    /// The side to move has been checkmated
    Checkmate,
    Stalemate,
    InsufficientMaterial,
}

/// A board state reachable from a game's start position.
#[derive(Debug, Clone)]
pub struct Position {
    board: Chess,
    fen: String,
}

impl Position {
    /// The standard starting position
    pub fn initial() -> Self {
        Self::from_board(Chess::default())
    }

    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        let parsed: Fen = fen
            .trim()
            .parse()
            .map_err(|e| ChessError::InvalidFen(format!("{fen}: {e}")))?;
        let board: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| ChessError::InvalidFen(format!("{fen}: {e}")))?;
        Ok(Self::from_board(board))
    }

    fn from_board(board: Chess) -> Self {
        let fen = Fen::from_position(&board, EnPassantMode::Legal).to_string();
        Self { board, fen }
    }

    /// Canonical FEN encoding
    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn side_to_move(&self) -> Side {
        self.board.turn().into()
    }

    pub fn status(&self) -> PositionStatus {
        if self.board.is_checkmate() {
            PositionStatus::Checkmate
        } else if self.board.is_stalemate() {
            PositionStatus::Stalemate
        } else if self.board.is_insufficient_material() {
            PositionStatus::InsufficientMaterial
        } else {
            PositionStatus::Ongoing
        }
    }

    /// Apply a move given in SAN or UCI notation.
    /// Returns the successor position and the move in UCI notation.
    pub fn play(&self, notation: &str) -> Result<(Position, String), ChessError> {
        let mv = self.parse_move(notation)?;
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let mut board = self.board.clone();
        board.play_unchecked(mv);
        Ok((Self::from_board(board), uci))
    }

    fn parse_move(&self, notation: &str) -> Result<Move, ChessError> {
        let clean = notation
            .trim()
            .trim_end_matches(|c: char| c == '+' || c == '#' || c == '!' || c == '?');

        if let Ok(san) = clean.parse::<San>() {
            if let Ok(mv) = san.to_move(&self.board) {
                return Ok(mv);
            }
        }
        if let Ok(uci) = clean.parse::<UciMove>() {
            if let Ok(mv) = uci.to_move(&self.board) {
                return Ok(mv);
            }
        }

        Err(ChessError::IllegalMove {
            notation: notation.to_string(),
            fen: self.fen.clone(),
        })
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::initial()
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for Position {}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}
