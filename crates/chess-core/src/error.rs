use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Illegal move '{notation}' in position {fen}")]
    IllegalMove { notation: String, fen: String },

    #[error("Missing PGN header: {0}")]
    MissingHeader(&'static str),

    #[error("Invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
