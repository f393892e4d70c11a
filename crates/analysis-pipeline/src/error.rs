//! Pipeline error types

use std::path::PathBuf;

use chess_core::ChessError;
use thiserror::Error;

use crate::record::AnalysisResult;

/// Failure of a single oracle interaction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Transport(String),

    #[error("Oracle rate limited: {0}")]
    RateLimited(String),

    #[error("Oracle rejected request: {0}")]
    Rejected(String),

    #[error("Malformed oracle response: {0}")]
    Malformed(String),

    #[error("Oracle authentication failed: {0}")]
    Unauthorized(String),

    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("Oracle position error: {0}")]
    Position(#[from] ChessError),
}

impl OracleError {
    /// Fatal errors abort the whole run; anything else only costs the
    /// affected evaluation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OracleError::Unauthorized(_) | OracleError::Stockfish(_) | OracleError::Position(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("Invalid cache pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid game: {0}")]
    InvalidGame(#[from] ChessError),

    #[error("Invalid game: no moves to analyse")]
    EmptyGame,

    #[error("Oracle failed at position {position}: {source}")]
    Oracle {
        position: usize,
        #[source]
        source: OracleError,
    },

    /// The analysis finished but could not be persisted; the result is kept.
    #[error("Analysis of '{}' completed but was not saved: {source}", analysis.game_key)]
    Persist {
        analysis: Box<AnalysisResult>,
        #[source]
        source: CacheError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl PipelineError {
    /// The completed analysis carried by a persistence failure, if any.
    pub fn into_analysis(self) -> Option<AnalysisResult> {
        match self {
            PipelineError::Persist { analysis, .. } => Some(*analysis),
            _ => None,
        }
    }
}
