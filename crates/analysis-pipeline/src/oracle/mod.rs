//! Position-evaluation backends.
//!
//! A stateful engine and a stateless web service are driven through the same
//! [`Oracle`] interface: set a start position, advance it one move at a time
//! and ask for an evaluation of the current position. Backends that can score
//! arbitrary positions independently also implement [`StatelessOracle`] so
//! the pipeline can issue requests concurrently.

pub mod remote;
pub mod stockfish;

use std::future::Future;

use chess_core::{Position, PositionStatus};

use crate::error::OracleError;
use crate::evaluation::{Evaluation, EvaluationResult};

pub use remote::RemoteOracle;
pub use stockfish::StockfishEngine;

pub trait Oracle: Send {
    /// Reset the oracle's current position.
    fn set_position(
        &mut self,
        position: &Position,
    ) -> impl Future<Output = Result<(), OracleError>> + Send;

    /// Play one move (UCI notation) on the current position.
    fn advance(&mut self, uci: &str) -> impl Future<Output = Result<(), OracleError>> + Send;

    /// Evaluate the current position. Scores are normalized to White's
    /// point of view.
    fn evaluate(
        &mut self,
        depth: u32,
    ) -> impl Future<Output = Result<EvaluationResult, OracleError>> + Send;
}

/// Oracles that evaluate explicit positions without shared mutable state.
pub trait StatelessOracle: Sync {
    fn evaluate_at(
        &self,
        position: &Position,
        depth: u32,
    ) -> impl Future<Output = Result<EvaluationResult, OracleError>> + Send;
}

/// Verdict for positions where the game is already over, so no backend has
/// to be asked about them.
pub fn terminal_evaluation(position: &Position) -> Option<EvaluationResult> {
    let evaluation = match position.status() {
        PositionStatus::Ongoing => return None,
        PositionStatus::Checkmate => Evaluation::Mate {
            winner: position.side_to_move().opponent(),
            moves: 0,
        },
        PositionStatus::Stalemate | PositionStatus::InsufficientMaterial => Evaluation::Neutral,
    };
    Some(EvaluationResult::new(evaluation))
}
