//! Stockfish web service client.
//!
//! Each request carries a full FEN, so the client is stateless apart from the
//! position remembered for [`Oracle::evaluate`].

use std::sync::LazyLock;
use std::time::Duration;

use chess_core::Position;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{terminal_evaluation, Oracle, StatelessOracle};
use crate::error::OracleError;
use crate::evaluation::{Evaluation, EvaluationResult};

pub const DEFAULT_API_URL: &str = "https://stockfish.online/api/s/v2.php";

static BEST_MOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bestmove\s([a-h][1-8][a-h][1-8][qrbn]?)").expect("valid bestmove regex"));

/// Response body. Evaluations are in pawns, mates in moves, both signed from
/// White's point of view.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    evaluation: Option<f64>,
    mate: Option<i32>,
    bestmove: Option<String>,
    continuation: Option<String>,
    error: Option<String>,
    data: Option<String>,
}

pub struct RemoteOracle {
    client: Client,
    url: String,
    position: Position,
}

impl RemoteOracle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .user_agent(concat!("chess-review/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(format!("Client build error: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            position: Position::initial(),
        })
    }

    async fn request(&self, position: &Position, depth: u32) -> Result<EvaluationResult, OracleError> {
        if let Some(result) = terminal_evaluation(position) {
            return Ok(result);
        }

        debug!(fen = position.fen(), depth, "Requesting evaluation");
        let depth = depth.to_string();
        let resp = self
            .client
            .get(&self.url)
            .query(&[("fen", position.fen()), ("depth", depth.as_str())])
            .send()
            .await
            .map_err(|e| OracleError::Transport(format!("Request error: {e}")))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited(format!("HTTP {status}")));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OracleError::Unauthorized(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(OracleError::Transport(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| OracleError::Transport(format!("Body read error: {e}")))?;

        parse_response(&body, position)
    }
}

impl Oracle for RemoteOracle {
    async fn set_position(&mut self, position: &Position) -> Result<(), OracleError> {
        self.position = position.clone();
        Ok(())
    }

    async fn advance(&mut self, uci: &str) -> Result<(), OracleError> {
        let (next, _) = self.position.play(uci)?;
        self.position = next;
        Ok(())
    }

    async fn evaluate(&mut self, depth: u32) -> Result<EvaluationResult, OracleError> {
        self.request(&self.position, depth).await
    }
}

impl StatelessOracle for RemoteOracle {
    async fn evaluate_at(&self, position: &Position, depth: u32) -> Result<EvaluationResult, OracleError> {
        self.request(position, depth).await
    }
}

/// Turn a response body into a normalized evaluation of `position`.
pub fn parse_response(body: &str, position: &Position) -> Result<EvaluationResult, OracleError> {
    let resp: ApiResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::Malformed(format!("JSON parse error: {e}")))?;

    if !resp.success {
        let reason = resp
            .error
            .or(resp.data)
            .unwrap_or_else(|| "no reason given".to_string());
        return Err(OracleError::Rejected(reason));
    }

    let evaluation = match (resp.mate, resp.evaluation) {
        (Some(mate), _) => Evaluation::from_white_mate(mate, position.side_to_move()),
        (None, Some(pawns)) => Evaluation::Centipawns((pawns * 100.0).round() as i32),
        (None, None) => return Err(OracleError::Malformed("missing evaluation".to_string())),
    };

    Ok(EvaluationResult {
        evaluation,
        best_move: resp.bestmove.as_deref().and_then(extract_best_move),
        continuation: resp
            .continuation
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        outcomes: None,
    })
}

/// Pull the coordinate move out of a `bestmove e2e4 ponder e7e5` field.
pub fn extract_best_move(text: &str) -> Option<String> {
    BEST_MOVE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::Side;

    #[test]
    fn test_parse_success() {
        let body = r#"{"success":true,"evaluation":-0.36,"mate":null,
            "bestmove":"bestmove e7e5 ponder g1f3","continuation":"e7e5 g1f3 b8c6"}"#;
        let (after_e4, _) = Position::initial().play("e4").unwrap();
        let result = parse_response(body, &after_e4).unwrap();

        assert_eq!(result.evaluation, Evaluation::Centipawns(-36));
        assert_eq!(result.best_move.as_deref(), Some("e7e5"));
        assert_eq!(result.continuation, vec!["e7e5", "g1f3", "b8c6"]);
        assert_eq!(result.outcomes, None);
    }

    #[test]
    fn test_parse_mate_uses_white_sign() {
        let body = r#"{"success":true,"evaluation":null,"mate":-2,"bestmove":"bestmove d8h4"}"#;
        let result = parse_response(body, &Position::initial()).unwrap();
        assert_eq!(result.evaluation, Evaluation::Mate { winner: Side::Black, moves: 2 });
    }

    #[test]
    fn test_parse_failure_is_rejected() {
        let body = r#"{"success":false,"data":"Invalid fen"}"#;
        assert_eq!(
            parse_response(body, &Position::initial()),
            Err(OracleError::Rejected("Invalid fen".to_string()))
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_response("<html>", &Position::initial()),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            parse_response(r#"{"success":true}"#, &Position::initial()),
            Err(OracleError::Malformed(_))
        ));
    }

    #[test]
    fn test_extract_best_move() {
        assert_eq!(extract_best_move("bestmove e2e4 ponder e7e5"), Some("e2e4".to_string()));
        assert_eq!(extract_best_move("bestmove a7a8q"), Some("a7a8q".to_string()));
        assert_eq!(extract_best_move("bestmove (none)"), None);
    }

    #[tokio::test]
    async fn test_advance_tracks_position() {
        let mut oracle = RemoteOracle::new(DEFAULT_API_URL, Duration::from_secs(1)).unwrap();
        oracle.advance("e2e4").await.unwrap();
        oracle.advance("e7e5").await.unwrap();
        assert_eq!(oracle.position.fen(), Position::initial().play("e4").unwrap().0.play("e5").unwrap().0.fen());
        assert!(oracle.advance("e2e4").await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transient() {
        let oracle = RemoteOracle::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        let err = oracle.evaluate_at(&Position::initial(), 12).await.unwrap_err();
        assert!(matches!(err, OracleError::Transport(_)));
        assert!(!err.is_fatal());
    }
}
