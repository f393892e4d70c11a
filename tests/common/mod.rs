#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use analysis_pipeline::oracle::{Oracle, StatelessOracle};
use analysis_pipeline::{
    AnalysisCache, AnalysisSettings, Evaluation, EvaluationResult, OracleError, Progress,
};
use chess_core::{GameData, Position};

/// Scholar's mate: seven plies, eight positions.
pub const SCHOLARS_MATE: [&str; 7] = ["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6", "Qxf7#"];

/// Generate a unique suffix based on timestamp to avoid collisions.
pub fn unique_suffix() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}", ts % 1_000_000_000)
}

/// Fresh cache directory under the system temp dir.
pub fn temp_cache(name: &str) -> AnalysisCache {
    let dir: PathBuf = std::env::temp_dir().join(format!("chess-review-{name}-{}", unique_suffix()));
    AnalysisCache::new(dir)
}

/// Settings with no retry delay worth waiting for.
pub fn fast_settings() -> AnalysisSettings {
    AnalysisSettings {
        depth: 12,
        retries: 1,
        retry_backoff: Duration::from_millis(1),
        ..AnalysisSettings::default()
    }
}

pub fn scholars_mate() -> GameData {
    GameData::from_moves(SCHOLARS_MATE)
}

/// FEN of every position of `game`, start position first.
pub fn fens(game: &GameData) -> Vec<String> {
    let mut position = Position::initial();
    let mut fens = vec![position.fen().to_string()];
    for mv in &game.moves {
        position = position.play(mv).unwrap().0;
        fens.push(position.fen().to_string());
    }
    fens
}

/// Collects every progress notification.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<Progress>>);

impl Recorder {
    pub fn events(&self) -> Vec<Progress> {
        self.0.lock().unwrap().clone()
    }
}

impl analysis_pipeline::ProgressSink for Recorder {
    fn report(&self, progress: Progress) {
        self.0.lock().unwrap().push(progress);
    }
}

/// In-memory oracle answering from a script keyed by FEN. Unscripted
/// positions get a score derived from the FEN so results are deterministic
/// but not all equal. Clones share the call counter.
#[derive(Clone)]
pub struct ScriptedOracle {
    replies: Arc<HashMap<String, EvaluationResult>>,
    failures: Arc<Mutex<HashMap<String, (usize, OracleError)>>>,
    calls: Arc<AtomicUsize>,
    jitter: bool,
    position: Position,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(HashMap::new()),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            jitter: false,
            position: Position::initial(),
        }
    }

    pub fn reply(mut self, fen: &str, result: EvaluationResult) -> Self {
        Arc::make_mut(&mut self.replies).insert(fen.to_string(), result);
        self
    }

    /// Fail the next `times` evaluations of `fen` with `error`.
    pub fn fail(self, fen: &str, times: usize, error: OracleError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(fen.to_string(), (times, error));
        self
    }

    /// Answer after a short FEN-dependent delay, so concurrent requests
    /// complete out of order.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, position: &Position) -> Result<EvaluationResult, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fen = position.fen();

        if self.jitter {
            let delay = fen.bytes().map(u64::from).sum::<u64>() % 7;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some((remaining, error)) = failures.get_mut(fen) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
        }

        if let Some(result) = self.replies.get(fen) {
            return Ok(result.clone());
        }
        let score = (fen.bytes().map(i32::from).sum::<i32>() % 61) - 30;
        Ok(EvaluationResult::new(Evaluation::Centipawns(score)))
    }
}

impl Oracle for ScriptedOracle {
    async fn set_position(&mut self, position: &Position) -> Result<(), OracleError> {
        self.position = position.clone();
        Ok(())
    }

    async fn advance(&mut self, uci: &str) -> Result<(), OracleError> {
        self.position = self.position.play(uci)?.0;
        Ok(())
    }

    async fn evaluate(&mut self, _depth: u32) -> Result<EvaluationResult, OracleError> {
        let position = self.position.clone();
        self.answer(&position).await
    }
}

impl StatelessOracle for ScriptedOracle {
    async fn evaluate_at(
        &self,
        position: &Position,
        _depth: u32,
    ) -> Result<EvaluationResult, OracleError> {
        self.answer(position).await
    }
}
