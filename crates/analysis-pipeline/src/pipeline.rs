//! Game analysis orchestration.
//!
//! A run plans every position of the game up front, serves cached results
//! when available, and otherwise walks the game asking the oracle about each
//! position. Evaluations are folded into move records in ply order so the
//! classifier always sees the previous ply's label.

use std::time::Duration;

use chess_core::{GameData, Position, Side};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::cache::{AnalysisCache, StoreOutcome};
use crate::classification::{classify, Label};
use crate::config::PipelineConfig;
use crate::error::{CacheError, OracleError, PipelineError};
use crate::evaluation::EvaluationResult;
use crate::oracle::{Oracle, StatelessOracle};
use crate::progress::{Progress, ProgressSink, ProgressStatus};
use crate::record::{AnalysisResult, MoveRecord};
use crate::win_probability::{ProbabilitySource, WinProbabilityPair};

#[derive(Clone, Debug)]
pub struct AnalysisSettings {
    pub depth: u32,
    /// Extra attempts after a transient oracle failure
    pub retries: u32,
    pub retry_backoff: Duration,
    pub probability_source: ProbabilitySource,
    /// Requests in flight for [`Pipeline::analyze_concurrent`]
    pub concurrency: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for AnalysisSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            depth: config.depth,
            retries: config.retries,
            retry_backoff: config.retry_backoff,
            probability_source: config.probability_source,
            concurrency: config.concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPly {
    pub index: usize,
    pub side: Side,
    pub notation: String,
    pub uci: String,
}

/// A validated game: every move applied, every position known.
#[derive(Debug, Clone)]
pub struct PlannedGame {
    pub start: Position,
    pub plies: Vec<PlannedPly>,
    /// Position before each ply, followed by the final position
    pub positions: Vec<Position>,
}

/// Replay the game locally. Any input problem surfaces here, before the
/// oracle is involved.
pub fn plan_game(game: &GameData) -> Result<PlannedGame, PipelineError> {
    if game.moves.is_empty() {
        return Err(PipelineError::EmptyGame);
    }

    let start = match game.metadata.start_fen.as_deref() {
        Some(fen) => Position::from_fen(fen)?,
        None => Position::initial(),
    };

    let mut plies = Vec::with_capacity(game.moves.len());
    let mut positions = Vec::with_capacity(game.moves.len() + 1);
    let mut current = start.clone();

    for (index, notation) in game.moves.iter().enumerate() {
        let (next, uci) = current.play(notation)?;
        plies.push(PlannedPly {
            index,
            side: current.side_to_move(),
            notation: notation.clone(),
            uci,
        });
        positions.push(std::mem::replace(&mut current, next));
    }
    positions.push(current);

    Ok(PlannedGame {
        start,
        plies,
        positions,
    })
}

/// What to do after a failed oracle call.
#[derive(Debug, PartialEq)]
enum Attempt {
    Retry(Duration),
    /// Record the evaluation as missing and carry on
    GiveUp(OracleError),
    Abort(OracleError),
}

fn after_failure(settings: &AnalysisSettings, attempt: u32, err: OracleError) -> Attempt {
    if err.is_fatal() {
        Attempt::Abort(err)
    } else if attempt < settings.retries {
        Attempt::Retry(settings.retry_backoff * 2u32.saturating_pow(attempt))
    } else {
        Attempt::GiveUp(err)
    }
}

/// An oracle answer, or the reason there is none.
type Outcome = Result<EvaluationResult, String>;

/// Turns the evaluation stream (positions 0..=N) into move records.
struct PlyFold<'a> {
    plies: &'a [PlannedPly],
    source: ProbabilitySource,
    before: Option<Outcome>,
    previous_label: Option<Label>,
    records: Vec<MoveRecord>,
}

impl<'a> PlyFold<'a> {
    fn new(plies: &'a [PlannedPly], source: ProbabilitySource) -> Self {
        Self {
            plies,
            source,
            before: None,
            previous_label: None,
            records: Vec::with_capacity(plies.len()),
        }
    }

    /// Feed the evaluation of the next position. Once the positions on both
    /// sides of a ply are known, its record is built and returned together
    /// with the reason for any missing evaluation.
    fn push(&mut self, after: Outcome) -> Option<(&MoveRecord, Option<String>)> {
        let before = self.before.replace(after)?;
        let after = self.before.as_ref()?;

        let plies = self.plies;
        let ply = &plies[self.records.len()];
        let is_last = ply.index + 1 == self.plies.len();

        let prob_before = before
            .as_ref()
            .ok()
            .map(|e| self.source.probability(e, ply.side));
        let prob_after = match after {
            // A level final position would otherwise spike to 0.5
            Ok(e) if is_last && e.evaluation.is_neutral_zero() => prob_before,
            Ok(e) => Some(self.source.probability(e, ply.side)),
            Err(_) => None,
        };

        let pair = prob_before
            .zip(prob_after)
            .map(|(before, after)| WinProbabilityPair { before, after });
        let best_move = before.as_ref().ok().and_then(|e| e.best_move.as_deref());

        let (prob_drop, label) = match pair {
            Some(p) => {
                let (drop, label) =
                    classify(p.before, p.after, &ply.uci, best_move, self.previous_label);
                (Some(drop), Some(label))
            }
            None => (None, None),
        };
        self.previous_label = label;

        let reason = match (&before, after) {
            (Err(reason), _) | (_, Err(reason)) => Some(reason.clone()),
            _ => None,
        };

        self.records.push(MoveRecord {
            ply: ply.index,
            side: ply.side,
            notation: ply.notation.clone(),
            uci: ply.uci.clone(),
            evaluation: before.ok(),
            prob_before,
            prob_after,
            prob_drop,
            label,
        });
        self.records.last().map(|record| (record, reason))
    }

    fn finish(self) -> Vec<MoveRecord> {
        self.records
    }
}

fn report_ply<P>(progress: &P, total: usize, record: &MoveRecord, reason: Option<String>)
where
    P: ProgressSink + ?Sized,
{
    let status = match reason {
        Some(reason) => ProgressStatus::Degraded { reason },
        None => ProgressStatus::Analyzing,
    };
    progress.report(Progress::at_ply(record.ply, total, status));
}

/// Drives one oracle over games, with results cached on disk.
pub struct Pipeline<O> {
    oracle: O,
    cache: AnalysisCache,
    settings: AnalysisSettings,
}

impl<O> Pipeline<O> {
    pub fn new(oracle: O, cache: AnalysisCache, settings: AnalysisSettings) -> Self {
        Self {
            oracle,
            cache,
            settings,
        }
    }

    pub fn into_oracle(self) -> O {
        self.oracle
    }

    /// Delete every stored analysis. Returns how many were removed.
    pub fn clear_cache(&self) -> Result<usize, PipelineError> {
        let removed = self.cache.clear()?;
        info!(removed, dir = %self.cache.dir().display(), "Cleared analysed games");
        Ok(removed)
    }

    /// Cached analysis for `game_key`. Entries that cannot be read count as
    /// a miss; corrupt ones are removed so the fresh result can replace them.
    fn cached(&self, game_key: &str) -> Option<AnalysisResult> {
        match self.cache.lookup(game_key) {
            Ok(hit) => hit,
            Err(CacheError::Format { path, message }) => {
                warn!(game_key, path = %path.display(), %message, "Discarding corrupt cache entry");
                if let Err(e) = self.cache.discard(game_key) {
                    warn!(game_key, error = %e, "Failed to remove corrupt cache entry");
                }
                None
            }
            Err(e) => {
                warn!(game_key, error = %e, "Cache unreadable, analysing anyway");
                None
            }
        }
    }

    fn finish<P>(
        &self,
        game_key: &str,
        records: Vec<MoveRecord>,
        progress: &P,
    ) -> Result<AnalysisResult, PipelineError>
    where
        P: ProgressSink + ?Sized,
    {
        let result = AnalysisResult {
            game_key: game_key.to_string(),
            records,
        };

        match self.cache.store(game_key, &result) {
            Ok(StoreOutcome::Written) => {
                info!(
                    game_key,
                    plies = result.len(),
                    degraded = result.degraded_plies().len(),
                    "Analysis saved"
                );
                progress.report(Progress::new(1.0, ProgressStatus::Saved));
                Ok(result)
            }
            Ok(StoreOutcome::AlreadyPresent) => {
                debug!(game_key, "Analysis already stored by another writer");
                let stored = self.cache.lookup(game_key).ok().flatten().unwrap_or(result);
                progress.report(Progress::new(1.0, ProgressStatus::Saved));
                Ok(stored)
            }
            Err(source) => {
                warn!(game_key, error = %source, "Failed to save analysis");
                progress.report(Progress::new(1.0, ProgressStatus::Unsaved));
                Err(PipelineError::Persist {
                    analysis: Box::new(result),
                    source,
                })
            }
        }
    }

    fn fail<P>(&self, game_key: &str, total: usize, err: PipelineError, progress: &P) -> PipelineError
    where
        P: ProgressSink + ?Sized,
    {
        error!(game_key, error = %err, "Analysis failed");
        let ply = match &err {
            PipelineError::Oracle { position, .. } => (*position).min(total),
            _ => 0,
        };
        progress.report(Progress::at_ply(
            ply,
            total,
            ProgressStatus::Failed {
                reason: err.to_string(),
            },
        ));
        err
    }

    /// Cache check shared by both walks. Returns the hit, if any.
    fn start<P>(
        &self,
        game_key: &str,
        plan: &PlannedGame,
        progress: &P,
    ) -> Option<AnalysisResult>
    where
        P: ProgressSink + ?Sized,
    {
        if let Some(result) = self.cached(game_key) {
            info!(game_key, plies = result.len(), "Analysis loaded from cache");
            progress.report(Progress::new(1.0, ProgressStatus::Loaded));
            return Some(result);
        }

        info!(game_key, plies = plan.plies.len(), "Starting analysis");
        progress.report(Progress::new(0.0, ProgressStatus::Started));
        None
    }
}

impl<O: Oracle> Pipeline<O> {
    /// Analyse one game, one position at a time.
    pub async fn analyze<P>(
        &mut self,
        game: &GameData,
        game_key: &str,
        progress: &P,
    ) -> Result<AnalysisResult, PipelineError>
    where
        P: ProgressSink + ?Sized,
    {
        let plan = plan_game(game)?;
        let _guard = self.cache.lock_key(game_key).await;

        if let Some(result) = self.start(game_key, &plan, progress) {
            return Ok(result);
        }

        match self.walk(&plan, progress).await {
            Ok(records) => self.finish(game_key, records, progress),
            Err(e) => Err(self.fail(game_key, plan.plies.len(), e, progress)),
        }
    }

    async fn walk<P>(
        &mut self,
        plan: &PlannedGame,
        progress: &P,
    ) -> Result<Vec<MoveRecord>, PipelineError>
    where
        P: ProgressSink + ?Sized,
    {
        let total = plan.plies.len();
        let mut fold = PlyFold::new(&plan.plies, self.settings.probability_source);

        self.oracle
            .set_position(&plan.start)
            .await
            .map_err(|source| PipelineError::Oracle { position: 0, source })?;

        for position in 0..=total {
            if position > 0 {
                self.oracle
                    .advance(&plan.plies[position - 1].uci)
                    .await
                    .map_err(|source| PipelineError::Oracle { position, source })?;
            }

            let mut attempt = 0;
            let outcome = loop {
                let err = match self.oracle.evaluate(self.settings.depth).await {
                    Ok(result) => break Ok(result),
                    Err(e) => e,
                };
                match after_failure(&self.settings, attempt, err) {
                    Attempt::Retry(delay) => {
                        debug!(position, attempt, ?delay, "Retrying evaluation");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Attempt::GiveUp(e) => {
                        warn!(position, error = %e, "Evaluation unavailable");
                        break Err(e.to_string());
                    }
                    Attempt::Abort(source) => return Err(PipelineError::Oracle { position, source }),
                }
            };

            if let Some((record, reason)) = fold.push(outcome) {
                report_ply(progress, total, record, reason);
            }
        }

        Ok(fold.finish())
    }
}

impl<O: StatelessOracle> Pipeline<O> {
    /// Analyse one game with up to `concurrency` evaluations in flight.
    /// Results are folded in ply order, so labels match [`Pipeline::analyze`].
    pub async fn analyze_concurrent<P>(
        &self,
        game: &GameData,
        game_key: &str,
        progress: &P,
    ) -> Result<AnalysisResult, PipelineError>
    where
        P: ProgressSink + ?Sized,
    {
        let plan = plan_game(game)?;
        let _guard = self.cache.lock_key(game_key).await;

        if let Some(result) = self.start(game_key, &plan, progress) {
            return Ok(result);
        }

        match self.walk_concurrent(&plan, progress).await {
            Ok(records) => self.finish(game_key, records, progress),
            Err(e) => Err(self.fail(game_key, plan.plies.len(), e, progress)),
        }
    }

    async fn walk_concurrent<P>(
        &self,
        plan: &PlannedGame,
        progress: &P,
    ) -> Result<Vec<MoveRecord>, PipelineError>
    where
        P: ProgressSink + ?Sized,
    {
        let total = plan.plies.len();
        let mut fold = PlyFold::new(&plan.plies, self.settings.probability_source);

        let mut evaluations = stream::iter(plan.positions.iter().enumerate())
            .map(|(index, position)| evaluate_stateless(&self.oracle, &self.settings, index, position))
            .buffered(self.settings.concurrency.max(1));

        while let Some(outcome) = evaluations.next().await {
            if let Some((record, reason)) = fold.push(outcome?) {
                report_ply(progress, total, record, reason);
            }
        }

        Ok(fold.finish())
    }
}

async fn evaluate_stateless<O: StatelessOracle>(
    oracle: &O,
    settings: &AnalysisSettings,
    position: usize,
    board: &Position,
) -> Result<Outcome, PipelineError> {
    let mut attempt = 0;
    loop {
        let err = match oracle.evaluate_at(board, settings.depth).await {
            Ok(result) => return Ok(Ok(result)),
            Err(e) => e,
        };
        match after_failure(settings, attempt, err) {
            Attempt::Retry(delay) => {
                debug!(position, attempt, ?delay, "Retrying evaluation");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Attempt::GiveUp(e) => {
                warn!(position, error = %e, "Evaluation unavailable");
                return Ok(Err(e.to_string()));
            }
            Attempt::Abort(source) => return Err(PipelineError::Oracle { position, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::Evaluation;
    use chess_core::ChessError;

    fn ply(index: usize, uci: &str) -> PlannedPly {
        PlannedPly {
            index,
            side: Side::of_ply(index),
            notation: uci.to_string(),
            uci: uci.to_string(),
        }
    }

    fn cp(value: i32) -> Outcome {
        Ok(EvaluationResult::new(Evaluation::Centipawns(value)))
    }

    #[test]
    fn test_plan_game() {
        let game = GameData::from_moves(["e4", "e5", "Nf3"]);
        let plan = plan_game(&game).unwrap();

        assert_eq!(plan.plies.len(), 3);
        assert_eq!(plan.positions.len(), 4);
        assert_eq!(plan.plies[2].uci, "g1f3");
        assert_eq!(plan.plies[1].side, Side::Black);
        assert_eq!(plan.positions[0], Position::initial());
    }

    #[test]
    fn test_plan_game_from_fen() {
        let mut game = GameData::from_moves(["Kd7"]);
        game.metadata.start_fen = Some("4k3/8/8/8/8/8/8/4K2R b K - 0 1".to_string());
        let plan = plan_game(&game).unwrap();
        assert_eq!(plan.plies[0].side, Side::Black);
        assert_eq!(plan.plies[0].uci, "e8d7");
    }

    #[test]
    fn test_plan_game_rejects_bad_input() {
        assert!(matches!(
            plan_game(&GameData::from_moves(Vec::<String>::new())),
            Err(PipelineError::EmptyGame)
        ));
        assert!(matches!(
            plan_game(&GameData::from_moves(["e4", "e4"])),
            Err(PipelineError::InvalidGame(ChessError::IllegalMove { .. }))
        ));
    }

    #[test]
    fn test_retry_policy() {
        let settings = AnalysisSettings {
            retries: 2,
            retry_backoff: Duration::from_millis(100),
            ..AnalysisSettings::default()
        };
        let transient = OracleError::Transport("timeout".to_string());

        assert_eq!(
            after_failure(&settings, 0, transient.clone()),
            Attempt::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            after_failure(&settings, 1, transient.clone()),
            Attempt::Retry(Duration::from_millis(200))
        );
        assert_eq!(
            after_failure(&settings, 2, transient.clone()),
            Attempt::GiveUp(transient)
        );

        let fatal = OracleError::Unauthorized("HTTP 401".to_string());
        assert_eq!(after_failure(&settings, 0, fatal.clone()), Attempt::Abort(fatal));
    }

    #[test]
    fn test_fold_pairs_positions() {
        let plies = [ply(0, "e2e4"), ply(1, "e7e5")];
        let mut fold = PlyFold::new(&plies, ProbabilitySource::Evaluation);

        assert!(fold.push(cp(30)).is_none());
        let (first, reason) = fold.push(cp(25)).unwrap();
        assert_eq!(first.ply, 0);
        assert_eq!(reason, None);
        assert_eq!(first.evaluation.as_ref().map(|e| e.evaluation), Some(Evaluation::Centipawns(30)));
        assert!(first.prob_before.unwrap() > first.prob_after.unwrap());

        let (second, _) = fold.push(cp(40)).unwrap();
        assert_eq!(second.side, Side::Black);
        // Black lost ground: White's score went up
        assert!(second.prob_drop.unwrap() > 0.0);
        assert_eq!(fold.finish().len(), 2);
    }

    #[test]
    fn test_fold_degraded_ply_resets_hysteresis() {
        let plies = [ply(0, "e2e4"), ply(1, "e7e5"), ply(2, "g1f3")];
        let mut fold = PlyFold::new(&plies, ProbabilitySource::Evaluation);

        fold.push(cp(0));
        // White throws away a rook
        let (blunder, _) = fold.push(cp(-500)).unwrap();
        assert_eq!(blunder.label, Some(Label::Blunder));

        let (degraded, reason) = fold.push(Err("timeout".to_string())).unwrap();
        assert_eq!(degraded.label, None);
        assert_eq!(degraded.prob_after, None);
        assert_eq!(degraded.prob_drop, None);
        assert!(degraded.prob_before.is_some());
        assert_eq!(reason.as_deref(), Some("timeout"));

        let (next, reason) = fold.push(cp(-500)).unwrap();
        assert_eq!(next.evaluation, None);
        assert_eq!(next.label, None);
        assert_eq!(reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_fold_level_final_position_keeps_probability() {
        let plies = [ply(0, "e2e4")];
        let mut fold = PlyFold::new(&plies, ProbabilitySource::Evaluation);

        fold.push(cp(120));
        let (last, _) = fold
            .push(Ok(EvaluationResult::new(Evaluation::Neutral)))
            .unwrap();
        assert_eq!(last.prob_after, last.prob_before);
        assert_eq!(last.prob_drop, Some(0.0));
        assert_eq!(last.label, Some(Label::Best));
    }

    #[test]
    fn test_fold_played_best_move() {
        let plies = [ply(0, "e2e4")];
        let mut fold = PlyFold::new(&plies, ProbabilitySource::Evaluation);

        fold.push(Ok(EvaluationResult::new(Evaluation::Centipawns(50)).with_best_move("e2e4")));
        let (record, _) = fold.push(cp(-200)).unwrap();
        assert_eq!(record.label, Some(Label::Best));
        assert!(record.prob_drop.unwrap() > 0.2);
    }
}
