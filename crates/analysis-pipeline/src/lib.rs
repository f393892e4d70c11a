//! Move-quality analysis: walks a game position by position, asks an
//! evaluation oracle about each one, and labels every move from the change in
//! the mover's win probability. Finished analyses are cached on disk.

pub mod cache;
pub mod classification;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod win_probability;

pub use cache::{AnalysisCache, StoreOutcome};
pub use classification::Label;
pub use config::{OracleBackend, PipelineConfig};
pub use error::{CacheError, OracleError, PipelineError};
pub use evaluation::{Evaluation, EvaluationResult, OutcomeCounts};
pub use oracle::{Oracle, RemoteOracle, StatelessOracle, StockfishEngine};
pub use pipeline::{plan_game, AnalysisSettings, Pipeline};
pub use progress::{NoProgress, Progress, ProgressSink, ProgressStatus};
pub use record::{AnalysisResult, LabelCounts, MoveRecord};
pub use win_probability::ProbabilitySource;
