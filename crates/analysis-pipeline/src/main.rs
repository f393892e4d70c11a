//! chess-review
//!
//! Analyses the games of a PGN file move by move and prints the labels,
//! caching every finished game under the analysed-games directory.

use std::path::{Path, PathBuf};

use analysis_pipeline::progress::LogProgress;
use analysis_pipeline::{
    AnalysisCache, AnalysisResult, AnalysisSettings, LabelCounts, OracleBackend, Pipeline,
    PipelineConfig, PipelineError, ProbabilitySource, RemoteOracle, StockfishEngine,
};
use anyhow::Context;
use chess_core::game_key::{game_key, player_side};
use chess_core::{pgn, GameData, Side};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[clap(name = "chess-review", about = "Move-quality analysis for PGN games")]
struct Cli {
    /// Directory holding analysed games (overrides CACHE_DIR)
    #[clap(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyse every game in a PGN file
    Analyze {
        pgn: PathBuf,

        /// Player whose games these are; decides colour and result in the game key
        #[clap(short, long)]
        username: String,

        #[clap(short, long)]
        backend: Option<OracleBackend>,

        #[clap(short, long)]
        depth: Option<u32>,

        /// Parallel requests (remote backend only)
        #[clap(short, long)]
        concurrency: Option<usize>,

        #[clap(long)]
        probability_source: Option<ProbabilitySource>,
    },
    /// Delete all analysed games
    ClearCache,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load()?;
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = dir;
    }

    match cli.command {
        Command::ClearCache => {
            let removed = AnalysisCache::new(&config.cache_dir).clear()?;
            println!(
                "Successfully deleted {removed} analysed game(s) from {}",
                config.cache_dir.display()
            );
        }
        Command::Analyze {
            pgn,
            username,
            backend,
            depth,
            concurrency,
            probability_source,
        } => {
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if let Some(depth) = depth {
                config.depth = depth;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency.max(1);
            }
            if let Some(source) = probability_source {
                config.probability_source = source;
            }
            analyze_file(&config, &pgn, &username).await?;
        }
    }

    Ok(())
}

async fn analyze_file(config: &PipelineConfig, path: &Path, username: &str) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let games: Vec<GameData> = pgn::parse_pgn_file(&text)
        .into_iter()
        .enumerate()
        .filter_map(|(index, game)| match game {
            Ok(game) => Some(game),
            Err(e) => {
                error!(game = index + 1, error = %e, "Skipping unparseable game");
                None
            }
        })
        .collect();
    if games.is_empty() {
        anyhow::bail!("No games found in {}", path.display());
    }

    info!(
        games = games.len(),
        backend = ?config.backend,
        depth = config.depth,
        cache_dir = %config.cache_dir.display(),
        "Loaded PGN"
    );

    let cache = AnalysisCache::new(&config.cache_dir);
    let settings = AnalysisSettings::from(config);

    match config.backend {
        OracleBackend::Remote => {
            let oracle = RemoteOracle::new(config.api_url.as_str(), config.timeout)?;
            let mut pipeline = Pipeline::new(oracle, cache, settings);
            for game in &games {
                let Some(key) = key_for(game, username, config) else {
                    continue;
                };
                let outcome = if config.concurrency > 1 {
                    pipeline.analyze_concurrent(game, &key, &LogProgress).await
                } else {
                    pipeline.analyze(game, &key, &LogProgress).await
                };
                print_outcome(&key, player_side(&game.metadata, username), outcome)?;
            }
        }
        OracleBackend::Local => {
            let engine = StockfishEngine::new(&config.stockfish_path, config.timeout).await?;
            info!(stockfish_path = %config.stockfish_path, "Stockfish engine ready");
            let mut pipeline = Pipeline::new(engine, cache, settings);
            let mut failure = None;
            for game in &games {
                let Some(key) = key_for(game, username, config) else {
                    continue;
                };
                let outcome = pipeline.analyze(game, &key, &LogProgress).await;
                if let Err(e) = print_outcome(&key, player_side(&game.metadata, username), outcome) {
                    failure = Some(e);
                    break;
                }
            }
            pipeline.into_oracle().quit().await;
            if let Some(e) = failure {
                return Err(e);
            }
        }
    }

    Ok(())
}

fn key_for(game: &GameData, username: &str, config: &PipelineConfig) -> Option<String> {
    match game_key(&game.metadata, username, config.key_utc_offset_hours) {
        Ok(key) => Some(key),
        Err(e) => {
            error!(white = %game.metadata.white, black = %game.metadata.black, error = %e, "Skipping game");
            None
        }
    }
}

/// Print a finished analysis. Unusable games are skipped; oracle failures
/// stop the run.
fn print_outcome(
    game_key: &str,
    side: Side,
    outcome: Result<AnalysisResult, PipelineError>,
) -> anyhow::Result<()> {
    match outcome {
        Ok(result) => print_analysis(&result, side),
        Err(PipelineError::Persist { analysis, source }) => {
            warn!(game_key, error = %source, "Showing unsaved analysis");
            print_analysis(&analysis, side);
        }
        Err(e @ (PipelineError::InvalidGame(_) | PipelineError::EmptyGame)) => {
            error!(game_key, error = %e, "Skipping game");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_analysis(result: &AnalysisResult, side: Side) {
    println!("\n{}", result.game_key);
    println!("{}", "=".repeat(72));
    println!(
        "{:>4}  {:<9} {:>7}  {:<6} {:>6} {:>6} {:>6}  {}",
        "ply", "move", "eval", "best", "before", "after", "drop", "label"
    );

    for record in &result.records {
        let number = record.ply / 2 + 1;
        let notation = match record.side {
            Side::White => format!("{number}. {}", record.notation),
            Side::Black => format!("{number}... {}", record.notation),
        };
        let eval = record
            .evaluation
            .as_ref()
            .map(|e| e.evaluation.to_string())
            .unwrap_or_else(|| "-".to_string());
        let label = record
            .label
            .map(|l| l.to_string())
            .unwrap_or_else(|| "(no evaluation)".to_string());

        println!(
            "{:>4}  {:<9} {:>7}  {:<6} {:>6} {:>6} {:>6}  {}",
            record.ply,
            notation,
            eval,
            record.best_move().unwrap_or("-"),
            fmt_prob(record.prob_before),
            fmt_prob(record.prob_after),
            fmt_prob(record.prob_drop),
            label
        );
    }

    println!("{}", "=".repeat(72));
    println!("You:      {}", fmt_counts(&result.label_counts(side)));
    println!("Opponent: {}", fmt_counts(&result.label_counts(side.opponent())));
}

fn fmt_prob(p: Option<f64>) -> String {
    p.map(|p| format!("{p:.3}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_counts(counts: &LabelCounts) -> String {
    let mut parts = vec![
        format!("{} Best", counts.best),
        format!("{} Great Move", counts.great_move),
        format!("{} Excellent", counts.excellent),
        format!("{} Good", counts.good),
        format!("{} Inaccuracy", counts.inaccuracy),
        format!("{} Mistake", counts.mistake),
        format!("{} Miss", counts.miss),
        format!("{} Blunder", counts.blunder),
    ];
    if counts.unclassified > 0 {
        parts.push(format!("{} unclassified", counts.unclassified));
    }
    parts.join(", ")
}
