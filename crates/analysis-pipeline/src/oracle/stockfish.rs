//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::future::Future;
use std::time::Duration;

use chess_core::Position;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::{terminal_evaluation, Oracle};
use crate::error::OracleError;
use crate::evaluation::{Evaluation, EvaluationResult, OutcomeCounts};

/// Stockfish engine instance. Holds the game's start position and the moves
/// played since, and sends both with every search.
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    start_fen: String,
    moves: Vec<String>,
    position: Position,
    /// Longest wait for any expected reply
    timeout: Duration,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, timeout: Duration) -> Result<Self, OracleError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| OracleError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| OracleError::Stockfish("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| OracleError::Stockfish("Stockfish stdout unavailable".into()))?;

        let position = Position::initial();
        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
            start_fen: position.fen().to_string(),
            moves: Vec::new(),
            position,
            timeout,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send("setoption name Threads value 1").await?;
        engine.send("setoption name Hash value 256").await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("setoption name UCI_ShowWDL value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), OracleError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| OracleError::Stockfish(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| OracleError::Stockfish(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Next output line; an exited engine is an error.
    async fn read_line(&mut self) -> Result<String, OracleError> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| OracleError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
        if read == 0 {
            return Err(OracleError::Stockfish("Stockfish closed its output".into()));
        }
        let trimmed = line.trim().to_string();
        debug!(line = %trimmed, "SF >");
        Ok(trimmed)
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), OracleError> {
        let timeout = self.timeout;
        within(timeout, expected, async {
            while self.read_line().await? != expected {}
            Ok(())
        })
        .await
    }

    fn position_command(&self) -> String {
        if self.moves.is_empty() {
            format!("position fen {}", self.start_fen)
        } else {
            format!("position fen {} moves {}", self.start_fen, self.moves.join(" "))
        }
    }

    async fn search(&mut self, depth: u32) -> Result<EvaluationResult, OracleError> {
        let position = self.position_command();
        self.send(&position).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut cp = None;
        let mut mate = None;
        let mut wdl = None;
        let mut pv = Vec::new();

        let timeout = self.timeout;
        let best_move = within(timeout, "bestmove", async {
            loop {
                let line = self.read_line().await?;
                if line.starts_with("info") && line.contains(" pv ") {
                    if let Some(score) = parse_cp(&line) {
                        cp = Some(score);
                        mate = None;
                    }
                    if let Some(score) = parse_mate(&line) {
                        mate = Some(score);
                        cp = None;
                    }
                    if let Some(counts) = parse_wdl(&line) {
                        wdl = Some(counts);
                    }
                    pv = parse_pv(&line);
                } else if line.starts_with("bestmove") {
                    return Ok(parse_bestmove(&line));
                }
            }
        })
        .await?;

        let side_to_move = self.position.side_to_move();
        let evaluation = Evaluation::from_side_to_move(cp, mate, side_to_move).ok_or_else(|| {
            OracleError::Stockfish(format!("No score reported for {}", self.position.fen()))
        })?;

        Ok(EvaluationResult {
            evaluation,
            best_move,
            continuation: pv,
            outcomes: wdl.map(|(w, d, l)| OutcomeCounts::from_side_to_move(w, d, l, side_to_move)),
        })
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Oracle for StockfishEngine {
    async fn set_position(&mut self, position: &Position) -> Result<(), OracleError> {
        self.start_fen = position.fen().to_string();
        self.moves.clear();
        self.position = position.clone();
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for("readyok").await
    }

    async fn advance(&mut self, uci: &str) -> Result<(), OracleError> {
        let (next, uci) = self.position.play(uci)?;
        self.position = next;
        self.moves.push(uci);
        Ok(())
    }

    async fn evaluate(&mut self, depth: u32) -> Result<EvaluationResult, OracleError> {
        if let Some(result) = terminal_evaluation(&self.position) {
            return Ok(result);
        }
        self.search(depth).await
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

/// Run `read` with a deadline. An engine that stops answering is treated as
/// crashed.
async fn within<T>(
    timeout: Duration,
    expected: &str,
    read: impl Future<Output = Result<T, OracleError>>,
) -> Result<T, OracleError> {
    tokio::time::timeout(timeout, read).await.map_err(|_| {
        OracleError::Stockfish(format!("No {expected} from Stockfish within {timeout:?}"))
    })?
}

fn value_after(line: &str, keyword: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == keyword && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    value_after(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    value_after(line, "mate")
}

/// Parse the win/draw/loss triple (per mille, side to move)
fn parse_wdl(line: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let i = parts.iter().position(|p| *p == "wdl")?;
    let values: Vec<u32> = parts
        .get(i + 1..i + 4)?
        .iter()
        .map(|v| v.parse().ok())
        .collect::<Option<_>>()?;
    Some((values[0], values[1], values[2]))
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in line.split_whitespace() {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}

fn parse_bestmove(line: &str) -> Option<String> {
    line.split_whitespace()
        .nth(1)
        .filter(|mv| *mv != "(none)")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 wdl 120 840 40 nodes 100000 pv e2e4";
        assert_eq!(parse_cp(line), Some(35));
        assert_eq!(parse_mate(line), None);
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        assert_eq!(parse_mate(line), Some(-3));
    }

    #[test]
    fn test_parse_wdl() {
        let line = "info depth 12 score cp 35 wdl 120 840 40 nodes 1000 pv e2e4";
        assert_eq!(parse_wdl(line), Some((120, 840, 40)));
        assert_eq!(parse_wdl("info depth 12 score cp 35 wdl 120"), None);
        assert_eq!(parse_wdl("info depth 12 score cp 35 pv e2e4"), None);
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        let pv = parse_pv(line);
        assert_eq!(pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(parse_bestmove("bestmove e7e8q ponder a2a3"), Some("e7e8q".to_string()));
        assert_eq!(parse_bestmove("bestmove (none)"), None);
        assert_eq!(parse_bestmove("bestmove"), None);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let err = StockfishEngine::new("/nonexistent/stockfish-binary", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    /// Engine stand-in that completes the handshake but never searches.
    #[cfg(unix)]
    fn silent_engine(name: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("silent-engine-{name}-{nanos}.sh"));
        std::fs::write(
            &path,
            "#!/bin/sh\nwhile read cmd; do\n  case \"$cmd\" in\n    uci) echo uciok ;;\n    isready) echo readyok ;;\n    quit) exit 0 ;;\n  esac\ndone\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_search_times_out() {
        let script = silent_engine("search");
        let mut engine = StockfishEngine::new(script.to_str().unwrap(), Duration::from_millis(300))
            .await
            .unwrap();
        engine.set_position(&Position::initial()).await.unwrap();

        let started = std::time::Instant::now();
        let err = engine.evaluate(12).await.unwrap_err();
        assert!(matches!(err, OracleError::Stockfish(_)));
        assert!(err.is_fatal());
        assert!(started.elapsed() < Duration::from_secs(5));

        engine.quit().await;
        std::fs::remove_file(&script).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_handshake_times_out() {
        // `cat` echoes commands back but never says uciok
        let err = StockfishEngine::new("cat", Duration::from_millis(300))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, OracleError::Stockfish(_)));
    }
}
