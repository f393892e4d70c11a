//! On-disk cache of finished analyses: one CSV file per game key.
//!
//! Entries are written to a hidden temporary file and then published with a
//! no-clobber hard link, so a reader never sees a partial file and the first
//! writer of a key wins.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chess_core::Side;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};
use tracing::debug;

use crate::classification::Label;
use crate::error::CacheError;
use crate::evaluation::{Evaluation, EvaluationResult, OutcomeCounts};
use crate::record::{AnalysisResult, MoveRecord};

const EXTENSION: &str = "csv";
const TEMP_EXTENSION: &str = "tmp";

/// Result of [`AnalysisCache::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    /// Another writer published this key first; the new result was dropped
    AlreadyPresent,
}

#[derive(Clone, Debug)]
pub struct AnalysisCache {
    dir: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<KeyMutex<()>>>>>,
}

impl AnalysisCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the analysis for `game_key`.
    pub fn path_for(&self, game_key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", file_stem(game_key)))
    }

    /// Serialize analyses of the same key within this process.
    pub async fn lock_key(&self, game_key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(game_key.to_string())
                .or_insert_with(|| Arc::new(KeyMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn lookup(&self, game_key: &str) -> Result<Option<AnalysisResult>, CacheError> {
        let path = self.path_for(game_key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let mut reader = csv::Reader::from_reader(file);
        let mut records = Vec::new();
        for (index, row) in reader.deserialize::<CacheRow>().enumerate() {
            let row = row.map_err(|e| format_error(&path, e.to_string()))?;
            if row.ply != index {
                return Err(format_error(
                    &path,
                    format!("expected ply {index}, found {}", row.ply),
                ));
            }
            records.push(row.into_record().map_err(|m| format_error(&path, m))?);
        }

        if records.is_empty() {
            return Err(format_error(&path, "no rows".to_string()));
        }

        Ok(Some(AnalysisResult {
            game_key: game_key.to_string(),
            records,
        }))
    }

    pub fn store(&self, game_key: &str, result: &AnalysisResult) -> Result<StoreOutcome, CacheError> {
        fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let path = self.path_for(game_key);
        let temp = self.temp_path(game_key);
        let outcome = write_rows(&temp, result).and_then(|()| publish(&temp, &path));
        let _ = fs::remove_file(&temp);
        outcome
    }

    /// Remove one entry that could not be read back.
    pub fn discard(&self, game_key: &str) -> Result<(), CacheError> {
        let path = self.path_for(game_key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Delete every stored analysis. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let dir = glob::Pattern::escape(&self.dir.to_string_lossy());
        let mut removed = 0;

        for pattern in [format!("{dir}/*.{EXTENSION}"), format!("{dir}/.*.{TEMP_EXTENSION}")] {
            let counts = !pattern.ends_with(TEMP_EXTENSION);
            for entry in glob::glob(&pattern)?.flatten() {
                fs::remove_file(&entry).map_err(|e| CacheError::io(&entry, e))?;
                debug!(path = %entry.display(), "Removed cache file");
                if counts {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    fn temp_path(&self, game_key: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        self.dir.join(format!(
            ".{}.{}.{nanos}.{TEMP_EXTENSION}",
            file_stem(game_key),
            std::process::id()
        ))
    }
}

fn write_rows(temp: &Path, result: &AnalysisResult) -> Result<(), CacheError> {
    let file = File::create(temp).map_err(|e| CacheError::io(temp, e))?;
    let mut writer = csv::Writer::from_writer(file);
    for record in &result.records {
        writer
            .serialize(CacheRow::from_record(record))
            .map_err(|e| csv_error(temp, e))?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| CacheError::io(temp, e.into_error()))?;
    file.sync_all().map_err(|e| CacheError::io(temp, e))
}

/// Make a fully written temp file visible under its final name, unless
/// another writer got there first.
fn publish(temp: &Path, path: &Path) -> Result<StoreOutcome, CacheError> {
    match fs::hard_link(temp, path) {
        Ok(()) => Ok(StoreOutcome::Written),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(StoreOutcome::AlreadyPresent),
        // Filesystems without hard links: fall back to a rename
        Err(_) if path.exists() => Ok(StoreOutcome::AlreadyPresent),
        Err(_) => fs::rename(temp, path)
            .map(|()| StoreOutcome::Written)
            .map_err(|e| CacheError::io(path, e)),
    }
}

fn csv_error(path: &Path, e: csv::Error) -> CacheError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => CacheError::io(path, io),
        other => format_error(path, format!("{other:?}")),
    }
}

fn format_error(path: &Path, message: String) -> CacheError {
    CacheError::Format {
        path: path.to_path_buf(),
        message,
    }
}

/// Longest readable part of a file name, leaving room for the hash suffix
/// and the temp-file decorations under the usual 255-byte name limit.
const MAX_STEM: usize = 100;

/// Filesystem-safe encoding of a game key. Bytes outside a small safe set
/// become `%XX`; a leading dot is escaped so entries never look like temp
/// files. Encodings longer than [`MAX_STEM`] are cut and tagged with
/// `~` plus a hash of the full key (`~` itself is always escaped).
pub fn file_stem(game_key: &str) -> String {
    let mut stem = String::with_capacity(game_key.len().min(MAX_STEM));
    for (i, byte) in game_key.bytes().enumerate() {
        let safe = byte.is_ascii_alphanumeric()
            || matches!(byte, b' ' | b'-' | b'_' | b'[' | b']')
            || (byte == b'.' && i > 0);
        let piece = if safe {
            (byte as char).to_string()
        } else {
            format!("%{byte:02X}")
        };
        if stem.len() + piece.len() > MAX_STEM {
            return format!("{stem}~{:016x}", key_hash(game_key));
        }
        stem.push_str(&piece);
    }
    stem
}

/// 64-bit FNV-1a. Stable across builds, unlike `DefaultHasher`.
fn key_hash(game_key: &str) -> u64 {
    game_key.bytes().fold(0xCBF2_9CE4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01B3)
    })
}

/// One CSV row. Absent values are empty cells.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    ply: usize,
    player: u8,
    side: Side,
    #[serde(rename = "move")]
    notation: String,
    uci: String,
    evaluation_type: Option<String>,
    evaluation_value: Option<String>,
    best_move: Option<String>,
    continuation: Option<String>,
    wdl_win: Option<u32>,
    wdl_draw: Option<u32>,
    wdl_loss: Option<u32>,
    prob_before: Option<f64>,
    prob_after: Option<f64>,
    prob_drop: Option<f64>,
    label: Option<String>,
}

impl CacheRow {
    fn from_record(record: &MoveRecord) -> Self {
        let eval = record.evaluation.as_ref();
        let outcomes = eval.and_then(|e| e.outcomes);
        Self {
            ply: record.ply,
            player: record.player(),
            side: record.side,
            notation: record.notation.clone(),
            uci: record.uci.clone(),
            evaluation_type: eval.map(|e| e.evaluation.kind().to_string()),
            evaluation_value: eval.map(|e| e.evaluation.encode_value()),
            best_move: eval.and_then(|e| e.best_move.clone()),
            continuation: eval
                .filter(|e| !e.continuation.is_empty())
                .map(|e| e.continuation.join(" ")),
            wdl_win: outcomes.map(|o| o.win),
            wdl_draw: outcomes.map(|o| o.draw),
            wdl_loss: outcomes.map(|o| o.loss),
            prob_before: record.prob_before,
            prob_after: record.prob_after,
            prob_drop: record.prob_drop,
            label: record.label.map(|l| l.as_str().to_string()),
        }
    }

    fn into_record(self) -> Result<MoveRecord, String> {
        if usize::from(self.player) != self.ply % 2 {
            return Err(format!("player {} does not move at ply {}", self.player, self.ply));
        }

        let evaluation = match (self.evaluation_type, self.evaluation_value) {
            (Some(kind), Some(value)) => {
                let evaluation = Evaluation::decode(&kind, &value)
                    .ok_or_else(|| format!("bad evaluation {kind}={value}"))?;
                let outcomes = match (self.wdl_win, self.wdl_draw, self.wdl_loss) {
                    (Some(win), Some(draw), Some(loss)) => Some(OutcomeCounts { win, draw, loss }),
                    _ => None,
                };
                Some(EvaluationResult {
                    evaluation,
                    best_move: self.best_move,
                    continuation: self
                        .continuation
                        .map(|c| c.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default(),
                    outcomes,
                })
            }
            (None, None) => None,
            _ => return Err("evaluation type and value must both be present".to_string()),
        };

        let label = self.label.map(|l| l.parse::<Label>()).transpose()?;

        Ok(MoveRecord {
            ply: self.ply,
            side: self.side,
            notation: self.notation,
            uci: self.uci,
            evaluation,
            prob_before: self.prob_before,
            prob_after: self.prob_after,
            prob_drop: self.prob_drop,
            label,
        })
    }
}
