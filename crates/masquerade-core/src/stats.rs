//! Statistics sink — append-only guess record persistence plus the read-all
//! aggregate used by the reporting surface.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::types::{ConfusionMatrix, GuessRecord};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Cross-session guess store. Append-only; reads return everything ever
/// written so callers can aggregate.
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn append(&self, record: &GuessRecord) -> Result<(), SinkError>;
    async fn read_all(&self) -> Result<Vec<GuessRecord>, SinkError>;
}

/// One JSON object per line. Appends never rewrite earlier records.
pub struct JsonlStatsSink {
    path: PathBuf,
}

impl JsonlStatsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StatsSink for JsonlStatsSink {
    async fn append(&self, record: &GuessRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<GuessRecord>, SinkError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<GuessRecord>(line) {
                Ok(r) => records.push(r),
                Err(e) => warn!("Skipping malformed guess record line: {}", e),
            }
        }
        Ok(records)
    }
}

/// Fold a record set into the global confusion matrix.
pub fn aggregate(records: &[GuessRecord]) -> ConfusionMatrix {
    let mut matrix = ConfusionMatrix::default();
    for r in records {
        matrix.record(r.guessed_automated, r.actual_automated);
    }
    matrix
}
