/*!
What a save reports back to the producer.
*/

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FailureKind;
use crate::payload::DataKind;
use crate::{Result, StoreError};

/// Non-fatal finding about the quality of a payload that was still written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QualityWarning {
    /// The new sequence is much shorter than the one it replaces
    VolumeDrop { previous: usize, current: usize },
    /// The previous snapshot could not be read or parsed
    UnreadablePrevious { reason: String },
    /// The previous snapshot could not be backed up
    BackupFailed { reason: String },
}

impl fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityWarning::VolumeDrop { previous, current } => write!(
                f,
                "new data ({current} items) is under half of the previous snapshot ({previous} items)"
            ),
            QualityWarning::UnreadablePrevious { reason } => {
                write!(f, "previous snapshot unreadable: {reason}")
            }
            QualityWarning::BackupFailed { reason } => write!(f, "backup failed: {reason}"),
        }
    }
}

/// Details of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    /// Snapshot path as given by the caller
    pub path: PathBuf,
    pub kind: DataKind,
    /// Sequence length, or 1 for a single record
    pub items: usize,
    pub bytes_written: usize,
    /// SHA-256 of the written file, hex encoded
    pub content_hash: String,
    /// Backup of the previous snapshot, if one was taken
    pub backup: Option<PathBuf>,
    pub forced: bool,
    pub warnings: Vec<QualityWarning>,
}

impl SaveReceipt {
    /// One-line status for pipeline logs
    pub fn status_line(&self) -> String {
        let mut line = format!("saved {} items to {}", self.items, self.path.display());
        if self.forced {
            line.push_str(" (forced)");
        }
        if !self.warnings.is_empty() {
            line.push_str(&format!(" with {} warning(s)", self.warnings.len()));
        }
        line
    }
}

/// The two-part answer producers act on: log `message`, exit non-zero on `!ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub ok: bool,
    pub message: String,
    /// Failure classification when `ok` is false
    #[serde(skip)]
    pub failure: Option<FailureKind>,
    #[serde(skip)]
    pub receipt: Option<SaveReceipt>,
}

impl SaveOutcome {
    /// Process exit code a producer should use for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.ok {
            0
        } else {
            1
        }
    }
}

impl From<Result<SaveReceipt>> for SaveOutcome {
    fn from(result: Result<SaveReceipt>) -> Self {
        match result {
            Ok(receipt) => SaveOutcome {
                ok: true,
                message: receipt.status_line(),
                failure: None,
                receipt: Some(receipt),
            },
            Err(err) => SaveOutcome::from(err),
        }
    }
}

impl From<StoreError> for SaveOutcome {
    fn from(err: StoreError) -> Self {
        SaveOutcome {
            ok: false,
            message: format!("not saved: {err}"),
            failure: Some(err.failure_kind()),
            receipt: None,
        }
    }
}

/// SHA-256 of `data`, hex encoded
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Check that `data` hashes to `expected`.
pub fn verify_content_hash(data: &[u8], expected: &str) -> Result<()> {
    let actual = content_hash(data);
    if actual != expected {
        return Err(StoreError::storage(format!(
            "content hash mismatch: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}
