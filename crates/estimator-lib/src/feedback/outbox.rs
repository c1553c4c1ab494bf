//! Local outbox for feedback that could not be stored
//!
//! When the shared dataset is unreachable a correction is staged here
//! and persisted to disk, then replayed in order once the store is back.

use super::store::{AppendOutcome, FeedbackStore};
use crate::error::Result;
use crate::models::FeedbackRecord;
use crate::predictor::{with_suffix, write_atomic};
use crate::schema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A correction waiting for replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFeedback {
    pub record: FeedbackRecord,
    /// Unix seconds
    pub staged_at: i64,
    /// Storage error that caused staging
    pub reason: String,
}

/// Outcome of a replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub replayed: usize,
    /// Records rejected by validation; they can never be stored
    pub dropped: usize,
    pub remaining: usize,
}

/// Ordered, optionally persisted queue of staged corrections
#[derive(Debug, Default)]
pub struct FeedbackOutbox {
    pending: Vec<StagedFeedback>,
    persistence_path: Option<PathBuf>,
}

impl FeedbackOutbox {
    /// Outbox that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Outbox persisted at `path`, restoring anything staged earlier
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut outbox = Self {
            pending: Vec::new(),
            persistence_path: Some(path.clone()),
        };

        if path.exists() {
            let data = std::fs::read(&path)?;
            match serde_json::from_slice::<Vec<StagedFeedback>>(&data) {
                Ok(pending) => {
                    info!(path = %path.display(), entries = pending.len(), "Restored feedback outbox");
                    outbox.pending = pending;
                }
                Err(e) => {
                    let aside = with_suffix(&path, ".corrupt");
                    std::fs::rename(&path, &aside)?;
                    warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "Unreadable outbox moved aside, starting fresh"
                    );
                }
            }
        }
        Ok(outbox)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[StagedFeedback] {
        &self.pending
    }

    /// Queue a record; returns the number of pending records
    pub fn stage(&mut self, record: FeedbackRecord, reason: impl Into<String>) -> Result<usize> {
        self.pending.push(StagedFeedback {
            record,
            staged_at: chrono::Utc::now().timestamp(),
            reason: reason.into(),
        });
        self.persist()?;
        Ok(self.pending.len())
    }

    /// Replay staged records in order, stopping at the first failed write
    ///
    /// Only records that no longer pass validation are dropped; anything
    /// the store refuses stays pending for the next pass.
    pub async fn flush_pending(&mut self, store: &FeedbackStore) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        let mut last_error = None;

        while let Some(staged) = self.pending.first() {
            if let Err(e) = schema::validate_features(&staged.record.features) {
                warn!(error = %e, price = staged.record.price, "Dropping staged feedback that cannot be stored");
                report.dropped += 1;
                self.pending.remove(0);
                continue;
            }
            match store.append(&staged.record).await {
                Ok(AppendOutcome::Appended) | Ok(AppendOutcome::Discarded) => {
                    report.replayed += 1;
                    self.pending.remove(0);
                }
                Err(e) => {
                    debug!(error = %e, "Feedback store refused staged record, keeping outbox");
                    last_error = Some(e);
                    break;
                }
            }
        }

        report.remaining = self.pending.len();
        self.persist()?;

        if report.replayed > 0 || report.dropped > 0 {
            info!(
                replayed = report.replayed,
                dropped = report.dropped,
                remaining = report.remaining,
                "Replayed staged feedback"
            );
        }

        match last_error {
            // Nothing moved; let the caller see why
            Some(e) if report.replayed == 0 && report.dropped == 0 => Err(e),
            _ => Ok(report),
        }
    }

    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.persistence_path {
            let json = serde_json::to_vec(&self.pending)?;
            write_atomic(path, &json)?;
            debug!(path = %path.display(), entries = self.pending.len(), "Outbox persisted");
        }
        Ok(())
    }
}
