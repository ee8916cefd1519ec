//! Commit run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{DedupStrategy, RowAction};
use crate::ids::{BatchId, RecordId, TenantId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Staged rows left out of the run because they failed validation.
    pub error_rows: usize,
}

impl CommitCounts {
    pub fn record(&mut self, action: RowAction) {
        match action {
            RowAction::Created => self.created += 1,
            RowAction::Updated => self.updated += 1,
            RowAction::Skipped => self.skipped += 1,
        }
    }

    pub fn absorb(&mut self, other: &CommitCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.error_rows += other.error_rows;
    }

    /// Rows the run applied an action to.
    pub fn processed(&self) -> usize {
        self.created + self.updated + self.skipped
    }
}

/// How a commit run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    Completed,
    /// A conflict or non-transient failure stopped the run; `chunk_index`
    /// and later chunks were not written.
    Aborted {
        chunk_index: usize,
        row_index: Option<u32>,
        reason: String,
    },
    /// Cancellation observed before `chunk_index` started.
    Cancelled { chunk_index: usize },
}

impl CommitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CommitOutcome::Completed)
    }
}

/// One anonymised line of the audit preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSample {
    pub row_index: u32,
    pub action: RowAction,
    pub record_id: RecordId,
    /// Masked identifier that resolved or created the record.
    pub identifier: Option<String>,
}

/// Append-only summary of one commit run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLog {
    pub batch_id: BatchId,
    pub tenant: TenantId,
    pub strategy: DedupStrategy,
    pub counts: CommitCounts,
    pub chunks_applied: usize,
    pub duration_ms: u64,
    pub outcome: CommitOutcome,
    pub sample: Vec<OutcomeSample>,
    pub committed_at: DateTime<Utc>,
}
