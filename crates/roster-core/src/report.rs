//! Operator-facing summaries of staged rows.

use serde::Serialize;

use roster_model::{ErrorDescriptor, RowStatus, StagingRow};
use roster_validate::ValidationSummary;

/// One row of an error or warning report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    pub row_index: u32,
    pub status: RowStatus,
    pub findings: Vec<ErrorDescriptor>,
}

impl From<StagingRow> for RowReport {
    fn from(row: StagingRow) -> Self {
        Self {
            row_index: row.row_index,
            status: row.status,
            findings: row.errors,
        }
    }
}

/// Result of one [`crate::ImportPipeline::stage_rows`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    /// Rows handed to this call.
    pub received: usize,
    /// Rows of this call written to staging.
    pub stored: usize,
    /// Row indices of this call dropped as exact duplicates of another row.
    pub duplicates: Vec<u32>,
    /// Validation totals over every staged row of the batch.
    pub validation: ValidationSummary,
}

/// What [`crate::ImportPipeline::cancel`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A commit is running; it stops after its current chunk and fails the
    /// batch.
    Signalled,
    /// The batch was idle and is now failed.
    Failed,
}
