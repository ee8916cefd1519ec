//! Import batches and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{BatchStatus, DedupStrategy, SourceFormat};
use crate::error::{ModelError, Result};
use crate::ids::{BatchId, TenantId};
use crate::mapping::ImportMapping;

/// What the upload collaborator detected about the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadManifest {
    pub original_filename: String,
    pub format: SourceFormat,
    /// Lowercase hex SHA-256 of the uploaded bytes.
    pub checksum_sha256: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    /// CSV only.
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Spreadsheet only.
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub row_count: usize,
}

/// Parameters for opening a new batch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub tenant: TenantId,
    pub created_by: String,
    pub school_year: String,
    pub strategy: DedupStrategy,
    pub manifest: UploadManifest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub error_rows: usize,
    /// Rows dropped at staging because another row of the batch had the
    /// same normalized content.
    pub duplicate_rows: usize,
}

/// One upload-to-commit import attempt for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: BatchId,
    pub tenant: TenantId,
    pub created_by: String,
    pub school_year: String,
    pub strategy: DedupStrategy,
    pub status: BatchStatus,
    pub manifest: UploadManifest,
    /// Snapshot of the accepted mapping. Later edits to the template do not
    /// affect this batch.
    pub mapping: Option<ImportMapping>,
    pub counters: BatchCounters,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    pub fn new(request: BatchRequest) -> Result<Self> {
        validate_school_year(&request.school_year)?;
        let now = Utc::now();
        Ok(Self {
            id: BatchId::new(),
            tenant: request.tenant,
            created_by: request.created_by,
            school_year: request.school_year.trim().to_string(),
            strategy: request.strategy,
            status: BatchStatus::Uploaded,
            manifest: request.manifest,
            mapping: None,
            counters: BatchCounters::default(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        })
    }

    /// Moves the batch to `next`, enforcing the lifecycle state machine.
    pub fn transition(&mut self, next: BatchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Marks the batch failed with a reason for the operator.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(BatchStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Checks a `YYYY-YYYY` school-year token whose second year follows the first.
///
/// Returns the two years.
pub fn validate_school_year(value: &str) -> Result<(i32, i32)> {
    let invalid = |reason: &'static str| ModelError::InvalidSchoolYear {
        value: value.to_string(),
        reason,
    };
    let token = value.trim();
    let (start, end) = token
        .split_once('-')
        .ok_or_else(|| invalid("expected YYYY-YYYY"))?;
    let is_year = |part: &str| part.len() == 4 && part.bytes().all(|b| b.is_ascii_digit());
    if !is_year(start) || !is_year(end) {
        return Err(invalid("expected YYYY-YYYY"));
    }
    let start: i32 = start.parse().map_err(|_| invalid("expected YYYY-YYYY"))?;
    let end: i32 = end.parse().map_err(|_| invalid("expected YYYY-YYYY"))?;
    if end != start + 1 {
        return Err(invalid("second year must follow the first"));
    }
    Ok((start, end))
}
