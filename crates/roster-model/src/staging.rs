//! Staged rows and the error descriptors attached to them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::{ErrorCode, RowStatus, Severity};
use crate::error::{ModelError, Result};
use crate::ids::{BatchId, RowHash, TenantId};

/// One validation finding on a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Canonical field concerned, `None` for row-level findings.
    pub field: Option<String>,
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
}

impl ErrorDescriptor {
    pub fn error(field: Option<&str>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            code,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: Option<&str>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            code,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A tokenized source row as supplied by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based position in the source file.
    pub row_index: u32,
    pub values: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(row_index: u32, values: BTreeMap<String, String>) -> Result<Self> {
        if row_index == 0 {
            return Err(ModelError::InvalidRowIndex);
        }
        Ok(Self { row_index, values })
    }

    pub fn from_pairs<I, K, V>(row_index: u32, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            row_index,
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One source row held in staging between upload and commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingRow {
    pub batch_id: BatchId,
    pub tenant: TenantId,
    pub row_index: u32,
    pub raw: BTreeMap<String, String>,
    pub normalized: BTreeMap<String, String>,
    pub status: RowStatus,
    pub errors: Vec<ErrorDescriptor>,
    pub row_hash: Option<RowHash>,
}

impl StagingRow {
    pub fn new(batch_id: BatchId, tenant: TenantId, raw: RawRow) -> Self {
        Self {
            batch_id,
            tenant,
            row_index: raw.row_index,
            raw: raw.values,
            normalized: BTreeMap::new(),
            status: RowStatus::Pending,
            errors: Vec::new(),
            row_hash: None,
        }
    }

    /// Records the transform output and its fingerprint.
    pub fn set_normalized(&mut self, normalized: BTreeMap<String, String>, hash: RowHash) {
        self.normalized = normalized;
        self.row_hash = Some(hash);
        self.status = RowStatus::Normalized;
        self.errors.clear();
    }

    /// Replaces the findings and derives the row status from them.
    pub fn apply_findings(&mut self, findings: Vec<ErrorDescriptor>) {
        self.status = if findings.iter().any(ErrorDescriptor::is_error) {
            RowStatus::Error
        } else {
            RowStatus::Valid
        };
        self.errors = findings;
    }

    pub fn has_warnings(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Warning)
    }

    /// Valid and fingerprinted.
    pub fn is_committable(&self) -> bool {
        self.status == RowStatus::Valid && self.row_hash.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged() -> StagingRow {
        let raw = RawRow::from_pairs(1, [("Mail", "jane@ex.com")]).unwrap();
        StagingRow::new(BatchId::new(), TenantId::new("t").unwrap(), raw)
    }

    #[test]
    fn test_row_index_zero_is_rejected() {
        assert_eq!(
            RawRow::new(0, BTreeMap::new()).unwrap_err(),
            ModelError::InvalidRowIndex
        );
    }

    #[test]
    fn test_warnings_do_not_block_validity() {
        let mut row = staged();
        row.set_normalized(BTreeMap::new(), RowHash::from_digest([1; 32]));
        row.apply_findings(vec![ErrorDescriptor::warning(
            Some("email"),
            ErrorCode::InvalidEmail,
            "not case-normalized",
        )]);
        assert_eq!(row.status, RowStatus::Valid);
        assert!(row.is_committable());
        assert!(row.has_warnings());
    }

    #[test]
    fn test_errors_make_row_uncommittable() {
        let mut row = staged();
        row.set_normalized(BTreeMap::new(), RowHash::from_digest([1; 32]));
        row.apply_findings(vec![ErrorDescriptor::error(
            None,
            ErrorCode::MissingIdentifier,
            "no identifier",
        )]);
        assert_eq!(row.status, RowStatus::Error);
        assert!(!row.is_committable());
    }

    #[test]
    fn test_pending_row_is_not_committable() {
        assert!(!staged().is_committable());
    }
}
