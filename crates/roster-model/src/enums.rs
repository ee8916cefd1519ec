//! Type-safe enumerations for the import pipeline.
//!
//! Each enum serializes to the lowercase token used in stored records and
//! configuration files, and parses case-insensitively from the same token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Container format of the uploaded export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "xlsx" => Ok(SourceFormat::Xlsx),
            _ => Err(format!("Unknown source format: {s}")),
        }
    }
}

/// Policy applied when a staged row matches an existing record at commit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Update the matched record's profile from the row.
    #[default]
    Merge,
    /// Leave the matched record untouched.
    Skip,
    /// Abort the commit run on the first match.
    Fail,
}

impl DedupStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupStrategy::Merge => "merge",
            DedupStrategy::Skip => "skip",
            DedupStrategy::Fail => "fail",
        }
    }
}

impl fmt::Display for DedupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DedupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(DedupStrategy::Merge),
            "skip" => Ok(DedupStrategy::Skip),
            "fail" => Ok(DedupStrategy::Fail),
            _ => Err(format!("Unknown dedup strategy: {s}")),
        }
    }
}

/// Lifecycle state of an import batch.
///
/// ```text
/// uploaded -> mapped -> validated -> ready_to_commit -> committed
///     \__________\__________\_______________\_________-> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Uploaded,
    Mapped,
    Validated,
    ReadyToCommit,
    Committed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Uploaded => "uploaded",
            BatchStatus::Mapped => "mapped",
            BatchStatus::Validated => "validated",
            BatchStatus::ReadyToCommit => "ready_to_commit",
            BatchStatus::Committed => "committed",
            BatchStatus::Failed => "failed",
        }
    }

    /// Committed and failed batches never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Committed | BatchStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `validated -> validated` is allowed so a batch can be re-processed
    /// before operator confirmation.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::{Committed, Failed, Mapped, ReadyToCommit, Uploaded, Validated};
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Uploaded, Mapped)
            | (Mapped, Validated)
            | (Validated, Validated)
            | (Validated, ReadyToCommit)
            | (ReadyToCommit, Committed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing state of one staged row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    #[default]
    Pending,
    Normalized,
    Valid,
    Error,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Normalized => "normalized",
            RowStatus::Valid => "valid",
            RowStatus::Error => "error",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable code carried by every row-level error descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// None of the strong identifiers (email, phone, matricule) is present.
    MissingIdentifier,
    /// A tenant-mandatory or mapping-required field is absent.
    MissingRequiredField,
    InvalidEmail,
    InvalidPhone,
    InvalidDateOfBirth,
    InvalidSchoolYear,
    DuplicateMatricule,
    /// A level/department code did not resolve within the tenant.
    UnresolvedReference,
    /// Email and phone point at two different existing records.
    IdentifierAmbiguity,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingIdentifier => "MissingIdentifier",
            ErrorCode::MissingRequiredField => "MissingRequiredField",
            ErrorCode::InvalidEmail => "InvalidEmail",
            ErrorCode::InvalidPhone => "InvalidPhone",
            ErrorCode::InvalidDateOfBirth => "InvalidDateOfBirth",
            ErrorCode::InvalidSchoolYear => "InvalidSchoolYear",
            ErrorCode::DuplicateMatricule => "DuplicateMatricule",
            ErrorCode::UnresolvedReference => "UnresolvedReference",
            ErrorCode::IdentifierAmbiguity => "IdentifierAmbiguity",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of reference table consulted through the lookup collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Level,
    Department,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Level => "level",
            ReferenceKind::Department => "department",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "level" => Ok(ReferenceKind::Level),
            "department" => Ok(ReferenceKind::Department),
            _ => Err(format!("Unknown reference kind: {s}")),
        }
    }
}

/// What the commit engine did with one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    Created,
    Updated,
    Skipped,
}

impl RowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::Created => "created",
            RowAction::Updated => "updated",
            RowAction::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
