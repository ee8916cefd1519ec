//! Data model for tenant-scoped roster imports.
//!
//! Every entity carries its [`TenantId`]; stores key all access by it.

pub mod batch;
pub mod commit;
pub mod enums;
pub mod error;
pub mod fields;
pub mod ids;
pub mod mapping;
pub mod record;
pub mod rules;
pub mod staging;

pub use batch::{BatchCounters, BatchRequest, ImportBatch, UploadManifest, validate_school_year};
pub use commit::{CommitCounts, CommitLog, CommitOutcome, OutcomeSample};
pub use enums::{
    BatchStatus, DedupStrategy, ErrorCode, ReferenceKind, RowAction, RowStatus, Severity,
    SourceFormat,
};
pub use error::{ModelError, Result};
pub use fields::Identifier;
pub use ids::{BatchId, RecordId, ReferenceId, RowHash, TenantId};
pub use mapping::{
    ImportMapping, MAX_FIELD_MAPPINGS, MAX_TRANSFORM_RULES, RequiredTarget, TransformOp,
    TransformRule,
};
pub use record::{CanonicalRecord, ParentContact, Person, Provenance, RecordDraft, StudentProfile};
pub use rules::TenantRules;
pub use staging::{ErrorDescriptor, RawRow, StagingRow};
