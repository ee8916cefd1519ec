//! Store error types.

use thiserror::Error;

use roster_model::{BatchId, BatchStatus, RecordId, TenantId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("batch {batch_id} not found for tenant {tenant}")]
    BatchNotFound { tenant: TenantId, batch_id: BatchId },

    #[error("batch {batch_id} already exists")]
    BatchExists { batch_id: BatchId },

    /// Staging rows of a terminal batch are read-only.
    #[error("rows of batch {batch_id} are frozen ({status})")]
    RowsFrozen { batch_id: BatchId, status: String },

    /// The batch moved on since it was read.
    #[error("batch {batch_id} is {found}, expected {expected}")]
    StatusChanged {
        batch_id: BatchId,
        expected: BatchStatus,
        found: BatchStatus,
    },

    #[error("commit log for batch {batch_id} already written")]
    CommitLogExists { batch_id: BatchId },

    #[error("record {record_id} not found for tenant {tenant}")]
    RecordNotFound { tenant: TenantId, record_id: RecordId },

    /// Another record of the tenant already owns this identifier.
    #[error("{identifier} already belongs to record {existing}")]
    UniqueViolation {
        identifier: String,
        existing: RecordId,
    },

    /// Two writes of one chunk carry the same identifier.
    #[error("{identifier} is carried by two writes of the same chunk")]
    ChunkCollision { identifier: String },

    #[error("row belongs to tenant {found}, expected {expected}")]
    TenantMismatch { expected: TenantId, found: TenantId },

    /// A collaborator could not be reached; the call may succeed later.
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),

    #[error("failed to encode row")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::UniqueViolation { .. } | StoreError::ChunkCollision { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
