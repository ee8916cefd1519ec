//! Commit error types.

use thiserror::Error;

use roster_model::{BatchId, BatchStatus, ModelError, TenantId};
use roster_store::{StoreError, Transient};

#[derive(Debug, Error)]
pub enum CommitError {
    /// Another commit of the tenant held the lease for the whole wait.
    #[error("commit lock for tenant {tenant} not acquired within {waited_ms} ms")]
    LockTimeout { tenant: TenantId, waited_ms: u64 },

    /// The lease expired and was taken over by another run.
    #[error("commit lease for tenant {tenant} was lost")]
    LeaseLost { tenant: TenantId },

    #[error("batch {batch_id} is {status}; only ready_to_commit batches can be committed")]
    NotReady {
        batch_id: BatchId,
        status: BatchStatus,
    },

    #[error("batch {batch_id} was already committed")]
    AlreadyCommitted { batch_id: BatchId },

    /// A collaborator failed mid-run. Chunks before `chunk_index` are
    /// committed and recorded in the commit log.
    #[error("commit of batch {batch_id} stopped at chunk {chunk_index}: {source}")]
    Chunk {
        batch_id: BatchId,
        chunk_index: usize,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("tenant lock table poisoned")]
    Poisoned,
}

impl CommitError {
    /// Whether the whole commit may be attempted again as is.
    pub fn is_transient(&self) -> bool {
        match self {
            CommitError::LockTimeout { .. } => true,
            CommitError::Store(source) => source.is_transient(),
            _ => false,
        }
    }
}

impl Transient for CommitError {
    fn is_transient(&self) -> bool {
        CommitError::is_transient(self)
    }
}

pub type Result<T> = std::result::Result<T, CommitError>;
