//! Pipeline error types.

use std::path::PathBuf;

use thiserror::Error;

use roster_commit::CommitError;
use roster_map::MappingError;
use roster_model::{BatchId, BatchStatus, ModelError, TenantId};
use roster_store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch {batch_id} is {status}; cannot {operation}")]
    InvalidState {
        batch_id: BatchId,
        status: BatchStatus,
        operation: &'static str,
    },

    #[error("batch {batch_id} is already being committed")]
    CommitInProgress { batch_id: BatchId },

    /// Another call is changing the same batch.
    #[error("batch {batch_id} is busy with another operation")]
    BatchBusy { batch_id: BatchId },

    #[error("batch {batch_id} has no accepted mapping")]
    MissingMapping { batch_id: BatchId },

    /// A mapping or row of one tenant was offered to another tenant's batch.
    #[error("mapping belongs to tenant {found}, batch belongs to {expected}")]
    TenantMismatch { expected: TenantId, found: TenantId },

    #[error("failed to read config {}", .path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("pipeline state lock poisoned")]
    Poisoned,
}

impl PipelineError {
    /// Whether repeating the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::BatchBusy { .. } => true,
            PipelineError::Commit(source) => source.is_transient(),
            PipelineError::Store(source) => source.is_transient(),
            _ => false,
        }
    }

    /// Text for the operator, without internal identifiers.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidState {
                status, operation, ..
            } => format!("This import is {status} and cannot {operation}."),
            PipelineError::CommitInProgress { .. } => {
                "This import is already being committed.".to_string()
            }
            PipelineError::BatchBusy { .. } => {
                "This import is being updated by another request. Try again shortly.".to_string()
            }
            PipelineError::MissingMapping { .. } => {
                "Select or accept a column mapping before processing rows.".to_string()
            }
            PipelineError::TenantMismatch { .. } => {
                "That mapping belongs to another school.".to_string()
            }
            PipelineError::ConfigIo { .. }
            | PipelineError::ConfigParse { .. }
            | PipelineError::InvalidConfig { .. } => format!("Configuration problem: {self}"),
            PipelineError::Mapping(MappingError::NoMappingAvailable { .. }) => {
                "No column of the file could be matched to a known field. Select a mapping manually."
                    .to_string()
            }
            PipelineError::Mapping(MappingError::NotFound { name, .. }) => {
                format!("Mapping '{name}' does not exist.")
            }
            PipelineError::Mapping(_) => "The mapping could not be used.".to_string(),
            PipelineError::Commit(CommitError::LockTimeout { .. }) => {
                "Another import for this school is being committed. Try again shortly."
                    .to_string()
            }
            PipelineError::Commit(CommitError::Chunk { chunk_index, .. }) => format!(
                "The commit stopped at chunk {chunk_index}. Earlier chunks were saved; start a new import to finish."
            ),
            PipelineError::Commit(_) => "The import could not be committed.".to_string(),
            PipelineError::Model(ModelError::InvalidSchoolYear { value, .. }) => {
                format!("School year '{value}' must look like 2024-2025.")
            }
            PipelineError::Store(StoreError::StatusChanged { found, .. }) => {
                format!("This import became {found} while the request ran. Reload it.")
            }
            PipelineError::Store(source) if source.is_transient() => {
                "A dependent service is unavailable. Try again shortly.".to_string()
            }
            PipelineError::Store(_) | PipelineError::Model(_) | PipelineError::Poisoned => {
                "An internal error occurred.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
