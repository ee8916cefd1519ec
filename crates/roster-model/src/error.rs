use thiserror::Error;

use crate::enums::BatchStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid tenant id: {0:?}")]
    InvalidTenantId(String),

    #[error("invalid school year {value:?}: {reason}")]
    InvalidSchoolYear { value: String, reason: &'static str },

    #[error("batch cannot move from {from} to {to}")]
    InvalidTransition { from: BatchStatus, to: BatchStatus },

    #[error("row index starts at 1")]
    InvalidRowIndex,

    #[error("mapping name must not be empty")]
    EmptyMappingName,

    #[error("mapping has too many {what} ({count} > {max})")]
    MappingTooLarge {
        what: &'static str,
        count: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;
