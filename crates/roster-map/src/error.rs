//! Error types for mapping operations.

use thiserror::Error;

use roster_model::{ModelError, TenantId};

#[derive(Debug, Error)]
pub enum MappingError {
    /// No mapping was selected and no header reached the confidence threshold.
    #[error(
        "no mapping available for tenant {tenant}: best header score {best_score:.2} is below {threshold:.2}"
    )]
    NoMappingAvailable {
        tenant: TenantId,
        best_score: f32,
        threshold: f32,
    },

    #[error("mapping {} not found for tenant {tenant}", mapping_label(.name, .version))]
    NotFound {
        tenant: TenantId,
        name: String,
        version: Option<u32>,
    },

    #[error("mapping {name}@v{version} already exists for tenant {tenant}")]
    VersionExists {
        tenant: TenantId,
        name: String,
        version: u32,
    },

    #[error(transparent)]
    Invalid(#[from] ModelError),

    #[error("mapping store lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

fn mapping_label(name: &str, version: &Option<u32>) -> String {
    match version {
        Some(v) => format!("{name}@v{v}"),
        None => name.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
