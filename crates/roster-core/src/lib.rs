//! Import batch orchestration for roster imports.
//!
//! Ties the mapping resolver, transform and validation engines, staging
//! store and commit engine into the batch lifecycle.
//!
//! - **config**: pipeline settings loaded from TOML
//! - **error**: pipeline error type with operator-facing messages
//! - **pipeline**: [`ImportPipeline`], one method per operator action
//! - **report**: error/warning reports and staging summaries

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Collaborators, ImportPipeline};
pub use report::{CancelOutcome, RowReport, StageSummary};
