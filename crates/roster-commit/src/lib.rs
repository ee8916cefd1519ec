//! Commit engine for roster imports.
//!
//! - **lock**: per-tenant lease coordinator serializing commit runs
//! - **engine**: chunked dedup/upsert of valid staged rows
//! - **cancel**: cooperative cancellation checked between chunks

#![deny(unsafe_code)]

pub mod cancel;
pub mod engine;
pub mod error;
pub mod lock;
mod plan;

pub use cancel::CancellationToken;
pub use engine::{CommitEngine, CommitSettings};
pub use error::{CommitError, Result};
pub use lock::{TenantLease, TenantLockCoordinator};
