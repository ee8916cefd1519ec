//! Validation engine for roster imports.
//!
//! Applies per-field and cross-field checks to normalized rows and
//! produces structured error descriptors. `warning` findings never block a
//! row; any `error` finding does.

#![deny(unsafe_code)]

pub mod checks;
mod engine;

pub use engine::{ValidationEngine, ValidationSummary};
