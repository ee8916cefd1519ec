//! Library side of the `roster` command-line tool.
//!
//! - **logging**: tracing subscriber setup and row-value redaction
//! - **seed**: TOML seed files wiring in-memory collaborators
//! - **source**: CSV upload tokenizing
//! - **workflow**: import and suggestion runs over a seeded pipeline

#![deny(unsafe_code)]

pub mod logging;
pub mod seed;
pub mod source;
pub mod workflow;
