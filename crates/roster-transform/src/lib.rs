//! Transform engine for roster imports.
//!
//! - **engine**: interprets a mapping's column assignments and ordered
//!   transform rules over raw rows
//! - **normalization**: phone, date and text normalizers used by the rules

#![deny(unsafe_code)]

pub mod engine;
pub mod normalization;

pub use engine::{NormalizedRow, TransformEngine};
pub use normalization::{
    collapse_whitespace, normalize_phone, reparse_date, title_case, to_chrono_pattern,
};
