//! Validation check modules.
//!
//! Each module performs one kind of row check and returns its findings;
//! none of them depend on the others.

pub mod contact;
pub mod dates;
pub mod identity;
pub mod reference;
pub mod required;
