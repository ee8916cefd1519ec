//! Value-level normalizers used by transform rules.
//!
//! Every function here is pure and returns `None` when the input cannot be
//! normalized; the engine then keeps the value it had.

pub mod date;
pub mod phone;
pub mod text;

pub use date::{reparse_date, to_chrono_pattern};
pub use phone::normalize_phone;
pub use text::{collapse_whitespace, title_case};
