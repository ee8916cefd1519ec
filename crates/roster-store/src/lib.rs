//! Collaborator interfaces and in-memory stores for roster imports.
//!
//! Every operation takes the tenant as part of its key; nothing here is
//! readable across tenants.

pub mod error;
pub mod hash;
pub mod lookup;
pub mod records;
pub mod retry;
pub mod staging;

pub use error::{Result, StoreError};
pub use hash::{content_checksum, row_hash};
pub use lookup::{InMemoryReferenceSource, LookupCache, ReferenceSource};
pub use records::{InMemoryRecordStore, RecordStore, RecordWrite, WriteOutcome};
pub use retry::{RetryPolicy, Transient};
pub use staging::{InMemoryStagingStore, PurgeSummary, StagingStore, UpsertSummary};
