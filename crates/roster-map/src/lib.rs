//! Mapping resolution for roster imports.
//!
//! Selects a stored tenant mapping or proposes one from header aliases.
//! Proposals are never stored or applied by this crate.

#![deny(unsafe_code)]

pub mod aliases;
pub mod error;
pub mod fold;
pub mod repository;
pub mod resolver;
pub mod score;

pub use aliases::{default_aliases, merge_aliases};
pub use error::{MappingError, Result};
pub use fold::{fold_header, same_header};
pub use repository::{InMemoryMappingStore, MappingRepository, MappingStore};
pub use resolver::{
    MappingProposal, MappingResolver, MappingSelector, ProposalSource, SUGGESTED_MAPPING_NAME,
};
pub use score::{AliasScorer, HeaderScore, ScoreComponent, Suggestion};
