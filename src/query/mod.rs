//! Query Filter Engine
//!
//! Turns an operator-typed search string into predicates over topology records:
//! - `parser`: tokens, field prefixes and modifiers
//! - `document`: per-record search data, built once per snapshot
//! - `index`: the documents of a whole snapshot and their cache
//! - `filter`: evaluation against replica sets and instances

pub mod document;
pub mod filter;
pub mod index;
pub mod parser;

pub use document::{FieldValue, SearchDocument};
pub use filter::{
    filter_instances, filter_replica_sets, filter_replica_sets_with, filter_snapshot,
    FilteredInstanceView, FilteredReplicaSetView,
};
pub use index::{IndexCache, SearchIndex};
pub use parser::{FieldPredicate, MatchMode, SearchField, SearchQuery};
