//! Sorted replay of accumulated postings.

mod collect;
mod coordinator;
pub(crate) mod state;

pub use collect::{collect_field, CollectedDoc, CollectedPostings, CollectedTerm};
pub use coordinator::{merge_field, merge_workers, MergeSummary, PostingsConsumer};
pub use state::{FieldMergeState, MergePhase};
