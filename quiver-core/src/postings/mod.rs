//! Postings accumulation: entries, per-field term tables and the
//! per-worker accumulator.

pub(crate) mod entry;
pub(crate) mod sort;
pub(crate) mod table;
mod worker;

pub use entry::{PendingDoc, PostingEntry};
pub use sort::sort_postings;
pub use table::FieldPostings;
pub use worker::WorkerPostings;
