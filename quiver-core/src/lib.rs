//! In-memory postings accumulation and sorted merge.
//!
//! Indexing workers record `(term, doc, position)` occurrences into a
//! [`WorkerPostings`], which packs term text and delta-coded postings into
//! a [`BlockArena`] of fixed-size blocks. At flush time the worker is frozen
//! and each field is replayed in term order through a [`FieldMergeState`];
//! [`merge_workers`] interleaves several workers into one ordered stream for
//! a [`PostingsConsumer`].
//!
//! ```
//! use quiver_core::{merge_workers, CollectedPostings, WorkerPostings};
//! use quiver_types::{FieldInfo, IndexOptions, PostingsConfig};
//!
//! let mut worker = WorkerPostings::new(PostingsConfig::default())?;
//! let body = worker.add_field(FieldInfo::new("body", IndexOptions::DocsAndFreqs))?;
//! worker.add(body, b"hello", 0, 0)?;
//! worker.add(body, b"world", 0, 1)?;
//! worker.add(body, b"hello", 3, 0)?;
//! worker.freeze();
//!
//! let mut out = CollectedPostings::default();
//! merge_workers(&[&worker], "body", &mut out)?;
//! assert_eq!(out.doc_ids(b"hello"), vec![0, 3]);
//! # Ok::<(), quiver_types::PostingsError>(())
//! ```

pub mod arena;
pub mod merge;
pub mod postings;
pub mod slice;
pub mod stats;

pub use arena::{BlockArena, ByteAddr, TermRef, BLOCK_SIZE};
pub use merge::{
    collect_field, merge_field, merge_workers, CollectedDoc, CollectedPostings, CollectedTerm,
    FieldMergeState, MergePhase, MergeSummary, PostingsConsumer,
};
pub use postings::{sort_postings, FieldPostings, PendingDoc, PostingEntry, WorkerPostings};
pub use slice::{ByteSliceReader, ByteSliceWriter, SliceCursor};
pub use stats::AccumulatorStats;
