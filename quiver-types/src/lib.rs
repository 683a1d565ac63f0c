//! Core types and errors for the Quiver postings accumulator.
//!
//! This crate holds the vocabulary shared by the accumulation and merge
//! halves of the indexer. Keeping it separate gives:
//!
//! - **One error type**: producers, slices and merge states all fail with
//!   [`PostingsError`]
//! - **Stable encodings**: the varint format lives next to the types that
//!   depend on it
//! - **Clean boundaries**: the segment writer can depend on these types
//!   without pulling in the arena machinery

#![warn(missing_docs)]

use core::fmt;

use thiserror::Error;

/// Unique document identifier.
///
/// Document IDs are assigned by the indexing path and must be handed to the
/// accumulator in non-decreasing order per term.
pub type DocId = u32;

/// Largest document ID the postings encoding can represent.
///
/// Frequency-carrying fields store `delta << 1`, so deltas (and therefore
/// IDs) are limited to 31 bits.
pub const MAX_DOC_ID: DocId = i32::MAX as u32;

/// Result alias used throughout the workspace.
pub type Result<T> = core::result::Result<T, PostingsError>;

/// What a field records for each term occurrence.
///
/// Ordered from least to most information, so `a < b` means `a` records a
/// subset of what `b` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum IndexOptions {
    /// Only which documents contain the term. Frequencies are reported as 1.
    Docs = 0,
    /// Documents plus per-document term frequency.
    DocsAndFreqs = 1,
    /// Documents, frequencies and token positions.
    #[default]
    DocsAndFreqsAndPositions = 2,
}

impl IndexOptions {
    /// Returns `true` if term frequencies are recorded.
    #[inline(always)]
    pub const fn has_freqs(self) -> bool {
        !matches!(self, IndexOptions::Docs)
    }

    /// Returns `true` if token positions are recorded.
    #[inline(always)]
    pub const fn has_positions(self) -> bool {
        matches!(self, IndexOptions::DocsAndFreqsAndPositions)
    }
}

impl fmt::Display for IndexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexOptions::Docs => "docs",
            IndexOptions::DocsAndFreqs => "docs+freqs",
            IndexOptions::DocsAndFreqsAndPositions => "docs+freqs+positions",
        };
        f.write_str(name)
    }
}

/// Name and indexing options of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldInfo {
    /// Field name, unique within a worker.
    pub name: String,
    /// What the field records per occurrence.
    pub options: IndexOptions,
}

impl FieldInfo {
    /// Creates a new field description.
    pub fn new(name: impl Into<String>, options: IndexOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// Tuning knobs for postings accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingsConfig {
    /// Longest accepted term in bytes. Must not exceed the arena block size.
    /// Default: 16383
    pub max_term_length: usize,
    /// Number of arena blocks kept for reuse across resets.
    /// Default: 8 (256 KiB with 32 KiB blocks)
    pub recycled_blocks: usize,
    /// Capacity hint for the per-field term tables.
    pub initial_terms: usize,
}

impl Default for PostingsConfig {
    fn default() -> Self {
        Self {
            max_term_length: 16383,
            recycled_blocks: 8,
            initial_terms: 1024,
        }
    }
}

impl PostingsConfig {
    /// Preset for short-lived workers: no block recycling, small tables.
    pub const fn compact() -> Self {
        Self {
            max_term_length: 255,
            recycled_blocks: 0,
            initial_terms: 64,
        }
    }

    /// Checks the configuration against the arena block size.
    ///
    /// # Errors
    /// Returns [`PostingsError::InvalidConfig`] if `max_term_length` is zero
    /// or larger than `block_size`.
    pub fn validate(&self, block_size: usize) -> Result<()> {
        if self.max_term_length == 0 {
            return Err(PostingsError::InvalidConfig {
                reason: "max_term_length must be positive",
            });
        }
        if self.max_term_length > block_size {
            return Err(PostingsError::InvalidConfig {
                reason: "max_term_length exceeds the arena block size",
            });
        }
        Ok(())
    }
}

/// Errors raised while accumulating or merging postings.
///
/// Variants fall in three classes:
/// - **producer** errors: the indexing path broke its contract
/// - **consistency** errors: the merge API was driven incorrectly
/// - **corruption** errors: arena or encoding invariants no longer hold;
///   the enclosing flush must be abandoned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostingsError {
    /// Term text is longer than the configured maximum.
    #[error("term too long: {len} bytes (max: {max} bytes)")]
    TermTooLong {
        /// Length of the rejected term.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A document arrived with a smaller ID than one already recorded.
    #[error("document {doc} arrived after document {last} for the same term")]
    DocOutOfOrder {
        /// Offending document.
        doc: DocId,
        /// Last document recorded for the term.
        last: DocId,
    },
    /// A document ID above [`MAX_DOC_ID`].
    #[error("document id {doc} out of range (max: {max})")]
    DocIdOutOfRange {
        /// Offending document.
        doc: DocId,
        /// Largest representable ID.
        max: DocId,
    },
    /// A position smaller than the previous position in the same document.
    #[error("position {position} arrived after position {last} in document {doc}")]
    PositionOutOfOrder {
        /// Document being indexed.
        doc: DocId,
        /// Offending position.
        position: u32,
        /// Previous position.
        last: u32,
    },
    /// A single arena allocation larger than one block.
    #[error("allocation of {len} bytes exceeds block size {block_size}")]
    AllocationTooLarge {
        /// Requested length.
        len: usize,
        /// Arena block size.
        block_size: usize,
    },
    /// The arena cannot address any more blocks.
    #[error("arena exhausted after {blocks} blocks")]
    ArenaExhausted {
        /// Blocks allocated when the limit was hit.
        blocks: usize,
    },
    /// The field was never registered with the accumulator.
    #[error("unknown field: {name}")]
    UnknownField {
        /// Requested field name.
        name: String,
    },
    /// Configuration rejected by [`PostingsConfig::validate`].
    #[error("invalid postings config: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: &'static str,
    },
    /// `next_doc` called before `next_term`, or after terms ran out.
    #[error("merge state misuse: {reason}")]
    InvalidMergeState {
        /// What the caller did.
        reason: &'static str,
    },
    /// `add` after the accumulator was frozen, or a merge before freezing.
    #[error("accumulator is {state}")]
    AccumulatorState {
        /// `"frozen"` or `"not frozen"`.
        state: &'static str,
    },
    /// Merge states for one field disagree on index options.
    #[error("cannot merge field {field}: index options {expected} vs {actual}")]
    IndexOptionsMismatch {
        /// Field being merged.
        field: String,
        /// Options of the first state.
        expected: IndexOptions,
        /// Options of the disagreeing state.
        actual: IndexOptions,
    },
    /// Decoded document IDs stopped increasing within a term.
    #[error("document order violated: {doc} after {previous}")]
    DocOrderViolation {
        /// Newly decoded document (saturated on overflow).
        doc: u64,
        /// Previous document of the term.
        previous: DocId,
    },
    /// A reader tried to read beyond the bytes written to its slice.
    #[error("slice overrun: read past end of slice")]
    SliceOverrun,
    /// A slice trailer or link is inconsistent with the arena.
    #[error("corrupt slice: {reason}")]
    CorruptSlice {
        /// What was found.
        reason: &'static str,
    },
    /// A varint with too many continuation groups.
    #[error("malformed varint: continuation bit set after {groups} groups")]
    MalformedVarint {
        /// Groups consumed before giving up.
        groups: usize,
    },
    /// A posting entry that decodes to zero documents.
    #[error("term has no documents")]
    EmptyTerm,
    /// The same document appears for one term in two merge states.
    #[error("document {doc} recorded by more than one worker")]
    DuplicateDocument {
        /// Duplicated document.
        doc: DocId,
    },
}

impl PostingsError {
    /// Returns `true` for errors that mean arena or encoding corruption.
    ///
    /// These must abort the enclosing flush; nothing is retried.
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            PostingsError::DocOrderViolation { .. }
                | PostingsError::SliceOverrun
                | PostingsError::CorruptSlice { .. }
                | PostingsError::MalformedVarint { .. }
                | PostingsError::EmptyTerm
                | PostingsError::DuplicateDocument { .. }
        )
    }
}

/// Variable-length integer encoding.
///
/// 7 payload bits per byte, least significant group first, high bit set on
/// every byte except the last.
pub mod varint {
    use crate::{PostingsError, Result};

    /// Maximum bytes needed to encode a `u32`.
    pub const MAX_VARINT_LEN: usize = 5;

    /// Encodes a u32 value as a varint into `buf`, returning the length.
    ///
    /// # Example
    /// ```
    /// use quiver_types::varint::encode_varint;
    ///
    /// let mut buf = [0u8; 5];
    /// let len = encode_varint(150u32, &mut buf);
    /// assert_eq!(&buf[..len], &[0x96, 0x01]);
    /// ```
    pub fn encode_varint(mut value: u32, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
        let mut i = 0;

        while value >= 0x80 {
            buf[i] = (value as u8) | 0x80;
            value >>= 7;
            i += 1;
        }

        buf[i] = value as u8;
        i + 1
    }

    /// Decodes a varint from the front of `buf`.
    ///
    /// Returns the value and the number of bytes consumed.
    ///
    /// # Errors
    /// [`PostingsError::SliceOverrun`] if `buf` ends mid-value,
    /// [`PostingsError::MalformedVarint`] if the value does not fit a `u32`.
    ///
    /// # Example
    /// ```
    /// use quiver_types::varint::decode_varint;
    ///
    /// let (value, len) = decode_varint(&[0x96, 0x01]).unwrap();
    /// assert_eq!((value, len), (150, 2));
    /// ```
    pub fn decode_varint(buf: &[u8]) -> Result<(u32, usize)> {
        let mut decoder = VarintDecoder::new();
        for (i, &byte) in buf.iter().enumerate() {
            if let Some(value) = decoder.push(byte)? {
                return Ok((value, i + 1));
            }
        }
        Err(PostingsError::SliceOverrun)
    }

    /// Returns the encoded length of `value` in bytes.
    pub const fn varint_len(value: u32) -> usize {
        match value {
            0..=0x7F => 1,
            0x80..=0x3FFF => 2,
            0x4000..=0x1F_FFFF => 3,
            0x20_0000..=0xFFF_FFFF => 4,
            _ => 5,
        }
    }

    /// Incremental decoder fed one byte at a time.
    ///
    /// Lets readers that cross buffer boundaries share the exact
    /// accumulation rules of [`decode_varint`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct VarintDecoder {
        value: u32,
        groups: usize,
    }

    impl VarintDecoder {
        /// Creates an empty decoder.
        pub const fn new() -> Self {
            Self {
                value: 0,
                groups: 0,
            }
        }

        /// Feeds one byte. Returns the value once the final group arrives.
        ///
        /// # Errors
        /// [`PostingsError::MalformedVarint`] when a sixth group would be
        /// needed or the fifth group overflows 32 bits.
        #[inline(always)]
        pub fn push(&mut self, byte: u8) -> Result<Option<u32>> {
            if self.groups == MAX_VARINT_LEN || (self.groups == MAX_VARINT_LEN - 1 && byte > 0x0F)
            {
                return Err(PostingsError::MalformedVarint {
                    groups: self.groups + 1,
                });
            }

            self.value |= ((byte & 0x7F) as u32) << (7 * self.groups);
            self.groups += 1;

            if byte & 0x80 == 0 {
                Ok(Some(self.value))
            } else {
                Ok(None)
            }
        }
    }
}
