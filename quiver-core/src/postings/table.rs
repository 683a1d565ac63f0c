//! Per-field term table: finds or creates the posting entry of a term.

use core::hash::Hasher;

use quiver_types::{DocId, FieldInfo, PostingsConfig, PostingsError, Result, MAX_DOC_ID};
use rustc_hash::{FxHashMap, FxHasher};
use smallvec::SmallVec;

use crate::arena::BlockArena;
use crate::postings::entry::PostingEntry;

#[inline(always)]
fn hash_term(term: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(term);
    hasher.finish()
}

/// Postings accumulated for one field by one worker.
///
/// Term text is not duplicated in the lookup table: buckets hold entry
/// indices and candidates are confirmed against the arena bytes.
pub struct FieldPostings {
    field: FieldInfo,
    entries: Vec<PostingEntry>,
    lookup: FxHashMap<u64, SmallVec<[u32; 1]>>,
    max_term_length: usize,
}

impl FieldPostings {
    /// Creates an empty table for `field`.
    pub fn new(field: FieldInfo, config: &PostingsConfig) -> Self {
        let mut lookup = FxHashMap::default();
        lookup.reserve(config.initial_terms);
        Self {
            field,
            entries: Vec::with_capacity(config.initial_terms),
            lookup,
            max_term_length: config.max_term_length,
        }
    }

    /// Records one occurrence of `term` at `position` in `doc`.
    ///
    /// # Errors
    ///
    /// Returns `TermTooLong`, `DocIdOutOfRange`, `DocOutOfOrder` or
    /// `PositionOutOfOrder` when the indexing path breaks its contract, and
    /// propagates arena allocation failures.
    pub fn add(
        &mut self,
        arena: &mut BlockArena,
        term: &[u8],
        doc: DocId,
        position: u32,
    ) -> Result<()> {
        if term.len() > self.max_term_length {
            return Err(PostingsError::TermTooLong {
                len: term.len(),
                max: self.max_term_length,
            });
        }
        if doc > MAX_DOC_ID {
            return Err(PostingsError::DocIdOutOfRange {
                doc,
                max: MAX_DOC_ID,
            });
        }

        let options = self.field.options;
        let bucket = self.lookup.entry(hash_term(term)).or_default();

        let existing = bucket
            .iter()
            .copied()
            .find(|&idx| arena.term(self.entries[idx as usize].term) == term);
        if let Some(idx) = existing {
            return self.entries[idx as usize].add_occurrence(arena, doc, position, options);
        }

        let entry = PostingEntry::new(arena, term, doc, position, options)?;
        bucket.push(self.entries.len() as u32);
        self.entries.push(entry);
        Ok(())
    }

    /// Seals every slice ahead of the merge.
    pub(crate) fn finish(&mut self, arena: &mut BlockArena) {
        for entry in &mut self.entries {
            entry.finish(arena);
        }
    }

    /// Field this table belongs to.
    #[inline(always)]
    pub fn field(&self) -> &FieldInfo {
        &self.field
    }

    /// Entries in first-occurrence order.
    #[inline(always)]
    pub fn entries(&self) -> &[PostingEntry] {
        &self.entries
    }

    /// Number of distinct terms.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no term was recorded.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets all terms. The arena must be reset alongside.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lookup.clear();
    }
}
