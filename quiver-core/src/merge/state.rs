//! Sorted replay of one worker's postings for one field.
//!
//! ## Iteration
//!
//! ```text
//! BeforeTerm --next_term--> InTerm --next_doc (false)--> TermExhausted
//!                             ^                                |
//!                             +-----------next_term------------+
//!                                          |
//!                                          +--(no terms left)--> Done
//! ```
//!
//! Within a term the frequency slice is decoded as delta-coded documents.
//! Once the slice is drained the entry may still hold the buffered final
//! document; it is yielded exactly once before the term reports exhaustion.
//! Entries are never mutated: whether the buffered document was yielded is
//! tracked here.

use quiver_types::{DocId, FieldInfo, PostingsError, Result, MAX_DOC_ID};
use smallvec::SmallVec;
use tracing::debug;

use crate::arena::BlockArena;
use crate::postings::entry::PostingEntry;
use crate::postings::sort::sort_postings;
use crate::slice::ByteSliceReader;

/// Where a [`FieldMergeState`] is in its iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePhase {
    /// `next_term` has not been called yet.
    BeforeTerm,
    /// A term is bound and may have more documents.
    InTerm,
    /// The bound term yielded all of its documents.
    TermExhausted,
    /// All terms were consumed.
    Done,
}

/// Decodes one field of one worker in term order.
pub struct FieldMergeState<'a> {
    field: &'a FieldInfo,
    arena: &'a BlockArena,
    entries: &'a [PostingEntry],
    order: Vec<u32>,
    next_entry: usize,
    phase: MergePhase,
    current: Option<&'a PostingEntry>,
    freq: Option<ByteSliceReader<'a>>,
    prox: Option<ByteSliceReader<'a>>,
    pending_emitted: bool,
    doc_id: DocId,
    prev_doc: Option<DocId>,
    term_freq: u32,
    positions: SmallVec<[u32; 8]>,
}

impl<'a> FieldMergeState<'a> {
    /// Sorts `entries` and positions the state before the first term.
    ///
    /// `arena` must be the arena the entries were accumulated into.
    pub fn new(field: &'a FieldInfo, arena: &'a BlockArena, entries: &'a [PostingEntry]) -> Self {
        let order = sort_postings(arena, entries);
        debug!(field = %field.name, terms = order.len(), "merge state opened");
        Self {
            field,
            arena,
            entries,
            order,
            next_entry: 0,
            phase: MergePhase::BeforeTerm,
            current: None,
            freq: None,
            prox: None,
            pending_emitted: false,
            doc_id: 0,
            prev_doc: None,
            term_freq: 0,
            positions: SmallVec::new(),
        }
    }

    /// Advances to the next term in byte order.
    ///
    /// Returns `false` once every term was visited. On success the first
    /// document of the term is already decoded.
    ///
    /// # Errors
    ///
    /// `EmptyTerm` if the entry yields no document, plus any decoding
    /// error from the first document.
    pub fn next_term(&mut self) -> Result<bool> {
        if self.phase == MergePhase::Done {
            return Ok(false);
        }

        let Some(&idx) = self.order.get(self.next_entry) else {
            self.phase = MergePhase::Done;
            self.current = None;
            self.freq = None;
            self.prox = None;
            return Ok(false);
        };
        self.next_entry += 1;

        let entry = &self.entries[idx as usize];
        self.current = Some(entry);
        self.doc_id = 0;
        self.prev_doc = None;
        self.term_freq = 0;
        self.pending_emitted = false;
        self.positions.clear();

        self.freq = Some(ByteSliceReader::new(self.arena, entry.freq_slice()));
        self.prox = if self.field.options.has_positions() {
            let cursor = entry.prox_slice().ok_or(PostingsError::CorruptSlice {
                reason: "positions recorded but entry has no position stream",
            })?;
            Some(ByteSliceReader::new(self.arena, cursor))
        } else {
            None
        };
        self.phase = MergePhase::InTerm;

        if !self.next_doc()? {
            return Err(PostingsError::EmptyTerm);
        }
        Ok(true)
    }

    /// Advances to the next document of the current term.
    ///
    /// Returns `false` once the term is exhausted; calling again keeps
    /// returning `false` until [`FieldMergeState::next_term`] is called.
    ///
    /// # Errors
    ///
    /// `InvalidMergeState` before the first `next_term` or after terms ran
    /// out; `DocOrderViolation` and slice errors on corrupt data.
    pub fn next_doc(&mut self) -> Result<bool> {
        let entry = match (self.phase, self.current) {
            (MergePhase::InTerm, Some(entry)) => entry,
            (MergePhase::TermExhausted, _) => return Ok(false),
            (MergePhase::BeforeTerm, _) => {
                return Err(PostingsError::InvalidMergeState {
                    reason: "next_doc called before next_term",
                })
            }
            (MergePhase::Done, _) => {
                return Err(PostingsError::InvalidMergeState {
                    reason: "next_doc called after the last term",
                })
            }
            (MergePhase::InTerm, None) => {
                return Err(PostingsError::InvalidMergeState {
                    reason: "no term bound",
                })
            }
        };

        let options = self.field.options;
        let freq = self.freq.as_mut().ok_or(PostingsError::InvalidMergeState {
            reason: "no frequency stream bound",
        })?;

        let (doc, term_freq) = if freq.eof() {
            match entry.pending {
                Some(pending) if !self.pending_emitted => {
                    self.pending_emitted = true;
                    let term_freq = if options.has_freqs() {
                        pending.term_freq
                    } else {
                        1
                    };
                    (u64::from(entry.last_doc_id), term_freq)
                }
                _ => {
                    self.phase = MergePhase::TermExhausted;
                    return Ok(false);
                }
            }
        } else {
            let code = freq.read_vint()?;
            let base = u64::from(self.doc_id);
            if !options.has_freqs() {
                (base + u64::from(code), 1)
            } else if code & 1 != 0 {
                (base + u64::from(code >> 1), 1)
            } else {
                (base + u64::from(code >> 1), freq.read_vint()?)
            }
        };

        if self.prev_doc.is_some_and(|prev| doc <= u64::from(prev)) || doc > u64::from(MAX_DOC_ID)
        {
            return Err(PostingsError::DocOrderViolation {
                doc,
                previous: self.doc_id,
            });
        }
        if term_freq == 0 {
            return Err(PostingsError::CorruptSlice {
                reason: "zero term frequency",
            });
        }

        self.doc_id = doc as DocId;
        self.prev_doc = Some(self.doc_id);
        self.term_freq = term_freq;

        if let Some(prox) = self.prox.as_mut() {
            self.positions.clear();
            let mut position = 0u32;
            for _ in 0..term_freq {
                let delta = prox.read_vint()?;
                position = position.checked_add(delta).ok_or(PostingsError::CorruptSlice {
                    reason: "position overflow",
                })?;
                self.positions.push(position);
            }
        }

        Ok(true)
    }

    /// Text of the current term; empty before the first term.
    #[inline]
    pub fn term(&self) -> &'a [u8] {
        match self.current {
            Some(entry) => self.arena.term(entry.term),
            None => &[],
        }
    }

    /// Current document.
    #[inline(always)]
    pub fn doc_id(&self) -> DocId {
        self.doc_id
    }

    /// Frequency of the current term in the current document.
    #[inline(always)]
    pub fn term_freq(&self) -> u32 {
        self.term_freq
    }

    /// Positions of the current term in the current document, ascending.
    /// Empty unless the field records positions.
    #[inline(always)]
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// Number of documents the current term occurs in.
    #[inline]
    pub fn doc_freq(&self) -> u32 {
        self.current.map_or(0, PostingEntry::doc_freq)
    }

    /// Field being merged.
    #[inline(always)]
    pub fn field(&self) -> &'a FieldInfo {
        self.field
    }

    /// Current phase.
    #[inline(always)]
    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    /// Number of terms this state will yield in total.
    #[inline(always)]
    pub fn num_terms(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::table::FieldPostings;
    use quiver_types::{IndexOptions, PostingsConfig};

    fn collect(state: &mut FieldMergeState<'_>) -> Vec<(Vec<u8>, DocId, u32)> {
        let mut out = Vec::new();
        while state.next_term().expect("should advance term") {
            loop {
                out.push((state.term().to_vec(), state.doc_id(), state.term_freq()));
                if !state.next_doc().expect("should advance doc") {
                    break;
                }
            }
        }
        out
    }

    fn build(
        options: IndexOptions,
        occurrences: &[(&str, DocId, u32)],
    ) -> (BlockArena, FieldPostings) {
        let mut arena = BlockArena::new();
        let mut table =
            FieldPostings::new(FieldInfo::new("f", options), &PostingsConfig::default());
        for &(term, doc, pos) in occurrences {
            table
                .add(&mut arena, term.as_bytes(), doc, pos)
                .expect("should add");
        }
        (arena, table)
    }

    #[test]
    fn three_terms_one_doc_each() {
        let (arena, table) = build(
            IndexOptions::DocsAndFreqs,
            &[("cherry", 2, 0), ("apple", 0, 0), ("banana", 1, 0)],
        );
        let mut state = FieldMergeState::new(table.field(), &arena, table.entries());

        assert_eq!(
            collect(&mut state),
            vec![
                (b"apple".to_vec(), 0, 1),
                (b"banana".to_vec(), 1, 1),
                (b"cherry".to_vec(), 2, 1),
            ]
        );
        assert_eq!(state.phase(), MergePhase::Done);
        assert!(!state.next_term().expect("stays done"));
    }

    #[test]
    fn deferred_final_document() {
        let (arena, table) = build(
            IndexOptions::DocsAndFreqs,
            &[("x", 0, 0), ("x", 0, 1), ("x", 0, 2), ("x", 2, 0)],
        );
        let mut state = FieldMergeState::new(table.field(), &arena, table.entries());

        assert!(state.next_term().expect("should advance"));
        assert_eq!((state.doc_id(), state.term_freq()), (0, 3));
        assert_eq!(state.doc_freq(), 2);
        assert!(state.next_doc().expect("should advance"));
        assert_eq!((state.doc_id(), state.term_freq()), (2, 1));
        assert!(!state.next_doc().expect("term exhausted"));
        assert_eq!(state.phase(), MergePhase::TermExhausted);
        assert!(!state.next_doc().expect("still exhausted"));
        assert!(!state.next_term().expect("no more terms"));
    }

    #[test]
    fn docs_only_reports_freq_one() {
        let (arena, table) = build(
            IndexOptions::Docs,
            &[("t", 0, 0), ("t", 0, 1), ("t", 5, 0), ("t", 6, 0), ("t", 6, 3)],
        );
        let mut state = FieldMergeState::new(table.field(), &arena, table.entries());

        assert_eq!(
            collect(&mut state),
            vec![(b"t".to_vec(), 0, 1), (b"t".to_vec(), 5, 1), (b"t".to_vec(), 6, 1)]
        );
    }

    #[test]
    fn positions_follow_documents() {
        let (arena, table) = build(
            IndexOptions::DocsAndFreqsAndPositions,
            &[("p", 1, 2), ("p", 1, 9), ("q", 1, 5), ("p", 4, 0)],
        );
        let mut state = FieldMergeState::new(table.field(), &arena, table.entries());

        assert!(state.next_term().expect("should advance"));
        assert_eq!(state.term(), b"p");
        assert_eq!(state.positions(), &[2, 9]);
        assert!(state.next_doc().expect("should advance"));
        assert_eq!(state.doc_id(), 4);
        assert_eq!(state.positions(), &[0]);
        assert!(!state.next_doc().expect("exhausted"));

        assert!(state.next_term().expect("should advance"));
        assert_eq!(state.term(), b"q");
        assert_eq!((state.doc_id(), state.positions()), (1, &[5][..]));
    }

    #[test]
    fn rejects_next_doc_outside_a_term() {
        let (arena, table) = build(IndexOptions::DocsAndFreqs, &[("a", 0, 0)]);
        let mut state = FieldMergeState::new(table.field(), &arena, table.entries());

        assert!(matches!(
            state.next_doc(),
            Err(PostingsError::InvalidMergeState { .. })
        ));
        assert!(state.next_term().expect("should advance"));
        assert!(!state.next_term().expect("exhausted"));
        assert!(matches!(
            state.next_doc(),
            Err(PostingsError::InvalidMergeState { .. })
        ));
    }

    #[test]
    fn empty_field() {
        let (arena, table) = build(IndexOptions::DocsAndFreqs, &[]);
        let mut state = FieldMergeState::new(table.field(), &arena, table.entries());
        assert_eq!(state.num_terms(), 0);
        assert_eq!(state.term(), b"");
        assert!(!state.next_term().expect("nothing to do"));
    }

    #[test]
    fn corrupted_delta_is_detected() {
        let (mut arena, table) = build(
            IndexOptions::DocsAndFreqs,
            &[("a", 3, 0), ("a", 7, 0), ("a", 9, 0)],
        );
        // Slice holds [(3 << 1) | 1, (4 << 1) | 1]; zero the second delta.
        let start = table.entries()[0].freq_slice().start();
        arena.write(start.add(1), &[1]);

        let mut state = FieldMergeState::new(table.field(), &arena, table.entries());
        assert!(state.next_term().expect("first doc fine"));
        let err = state.next_doc().expect_err("doc 3 repeated");
        assert!(err.is_corruption());
        assert!(matches!(err, PostingsError::DocOrderViolation { doc: 3, previous: 3 }));
    }

    #[test]
    fn entry_without_documents_is_corruption() {
        let mut arena = BlockArena::new();
        let mut table = FieldPostings::new(
            FieldInfo::new("f", IndexOptions::DocsAndFreqs),
            &PostingsConfig::default(),
        );
        table.add(&mut arena, b"ghost", 0, 0).expect("should add");
        let mut entries = table.entries().to_vec();
        entries[0].pending = None;

        let mut state = FieldMergeState::new(table.field(), &arena, &entries);
        assert_eq!(state.next_term(), Err(PostingsError::EmptyTerm));
    }
}
