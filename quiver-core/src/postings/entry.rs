//! Per-term posting record and its encoding rules.

use quiver_types::{DocId, IndexOptions, PostingsError, Result};

use crate::arena::{BlockArena, TermRef};
use crate::slice::{ByteSliceWriter, SliceCursor};

/// Encoding of the last document seen for a term, not yet in the slice.
///
/// The producer cannot know whether more occurrences of the same document
/// will follow, so the final `(delta, flag)` pair of each term stays here
/// until a later document closes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingDoc {
    /// `delta << 1` for frequency fields, the raw delta otherwise.
    pub code: u32,
    /// Occurrences counted so far in the pending document.
    pub term_freq: u32,
}

/// Accumulated postings of one term in one field.
#[derive(Clone, Debug)]
pub struct PostingEntry {
    pub(crate) term: TermRef,
    pub(crate) doc_freq: u32,
    pub(crate) last_doc_id: DocId,
    pub(crate) pending: Option<PendingDoc>,
    pub(crate) last_position: u32,
    pub(crate) freq: SliceCursor,
    pub(crate) prox: Option<SliceCursor>,
}

impl PostingEntry {
    /// Records the first occurrence of a term.
    pub(crate) fn new(
        arena: &mut BlockArena,
        term: &[u8],
        doc: DocId,
        position: u32,
        options: IndexOptions,
    ) -> Result<Self> {
        let term = arena.store_term(term)?;
        let freq = SliceCursor::new(arena)?;
        let prox = if options.has_positions() {
            Some(SliceCursor::new(arena)?)
        } else {
            None
        };

        let mut entry = Self {
            term,
            doc_freq: 1,
            last_doc_id: doc,
            pending: Some(PendingDoc {
                code: doc_code(doc, options),
                term_freq: 1,
            }),
            last_position: 0,
            freq,
            prox,
        };
        entry.write_position(arena, doc, position)?;
        Ok(entry)
    }

    /// Records a further occurrence of the term.
    pub(crate) fn add_occurrence(
        &mut self,
        arena: &mut BlockArena,
        doc: DocId,
        position: u32,
        options: IndexOptions,
    ) -> Result<()> {
        if doc < self.last_doc_id {
            return Err(PostingsError::DocOutOfOrder {
                doc,
                last: self.last_doc_id,
            });
        }

        if doc == self.last_doc_id {
            if !options.has_freqs() {
                return Ok(());
            }
            self.write_position(arena, doc, position)?;
            if let Some(pending) = self.pending.as_mut() {
                pending.term_freq = pending.term_freq.saturating_add(1);
            }
            return Ok(());
        }

        self.commit_pending(arena, options)?;
        self.pending = Some(PendingDoc {
            code: doc_code(doc - self.last_doc_id, options),
            term_freq: 1,
        });
        self.last_doc_id = doc;
        self.doc_freq += 1;
        self.last_position = 0;
        self.write_position(arena, doc, position)
    }

    /// Moves the pending document into the frequency slice.
    ///
    /// Frequency 1 folds into the low bit of the code; anything else is
    /// written as a second varint.
    pub(crate) fn commit_pending(
        &mut self,
        arena: &mut BlockArena,
        options: IndexOptions,
    ) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        let mut writer = ByteSliceWriter::new(arena, &mut self.freq);
        if !options.has_freqs() {
            writer.write_vint(pending.code)
        } else if pending.term_freq == 1 {
            writer.write_vint(pending.code | 1)
        } else {
            writer.write_vint(pending.code)?;
            writer.write_vint(pending.term_freq)
        }
    }

    /// Seals both slices; the entry takes no more appends afterwards.
    pub(crate) fn finish(&mut self, arena: &mut BlockArena) {
        ByteSliceWriter::new(arena, &mut self.freq).finish_slice();
        if let Some(prox) = self.prox.as_mut() {
            ByteSliceWriter::new(arena, prox).finish_slice();
        }
    }

    fn write_position(&mut self, arena: &mut BlockArena, doc: DocId, position: u32) -> Result<()> {
        let Some(prox) = self.prox.as_mut() else {
            return Ok(());
        };
        if position < self.last_position {
            return Err(PostingsError::PositionOutOfOrder {
                doc,
                position,
                last: self.last_position,
            });
        }
        ByteSliceWriter::new(arena, prox).write_vint(position - self.last_position)?;
        self.last_position = position;
        Ok(())
    }

    /// Where the term text lives.
    #[inline(always)]
    pub fn term(&self) -> TermRef {
        self.term
    }

    /// Number of distinct documents recorded.
    #[inline(always)]
    pub fn doc_freq(&self) -> u32 {
        self.doc_freq
    }

    /// Most recent document recorded.
    #[inline(always)]
    pub fn last_doc_id(&self) -> DocId {
        self.last_doc_id
    }

    /// The buffered final document, if not yet committed.
    #[inline(always)]
    pub fn pending(&self) -> Option<PendingDoc> {
        self.pending
    }

    /// Head of the frequency stream.
    #[inline(always)]
    pub fn freq_slice(&self) -> &SliceCursor {
        &self.freq
    }

    /// Head of the position stream, absent unless positions are recorded.
    #[inline(always)]
    pub fn prox_slice(&self) -> Option<&SliceCursor> {
        self.prox.as_ref()
    }
}

#[inline(always)]
const fn doc_code(delta: DocId, options: IndexOptions) -> u32 {
    if options.has_freqs() {
        delta << 1
    } else {
        delta
    }
}
