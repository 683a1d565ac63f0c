//! In-memory consumer: materializes merged postings for inspection.

use quiver_types::{DocId, PostingsError, Result};

use crate::merge::coordinator::{merge_field, PostingsConsumer};
use crate::merge::state::FieldMergeState;

/// One document of a collected term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedDoc {
    pub doc: DocId,
    pub term_freq: u32,
    pub positions: Vec<u32>,
}

/// One collected term with its documents in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedTerm {
    pub term: Vec<u8>,
    pub doc_freq: u32,
    pub docs: Vec<CollectedDoc>,
}

/// Collects every merged term in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectedPostings {
    pub terms: Vec<CollectedTerm>,
    open: Option<CollectedTerm>,
}

impl CollectedPostings {
    /// Returns the collected term `term`, if present.
    pub fn get(&self, term: &[u8]) -> Option<&CollectedTerm> {
        self.terms
            .binary_search_by(|t| t.term.as_slice().cmp(term))
            .ok()
            .map(|i| &self.terms[i])
    }

    /// Doc ids of `term`, empty if absent.
    pub fn doc_ids(&self, term: &[u8]) -> Vec<DocId> {
        self.get(term)
            .map(|t| t.docs.iter().map(|d| d.doc).collect())
            .unwrap_or_default()
    }
}

impl PostingsConsumer for CollectedPostings {
    fn start_term(&mut self, term: &[u8]) -> Result<()> {
        if self.open.is_some() {
            return Err(PostingsError::InvalidMergeState {
                reason: "term started before the previous one finished",
            });
        }
        self.open = Some(CollectedTerm {
            term: term.to_vec(),
            doc_freq: 0,
            docs: Vec::new(),
        });
        Ok(())
    }

    fn add_doc(&mut self, doc: DocId, term_freq: u32, positions: &[u32]) -> Result<()> {
        let open = self.open.as_mut().ok_or(PostingsError::InvalidMergeState {
            reason: "document outside a term",
        })?;
        open.docs.push(CollectedDoc {
            doc,
            term_freq,
            positions: positions.to_vec(),
        });
        Ok(())
    }

    fn finish_term(&mut self, term: &[u8], doc_freq: u32) -> Result<()> {
        let mut open = self.open.take().ok_or(PostingsError::InvalidMergeState {
            reason: "term finished without being started",
        })?;
        if open.term != term || open.docs.len() != doc_freq as usize {
            return Err(PostingsError::InvalidMergeState {
                reason: "finished term does not match the open one",
            });
        }
        open.doc_freq = doc_freq;
        self.terms.push(open);
        Ok(())
    }
}

/// Drains one merge state into a fresh collection.
///
/// # Errors
///
/// Whatever the state reports while decoding.
pub fn collect_field(state: &mut FieldMergeState<'_>) -> Result<CollectedPostings> {
    let mut out = CollectedPostings::default();
    merge_field(std::slice::from_mut(state), &mut out)?;
    Ok(out)
}
