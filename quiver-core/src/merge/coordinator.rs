//! N-way merge of one field across workers.
//!
//! Every worker yields its terms in byte order and, within a term, its
//! documents in ascending order. Workers index disjoint documents, so the
//! merged stream interleaves them by doc id; a document seen by two workers
//! is reported as corruption.

use quiver_types::{DocId, PostingsError, Result};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::merge::state::FieldMergeState;
use crate::postings::WorkerPostings;

/// Receives merged postings in order.
///
/// Calls arrive as `start_term`, one or more `add_doc`, then `finish_term`,
/// with terms ascending and documents ascending within each term.
pub trait PostingsConsumer {
    /// A new term begins.
    fn start_term(&mut self, term: &[u8]) -> Result<()>;

    /// One document of the current term. `positions` is empty unless the
    /// field records positions.
    fn add_doc(&mut self, doc: DocId, term_freq: u32, positions: &[u32]) -> Result<()>;

    /// The current term is complete.
    fn finish_term(&mut self, term: &[u8], doc_freq: u32) -> Result<()>;
}

/// Totals of one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Distinct terms written.
    pub terms: usize,
    /// `(term, doc)` pairs written.
    pub postings: u64,
}

/// Merges `states`, all over the same field, into `consumer`.
///
/// # Errors
///
/// `IndexOptionsMismatch` if the states disagree on the field options,
/// `DuplicateDocument` if two states hold the same document for a term,
/// and anything a state or the consumer reports.
pub fn merge_field<C: PostingsConsumer>(
    states: &mut [FieldMergeState<'_>],
    consumer: &mut C,
) -> Result<MergeSummary> {
    let mut summary = MergeSummary::default();
    let Some(first) = states.first() else {
        return Ok(summary);
    };

    let field = first.field();
    if let Some(other) = states.iter().find(|s| s.field().options != field.options) {
        return Err(PostingsError::IndexOptionsMismatch {
            field: field.name.clone(),
            expected: field.options,
            actual: other.field().options,
        });
    }

    let mut live: SmallVec<[bool; 8]> = SmallVec::with_capacity(states.len());
    for state in states.iter_mut() {
        live.push(state.next_term()?);
    }

    // Indices of the states positioned on the current term, and which of
    // them still have a document to hand out.
    let mut matching: SmallVec<[usize; 8]> = SmallVec::new();
    let mut has_doc: SmallVec<[bool; 8]> = SmallVec::new();

    loop {
        let mut term: Option<&[u8]> = None;
        matching.clear();
        for (i, state) in states.iter().enumerate() {
            if !live[i] {
                continue;
            }
            let candidate = state.term();
            match term.map(|t| candidate.cmp(t)) {
                None | Some(std::cmp::Ordering::Less) => {
                    term = Some(candidate);
                    matching.clear();
                    matching.push(i);
                }
                Some(std::cmp::Ordering::Equal) => matching.push(i),
                Some(std::cmp::Ordering::Greater) => {}
            }
        }
        let Some(term) = term else {
            break;
        };

        consumer.start_term(term)?;
        has_doc.clear();
        has_doc.resize(matching.len(), true);

        let mut doc_freq = 0u32;
        loop {
            let mut best: Option<(usize, DocId)> = None;
            for (slot, &i) in matching.iter().enumerate() {
                if !has_doc[slot] {
                    continue;
                }
                let doc = states[i].doc_id();
                match best {
                    Some((_, best_doc)) if doc == best_doc => {
                        warn!(
                            field = %field.name,
                            doc,
                            "document indexed by more than one worker"
                        );
                        return Err(PostingsError::DuplicateDocument { doc });
                    }
                    Some((_, best_doc)) if doc > best_doc => {}
                    _ => best = Some((slot, doc)),
                }
            }
            let Some((slot, doc)) = best else {
                break;
            };

            let state = &mut states[matching[slot]];
            consumer.add_doc(doc, state.term_freq(), state.positions())?;
            doc_freq += 1;
            has_doc[slot] = state.next_doc()?;
        }

        consumer.finish_term(term, doc_freq)?;
        summary.terms += 1;
        summary.postings += u64::from(doc_freq);

        for &i in &matching {
            live[i] = states[i].next_term()?;
        }
    }

    debug!(
        field = %field.name,
        workers = states.len(),
        terms = summary.terms,
        postings = summary.postings,
        "field merged"
    );
    Ok(summary)
}

/// Merges field `name` across every worker that saw it.
///
/// # Errors
///
/// Every worker must be frozen; otherwise as [`merge_field`].
pub fn merge_workers<C: PostingsConsumer>(
    workers: &[&WorkerPostings],
    name: &str,
    consumer: &mut C,
) -> Result<MergeSummary> {
    let mut states = Vec::with_capacity(workers.len());
    for worker in workers {
        if let Some(state) = worker.merge_state_by_name(name)? {
            states.push(state);
        }
    }
    merge_field(&mut states, consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::collect::CollectedPostings;
    use quiver_types::{FieldInfo, IndexOptions, PostingsConfig};

    fn worker(options: IndexOptions, docs: &[(DocId, &str)]) -> WorkerPostings {
        let mut worker = WorkerPostings::new(PostingsConfig::default()).expect("valid config");
        let field = worker
            .add_field(FieldInfo::new("body", options))
            .expect("should register");
        for &(doc, text) in docs {
            for (pos, term) in text.split_whitespace().enumerate() {
                worker
                    .add(field, term.as_bytes(), doc, pos as u32)
                    .expect("should add");
            }
        }
        worker.freeze();
        worker
    }

    #[test]
    fn interleaves_workers_by_doc() {
        let a = worker(IndexOptions::DocsAndFreqs, &[(0, "rust fast"), (2, "rust")]);
        let b = worker(IndexOptions::DocsAndFreqs, &[(1, "rust rust"), (3, "zig")]);

        let mut out = CollectedPostings::default();
        let summary = merge_workers(&[&a, &b], "body", &mut out).expect("should merge");

        assert_eq!(summary, MergeSummary { terms: 3, postings: 5 });
        let terms: Vec<&[u8]> = out.terms.iter().map(|t| t.term.as_slice()).collect();
        assert_eq!(terms, vec![&b"fast"[..], &b"rust"[..], &b"zig"[..]]);

        let rust = &out.terms[1];
        assert_eq!(rust.doc_freq, 3);
        let docs: Vec<(DocId, u32)> = rust.docs.iter().map(|d| (d.doc, d.term_freq)).collect();
        assert_eq!(docs, vec![(0, 1), (1, 2), (2, 1)]);
    }

    #[test]
    fn duplicate_document_is_rejected() {
        let a = worker(IndexOptions::Docs, &[(5, "x")]);
        let b = worker(IndexOptions::Docs, &[(5, "x")]);

        let mut out = CollectedPostings::default();
        assert_eq!(
            merge_workers(&[&a, &b], "body", &mut out),
            Err(PostingsError::DuplicateDocument { doc: 5 })
        );
    }

    #[test]
    fn options_must_agree() {
        let a = worker(IndexOptions::Docs, &[(0, "x")]);
        let b = worker(IndexOptions::DocsAndFreqs, &[(1, "x")]);

        let mut out = CollectedPostings::default();
        assert!(matches!(
            merge_workers(&[&a, &b], "body", &mut out),
            Err(PostingsError::IndexOptionsMismatch { .. })
        ));
        assert!(out.terms.is_empty());
    }

    #[test]
    fn missing_field_and_no_workers() {
        let a = worker(IndexOptions::Docs, &[(0, "x")]);
        let mut out = CollectedPostings::default();

        let summary = merge_workers(&[&a], "title", &mut out).expect("nothing to merge");
        assert_eq!(summary, MergeSummary::default());
        let mut none: Vec<FieldMergeState<'_>> = Vec::new();
        let summary = merge_field(&mut none, &mut out).expect("nothing to merge");
        assert_eq!(summary.terms, 0);
    }

    #[test]
    fn unfrozen_worker_is_refused() {
        let mut a = WorkerPostings::new(PostingsConfig::default()).expect("valid config");
        a.add_field(FieldInfo::new("body", IndexOptions::Docs))
            .expect("should register");

        let mut out = CollectedPostings::default();
        assert!(matches!(
            merge_workers(&[&a], "body", &mut out),
            Err(PostingsError::AccumulatorState { .. })
        ));
    }
}
