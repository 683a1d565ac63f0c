use quiver_core::{
    collect_field, merge_workers, BlockArena, ByteSliceReader, CollectedPostings, FieldMergeState,
    FieldPostings, MergePhase, WorkerPostings,
};
use quiver_types::{DocId, FieldInfo, IndexOptions, PostingsConfig, PostingsError};

fn single_field(options: IndexOptions) -> (WorkerPostings, usize) {
    let mut worker = WorkerPostings::new(PostingsConfig::default()).expect("valid config");
    let field = worker
        .add_field(FieldInfo::new("body", options))
        .expect("should register");
    (worker, field)
}

fn drain(worker: &WorkerPostings, field: usize) -> Vec<(Vec<u8>, DocId, u32)> {
    let mut state = worker.merge_state(field).expect("frozen");
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

#[test]
fn scenario_one_occurrence_per_term() {
    let (mut worker, body) = single_field(IndexOptions::DocsAndFreqs);
    worker.add(body, b"apple", 0, 0).expect("should add");
    worker.add(body, b"banana", 1, 0).expect("should add");
    worker.add(body, b"cherry", 2, 0).expect("should add");
    worker.freeze();

    assert_eq!(
        drain(&worker, body),
        vec![
            (b"apple".to_vec(), 0, 1),
            (b"banana".to_vec(), 1, 1),
            (b"cherry".to_vec(), 2, 1),
        ]
    );
}

#[test]
fn scenario_deferred_final_document() {
    let (mut worker, body) = single_field(IndexOptions::DocsAndFreqs);
    for _ in 0..3 {
        worker.add(body, b"x", 0, 0).expect("should add");
    }
    worker.add(body, b"x", 2, 0).expect("should add");
    worker.freeze();

    let mut state = worker.merge_state(body).expect("frozen");
    assert!(state.next_term().expect("should advance"));
    assert_eq!((state.doc_id(), state.term_freq()), (0, 3));
    assert!(state.next_doc().expect("should advance"));
    assert_eq!((state.doc_id(), state.term_freq()), (2, 1));
    assert!(!state.next_doc().expect("end of term"));
    assert_eq!(state.phase(), MergePhase::TermExhausted);
    assert!(!state.next_term().expect("no more terms"));
    assert_eq!(state.phase(), MergePhase::Done);
}

#[test]
fn frequency_one_uses_flag_bit() {
    let mut arena = BlockArena::new();
    let mut table = FieldPostings::new(
        FieldInfo::new("body", IndexOptions::DocsAndFreqs),
        &PostingsConfig::default(),
    );
    table.add(&mut arena, b"t", 7, 0).expect("should add");
    table.add(&mut arena, b"t", 9, 0).expect("should add");

    let mut reader = ByteSliceReader::new(&arena, table.entries()[0].freq_slice());
    assert_eq!(reader.read_vint(), Ok((7 << 1) | 1));
    assert!(reader.eof());

    let mut state = FieldMergeState::new(table.field(), &arena, table.entries());
    let out = collect_field(&mut state).expect("should collect");
    let docs: Vec<(DocId, u32)> = out.terms[0].docs.iter().map(|d| (d.doc, d.term_freq)).collect();
    assert_eq!(docs, vec![(7, 1), (9, 1)]);
}

#[test]
fn frequency_five_writes_explicit_varint() {
    let mut arena = BlockArena::new();
    let mut table = FieldPostings::new(
        FieldInfo::new("body", IndexOptions::DocsAndFreqs),
        &PostingsConfig::default(),
    );
    for _ in 0..5 {
        table.add(&mut arena, b"t", 7, 0).expect("should add");
    }
    table.add(&mut arena, b"t", 8, 0).expect("should add");

    let mut reader = ByteSliceReader::new(&arena, table.entries()[0].freq_slice());
    assert_eq!(reader.read_vint(), Ok(7 << 1));
    assert_eq!(reader.read_vint(), Ok(5));
    assert!(reader.eof());

    let mut state = FieldMergeState::new(table.field(), &arena, table.entries());
    assert!(state.next_term().expect("should advance"));
    assert_eq!((state.doc_id(), state.term_freq()), (7, 5));
    assert!(state.next_doc().expect("should advance"));
    assert_eq!((state.doc_id(), state.term_freq()), (8, 1));
}

#[test]
fn docs_only_field_reports_frequency_one() {
    let (mut worker, body) = single_field(IndexOptions::Docs);
    for doc in [1, 1, 1, 4, 10, 10] {
        worker.add(body, b"t", doc, 0).expect("should add");
    }
    worker.freeze();

    assert_eq!(
        drain(&worker, body),
        vec![(b"t".to_vec(), 1, 1), (b"t".to_vec(), 4, 1), (b"t".to_vec(), 10, 1)]
    );
}

#[test]
fn large_gaps_straddle_segment_boundaries() {
    let (mut worker, body) = single_field(IndexOptions::DocsAndFreqs);
    // Four-byte varints throughout; hundreds of them cross every level.
    let docs: Vec<DocId> = (0..400u32).map(|i| i * (1 << 21) + (i % 3)).collect();
    for &doc in &docs {
        worker.add(body, b"wide", doc, 0).expect("should add");
        if doc % 2 == 0 {
            worker.add(body, b"wide", doc, 1).expect("should add");
        }
    }
    worker.freeze();

    let got = drain(&worker, body);
    assert_eq!(got.len(), docs.len());
    for ((_, doc, freq), &want) in got.iter().zip(&docs) {
        assert_eq!(*doc, want);
        assert_eq!(*freq, if want % 2 == 0 { 2 } else { 1 });
    }
}

#[test]
fn positions_round_trip() {
    let (mut worker, body) = single_field(IndexOptions::DocsAndFreqsAndPositions);
    let docs = ["to be or not to be", "be quick", "not to worry to be"];
    for (doc, text) in docs.iter().enumerate() {
        for (pos, term) in text.split(' ').enumerate() {
            worker
                .add(body, term.as_bytes(), doc as DocId, pos as u32)
                .expect("should add");
        }
    }
    worker.freeze();

    let mut out = CollectedPostings::default();
    merge_workers(&[&worker], "body", &mut out).expect("should merge");

    let to = out.get(b"to").expect("present");
    let positions: Vec<(DocId, Vec<u32>)> =
        to.docs.iter().map(|d| (d.doc, d.positions.clone())).collect();
    assert_eq!(positions, vec![(0, vec![0, 4]), (2, vec![1, 3])]);

    let be = out.get(b"be").expect("present");
    assert_eq!(be.doc_freq, 3);
    assert_eq!(be.docs[2].positions, vec![4]);
    assert_eq!(be.docs[2].term_freq, 1);
}

#[test]
fn terms_come_out_in_unsigned_byte_order() {
    let (mut worker, body) = single_field(IndexOptions::Docs);
    let terms: [&[u8]; 6] = [b"b", &[0xFF], b"a", b"ab", &[0x00, 0x01], b"B"];
    for term in terms {
        worker.add(body, term, 0, 0).expect("should add");
    }
    worker.freeze();

    let got: Vec<Vec<u8>> = drain(&worker, body).into_iter().map(|(t, _, _)| t).collect();
    let mut want: Vec<Vec<u8>> = terms.iter().map(|t| t.to_vec()).collect();
    want.sort();
    assert_eq!(got, want);
    assert!(got.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn workers_interleave_disjoint_documents() {
    let (mut even, body_even) = single_field(IndexOptions::DocsAndFreqs);
    let (mut odd, body_odd) = single_field(IndexOptions::DocsAndFreqs);
    for doc in 0..20u32 {
        let (worker, field) = if doc % 2 == 0 {
            (&mut even, body_even)
        } else {
            (&mut odd, body_odd)
        };
        worker.add(field, b"all", doc, 0).expect("should add");
        if doc % 5 == 0 {
            worker.add(field, b"fives", doc, 1).expect("should add");
        }
    }
    even.freeze();
    odd.freeze();

    let mut out = CollectedPostings::default();
    let summary = merge_workers(&[&odd, &even], "body", &mut out).expect("should merge");

    assert_eq!(summary.terms, 2);
    assert_eq!(summary.postings, 24);
    assert_eq!(out.doc_ids(b"all"), (0..20).collect::<Vec<_>>());
    assert_eq!(out.doc_ids(b"fives"), vec![0, 5, 10, 15]);
}

#[test]
fn same_document_in_two_workers_is_corruption() {
    let (mut a, fa) = single_field(IndexOptions::DocsAndFreqs);
    let (mut b, fb) = single_field(IndexOptions::DocsAndFreqs);
    a.add(fa, b"t", 1, 0).expect("should add");
    a.add(fa, b"t", 3, 0).expect("should add");
    b.add(fb, b"t", 2, 0).expect("should add");
    b.add(fb, b"t", 3, 0).expect("should add");
    a.freeze();
    b.freeze();

    let mut out = CollectedPostings::default();
    let err = merge_workers(&[&a, &b], "body", &mut out).expect_err("doc 3 twice");
    assert_eq!(err, PostingsError::DuplicateDocument { doc: 3 });
    assert!(err.is_corruption());
}

#[test]
fn next_doc_before_next_term_is_rejected() {
    let (mut worker, body) = single_field(IndexOptions::DocsAndFreqs);
    worker.add(body, b"t", 0, 0).expect("should add");
    worker.freeze();

    let mut state = worker.merge_state(body).expect("frozen");
    assert!(matches!(
        state.next_doc(),
        Err(PostingsError::InvalidMergeState { .. })
    ));
    assert!(!state.next_doc().unwrap_or(false));
}

#[test]
fn reset_reuses_the_worker() {
    let (mut worker, body) = single_field(IndexOptions::DocsAndFreqsAndPositions);
    for round in 0..3u32 {
        for doc in 0..50 {
            worker
                .add(body, format!("term{}", doc % 7).as_bytes(), doc, round)
                .expect("should add");
        }
        worker.freeze();
        let mut out = CollectedPostings::default();
        let summary = merge_workers(&[&worker], "body", &mut out).expect("should merge");
        assert_eq!(summary.terms, 7);
        assert_eq!(summary.postings, 50);
        assert!(out
            .terms
            .iter()
            .flat_map(|t| &t.docs)
            .all(|d| d.positions == vec![round]));
        worker.reset();
    }
    assert_eq!(worker.stats().terms, 0);
}
