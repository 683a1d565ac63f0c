//! Postings Accumulation Benchmark
//!
//! Measures how fast raw text turns into accumulated postings and how fast
//! those postings merge back out in term order.
//!
//! The input is treated as one document per line with terms separated by
//! ASCII whitespace. Lines are split into contiguous ranges, one per worker,
//! so every worker indexes a disjoint set of doc ids exactly as concurrent
//! indexing threads would.
//!
//! ## Usage
//!
//! ```bash
//! # 4 workers, positions recorded
//! ./target/release/postings_bench /path/to/corpus.txt 4
//!
//! # 1 worker, docs and freqs only
//! ./target/release/postings_bench /path/to/corpus.txt 1 freqs
//!
//! # Per-worker logs
//! RUST_LOG=quiver_core=debug ./target/release/postings_bench corpus.txt 8
//! ```
//!
//! ## Output
//!
//! ```text
//! --------------------------------
//! Mode        : Accumulate
//! Elapsed     : 0.812 s
//! Throughput  : 0.274 GiB/s
//! Postings    : 48_118_702
//! Postings/sec: 59_259_485
//! --------------------------------
//! ```

use std::env;
use std::error::Error;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use memchr::memchr_iter;
use quiver_core::{merge_workers, PostingsConsumer, WorkerPostings};
use quiver_types::{DocId, FieldInfo, IndexOptions, PostingsConfig, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

const FIELD: &str = "body";

fn main() -> std::result::Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: postings_bench <path> [workers] [docs|freqs|positions]");
        std::process::exit(1);
    }

    let path = &args[1];
    let workers: usize = match args.get(2) {
        Some(n) => n.parse()?,
        None => thread::available_parallelism().map_or(1, |n| n.get()),
    };
    let options = match args.get(3).map(String::as_str) {
        Some("docs") => IndexOptions::Docs,
        Some("freqs") => IndexOptions::DocsAndFreqs,
        _ => IndexOptions::DocsAndFreqsAndPositions,
    };

    println!("Loading file...");
    let bytes = fs::read(path)?;
    let lines = split_lines(&bytes);

    println!("File size: {}", fmt_bytes(bytes.len() as u64));
    println!("Documents: {}", fmt_count(lines.len() as u64));
    println!("Workers:   {}", workers.max(1));
    println!("Options:   {}\n", options);

    let start = Instant::now();
    let built = accumulate(&bytes, &lines, workers.max(1), options)?;
    let elapsed = start.elapsed();
    let postings: u64 = built.iter().map(|w| w.stats().postings).sum();
    print_perf("Accumulate", bytes.len(), elapsed, postings);

    for (i, worker) in built.iter().enumerate() {
        info!(worker = i, stats = %worker.stats(), "worker accumulated");
    }

    let refs: Vec<&WorkerPostings> = built.iter().collect();
    let mut sink = CountingConsumer::default();
    let start = Instant::now();
    let summary = merge_workers(&refs, FIELD, &mut sink)?;
    let elapsed = start.elapsed();
    std::hint::black_box(sink.checksum);

    info!(terms = summary.terms, postings = summary.postings, "merge finished");
    print_perf("Merge", bytes.len(), elapsed, summary.postings);

    Ok(())
}

/// Document boundaries as `(start, end)` byte ranges.
fn split_lines(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut lines = Vec::new();
    let mut start = 0;
    for nl in memchr_iter(b'\n', bytes) {
        lines.push((start, nl));
        start = nl + 1;
    }
    if start < bytes.len() {
        lines.push((start, bytes.len()));
    }
    lines
}

fn accumulate(
    text: &[u8],
    lines: &[(usize, usize)],
    workers: usize,
    options: IndexOptions,
) -> Result<Vec<WorkerPostings>> {
    let chunk = lines.len().div_ceil(workers).max(1);

    thread::scope(|scope| {
        let handles: Vec<_> = lines
            .chunks(chunk)
            .enumerate()
            .map(|(i, docs)| {
                let first_doc = (i * chunk) as DocId;
                scope.spawn(move || index_chunk(text, docs, first_doc, options))
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

fn index_chunk(
    text: &[u8],
    docs: &[(usize, usize)],
    first_doc: DocId,
    options: IndexOptions,
) -> Result<WorkerPostings> {
    let config = PostingsConfig::default();
    let max_term_length = config.max_term_length;
    let mut worker = WorkerPostings::new(config)?;
    let field = worker.add_field(FieldInfo::new(FIELD, options))?;

    for (offset, &(start, end)) in docs.iter().enumerate() {
        let doc = first_doc + offset as DocId;
        let terms = text[start..end]
            .split(u8::is_ascii_whitespace)
            .filter(|t| !t.is_empty());
        for (position, term) in terms.enumerate() {
            // Oversized tokens are noise in raw dumps.
            if term.len() > max_term_length {
                continue;
            }
            worker.add(field, term, doc, position as u32)?;
        }
    }

    worker.freeze();
    Ok(worker)
}

/// Folds every merged posting into a checksum so nothing is optimized out.
#[derive(Default)]
struct CountingConsumer {
    checksum: u64,
}

impl PostingsConsumer for CountingConsumer {
    fn start_term(&mut self, term: &[u8]) -> Result<()> {
        self.checksum = self.checksum.wrapping_add(term.len() as u64);
        Ok(())
    }

    fn add_doc(&mut self, doc: DocId, term_freq: u32, positions: &[u32]) -> Result<()> {
        self.checksum = self
            .checksum
            .wrapping_mul(31)
            .wrapping_add(u64::from(doc) ^ u64::from(term_freq))
            .wrapping_add(positions.len() as u64);
        Ok(())
    }

    fn finish_term(&mut self, _term: &[u8], doc_freq: u32) -> Result<()> {
        self.checksum = self.checksum.wrapping_add(u64::from(doc_freq));
        Ok(())
    }
}

fn print_perf(label: &str, input_bytes: usize, elapsed: Duration, postings: u64) {
    let secs = elapsed.as_secs_f64();
    let gib = input_bytes as f64 / (1024.0 * 1024.0 * 1024.0);

    println!("--------------------------------");
    println!("Mode        : {}", label);
    println!("Elapsed     : {:.3} s", secs);
    println!("Throughput  : {:.3} GiB/s", gib / secs);
    println!("Postings    : {}", fmt_count(postings));
    println!("Postings/sec: {}", fmt_count((postings as f64 / secs) as u64));
    println!("--------------------------------\n");
}

fn fmt_bytes(b: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];

    let mut value = b as f64;
    let mut unit = None;
    for name in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = Some(name);
    }

    match unit {
        Some(name) => format!("{value:.2} {name}"),
        None => format!("{b} B"),
    }
}

fn fmt_count(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);

    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            out.push('_');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}
