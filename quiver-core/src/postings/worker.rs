//! Per-worker accumulator: one arena, one term table per field.

use quiver_types::{DocId, FieldInfo, PostingsConfig, PostingsError, Result};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::arena::{BlockArena, BLOCK_SIZE};
use crate::merge::FieldMergeState;
use crate::postings::table::FieldPostings;
use crate::stats::AccumulatorStats;

/// Everything one indexing worker accumulates between two flushes.
///
/// The worker owns its arena exclusively. After [`WorkerPostings::freeze`]
/// no more occurrences are accepted and merge states may borrow the arena
/// read-only; [`WorkerPostings::reset`] releases everything in bulk.
pub struct WorkerPostings {
    arena: BlockArena,
    fields: Vec<FieldPostings>,
    by_name: FxHashMap<String, usize>,
    config: PostingsConfig,
    frozen: bool,
}

impl WorkerPostings {
    /// Creates an empty accumulator.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the config does not fit the arena.
    pub fn new(config: PostingsConfig) -> Result<Self> {
        config.validate(BLOCK_SIZE)?;
        Ok(Self {
            arena: BlockArena::with_recycling(config.recycled_blocks),
            fields: Vec::new(),
            by_name: FxHashMap::default(),
            config,
            frozen: false,
        })
    }

    /// Registers a field and returns its index. Registering the same name
    /// twice returns the existing index.
    ///
    /// # Errors
    ///
    /// Returns `IndexOptionsMismatch` if the name is already registered with
    /// different options.
    pub fn add_field(&mut self, field: FieldInfo) -> Result<usize> {
        if let Some(&idx) = self.by_name.get(&field.name) {
            let existing = self.fields[idx].field();
            if existing.options != field.options {
                return Err(PostingsError::IndexOptionsMismatch {
                    field: field.name,
                    expected: existing.options,
                    actual: field.options,
                });
            }
            return Ok(idx);
        }

        let idx = self.fields.len();
        self.by_name.insert(field.name.clone(), idx);
        self.fields.push(FieldPostings::new(field, &self.config));
        Ok(idx)
    }

    /// Looks up a field index by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Records one occurrence of `term` in field `field`.
    ///
    /// # Errors
    ///
    /// `AccumulatorState` once frozen, `UnknownField` for an unregistered
    /// index, otherwise whatever [`FieldPostings::add`] reports.
    pub fn add(&mut self, field: usize, term: &[u8], doc: DocId, position: u32) -> Result<()> {
        if self.frozen {
            return Err(PostingsError::AccumulatorState { state: "frozen" });
        }
        let table = self
            .fields
            .get_mut(field)
            .ok_or_else(|| PostingsError::UnknownField {
                name: field.to_string(),
            })?;
        table.add(&mut self.arena, term, doc, position)
    }

    /// Seals every slice and stops accepting occurrences.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        for table in &mut self.fields {
            table.finish(&mut self.arena);
        }
        self.frozen = true;
        debug!(
            fields = self.fields.len(),
            bytes = self.arena.bytes_used(),
            "worker postings frozen"
        );
    }

    /// Returns true after [`WorkerPostings::freeze`].
    #[inline(always)]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Opens a sorted merge over one field.
    ///
    /// # Errors
    ///
    /// `AccumulatorState` unless frozen, `UnknownField` for a bad index.
    pub fn merge_state(&self, field: usize) -> Result<FieldMergeState<'_>> {
        if !self.frozen {
            return Err(PostingsError::AccumulatorState {
                state: "not frozen",
            });
        }
        let table = self
            .fields
            .get(field)
            .ok_or_else(|| PostingsError::UnknownField {
                name: field.to_string(),
            })?;
        Ok(FieldMergeState::new(table.field(), &self.arena, table.entries()))
    }

    /// Opens a merge state for `name`, if this worker saw the field.
    ///
    /// # Errors
    ///
    /// As [`WorkerPostings::merge_state`].
    pub fn merge_state_by_name(&self, name: &str) -> Result<Option<FieldMergeState<'_>>> {
        match self.field_index(name) {
            Some(idx) => self.merge_state(idx).map(Some),
            None => Ok(None),
        }
    }

    /// Registered fields, in registration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter().map(FieldPostings::field)
    }

    /// The worker's arena.
    #[inline(always)]
    pub fn arena(&self) -> &BlockArena {
        &self.arena
    }

    /// Returns a snapshot of accumulation statistics.
    pub fn stats(&self) -> AccumulatorStats {
        AccumulatorStats {
            fields: self.fields.len(),
            terms: self.fields.iter().map(FieldPostings::len).sum(),
            postings: self
                .fields
                .iter()
                .flat_map(|f| f.entries())
                .map(|e| u64::from(e.doc_freq()))
                .sum(),
            blocks: self.arena.num_blocks(),
            bytes_used: self.arena.bytes_used(),
            bytes_allocated: self.arena.bytes_allocated(),
        }
    }

    /// Releases all postings after a flush completed or was abandoned.
    /// Registered fields are kept.
    pub fn reset(&mut self) {
        let stats = self.stats();
        for table in &mut self.fields {
            table.clear();
        }
        self.arena.reset();
        self.frozen = false;
        debug!(terms = stats.terms, blocks = stats.blocks, "worker postings reset");
    }
}
