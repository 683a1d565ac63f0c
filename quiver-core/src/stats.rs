//! Accumulator statistics.

/// A snapshot of what one worker holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulatorStats {
    /// Registered fields.
    pub fields: usize,
    /// Distinct terms across all fields.
    pub terms: usize,
    /// `(term, doc)` pairs across all fields.
    pub postings: u64,
    /// Arena blocks in use.
    pub blocks: usize,
    /// Bytes handed out by the arena.
    pub bytes_used: usize,
    /// Bytes held by live arena blocks.
    pub bytes_allocated: usize,
}

impl AccumulatorStats {
    /// Average arena bytes per posting, or 0 with no postings.
    pub fn bytes_per_posting(&self) -> f64 {
        if self.postings == 0 {
            return 0.0;
        }
        self.bytes_used as f64 / self.postings as f64
    }

    /// Fraction of allocated arena bytes actually used.
    pub fn fill_ratio(&self) -> f32 {
        if self.bytes_allocated == 0 {
            return 1.0;
        }
        self.bytes_used as f32 / self.bytes_allocated as f32
    }
}

impl core::fmt::Display for AccumulatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} fields, {} terms, {} postings, {} blocks",
            self.fields, self.terms, self.postings, self.blocks
        )?;

        if self.bytes_allocated > 0 {
            write!(
                f,
                ", arena: {} of {} bytes ({:.1}%)",
                self.bytes_used,
                self.bytes_allocated,
                self.fill_ratio() * 100.0
            )?;
        }

        Ok(())
    }
}
