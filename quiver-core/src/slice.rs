//! Growable byte streams chained through the block arena.
//!
//! A slice starts as a small segment and grows by linking progressively
//! larger segments, so terms seen once cost a few bytes while frequent terms
//! do not pay for thousands of tiny hops.
//!
//! ```text
//! segment (level n):  [ payload ............ ][ trailer: u32 LE ]
//!                                               |
//!                       forward link (packed ByteAddr) or END_OF_SLICE
//! ```
//!
//! The trailer of a freshly carved segment holds [`END_OF_SLICE`]; it is
//! replaced by a link only when the writer moves on to the next segment.
//! The extent of the data is tracked by [`SliceCursor::upto`], so readers
//! never mistake zeroed payload for encoded values.

use quiver_types::varint::{encode_varint, VarintDecoder, MAX_VARINT_LEN};
use quiver_types::{PostingsError, Result};

use crate::arena::{BlockArena, ByteAddr, BLOCK_SIZE};

/// Bytes reserved at the end of every segment for the trailer.
pub const LINK_BYTES: usize = 4;

/// Trailer value terminating a slice. No packed address equals it.
pub const END_OF_SLICE: u32 = u32::MAX;

/// Segment sizes per level, trailer included.
pub const SLICE_LEVEL_SIZES: [usize; 10] = [8, 16, 24, 32, 48, 64, 96, 128, 192, 256];

const TOP_LEVEL: usize = SLICE_LEVEL_SIZES.len() - 1;

const _: () = assert!(SLICE_LEVEL_SIZES[TOP_LEVEL] <= BLOCK_SIZE);

#[inline(always)]
const fn next_level(level: usize) -> usize {
    if level < TOP_LEVEL {
        level + 1
    } else {
        TOP_LEVEL
    }
}

/// Write position of one slice. Stored in the posting entry that owns the
/// slice; writers and readers are created from it on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceCursor {
    start: ByteAddr,
    upto: ByteAddr,
    limit: ByteAddr,
    level: u8,
}

impl SliceCursor {
    /// Carves the first (level 0) segment of a new slice.
    ///
    /// # Errors
    ///
    /// Propagates arena allocation failures.
    pub fn new(arena: &mut BlockArena) -> Result<Self> {
        let (start, limit) = carve_segment(arena, 0)?;
        Ok(Self {
            start,
            upto: start,
            limit,
            level: 0,
        })
    }

    /// First byte of the slice.
    #[inline(always)]
    pub const fn start(&self) -> ByteAddr {
        self.start
    }

    /// Next byte the writer will fill.
    #[inline(always)]
    pub const fn upto(&self) -> ByteAddr {
        self.upto
    }

    /// Level of the segment currently being written.
    #[inline(always)]
    pub const fn level(&self) -> usize {
        self.level as usize
    }

    /// Returns true if nothing was written yet.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.start == self.upto
    }
}

fn carve_segment(arena: &mut BlockArena, level: usize) -> Result<(ByteAddr, ByteAddr)> {
    let size = SLICE_LEVEL_SIZES[level];
    let addr = arena.alloc(size)?;
    let limit = addr.add(size - LINK_BYTES);
    arena.write_u32(limit, END_OF_SLICE);
    Ok((addr, limit))
}

/// Appends bytes to a slice.
pub struct ByteSliceWriter<'a> {
    arena: &'a mut BlockArena,
    cursor: &'a mut SliceCursor,
}

impl<'a> ByteSliceWriter<'a> {
    /// Resumes writing at the cursor's position.
    pub fn new(arena: &'a mut BlockArena, cursor: &'a mut SliceCursor) -> Self {
        Self { arena, cursor }
    }

    /// Appends one byte, chaining a new segment if the current one is full.
    ///
    /// # Errors
    ///
    /// Propagates arena allocation failures.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    /// Appends raw bytes, splitting them across segments as needed.
    ///
    /// # Errors
    ///
    /// Propagates arena allocation failures.
    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            if self.cursor.upto == self.cursor.limit {
                self.grow()?;
            }
            let room = self.cursor.limit.offset() - self.cursor.upto.offset();
            let n = room.min(bytes.len());
            self.arena.write(self.cursor.upto, &bytes[..n]);
            self.cursor.upto = self.cursor.upto.add(n);
            bytes = &bytes[n..];
        }
        Ok(())
    }

    /// Appends `value` as a varint.
    ///
    /// # Errors
    ///
    /// Propagates arena allocation failures.
    #[inline]
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_varint(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Seals the slice: the current trailer is (re)written as
    /// [`END_OF_SLICE`]. Only call this once no further appends will occur.
    pub fn finish_slice(self) -> SliceCursor {
        self.arena.write_u32(self.cursor.limit, END_OF_SLICE);
        *self.cursor
    }

    fn grow(&mut self) -> Result<()> {
        let level = next_level(self.cursor.level());
        let (addr, limit) = carve_segment(self.arena, level)?;
        self.arena.write_u32(self.cursor.limit, addr.pack());
        self.cursor.upto = addr;
        self.cursor.limit = limit;
        self.cursor.level = level as u8;
        Ok(())
    }
}

/// Replays a slice written by [`ByteSliceWriter`].
#[derive(Clone)]
pub struct ByteSliceReader<'a> {
    arena: &'a BlockArena,
    pos: ByteAddr,
    limit: ByteAddr,
    end: ByteAddr,
    level: usize,
}

impl<'a> ByteSliceReader<'a> {
    /// Positions a reader at the start of the slice described by `cursor`.
    pub fn new(arena: &'a BlockArena, cursor: &SliceCursor) -> Self {
        Self {
            arena,
            pos: cursor.start,
            limit: cursor.start.add(SLICE_LEVEL_SIZES[0] - LINK_BYTES),
            end: cursor.upto,
            level: 0,
        }
    }

    /// Returns true once every written byte has been consumed.
    ///
    /// A segment boundary alone is not the end: the reader follows the
    /// link on the next read.
    #[inline(always)]
    pub fn eof(&self) -> bool {
        self.pos == self.end
    }

    /// Reads the next byte.
    ///
    /// # Errors
    ///
    /// `SliceOverrun` past the written data; `CorruptSlice` if a trailer
    /// ends the chain early or links outside the arena.
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.pos == self.end {
            return Err(PostingsError::SliceOverrun);
        }
        if self.pos == self.limit {
            self.follow_link()?;
        }
        let byte = self.arena.byte(self.pos);
        self.pos = self.pos.add(1);
        Ok(byte)
    }

    /// Reads the next varint, following links mid-value if needed.
    ///
    /// # Errors
    ///
    /// As [`ByteSliceReader::read_byte`], plus `MalformedVarint` for a
    /// continuation bit that never clears.
    pub fn read_vint(&mut self) -> Result<u32> {
        let mut decoder = VarintDecoder::new();
        loop {
            if let Some(value) = decoder.push(self.read_byte()?)? {
                return Ok(value);
            }
        }
    }

    fn follow_link(&mut self) -> Result<()> {
        let link = self.arena.read_u32(self.limit);
        if link == END_OF_SLICE {
            return Err(PostingsError::CorruptSlice {
                reason: "end-of-slice marker before the recorded end",
            });
        }

        let level = next_level(self.level);
        let size = SLICE_LEVEL_SIZES[level];
        let next = ByteAddr::unpack(link);
        if !self.arena.contains(next, size) {
            return Err(PostingsError::CorruptSlice {
                reason: "forward link points outside the arena",
            });
        }

        self.pos = next;
        self.limit = next.add(size - LINK_BYTES);
        self.level = level;
        Ok(())
    }
}
