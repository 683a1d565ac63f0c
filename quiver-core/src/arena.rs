//! Block Arena for Term Text and Posting Slices
//!
//! Eliminates per-term allocations by carving everything a worker
//! accumulates out of fixed-size blocks. Nothing is freed individually;
//! the whole arena is reset after a segment flush.
//!
//! ## Memory Layout
//!
//! ```text
//! blocks[0]: [term "apple"][slice seg][term "banana"][slice seg]...[free]
//! blocks[1]: [slice seg (level 3)][term "cherry"]...              [free]
//!             ^
//!             ByteAddr { block: 1, offset: 0 }
//! ```
//!
//! Every cross reference is a [`ByteAddr`] (block index + offset), never a
//! pointer, so a reset cannot leave dangling references behind. When an
//! address has to live inside arena bytes (slice forward links) it is packed
//! into a `u32` with [`ByteAddr::pack`].
//!
//! ## Performance
//!
//! - Allocation: O(1) - bump the head of the current block
//! - Retrieval: O(1) - index the block, slice the bytes
//! - Reset: O(blocks) - recycled blocks are zeroed before reuse

use quiver_types::{PostingsError, Result};
use tracing::{debug, trace};

/// log2 of the block size.
pub const BLOCK_SHIFT: u32 = 15;

/// Size of every arena block (32 KiB).
pub const BLOCK_SIZE: usize = 1 << BLOCK_SHIFT;

const OFFSET_MASK: u32 = (BLOCK_SIZE as u32) - 1;

/// Number of blocks a packed address can name. The top packed value is left
/// free so that `u32::MAX` never decodes to a real address.
pub const MAX_BLOCKS: usize = (u32::MAX >> BLOCK_SHIFT) as usize;

/// Location of a byte inside a [`BlockArena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteAddr {
    block: u32,
    offset: u32,
}

impl ByteAddr {
    /// Creates an address. `offset` must not exceed [`BLOCK_SIZE`].
    #[inline(always)]
    pub const fn new(block: u32, offset: u32) -> Self {
        Self { block, offset }
    }

    /// Returns the block index.
    #[inline(always)]
    pub const fn block(self) -> usize {
        self.block as usize
    }

    /// Returns the byte offset within the block.
    #[inline(always)]
    pub const fn offset(self) -> usize {
        self.offset as usize
    }

    /// Address `n` bytes further along the same block.
    #[inline(always)]
    pub const fn add(self, n: usize) -> Self {
        Self {
            block: self.block,
            offset: self.offset + n as u32,
        }
    }

    /// Packs the address into a single `u32`.
    #[inline(always)]
    pub const fn pack(self) -> u32 {
        (self.block << BLOCK_SHIFT) | self.offset
    }

    /// Inverse of [`ByteAddr::pack`].
    #[inline(always)]
    pub const fn unpack(packed: u32) -> Self {
        Self {
            block: packed >> BLOCK_SHIFT,
            offset: packed & OFFSET_MASK,
        }
    }
}

/// Term text reference.
///
/// A term is written once, contiguously, so it never spans two blocks and
/// can be compared in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermRef {
    addr: ByteAddr,
    len: u16,
}

impl TermRef {
    /// Returns where the term text starts.
    #[inline(always)]
    pub const fn addr(self) -> ByteAddr {
        self.addr
    }

    /// Returns the term length in bytes.
    #[inline(always)]
    pub const fn len(self) -> usize {
        self.len as usize
    }

    /// Returns true for the empty term.
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Bump allocator handing out fixed-size byte blocks.
pub struct BlockArena {
    /// Live blocks, in allocation order
    blocks: Vec<Box<[u8]>>,
    /// Blocks kept from earlier resets
    recycled: Vec<Box<[u8]>>,
    /// Next free offset in the last block
    head: usize,
    /// How many blocks a reset may keep
    max_recycled: usize,
}

impl Default for BlockArena {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockArena {
    /// Creates an empty arena that recycles up to 8 blocks.
    pub fn new() -> Self {
        Self::with_recycling(8)
    }

    /// Creates an empty arena keeping at most `max_recycled` blocks on reset.
    pub fn with_recycling(max_recycled: usize) -> Self {
        Self {
            blocks: Vec::new(),
            recycled: Vec::new(),
            head: BLOCK_SIZE,
            max_recycled,
        }
    }

    /// Returns the number of live blocks.
    #[inline(always)]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if nothing has been allocated since the last reset.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes handed out so far, including the unused tails of full blocks.
    pub fn bytes_used(&self) -> usize {
        match self.blocks.len() {
            0 => 0,
            n => (n - 1) * BLOCK_SIZE + self.head,
        }
    }

    /// Bytes held by live blocks.
    pub fn bytes_allocated(&self) -> usize {
        self.blocks.len() * BLOCK_SIZE
    }

    /// Appends a fresh zeroed block and makes it current.
    ///
    /// # Errors
    ///
    /// Returns `PostingsError::ArenaExhausted` once [`MAX_BLOCKS`] blocks
    /// are live.
    pub fn allocate_block(&mut self) -> Result<u32> {
        if self.blocks.len() >= MAX_BLOCKS {
            return Err(PostingsError::ArenaExhausted {
                blocks: self.blocks.len(),
            });
        }

        let block = match self.recycled.pop() {
            Some(mut block) => {
                block.fill(0);
                block
            }
            None => vec![0u8; BLOCK_SIZE].into_boxed_slice(),
        };

        let index = self.blocks.len() as u32;
        self.blocks.push(block);
        self.head = 0;
        trace!(block = index, "allocated arena block");
        Ok(index)
    }

    /// Reserves `len` contiguous bytes in a single block.
    ///
    /// # Errors
    ///
    /// Returns `PostingsError::AllocationTooLarge` if `len` exceeds
    /// [`BLOCK_SIZE`], or `ArenaExhausted` if no block can be added.
    pub fn alloc(&mut self, len: usize) -> Result<ByteAddr> {
        if len > BLOCK_SIZE {
            return Err(PostingsError::AllocationTooLarge {
                len,
                block_size: BLOCK_SIZE,
            });
        }

        if self.blocks.is_empty() || self.head + len > BLOCK_SIZE {
            self.allocate_block()?;
        }

        let addr = ByteAddr::new((self.blocks.len() - 1) as u32, self.head as u32);
        self.head += len;
        Ok(addr)
    }

    /// Copies term text into the arena.
    ///
    /// # Errors
    ///
    /// Returns `PostingsError::TermTooLong` if the text does not fit a block.
    pub fn store_term(&mut self, text: &[u8]) -> Result<TermRef> {
        if text.len() > BLOCK_SIZE {
            return Err(PostingsError::TermTooLong {
                len: text.len(),
                max: BLOCK_SIZE,
            });
        }

        let addr = self.alloc(text.len())?;
        self.write(addr, text);
        Ok(TermRef {
            addr,
            len: text.len() as u16,
        })
    }

    /// Returns the text of a stored term.
    #[inline(always)]
    pub fn term(&self, term: TermRef) -> &[u8] {
        self.bytes(term.addr, term.len())
    }

    /// Returns `len` bytes starting at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside a live block.
    #[inline(always)]
    pub fn bytes(&self, addr: ByteAddr, len: usize) -> &[u8] {
        let start = addr.offset();
        &self.blocks[addr.block()][start..start + len]
    }

    /// Returns the byte at `addr`.
    #[inline(always)]
    pub fn byte(&self, addr: ByteAddr) -> u8 {
        self.blocks[addr.block()][addr.offset()]
    }

    /// Overwrites bytes starting at `addr`.
    #[inline(always)]
    pub fn write(&mut self, addr: ByteAddr, bytes: &[u8]) {
        let start = addr.offset();
        self.blocks[addr.block()][start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Reads a little-endian u32 at `addr`.
    #[inline]
    pub fn read_u32(&self, addr: ByteAddr) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.bytes(addr, 4));
        u32::from_le_bytes(buf)
    }

    /// Writes a little-endian u32 at `addr`.
    #[inline]
    pub fn write_u32(&mut self, addr: ByteAddr, value: u32) {
        self.write(addr, &value.to_le_bytes());
    }

    /// Returns true if `len` bytes at `addr` lie inside handed-out space.
    pub fn contains(&self, addr: ByteAddr, len: usize) -> bool {
        let end = addr.offset() + len;
        let blocks = self.blocks.len();
        if addr.block() + 1 < blocks {
            end <= BLOCK_SIZE
        } else if addr.block() + 1 == blocks {
            end <= self.head
        } else {
            false
        }
    }

    /// Drops all allocations, keeping up to `max_recycled` blocks for reuse.
    ///
    /// Every `ByteAddr` and `TermRef` handed out before is invalid afterwards.
    pub fn reset(&mut self) {
        let released = self.blocks.len();
        let keep = self.max_recycled.saturating_sub(self.recycled.len());
        self.recycled.extend(self.blocks.drain(..).take(keep));
        self.head = BLOCK_SIZE;
        debug!(released, recycled = self.recycled.len(), "arena reset");
    }
}
