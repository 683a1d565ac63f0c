//! Term ordering for the merge.

use crate::arena::BlockArena;
use crate::postings::entry::PostingEntry;

/// Orders `entries` by the unsigned bytes of their term text.
///
/// Returns entry indices; neither the entries nor the arena bytes are
/// touched. Terms are unique per field and batch, so no tie break exists.
pub fn sort_postings(arena: &BlockArena, entries: &[PostingEntry]) -> Vec<u32> {
    let mut order: Vec<u32> = (0..entries.len() as u32).collect();
    order.sort_unstable_by(|&a, &b| {
        let ta = arena.term(entries[a as usize].term);
        let tb = arena.term(entries[b as usize].term);
        ta.cmp(tb)
    });
    order
}
