//! Flattened work indexing for the merge pass
//!
//! The pass is a map over `num_tokens * num_heads * packs_per_head` units.
//! A unit is addressed by one linear index; the decomposition below is the
//! only place that knows the nesting order, so the same numbering works for
//! rayon tasks, SIMD lanes or a GPU grid.
//!
//! Order (outermost first): token, head, pack. Consecutive linear indices
//! therefore walk contiguous memory in the `[tokens, heads, head_size]`
//! vector buffers.

/// One unit of work: a single pack of one (token, head) vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub token: usize,
    pub head: usize,
    pub pack: usize,
}

/// Shape of one merge pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkLayout {
    pub num_tokens: usize,
    pub num_heads: usize,
    pub head_size: usize,
    pub pack_width: usize,
    pub packs_per_head: usize,
}

impl WorkLayout {
    /// `head_size` must already be a multiple of `pack_width`.
    pub fn new(num_tokens: usize, num_heads: usize, head_size: usize, pack_width: usize) -> Self {
        debug_assert!(pack_width > 0);
        debug_assert_eq!(head_size % pack_width, 0);
        Self {
            num_tokens,
            num_heads,
            head_size,
            pack_width,
            packs_per_head: head_size / pack_width,
        }
    }

    /// Total units in the pass.
    pub fn num_units(&self) -> usize {
        self.num_tokens * self.num_heads * self.packs_per_head
    }

    /// Elements in each `[tokens, heads, head_size]` vector buffer.
    pub fn vector_len(&self) -> usize {
        self.num_tokens * self.num_heads * self.head_size
    }

    /// Elements in each `[heads, tokens]` LSE buffer.
    pub fn lse_len(&self) -> usize {
        self.num_heads * self.num_tokens
    }

    #[inline]
    pub fn decompose(&self, linear: usize) -> WorkItem {
        debug_assert!(linear < self.num_units());
        let pack = linear % self.packs_per_head;
        let token_head = linear / self.packs_per_head;
        WorkItem {
            token: token_head / self.num_heads,
            head: token_head % self.num_heads,
            pack,
        }
    }

    /// Offset of the first element of `item`'s pack in a vector buffer.
    #[inline]
    pub fn vector_offset(&self, item: WorkItem) -> usize {
        (item.token * self.num_heads + item.head) * self.head_size + item.pack * self.pack_width
    }

    /// Offset of `item`'s (head, token) scalar in an LSE buffer.
    #[inline]
    pub fn lse_offset(&self, item: WorkItem) -> usize {
        item.head * self.num_tokens + item.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_order() {
        let layout = WorkLayout::new(2, 3, 8, 4);
        assert_eq!(layout.packs_per_head, 2);
        assert_eq!(layout.num_units(), 12);

        assert_eq!(
            layout.decompose(0),
            WorkItem {
                token: 0,
                head: 0,
                pack: 0
            }
        );
        assert_eq!(
            layout.decompose(1),
            WorkItem {
                token: 0,
                head: 0,
                pack: 1
            }
        );
        assert_eq!(
            layout.decompose(2),
            WorkItem {
                token: 0,
                head: 1,
                pack: 0
            }
        );
        assert_eq!(
            layout.decompose(7),
            WorkItem {
                token: 1,
                head: 0,
                pack: 1
            }
        );
    }

    #[test]
    fn test_packs_tile_vector_buffer() {
        // Every element of the vector buffer is covered by exactly one unit.
        let layout = WorkLayout::new(3, 2, 16, 8);
        let mut hits = vec![0u32; layout.vector_len()];
        for linear in 0..layout.num_units() {
            let off = layout.vector_offset(layout.decompose(linear));
            for h in &mut hits[off..off + layout.pack_width] {
                *h += 1;
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_lse_written_once_per_pair() {
        let layout = WorkLayout::new(4, 3, 16, 4);
        let mut hits = vec![0u32; layout.lse_len()];
        for linear in 0..layout.num_units() {
            let item = layout.decompose(linear);
            if item.pack == 0 {
                hits[layout.lse_offset(item)] += 1;
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_lse_offset_is_head_major() {
        let layout = WorkLayout::new(5, 2, 4, 4);
        let item = WorkItem {
            token: 3,
            head: 1,
            pack: 0,
        };
        assert_eq!(layout.lse_offset(item), 5 + 3);
    }
}
