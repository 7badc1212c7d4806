//! # Arena
//!
//! A single fixed-size scratch buffer that holds the pointer chain of every probe. The chain for
//! a `(stride, count)` pair is laid out as `count` links spaced `stride` bytes apart, each link
//! holding the byte offset of its successor. Links are written from the last element back to the
//! first so the construction itself does not walk forward through memory and train the
//! prefetcher, and the final write closes the circle.
//!
//! The arena is owned by the caller and lent mutably to whichever sampler is timing it; holding
//! the `&mut Arena` is what makes that sampler the only reader and writer.
use crate::error::ProbeError;
use std::mem::size_of;
use std::ptr;

/// Width of one stored link
pub const LINK_SIZE: usize = size_of::<usize>();

/// Scratch memory reused by every latency sample
pub struct Arena {
    buf: Box<[u8]>,
    /// `(stride, count)` of the chain currently linked in `buf`
    chain: Option<(usize, usize)>,
}

impl Arena {
    /// Allocate a zeroed arena of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Arena {
            buf: vec![0u8; capacity].into_boxed_slice(),
            chain: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Check that a `count`-element chain `stride` bytes apart fits without overlapping links
    pub fn fits(&self, stride: usize, count: usize) -> bool {
        stride >= LINK_SIZE
            && count >= 1
            && stride
                .checked_mul(count)
                .is_some_and(|span| span <= self.capacity())
    }

    /// Write a circular chain of `count` links `stride` bytes apart, returning the offset the
    /// traversal starts from (element 0, whose successor is the last element)
    pub fn link_chain(&mut self, stride: usize, count: usize) -> Result<usize, ProbeError> {
        if !self.fits(stride, count) {
            return Err(ProbeError::InvalidChain {
                stride,
                count,
                capacity: self.capacity(),
            });
        }

        let last = (count - 1) * stride;
        let base = self.buf.as_mut_ptr();
        let mut offset = last;
        loop {
            let next = if offset >= stride { offset - stride } else { last };
            // SAFETY: `fits` guarantees `offset + LINK_SIZE <= last + stride <= capacity`.
            // Line-size strides are not word aligned, hence the unaligned store.
            unsafe { ptr::write_unaligned(base.add(offset) as *mut usize, next) };
            if offset < stride {
                break;
            }
            offset -= stride;
        }

        self.chain = Some((stride, count));
        Ok(0)
    }

    /// Is `offset` one of the links of the current chain?
    pub fn is_link(&self, offset: usize) -> bool {
        self.chain
            .is_some_and(|(stride, count)| offset % stride == 0 && offset / stride < count)
    }

    /// Offset stored in the link at `offset`
    #[cfg(test)]
    fn successor(&self, offset: usize) -> usize {
        assert!(self.is_link(offset), "offset {offset} is not a chain link");
        // SAFETY: links of the current chain lie fully inside the buffer
        unsafe { ptr::read_unaligned(self.buf.as_ptr().add(offset) as *const usize) }
    }

    /// Follow `steps` links from `start`, returning where the walk ends
    ///
    /// Every load address comes out of the previous load, so the CPU cannot overlap or predict
    /// the accesses. `start` must be a link of the chain last written by [`Arena::link_chain`].
    #[inline(never)]
    pub fn chase(&self, start: usize, steps: usize) -> Result<usize, ProbeError> {
        if !self.is_link(start) {
            return Err(ProbeError::NotALink {
                offset: start,
                capacity: self.capacity(),
            });
        }

        let ptr = self.buf.as_ptr();
        let mut idx = start;

        // SAFETY: `start` is a link of the current chain, and `link_chain` only stores offsets
        // of other links of that chain, all of which lie fully inside the buffer.
        for _ in 0..steps / 8 {
            // Unroll 8x to reduce loop overhead relative to memory latency
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
        }
        for _ in 0..steps % 8 {
            idx = unsafe { ptr::read_unaligned(ptr.add(idx) as *const usize) };
        }

        Ok(idx)
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Number of steps until the walk from `start` first returns to it
    fn cycle_length(arena: &Arena, start: usize, limit: usize) -> Option<usize> {
        let mut idx = start;
        for step in 1..=limit {
            idx = arena.successor(idx);
            if idx == start {
                return Some(step);
            }
        }
        None
    }

    #[test]
    fn test_links_point_backward() {
        let mut arena = Arena::new(4096);
        let start = arena.link_chain(64, 4).unwrap();
        assert_eq!(start, 0);
        assert_eq!(arena.successor(0), 192);
        assert_eq!(arena.successor(192), 128);
        assert_eq!(arena.successor(128), 64);
        assert_eq!(arena.successor(64), 0);
    }

    #[test]
    fn test_single_element_chain_is_self_loop() {
        let mut arena = Arena::new(64);
        let start = arena.link_chain(16, 1).unwrap();
        assert_eq!(arena.successor(start), start);
        assert_eq!(arena.chase(start, 1_000).unwrap(), start);
    }

    #[test]
    fn test_relinking_overwrites_previous_chain() {
        let mut arena = Arena::new(1 << 16);
        arena.link_chain(32, 100).unwrap();
        let start = arena.link_chain(1024, 3).unwrap();
        assert_eq!(cycle_length(&arena, start, 10), Some(3));
        // Links of the old chain are no longer valid starting points
        assert!(!arena.is_link(32));
        assert!(arena.chase(32, 4).is_err());
    }

    #[test]
    fn test_chase_rejects_offsets_off_the_chain() {
        let mut arena = Arena::new(1024);
        assert!(matches!(
            arena.chase(0, 2),
            Err(ProbeError::NotALink {
                offset: 0,
                capacity: 1024,
            })
        ));

        arena.link_chain(9, 3).unwrap();
        // Misaligned inside the chain span
        assert!(matches!(
            arena.chase(11, 2),
            Err(ProbeError::NotALink { offset: 11, .. })
        ));
        // Past the last link, and far outside the buffer
        assert!(arena.chase(27, 2).is_err());
        assert!(arena.chase(usize::MAX - 3, 2).is_err());
        assert_eq!(arena.chase(18, 2).unwrap(), 0);
    }

    #[test]
    fn test_failed_link_keeps_previous_chain() {
        let mut arena = Arena::new(1024);
        let start = arena.link_chain(64, 4).unwrap();
        assert!(arena.link_chain(512, 3).is_err());
        assert!(arena.is_link(192));
        assert_eq!(arena.chase(start, 4).unwrap(), start);
    }

    #[test]
    fn test_rejects_chain_larger_than_arena() {
        let mut arena = Arena::new(1024);
        assert!(matches!(
            arena.link_chain(256, 5),
            Err(ProbeError::InvalidChain {
                stride: 256,
                count: 5,
                capacity: 1024,
            })
        ));
        assert!(arena.link_chain(256, 4).is_ok());
    }

    #[test]
    fn test_rejects_overlapping_links_and_empty_chain() {
        let mut arena = Arena::new(1024);
        assert!(arena.link_chain(LINK_SIZE - 1, 4).is_err());
        assert!(arena.link_chain(0, 4).is_err());
        assert!(arena.link_chain(64, 0).is_err());
    }

    #[test]
    fn test_chase_matches_successor_walk() {
        let mut arena = Arena::new(1 << 16);
        let start = arena.link_chain(100, 7).unwrap();
        let mut expected = start;
        for _ in 0..13 {
            expected = arena.successor(expected);
        }
        assert_eq!(arena.chase(start, 13).unwrap(), expected);
    }

    proptest! {
        #[test]
        fn chain_is_single_cycle_of_count(stride in LINK_SIZE..4096usize, count in 1usize..64) {
            let mut arena = Arena::new(1 << 18);
            let start = arena.link_chain(stride, count).unwrap();
            prop_assert_eq!(cycle_length(&arena, start, count), Some(count));

            // Closure holds from every element, not just the start
            let other = (count / 2) * stride;
            prop_assert_eq!(cycle_length(&arena, other, count), Some(count));
            prop_assert_eq!(arena.chase(other, count).unwrap(), other);
        }
    }
}
