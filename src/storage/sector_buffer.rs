//! The `SectorBufferPool`: a fixed pool of scratch buffers, each tagged
//! with `(volume, sector-index, dirty)`, with optional single-slot
//! read-cache semantics per buffer (spec §4.1).
//!
//! Grounded directly in the original sources' `FS__AllocSectorBuffer`,
//! `FS__AllocSectorBufferEx`, `FS__FreeSectorBuffer[Ex]`, and
//! `FS__InvalidateSectorBuffer` (`FS_Core.c`), which this module is a
//! straight line-for-line translation of the *algorithm* (not the code)
//! of. `Tag` stands in for the original's `FS_VOLUME *` — here it is
//! whatever small `Copy + Eq` identifier the caller uses to name a
//! volume (see `volume::VolumeId`), so this module has no dependency on
//! the `volume` module.

use crate::error::{FsError, FsResult};

/// Sentinel meaning "no sector" / "every sector" depending on context,
/// matching the original's `SECTOR_INDEX_INVALID`.
pub const SECTOR_INDEX_INVALID: u32 = u32::MAX;

/// How many buffers `alloc_ex` will scan for a same-volume match before
/// settling for the first one it saw (spec §4.1: "up to a small
/// threshold"); mirrors `FS_NUM_SECTOR_BUFFERS_PER_OPERATION` in the
/// original.
const MAX_SAME_VOLUME_SCAN: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Slot<Tag> {
    in_use: bool,
    tag: Option<Tag>,
    sector_index: u32,
}

impl<Tag: Copy> Slot<Tag> {
    const fn free() -> Self {
        Self { in_use: false, tag: None, sector_index: SECTOR_INDEX_INVALID }
    }
}

/// An opaque handle to one buffer in the pool. Cheap to copy; doesn't
/// borrow the pool, so it can be threaded through a call stack the way
/// the original code threads a raw `U8 *` around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorBufferRef(usize);

/// A pool of `N` scratch buffers of `SIZE` bytes each, tagged by `Tag`
/// (spec §4.1, §3 "SectorBuffer").
pub struct SectorBufferPool<Tag, const N: usize, const SIZE: usize> {
    slots: [Slot<Tag>; N],
    data: [[u8; SIZE]; N],
}

impl<Tag: Copy + PartialEq, const N: usize, const SIZE: usize> SectorBufferPool<Tag, N, SIZE> {
    pub fn new() -> Self {
        Self {
            slots: [Slot::free(); N],
            data: [[0u8; SIZE]; N],
        }
    }

    /// Read-only access to a held buffer's bytes.
    pub fn buffer(&self, r: SectorBufferRef) -> &[u8; SIZE] {
        &self.data[r.0]
    }

    /// Mutable access to a held buffer's bytes.
    pub fn buffer_mut(&mut self, r: SectorBufferRef) -> &mut [u8; SIZE] {
        &mut self.data[r.0]
    }

    /// Returns the first buffer with `in_use == false`; marks it in use
    /// and clears any stale `(tag, sector_index)` association.
    pub fn alloc(&mut self) -> Option<SectorBufferRef> {
        let idx = self.slots.iter().position(|s| !s.in_use)?;
        let slot = &mut self.slots[idx];
        slot.in_use = true;
        slot.tag = None;
        slot.sector_index = SECTOR_INDEX_INVALID;
        Some(SectorBufferRef(idx))
    }

    /// Allocates a buffer, preferring (in order): an exact `(tag, idx)`
    /// cache hit, a buffer most recently used for the same `tag`, or the
    /// first free buffer. Returns whether the returned buffer's contents
    /// already match `(tag, idx)` — if so the caller can skip the read.
    pub fn alloc_ex(&mut self, tag: Tag, idx: u32) -> (Option<SectorBufferRef>, bool) {
        let mut first_free: Option<usize> = None;
        let mut same_volume: Option<usize> = None;
        let mut same_volume_seen = 0usize;
        let mut matched: Option<usize> = None;

        for (i, slot) in self.slots.iter().enumerate() {
            if slot.in_use {
                continue;
            }
            if first_free.is_none() {
                first_free = Some(i);
            }
            if slot.tag == Some(tag) {
                same_volume_seen += 1;
                if same_volume.is_none() || same_volume_seen == MAX_SAME_VOLUME_SCAN {
                    same_volume = Some(i);
                }
                if slot.sector_index == idx {
                    matched = Some(i);
                    break;
                }
            }
        }

        let chosen = matched.or(same_volume).or(first_free);
        let is_matched = matched.is_some();

        if let Some(i) = chosen {
            let slot = &mut self.slots[i];
            slot.in_use = true;
            slot.tag = None;
            slot.sector_index = SECTOR_INDEX_INVALID;
            (Some(SectorBufferRef(i)), is_matched)
        } else {
            (None, false)
        }
    }

    /// Releases a buffer. If `valid`, records `(tag, idx)` so a future
    /// `alloc_ex` may reuse the contents without re-reading, and
    /// invalidates any other buffer that claims the same pair (spec §4.1
    /// invariant: at most one buffer holds a given `(vol, idx)` pair).
    pub fn free(&mut self, r: SectorBufferRef, tag: Tag, idx: u32, valid: bool) {
        if valid {
            for (i, slot) in self.slots.iter_mut().enumerate() {
                if i != r.0 && !slot.in_use && slot.tag == Some(tag) && slot.sector_index == idx {
                    slot.tag = None;
                    slot.sector_index = SECTOR_INDEX_INVALID;
                }
            }
        }

        let slot = &mut self.slots[r.0];
        slot.in_use = false;
        if valid {
            slot.tag = Some(tag);
            slot.sector_index = idx;
        } else {
            slot.tag = None;
            slot.sector_index = SECTOR_INDEX_INVALID;
        }
    }

    /// Clears any cached `(tag, idx')` for `idx' in [idx, idx + count)`
    /// on buffers that are not currently in use.
    /// `count == 0` (or `idx == SECTOR_INDEX_INVALID`) invalidates every
    /// cached entry for `tag`.
    pub fn invalidate(&mut self, tag: Tag, idx: u32, count: u32) {
        let whole_volume = count == 0 || idx == SECTOR_INDEX_INVALID;
        for slot in self.slots.iter_mut() {
            if slot.in_use || slot.tag != Some(tag) {
                continue;
            }
            let matches = whole_volume
                || (slot.sector_index >= idx && slot.sector_index < idx.saturating_add(count));
            if matches {
                slot.tag = None;
                slot.sector_index = SECTOR_INDEX_INVALID;
            }
        }
    }

    /// Number of buffers currently checked out.
    pub fn num_in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }
}

/// RAII guard ensuring a checked-out buffer is always released, even on
/// an early-return error path (spec §9 "scoped acquisition of sector
/// buffers").
pub struct SectorBufferGuard<'p, Tag: Copy + PartialEq, const N: usize, const SIZE: usize> {
    pool: &'p mut SectorBufferPool<Tag, N, SIZE>,
    r: SectorBufferRef,
    tag: Tag,
    sector_index: u32,
    valid_on_drop: bool,
}

impl<'p, Tag: Copy + PartialEq, const N: usize, const SIZE: usize> SectorBufferGuard<'p, Tag, N, SIZE> {
    pub fn alloc(pool: &'p mut SectorBufferPool<Tag, N, SIZE>, tag: Tag, sector_index: u32) -> FsResult<(Self, bool)> {
        let (r, matched) = pool.alloc_ex(tag, sector_index);
        let r = r.ok_or(FsError::BufferNotAvailable)?;
        Ok((Self { pool, r, tag, sector_index, valid_on_drop: true }, matched))
    }

    pub fn bytes(&self) -> &[u8; SIZE] {
        self.pool.buffer(self.r)
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; SIZE] {
        self.pool.buffer_mut(self.r)
    }

    /// Marks that, on drop, the buffer's contents should be discarded
    /// from the cache rather than retained (e.g. after a failed read).
    pub fn discard_on_drop(&mut self) {
        self.valid_on_drop = false;
    }
}

impl<'p, Tag: Copy + PartialEq, const N: usize, const SIZE: usize> Drop for SectorBufferGuard<'p, Tag, N, SIZE> {
    fn drop(&mut self) {
        self.pool.free(self.r, self.tag, self.sector_index, self.valid_on_drop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_round_trips() {
        let mut pool: SectorBufferPool<u8, 4, 16> = SectorBufferPool::new();
        let r = pool.alloc().unwrap();
        pool.buffer_mut(r)[0] = 0xAB;
        pool.free(r, 0, 5, true);

        let (r2, matched) = pool.alloc_ex(0, 5);
        assert!(matched);
        assert_eq!(pool.buffer(r2.unwrap())[0], 0xAB);
    }

    #[test]
    fn at_most_one_buffer_per_pair() {
        // Invariant 7: at most one buffer holds a given (vol, idx) at a time.
        let mut pool: SectorBufferPool<u8, 3, 8> = SectorBufferPool::new();
        let a = pool.alloc().unwrap();
        pool.free(a, 1, 10, true);

        let b = pool.alloc().unwrap();
        // Different buffer claims to cache the same (vol, idx); freeing it
        // as valid must evict the stale alias in `a`'s old slot.
        pool.free(b, 1, 10, true);

        let tagged: usize = pool
            .slots
            .iter()
            .filter(|s| !s.in_use && s.tag == Some(1) && s.sector_index == 10)
            .count();
        assert_eq!(tagged, 1);
    }

    #[test]
    fn exhausted_pool_errors() {
        let mut pool: SectorBufferPool<u8, 1, 8> = SectorBufferPool::new();
        let _held = pool.alloc().unwrap();
        assert!(pool.alloc().is_none());
    }

    #[test]
    fn invalidate_range_only_clears_unused_matching_entries() {
        let mut pool: SectorBufferPool<u8, 4, 8> = SectorBufferPool::new();
        for idx in 0..4u32 {
            let r = pool.alloc().unwrap();
            pool.free(r, 7, idx, true);
        }

        pool.invalidate(7, 1, 2); // clears sectors 1 and 2

        assert!(pool.alloc_ex(7, 0).1);
        assert!(!pool.alloc_ex(7, 1).1);
    }

    #[test]
    fn guard_frees_on_drop_even_on_early_return() {
        let mut pool: SectorBufferPool<u8, 2, 8> = SectorBufferPool::new();

        fn fallible(pool: &mut SectorBufferPool<u8, 2, 8>) -> FsResult<()> {
            let (mut guard, _matched) = SectorBufferGuard::alloc(pool, 0, 0)?;
            guard.bytes_mut()[0] = 1;
            Err(FsError::ReadFailure)
        }

        assert!(fallible(&mut pool).is_err());
        assert_eq!(pool.num_in_use(), 0);
    }
}
