//! The volume registry and `FileSystem` context (spec §3 "Volume", §9
//! "Global mutable state... aggregated into a single FileSystem context
//! that all operations take as an explicit first argument").

use crate::config::Config;
use crate::error::{FsError, FsResult};
use crate::fat::journal::NoJournal;
use crate::fat::FatInfo;
use crate::storage::{SectorBufferPool, Storage};

/// Identifies a volume slot in a `FileSystem`'s table; doubles as the
/// `Tag` parameter of its `SectorBufferPool` (spec §3 "SectorBuffer").
/// Carries a generation counter so a `FreeClusterCache::owning_file`-
/// style back-reference recorded before an unmount/remount cycle can be
/// detected as stale rather than aliasing a newly-mounted volume in the
/// same slot (spec §9 "weak reference... verified against the open-file
/// table on use").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId {
    slot: u8,
    generation: u32,
}

/// Per-volume flags not folded into `FatInfo` (spec §3 "per-volume
/// flags").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeFlags {
    pub is_mounted: bool,
    pub report_free_sectors: bool,
    pub auto_mount: bool,
}

impl Default for VolumeFlags {
    fn default() -> Self {
        Self { is_mounted: false, report_free_sectors: false, auto_mount: true }
    }
}

/// A mounted storage instance: partition descriptor plus file-system-
/// specific state (spec §3 "Volume").
pub struct Volume {
    generation: u32,
    allocated: bool,
    pub first_sector: u32,
    pub sector_count: u32,
    pub fat: Option<FatInfo>,
    pub flags: VolumeFlags,
}

impl Volume {
    fn empty() -> Self {
        Self { generation: 0, allocated: false, first_sector: 0, sector_count: 0, fat: None, flags: VolumeFlags::default() }
    }

    pub fn is_mounted(&self) -> bool {
        self.flags.is_mounted
    }
}

/// A partition-relative view of a device's `Storage`, so FAT code
/// addresses sectors `[0, sector_count)` regardless of where the
/// partition starts on the underlying medium.
pub struct PartitionView<'s, S> {
    storage: &'s mut S,
    first_sector: u32,
    sector_count: u32,
}

impl<'s, S: Storage> Storage for PartitionView<'s, S> {
    fn sector_size(&self) -> u32 {
        self.storage.sector_size()
    }

    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn read_sector(&mut self, sector_idx: u32, buf: &mut [u8]) -> FsResult<()> {
        if sector_idx >= self.sector_count {
            return Err(FsError::InvalidParameter);
        }
        self.storage.read_sector(self.first_sector + sector_idx, buf)
    }

    fn write_sector(&mut self, sector_idx: u32, buf: &[u8]) -> FsResult<()> {
        if sector_idx >= self.sector_count {
            return Err(FsError::InvalidParameter);
        }
        self.storage.write_sector(self.first_sector + sector_idx, buf)
    }

    fn free_sectors(&mut self, sector_idx: u32, count: u32) -> FsResult<()> {
        self.storage.free_sectors(self.first_sector + sector_idx, count)
    }
}

/// Aggregates what spec §9 calls out as process-wide global state: the
/// volume table and the sector-buffer pool, plus the `Config` every
/// operation consults. Every public FAT operation takes `&mut
/// FileSystem` (and a `&mut S` for the backing device) as its first
/// arguments rather than reaching for statics.
///
/// `MAX_VOLUMES` bounds the volume table; `BUF_N`/`BUF_SIZE` size the
/// backing `SectorBufferPool`.
pub struct FileSystem<const MAX_VOLUMES: usize, const BUF_N: usize, const BUF_SIZE: usize> {
    volumes: [Volume; MAX_VOLUMES],
    next_generation: u32,
    pub buffers: SectorBufferPool<VolumeId, BUF_N, BUF_SIZE>,
    pub config: Config,
}

impl<const MAX_VOLUMES: usize, const BUF_N: usize, const BUF_SIZE: usize> FileSystem<MAX_VOLUMES, BUF_N, BUF_SIZE> {
    pub fn new(config: Config) -> Self {
        Self {
            volumes: core::array::from_fn(|_| Volume::empty()),
            next_generation: 1,
            buffers: SectorBufferPool::new(),
            config,
        }
    }

    /// Registers a partition, matching the original's `AddDevices`
    /// (spec §3 "Lifecycle: created by AddDevices at init"). Does not
    /// mount it; mounting happens lazily on first access, or eagerly if
    /// `auto_mount` is left set (the default) and the caller calls
    /// [`Self::mount`] right after.
    pub fn add_device(&mut self, first_sector: u32, sector_count: u32) -> FsResult<VolumeId> {
        let slot = self.volumes.iter().position(|v| !v.allocated).ok_or(FsError::OutOfMemory)?;
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        self.volumes[slot] = Volume {
            generation,
            allocated: true,
            first_sector,
            sector_count,
            fat: None,
            flags: VolumeFlags::default(),
        };

        Ok(VolumeId { slot: slot as u8, generation })
    }

    /// Releases a volume's slot (it must be unmounted first), so a
    /// later `add_device` can reuse it.
    pub fn remove_device(&mut self, id: VolumeId) -> FsResult<()> {
        let v = self.volume_mut(id)?;
        if v.is_mounted() {
            return Err(FsError::InvalidUsage);
        }
        *v = Volume::empty();
        Ok(())
    }

    fn volume(&self, id: VolumeId) -> FsResult<&Volume> {
        let v = self.volumes.get(id.slot as usize).ok_or(FsError::VolumeNotFound)?;
        if v.generation != id.generation {
            return Err(FsError::VolumeNotFound);
        }
        Ok(v)
    }

    fn volume_mut(&mut self, id: VolumeId) -> FsResult<&mut Volume> {
        let v = self.volumes.get_mut(id.slot as usize).ok_or(FsError::VolumeNotFound)?;
        if v.generation != id.generation {
            return Err(FsError::VolumeNotFound);
        }
        Ok(v)
    }

    /// Parses the BPB and mounts the FAT volume, setting the dirty flag
    /// (spec §4.4 "Dirty flag").
    pub fn mount<S: Storage>(&mut self, id: VolumeId, storage: &mut S) -> FsResult<()> {
        let (first_sector, sector_count) = {
            let v = self.volume(id)?;
            (v.first_sector, v.sector_count)
        };
        let mut view = PartitionView { storage, first_sector, sector_count };
        let mut fat = FatInfo::mount(&mut view)?;

        if self.config.update_dirty_flag {
            fat.set_dirty_flag(&mut view, true)?;
        }

        let v = self.volume_mut(id)?;
        v.fat = Some(fat);
        v.flags.is_mounted = true;
        log::debug!("volume: mounted slot {}", id.slot);
        Ok(())
    }

    /// Clears the dirty flag, flushes FSInfo, and releases the slot
    /// (spec §4.4, §3 "unmounted at teardown").
    pub fn unmount<S: Storage>(&mut self, id: VolumeId, storage: &mut S) -> FsResult<()> {
        let (first_sector, sector_count) = {
            let v = self.volume(id)?;
            (v.first_sector, v.sector_count)
        };
        let mut view = PartitionView { storage, first_sector, sector_count };

        let v = self.volume_mut(id)?;
        if let Some(fat) = v.fat.as_mut() {
            fat.flush_fs_info(&mut view)?;
            if self.config.update_dirty_flag {
                fat.set_dirty_flag(&mut view, false)?;
            }
        }
        self.buffers.invalidate(id, 0, 0);

        let v = self.volume_mut(id)?;
        v.flags.is_mounted = false;
        v.fat = None;
        Ok(())
    }

    pub fn fat_info(&self, id: VolumeId) -> FsResult<&FatInfo> {
        self.volume(id)?.fat.as_ref().ok_or(FsError::VolumeNotFound)
    }

    pub fn fat_info_mut(&mut self, id: VolumeId) -> FsResult<&mut FatInfo> {
        self.volume_mut(id)?.fat.as_mut().ok_or(FsError::VolumeNotFound)
    }

    /// A `Storage` wrapper addressing `id`'s sectors relative to its
    /// partition start, for passing to `fat::table`/`fat::dir`/`fat::file`
    /// operations.
    pub fn view<'s, S: Storage>(&self, id: VolumeId, storage: &'s mut S) -> FsResult<PartitionView<'s, S>> {
        let v = self.volume(id)?;
        Ok(PartitionView { storage, first_sector: v.first_sector, sector_count: v.sector_count })
    }
}

/// A no-op default journal for `FileSystem` consumers that don't wire
/// up an external one.
pub type DefaultJournal = NoJournal;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_device_then_lookup_round_trips() {
        let mut fs: FileSystem<2, 4, 512> = FileSystem::new(Config::default());
        let id = fs.add_device(100, 2000).unwrap();
        assert_eq!(fs.volume(id).unwrap().first_sector, 100);
    }

    #[test]
    fn stale_volume_id_after_slot_reuse_is_rejected() {
        let mut fs: FileSystem<1, 4, 512> = FileSystem::new(Config::default());
        let old = fs.add_device(0, 100).unwrap();
        fs.remove_device(old).unwrap();
        let new = fs.add_device(0, 200).unwrap();
        assert_ne!(old, new);
        assert!(fs.volume(old).is_err());
        assert!(fs.volume(new).is_ok());
    }
}
