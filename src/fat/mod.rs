//! BPB parsing/mount, the allocation table, directory entries, and
//! file objects/handles for FAT12/16/32 (spec §3 "FATInfo", §4.4).

pub mod bpb;
pub mod dir;
pub mod file;
pub mod fsinfo;
pub mod journal;
pub mod table;
pub mod types;

use crate::error::{FsError, FsResult};
use crate::storage::Storage;

use bpb::BootSector;
use fsinfo::FsInfoSector;
use journal::JournalHooks;
use types::FatType;

use generic_array::GenericArray;
use typenum::consts::U512;

/// Where a directory's first cluster or sector run lives (spec §3
/// "RootDirPos (cluster id for FAT32, sector index for FAT12/16)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootDirPos {
    FixedRoot { first_sector: u32, num_sectors: u32 },
    Cluster(u32),
}

impl RootDirPos {
    pub fn as_dir_location(&self) -> dir::DirLocation {
        match *self {
            RootDirPos::FixedRoot { first_sector, num_sectors } => dir::DirLocation::FixedRoot { first_sector, num_sectors },
            RootDirPos::Cluster(c) => dir::DirLocation::ClusterChain { first_cluster: c },
        }
    }
}

/// The fast-write optimisation of spec §3 "FreeClusterCache": a single
/// contiguous run of known-free clusters reserved for one file's
/// exclusive use, avoiding repeat AT scans while that file is being
/// appended to in `Fast` write mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FreeClusterCache {
    pub start_cluster: u32,
    pub num_clusters_in_use: u32,
    pub num_clusters_total: u32,
    /// Identifies the owning file by its first cluster; `None` if the
    /// cache is currently unowned.
    pub owning_file: Option<u32>,
}

impl FreeClusterCache {
    pub fn is_owned_by(&self, first_cluster: u32) -> bool {
        self.owning_file == Some(first_cluster)
    }

    pub fn release(&mut self) {
        *self = Self::default();
    }
}

/// Parsed BPB plus all runtime state a mounted FAT volume needs (spec
/// §3 "FATInfo").
#[derive(Debug, Clone)]
pub struct FatInfo {
    pub fat_type: FatType,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub ld_bytes_per_cluster: u8,
    pub rsvd_sec_cnt: u16,
    pub num_fats: u8,
    pub fat_size: u32,
    pub first_data_sector: u32,
    pub num_clusters: u32,
    pub root_dir_pos: RootDirPos,
    pub root_ent_cnt: u16,
    pub num_free_clusters: u32,
    pub next_free_cluster: u32,
    pub is_dirty: bool,
    pub fs_info: Option<FsInfoSector>,
    pub free_cluster_cache: FreeClusterCache,
    pub write_cnt_at: u32,
}

fn ld(mut v: u32) -> u8 {
    let mut n = 0u8;
    while v > 1 {
        v >>= 1;
        n += 1;
    }
    n
}

impl FatInfo {
    /// Mounts a FAT volume whose sector 0 (partition-relative) is the
    /// boot sector (spec §3, §4.4). The caller addresses `storage`
    /// relative to the partition start, per `Storage`'s contract.
    pub fn mount<S: Storage>(storage: &mut S) -> FsResult<Self> {
        let mut sector = GenericArray::<u8, U512>::default();
        storage.read_sector(0, sector.as_mut_slice())?;

        let is_fat32_guess = bpb::probably_fat32(sector.as_slice());
        let boot = BootSector::read(&sector, is_fat32_guess)?;
        let bpb = &boot.bpb;

        let root_dir_sectors = ((bpb.max_root_dir_entries as u32 * 32) + (bpb.bytes_per_logical_sector as u32 - 1))
            / bpb.bytes_per_logical_sector as u32;

        let fat_size = if bpb.logical_sectors_per_fat != 0 {
            bpb.logical_sectors_per_fat as u32
        } else {
            bpb.logical_sectors_per_fat_extended
        };

        let total_sectors = if bpb.total_logical_sectors != 0 {
            bpb.total_logical_sectors as u32
        } else {
            bpb.total_logical_sectors_extended
        };

        let first_data_sector = bpb.num_reserved_logical_sectors as u32
            + (bpb.num_file_alloc_tables as u32 * fat_size)
            + root_dir_sectors;

        let data_sectors = total_sectors - first_data_sector;
        let num_clusters = data_sectors / bpb.logical_sectors_per_cluster as u32;
        let fat_type = FatType::from_cluster_count(num_clusters);

        // The initial guess only distinguishes "has a 16-bit FATSz16"
        // from "doesn't"; if it disagreed with the cluster-count-derived
        // type at the FAT32 boundary, re-read with the corrected layout.
        let boot = if is_fat32_guess != (fat_type == FatType::Fat32) {
            BootSector::read(&sector, fat_type == FatType::Fat32)?
        } else {
            boot
        };
        let bpb = &boot.bpb;

        if !bpb.requires_mirroring() && bpb.num_file_alloc_tables == 2 {
            return Err(FsError::InvalidFsFormat);
        }

        let root_dir_pos = if fat_type == FatType::Fat32 {
            RootDirPos::Cluster(bpb.root_dir_cluster_num)
        } else {
            RootDirPos::FixedRoot {
                first_sector: first_data_sector - root_dir_sectors,
                num_sectors: root_dir_sectors,
            }
        };

        let is_dirty = bpb.is_dirty();

        let fs_info = if fat_type == FatType::Fat32 && bpb.fs_info_logical_sector_num != 0 {
            let mut fsi_sector = GenericArray::<u8, U512>::default();
            storage.read_sector(bpb.fs_info_logical_sector_num as u32, fsi_sector.as_mut_slice())?;
            FsInfoSector::read(&fsi_sector, bpb.fs_info_logical_sector_num as u32, is_dirty).ok()
        } else {
            None
        };

        let (num_free_clusters, next_free_cluster) = match &fs_info {
            Some(fsi) => (fsi.free_cluster_count, fsi.next_free_cluster),
            None => (fsinfo::INVALID_COUNT, fsinfo::INVALID_COUNT),
        };

        log::debug!("fat: mounted {:?}, {} clusters, {} bytes/sector", fat_type, num_clusters, bpb.bytes_per_logical_sector);

        Ok(Self {
            fat_type,
            bytes_per_sector: bpb.bytes_per_logical_sector,
            sectors_per_cluster: bpb.logical_sectors_per_cluster,
            ld_bytes_per_cluster: ld(bpb.bytes_per_logical_sector as u32 * bpb.logical_sectors_per_cluster as u32),
            rsvd_sec_cnt: bpb.num_reserved_logical_sectors,
            num_fats: bpb.num_file_alloc_tables,
            fat_size,
            first_data_sector,
            num_clusters,
            root_dir_pos,
            root_ent_cnt: bpb.max_root_dir_entries,
            num_free_clusters,
            next_free_cluster,
            is_dirty,
            fs_info,
            free_cluster_cache: FreeClusterCache::default(),
            write_cnt_at: 0,
        })
    }

    /// Sets the persisted dirty flag on mount (if not already set) and
    /// clears it cleanly on unmount (spec §4.4 "Dirty flag").
    pub fn set_dirty_flag<S: Storage>(&mut self, storage: &mut S, dirty: bool) -> FsResult<()> {
        if self.is_dirty == dirty {
            return Ok(());
        }
        let mut sector = GenericArray::<u8, U512>::default();
        storage.read_sector(0, sector.as_mut_slice())?;
        let mut boot = BootSector::read(&sector, self.fat_type == FatType::Fat32)?;
        boot.bpb.set_dirty(dirty);
        boot.write(&mut sector, self.fat_type == FatType::Fat32);
        storage.write_sector(0, sector.as_slice())?;
        self.is_dirty = dirty;
        Ok(())
    }

    /// Flushes the FSInfo sector if `is_update_required` (spec §4.4).
    pub fn flush_fs_info<S: Storage>(&mut self, storage: &mut S) -> FsResult<()> {
        if let Some(fsi) = self.fs_info.as_mut() {
            if fsi.is_update_required {
                fsi.free_cluster_count = self.num_free_clusters;
                fsi.next_free_cluster = self.next_free_cluster;
                let mut sector = GenericArray::<u8, U512>::default();
                fsi.write(&mut sector);
                storage.write_sector(fsi.sector_index, sector.as_slice())?;
                fsi.is_update_required = false;
            }
        }
        Ok(())
    }

    pub fn root_dir_location(&self) -> dir::DirLocation {
        self.root_dir_pos.as_dir_location()
    }

    pub fn read_fat_entry<S: Storage>(&self, storage: &mut S, cluster: u32) -> FsResult<u32> {
        let mut sector = GenericArray::<u8, U512>::default();
        table::read_fat_entry(self, storage, &mut sector, cluster)
    }

    pub fn write_fat_entry<S: Storage, J: JournalHooks>(
        &mut self,
        storage: &mut S,
        journal: &mut J,
        maintain_fat_copy: bool,
        cluster: u32,
        value: u32,
    ) -> FsResult<()> {
        let mut sector = GenericArray::<u8, U512>::default();
        table::write_fat_entry(self, storage, journal, maintain_fat_copy, &mut sector, cluster, value)
    }

    pub fn find_free_cluster<S: Storage>(&self, storage: &mut S) -> FsResult<u32> {
        let mut sector = GenericArray::<u8, U512>::default();
        table::find_free_cluster(self, storage, &mut sector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ld_computes_log2() {
        assert_eq!(ld(512), 9);
        assert_eq!(ld(4096), 12);
    }

    #[test]
    fn free_cluster_cache_ownership() {
        let mut c = FreeClusterCache { start_cluster: 10, num_clusters_in_use: 1, num_clusters_total: 4, owning_file: Some(7) };
        assert!(c.is_owned_by(7));
        c.release();
        assert!(!c.is_owned_by(7));
    }
}
