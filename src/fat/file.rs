//! `FileObject`/`FileHandle` split (spec §3 "FileObject vs FileHandle"):
//! the shared state of an open file vs. a per-access cursor over it, plus
//! the cluster-chain walk (with adjacency cache) and fast-write
//! allocation path that reads from it.

use crate::error::{FsError, FsResult};
use crate::storage::Storage;
use super::dir::{self, DirEntry, DirLocation, ShortName};
use super::journal::JournalHooks;
use super::table;
use super::FatInfo;

use bitflags::bitflags;
use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;

bitflags! {
    /// Access-mode bits a `FileHandle` was opened with (spec §3
    /// "FileHandle: ... access-flags").
    #[derive(Default)]
    pub struct AccessFlags: u8 {
        const READ = 0b0001;
        const WRITE = 0b0010;
        const APPEND = 0b0100;
        /// Bypass the dirty-AT-write-per-cluster path when the file's
        /// FreeClusterCache already reserves the needed run (spec §4.4
        /// "Fast" write mode).
        const FAST = 0b1000;
    }
}

/// The shared state of one open file (spec §3 "FileObject"). At most one
/// exists per file at a time; owning that invariant (and the reference
/// count of `FileHandle`s) is the job of the volume-level open-file
/// table, not this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileObject {
    /// First cluster of the file's chain; 0 for an empty file with no
    /// cluster allocated yet.
    pub first_cluster: u32,
    pub size: u32,
    /// Cluster the last walk landed on (`Fat.CurClusterId`).
    pub cur_cluster_id: u32,
    /// That cluster's 0-based index within the chain
    /// (`Fat.CurClusterIndex`).
    pub cur_cluster_index: u32,
    /// How many clusters after `cur_cluster_id` are known-adjacent, i.e.
    /// can be reached by `+1` without a FAT read (`Fat.NumAdjClusters`).
    pub num_adj_clusters: u32,
    /// Where the file's 32-byte directory entry lives, for size/first-
    /// cluster writeback.
    pub dir_entry_sector: u32,
    pub dir_entry_offset_in_sector: u32,
}

impl FileObject {
    pub fn new_empty() -> Self {
        Self {
            first_cluster: 0,
            size: 0,
            cur_cluster_id: 0,
            cur_cluster_index: 0,
            num_adj_clusters: 0,
            dir_entry_sector: 0,
            dir_entry_offset_in_sector: 0,
        }
    }

    pub fn from_dir_entry(entry: &DirEntry, dir_entry_sector: u32, dir_entry_offset_in_sector: u32) -> Self {
        Self {
            first_cluster: entry.first_cluster(),
            size: entry.size,
            cur_cluster_id: entry.first_cluster(),
            cur_cluster_index: 0,
            num_adj_clusters: 0,
            dir_entry_sector,
            dir_entry_offset_in_sector,
        }
    }

    /// Resets the cluster-chain cursor to the start of the file; called
    /// whenever a seek lands before the cached position.
    fn reset_cursor(&mut self) {
        self.cur_cluster_id = self.first_cluster;
        self.cur_cluster_index = 0;
        self.num_adj_clusters = 0;
    }

    /// Returns the cluster holding byte offset `cluster_index *
    /// cluster_size`, walking forward from the cached position when
    /// possible and refreshing the adjacency cache on each FAT read
    /// (spec §4.4 "Cluster-chain walk").
    pub fn cluster_for_index<S: Storage>(
        &mut self,
        info: &FatInfo,
        storage: &mut S,
        target_index: u32,
    ) -> FsResult<u32> {
        if self.first_cluster == 0 {
            return Err(FsError::InvalidClusterChain);
        }
        if target_index < self.cur_cluster_index {
            self.reset_cursor();
        }

        let mut sector = GenericArray::<u8, U512>::default();
        while self.cur_cluster_index < target_index {
            let steps = target_index - self.cur_cluster_index;
            if self.num_adj_clusters > 0 {
                let hop = steps.min(self.num_adj_clusters);
                self.cur_cluster_id += hop;
                self.cur_cluster_index += hop;
                self.num_adj_clusters -= hop;
                continue;
            }

            let next = table::read_fat_entry(info, storage, &mut sector, self.cur_cluster_id)?;
            if info.fat_type.is_end_of_chain(next) || next == 0 {
                return Err(FsError::InvalidClusterChain);
            }
            self.cur_cluster_id = next;
            self.cur_cluster_index += 1;
            self.num_adj_clusters = table::count_adjacent_clusters(info, storage, &mut sector, self.cur_cluster_id)?;
        }

        Ok(self.cur_cluster_id)
    }

    /// Appends one cluster to the file's chain, preferring the
    /// FreeClusterCache fast path when it is owned by this file and
    /// still has capacity (spec §4.4 "Finding a free cluster... if the
    /// free-cluster-cache optimisation is enabled AND the write mode is
    /// Fast AND the request came from a file handle").
    pub fn append_cluster<S: Storage, J: JournalHooks>(
        &mut self,
        info: &mut FatInfo,
        storage: &mut S,
        journal: &mut J,
        maintain_fat_copy: bool,
        access: AccessFlags,
    ) -> FsResult<u32> {
        let fast = access.contains(AccessFlags::FAST) && self.first_cluster != 0 && info.free_cluster_cache.is_owned_by(self.first_cluster);

        let new_cluster = if fast && info.free_cluster_cache.num_clusters_in_use < info.free_cluster_cache.num_clusters_total {
            let candidate = info.free_cluster_cache.start_cluster + info.free_cluster_cache.num_clusters_in_use;
            info.free_cluster_cache.num_clusters_in_use += 1;
            candidate
        } else {
            info.find_free_cluster(storage)?
        };

        let marker = info.fat_type.end_of_chain_marker();
        if self.first_cluster == 0 {
            self.first_cluster = new_cluster;
            self.cur_cluster_id = new_cluster;
            self.cur_cluster_index = 0;
        } else {
            let last = self.cluster_for_index(info, storage, self.cur_cluster_index)?;
            table::write_fat_entry(info, storage, journal, maintain_fat_copy, &mut GenericArray::<u8, U512>::default(), last, new_cluster)?;
            self.cur_cluster_id = new_cluster;
            self.cur_cluster_index += 1;
        }
        table::write_fat_entry(info, storage, journal, maintain_fat_copy, &mut GenericArray::<u8, U512>::default(), new_cluster, marker)?;
        self.num_adj_clusters = 0;

        Ok(new_cluster)
    }

    /// Frees the whole chain (spec §4.4 "Freeing a cluster chain"),
    /// called when the file is deleted or truncated to zero.
    pub fn free_chain<S: Storage, J: JournalHooks>(
        &mut self,
        info: &mut FatInfo,
        storage: &mut S,
        journal: &mut J,
        maintain_fat_copy: bool,
    ) -> FsResult<()> {
        if self.first_cluster == 0 {
            return Ok(());
        }
        let mut sector = GenericArray::<u8, U512>::default();
        table::free_chain(info, storage, journal, maintain_fat_copy, &mut sector, self.first_cluster)?;
        self.first_cluster = 0;
        self.size = 0;
        self.reset_cursor();
        Ok(())
    }

    /// Writes the file's current `size`/`first_cluster` back to its
    /// directory entry.
    pub fn flush_dir_entry<S: Storage>(&self, storage: &mut S) -> FsResult<()> {
        let mut sector = GenericArray::<u8, U512>::default();
        storage.read_sector(self.dir_entry_sector, sector.as_mut_slice())?;
        let off = self.dir_entry_offset_in_sector as usize;
        let raw: [u8; 32] = sector[off..off + 32].try_into().unwrap();
        let mut entry = DirEntry::from_bytes(&raw);
        entry.size = self.size;
        entry.set_first_cluster(self.first_cluster);
        sector[off..off + 32].copy_from_slice(&entry.to_bytes());
        storage.write_sector(self.dir_entry_sector, sector.as_slice())
    }
}

/// A per-access cursor over a `FileObject` (spec §3 "FileHandle").
/// Several handles may share one `FileObject`; the owning volume's
/// open-file table enforces that invariant, not this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    pub file_pos: u32,
    pub access: AccessFlags,
    pub is_dir_update_required: bool,
}

impl FileHandle {
    pub fn open(access: AccessFlags) -> Self {
        Self { file_pos: 0, access, is_dir_update_required: false }
    }

    pub fn seek(&mut self, pos: u32) {
        self.file_pos = pos;
    }

    /// Reads up to `buf.len()` bytes starting at `self.file_pos` into
    /// `buf`, returning the number of bytes actually read (truncated by
    /// EOF).
    pub fn read<S: Storage>(&mut self, file: &mut FileObject, info: &FatInfo, storage: &mut S, buf: &mut [u8]) -> FsResult<usize> {
        if !self.access.contains(AccessFlags::READ) {
            return Err(FsError::InvalidUsage);
        }
        let cluster_size = info.bytes_per_sector as u32 * info.sectors_per_cluster as u32;
        let remaining_in_file = file.size.saturating_sub(self.file_pos);
        let to_read = buf.len().min(remaining_in_file as usize);

        let mut sector = GenericArray::<u8, U512>::default();
        let mut done = 0usize;
        while done < to_read {
            let pos = self.file_pos + done as u32;
            let cluster_index = pos / cluster_size;
            let offset_in_cluster = pos % cluster_size;
            let sector_in_cluster = offset_in_cluster / info.bytes_per_sector as u32;
            let offset_in_sector = (offset_in_cluster % info.bytes_per_sector as u32) as usize;

            let cluster = file.cluster_for_index(info, storage, cluster_index)?;
            let sector_idx = info.first_data_sector + (cluster - 2) * info.sectors_per_cluster as u32 + sector_in_cluster;
            storage.read_sector(sector_idx, sector.as_mut_slice())?;

            let chunk = (to_read - done).min(info.bytes_per_sector as usize - offset_in_sector);
            buf[done..done + chunk].copy_from_slice(&sector[offset_in_sector..offset_in_sector + chunk]);
            done += chunk;
        }

        self.file_pos += done as u32;
        Ok(done)
    }

    /// Writes `buf` at `self.file_pos`, extending the file's cluster
    /// chain (and size) as needed.
    pub fn write<S: Storage, J: JournalHooks>(
        &mut self,
        file: &mut FileObject,
        info: &mut FatInfo,
        storage: &mut S,
        journal: &mut J,
        maintain_fat_copy: bool,
        buf: &[u8],
    ) -> FsResult<usize> {
        if !self.access.contains(AccessFlags::WRITE) {
            return Err(FsError::InvalidUsage);
        }
        let cluster_size = info.bytes_per_sector as u32 * info.sectors_per_cluster as u32;
        let mut sector = GenericArray::<u8, U512>::default();
        let mut done = 0usize;

        while done < buf.len() {
            let pos = self.file_pos + done as u32;
            let cluster_index = pos / cluster_size;
            let offset_in_cluster = pos % cluster_size;
            let sector_in_cluster = offset_in_cluster / info.bytes_per_sector as u32;
            let offset_in_sector = (offset_in_cluster % info.bytes_per_sector as u32) as usize;

            while file.cluster_for_index(info, storage, cluster_index).is_err() {
                file.append_cluster(info, storage, journal, maintain_fat_copy, self.access)?;
            }
            let cluster = file.cluster_for_index(info, storage, cluster_index)?;
            let sector_idx = info.first_data_sector + (cluster - 2) * info.sectors_per_cluster as u32 + sector_in_cluster;

            let chunk = (buf.len() - done).min(info.bytes_per_sector as usize - offset_in_sector);
            if chunk < info.bytes_per_sector as usize {
                storage.read_sector(sector_idx, sector.as_mut_slice())?;
            }
            sector[offset_in_sector..offset_in_sector + chunk].copy_from_slice(&buf[done..done + chunk]);
            storage.write_sector(sector_idx, sector.as_slice())?;
            done += chunk;
        }

        self.file_pos += done as u32;
        if self.file_pos > file.size {
            file.size = self.file_pos;
        }
        self.is_dir_update_required = true;
        Ok(done)
    }
}

/// Creates a new zero-length file entry in `location` named `name`
/// (spec §4.4 "Create"), returning the `FileObject` for the freshly
/// created entry (no cluster allocated yet).
pub fn create_file<S: Storage>(
    info: &FatInfo,
    storage: &mut S,
    location: DirLocation,
    name: ShortName,
) -> FsResult<FileObject> {
    let mut sector = GenericArray::<u8, U512>::default();
    let entry = DirEntry::new_file(name, 0, 0);
    let (sector_idx, offset_in_sector) = dir::create_dir_entry(info, storage, &mut sector, location, &entry)?;
    Ok(FileObject::from_dir_entry(&entry, sector_idx, offset_in_sector))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_flags_compose() {
        let f = AccessFlags::READ | AccessFlags::WRITE;
        assert!(f.contains(AccessFlags::READ));
        assert!(f.contains(AccessFlags::WRITE));
        assert!(!f.contains(AccessFlags::APPEND));
    }

    #[test]
    fn new_file_handle_starts_at_zero() {
        let h = FileHandle::open(AccessFlags::READ);
        assert_eq!(h.file_pos, 0);
        assert!(!h.is_dir_update_required);
    }
}
