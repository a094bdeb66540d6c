//! Directory entries: the 32-byte on-disk record, attribute bits, and
//! find/create/delete over a directory's cluster chain (spec §4.4
//! "Directory entry find / create / delete").

use crate::error::{FsError, FsResult};
use crate::storage::Storage;
use super::journal::JournalHooks;
use super::table;
use super::types::FatType;
use super::FatInfo;

use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;
use core::fmt::{self, Debug};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    ReadOnly = 0x01,
    Hidden = 0x02,
    System = 0x04,
    VolumeId = 0x08,
    Directory = 0x10,
    Archive = 0x20,
    LongName = 0x0F,
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeSet {
    pub inner: u8,
}

impl AttributeSet {
    pub fn is_dir(&self) -> bool {
        self.inner & (Attribute::Directory as u8) != 0
    }

    pub fn is_long_name(&self) -> bool {
        self.inner == Attribute::LongName as u8
    }

    pub fn is_volume_id(&self) -> bool {
        self.inner & (Attribute::VolumeId as u8) != 0
    }
}

impl Debug for AttributeSet {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "AttributeSet({:#04x})", self.inner)
    }
}

/// An 8.3 short name, stored as the raw 11-byte field (name + ext, space
/// padded).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortName(pub [u8; 11]);

impl Debug for ShortName {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            if b == 0x20 {
                continue;
            }
            write!(fmt, "{}", b as char)?;
        }
        Ok(())
    }
}

impl ShortName {
    /// Builds an 8.3 name from a `name.ext`-style ASCII string,
    /// rejecting characters illegal in a short name (spec §4.4
    /// "Create: build the 8.3 name (rejecting illegal characters)").
    pub fn from_str(s: &str) -> FsResult<Self> {
        const ILLEGAL: &[u8] = b"\"*+,./:;<=>?[\\]|";

        let (base, ext) = match s.rfind('.') {
            Some(i) => (&s[..i], &s[i + 1..]),
            None => (s, ""),
        };
        if base.is_empty() || base.len() > 8 || ext.len() > 3 {
            return Err(FsError::InvalidParameter);
        }
        if !s.is_ascii() || s.bytes().any(|b| ILLEGAL.contains(&b) || b < 0x20) {
            return Err(FsError::InvalidParameter);
        }

        let mut raw = [0x20u8; 11];
        for (i, b) in base.bytes().enumerate() {
            raw[i] = b.to_ascii_uppercase();
        }
        for (i, b) in ext.bytes().enumerate() {
            raw[8 + i] = b.to_ascii_uppercase();
        }
        Ok(ShortName(raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Exists,
    Deleted,
    EndOfDirectory,
}

pub const DELETED_MARKER: u8 = 0xE5;
pub const END_MARKER: u8 = 0x00;

/// One 32-byte directory entry (spec §3 "Directory entry", §6
/// "Directory entry" byte layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub short_name: ShortName,
    pub attributes: AttributeSet,
    pub creation_time: u16,
    pub creation_date: u16,
    pub last_access_date: u16,
    cluster_high: u16,
    pub write_time: u16,
    pub write_date: u16,
    cluster_low: u16,
    pub size: u32,
}

impl Default for DirEntry {
    fn default() -> Self {
        Self {
            short_name: ShortName::default(),
            attributes: AttributeSet::default(),
            creation_time: 0,
            creation_date: 0,
            last_access_date: 0,
            cluster_high: 0,
            write_time: 0,
            write_date: 0,
            cluster_low: 0,
            size: 0,
        }
    }
}

impl DirEntry {
    pub fn state(&self) -> EntryState {
        match self.short_name.0[0] {
            END_MARKER => EntryState::EndOfDirectory,
            DELETED_MARKER => EntryState::Deleted,
            _ => EntryState::Exists,
        }
    }

    pub fn new_file(short_name: ShortName, first_cluster: u32, size: u32) -> Self {
        let mut d = Self { short_name, size, ..Default::default() };
        d.set_first_cluster(first_cluster);
        d
    }

    pub fn new_dir(short_name: ShortName, first_cluster: u32) -> Self {
        let mut d = Self { short_name, ..Default::default() };
        d.attributes.inner |= Attribute::Directory as u8;
        d.set_first_cluster(first_cluster);
        d
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.cluster_high as u32) << 16) | self.cluster_low as u32
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.cluster_high = (cluster >> 16) as u16;
        self.cluster_low = cluster as u16;
    }

    pub fn from_bytes(raw: &[u8; 32]) -> Self {
        macro_rules! e {
            ($ty:ty, $offset:literal) => {
                <$ty>::from_le_bytes(raw[$offset..$offset + core::mem::size_of::<$ty>()].try_into().unwrap())
            };
        }

        Self {
            short_name: ShortName(raw[0..11].try_into().unwrap()),
            attributes: AttributeSet { inner: raw[11] },
            creation_time: e!(u16, 14),
            creation_date: e!(u16, 16),
            last_access_date: e!(u16, 18),
            cluster_high: e!(u16, 20),
            write_time: e!(u16, 22),
            write_date: e!(u16, 24),
            cluster_low: e!(u16, 26),
            size: e!(u32, 28),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut raw = [0u8; 32];
        raw[0..11].copy_from_slice(&self.short_name.0);
        raw[11] = self.attributes.inner;
        raw[14..16].copy_from_slice(&self.creation_time.to_le_bytes());
        raw[16..18].copy_from_slice(&self.creation_date.to_le_bytes());
        raw[18..20].copy_from_slice(&self.last_access_date.to_le_bytes());
        raw[20..22].copy_from_slice(&self.cluster_high.to_le_bytes());
        raw[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        raw[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        raw[26..28].copy_from_slice(&self.cluster_low.to_le_bytes());
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
        raw
    }
}

/// Dispatches short-name vs. long-name directory entry handling (spec
/// §3 "Long-file-name entries... dispatched through a pluggable
/// `DirEntryApi`"). The short-name path is always tried first; a
/// registered long-name implementation gets a chance at entries the
/// short-name scan skips over.
pub trait DirEntryApi {
    /// Whether this entry (already known not to be a short-name entry)
    /// is one this implementation recognizes.
    fn recognizes(&self, entry: &DirEntry) -> bool {
        entry.attributes.is_long_name()
    }

    /// Given the raw 32 bytes of a recognized entry and the short-name
    /// entry it precedes, returns the long name if this entry
    /// contributes to (completes) one.
    fn long_name_component<'a>(&self, raw: &[u8; 32], buf: &'a mut [u8]) -> Option<&'a str>;
}

/// A registry with no long-name support; every entry not E5/00 is
/// treated as short-name-or-unknown.
pub struct NoLongNames;

impl DirEntryApi for NoLongNames {
    fn long_name_component<'a>(&self, _raw: &[u8; 32], _buf: &'a mut [u8]) -> Option<&'a str> {
        None
    }
}

/// The physical layout of one directory's storage: either the FAT12/16
/// fixed root region (a flat sector run) or a FAT32-style cluster
/// chain (root or subdirectory alike).
#[derive(Debug, Clone, Copy)]
pub enum DirLocation {
    FixedRoot { first_sector: u32, num_sectors: u32 },
    ClusterChain { first_cluster: u32 },
}

/// Walks a directory's sector run one sector at a time without
/// materializing the whole chain, following the FAT as needed for
/// `ClusterChain` directories (no heap allocation — spec §1 targets
/// resource-constrained devices).
struct DirCursor {
    location: DirLocation,
    /// Current cluster, for `ClusterChain`; unused for `FixedRoot`.
    cluster: u32,
    /// Sector offset within the current cluster (or, for `FixedRoot`,
    /// within the whole root region).
    sector_in_unit: u32,
}

impl DirCursor {
    fn new(location: DirLocation) -> Self {
        let cluster = match location {
            DirLocation::ClusterChain { first_cluster } => first_cluster,
            DirLocation::FixedRoot { .. } => 0,
        };
        Self { location, cluster, sector_in_unit: 0 }
    }

    /// Absolute sector index of the cursor's current position.
    fn sector_idx(&self, info: &FatInfo) -> u32 {
        match self.location {
            DirLocation::FixedRoot { first_sector, .. } => first_sector + self.sector_in_unit,
            DirLocation::ClusterChain { .. } => {
                info.first_data_sector + (self.cluster - 2) * info.sectors_per_cluster as u32 + self.sector_in_unit
            }
        }
    }

    /// Advances to the next sector, following the FAT chain at cluster
    /// boundaries. Returns `false` once the directory is exhausted.
    fn advance<S: Storage>(&mut self, info: &FatInfo, storage: &mut S, scratch: &mut GenericArray<u8, U512>) -> FsResult<bool> {
        match self.location {
            DirLocation::FixedRoot { num_sectors, .. } => {
                self.sector_in_unit += 1;
                Ok(self.sector_in_unit < num_sectors)
            }
            DirLocation::ClusterChain { .. } => {
                self.sector_in_unit += 1;
                if self.sector_in_unit < info.sectors_per_cluster as u32 {
                    return Ok(true);
                }
                self.sector_in_unit = 0;
                let next = table::read_fat_entry(info, storage, scratch, self.cluster)?;
                if info.fat_type.is_end_of_chain(next) || next == 0 {
                    return Ok(false);
                }
                self.cluster = next;
                Ok(true)
            }
        }
    }
}

/// Finds a short-name entry by exact 11-byte match (spec §4.4 "Short-
/// name path always tried first"). Returns `(byte_offset, entry)`; the
/// offset is relative to the start of the directory's sector run and
/// identifies the entry for `delete_dir_entry`.
pub fn find_dir_entry<S: Storage>(
    info: &FatInfo,
    storage: &mut S,
    sector: &mut GenericArray<u8, U512>,
    location: DirLocation,
    name: &ShortName,
) -> FsResult<Option<(u32, DirEntry)>> {
    let bps = info.bytes_per_sector as u32;
    let mut cursor = DirCursor::new(location);
    let mut sector_number = 0u32;

    loop {
        storage.read_sector(cursor.sector_idx(info), sector.as_mut_slice())?;
        for slot in 0..(bps / 32) {
            let off = (slot * 32) as usize;
            let raw: [u8; 32] = sector[off..off + 32].try_into().unwrap();
            let entry = DirEntry::from_bytes(&raw);
            match entry.state() {
                EntryState::EndOfDirectory => return Ok(None),
                EntryState::Deleted => {}
                EntryState::Exists => {
                    if !entry.attributes.is_long_name() && entry.short_name == *name {
                        return Ok(Some((sector_number * bps + slot * 32, entry)));
                    }
                }
            }
        }
        if !cursor.advance(info, storage, sector)? {
            return Ok(None);
        }
        sector_number += 1;
    }
}

/// Writes `entry` at the first free (deleted or past-end) slot in the
/// directory (spec §4.4 "Create"). Returns the absolute sector index
/// and in-sector byte offset the entry was written at, so the caller
/// doesn't need to re-walk the chain to build a `FileObject`.
pub fn create_dir_entry<S: Storage>(
    info: &FatInfo,
    storage: &mut S,
    sector: &mut GenericArray<u8, U512>,
    location: DirLocation,
    entry: &DirEntry,
) -> FsResult<(u32, u32)> {
    let bps = info.bytes_per_sector as u32;
    let mut cursor = DirCursor::new(location);

    loop {
        let sector_idx = cursor.sector_idx(info);
        storage.read_sector(sector_idx, sector.as_mut_slice())?;
        for slot in 0..(bps / 32) {
            let off = (slot * 32) as usize;
            let first_byte = sector[off];
            if first_byte == DELETED_MARKER || first_byte == END_MARKER {
                sector[off..off + 32].copy_from_slice(&entry.to_bytes());
                storage.write_sector(sector_idx, sector.as_slice())?;
                return Ok((sector_idx, slot * 32));
            }
        }
        if !cursor.advance(info, storage, sector)? {
            return Err(FsError::OutOfMemory);
        }
    }
}

/// Marks the entry at `byte_offset` deleted (first byte = 0xE5).
pub fn delete_dir_entry<S: Storage>(
    info: &FatInfo,
    storage: &mut S,
    sector: &mut GenericArray<u8, U512>,
    location: DirLocation,
    byte_offset: u32,
) -> FsResult<()> {
    let bps = info.bytes_per_sector as u32;
    let mut cursor = DirCursor::new(location);
    let target_sector = byte_offset / bps;
    let off = (byte_offset % bps) as usize;

    for _ in 0..target_sector {
        if !cursor.advance(info, storage, sector)? {
            return Err(FsError::InvalidParameter);
        }
    }
    let sector_idx = cursor.sector_idx(info);
    storage.read_sector(sector_idx, sector.as_mut_slice())?;
    sector[off] = DELETED_MARKER;
    storage.write_sector(sector_idx, sector.as_slice())
}

/// Pre-allocates `n` adjacent clusters to the FAT32 root directory's
/// chain at init time, zeroing them (spec §4.4 "grow_root_dir"). Fails
/// if the clusters immediately following the current last cluster are
/// not free.
pub fn grow_root_dir<S: Storage, J: JournalHooks>(
    info: &mut FatInfo,
    storage: &mut S,
    journal: &mut J,
    maintain_fat_copy: bool,
    sector: &mut GenericArray<u8, U512>,
    root_first_cluster: u32,
    n: u32,
) -> FsResult<()> {
    if info.fat_type != FatType::Fat32 {
        return Err(FsError::NotSupported);
    }

    let mut last_cluster = root_first_cluster;
    loop {
        let next = table::read_fat_entry(info, storage, sector, last_cluster)?;
        if info.fat_type.is_end_of_chain(next) || next == 0 {
            break;
        }
        last_cluster = next;
    }

    let spc = info.sectors_per_cluster as u32;
    let mut prev = last_cluster;
    for i in 0..n {
        let candidate = last_cluster + 1 + i;
        if table::read_fat_entry(info, storage, sector, candidate)? != 0 {
            return Err(FsError::ClusterNotFree);
        }
        table::write_fat_entry(info, storage, journal, maintain_fat_copy, sector, prev, candidate)?;
        table::write_fat_entry(info, storage, journal, maintain_fat_copy, sector, candidate, info.fat_type.end_of_chain_marker())?;

        let base = info.first_data_sector + (candidate - 2) * spc;
        sector.as_mut_slice().fill(0);
        for s in 0..spc {
            storage.write_sector(base + s, sector.as_slice())?;
        }
        prev = candidate;
    }
    Ok(())
}

/// A read-only walk over every live entry in a directory, skipping
/// deleted slots and stopping at the end marker. Each step takes the
/// storage and scratch sector explicitly rather than borrowing them for
/// the iterator's lifetime, since this crate has no way to stash a
/// `&mut S` inside a `core::iter::Iterator` without a heap box.
pub struct DirIter {
    cursor: DirCursor,
    slot: u32,
    done: bool,
}

impl DirIter {
    pub fn new(location: DirLocation) -> Self {
        Self { cursor: DirCursor::new(location), slot: 0, done: false }
    }

    /// Returns the next live entry, or `None` once the directory is
    /// exhausted. `sector` is scratch space reread on cluster/sector
    /// boundaries.
    pub fn next<S: Storage>(
        &mut self,
        info: &FatInfo,
        storage: &mut S,
        sector: &mut GenericArray<u8, U512>,
    ) -> FsResult<Option<DirEntry>> {
        if self.done {
            return Ok(None);
        }
        let bps = info.bytes_per_sector as u32;
        let slots_per_sector = bps / 32;

        loop {
            if self.slot == 0 {
                storage.read_sector(self.cursor.sector_idx(info), sector.as_mut_slice())?;
            }
            while self.slot < slots_per_sector {
                let off = (self.slot * 32) as usize;
                let raw: [u8; 32] = sector[off..off + 32].try_into().unwrap();
                let entry = DirEntry::from_bytes(&raw);
                self.slot += 1;
                match entry.state() {
                    EntryState::EndOfDirectory => {
                        self.done = true;
                        return Ok(None);
                    }
                    EntryState::Deleted => continue,
                    EntryState::Exists => return Ok(Some(entry)),
                }
            }
            self.slot = 0;
            if !self.cursor.advance(info, storage, sector)? {
                self.done = true;
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_rejects_illegal_characters() {
        assert!(ShortName::from_str("bad*name.txt").is_err());
    }

    #[test]
    fn short_name_uppercases_and_pads() {
        let name = ShortName::from_str("hi.c").unwrap();
        assert_eq!(&name.0[0..2], b"HI");
        assert_eq!(name.0[2], 0x20);
        assert_eq!(&name.0[8..9], b"C");
    }

    #[test]
    fn dir_entry_roundtrips_through_bytes() {
        let e = DirEntry::new_file(ShortName::from_str("A.TXT").unwrap(), 42, 100);
        let raw = e.to_bytes();
        let back = DirEntry::from_bytes(&raw);
        assert_eq!(back.first_cluster(), 42);
        assert_eq!(back.size, 100);
    }

    #[test]
    fn deleted_entry_state() {
        let mut e = DirEntry::new_file(ShortName::from_str("A.TXT").unwrap(), 42, 0);
        e.short_name.0[0] = DELETED_MARKER;
        assert_eq!(e.state(), EntryState::Deleted);
    }
}
