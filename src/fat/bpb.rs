//! The FAT Boot Sector and BIOS Parameter Block (spec §6 "On-disk FAT
//! BPB layout"). Most field docs are sourced from the well-known
//! description of the FAT on-disk format.

use crate::error::{FsError, FsResult};

use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;

pub const BOOT_SIGNATURE: u16 = 0xAA55;

/// A zero `logical_sectors_per_fat` (offset 0x016) at the shared BPB
/// offsets only ever happens on FAT32, which stores the real value at
/// the extended offset 0x024 instead — this lets the caller pick the
/// right `BiosParameterBlock::read` layout before `FatType` is known
/// from the cluster count.
pub fn probably_fat32(raw: &[u8]) -> bool {
    u16::from_le_bytes(raw[0x016..0x018].try_into().unwrap()) == 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSector {
    // Offset: 0x003
    pub oem_name: [u8; 8],

    pub bpb: BiosParameterBlock,

    // Offset: 0x1FE
    pub boot_signature: u16,
}

impl BootSector {
    /// `is_fat32` must come from the caller's cluster-count-derived
    /// `FatType` (spec §3) — the on-disk fields alone are ambiguous
    /// until `NumClusters` is known, so this cannot be self-describing.
    pub fn read(sector: &GenericArray<u8, U512>, is_fat32: bool) -> FsResult<Self> {
        let raw = sector.as_slice();
        let boot_signature = u16::from_le_bytes(raw[0x1FE..0x200].try_into().unwrap());
        if boot_signature != BOOT_SIGNATURE {
            return Err(FsError::InvalidFsFormat);
        }

        Ok(Self {
            oem_name: raw[3..11].try_into().unwrap(),
            bpb: BiosParameterBlock::read(raw, is_fat32)?,
            boot_signature,
        })
    }

    pub fn write(&self, sector: &mut GenericArray<u8, U512>, is_fat32: bool) {
        let raw = sector.as_mut_slice();
        raw[3..11].copy_from_slice(&self.oem_name);
        self.bpb.write(raw, is_fat32);
        raw[0x1FE..0x200].copy_from_slice(&self.boot_signature.to_le_bytes());
    }

    pub fn starting_fat_sector(&self) -> u32 {
        (self.bpb.num_reserved_logical_sectors as u32) + self.bpb.hidden_preceding_sectors
    }
}

/// FAT32 Extended BIOS Parameter Block (DOS 2.0 BPB + DOS 3.31 BPB +
/// FAT32 extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    /// Bytes per logical sector, a power of two (min 512).
    // Offset: 0x00B
    pub bytes_per_logical_sector: u16,

    /// Logical sectors per cluster; a power of two in 1..=128.
    // Offset: 0x00D
    pub logical_sectors_per_cluster: u8,

    // Offset: 0x00E
    pub num_reserved_logical_sectors: u16,

    // Offset: 0x010
    pub num_file_alloc_tables: u8,

    /// Root directory entry count; 0 for FAT32.
    // Offset: 0x011
    pub max_root_dir_entries: u16,

    /// 16-bit total sector count; 0 when the volume needs the 32-bit
    /// field below.
    // Offset: 0x013
    pub total_logical_sectors: u16,

    // Offset: 0x015
    pub media_descriptor: u8,

    /// Sectors per FAT for FAT12/16; 0 for FAT32 (see
    /// `logical_sectors_per_fat_extended`).
    // Offset: 0x016
    pub logical_sectors_per_fat: u16,

    // Offset: 0x018
    pub phys_sectors_per_track: u16,

    // Offset: 0x01A
    pub num_heads: u16,

    /// Sectors preceding this partition (0 on unpartitioned media).
    // Offset: 0x01C
    pub hidden_preceding_sectors: u32,

    /// 32-bit total sector count, used when `total_logical_sectors == 0`.
    // Offset: 0x020
    pub total_logical_sectors_extended: u32,

    /// FAT32 only: sectors per FAT.
    // Offset: 0x024
    pub logical_sectors_per_fat_extended: u32,

    /// Bits 0-3: active FAT number if bit 7 set. Bit 7 clear means all
    /// FATs are mirrored (the core requires this — spec §6).
    // Offset: 0x028
    pub ext_flags: u16,

    // Offset: 0x02A
    pub version: u16,

    /// Root directory start cluster (FAT32 only).
    // Offset: 0x02C
    pub root_dir_cluster_num: u32,

    /// FSInfo sector number, relative to the volume start (FAT32 only).
    // Offset: 0x030
    pub fs_info_logical_sector_num: u16,

    // Offset: 0x032
    pub boot_sector_backup_logical_sector_start_num: u16,

    /// Offset: 0x040 (FAT32) / 0x024 (FAT12/16) — physical drive
    /// number; the byte immediately following carries the dirty flag.
    pub phys_drive_number: u8,

    /// The persisted dirty flag (`FAT_WRITE_IN_PROGRESS` bit), read
    /// from the reserved byte immediately after `phys_drive_number`
    /// (0x41 for FAT32, 0x25 for FAT12/16 — spec §4.4 "Dirty flag").
    pub dirty_flag_byte: u8,

    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub file_system_type: [u8; 8],
}

const DIRTY_FLAG_BIT: u8 = 0x01;

/// `logical_sectors_per_fat_extended` and the FAT32-only fields that
/// follow it (ext_flags, version, root cluster, FSInfo sector, backup
/// boot sector) only exist at offset 0x024 onward for FAT32; FAT12/16
/// instead has its short EBPB (drive number, dirty flag, boot sig, vol
/// id, vol label, fs type) starting there. The two layouts are mutually
/// exclusive, so `read`/`write` branch on `is_fat32` up front rather
/// than using one fixed offset table.
impl BiosParameterBlock {
    pub fn read(raw: &[u8], is_fat32: bool) -> FsResult<Self> {
        macro_rules! e {
            ($ty:ty, $offset:literal) => {
                <$ty>::from_le_bytes(raw[$offset..$offset + core::mem::size_of::<$ty>()].try_into().unwrap())
            };
        }

        let bytes_per_logical_sector: u16 = e!(u16, 0x00B);
        if bytes_per_logical_sector == 0 || !bytes_per_logical_sector.is_power_of_two() {
            return Err(FsError::InvalidFsFormat);
        }
        let logical_sectors_per_cluster: u8 = e!(u8, 0x00D);
        if logical_sectors_per_cluster == 0 || !logical_sectors_per_cluster.is_power_of_two() {
            return Err(FsError::InvalidFsFormat);
        }

        let (
            logical_sectors_per_fat_extended,
            ext_flags,
            version,
            root_dir_cluster_num,
            fs_info_logical_sector_num,
            boot_sector_backup_logical_sector_start_num,
            phys_drive_number,
            dirty_flag_byte,
            volume_id,
            volume_label,
            file_system_type,
        ) = if is_fat32 {
            (
                e!(u32, 0x024),
                e!(u16, 0x028),
                e!(u16, 0x02A),
                e!(u32, 0x02C),
                e!(u16, 0x030),
                e!(u16, 0x032),
                raw[0x040],
                raw[0x041],
                e!(u32, 0x043),
                raw[0x047..0x052].try_into().unwrap(),
                raw[0x052..0x05A].try_into().unwrap(),
            )
        } else {
            (
                0,
                0,
                0,
                0,
                0,
                0,
                raw[0x024],
                raw[0x025],
                e!(u32, 0x027),
                raw[0x02B..0x036].try_into().unwrap(),
                raw[0x036..0x03E].try_into().unwrap(),
            )
        };

        Ok(Self {
            bytes_per_logical_sector,
            logical_sectors_per_cluster,
            num_reserved_logical_sectors: e!(u16, 0x00E),
            num_file_alloc_tables: e!(u8, 0x010),
            max_root_dir_entries: e!(u16, 0x011),
            total_logical_sectors: e!(u16, 0x013),
            media_descriptor: e!(u8, 0x015),
            logical_sectors_per_fat: e!(u16, 0x016),
            phys_sectors_per_track: e!(u16, 0x018),
            num_heads: e!(u16, 0x01A),
            hidden_preceding_sectors: e!(u32, 0x01C),
            total_logical_sectors_extended: e!(u32, 0x020),
            logical_sectors_per_fat_extended,
            ext_flags,
            version,
            root_dir_cluster_num,
            fs_info_logical_sector_num,
            boot_sector_backup_logical_sector_start_num,
            phys_drive_number,
            dirty_flag_byte,
            volume_id,
            volume_label,
            file_system_type,
        })
    }

    pub fn write(&self, raw: &mut [u8], is_fat32: bool) {
        macro_rules! w {
            ($offset:literal, $v:expr) => {
                raw[$offset..$offset + core::mem::size_of_val(&$v)].copy_from_slice(&$v.to_le_bytes())
            };
        }

        w!(0x00B, self.bytes_per_logical_sector);
        raw[0x00D] = self.logical_sectors_per_cluster;
        w!(0x00E, self.num_reserved_logical_sectors);
        raw[0x010] = self.num_file_alloc_tables;
        w!(0x011, self.max_root_dir_entries);
        w!(0x013, self.total_logical_sectors);
        raw[0x015] = self.media_descriptor;
        w!(0x016, self.logical_sectors_per_fat);
        w!(0x018, self.phys_sectors_per_track);
        w!(0x01A, self.num_heads);
        w!(0x01C, self.hidden_preceding_sectors);
        w!(0x020, self.total_logical_sectors_extended);

        if is_fat32 {
            w!(0x024, self.logical_sectors_per_fat_extended);
            w!(0x028, self.ext_flags);
            w!(0x02A, self.version);
            w!(0x02C, self.root_dir_cluster_num);
            w!(0x030, self.fs_info_logical_sector_num);
            w!(0x032, self.boot_sector_backup_logical_sector_start_num);
            raw[0x040] = self.phys_drive_number;
            raw[0x041] = self.dirty_flag_byte;
            raw[0x043..0x047].copy_from_slice(&self.volume_id.to_le_bytes());
            raw[0x047..0x052].copy_from_slice(&self.volume_label);
            raw[0x052..0x05A].copy_from_slice(&self.file_system_type);
        } else {
            raw[0x024] = self.phys_drive_number;
            raw[0x025] = self.dirty_flag_byte;
            raw[0x027..0x02B].copy_from_slice(&self.volume_id.to_le_bytes());
            raw[0x02B..0x036].copy_from_slice(&self.volume_label);
            raw[0x036..0x03E].copy_from_slice(&self.file_system_type);
        }
    }

    /// Requires second-AT mirroring (spec §6: "the core requires
    /// mirroring behaviour, rejecting the volume on mismatch").
    pub fn requires_mirroring(&self) -> bool {
        self.ext_flags & 0x0080 == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_flag_byte & DIRTY_FLAG_BIT != 0
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        if dirty {
            self.dirty_flag_byte |= DIRTY_FLAG_BIT;
        } else {
            self.dirty_flag_byte &= !DIRTY_FLAG_BIT;
        }
    }
}
