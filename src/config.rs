//! The `Config` struct consolidates the original sources' dense tree of
//! compile-time flags (test hooks, deinit, journal, FSInfo, read-cache,
//! free-cluster-cache, compatibility modes — spec §9) into one struct
//! threaded through the `FileSystem` context. Most knobs are runtime
//! toggles that are unconditionally compiled in but cheap to check; the
//! genuinely costly ones (free-cluster cache, sector read-cache) are
//! additionally gated by Cargo features so they can be compiled out
//! entirely on the smallest targets.

/// Bus-width policy bits shared by the NOR and NAND physical layers
/// (spec §4.2 "Bus width selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWidthPolicy {
    pub allow_2bit: bool,
    pub allow_4bit: bool,
    pub allow_octal: bool,
    pub allow_dtr: bool,
}

impl Default for BusWidthPolicy {
    fn default() -> Self {
        Self { allow_2bit: true, allow_4bit: true, allow_octal: false, allow_dtr: false }
    }
}

/// Runtime-toggleable knobs (spec §6 "Configuration knobs").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Maximum logical sector size the core will negotiate (power of two,
    /// default 512).
    pub max_sector_size: u32,
    /// Whether the FAT32/FAT16 dirty flag is maintained on mount/unmount.
    pub update_dirty_flag: bool,
    /// Whether the FAT32 FSInfo sector is consulted/maintained.
    pub use_fs_info: bool,
    /// Whether the second FAT copy is kept in sync (spec §4.4
    /// "MaintainFATCopy").
    pub maintain_fat_copy: bool,
    /// Whether moving/renaming read-only files is permitted.
    pub permit_move_of_read_only_files: bool,
    /// Whether free-sector hints are forwarded to the physical layer on
    /// cluster free (spec §4.4).
    pub report_free_sectors: bool,
    /// Bus-width policy for the NOR physical layer.
    pub nor_bus_width: BusWidthPolicy,
    /// Bus-width policy for the serial NAND physical layer.
    pub nand_bus_width: BusWidthPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sector_size: 512,
            update_dirty_flag: true,
            use_fs_info: true,
            maintain_fat_copy: true,
            permit_move_of_read_only_files: false,
            report_free_sectors: false,
            nor_bus_width: BusWidthPolicy::default(),
            nand_bus_width: BusWidthPolicy::default(),
        }
    }
}

/// Global locking model selector (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockingModel {
    /// A single process-wide recursive lock protects the whole file
    /// system. Simplest, and the default.
    Api,
    /// A per-volume lock allows concurrent operations on distinct
    /// volumes.
    Driver,
}

impl Default for LockingModel {
    fn default() -> Self {
        LockingModel::Api
    }
}
