//! NOR device identification and the heterogeneous sector/block topology
//! (spec §3 "NorPhy device state", §4.2 "Identification protocol" and
//! "Sector topology").

use crate::error::{FsError, FsResult};

/// One physically distinct erase unit in the device's layout: a run of
/// `count` same-sized blocks of `size` bytes each, starting at `offset`
/// (spec: "heterogeneous sector topology" — many NOR parts mix small
/// parameter sectors at the bottom with large blocks above).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorBlock {
    pub offset: u32,
    pub size: u32,
    pub count: u32,
}

impl SectorBlock {
    pub fn total_bytes(&self) -> u32 {
        self.size * self.count
    }

    pub fn end_offset(&self) -> u32 {
        self.offset + self.total_bytes()
    }
}

/// Static parameters for one known device, read from an SFDP table or a
/// hard-coded vendor/device-id table entry (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParams {
    pub total_size: u32,
    pub page_size: u32,
    /// Erase granularity supported, smallest first; `erase_sector` picks
    /// the coarsest one that evenly covers the requested range.
    pub erase_size_small: u32,
    pub erase_size_large: u32,
    pub max_write_bus_width: super::hw::BusWidth,
    pub max_read_bus_width: super::hw::BusWidth,
    pub supports_dtr: bool,
    pub num_dies: u8,
}

/// One entry in the built-in vendor/device table, used when a part has
/// no usable SFDP table (or SFDP parsing is disabled).
#[derive(Debug, Clone, Copy)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    pub manufacturer_id: u8,
    pub device_id: [u8; 2],
    pub params: DeviceParams,
}

impl DeviceDescriptor {
    /// Whether `id_bytes` (the raw RDID/JEDEC-ID response, manufacturer
    /// byte first) identifies this device.
    pub fn identify(&self, id_bytes: &[u8]) -> bool {
        id_bytes.len() >= 3
            && id_bytes[0] == self.manufacturer_id
            && id_bytes[1] == self.device_id[0]
            && id_bytes[2] == self.device_id[1]
    }
}

/// A small built-in table of common parts, used as a fallback when SFDP
/// parsing fails or is unavailable. Not exhaustive; real deployments are
/// expected to extend this via their own `DeviceDescriptor` list.
pub const BUILTIN_DEVICES: &[DeviceDescriptor] = &[
    DeviceDescriptor {
        name: "generic-quad-nor",
        manufacturer_id: 0xEF, // Winbond
        device_id: [0x40, 0x18],
        params: DeviceParams {
            total_size: 16 * 1024 * 1024,
            page_size: 256,
            erase_size_small: 4 * 1024,
            erase_size_large: 64 * 1024,
            max_write_bus_width: super::hw::BusWidth::QUAD_OUT,
            max_read_bus_width: super::hw::BusWidth::QUAD_IO,
            supports_dtr: false,
            num_dies: 1,
        },
    },
];

pub fn identify(id_bytes: &[u8]) -> FsResult<DeviceParams> {
    BUILTIN_DEVICES
        .iter()
        .find(|d| d.identify(id_bytes))
        .map(|d| d.params)
        .ok_or(FsError::InvalidFsType)
}
