//! Vendor/device identification fallback and the parameters derived
//! from it (spec §4.3 "Identification protocol" — ONFI first, vendor id
//! table as fallback for pre-ONFI and SPI NAND parts). Grounded in the
//! manufacturer-id table (`MFG_ID_MICRON`, `MFG_ID_GIGADEVICE`, ...) and
//! `_Identify` in `FS_NAND_PHY_ONFI.c`.

use crate::error::{FsError, FsResult};

pub const MFG_ID_MICRON: u8 = 0x2C;
pub const MFG_ID_GIGADEVICE: u8 = 0xC8;
pub const MFG_ID_ISSI: u8 = 0xC8; // ISSI and GigaDevice share this prefix; disambiguated by device id.
pub const MFG_ID_TOSHIBA: u8 = 0x98;
pub const MFG_ID_WINBOND: u8 = 0xEF;

/// Which vendor family a device belongs to, driving which
/// [`super::spare_area::SpareAreaTranslation`] applies (spec §4.3
/// "Spare-area relocation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Micron,
    GigaDevice,
    Issi,
    Generic,
}

/// Device-wide geometry parameters, populated either from a validated
/// ONFI parameter page ([`super::onfi::OnfiParams`]) or this fallback
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParams {
    pub vendor: Vendor,
    pub bytes_per_page: u32,
    pub bytes_per_spare_area: u16,
    pub pages_per_block: u32,
    pub blocks_per_lun: u32,
    pub num_luns: u8,
    pub num_planes: u8,
    pub num_bits_ecc_correctable: u8,
    pub is_ecc_enabled_perm: bool,
}

impl DeviceParams {
    pub fn from_onfi(p: super::onfi::OnfiParams, vendor: Vendor) -> Self {
        Self {
            vendor,
            bytes_per_page: p.bytes_per_page,
            bytes_per_spare_area: p.bytes_per_spare_area,
            pages_per_block: p.pages_per_block,
            blocks_per_lun: p.blocks_per_lun,
            num_luns: p.num_luns,
            num_planes: 1,
            num_bits_ecc_correctable: p.num_bits_ecc_correctable,
            is_ecc_enabled_perm: false,
        }
    }
}

pub fn vendor_from_id(mfg_id: u8) -> Vendor {
    match mfg_id {
        MFG_ID_MICRON => Vendor::Micron,
        MFG_ID_GIGADEVICE => Vendor::GigaDevice,
        MFG_ID_TOSHIBA | MFG_ID_WINBOND => Vendor::Generic,
        _ => Vendor::Generic,
    }
}

/// Fallback geometry for devices that do not expose an ONFI parameter
/// page at all (legacy parallel NAND); a small built-in table,
/// extendable by the application the same way the original's
/// `FS_NAND_PHY_ONFI_DEVICE_LIST` is.
pub fn identify_legacy(id_bytes: &[u8]) -> FsResult<DeviceParams> {
    if id_bytes.len() < 2 {
        return Err(FsError::InvalidParameter);
    }
    let vendor = vendor_from_id(id_bytes[0]);
    match (id_bytes[0], id_bytes[1]) {
        (MFG_ID_MICRON, 0xDA) => Ok(DeviceParams {
            vendor,
            bytes_per_page: 2048,
            bytes_per_spare_area: 64,
            pages_per_block: 64,
            blocks_per_lun: 1024,
            num_luns: 1,
            num_planes: 2,
            num_bits_ecc_correctable: 4,
            is_ecc_enabled_perm: false,
        }),
        _ => Err(FsError::InvalidFsType),
    }
}
