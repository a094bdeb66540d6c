//! `NandPhy`: the universal NAND physical layer driver (spec §4.3).
//!
//! Presents pages as `Storage` sectors (one sector == one page, spare
//! area handled internally), picks the vendor spare-area translation at
//! identification time, and restricts internal page-copy to same-plane
//! transfers with HW ECC enabled — matching `_IsSamePlane` /
//! `pfCopyPage` gating in `FS_NAND_PHY_ONFI.c`.

use crate::error::{FsError, FsResult};
use crate::storage::Storage;
use super::device::DeviceParams;
use super::hw::{EccResult, HwLayer};
use super::spare_area::{PagePosition, SpareAreaTranslation};

const CMD_READ_SETUP: u8 = 0x00;
const CMD_READ_CONFIRM: u8 = 0x30;
const CMD_PROGRAM_SETUP: u8 = 0x80;
const CMD_PROGRAM_CONFIRM: u8 = 0x10;
const CMD_ERASE_SETUP: u8 = 0x60;
const CMD_ERASE_CONFIRM: u8 = 0xD0;
const CMD_READ_ID: u8 = 0x90;

const FEAT_ADDR_ECC: u8 = 0x90;
const FEAT_ECC_ENABLE_MASK: u8 = 0x08;
const FEAT_ADDR_DIE_SELECT: u8 = 0xD0;

/// Which die on a multi-LUN device is currently selected; reads/writes
/// crossing a die boundary must reselect first (spec §4.3 "Die
/// selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct DieState {
    selected: u8,
}

/// Single-entry read cache: the last page read, invalidated on any
/// write/erase/die-switch (spec §4.3 "Read-cache").
struct ReadCache {
    page: Option<u32>,
    ecc_enabled: bool,
}

pub struct NandPhy<H: HwLayer, S: SpareAreaTranslation> {
    hw: H,
    params: DeviceParams,
    spare: S,
    die: DieState,
    ecc_enabled: bool,
    cache: ReadCache,
}

impl<H: HwLayer, S: SpareAreaTranslation> NandPhy<H, S> {
    pub fn new(hw: H, params: DeviceParams, spare: S) -> Self {
        Self {
            hw,
            params,
            spare,
            die: DieState::default(),
            ecc_enabled: !params.is_ecc_enabled_perm,
            cache: ReadCache { page: None, ecc_enabled: false },
        }
    }

    fn blocks_per_plane_shift(&self) -> u32 {
        // Matches `_IsSamePlane`'s plane mask: planes are interleaved
        // across blocks, selected by the low bits of the block index.
        self.params.num_planes.max(1).trailing_zeros().max(0)
    }

    /// Whether `page_a` and `page_b` live in the same plane — internal
    /// copy-back is only legal within one plane.
    pub fn is_same_plane(&self, page_a: u32, page_b: u32) -> bool {
        let shift = self.blocks_per_plane_shift();
        if shift == 0 {
            return true;
        }
        let block_a = page_a / self.params.pages_per_block;
        let block_b = page_b / self.params.pages_per_block;
        (block_a & ((1 << shift) - 1)) == (block_b & ((1 << shift) - 1))
    }

    fn blocks_per_plane(&self) -> u32 {
        let num_planes = (self.params.num_planes as u32).max(1);
        (self.params.blocks_per_lun / num_planes).max(1)
    }

    /// Remaps a logical block index so consecutive logical blocks land
    /// on alternating planes (spec §4.3 "Plane awareness"):
    /// `i ↦ ((i & (blocks_per_plane−1)) << 1) | (i >= blocks_per_plane)`.
    /// The `<<1`/binary plane bit only models two-plane parts; devices
    /// reporting any other plane count fall back to identity.
    fn remap_block(&self, logical_block: u32) -> u32 {
        if self.params.num_planes != 2 {
            return logical_block;
        }
        let blocks_per_plane = self.blocks_per_plane();
        let mask = blocks_per_plane - 1;
        ((logical_block & mask) << 1) | u32::from(logical_block >= blocks_per_plane)
    }

    /// Converts a logical page address (as seen by `Storage`) to the
    /// physical page address to issue to the HW layer, applying
    /// [`Self::remap_block`] to the block component.
    fn logical_page_to_physical(&self, page: u32) -> u32 {
        if self.params.pages_per_block == 0 {
            return page;
        }
        let block = page / self.params.pages_per_block;
        let offset = page % self.params.pages_per_block;
        self.remap_block(block) * self.params.pages_per_block + offset
    }

    fn page_to_lun(&self, page: u32) -> u8 {
        let pages_per_lun = self.params.pages_per_block * self.params.blocks_per_lun;
        if pages_per_lun == 0 {
            0
        } else {
            (page / pages_per_lun) as u8
        }
    }

    fn select_die(&mut self, lun: u8) -> FsResult<()> {
        if self.params.num_luns <= 1 || self.die.selected == lun {
            return Ok(());
        }
        self.hw.set_feature(FEAT_ADDR_DIE_SELECT, [lun, 0, 0, 0])?;
        self.die.selected = lun;
        self.cache.page = None;
        Ok(())
    }

    /// Enables or disables the HW ECC engine. A no-op (and reported as
    /// permanently-on) on devices where [`DeviceParams::is_ecc_enabled_perm`]
    /// is set.
    pub fn set_ecc_enabled(&mut self, enabled: bool) -> FsResult<()> {
        if self.params.is_ecc_enabled_perm {
            return if enabled { Ok(()) } else { Err(FsError::NotSupported) };
        }
        let mut feat = self.hw.get_feature(FEAT_ADDR_ECC)?;
        if enabled {
            feat[0] |= FEAT_ECC_ENABLE_MASK;
        } else {
            feat[0] &= !FEAT_ECC_ENABLE_MASK;
        }
        self.hw.set_feature(FEAT_ADDR_ECC, feat)?;
        self.ecc_enabled = enabled;
        Ok(())
    }

    pub fn is_ecc_enabled_perm(&self) -> bool {
        self.params.is_ecc_enabled_perm
    }

    pub fn get_ecc_result(&mut self) -> FsResult<EccResult> {
        self.hw.ecc_result()
    }

    /// Attempts an internal controller-side copy from `page_src` to
    /// `page_dst`. Only legal same-plane and with HW ECC enabled (spec
    /// §4.3 "Plane-aware page copy"); falls back to an off-chip
    /// read/modify/write otherwise, which the caller (the block/wear
    /// layer above this one) is expected to perform itself when this
    /// returns `NotSupported`.
    pub fn copy_page(&mut self, page_src: u32, page_dst: u32) -> FsResult<()> {
        let phys_src = self.logical_page_to_physical(page_src);
        let phys_dst = self.logical_page_to_physical(page_dst);
        if !self.hw.supports_copy_page() || !self.ecc_enabled || !self.is_same_plane(phys_src, phys_dst) {
            return Err(FsError::NotSupported);
        }
        self.hw.copy_page(phys_src, phys_dst)?;
        self.cache.page = None;
        Ok(())
    }

    /// Reads page `page` (a logical address) plus, when `spare` is
    /// non-empty, its spare area. Skips the array-to-register transfer
    /// (step 1 of the two-step page read) when the page is already the
    /// one latched in the device's page register (spec §4.3
    /// "Read-cache optimisation").
    fn read_page_raw(&mut self, page: u32, buf: &mut [u8], spare: &mut [u8]) -> FsResult<()> {
        let physical_page = self.logical_page_to_physical(page);
        let lun = self.page_to_lun(physical_page);
        self.select_die(lun)?;

        let cache_hit = self.cache.page == Some(page) && self.cache.ecc_enabled == self.ecc_enabled;
        if !cache_hit {
            self.hw.command(CMD_READ_SETUP)?;
            self.hw.address_col(0, 2)?;
            self.hw.address_row(physical_page, self.params_row_addr_bytes())?;
            self.hw.command(CMD_READ_CONFIRM)?;
            self.hw.wait_ready()?;
        }
        self.hw.read_data(buf)?;
        if !spare.is_empty() {
            self.hw.read_spare(spare)?;
        }

        self.cache.page = Some(page);
        self.cache.ecc_enabled = self.ecc_enabled;
        Ok(())
    }

    fn params_row_addr_bytes(&self) -> u8 {
        3
    }

    /// Writes page `page` (a logical address) plus, when `spare` is
    /// non-empty, its spare area, in the same program cycle.
    fn write_page_raw(&mut self, page: u32, buf: &[u8], spare: &[u8]) -> FsResult<()> {
        let physical_page = self.logical_page_to_physical(page);
        let lun = self.page_to_lun(physical_page);
        self.select_die(lun)?;

        self.hw.command(CMD_PROGRAM_SETUP)?;
        self.hw.address_col(0, 2)?;
        self.hw.address_row(physical_page, self.params_row_addr_bytes())?;
        self.hw.write_data(buf)?;
        if !spare.is_empty() {
            self.hw.write_spare(spare)?;
        }
        self.hw.command(CMD_PROGRAM_CONFIRM)?;
        self.hw.wait_ready()?;

        let status = self.hw.read_status()?;
        self.cache.page = None;
        if status & 0x01 != 0 {
            return Err(FsError::WriteFailure);
        }
        Ok(())
    }

    fn erase_block(&mut self, block: u32) -> FsResult<()> {
        let physical_block = self.remap_block(block);
        let page = physical_block * self.params.pages_per_block;
        let lun = self.page_to_lun(page);
        self.select_die(lun)?;

        self.hw.command(CMD_ERASE_SETUP)?;
        self.hw.address_row(page, self.params_row_addr_bytes())?;
        self.hw.command(CMD_ERASE_CONFIRM)?;
        self.hw.wait_ready()?;

        let status = self.hw.read_status()?;
        self.cache.page = None;
        if status & 0x01 != 0 {
            return Err(FsError::EraseFailure);
        }
        Ok(())
    }

    /// Identifies the device via READ ID and an ONFI parameter page
    /// read, falling back to the legacy vendor table (spec §4.3).
    pub fn identify(mut hw: H, spare_factory: impl FnOnce(&DeviceParams) -> S) -> FsResult<Self> {
        hw.reset()?;
        let mut id = [0u8; 4];
        hw.read_id(&mut id)?;

        let params = match super::device::identify_legacy(&id) {
            Ok(p) => p,
            Err(_) => {
                let vendor = super::device::vendor_from_id(id[0]);
                let mut page_raw = [0u8; super::onfi::PAGE_SIZE];
                hw.command(CMD_READ_ID)?;
                hw.read_data(&mut page_raw)?;
                let onfi_params = super::onfi::find_valid_copy(&page_raw)?;
                super::device::DeviceParams::from_onfi(onfi_params, vendor)
            }
        };

        let spare = spare_factory(&params);
        Ok(Self::new(hw, params, spare))
    }

    fn page_position(&self, sector_idx: u32) -> PagePosition {
        let pages_per_block = self.params.pages_per_block.max(1);
        PagePosition::of(sector_idx % pages_per_block, pages_per_block)
    }

    /// Reads sector `sector_idx`'s main data and spare area, translating
    /// the spare bytes (and, for vendors that relocate into the main
    /// area, `buf[0]`) from the physical on-device layout to the logical
    /// one (spec §4.3 "Spare-area relocation").
    pub fn read_sector_with_spare(&mut self, sector_idx: u32, buf: &mut [u8], spare: &mut [u8]) -> FsResult<()> {
        if buf.len() != self.params.bytes_per_page as usize {
            return Err(FsError::InvalidParameter);
        }
        let spare_len = (self.params.bytes_per_spare_area as usize).min(spare.len());
        self.read_page_raw(sector_idx, buf, &mut spare[..spare_len])?;
        if self.ecc_enabled && !buf.is_empty() {
            let page_pos = self.page_position(sector_idx);
            self.spare.from_physical(&mut buf[0], &mut spare[..spare_len], page_pos);
        }
        Ok(())
    }

    /// Writes sector `sector_idx`'s main data and spare area, translating
    /// the spare bytes (and `buf[0]` where relevant) from logical to
    /// physical layout before they reach the device.
    pub fn write_sector_with_spare(&mut self, sector_idx: u32, buf: &mut [u8], spare: &mut [u8]) -> FsResult<()> {
        if buf.len() != self.params.bytes_per_page as usize {
            return Err(FsError::InvalidParameter);
        }
        let spare_len = (self.params.bytes_per_spare_area as usize).min(spare.len());
        if self.ecc_enabled && !buf.is_empty() {
            let page_pos = self.page_position(sector_idx);
            self.spare.to_physical(&mut buf[0], &mut spare[..spare_len], page_pos);
        }
        self.write_page_raw(sector_idx, buf, &spare[..spare_len])
    }
}

impl<H: HwLayer, S: SpareAreaTranslation> Storage for NandPhy<H, S> {
    fn sector_size(&self) -> u32 {
        self.params.bytes_per_page
    }

    fn sector_count(&self) -> u32 {
        self.params.pages_per_block * self.params.blocks_per_lun * self.params.num_luns as u32
    }

    fn read_sector(&mut self, sector_idx: u32, buf: &mut [u8]) -> FsResult<()> {
        if buf.len() != self.params.bytes_per_page as usize {
            return Err(FsError::InvalidParameter);
        }
        self.read_page_raw(sector_idx, buf, &mut [])
    }

    fn write_sector(&mut self, sector_idx: u32, buf: &[u8]) -> FsResult<()> {
        if buf.len() != self.params.bytes_per_page as usize {
            return Err(FsError::InvalidParameter);
        }
        self.write_page_raw(sector_idx, buf, &[])
    }

    fn free_sectors(&mut self, sector_idx: u32, count: u32) -> FsResult<()> {
        let first_block = sector_idx / self.params.pages_per_block;
        let last_block = (sector_idx + count.saturating_sub(1)) / self.params.pages_per_block;
        for block in first_block..=last_block {
            self.erase_block(block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::device::Vendor;
    use super::super::spare_area::{CompatibilityMode, MicronLayout};
    use std::vec::Vec;

    fn test_params() -> DeviceParams {
        DeviceParams {
            vendor: Vendor::Micron,
            bytes_per_page: 16,
            bytes_per_spare_area: 16,
            pages_per_block: 4,
            blocks_per_lun: 8,
            num_luns: 1,
            num_planes: 2,
            num_bits_ecc_correctable: 4,
            is_ecc_enabled_perm: false,
        }
    }

    /// A HW layer double holding the device's contents in memory and
    /// logging every command byte issued, so tests can assert on
    /// whether the read-setup sequence was (or wasn't) reissued.
    struct FakeHw {
        pages: Vec<[u8; 16]>,
        spares: Vec<[u8; 16]>,
        log: Vec<u8>,
        last_row: u32,
        feature_ecc: [u8; 4],
    }

    impl FakeHw {
        fn new(num_pages: usize) -> Self {
            Self {
                pages: std::vec![[0u8; 16]; num_pages],
                spares: std::vec![[0u8; 16]; num_pages],
                log: Vec::new(),
                last_row: 0,
                feature_ecc: [FEAT_ECC_ENABLE_MASK, 0, 0, 0],
            }
        }

        fn setup_count(&self) -> usize {
            self.log.iter().filter(|&&c| c == CMD_READ_SETUP).count()
        }
    }

    impl HwLayer for FakeHw {
        fn reset(&mut self) -> FsResult<()> {
            Ok(())
        }
        fn read_id(&mut self, data: &mut [u8]) -> FsResult<()> {
            data.fill(0);
            Ok(())
        }
        fn command(&mut self, cmd: u8) -> FsResult<()> {
            self.log.push(cmd);
            Ok(())
        }
        fn address_row(&mut self, row: u32, _num_bytes: u8) -> FsResult<()> {
            self.last_row = row;
            Ok(())
        }
        fn address_col(&mut self, _col: u32, _num_bytes: u8) -> FsResult<()> {
            Ok(())
        }
        fn read_data(&mut self, data: &mut [u8]) -> FsResult<()> {
            data.copy_from_slice(&self.pages[self.last_row as usize]);
            Ok(())
        }
        fn write_data(&mut self, data: &[u8]) -> FsResult<()> {
            self.pages[self.last_row as usize].copy_from_slice(data);
            Ok(())
        }
        fn read_spare(&mut self, data: &mut [u8]) -> FsResult<()> {
            data.copy_from_slice(&self.spares[self.last_row as usize][..data.len()]);
            Ok(())
        }
        fn write_spare(&mut self, data: &[u8]) -> FsResult<()> {
            self.spares[self.last_row as usize][..data.len()].copy_from_slice(data);
            Ok(())
        }
        fn read_status(&mut self) -> FsResult<u8> {
            Ok(0)
        }
        fn wait_ready(&mut self) -> FsResult<()> {
            Ok(())
        }
        fn get_feature(&mut self, _addr: u8) -> FsResult<[u8; 4]> {
            Ok(self.feature_ecc)
        }
        fn set_feature(&mut self, _addr: u8, data: [u8; 4]) -> FsResult<()> {
            self.feature_ecc = data;
            Ok(())
        }
    }

    #[test]
    fn plane_remap_matches_spec_formula() {
        let phy = NandPhy::new(FakeHw::new(32), test_params(), MicronLayout {
            spare_size: 16,
            bytes_per_stripe: 8,
            mode: CompatibilityMode::NewOnly,
        });
        // blocks_per_lun = 8, num_planes = 2 => blocks_per_plane = 4.
        assert_eq!(phy.remap_block(0), 0);
        assert_eq!(phy.remap_block(1), 2);
        assert_eq!(phy.remap_block(3), 6);
        assert_eq!(phy.remap_block(4), 1);
        assert_eq!(phy.remap_block(5), 3);
        assert_eq!(phy.remap_block(7), 7);
    }

    #[test]
    fn cache_hit_skips_read_setup_sequence() {
        let mut phy = NandPhy::new(FakeHw::new(32), test_params(), MicronLayout {
            spare_size: 16,
            bytes_per_stripe: 8,
            mode: CompatibilityMode::NewOnly,
        });
        let mut buf = [0u8; 16];
        phy.read_sector(0, &mut buf).unwrap();
        assert_eq!(phy.hw.setup_count(), 1);

        phy.read_sector(0, &mut buf).unwrap();
        assert_eq!(phy.hw.setup_count(), 1, "re-reading the cached page must not reissue read-setup");

        phy.read_sector(1, &mut buf).unwrap();
        assert_eq!(phy.hw.setup_count(), 2, "a different page must reissue read-setup");
    }

    #[test]
    fn write_invalidates_read_cache() {
        let mut phy = NandPhy::new(FakeHw::new(32), test_params(), MicronLayout {
            spare_size: 16,
            bytes_per_stripe: 8,
            mode: CompatibilityMode::NewOnly,
        });
        let mut buf = [0u8; 16];
        phy.read_sector(0, &mut buf).unwrap();
        phy.write_sector(0, &buf).unwrap();
        phy.read_sector(0, &mut buf).unwrap();
        assert_eq!(phy.hw.setup_count(), 2, "a write must invalidate the cached page");
    }

    #[test]
    fn micron_stripe_round_trips_through_sector_api() {
        let mut phy = NandPhy::new(FakeHw::new(32), test_params(), MicronLayout {
            spare_size: 16,
            bytes_per_stripe: 8,
            mode: CompatibilityMode::NewOnly,
        });
        phy.set_ecc_enabled(true).unwrap();

        let mut buf = [0xABu8; 16];
        let mut spare = [0u8; 16];
        spare[4..8].copy_from_slice(&[1, 2, 3, 4]);

        phy.write_sector_with_spare(2, &mut buf, &mut spare).unwrap();

        let mut read_buf = [0u8; 16];
        let mut read_spare = [0u8; 16];
        phy.read_sector_with_spare(2, &mut read_buf, &mut read_spare).unwrap();

        assert_eq!(read_buf, [0xABu8; 16]);
        assert_eq!(&read_spare[4..8], &[1, 2, 3, 4]);
    }
}
