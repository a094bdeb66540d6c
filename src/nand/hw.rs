//! HW layer contract for NAND (spec §6): row/column addressed
//! command/data primitives, status polling, optional HW ECC control and
//! internal page-copy, grounded in the `NAND_ONFI_INST` function table
//! (`_WriteCmd`/`_WriteAddrRow`/`_WriteAddrCol`/`_ReadData`/`_WriteData`/
//! `_ReadStatus`/`_GetFeatures`/`_SetFeatures`/`pfCopyPage` in
//! `FS_NAND_PHY_ONFI.c`).

use crate::error::FsResult;

/// Outcome of an ECC-protected read: how many bit errors (if any) the
/// controller corrected, or that it could not correct the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EccResult {
    Ok,
    Corrected(u8),
    Uncorrectable,
}

pub trait HwLayer {
    fn reset(&mut self) -> FsResult<()>;

    fn read_id(&mut self, data: &mut [u8]) -> FsResult<()>;

    /// Issues a command byte (e.g. 0x00 read-setup, 0x80 program-setup).
    fn command(&mut self, cmd: u8) -> FsResult<()>;

    fn address_row(&mut self, row: u32, num_bytes: u8) -> FsResult<()>;
    fn address_col(&mut self, col: u32, num_bytes: u8) -> FsResult<()>;

    fn read_data(&mut self, data: &mut [u8]) -> FsResult<()>;
    fn write_data(&mut self, data: &[u8]) -> FsResult<()>;

    /// Reads the page's spare area, continuing the same serial shift
    /// sequence as the preceding `read_data` (the spare area immediately
    /// follows the main data in the page register). The default
    /// forwards to `read_data`; HW layers that address the spare area
    /// separately override this.
    fn read_spare(&mut self, data: &mut [u8]) -> FsResult<()> {
        self.read_data(data)
    }

    /// Writes the page's spare area, continuing the same serial shift
    /// sequence as the preceding `write_data`. The default forwards to
    /// `write_data`.
    fn write_spare(&mut self, data: &[u8]) -> FsResult<()> {
        self.write_data(data)
    }

    fn read_status(&mut self) -> FsResult<u8>;

    /// Blocks until the device's ready/busy line (or the status
    /// register's busy bit) clears.
    fn wait_ready(&mut self) -> FsResult<()>;

    /// GET/SET FEATURES (0xEE/0xEF), used to toggle HW ECC and to
    /// select the active die on multi-die parts.
    fn get_feature(&mut self, addr: u8) -> FsResult<[u8; 4]>;
    fn set_feature(&mut self, addr: u8, data: [u8; 4]) -> FsResult<()>;

    /// Whether this HW layer reports per-read ECC correction counts.
    fn ecc_result(&mut self) -> FsResult<EccResult> {
        Ok(EccResult::Ok)
    }

    /// Issues an internal copy-back program from `page_src` to
    /// `page_dst` without round-tripping the data off-chip. Only valid
    /// within the same plane; callers must check that themselves
    /// (spec §4.3 "Plane-aware page copy").
    fn copy_page(&mut self, _page_src: u32, _page_dst: u32) -> FsResult<()> {
        Err(crate::error::FsError::NotSupported)
    }

    fn supports_copy_page(&self) -> bool {
        false
    }
}
