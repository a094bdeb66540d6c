//! C bindings for this crate: an `extern "C"` `Storage` implementation
//! (`edisk`) over a vendor-supplied block-device driver, in the style of
//! the classic `diskio.c` shim other FAT implementations ship.

use crate::error::FsError;
use crate::storage::Storage;

#[no_mangle]
pub extern "C" fn emfs_new_edisk_storage(drive_num: u8, size_in_sectors: u64) -> edisk::EDiskStorage {
    edisk::EDiskStorage { drive_num, size_in_sectors }
}

/// Sums one sector's bytes; a minimal smoke test callable from C to
/// confirm the FFI boundary and the `edisk::EDiskStorage` binding work
/// end to end.
#[no_mangle]
pub extern "C" fn emfs_sector_checksum(storage: &mut edisk::EDiskStorage, sector_num: u32) -> u64 {
    if sector_num >= storage.sector_count() {
        return 0;
    }

    let mut sector = [0u8; 512];
    if storage.read_sector(sector_num, &mut sector).is_err() {
        return 0;
    }

    sector.iter().fold(0u64, |acc, &b| acc.wrapping_add(b as u64))
}

pub mod edisk {
    use super::{FsError, Storage};
    use crate::error::FsResult;

    #[repr(C)]
    pub struct EDiskStorage {
        pub drive_num: u8,
        pub size_in_sectors: u64,
    }

    /// Mirrors the classic `DRESULT` status codes a vendor block driver
    /// returns.
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum DResult {
        ResOk = 0,
        ResError = 1,
        ResWrPrt = 2,
        ResNotRdy = 3,
        ResParErr = 4,
    }

    impl DResult {
        fn into_read_result(self) -> FsResult<()> {
            match self {
                DResult::ResOk => Ok(()),
                DResult::ResNotRdy => Err(FsError::StorageNotReady),
                DResult::ResParErr => Err(FsError::InvalidParameter),
                DResult::ResWrPrt | DResult::ResError => Err(FsError::ReadFailure),
            }
        }

        fn into_write_result(self) -> FsResult<()> {
            match self {
                DResult::ResOk => Ok(()),
                DResult::ResNotRdy => Err(FsError::StorageNotReady),
                DResult::ResParErr => Err(FsError::InvalidParameter),
                DResult::ResWrPrt | DResult::ResError => Err(FsError::WriteFailure),
            }
        }
    }

    extern "C" {
        fn eDisk_Read(drv: u8, buff: *mut u8, sector: u32, count: u32) -> DResult;
        fn eDisk_Write(drv: u8, buff: *const u8, sector: u32, count: u32) -> DResult;
    }

    impl Storage for EDiskStorage {
        fn sector_size(&self) -> u32 {
            512
        }

        fn sector_count(&self) -> u32 {
            self.size_in_sectors as u32
        }

        fn read_sector(&mut self, sector_idx: u32, buf: &mut [u8]) -> FsResult<()> {
            if (sector_idx as u64) >= self.size_in_sectors {
                return Err(FsError::InvalidParameter);
            }
            unsafe { eDisk_Read(self.drive_num, buf.as_mut_ptr(), sector_idx, 1) }.into_read_result()
        }

        fn write_sector(&mut self, sector_idx: u32, buf: &[u8]) -> FsResult<()> {
            if (sector_idx as u64) >= self.size_in_sectors {
                return Err(FsError::InvalidParameter);
            }
            unsafe { eDisk_Write(self.drive_num, buf.as_ptr(), sector_idx, 1) }.into_write_result()
        }
    }
}
