//! A `std::fs::File`-backed `Storage`, available whenever the crate is
//! built with `no_std` disabled. Grounded in the original sources' test
//! harness, which ran the same FAT/GPT code against a regular file or
//! block device instead of real flash; here it also backs the demos and
//! the read-speed benchmark.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{FsError, FsResult};
use super::Storage;

pub struct FileBackedStorage {
    file: File,
    sector_size: u32,
    sector_count: u32,
}

impl FileBackedStorage {
    /// Opens `path`, sizing `sector_count` off the file's actual length.
    pub fn from_file(path: &str, sector_size: u32) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| FsError::StorageNotReady)?;
        let len = file.metadata().map_err(|_| FsError::StorageNotReady)?.len();
        Ok(Self { file, sector_size, sector_count: (len / sector_size as u64) as u32 })
    }

    /// Opens `path` (typically a block device) with an explicit size,
    /// since devices like `/dev/mmcblk0` don't always report a useful
    /// length through `metadata()`.
    pub fn from_file_with_explicit_size(path: &str, sector_size: u32, size_in_bytes: u64) -> FsResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| FsError::StorageNotReady)?;
        Ok(Self { file, sector_size, sector_count: (size_in_bytes / sector_size as u64) as u32 })
    }
}

impl Storage for FileBackedStorage {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn read_sector(&mut self, sector_idx: u32, buf: &mut [u8]) -> FsResult<()> {
        if sector_idx >= self.sector_count {
            return Err(FsError::InvalidParameter);
        }
        self.file
            .seek(SeekFrom::Start(sector_idx as u64 * self.sector_size as u64))
            .map_err(|_| FsError::ReadFailure)?;
        self.file
            .read_exact(&mut buf[..self.sector_size as usize])
            .map_err(|_| FsError::ReadFailure)
    }

    fn write_sector(&mut self, sector_idx: u32, buf: &[u8]) -> FsResult<()> {
        if sector_idx >= self.sector_count {
            return Err(FsError::InvalidParameter);
        }
        self.file
            .seek(SeekFrom::Start(sector_idx as u64 * self.sector_size as u64))
            .map_err(|_| FsError::WriteFailure)?;
        self.file
            .write_all(&buf[..self.sector_size as usize])
            .map_err(|_| FsError::WriteFailure)
    }
}
