//! The FAT32 FSInfo sector (spec §4.4, §6). Caches `NumFreeClusters`
//! and `NextFreeCluster` across mounts; only trusted when the volume's
//! dirty flag was clear at the last mount, since an unclean shutdown
//! may have left it stale.

use crate::error::{FsError, FsResult};

use generic_array::GenericArray;
use typenum::consts::U512;

use core::convert::TryInto;

const LEAD_SIGNATURE: u32 = 0x4161_5252;
const STRUCT_SIGNATURE: u32 = 0x6141_7272;
const TRAIL_SIGNATURE: u32 = 0xAA55_0000;

/// Sentinel meaning "unknown, recompute by scan" (spec §4.4).
pub const INVALID_COUNT: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfoSector {
    pub sector_index: u32,
    pub is_present: bool,
    pub is_update_required: bool,
    pub free_cluster_count: u32,
    pub next_free_cluster: u32,
}

impl FsInfoSector {
    pub fn read(raw: &GenericArray<u8, U512>, sector_index: u32, bpb_was_dirty: bool) -> FsResult<Self> {
        let raw = raw.as_slice();
        let lead = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        let structsig = u32::from_le_bytes(raw[484..488].try_into().unwrap());
        let trail = u32::from_le_bytes(raw[508..512].try_into().unwrap());

        if lead != LEAD_SIGNATURE || structsig != STRUCT_SIGNATURE || trail != TRAIL_SIGNATURE {
            return Err(FsError::InvalidFsFormat);
        }

        let (free_cluster_count, next_free_cluster) = if bpb_was_dirty {
            // An unclean shutdown invalidates the cached counts; the
            // caller falls back to a full cluster scan.
            (INVALID_COUNT, INVALID_COUNT)
        } else {
            (
                u32::from_le_bytes(raw[488..492].try_into().unwrap()),
                u32::from_le_bytes(raw[492..496].try_into().unwrap()),
            )
        };

        Ok(Self { sector_index, is_present: true, is_update_required: false, free_cluster_count, next_free_cluster })
    }

    pub fn write(&self, raw: &mut GenericArray<u8, U512>) {
        let raw = raw.as_mut_slice();
        raw[0..4].copy_from_slice(&LEAD_SIGNATURE.to_le_bytes());
        raw[484..488].copy_from_slice(&STRUCT_SIGNATURE.to_le_bytes());
        raw[488..492].copy_from_slice(&self.free_cluster_count.to_le_bytes());
        raw[492..496].copy_from_slice(&self.next_free_cluster.to_le_bytes());
        raw[508..512].copy_from_slice(&TRAIL_SIGNATURE.to_le_bytes());
    }

    /// Invalidates the cached free-cluster count on any allocation or
    /// free (spec §4.4: "the stored free count is invalidated").
    pub fn invalidate_free_count(&mut self) {
        self.free_cluster_count = INVALID_COUNT;
        self.is_update_required = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_raw(free: u32, next: u32) -> GenericArray<u8, U512> {
        let mut raw = GenericArray::default();
        raw.as_mut_slice()[0..4].copy_from_slice(&LEAD_SIGNATURE.to_le_bytes());
        raw.as_mut_slice()[484..488].copy_from_slice(&STRUCT_SIGNATURE.to_le_bytes());
        raw.as_mut_slice()[488..492].copy_from_slice(&free.to_le_bytes());
        raw.as_mut_slice()[492..496].copy_from_slice(&next.to_le_bytes());
        raw.as_mut_slice()[508..512].copy_from_slice(&TRAIL_SIGNATURE.to_le_bytes());
        raw
    }

    #[test]
    fn clean_mount_trusts_cached_counts() {
        let raw = make_raw(10, 100);
        let info = FsInfoSector::read(&raw, 1, false).unwrap();
        assert_eq!(info.free_cluster_count, 10);
        assert_eq!(info.next_free_cluster, 100);
    }

    #[test]
    fn dirty_mount_treats_counts_as_stale() {
        let raw = make_raw(10, 100);
        let info = FsInfoSector::read(&raw, 1, true).unwrap();
        assert_eq!(info.free_cluster_count, INVALID_COUNT);
        assert_eq!(info.next_free_cluster, INVALID_COUNT);
    }

    #[test]
    fn bad_signature_rejected() {
        let mut raw = make_raw(10, 100);
        raw.as_mut_slice()[0] = 0;
        assert!(FsInfoSector::read(&raw, 1, false).is_err());
    }
}
