// Requires the `no_std` feature to be disabled so that `File`s implement the
// `Storage` trait.
//
// Run with --no-default-features.

use emfs::storage::{FileBackedStorage, Storage};

const FILE_PATH: &str = "assets/gpt.img";

const SD_CARD_PATH: &str = "/dev/mmcblk0";
const SD_CARD_SIZE: u64 = 31_449_088;

fn read_sector_one(mut storage: FileBackedStorage) {
    let mut sector = [0u8; 512];
    storage.read_sector(0, &mut sector).unwrap();

    let mut checksum: u64 = 0;
    for byte in sector.iter() {
        checksum = checksum.wrapping_add(*byte as u64);
    }

    // Should fail! (placeholder image isn't all zero bytes)
    assert_eq!(0, checksum);
}

#[test]
fn file() {
    read_sector_one(FileBackedStorage::from_file(FILE_PATH, 512).unwrap())
}

#[test]
fn card() {
    read_sector_one(FileBackedStorage::from_file_with_explicit_size(SD_CARD_PATH, 512, SD_CARD_SIZE).unwrap())
}
