// Requires the `no_std` feature to be disabled so that `File`s implement the
// `Storage` trait.
//
// Run with --no-default-features.

use emfs::gpt::Gpt;
use emfs::storage::FileBackedStorage;

const SD_CARD_PATH: &str = "/dev/mmcblk0";
const SD_CARD_SIZE: u64 = 31_449_088;

fn main() {
    let mut f = FileBackedStorage::from_file_with_explicit_size(SD_CARD_PATH, 512, SD_CARD_SIZE).unwrap();

    let g = Gpt::read_gpt(&mut f).unwrap();
    let p = g.get_partition_entry(&mut f, 0).unwrap();

    println!("{:?}", g);
    println!("{:?}", p);
}
