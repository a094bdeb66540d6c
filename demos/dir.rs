// Requires the `no_std` feature to be disabled so that `File`s implement the
// `Storage` trait.
//
// Run with --no-default-features.

use emfs::gpt::Gpt;
use emfs::storage::FileBackedStorage;
use emfs::volume::FileSystem;
use emfs::fat::dir::DirIter;
use emfs::Config;

use generic_array::GenericArray;
use typenum::consts::U512;

const SD_CARD_PATH: &str = "/dev/mmcblk0";
const SD_CARD_SIZE: u64 = 31_449_088;

fn main() {
    let mut s = FileBackedStorage::from_file_with_explicit_size(SD_CARD_PATH, 512, SD_CARD_SIZE).unwrap();

    let g = Gpt::read_gpt(&mut s).unwrap();
    let p = g.get_partition_entry(&mut s, 0).unwrap();
    let (first_lba, last_lba) = p.lba_range();

    let mut fs: FileSystem<1, 8, 512> = FileSystem::new(Config::default());
    let vol = fs.add_device(first_lba as u32, (last_lba - first_lba + 1) as u32).unwrap();
    fs.mount(vol, &mut s).unwrap();

    let mut view = fs.view(vol, &mut s).unwrap();
    let info = fs.fat_info(vol).unwrap();

    let mut sector: GenericArray<u8, U512> = GenericArray::default();
    let mut iter = DirIter::new(info.root_dir_location());

    while let Some(entry) = iter.next(info, &mut view, &mut sector).unwrap() {
        println!("{:?}", entry);
    }
}
