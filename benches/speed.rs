//! A read benchmark that tries to measure read speed.

extern crate criterion;

use criterion::{
    BenchmarkId, Criterion, Throughput, PlotConfiguration, AxisScale,
    criterion_group,
};

use emfs::{
    gpt::Gpt,
    storage::FileBackedStorage,
    volume::FileSystem,
    fat::dir::{self, ShortName},
    fat::file::{AccessFlags, FileHandle, FileObject},
    Config,
};

const FILES: &[(&str, usize)] = &[
    ("1K.TXT", 1024),
    ("100K.TXT", 102_400),
    ("5M.TXT", 5_242_880),
];

const IMG_FILE_PATH: &str = "assets/disk.img";

fn bench_read_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("read speed");

    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    group.plot_config(plot_config);

    let mut s = FileBackedStorage::from_file(IMG_FILE_PATH, 512).unwrap();
    let g = Gpt::read_gpt(&mut s).unwrap();
    let p = g.get_partition_entry(&mut s, 0).unwrap();
    let (first_lba, last_lba) = p.lba_range();

    let mut fs: FileSystem<1, 16, 512> = FileSystem::new(Config::default());
    let vol = fs.add_device(first_lba as u32, (last_lba - first_lba + 1) as u32).unwrap();
    fs.mount(vol, &mut s).unwrap();

    for (name, file_size) in FILES.iter() {
        let mut view = fs.view(vol, &mut s).unwrap();
        let info = fs.fat_info(vol).unwrap();

        let short_name = ShortName::from_str(name).unwrap();
        let mut scratch = generic_array::GenericArray::default();
        let (_, entry) = dir::find_dir_entry(
            info,
            &mut view,
            &mut scratch,
            info.root_dir_location(),
            &short_name,
        )
        .unwrap()
        .expect("benchmark fixture file missing from disk image");

        group.throughput(Throughput::Bytes(*file_size as u64));

        group.bench_with_input(BenchmarkId::new("file read speed", file_size), &entry, |b, entry| {
            b.iter(|| {
                let mut view = fs.view(vol, &mut s).unwrap();
                let info = fs.fat_info(vol).unwrap();

                let mut file = FileObject::from_dir_entry(entry, 0, 0);
                let mut handle = FileHandle::open(AccessFlags::READ);

                let mut buf = [0u8; 512];
                let mut checksum: u64 = 0;
                loop {
                    let n = handle.read(&mut file, info, &mut view, &mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    for byte in &buf[..n] {
                        checksum = checksum.wrapping_add(*byte as u64);
                    }
                }

                if checksum % 56789 == 6 {
                    println!("{}", checksum & 7);
                }
            })
        });
    }
}

criterion_group!(benches, bench_read_speed);

fn main() {
    std::thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(|| {
            benches();

            Criterion::default().configure_from_args().final_summary();
        })
        .unwrap()
        .join()
        .unwrap();
}
