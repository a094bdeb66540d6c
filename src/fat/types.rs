//! Newtype wrappers and small enums shared across the `fat` module.

macro_rules! newtype {
    ([$m:ident] $name:tt: $inner:ty $(where constructor = $c:ident)?) => {
        #[doc(hidden)]
        #[allow(non_snake_case)]
        pub mod $m {
            use core::ops::{Deref, DerefMut};

            #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
            #[repr(transparent)]
            #[doc(hidden)]
            pub struct Newtype<Inner>(pub(in super) Inner);

            impl<Inner> Deref for Newtype<Inner> {
                type Target = Inner;

                #[inline]
                fn deref(&self) -> &Inner { &self.0 }
            }

            impl<Inner> DerefMut for Newtype<Inner> {
                #[inline]
                fn deref_mut(&mut self) -> &mut Inner { &mut self.0 }
            }
        }

        pub type $name = $m::Newtype<$inner>;

        impl $name {
            pub fn inner(&self) -> &$inner { &**self }
        }

        $(
            impl $name {
                pub const fn $c(inner: $inner) -> Self {
                    Self(inner)
                }
            }
        )?
    };
}

newtype! { [_s] SectorIdx: u32 where constructor = new }
newtype! { [_c] ClusterId: u32 where constructor = new }

impl SectorIdx {
    pub fn idx(&self) -> usize {
        self.0 as usize
    }
}

impl ClusterId {
    pub fn idx(&self) -> usize {
        self.0 as usize
    }
}

/// First valid cluster id; clusters 0 and 1 are reserved (spec §3
/// "Cluster id space").
pub const FIRST_CLUSTER: u32 = 2;

/// The three on-disk FAT variants, derived from cluster count using the
/// standard thresholds (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    pub fn from_cluster_count(num_clusters: u32) -> Self {
        if num_clusters < 4085 {
            FatType::Fat12
        } else if num_clusters < 65525 {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// The smallest cluster id value meaning "end of chain" for this
    /// type (spec §3).
    pub fn end_of_chain_min(self) -> u32 {
        match self {
            FatType::Fat12 => 0xFF8,
            FatType::Fat16 => 0xFFF8,
            FatType::Fat32 => 0x0FFF_FFF8,
        }
    }

    pub fn is_end_of_chain(self, value: u32) -> bool {
        value >= self.end_of_chain_min()
    }

    /// The value mask applied to an entry (FAT32 reserves its top 4
    /// bits).
    pub fn value_mask(self) -> u32 {
        match self {
            FatType::Fat12 => 0x0FFF,
            FatType::Fat16 => 0xFFFF,
            FatType::Fat32 => 0x0FFF_FFFF,
        }
    }

    pub fn end_of_chain_marker(self) -> u32 {
        self.value_mask()
    }
}

/// Which pages in a block carry the factory bad-block marker and in
/// which area (spec §4.3 "Derived parameters"); lives here rather than
/// in `nand` because only the FAT-level bad-block scan (via
/// `Storage::free_sectors`/format-time scan) consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadBlockMarkingType {
    /// First page, spare area.
    Fps,
    /// First and second page, spare area.
    Fsps,
    /// First and last page, main area.
    Flpms,
    /// First and second page, spare area (alternate offset).
    Fslps,
}
