//! Small, self-contained primitives shared by the FAT/NAND/NOR layers:
//! bitfield access, a fixed-capacity bitmap, endian load/store, an
//! overflow-free `div_mod`, and the CRC-16 used by ONFI parameter pages.

pub mod bits;
pub mod bitmap;
pub mod endian;
pub mod divmod;
pub mod crc16;

pub use bits::Bits;
pub use bitmap::{BitMap, BitMapLen};
pub use divmod::div_mod_u32;
pub use crc16::crc16_onfi;
