//! emFile-core: FAT allocation/directory layer, universal NAND physical
//! layer, and serial/quad NOR physical layer for resource-constrained
//! devices talking to raw flash.
//!
//! The three subsystems are layered as:
//!
//! ```text
//! fat ──▶ storage::SectorBuffer ──▶ nand::NandPhy | nor::NorPhy ──▶ HW layer
//! ```
//!
//! Everything below the HW layer (wire bit-banging), OS locking
//! primitives, and memory-pool policy are external collaborators; this
//! crate only specifies the contracts it expects of them.

// Mark the crate as no_std if the feature is enabled (and only)
#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

// Gotta do this since we're a staticlib:
// (it'd be nicer to be able to use `panic_halt` or its ilk, but alas)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(not(feature = "no_std"))]$i)*) }

#[cfg(feature = "bindings")]
pub mod bindings;

pub mod mutex;
pub mod config;
pub mod error;
pub mod util;
pub mod storage;
pub mod nor;
pub mod nand;
pub mod fat;
pub mod volume;
pub mod gpt;

pub use config::Config;
pub use error::FsError;
pub use storage::Storage;
pub use volume::{FileSystem, Volume};
