//! Serial/quad NOR physical layer (spec §4.2).
//!
//! `NorPhy` turns `(offset, length)` reads/writes/erases into command
//! sequences over the HW layer; identifies the device; picks the optimal
//! transfer width; maps the device into the MCU address space when
//! supported.

pub mod hw;
pub mod device;
pub mod sfdp;
pub mod phy;

pub use hw::{BusWidth, HwLayer, PollParams};
pub use device::{DeviceDescriptor, DeviceParams, SectorBlock};
pub use phy::NorPhy;
