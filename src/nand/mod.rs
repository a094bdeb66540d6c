//! Universal NAND physical layer (spec §4.3).
//!
//! `NandPhy` identifies the attached device (ONFI parameter page or a
//! vendor id table), applies the vendor's spare-area byte layout to
//! relocate bad-block markers and ECC bytes out of the data area, and
//! turns `Storage` sector reads/writes into page-level operations with
//! optional HW ECC and plane-aware internal page copy.

pub mod hw;
pub mod onfi;
pub mod device;
pub mod spare_area;
pub mod phy;

pub use hw::{HwLayer, EccResult};
pub use device::DeviceParams;
pub use spare_area::{CompatibilityMode, PagePosition, SpareAreaLayout, SpareAreaTranslation};
pub use phy::NandPhy;
