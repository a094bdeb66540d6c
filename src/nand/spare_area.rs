//! Vendor-specific spare-area byte layouts (spec §4.3 "Spare-area
//! relocation"): the bad-block marker and user "free" bytes of the
//! spare area are not at the same offset on every vendor's device, so
//! the fixed logical layout this crate presents (`SpareAreaLayout`) has
//! to be translated to/from each vendor's physical layout before a
//! page is written or after it's read.
//!
//! Grounded in `_ISSI_RelocateSpareAreaData`/`_ISSI_CalcUserDataSpareOff`
//! (ISSI interleaves user data between each spare "stripe"),
//! `OFF_USER_DATA_ISSI`, and the Micron `CompatibilityMode` field
//! (`FS_NAND_PHY_SPI.c`).

/// The logical (vendor-independent) spare-area layout this crate
/// exposes to the FAT layer: bad-block marker first, then free bytes
/// the FAT layer may use for its own metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpareAreaLayout {
    pub bad_block_marker_offset: u16,
    pub free_offset: u16,
    pub free_len: u16,
}

/// A page's position within its block. Some vendor translations (the
/// GigaDevice main/spare byte swap) only apply to the first or last
/// page of a block, where the factory bad-block marker lives (spec
/// §4.3, `BadBlockMarkingType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePosition {
    First,
    Last,
    /// A single-page block: both first and last.
    FirstAndLast,
    Middle,
}

impl PagePosition {
    pub fn of(page_in_block: u32, pages_per_block: u32) -> Self {
        let is_first = page_in_block == 0;
        let is_last = pages_per_block == 0 || page_in_block + 1 >= pages_per_block;
        match (is_first, is_last) {
            (true, true) => PagePosition::FirstAndLast,
            (true, false) => PagePosition::First,
            (false, true) => PagePosition::Last,
            (false, false) => PagePosition::Middle,
        }
    }

    pub fn is_boundary(self) -> bool {
        !matches!(self, PagePosition::Middle)
    }
}

/// How a Micron MT29F1G01ABAFD-class device's data in the spare area
/// should be interpreted when both legacy and ONFI-default-compatible
/// data might be present (spec Open Question — decided in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityMode {
    /// Only ever read/write the new (ONFI-default) layout.
    NewOnly,
    /// Read either layout (new preferred), always write the new layout.
    ReadBothWriteNew,
    /// Maintain both layouts on every write (migration aid).
    WriteBoth,
}

impl Default for CompatibilityMode {
    fn default() -> Self {
        CompatibilityMode::NewOnly
    }
}

/// Translates between the logical spare-area layout and a vendor's
/// physical one. `to_physical`/`from_physical` operate on one page's
/// full spare area in place; `main_first_byte` gives access to the
/// first byte of the page's main area for vendors (GigaDevice) whose
/// relocation swaps across the main/spare boundary, and `page_pos`
/// identifies the page's position within its block for vendors whose
/// relocation only applies to boundary pages.
pub trait SpareAreaTranslation {
    fn layout(&self) -> SpareAreaLayout;

    /// Rearranges `spare` (already read off the device) into the
    /// logical layout.
    fn from_physical(&self, main_first_byte: &mut u8, spare: &mut [u8], page_pos: PagePosition);

    /// Rearranges `spare` (logical layout) into the vendor's physical
    /// layout, ready to be written.
    fn to_physical(&self, main_first_byte: &mut u8, spare: &mut [u8], page_pos: PagePosition);
}

/// Generic vendors (Toshiba, Winbond, and any ONFI-compliant default):
/// byte 0 is the bad-block marker, bytes `[2..)` are free — no
/// relocation needed.
#[derive(Debug, Clone, Copy)]
pub struct GenericLayout {
    pub spare_size: u16,
}

impl SpareAreaTranslation for GenericLayout {
    fn layout(&self) -> SpareAreaLayout {
        SpareAreaLayout { bad_block_marker_offset: 0, free_offset: 2, free_len: self.spare_size - 2 }
    }
    fn from_physical(&self, _main_first_byte: &mut u8, _spare: &mut [u8], _page_pos: PagePosition) {}
    fn to_physical(&self, _main_first_byte: &mut u8, _spare: &mut [u8], _page_pos: PagePosition) {}
}

/// GigaDevice: on the first and last page of a block (where the
/// factory bad-block marker lives) the controller swaps the first byte
/// of the main area with the second byte of the spare area; everywhere
/// else the layout is untouched.
#[derive(Debug, Clone, Copy)]
pub struct GigaDeviceLayout {
    pub spare_size: u16,
}

impl SpareAreaTranslation for GigaDeviceLayout {
    fn layout(&self) -> SpareAreaLayout {
        SpareAreaLayout { bad_block_marker_offset: 0, free_offset: 2, free_len: self.spare_size.saturating_sub(16) }
    }
    fn from_physical(&self, main_first_byte: &mut u8, spare: &mut [u8], page_pos: PagePosition) {
        if page_pos.is_boundary() && spare.len() > 1 {
            core::mem::swap(main_first_byte, &mut spare[1]);
        }
    }
    fn to_physical(&self, main_first_byte: &mut u8, spare: &mut [u8], page_pos: PagePosition) {
        // The swap is its own inverse.
        if page_pos.is_boundary() && spare.len() > 1 {
            core::mem::swap(main_first_byte, &mut spare[1]);
        }
    }
}

/// ISSI IS37SML01G1/IS38SML01G1: the vendor splits user data into
/// `BytesPerSpareStripe`-sized stripes and interleaves it with its own
/// ECC bytes starting at [`OFF_USER_DATA_ISSI`]; a swap is needed each
/// direction to present one contiguous free region logically.
pub const OFF_USER_DATA_ISSI: usize = 8;
const NUM_BYTES_USER_DATA: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct IssiLayout {
    pub spare_size: u16,
    pub bytes_per_spare_stripe: u16,
}

impl IssiLayout {
    fn swap_stripes(&self, spare: &mut [u8]) {
        let mut off_user_data_issi = OFF_USER_DATA_ISSI;
        let stripe = self.bytes_per_spare_stripe as usize;
        let mut off_user_data = 0usize;
        while off_user_data_issi + NUM_BYTES_USER_DATA <= spare.len() {
            for i in 0..NUM_BYTES_USER_DATA {
                spare.swap(off_user_data + i, off_user_data_issi + i);
            }
            off_user_data += NUM_BYTES_USER_DATA;
            off_user_data_issi += stripe - NUM_BYTES_USER_DATA;
        }
    }
}

impl SpareAreaTranslation for IssiLayout {
    fn layout(&self) -> SpareAreaLayout {
        SpareAreaLayout { bad_block_marker_offset: 0, free_offset: 2, free_len: self.spare_size.saturating_sub(2) }
    }
    fn from_physical(&self, _main_first_byte: &mut u8, spare: &mut [u8], _page_pos: PagePosition) {
        self.swap_stripes(spare);
    }
    fn to_physical(&self, _main_first_byte: &mut u8, spare: &mut [u8], _page_pos: PagePosition) {
        // The swap is its own inverse.
        self.swap_stripes(spare);
    }
}

/// Micron MT29F1G01ABAFD-class devices: the spare area is divided into
/// `BytesPerStripe`-sized stripes; stripe `i`'s logical user bytes
/// `4..8` physically live at stripe `i + N/2`'s bytes `0..4` (`N` =
/// number of stripes), doubling up the ECC-protected region. See the
/// `CompatibilityMode` decision in DESIGN.md.
#[derive(Debug, Clone, Copy)]
pub struct MicronLayout {
    pub spare_size: u16,
    pub bytes_per_stripe: u16,
    pub mode: CompatibilityMode,
}

impl MicronLayout {
    fn num_stripes(&self) -> usize {
        if self.bytes_per_stripe == 0 {
            0
        } else {
            (self.spare_size / self.bytes_per_stripe) as usize
        }
    }

    /// Swaps stripe `i`'s logical bytes `4..8` with stripe `i + N/2`'s
    /// bytes `0..4`, for every `i` in the first half of the stripe
    /// array. Its own inverse, like the ISSI/GigaDevice swaps.
    fn relocate(&self, spare: &mut [u8]) {
        let stripe = self.bytes_per_stripe as usize;
        if stripe == 0 {
            return;
        }
        let half = self.num_stripes() / 2;
        for i in 0..half {
            let src = i * stripe + 4;
            let dst = (i + half) * stripe;
            if dst + 4 > spare.len() || src + 4 > spare.len() {
                break;
            }
            for b in 0..4 {
                spare.swap(src + b, dst + b);
            }
        }
    }
}

impl SpareAreaTranslation for MicronLayout {
    fn layout(&self) -> SpareAreaLayout {
        SpareAreaLayout { bad_block_marker_offset: 0, free_offset: 4, free_len: self.spare_size.saturating_sub(4) }
    }

    fn from_physical(&self, _main_first_byte: &mut u8, spare: &mut [u8], _page_pos: PagePosition) {
        self.relocate(spare);
    }

    fn to_physical(&self, _main_first_byte: &mut u8, spare: &mut [u8], _page_pos: PagePosition) {
        self.relocate(spare);
        if matches!(self.mode, CompatibilityMode::WriteBoth) {
            // The relocated data now sits at stripe i+N/2's bytes 0..4;
            // mirror it back into stripe i's own 4..8 slot too, so a
            // legacy reader that skips relocation still finds it there.
            let stripe = self.bytes_per_stripe as usize;
            if stripe != 0 {
                let half = self.num_stripes() / 2;
                for i in 0..half {
                    let src = i * stripe + 4;
                    let dst = (i + half) * stripe;
                    if dst + 4 > spare.len() || src + 4 > spare.len() {
                        break;
                    }
                    let mut tmp = [0u8; 4];
                    tmp.copy_from_slice(&spare[dst..dst + 4]);
                    spare[src..src + 4].copy_from_slice(&tmp);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issi_swap_is_involution() {
        let layout = IssiLayout { spare_size: 64, bytes_per_spare_stripe: 16 };
        let mut spare: Vec<u8> = (0..64u8).collect();
        let original = spare.clone();
        let mut main_byte = 0xAA;
        layout.from_physical(&mut main_byte, &mut spare, PagePosition::Middle);
        layout.to_physical(&mut main_byte, &mut spare, PagePosition::Middle);
        assert_eq!(spare, original);
    }

    #[test]
    fn gigadevice_swaps_only_on_boundary_pages() {
        let layout = GigaDeviceLayout { spare_size: 64 };
        let mut spare = vec![0x11u8; 64];
        spare[1] = 0x22;

        let mut main_byte = 0x33;
        layout.to_physical(&mut main_byte, &mut spare, PagePosition::Middle);
        assert_eq!(main_byte, 0x33, "middle pages must not be touched");
        assert_eq!(spare[1], 0x22);

        layout.to_physical(&mut main_byte, &mut spare, PagePosition::First);
        assert_eq!(main_byte, 0x22);
        assert_eq!(spare[1], 0x33);

        // Round trip back.
        layout.from_physical(&mut main_byte, &mut spare, PagePosition::First);
        assert_eq!(main_byte, 0x33);
        assert_eq!(spare[1], 0x22);
    }

    #[test]
    fn micron_relocate_roundtrips_stripe_one() {
        let layout = MicronLayout { spare_size: 32, bytes_per_stripe: 8, mode: CompatibilityMode::NewOnly };
        let mut spare = vec![0u8; 32];
        // Stripe 1's logical user bytes (offset 1*8+4 == 12).
        spare[12..16].copy_from_slice(&[1, 2, 3, 4]);
        let mut main_byte = 0;

        layout.to_physical(&mut main_byte, &mut spare, PagePosition::Middle);
        // N = 4, half = 2: stripe 1 relocates to stripe (1+2) = 3, offset 0..4.
        assert_eq!(&spare[24..28], &[1, 2, 3, 4]);

        layout.from_physical(&mut main_byte, &mut spare, PagePosition::Middle);
        assert_eq!(&spare[12..16], &[1, 2, 3, 4]);
    }

    #[test]
    fn micron_write_both_mirrors_legacy_slot() {
        let layout = MicronLayout { spare_size: 16, bytes_per_stripe: 8, mode: CompatibilityMode::WriteBoth };
        let mut spare = vec![0u8; 16];
        spare[4..8].copy_from_slice(&[1, 2, 3, 4]);
        let mut main_byte = 0;

        layout.to_physical(&mut main_byte, &mut spare, PagePosition::Middle);
        // N = 2, half = 1: stripe 0 relocates to stripe 1, offset 0..4,
        // and WriteBoth additionally mirrors it back into stripe 0's
        // own slot (spare[4..8]).
        assert_eq!(&spare[8..12], &[1, 2, 3, 4]);
        assert_eq!(&spare[4..8], &[1, 2, 3, 4]);
    }
}
