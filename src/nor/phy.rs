//! `NorPhy`: the serial/quad NOR physical layer driver (spec §4.2).
//!
//! Turns `(offset, length)` byte-range reads/writes/erases into HW-layer
//! command sequences, handles identification (SFDP first, manufacturer
//! id as fallback — `_ReadApplyParaBySFDP` / `_Init` in
//! `FS_NOR_PHY_SPIFI.c`), picks the widest bus width the device and HW
//! layer both support, and supports memory-mapped reads when the HW
//! layer allows it.

use crate::error::{FsError, FsResult};
use crate::storage::Storage;
use super::device::{DeviceParams, SectorBlock};
use super::hw::{BusWidth, HwLayer, PollParams};
use super::sfdp;

const CMD_READ_ID: u8 = 0x9F;
const CMD_READ_SFDP: u8 = 0x5A;
const CMD_READ_DATA: u8 = 0x03;
const CMD_READ_FAST: u8 = 0x0B;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_SECTOR_ERASE_4K: u8 = 0x20;
const CMD_BLOCK_ERASE_64K: u8 = 0xD8;
const CMD_READ_STATUS: u8 = 0x05;
const STATUS_BUSY_BIT: u8 = 0;

/// Largest number of physical address rows one dual-die transfer spans:
/// a full 256-byte page split one byte per die is 128 rows, plus one row
/// of slack for an unaligned leading byte.
const MAX_DUAL_DIE_ROWS: usize = 129;

/// Access mode a NOR instance is currently in (spec §4.2 "Access
/// modes"). Memory-mapped mode only ever wraps read commands; any
/// write/erase/control call transparently drops back to command mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Command,
    MemoryMapped,
}

/// Per-die addressing state for multi-die parts (spec §4.2 "Dual-die
/// mode"): two identical dies share pins and each physical address holds
/// one byte from each die, so a logical byte address is halved at the
/// driver boundary — `die = address & 1`, `within = address >> 1`.
#[derive(Debug, Clone, Copy)]
struct DieMap {
    num_dies: u8,
}

impl DieMap {
    fn locate(&self, offset: u32) -> (u8, u32) {
        if self.num_dies <= 1 {
            return (0, offset);
        }
        ((offset & 1) as u8, offset >> 1)
    }
}

pub struct NorPhy<H: HwLayer> {
    hw: H,
    params: DeviceParams,
    topology: SectorBlock,
    mode: AccessMode,
    current_width: BusWidth,
    dies: DieMap,
    current_die: Option<u8>,
    map_base: Option<*const u8>,
}

impl<H: HwLayer> NorPhy<H> {
    /// Identifies the attached device (SFDP first, then the built-in
    /// manufacturer/device-id table) and constructs a driver bound to
    /// it.
    pub fn identify(mut hw: H) -> FsResult<Self> {
        hw.reset()?;

        let params = match Self::try_sfdp(&mut hw) {
            Ok(p) => p,
            Err(_) => {
                let mut id = [0u8; 3];
                hw.read(CMD_READ_ID, None, 0, &mut id, BusWidth::SINGLE)?;
                super::device::identify(&id)?
            }
        };

        let topology = sfdp::default_topology(&params);
        let dies = DieMap { num_dies: params.num_dies };

        Ok(Self {
            hw,
            params,
            topology,
            mode: AccessMode::Command,
            current_width: BusWidth::SINGLE,
            dies,
            current_die: None,
            map_base: None,
        })
    }

    fn try_sfdp(hw: &mut H) -> FsResult<DeviceParams> {
        let mut header_raw = [0u8; 8];
        hw.read(CMD_READ_SFDP, Some((0, 3)), 8, &mut header_raw, BusWidth::SINGLE)?;
        let header = sfdp::parse_header(&header_raw)?;

        let mut offset = 8u32;
        for _ in 0..header.num_param_headers.max(1) {
            let mut ph_raw = [0u8; 8];
            hw.read(CMD_READ_SFDP, Some((offset, 3)), 8, &mut ph_raw, BusWidth::SINGLE)?;
            let entry = sfdp::parse_param_header(&ph_raw)?;
            if entry.id == sfdp::BASIC_FLASH_PARAM_TABLE_ID {
                let len = entry.len_dwords as usize * 4;
                let mut table = [0u8; 64];
                let len = len.min(table.len());
                hw.read(CMD_READ_SFDP, Some((entry.table_offset, 3)), 8, &mut table[..len], BusWidth::SINGLE)?;
                return sfdp::parse_basic_table(&table[..len]);
            }
            offset += 8;
        }
        Err(FsError::InvalidFsFormat)
    }

    /// Picks the widest read/write bus width both the HW layer and the
    /// identified device support. Call once after `identify`; the
    /// `Config::nor_bus_width` policy can veto wider modes.
    pub fn select_bus_width(&mut self, policy: &crate::config::BusWidthPolicy) {
        let mut width = self.params.max_write_bus_width;
        if !policy.allow_4bit && width.data_lines >= 4 {
            width = BusWidth::DUAL_OUT;
        }
        if !policy.allow_2bit && width.data_lines >= 2 {
            width = BusWidth::SINGLE;
        }
        self.current_width = width;
    }

    fn ensure_command_mode(&mut self) -> FsResult<()> {
        if self.mode == AccessMode::MemoryMapped {
            self.hw.unmap()?;
            self.mode = AccessMode::Command;
            self.map_base = None;
        }
        Ok(())
    }

    /// Enters memory-mapped mode if the HW layer supports it, returning
    /// the mapped base pointer. Idempotent: an already-active mapping is
    /// reused (spec §4.2 "Memory-mapped mode").
    fn ensure_memory_mapped(&mut self) -> FsResult<Option<*const u8>> {
        if !self.hw.supports_memory_map() {
            return Ok(None);
        }
        if self.mode != AccessMode::MemoryMapped {
            let width = self.current_width;
            let cmd = if width.data_lines > 1 { CMD_READ_FAST } else { CMD_READ_DATA };
            let base = self.hw.map(cmd, self.addr_width(), 0, width)?;
            self.map_base = Some(base);
            self.mode = AccessMode::MemoryMapped;
        }
        Ok(self.map_base)
    }

    fn ensure_die_selected(&mut self, die: u8) -> FsResult<()> {
        if self.current_die != Some(die) {
            self.hw.select_die(die)?;
            self.current_die = Some(die);
        }
        Ok(())
    }

    /// 3-byte addresses auto-extend to 4-byte once a dual-die device's
    /// combined address space exceeds 24 bits (spec §4.2 "Dual-die
    /// mode").
    fn addr_width(&self) -> u8 {
        if self.dies.num_dies > 1 && self.params.total_size > (1 << 24) {
            4
        } else {
            3
        }
    }

    fn poll_params(&self) -> PollParams {
        PollParams {
            status_read_cmd: CMD_READ_STATUS,
            busy_bit_pos: STATUS_BUSY_BIT,
            busy_bit_value: true,
            max_polls: 1_000_000,
        }
    }

    fn erase_granularity_for(&self, len: u32) -> u32 {
        if len % self.params.erase_size_large == 0 {
            self.params.erase_size_large
        } else {
            self.params.erase_size_small
        }
    }

    /// Returns the topology block description, usable for reporting
    /// sector sizes to the FAT layer (spec §4.2 "Sector topology").
    pub fn sector_topology(&self) -> SectorBlock {
        self.topology
    }

    pub fn erase_sector(&mut self, offset: u32) -> FsResult<()> {
        self.ensure_command_mode()?;
        let addr_bytes = self.addr_width();
        let granularity = self.erase_granularity_for(self.topology.size);
        let cmd = if granularity >= self.params.erase_size_large {
            CMD_BLOCK_ERASE_64K
        } else {
            CMD_SECTOR_ERASE_4K
        };

        if self.dies.num_dies > 1 {
            let (_, within) = self.dies.locate(offset);
            for die in 0..self.dies.num_dies {
                self.ensure_die_selected(die)?;
                self.hw.control(CMD_WRITE_ENABLE, None, BusWidth::SINGLE)?;
                self.hw.control(cmd, Some((within, addr_bytes)), BusWidth::SINGLE)?;
                self.hw.poll(self.poll_params())?;
            }
        } else {
            self.hw.control(CMD_WRITE_ENABLE, None, BusWidth::SINGLE)?;
            self.hw.control(cmd, Some((offset, addr_bytes)), BusWidth::SINGLE)?;
            self.hw.poll(self.poll_params())?;
        }
        Ok(())
    }

    pub fn get_num_sectors(&self) -> u32 {
        self.topology.count
    }

    pub fn get_sector_info(&self, idx: u32) -> FsResult<SectorBlock> {
        if idx >= self.topology.count {
            return Err(FsError::InvalidParameter);
        }
        Ok(SectorBlock { offset: self.topology.offset + idx * self.topology.size, size: self.topology.size, count: 1 })
    }

    /// Writes `data` (at most one page) starting at logical byte
    /// `logical_offset` on a dual-die part. Each physical row holds one
    /// byte per die; a leading or trailing byte that doesn't fill both
    /// halves of its row is padded with 0xFF on the other die so that
    /// die's contents are left intact (spec §4.2 "Dual-die mode", §8.6).
    fn dual_die_write(&mut self, logical_offset: u32, data: &[u8], width: BusWidth) -> FsResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let addr_bytes = self.addr_width();
        let first_row = logical_offset >> 1;
        let last_row = (logical_offset + data.len() as u32 - 1) >> 1;
        let num_rows = (last_row - first_row + 1) as usize;
        debug_assert!(num_rows <= MAX_DUAL_DIE_ROWS);

        for die in 0..2u8 {
            let mut row_buf = [0xFFu8; MAX_DUAL_DIE_ROWS];
            let mut any_real = false;
            for (r, slot) in row_buf.iter_mut().enumerate().take(num_rows) {
                let logical = (first_row + r as u32) * 2 + die as u32;
                if logical >= logical_offset && logical < logical_offset + data.len() as u32 {
                    *slot = data[(logical - logical_offset) as usize];
                    any_real = true;
                }
            }
            if !any_real {
                continue;
            }
            self.ensure_die_selected(die)?;
            self.hw.control(CMD_WRITE_ENABLE, None, BusWidth::SINGLE)?;
            self.hw.write(CMD_PAGE_PROGRAM, Some((first_row, addr_bytes)), &row_buf[..num_rows], width)?;
            self.hw.poll(self.poll_params())?;
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes starting at logical byte `logical_offset`
    /// from a dual-die part, reading both dies' rows and discarding the
    /// padding byte at either boundary (spec §4.2 "Dual-die mode").
    fn dual_die_read(&mut self, logical_offset: u32, buf: &mut [u8], width: BusWidth) -> FsResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let addr_bytes = self.addr_width();
        let first_row = logical_offset >> 1;
        let last_row = (logical_offset + buf.len() as u32 - 1) >> 1;
        let num_rows = (last_row - first_row + 1) as usize;
        debug_assert!(num_rows <= MAX_DUAL_DIE_ROWS);

        let mut rows = [[0u8; 2]; MAX_DUAL_DIE_ROWS];
        let cmd = if width.data_lines > 1 { CMD_READ_FAST } else { CMD_READ_DATA };
        for die in 0..2u8 {
            self.ensure_die_selected(die)?;
            let mut row_buf = [0u8; MAX_DUAL_DIE_ROWS];
            self.hw.read(cmd, Some((first_row, addr_bytes)), 0, &mut row_buf[..num_rows], width)?;
            for (r, v) in row_buf.iter().enumerate().take(num_rows) {
                rows[r][die as usize] = *v;
            }
        }

        for (i, out) in buf.iter_mut().enumerate() {
            let logical = logical_offset + i as u32;
            let row = ((logical >> 1) - first_row) as usize;
            let die = (logical & 1) as usize;
            *out = rows[row][die];
        }
        Ok(())
    }
}

impl<H: HwLayer> Storage for NorPhy<H> {
    fn sector_size(&self) -> u32 {
        self.topology.size
    }

    fn sector_count(&self) -> u32 {
        self.topology.count
    }

    fn read_sector(&mut self, sector_idx: u32, buf: &mut [u8]) -> FsResult<()> {
        if sector_idx >= self.topology.count {
            return Err(FsError::InvalidParameter);
        }
        let offset = self.topology.offset + sector_idx * self.topology.size;

        if let Some(base) = self.ensure_memory_mapped()? {
            let src = unsafe { core::slice::from_raw_parts(base.add(offset as usize), buf.len()) };
            buf.copy_from_slice(src);
            return Ok(());
        }

        let width = self.current_width;
        if self.dies.num_dies > 1 {
            return self.dual_die_read(offset, buf, width);
        }
        let cmd = if width.data_lines > 1 { CMD_READ_FAST } else { CMD_READ_DATA };
        self.hw.read(cmd, Some((offset, self.addr_width())), 0, buf, width)
    }

    fn write_sector(&mut self, sector_idx: u32, buf: &[u8]) -> FsResult<()> {
        if sector_idx >= self.topology.count {
            return Err(FsError::InvalidParameter);
        }
        self.ensure_command_mode()?;
        let offset = self.topology.offset + sector_idx * self.topology.size;
        let width = self.current_width;
        let addr_bytes = self.addr_width();

        for (page_off, chunk) in buf.chunks(self.params.page_size as usize).enumerate() {
            let addr = offset + page_off as u32 * self.params.page_size;
            if self.dies.num_dies > 1 {
                self.dual_die_write(addr, chunk, width)?;
            } else {
                self.hw.control(CMD_WRITE_ENABLE, None, BusWidth::SINGLE)?;
                self.hw.write(CMD_PAGE_PROGRAM, Some((addr, addr_bytes)), chunk, width)?;
                self.hw.poll(self.poll_params())?;
            }
        }
        Ok(())
    }

    fn free_sectors(&mut self, sector_idx: u32, count: u32) -> FsResult<()> {
        for i in 0..count {
            self.erase_sector(self.topology.offset + (sector_idx + i) * self.topology.size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod dual_die_tests {
    use super::*;
    use crate::nor::device::DeviceParams;

    /// A fake two-die HW layer: two flat byte arrays selected via
    /// `select_die`, each addressed independently, all starting erased
    /// (0xFF).
    struct FakeDualDieHw {
        dies: [Vec<u8>; 2],
        current_die: usize,
        mapped: bool,
    }

    impl FakeDualDieHw {
        fn new(per_die_size: usize) -> Self {
            Self { dies: [vec![0xFFu8; per_die_size], vec![0xFFu8; per_die_size]], current_die: 0, mapped: false }
        }
    }

    impl HwLayer for FakeDualDieHw {
        fn reset(&mut self) -> FsResult<()> {
            Ok(())
        }

        fn control(&mut self, _cmd: u8, addr: Option<(u32, u8)>, _width: BusWidth) -> FsResult<()> {
            if let Some((a, _)) = addr {
                // erase: fill from `a` to end of sector-sized region with 0xFF.
                let start = a as usize;
                let end = (start + 4096).min(self.dies[self.current_die].len());
                for b in &mut self.dies[self.current_die][start..end] {
                    *b = 0xFF;
                }
            }
            Ok(())
        }

        fn read(&mut self, _cmd: u8, addr: Option<(u32, u8)>, _dummy_cycles: u8, data: &mut [u8], _width: BusWidth) -> FsResult<()> {
            let (a, _) = addr.unwrap();
            let start = a as usize;
            data.copy_from_slice(&self.dies[self.current_die][start..start + data.len()]);
            Ok(())
        }

        fn write(&mut self, _cmd: u8, addr: Option<(u32, u8)>, data: &[u8], _width: BusWidth) -> FsResult<()> {
            let (a, _) = addr.unwrap();
            let start = a as usize;
            for (i, b) in data.iter().enumerate() {
                // NOR program only clears bits; a 0xFF byte never changes anything.
                self.dies[self.current_die][start + i] &= *b;
            }
            Ok(())
        }

        fn poll(&mut self, _params: PollParams) -> FsResult<()> {
            Ok(())
        }

        fn select_die(&mut self, die: u8) -> FsResult<()> {
            self.current_die = die as usize;
            Ok(())
        }
    }

    fn dual_die_params() -> DeviceParams {
        DeviceParams {
            total_size: 2 * 4096,
            page_size: 256,
            erase_size_small: 4096,
            erase_size_large: 4096,
            max_write_bus_width: BusWidth::SINGLE,
            max_read_bus_width: BusWidth::SINGLE,
            supports_dtr: false,
            num_dies: 2,
        }
    }

    fn phy_over(hw: FakeDualDieHw) -> NorPhy<FakeDualDieHw> {
        let params = dual_die_params();
        NorPhy {
            topology: sfdp::default_topology(&params),
            hw,
            params,
            mode: AccessMode::Command,
            current_width: BusWidth::SINGLE,
            dies: DieMap { num_dies: 2 },
            current_die: None,
            map_base: None,
        }
    }

    #[test]
    fn odd_offset_write_roundtrips() {
        let mut phy = phy_over(FakeDualDieHw::new(4096));
        let data = [0xAAu8, 0xBB, 0xCC];
        phy.dual_die_write(5, &data, BusWidth::SINGLE).unwrap();

        let mut out = [0u8; 3];
        phy.dual_die_read(5, &mut out, BusWidth::SINGLE).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn odd_offset_write_does_not_disturb_neighbors() {
        let mut phy = phy_over(FakeDualDieHw::new(4096));
        // Pre-seed a known pattern, then overwrite 3 bytes in the middle.
        phy.dual_die_write(0, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88], BusWidth::SINGLE).unwrap();
        phy.dual_die_write(3, &[0x00, 0x00, 0x00], BusWidth::SINGLE).unwrap();

        let mut out = [0u8; 8];
        phy.dual_die_read(0, &mut out, BusWidth::SINGLE).unwrap();
        assert_eq!(out, [0x11, 0x22, 0x33, 0x00, 0x00, 0x00, 0x77, 0x88]);
    }

    #[test]
    fn single_die_locate_is_identity() {
        let map = DieMap { num_dies: 1 };
        assert_eq!(map.locate(1234), (0, 1234));
    }

    #[test]
    fn dual_die_locate_halves_address() {
        let map = DieMap { num_dies: 2 };
        assert_eq!(map.locate(10), (0, 5));
        assert_eq!(map.locate(11), (1, 5));
    }
}
