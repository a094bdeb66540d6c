//! The HW layer contract for NOR: `control`/`read`/`write`/`poll`
//! primitives (spec §6). Wire bit-banging is an external collaborator —
//! this trait is the entire surface `NorPhy` needs from it.

use crate::error::FsResult;

/// `(cmd-lines, addr-lines, data-lines)`, encoded as the triple of data
/// widths used for the command byte(s), the address bytes, and the
/// payload data of one transfer (spec §4.2 "Bus width selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusWidth {
    pub cmd_lines: u8,
    pub addr_lines: u8,
    pub data_lines: u8,
}

impl BusWidth {
    pub const SINGLE: BusWidth = BusWidth { cmd_lines: 1, addr_lines: 1, data_lines: 1 };
    pub const DUAL_OUT: BusWidth = BusWidth { cmd_lines: 1, addr_lines: 1, data_lines: 2 };
    pub const DUAL_IO: BusWidth = BusWidth { cmd_lines: 1, addr_lines: 2, data_lines: 2 };
    pub const QUAD_OUT: BusWidth = BusWidth { cmd_lines: 1, addr_lines: 1, data_lines: 4 };
    pub const QUAD_IO: BusWidth = BusWidth { cmd_lines: 1, addr_lines: 4, data_lines: 4 };
    pub const OCTAL_IO: BusWidth = BusWidth { cmd_lines: 1, addr_lines: 8, data_lines: 8 };
}

/// Status-register polling parameters for one class of operation (erase
/// or page-program have separate budgets, spec §5 "Cancellation and
/// timeouts").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollParams {
    pub status_read_cmd: u8,
    pub busy_bit_pos: u8,
    /// Polarity: the bit value that means "still busy".
    pub busy_bit_value: bool,
    pub max_polls: u32,
}

/// The driver's command-mode HW contract for a NOR device. One
/// `control`/`read`/`write`/`poll` primitive each, exactly spec §6's
/// enumeration, plus the optional memory-map pair.
pub trait HwLayer {
    /// Resets the device and returns once any post-reset quiet time has
    /// elapsed.
    fn reset(&mut self) -> FsResult<()>;

    /// Issues a command with no payload (e.g. write-enable, erase).
    fn control(&mut self, cmd: u8, addr: Option<(u32, u8)>, width: BusWidth) -> FsResult<()>;

    /// Reads `data.len()` bytes following `cmd` (+ optional address and
    /// dummy cycles).
    fn read(&mut self, cmd: u8, addr: Option<(u32, u8)>, dummy_cycles: u8, data: &mut [u8], width: BusWidth) -> FsResult<()>;

    /// Writes `data` following `cmd` (+ optional address).
    fn write(&mut self, cmd: u8, addr: Option<(u32, u8)>, data: &[u8], width: BusWidth) -> FsResult<()>;

    /// Polls the status register until `params.busy_bit_pos` clears (or
    /// the poll budget is exhausted, a hard error).
    fn poll(&mut self, params: PollParams) -> FsResult<()>;

    /// Whether this HW layer supports mapping the device into the MCU
    /// address space.
    fn supports_memory_map(&self) -> bool {
        false
    }

    /// Maps the device (or a sub-range) for direct memory reads. Only
    /// called when `supports_memory_map()` is true.
    fn map(&mut self, _read_cmd: u8, _addr_bytes: u8, _dummy_cycles: u8, _width: BusWidth) -> FsResult<*const u8> {
        Err(crate::error::FsError::NotSupported)
    }

    /// Leaves memory-mapped mode and returns to command mode. Any write,
    /// erase, or command-level operation must call this before issuing
    /// commands (spec §4.2 "Access modes").
    fn unmap(&mut self) -> FsResult<()> {
        Ok(())
    }

    /// Selects which die subsequent `control`/`read`/`write` calls
    /// target (spec §4.2 "Dual-die mode"). No-op default for single-die
    /// parts; dual-die HW layers implement this as a dedicated die-select
    /// command or chip-enable mux.
    fn select_die(&mut self, _die: u8) -> FsResult<()> {
        Ok(())
    }

    /// Optional finer locking around one device transaction (spec §5).
    fn lock(&mut self) {}
    fn unlock(&mut self) {}

    /// Optional delay primitive (e.g. post-reset quiet time).
    fn delay_us(&mut self, _us: u32) {}
}
