//! Journal file and journal coordination hooks (spec §4.4 "Journal
//! file"; Open Question 1 in `SPEC_FULL.md` §E).
//!
//! The journaling algorithm itself is an external collaborator (spec §1
//! non-goal); this module only exposes what the core needs to
//! cooperate with one: a distinguished pre-allocated file, and a pair
//! of callbacks bracketing the one place the core cannot make a
//! FAT12 allocation-table write atomic on its own (a straddling entry
//! spans two sectors).

use crate::error::FsResult;
use super::types::ClusterId;

/// Name used for the hidden+system journal file, matching the
/// directory-entry attribute bits `create_journal_file` sets.
pub const JOURNAL_FILE_NAME: &[u8; 11] = b"JOURNAL SYS";

/// Bracketing callbacks around a FAT12 straddling-entry write. The core
/// does not attempt atomicity itself (decision E.1); an external
/// journal implementing this trait can log the pre-image before the
/// first sector write and commit after the second succeeds.
pub trait JournalHooks {
    /// Called before either sector of a straddling FAT12 entry is
    /// written, with the two sector indices involved.
    fn before_straddling_write(&mut self, _sector_a: u32, _sector_b: u32) {}

    /// Called after both sectors have been written successfully. Not
    /// called if the first write fails.
    fn after_straddling_write(&mut self, _sector_a: u32, _sector_b: u32) {}

    /// Informs the journal that a cluster inside its currently-tracked
    /// free range has been re-allocated within the same transaction,
    /// so the normal bypass-the-journal-for-new-data optimisation is
    /// unsafe for it (spec §4.4 "Writing an entry").
    fn note_reallocated_in_transaction(&mut self, _cluster: ClusterId) {}
}

/// A no-op implementation for volumes mounted without a journal.
pub struct NoJournal;

impl JournalHooks for NoJournal {}

/// Descriptor of the journal file's pre-allocated, contiguous chain —
/// all a journal subsystem needs to address it directly (spec §4.4:
/// "the journal subsystem... consumes first-sector and sector-count").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalFileInfo {
    pub first_sector: u32,
    pub num_sectors: u32,
    pub first_cluster: ClusterId,
}
