//! The closed error set surfaced by every fallible internal API (spec §6,
//! §7). Generalizes the teacher's per-operation `ReadError<T>` /
//! `WriteError<T>` / `EraseError<T>` pattern (`storage.rs`) into one enum
//! shared across the FAT, NAND and NOR layers, since unlike the teacher's
//! single-`Storage`-trait world we have several collaborating subsystems
//! that all need to report into the same closed set.

use core::fmt;

/// A negative-integer-return-value error code in the original C sources,
/// represented here as a proper sum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FsError {
    /// A parameter passed to a public or internal API was invalid.
    InvalidParameter,
    /// An API was used in a way its preconditions forbid (e.g. writing a
    /// read-only file without the move-of-read-only-files override).
    InvalidUsage,
    /// The memory pool could not satisfy an allocation request.
    OutOfMemory,
    /// The on-disk format (BPB signature, power-of-two checks, ...) is not
    /// a format this crate understands.
    InvalidFsFormat,
    /// The detected FAT type does not match what the caller expected.
    InvalidFsType,
    /// The cluster chain is inconsistent: out-of-range id, self-reference,
    /// or a chain longer than `NumClusters`.
    InvalidClusterChain,
    /// The requested cluster is not free (e.g. double free).
    ClusterNotFree,
    /// A read from the underlying device failed.
    ReadFailure,
    /// A write to the underlying device failed.
    WriteFailure,
    /// An erase of the underlying device failed.
    EraseFailure,
    /// No volume matches the requested identifier.
    VolumeNotFound,
    /// The storage device reported it is not ready (busy/absent).
    StorageNotReady,
    /// No sector buffer is currently available in the pool.
    BufferNotAvailable,
    /// A caller-supplied buffer was too small for the operation.
    BufferTooSmall,
    /// An operation was attempted before a HW layer was registered.
    HwLayerNotSet,
    /// Device/volume initialization failed (identification, SFDP/ONFI
    /// parsing, etc).
    InitFailure,
    /// The operation is not supported by this device or configuration.
    NotSupported,
    /// A device status-register error bit was set after a command.
    DeviceStatusError,
    /// A blocking status-poll exhausted its budget without success.
    Timeout,
    /// An ECC correction failed (uncorrectable bit errors).
    EccFailure,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FsError::InvalidParameter => "invalid parameter",
            FsError::InvalidUsage => "invalid usage",
            FsError::OutOfMemory => "out of memory",
            FsError::InvalidFsFormat => "invalid file system format",
            FsError::InvalidFsType => "invalid file system type",
            FsError::InvalidClusterChain => "invalid cluster chain",
            FsError::ClusterNotFree => "cluster not free",
            FsError::ReadFailure => "read failure",
            FsError::WriteFailure => "write failure",
            FsError::EraseFailure => "erase failure",
            FsError::VolumeNotFound => "volume not found",
            FsError::StorageNotReady => "storage not ready",
            FsError::BufferNotAvailable => "no sector buffer available",
            FsError::BufferTooSmall => "buffer too small",
            FsError::HwLayerNotSet => "hw layer not set",
            FsError::InitFailure => "initialization failure",
            FsError::NotSupported => "not supported",
            FsError::DeviceStatusError => "device reported a status error",
            FsError::Timeout => "operation timed out",
            FsError::EccFailure => "uncorrectable ECC error",
        };
        f.write_str(s)
    }
}

using_std! {
    impl std::error::Error for FsError {}
}

pub type FsResult<T> = Result<T, FsError>;
