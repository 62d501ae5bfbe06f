//! Caller-facing error convention
//!
//! Every operation a process can invoke on the driver reports failure as
//! an [`Errno`]. The numeric values follow the Linux errno table so that
//! a system-call shim can return `errno.to_neg()` unchanged.

use thiserror::Error;

/// Errors reported to callers of the driver
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Operation not permitted (EPERM)
    #[error("Operation not permitted")]
    NotPermitted,

    /// No such service on the host side (ESRCH)
    #[error("No such service")]
    NoSuchService,

    /// Interrupted wait (EINTR)
    #[error("Interrupted")]
    Interrupted,

    /// I/O error (EIO)
    #[error("I/O error")]
    Io,

    /// No such device or address (ENXIO)
    #[error("No such device or address")]
    NoDeviceOrAddress,

    /// Bad handle (EBADF)
    #[error("Bad handle")]
    BadHandle,

    /// Try again (EAGAIN)
    #[error("Resource temporarily unavailable")]
    WouldBlock,

    /// Out of memory (ENOMEM)
    #[error("Out of memory")]
    OutOfMemory,

    /// Access denied (EACCES)
    #[error("Permission denied")]
    AccessDenied,

    /// Caller memory could not be accessed (EFAULT)
    #[error("Bad address")]
    Fault,

    /// Device or resource busy (EBUSY)
    #[error("Device or resource busy")]
    Busy,

    /// Already exists (EEXIST)
    #[error("Already exists")]
    Exists,

    /// No such device (ENODEV)
    #[error("No such device")]
    NoDevice,

    /// Invalid argument (EINVAL)
    #[error("Invalid argument")]
    InvalidArgument,

    /// Function not implemented (ENOSYS)
    #[error("Function not implemented")]
    NotImplemented,

    /// Protocol error (EPROTO)
    #[error("Protocol error")]
    Protocol,

    /// Value too large for the destination (EOVERFLOW)
    #[error("Value too large")]
    Overflow,

    /// Operation not supported (EOPNOTSUPP)
    #[error("Operation not supported")]
    NotSupported,

    /// Timed out (ETIMEDOUT)
    #[error("Timed out")]
    TimedOut,

    /// No such file or entry (ENOENT)
    #[error("No such entry")]
    NotFound,

    /// Argument list too long (E2BIG)
    #[error("Argument list too long")]
    TooBig,

    /// Not a directory (ENOTDIR)
    #[error("Not a directory")]
    NotDirectory,

    /// Is a directory (EISDIR)
    #[error("Is a directory")]
    IsDirectory,

    /// Too many open files (EMFILE)
    #[error("Too many open files")]
    TooManyOpenFiles,

    /// File too large (EFBIG)
    #[error("File too large")]
    FileTooBig,

    /// Read-only file system (EROFS)
    #[error("Read-only file system")]
    ReadOnly,

    /// Broken pipe (EPIPE)
    #[error("Broken pipe")]
    BrokenPipe,

    /// Result out of range (ERANGE)
    #[error("Result out of range")]
    OutOfRange,

    /// File name too long (ENAMETOOLONG)
    #[error("File name too long")]
    NameTooLong,

    /// Directory not empty (ENOTEMPTY)
    #[error("Directory not empty")]
    NotEmpty,

    /// No data available (ENODATA)
    #[error("No data available")]
    NoData,

    /// Any other errno value
    #[error("Unknown error {0}")]
    Other(i32),
}

impl Errno {
    /// Returns the positive errno value
    pub const fn code(self) -> i32 {
        match self {
            Errno::NotPermitted => 1,
            Errno::NoSuchService => 3,
            Errno::Interrupted => 4,
            Errno::Io => 5,
            Errno::NoDeviceOrAddress => 6,
            Errno::BadHandle => 9,
            Errno::WouldBlock => 11,
            Errno::OutOfMemory => 12,
            Errno::AccessDenied => 13,
            Errno::Fault => 14,
            Errno::Busy => 16,
            Errno::Exists => 17,
            Errno::NoDevice => 19,
            Errno::InvalidArgument => 22,
            Errno::NotImplemented => 38,
            Errno::Protocol => 71,
            Errno::Overflow => 75,
            Errno::NotSupported => 95,
            Errno::TimedOut => 110,
            Errno::NotFound => 2,
            Errno::TooBig => 7,
            Errno::NotDirectory => 20,
            Errno::IsDirectory => 21,
            Errno::TooManyOpenFiles => 24,
            Errno::FileTooBig => 27,
            Errno::ReadOnly => 30,
            Errno::BrokenPipe => 32,
            Errno::OutOfRange => 34,
            Errno::NameTooLong => 36,
            Errno::NotEmpty => 39,
            Errno::NoData => 61,
            Errno::Other(code) => code,
        }
    }

    /// Returns the negated value used as a raw system-call result
    pub const fn to_neg(self) -> i32 {
        -self.code()
    }

    /// Builds an errno from a positive or negative raw value
    pub fn from_code(code: i32) -> Self {
        match code.abs() {
            1 => Errno::NotPermitted,
            3 => Errno::NoSuchService,
            4 => Errno::Interrupted,
            5 => Errno::Io,
            6 => Errno::NoDeviceOrAddress,
            9 => Errno::BadHandle,
            11 => Errno::WouldBlock,
            12 => Errno::OutOfMemory,
            13 => Errno::AccessDenied,
            14 => Errno::Fault,
            16 => Errno::Busy,
            17 => Errno::Exists,
            19 => Errno::NoDevice,
            22 => Errno::InvalidArgument,
            38 => Errno::NotImplemented,
            71 => Errno::Protocol,
            75 => Errno::Overflow,
            95 => Errno::NotSupported,
            110 => Errno::TimedOut,
            2 => Errno::NotFound,
            7 => Errno::TooBig,
            20 => Errno::NotDirectory,
            21 => Errno::IsDirectory,
            24 => Errno::TooManyOpenFiles,
            27 => Errno::FileTooBig,
            30 => Errno::ReadOnly,
            32 => Errno::BrokenPipe,
            34 => Errno::OutOfRange,
            36 => Errno::NameTooLong,
            39 => Errno::NotEmpty,
            61 => Errno::NoData,
            other => Errno::Other(other),
        }
    }
}

/// Folds a call result into the raw integer convention (0/count or -errno)
pub fn to_raw_result(result: Result<usize, Errno>) -> isize {
    match result {
        Ok(count) => count as isize,
        Err(errno) => errno.to_neg() as isize,
    }
}
