//! Dispatcher status codes and their caller-facing translation
//!
//! The common layer reports every outcome as a signed status: values at or
//! above zero are success or informational, negative values are errors.
//! Statuses strictly between -1000 and 1000 come from the generic runtime
//! range; the host-channel range sits around 2900.

use kernel_api::Errno;
use std::fmt;

/// A status reported by the common layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub const GENERAL_FAILURE: Status = Status(-1);
    pub const INVALID_PARAMETER: Status = Status(-2);
    pub const INVALID_MAGIC: Status = Status(-3);
    pub const INVALID_HANDLE: Status = Status(-4);
    pub const INVALID_POINTER: Status = Status(-6);
    pub const NO_MEMORY: Status = Status(-8);
    pub const PERMISSION_DENIED: Status = Status(-10);
    pub const NOT_IMPLEMENTED: Status = Status(-12);
    pub const INVALID_FLAGS: Status = Status(-13);
    pub const NOT_SUPPORTED: Status = Status(-37);
    pub const ACCESS_DENIED: Status = Status(-38);
    pub const INTERRUPTED: Status = Status(-39);
    pub const TIMEOUT: Status = Status(-40);
    pub const BUFFER_OVERFLOW: Status = Status(-41);
    pub const TOO_MUCH_DATA: Status = Status(-42);
    pub const TRY_AGAIN: Status = Status(-52);
    pub const OUT_OF_RANGE: Status = Status(-54);
    pub const NO_DATA: Status = Status(-61);
    pub const NOT_FOUND: Status = Status(-78);
    pub const FILE_IO_ERROR: Status = Status(-100);
    pub const FILE_NOT_FOUND: Status = Status(-102);
    pub const PATH_NOT_FOUND: Status = Status(-103);
    pub const INVALID_NAME: Status = Status(-104);
    pub const ALREADY_EXISTS: Status = Status(-105);
    pub const TOO_MANY_OPEN_FILES: Status = Status(-106);
    pub const READ_ERROR: Status = Status(-111);
    pub const WRITE_ERROR: Status = Status(-112);
    pub const WRITE_PROTECT: Status = Status(-113);
    pub const SHARING_VIOLATION: Status = Status(-114);
    pub const FILENAME_TOO_LONG: Status = Status(-120);
    pub const DIR_NOT_EMPTY: Status = Status(-125);
    pub const NOT_A_DIRECTORY: Status = Status(-126);
    pub const IS_A_DIRECTORY: Status = Status(-127);
    pub const FILE_TOO_BIG: Status = Status(-128);
    pub const RESOURCE_BUSY: Status = Status(-138);
    pub const DEV_IO_ERROR: Status = Status(-250);
    pub const BROKEN_PIPE: Status = Status(-301);

    pub const HGCM_SERVICE_NOT_FOUND: Status = Status(-2900);
    pub const HGCM_CLIENT_REJECTED: Status = Status(2901);
    pub const HGCM_INVALID_CMD_ADDRESS: Status = Status(-2902);
    pub const HGCM_ASYNC_EXECUTE: Status = Status(2903);
    pub const HGCM_INTERNAL: Status = Status(-2904);
    pub const HGCM_INVALID_CLIENT_ID: Status = Status(-2905);
    pub const HGCM_SAVE_STATE: Status = Status(2906);

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Maps the status onto the caller's errno convention
    pub fn translate(self) -> Translation {
        if self.is_success() {
            return Translation::Success;
        }
        if self.0 > -1000 {
            return match generic_errno(self) {
                Some(errno) => Translation::Failure(errno),
                None => Translation::Fallback(Errno::Protocol),
            };
        }
        match self {
            Status::HGCM_SERVICE_NOT_FOUND => Translation::Failure(Errno::NoSuchService),
            Status::HGCM_INVALID_CMD_ADDRESS => Translation::Failure(Errno::Fault),
            Status::HGCM_INTERNAL => Translation::Failure(Errno::Protocol),
            Status::HGCM_INVALID_CLIENT_ID => Translation::Failure(Errno::InvalidArgument),
            _ => Translation::Fallback(Errno::Protocol),
        }
    }

    /// Symbolic name of well-known statuses
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Status::SUCCESS => "SUCCESS",
            Status::GENERAL_FAILURE => "GENERAL_FAILURE",
            Status::INVALID_PARAMETER => "INVALID_PARAMETER",
            Status::INVALID_MAGIC => "INVALID_MAGIC",
            Status::INVALID_HANDLE => "INVALID_HANDLE",
            Status::INVALID_POINTER => "INVALID_POINTER",
            Status::NO_MEMORY => "NO_MEMORY",
            Status::PERMISSION_DENIED => "PERMISSION_DENIED",
            Status::NOT_IMPLEMENTED => "NOT_IMPLEMENTED",
            Status::INVALID_FLAGS => "INVALID_FLAGS",
            Status::NOT_SUPPORTED => "NOT_SUPPORTED",
            Status::ACCESS_DENIED => "ACCESS_DENIED",
            Status::INTERRUPTED => "INTERRUPTED",
            Status::TIMEOUT => "TIMEOUT",
            Status::BUFFER_OVERFLOW => "BUFFER_OVERFLOW",
            Status::TOO_MUCH_DATA => "TOO_MUCH_DATA",
            Status::TRY_AGAIN => "TRY_AGAIN",
            Status::OUT_OF_RANGE => "OUT_OF_RANGE",
            Status::NO_DATA => "NO_DATA",
            Status::NOT_FOUND => "NOT_FOUND",
            Status::FILE_IO_ERROR => "FILE_IO_ERROR",
            Status::FILE_NOT_FOUND => "FILE_NOT_FOUND",
            Status::PATH_NOT_FOUND => "PATH_NOT_FOUND",
            Status::INVALID_NAME => "INVALID_NAME",
            Status::ALREADY_EXISTS => "ALREADY_EXISTS",
            Status::TOO_MANY_OPEN_FILES => "TOO_MANY_OPEN_FILES",
            Status::READ_ERROR => "READ_ERROR",
            Status::WRITE_ERROR => "WRITE_ERROR",
            Status::WRITE_PROTECT => "WRITE_PROTECT",
            Status::SHARING_VIOLATION => "SHARING_VIOLATION",
            Status::FILENAME_TOO_LONG => "FILENAME_TOO_LONG",
            Status::DIR_NOT_EMPTY => "DIR_NOT_EMPTY",
            Status::NOT_A_DIRECTORY => "NOT_A_DIRECTORY",
            Status::IS_A_DIRECTORY => "IS_A_DIRECTORY",
            Status::FILE_TOO_BIG => "FILE_TOO_BIG",
            Status::RESOURCE_BUSY => "RESOURCE_BUSY",
            Status::DEV_IO_ERROR => "DEV_IO_ERROR",
            Status::BROKEN_PIPE => "BROKEN_PIPE",
            Status::HGCM_SERVICE_NOT_FOUND => "HGCM_SERVICE_NOT_FOUND",
            Status::HGCM_CLIENT_REJECTED => "HGCM_CLIENT_REJECTED",
            Status::HGCM_INVALID_CMD_ADDRESS => "HGCM_INVALID_CMD_ADDRESS",
            Status::HGCM_ASYNC_EXECUTE => "HGCM_ASYNC_EXECUTE",
            Status::HGCM_INTERNAL => "HGCM_INTERNAL",
            Status::HGCM_INVALID_CLIENT_ID => "HGCM_INVALID_CLIENT_ID",
            Status::HGCM_SAVE_STATE => "HGCM_SAVE_STATE",
            _ => return None,
        };
        Some(name)
    }
}

fn generic_errno(status: Status) -> Option<Errno> {
    let errno = match status {
        Status::GENERAL_FAILURE => Errno::Io,
        Status::INVALID_PARAMETER => Errno::InvalidArgument,
        Status::INVALID_MAGIC => Errno::InvalidArgument,
        Status::INVALID_HANDLE => Errno::BadHandle,
        Status::INVALID_POINTER => Errno::Fault,
        Status::NO_MEMORY => Errno::OutOfMemory,
        Status::PERMISSION_DENIED => Errno::NotPermitted,
        Status::NOT_IMPLEMENTED => Errno::NotImplemented,
        Status::INVALID_FLAGS => Errno::InvalidArgument,
        Status::NOT_SUPPORTED => Errno::NotSupported,
        Status::ACCESS_DENIED => Errno::AccessDenied,
        Status::INTERRUPTED => Errno::Interrupted,
        Status::TIMEOUT => Errno::TimedOut,
        Status::BUFFER_OVERFLOW => Errno::Overflow,
        Status::TOO_MUCH_DATA => Errno::TooBig,
        Status::TRY_AGAIN => Errno::WouldBlock,
        Status::OUT_OF_RANGE => Errno::OutOfRange,
        Status::NO_DATA => Errno::NoData,
        Status::NOT_FOUND => Errno::NotFound,
        Status::FILE_IO_ERROR => Errno::Io,
        Status::FILE_NOT_FOUND => Errno::NotFound,
        Status::PATH_NOT_FOUND => Errno::NotFound,
        Status::INVALID_NAME => Errno::InvalidArgument,
        Status::ALREADY_EXISTS => Errno::Exists,
        Status::TOO_MANY_OPEN_FILES => Errno::TooManyOpenFiles,
        Status::READ_ERROR => Errno::Io,
        Status::WRITE_ERROR => Errno::Io,
        Status::WRITE_PROTECT => Errno::ReadOnly,
        Status::SHARING_VIOLATION => Errno::Busy,
        Status::FILENAME_TOO_LONG => Errno::NameTooLong,
        Status::DIR_NOT_EMPTY => Errno::NotEmpty,
        Status::NOT_A_DIRECTORY => Errno::NotDirectory,
        Status::IS_A_DIRECTORY => Errno::IsDirectory,
        Status::FILE_TOO_BIG => Errno::FileTooBig,
        Status::RESOURCE_BUSY => Errno::Busy,
        Status::DEV_IO_ERROR => Errno::Io,
        Status::BROKEN_PIPE => Errno::BrokenPipe,
        _ => return None,
    };
    Some(errno)
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Outcome of translating a [`Status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// Success or informational; output is copied back
    Success,
    /// A recognised failure
    Failure(Errno),
    /// A status with no defined mapping; reported as a protocol error
    Fallback(Errno),
}

impl Translation {
    pub fn into_result(self) -> Result<(), Errno> {
        match self {
            Translation::Success => Ok(()),
            Translation::Failure(errno) | Translation::Fallback(errno) => Err(errno),
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(self, Translation::Fallback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_channel_statuses() {
        assert_eq!(
            Status::HGCM_SERVICE_NOT_FOUND.translate(),
            Translation::Failure(Errno::NoSuchService)
        );
        assert_eq!(
            Status::HGCM_INVALID_CMD_ADDRESS.translate(),
            Translation::Failure(Errno::Fault)
        );
        assert_eq!(
            Status::HGCM_INTERNAL.translate(),
            Translation::Failure(Errno::Protocol)
        );
        assert_eq!(
            Status::HGCM_INVALID_CLIENT_ID.translate(),
            Translation::Failure(Errno::InvalidArgument)
        );
    }

    #[test]
    fn test_soft_statuses_succeed() {
        for status in [
            Status::SUCCESS,
            Status::HGCM_CLIENT_REJECTED,
            Status::HGCM_ASYNC_EXECUTE,
            Status::HGCM_SAVE_STATE,
            Status(5),
        ] {
            assert_eq!(status.translate(), Translation::Success, "{}", status);
        }
    }

    #[test]
    fn test_generic_range() {
        assert_eq!(Status::NO_MEMORY.translate(), Translation::Failure(Errno::OutOfMemory));
        assert_eq!(Status::TRY_AGAIN.translate(), Translation::Failure(Errno::WouldBlock));
        assert_eq!(Status::GENERAL_FAILURE.translate(), Translation::Failure(Errno::Io));
        assert_eq!(Status::TIMEOUT.translate().into_result(), Err(Errno::TimedOut));
    }

    #[test]
    fn test_common_runtime_statuses_are_recognized() {
        let cases = [
            (Status::NOT_FOUND, Errno::NotFound),
            (Status::FILE_NOT_FOUND, Errno::NotFound),
            (Status::ALREADY_EXISTS, Errno::Exists),
            (Status::DEV_IO_ERROR, Errno::Io),
            (Status::RESOURCE_BUSY, Errno::Busy),
            (Status::OUT_OF_RANGE, Errno::OutOfRange),
            (Status::BROKEN_PIPE, Errno::BrokenPipe),
        ];
        for (status, errno) in cases {
            assert_eq!(status.translate(), Translation::Failure(errno), "{}", status);
        }
    }

    #[test]
    fn test_unknown_statuses_fall_back() {
        for raw in [-999, -2999, -2903, -123_456] {
            let translation = Status(raw).translate();
            assert!(translation.is_fallback(), "{}", raw);
            assert_eq!(translation.into_result(), Err(Errno::Protocol));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::HGCM_INTERNAL.to_string(), "HGCM_INTERNAL (-2904)");
        assert_eq!(Status(-77).to_string(), "-77");
    }
}
