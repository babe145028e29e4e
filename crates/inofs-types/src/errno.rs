//! Status codes returned by filesystem operations.
//!
//! The set is closed and mirrors POSIX errno semantics. Success is not a
//! variant: operations return [`FsResult`], so `OK` is simply `Ok(_)`.

use std::io;
use std::str::FromStr;

use strum::{EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

/// A failed operation's status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Error, EnumIter, EnumString, IntoStaticStr,
)]
pub enum Errno {
    /// No such file or directory.
    #[error("no such file or directory")]
    #[strum(serialize = "ENOENT")]
    NoEnt,

    /// Name already bound.
    #[error("file exists")]
    #[strum(serialize = "EEXIST")]
    Exist,

    /// Expected a directory.
    #[error("not a directory")]
    #[strum(serialize = "ENOTDIR")]
    NotDir,

    /// Expected something other than a directory.
    #[error("is a directory")]
    #[strum(serialize = "EISDIR")]
    IsDir,

    /// Directory still has children.
    #[error("directory not empty")]
    #[strum(serialize = "ENOTEMPTY")]
    NotEmpty,

    /// Permission denied by access mode.
    #[error("permission denied")]
    #[strum(serialize = "EACCES")]
    Access,

    /// Operation not permitted for the caller.
    #[error("operation not permitted")]
    #[strum(serialize = "EPERM")]
    Perm,

    /// Invalid argument.
    #[error("invalid argument")]
    #[strum(serialize = "EINVAL")]
    Inval,

    /// Input/output error.
    #[error("input/output error")]
    #[strum(serialize = "EIO")]
    Io,

    /// The filesystem does not implement this operation.
    #[error("function not implemented")]
    #[strum(serialize = "ENOSYS")]
    NoSys,

    /// Output buffer too small for the result.
    #[error("result too large")]
    #[strum(serialize = "ERANGE")]
    Range,

    /// Resource busy.
    #[error("device or resource busy")]
    #[strum(serialize = "EBUSY")]
    Busy,

    /// Cross-device link.
    #[error("cross-device link")]
    #[strum(serialize = "EXDEV")]
    XDev,

    /// Bad file handle.
    #[error("bad file descriptor")]
    #[strum(serialize = "EBADF")]
    BadF,

    /// No such device.
    #[error("no such device")]
    #[strum(serialize = "ENODEV")]
    NoDev,

    /// Filesystem is read-only.
    #[error("read-only file system")]
    #[strum(serialize = "EROFS")]
    RoFs,

    /// No such attribute.
    #[error("no data available")]
    #[strum(serialize = "ENODATA")]
    NoData,
}

/// How a status should be treated by the code that observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Normal outcome of a valid request against current state.
    Domain,
    /// The implementation omits the operation; not worth retrying.
    Unsupported,
    /// Output buffer too small; retry with the reported size.
    Capacity,
    /// Anything else: bad arguments, I/O faults, misuse.
    Fault,
}

impl Errno {
    /// Host errno number for this status.
    pub fn raw(self) -> i32 {
        match self {
            Errno::NoEnt => libc::ENOENT,
            Errno::Exist => libc::EEXIST,
            Errno::NotDir => libc::ENOTDIR,
            Errno::IsDir => libc::EISDIR,
            Errno::NotEmpty => libc::ENOTEMPTY,
            Errno::Access => libc::EACCES,
            Errno::Perm => libc::EPERM,
            Errno::Inval => libc::EINVAL,
            Errno::Io => libc::EIO,
            Errno::NoSys => libc::ENOSYS,
            Errno::Range => libc::ERANGE,
            Errno::Busy => libc::EBUSY,
            Errno::XDev => libc::EXDEV,
            Errno::BadF => libc::EBADF,
            Errno::NoDev => libc::ENODEV,
            Errno::RoFs => libc::EROFS,
            Errno::NoData => libc::ENODATA,
        }
    }

    /// Map a host errno number back into the closed set.
    ///
    /// Accepts negated values as well, since replies carry `-errno`.
    pub fn from_raw(code: i32) -> Option<Self> {
        use strum::IntoEnumIterator;
        let code = code.checked_abs()?;
        Errno::iter().find(|e| e.raw() == code)
    }

    /// Canonical symbolic name, e.g. `"ENOENT"`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Parse a symbolic name such as `"EEXIST"`.
    pub fn from_name(s: &str) -> Option<Self> {
        Self::from_str(s).ok()
    }

    pub fn class(self) -> ErrorClass {
        match self {
            Errno::NoEnt | Errno::Exist | Errno::NotDir | Errno::IsDir | Errno::NotEmpty => {
                ErrorClass::Domain
            }
            Errno::NoSys => ErrorClass::Unsupported,
            Errno::Range => ErrorClass::Capacity,
            _ => ErrorClass::Fault,
        }
    }
}

/// Result type for every filesystem operation.
pub type FsResult<T> = Result<T, Errno>;

/// Wire status for a result: `0` on success, the positive errno otherwise.
pub fn status_code<T>(result: &FsResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.raw(),
    }
}

impl From<Errno> for io::Error {
    fn from(e: Errno) -> Self {
        io::Error::from_raw_os_error(e.raw())
    }
}

impl From<&io::Error> for Errno {
    fn from(e: &io::Error) -> Self {
        if let Some(errno) = e.raw_os_error().and_then(Errno::from_raw) {
            return errno;
        }
        match e.kind() {
            io::ErrorKind::NotFound => Errno::NoEnt,
            io::ErrorKind::AlreadyExists => Errno::Exist,
            io::ErrorKind::PermissionDenied => Errno::Access,
            io::ErrorKind::InvalidInput => Errno::Inval,
            io::ErrorKind::NotADirectory => Errno::NotDir,
            io::ErrorKind::IsADirectory => Errno::IsDir,
            io::ErrorKind::DirectoryNotEmpty => Errno::NotEmpty,
            io::ErrorKind::ReadOnlyFilesystem => Errno::RoFs,
            io::ErrorKind::ResourceBusy => Errno::Busy,
            io::ErrorKind::CrossesDevices => Errno::XDev,
            io::ErrorKind::Unsupported => Errno::NoSys,
            _ => Errno::Io,
        }
    }
}

impl From<io::Error> for Errno {
    fn from(e: io::Error) -> Self {
        Errno::from(&e)
    }
}
