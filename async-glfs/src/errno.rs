//! POSIX error numbers

use std::convert::TryFrom;
use std::fmt::{self, Debug};
use std::io;

/// A POSIX error number
#[derive(Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{}", describe(.0))]
pub struct Errno(i32);

/// Formats an errno the way the OS does
fn describe(raw: &i32) -> io::Error {
    io::Error::from_raw_os_error(*raw)
}

/// The result type of every file operation
pub type Result<T> = std::result::Result<T, Errno>;

impl Errno {
    /// Wraps a raw errno
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw errno
    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Returns the errno as a negative result code, used by completions
    #[must_use]
    #[inline]
    pub fn as_ret(self) -> isize {
        isize::try_from(self.0).map_or(isize::MIN, isize::wrapping_neg)
    }
}

macro_rules! errno_consts {
    ($($name:ident,)+) => {
        impl Errno {
            $(
                #[allow(missing_docs)]
                pub const $name: Self = Self(libc::$name);
            )+
        }
    };
}

errno_consts!(
    EPERM,
    ENOENT,
    EIO,
    EBADF,
    ENOMEM,
    EFBIG,
    EACCES,
    EEXIST,
    EXDEV,
    ENOTDIR,
    EISDIR,
    EINVAL,
    ERANGE,
    ENAMETOOLONG,
    ENOSYS,
    ENOTEMPTY,
    ELOOP,
    ENODATA,
);

impl Debug for Errno {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errno({}: {})", self.0, io::Error::from_raw_os_error(self.0))
    }
}

impl From<Errno> for io::Error {
    #[inline]
    fn from(errno: Errno) -> Self {
        io::Error::from_raw_os_error(errno.0)
    }
}

impl From<io::Error> for Errno {
    #[inline]
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(raw) => Self(raw),
            None => match err.kind() {
                io::ErrorKind::NotFound => Self::ENOENT,
                io::ErrorKind::PermissionDenied => Self::EACCES,
                io::ErrorKind::AlreadyExists => Self::EEXIST,
                io::ErrorKind::InvalidInput => Self::EINVAL,
                io::ErrorKind::OutOfMemory => Self::ENOMEM,
                _ => Self::EIO,
            },
        }
    }
}

/// Converts an operation result into a signed result code
pub(crate) fn to_ret(ret: Result<usize>) -> isize {
    match ret {
        Ok(n) => isize::try_from(n).unwrap_or(isize::MAX),
        Err(errno) => errno.as_ret(),
    }
}
