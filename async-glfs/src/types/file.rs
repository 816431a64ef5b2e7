use crate::utils::better_as::TruncatingCast;

use bitflags::bitflags;

/// The access mode part of open flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::ReadOnly => libc::O_RDONLY,
            Self::WriteOnly => libc::O_WRONLY,
            Self::ReadWrite => libc::O_RDWR,
        }
    }

    /// Extracts the access mode from `open(2)` flags.
    /// Returns `None` for an invalid access mode.
    #[must_use]
    #[inline]
    pub const fn from_flags(flags: i32) -> Option<Self> {
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Some(Self::ReadOnly),
            libc::O_WRONLY => Some(Self::WriteOnly),
            libc::O_RDWR => Some(Self::ReadWrite),
            _ => None,
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_readable(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }

    #[must_use]
    #[inline]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

/// The type of a file system object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Unknown,
    NamedPipe,
    CharacterDevice,
    Directory,
    BlockDevice,
    Regular,
    SymbolicLink,
    Socket,
}

impl Default for FileType {
    #[inline]
    fn default() -> Self {
        Self::Unknown
    }
}

impl FileType {
    /// Converts a `d_type` value. Unexpected values become [`FileType::Unknown`]
    #[inline]
    #[must_use]
    pub const fn from_raw(d_type: u8) -> Self {
        match d_type {
            libc::DT_FIFO => Self::NamedPipe,
            libc::DT_CHR => Self::CharacterDevice,
            libc::DT_DIR => Self::Directory,
            libc::DT_BLK => Self::BlockDevice,
            libc::DT_REG => Self::Regular,
            libc::DT_LNK => Self::SymbolicLink,
            libc::DT_SOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Unknown => libc::DT_UNKNOWN,
            Self::NamedPipe => libc::DT_FIFO,
            Self::CharacterDevice => libc::DT_CHR,
            Self::Directory => libc::DT_DIR,
            Self::BlockDevice => libc::DT_BLK,
            Self::Regular => libc::DT_REG,
            Self::SymbolicLink => libc::DT_LNK,
            Self::Socket => libc::DT_SOCK,
        }
    }

    /// Extracts the type bits of a `st_mode`
    #[must_use]
    #[inline]
    pub fn from_mode(st_mode: u32) -> Self {
        // S_IFMT >> 12 is exactly the DT_* encoding
        Self::from_raw((st_mode & 0o170_000).wrapping_shr(12).truncating_cast())
    }

    #[must_use]
    #[inline]
    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }

    #[must_use]
    #[inline]
    pub fn is_regular(self) -> bool {
        self == Self::Regular
    }

    #[must_use]
    #[inline]
    pub fn is_symlink(self) -> bool {
        self == Self::SymbolicLink
    }
}

bitflags! {
    /// Permission bits of a `st_mode`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileMode: u32 {
        const RWXO = 0o0007;
        const ROTH = 0o0004;
        const WOTH = 0o0002;
        const XOTH = 0o0001;

        const RWXG = 0o0070;
        const RGRP = 0o0040;
        const WGRP = 0o0020;
        const XGRP = 0o0010;

        const RWXU = 0o0700;
        const RUSR = 0o0400;
        const WUSR = 0o0200;
        const XUSR = 0o0100;

        const SUID = 0o4000;
        const SGID = 0o2000;
        const SVTX = 0o1000;
    }
}

/// A full `st_mode`: file type bits plus permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StMode(u32);

impl StMode {
    #[must_use]
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[must_use]
    #[inline]
    pub fn new(ty: FileType, mode: FileMode) -> Self {
        let ty_u32: u32 = ty.as_raw().into();
        Self(ty_u32.wrapping_shl(12) | mode.bits())
    }

    #[must_use]
    #[inline]
    pub fn file_type(self) -> FileType {
        FileType::from_mode(self.0)
    }

    #[must_use]
    #[inline]
    pub const fn file_mode(self) -> FileMode {
        FileMode::from_bits_truncate(self.0)
    }
}

/// Strips the type bits of a `mode_t` argument
#[must_use]
#[inline]
pub const fn mode_to_prot(mode: u32) -> FileMode {
    FileMode::from_bits_truncate(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn st_mode_round_trip() {
        let m = StMode::new(FileType::Directory, FileMode::RWXU | FileMode::RGRP);
        assert_eq!(m.as_raw(), libc::S_IFDIR | 0o740);
        assert_eq!(m.file_type(), FileType::Directory);
        assert_eq!(m.file_mode(), FileMode::RWXU | FileMode::RGRP);

        let reg = StMode::from_raw(libc::S_IFREG | 0o644);
        assert!(reg.file_type().is_regular());
        assert_eq!(FileType::from_mode(libc::S_IFLNK | 0o777), FileType::SymbolicLink);
    }

    #[test]
    fn access_mode() {
        assert_eq!(
            AccessMode::from_flags(libc::O_WRONLY | libc::O_CREAT),
            Some(AccessMode::WriteOnly)
        );
        assert!(!AccessMode::ReadOnly.is_writable());
        assert!(AccessMode::ReadWrite.is_readable());
        assert_eq!(FileType::from_raw(200), FileType::Unknown);
    }
}
