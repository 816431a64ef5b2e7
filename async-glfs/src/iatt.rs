//! Attribute snapshots and their POSIX shapes

use crate::inode::Gfid;
use crate::types::file::{FileMode, FileType, StMode};

use std::convert::TryFrom;

use bitflags::bitflags;

/// A point in time with nanosecond precision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: u32,
}

impl Timespec {
    #[must_use]
    #[inline]
    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    /// The current wall clock time
    #[must_use]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
                nsec: d.subsec_nanos(),
            },
            Err(_) => Self::default(),
        }
    }
}

/// The attribute snapshot of an object, as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IAttr {
    pub gfid: Option<Gfid>,
    pub ino: u64,
    pub dev: u64,
    pub ia_type: FileType,
    pub prot: FileMode,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

/// A POSIX `struct stat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub st_dev: u64,
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u64,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub st_size: i64,
    pub st_blksize: i64,
    pub st_blocks: i64,
    pub st_atime: i64,
    pub st_atime_nsec: i64,
    pub st_mtime: i64,
    pub st_mtime_nsec: i64,
    pub st_ctime: i64,
    pub st_ctime_nsec: i64,
}

impl IAttr {
    /// Translates the snapshot into a POSIX stat
    #[must_use]
    pub fn to_stat(&self) -> Stat {
        let sat = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
        Stat {
            st_dev: self.dev,
            st_ino: self.ino,
            st_mode: StMode::new(self.ia_type, self.prot).as_raw(),
            st_nlink: self.nlink.into(),
            st_uid: self.uid,
            st_gid: self.gid,
            st_rdev: self.rdev,
            st_size: sat(self.size),
            st_blksize: self.blksize.into(),
            st_blocks: sat(self.blocks),
            st_atime: self.atime.sec,
            st_atime_nsec: self.atime.nsec.into(),
            st_mtime: self.mtime.sec,
            st_mtime_nsec: self.mtime.nsec.into(),
            st_ctime: self.ctime.sec,
            st_ctime_nsec: self.ctime.nsec.into(),
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.ia_type.is_dir()
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.ia_type.is_regular()
    }
}

impl From<&IAttr> for Stat {
    #[inline]
    fn from(iatt: &IAttr) -> Self {
        iatt.to_stat()
    }
}

bitflags! {
    /// The fields a setattr request carries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SetAttrValid: u32 {
        const MODE = 1 << 0;
        const UID = 1 << 1;
        const GID = 1 << 2;
        const SIZE = 1 << 3;
        const ATIME = 1 << 4;
        const MTIME = 1 << 5;
    }
}

/// File system statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatVfs {
    pub f_bsize: u64,
    pub f_frsize: u64,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
    pub f_files: u64,
    pub f_ffree: u64,
    pub f_favail: u64,
    pub f_fsid: u64,
    pub f_flag: u64,
    pub f_namemax: u64,
}
