//! The backend contract: path resolution plus the operation dispatcher

use crate::buffer_pool::IoBuf;
use crate::dict::Dict;
use crate::errno::{Errno, Result};
use crate::iatt::{IAttr, SetAttrValid, StatVfs};
use crate::inode::{Location, ObjectFd};
use crate::types::file::FileType;

use std::ffi::OsString;
use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use smallvec::SmallVec;

/// Buffers returned by a backend read, owned by the caller of `readv`
pub type IoBufs = SmallVec<[IoBuf; 2]>;

/// A failed resolution.
///
/// `partial` holds whatever was resolved before the failure. A missing leaf
/// under an existing directory is reported as `ENOENT` with `partial.parent`
/// set and `partial.name` naming the missing leaf.
#[derive(Debug, thiserror::Error)]
#[error("failed to resolve {}: {}", .partial.path.display(), .errno)]
pub struct ResolveError {
    /// the failure
    pub errno: Errno,
    /// the partially resolved location
    pub partial: Location,
}

impl ResolveError {
    /// Creates a [`ResolveError`] without any resolved part
    #[must_use]
    pub fn new(errno: Errno, path: &Path) -> Self {
        Self {
            errno,
            partial: Location::new(path),
        }
    }
}

/// A directory entry, as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// inode number
    pub d_ino: u64,
    /// the cookie of the position after this entry
    pub d_off: i64,
    /// entry type
    pub d_type: FileType,
    /// entry name
    pub d_name: OsString,
}

/// A backend target.
///
/// Every operation is dispatched against the target that is active for the
/// session at call time. Errors are passed through to the caller unmodified.
#[async_trait]
pub trait Subvolume: Debug + Send + Sync {
    /// Resolves a path. A trailing symlink is followed only if `follow` is set;
    /// symlinks in intermediate components are always followed.
    async fn resolve(&self, path: &Path, follow: bool) -> std::result::Result<Location, ResolveError>;

    async fn open(&self, loc: &Location, fd: &ObjectFd) -> Result<()>;

    /// Creates and opens a regular file. The new object binds the unbound
    /// `loc.inode`, using the identity requested in `xdata` if any.
    async fn create(&self, loc: &Location, fd: &ObjectFd, mode: u32, xdata: &Dict) -> Result<IAttr>;

    async fn opendir(&self, loc: &Location, fd: &ObjectFd) -> Result<()>;

    async fn access(&self, loc: &Location, mask: i32) -> Result<()>;

    async fn symlink(&self, target: &Path, loc: &Location, xdata: &Dict) -> Result<IAttr>;

    /// Reads at most `size` bytes of a link target
    async fn readlink(&self, loc: &Location, size: usize) -> Result<Vec<u8>>;

    async fn mknod(&self, loc: &Location, mode: u32, rdev: u64, xdata: &Dict) -> Result<IAttr>;

    async fn mkdir(&self, loc: &Location, mode: u32, xdata: &Dict) -> Result<IAttr>;

    async fn unlink(&self, loc: &Location) -> Result<()>;

    async fn rmdir(&self, loc: &Location) -> Result<()>;

    async fn rename(&self, old: &Location, new: &Location) -> Result<()>;

    async fn link(&self, old: &Location, new: &Location) -> Result<IAttr>;

    async fn statfs(&self, loc: &Location) -> Result<StatVfs>;

    async fn setattr(&self, loc: &Location, attr: &IAttr, valid: SetAttrValid) -> Result<IAttr>;

    /// Gets one attribute, or all of them if `name` is `None`
    async fn getxattr(&self, loc: &Location, name: Option<&str>) -> Result<Dict>;

    async fn setxattr(&self, loc: &Location, dict: &Dict, flags: i32) -> Result<()>;

    async fn removexattr(&self, loc: &Location, name: &str) -> Result<()>;

    async fn flush(&self, fd: &ObjectFd) -> Result<()>;

    async fn fstat(&self, fd: &ObjectFd) -> Result<IAttr>;

    /// Reads at most `size` bytes at `offset`
    async fn readv(&self, fd: &ObjectFd, size: usize, offset: i64, flags: i32) -> Result<IoBufs>;

    /// Writes `data` at `offset`, returns the number of bytes accepted
    async fn writev(&self, fd: &ObjectFd, data: &[u8], offset: i64, flags: i32) -> Result<usize>;

    async fn fsync(&self, fd: &ObjectFd, datasync: bool) -> Result<()>;

    async fn ftruncate(&self, fd: &ObjectFd, size: u64) -> Result<()>;

    /// Lists the entries after the cookie `offset`, filling at most `size`
    /// bytes of dirent records. An empty batch marks the end of the directory.
    async fn readdir(&self, fd: &ObjectFd, size: usize, offset: i64) -> Result<Vec<DirEntry>>;

    async fn fsetattr(&self, fd: &ObjectFd, attr: &IAttr, valid: SetAttrValid) -> Result<IAttr>;

    async fn fgetxattr(&self, fd: &ObjectFd, name: Option<&str>) -> Result<Dict>;

    async fn fsetxattr(&self, fd: &ObjectFd, dict: &Dict, flags: i32) -> Result<()>;

    async fn fremovexattr(&self, fd: &ObjectFd, name: &str) -> Result<()>;
}
