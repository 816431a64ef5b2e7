//! Path-based operations: stat, namespace mutation and statvfs

use crate::dict::Dict;
use crate::errno::{Errno, Result};
use crate::fd::link_new;
use crate::iatt::{IAttr, Stat, StatVfs};
use crate::inode::{Gfid, Inode, Location};
use crate::resolve::{resolve, resolve_leaf, Resolved, Symlinks};
use crate::session::Session;
use crate::subvol::Subvolume;

use std::path::Path;

use tracing::debug;

/// Resolves the leaf of a new object: an existing leaf is `EEXIST`, a missing
/// parent is fatal. The returned location carries a fresh unbound inode.
async fn new_entry(subvol: &dyn Subvolume, path: &Path) -> Result<Location> {
    match resolve_leaf(subvol, path, Symlinks::NoFollow).await? {
        Resolved::Existing(_) => Err(Errno::EEXIST),
        Resolved::Absent(mut loc) => {
            loc.inode = Some(Inode::new_unbound());
            Ok(loc)
        }
    }
}

/// Binds the identity of a new object and logs it
fn created(loc: &Location, attr: &IAttr) {
    link_new(loc, attr.gfid, attr.ia_type);
    debug!(path = %loc.path.display(), gfid = ?attr.gfid, ia_type = ?attr.ia_type, "created");
}

impl Session {
    /// Gets the attributes of a path, following a trailing symlink
    /// # Errors
    /// Returns the resolution failure
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn stat(&self, path: &Path) -> Result<Stat> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::Follow).await?;
        Ok(loc.attr.to_stat())
    }

    /// Gets the attributes of a path without following a trailing symlink
    /// # Errors
    /// Returns the resolution failure
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn lstat(&self, path: &Path) -> Result<Stat> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::NoFollow).await?;
        Ok(loc.attr.to_stat())
    }

    /// Checks the access permissions of a path
    /// # Errors
    /// Returns the resolution or backend failure
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn access(&self, path: &Path, mask: i32) -> Result<()> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::Follow).await?;
        subvol.access(&loc, mask).await
    }

    /// Creates a symlink at `path` pointing to `target`
    /// # Errors
    /// + `EEXIST` if `path` exists
    /// + `ENOENT` if the parent directory is missing
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn symlink(&self, target: &Path, path: &Path) -> Result<()> {
        let subvol = self.active_subvol()?;
        let loc = new_entry(&*subvol, path).await?;
        let xdata = Dict::gfid_request(Gfid::generate());
        let attr = subvol.symlink(target, &loc, &xdata).await?;
        created(&loc, &attr);
        Ok(())
    }

    /// Reads a symlink target into `buf`, returns the number of bytes copied.
    /// The target is truncated to the buffer size and not NUL-terminated.
    /// # Errors
    /// + `EINVAL` if `buf` is empty or `path` is not a symlink
    /// + resolution and backend failures
    #[tracing::instrument(level = "debug", skip(self, buf), err)]
    pub async fn readlink(&self, path: &Path, buf: &mut [u8]) -> Result<usize> {
        let subvol = self.active_subvol()?;
        if buf.is_empty() {
            return Err(Errno::EINVAL);
        }
        let loc = resolve(&*subvol, path, Symlinks::NoFollow).await?;
        if !loc.attr.ia_type.is_symlink() {
            return Err(Errno::EINVAL);
        }
        let target = subvol.readlink(&loc, buf.len()).await?;
        let len = target.len().min(buf.len());
        buf[..len].copy_from_slice(&target[..len]);
        Ok(len)
    }

    /// Creates a file system node
    /// # Errors
    /// + `EEXIST` if `path` exists
    /// + `ENOENT` if the parent directory is missing
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn mknod(&self, path: &Path, mode: u32, dev: u64) -> Result<()> {
        let subvol = self.active_subvol()?;
        let loc = new_entry(&*subvol, path).await?;
        let xdata = Dict::gfid_request(Gfid::generate());
        let attr = subvol.mknod(&loc, mode, dev, &xdata).await?;
        created(&loc, &attr);
        Ok(())
    }

    /// Creates a directory
    /// # Errors
    /// + `EEXIST` if `path` exists
    /// + `ENOENT` if the parent directory is missing
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let subvol = self.active_subvol()?;
        let loc = new_entry(&*subvol, path).await?;
        let xdata = Dict::gfid_request(Gfid::generate());
        let attr = subvol.mkdir(&loc, mode, &xdata).await?;
        created(&loc, &attr);
        Ok(())
    }

    /// Removes a non-directory entry
    /// # Errors
    /// + `EISDIR` if `path` is a directory
    /// + resolution and backend failures
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn unlink(&self, path: &Path) -> Result<()> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::NoFollow).await?;
        if loc.attr.is_dir() {
            return Err(Errno::EISDIR);
        }
        subvol.unlink(&loc).await
    }

    /// Removes a directory
    /// # Errors
    /// + `ENOTDIR` if `path` is not a directory
    /// + resolution and backend failures
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn rmdir(&self, path: &Path) -> Result<()> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::NoFollow).await?;
        if !loc.attr.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        subvol.rmdir(&loc).await
    }

    /// Renames `oldpath` to `newpath`. A missing destination is allowed.
    /// # Errors
    /// + `EISDIR` if exactly one of source and existing destination is a
    ///   directory
    /// + resolution and backend failures
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn rename(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        let subvol = self.active_subvol()?;
        let oldloc = resolve(&*subvol, oldpath, Symlinks::NoFollow).await?;
        let newloc = match resolve_leaf(&*subvol, newpath, Symlinks::NoFollow).await? {
            Resolved::Existing(loc) => {
                if loc.attr.is_dir() != oldloc.attr.is_dir() {
                    return Err(Errno::EISDIR);
                }
                loc
            }
            Resolved::Absent(loc) => loc,
        };
        subvol.rename(&oldloc, &newloc).await
    }

    /// Creates a hard link `newpath` to `oldpath`
    /// # Errors
    /// + `EEXIST` if `newpath` exists, checked first
    /// + `EISDIR` if `oldpath` is a directory
    /// + resolution and backend failures
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn link(&self, oldpath: &Path, newpath: &Path) -> Result<()> {
        let subvol = self.active_subvol()?;
        let oldloc = resolve(&*subvol, oldpath, Symlinks::NoFollow).await?;
        let mut newloc = match resolve_leaf(&*subvol, newpath, Symlinks::NoFollow).await? {
            Resolved::Existing(_) => return Err(Errno::EEXIST),
            Resolved::Absent(loc) => loc,
        };
        if oldloc.attr.is_dir() {
            return Err(Errno::EISDIR);
        }
        // the new name refers to the linked object
        newloc.inode = oldloc.inode.clone();
        let _ = subvol.link(&oldloc, &newloc).await?;
        Ok(())
    }

    /// Gets file system statistics, following a trailing symlink
    /// # Errors
    /// Returns the resolution or backend failure
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn statvfs(&self, path: &Path) -> Result<StatVfs> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::Follow).await?;
        subvol.statfs(&loc).await
    }
}
