//! Directory handles with a batched, cookie-indexed entry cache

use crate::errno::{Errno, Result};
use crate::inode::ObjectFd;
use crate::resolve::{resolve, Symlinks};
use crate::session::Session;
use crate::subvol::DirEntry;
use crate::types::file::FileType;
use crate::types::NAME_MAX;
use crate::utils::c_bytes::copy_truncated;

use std::ffi::OsStr;
use std::fmt::{self, Debug};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::{debug, trace};

/// A POSIX `dirent` record
#[derive(Clone, Copy)]
pub struct Dirent {
    /// inode number
    pub d_ino: u64,
    /// cookie of the next entry
    pub d_off: i64,
    /// entry type
    pub d_type: FileType,
    /// NUL-terminated name, truncated to `NAME_MAX` bytes
    pub d_name: [u8; NAME_MAX + 1],
    /// name length without the NUL
    name_len: usize,
}

impl Dirent {
    /// Converts a backend entry
    fn from_entry(entry: &DirEntry) -> Self {
        let mut d_name = [0; NAME_MAX + 1];
        let name_len = copy_truncated(&mut d_name, entry.d_name.as_bytes());
        Self {
            d_ino: entry.d_ino,
            d_off: entry.d_off,
            d_type: entry.d_type,
            d_name,
            name_len,
        }
    }

    /// Entry name
    #[must_use]
    pub fn name(&self) -> &OsStr {
        OsStr::from_bytes(&self.d_name[..self.name_len])
    }
}

impl Debug for Dirent {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dirent")
            .field("d_ino", &self.d_ino)
            .field("d_off", &self.d_off)
            .field("d_type", &self.d_type)
            .field("d_name", &self.name())
            .finish()
    }
}

/// An open directory handle.
///
/// The handle caches one batch of entries. `next` indexes the next entry to
/// return; `None` means the cache is empty or exhausted and the next read
/// refreshes it from the current cookie.
pub struct DirFd {
    /// owner session
    session: Session,
    /// backend open record
    ofd: ObjectFd,
    /// the cookie of the next entry to read
    offset: i64,
    /// cached batch
    entries: Vec<DirEntry>,
    /// cursor into the batch
    next: Option<usize>,
}

impl Debug for DirFd {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirFd")
            .field("gfid", &self.ofd.inode.gfid())
            .field("offset", &self.offset)
            .field("cached", &self.entries.len())
            .field("next", &self.next)
            .finish()
    }
}

impl Session {
    /// Opens a directory, following a trailing symlink.
    /// # Errors
    /// + `ENOTDIR` if the path is not a directory
    /// + resolution and backend failures
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn opendir(&self, path: &Path) -> Result<DirFd> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::Follow).await?;
        let inode = loc.inode.clone().ok_or(Errno::ENOENT)?;
        if !loc.attr.is_dir() {
            return Err(Errno::ENOTDIR);
        }

        let ofd = ObjectFd::create(inode, libc::O_RDONLY | libc::O_DIRECTORY);
        subvol.opendir(&loc, &ofd).await?;
        Ok(DirFd {
            session: self.clone(),
            ofd,
            offset: 0,
            entries: Vec::new(),
            next: None,
        })
    }
}

impl DirFd {
    /// Returns the next entry, or `None` at the end of the directory
    /// # Errors
    /// Returns the backend listing failure
    pub async fn readdir(&mut self) -> Result<Option<Dirent>> {
        if self.offset == 0 || self.next.is_none() {
            self.refresh().await?;
        }
        let idx = match self.next {
            Some(idx) => idx,
            None => return Ok(None),
        };
        let entry = match self.entries.get(idx) {
            Some(entry) => entry,
            None => {
                self.next = None;
                return Ok(None);
            }
        };

        let next = idx.wrapping_add(1);
        self.next = if next < self.entries.len() {
            Some(next)
        } else {
            None
        };
        self.offset = entry.d_off;
        Ok(Some(Dirent::from_entry(entry)))
    }

    /// The cookie of the next entry to read
    #[must_use]
    #[inline]
    pub const fn telldir(&self) -> i64 {
        self.offset
    }

    /// Moves to a cookie.
    ///
    /// If the cookie belongs to a cached entry that is not the last one, the
    /// cursor moves to the following entry without refetching. Otherwise the
    /// next read refreshes the cache from the cookie.
    pub fn seekdir(&mut self, offset: i64) {
        if self.offset == offset {
            return;
        }
        self.offset = offset;
        self.next = None;

        if let Some(pos) = self.entries.iter().position(|e| e.d_off == offset) {
            let next = pos.wrapping_add(1);
            if next < self.entries.len() {
                self.next = Some(next);
            }
        }
        trace!(offset, next = ?self.next, "seekdir");
    }

    /// Moves back to the first entry
    pub fn rewinddir(&mut self) {
        self.seekdir(0);
    }

    /// Releases the handle and its cached entries
    pub fn closedir(self) {
        debug!(dir = ?self, "closedir");
    }

    /// Requests a batch from the current cookie and installs it.
    ///
    /// The previous batch is released only after the new one is in place.
    async fn refresh(&mut self) -> Result<()> {
        let subvol = self.session.active_subvol()?;
        let batch = subvol
            .readdir(&self.ofd, self.session.readdir_batch(), self.offset)
            .await?;

        let old = mem::replace(&mut self.entries, batch);
        self.next = if self.entries.is_empty() { None } else { Some(0) };
        trace!(offset = self.offset, len = self.entries.len(), "readdir batch");
        drop(old);
        Ok(())
    }
}
