//! File handles: open, create, I/O and seek

use crate::dict::Dict;
use crate::errno::{Errno, Result};
use crate::iatt::{IAttr, Stat};
use crate::inode::{Gfid, Inode, Location, ObjectFd};
use crate::iov::{self, iov_capacity, iov_length};
use crate::resolve::{resolve, resolve_leaf, Resolved, Symlinks};
use crate::session::Session;
use crate::subvol::Subvolume;
use crate::task::{alloc_bufs, dup_iov, IoOp, IoTask};
use crate::types::file::FileType;

use std::convert::TryFrom;
use std::fmt::{self, Debug};
use std::io::{IoSlice, IoSliceMut};
use std::path::Path;
use std::sync::Arc;

use crossbeam_utils::atomic::AtomicCell;
use tracing::{debug, warn};

/// An open file handle.
///
/// The handle owns a reference to the opened object and a byte offset cursor.
/// It is not meant for concurrent use by multiple callers: the cursor only
/// changes as a direct effect of a call made through the handle.
#[derive(Clone)]
pub struct Fd {
    /// Arc inner
    inner: Arc<FdInner>,
}

/// handle state
struct FdInner {
    /// owner session
    session: Session,
    /// backend open record
    ofd: ObjectFd,
    /// cursor
    offset: AtomicCell<i64>,
}

impl Debug for Fd {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fd")
            .field("gfid", &self.inner.ofd.inode.gfid())
            .field("flags", &self.inner.ofd.flags)
            .field("offset", &self.offset())
            .finish()
    }
}

/// moves an offset forward by `n` bytes
fn advance(offset: i64, n: usize) -> i64 {
    offset.saturating_add(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Session {
    /// Opens a regular file, following a trailing symlink.
    /// # Errors
    /// + `EISDIR` if the path is a directory
    /// + `EINVAL` if the path is not a regular file
    /// + resolution and backend failures
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn open(&self, path: &Path, flags: i32) -> Result<Fd> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, Symlinks::Follow).await?;
        let inode = loc.inode.clone().ok_or(Errno::ENOENT)?;

        if loc.attr.is_dir() {
            return Err(Errno::EISDIR);
        }
        if !loc.attr.is_regular() {
            return Err(Errno::EINVAL);
        }

        let ofd = ObjectFd::create(inode, flags);
        subvol.open(&loc, &ofd).await?;
        Ok(Fd::new(self.clone(), ofd))
    }

    /// Opens or creates a regular file.
    ///
    /// A trailing symlink is followed, so creating through a dangling symlink
    /// creates the link destination.
    /// # Errors
    /// + `EEXIST` if the file exists and `O_EXCL` is given
    /// + `EISDIR` if the path is a directory
    /// + `EINVAL` if the path is not a regular file
    /// + `ENOENT` if the parent directory is missing
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn creat(&self, path: &Path, flags: i32, mode: u32) -> Result<Fd> {
        let subvol = self.active_subvol()?;
        match resolve_leaf(&*subvol, path, Symlinks::Follow).await? {
            Resolved::Existing(loc) => {
                if flags & libc::O_EXCL != 0 {
                    return Err(Errno::EEXIST);
                }
                if loc.attr.is_dir() {
                    return Err(Errno::EISDIR);
                }
                if !loc.attr.is_regular() {
                    return Err(Errno::EINVAL);
                }
                let inode = loc.inode.clone().ok_or(Errno::ENOENT)?;
                let ofd = ObjectFd::create(inode, flags);
                subvol.open(&loc, &ofd).await?;
                Ok(Fd::new(self.clone(), ofd))
            }
            Resolved::Absent(mut loc) => {
                let inode = Inode::new_unbound();
                loc.inode = Some(inode.clone());
                let xdata = Dict::gfid_request(Gfid::generate());

                let ofd = ObjectFd::create(inode, flags);
                let attr = subvol.create(&loc, &ofd, mode, &xdata).await?;
                link_new(&loc, attr.gfid, attr.ia_type);
                debug!(gfid = ?attr.gfid, "created");
                Ok(Fd::new(self.clone(), ofd))
            }
        }
    }
}

/// Binds the new object identity returned by a creating operation
pub(crate) fn link_new(loc: &Location, gfid: Option<Gfid>, ia_type: FileType) {
    if let (Some(inode), Some(gfid)) = (loc.inode.as_ref(), gfid) {
        let _ = inode.bind(gfid, ia_type);
    }
}

impl Fd {
    /// Binds a handle to an open object
    fn new(session: Session, ofd: ObjectFd) -> Self {
        Self {
            inner: Arc::new(FdInner {
                session,
                ofd,
                offset: AtomicCell::new(0),
            }),
        }
    }

    /// The session the handle belongs to
    #[must_use]
    #[inline]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// The open object
    #[must_use]
    #[inline]
    pub fn inode(&self) -> &Inode {
        &self.inner.ofd.inode
    }

    /// `open(2)` flags
    #[must_use]
    #[inline]
    pub fn flags(&self) -> i32 {
        self.inner.ofd.flags
    }

    /// The cursor
    #[must_use]
    #[inline]
    pub fn offset(&self) -> i64 {
        self.inner.offset.load()
    }

    pub(crate) fn object(&self) -> &ObjectFd {
        &self.inner.ofd
    }

    pub(crate) fn subvol(&self) -> Result<Arc<dyn Subvolume>> {
        self.inner.session.active_subvol()
    }

    /// Flushes and releases the handle. The flush result is returned.
    /// # Errors
    /// Returns the flush failure
    pub async fn close(self) -> Result<()> {
        let subvol = self.subvol()?;
        let ret = subvol.flush(self.object()).await;
        debug!(fd = ?self, ?ret, "closed");
        ret
    }

    /// Reads at `offset` into `iov`.
    ///
    /// Copies `min(requested, received)` bytes and moves the cursor past the
    /// copied bytes. A zero-length read leaves the cursor unchanged.
    /// # Errors
    /// Returns the backend failure
    pub async fn preadv(&self, iov: &mut [IoSliceMut<'_>], offset: i64, flags: i32) -> Result<usize> {
        let subvol = self.subvol()?;
        let size = iov_capacity(iov);

        let bufs = subvol.readv(self.object(), size, offset, flags).await?;
        let copied = iov::scatter(&bufs, iov);
        drop(bufs);

        if copied > 0 {
            self.inner.offset.store(advance(offset, copied));
        }
        Ok(copied)
    }

    /// Reads at `offset` into `buf`
    /// # Errors
    /// Returns the backend failure
    pub async fn pread(&self, buf: &mut [u8], offset: i64, flags: i32) -> Result<usize> {
        self.preadv(&mut [IoSliceMut::new(buf)], offset, flags).await
    }

    /// Reads at the cursor into `buf`
    /// # Errors
    /// Returns the backend failure
    pub async fn read(&self, buf: &mut [u8], flags: i32) -> Result<usize> {
        self.pread(buf, self.offset(), flags).await
    }

    /// Reads at the cursor into `iov`
    /// # Errors
    /// Returns the backend failure
    pub async fn readv(&self, iov: &mut [IoSliceMut<'_>], flags: i32) -> Result<usize> {
        self.preadv(iov, self.offset(), flags).await
    }

    /// Writes `iov` at `offset`.
    ///
    /// The data is gathered into one pooled buffer of the total length. The
    /// cursor moves past the bytes the backend accepted; a short write is
    /// returned as is.
    /// # Errors
    /// Returns the backend failure
    pub async fn pwritev(&self, iov: &[IoSlice<'_>], offset: i64, flags: i32) -> Result<usize> {
        let subvol = self.subvol()?;
        let size = iov_length(iov);

        let mut buf = self.session().pool().acquire(size);
        let _ = iov::gather(iov, buf.as_mut());
        let ret = subvol.writev(self.object(), buf.as_ref(), offset, flags).await;
        drop(buf);

        let written = ret?;
        if written > 0 {
            self.inner.offset.store(advance(offset, written));
        }
        if written < size {
            debug!(written, size, "short write");
        }
        Ok(written)
    }

    /// Writes `buf` at `offset`
    /// # Errors
    /// Returns the backend failure
    pub async fn pwrite(&self, buf: &[u8], offset: i64, flags: i32) -> Result<usize> {
        self.pwritev(&[IoSlice::new(buf)], offset, flags).await
    }

    /// Writes `buf` at the cursor
    /// # Errors
    /// Returns the backend failure
    pub async fn write(&self, buf: &[u8], flags: i32) -> Result<usize> {
        self.pwrite(buf, self.offset(), flags).await
    }

    /// Writes `iov` at the cursor
    /// # Errors
    /// Returns the backend failure
    pub async fn writev(&self, iov: &[IoSlice<'_>], flags: i32) -> Result<usize> {
        self.pwritev(iov, self.offset(), flags).await
    }

    /// Repositions the cursor, returns the new offset.
    ///
    /// `SEEK_END` fetches the current size. If that fetch fails, the cursor is
    /// left unchanged and returned without an error.
    /// # Errors
    /// Returns `EINVAL` for an unknown `whence`
    pub async fn lseek(&self, offset: i64, whence: i32) -> Result<i64> {
        match whence {
            libc::SEEK_SET => self.inner.offset.store(offset),
            libc::SEEK_CUR => {
                let cur = self.offset();
                self.inner.offset.store(cur.saturating_add(offset));
            }
            libc::SEEK_END => match self.fetch_attr().await {
                Ok(attr) => {
                    let size = i64::try_from(attr.size).unwrap_or(i64::MAX);
                    self.inner.offset.store(size.saturating_add(offset));
                }
                Err(errno) => {
                    warn!(fd = ?self, %errno, "failed to fetch size for SEEK_END, offset unchanged");
                }
            },
            _ => return Err(Errno::EINVAL),
        }
        Ok(self.offset())
    }

    /// fetches the attributes of the open object
    async fn fetch_attr(&self) -> Result<IAttr> {
        let subvol = self.subvol()?;
        subvol.fstat(self.object()).await
    }

    /// Gets the attributes of the open object
    /// # Errors
    /// Returns the backend failure
    pub async fn fstat(&self) -> Result<Stat> {
        Ok(self.fetch_attr().await?.to_stat())
    }

    /// Synchronizes file data and metadata
    /// # Errors
    /// Returns the backend failure
    pub async fn fsync(&self) -> Result<()> {
        self.subvol()?.fsync(self.object(), false).await
    }

    /// Synchronizes file data
    /// # Errors
    /// Returns the backend failure
    pub async fn fdatasync(&self) -> Result<()> {
        self.subvol()?.fsync(self.object(), true).await
    }

    /// Truncates or extends the open file
    /// # Errors
    /// Returns the backend failure
    pub async fn ftruncate(&self, size: u64) -> Result<()> {
        self.subvol()?.ftruncate(self.object(), size).await
    }

    /// Submits a vectored read at `offset` into newly allocated buffers of the
    /// given sizes. `done` receives the result and the buffers.
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn preadv_async<F>(&self, sizes: &[usize], offset: i64, flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize, Vec<Vec<u8>>) + Send + 'static,
    {
        let bufs = alloc_bufs(sizes.iter().copied())?;
        let op = IoOp::Read {
            bufs,
            offset,
            flags,
            done: Box::new(done),
        };
        IoTask::new(self.clone(), op).submit()
    }

    /// Submits a read of `size` bytes at `offset`. `done` receives the data
    /// read.
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn pread_async<F>(&self, size: usize, offset: i64, flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize, Vec<u8>) + Send + 'static,
    {
        self.preadv_async(&[size], offset, flags, move |fd, ret, mut bufs| {
            let mut buf = bufs.pop().unwrap_or_default();
            buf.truncate(usize::try_from(ret).unwrap_or(0));
            done(fd, ret, buf);
        })
    }

    /// Submits a read of `size` bytes at the cursor
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn read_async<F>(&self, size: usize, flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize, Vec<u8>) + Send + 'static,
    {
        self.pread_async(size, self.offset(), flags, done)
    }

    /// Submits a vectored read at the cursor
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn readv_async<F>(&self, sizes: &[usize], flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize, Vec<Vec<u8>>) + Send + 'static,
    {
        self.preadv_async(sizes, self.offset(), flags, done)
    }

    /// Submits a vectored write at `offset`. The data is copied before this
    /// call returns.
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn pwritev_async<F>(&self, iov: &[IoSlice<'_>], offset: i64, flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize) + Send + 'static,
    {
        let data = dup_iov(iov)?;
        let op = IoOp::Write {
            data,
            offset,
            flags,
            done: Box::new(done),
        };
        IoTask::new(self.clone(), op).submit()
    }

    /// Submits a write at `offset`
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn pwrite_async<F>(&self, buf: &[u8], offset: i64, flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize) + Send + 'static,
    {
        self.pwritev_async(&[IoSlice::new(buf)], offset, flags, done)
    }

    /// Submits a write at the cursor
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn write_async<F>(&self, buf: &[u8], flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize) + Send + 'static,
    {
        self.pwrite_async(buf, self.offset(), flags, done)
    }

    /// Submits a vectored write at the cursor
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn writev_async<F>(&self, iov: &[IoSlice<'_>], flags: i32, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize) + Send + 'static,
    {
        self.pwritev_async(iov, self.offset(), flags, done)
    }

    /// Submits a truncate
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn ftruncate_async<F>(&self, size: u64, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize) + Send + 'static,
    {
        let op = IoOp::Ftruncate {
            size,
            done: Box::new(done),
        };
        IoTask::new(self.clone(), op).submit()
    }

    /// Submits an fsync
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn fsync_async<F>(&self, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize) + Send + 'static,
    {
        let op = IoOp::Fsync {
            datasync: false,
            done: Box::new(done),
        };
        IoTask::new(self.clone(), op).submit()
    }

    /// Submits an fdatasync
    /// # Errors
    /// Returns a submission failure, in which case `done` is never invoked
    pub fn fdatasync_async<F>(&self, done: F) -> Result<()>
    where
        F: FnOnce(&Self, isize) + Send + 'static,
    {
        let op = IoOp::Fsync {
            datasync: true,
            done: Box::new(done),
        };
        IoTask::new(self.clone(), op).submit()
    }
}
