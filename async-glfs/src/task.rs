//! Asynchronous I/O tasks and the scheduler they are submitted to

use crate::errno::{to_ret, Errno, Result};
use crate::fd::Fd;
use crate::iov::iov_length;

use std::fmt::{self, Debug};
use std::io::{IoSlice, IoSliceMut};

use async_std::task;
use futures::future::BoxFuture;
use smallvec::SmallVec;
use tracing::{debug, debug_span};
use tracing_futures::Instrument;

/// Runs submitted futures to completion
pub trait Scheduler: Debug + Send + Sync {
    /// Submits a detached task.
    /// # Errors
    /// Returns an error if the task can not be scheduled; the future is
    /// dropped without being polled.
    fn submit(&self, name: &'static str, task: BoxFuture<'static, ()>) -> Result<()>;
}

/// Spawns each task on the async-std executor
#[derive(Debug, Default, Clone, Copy)]
pub struct AsyncStdScheduler;

impl Scheduler for AsyncStdScheduler {
    #[inline]
    fn submit(&self, name: &'static str, task: BoxFuture<'static, ()>) -> Result<()> {
        let _ = task::Builder::new().name(name.to_owned()).spawn(task)?; // task is detached here
        Ok(())
    }
}

/// continuation of a read
pub type ReadDone = Box<dyn FnOnce(&Fd, isize, Vec<Vec<u8>>) + Send + 'static>;

/// continuation of every other operation
pub type IoDone = Box<dyn FnOnce(&Fd, isize) + Send + 'static>;

/// An asynchronous operation with its owned buffers and continuation
pub(crate) enum IoOp {
    /// preadv
    Read {
        bufs: Vec<Vec<u8>>,
        offset: i64,
        flags: i32,
        done: ReadDone,
    },
    /// pwritev
    Write {
        data: Vec<u8>,
        offset: i64,
        flags: i32,
        done: IoDone,
    },
    /// ftruncate
    Ftruncate { size: u64, done: IoDone },
    /// fsync or fdatasync
    Fsync { datasync: bool, done: IoDone },
}

impl IoOp {
    /// op name
    const fn name(&self) -> &'static str {
        match *self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Ftruncate { .. } => "ftruncate",
            Self::Fsync { datasync: false, .. } => "fsync",
            Self::Fsync { datasync: true, .. } => "fdatasync",
        }
    }
}

impl Debug for IoOp {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Read {
                ref bufs, offset, ..
            } => f
                .debug_struct("Read")
                .field("nbufs", &bufs.len())
                .field("offset", &offset)
                .finish(),
            Self::Write {
                ref data, offset, ..
            } => f
                .debug_struct("Write")
                .field("len", &data.len())
                .field("offset", &offset)
                .finish(),
            Self::Ftruncate { size, .. } => f.debug_struct("Ftruncate").field("size", &size).finish(),
            Self::Fsync { datasync, .. } => f.debug_struct("Fsync").field("datasync", &datasync).finish(),
        }
    }
}

/// A self-contained asynchronous I/O task.
///
/// The task owns its handle, its buffers and its continuation. Running it
/// consumes all three, so the continuation is invoked exactly once.
#[derive(Debug)]
pub(crate) struct IoTask {
    /// target handle
    fd: Fd,
    /// operation
    op: IoOp,
}

impl IoTask {
    pub(crate) const fn new(fd: Fd, op: IoOp) -> Self {
        Self { fd, op }
    }

    /// Submits the task to the session scheduler
    pub(crate) fn submit(self) -> Result<()> {
        let name = self.op.name();
        let span = debug_span!("io_task", op = name);
        let scheduler = self.fd.session().scheduler();
        debug!(fd = ?self.fd, op = ?self.op, "submitting");
        scheduler.submit(name, Box::pin(self.run().instrument(span)))
    }

    /// Runs the operation and invokes its continuation
    async fn run(self) {
        let Self { fd, op } = self;
        match op {
            IoOp::Read {
                mut bufs,
                offset,
                flags,
                done,
            } => {
                let ret = {
                    let mut iov: SmallVec<[IoSliceMut<'_>; 4]> =
                        bufs.iter_mut().map(|b| IoSliceMut::new(b)).collect();
                    fd.preadv(&mut iov, offset, flags).await
                };
                let ret = to_ret(ret);
                debug!(ret, "read done");
                done(&fd, ret, bufs);
            }
            IoOp::Write {
                data,
                offset,
                flags,
                done,
            } => {
                let ret = to_ret(fd.pwrite(&data, offset, flags).await);
                drop(data);
                debug!(ret, "write done");
                done(&fd, ret);
            }
            IoOp::Ftruncate { size, done } => {
                let ret = to_ret(fd.ftruncate(size).await.map(|()| 0));
                done(&fd, ret);
            }
            IoOp::Fsync { datasync, done } => {
                let ret = if datasync {
                    fd.fdatasync().await
                } else {
                    fd.fsync().await
                };
                done(&fd, to_ret(ret.map(|()| 0)));
            }
        }
    }
}

/// Copies caller data into an owned buffer.
/// # Errors
/// Returns `ENOMEM` if the copy can not be allocated
pub(crate) fn dup_iov(iov: &[IoSlice<'_>]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(iov_length(iov))
        .map_err(|_| Errno::ENOMEM)?;
    for chunk in iov {
        data.extend_from_slice(chunk);
    }
    Ok(data)
}

/// Allocates owned read buffers of the given sizes.
/// # Errors
/// Returns `ENOMEM` if the buffers can not be allocated
pub(crate) fn alloc_bufs(sizes: impl Iterator<Item = usize>) -> Result<Vec<Vec<u8>>> {
    let mut bufs = Vec::new();
    for size in sizes {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| Errno::ENOMEM)?;
        buf.resize(size, 0);
        bufs.try_reserve(1).map_err(|_| Errno::ENOMEM)?;
        bufs.push(buf);
    }
    Ok(bufs)
}
