//! A POSIX-like file operation layer over pluggable backend targets

#![deny(clippy::all)]

#[macro_use]
mod internel_macros;

mod attr;
mod dir;
mod fd;
mod fops;
mod resolve;
mod session;
mod task;
mod xattr;

pub mod buffer_pool;
pub mod dict;
pub mod errno;
pub mod iatt;
pub mod inode;
pub mod iov;
pub mod subvol;
pub mod types;
pub mod utils;

pub use self::dict::Dict;
pub use self::dir::{DirFd, Dirent};
pub use self::errno::{Errno, Result};
pub use self::fd::Fd;
pub use self::iatt::{IAttr, SetAttrValid, Stat, StatVfs, Timespec};
pub use self::inode::{Gfid, Inode, Location, ObjectFd};
pub use self::resolve::Symlinks;
pub use self::session::{Session, SessionBuilder};
pub use self::subvol::{DirEntry, IoBufs, ResolveError, Subvolume};
pub use self::task::{AsyncStdScheduler, IoDone, ReadDone, Scheduler};
