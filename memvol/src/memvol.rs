use crate::node::NodeData;
use crate::tree::Tree;

use async_glfs::buffer_pool::IoBuf;
use async_glfs::dict::{xattr_flags, Dict};
use async_glfs::errno::{Errno, Result};
use async_glfs::iatt::{IAttr, SetAttrValid, StatVfs, Timespec};
use async_glfs::inode::{Gfid, Inode, Location, ObjectFd};
use async_glfs::subvol::{DirEntry, IoBufs, ResolveError, Subvolume};
use async_glfs::types::file::{mode_to_prot, AccessMode, FileMode, FileType};
use async_glfs::types::{NAME_MAX, PATH_MAX};
use async_glfs::utils::DisplayBytes;

use std::convert::TryFrom;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_std::sync::Mutex;
use async_trait::async_trait;
use tracing::debug;

/// backend read buffer size
const READ_CHUNK: usize = 4096;

/// largest file the volume holds
const MAX_FILE_SIZE: usize = 1 << 30;

/// fault injection and call accounting
#[derive(Debug, Default)]
struct Knobs {
    /// maximum bytes accepted by one write, 0 for unlimited
    max_write: AtomicUsize,
    /// fstat fails with EIO
    fail_fstat: AtomicBool,
    /// readdir calls
    readdir_calls: AtomicUsize,
    /// fsync calls
    fsync_calls: AtomicUsize,
}

/// An in-memory volume
#[derive(Debug)]
pub struct MemVolume {
    /// volume name
    name: String,
    /// namespace
    tree: Mutex<Tree>,
    /// test knobs
    knobs: Knobs,
}

/// the object of a resolved location
fn target(loc: &Location) -> Result<Gfid> {
    loc.inode.as_ref().and_then(Inode::gfid).ok_or(Errno::ENOENT)
}

/// the parent directory and leaf name of a location
fn entry(loc: &Location) -> Result<(Gfid, &OsStr)> {
    let parent = loc.parent.as_ref().and_then(Inode::gfid).ok_or(Errno::ENOENT)?;
    let name = loc.name().ok_or(Errno::EINVAL)?;
    Ok((parent, name))
}

/// the object of an open record
fn object(fd: &ObjectFd) -> Result<Gfid> {
    fd.inode.gfid().ok_or(Errno::EBADF)
}

/// converts a file offset
fn position(offset: i64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| Errno::EINVAL)
}

/// resizes file content, zero-filling any growth
fn resize(content: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > MAX_FILE_SIZE {
        return Err(Errno::EFBIG);
    }
    if len > content.len() {
        content
            .try_reserve_exact(len.wrapping_sub(content.len()))
            .map_err(|_| Errno::ENOMEM)?;
    }
    content.resize(len, 0);
    Ok(())
}

impl MemVolume {
    /// Creates an empty volume
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            tree: Mutex::new(Tree::new()),
            knobs: Knobs::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Caps the bytes accepted by one write. `None` removes the cap.
    pub fn set_max_write(&self, max: Option<usize>) {
        self.knobs.max_write.store(max.unwrap_or(0), Ordering::SeqCst);
    }

    /// Makes every fstat fail with `EIO`
    pub fn set_fail_fstat(&self, fail: bool) {
        self.knobs.fail_fstat.store(fail, Ordering::SeqCst);
    }

    /// The number of readdir batches served
    #[must_use]
    pub fn readdir_calls(&self) -> usize {
        self.knobs.readdir_calls.load(Ordering::SeqCst)
    }

    /// The number of fsync and fdatasync calls served
    #[must_use]
    pub fn fsync_calls(&self) -> usize {
        self.knobs.fsync_calls.load(Ordering::SeqCst)
    }

    /// The references callers hold on the object at `path`, or `None` if the
    /// path does not resolve
    pub async fn inode_refs(&self, path: &Path) -> Option<usize> {
        let mut tree = self.tree.lock().await;
        let loc = tree.resolve(path, false).ok()?;
        let gfid = loc.inode.as_ref().and_then(Inode::gfid)?;
        drop(loc);
        tree.inode_refs(gfid)
    }

    /// creates a node under a resolved parent
    async fn make_node(&self, loc: &Location, ia_type: FileType, mode: u32, data: NodeData, xdata: &Dict) -> Result<IAttr> {
        let mut tree = self.tree.lock().await;
        let attr = tree.insert(loc, ia_type, mode_to_prot(mode), data, xdata)?;
        debug!(
            volume = %self.name,
            path = %loc.path.display(),
            gfid = ?attr.gfid,
            ?ia_type,
            "node created"
        );
        Ok(attr)
    }

    /// applies the selected attributes
    async fn set_attr(&self, gfid: Gfid, attr: &IAttr, valid: SetAttrValid) -> Result<IAttr> {
        let mut tree = self.tree.lock().await;
        let node = tree.get_mut(gfid)?;
        if valid.contains(SetAttrValid::SIZE) {
            match node.data {
                NodeData::Regular(ref mut data) => {
                    resize(data, usize::try_from(attr.size).map_err(|_| Errno::EFBIG)?)?;
                }
                NodeData::Directory(_) => return Err(Errno::EISDIR),
                _ => return Err(Errno::EINVAL),
            }
            node.update_size();
            node.attr.mtime = Timespec::now();
        }
        if valid.contains(SetAttrValid::MODE) {
            node.attr.prot = attr.prot;
        }
        if valid.contains(SetAttrValid::UID) {
            node.attr.uid = attr.uid;
        }
        if valid.contains(SetAttrValid::GID) {
            node.attr.gid = attr.gid;
        }
        if valid.contains(SetAttrValid::ATIME) {
            node.attr.atime = attr.atime;
        }
        if valid.contains(SetAttrValid::MTIME) {
            node.attr.mtime = attr.mtime;
        }
        node.attr.ctime = Timespec::now();
        Ok(node.attr)
    }

    /// reads one or all extended attributes
    async fn get_xattr(&self, gfid: Gfid, name: Option<&str>) -> Result<Dict> {
        let tree = self.tree.lock().await;
        let xattrs = &tree.get(gfid)?.xattrs;
        match name {
            None => Ok(xattrs.clone()),
            Some(name) => {
                let value = xattrs.get(name).ok_or(Errno::ENODATA)?;
                Ok(Dict::for_key_value(name, value))
            }
        }
    }

    /// sets extended attributes with create/replace semantics
    async fn set_xattr(&self, gfid: Gfid, dict: &Dict, flags: i32) -> Result<()> {
        let mut tree = self.tree.lock().await;
        let node = tree.get_mut(gfid)?;
        for key in dict.keys() {
            let exists = node.xattrs.contains_key(key);
            if flags & xattr_flags::XATTR_CREATE != 0 && exists {
                return Err(Errno::EEXIST);
            }
            if flags & xattr_flags::XATTR_REPLACE != 0 && !exists {
                return Err(Errno::ENODATA);
            }
        }
        for (key, value) in dict.iter() {
            debug!(key, value = %DisplayBytes(value), "setxattr");
            let _ = node.xattrs.set(key, value.to_vec());
        }
        node.attr.ctime = Timespec::now();
        Ok(())
    }

    /// removes an extended attribute
    async fn remove_xattr(&self, gfid: Gfid, name: &str) -> Result<()> {
        let mut tree = self.tree.lock().await;
        let node = tree.get_mut(gfid)?;
        let _ = node.xattrs.remove(name).ok_or(Errno::ENODATA)?;
        node.attr.ctime = Timespec::now();
        Ok(())
    }
}

#[async_trait]
impl Subvolume for MemVolume {
    async fn resolve(&self, path: &Path, follow: bool) -> std::result::Result<Location, ResolveError> {
        self.tree.lock().await.resolve(path, follow)
    }

    async fn open(&self, loc: &Location, fd: &ObjectFd) -> Result<()> {
        let gfid = target(loc)?;
        let mut tree = self.tree.lock().await;
        let node = tree.get_mut(gfid)?;
        let mode = AccessMode::from_flags(fd.flags).ok_or(Errno::EINVAL)?;
        match node.data {
            NodeData::Regular(ref mut data) => {
                if fd.flags & libc::O_TRUNC != 0 && mode.is_writable() {
                    data.clear();
                    node.update_size();
                    node.touch();
                }
                Ok(())
            }
            NodeData::Directory(_) if mode.is_writable() => Err(Errno::EISDIR),
            _ => Ok(()),
        }
    }

    async fn create(&self, loc: &Location, fd: &ObjectFd, mode: u32, xdata: &Dict) -> Result<IAttr> {
        let _ = AccessMode::from_flags(fd.flags).ok_or(Errno::EINVAL)?;
        self.make_node(loc, FileType::Regular, mode, NodeData::Regular(Vec::new()), xdata)
            .await
    }

    async fn opendir(&self, loc: &Location, _: &ObjectFd) -> Result<()> {
        let gfid = target(loc)?;
        let tree = self.tree.lock().await;
        let _ = tree.get(gfid)?.dir().ok_or(Errno::ENOTDIR)?;
        Ok(())
    }

    async fn access(&self, loc: &Location, mask: i32) -> Result<()> {
        let gfid = target(loc)?;
        let tree = self.tree.lock().await;
        let prot = tree.get(gfid)?.attr.prot;
        let wanted = [
            (libc::R_OK, FileMode::RUSR),
            (libc::W_OK, FileMode::WUSR),
            (libc::X_OK, FileMode::XUSR),
        ];
        for &(bit, perm) in &wanted {
            if mask & bit != 0 && !prot.contains(perm) {
                return Err(Errno::EACCES);
            }
        }
        Ok(())
    }

    async fn symlink(&self, target: &Path, loc: &Location, xdata: &Dict) -> Result<IAttr> {
        if target.as_os_str().len() >= PATH_MAX {
            return Err(Errno::ENAMETOOLONG);
        }
        let data = NodeData::SymLink(target.to_owned());
        self.make_node(loc, FileType::SymbolicLink, 0o777, data, xdata).await
    }

    async fn readlink(&self, loc: &Location, size: usize) -> Result<Vec<u8>> {
        let gfid = target(loc)?;
        let tree = self.tree.lock().await;
        match tree.get(gfid)?.data {
            NodeData::SymLink(ref target) => {
                let bytes = target.as_os_str().as_bytes();
                Ok(bytes[..bytes.len().min(size)].to_vec())
            }
            _ => Err(Errno::EINVAL),
        }
    }

    async fn mknod(&self, loc: &Location, mode: u32, _rdev: u64, xdata: &Dict) -> Result<IAttr> {
        let ia_type = match FileType::from_mode(mode) {
            FileType::Unknown => FileType::Regular,
            FileType::Directory | FileType::SymbolicLink => return Err(Errno::EINVAL),
            other => other,
        };
        let data = if ia_type.is_regular() {
            NodeData::Regular(Vec::new())
        } else {
            NodeData::Special
        };
        self.make_node(loc, ia_type, mode, data, xdata).await
    }

    async fn mkdir(&self, loc: &Location, mode: u32, xdata: &Dict) -> Result<IAttr> {
        let data = NodeData::Directory(Default::default());
        self.make_node(loc, FileType::Directory, mode, data, xdata).await
    }

    async fn unlink(&self, loc: &Location) -> Result<()> {
        let (parent, name) = entry(loc)?;
        let mut tree = self.tree.lock().await;
        let gfid = target(loc)?;
        if tree.get(gfid)?.attr.ia_type.is_dir() {
            return Err(Errno::EISDIR);
        }
        let _ = tree.detach(parent, name)?;
        Ok(())
    }

    async fn rmdir(&self, loc: &Location) -> Result<()> {
        let (parent, name) = entry(loc)?;
        let gfid = target(loc)?;
        if gfid == Gfid::ROOT {
            return Err(Errno::EPERM);
        }
        let mut tree = self.tree.lock().await;
        match tree.get(gfid)?.dir() {
            Some(entries) if !entries.is_empty() => return Err(Errno::ENOTEMPTY),
            Some(_) => {}
            None => return Err(Errno::ENOTDIR),
        }
        let _ = tree.detach(parent, name)?;
        Ok(())
    }

    async fn rename(&self, old: &Location, new: &Location) -> Result<()> {
        let src = entry(old)?;
        let dst = entry(new)?;
        self.tree.lock().await.rename(src, dst)
    }

    async fn link(&self, old: &Location, new: &Location) -> Result<IAttr> {
        let gfid = target(old)?;
        let (parent, name) = entry(new)?;
        let mut tree = self.tree.lock().await;
        if tree.get(gfid)?.attr.ia_type.is_dir() {
            return Err(Errno::EPERM);
        }
        tree.add_link(gfid, parent, name)
    }

    async fn statfs(&self, loc: &Location) -> Result<StatVfs> {
        let _ = target(loc)?;
        let tree = self.tree.lock().await;
        let files = u64::try_from(tree.len()).unwrap_or(u64::MAX);
        let name_max = u64::try_from(NAME_MAX).unwrap_or(u64::MAX);
        Ok(StatVfs {
            f_bsize: 4096,
            f_frsize: 4096,
            f_blocks: 1 << 20,
            f_bfree: 1 << 20,
            f_bavail: 1 << 20,
            f_files: files,
            f_ffree: u64::MAX - files,
            f_favail: u64::MAX - files,
            f_fsid: 0x6d76,
            f_flag: 0,
            f_namemax: name_max,
        })
    }

    async fn setattr(&self, loc: &Location, attr: &IAttr, valid: SetAttrValid) -> Result<IAttr> {
        self.set_attr(target(loc)?, attr, valid).await
    }

    async fn getxattr(&self, loc: &Location, name: Option<&str>) -> Result<Dict> {
        self.get_xattr(target(loc)?, name).await
    }

    async fn setxattr(&self, loc: &Location, dict: &Dict, flags: i32) -> Result<()> {
        self.set_xattr(target(loc)?, dict, flags).await
    }

    async fn removexattr(&self, loc: &Location, name: &str) -> Result<()> {
        self.remove_xattr(target(loc)?, name).await
    }

    async fn flush(&self, fd: &ObjectFd) -> Result<()> {
        let _ = object(fd)?;
        Ok(())
    }

    async fn fstat(&self, fd: &ObjectFd) -> Result<IAttr> {
        if self.knobs.fail_fstat.load(Ordering::SeqCst) {
            return Err(Errno::EIO);
        }
        let gfid = object(fd)?;
        Ok(self.tree.lock().await.get(gfid)?.attr)
    }

    async fn readv(&self, fd: &ObjectFd, size: usize, offset: i64, _flags: i32) -> Result<IoBufs> {
        let gfid = object(fd)?;
        let start = position(offset)?;
        if !AccessMode::from_flags(fd.flags).map_or(false, AccessMode::is_readable) {
            return Err(Errno::EBADF);
        }

        let mut tree = self.tree.lock().await;
        let node = tree.get_mut(gfid)?;
        let data = match node.data {
            NodeData::Regular(ref data) => data,
            NodeData::Directory(_) => return Err(Errno::EISDIR),
            _ => return Err(Errno::EINVAL),
        };

        let end = start.saturating_add(size).min(data.len());
        let mut bufs = IoBufs::new();
        if start < end {
            for chunk in data[start..end].chunks(READ_CHUNK) {
                bufs.push(IoBuf::from_slice(chunk));
            }
        }
        node.attr.atime = Timespec::now();
        Ok(bufs)
    }

    async fn writev(&self, fd: &ObjectFd, data: &[u8], offset: i64, _flags: i32) -> Result<usize> {
        let gfid = object(fd)?;
        let start = position(offset)?;
        if !AccessMode::from_flags(fd.flags).map_or(false, AccessMode::is_writable) {
            return Err(Errno::EBADF);
        }

        let accepted = match self.knobs.max_write.load(Ordering::SeqCst) {
            0 => data.len(),
            max => data.len().min(max),
        };

        let mut tree = self.tree.lock().await;
        let node = tree.get_mut(gfid)?;
        let content = match node.data {
            NodeData::Regular(ref mut content) => content,
            NodeData::Directory(_) => return Err(Errno::EISDIR),
            _ => return Err(Errno::EINVAL),
        };

        let end = start.checked_add(accepted).ok_or(Errno::EFBIG)?;
        if content.len() < end {
            resize(content, end)?;
        }
        content[start..end].copy_from_slice(&data[..accepted]);
        node.update_size();
        node.touch();
        Ok(accepted)
    }

    async fn fsync(&self, fd: &ObjectFd, datasync: bool) -> Result<()> {
        let gfid = object(fd)?;
        let _ = self.tree.lock().await.get(gfid)?;
        let _ = self.knobs.fsync_calls.fetch_add(1, Ordering::SeqCst);
        debug!(?gfid, datasync, "fsync");
        Ok(())
    }

    async fn ftruncate(&self, fd: &ObjectFd, size: u64) -> Result<()> {
        let gfid = object(fd)?;
        if !AccessMode::from_flags(fd.flags).map_or(false, AccessMode::is_writable) {
            return Err(Errno::EBADF);
        }
        let attr = IAttr {
            size,
            ..IAttr::default()
        };
        let _ = self.set_attr(gfid, &attr, SetAttrValid::SIZE).await?;
        Ok(())
    }

    async fn readdir(&self, fd: &ObjectFd, size: usize, offset: i64) -> Result<Vec<DirEntry>> {
        let gfid = object(fd)?;
        let _ = self.knobs.readdir_calls.fetch_add(1, Ordering::SeqCst);
        let batch = self.tree.lock().await.list(gfid, size, offset)?;
        debug!(?gfid, offset, len = batch.len(), "readdir");
        Ok(batch)
    }

    async fn fsetattr(&self, fd: &ObjectFd, attr: &IAttr, valid: SetAttrValid) -> Result<IAttr> {
        self.set_attr(object(fd)?, attr, valid).await
    }

    async fn fgetxattr(&self, fd: &ObjectFd, name: Option<&str>) -> Result<Dict> {
        self.get_xattr(object(fd)?, name).await
    }

    async fn fsetxattr(&self, fd: &ObjectFd, dict: &Dict, flags: i32) -> Result<()> {
        self.set_xattr(object(fd)?, dict, flags).await
    }

    async fn fremovexattr(&self, fd: &ObjectFd, name: &str) -> Result<()> {
        self.remove_xattr(object(fd)?, name).await
    }
}
