//! Volume node

use async_glfs::dict::Dict;
use async_glfs::iatt::{IAttr, Timespec};
use async_glfs::inode::Gfid;
use async_glfs::types::file::{FileMode, FileType};

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::ffi::OsString;
use std::path::PathBuf;

/// Node data
#[derive(Debug)]
pub enum NodeData {
    /// Directory entries in name order
    Directory(BTreeMap<OsString, Gfid>),
    /// Regular file
    Regular(Vec<u8>),
    /// Symbolic link
    SymLink(PathBuf),
    /// Device, fifo or socket
    Special,
}

/// Volume node
#[derive(Debug)]
pub struct Node {
    /// parent directory (directories only have one)
    pub parent: Gfid,
    /// attributes
    pub attr: IAttr,
    /// extended attributes
    pub xattrs: Dict,
    /// content
    pub data: NodeData,
}

impl Node {
    /// Creates a node with fresh timestamps
    pub fn new(gfid: Gfid, parent: Gfid, ia_type: FileType, prot: FileMode, data: NodeData) -> Self {
        let now = Timespec::now();
        let nlink = if ia_type.is_dir() { 2 } else { 1 };
        let mut node = Self {
            parent,
            attr: IAttr {
                gfid: Some(gfid),
                ino: gfid.to_ino(),
                dev: 0x6d76,
                ia_type,
                prot,
                nlink,
                blksize: 4096,
                atime: now,
                mtime: now,
                ctime: now,
                ..IAttr::default()
            },
            xattrs: Dict::new(),
            data,
        };
        node.update_size();
        node
    }

    #[must_use]
    pub fn gfid(&self) -> Gfid {
        self.attr.gfid.unwrap_or(Gfid::ROOT)
    }

    /// Recomputes `size` and `blocks` from the content
    pub fn update_size(&mut self) {
        let size = match self.data {
            NodeData::Directory(_) => 4096,
            NodeData::Regular(ref data) => data.len(),
            NodeData::SymLink(ref target) => target.as_os_str().len(),
            NodeData::Special => 0,
        };
        let size = u64::try_from(size).unwrap_or(u64::MAX);
        self.attr.size = size;
        self.attr.blocks = size.saturating_add(511) / 512;
    }

    /// Marks a content change
    pub fn touch(&mut self) {
        let now = Timespec::now();
        self.attr.mtime = now;
        self.attr.ctime = now;
    }

    pub fn dir(&self) -> Option<&BTreeMap<OsString, Gfid>> {
        match self.data {
            NodeData::Directory(ref entries) => Some(entries),
            _ => None,
        }
    }

    pub fn dir_mut(&mut self) -> Option<&mut BTreeMap<OsString, Gfid>> {
        match self.data {
            NodeData::Directory(ref mut entries) => Some(entries),
            _ => None,
        }
    }
}
