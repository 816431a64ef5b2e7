//! Volume namespace: node table, inode table and path resolution

use crate::node::{Node, NodeData};

use async_glfs::dict::Dict;
use async_glfs::errno::{Errno, Result};
use async_glfs::iatt::{IAttr, Timespec};
use async_glfs::inode::{Gfid, Inode, Location};
use async_glfs::subvol::{DirEntry, ResolveError};
use async_glfs::types::file::{FileMode, FileType};
use async_glfs::types::NAME_MAX;

use std::collections::{HashMap, VecDeque};
use std::convert::TryFrom;
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use tracing::trace;

/// symlink expansions allowed in one resolution
const MAX_SYMLINK_FOLLOWS: usize = 40;

/// A resolution step
#[derive(Debug)]
enum Step {
    Root,
    Parent,
    Name(OsString),
}

/// splits a path into resolution steps
fn steps(path: &Path) -> impl Iterator<Item = Step> + '_ {
    path.components().filter_map(|c| match c {
        Component::Prefix(_) | Component::RootDir => Some(Step::Root),
        Component::CurDir => None,
        Component::ParentDir => Some(Step::Parent),
        Component::Normal(name) => Some(Step::Name(name.to_owned())),
    })
}

/// The volume namespace
#[derive(Debug)]
pub struct Tree {
    /// nodes by identity
    nodes: HashMap<Gfid, Node>,
    /// identities handed out to callers
    inodes: HashMap<Gfid, Inode>,
}

impl Tree {
    /// Creates a namespace holding an empty root directory
    pub fn new() -> Self {
        let root = Node::new(
            Gfid::ROOT,
            Gfid::ROOT,
            FileType::Directory,
            FileMode::from_bits_truncate(0o755),
            NodeData::Directory(Default::default()),
        );
        let mut nodes = HashMap::new();
        let _ = nodes.insert(Gfid::ROOT, root);
        Self {
            nodes,
            inodes: HashMap::new(),
        }
    }

    pub fn get(&self, gfid: Gfid) -> Result<&Node> {
        self.nodes.get(&gfid).ok_or(Errno::ENOENT)
    }

    pub fn get_mut(&mut self, gfid: Gfid) -> Result<&mut Node> {
        self.nodes.get_mut(&gfid).ok_or(Errno::ENOENT)
    }

    /// The number of objects in the volume
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the shared identity of a node
    fn inode(&mut self, gfid: Gfid, ia_type: FileType) -> Inode {
        self.inodes
            .entry(gfid)
            .or_insert_with(|| Inode::bound(gfid, ia_type))
            .clone()
    }

    /// The references held on a node identity outside this table
    pub fn inode_refs(&self, gfid: Gfid) -> Option<usize> {
        self.inodes.get(&gfid).map(|i| i.ref_count().saturating_sub(1))
    }

    /// Forgets the identities no caller holds any more
    fn release_idle(&mut self) {
        self.inodes.retain(|_, inode| inode.ref_count() > 1);
    }

    /// Resolves a path. Intermediate symlinks are always followed, a trailing
    /// one only if `follow` is set.
    pub fn resolve(&mut self, path: &Path, follow: bool) -> std::result::Result<Location, ResolveError> {
        self.release_idle();
        let fail = |errno| ResolveError::new(errno, path);
        if path.as_os_str().is_empty() {
            return Err(fail(Errno::ENOENT));
        }

        let mut pending: VecDeque<Step> = steps(path).collect();
        let mut stack = vec![Gfid::ROOT];
        let mut resolved = PathBuf::from("/");
        let mut follows = 0_usize;

        while let Some(step) = pending.pop_front() {
            let name = match step {
                Step::Root => {
                    stack.truncate(1);
                    resolved = PathBuf::from("/");
                    continue;
                }
                Step::Parent => {
                    if stack.len() > 1 {
                        let _ = stack.pop();
                        let _ = resolved.pop();
                    }
                    continue;
                }
                Step::Name(name) => name,
            };

            let dir = *stack.last().unwrap_or(&Gfid::ROOT);
            let is_last = pending.is_empty();
            let child = match self.get(dir).map_err(fail)?.dir() {
                Some(entries) => entries.get(&name).copied(),
                None => return Err(fail(Errno::ENOTDIR)),
            };

            let child = match child {
                Some(child) => child,
                None => {
                    let mut partial = Location::new(&resolved.join(&name));
                    if is_last {
                        partial.parent = Some(self.inode(dir, FileType::Directory));
                    }
                    return Err(ResolveError {
                        errno: Errno::ENOENT,
                        partial,
                    });
                }
            };

            let node = self.get(child).map_err(fail)?;
            let attr = node.attr;
            if let NodeData::SymLink(ref target) = node.data {
                if !is_last || follow {
                    follows = follows.wrapping_add(1);
                    if follows > MAX_SYMLINK_FOLLOWS {
                        return Err(fail(Errno::ELOOP));
                    }
                    trace!(link = ?name, target = %target.display(), "following symlink");
                    let expansion: Vec<Step> = steps(target).collect();
                    for step in expansion.into_iter().rev() {
                        pending.push_front(step);
                    }
                    continue;
                }
            }

            if is_last {
                let parent = self.inode(dir, FileType::Directory);
                let inode = self.inode(child, attr.ia_type);
                return Ok(Location {
                    path: resolved.join(&name),
                    name: Some(name),
                    parent: Some(parent),
                    inode: Some(inode),
                    attr,
                });
            }
            if !attr.ia_type.is_dir() {
                return Err(fail(Errno::ENOTDIR));
            }
            stack.push(child);
            resolved.push(&name);
        }

        // the path ends at a directory reached through `/`, `.` or `..`
        let target = *stack.last().unwrap_or(&Gfid::ROOT);
        let parent = match stack.len().checked_sub(2) {
            Some(idx) => stack[idx],
            None => target,
        };
        let attr = self.get(target).map_err(fail)?.attr;
        let parent = self.inode(parent, FileType::Directory);
        let inode = self.inode(target, attr.ia_type);
        Ok(Location {
            name: resolved.file_name().map(OsStr::to_owned),
            path: resolved,
            parent: Some(parent),
            inode: Some(inode),
            attr,
        })
    }

    /// Links a new node under `loc.parent` with the name `loc.name`.
    ///
    /// The identity requested in `xdata` is used if present, and `loc.inode`
    /// becomes the shared identity of the node.
    pub fn insert(&mut self, loc: &Location, ia_type: FileType, prot: FileMode, data: NodeData, xdata: &Dict) -> Result<IAttr> {
        let parent = loc.parent.as_ref().and_then(Inode::gfid).ok_or(Errno::ENOENT)?;
        let name = loc.name().ok_or(Errno::EINVAL)?;
        if name.len() > NAME_MAX {
            return Err(Errno::ENAMETOOLONG);
        }

        let gfid = xdata.gfid_req().unwrap_or_else(Gfid::generate);
        if self.nodes.contains_key(&gfid) {
            return Err(Errno::EEXIST);
        }

        let dir = self.get_mut(parent)?;
        let entries = dir.dir_mut().ok_or(Errno::ENOTDIR)?;
        if entries.contains_key(name) {
            return Err(Errno::EEXIST);
        }
        let _ = entries.insert(name.to_owned(), gfid);
        if ia_type.is_dir() {
            dir.attr.nlink = dir.attr.nlink.wrapping_add(1);
        }
        dir.touch();

        let node = Node::new(gfid, parent, ia_type, prot, data);
        let attr = node.attr;
        let _ = self.nodes.insert(gfid, node);
        if let Some(ref inode) = loc.inode {
            let _ = self.inodes.insert(gfid, inode.clone());
        }
        Ok(attr)
    }

    /// Removes the entry `name` from `parent` and drops one link of its node
    pub fn detach(&mut self, parent: Gfid, name: &OsStr) -> Result<Gfid> {
        let dir = self.get_mut(parent)?;
        let gfid = dir
            .dir_mut()
            .ok_or(Errno::ENOTDIR)?
            .remove(name)
            .ok_or(Errno::ENOENT)?;
        dir.touch();
        self.unlink_node(parent, gfid);
        Ok(gfid)
    }

    /// drops one link of a node, removing it with its last link
    fn unlink_node(&mut self, parent: Gfid, gfid: Gfid) {
        let is_dir = match self.nodes.get_mut(&gfid) {
            Some(node) if node.attr.ia_type.is_dir() => {
                node.attr.nlink = 0;
                true
            }
            Some(node) => {
                node.attr.nlink = node.attr.nlink.saturating_sub(1);
                node.attr.ctime = Timespec::now();
                false
            }
            None => return,
        };
        if is_dir {
            if let Ok(dir) = self.get_mut(parent) {
                dir.attr.nlink = dir.attr.nlink.saturating_sub(1);
            }
        }
        if self.nodes.get(&gfid).map_or(false, |n| n.attr.nlink == 0) {
            let _ = self.nodes.remove(&gfid);
            let _ = self.inodes.remove(&gfid);
            trace!(?gfid, "node removed");
        }
    }

    /// Adds a hard link
    pub fn add_link(&mut self, gfid: Gfid, parent: Gfid, name: &OsStr) -> Result<IAttr> {
        if name.len() > NAME_MAX {
            return Err(Errno::ENAMETOOLONG);
        }
        let dir = self.get_mut(parent)?;
        let entries = dir.dir_mut().ok_or(Errno::ENOTDIR)?;
        if entries.contains_key(name) {
            return Err(Errno::EEXIST);
        }
        let _ = entries.insert(name.to_owned(), gfid);
        dir.touch();

        let node = self.get_mut(gfid)?;
        node.attr.nlink = node.attr.nlink.wrapping_add(1);
        node.attr.ctime = Timespec::now();
        Ok(node.attr)
    }

    /// Moves an entry, replacing the destination if it exists
    pub fn rename(&mut self, src: (Gfid, &OsStr), dst: (Gfid, &OsStr)) -> Result<()> {
        let (src_dir, src_name) = src;
        let (dst_dir, dst_name) = dst;
        if dst_name.len() > NAME_MAX {
            return Err(Errno::ENAMETOOLONG);
        }

        let gfid = self.lookup(src_dir, src_name)?.ok_or(Errno::ENOENT)?;
        let is_dir = self.get(gfid)?.attr.ia_type.is_dir();
        if is_dir && self.is_ancestor(gfid, dst_dir) {
            return Err(Errno::EINVAL);
        }

        if let Some(old) = self.lookup(dst_dir, dst_name)? {
            if old == gfid {
                return Ok(());
            }
            let old_node = self.get(old)?;
            if old_node.attr.ia_type.is_dir() != is_dir {
                return Err(if is_dir { Errno::ENOTDIR } else { Errno::EISDIR });
            }
            if old_node.dir().map_or(false, |e| !e.is_empty()) {
                return Err(Errno::ENOTEMPTY);
            }
            let _ = self.detach(dst_dir, dst_name)?;
        }

        let _ = self
            .get_mut(src_dir)?
            .dir_mut()
            .ok_or(Errno::ENOTDIR)?
            .remove(src_name);
        let dir = self.get_mut(dst_dir)?;
        let _ = dir
            .dir_mut()
            .ok_or(Errno::ENOTDIR)?
            .insert(dst_name.to_owned(), gfid);
        dir.touch();

        if is_dir && src_dir != dst_dir {
            if let Ok(src) = self.get_mut(src_dir) {
                src.attr.nlink = src.attr.nlink.saturating_sub(1);
            }
            if let Ok(dst) = self.get_mut(dst_dir) {
                dst.attr.nlink = dst.attr.nlink.wrapping_add(1);
            }
        }
        let node = self.get_mut(gfid)?;
        node.parent = dst_dir;
        node.attr.ctime = Timespec::now();
        Ok(())
    }

    /// looks up a name in a directory
    fn lookup(&self, dir: Gfid, name: &OsStr) -> Result<Option<Gfid>> {
        let entries = self.get(dir)?.dir().ok_or(Errno::ENOTDIR)?;
        Ok(entries.get(name).copied())
    }

    /// whether `dir` is `ancestor` or lies below it
    fn is_ancestor(&self, ancestor: Gfid, mut dir: Gfid) -> bool {
        loop {
            if dir == ancestor {
                return true;
            }
            if dir == Gfid::ROOT {
                return false;
            }
            dir = match self.nodes.get(&dir) {
                Some(node) => node.parent,
                None => return false,
            };
        }
    }

    /// Lists a directory from the cookie `offset`, filling at most `size`
    /// bytes of dirent records. Cookies are 1-based positions in name order,
    /// after `.` and `..`.
    pub fn list(&self, dir: Gfid, size: usize, offset: i64) -> Result<Vec<DirEntry>> {
        let node = self.get(dir)?;
        let entries = node.dir().ok_or(Errno::ENOTDIR)?;
        let skip = usize::try_from(offset).map_err(|_| Errno::EINVAL)?;

        let dots = vec![
            (OsString::from("."), dir),
            (OsString::from(".."), node.parent),
        ];
        let all = dots
            .into_iter()
            .chain(entries.iter().map(|(name, &gfid)| (name.clone(), gfid)));

        let mut batch = Vec::new();
        let mut used = 0_usize;
        for (pos, (name, gfid)) in all.enumerate().skip(skip) {
            let reclen = dirent_reclen(name.len());
            if used.saturating_add(reclen) > size {
                if batch.is_empty() {
                    return Err(Errno::EINVAL);
                }
                break;
            }
            used = used.saturating_add(reclen);

            let (d_ino, d_type) = match self.nodes.get(&gfid) {
                Some(child) => (child.attr.ino, child.attr.ia_type),
                None => (gfid.to_ino(), FileType::Unknown),
            };
            batch.push(DirEntry {
                d_ino,
                d_off: i64::try_from(pos.wrapping_add(1)).unwrap_or(i64::MAX),
                d_type,
                d_name: name,
            });
        }
        Ok(batch)
    }
}

/// The size of a `dirent64` record: fixed header, name and NUL, 8-byte aligned
fn dirent_reclen(name_len: usize) -> usize {
    /// ino + off + reclen + type
    const HEADER: usize = 8 + 8 + 2 + 1;
    (HEADER + name_len + 1 + 7) & !7
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkdir(tree: &mut Tree, path: &str) -> Gfid {
        let loc = match tree.resolve(Path::new(path), false) {
            Err(err) => err.partial,
            Ok(_) => panic!("{} exists", path),
        };
        let attr = tree
            .insert(
                &loc,
                FileType::Directory,
                FileMode::RWXU,
                NodeData::Directory(Default::default()),
                &Dict::new(),
            )
            .unwrap();
        attr.gfid.unwrap()
    }

    #[test]
    fn reclen() {
        assert_eq!(dirent_reclen(1), 24);
        assert_eq!(dirent_reclen(4), 24);
        assert_eq!(dirent_reclen(5), 32);
    }

    #[test]
    fn resolve_dots() {
        let mut tree = Tree::new();
        let a = mkdir(&mut tree, "/a");
        let b = mkdir(&mut tree, "/a/b");

        let loc = tree.resolve(Path::new("/a/b/../b/."), false).unwrap();
        assert_eq!(loc.inode.unwrap().gfid(), Some(b));
        assert_eq!(loc.parent.unwrap().gfid(), Some(a));

        let root = tree.resolve(Path::new("/.."), false).unwrap();
        assert_eq!(root.inode.unwrap().gfid(), Some(Gfid::ROOT));
    }

    #[test]
    fn missing_parent_vs_missing_leaf() {
        let mut tree = Tree::new();
        let _ = mkdir(&mut tree, "/a");

        let leaf = tree.resolve(Path::new("/a/x"), true).unwrap_err();
        assert_eq!(leaf.errno, Errno::ENOENT);
        assert!(leaf.partial.parent.is_some());
        assert_eq!(leaf.partial.name(), Some(OsStr::new("x")));

        let deep = tree.resolve(Path::new("/a/x/y"), true).unwrap_err();
        assert_eq!(deep.errno, Errno::ENOENT);
        assert!(deep.partial.parent.is_none());
    }

    #[test]
    fn idle_identities_are_released() {
        let mut tree = Tree::new();
        for name in &["/a", "/b", "/c"] {
            let _ = mkdir(&mut tree, name);
        }
        for name in &["/a", "/b", "/c"] {
            drop(tree.resolve(Path::new(name), false).unwrap());
        }

        let held = tree.resolve(Path::new("/a"), false).unwrap();
        let a = held.inode.as_ref().and_then(Inode::gfid).unwrap();
        // `/a` and its parent
        assert_eq!(tree.inodes.len(), 2);
        assert_eq!(tree.inode_refs(a), Some(1));

        drop(tree.resolve(Path::new("/b"), false).unwrap());
        assert!(tree.inodes.contains_key(&a));
        drop(held);
        drop(tree.resolve(Path::new("/b"), false).unwrap());
        assert!(!tree.inodes.contains_key(&a));
    }

    #[test]
    fn listing_cookies() {
        let mut tree = Tree::new();
        let _ = mkdir(&mut tree, "/b");
        let _ = mkdir(&mut tree, "/a");

        let all = tree.list(Gfid::ROOT, 4096, 0).unwrap();
        let names: Vec<_> = all.iter().map(|e| e.d_name.to_str().unwrap()).collect();
        assert_eq!(names, [".", "..", "a", "b"]);
        assert_eq!(all.iter().map(|e| e.d_off).collect::<Vec<_>>(), [1, 2, 3, 4]);

        let rest = tree.list(Gfid::ROOT, 4096, 3).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].d_name, "b");

        let small = tree.list(Gfid::ROOT, 48, 0).unwrap();
        assert_eq!(small.len(), 2);
        assert_eq!(tree.list(Gfid::ROOT, 8, 0), Err(Errno::EINVAL));
        assert!(tree.list(Gfid::ROOT, 4096, 4).unwrap().is_empty());
    }
}
