//! Object identities and resolved locations

use crate::iatt::IAttr;
use crate::types::file::FileType;

use std::ffi::{OsStr, OsString};
use std::fmt::{self, Debug};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use uuid::Uuid;

/// A globally unique object identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gfid([u8; 16]);

impl Gfid {
    /// The identity of the root directory
    pub const ROOT: Self = Self([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    /// Generates a random identity
    #[must_use]
    pub fn generate() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    #[must_use]
    #[inline]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parses a 16-byte slice
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let mut buf = [0; 16];
        if bytes.len() != buf.len() {
            return None;
        }
        buf.copy_from_slice(bytes);
        Some(Self(buf))
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The inode number derived from the identity (its last eight bytes)
    #[must_use]
    pub fn to_ino(self) -> u64 {
        let mut low = [0; 8];
        low.copy_from_slice(&self.0[8..]);
        u64::from_be_bytes(low)
    }
}

impl Debug for Gfid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

/// inode data
#[derive(Debug)]
struct InodeInner {
    /// bound once by resolution or by the backend create
    gfid: OnceCell<Gfid>,
    /// type at bind time
    ia_type: OnceCell<FileType>,
}

/// A shared, reference-counted object identity.
///
/// An inode may be unbound: it is allocated before a create and bound exactly
/// once when the backend has created the object.
#[derive(Clone)]
pub struct Inode(Arc<InodeInner>);

impl Debug for Inode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inode")
            .field("gfid", &self.0.gfid.get())
            .field("ia_type", &self.0.ia_type.get())
            .finish()
    }
}

impl Inode {
    /// Allocates an identity that is not bound to any object yet
    #[must_use]
    pub fn new_unbound() -> Self {
        Self(Arc::new(InodeInner {
            gfid: OnceCell::new(),
            ia_type: OnceCell::new(),
        }))
    }

    /// Creates an identity bound to an existing object
    #[must_use]
    pub fn bound(gfid: Gfid, ia_type: FileType) -> Self {
        let inode = Self::new_unbound();
        inode.bind(gfid, ia_type);
        inode
    }

    /// Binds the identity. Returns `false` if it was already bound.
    pub fn bind(&self, gfid: Gfid, ia_type: FileType) -> bool {
        let fresh = self.0.gfid.set(gfid).is_ok();
        if fresh {
            let _ = self.0.ia_type.set(ia_type);
        }
        fresh
    }

    #[must_use]
    pub fn gfid(&self) -> Option<Gfid> {
        self.0.gfid.get().copied()
    }

    #[must_use]
    pub fn ia_type(&self) -> FileType {
        self.0.ia_type.get().copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.0.gfid.get().is_some()
    }

    /// The number of live references to this identity
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

/// The result of a path resolution: a parent, an optional target and its
/// attributes.
///
/// A location owns references to its inodes; they are released when the
/// location is dropped, on every exit path of the call that created it.
#[derive(Debug, Clone, Default)]
pub struct Location {
    /// the resolved path
    pub path: PathBuf,
    /// the last path component
    pub name: Option<OsString>,
    /// parent directory, absent if an ancestor is missing
    pub parent: Option<Inode>,
    /// target object, absent if the leaf does not exist
    pub inode: Option<Inode>,
    /// attributes of the target
    pub attr: IAttr,
}

impl Location {
    /// Creates an empty location for a path
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            name: path.file_name().map(OsStr::to_owned),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&OsStr> {
        self.name.as_deref()
    }
}

/// An open backend object
#[derive(Debug, Clone)]
pub struct ObjectFd {
    /// the opened object
    pub inode: Inode,
    /// `open(2)` flags
    pub flags: i32,
    /// opener
    pub pid: u32,
}

impl ObjectFd {
    /// Binds a new open record to an inode
    #[must_use]
    pub fn create(inode: Inode, flags: i32) -> Self {
        Self {
            inode,
            flags,
            pid: std::process::id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_once() {
        let inode = Inode::new_unbound();
        assert!(!inode.is_bound());
        assert_eq!(inode.ia_type(), FileType::Unknown);

        let gfid = Gfid::generate();
        assert!(inode.bind(gfid, FileType::Regular));
        assert!(!inode.bind(Gfid::generate(), FileType::Directory));
        assert_eq!(inode.gfid(), Some(gfid));
        assert_eq!(inode.ia_type(), FileType::Regular);
    }

    #[test]
    fn location_releases_refs() {
        let inode = Inode::bound(Gfid::ROOT, FileType::Directory);
        {
            let mut loc = Location::new(Path::new("/a/b"));
            loc.parent = Some(inode.clone());
            assert_eq!(loc.name(), Some(OsStr::new("b")));
            assert_eq!(inode.ref_count(), 2);
        }
        assert_eq!(inode.ref_count(), 1);
    }

    #[test]
    fn gfid_slice() {
        assert_eq!(Gfid::from_slice(&[0; 15]), None);
        assert_eq!(Gfid::ROOT.to_ino(), 1);
    }
}
