//! Resolution glue: follow rules and result classification

use crate::errno::{Errno, Result};
use crate::inode::Location;
use crate::subvol::{ResolveError, Subvolume};

use std::path::Path;

use tracing::trace;

/// Whether a trailing symlink is followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symlinks {
    /// resolve the symlink target
    Follow,
    /// resolve the symlink itself
    NoFollow,
}

impl Symlinks {
    #[must_use]
    #[inline]
    pub const fn follows(self) -> bool {
        matches!(self, Self::Follow)
    }
}

/// The outcome of a resolution made on behalf of a creating operation
#[derive(Debug)]
pub(crate) enum Resolved {
    /// the leaf exists
    Existing(Location),
    /// the leaf does not exist yet, its parent does
    Absent(Location),
}

/// Resolves a path that must exist.
/// # Errors
/// Returns the resolution failure
pub(crate) async fn resolve(subvol: &dyn Subvolume, path: &Path, follow: Symlinks) -> Result<Location> {
    match subvol.resolve(path, follow.follows()).await {
        Ok(loc) => Ok(loc),
        Err(ResolveError { errno, .. }) => {
            trace!(path = %path.display(), ?errno, "resolve failed");
            Err(errno)
        }
    }
}

/// Resolves a path whose leaf may be missing.
///
/// A missing leaf under an existing parent is the expected "does not exist
/// yet" case. A missing parent or any other failure is fatal.
/// # Errors
/// Returns the resolution failure
pub(crate) async fn resolve_leaf(
    subvol: &dyn Subvolume,
    path: &Path,
    follow: Symlinks,
) -> Result<Resolved> {
    match subvol.resolve(path, follow.follows()).await {
        Ok(loc) if loc.inode.is_some() => Ok(Resolved::Existing(loc)),
        Ok(loc) => classify_absent(loc, Errno::ENOENT),
        Err(ResolveError { errno, partial }) => {
            trace!(path = %path.display(), ?errno, "resolve failed");
            if errno == Errno::ENOENT {
                classify_absent(partial, errno)
            } else {
                Err(errno)
            }
        }
    }
}

/// a leaf is absent: the parent must exist
fn classify_absent(loc: Location, errno: Errno) -> Result<Resolved> {
    if loc.parent.is_some() && loc.name.is_some() {
        Ok(Resolved::Absent(loc))
    } else {
        Err(errno)
    }
}
