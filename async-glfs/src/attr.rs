//! Attribute mutation through one generic setattr primitive

use crate::errno::Result;
use crate::fd::Fd;
use crate::iatt::{IAttr, SetAttrValid, Timespec};
use crate::resolve::{resolve, Symlinks};
use crate::session::Session;
use crate::types::file::mode_to_prot;

use std::path::Path;

/// The attribute request of a chmod
fn chmod_request(mode: u32) -> (IAttr, SetAttrValid) {
    let attr = IAttr {
        prot: mode_to_prot(mode),
        ..IAttr::default()
    };
    (attr, SetAttrValid::MODE)
}

/// The attribute request of a chown. `None` leaves the id unchanged.
fn chown_request(uid: Option<u32>, gid: Option<u32>) -> (IAttr, SetAttrValid) {
    let mut attr = IAttr::default();
    let mut valid = SetAttrValid::empty();
    if let Some(uid) = uid {
        attr.uid = uid;
        valid |= SetAttrValid::UID;
    }
    if let Some(gid) = gid {
        attr.gid = gid;
        valid |= SetAttrValid::GID;
    }
    (attr, valid)
}

/// The attribute request of a utimens: access time then modification time
fn utimens_request(times: [Timespec; 2]) -> (IAttr, SetAttrValid) {
    let attr = IAttr {
        atime: times[0],
        mtime: times[1],
        ..IAttr::default()
    };
    (attr, SetAttrValid::ATIME | SetAttrValid::MTIME)
}

impl Session {
    /// Sets the attributes selected by `valid` on a path
    /// # Errors
    /// Returns the resolution or backend failure
    #[tracing::instrument(level = "debug", skip(self, attr), err)]
    pub async fn setattr(
        &self,
        path: &Path,
        follow: Symlinks,
        attr: &IAttr,
        valid: SetAttrValid,
    ) -> Result<()> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, follow).await?;
        let _ = subvol.setattr(&loc, attr, valid).await?;
        Ok(())
    }

    /// Changes the permission bits, following a trailing symlink
    /// # Errors
    /// Returns the resolution or backend failure
    pub async fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        let (attr, valid) = chmod_request(mode);
        self.setattr(path, Symlinks::Follow, &attr, valid).await
    }

    /// Changes the ownership, following a trailing symlink
    /// # Errors
    /// Returns the resolution or backend failure
    pub async fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let (attr, valid) = chown_request(uid, gid);
        self.setattr(path, Symlinks::Follow, &attr, valid).await
    }

    /// Changes the ownership of a symlink itself
    /// # Errors
    /// Returns the resolution or backend failure
    pub async fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let (attr, valid) = chown_request(uid, gid);
        self.setattr(path, Symlinks::NoFollow, &attr, valid).await
    }

    /// Changes the access and modification times, following a trailing symlink
    /// # Errors
    /// Returns the resolution or backend failure
    pub async fn utimens(&self, path: &Path, times: [Timespec; 2]) -> Result<()> {
        let (attr, valid) = utimens_request(times);
        self.setattr(path, Symlinks::Follow, &attr, valid).await
    }

    /// Changes the access and modification times of a symlink itself
    /// # Errors
    /// Returns the resolution or backend failure
    pub async fn lutimens(&self, path: &Path, times: [Timespec; 2]) -> Result<()> {
        let (attr, valid) = utimens_request(times);
        self.setattr(path, Symlinks::NoFollow, &attr, valid).await
    }
}

impl Fd {
    /// Sets the attributes selected by `valid` on the open object
    /// # Errors
    /// Returns the backend failure
    pub async fn fsetattr(&self, attr: &IAttr, valid: SetAttrValid) -> Result<()> {
        let _ = self.subvol()?.fsetattr(self.object(), attr, valid).await?;
        Ok(())
    }

    /// Changes the permission bits of the open object
    /// # Errors
    /// Returns the backend failure
    pub async fn fchmod(&self, mode: u32) -> Result<()> {
        let (attr, valid) = chmod_request(mode);
        self.fsetattr(&attr, valid).await
    }

    /// Changes the ownership of the open object
    /// # Errors
    /// Returns the backend failure
    pub async fn fchown(&self, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let (attr, valid) = chown_request(uid, gid);
        self.fsetattr(&attr, valid).await
    }

    /// Changes the access and modification times of the open object
    /// # Errors
    /// Returns the backend failure
    pub async fn futimens(&self, times: [Timespec; 2]) -> Result<()> {
        let (attr, valid) = utimens_request(times);
        self.fsetattr(&attr, valid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::file::FileMode;

    #[test]
    fn requests() {
        let (attr, valid) = chmod_request(libc::S_IFREG | 0o640);
        assert_eq!(valid, SetAttrValid::MODE);
        assert_eq!(attr.prot, FileMode::RUSR | FileMode::WUSR | FileMode::RGRP);

        let (attr, valid) = chown_request(None, Some(100));
        assert_eq!(valid, SetAttrValid::GID);
        assert_eq!(attr.gid, 100);

        let (attr, valid) = utimens_request([Timespec::new(1, 2), Timespec::new(3, 4)]);
        assert!(valid.contains(SetAttrValid::ATIME | SetAttrValid::MTIME));
        assert_eq!(attr.atime, Timespec::new(1, 2));
        assert_eq!(attr.mtime, Timespec::new(3, 4));
    }
}
