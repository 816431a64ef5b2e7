//! Extended attributes: get, list, set and remove

use crate::dict::Dict;
use crate::errno::{Errno, Result};
use crate::fd::Fd;
use crate::resolve::{resolve, Symlinks};
use crate::session::Session;
use crate::utils::c_bytes::check_bytes;

use std::path::Path;

use tracing::trace;

/// Rejects attribute names that can not be listed
fn check_name(name: &str) -> Result<()> {
    check_bytes(name.as_bytes()).map_err(|err| {
        trace!(nul = err.nul_position(), "invalid xattr name");
        Errno::EINVAL
    })
}

/// Copies one value out of a get result.
///
/// An empty `value` buffer is a size query: the value length is returned and
/// nothing is copied. A non-empty buffer that is too small is `ERANGE` and is
/// left untouched.
fn getxattr_process(dict: &Dict, name: &str, value: &mut [u8]) -> Result<usize> {
    let data = dict.get(name).ok_or(Errno::ENODATA)?;
    if value.is_empty() {
        return Ok(data.len());
    }
    if value.len() < data.len() {
        return Err(Errno::ERANGE);
    }
    value[..data.len()].copy_from_slice(data);
    Ok(data.len())
}

/// Joins the attribute names of a get result, with the same size contract as
/// [`getxattr_process`]
fn listxattr_process(dict: &Dict, list: &mut [u8]) -> Result<usize> {
    if list.is_empty() {
        return Ok(dict.keys_join_len());
    }
    dict.keys_join(list)
}

impl Session {
    /// get xattr
    async fn getxattr_common(
        &self,
        path: &Path,
        follow: Symlinks,
        name: &str,
        value: &mut [u8],
    ) -> Result<usize> {
        check_name(name)?;
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, follow).await?;
        let dict = subvol.getxattr(&loc, Some(name)).await?;
        getxattr_process(&dict, name, value)
    }

    /// list xattr
    async fn listxattr_common(&self, path: &Path, follow: Symlinks, list: &mut [u8]) -> Result<usize> {
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, follow).await?;
        let dict = subvol.getxattr(&loc, None).await?;
        listxattr_process(&dict, list)
    }

    /// set xattr
    async fn setxattr_common(
        &self,
        path: &Path,
        follow: Symlinks,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> Result<()> {
        check_name(name)?;
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, follow).await?;
        let dict = Dict::for_key_value(name, value);
        subvol.setxattr(&loc, &dict, flags).await
    }

    /// remove xattr
    async fn removexattr_common(&self, path: &Path, follow: Symlinks, name: &str) -> Result<()> {
        check_name(name)?;
        let subvol = self.active_subvol()?;
        let loc = resolve(&*subvol, path, follow).await?;
        subvol.removexattr(&loc, name).await
    }

    /// Reads the value of an extended attribute, following a trailing symlink.
    ///
    /// An empty `value` buffer queries the value length.
    /// # Errors
    /// + `ENODATA` if the attribute does not exist
    /// + `ERANGE` if `value` is too small
    #[tracing::instrument(level = "debug", skip(self, value), err)]
    pub async fn getxattr(&self, path: &Path, name: &str, value: &mut [u8]) -> Result<usize> {
        self.getxattr_common(path, Symlinks::Follow, name, value).await
    }

    /// Reads the value of an extended attribute of a symlink itself
    /// # Errors
    /// + `ENODATA` if the attribute does not exist
    /// + `ERANGE` if `value` is too small
    #[tracing::instrument(level = "debug", skip(self, value), err)]
    pub async fn lgetxattr(&self, path: &Path, name: &str, value: &mut [u8]) -> Result<usize> {
        self.getxattr_common(path, Symlinks::NoFollow, name, value).await
    }

    /// Lists the extended attribute names as NUL-terminated strings.
    ///
    /// An empty `list` buffer queries the list length.
    /// # Errors
    /// `ERANGE` if `list` is too small
    #[tracing::instrument(level = "debug", skip(self, list), err)]
    pub async fn listxattr(&self, path: &Path, list: &mut [u8]) -> Result<usize> {
        self.listxattr_common(path, Symlinks::Follow, list).await
    }

    /// Lists the extended attribute names of a symlink itself
    /// # Errors
    /// `ERANGE` if `list` is too small
    #[tracing::instrument(level = "debug", skip(self, list), err)]
    pub async fn llistxattr(&self, path: &Path, list: &mut [u8]) -> Result<usize> {
        self.listxattr_common(path, Symlinks::NoFollow, list).await
    }

    /// Sets an extended attribute, following a trailing symlink.
    /// `flags` takes `XATTR_CREATE` or `XATTR_REPLACE`.
    /// # Errors
    /// Returns the resolution or backend failure
    #[tracing::instrument(level = "debug", skip(self, value), err)]
    pub async fn setxattr(&self, path: &Path, name: &str, value: &[u8], flags: i32) -> Result<()> {
        self.setxattr_common(path, Symlinks::Follow, name, value, flags).await
    }

    /// Sets an extended attribute of a symlink itself
    /// # Errors
    /// Returns the resolution or backend failure
    #[tracing::instrument(level = "debug", skip(self, value), err)]
    pub async fn lsetxattr(&self, path: &Path, name: &str, value: &[u8], flags: i32) -> Result<()> {
        self.setxattr_common(path, Symlinks::NoFollow, name, value, flags).await
    }

    /// Removes an extended attribute, following a trailing symlink.
    /// Absence is reported as the backend reports it.
    /// # Errors
    /// Returns the resolution or backend failure
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn removexattr(&self, path: &Path, name: &str) -> Result<()> {
        self.removexattr_common(path, Symlinks::Follow, name).await
    }

    /// Removes an extended attribute of a symlink itself
    /// # Errors
    /// Returns the resolution or backend failure
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn lremovexattr(&self, path: &Path, name: &str) -> Result<()> {
        self.removexattr_common(path, Symlinks::NoFollow, name).await
    }
}

impl Fd {
    /// Reads the value of an extended attribute of the open object
    /// # Errors
    /// + `ENODATA` if the attribute does not exist
    /// + `ERANGE` if `value` is too small
    pub async fn fgetxattr(&self, name: &str, value: &mut [u8]) -> Result<usize> {
        check_name(name)?;
        let dict = self.subvol()?.fgetxattr(self.object(), Some(name)).await?;
        getxattr_process(&dict, name, value)
    }

    /// Lists the extended attribute names of the open object
    /// # Errors
    /// `ERANGE` if `list` is too small
    pub async fn flistxattr(&self, list: &mut [u8]) -> Result<usize> {
        let dict = self.subvol()?.fgetxattr(self.object(), None).await?;
        listxattr_process(&dict, list)
    }

    /// Sets an extended attribute of the open object
    /// # Errors
    /// Returns the backend failure
    pub async fn fsetxattr(&self, name: &str, value: &[u8], flags: i32) -> Result<()> {
        check_name(name)?;
        let dict = Dict::for_key_value(name, value);
        self.subvol()?.fsetxattr(self.object(), &dict, flags).await
    }

    /// Removes an extended attribute of the open object
    /// # Errors
    /// Returns the backend failure
    pub async fn fremovexattr(&self, name: &str) -> Result<()> {
        check_name(name)?;
        self.subvol()?.fremovexattr(self.object(), name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dict {
        let mut dict = Dict::new();
        let _ = dict.set("user.tag", b"blue".to_vec());
        let _ = dict.set("user.empty", Vec::new());
        dict
    }

    #[test]
    fn get_size_contract() {
        let dict = sample();
        assert_eq!(getxattr_process(&dict, "user.tag", &mut []), Ok(4));

        let mut small = [0xaa_u8; 3];
        assert_eq!(getxattr_process(&dict, "user.tag", &mut small), Err(Errno::ERANGE));
        assert_eq!(small, [0xaa; 3]);

        let mut buf = [0_u8; 8];
        assert_eq!(getxattr_process(&dict, "user.tag", &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"blue");
    }

    #[test]
    fn empty_value_versus_absent() {
        let dict = sample();
        let mut buf = [0_u8; 8];
        assert_eq!(getxattr_process(&dict, "user.empty", &mut buf), Ok(0));
        assert_eq!(getxattr_process(&dict, "user.empty", &mut []), Ok(0));
        assert_eq!(getxattr_process(&dict, "user.none", &mut buf), Err(Errno::ENODATA));
        assert_eq!(getxattr_process(&dict, "user.none", &mut []), Err(Errno::ENODATA));
    }

    #[test]
    fn list_size_contract() {
        let dict = sample();
        let len = listxattr_process(&dict, &mut []).unwrap();
        assert_eq!(len, b"user.empty\0user.tag\0".len());

        let mut small = vec![0x55_u8; len - 1];
        assert_eq!(listxattr_process(&dict, &mut small), Err(Errno::ERANGE));
        assert!(small.iter().all(|&b| b == 0x55));

        let mut buf = vec![0_u8; len];
        assert_eq!(listxattr_process(&dict, &mut buf), Ok(len));
        assert_eq!(buf, b"user.empty\0user.tag\0");
    }

    #[test]
    fn nul_in_name() {
        assert_eq!(check_name("user.a\0b"), Err(Errno::EINVAL));
        assert_eq!(check_name("user.ab"), Ok(()));
    }
}
