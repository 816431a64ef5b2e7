//! Key/value attribute bundles

use crate::errno::{Errno, Result};
use crate::inode::Gfid;

use std::collections::BTreeMap;
use std::iter::FromIterator;

/// The reserved key carrying the identity requested for a new object
pub const GFID_REQ_KEY: &str = "gfid-req";

/// `setxattr(2)` flags
pub mod xattr_flags {
    /// Fails with `EEXIST` if the attribute exists
    pub const XATTR_CREATE: i32 = libc::XATTR_CREATE;
    /// Fails with `ENODATA` if the attribute does not exist
    pub const XATTR_REPLACE: i32 = libc::XATTR_REPLACE;
}

/// An ordered key/value bundle.
///
/// Keys are unique strings, values are opaque bytes. A key mapped to an empty
/// value is distinct from an absent key: [`Dict::get`] returns `Some(&[])` for
/// the former and `None` for the latter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict {
    /// entries
    map: BTreeMap<String, Vec<u8>>,
}

impl Dict {
    /// Creates an empty [`Dict`]
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`Dict`] holding a single entry
    #[must_use]
    pub fn for_key_value(key: &str, value: &[u8]) -> Self {
        let mut dict = Self::new();
        dict.set(key, value.to_vec());
        dict
    }

    /// Builds the creation request carrying a freshly generated identity
    #[must_use]
    pub fn gfid_request(gfid: Gfid) -> Self {
        Self::for_key_value(GFID_REQ_KEY, gfid.as_bytes())
    }

    /// Inserts or replaces an entry
    pub fn set(&mut self, key: &str, value: Vec<u8>) -> Option<Vec<u8>> {
        self.map.insert(key.to_owned(), value)
    }

    /// Gets the value of a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    /// Removes an entry
    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.map.remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over the entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Iterates over the keys in key order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Reads the requested identity, if any
    #[must_use]
    pub fn gfid_req(&self) -> Option<Gfid> {
        self.get(GFID_REQ_KEY).and_then(Gfid::from_slice)
    }

    /// The length of the joined key list: every key followed by a NUL
    #[must_use]
    pub fn keys_join_len(&self) -> usize {
        self.map.keys().map(|k| k.len().wrapping_add(1)).sum()
    }

    /// Writes every key followed by a NUL into `dst`.
    /// # Errors
    /// Returns `ERANGE` without touching `dst` if it is too small
    pub fn keys_join(&self, dst: &mut [u8]) -> Result<usize> {
        let total = self.keys_join_len();
        if dst.len() < total {
            return Err(Errno::ERANGE);
        }
        let mut pos = 0;
        for key in self.map.keys() {
            let end = pos + key.len();
            dst[pos..end].copy_from_slice(key.as_bytes());
            dst[end] = 0;
            pos = end + 1;
        }
        Ok(total)
    }
}

impl<'a> FromIterator<(&'a str, &'a [u8])> for Dict {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a [u8])>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            let _ = dict.set(k, v.to_vec());
        }
        dict
    }
}
