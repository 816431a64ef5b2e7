//! POSIX-shaped value types

pub mod file;

#[allow(clippy::as_conversions)]
pub const PATH_MAX: usize = libc::PATH_MAX as usize;

/// The longest file name a directory entry record can hold (without NUL)
pub const NAME_MAX: usize = 255;

#[allow(clippy::assertions_on_constants)]
#[test]
fn path_max() {
    use std::convert::TryFrom;
    assert!(usize::try_from(libc::PATH_MAX).is_ok());
    assert!(libc::PATH_MAX >= 1024 && libc::PATH_MAX <= 8192);
    assert!(NAME_MAX < PATH_MAX);
}
