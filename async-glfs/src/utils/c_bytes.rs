use memchr::memchr;

/// Ensures that the bytes contain no interior nul byte
#[inline]
pub fn check_bytes(bytes: &[u8]) -> Result<(), NulError> {
    match memchr(0, bytes) {
        None => Ok(()),
        Some(pos) => Err(NulError { pos }),
    }
}

/// Copies `src` into a fixed-size, nul-terminated buffer, truncating if needed.
/// Returns the number of copied bytes (without NUL).
#[inline]
pub fn copy_truncated(dst: &mut [u8], src: &[u8]) -> usize {
    let len = src.len().min(dst.len().saturating_sub(1));
    dst[..len].copy_from_slice(&src[..len]);
    for b in &mut dst[len..] {
        *b = 0;
    }
    len
}

#[derive(Debug, thiserror::Error)]
#[error("NulError: nul position = {}",.pos)]
pub struct NulError {
    pos: usize,
}

impl NulError {
    #[inline]
    #[must_use]
    pub const fn nul_position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_nul() {
        assert!(check_bytes(b"user.tag").is_ok());
        let err = check_bytes(b"user\0tag").unwrap_err();
        assert_eq!(err.nul_position(), 4);
    }

    #[test]
    fn truncation() {
        let mut buf = [0xff_u8; 4];
        assert_eq!(copy_truncated(&mut buf, b"ab"), 2);
        assert_eq!(&buf, b"ab\0\0");
        assert_eq!(copy_truncated(&mut buf, b"abcdef"), 3);
        assert_eq!(&buf, b"abc\0");
    }
}
