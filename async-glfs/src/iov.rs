//! Scatter/gather adapters between caller vectors and contiguous buffers

use std::io::{IoSlice, IoSliceMut};

/// The total length of a vector
#[must_use]
pub fn iov_length(iov: &[IoSlice<'_>]) -> usize {
    iov.iter().map(|s| s.len()).sum()
}

/// The total capacity of a mutable vector
#[must_use]
pub fn iov_capacity(iov: &[IoSliceMut<'_>]) -> usize {
    iov.iter().map(|s| s.len()).sum()
}

/// Gathers a vector into `dst`, returns the number of bytes copied
pub fn gather(iov: &[IoSlice<'_>], dst: &mut [u8]) -> usize {
    let mut pos = 0;
    for src in iov {
        let remain = dst.len() - pos;
        if remain == 0 {
            break;
        }
        let n = src.len().min(remain);
        dst[pos..pos + n].copy_from_slice(&src[..n]);
        pos += n;
    }
    pos
}

/// Copies a list of source buffers, treated as one byte stream, into a
/// vector. Stops when either side is exhausted and returns the number of bytes
/// copied.
pub fn scatter<B: AsRef<[u8]>>(src: &[B], iov: &mut [IoSliceMut<'_>]) -> usize {
    let mut copied = 0;
    let (mut idx, mut off) = (0, 0);
    for buf in src {
        let mut data = buf.as_ref();
        while !data.is_empty() {
            let dst = match iov.get_mut(idx) {
                Some(dst) => dst,
                None => return copied,
            };
            if off == dst.len() {
                idx += 1;
                off = 0;
                continue;
            }
            let n = data.len().min(dst.len() - off);
            dst[off..off + n].copy_from_slice(&data[..n]);
            off += n;
            data = &data[n..];
            copied += n;
        }
    }
    copied
}
