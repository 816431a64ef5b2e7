//! lockfree I/O buffer pool

use std::fmt::{self, Debug};
use std::sync::Arc;

use aligned_bytes::AlignedBytes;
use crossbeam_queue::ArrayQueue;

/// pool state shared with the buffers it lends
#[derive(Debug)]
struct PoolInner {
    /// lockfree queue
    queue: ArrayQueue<AlignedBytes>,
    /// buffer size
    buf_size: usize,
    /// buffer alignment
    align: usize,
}

/// buffer pool
#[derive(Debug, Clone)]
pub struct IoBufPool {
    /// shared state
    inner: Arc<PoolInner>,
}

/// aligned buffer, returned to its pool on drop
pub struct IoBuf {
    /// buf
    bytes: Option<AlignedBytes>,
    /// data length
    len: usize,
    /// owner pool, `None` for dedicated buffers
    pool: Option<Arc<PoolInner>>,
}

impl Debug for IoBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuf")
            .field("len", &self.len)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

/// allocates a zeroed buffer; zero-sized allocations are avoided
fn alloc(len: usize, align: usize) -> AlignedBytes {
    AlignedBytes::new_zeroed(len.max(1), align)
}

impl IoBuf {
    /// Creates a dedicated buffer holding a copy of `data`
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        let mut bytes = alloc(data.len(), 8);
        bytes[..data.len()].copy_from_slice(data);
        Self {
            bytes: Some(bytes),
            len: data.len(),
            pool: None,
        }
    }

    /// Data length
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The capacity of the underlying allocation
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.as_ref().map_or(0, |b| b.len())
    }
}

impl AsRef<[u8]> for IoBuf {
    fn as_ref(&self) -> &[u8] {
        match self.bytes {
            Some(ref b) => &b[..self.len],
            None => &[],
        }
    }
}

impl AsMut<[u8]> for IoBuf {
    fn as_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        match self.bytes {
            Some(ref mut b) => &mut b[..len],
            None => &mut [],
        }
    }
}

impl Drop for IoBuf {
    fn drop(&mut self) {
        if let (Some(bytes), Some(pool)) = (self.bytes.take(), self.pool.take()) {
            // a full queue or a mismatched layout just frees the buffer
            if bytes.len() == pool.buf_size && bytes.alignment() == pool.align {
                drop(pool.queue.push(bytes));
            }
        }
    }
}

impl IoBufPool {
    /// Creates a new [`IoBufPool`]
    #[must_use]
    pub fn new(cap: usize, buf_size: usize, align: usize) -> Self {
        let queue = ArrayQueue::new(cap.max(1));
        Self {
            inner: Arc::new(PoolInner {
                queue,
                buf_size,
                align,
            }),
        }
    }

    /// The size of a pooled buffer
    #[must_use]
    pub fn buf_size(&self) -> usize {
        self.inner.buf_size
    }

    /// The number of idle buffers in the pool
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner.queue.len()
    }

    /// Acquires a buffer holding `len` bytes.
    ///
    /// Requests no larger than the pooled size reuse an idle buffer or create a
    /// pooled one. Larger requests get a dedicated buffer that is freed on drop.
    #[must_use]
    pub fn acquire(&self, len: usize) -> IoBuf {
        let inner = &self.inner;
        if len > inner.buf_size {
            return IoBuf {
                bytes: Some(alloc(len, inner.align)),
                len,
                pool: None,
            };
        }
        let bytes = match inner.queue.pop() {
            Some(buf) => buf,
            None => alloc(inner.buf_size, inner.align),
        };
        IoBuf {
            bytes: Some(bytes),
            len,
            pool: Some(Arc::clone(inner)),
        }
    }
}
