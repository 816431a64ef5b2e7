//! Client session: the active backend target and the shared resources

use crate::buffer_pool::IoBufPool;
use crate::errno::{Errno, Result};
use crate::subvol::Subvolume;
use crate::task::{AsyncStdScheduler, Scheduler};

use std::fmt::{self, Debug};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// readdir batch size (bytes of dirent records)
const READDIR_BATCH_SIZE: usize = 128 * 1024;

/// write buffer size
const BUFFER_SIZE: usize = 128 * 1024;

/// write buffer alignment
const PAGE_SIZE: usize = 4096;

/// idle write buffers kept by the pool
const POOL_CAPACITY: usize = 16;

/// The builder of [`Session`]
pub struct SessionBuilder {
    /// readdir batch size
    readdir_batch: usize,
    /// pool capacity
    pool_capacity: usize,
    /// pooled buffer size
    buffer_size: usize,
    /// pooled buffer alignment
    buffer_align: usize,
    /// task scheduler
    scheduler: Arc<dyn Scheduler>,
    /// initially active target
    subvol: Option<Arc<dyn Subvolume>>,
}

impl Debug for SessionBuilder {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("readdir_batch", &self.readdir_batch)
            .field("pool_capacity", &self.pool_capacity)
            .field("buffer_size", &self.buffer_size)
            .field("buffer_align", &self.buffer_align)
            .field("scheduler", &self.scheduler)
            .field("subvol", &self.subvol)
            .finish()
    }
}

impl Default for SessionBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Starts to build a [`Session`] with the default settings
    #[must_use]
    pub fn new() -> Self {
        Self {
            readdir_batch: READDIR_BATCH_SIZE,
            pool_capacity: POOL_CAPACITY,
            buffer_size: BUFFER_SIZE,
            buffer_align: PAGE_SIZE,
            scheduler: Arc::new(AsyncStdScheduler),
            subvol: None,
        }
    }

    setters! {
        /// Sets the byte budget of one directory listing batch
        readdir_batch: usize,
        /// Sets the number of idle write buffers kept by the pool
        pool_capacity: usize,
        /// Sets the size of a pooled write buffer
        buffer_size: usize,
        /// Sets the alignment of pooled write buffers
        buffer_align: usize,
    }

    /// Sets the scheduler asynchronous tasks are submitted to
    #[inline]
    pub fn scheduler(&mut self, scheduler: Arc<dyn Scheduler>) -> &mut Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets the initially active backend target
    #[inline]
    pub fn subvol(&mut self, subvol: Arc<dyn Subvolume>) -> &mut Self {
        self.subvol = Some(subvol);
        self
    }

    /// Builds the [`Session`]
    #[must_use]
    pub fn build(&self) -> Session {
        let pool = IoBufPool::new(self.pool_capacity, self.buffer_size, self.buffer_align);
        let generation = u64::from(self.subvol.is_some());
        debug!(
            readdir_batch = self.readdir_batch,
            buffer_size = self.buffer_size,
            generation,
            "session initialized"
        );
        Session {
            inner: Arc::new(SessionInner {
                active: RwLock::new(ActiveTarget {
                    generation,
                    subvol: self.subvol.clone(),
                }),
                scheduler: Arc::clone(&self.scheduler),
                pool,
                readdir_batch: self.readdir_batch,
            }),
        }
    }
}

/// The versioned active target
#[derive(Debug)]
struct ActiveTarget {
    /// bumped on every switch
    generation: u64,
    /// target
    subvol: Option<Arc<dyn Subvolume>>,
}

/// session state
#[derive(Debug)]
struct SessionInner {
    /// active target
    active: RwLock<ActiveTarget>,
    /// task scheduler
    scheduler: Arc<dyn Scheduler>,
    /// write buffer pool
    pool: IoBufPool,
    /// readdir batch size
    readdir_batch: usize,
}

/// A client session.
///
/// Every operation is dispatched against the target active at call time.
/// Cloning a session is cheap and clones share the same state.
#[derive(Debug, Clone)]
pub struct Session {
    /// Arc inner
    inner: Arc<SessionInner>,
}

impl Session {
    /// Starts to build a [`Session`]
    #[must_use]
    #[inline]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Returns the active target.
    /// # Errors
    /// Returns `EIO` if the session has no active target
    pub fn active_subvol(&self) -> Result<Arc<dyn Subvolume>> {
        let active = self.inner.active.read().unwrap_or_else(PoisonError::into_inner);
        match active.subvol {
            Some(ref subvol) => Ok(Arc::clone(subvol)),
            None => {
                debug!(generation = active.generation, "no active subvolume");
                Err(Errno::EIO)
            }
        }
    }

    /// Makes `subvol` the active target. Returns the new generation.
    pub fn switch_subvol(&self, subvol: Arc<dyn Subvolume>) -> u64 {
        self.swap(Some(subvol))
    }

    /// Leaves the session without an active target. Returns the new generation.
    pub fn unset_subvol(&self) -> u64 {
        self.swap(None)
    }

    /// The generation of the active target
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// installs a new target
    fn swap(&self, subvol: Option<Arc<dyn Subvolume>>) -> u64 {
        let mut active = self.inner.active.write().unwrap_or_else(PoisonError::into_inner);
        active.generation = active.generation.wrapping_add(1);
        let old = std::mem::replace(&mut active.subvol, subvol);
        debug!(generation = active.generation, ?old, "switched subvolume");
        active.generation
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.inner.scheduler)
    }

    pub(crate) fn pool(&self) -> &IoBufPool {
        &self.inner.pool
    }

    pub(crate) fn readdir_batch(&self) -> usize {
        self.inner.readdir_batch
    }
}
