//! Thread-safe cache handle.
//!
//! [`Cache`] pairs a [`SlabCache`] with its region provider behind one
//! exclusive lock. The lock covers both the slab lists and the provider's
//! record table, so every public operation runs under the full locking
//! discipline the allocator requires. The new-slab retry inside
//! allocation is a loop under the same lock acquisition.

use core::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::region_provider::HeapRegionProvider;
use crate::slab::{SlabCache, SlabState};
use crate::{AllocResult, RegionProvider, DEFAULT_SLAB_ORDER};

/// A fixed-object-size pool shareable across threads.
pub struct Cache<P: RegionProvider = HeapRegionProvider> {
    inner: Mutex<CacheInner<P>>,
}

struct CacheInner<P> {
    cache: SlabCache,
    provider: P,
}

impl Cache<HeapRegionProvider> {
    /// Set up a cache with the default slab order (4 MiB slabs).
    ///
    /// # Examples
    ///
    /// ```
    /// use slab_cache_allocator::Cache;
    ///
    /// let cache = Cache::new(64).unwrap();
    /// let ptr = cache.alloc().unwrap();
    /// cache.free(ptr);
    /// ```
    pub fn new(object_size: usize) -> AllocResult<Self> {
        Self::with_order(object_size, DEFAULT_SLAB_ORDER)
    }

    /// Set up a cache with an explicit slab order.
    pub fn with_order(object_size: usize, slab_order: usize) -> AllocResult<Self> {
        Self::with_provider(object_size, slab_order, HeapRegionProvider::new())
    }

    /// Number of regions the provider currently has outstanding.
    pub fn outstanding_regions(&self) -> usize {
        self.lock().provider.outstanding_regions()
    }
}

impl<P: RegionProvider> Cache<P> {
    /// Set up a cache over a caller-supplied region provider.
    ///
    /// The cache starts with one fully free slab. Contract violations
    /// (zero object size, slab order above [`MAX_SLAB_ORDER`], object too
    /// large for the slab) are fatal.
    ///
    /// [`MAX_SLAB_ORDER`]: crate::MAX_SLAB_ORDER
    pub fn with_provider(
        object_size: usize,
        slab_order: usize,
        mut provider: P,
    ) -> AllocResult<Self> {
        let cache = SlabCache::new(object_size, slab_order, &mut provider)?;
        Ok(Self {
            inner: Mutex::new(CacheInner { cache, provider }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<P>> {
        // the allocator stays usable after an unrelated panic in a user thread
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate one uninitialized object of at least the configured size.
    pub fn alloc(&self) -> AllocResult<NonNull<u8>> {
        let mut inner = self.lock();
        let CacheInner { cache, provider } = &mut *inner;
        let addr = cache.alloc_object(provider)?;
        // a user address points into a live slab interior, never at zero
        Ok(unsafe { NonNull::new_unchecked(addr as *mut u8) })
    }

    /// Return an object previously handed out by this cache.
    pub fn free(&self, ptr: NonNull<u8>) {
        self.lock().cache.free_object(ptr.as_ptr() as usize);
    }

    /// Release every slab with no outstanding objects back to the
    /// provider.
    pub fn shrink(&self) {
        let mut inner = self.lock();
        let CacheInner { cache, provider } = &mut *inner;
        cache.shrink(provider);
    }

    /// Release every slab back to the provider, invalidating outstanding
    /// objects. The cache stays usable afterwards.
    pub fn release(&self) {
        let mut inner = self.lock();
        let CacheInner { cache, provider } = &mut *inner;
        cache.release(provider);
    }

    /// Number of slabs on each occupancy list, `(free, partial, full)`.
    pub fn slab_counts(&self) -> (usize, usize, usize) {
        let inner = self.lock();
        (
            inner.cache.free_slabs(),
            inner.cache.partial_slabs(),
            inner.cache.full_slabs(),
        )
    }

    /// Log the cache geometry and list lengths.
    pub fn dump_cache(&self) {
        self.lock().cache.dump();
    }

    /// Log the head slab of one occupancy list with its free-list.
    pub fn dump_slab(&self, state: SlabState) {
        self.lock().cache.dump_slab(state);
    }
}

impl<P: RegionProvider> Drop for Cache<P> {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let CacheInner { cache, provider } = inner;
        cache.release(provider);
    }
}
