//! Slab cache for a single object size.
//!
//! This module implements [`SlabCache`], which owns every slab serving one
//! object size and keeps them on three intrusive lists partitioned by
//! occupancy (free, partial, full). Allocation and free migrate a slab
//! between the lists when its occupancy crosses a boundary.

#[cfg(feature = "log")]
use log::{debug, info, warn};

use super::slab_node::{Slab, SlabGeometry};
use crate::{AllocResult, RegionProvider};

/// Occupancy states a slab moves through; selects the list a diagnostic
/// dump inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabState {
    Free,
    Partial,
    Full,
}

struct SlabList {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl SlabList {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn front(&self) -> Option<usize> {
        self.head
    }

    pub fn back(&self) -> Option<usize> {
        self.tail
    }

    pub fn push_back(&mut self, geometry: SlabGeometry, slab_base: usize) {
        let mut node = Slab::new(slab_base, geometry);
        node.set_prev(self.tail);
        node.set_next(None);

        if let Some(tail) = self.tail {
            let mut tail_node = Slab::new(tail, geometry);
            tail_node.set_next(Some(slab_base));
        } else {
            self.head = Some(slab_base);
        }

        self.tail = Some(slab_base);
        self.len += 1;
    }

    pub fn pop_back(&mut self, geometry: SlabGeometry) -> Option<usize> {
        let tail = self.tail?;
        self.remove(geometry, tail);
        Some(tail)
    }

    pub fn remove(&mut self, geometry: SlabGeometry, slab_base: usize) {
        let mut node = Slab::new(slab_base, geometry);
        let prev = node.prev();
        let next = node.next();

        if let Some(prev_base) = prev {
            let mut prev_node = Slab::new(prev_base, geometry);
            prev_node.set_next(next);
        } else {
            self.head = next;
        }

        if let Some(next_base) = next {
            let mut next_node = Slab::new(next_base, geometry);
            next_node.set_prev(prev);
        } else {
            self.tail = prev;
        }

        node.set_prev(None);
        node.set_next(None);
        self.len = self.len.saturating_sub(1);
    }
}

/// Slab cache for a specific object size.
///
/// The cache is single-threaded; the caller supplies the region provider
/// on every operation that can touch it. [`Cache`](crate::Cache) wraps the
/// pair behind a lock for shared use.
pub struct SlabCache {
    geometry: SlabGeometry,
    free: SlabList,
    partial: SlabList,
    full: SlabList,
}

impl SlabCache {
    /// Set up a cache: compute the geometry and format one free slab.
    ///
    /// Panics on contract violations (zero object size, slab order out of
    /// range, object too large for the slab); propagates provider failure.
    pub fn new(
        object_size: usize,
        slab_order: usize,
        provider: &mut dyn RegionProvider,
    ) -> AllocResult<Self> {
        let geometry = SlabGeometry::for_object_size(object_size, slab_order);
        let mut cache = Self {
            geometry,
            free: SlabList::new(),
            partial: SlabList::new(),
            full: SlabList::new(),
        };
        cache.grow(provider)?;
        Ok(cache)
    }

    pub fn geometry(&self) -> SlabGeometry {
        self.geometry
    }

    /// Number of slabs on the free list.
    pub fn free_slabs(&self) -> usize {
        self.free.len()
    }

    /// Number of slabs on the partial list.
    pub fn partial_slabs(&self) -> usize {
        self.partial.len()
    }

    /// Number of slabs on the full list.
    pub fn full_slabs(&self) -> usize {
        self.full.len()
    }

    /// Format one new slab onto the free list.
    fn grow(&mut self, provider: &mut dyn RegionProvider) -> AllocResult<()> {
        let base = provider.alloc_aligned(self.geometry.slab_order())?;
        Slab::format(base, self.geometry);
        self.free.push_back(self.geometry, base);
        debug!(
            "slab cache: new slab at {:#x}, {} objects of stride {}",
            base,
            self.geometry.objects_per_slab(),
            self.geometry.stride()
        );
        Ok(())
    }

    /// Allocate one object, returning its user address.
    ///
    /// Partial slabs are preferred over free slabs to keep fragmentation
    /// down; when both lists are empty a new slab is formatted and the
    /// loop retries. Provider failure surfaces as `NoMemory`.
    pub fn alloc_object(&mut self, provider: &mut dyn RegionProvider) -> AllocResult<usize> {
        loop {
            // 1. Allocate from a partial slab
            if let Some(slab_base) = self.partial.back() {
                let mut slab = Slab::new(slab_base, self.geometry);
                let Some(slot) = slab.pop_slot() else {
                    panic!(
                        "slab cache: partial slab {:#x} has no free slot, free-list inconsistency",
                        slab_base
                    );
                };
                if slab.is_full() {
                    self.partial.remove(self.geometry, slab_base);
                    self.full.push_back(self.geometry, slab_base);
                }
                return Ok(Slab::user_addr(slot));
            }

            // 2. Detach a free slab and start filling it
            if let Some(slab_base) = self.free.pop_back(self.geometry) {
                let mut slab = Slab::new(slab_base, self.geometry);
                let Some(slot) = slab.pop_slot() else {
                    panic!(
                        "slab cache: free slab {:#x} has no free slot, free-list inconsistency",
                        slab_base
                    );
                };
                if slab.is_full() {
                    // single-object slab, straight to the full list
                    self.full.push_back(self.geometry, slab_base);
                } else {
                    self.partial.push_back(self.geometry, slab_base);
                }
                return Ok(Slab::user_addr(slot));
            }

            // 3. Both lists empty: format a new slab and retry
            self.grow(provider)?;
        }
    }

    /// Return one object to its owning slab.
    ///
    /// The slab is recovered from the pointer's alignment. A migration
    /// always detaches the slab from its current list before pushing it
    /// onto the destination, so a slab is on exactly one list at any time.
    pub fn free_object(&mut self, user_addr: usize) {
        let mut slab = Slab::from_user_addr(user_addr, self.geometry);
        assert!(
            slab.is_valid(),
            "slab cache: {:#x} does not belong to a live slab of this cache",
            user_addr
        );

        let was_full = slab.is_full();
        slab.push_slot(Slab::slot_addr(user_addr));

        if was_full {
            self.full.remove(self.geometry, slab.base());
            if slab.is_empty() {
                self.free.push_back(self.geometry, slab.base());
            } else {
                self.partial.push_back(self.geometry, slab.base());
            }
        } else if slab.is_empty() {
            self.partial.remove(self.geometry, slab.base());
            self.free.push_back(self.geometry, slab.base());
        }
    }

    /// Release every slab on the free list back to the provider. Partial
    /// and full slabs are untouched.
    pub fn shrink(&mut self, provider: &mut dyn RegionProvider) {
        Self::drain_list(&mut self.free, self.geometry, provider);
    }

    /// Release every slab back to the provider, leaving the cache with no
    /// slabs.
    ///
    /// Outstanding user pointers are invalidated; handing one to
    /// [`free_object`](Self::free_object) afterwards is a contract
    /// violation. The cache itself stays usable: the next allocation
    /// formats a fresh slab.
    pub fn release(&mut self, provider: &mut dyn RegionProvider) {
        if self.partial.len() + self.full.len() > 0 {
            warn!(
                "slab cache: releasing {} slabs with outstanding objects",
                self.partial.len() + self.full.len()
            );
        }
        Self::drain_list(&mut self.free, self.geometry, provider);
        Self::drain_list(&mut self.partial, self.geometry, provider);
        Self::drain_list(&mut self.full, self.geometry, provider);
    }

    fn drain_list(
        list: &mut SlabList,
        geometry: SlabGeometry,
        provider: &mut dyn RegionProvider,
    ) {
        while let Some(slab_base) = list.pop_back(geometry) {
            provider.free_aligned(slab_base);
        }
    }

    /// Log the cache geometry and the length of each slab list.
    pub fn dump(&self) {
        info!(
            "slab cache: object_size={} stride={} objects_per_slab={} header_offset={} slab_order={}",
            self.geometry.object_size(),
            self.geometry.stride(),
            self.geometry.objects_per_slab(),
            self.geometry.header_offset(),
            self.geometry.slab_order()
        );
        info!(
            "slab cache: free={} partial={} full={}",
            self.free.len(),
            self.partial.len(),
            self.full.len()
        );
    }

    /// Log the head slab of one occupancy list together with its
    /// free-list.
    #[allow(unused_variables)]
    pub fn dump_slab(&self, state: SlabState) {
        let list = match state {
            SlabState::Free => &self.free,
            SlabState::Partial => &self.partial,
            SlabState::Full => &self.full,
        };
        let Some(slab_base) = list.front() else {
            info!("slab cache: {:?} list is empty", state);
            return;
        };

        let slab = Slab::new(slab_base, self.geometry);
        info!(
            "slab cache: {:?} slab at {:#x}, next={:#x}, free_count={}, free-list length {}",
            state,
            slab_base,
            slab.next().unwrap_or(0),
            slab.free_count(),
            slab.free_list_len()
        );
        for (idx, slot) in slab.free_slots().enumerate() {
            debug!("slab cache:   [{}] free slot {:#x}", idx + 1, slot);
        }
    }
}
