//! Process-local region provider backed by heap buffers.

use crate::ports::outbound::{RegionError, RegionMemory, RegionProvider, RegionView};
use parking_lot::Mutex;
use shared_types::{AccessMode, RegionDescriptor};
use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Heap buffer stored as 64-bit words so atomic views are aligned.
struct HeapRegion {
    words: Box<[UnsafeCell<u64>]>,
    len: usize,
}

impl HeapRegion {
    fn zeroed(capacity: usize) -> Self {
        let words = capacity.div_ceil(8);
        Self {
            words: (0..words).map(|_| UnsafeCell::new(0)).collect(),
            len: capacity,
        }
    }
}

// SAFETY: bytes are only reached through raw pointers; the handle protocol
// orders writers before readers.
unsafe impl Sync for HeapRegion {}

// SAFETY: the boxed slice lives as long as the region and covers `len` bytes.
unsafe impl RegionMemory for HeapRegion {
    fn as_ptr(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.words.as_ptr()) as *mut u8
    }

    fn mapped_len(&self) -> usize {
        self.len
    }
}

/// Heap-backed regions, shared between every clone of the provider.
#[derive(Clone, Default)]
pub struct InMemoryRegionProvider {
    regions: Arc<Mutex<HashMap<String, Arc<HeapRegion>>>>,
    next_region: Arc<AtomicU64>,
}

impl InMemoryRegionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of regions created and not destroyed.
    pub fn live_regions(&self) -> usize {
        self.regions.lock().len()
    }
}

impl RegionProvider for InMemoryRegionProvider {
    fn create_region(&self, capacity: usize) -> Result<RegionDescriptor, RegionError> {
        let id = self.next_region.fetch_add(1, Ordering::Relaxed);
        let name = format!("heap-{}", id);
        self.regions
            .lock()
            .insert(name.clone(), Arc::new(HeapRegion::zeroed(capacity)));
        Ok(RegionDescriptor { name, capacity })
    }

    fn map(&self, region: &RegionDescriptor, mode: AccessMode) -> Result<RegionView, RegionError> {
        let memory = self
            .regions
            .lock()
            .get(&region.name)
            .cloned()
            .ok_or_else(|| RegionError::NotFound {
                name: region.name.clone(),
            })?;
        Ok(RegionView::new(region.clone(), mode, memory))
    }

    fn destroy_region(&self, region: &RegionDescriptor) -> Result<(), RegionError> {
        self.regions
            .lock()
            .remove(&region.name)
            .map(|_| ())
            .ok_or_else(|| RegionError::NotFound {
                name: region.name.clone(),
            })
    }
}
