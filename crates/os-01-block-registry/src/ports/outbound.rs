//! # Outbound Ports (Driven Ports)
//!
//! The shared-memory capability the block store depends on.
//!
//! The control plane only calls `create_region` and `destroy_region`; it
//! never touches payload bytes. Clients call `map` and `unmap` on their own
//! provider instance to reach the bytes a handle authorizes.
//!
//! Production: `MmapRegionProvider` (adapters/region/mmap.rs)
//! Testing: `InMemoryRegionProvider` (adapters/region/memory.rs)

use shared_types::{AccessMode, RegionDescriptor, StoreError};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a region provider or a mapped view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegionError {
    /// No region with this name exists.
    #[error("region '{name}' not found")]
    NotFound { name: String },

    /// The OS refused to create, map or remove the region.
    #[error("region '{name}': {message}")]
    Io { name: String, message: String },

    /// Access outside the region's capacity.
    #[error("access of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    /// Write through a read-only view.
    #[error("region '{name}' is mapped read-only")]
    ReadOnly { name: String },

    /// Atomic access at an offset the mapping cannot align.
    #[error("offset {offset} is not aligned for atomic access")]
    Misaligned { offset: usize },
}

impl From<RegionError> for StoreError {
    fn from(err: RegionError) -> Self {
        StoreError::Region {
            message: err.to_string(),
        }
    }
}

/// Raw memory behind a mapped region.
///
/// # Safety
///
/// Implementors must return a pointer valid for `mapped_len()` bytes for as long
/// as the value is alive.
pub unsafe trait RegionMemory: Send + Sync {
    /// Base address of the mapping.
    fn as_ptr(&self) -> *mut u8;

    /// Mapped length in bytes.
    fn mapped_len(&self) -> usize;
}

/// A mapped view onto one region.
///
/// Several views of the same region may exist at once, across threads and
/// processes. The handle discipline of the control plane (one writer before
/// commit, readers only after) is what keeps their accesses disjoint in time.
#[derive(Clone)]
pub struct RegionView {
    descriptor: RegionDescriptor,
    mode: AccessMode,
    memory: Arc<dyn RegionMemory>,
}

impl std::fmt::Debug for RegionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionView")
            .field("descriptor", &self.descriptor)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl RegionView {
    /// Wraps mapped memory. Used by provider implementations.
    pub fn new(
        descriptor: RegionDescriptor,
        mode: AccessMode,
        memory: Arc<dyn RegionMemory>,
    ) -> Self {
        Self {
            descriptor,
            mode,
            memory,
        }
    }

    pub fn descriptor(&self) -> &RegionDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Base address of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.memory.as_ptr()
    }

    /// Usable bytes of the view.
    pub fn capacity(&self) -> usize {
        self.descriptor.capacity.min(self.memory.mapped_len())
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), RegionError> {
        let capacity = self.capacity();
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(RegionError::OutOfBounds {
                offset,
                len,
                capacity,
            }),
        }
    }

    /// Copies `buf.len()` bytes starting at `offset` into `buf`.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), RegionError> {
        self.check_bounds(offset, buf.len())?;
        // SAFETY: bounds checked above; the memory outlives `self.memory`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.memory.as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    /// Copies `data` into the region starting at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<(), RegionError> {
        if self.mode != AccessMode::Write {
            return Err(RegionError::ReadOnly {
                name: self.descriptor.name.clone(),
            });
        }
        self.check_bounds(offset, data.len())?;
        // SAFETY: bounds checked above; the memory outlives `self.memory`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.memory.as_ptr().add(offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// Copies the first `len` bytes out of the region.
    pub fn to_vec(&self, len: usize) -> Result<Vec<u8>, RegionError> {
        let mut buf = vec![0u8; len];
        self.read_at(0, &mut buf)?;
        Ok(buf)
    }

    /// Views `count` 64-bit words starting at `offset` as atomics.
    ///
    /// Every mapping of the region, in any process, sees the same words, so
    /// they can carry cross-process synchronization state. Requires a
    /// writable view.
    pub fn atomic_words(&self, offset: usize, count: usize) -> Result<&[AtomicU64], RegionError> {
        if self.mode != AccessMode::Write {
            return Err(RegionError::ReadOnly {
                name: self.descriptor.name.clone(),
            });
        }
        let len = count
            .checked_mul(std::mem::size_of::<AtomicU64>())
            .ok_or(RegionError::OutOfBounds {
                offset,
                len: usize::MAX,
                capacity: self.capacity(),
            })?;
        self.check_bounds(offset, len)?;
        // SAFETY: offset is within the mapping (bounds checked above).
        let ptr = unsafe { self.memory.as_ptr().add(offset) };
        if ptr as usize % std::mem::align_of::<AtomicU64>() != 0 {
            return Err(RegionError::Misaligned { offset });
        }
        // SAFETY: the range is in bounds and aligned, AtomicU64 has the same
        // layout as u64, and the memory lives as long as `self.memory`.
        Ok(unsafe { std::slice::from_raw_parts(ptr as *const AtomicU64, count) })
    }

    /// Borrows the first `len` bytes in place, without copying.
    ///
    /// # Safety
    ///
    /// The caller must hold a read handle that stays valid, and no writer may
    /// touch the region, for the lifetime of the returned slice.
    pub unsafe fn as_slice(&self, len: usize) -> Result<&[u8], RegionError> {
        self.check_bounds(0, len)?;
        Ok(std::slice::from_raw_parts(self.memory.as_ptr(), len))
    }
}

/// Creates, maps and destroys named shared-memory regions.
pub trait RegionProvider: Send + Sync {
    /// Allocates a new region of exactly `capacity` bytes.
    fn create_region(&self, capacity: usize) -> Result<RegionDescriptor, RegionError>;

    /// Maps an existing region.
    fn map(&self, region: &RegionDescriptor, mode: AccessMode) -> Result<RegionView, RegionError>;

    /// Unmaps a view. Dropping the view has the same effect.
    fn unmap(&self, view: RegionView) -> Result<(), RegionError> {
        drop(view);
        Ok(())
    }

    /// Releases the region back to the OS. Existing mappings stay readable
    /// until they are dropped.
    fn destroy_region(&self, region: &RegionDescriptor) -> Result<(), RegionError>;
}

impl<T: RegionProvider + ?Sized> RegionProvider for Arc<T> {
    fn create_region(&self, capacity: usize) -> Result<RegionDescriptor, RegionError> {
        (**self).create_region(capacity)
    }

    fn map(&self, region: &RegionDescriptor, mode: AccessMode) -> Result<RegionView, RegionError> {
        (**self).map(region, mode)
    }

    fn unmap(&self, view: RegionView) -> Result<(), RegionError> {
        (**self).unmap(view)
    }

    fn destroy_region(&self, region: &RegionDescriptor) -> Result<(), RegionError> {
        (**self).destroy_region(region)
    }
}
