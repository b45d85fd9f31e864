//! Zero-copy access to a block's bytes.
//!
//! A `MappedBlock` keeps its region mapped, and optionally the object's
//! shared read lock held, for as long as it lives. The bytes it lends out
//! point straight into shared memory.

use crate::payload::{data_range, PayloadError, PayloadView};
use os_01_block_registry::{RegionError, RegionView};
use os_03_fair_lock::FairReadGuard;
use shared_types::{BlockRef, RegionDescriptor};

/// A mapped, read-only block.
///
/// Drop it before releasing the read handle it was mapped from: once the
/// handle is gone the block may be reused and rewritten.
#[derive(Debug)]
pub struct MappedBlock {
    block: BlockRef,
    view: RegionView,
    len: usize,
    lock: Option<FairReadGuard>,
}

impl MappedBlock {
    pub(crate) fn new(
        block: BlockRef,
        view: RegionView,
        len: usize,
        lock: Option<FairReadGuard>,
    ) -> Result<Self, RegionError> {
        if len > view.capacity() {
            return Err(RegionError::OutOfBounds {
                offset: 0,
                len,
                capacity: view.capacity(),
            });
        }
        Ok(Self {
            block,
            view,
            len,
            lock,
        })
    }

    pub fn block(&self) -> BlockRef {
        self.block
    }

    pub fn region(&self) -> &RegionDescriptor {
        self.view.descriptor()
    }

    /// Logical size of the block.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the object's shared read lock is held.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// The block's bytes, borrowed from the mapping.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: `len` was checked against the mapping in `new`. The caller
        // holds a read handle while this value lives, so the control plane
        // keeps the block committed and no writer can reach it.
        unsafe { self.view.as_slice(self.len) }.unwrap_or_default()
    }

    /// The encoded payload, borrowed in place.
    pub fn payload(&self) -> Result<PayloadView<'_>, PayloadError> {
        PayloadView::parse(self.bytes())
    }

    /// The payload's data bytes (array elements or opaque body), without
    /// its header.
    pub fn payload_data(&self) -> Result<&[u8], PayloadError> {
        let bytes = self.bytes();
        Ok(&bytes[data_range(bytes)?])
    }
}

impl AsRef<[u8]> for MappedBlock {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}
