//! # Inbound Ports (Driving Ports)
//!
//! Named objects and queues. Writes are two-phase: the client obtains a
//! Write block with `create_block`, fills it through its own mapping, then
//! calls `put` or `push_to_object`, which commit and publish in one step.

use shared_types::{
    BlockRef, ClientId, EntrySeq, Handle, ObjectInfo, RegionDescriptor, StoreError, StoreStats,
};

/// Named object and queue operations.
pub trait ObjectStoreApi {
    // =========================================================================
    // SINGLE OBJECTS
    // =========================================================================

    /// Commits `block` (owned by `caller`) and makes it the head of `name`.
    ///
    /// A previous head stays readable by existing handles and is reclaimed
    /// by `remove_object`.
    ///
    /// ## Errors
    ///
    /// - `InvalidState`: `name` holds a queue or a multi-track object, or
    ///   the block is not in Write
    /// - `InvalidOwner`: `caller` does not own the block
    fn put(&mut self, name: &str, block: BlockRef, caller: ClientId) -> Result<(), StoreError>;

    /// Read handle on the head block of `name`. The caller must release it.
    fn get(&mut self, name: &str) -> Result<Handle, StoreError>;

    /// Commits every block of `tracks` and makes them the value of `name`,
    /// all or nothing. A name keeps the track count of its first put.
    ///
    /// ## Errors
    ///
    /// - `InvalidState`: no tracks, a block listed twice, a track count
    ///   differing from the existing object's, or a block not in Write
    /// - `InvalidOwner`: `caller` does not own some block
    fn put_tracks(
        &mut self,
        name: &str,
        tracks: &[BlockRef],
        caller: ClientId,
    ) -> Result<(), StoreError>;

    /// Read handles on the listed tracks of `name` (every track when
    /// `indices` is empty), in request order, all or nothing.
    fn get_tracks(&mut self, name: &str, indices: &[usize]) -> Result<Vec<Handle>, StoreError>;

    /// Deletes every block of `name` and drops the name, all or nothing.
    ///
    /// ## Errors
    ///
    /// - `Busy`: some block has readers and `force` is false
    /// - `NotFound`: unknown name
    fn remove_object(&mut self, name: &str, force: bool) -> Result<(), StoreError>;

    // =========================================================================
    // QUEUES
    // =========================================================================

    /// Creates an empty queue with an optional entry limit.
    fn create_queue(&mut self, name: &str, max_capacity: Option<usize>) -> Result<(), StoreError>;

    /// Commits `block` and appends it to `name`, creating an unbounded queue
    /// when the name is unknown.
    ///
    /// ## Errors
    ///
    /// - `Exhausted`: queue is full (the block stays in Write)
    /// - `InvalidState`: `name` holds a single object
    fn push_to_object(
        &mut self,
        name: &str,
        block: BlockRef,
        caller: ClientId,
    ) -> Result<EntrySeq, StoreError>;

    /// Claims the oldest unclaimed entry and returns a read handle on it.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: no unclaimed entry
    fn pop_from_object(&mut self, name: &str) -> Result<(EntrySeq, Handle), StoreError>;

    /// Gives back a popped handle. The entry is removed and its block
    /// deleted once its last reader is gone.
    fn free_handle(&mut self, name: &str, block: BlockRef) -> Result<(), StoreError>;

    /// Non-destructive read of entry `seq`.
    fn read_from_object(&mut self, name: &str, seq: EntrySeq) -> Result<Handle, StoreError>;

    /// Non-destructive read of the newest entry.
    fn read_latest_from_object(&mut self, name: &str) -> Result<(EntrySeq, Handle), StoreError>;

    /// Non-destructive read of several entries. Fails as a whole if any
    /// entry is unreadable.
    fn batch_read_from_object(
        &mut self,
        name: &str,
        seqs: &[EntrySeq],
    ) -> Result<Vec<(EntrySeq, Handle)>, StoreError>;

    /// Releases a handle obtained from an entry read.
    fn release_entry(&mut self, name: &str, block: BlockRef) -> Result<(), StoreError>;

    /// Releases several entry handles. Fails as a whole if any release
    /// would fail.
    fn batch_release_entry(&mut self, name: &str, blocks: &[BlockRef]) -> Result<(), StoreError>;

    /// Deletes one entry and its block.
    fn delete_entry(&mut self, name: &str, seq: EntrySeq, force: bool) -> Result<(), StoreError>;

    /// Live sequence numbers of a queue, oldest first.
    fn list_entries(&self, name: &str) -> Result<Vec<EntrySeq>, StoreError>;

    // =========================================================================
    // REPORTING
    // =========================================================================

    fn object_info(&self, name: &str) -> Result<ObjectInfo, StoreError>;

    /// Shared region holding the advisory lock of `name`, created on first
    /// request. The name need not exist yet.
    fn lock_region(&mut self, name: &str) -> Result<RegionDescriptor, StoreError>;

    /// Block and directory counters.
    fn store_stats(&self) -> StoreStats;
}
