//! # Inbound Ports (Driving Ports)
//!
//! The block lifecycle API exposed to the object directory and the
//! control-plane server.

use shared_types::{BlockId, BlockRef, ClientId, Generation, Handle, StoreError, StoreStats};

/// Block lifecycle operations.
///
/// Implementations validate every precondition before mutating, so an `Err`
/// always leaves the store unchanged.
pub trait BlockStoreApi {
    /// Obtains a block in Write for `owner`, reusing a Zombie when one fits.
    ///
    /// ## Errors
    ///
    /// - `Exhausted`: size above the largest class, pool budget reached, or
    ///   the region provider could not allocate
    fn create_block(&mut self, size: usize, owner: ClientId) -> Result<Handle, StoreError>;

    /// Write → Idle. Returns a read-mode view of the committed block.
    ///
    /// ## Errors
    ///
    /// - `InvalidOwner`: caller is not the writer
    /// - `InvalidState`: block is not in Write
    /// - `StaleGeneration`: block was reaped or reused since creation
    fn commit(&mut self, block: BlockRef, caller: ClientId) -> Result<Handle, StoreError>;

    /// Idle/Busy → Busy. Returns a read handle.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: unknown or Zombie block
    /// - `InvalidState`: block not committed yet
    /// - `StaleGeneration`: `expected` no longer matches
    fn request_data(
        &mut self,
        block_id: BlockId,
        expected: Option<Generation>,
    ) -> Result<Handle, StoreError>;

    /// Busy → Busy/Idle. Returns the remaining reader count.
    ///
    /// ## Errors
    ///
    /// - `DoubleRelease`: no reader left to release
    /// - `StaleGeneration`: handle outlived a delete or reuse
    fn release(&mut self, block: BlockRef) -> Result<u32, StoreError>;

    /// Idle/Busy → Zombie, handing the block to the reuse pool.
    ///
    /// ## Errors
    ///
    /// - `Busy`: readers remain and `force` is false
    /// - `InvalidState`: block is still being written
    /// - `NotFound`: unknown or already Zombie
    fn delete(&mut self, block_id: BlockId, force: bool) -> Result<(), StoreError>;

    /// Turns every Write block of `owner` into a Zombie.
    fn reap_owner(&mut self, owner: ClientId) -> Vec<BlockId>;

    /// Block counters. Directory fields are left at zero.
    fn stats(&self) -> StoreStats;
}
