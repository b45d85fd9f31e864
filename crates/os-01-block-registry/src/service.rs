//! # Block Store Service
//!
//! Combines the registry, the reuse pool and a region provider into the
//! block lifecycle API.
//!
//! ## Allocation
//!
//! 1. Round the requested size up to its size class.
//! 2. Reuse the oldest Zombie of the smallest sufficient class, if any.
//! 3. Otherwise create a new region, unless that would exceed the byte budget.
//!
//! Regions are never destroyed while the store runs: a deleted block keeps
//! its region and waits in the pool. `shutdown` destroys them all.

use crate::domain::{Block, BlockRegistry, PoolConfig, ZombiePool};
use crate::ports::inbound::BlockStoreApi;
use crate::ports::outbound::RegionProvider;
use shared_types::{
    AccessMode, BlockId, BlockRef, ClientId, Generation, Handle, StoreError, StoreStats,
};
use tracing::{debug, info, warn};

/// The block lifecycle service over a region provider `R`.
pub struct BlockStore<R: RegionProvider> {
    regions: R,
    config: PoolConfig,
    registry: BlockRegistry,
    pool: ZombiePool,
    region_bytes: usize,
}

impl<R: RegionProvider> BlockStore<R> {
    /// Creates an empty store.
    pub fn new(regions: R, config: PoolConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self {
            regions,
            config,
            registry: BlockRegistry::new(),
            pool: ZombiePool::new(),
            region_bytes: 0,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn regions(&self) -> &R {
        &self.regions
    }

    /// Read-only view of the block table.
    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Looks up a block, Zombies included.
    pub fn block(&self, block_id: BlockId) -> Option<&Block> {
        self.registry.get(block_id)
    }

    // =========================================================================
    // VALIDATION PASSTHROUGHS (used by all-or-nothing callers)
    // =========================================================================

    pub fn validate_ref(&self, block: BlockRef) -> Result<&Block, StoreError> {
        self.registry.validate_ref(block)
    }

    pub fn check_readable(
        &self,
        block_id: BlockId,
        expected: Option<Generation>,
    ) -> Result<&Block, StoreError> {
        self.registry.check_readable(block_id, expected)
    }

    pub fn check_release(&self, block: BlockRef, count: u32) -> Result<u32, StoreError> {
        self.registry.check_release(block, count)
    }

    pub fn check_commit(&self, block: BlockRef, caller: ClientId) -> Result<(), StoreError> {
        self.registry.check_commit(block, caller)
    }

    pub fn check_delete(&self, block_id: BlockId, force: bool) -> Result<&Block, StoreError> {
        self.registry.check_delete(block_id, force)
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    fn allocate_region(
        &mut self,
        size: usize,
        class: usize,
        owner: ClientId,
    ) -> Result<Handle, StoreError> {
        if let Some(budget) = self.config.max_pool_bytes {
            if self.region_bytes + class > budget {
                return Err(StoreError::Exhausted {
                    requested: size,
                    reason: format!(
                        "pool budget of {} bytes reached ({} in use)",
                        budget, self.region_bytes
                    ),
                });
            }
        }

        let region = self
            .regions
            .create_region(class)
            .map_err(|e| StoreError::Exhausted {
                requested: size,
                reason: e.to_string(),
            })?;
        self.region_bytes += class;
        Ok(self
            .registry
            .insert_fresh(size, region, owner)
            .handle(AccessMode::Write))
    }

    /// Destroys every region. The store is empty afterwards.
    ///
    /// Returns the number of regions destroyed; failures are logged and
    /// skipped.
    pub fn shutdown(&mut self) -> usize {
        let mut destroyed = 0;
        for block in self.registry.iter() {
            match self.regions.destroy_region(block.region()) {
                Ok(()) => destroyed += 1,
                Err(e) => warn!(
                    block_id = %block.id(),
                    region = %block.region().name,
                    error = %e,
                    "failed to destroy region"
                ),
            }
        }
        info!(destroyed, "block store shut down");
        self.registry = BlockRegistry::new();
        self.pool = ZombiePool::new();
        self.region_bytes = 0;
        destroyed
    }

    /// Cross-checks registry, pool and byte accounting.
    ///
    /// Returns a description of the first inconsistency found.
    pub fn verify_integrity(&self) -> Result<(), String> {
        let mut pooled = 0usize;
        let mut pooled_count = 0usize;
        for (block_id, capacity) in self.pool.iter() {
            let block = self
                .registry
                .get(block_id)
                .ok_or_else(|| format!("pooled {} is not registered", block_id))?;
            if !block.is_zombie() {
                return Err(format!("pooled {} is {}", block_id, block.state().name()));
            }
            if block.capacity() != capacity {
                return Err(format!("pooled {} filed under wrong class", block_id));
            }
            pooled += capacity;
            pooled_count += 1;
        }

        let counts = self.registry.counts();
        if counts.zombie != pooled_count {
            return Err(format!(
                "{} zombies but {} pooled blocks",
                counts.zombie, pooled_count
            ));
        }
        if pooled != self.pool.pooled_bytes() {
            return Err("pooled byte counter drifted".to_string());
        }
        if self.registry.region_bytes() != self.region_bytes {
            return Err("region byte counter drifted".to_string());
        }
        for block in self.registry.iter() {
            if block.size() > block.capacity() {
                return Err(format!("{} size exceeds its capacity", block.id()));
            }
        }
        Ok(())
    }
}

impl<R: RegionProvider> BlockStoreApi for BlockStore<R> {
    fn create_block(&mut self, size: usize, owner: ClientId) -> Result<Handle, StoreError> {
        let class = self.config.class_for(size)?;

        if let Some((block_id, capacity)) = self.pool.take_best_fit(class) {
            match self.registry.revive(block_id, size, owner) {
                Ok(block) => return Ok(block.handle(AccessMode::Write)),
                Err(e) => {
                    self.pool.push(block_id, capacity);
                    return Err(e);
                }
            }
        }

        self.allocate_region(size, class, owner)
    }

    fn commit(&mut self, block: BlockRef, caller: ClientId) -> Result<Handle, StoreError> {
        self.registry.commit(block, caller)
    }

    fn request_data(
        &mut self,
        block_id: BlockId,
        expected: Option<Generation>,
    ) -> Result<Handle, StoreError> {
        self.registry.request_data(block_id, expected)
    }

    fn release(&mut self, block: BlockRef) -> Result<u32, StoreError> {
        self.registry.release(block)
    }

    fn delete(&mut self, block_id: BlockId, force: bool) -> Result<(), StoreError> {
        let readers = self.registry.check_delete(block_id, force)?.reader_count();
        if readers > 0 {
            warn!(block_id = %block_id, readers, "force-deleting block with live readers");
        }
        let capacity = self.registry.delete(block_id, force)?.capacity();
        self.pool.push(block_id, capacity);
        Ok(())
    }

    fn reap_owner(&mut self, owner: ClientId) -> Vec<BlockId> {
        let reaped = self.registry.reap_owner(owner);
        for &block_id in &reaped {
            if let Some(block) = self.registry.get(block_id) {
                self.pool.push(block_id, block.capacity());
            }
        }
        if !reaped.is_empty() {
            debug!(owner = %owner, count = reaped.len(), "reaped blocks pooled");
        }
        reaped
    }

    fn stats(&self) -> StoreStats {
        let counts = self.registry.counts();
        StoreStats {
            write_blocks: counts.write,
            idle_blocks: counts.idle,
            busy_blocks: counts.busy,
            zombie_blocks: counts.zombie,
            active_readers: counts.readers,
            region_bytes: self.region_bytes,
            pooled_bytes: self.pool.pooled_bytes(),
            objects: 0,
            queued_entries: 0,
        }
    }
}
