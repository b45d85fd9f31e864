//! # Object Store Service
//!
//! The control plane proper: the block store plus the named object
//! directory, exposing both the raw block API and the object/queue API.
//!
//! ## Atomicity
//!
//! Every operation runs in two phases. The first phase resolves names and
//! checks every block it will touch without mutating anything; the second
//! applies the changes, which can no longer fail. Batch operations validate
//! all elements before applying the first one.
//!
//! ## Queue Consumption
//!
//! `pop_from_object` claims an entry and adds the consumer's reader. Only
//! `free_handle` gives that reader back; `release_entry` only gives back
//! readers of non-destructive reads. The entry leaves the queue once it is
//! claimed, the consumer has freed its handle, and no reader remains.
//!
//! ## Lock Regions
//!
//! `lock_region` hands out one small shared region per name for the
//! client-side fair lock. They sit outside the block pool and live until
//! shutdown.

use crate::domain::{BlockLocation, ObjectDirectory, QueueEntry, Slot};
use crate::ports::inbound::ObjectStoreApi;
use os_01_block_registry::{BlockStore, BlockStoreApi, PoolConfig, RegionProvider};
use os_03_fair_lock::LOCK_REGION_BYTES;
use shared_types::{
    BlockId, BlockRef, ClientId, EntrySeq, Generation, Handle, ObjectInfo, RegionDescriptor,
    StoreError, StoreStats,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Block store and object directory behind one API.
pub struct ObjectStore<R: RegionProvider> {
    blocks: BlockStore<R>,
    directory: ObjectDirectory,
    lock_regions: HashMap<String, RegionDescriptor>,
}

/// Who is giving a queue entry handle back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Holder {
    /// The consumer that popped the entry (`free_handle`).
    Consumer,
    /// A non-destructive reader (`release_entry`).
    Reader,
    /// Unknown (raw `release`): a reader while other readers remain,
    /// otherwise the consumer.
    Either,
}

fn check_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::invalid_state("object ''", "object names cannot be empty"));
    }
    Ok(())
}

impl<R: RegionProvider> ObjectStore<R> {
    pub fn new(blocks: BlockStore<R>) -> Self {
        Self {
            blocks,
            directory: ObjectDirectory::new(),
            lock_regions: HashMap::new(),
        }
    }

    /// Builds an empty store over `regions`.
    pub fn with_regions(regions: R, config: PoolConfig) -> Result<Self, StoreError> {
        Ok(Self::new(BlockStore::new(regions, config)?))
    }

    pub fn blocks(&self) -> &BlockStore<R> {
        &self.blocks
    }

    pub fn directory(&self) -> &ObjectDirectory {
        &self.directory
    }

    /// Destroys every region and forgets every object. Returns the number
    /// of regions destroyed.
    pub fn shutdown(&mut self) -> usize {
        self.directory.clear();
        let mut destroyed = 0;
        for (name, region) in self.lock_regions.drain() {
            match self.blocks.regions().destroy_region(&region) {
                Ok(()) => destroyed += 1,
                Err(e) => warn!(object = %name, error = %e, "failed to destroy lock region"),
            }
        }
        destroyed + self.blocks.shutdown()
    }

    // =========================================================================
    // QUEUE HELPERS
    // =========================================================================

    /// Resolves `block` to an entry of queue `name`.
    fn entry_of(&self, name: &str, block: BlockRef) -> Result<(EntrySeq, QueueEntry), StoreError> {
        let queue = self.directory.queue(name)?;
        let seq = match self.directory.locate(block.block_id) {
            Some(BlockLocation {
                name: owner,
                slot: Slot::Entry(seq),
            }) if owner == name => *seq,
            _ => {
                // A consumed or deleted entry leaves a Zombie behind; report
                // the handle as stale rather than unknown.
                self.blocks.validate_ref(block)?;
                return Err(StoreError::not_found(format!(
                    "entry for {} in queue '{}'",
                    block, name
                )));
            }
        };
        let entry = *queue
            .get(seq)
            .ok_or_else(|| StoreError::not_found(format!("entry {} of queue '{}'", seq, name)))?;
        if entry.block != block {
            return Err(StoreError::StaleGeneration {
                block_id: block.block_id,
                presented: block.generation,
                current: entry.block.generation,
            });
        }
        Ok((seq, entry))
    }

    fn entry_at(&self, name: &str, seq: EntrySeq) -> Result<QueueEntry, StoreError> {
        self.directory
            .queue(name)?
            .get(seq)
            .copied()
            .ok_or_else(|| StoreError::not_found(format!("entry {} of queue '{}'", seq, name)))
    }

    /// Removes a consumed entry and returns its block to the pool.
    fn finalize_entry(
        &mut self,
        name: &str,
        seq: EntrySeq,
        block: BlockRef,
    ) -> Result<(), StoreError> {
        self.blocks.delete(block.block_id, false)?;
        self.directory.remove_entry(name, seq);
        debug!(object = name, seq, block = %block, "queue entry consumed");
        Ok(())
    }

    /// Readers of an entry other than its popping consumer.
    fn peer_readers(&self, entry: &QueueEntry) -> u32 {
        let readers = self
            .blocks
            .block(entry.block.block_id)
            .map(|b| b.reader_count())
            .unwrap_or(0);
        readers.saturating_sub(u32::from(entry.consumer_holds))
    }

    fn release_queue_handle(
        &mut self,
        name: &str,
        block: BlockRef,
        holder: Holder,
    ) -> Result<(), StoreError> {
        let (seq, entry) = self.entry_of(name, block)?;
        if holder == Holder::Consumer && !entry.consumer_holds {
            let reason = if entry.claimed {
                "popped handle was already freed"
            } else {
                "entry was not popped; use release_entry"
            };
            return Err(StoreError::invalid_state(
                format!("entry {} of queue '{}'", seq, name),
                reason,
            ));
        }
        self.blocks.check_release(block, 1)?;
        let peers = self.peer_readers(&entry);
        if holder == Holder::Reader && peers == 0 {
            return Err(StoreError::invalid_state(
                format!("entry {} of queue '{}'", seq, name),
                "only the popping consumer holds this entry; use free_handle",
            ));
        }
        let from_consumer = match holder {
            Holder::Consumer => true,
            Holder::Reader => false,
            Holder::Either => entry.consumer_holds && peers == 0,
        };

        let remaining = self.blocks.release(block)?;
        if from_consumer {
            self.directory.release_consumer(name, seq);
        }
        if remaining == 0 && entry.claimed {
            self.finalize_entry(name, seq, block)?;
        }
        Ok(())
    }

    // =========================================================================
    // CONSISTENCY
    // =========================================================================

    /// Cross-checks the directory against the block table, on top of
    /// `BlockStore::verify_integrity`.
    pub fn verify_integrity(&self) -> Result<(), String> {
        self.blocks.verify_integrity()?;

        let mut referenced = 0usize;
        for (name, object) in self.directory.iter() {
            for block in object.blocks() {
                referenced += 1;
                let current = self
                    .blocks
                    .validate_ref(block)
                    .map_err(|e| format!("object '{}' holds dead {}: {}", name, block, e))?;
                if current.owner().is_some() {
                    return Err(format!("object '{}' holds uncommitted {}", name, block));
                }
                match self.directory.locate(block.block_id) {
                    Some(location) if &location.name == name => {}
                    _ => return Err(format!("{} of '{}' missing from index", block, name)),
                }
            }
        }
        let indexed = self.directory.locations().count();
        if indexed != referenced {
            return Err(format!(
                "reverse index has {} slots for {} referenced blocks",
                indexed, referenced
            ));
        }
        Ok(())
    }
}

// =============================================================================
// BLOCK API
// =============================================================================

impl<R: RegionProvider> BlockStoreApi for ObjectStore<R> {
    fn create_block(&mut self, size: usize, owner: ClientId) -> Result<Handle, StoreError> {
        self.blocks.create_block(size, owner)
    }

    fn commit(&mut self, block: BlockRef, caller: ClientId) -> Result<Handle, StoreError> {
        self.blocks.commit(block, caller)
    }

    fn request_data(
        &mut self,
        block_id: BlockId,
        expected: Option<Generation>,
    ) -> Result<Handle, StoreError> {
        self.blocks.request_data(block_id, expected)
    }

    /// Releases a raw handle. Handles on queue entries go through the queue
    /// so that a consumed entry is still finalized.
    fn release(&mut self, block: BlockRef) -> Result<u32, StoreError> {
        if let Some(BlockLocation {
            name,
            slot: Slot::Entry(_),
        }) = self.directory.locate(block.block_id).cloned()
        {
            self.release_queue_handle(&name, block, Holder::Either)?;
            return Ok(self
                .blocks
                .block(block.block_id)
                .map(|b| b.reader_count())
                .unwrap_or(0));
        }
        self.blocks.release(block)
    }

    /// Deletes a block no object references.
    ///
    /// Blocks backing an object are refused even with `force`: reclaim them
    /// with `remove_object(name, force)` or `delete_entry`, which also drop
    /// the directory slot.
    fn delete(&mut self, block_id: BlockId, force: bool) -> Result<(), StoreError> {
        if let Some(location) = self.directory.locate(block_id) {
            return Err(StoreError::invalid_state(
                block_id.to_string(),
                format!(
                    "block backs object '{}'; use remove_object(force) or delete_entry",
                    location.name
                ),
            ));
        }
        self.blocks.delete(block_id, force)
    }

    fn reap_owner(&mut self, owner: ClientId) -> Vec<BlockId> {
        self.blocks.reap_owner(owner)
    }

    fn stats(&self) -> StoreStats {
        self.store_stats()
    }
}

// =============================================================================
// OBJECT API
// =============================================================================

impl<R: RegionProvider> ObjectStoreApi for ObjectStore<R> {
    fn put(&mut self, name: &str, block: BlockRef, caller: ClientId) -> Result<(), StoreError> {
        check_name(name)?;
        self.directory.check_put(name, 1)?;
        self.blocks.commit(block, caller)?;
        self.directory.put(name, vec![block]);
        debug!(object = name, block = %block, "object published");
        Ok(())
    }

    fn get(&mut self, name: &str) -> Result<Handle, StoreError> {
        let head = self.directory.head(name)?;
        self.blocks.request_data(head.block_id, Some(head.generation))
    }

    fn put_tracks(
        &mut self,
        name: &str,
        tracks: &[BlockRef],
        caller: ClientId,
    ) -> Result<(), StoreError> {
        check_name(name)?;
        if tracks.is_empty() {
            return Err(StoreError::invalid_state(
                format!("object '{}'", name),
                "an object needs at least one track",
            ));
        }
        self.directory.check_put(name, tracks.len())?;
        let mut seen = HashSet::with_capacity(tracks.len());
        for &block in tracks {
            if !seen.insert(block.block_id) {
                return Err(StoreError::invalid_state(
                    block.block_id.to_string(),
                    "block listed as more than one track",
                ));
            }
            self.blocks.check_commit(block, caller)?;
        }

        for &block in tracks {
            self.blocks.commit(block, caller)?;
        }
        self.directory.put(name, tracks.to_vec());
        debug!(object = name, tracks = tracks.len(), "object published");
        Ok(())
    }

    fn get_tracks(&mut self, name: &str, indices: &[usize]) -> Result<Vec<Handle>, StoreError> {
        let tracks = self.directory.tracks(name)?;
        let plan: Vec<BlockRef> = if indices.is_empty() {
            tracks.to_vec()
        } else {
            indices
                .iter()
                .map(|&index| {
                    tracks.get(index).copied().ok_or_else(|| {
                        StoreError::not_found(format!(
                            "track {} of object '{}' ({} tracks)",
                            index,
                            name,
                            tracks.len()
                        ))
                    })
                })
                .collect::<Result<_, _>>()?
        };
        for block in &plan {
            self.blocks
                .check_readable(block.block_id, Some(block.generation))?;
        }

        let mut handles = Vec::with_capacity(plan.len());
        for block in plan {
            handles.push(
                self.blocks
                    .request_data(block.block_id, Some(block.generation))?,
            );
        }
        Ok(handles)
    }

    fn remove_object(&mut self, name: &str, force: bool) -> Result<(), StoreError> {
        let blocks = self.directory.lookup(name)?.blocks();
        for block in &blocks {
            self.blocks.validate_ref(*block)?;
            self.blocks.check_delete(block.block_id, force)?;
        }

        for block in &blocks {
            self.blocks.delete(block.block_id, force)?;
        }
        self.directory.remove_object(name);
        debug!(object = name, blocks = blocks.len(), force, "object removed");
        Ok(())
    }

    fn create_queue(&mut self, name: &str, max_capacity: Option<usize>) -> Result<(), StoreError> {
        check_name(name)?;
        self.directory.create_queue(name, max_capacity)?;
        debug!(object = name, ?max_capacity, "queue created");
        Ok(())
    }

    fn push_to_object(
        &mut self,
        name: &str,
        block: BlockRef,
        caller: ClientId,
    ) -> Result<EntrySeq, StoreError> {
        check_name(name)?;
        self.directory.check_push(name)?;
        self.blocks.commit(block, caller)?;
        let seq = self.directory.push(name, block);
        debug!(object = name, seq, block = %block, "entry pushed");
        Ok(seq)
    }

    fn pop_from_object(&mut self, name: &str) -> Result<(EntrySeq, Handle), StoreError> {
        let (seq, block) = self
            .directory
            .queue(name)?
            .next_unclaimed()
            .ok_or_else(|| StoreError::not_found(format!("unclaimed entry in queue '{}'", name)))?;
        let handle = self
            .blocks
            .request_data(block.block_id, Some(block.generation))?;
        self.directory.claim(name, seq);
        debug!(object = name, seq, block = %block, "entry popped");
        Ok((seq, handle))
    }

    fn free_handle(&mut self, name: &str, block: BlockRef) -> Result<(), StoreError> {
        self.release_queue_handle(name, block, Holder::Consumer)
    }

    fn read_from_object(&mut self, name: &str, seq: EntrySeq) -> Result<Handle, StoreError> {
        let entry = self.entry_at(name, seq)?;
        self.blocks
            .request_data(entry.block.block_id, Some(entry.block.generation))
    }

    fn read_latest_from_object(&mut self, name: &str) -> Result<(EntrySeq, Handle), StoreError> {
        let (seq, block) = self
            .directory
            .queue(name)?
            .latest()
            .map(|(seq, entry)| (seq, entry.block))
            .ok_or_else(|| StoreError::not_found(format!("entries in queue '{}'", name)))?;
        let handle = self
            .blocks
            .request_data(block.block_id, Some(block.generation))?;
        Ok((seq, handle))
    }

    fn batch_read_from_object(
        &mut self,
        name: &str,
        seqs: &[EntrySeq],
    ) -> Result<Vec<(EntrySeq, Handle)>, StoreError> {
        let mut plan = Vec::with_capacity(seqs.len());
        for &seq in seqs {
            let entry = self.entry_at(name, seq)?;
            self.blocks
                .check_readable(entry.block.block_id, Some(entry.block.generation))?;
            plan.push((seq, entry.block));
        }

        let mut handles = Vec::with_capacity(plan.len());
        for (seq, block) in plan {
            let handle = self
                .blocks
                .request_data(block.block_id, Some(block.generation))?;
            handles.push((seq, handle));
        }
        Ok(handles)
    }

    fn release_entry(&mut self, name: &str, block: BlockRef) -> Result<(), StoreError> {
        self.release_queue_handle(name, block, Holder::Reader)
    }

    fn batch_release_entry(&mut self, name: &str, blocks: &[BlockRef]) -> Result<(), StoreError> {
        let mut per_block: HashMap<BlockRef, (QueueEntry, u32)> = HashMap::new();
        for &block in blocks {
            let (_, entry) = self.entry_of(name, block)?;
            per_block.entry(block).or_insert((entry, 0)).1 += 1;
        }
        for (&block, (entry, count)) in &per_block {
            self.blocks.check_release(block, *count)?;
            if self.peer_readers(entry) < *count {
                return Err(StoreError::invalid_state(
                    block.to_string(),
                    "release would take the popping consumer's handle; use free_handle",
                ));
            }
        }

        for &block in blocks {
            self.release_queue_handle(name, block, Holder::Reader)?;
        }
        Ok(())
    }

    fn delete_entry(&mut self, name: &str, seq: EntrySeq, force: bool) -> Result<(), StoreError> {
        let entry = self.entry_at(name, seq)?;
        self.blocks.check_delete(entry.block.block_id, force)?;

        self.blocks.delete(entry.block.block_id, force)?;
        self.directory.remove_entry(name, seq);
        debug!(object = name, seq, force, "queue entry deleted");
        Ok(())
    }

    fn list_entries(&self, name: &str) -> Result<Vec<EntrySeq>, StoreError> {
        Ok(self.directory.queue(name)?.seqs())
    }

    fn object_info(&self, name: &str) -> Result<ObjectInfo, StoreError> {
        self.directory.info(name)
    }

    fn lock_region(&mut self, name: &str) -> Result<RegionDescriptor, StoreError> {
        check_name(name)?;
        if let Some(region) = self.lock_regions.get(name) {
            return Ok(region.clone());
        }
        let region = self.blocks.regions().create_region(LOCK_REGION_BYTES)?;
        debug!(object = name, region = %region.name, "lock region created");
        self.lock_regions.insert(name.to_string(), region.clone());
        Ok(region)
    }

    fn store_stats(&self) -> StoreStats {
        StoreStats {
            objects: self.directory.len(),
            queued_entries: self.directory.queued_entries(),
            ..self.blocks.stats()
        }
    }
}
