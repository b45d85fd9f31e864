//! # Store Client
//!
//! The process-side half of the store. Metadata requests go to the control
//! plane; payload bytes move straight into and out of mapped regions
//! through the client's own `RegionProvider`.
//!
//! ## Composite Operations
//!
//! | Call | Requests sent |
//! |------|---------------|
//! | `put` | `CreateBlock` → write → `Put` |
//! | `put_tracks` | `CreateBlock` per track → write → `PutTracks` |
//! | `get`, `get_with` | `Get` → read → `Release` |
//! | `get_tracks` | `GetTracks` → read → `Release` per track |
//! | `push` | `CreateBlock` → write → `Push` |
//! | `pop`, `pop_with` | `Pop` → read → `FreeHandle` |
//! | `update` | `Get` → read → `Release` → `CreateBlock` → write → `Put` |
//!
//! If the final request of a write is rejected, the written blocks are
//! committed and deleted again so they do not linger in Write state.
//! The `_with` variants lend the closure a `MappedBlock` borrowing the
//! mapped bytes in place; the others copy.
//!
//! ## Advisory Locking
//!
//! A client built `with_locking` takes the object's fair lock around each
//! composite operation: the write lock from the first write until the
//! publishing request is answered, the read lock from the read request
//! until the handle is released. The lock lives in a region the server
//! hands out per name, so it excludes every locking client on the host.
//! `update` holds the write lock across its read and its write, which
//! makes read-modify-write cycles atomic among locking clients.

use crate::mapped::MappedBlock;
use crate::payload::{Payload, PayloadError, PayloadView};
use crate::server::ControlChannel;
use os_01_block_registry::{RegionError, RegionProvider, RegionView};
use os_03_fair_lock::{FairReadGuard, FairRwLock, FairWriteGuard, LockTable};
use shared_types::{
    AccessMode, BlockId, BlockRef, ClientId, ControlRequest, ControlResponse, DataTarget,
    EntrySeq, Handle, ObjectInfo, RegionDescriptor, RequestEnvelope, StoreError, StoreStats,
};
use std::sync::Arc;
use store_telemetry::{log_block_event, log_object_event};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::warn;

/// Errors from client calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The control plane or a region rejected the call.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The block's bytes are not a valid payload.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl From<RegionError> for ClientError {
    fn from(e: RegionError) -> Self {
        ClientError::Store(e.into())
    }
}

fn unexpected(operation: &str, response: ControlResponse) -> StoreError {
    StoreError::invalid_state(
        "control response",
        format!("unexpected reply to {}: {:?}", operation, response),
    )
}

fn lock_task_failed(e: JoinError) -> StoreError {
    StoreError::invalid_state("fair lock", format!("waiting task failed: {}", e))
}

/// A client of one store.
pub struct StoreClient<C: ControlChannel, R: RegionProvider> {
    id: ClientId,
    channel: C,
    regions: R,
    locking: bool,
    locks: LockTable,
}

impl<C: ControlChannel, R: RegionProvider> StoreClient<C, R> {
    /// Creates a client with a fresh identity.
    pub fn new(channel: C, regions: R) -> Self {
        Self {
            id: ClientId::new(),
            channel,
            regions,
            locking: false,
            locks: LockTable::new(),
        }
    }

    /// Takes each object's shared fair lock around composite operations.
    pub fn with_locking(mut self) -> Self {
        self.locking = true;
        self
    }

    /// Identity sent with every request.
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn is_locking(&self) -> bool {
        self.locking
    }

    /// Locks mapped by this client so far.
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    // =========================================================================
    // CONTROL PLANE
    // =========================================================================

    /// Sends one request and unwraps its result.
    pub async fn request(&self, request: ControlRequest) -> Result<ControlResponse, StoreError> {
        let envelope = RequestEnvelope::new(self.id, request);
        let correlation_id = envelope.correlation_id;
        let response = self.channel.call(envelope).await?;
        if response.correlation_id != correlation_id {
            return Err(StoreError::invalid_state(
                "control response",
                format!(
                    "correlation id {} does not answer {}",
                    response.correlation_id, correlation_id
                ),
            ));
        }
        response.result
    }

    async fn request_done(&self, request: ControlRequest) -> Result<(), StoreError> {
        let operation = request.operation();
        match self.request(request).await? {
            ControlResponse::Done => Ok(()),
            other => Err(unexpected(operation, other)),
        }
    }

    async fn request_handle(&self, request: ControlRequest) -> Result<Handle, StoreError> {
        let operation = request.operation();
        match self.request(request).await? {
            ControlResponse::Handle(handle) => Ok(handle),
            other => Err(unexpected(operation, other)),
        }
    }

    async fn request_entry(
        &self,
        request: ControlRequest,
    ) -> Result<(EntrySeq, Handle), StoreError> {
        let operation = request.operation();
        match self.request(request).await? {
            ControlResponse::Entry { seq, handle } => Ok((seq, handle)),
            other => Err(unexpected(operation, other)),
        }
    }

    pub async fn create_block(&self, size: usize) -> Result<Handle, StoreError> {
        self.request_handle(ControlRequest::CreateBlock { size }).await
    }

    pub async fn commit(&self, handle: &Handle) -> Result<(), StoreError> {
        self.request_done(ControlRequest::Commit {
            block: handle.block_ref(),
        })
        .await
    }

    /// Read handle on whatever block `block_id` currently holds.
    pub async fn request_data(&self, block_id: BlockId) -> Result<Handle, StoreError> {
        self.request_handle(ControlRequest::RequestData {
            target: DataTarget::Block {
                block_id,
                generation: None,
            },
        })
        .await
    }

    /// Read handle on `block`, refused with `StaleGeneration` once the block
    /// has been deleted or reused.
    pub async fn request_data_at(&self, block: BlockRef) -> Result<Handle, StoreError> {
        self.request_handle(ControlRequest::RequestData {
            target: DataTarget::Block {
                block_id: block.block_id,
                generation: Some(block.generation),
            },
        })
        .await
    }

    pub async fn release(&self, handle: &Handle) -> Result<(), StoreError> {
        self.request_done(ControlRequest::Release {
            block: handle.block_ref(),
        })
        .await
    }

    pub async fn delete(&self, block_id: BlockId, force: bool) -> Result<(), StoreError> {
        self.request_done(ControlRequest::Delete { block_id, force }).await
    }

    /// Turns every block `owner` is still writing into a Zombie.
    pub async fn reap_owner(&self, owner: ClientId) -> Result<Vec<BlockId>, StoreError> {
        match self.request(ControlRequest::ReapOwner { owner }).await? {
            ControlResponse::Reaped(blocks) => Ok(blocks),
            other => Err(unexpected("reap_owner", other)),
        }
    }

    /// Read handle on the head block of `name`. Release it when done.
    pub async fn get_handle(&self, name: &str) -> Result<Handle, StoreError> {
        self.request_handle(ControlRequest::Get {
            name: name.to_string(),
        })
        .await
    }

    /// Read handles on the listed tracks of `name`, every track when
    /// `tracks` is empty. Release each when done.
    pub async fn get_track_handles(
        &self,
        name: &str,
        tracks: &[usize],
    ) -> Result<Vec<Handle>, StoreError> {
        let request = ControlRequest::GetTracks {
            name: name.to_string(),
            tracks: tracks.to_vec(),
        };
        match self.request(request).await? {
            ControlResponse::Handles(handles) => Ok(handles),
            other => Err(unexpected("get_tracks", other)),
        }
    }

    pub async fn remove_object(&self, name: &str, force: bool) -> Result<(), StoreError> {
        self.request_done(ControlRequest::RemoveObject {
            name: name.to_string(),
            force,
        })
        .await
    }

    pub async fn create_queue(
        &self,
        name: &str,
        max_capacity: Option<usize>,
    ) -> Result<(), StoreError> {
        self.request_done(ControlRequest::CreateQueue {
            name: name.to_string(),
            max_capacity,
        })
        .await
    }

    /// Claims the oldest unclaimed entry. Give it back with `free_handle`.
    pub async fn pop_handle(&self, name: &str) -> Result<(EntrySeq, Handle), StoreError> {
        self.request_entry(ControlRequest::Pop {
            name: name.to_string(),
        })
        .await
    }

    pub async fn free_handle(&self, name: &str, handle: &Handle) -> Result<(), StoreError> {
        self.request_done(ControlRequest::FreeHandle {
            name: name.to_string(),
            block: handle.block_ref(),
        })
        .await
    }

    pub async fn read_entry(&self, name: &str, seq: EntrySeq) -> Result<Handle, StoreError> {
        let (_, handle) = self
            .request_entry(ControlRequest::ReadEntry {
                name: name.to_string(),
                seq,
            })
            .await?;
        Ok(handle)
    }

    pub async fn read_latest(&self, name: &str) -> Result<(EntrySeq, Handle), StoreError> {
        self.request_entry(ControlRequest::ReadLatest {
            name: name.to_string(),
        })
        .await
    }

    /// Handles on every entry in `seqs`, or an error and no handle at all.
    pub async fn batch_read(
        &self,
        name: &str,
        seqs: &[EntrySeq],
    ) -> Result<Vec<(EntrySeq, Handle)>, StoreError> {
        let request = ControlRequest::BatchRead {
            name: name.to_string(),
            seqs: seqs.to_vec(),
        };
        match self.request(request).await? {
            ControlResponse::Entries(entries) => Ok(entries),
            other => Err(unexpected("batch_read_from_object", other)),
        }
    }

    pub async fn release_entry(&self, name: &str, handle: &Handle) -> Result<(), StoreError> {
        self.request_done(ControlRequest::ReleaseEntry {
            name: name.to_string(),
            block: handle.block_ref(),
        })
        .await
    }

    pub async fn batch_release(&self, name: &str, handles: &[Handle]) -> Result<(), StoreError> {
        let blocks: Vec<BlockRef> = handles.iter().map(Handle::block_ref).collect();
        self.request_done(ControlRequest::BatchRelease {
            name: name.to_string(),
            blocks,
        })
        .await
    }

    pub async fn delete_entry(
        &self,
        name: &str,
        seq: EntrySeq,
        force: bool,
    ) -> Result<(), StoreError> {
        self.request_done(ControlRequest::DeleteEntry {
            name: name.to_string(),
            seq,
            force,
        })
        .await
    }

    pub async fn list_entries(&self, name: &str) -> Result<Vec<EntrySeq>, StoreError> {
        let request = ControlRequest::ListEntries {
            name: name.to_string(),
        };
        match self.request(request).await? {
            ControlResponse::EntryList(seqs) => Ok(seqs),
            other => Err(unexpected("list_entries", other)),
        }
    }

    pub async fn object_info(&self, name: &str) -> Result<ObjectInfo, StoreError> {
        let request = ControlRequest::ObjectInfo {
            name: name.to_string(),
        };
        match self.request(request).await? {
            ControlResponse::Info(info) => Ok(info),
            other => Err(unexpected("object_info", other)),
        }
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        match self.request(ControlRequest::Stats).await? {
            ControlResponse::Stats(stats) => Ok(stats),
            other => Err(unexpected("stats", other)),
        }
    }

    pub async fn lock_region(&self, name: &str) -> Result<RegionDescriptor, StoreError> {
        let request = ControlRequest::LockRegion {
            name: name.to_string(),
        };
        match self.request(request).await? {
            ControlResponse::Region(region) => Ok(region),
            other => Err(unexpected("lock_region", other)),
        }
    }

    // =========================================================================
    // FAIR LOCKS
    // =========================================================================

    /// The shared lock of `name`, mapped on first use.
    pub async fn lock_for(&self, name: &str) -> Result<Arc<FairRwLock>, StoreError> {
        if let Some(lock) = self.locks.get(name) {
            return Ok(lock);
        }
        let region = self.lock_region(name).await?;
        let view = self.regions.map(&region, AccessMode::Write)?;
        Ok(self.locks.insert(name, FairRwLock::new(view)?))
    }

    /// Waits for the read lock of `name` on a blocking thread. `None` when
    /// the client does not lock.
    pub async fn read_lock(&self, name: &str) -> Result<Option<FairReadGuard>, StoreError> {
        if !self.locking {
            return Ok(None);
        }
        let lock = self.lock_for(name).await?;
        let guard = tokio::task::spawn_blocking(move || lock.read())
            .await
            .map_err(lock_task_failed)?;
        Ok(Some(guard))
    }

    /// Waits for the write lock of `name` on a blocking thread. `None`
    /// when the client does not lock.
    pub async fn write_lock(&self, name: &str) -> Result<Option<FairWriteGuard>, StoreError> {
        if !self.locking {
            return Ok(None);
        }
        let lock = self.lock_for(name).await?;
        let guard = tokio::task::spawn_blocking(move || lock.write())
            .await
            .map_err(lock_task_failed)?;
        Ok(Some(guard))
    }

    // =========================================================================
    // DATA PLANE
    // =========================================================================

    /// Maps the handle's region with the handle's access mode.
    pub fn map(&self, handle: &Handle) -> Result<RegionView, RegionError> {
        self.regions.map(&handle.region, handle.mode)
    }

    /// Copies `data` to the start of a block being written.
    pub fn write(&self, handle: &Handle, data: &[u8]) -> Result<(), StoreError> {
        if handle.mode != AccessMode::Write {
            return Err(StoreError::invalid_state(
                handle.block_id.to_string(),
                "handle is read-only",
            ));
        }
        if data.len() > handle.size {
            return Err(StoreError::Exhausted {
                requested: data.len(),
                reason: format!("block was created for {} bytes", handle.size),
            });
        }
        let view = self.map(handle)?;
        view.write_at(0, data)?;
        self.regions.unmap(view)?;
        Ok(())
    }

    /// Maps a read handle's block for in-place access, without locking.
    /// Drop the result before releasing the handle.
    pub fn map_read(&self, handle: &Handle) -> Result<MappedBlock, StoreError> {
        Ok(MappedBlock::new(
            handle.block_ref(),
            self.map(handle)?,
            handle.size,
            None,
        )?)
    }

    /// Maps a read handle's block of object `name` and holds the object's
    /// read lock until the result is dropped. Drop it before releasing the
    /// handle.
    pub async fn read_block(&self, name: &str, handle: &Handle) -> Result<MappedBlock, StoreError> {
        let lock = self.read_lock(name).await?;
        Ok(MappedBlock::new(
            handle.block_ref(),
            self.map(handle)?,
            handle.size,
            lock,
        )?)
    }

    /// Copies the block's logical bytes out of its region.
    pub fn read(&self, handle: &Handle) -> Result<Vec<u8>, StoreError> {
        Ok(self.map_read(handle)?.bytes().to_vec())
    }

    fn lend<T>(&self, handle: &Handle, f: impl FnOnce(&MappedBlock) -> T) -> Result<T, StoreError> {
        let block = self.map_read(handle)?;
        Ok(f(&block))
    }

    /// Commits and deletes a block whose publishing request was rejected.
    async fn discard(&self, handle: &Handle) {
        let outcome = match self.commit(handle).await {
            Ok(()) => self.delete(handle.block_id, false).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            warn!(block_id = %handle.block_id, error = %e, "could not discard unpublished block");
        }
    }

    async fn discard_all(&self, handles: &[Handle]) {
        for handle in handles {
            self.discard(handle).await;
        }
    }

    async fn written_block(&self, data: &[u8]) -> Result<Handle, StoreError> {
        let handle = self.create_block(data.len()).await?;
        if let Err(e) = self.write(&handle, data) {
            self.discard(&handle).await;
            return Err(e);
        }
        Ok(handle)
    }

    // =========================================================================
    // COMPOSITE OPERATIONS
    // =========================================================================

    /// Publishes `data` as the new head of `name`.
    pub async fn put(&self, name: &str, data: &[u8]) -> Result<Handle, StoreError> {
        let _lock = self.write_lock(name).await?;
        self.publish(name, data).await
    }

    async fn publish(&self, name: &str, data: &[u8]) -> Result<Handle, StoreError> {
        let handle = self.written_block(data).await?;
        let request = ControlRequest::Put {
            name: name.to_string(),
            block: handle.block_ref(),
        };
        if let Err(e) = self.request_done(request).await {
            self.discard(&handle).await;
            return Err(e);
        }
        log_block_event!(debug, "put", handle.block_ref(), object = name, size = data.len());
        Ok(handle)
    }

    /// Lends the head of `name` to `f` in place, then releases it.
    pub async fn get_with<T>(
        &self,
        name: &str,
        f: impl FnOnce(&MappedBlock) -> T,
    ) -> Result<T, StoreError> {
        let _lock = self.read_lock(name).await?;
        let handle = self.get_handle(name).await?;
        let read = self.lend(&handle, f);
        self.release(&handle).await?;
        read
    }

    /// Reads the head of `name` and releases it again.
    pub async fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.get_with(name, |block| block.bytes().to_vec()).await
    }

    /// Replaces the head of `name` with `f(current)`. Under locking, no
    /// other locking client reads or writes `name` in between.
    pub async fn update(
        &self,
        name: &str,
        f: impl FnOnce(&[u8]) -> Vec<u8>,
    ) -> Result<Handle, StoreError> {
        let _lock = self.write_lock(name).await?;
        let handle = self.get_handle(name).await?;
        let next = self.lend(&handle, |block| f(block.bytes()));
        self.release(&handle).await?;
        self.publish(name, &next?).await
    }

    /// Publishes one block per element of `tracks` as the value of `name`.
    pub async fn put_tracks(
        &self,
        name: &str,
        tracks: &[&[u8]],
    ) -> Result<Vec<Handle>, StoreError> {
        let _lock = self.write_lock(name).await?;
        let mut handles = Vec::with_capacity(tracks.len());
        for data in tracks {
            match self.written_block(data).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.discard_all(&handles).await;
                    return Err(e);
                }
            }
        }
        let request = ControlRequest::PutTracks {
            name: name.to_string(),
            blocks: handles.iter().map(Handle::block_ref).collect(),
        };
        if let Err(e) = self.request_done(request).await {
            self.discard_all(&handles).await;
            return Err(e);
        }
        log_object_event!(debug, "tracks published", name, tracks = handles.len());
        Ok(handles)
    }

    /// Copies the listed tracks of `name` (every track when empty), in
    /// request order.
    pub async fn get_tracks(
        &self,
        name: &str,
        tracks: &[usize],
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let _lock = self.read_lock(name).await?;
        let handles = self.get_track_handles(name, tracks).await?;
        let read: Result<Vec<Vec<u8>>, StoreError> =
            handles.iter().map(|handle| self.read(handle)).collect();

        let mut released = Ok(());
        for handle in &handles {
            if let Err(e) = self.release(handle).await {
                released = released.and(Err(e));
            }
        }
        released?;
        read
    }

    /// Appends `data` to the queue `name`.
    pub async fn push(&self, name: &str, data: &[u8]) -> Result<EntrySeq, StoreError> {
        let _lock = self.write_lock(name).await?;
        let handle = self.written_block(data).await?;
        let request = ControlRequest::Push {
            name: name.to_string(),
            block: handle.block_ref(),
        };
        match self.request(request).await {
            Ok(ControlResponse::Pushed { seq }) => {
                log_object_event!(debug, "entry pushed", name, seq, size = data.len());
                Ok(seq)
            }
            Ok(other) => Err(unexpected("push_to_object", other)),
            Err(e) => {
                self.discard(&handle).await;
                Err(e)
            }
        }
    }

    /// Takes the oldest entry of `name`, lends it to `f` in place and
    /// consumes it.
    pub async fn pop_with<T>(
        &self,
        name: &str,
        f: impl FnOnce(&MappedBlock) -> T,
    ) -> Result<(EntrySeq, T), StoreError> {
        let _lock = self.read_lock(name).await?;
        let (seq, handle) = self.pop_handle(name).await?;
        let read = self.lend(&handle, f);
        self.free_handle(name, &handle).await?;
        log_object_event!(debug, "entry popped", name, seq);
        Ok((seq, read?))
    }

    /// Takes the oldest entry of `name`, consuming it once read.
    pub async fn pop(&self, name: &str) -> Result<(EntrySeq, Vec<u8>), StoreError> {
        self.pop_with(name, |block| block.bytes().to_vec()).await
    }

    pub async fn put_payload(&self, name: &str, payload: &Payload) -> Result<Handle, ClientError> {
        Ok(self.put(name, &payload.encode()?).await?)
    }

    /// Lends the head payload of `name` to `f`, array data borrowed from the
    /// mapped block.
    pub async fn get_payload_with<T>(
        &self,
        name: &str,
        f: impl FnOnce(PayloadView<'_>) -> T,
    ) -> Result<T, ClientError> {
        Ok(self.get_with(name, |block| block.payload().map(f)).await??)
    }

    pub async fn get_payload(&self, name: &str) -> Result<Payload, ClientError> {
        self.get_payload_with(name, |view| view.to_payload()).await
    }

    pub async fn push_payload(
        &self,
        name: &str,
        payload: &Payload,
    ) -> Result<EntrySeq, ClientError> {
        Ok(self.push(name, &payload.encode()?).await?)
    }

    pub async fn pop_payload(&self, name: &str) -> Result<(EntrySeq, Payload), ClientError> {
        let (seq, payload) = self
            .pop_with(name, |block| block.payload().map(|view| view.to_payload()))
            .await?;
        Ok((seq, payload?))
    }
}
