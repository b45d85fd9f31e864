//! Control-plane request dispatch.
//!
//! One envelope in, one envelope out. The handler owns the object store,
//! so whoever drives it (the server task) is the single serialization
//! point for every metadata operation.

use crate::ports::inbound::ObjectStoreApi;
use crate::service::ObjectStore;
use os_01_block_registry::{BlockStoreApi, RegionProvider};
use shared_types::{
    ClientId, ControlRequest, ControlResponse, DataTarget, RequestEnvelope, ResponseEnvelope,
    StoreError,
};
use tracing::{debug, warn};

/// Applies control-plane requests to an `ObjectStore`.
pub struct ControlPlaneHandler<R: RegionProvider> {
    store: ObjectStore<R>,
}

impl<R: RegionProvider> ControlPlaneHandler<R> {
    pub fn new(store: ObjectStore<R>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ObjectStore<R> {
        &self.store
    }

    /// Destroys every region. Called once when the server stops.
    pub fn shutdown(&mut self) -> usize {
        self.store.shutdown()
    }

    /// Handles one envelope to completion.
    pub fn handle(&mut self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let operation = envelope.request.operation();
        let result = if envelope.version != RequestEnvelope::CURRENT_VERSION {
            Err(StoreError::invalid_state(
                "request envelope",
                format!(
                    "unsupported version {} (expected {})",
                    envelope.version,
                    RequestEnvelope::CURRENT_VERSION
                ),
            ))
        } else {
            self.dispatch(envelope.sender, envelope.request)
        };

        if let Err(e) = &result {
            match e {
                StoreError::DoubleRelease { .. }
                | StoreError::Busy { .. }
                | StoreError::InvalidOwner { .. }
                | StoreError::StaleGeneration { .. } => warn!(
                    operation,
                    sender = %envelope.sender,
                    kind = e.kind(),
                    error = %e,
                    "request rejected"
                ),
                _ => debug!(
                    operation,
                    sender = %envelope.sender,
                    kind = e.kind(),
                    error = %e,
                    "request rejected"
                ),
            }
        }

        ResponseEnvelope {
            correlation_id: envelope.correlation_id,
            result,
        }
    }

    fn dispatch(
        &mut self,
        sender: ClientId,
        request: ControlRequest,
    ) -> Result<ControlResponse, StoreError> {
        let store = &mut self.store;
        let response = match request {
            ControlRequest::CreateBlock { size } => {
                ControlResponse::Handle(store.create_block(size, sender)?)
            }
            ControlRequest::Commit { block } => {
                store.commit(block, sender)?;
                ControlResponse::Done
            }
            ControlRequest::RequestData { target } => match target {
                DataTarget::Block {
                    block_id,
                    generation,
                } => ControlResponse::Handle(store.request_data(block_id, generation)?),
                DataTarget::Name(name) => ControlResponse::Handle(store.get(&name)?),
            },
            ControlRequest::Release { block } => {
                store.release(block)?;
                ControlResponse::Done
            }
            ControlRequest::Delete { block_id, force } => {
                store.delete(block_id, force)?;
                ControlResponse::Done
            }
            ControlRequest::ReapOwner { owner } => {
                ControlResponse::Reaped(store.reap_owner(owner))
            }
            ControlRequest::Put { name, block } => {
                store.put(&name, block, sender)?;
                ControlResponse::Done
            }
            ControlRequest::Get { name } => ControlResponse::Handle(store.get(&name)?),
            ControlRequest::RemoveObject { name, force } => {
                store.remove_object(&name, force)?;
                ControlResponse::Done
            }
            ControlRequest::PutTracks { name, blocks } => {
                store.put_tracks(&name, &blocks, sender)?;
                ControlResponse::Done
            }
            ControlRequest::GetTracks { name, tracks } => {
                ControlResponse::Handles(store.get_tracks(&name, &tracks)?)
            }
            ControlRequest::CreateQueue { name, max_capacity } => {
                store.create_queue(&name, max_capacity)?;
                ControlResponse::Done
            }
            ControlRequest::Push { name, block } => ControlResponse::Pushed {
                seq: store.push_to_object(&name, block, sender)?,
            },
            ControlRequest::Pop { name } => {
                let (seq, handle) = store.pop_from_object(&name)?;
                ControlResponse::Entry { seq, handle }
            }
            ControlRequest::FreeHandle { name, block } => {
                store.free_handle(&name, block)?;
                ControlResponse::Done
            }
            ControlRequest::ReadEntry { name, seq } => ControlResponse::Entry {
                seq,
                handle: store.read_from_object(&name, seq)?,
            },
            ControlRequest::ReadLatest { name } => {
                let (seq, handle) = store.read_latest_from_object(&name)?;
                ControlResponse::Entry { seq, handle }
            }
            ControlRequest::BatchRead { name, seqs } => {
                ControlResponse::Entries(store.batch_read_from_object(&name, &seqs)?)
            }
            ControlRequest::ReleaseEntry { name, block } => {
                store.release_entry(&name, block)?;
                ControlResponse::Done
            }
            ControlRequest::BatchRelease { name, blocks } => {
                store.batch_release_entry(&name, &blocks)?;
                ControlResponse::Done
            }
            ControlRequest::DeleteEntry { name, seq, force } => {
                store.delete_entry(&name, seq, force)?;
                ControlResponse::Done
            }
            ControlRequest::ListEntries { name } => {
                ControlResponse::EntryList(store.list_entries(&name)?)
            }
            ControlRequest::ObjectInfo { name } => ControlResponse::Info(store.object_info(&name)?),
            ControlRequest::Stats => ControlResponse::Stats(store.store_stats()),
            ControlRequest::LockRegion { name } => {
                ControlResponse::Region(store.lock_region(&name)?)
            }
        };
        Ok(response)
    }
}
