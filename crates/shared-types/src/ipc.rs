//! # Control-Plane Messages
//!
//! Every metadata operation a client can ask the server for, and every
//! shape of successful reply.
//!
//! ## Design Rules
//!
//! - Requests carry only metadata: sizes, names, block references.
//! - Requests never carry the caller's identity; ownership checks use the
//!   envelope's `sender`.
//! - All types are serde-serializable so any external transport can carry
//!   them unchanged.

use crate::entities::{
    BlockId, BlockRef, ClientId, EntrySeq, Generation, Handle, ObjectInfo, RegionDescriptor,
    StoreStats,
};
use serde::{Deserialize, Serialize};

/// Target of a `RequestData` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataTarget {
    /// Read a block directly by id.
    ///
    /// With `generation` set, the read fails with `StaleGeneration` unless
    /// the block still holds that generation.
    Block {
        block_id: BlockId,
        generation: Option<Generation>,
    },
    /// Read the head block of a named single object.
    Name(String),
}

/// A metadata request to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    // =========================================================================
    // BLOCK LIFECYCLE
    // =========================================================================
    /// Zombie → Write: obtain a writable block of at least `size` bytes.
    CreateBlock { size: usize },
    /// Write → Idle: publish a block written by the sender.
    Commit { block: BlockRef },
    /// Idle/Busy → Busy: obtain a read handle.
    RequestData { target: DataTarget },
    /// Busy → Idle (at zero readers): give back a read handle.
    Release { block: BlockRef },
    /// Idle/Busy → Zombie: return a block to the pool.
    Delete { block_id: BlockId, force: bool },
    /// Administrative: turn every Write block of a dead client into Zombie.
    ReapOwner { owner: ClientId },

    // =========================================================================
    // NAMED OBJECTS
    // =========================================================================
    /// Commit a written block and map `name` to it.
    Put { name: String, block: BlockRef },
    /// Read handle on the head block of `name`.
    Get { name: String },
    /// Delete every block of `name` and drop the name.
    RemoveObject { name: String, force: bool },
    /// Commit several written blocks and map `name` to them as tracks.
    PutTracks { name: String, blocks: Vec<BlockRef> },
    /// Read handles on the listed tracks of `name`, all tracks when empty.
    GetTracks { name: String, tracks: Vec<usize> },

    // =========================================================================
    // QUEUES
    // =========================================================================
    /// Create an empty queue object.
    CreateQueue {
        name: String,
        max_capacity: Option<usize>,
    },
    /// Commit a written block and append it as the next entry of `name`.
    Push { name: String, block: BlockRef },
    /// Claim the oldest unclaimed entry and obtain a read handle on it.
    Pop { name: String },
    /// Release a popped handle, consuming the entry once unread.
    FreeHandle { name: String, block: BlockRef },
    /// Non-destructive read of entry `seq`.
    ReadEntry { name: String, seq: EntrySeq },
    /// Non-destructive read of the newest entry.
    ReadLatest { name: String },
    /// Non-destructive read of several entries, all or nothing.
    BatchRead { name: String, seqs: Vec<EntrySeq> },
    /// Release a handle obtained from an entry read.
    ReleaseEntry { name: String, block: BlockRef },
    /// Release several entry handles, all or nothing.
    BatchRelease { name: String, blocks: Vec<BlockRef> },
    /// Delete a single entry and its block.
    DeleteEntry {
        name: String,
        seq: EntrySeq,
        force: bool,
    },
    /// Sequence numbers of all live entries, oldest first.
    ListEntries { name: String },
    /// Summary of one object.
    ObjectInfo { name: String },

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================
    /// Store-wide counters.
    Stats,
    /// Descriptor of the shared lock region guarding `name`.
    LockRegion { name: String },
}

impl ControlRequest {
    /// Stable operation name (logging and metrics label).
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateBlock { .. } => "create_block",
            Self::Commit { .. } => "commit",
            Self::RequestData { .. } => "request_data",
            Self::Release { .. } => "release",
            Self::Delete { .. } => "delete",
            Self::ReapOwner { .. } => "reap_owner",
            Self::Put { .. } => "put",
            Self::Get { .. } => "get",
            Self::RemoveObject { .. } => "remove_object",
            Self::PutTracks { .. } => "put_tracks",
            Self::GetTracks { .. } => "get_tracks",
            Self::CreateQueue { .. } => "create_queue",
            Self::Push { .. } => "push_to_object",
            Self::Pop { .. } => "pop_from_object",
            Self::FreeHandle { .. } => "free_handle",
            Self::ReadEntry { .. } => "read_from_object",
            Self::ReadLatest { .. } => "read_latest_from_object",
            Self::BatchRead { .. } => "batch_read_from_object",
            Self::ReleaseEntry { .. } => "release_entry",
            Self::BatchRelease { .. } => "batch_release_entry",
            Self::DeleteEntry { .. } => "delete_entry",
            Self::ListEntries { .. } => "list_entries",
            Self::ObjectInfo { .. } => "object_info",
            Self::Stats => "stats",
            Self::LockRegion { .. } => "lock_region",
        }
    }
}

/// A successful control-plane reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    /// The operation succeeded and has nothing to report.
    Done,
    /// A single handle (create, request_data, get).
    Handle(Handle),
    /// A handle on a queue entry (pop, read, read latest).
    Entry { seq: EntrySeq, handle: Handle },
    /// Handles on several tracks, in request order.
    Handles(Vec<Handle>),
    /// Handles on several queue entries, in request order.
    Entries(Vec<(EntrySeq, Handle)>),
    /// Sequence number assigned by a push.
    Pushed { seq: EntrySeq },
    /// Blocks turned into Zombies by an administrative reap.
    Reaped(Vec<BlockId>),
    /// Live sequence numbers of a queue.
    EntryList(Vec<EntrySeq>),
    /// Object summary.
    Info(ObjectInfo),
    /// Store-wide counters.
    Stats(StoreStats),
    /// Shared region to map for cross-process locking.
    Region(RegionDescriptor),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_are_distinct() {
        let block = BlockRef::new(BlockId(1), Generation(1));
        let requests = vec![
            ControlRequest::CreateBlock { size: 1 },
            ControlRequest::Commit { block },
            ControlRequest::RequestData {
                target: DataTarget::Block {
                    block_id: BlockId(1),
                    generation: None,
                },
            },
            ControlRequest::GetTracks {
                name: "t".to_string(),
                tracks: vec![0],
            },
            ControlRequest::LockRegion {
                name: "t".to_string(),
            },
            ControlRequest::Release { block },
            ControlRequest::Pop {
                name: "q".to_string(),
            },
            ControlRequest::FreeHandle {
                name: "q".to_string(),
                block,
            },
            ControlRequest::Stats,
        ];
        let mut names: Vec<_> = requests.iter().map(|r| r.operation()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), requests.len());
    }

    #[test]
    fn test_request_json_shape() {
        let request = ControlRequest::Delete {
            block_id: BlockId(9),
            force: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["Delete"]["block_id"], 9);
        assert_eq!(json["Delete"]["force"], true);
    }

    #[test]
    fn test_block_target_carries_generation() {
        let request = ControlRequest::RequestData {
            target: DataTarget::Block {
                block_id: BlockId(4),
                generation: Some(Generation(2)),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["RequestData"]["target"]["Block"]["block_id"], 4);
        assert_eq!(json["RequestData"]["target"]["Block"]["generation"], 2);
    }
}
