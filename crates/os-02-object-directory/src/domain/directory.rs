//! # Named Object Directory
//!
//! Maps object names to block references and keeps a reverse index from
//! block id to the slot that references it.
//!
//! The directory is pure bookkeeping: it never talks to the block store.
//! The service checks block states first and only then updates the
//! directory, so every method here either cannot fail or fails before
//! mutating.
//!
//! ## Reverse Index
//!
//! | Slot | Meaning |
//! |------|---------|
//! | `Track(i)` | track `i` of a single object's current value |
//! | `Superseded` | earlier block of a single object, replaced by a later put |
//! | `Entry(seq)` | queue entry `seq` |

use super::queue::{QueueEntry, QueueState};
use shared_types::{BlockId, BlockRef, EntrySeq, ObjectInfo, ObjectKind, StoreError};
use std::collections::HashMap;

/// Contents of one named object.
#[derive(Clone, Debug)]
pub enum ObjectEntry {
    /// A value written with `put` (one track) or `put_tracks`.
    Single {
        tracks: Vec<BlockRef>,
        superseded: Vec<BlockRef>,
    },
    /// A FIFO of entries.
    Queue(QueueState),
}

impl ObjectEntry {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Single { .. } => ObjectKind::Single,
            Self::Queue(_) => ObjectKind::Queue,
        }
    }

    /// Every block referenced by the object.
    pub fn blocks(&self) -> Vec<BlockRef> {
        match self {
            Self::Single { tracks, superseded } => {
                let mut blocks = superseded.clone();
                blocks.extend_from_slice(tracks);
                blocks
            }
            Self::Queue(queue) => queue.iter().map(|(_, entry)| entry.block).collect(),
        }
    }
}

/// Where a block sits inside an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Track(usize),
    Superseded,
    Entry(EntrySeq),
}

/// Reverse index value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLocation {
    pub name: String,
    pub slot: Slot,
}

/// Name → object map.
#[derive(Debug, Default)]
pub struct ObjectDirectory {
    objects: HashMap<String, ObjectEntry>,
    locations: HashMap<BlockId, BlockLocation>,
}

fn object_not_found(name: &str) -> StoreError {
    StoreError::not_found(format!("object '{}'", name))
}

fn track_mismatch(name: &str, actual: usize, requested: usize) -> StoreError {
    StoreError::invalid_state(
        format!("object '{}'", name),
        format!("object has {} tracks, request uses {}", actual, requested),
    )
}

impl ObjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of named objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ObjectEntry> {
        self.objects.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&ObjectEntry, StoreError> {
        self.objects.get(name).ok_or_else(|| object_not_found(name))
    }

    /// Slot referencing `block_id`, if any object does.
    pub fn locate(&self, block_id: BlockId) -> Option<&BlockLocation> {
        self.locations.get(&block_id)
    }

    /// Live queue entries across all queues.
    pub fn queued_entries(&self) -> usize {
        self.objects
            .values()
            .map(|object| match object {
                ObjectEntry::Queue(queue) => queue.len(),
                ObjectEntry::Single { .. } => 0,
            })
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ObjectEntry)> {
        self.objects.iter()
    }

    pub fn locations(&self) -> impl Iterator<Item = (&BlockId, &BlockLocation)> {
        self.locations.iter()
    }

    // =========================================================================
    // SINGLE OBJECTS
    // =========================================================================

    /// Rejects names that hold a queue, or a single object with a different
    /// number of tracks.
    pub fn check_put(&self, name: &str, track_count: usize) -> Result<(), StoreError> {
        match self.objects.get(name) {
            Some(ObjectEntry::Queue(_)) => Err(StoreError::invalid_state(
                format!("object '{}'", name),
                "name holds a queue; use push_to_object",
            )),
            Some(ObjectEntry::Single { tracks, .. }) if tracks.len() != track_count => {
                Err(track_mismatch(name, tracks.len(), track_count))
            }
            _ => Ok(()),
        }
    }

    /// Current tracks of a single object.
    pub fn tracks(&self, name: &str) -> Result<&[BlockRef], StoreError> {
        match self.lookup(name)? {
            ObjectEntry::Single { tracks, .. } => Ok(tracks),
            ObjectEntry::Queue(_) => Err(StoreError::invalid_state(
                format!("object '{}'", name),
                "name holds a queue; use pop or read_from_object",
            )),
        }
    }

    /// Head block of a one-track single object.
    pub fn head(&self, name: &str) -> Result<BlockRef, StoreError> {
        match self.tracks(name)? {
            [head] => Ok(*head),
            tracks => Err(track_mismatch(name, tracks.len(), 1)),
        }
    }

    /// Maps `name` to `tracks`, remembering any previous tracks as
    /// superseded. `check_put` must have passed.
    pub(crate) fn put(&mut self, name: &str, tracks: Vec<BlockRef>) {
        match self.objects.get_mut(name) {
            Some(ObjectEntry::Single {
                tracks: current,
                superseded,
            }) => {
                let previous = std::mem::replace(current, tracks.clone());
                for block in previous {
                    superseded.push(block);
                    self.locations.insert(
                        block.block_id,
                        BlockLocation {
                            name: name.to_string(),
                            slot: Slot::Superseded,
                        },
                    );
                }
            }
            Some(ObjectEntry::Queue(_)) => return,
            None => {
                self.objects.insert(
                    name.to_string(),
                    ObjectEntry::Single {
                        tracks: tracks.clone(),
                        superseded: Vec::new(),
                    },
                );
            }
        }
        for (index, block) in tracks.into_iter().enumerate() {
            self.locations.insert(
                block.block_id,
                BlockLocation {
                    name: name.to_string(),
                    slot: Slot::Track(index),
                },
            );
        }
    }

    // =========================================================================
    // QUEUES
    // =========================================================================

    pub fn queue(&self, name: &str) -> Result<&QueueState, StoreError> {
        match self.lookup(name)? {
            ObjectEntry::Queue(queue) => Ok(queue),
            ObjectEntry::Single { .. } => Err(StoreError::invalid_state(
                format!("object '{}'", name),
                "name holds a single object, not a queue",
            )),
        }
    }

    fn queue_mut(&mut self, name: &str) -> Option<&mut QueueState> {
        match self.objects.get_mut(name) {
            Some(ObjectEntry::Queue(queue)) => Some(queue),
            _ => None,
        }
    }

    /// Creates an empty queue.
    pub fn create_queue(
        &mut self,
        name: &str,
        max_capacity: Option<usize>,
    ) -> Result<(), StoreError> {
        if self.objects.contains_key(name) {
            return Err(StoreError::AlreadyExists {
                name: name.to_string(),
            });
        }
        if max_capacity == Some(0) {
            return Err(StoreError::invalid_state(
                format!("object '{}'", name),
                "queue capacity must be at least 1",
            ));
        }
        self.objects
            .insert(name.to_string(), ObjectEntry::Queue(QueueState::new(max_capacity)));
        Ok(())
    }

    /// Checks that a push onto `name` would be accepted. A missing name is
    /// fine: the push creates an unbounded queue.
    pub fn check_push(&self, name: &str) -> Result<(), StoreError> {
        match self.objects.get(name) {
            None => Ok(()),
            Some(ObjectEntry::Queue(queue)) => queue.check_capacity(name),
            Some(ObjectEntry::Single { .. }) => Err(StoreError::invalid_state(
                format!("object '{}'", name),
                "name holds a single object; use put",
            )),
        }
    }

    /// Appends `block` to the queue `name`. `check_push` must have passed.
    pub(crate) fn push(&mut self, name: &str, block: BlockRef) -> EntrySeq {
        let queue = match self
            .objects
            .entry(name.to_string())
            .or_insert_with(|| ObjectEntry::Queue(QueueState::new(None)))
        {
            ObjectEntry::Queue(queue) => queue,
            ObjectEntry::Single { .. } => return 0,
        };
        let seq = queue.append(block);
        self.locations.insert(
            block.block_id,
            BlockLocation {
                name: name.to_string(),
                slot: Slot::Entry(seq),
            },
        );
        seq
    }

    pub(crate) fn claim(&mut self, name: &str, seq: EntrySeq) {
        if let Some(queue) = self.queue_mut(name) {
            queue.claim(seq);
        }
    }

    pub(crate) fn release_consumer(&mut self, name: &str, seq: EntrySeq) {
        if let Some(queue) = self.queue_mut(name) {
            queue.release_consumer(seq);
        }
    }

    /// Removes one entry and its reverse-index slot.
    pub(crate) fn remove_entry(&mut self, name: &str, seq: EntrySeq) -> Option<QueueEntry> {
        let entry = self.queue_mut(name)?.remove(seq)?;
        self.locations.remove(&entry.block.block_id);
        Some(entry)
    }

    // =========================================================================
    // REMOVAL & REPORTING
    // =========================================================================

    /// Drops `name` and every reverse-index slot it owned.
    pub(crate) fn remove_object(&mut self, name: &str) -> Option<ObjectEntry> {
        let object = self.objects.remove(name)?;
        for block in object.blocks() {
            self.locations.remove(&block.block_id);
        }
        Some(object)
    }

    pub(crate) fn clear(&mut self) {
        self.objects.clear();
        self.locations.clear();
    }

    /// Summary of one object.
    pub fn info(&self, name: &str) -> Result<ObjectInfo, StoreError> {
        let info = match self.lookup(name)? {
            ObjectEntry::Single { tracks, superseded } => ObjectInfo {
                name: name.to_string(),
                kind: ObjectKind::Single,
                entry_count: 1,
                track_count: tracks.len(),
                head: None,
                tail: 0,
                max_capacity: None,
                superseded: superseded.len(),
            },
            ObjectEntry::Queue(queue) => ObjectInfo {
                name: name.to_string(),
                kind: ObjectKind::Queue,
                entry_count: queue.len(),
                track_count: 1,
                head: queue.head(),
                tail: queue.tail(),
                max_capacity: queue.max_capacity(),
                superseded: 0,
            },
        };
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Generation;

    fn block(id: u64) -> BlockRef {
        BlockRef::new(BlockId(id), Generation::INITIAL)
    }

    #[test]
    fn test_reput_supersedes_previous_head() {
        let mut directory = ObjectDirectory::new();
        directory.put("x", vec![block(1)]);
        directory.put("x", vec![block(2)]);

        assert_eq!(directory.head("x").unwrap(), block(2));
        assert_eq!(directory.locate(BlockId(1)).unwrap().slot, Slot::Superseded);
        assert_eq!(directory.locate(BlockId(2)).unwrap().slot, Slot::Track(0));
        assert_eq!(directory.info("x").unwrap().superseded, 1);
    }

    #[test]
    fn test_put_on_queue_name_is_rejected() {
        let mut directory = ObjectDirectory::new();
        directory.create_queue("q", None).unwrap();

        let err = directory.check_put("q", 1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));
        assert!(matches!(
            directory.head("q"),
            Err(StoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_create_queue_twice_is_already_exists() {
        let mut directory = ObjectDirectory::new();
        directory.create_queue("q", Some(4)).unwrap();

        let err = directory.create_queue("q", None).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert!(directory.create_queue("z", Some(0)).is_err());
    }

    #[test]
    fn test_push_creates_missing_queue() {
        let mut directory = ObjectDirectory::new();
        directory.check_push("q").unwrap();
        let seq = directory.push("q", block(5));

        let queue = directory.queue("q").unwrap();
        assert_eq!(queue.get(seq).unwrap().block, block(5));
        assert_eq!(queue.max_capacity(), None);
        assert_eq!(directory.locate(BlockId(5)).unwrap().slot, Slot::Entry(seq));
    }

    #[test]
    fn test_remove_object_drops_all_locations() {
        let mut directory = ObjectDirectory::new();
        directory.push("q", block(1));
        directory.push("q", block(2));
        directory.put("x", vec![block(3)]);

        let removed = directory.remove_object("q").unwrap();

        assert_eq!(removed.blocks().len(), 2);
        assert!(directory.locate(BlockId(1)).is_none());
        assert!(directory.locate(BlockId(2)).is_none());
        assert!(directory.locate(BlockId(3)).is_some());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_tracks_keep_their_count() {
        let mut directory = ObjectDirectory::new();
        directory.put("t", vec![block(1), block(2), block(3)]);

        assert_eq!(directory.tracks("t").unwrap().len(), 3);
        assert_eq!(directory.locate(BlockId(3)).unwrap().slot, Slot::Track(2));
        assert_eq!(directory.info("t").unwrap().track_count, 3);
        assert!(matches!(
            directory.head("t"),
            Err(StoreError::InvalidState { .. })
        ));
        assert!(directory.check_put("t", 2).is_err());
        directory.check_put("t", 3).unwrap();

        directory.put("t", vec![block(4), block(5), block(6)]);
        assert_eq!(directory.info("t").unwrap().superseded, 3);
        assert_eq!(directory.locate(BlockId(1)).unwrap().slot, Slot::Superseded);
        assert_eq!(directory.locate(BlockId(4)).unwrap().slot, Slot::Track(0));
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let directory = ObjectDirectory::new();
        assert!(matches!(
            directory.info("ghost"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            directory.queue("ghost"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
