//! # Fair Read-Write Lock (os-03)
//!
//! An advisory lock clients take around their data-path access to an
//! object. Its state lives in a small shared region, so every process that
//! maps the region contends on the same lock. The block state machine
//! never consults it.
//!
//! ## Fairness
//!
//! The lock is a reader-writer ticket lock over three counters:
//!
//! | Word | Meaning |
//! |------|---------|
//! | `next` | next ticket to hand out |
//! | `read_gate` | tickets that passed the read gate |
//! | `write_gate` | tickets that finished |
//!
//! A reader with ticket `t` enters once `read_gate == t` and immediately
//! opens the gate for the ticket behind it, so consecutive readers enter
//! together. A writer with ticket `t` enters once `write_gate == t`, i.e.
//! every earlier holder has left. Tickets are served in arrival order: a
//! reader arriving after a waiting writer queues behind it, and a writer
//! never jumps readers that arrived first.
//!
//! A process that dies while holding or waiting on a ticket wedges the
//! lock; the owning object should then be removed and recreated.
//!
//! ## Usage
//!
//! ```ignore
//! let region = provider.create_region(LOCK_REGION_BYTES)?;
//! let lock = Arc::new(FairRwLock::new(provider.map(&region, AccessMode::Write)?)?);
//! {
//!     let _guard = lock.write();
//!     // write through the mapped block
//! }
//! ```

use os_01_block_registry::{RegionError, RegionView};
use parking_lot::Mutex;
use shared_types::RegionDescriptor;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Size of the shared region backing one lock.
pub const LOCK_REGION_BYTES: usize = 64;

const NEXT: usize = 0;
const READ_GATE: usize = 1;
const WRITE_GATE: usize = 2;
const WORDS: usize = 3;

/// Busy-wait, then yield, then sleep.
struct Backoff {
    step: u32,
}

impl Backoff {
    fn new() -> Self {
        Self { step: 0 }
    }

    fn wait(&mut self) {
        match self.step {
            0..=63 => std::hint::spin_loop(),
            64..=127 => std::thread::yield_now(),
            _ => std::thread::sleep(Duration::from_micros(50)),
        }
        self.step = self.step.saturating_add(1);
    }
}

/// Point-in-time view of a lock, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Tickets handed out since the region was created.
    pub issued: u64,
    /// Tickets that passed the read gate.
    pub admitted: u64,
    /// Tickets whose holder has left.
    pub released: u64,
}

impl LockSnapshot {
    /// Holders plus waiters.
    pub fn outstanding(&self) -> u64 {
        self.issued.wrapping_sub(self.released)
    }

    /// Readers inside the lock. A writer inside shows as zero readers and
    /// one outstanding ticket.
    pub fn readers(&self) -> u64 {
        self.admitted.wrapping_sub(self.released)
    }
}

/// A reader-writer lock that grants access in ticket order, shared by
/// every mapping of its region.
pub struct FairRwLock {
    words: NonNull<AtomicU64>,
    view: RegionView,
}

// SAFETY: `words` points into memory kept alive by `view`, and is only
// accessed through atomics.
unsafe impl Send for FairRwLock {}
// SAFETY: as above.
unsafe impl Sync for FairRwLock {}

impl std::fmt::Debug for FairRwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FairRwLock")
            .field("region", &self.view.descriptor().name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl FairRwLock {
    /// Builds the lock over a writable view of a zeroed lock region.
    pub fn new(view: RegionView) -> Result<Self, RegionError> {
        let words = NonNull::from(view.atomic_words(0, WORDS)?).cast::<AtomicU64>();
        Ok(Self { words, view })
    }

    /// Region holding the lock state.
    pub fn region(&self) -> &RegionDescriptor {
        self.view.descriptor()
    }

    fn word(&self, index: usize) -> &AtomicU64 {
        debug_assert!(index < WORDS);
        // SAFETY: `new` checked that WORDS aligned words are mapped, and the
        // view keeps them mapped for the lifetime of `self`.
        unsafe { &*self.words.as_ptr().add(index) }
    }

    /// Blocks until shared access is granted.
    pub fn read(self: &Arc<Self>) -> FairReadGuard {
        let ticket = self.word(NEXT).fetch_add(1, Ordering::AcqRel);
        let mut backoff = Backoff::new();
        while self.word(READ_GATE).load(Ordering::Acquire) != ticket {
            backoff.wait();
        }
        self.word(READ_GATE).fetch_add(1, Ordering::AcqRel);
        FairReadGuard { lock: self.clone() }
    }

    /// Blocks until exclusive access is granted.
    pub fn write(self: &Arc<Self>) -> FairWriteGuard {
        let ticket = self.word(NEXT).fetch_add(1, Ordering::AcqRel);
        let mut backoff = Backoff::new();
        while self.word(WRITE_GATE).load(Ordering::Acquire) != ticket {
            backoff.wait();
        }
        FairWriteGuard { lock: self.clone() }
    }

    /// Shared access if it can be granted without waiting.
    ///
    /// Takes a ticket only when it would be served at once, so a failed
    /// attempt leaves no trace in the queue.
    pub fn try_read(self: &Arc<Self>) -> Option<FairReadGuard> {
        let ticket = self.word(NEXT).load(Ordering::Acquire);
        if self.word(READ_GATE).load(Ordering::Acquire) != ticket {
            return None;
        }
        self.word(NEXT)
            .compare_exchange(ticket, ticket + 1, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.word(READ_GATE).fetch_add(1, Ordering::AcqRel);
        Some(FairReadGuard { lock: self.clone() })
    }

    /// Exclusive access if the lock is free right now.
    pub fn try_write(self: &Arc<Self>) -> Option<FairWriteGuard> {
        let ticket = self.word(NEXT).load(Ordering::Acquire);
        if self.word(WRITE_GATE).load(Ordering::Acquire) != ticket {
            return None;
        }
        self.word(NEXT)
            .compare_exchange(ticket, ticket + 1, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(FairWriteGuard { lock: self.clone() })
    }

    /// Retries `try_read` until `timeout`. Does not queue.
    pub fn read_timeout(self: &Arc<Self>, timeout: Duration) -> Option<FairReadGuard> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new();
        loop {
            if let Some(guard) = self.try_read() {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                return None;
            }
            backoff.wait();
        }
    }

    /// Retries `try_write` until `timeout`. Does not queue.
    pub fn write_timeout(self: &Arc<Self>, timeout: Duration) -> Option<FairWriteGuard> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new();
        loop {
            if let Some(guard) = self.try_write() {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                return None;
            }
            backoff.wait();
        }
    }

    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            issued: self.word(NEXT).load(Ordering::Acquire),
            admitted: self.word(READ_GATE).load(Ordering::Acquire),
            released: self.word(WRITE_GATE).load(Ordering::Acquire),
        }
    }

    fn release_read(&self) {
        self.word(WRITE_GATE).fetch_add(1, Ordering::AcqRel);
    }

    fn release_write(&self) {
        self.word(READ_GATE).fetch_add(1, Ordering::AcqRel);
        self.word(WRITE_GATE).fetch_add(1, Ordering::AcqRel);
    }
}

/// Shared access, released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FairReadGuard {
    lock: Arc<FairRwLock>,
}

impl Drop for FairReadGuard {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive access, released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FairWriteGuard {
    lock: Arc<FairRwLock>,
}

impl Drop for FairWriteGuard {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

/// Per-process cache of mapped locks, keyed by object name.
#[derive(Clone, Debug, Default)]
pub struct LockTable {
    locks: Arc<Mutex<HashMap<String, Arc<FairRwLock>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<FairRwLock>> {
        self.locks.lock().get(name).cloned()
    }

    /// Caches `lock` under `name`. If another task cached one first, that
    /// one is kept and returned.
    pub fn insert(&self, name: &str, lock: FairRwLock) -> Arc<FairRwLock> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(lock))
            .clone()
    }

    /// Forgets the lock of `name`. Holders of the old `Arc` keep using it.
    pub fn remove(&self, name: &str) -> Option<Arc<FairRwLock>> {
        self.locks.lock().remove(name)
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
