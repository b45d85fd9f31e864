//! # Object Store Test Suite
//!
//! Scenarios that cross crate boundaries: the block registry under the
//! object directory, the server task in front of both, and clients on top.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/
//! │   ├── fixtures.rs       # Store and client builders shared with benches
//! │   └── integration/
//! │       ├── lifecycle.rs  # Reader counting, reuse, staleness
//! │       ├── queues.rs     # FIFO order, consumption, batch atomicity
//! │       ├── clients.rs    # Server + clients, mmap regions, fair lock
//! │       └── fuzz.rs       # Seeded interleavings with invariant checks
//! └── benches/
//!     └── store_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p os-tests
//! cargo test -p os-tests integration::fuzz
//! cargo bench -p os-tests
//! ```

pub mod fixtures;
pub mod integration;
