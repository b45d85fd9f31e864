//! # Interleaving Fuzz
//!
//! Simulated clients issue random block, object and queue operations
//! against one store. After every step the registry, pool and directory
//! are cross-checked, and every handle known to be stale is presented
//! again to make sure it is still refused.
//!
//! Runs are seeded so a failure reproduces exactly.

#[cfg(test)]
mod tests {
    use crate::fixtures::memory_store_with;
    use os_01_block_registry::{BlockState, BlockStoreApi, InMemoryRegionProvider, PoolConfig};
    use os_02_object_directory::{ObjectStore, ObjectStoreApi};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use shared_types::{BlockId, BlockRef, ClientId, Handle, StoreError};

    const NAMES: [&str; 3] = ["a", "b", "c"];
    const QUEUES: [&str; 2] = ["q1", "q2"];

    struct Simulation {
        store: ObjectStore<InMemoryRegionProvider>,
        rng: StdRng,
        clients: Vec<ClientId>,
        /// Blocks being written: (owner, write handle).
        writing: Vec<(ClientId, Handle)>,
        /// Committed blocks not attached to any name.
        loose: Vec<BlockRef>,
        /// Read handles from request_data/get.
        reading: Vec<Handle>,
        /// Popped handles not yet freed: (queue, handle).
        popped: Vec<(&'static str, Handle)>,
        /// References that must never be accepted again.
        stale: Vec<BlockRef>,
    }

    impl Simulation {
        fn new(seed: u64) -> Self {
            Self {
                store: memory_store_with(PoolConfig {
                    min_class_size: 64,
                    max_block_size: 8192,
                    max_pool_bytes: Some(256 * 1024),
                }),
                rng: StdRng::seed_from_u64(seed),
                clients: (0..4).map(|_| ClientId::new()).collect(),
                writing: Vec::new(),
                loose: Vec::new(),
                reading: Vec::new(),
                popped: Vec::new(),
                stale: Vec::new(),
            }
        }

        fn client(&mut self) -> ClientId {
            self.clients[self.rng.gen_range(0..self.clients.len())]
        }

        fn take<T>(rng: &mut StdRng, items: &mut Vec<T>) -> Option<T> {
            if items.is_empty() {
                None
            } else {
                let index = rng.gen_range(0..items.len());
                Some(items.swap_remove(index))
            }
        }

        fn step(&mut self) {
            match self.rng.gen_range(0..14) {
                0 | 1 => {
                    let owner = self.client();
                    let size = self.rng.gen_range(0..6000);
                    if let Ok(handle) = self.store.create_block(size, owner) {
                        self.writing.push((owner, handle));
                    }
                }
                2 => {
                    if let Some((owner, handle)) = Self::take(&mut self.rng, &mut self.writing) {
                        if self.store.commit(handle.block_ref(), owner).is_ok() {
                            self.loose.push(handle.block_ref());
                        }
                    }
                }
                3 => {
                    if let Some(block) = self.loose.choose(&mut self.rng).copied() {
                        if let Ok(handle) = self.store.request_data(block.block_id, None) {
                            self.reading.push(handle);
                        }
                    }
                }
                4 => {
                    if let Some(handle) = Self::take(&mut self.rng, &mut self.reading) {
                        let _ = self.store.release(handle.block_ref());
                    }
                }
                5 => {
                    if let Some(block) = self.loose.choose(&mut self.rng).copied() {
                        let force = self.rng.gen_bool(0.3);
                        let _ = self.store.delete(block.block_id, force);
                    }
                }
                6 => {
                    if let Some((owner, handle)) = Self::take(&mut self.rng, &mut self.writing) {
                        let name = *NAMES.choose(&mut self.rng).unwrap_or(&"a");
                        // Another client may try to publish someone else's block.
                        let caller = if self.rng.gen_bool(0.1) { self.client() } else { owner };
                        if self.store.put(name, handle.block_ref(), caller).is_err() {
                            self.writing.push((owner, handle));
                        }
                    }
                }
                7 => {
                    let name = *NAMES.choose(&mut self.rng).unwrap_or(&"a");
                    if let Ok(handle) = self.store.get(name) {
                        self.reading.push(handle);
                    }
                }
                8 => {
                    if let Some((owner, handle)) = Self::take(&mut self.rng, &mut self.writing) {
                        let queue = *QUEUES.choose(&mut self.rng).unwrap_or(&"q1");
                        if self.store.push_to_object(queue, handle.block_ref(), owner).is_err() {
                            self.writing.push((owner, handle));
                        }
                    }
                }
                9 => {
                    let queue = *QUEUES.choose(&mut self.rng).unwrap_or(&"q1");
                    if let Ok((_, handle)) = self.store.pop_from_object(queue) {
                        self.popped.push((queue, handle));
                    }
                }
                10 => {
                    if let Some((queue, handle)) = Self::take(&mut self.rng, &mut self.popped) {
                        let _ = self.store.free_handle(queue, handle.block_ref());
                    }
                }
                11 => {
                    let queue = *QUEUES.choose(&mut self.rng).unwrap_or(&"q1");
                    if let Ok(seqs) = self.store.list_entries(queue) {
                        let picked: Vec<_> = seqs
                            .iter()
                            .copied()
                            .filter(|_| self.rng.gen_bool(0.5))
                            .collect();
                        if let Ok(handles) = self.store.batch_read_from_object(queue, &picked) {
                            let refs: Vec<_> = handles.iter().map(|(_, h)| h.block_ref()).collect();
                            self.store
                                .batch_release_entry(queue, &refs)
                                .expect("releasing a fresh batch read");
                        }
                    }
                }
                12 => {
                    let name = *NAMES
                        .iter()
                        .chain(QUEUES.iter())
                        .collect::<Vec<_>>()
                        .choose(&mut self.rng)
                        .copied()
                        .unwrap_or(&"a");
                    let force = self.rng.gen_bool(0.5);
                    let _ = self.store.remove_object(name, force);
                }
                _ => {
                    let owner = self.client();
                    self.store.reap_owner(owner);
                }
            }
        }

        /// Moves every tracked reference that stopped being valid to `stale`.
        fn sweep(&mut self) {
            let store = &self.store;
            let stale = &mut self.stale;
            let mut expire = |block: BlockRef| {
                let dead = store.blocks().validate_ref(block).is_err();
                if dead {
                    stale.push(block);
                }
                !dead
            };

            self.writing.retain(|(owner, h)| {
                let alive = expire(h.block_ref());
                alive
                    && matches!(
                        store.blocks().block(h.block_id).map(|b| b.state()),
                        Some(BlockState::Write { owner: o }) if o == *owner
                    )
            });
            self.loose.retain(|b| {
                expire(*b) && store.directory().locate(b.block_id).is_none()
            });
            self.reading.retain(|h| expire(h.block_ref()));
            self.popped.retain(|(_, h)| expire(h.block_ref()));
        }

        fn check(&mut self) {
            if let Err(e) = self.store.verify_integrity() {
                panic!("integrity violated: {}", e);
            }

            for block in self.store.blocks().registry().iter() {
                let state = block.state();
                assert!(
                    block.reader_count() == 0 || matches!(state, BlockState::Busy { .. }),
                    "{} has readers in {} state",
                    block.id(),
                    state.name()
                );
                assert!(
                    block.owner().is_none() || matches!(state, BlockState::Write { .. }),
                    "{} has an owner in {} state",
                    block.id(),
                    state.name()
                );
            }

            if let Some(block) = self.stale.choose(&mut self.rng).copied() {
                assert!(matches!(
                    self.store.release(block),
                    Err(StoreError::StaleGeneration { .. })
                ));
                assert!(matches!(
                    self.store.request_data(block.block_id, Some(block.generation)),
                    Err(StoreError::StaleGeneration { .. })
                ));
            }
        }

        fn run(&mut self, steps: usize) {
            for _ in 0..steps {
                self.step();
                self.sweep();
                self.check();
            }
        }

        fn live_blocks(&self) -> Vec<BlockId> {
            self.store
                .blocks()
                .registry()
                .iter()
                .filter(|b| !b.is_zombie())
                .map(|b| b.id())
                .collect()
        }
    }

    // =========================================================================
    // FUZZ RUNS
    // =========================================================================

    #[test]
    fn test_random_interleavings_keep_invariants() {
        for seed in 0..8u64 {
            let mut sim = Simulation::new(seed);
            sim.run(2_000);
        }
    }

    #[test]
    fn test_everything_drains_back_to_the_pool() {
        let mut sim = Simulation::new(0xC0FFEE);
        sim.run(1_000);

        for (queue, handle) in std::mem::take(&mut sim.popped) {
            sim.store.free_handle(queue, handle.block_ref()).unwrap();
        }
        for handle in std::mem::take(&mut sim.reading) {
            sim.store.release(handle.block_ref()).unwrap();
        }
        for owner in sim.clients.clone() {
            sim.store.reap_owner(owner);
        }
        for name in NAMES.iter().chain(QUEUES.iter()) {
            let _ = sim.store.remove_object(name, false);
        }
        for block_id in sim.live_blocks() {
            sim.store.delete(block_id, false).unwrap();
        }

        let stats = sim.store.store_stats();
        assert_eq!(stats.total_blocks(), stats.zombie_blocks);
        assert_eq!(stats.pooled_bytes, stats.region_bytes);
        assert_eq!(stats.objects, 0);
        sim.store.verify_integrity().unwrap();
    }
}
