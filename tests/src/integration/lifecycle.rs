//! # Block Lifecycle Scenarios
//!
//! Reader counting, reuse through the pool and staleness of old handles,
//! driven through the object store the way the server drives it.

#[cfg(test)]
mod tests {
    use crate::fixtures::{committed_block, memory_store, memory_store_with};
    use os_01_block_registry::{BlockState, BlockStoreApi, PoolConfig};
    use os_02_object_directory::ObjectStoreApi;
    use shared_types::{ClientId, StoreError};

    // =========================================================================
    // READER COUNTING
    // =========================================================================

    #[test]
    fn test_two_readers_then_delete_then_smaller_reuse() {
        let mut store = memory_store();
        let a = ClientId::new();

        let handle = committed_block(&mut store, 1024, a);
        let id = handle.block_id;

        let h1 = store.request_data(id, None).unwrap();
        let h2 = store.request_data(id, None).unwrap();
        assert_eq!(store.blocks().block(id).unwrap().reader_count(), 2);

        assert_eq!(store.release(h1.block_ref()).unwrap(), 1);
        assert!(matches!(
            store.blocks().block(id).unwrap().state(),
            BlockState::Busy { .. }
        ));
        assert_eq!(store.release(h2.block_ref()).unwrap(), 0);
        assert_eq!(store.blocks().block(id).unwrap().state(), BlockState::Idle);

        store.delete(id, false).unwrap();
        assert!(store.blocks().block(id).unwrap().is_zombie());

        let reused = store.create_block(512, ClientId::new()).unwrap();
        assert_eq!(reused.block_id, id);
        assert_eq!(reused.region, handle.region);
        assert_eq!(reused.generation, handle.generation.next());
        store.verify_integrity().unwrap();
    }

    #[test]
    fn test_double_release_leaves_count_intact() {
        let mut store = memory_store();
        let handle = committed_block(&mut store, 64, ClientId::new());
        let read = store.request_data(handle.block_id, None).unwrap();

        store.release(read.block_ref()).unwrap();
        for _ in 0..3 {
            assert!(matches!(
                store.release(read.block_ref()),
                Err(StoreError::DoubleRelease { .. })
            ));
        }
        let block = store.blocks().block(handle.block_id).unwrap();
        assert_eq!(block.state(), BlockState::Idle);
        assert_eq!(block.reader_count(), 0);
    }

    // =========================================================================
    // STALENESS
    // =========================================================================

    #[test]
    fn test_force_delete_stales_every_outstanding_handle() {
        let mut store = memory_store();
        let handle = committed_block(&mut store, 200, ClientId::new());
        let readers: Vec<_> = (0..3)
            .map(|_| store.request_data(handle.block_id, None).unwrap())
            .collect();

        assert!(matches!(
            store.delete(handle.block_id, false),
            Err(StoreError::Busy { readers: 3, .. })
        ));
        store.delete(handle.block_id, true).unwrap();

        for reader in &readers {
            assert!(matches!(
                store.release(reader.block_ref()),
                Err(StoreError::StaleGeneration { .. })
            ));
            assert!(matches!(
                store.request_data(reader.block_id, Some(reader.generation)),
                Err(StoreError::StaleGeneration { .. })
            ));
        }
        store.verify_integrity().unwrap();
    }

    #[test]
    fn test_reuse_stales_handles_of_previous_generation() {
        let mut store = memory_store();
        let old = committed_block(&mut store, 100, ClientId::new());
        store.delete(old.block_id, false).unwrap();

        let owner = ClientId::new();
        let new = committed_block(&mut store, 100, owner);
        assert_eq!(new.block_id, old.block_id);
        assert!(new.generation > old.generation);

        assert!(matches!(
            store.release(old.block_ref()),
            Err(StoreError::StaleGeneration { .. })
        ));
        assert!(matches!(
            store.commit(old.block_ref(), owner),
            Err(StoreError::StaleGeneration { .. })
        ));
        assert!(store.request_data(new.block_id, Some(new.generation)).is_ok());
    }

    // =========================================================================
    // POOL
    // =========================================================================

    #[test]
    fn test_budget_exhaustion_recovers_through_reuse() {
        let mut store = memory_store_with(PoolConfig {
            min_class_size: 64,
            max_block_size: 4096,
            max_pool_bytes: Some(8192),
        });
        let owner = ClientId::new();
        let a = committed_block(&mut store, 4096, owner);
        committed_block(&mut store, 4096, owner);

        let before = store.store_stats();
        assert!(matches!(
            store.create_block(10, owner),
            Err(StoreError::Exhausted { .. })
        ));
        assert_eq!(store.store_stats(), before);

        store.delete(a.block_id, false).unwrap();
        let small = store.create_block(10, owner).unwrap();
        assert_eq!(small.block_id, a.block_id);
        assert_eq!(small.capacity(), 4096);
    }

    #[test]
    fn test_named_object_removal_feeds_the_pool() {
        let mut store = memory_store();
        let owner = ClientId::new();
        for _ in 0..3 {
            let block = store.create_block(300, owner).unwrap();
            store.put("frame", block.block_ref(), owner).unwrap();
        }
        let regions = store.store_stats().region_bytes;

        store.remove_object("frame", false).unwrap();
        let stats = store.store_stats();
        assert_eq!(stats.zombie_blocks, 3);
        assert_eq!(stats.pooled_bytes, regions);
        assert_eq!(stats.objects, 0);

        store.create_block(300, owner).unwrap();
        assert_eq!(store.store_stats().region_bytes, regions);
        store.verify_integrity().unwrap();
    }
}
