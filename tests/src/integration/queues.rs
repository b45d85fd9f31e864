//! # Queue Scenarios
//!
//! FIFO order, consumption through `free_handle`, deferred finalization
//! while other readers hold an entry, and all-or-nothing batches.

#[cfg(test)]
mod tests {
    use crate::fixtures::{memory_store, pushed_entry};
    use os_01_block_registry::{BlockState, BlockStoreApi};
    use os_02_object_directory::ObjectStoreApi;
    use shared_types::{ClientId, ObjectKind, StoreError};

    // =========================================================================
    // ORDERING
    // =========================================================================

    #[test]
    fn test_n_pushes_then_n_pops_in_order_then_not_found() {
        const N: usize = 25;
        let mut store = memory_store();
        let producer = ClientId::new();
        let pushed: Vec<_> = (0..N)
            .map(|_| pushed_entry(&mut store, "jobs", producer))
            .collect();

        let mut seen = Vec::new();
        for (seq, block) in &pushed {
            let (popped, handle) = store.pop_from_object("jobs").unwrap();
            assert_eq!(popped, *seq);
            assert_eq!(handle.block_ref(), *block);
            store.free_handle("jobs", handle.block_ref()).unwrap();
            seen.push(popped);
        }
        seen.dedup();
        assert_eq!(seen.len(), N);

        assert!(matches!(
            store.pop_from_object("jobs"),
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.store_stats().zombie_blocks, N);
        store.verify_integrity().unwrap();
    }

    #[test]
    fn test_pop_does_not_wait_for_free_handle() {
        let mut store = memory_store();
        let producer = ClientId::new();
        let (first, _) = pushed_entry(&mut store, "q", producer);
        let (second, _) = pushed_entry(&mut store, "q", producer);

        let (a, _) = store.pop_from_object("q").unwrap();
        let (b, _) = store.pop_from_object("q").unwrap();
        assert_eq!((a, b), (first, second));

        // Claimed but unconsumed entries stay listed.
        assert_eq!(store.list_entries("q").unwrap(), vec![first, second]);
    }

    // =========================================================================
    // CONSUMPTION
    // =========================================================================

    #[test]
    fn test_consumption_waits_for_last_reader() {
        let mut store = memory_store();
        let (seq, block) = pushed_entry(&mut store, "q", ClientId::new());

        let peek = store.read_from_object("q", seq).unwrap();
        let (_, popped) = store.pop_from_object("q").unwrap();

        store.free_handle("q", popped.block_ref()).unwrap();
        assert_eq!(store.list_entries("q").unwrap(), vec![seq]);
        assert!(matches!(
            store.blocks().block(block.block_id).unwrap().state(),
            BlockState::Busy { .. }
        ));

        store.release_entry("q", peek.block_ref()).unwrap();
        assert!(store.list_entries("q").unwrap().is_empty());
        assert!(store.blocks().block(block.block_id).unwrap().is_zombie());
        store.verify_integrity().unwrap();
    }

    #[test]
    fn test_delete_entry_respects_readers_unless_forced() {
        let mut store = memory_store();
        let (seq, _) = pushed_entry(&mut store, "q", ClientId::new());
        let reader = store.read_from_object("q", seq).unwrap();

        assert!(matches!(
            store.delete_entry("q", seq, false),
            Err(StoreError::Busy { .. })
        ));
        store.delete_entry("q", seq, true).unwrap();

        assert!(matches!(
            store.release_entry("q", reader.block_ref()),
            Err(StoreError::StaleGeneration { .. })
        ));
        let info = store.object_info("q").unwrap();
        assert_eq!(info.kind, ObjectKind::Queue);
        assert_eq!(info.entry_count, 0);
        assert_eq!(info.tail, seq + 1);
    }

    // =========================================================================
    // BATCHES
    // =========================================================================

    #[test]
    fn test_batch_release_is_all_or_nothing() {
        let mut store = memory_store();
        let producer = ClientId::new();
        let (a, _) = pushed_entry(&mut store, "q", producer);
        let (b, _) = pushed_entry(&mut store, "q", producer);

        let handles = store.batch_read_from_object("q", &[a, b]).unwrap();
        let refs: Vec<_> = handles.iter().map(|(_, h)| h.block_ref()).collect();
        let before = store.store_stats();

        // The second release of the first block has no reader left.
        let doubled = [refs[0], refs[1], refs[0]];
        assert!(matches!(
            store.batch_release_entry("q", &doubled),
            Err(StoreError::DoubleRelease { .. })
        ));
        assert_eq!(store.store_stats(), before);

        store.batch_release_entry("q", &refs).unwrap();
        assert_eq!(store.store_stats().active_readers, 0);
    }

    #[test]
    fn test_bounded_queue_refuses_then_accepts_after_consumption() {
        let mut store = memory_store();
        let producer = ClientId::new();
        store.create_queue("bounded", Some(2)).unwrap();
        pushed_entry(&mut store, "bounded", producer);
        pushed_entry(&mut store, "bounded", producer);

        let extra = store.create_block(8, producer).unwrap();
        assert!(matches!(
            store.push_to_object("bounded", extra.block_ref(), producer),
            Err(StoreError::Exhausted { .. })
        ));
        assert_eq!(
            store.blocks().block(extra.block_id).unwrap().owner(),
            Some(producer)
        );

        let (_, handle) = store.pop_from_object("bounded").unwrap();
        store.free_handle("bounded", handle.block_ref()).unwrap();
        assert_eq!(
            store
                .push_to_object("bounded", extra.block_ref(), producer)
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_queue_and_single_names_do_not_mix() {
        let mut store = memory_store();
        let owner = ClientId::new();
        pushed_entry(&mut store, "q", owner);

        let block = store.create_block(8, owner).unwrap();
        assert!(matches!(
            store.put("q", block.block_ref(), owner),
            Err(StoreError::InvalidState { .. })
        ));
        assert!(matches!(
            store.create_queue("q", None),
            Err(StoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            store.get("q"),
            Err(StoreError::InvalidState { .. })
        ));
    }
}
