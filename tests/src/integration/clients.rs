//! # Client Scenarios
//!
//! Several clients against one server task: concurrent readers of one
//! object, producers and consumers of one queue, file-backed regions
//! shared between independent providers, the shared fair lock and the
//! control socket.

#[cfg(test)]
mod tests {
    use crate::fixtures::{memory_client, spawn_memory_server};
    use os_01_block_registry::{MmapRegionProvider, PoolConfig};
    use os_02_object_directory::{ControlPlaneHandler, ObjectStore};
    use shared_types::StoreError;
    use std::collections::HashSet;
    use store_runtime::{ControlPlaneServer, DType, Payload, SocketServer, StoreClient};
    use tempfile::TempDir;

    fn big_config() -> PoolConfig {
        PoolConfig {
            min_class_size: 64,
            max_block_size: 8 << 20,
            max_pool_bytes: Some(64 << 20),
        }
    }

    // =========================================================================
    // NAMED OBJECTS
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_observe_identical_bytes() {
        let (server, _task, regions) = spawn_memory_server(big_config());
        let writer = memory_client(&server, &regions);
        let data: Vec<u8> = (0..(1 << 20)).map(|i| (i % 251) as u8).collect();
        writer.put("x", &data).await.unwrap();

        let mut readers = Vec::new();
        for _ in 0..2 {
            let client = memory_client(&server, &regions);
            readers.push(tokio::spawn(async move { client.get("x").await }));
        }
        for reader in readers {
            assert_eq!(reader.await.unwrap().unwrap(), data);
        }

        let stats = writer.stats().await.unwrap();
        assert_eq!(stats.active_readers, 0);
        assert_eq!(stats.idle_blocks, 1);
    }

    #[tokio::test]
    async fn test_array_payload_between_clients() {
        let (server, _task, regions) = spawn_memory_server(big_config());
        let producer = memory_client(&server, &regions);
        let consumer = memory_client(&server, &regions);

        let data: Vec<u8> = (0..64u32).flat_map(|v| (v as f64).to_le_bytes()).collect();
        let payload = Payload::array(DType::F64, vec![8, 8], data).unwrap();
        producer.put_payload("grid", &payload).await.unwrap();

        assert_eq!(consumer.get_payload("grid").await.unwrap(), payload);
    }

    // =========================================================================
    // QUEUES
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_competing_consumers_take_each_entry_once() {
        const ENTRIES: u32 = 40;
        let (server, _task, regions) = spawn_memory_server(big_config());
        let producer = memory_client(&server, &regions);
        for i in 0..ENTRIES {
            producer.push("work", &i.to_le_bytes()).await.unwrap();
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let client = memory_client(&server, &regions);
            consumers.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                loop {
                    match client.pop("work").await {
                        Ok((_, bytes)) => {
                            let mut raw = [0u8; 4];
                            raw.copy_from_slice(&bytes);
                            taken.push(u32::from_le_bytes(raw));
                        }
                        Err(StoreError::NotFound { .. }) => return taken,
                        Err(e) => panic!("pop failed: {}", e),
                    }
                }
            }));
        }

        let mut all = HashSet::new();
        for consumer in consumers {
            for value in consumer.await.unwrap() {
                assert!(all.insert(value), "entry {} popped twice", value);
            }
        }
        assert_eq!(all.len(), ENTRIES as usize);
        assert_eq!(producer.stats().await.unwrap().queued_entries, 0);
    }

    // =========================================================================
    // FILE-BACKED REGIONS
    // =========================================================================

    #[tokio::test]
    async fn test_mmap_regions_shared_with_separate_provider() {
        let dir = TempDir::new().unwrap();
        let server_regions = MmapRegionProvider::new(dir.path()).unwrap();
        let store = ObjectStore::with_regions(server_regions, big_config()).unwrap();
        let (server, task) = ControlPlaneServer::spawn(ControlPlaneHandler::new(store), 16);

        let writer = StoreClient::new(
            server.clone(),
            MmapRegionProvider::new(dir.path()).unwrap(),
        );
        let reader = StoreClient::new(
            server.clone(),
            MmapRegionProvider::new(dir.path()).unwrap(),
        );

        writer.put("frame", b"bytes through a file").await.unwrap();
        writer.push("frames", b"queued through a file").await.unwrap();
        assert_eq!(reader.get("frame").await.unwrap(), b"bytes through a file");
        assert_eq!(reader.pop("frames").await.unwrap().1, b"queued through a file");

        assert_eq!(server.shutdown().await.unwrap(), 2);
        task.await.unwrap();
        let leftover = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }

    // =========================================================================
    // FAIR LOCK
    // =========================================================================

    fn counter_increment(bytes: &[u8]) -> Vec<u8> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        (u64::from_le_bytes(raw) + 1).to_le_bytes().to_vec()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_locking_clients_on_separate_mappings_lose_no_update() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::with_regions(
            MmapRegionProvider::new(dir.path()).unwrap(),
            big_config(),
        )
        .unwrap();
        let (server, task) = ControlPlaneServer::spawn(ControlPlaneHandler::new(store), 64);

        let seed = StoreClient::new(server.clone(), MmapRegionProvider::new(dir.path()).unwrap());
        seed.put("counter", &0u64.to_le_bytes()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let client = StoreClient::new(
                server.clone(),
                MmapRegionProvider::new(dir.path()).unwrap(),
            )
            .with_locking();
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    client.update("counter", counter_increment).await?;
                }
                Ok::<_, StoreError>(())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(seed.get("counter").await.unwrap(), 100u64.to_le_bytes().to_vec());
        server.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_locking_readers_see_whole_values() {
        let (server, _task, regions) = spawn_memory_server(big_config());

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let client = memory_client(&server, &regions).with_locking();
            tasks.push(tokio::spawn(async move {
                client.put("shared", &[i; 256]).await?;
                client.get("shared").await
            }));
        }
        for task in tasks {
            let bytes = task.await.unwrap().unwrap();
            assert_eq!(bytes.len(), 256);
            assert!(bytes.iter().all(|b| *b == bytes[0]));
        }

        let observer = memory_client(&server, &regions);
        let lock = observer.lock_for("shared").await.unwrap();
        assert_eq!(lock.snapshot().outstanding(), 0);
    }

    // =========================================================================
    // CONTROL SOCKET
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_socket_clients_share_blocks_and_locks() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("control.sock");
        let regions = dir.path().join("regions");
        std::fs::create_dir_all(&regions).unwrap();
        let store =
            ObjectStore::with_regions(MmapRegionProvider::new(&regions).unwrap(), big_config())
                .unwrap();
        let (server, task) = ControlPlaneServer::spawn(ControlPlaneHandler::new(store), 64);
        let listener = SocketServer::bind(&socket, server.clone()).unwrap().spawn();

        let writer = StoreClient::connect(&socket, MmapRegionProvider::new(&regions).unwrap())
            .await
            .unwrap()
            .with_locking();
        writer.put("counter", &0u64.to_le_bytes()).await.unwrap();
        writer.put_tracks("stereo", &[b"left", b"right"]).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let client = StoreClient::connect(&socket, MmapRegionProvider::new(&regions).unwrap())
                .await
                .unwrap()
                .with_locking();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    client.update("counter", counter_increment).await?;
                }
                client.get_tracks("stereo", &[1]).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), vec![b"right".to_vec()]);
        }

        assert_eq!(writer.get("counter").await.unwrap(), 30u64.to_le_bytes().to_vec());
        server.shutdown().await.unwrap();
        task.await.unwrap();
        listener.await.unwrap();
        assert!(!socket.exists());
    }
}
