//! Builders shared by the integration tests and the benchmarks.

use os_01_block_registry::{BlockStoreApi, InMemoryRegionProvider, PoolConfig};
use os_02_object_directory::{ControlPlaneHandler, ObjectStore, ObjectStoreApi};
use shared_types::{BlockRef, ClientId, EntrySeq, Handle};
use store_runtime::{ControlPlaneServer, ServerHandle, StoreClient};
use tokio::task::JoinHandle;

/// Store over heap regions with a generous budget.
pub fn memory_store() -> ObjectStore<InMemoryRegionProvider> {
    memory_store_with(PoolConfig {
        max_pool_bytes: Some(64 << 20),
        ..PoolConfig::for_testing()
    })
}

pub fn memory_store_with(config: PoolConfig) -> ObjectStore<InMemoryRegionProvider> {
    ObjectStore::with_regions(InMemoryRegionProvider::new(), config)
        .expect("test pool config is valid")
}

/// Creates and commits a block of `size` bytes for `owner`.
pub fn committed_block<S: BlockStoreApi + ?Sized>(
    store: &mut S,
    size: usize,
    owner: ClientId,
) -> Handle {
    let handle = store.create_block(size, owner).expect("create_block");
    store
        .commit(handle.block_ref(), owner)
        .expect("commit of a fresh block")
}

/// Writes nothing, pushes a fresh block onto `name`.
pub fn pushed_entry<S: ObjectStoreApi + BlockStoreApi>(
    store: &mut S,
    name: &str,
    owner: ClientId,
) -> (EntrySeq, BlockRef) {
    let block = store.create_block(16, owner).expect("create_block").block_ref();
    let seq = store
        .push_to_object(name, block, owner)
        .expect("push_to_object");
    (seq, block)
}

/// A server over heap regions, plus the region provider clients share.
pub fn spawn_memory_server(
    config: PoolConfig,
) -> (ServerHandle, JoinHandle<usize>, InMemoryRegionProvider) {
    let regions = InMemoryRegionProvider::new();
    let store =
        ObjectStore::with_regions(regions.clone(), config).expect("test pool config is valid");
    let (handle, task) = ControlPlaneServer::spawn(ControlPlaneHandler::new(store), 256);
    (handle, task, regions)
}

/// A client of `server` with its own identity.
pub fn memory_client(
    server: &ServerHandle,
    regions: &InMemoryRegionProvider,
) -> StoreClient<ServerHandle, InMemoryRegionProvider> {
    StoreClient::new(server.clone(), regions.clone())
}
