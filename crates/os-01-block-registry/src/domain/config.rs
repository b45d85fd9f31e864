//! Reuse pool configuration.

use shared_types::StoreError;

/// Size-class and budget limits of the block pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Smallest size class in bytes (power of two).
    pub min_class_size: usize,
    /// Largest logical block size accepted by `create_block`.
    pub max_block_size: usize,
    /// Upper bound on the summed capacity of all regions, `None` for no bound.
    pub max_pool_bytes: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_class_size: 64,
            max_block_size: 1 << 30,
            max_pool_bytes: None,
        }
    }
}

impl PoolConfig {
    /// Small limits for unit tests.
    pub fn for_testing() -> Self {
        Self {
            min_class_size: 64,
            max_block_size: 1 << 20,
            max_pool_bytes: Some(4 << 20),
        }
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !self.min_class_size.is_power_of_two() {
            return Err(StoreError::invalid_state(
                "pool config",
                format!("min_class_size {} is not a power of two", self.min_class_size),
            ));
        }
        if self.max_block_size < self.min_class_size {
            return Err(StoreError::invalid_state(
                "pool config",
                "max_block_size is below min_class_size",
            ));
        }
        Ok(())
    }

    /// Size class (capacity) serving a request of `size` bytes.
    pub fn class_for(&self, size: usize) -> Result<usize, StoreError> {
        if size > self.max_block_size {
            return Err(StoreError::Exhausted {
                requested: size,
                reason: format!("above max block size {}", self.max_block_size),
            });
        }
        let class = size
            .max(self.min_class_size)
            .checked_next_power_of_two()
            .ok_or_else(|| StoreError::Exhausted {
                requested: size,
                reason: "size class overflow".to_string(),
            })?;
        Ok(class)
    }
}
