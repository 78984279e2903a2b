//! Block and store configuration.
//!
//! Both configs can be built in code with the `with_*` setters or loaded from
//! TOML. Missing fields fall back to the defaults below.

use crate::error::{Result, SlotStoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Fixed size of one stored record in bytes.
pub const SLOT_SIZE: usize = 1024;

/// Default number of slots per block (2^20, a 1 GiB region).
pub const DEFAULT_SLOT_COUNT: u32 = 1 << 20;

/// Default pending-write buffer size that forces a synchronous flush.
pub const DEFAULT_BUFFER_CAPACITY: usize = 32;

/// Default idle wait of the flush worker.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound of the flush signal queue.
pub const DEFAULT_FLUSH_QUEUE_DEPTH: usize = 4;

/// Per-block configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockConfig {
    /// Number of fixed-size slots in the block's file region
    pub slot_count: u32,

    /// Pending writes allowed before `put` flushes synchronously
    pub buffer_capacity: usize,

    /// Idle wait of the background flush worker, in milliseconds
    pub flush_interval_ms: u64,

    /// Bound of the flush signal queue
    pub flush_queue_depth: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        BlockConfig {
            slot_count: DEFAULT_SLOT_COUNT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
            flush_queue_depth: DEFAULT_FLUSH_QUEUE_DEPTH,
        }
    }
}

impl BlockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot_count(mut self, slot_count: u32) -> Self {
        self.slot_count = slot_count;
        self
    }

    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_flush_queue_depth(mut self, depth: usize) -> Self {
        self.flush_queue_depth = depth;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Size of the block's file region in bytes
    pub fn region_len(&self) -> u64 {
        self.slot_count as u64 * SLOT_SIZE as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(SlotStoreError::InvalidConfig(
                "slot_count must be greater than 0".into(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(SlotStoreError::InvalidConfig(
                "buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(SlotStoreError::InvalidConfig(
                "flush_interval_ms must be greater than 0".into(),
            ));
        }
        if self.flush_queue_depth == 0 {
            return Err(SlotStoreError::InvalidConfig(
                "flush_queue_depth must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: BlockConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Configuration of a [`Store`](crate::Store): how many blocks share the
/// backing file, and how each block is set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Number of blocks laid out back to back in the backing file
    pub block_count: u32,

    /// Settings shared by every block
    pub block: BlockConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            block_count: 1,
            block: BlockConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_count(mut self, block_count: u32) -> Self {
        self.block_count = block_count;
        self
    }

    pub fn with_block(mut self, block: BlockConfig) -> Self {
        self.block = block;
        self
    }

    /// Total backing file length in bytes
    pub fn file_len(&self) -> u64 {
        self.block_count as u64 * self.block.region_len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_count == 0 {
            return Err(SlotStoreError::InvalidConfig(
                "block_count must be greater than 0".into(),
            ));
        }
        self.block.validate()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
