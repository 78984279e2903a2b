//! Multi-block store over one backing file
//!
//! Lays `block_count` blocks back to back in a single pre-sized file and gives
//! each its own duplicated descriptor. Choosing which block receives a value
//! is up to the caller; the store only addresses blocks by id.

use crate::config::StoreConfig;
use crate::core::block::Block;
use crate::core::io::SlotFile;
use crate::error::{Result, SlotStoreError};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Address of a stored record: block id plus in-block slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub block: u32,
    pub slot: u32,
}

impl SlotKey {
    pub fn new(block: u32, slot: u32) -> Self {
        SlotKey { block, slot }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.slot)
    }
}

pub struct Store {
    blocks: Vec<Block>,
    config: StoreConfig,
}

impl Store {
    /// Create or reopen the backing file and start one block per region
    ///
    /// The file is grown to `config.file_len()` if shorter. Slot occupancy is
    /// not recovered: every block starts with all slots vacant.
    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let base = SlotFile::create(path.as_ref(), config.file_len())?;
        let region_len = config.block.region_len();

        let mut blocks = Vec::with_capacity(config.block_count as usize);
        for id in 0..config.block_count {
            let handle = base.try_clone()?;
            blocks.push(Block::new(
                handle,
                id as u64 * region_len,
                config.block.clone(),
            )?);
        }

        info!(
            "Store opened at {:?}: {} blocks x {} slots",
            path.as_ref(),
            config.block_count,
            config.block.slot_count
        );

        Ok(Store { blocks, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn block(&self, id: u32) -> Result<&Block> {
        self.blocks
            .get(id as usize)
            .ok_or(SlotStoreError::UnknownBlock(id))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Vacant slots across all blocks
    pub fn vacancy(&self) -> u64 {
        self.blocks.iter().map(|b| b.vacancy() as u64).sum()
    }

    /// Number of blocks that still have at least one vacant slot
    pub fn vacant_blocks(&self) -> u32 {
        self.blocks.iter().filter(|b| b.is_vacant()).count() as u32
    }

    /// Store `value` in block `block`
    pub fn put_in(&self, block: u32, value: &[u8]) -> Result<SlotKey> {
        let slot = self.block(block)?.put(value)?;
        Ok(SlotKey::new(block, slot))
    }

    pub fn get(&self, key: SlotKey) -> Result<Vec<u8>> {
        self.block(key.block)?.get(key.slot)
    }

    pub fn delete(&self, key: SlotKey) -> Result<()> {
        self.block(key.block)?.delete(key.slot)
    }

    /// Flush every block and wait; returns the total number of records written
    pub fn flush_sync(&self) -> Result<usize> {
        let mut written = 0;
        for block in &self.blocks {
            written += block.flush_sync()?;
        }
        Ok(written)
    }

    /// Shut down every block, returning the first error encountered
    pub fn shutdown(&self) -> Result<()> {
        let mut first_err = None;
        for block in &self.blocks {
            if let Err(e) = block.shutdown() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("block_count", &self.blocks.len())
            .field("vacancy", &self.vacancy())
            .finish()
    }
}
