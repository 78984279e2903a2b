use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlotStoreError {
    #[error("Capacity exhausted: no vacant slot remaining in block")]
    CapacityExhausted,

    #[error("Invalid slot index {index} (block holds {slot_count} slots)")]
    InvalidSlot { index: u32, slot_count: u32 },

    #[error("Value too large: {len} bytes (slot size is {max})")]
    ValueTooLarge { len: usize, max: usize },

    /// The file returned fewer bytes than a full slot. Indicates a corrupt or
    /// undersized backing file; the block should not be trusted afterwards.
    #[error(
        "Short read: expected a full slot at offset {offset:#x} (slot {index}), got {read} bytes"
    )]
    ShortRead { offset: u64, index: u32, read: usize },

    #[error("Flush of slot {slot} failed: {source}")]
    Flush {
        slot: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Block is shut down")]
    Closed,

    #[error("Flush worker is no longer running")]
    FlushWorkerGone,

    #[error("Unknown block id: {0}")]
    UnknownBlock(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl SlotStoreError {
    /// Whether the error reports a broken storage invariant rather than a
    /// condition the caller can route around.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SlotStoreError::ShortRead { .. })
    }

    /// Whether the error only means "this block is full".
    pub fn is_capacity(&self) -> bool {
        matches!(self, SlotStoreError::CapacityExhausted)
    }
}

pub type Result<T> = std::result::Result<T, SlotStoreError>;
