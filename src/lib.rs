//! # slotstore - Fixed-Record Slot Storage
//!
//! `slotstore` stores opaque values of up to 1 KiB in fixed-size slots of a
//! pre-sized backing file. A value's address is the slot index its block
//! hands back on `put`.
//!
//! - **Concurrent bitmap allocator**: lock-free bit toggles, serialized
//!   first-fit slot claiming
//! - **Atomic vacancy accounting** that never underflows under contention
//! - **Write-back buffering** with read-your-writes, drained by a background
//!   thread on request or on a timer
//! - **Positional I/O** only, so many blocks can share one file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slotstore::{Block, BlockConfig, SlotFile, Result};
//!
//! # fn main() -> Result<()> {
//! let config = BlockConfig::new().with_slot_count(4096);
//! let file = SlotFile::create("slots.dat", config.region_len())?;
//! let block = Block::new(file, 0, config)?;
//!
//! let slot = block.put(b"hello")?;
//! assert_eq!(&block.get(slot)?[..5], b"hello");
//!
//! block.flush_sync()?;
//! block.delete(slot)?;
//! block.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## File Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Block 0: slot_count x 1024 bytes             │
//! │  offset 0 + i * 1024  -> slot i              │
//! ├──────────────────────────────────────────────┤
//! │ Block 1: slot_count x 1024 bytes             │
//! │  offset R + i * 1024  -> slot i              │
//! ├──────────────────────────────────────────────┤
//! │ ...                                          │
//! └──────────────────────────────────────────────┘
//!  R = slot_count * 1024 (region length)
//! ```
//!
//! No header, index or allocator snapshot is written. Slot occupancy lives
//! in memory only and is lost on restart.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use crate::config::{
    BlockConfig, StoreConfig, DEFAULT_BUFFER_CAPACITY, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_FLUSH_QUEUE_DEPTH, DEFAULT_SLOT_COUNT, SLOT_SIZE,
};
pub use crate::core::{BitMap, Block, BlockState, SlotFile, SlotKey, Store};
pub use crate::error::{Result, SlotStoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
