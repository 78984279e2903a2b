//! Slot allocation for blocks
//!
//! Blocks track slot occupancy with a concurrent bitmap. Lookups and bit
//! toggles are lock-free; claiming a vacant slot is serialized.

pub mod bitmap;

pub use bitmap::BitMap;
