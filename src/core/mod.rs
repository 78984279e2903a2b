//! Storage core: slot allocation, positional I/O, blocks and the block store.

pub mod allocator;
pub mod block;
pub mod io;
pub mod store;

pub use allocator::BitMap;
pub use block::{Block, BlockState};
pub use io::SlotFile;
pub use store::{SlotKey, Store};
