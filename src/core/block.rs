//! Fixed-slot storage block with write-back buffering
//!
//! A block owns one file region of `slot_count` records of [`SLOT_SIZE`] bytes.
//! Slot `i` lives at `file_offset + i * SLOT_SIZE`.
//!
//! - [`Block::put`] claims a vacant slot from the bitmap and buffers the write
//! - [`Block::get`] serves buffered writes first, then reads the file
//! - [`Block::delete`] drops any buffered write, frees the slot, restores vacancy
//! - A background thread drains buffered writes on request or every
//!   `flush_interval`, whichever comes first
//!
//! ```text
//!  put ──► vacancy CAS ──► BitMap::find_vacant_and_set ──► pending[slot] = value
//!                                                              │
//!  flush / flush_sync / timeout ──► flush worker ──► drain ────┴──► file
//! ```
//!
//! The pending-write lock is held for a whole drain pass. A concurrent `get`
//! or `delete` is therefore ordered entirely before or after a drain, so a
//! freed slot can never be overwritten later by its stale buffered value.
//!
//! There is no persistence of the bitmap: after a restart every slot is
//! vacant again.

use crate::config::{BlockConfig, SLOT_SIZE};
use crate::core::allocator::BitMap;
use crate::core::io::SlotFile;
use crate::error::{Result, SlotStoreError};
use ahash::AHashMap;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockState {
    /// Serving put/get/delete, flush worker running
    Active = 0,
    /// Shutdown in progress: final flush, worker stopping
    ShuttingDown = 1,
    /// File handle released; every operation fails with `Closed`
    Closed = 2,
}

impl BlockState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => BlockState::Active,
            1 => BlockState::ShuttingDown,
            _ => BlockState::Closed,
        }
    }
}

/// Message to the flush worker. `done` receives the drain result.
struct FlushRequest {
    done: Option<Sender<Result<usize>>>,
}

/// State shared between callers and the flush worker
struct Inner {
    allocator: BitMap,
    vacancy: AtomicU32,
    pending: Mutex<AHashMap<u32, Vec<u8>>>,
    file: RwLock<Option<SlotFile>>,
    file_offset: u64,
}

impl Inner {
    #[inline]
    fn slot_offset(&self, slot: u32) -> u64 {
        self.file_offset + slot as u64 * SLOT_SIZE as u64
    }

    /// Apply `diff` to the vacancy counter, refusing to go below zero
    fn adjust_vacancy(&self, diff: i64) -> bool {
        self.vacancy
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current as i64 + diff;
                if next < 0 || next > u32::MAX as i64 {
                    None
                } else {
                    Some(next as u32)
                }
            })
            .is_ok()
    }

    /// Write buffered records to the file
    ///
    /// Entries are removed only after their write succeeded. On the first
    /// failure the pass stops and the remaining entries stay buffered.
    fn drain(&self) -> Result<usize> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(0);
        }

        let guard = self.file.read();
        let file = guard.as_ref().ok_or(SlotStoreError::Closed)?;

        let mut slots: Vec<u32> = pending.keys().copied().collect();
        slots.sort_unstable();

        let mut written = 0;
        for slot in slots {
            if let Some(record) = pending.get(&slot) {
                if let Err(source) = file.write_slot_at(self.slot_offset(slot), record) {
                    debug!(
                        "Drain at offset {:#x} stopped after {} records",
                        self.file_offset, written
                    );
                    return Err(SlotStoreError::Flush { slot, source });
                }
            }
            pending.remove(&slot);
            written += 1;
        }

        debug!(
            "Drained {} records for block at offset {:#x}",
            written, self.file_offset
        );
        Ok(written)
    }
}

/// Storage block over one region of the backing file
pub struct Block {
    inner: Arc<Inner>,
    config: BlockConfig,
    state: AtomicU8,
    flush_tx: Mutex<Option<Sender<FlushRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Block {
    /// Create a block over an already-open, block-exclusive file handle
    ///
    /// The file is expected to be sized to cover
    /// `file_offset + config.region_len()`; the block never resizes it.
    /// All slots start vacant.
    pub fn new(file: impl Into<SlotFile>, file_offset: u64, config: BlockConfig) -> Result<Self> {
        config.validate()?;

        let inner = Arc::new(Inner {
            allocator: BitMap::new(config.slot_count as usize),
            vacancy: AtomicU32::new(config.slot_count),
            pending: Mutex::new(AHashMap::with_capacity(config.buffer_capacity)),
            file: RwLock::new(Some(file.into())),
            file_offset,
        });

        let (flush_tx, flush_rx) = channel::bounded(config.flush_queue_depth);
        let worker_inner = Arc::clone(&inner);
        let interval = config.flush_interval();
        let worker = thread::Builder::new()
            .name(format!("slotstore-flush-{:#x}", file_offset))
            .spawn(move || run_flush_worker(worker_inner, flush_rx, interval))?;

        info!(
            "Block opened at offset {:#x}: {} slots, flush every {:?}",
            file_offset, config.slot_count, interval
        );

        Ok(Block {
            inner,
            config,
            state: AtomicU8::new(BlockState::Active as u8),
            flush_tx: Mutex::new(Some(flush_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Create a block with [`BlockConfig::default`] (2^20 slots)
    pub fn with_defaults(file: impl Into<SlotFile>, file_offset: u64) -> Result<Self> {
        Self::new(file, file_offset, BlockConfig::default())
    }

    /// Store `value` in a vacant slot and return the slot index
    ///
    /// Values shorter than [`SLOT_SIZE`] are zero-padded; longer values are
    /// rejected. The value is buffered and not durable until a flush.
    pub fn put(&self, value: &[u8]) -> Result<u32> {
        self.ensure_active()?;

        if value.len() > SLOT_SIZE {
            return Err(SlotStoreError::ValueTooLarge {
                len: value.len(),
                max: SLOT_SIZE,
            });
        }

        if self.inner.pending.lock().len() >= self.config.buffer_capacity {
            self.request_flush_sync()?;
        }

        // Advisory only: the CAS below is the real admission gate
        if self.inner.vacancy.load(Ordering::Acquire) == 0 {
            return Err(SlotStoreError::CapacityExhausted);
        }
        if !self.inner.adjust_vacancy(-1) {
            return Err(SlotStoreError::CapacityExhausted);
        }

        let slot = match self.inner.allocator.find_vacant_and_set() {
            Some(index) => index as u32,
            None => {
                self.inner.adjust_vacancy(1);
                warn!(
                    "Vacancy admitted a put but no vacant slot found (block at offset {:#x})",
                    self.inner.file_offset
                );
                return Err(SlotStoreError::CapacityExhausted);
            }
        };

        let mut record = vec![0u8; SLOT_SIZE];
        record[..value.len()].copy_from_slice(value);
        self.inner.pending.lock().insert(slot, record);

        Ok(slot)
    }

    /// Read the record stored in `index`
    ///
    /// Buffered writes are returned before they reach the file. A read that
    /// returns less than a full slot fails with [`SlotStoreError::ShortRead`].
    pub fn get(&self, index: u32) -> Result<Vec<u8>> {
        self.ensure_active()?;
        self.check_index(index)?;

        if let Some(record) = self.inner.pending.lock().get(&index) {
            return Ok(record.clone());
        }

        let offset = self.inner.slot_offset(index);
        let mut buf = vec![0u8; SLOT_SIZE];

        let guard = self.inner.file.read();
        let file = guard.as_ref().ok_or(SlotStoreError::Closed)?;
        let read = file.read_slot_at(offset, &mut buf)?;

        if read != SLOT_SIZE {
            error!(
                "Short read at offset {:#x} (block offset {:#x}, slot {}): {} of {} bytes",
                offset, self.inner.file_offset, index, read, SLOT_SIZE
            );
            return Err(SlotStoreError::ShortRead { offset, index, read });
        }

        Ok(buf)
    }

    /// Free slot `index`
    ///
    /// Any buffered write for the slot is discarded first. Deleting the same
    /// slot twice without a put in between over-counts vacancy; the block
    /// logs it but cannot undo it.
    pub fn delete(&self, index: u32) -> Result<()> {
        self.ensure_active()?;
        self.check_index(index)?;

        self.inner.pending.lock().remove(&index);

        if !self.inner.allocator.set(index as usize, false) {
            warn!(
                "Double delete detected for slot {} (block at offset {:#x})",
                index, self.inner.file_offset
            );
        }
        self.inner.adjust_vacancy(1);

        Ok(())
    }

    /// Ask the flush worker to drain buffered writes, without waiting
    pub fn flush(&self) -> Result<()> {
        self.ensure_active()?;
        let tx = self.sender()?;

        match tx.try_send(FlushRequest { done: None }) {
            // A full queue already holds a drain request
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(SlotStoreError::FlushWorkerGone),
        }
    }

    /// Drain buffered writes and wait for that drain to finish
    ///
    /// Returns the number of records written, or the write error that
    /// stopped the drain (unwritten records stay buffered).
    pub fn flush_sync(&self) -> Result<usize> {
        self.ensure_active()?;
        self.request_flush_sync()
    }

    /// Flush everything, stop the flush worker and release the file handle
    ///
    /// Only the first call does any work; later calls and every other
    /// operation afterwards fail with [`SlotStoreError::Closed`].
    pub fn shutdown(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                BlockState::Active as u8,
                BlockState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(SlotStoreError::Closed);
        }

        let flushed = self.request_flush_sync();

        // Dropping the sender disconnects the worker's receiver
        self.flush_tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!(
                    "Flush worker for block at offset {:#x} panicked",
                    self.inner.file_offset
                );
            }
        }

        // Writes that raced with the first drain
        let stragglers = self.inner.drain();

        self.inner.file.write().take();
        self.state.store(BlockState::Closed as u8, Ordering::Release);

        info!("Block at offset {:#x} closed", self.inner.file_offset);

        flushed?;
        stragglers?;
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> BlockState {
        BlockState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of vacant slots
    pub fn vacancy(&self) -> u32 {
        self.inner.vacancy.load(Ordering::Acquire)
    }

    /// Whether the block still has room
    pub fn is_vacant(&self) -> bool {
        self.vacancy() != 0
    }

    pub fn slot_count(&self) -> u32 {
        self.config.slot_count
    }

    pub fn file_offset(&self) -> u64 {
        self.inner.file_offset
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    /// Number of buffered writes not yet drained
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Whether slot `index` is marked occupied (false when out of range)
    pub fn is_occupied(&self, index: u32) -> bool {
        index < self.config.slot_count && self.inner.allocator.get(index as usize)
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state() {
            BlockState::Active => Ok(()),
            _ => Err(SlotStoreError::Closed),
        }
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.config.slot_count {
            return Err(SlotStoreError::InvalidSlot {
                index,
                slot_count: self.config.slot_count,
            });
        }
        Ok(())
    }

    fn sender(&self) -> Result<Sender<FlushRequest>> {
        self.flush_tx
            .lock()
            .as_ref()
            .cloned()
            .ok_or(SlotStoreError::FlushWorkerGone)
    }

    fn request_flush_sync(&self) -> Result<usize> {
        let tx = self.sender()?;
        let (done_tx, done_rx) = channel::bounded(1);

        tx.send(FlushRequest {
            done: Some(done_tx),
        })
        .map_err(|_| SlotStoreError::FlushWorkerGone)?;

        done_rx
            .recv()
            .map_err(|_| SlotStoreError::FlushWorkerGone)?
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if self.state() == BlockState::Active {
            if let Err(e) = self.shutdown() {
                warn!(
                    "Shutdown on drop of block at offset {:#x} failed: {}",
                    self.inner.file_offset, e
                );
            }
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("file_offset", &self.inner.file_offset)
            .field("slot_count", &self.config.slot_count)
            .field("vacancy", &self.vacancy())
            .field("pending", &self.pending_len())
            .field("state", &self.state())
            .finish()
    }
}

/// Flush worker loop: drain on request or after `interval` of silence
fn run_flush_worker(inner: Arc<Inner>, rx: Receiver<FlushRequest>, interval: Duration) {
    loop {
        match rx.recv_timeout(interval) {
            Ok(FlushRequest { done }) => {
                let result = inner.drain();
                match done {
                    Some(done) => {
                        // The waiter may have given up; nothing to report then
                        let _ = done.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("Requested flush failed, retrying next cycle: {}", e);
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Err(e) = inner.drain() {
                    warn!("Periodic flush failed, retrying next cycle: {}", e);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(
        "Flush worker for block at offset {:#x} stopped",
        inner.file_offset
    );
}
