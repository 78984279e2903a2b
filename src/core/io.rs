//! Positional slot I/O on the backing file
//!
//! Only offset-qualified reads and writes are issued, never seeks, so several
//! handles onto the same file (one per block) do not share cursor state.

use crate::config::SLOT_SIZE;
use crate::error::{Result, SlotStoreError};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;

/// File handle used for fixed-size slot records
#[derive(Debug)]
pub struct SlotFile {
    file: File,
}

impl SlotFile {
    /// Wrap an already-open handle
    pub fn new(file: File) -> Self {
        SlotFile { file }
    }

    /// Create (or reuse) a file and pre-size it to `len` bytes
    pub fn create<P: AsRef<Path>>(path: P, len: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() < len {
            file.set_len(len)?;
        }

        Ok(SlotFile { file })
    }

    /// Open an existing file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(SlotFile { file })
    }

    /// Duplicate the descriptor so another block gets its own handle
    pub fn try_clone(&self) -> Result<Self> {
        Ok(SlotFile {
            file: self.file.try_clone()?,
        })
    }

    /// Read up to `buf.len()` bytes at `offset`
    ///
    /// Keeps reading until the buffer is full or the file ends, and returns the
    /// number of bytes read so the caller can detect a short read.
    pub fn read_slot_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match read_at(&self.file, &mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Write one slot record at `offset`
    pub fn write_slot_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        debug_assert_eq!(data.len(), SLOT_SIZE);
        write_all_at(&self.file, data, offset)
    }

    /// Current file length in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sync all writes to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().map_err(SlotStoreError::Io)
    }
}

impl From<File> for SlotFile {
    fn from(file: File) -> Self {
        SlotFile::new(file)
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    file.read_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    file.seek_read(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    while !data.is_empty() {
        match file.seek_write(data, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole slot",
                ))
            }
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_create_presizes_file() {
        let temp = NamedTempFile::new().unwrap();
        let file = SlotFile::create(temp.path(), 8 * SLOT_SIZE as u64).unwrap();
        assert_eq!(file.len().unwrap(), 8 * SLOT_SIZE as u64);
        assert!(!file.is_empty().unwrap());
    }

    #[test]
    fn test_write_and_read_slot() {
        let temp = NamedTempFile::new().unwrap();
        let file = SlotFile::create(temp.path(), 4 * SLOT_SIZE as u64).unwrap();

        let mut data = vec![0u8; SLOT_SIZE];
        data[0..5].copy_from_slice(b"Hello");
        file.write_slot_at(2 * SLOT_SIZE as u64, &data).unwrap();

        let mut buf = vec![0u8; SLOT_SIZE];
        let n = file.read_slot_at(2 * SLOT_SIZE as u64, &mut buf).unwrap();
        assert_eq!(n, SLOT_SIZE);
        assert_eq!(&buf[0..5], b"Hello");
    }

    #[test]
    fn test_short_read_reports_partial_length() {
        let temp = NamedTempFile::new().unwrap();
        let file = SlotFile::create(temp.path(), SLOT_SIZE as u64 + 100).unwrap();

        let mut buf = vec![0u8; SLOT_SIZE];
        let n = file.read_slot_at(SLOT_SIZE as u64, &mut buf).unwrap();
        assert_eq!(n, 100);

        let n = file.read_slot_at(10 * SLOT_SIZE as u64, &mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_cloned_handles_share_contents() {
        let temp = NamedTempFile::new().unwrap();
        let a = SlotFile::create(temp.path(), 2 * SLOT_SIZE as u64).unwrap();
        let b = a.try_clone().unwrap();

        a.write_slot_at(0, &vec![7u8; SLOT_SIZE]).unwrap();
        b.write_slot_at(SLOT_SIZE as u64, &vec![9u8; SLOT_SIZE]).unwrap();

        let mut buf = vec![0u8; SLOT_SIZE];
        b.read_slot_at(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 7));
        a.read_slot_at(SLOT_SIZE as u64, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 9));
    }

    #[test]
    fn test_open_existing() {
        let temp = NamedTempFile::new().unwrap();
        {
            let file = SlotFile::create(temp.path(), SLOT_SIZE as u64).unwrap();
            file.write_slot_at(0, &vec![3u8; SLOT_SIZE]).unwrap();
            file.sync().unwrap();
        }

        let file = SlotFile::open(temp.path()).unwrap();
        let mut buf = vec![0u8; SLOT_SIZE];
        assert_eq!(file.read_slot_at(0, &mut buf).unwrap(), SLOT_SIZE);
        assert_eq!(buf[0], 3);
    }
}
