//! Physical, whole-page-image write-ahead log.
//!
//! Every mutation to a page is logged here, as the page's full post-
//! mutation bytes, before the page is written to the data file. Recovery
//! replays the log by overwriting page bytes directly — it never
//! re-executes `put`/`delete`. A torn tail (a record whose length or CRC
//! doesn't check out) ends replay at that point rather than failing it;
//! a WAL is written incrementally and the last record is exactly the one
//! a crash is most likely to have interrupted.
//!
//! File layout:
//! ```text
//! header: magic "BWAL" (4 bytes) | version: u32 LE
//! record: type: u8 | page_id: u32 LE | offset: u32 LE | length: u32 LE
//!         | data[length] | crc32: u32 LE
//! ```
//! All integers are little-endian. `crc32` covers `type | page_id |
//! offset | length | data`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::page::PAGE_SIZE;

pub const MAGIC: &[u8; 4] = b"BWAL";
pub const VERSION: u32 = 1;
const HEADER_LEN: u64 = 8;

const RECORD_PAGE_WRITE: u8 = 1;
const RECORD_CHECKPOINT: u8 = 2;
#[allow(dead_code)]
const RECORD_RESERVED: u8 = 3;
const RECORD_ROOT_CHANGE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    PageWrite { page_id: u32, offset: u32, data: Vec<u8> },
    Checkpoint,
    RootChange { root_page_id: u32 },
}

pub struct Wal {
    file: File,
    path: PathBuf,
}

impl Wal {
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.write_all(MAGIC)?;
        file.write_u32::<LittleEndian>(VERSION)?;
        file.sync_all()?;
        Ok(Wal {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::InvalidDatabase("bad WAL magic".into()));
        }
        let version = file.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::InvalidDatabase(format!(
                "unsupported WAL version {version}"
            )));
        }
        Ok(Wal {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn create_or_open(path: &Path) -> Result<Self> {
        if path.exists() {
            Wal::open(path)
        } else {
            Wal::create(path)
        }
    }

    fn append_record(&mut self, record_type: u8, page_id: u32, offset: u32, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;

        let mut hasher = Hasher::new();
        hasher.update(&[record_type]);
        hasher.update(&page_id.to_le_bytes());
        hasher.update(&offset.to_le_bytes());
        hasher.update(&(data.len() as u32).to_le_bytes());
        hasher.update(data);
        let crc = hasher.finalize();

        self.file.write_u8(record_type)?;
        self.file.write_u32::<LittleEndian>(page_id)?;
        self.file.write_u32::<LittleEndian>(offset)?;
        self.file.write_u32::<LittleEndian>(data.len() as u32)?;
        self.file.write_all(data)?;
        self.file.write_u32::<LittleEndian>(crc)?;
        Ok(())
    }

    pub fn log_page_write(&mut self, page_id: u32, page_image: &[u8]) -> Result<()> {
        debug_assert_eq!(page_image.len(), PAGE_SIZE);
        self.append_record(RECORD_PAGE_WRITE, page_id, 0, page_image)
    }

    pub fn log_checkpoint(&mut self) -> Result<()> {
        self.append_record(RECORD_CHECKPOINT, 0, 0, &[])
    }

    pub fn log_root_change(&mut self, root_page_id: u32) -> Result<()> {
        self.append_record(RECORD_ROOT_CHANGE, 0, 0, &root_page_id.to_le_bytes())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Truncates the log back to just its header, for use right after a
    /// successful checkpoint.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(HEADER_LEN)?;
        self.file.seek(SeekFrom::Start(HEADER_LEN))?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Replays every well-formed record in order, stopping silently at
    /// the first torn or short record.
    pub fn replay(&mut self) -> Result<Vec<WalRecord>> {
        self.file.seek(SeekFrom::Start(HEADER_LEN))?;
        let mut records = Vec::new();
        loop {
            match self.read_one_record() {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(TornRead) => {
                    warn!("WAL replay stopped at a torn tail record");
                    break;
                }
            }
        }
        debug!("WAL replay recovered {} record(s)", records.len());
        Ok(records)
    }

    fn read_one_record(&mut self) -> std::result::Result<Option<WalRecord>, TornRead> {
        let record_type = match self.file.read_u8() {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(_) => return Err(TornRead),
        };
        let page_id = self.file.read_u32::<LittleEndian>().map_err(|_| TornRead)?;
        let offset = self.file.read_u32::<LittleEndian>().map_err(|_| TornRead)?;
        let length = self.file.read_u32::<LittleEndian>().map_err(|_| TornRead)?;
        let mut data = vec![0u8; length as usize];
        self.file.read_exact(&mut data).map_err(|_| TornRead)?;
        let stored_crc = self.file.read_u32::<LittleEndian>().map_err(|_| TornRead)?;

        let mut hasher = Hasher::new();
        hasher.update(&[record_type]);
        hasher.update(&page_id.to_le_bytes());
        hasher.update(&offset.to_le_bytes());
        hasher.update(&length.to_le_bytes());
        hasher.update(&data);
        if hasher.finalize() != stored_crc {
            return Err(TornRead);
        }

        let record = match record_type {
            RECORD_PAGE_WRITE => WalRecord::PageWrite {
                page_id,
                offset,
                data,
            },
            RECORD_CHECKPOINT => WalRecord::Checkpoint,
            RECORD_ROOT_CHANGE => {
                if data.len() != 4 {
                    return Err(TornRead);
                }
                let root_page_id = u32::from_le_bytes(data[..4].try_into().unwrap());
                WalRecord::RootChange { root_page_id }
            }
            _ => return Err(TornRead),
        };
        Ok(Some(record))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct TornRead;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replay_recovers_page_writes_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::create(&path).unwrap();
        wal.log_page_write(1, &[1u8; PAGE_SIZE]).unwrap();
        wal.log_page_write(2, &[2u8; PAGE_SIZE]).unwrap();
        wal.log_checkpoint().unwrap();
        wal.sync().unwrap();

        let mut reopened = Wal::open(&path).unwrap();
        let records = reopened.replay().unwrap();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], WalRecord::PageWrite { page_id: 1, .. }));
        assert!(matches!(records[1], WalRecord::PageWrite { page_id: 2, .. }));
        assert!(matches!(records[2], WalRecord::Checkpoint));
    }

    #[test]
    fn replay_tolerates_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::create(&path).unwrap();
        wal.log_page_write(1, &[1u8; PAGE_SIZE]).unwrap();
        wal.sync().unwrap();
        // Simulate a crash mid-write: append a few bytes of a second
        // record and nothing else.
        wal.file.write_all(&[RECORD_PAGE_WRITE]).unwrap();
        wal.file.write_all(&[0, 0]).unwrap();
        wal.sync().unwrap();

        let mut reopened = Wal::open(&path).unwrap();
        let records = reopened.replay().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn truncate_resets_to_header_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::create(&path).unwrap();
        wal.log_page_write(1, &[1u8; PAGE_SIZE]).unwrap();
        wal.truncate().unwrap();
        let records = wal.replay().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn root_change_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::create(&path).unwrap();
        wal.log_root_change(7).unwrap();
        wal.sync().unwrap();
        let mut reopened = Wal::open(&path).unwrap();
        let records = reopened.replay().unwrap();
        assert_eq!(records, vec![WalRecord::RootChange { root_page_id: 7 }]);
    }
}
