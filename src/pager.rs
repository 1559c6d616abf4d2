//! Page allocation, the metadata page, and WAL-coordinated durability.
//!
//! Page 0 is reserved for file metadata:
//! ```text
//! offset 0..4    magic          u32 BE  (0x4254_5245, "BTRE")
//! offset 4..8    root_page_id   u32 BE
//! offset 8..12   num_pages      u32 BE
//! offset 12..16  free_list_ptr  u32 BE  (reserved, always 0)
//! ```
//! The rest of page 0 is unused padding.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::info;

use crate::cache::{CacheConfig, PageCache};
use crate::error::{Error, Result};
use crate::page::PAGE_SIZE;
use crate::wal::{Wal, WalRecord};

pub const META_MAGIC: u32 = 0x4254_5245;
pub const META_PAGE_ID: u32 = 0;

#[derive(Debug, Default, Clone, Copy)]
pub struct PagerStats {
    pub bytes_written: u64,
    pub read_count: u64,
    pub write_count: u64,
    /// Raw key+value bytes passed to `Put`, independent of how many page
    /// bytes that turned into on disk. Used to derive write amplification.
    pub user_bytes_written: u64,
}

struct Metadata {
    root_page_id: u32,
    num_pages: u32,
    free_list_ptr: u32,
    dirty: bool,
}

impl Metadata {
    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_SIZE];
        BigEndian::write_u32(&mut buf[0..4], META_MAGIC);
        BigEndian::write_u32(&mut buf[4..8], self.root_page_id);
        BigEndian::write_u32(&mut buf[8..12], self.num_pages);
        BigEndian::write_u32(&mut buf[12..16], self.free_list_ptr);
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 16 {
            return Err(Error::InvalidDatabase("metadata page too short".into()));
        }
        let magic = BigEndian::read_u32(&buf[0..4]);
        if magic != META_MAGIC {
            return Err(Error::InvalidDatabase("bad metadata magic".into()));
        }
        Ok(Metadata {
            root_page_id: BigEndian::read_u32(&buf[4..8]),
            num_pages: BigEndian::read_u32(&buf[8..12]),
            free_list_ptr: BigEndian::read_u32(&buf[12..16]),
            dirty: false,
        })
    }
}

pub struct Pager {
    file: File,
    wal: Wal,
    cache: PageCache,
    meta: Metadata,
    stats: PagerStats,
}

fn wal_path(data_path: &Path) -> PathBuf {
    let mut p = data_path.to_path_buf();
    let mut name = p.file_name().unwrap_or_default().to_os_string();
    name.push(".wal");
    p.set_file_name(name);
    p
}

impl Pager {
    pub fn create(path: &Path, cache_size: usize) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;

        // Page 0 is metadata; page 1 is the initial empty root leaf.
        let meta = Metadata {
            root_page_id: 1,
            num_pages: 2,
            free_list_ptr: 0,
            dirty: true,
        };
        file.write_all(&meta.encode())?;
        let mut root_buf = vec![0u8; PAGE_SIZE];
        crate::page::leaf::LeafPage::init(&mut root_buf);
        file.write_all(&root_buf)?;
        file.sync_all()?;

        let wal = Wal::create(&wal_path(path))?;

        Ok(Pager {
            file,
            wal,
            cache: PageCache::new(CacheConfig {
                capacity_pages: cache_size,
            }),
            meta,
            stats: PagerStats::default(),
        })
    }

    pub fn open(path: &Path, cache_size: usize) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut meta_buf = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut meta_buf)?;
        let meta = Metadata::decode(&meta_buf)?;

        let wal = Wal::create_or_open(&wal_path(path))?;

        let mut pager = Pager {
            file,
            wal,
            cache: PageCache::new(CacheConfig {
                capacity_pages: cache_size,
            }),
            meta,
            stats: PagerStats::default(),
        };
        pager.recover()?;
        Ok(pager)
    }

    fn recover(&mut self) -> Result<()> {
        let records = self.wal.replay()?;
        if records.is_empty() {
            return Ok(());
        }
        info!("replaying {} WAL record(s)", records.len());
        for record in records {
            match record {
                WalRecord::PageWrite { page_id, data, .. } => {
                    self.write_page_to_file(page_id, &data)?;
                    if page_id >= self.meta.num_pages {
                        // The metadata page may predate this allocation if
                        // the crash happened before it was last persisted.
                        self.meta.num_pages = page_id + 1;
                        self.meta.dirty = true;
                    }
                }
                WalRecord::RootChange { root_page_id } => {
                    self.meta.root_page_id = root_page_id;
                    self.meta.dirty = true;
                }
                WalRecord::Checkpoint => {}
            }
        }
        self.file.sync_all()?;
        self.persist_metadata()?;
        self.wal.log_checkpoint()?;
        self.wal.sync()?;
        self.wal.truncate()?;
        Ok(())
    }

    fn page_offset(page_id: u32) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }

    fn write_page_to_file(&mut self, page_id: u32, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.write_all(data)?;
        self.stats.bytes_written += PAGE_SIZE as u64;
        Ok(())
    }

    fn read_page_from_file(&mut self, page_id: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a page, consulting the cache first.
    pub fn read_page(&mut self, page_id: u32) -> Result<Vec<u8>> {
        if let Some(entry) = self.cache.get(page_id) {
            return Ok(entry.payload.clone());
        }
        self.stats.read_count += 1;
        let data = self.read_page_from_file(page_id)?;
        let file = &mut self.file;
        self.cache.evict_if_full(|id, bytes| {
            file.seek(SeekFrom::Start(Self::page_offset(id)))?;
            file.write_all(bytes)?;
            Ok(())
        })?;
        self.cache.insert(page_id, data.clone(), false);
        Ok(data)
    }

    /// Writes the full new image of `page_id`, logging it to the WAL
    /// before it becomes visible to eviction.
    pub fn write_page(&mut self, page_id: u32, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        self.wal.log_page_write(page_id, data)?;
        self.stats.write_count += 1;
        if !self.cache.contains(page_id) {
            let file = &mut self.file;
            self.cache.evict_if_full(|id, bytes| {
                file.seek(SeekFrom::Start(Self::page_offset(id)))?;
                file.write_all(bytes)?;
                Ok(())
            })?;
        }
        self.cache.insert(page_id, data.to_vec(), true);
        Ok(())
    }

    /// Records raw user-supplied key+value bytes for a single `Put`, for
    /// write-amplification reporting. Does not touch the page cache.
    pub fn record_user_bytes(&mut self, n: u64) {
        self.stats.user_bytes_written += n;
    }

    pub fn allocate_page(&mut self) -> Result<u32> {
        let id = self.meta.num_pages;
        self.meta.num_pages += 1;
        self.meta.dirty = true;
        Ok(id)
    }

    pub fn num_pages(&self) -> u32 {
        self.meta.num_pages
    }

    pub fn root_page_id(&self) -> u32 {
        self.meta.root_page_id
    }

    pub fn set_root_page_id(&mut self, page_id: u32) -> Result<()> {
        self.wal.log_root_change(page_id)?;
        self.meta.root_page_id = page_id;
        self.meta.dirty = true;
        Ok(())
    }

    fn persist_metadata(&mut self) -> Result<()> {
        if !self.meta.dirty {
            return Ok(());
        }
        let buf = self.meta.encode();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        self.meta.dirty = false;
        Ok(())
    }

    /// Flushes every dirty cached page and the metadata page, then
    /// fsyncs the data file. Does not touch the WAL.
    pub fn flush(&mut self) -> Result<()> {
        let file = &mut self.file;
        let stats = &mut self.stats;
        self.cache.flush(|id, bytes| {
            file.seek(SeekFrom::Start(Self::page_offset(id)))?;
            file.write_all(bytes)?;
            stats.bytes_written += PAGE_SIZE as u64;
            Ok(())
        })?;
        self.persist_metadata()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Full durability sequence: fsync the WAL, flush pages, write a
    /// checkpoint record, fsync the WAL again, then truncate it.
    pub fn sync(&mut self) -> Result<()> {
        self.wal.sync()?;
        self.flush()?;
        self.wal.log_checkpoint()?;
        self.wal.sync()?;
        self.wal.truncate()?;
        Ok(())
    }

    /// Alias for `sync`, kept for callers that think in terms of
    /// checkpointing rather than durability.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.sync()
    }

    pub fn close(&mut self) -> Result<()> {
        self.sync()
    }

    pub fn stats(&self) -> PagerStats {
        self.stats
    }
}
