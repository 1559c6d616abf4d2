//! Bounded LRU page cache with dirty tracking and pin/unpin semantics.
//!
//! The cache never decides *how* to write a page back to disk; eviction
//! and flush take a caller-supplied closure so `Pager` stays the only
//! place that knows about file offsets and the WAL.

use std::collections::HashMap;

use crate::error::Error;
use crate::page::PAGE_SIZE;

pub struct CacheConfig {
    pub capacity_pages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity_pages: 50_000,
        }
    }
}

pub struct CacheEntry {
    pub page_id: u32,
    pub payload: Vec<u8>,
    pub dirty: bool,
    pin_count: u32,
    last_access: u64,
}

pub struct PageCache {
    config: CacheConfig,
    entries: HashMap<u32, CacheEntry>,
    access_counter: u64,
}

impl PageCache {
    pub fn new(config: CacheConfig) -> Self {
        PageCache {
            config,
            entries: HashMap::new(),
            access_counter: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity_pages
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.config.capacity_pages
    }

    pub fn contains(&self, page_id: u32) -> bool {
        self.entries.contains_key(&page_id)
    }

    fn next_access(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    pub fn get(&mut self, page_id: u32) -> Option<&CacheEntry> {
        let access = self.next_access();
        if let Some(entry) = self.entries.get_mut(&page_id) {
            entry.last_access = access;
        }
        self.entries.get(&page_id)
    }

    pub fn get_mut(&mut self, page_id: u32) -> Option<&mut CacheEntry> {
        let access = self.next_access();
        let entry = self.entries.get_mut(&page_id)?;
        entry.last_access = access;
        Some(entry)
    }

    /// Inserts a freshly-read or freshly-allocated page. The caller must
    /// have already evicted room via `evict_if_full`.
    pub fn insert(&mut self, page_id: u32, payload: Vec<u8>, dirty: bool) {
        debug_assert_eq!(payload.len(), PAGE_SIZE);
        let access = self.next_access();
        self.entries.insert(
            page_id,
            CacheEntry {
                page_id,
                payload,
                dirty,
                pin_count: 0,
                last_access: access,
            },
        );
    }

    pub fn remove(&mut self, page_id: u32) -> Option<CacheEntry> {
        self.entries.remove(&page_id)
    }

    pub fn pin(&mut self, page_id: u32) {
        if let Some(e) = self.entries.get_mut(&page_id) {
            e.pin_count += 1;
        }
    }

    pub fn unpin(&mut self, page_id: u32) {
        if let Some(e) = self.entries.get_mut(&page_id) {
            e.pin_count = e.pin_count.saturating_sub(1);
        }
    }

    pub fn mark_dirty(&mut self, page_id: u32) {
        if let Some(e) = self.entries.get_mut(&page_id) {
            e.dirty = true;
        }
    }

    /// Finds the least-recently-used entry with no outstanding pins.
    fn lru_unpinned(&self) -> Option<u32> {
        self.entries
            .values()
            .filter(|e| e.pin_count == 0)
            .min_by_key(|e| e.last_access)
            .map(|e| e.page_id)
    }

    /// Evicts room for one more page if the cache is at capacity, writing
    /// back the victim via `write_back` if it is dirty. No-op if the
    /// cache has free capacity.
    pub fn evict_if_full<F>(&mut self, mut write_back: F) -> Result<(), Error>
    where
        F: FnMut(u32, &[u8]) -> Result<(), Error>,
    {
        if !self.is_full() {
            return Ok(());
        }
        let victim = self.lru_unpinned().ok_or_else(|| {
            Error::Corrupt("page cache is full and every page is pinned".into())
        })?;
        let entry = self.entries.remove(&victim).expect("victim came from entries");
        if entry.dirty {
            write_back(entry.page_id, &entry.payload)?;
        }
        Ok(())
    }

    /// Flushes every dirty page via `write_back`, clearing the dirty bit
    /// on success. Errors if any dirty page is still pinned.
    pub fn flush<F>(&mut self, mut write_back: F) -> Result<(), Error>
    where
        F: FnMut(u32, &[u8]) -> Result<(), Error>,
    {
        for entry in self.entries.values() {
            if entry.dirty && entry.pin_count > 0 {
                return Err(Error::Corrupt(format!(
                    "cannot flush pinned dirty page {}",
                    entry.page_id
                )));
            }
        }
        for entry in self.entries.values_mut() {
            if entry.dirty {
                write_back(entry.page_id, &entry.payload)?;
                entry.dirty = false;
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}
