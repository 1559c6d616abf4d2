//! The B+-tree engine: recursive insert/delete with split/merge
//! cascades, point lookups, range scans, checkpointing and recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::iter::RangeIter;
use crate::latch::LatchManager;
use crate::merge::{self, ChildIndex};
use crate::node;
use crate::page::internal::InternalPage;
use crate::page::leaf::LeafPage;
use crate::page::PAGE_SIZE;
use crate::pager::Pager;
use crate::split;

#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub num_pages: u32,
    pub num_keys: u64,
    pub read_count: u64,
    pub write_count: u64,
    pub bytes_written: u64,
    pub write_amp: f64,
    pub space_amp: f64,
}

enum InsertResult {
    Done,
    Split { separator_key: Vec<u8>, new_page_id: u32 },
}

/// A disk-backed B+-tree: point `get`/`put`/`delete`, ordered range scans,
/// and crash recovery through a physical write-ahead log.
///
/// Every operation takes the engine's coarse lock: shared for `get`,
/// exclusive for `put`/`delete`/`checkpoint`. Because the bounded page
/// cache needs mutable bookkeeping (LRU timestamps, pin counts) even to
/// serve a read, `get` takes the lock in write mode in this
/// implementation — logically a reader, mechanically serialized with
/// everything else. Callers who need true concurrent readers should use
/// the optional per-page [`LatchManager`] instead of the coarse lock.
pub struct Engine {
    pager: Arc<RwLock<Pager>>,
    order: usize,
    closed: Arc<AtomicBool>,
    latches: Arc<LatchManager>,
}

impl Engine {
    pub fn create(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let pager = Pager::create(&config.data_file(), config.cache_size)?;
        Ok(Engine {
            pager: Arc::new(RwLock::new(pager)),
            order: config.order,
            closed: Arc::new(AtomicBool::new(false)),
            latches: Arc::new(LatchManager::new()),
        })
    }

    pub fn open(config: &Config) -> Result<Self> {
        let pager = Pager::open(&config.data_file(), config.cache_size)?;
        Ok(Engine {
            pager: Arc::new(RwLock::new(pager)),
            order: config.order,
            closed: Arc::new(AtomicBool::new(false)),
            latches: Arc::new(LatchManager::new()),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.check_open()?;
        let mut pager = self.pager.write();
        let mut page_id = pager.root_page_id();
        loop {
            let mut buf = pager.read_page(page_id)?;
            if node::is_leaf(&buf)? {
                let leaf = LeafPage::open(&mut buf)?;
                return leaf.get(key)?.ok_or(Error::KeyNotFound);
            }
            page_id = node::route_child(&mut buf, key)?;
        }
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.check_open()?;
        let mut pager = self.pager.write();
        let root_id = pager.root_page_id();
        match self.insert_recursive(&mut pager, root_id, key, value)? {
            InsertResult::Done => {}
            InsertResult::Split {
                separator_key,
                new_page_id,
            } => {
                let new_root_id = pager.allocate_page()?;
                let mut buf = vec![0u8; PAGE_SIZE];
                let mut root = InternalPage::init(&mut buf, root_id);
                root.insert_separator(&separator_key, new_page_id)?;
                pager.write_page(new_root_id, &buf)?;
                pager.set_root_page_id(new_root_id)?;
            }
        }
        pager.record_user_bytes((key.len() + value.len()) as u64);
        Ok(())
    }

    fn insert_recursive(&self, pager: &mut Pager, page_id: u32, key: &[u8], value: &[u8]) -> Result<InsertResult> {
        let mut buf = pager.read_page(page_id)?;
        if node::is_leaf(&buf)? {
            return self.insert_into_leaf(pager, page_id, &mut buf, key, value);
        }

        let child_id = node::route_child(&mut buf, key)?;
        match self.insert_recursive(pager, child_id, key, value)? {
            InsertResult::Done => Ok(InsertResult::Done),
            InsertResult::Split {
                separator_key,
                new_page_id,
            } => self.insert_separator_into_internal(pager, page_id, &separator_key, new_page_id),
        }
    }

    fn insert_into_leaf(
        &self,
        pager: &mut Pager,
        page_id: u32,
        buf: &mut [u8],
        key: &[u8],
        value: &[u8],
    ) -> Result<InsertResult> {
        let mut leaf = LeafPage::open(buf)?;
        match leaf.put(key, value) {
            Ok(()) => {
                pager.write_page(page_id, buf)?;
                Ok(InsertResult::Done)
            }
            Err(crate::error::PageError::PageFull) => {
                if leaf.num_cells() == 0 {
                    // Not even a single cell fits in an empty page: no split
                    // could help.
                    return Err(Error::ValueTooLarge);
                }
                let result = split::split_leaf(pager, page_id)?;
                let mut target_buf = pager.read_page(page_id)?;
                let mut target = LeafPage::open(&mut target_buf)?;
                let put_result = if key < result.separator_key.as_slice() {
                    let r = target.put(key, value);
                    if r.is_ok() {
                        pager.write_page(page_id, &target_buf)?;
                    }
                    r
                } else {
                    let mut right_buf = pager.read_page(result.new_page_id)?;
                    let mut right = LeafPage::open(&mut right_buf)?;
                    let r = right.put(key, value);
                    if r.is_ok() {
                        pager.write_page(result.new_page_id, &right_buf)?;
                    }
                    r
                };
                match put_result {
                    Ok(()) => Ok(InsertResult::Split {
                        separator_key: result.separator_key,
                        new_page_id: result.new_page_id,
                    }),
                    Err(crate::error::PageError::PageFull) => Err(Error::ValueTooLarge),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn insert_separator_into_internal(
        &self,
        pager: &mut Pager,
        page_id: u32,
        separator_key: &[u8],
        child_id: u32,
    ) -> Result<InsertResult> {
        let mut buf = pager.read_page(page_id)?;
        let mut node = InternalPage::open(&mut buf)?;
        match node.insert_separator(separator_key, child_id) {
            Ok(()) => {
                pager.write_page(page_id, &buf)?;
                Ok(InsertResult::Done)
            }
            Err(crate::error::PageError::PageFull) => {
                if node.num_cells() == 0 {
                    return Err(Error::ValueTooLarge);
                }
                let result = split::split_internal(pager, page_id)?;
                let put_result = if separator_key < result.separator_key.as_slice() {
                    let mut left_buf = pager.read_page(page_id)?;
                    let mut left = InternalPage::open(&mut left_buf)?;
                    let r = left.insert_separator(separator_key, child_id);
                    if r.is_ok() {
                        pager.write_page(page_id, &left_buf)?;
                    }
                    r
                } else {
                    let mut right_buf = pager.read_page(result.new_page_id)?;
                    let mut right = InternalPage::open(&mut right_buf)?;
                    let r = right.insert_separator(separator_key, child_id);
                    if r.is_ok() {
                        pager.write_page(result.new_page_id, &right_buf)?;
                    }
                    r
                };
                match put_result {
                    Ok(()) => Ok(InsertResult::Split {
                        separator_key: result.separator_key,
                        new_page_id: result.new_page_id,
                    }),
                    Err(crate::error::PageError::PageFull) => Err(Error::ValueTooLarge),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyEmpty);
        }
        self.check_open()?;
        let mut pager = self.pager.write();
        let min_cells = merge::min_cells(self.order);
        let root_id = pager.root_page_id();
        let found = self.delete_recursive(&mut pager, root_id, key, min_cells)?;

        // Root-collapse: an internal root with no separators left has
        // exactly one child; promote that child to root so the tree
        // doesn't carry a dead single-child level forever. The root is
        // otherwise never required to stay above the underflow floor.
        let mut root_buf = pager.read_page(root_id)?;
        if !node::is_leaf(&root_buf)? {
            let root_node = InternalPage::open(&mut root_buf)?;
            if root_node.num_cells() == 0 {
                let only_child = root_node.leftmost_child();
                pager.set_root_page_id(only_child)?;
            }
        }

        if found {
            Ok(())
        } else {
            Err(Error::KeyNotFound)
        }
    }

    fn delete_recursive(&self, pager: &mut Pager, page_id: u32, key: &[u8], min_cells: usize) -> Result<bool> {
        let mut buf = pager.read_page(page_id)?;
        if node::is_leaf(&buf)? {
            let mut leaf = LeafPage::open(&mut buf)?;
            let found = leaf.delete(key)?;
            if found {
                pager.write_page(page_id, &buf)?;
            }
            return Ok(found);
        }

        let internal = InternalPage::open(&mut buf)?;
        let child_index: ChildIndex = internal.route_index_for_key(key)?;
        let child_id = match child_index {
            Some(i) => internal.child_at(i)?,
            None => internal.leftmost_child(),
        };
        let child_buf = pager.read_page(child_id)?;
        let child_is_leaf = node::is_leaf(&child_buf)?;

        let found = self.delete_recursive(pager, child_id, key, min_cells)?;

        if found && child_is_leaf {
            merge::rebalance_leaf(pager, page_id, child_index, min_cells)?;
        }

        Ok(found)
    }

    /// Returns every `(key, value)` pair with `start <= key < end`, in
    /// order. Collected eagerly under the engine lock: there is no
    /// snapshot isolation, so a long scan concurrent with writers could
    /// in principle see a mix of old and new state, but never a torn or
    /// out-of-bounds read.
    pub fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_open()?;
        let mut pager = self.pager.write();
        let iter = RangeIter::new(&mut pager, start, end)?;
        iter.collect()
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.check_open()?;
        self.pager.write().checkpoint()
    }

    pub fn sync(&self) -> Result<()> {
        self.check_open()?;
        self.pager.write().sync()
    }

    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.pager.write().close()
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.check_open()?;
        let mut pager = self.pager.write();
        let s = pager.stats();
        let (num_keys, live_bytes) = self.count_live(&mut pager)?;

        let write_amp = if s.user_bytes_written == 0 {
            1.0
        } else {
            s.bytes_written as f64 / s.user_bytes_written as f64
        };
        let space_amp = if live_bytes == 0 {
            1.0
        } else {
            (pager.num_pages() as u64 * PAGE_SIZE as u64) as f64 / live_bytes as f64
        };

        Ok(EngineStats {
            num_pages: pager.num_pages(),
            num_keys,
            read_count: s.read_count,
            write_count: s.write_count,
            bytes_written: s.bytes_written,
            write_amp,
            space_amp,
        })
    }

    /// Walks every leaf left to right, returning `(num_keys, live_bytes)`
    /// where `live_bytes` sums every live key's and value's length.
    fn count_live(&self, pager: &mut Pager) -> Result<(u64, u64)> {
        let mut page_id = pager.root_page_id();
        loop {
            let mut buf = pager.read_page(page_id)?;
            if node::is_leaf(&buf)? {
                break;
            }
            let internal = InternalPage::open(&mut buf)?;
            page_id = internal.leftmost_child();
        }

        let mut num_keys = 0u64;
        let mut live_bytes = 0u64;
        loop {
            if page_id == crate::page::NONE_PAGE {
                break;
            }
            let mut buf = pager.read_page(page_id)?;
            let leaf = LeafPage::open(&mut buf)?;
            for (k, v) in leaf.entries()? {
                num_keys += 1;
                live_bytes += (k.len() + v.len()) as u64;
            }
            page_id = leaf.next_leaf();
        }
        Ok((num_keys, live_bytes))
    }

    /// Exposes the optional per-page latch manager for callers that want
    /// finer-grained concurrency than the coarse lock provides.
    pub fn latches(&self) -> Arc<LatchManager> {
        self.latches.clone()
    }

}
