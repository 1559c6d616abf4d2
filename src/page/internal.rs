//! Internal-page convenience API.
//!
//! Routing convention (load-bearing, see `node::route_child`): cell `i`
//! holds separator key `K_i` and child `P_i`, and `P_i` holds keys
//! `>= K_i`. `right_ptr` holds keys less than the smallest separator
//! `K_0`. The child for a query key `q` is the child of the largest index
//! `i` with `q >= K_i`, or `right_ptr` if no such index exists.

use super::{Cell, Page, PageType};
use crate::error::PageError;

pub struct InternalPage<'a> {
    page: Page<'a>,
}

impl<'a> InternalPage<'a> {
    pub fn init(buf: &'a mut [u8], leftmost_child: u32) -> Self {
        InternalPage {
            page: Page::init(buf, PageType::Internal, leftmost_child),
        }
    }

    pub fn open(buf: &'a mut [u8]) -> Result<Self, PageError> {
        let page = Page::open(buf)?;
        if page.page_type() != PageType::Internal {
            return Err(PageError::Corrupt("expected an internal page".into()));
        }
        Ok(InternalPage { page })
    }

    /// The child holding keys less than the smallest separator.
    pub fn leftmost_child(&self) -> u32 {
        self.page.right_ptr()
    }

    pub fn set_leftmost_child(&mut self, child: u32) {
        self.page.set_right_ptr(child);
    }

    pub fn num_cells(&self) -> u16 {
        self.page.num_cells()
    }

    pub fn key_at(&self, index: u16) -> Result<Vec<u8>, PageError> {
        Ok(self.page.cell(index)?.key().to_vec())
    }

    pub fn child_at(&self, index: u16) -> Result<u32, PageError> {
        match self.page.cell(index)? {
            Cell::Internal { child, .. } => Ok(child),
            Cell::Leaf { .. } => unreachable!("internal page holds only internal cells"),
        }
    }

    pub fn entries(&self) -> Result<Vec<(Vec<u8>, u32)>, PageError> {
        self.page
            .cells()?
            .into_iter()
            .map(|c| match c {
                Cell::Internal { key, child } => Ok((key, child)),
                Cell::Leaf { .. } => unreachable!(),
            })
            .collect()
    }

    /// The cell index whose child `key` routes to, or `None` for
    /// `leftmost_child` (see module docs for the routing convention).
    pub fn route_index_for_key(&self, key: &[u8]) -> Result<Option<u16>, PageError> {
        let n = self.num_cells();
        if n == 0 {
            return Ok(None);
        }
        // Largest index i with key >= K_i, via binary search over the
        // monotonically increasing separator keys.
        let mut lo = 0u16;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let k = self.key_at(mid)?;
            if key.as_ref() < k.as_slice() {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        if lo == 0 {
            Ok(None)
        } else {
            Ok(Some(lo - 1))
        }
    }

    /// Resolves the routing child for `key`.
    pub fn child_for_key(&self, key: &[u8]) -> Result<u32, PageError> {
        match self.route_index_for_key(key)? {
            Some(i) => self.child_at(i),
            None => Ok(self.leftmost_child()),
        }
    }

    /// Inserts separator `key` routing to `child`, keeping separators
    /// sorted. Fails with `PageFull` (after a compaction attempt) if there
    /// is no room; the caller should split and retry.
    pub fn insert_separator(&mut self, key: &[u8], child: u32) -> Result<(), PageError> {
        let idx = match self.page.find_key(key)? {
            Ok(i) => i,
            Err(i) => i,
        };
        let cell = Cell::Internal {
            key: key.to_vec(),
            child,
        };
        if self.page.insert_at(idx, &cell).is_ok() {
            return Ok(());
        }
        self.page.compact()?;
        self.page.insert_at(idx, &cell)
    }

    pub fn delete_separator(&mut self, key: &[u8]) -> Result<bool, PageError> {
        match self.page.find_key(key)? {
            Ok(idx) => {
                self.page.delete_at(idx);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    pub fn rebuild(&mut self, leftmost_child: u32, entries: &[(Vec<u8>, u32)]) -> Result<(), PageError> {
        let cells: Vec<Cell> = entries
            .iter()
            .map(|(k, c)| Cell::Internal {
                key: k.clone(),
                child: *c,
            })
            .collect();
        self.page.rebuild(PageType::Internal, leftmost_child, &cells)
    }

    pub fn free_space(&self) -> usize {
        self.page.free_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PAGE_SIZE;

    #[test]
    fn routes_to_leftmost_child_below_smallest_key() {
        let mut raw = vec![0u8; PAGE_SIZE];
        let mut node = InternalPage::init(&mut raw, 1);
        node.insert_separator(b"m", 2).unwrap();
        node.insert_separator(b"t", 3).unwrap();
        assert_eq!(node.child_for_key(b"a").unwrap(), 1);
        assert_eq!(node.child_for_key(b"m").unwrap(), 2);
        assert_eq!(node.child_for_key(b"q").unwrap(), 2);
        assert_eq!(node.child_for_key(b"t").unwrap(), 3);
        assert_eq!(node.child_for_key(b"zz").unwrap(), 3);
    }
}
