//! Leaf-page convenience API layered on top of the generic slotted [`Page`].

use super::{Cell, Page, PageType, NONE_PAGE};
use crate::error::PageError;

pub struct LeafPage<'a> {
    page: Page<'a>,
}

impl<'a> LeafPage<'a> {
    pub fn init(buf: &'a mut [u8]) -> Self {
        LeafPage {
            page: Page::init(buf, PageType::Leaf, NONE_PAGE),
        }
    }

    pub fn open(buf: &'a mut [u8]) -> Result<Self, PageError> {
        let page = Page::open(buf)?;
        if page.page_type() != PageType::Leaf {
            return Err(PageError::Corrupt("expected a leaf page".into()));
        }
        Ok(LeafPage { page })
    }

    /// The successor leaf's page id, or `NONE_PAGE` if this is the
    /// rightmost leaf.
    pub fn next_leaf(&self) -> u32 {
        self.page.right_ptr()
    }

    pub fn set_next_leaf(&mut self, page_id: u32) {
        self.page.set_right_ptr(page_id);
    }

    pub fn num_cells(&self) -> u16 {
        self.page.num_cells()
    }

    pub fn key_at(&self, index: u16) -> Result<Vec<u8>, PageError> {
        Ok(self.page.cell(index)?.key().to_vec())
    }

    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, PageError> {
        self.page
            .cells()?
            .into_iter()
            .map(|c| match c {
                Cell::Leaf { key, value } => Ok((key, value)),
                Cell::Internal { .. } => unreachable!("leaf page holds only leaf cells"),
            })
            .collect()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PageError> {
        match self.page.find_key(key)? {
            Ok(idx) => match self.page.cell(idx)? {
                Cell::Leaf { value, .. } => Ok(Some(value)),
                Cell::Internal { .. } => unreachable!(),
            },
            Err(_) => Ok(None),
        }
    }

    /// Inserts or overwrites `key`. Returns `PageFull` (after an internal
    /// compaction attempt) if there still isn't room; the caller should
    /// split and retry.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), PageError> {
        let cell = Cell::Leaf {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        match self.page.find_key(key)? {
            Ok(idx) => {
                self.page.delete_at(idx);
                if self.page.insert_at(idx, &cell).is_ok() {
                    return Ok(());
                }
                self.page.compact()?;
                self.page.insert_at(idx, &cell)
            }
            Err(idx) => {
                if self.page.insert_at(idx, &cell).is_ok() {
                    return Ok(());
                }
                self.page.compact()?;
                self.page.insert_at(idx, &cell)
            }
        }
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<bool, PageError> {
        match self.page.find_key(key)? {
            Ok(idx) => {
                self.page.delete_at(idx);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    pub fn rebuild(&mut self, next_leaf: u32, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), PageError> {
        let cells: Vec<Cell> = entries
            .iter()
            .map(|(k, v)| Cell::Leaf {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        self.page.rebuild(PageType::Leaf, next_leaf, &cells)
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
    fn put_get_delete_roundtrip() {
        let mut raw = vec![0u8; PAGE_SIZE];
        let mut leaf = LeafPage::init(&mut raw);
        leaf.put(b"b", b"2").unwrap();
        leaf.put(b"a", b"1").unwrap();
        leaf.put(b"c", b"3").unwrap();
        assert_eq!(leaf.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(leaf.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(leaf.get(b"z").unwrap(), None);
        assert!(leaf.delete(b"b").unwrap());
        assert_eq!(leaf.get(b"b").unwrap(), None);
        assert_eq!(leaf.num_cells(), 2);
    }

    #[test]
    fn put_overwrite_updates_value() {
        let mut raw = vec![0u8; PAGE_SIZE];
        let mut leaf = LeafPage::init(&mut raw);
        leaf.put(b"k", b"1").unwrap();
        leaf.put(b"k", b"22").unwrap();
        assert_eq!(leaf.get(b"k").unwrap(), Some(b"22".to_vec()));
        assert_eq!(leaf.num_cells(), 1);
    }

    #[test]
    fn linked_list_pointer_round_trips() {
        let mut raw = vec![0u8; PAGE_SIZE];
        let mut leaf = LeafPage::init(&mut raw);
        assert_eq!(leaf.next_leaf(), super::NONE_PAGE);
        leaf.set_next_leaf(42);
        assert_eq!(leaf.next_leaf(), 42);
    }
}
