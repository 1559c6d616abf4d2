//! Page overflow handling: leaf split, internal split, and (at the
//! engine layer) root split.
//!
//! Internal split promotes the middle separator upward. Given the
//! routing convention (`right_ptr` holds keys below the smallest
//! separator, cell `i`'s child holds keys `>= K_i`), the promoted cell's
//! child becomes the *new sibling's* `right_ptr`, since every key it
//! holds is still less than the new sibling's smallest remaining
//! separator.

use crate::error::Result;
use crate::page::internal::InternalPage;
use crate::page::leaf::LeafPage;
use crate::page::PAGE_SIZE;
use crate::pager::Pager;

pub struct LeafSplitResult {
    pub new_page_id: u32,
    pub separator_key: Vec<u8>,
}

pub fn split_leaf(pager: &mut Pager, page_id: u32) -> Result<LeafSplitResult> {
    let mut buf = pager.read_page(page_id)?;
    let (entries, next_leaf) = {
        let leaf = LeafPage::open(&mut buf)?;
        (leaf.entries()?, leaf.next_leaf())
    };

    let mid = entries.len() / 2;
    let (left, right) = entries.split_at(mid);
    let separator_key = right[0].0.clone();

    let new_page_id = pager.allocate_page()?;

    let mut right_buf = vec![0u8; PAGE_SIZE];
    let mut right_page = LeafPage::init(&mut right_buf);
    right_page.rebuild(next_leaf, right)?;
    pager.write_page(new_page_id, &right_buf)?;

    let mut left_page = LeafPage::init(&mut buf);
    left_page.rebuild(new_page_id, left)?;
    pager.write_page(page_id, &buf)?;

    Ok(LeafSplitResult {
        new_page_id,
        separator_key,
    })
}

pub struct InternalSplitResult {
    pub new_page_id: u32,
    pub separator_key: Vec<u8>,
}

pub fn split_internal(pager: &mut Pager, page_id: u32) -> Result<InternalSplitResult> {
    let mut buf = pager.read_page(page_id)?;
    let (leftmost, entries) = {
        let node = InternalPage::open(&mut buf)?;
        (node.leftmost_child(), node.entries()?)
    };

    let mid = entries.len() / 2;
    let promoted = entries[mid].clone();
    let left_entries = &entries[..mid];
    let right_entries = &entries[mid + 1..];

    let new_page_id = pager.allocate_page()?;

    let mut right_buf = vec![0u8; PAGE_SIZE];
    let mut right_page = InternalPage::init(&mut right_buf, promoted.1);
    right_page.rebuild(promoted.1, right_entries)?;
    pager.write_page(new_page_id, &right_buf)?;

    let mut left_page = InternalPage::init(&mut buf, leftmost);
    left_page.rebuild(leftmost, left_entries)?;
    pager.write_page(page_id, &buf)?;

    Ok(InternalSplitResult {
        new_page_id,
        separator_key: promoted.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::NONE_PAGE;
    use tempfile::tempdir;

    fn new_pager() -> (tempfile::TempDir, Pager) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pager = Pager::create(&path, 64).unwrap();
        (dir, pager)
    }

    #[test]
    fn leaf_split_distributes_entries_and_links_siblings() {
        let (_dir, mut pager) = new_pager();
        let page_id = pager.allocate_page().unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut leaf = LeafPage::init(&mut buf);
        for i in 0u8..20 {
            leaf.put(&[i], &[i]).unwrap();
        }
        pager.write_page(page_id, &buf).unwrap();

        let result = split_leaf(&mut pager, page_id).unwrap();

        let mut left_buf = pager.read_page(page_id).unwrap();
        let left = LeafPage::open(&mut left_buf).unwrap();
        assert_eq!(left.next_leaf(), result.new_page_id);

        let mut right_buf = pager.read_page(result.new_page_id).unwrap();
        let right = LeafPage::open(&mut right_buf).unwrap();
        assert_eq!(right.next_leaf(), NONE_PAGE);

        assert_eq!(left.num_cells() + right.num_cells(), 20);
        assert_eq!(right.key_at(0).unwrap(), result.separator_key);
    }

    #[test]
    fn internal_split_promotes_middle_and_rewires_leftmost() {
        let (_dir, mut pager) = new_pager();
        let page_id = pager.allocate_page().unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut node = InternalPage::init(&mut buf, 100);
        for i in 0u8..10 {
            node.insert_separator(&[i * 10], 200 + i as u32).unwrap();
        }
        pager.write_page(page_id, &buf).unwrap();

        let result = split_internal(&mut pager, page_id).unwrap();

        let mut left_buf = pager.read_page(page_id).unwrap();
        let left = InternalPage::open(&mut left_buf).unwrap();
        assert_eq!(left.leftmost_child(), 100);

        let mut right_buf = pager.read_page(result.new_page_id).unwrap();
        let right = InternalPage::open(&mut right_buf).unwrap();
        assert_eq!(left.num_cells() + 1 + right.num_cells(), 10);
        assert_eq!(right.child_for_key(&result.separator_key).unwrap(), right.leftmost_child());
    }
}
