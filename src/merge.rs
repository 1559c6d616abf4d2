//! Underflow handling: redistribute between siblings when there's enough
//! to go around, otherwise merge. Only leaves are rebalanced here —
//! internal-node cascading merge is outside this crate's minimum scope
//! (see spec's own note that leaf-only merging is sufficient for
//! correctness); a parent that drops to zero separators is instead
//! collapsed by the engine when it is the root.

use crate::error::Result;
use crate::page::internal::InternalPage;
use crate::page::leaf::LeafPage;
use crate::page::{NONE_PAGE, PAGE_SIZE};
use crate::pager::Pager;

/// `min_cells = floor(max_cells_estimate * 0.25)`, at least 1. The root is
/// never subject to this check (handled by the caller).
pub fn min_cells(max_cells_estimate: usize) -> usize {
    ((max_cells_estimate as f64 * 0.25).floor() as usize).max(1)
}

fn read_leaf(pager: &mut Pager, id: u32) -> Result<(Vec<(Vec<u8>, Vec<u8>)>, u32)> {
    let mut buf = pager.read_page(id)?;
    let leaf = LeafPage::open(&mut buf)?;
    Ok((leaf.entries()?, leaf.next_leaf()))
}

fn write_leaf(pager: &mut Pager, id: u32, next_leaf: u32, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut leaf = LeafPage::init(&mut buf);
    leaf.rebuild(next_leaf, entries)?;
    pager.write_page(id, &buf)?;
    Ok(())
}

fn read_internal(pager: &mut Pager, id: u32) -> Result<(u32, Vec<(Vec<u8>, u32)>)> {
    let mut buf = pager.read_page(id)?;
    let node = InternalPage::open(&mut buf)?;
    Ok((node.leftmost_child(), node.entries()?))
}

fn write_internal(pager: &mut Pager, id: u32, leftmost_child: u32, entries: &[(Vec<u8>, u32)]) -> Result<()> {
    let mut buf = vec![0u8; PAGE_SIZE];
    let mut node = InternalPage::init(&mut buf, leftmost_child);
    node.rebuild(leftmost_child, entries)?;
    pager.write_page(id, &buf)?;
    Ok(())
}

/// The child's position under its parent: `None` means the parent's
/// `right_ptr`/leftmost child; `Some(i)` means `parent`'s cell `i`.
pub type ChildIndex = Option<u16>;

fn child_id_at(leftmost: u32, entries: &[(Vec<u8>, u32)], idx: ChildIndex) -> u32 {
    match idx {
        None => leftmost,
        Some(i) => entries[i as usize].1,
    }
}

/// Checks the child named by `child_index` under `parent_id` and, if it
/// has underflowed, redistributes from a sibling or merges with one.
/// Prefers the left sibling. No-op if the child is not underfull.
pub fn rebalance_leaf(pager: &mut Pager, parent_id: u32, child_index: ChildIndex, min_cells: usize) -> Result<()> {
    let (leftmost, entries) = read_internal(pager, parent_id)?;
    let child_id = child_id_at(leftmost, &entries, child_index);
    let (child_entries, child_next) = read_leaf(pager, child_id)?;
    if child_entries.len() >= min_cells {
        return Ok(());
    }

    let left_id = match child_index {
        Some(0) => Some(leftmost),
        Some(i) => Some(entries[i as usize - 1].1),
        None => None,
    };
    let right_id = match child_index {
        None if !entries.is_empty() => Some(entries[0].1),
        Some(i) if (i as usize + 1) < entries.len() => Some(entries[i as usize + 1].1),
        _ => None,
    };

    if let Some(left_id) = left_id {
        let (left_entries, _left_next) = read_leaf(pager, left_id)?;
        let combined_len = left_entries.len() + child_entries.len();
        let mut combined = left_entries;
        combined.extend(child_entries.clone());
        if combined_len >= 2 * min_cells {
            let mid = combined.len() / 2;
            let new_separator = combined[mid].0.clone();
            write_leaf(pager, left_id, child_id, &combined[..mid])?;
            write_leaf(pager, child_id, child_next, &combined[mid..])?;
            let mut new_entries = entries;
            new_entries[child_index.expect("left sibling implies a parent cell") as usize].0 = new_separator;
            write_internal(pager, parent_id, leftmost, &new_entries)?;
        } else {
            write_leaf(pager, left_id, child_next, &combined)?;
            let remove_at = child_index.expect("left sibling implies a parent cell") as usize;
            let mut new_entries = entries;
            new_entries.remove(remove_at);
            write_internal(pager, parent_id, leftmost, &new_entries)?;
        }
        return Ok(());
    }

    if let Some(right_id) = right_id {
        let (right_entries, right_next) = read_leaf(pager, right_id)?;
        let combined_len = child_entries.len() + right_entries.len();
        let mut combined = child_entries;
        combined.extend(right_entries);
        let separator_index = child_index.map(|i| i as usize + 1).unwrap_or(0);
        if combined_len >= 2 * min_cells {
            let mid = combined.len() / 2;
            let new_separator = combined[mid].0.clone();
            write_leaf(pager, child_id, right_id, &combined[..mid])?;
            write_leaf(pager, right_id, right_next, &combined[mid..])?;
            let mut new_entries = entries;
            new_entries[separator_index].0 = new_separator;
            write_internal(pager, parent_id, leftmost, &new_entries)?;
        } else {
            write_leaf(pager, child_id, right_next, &combined)?;
            let mut new_entries = entries;
            new_entries.remove(separator_index);
            write_internal(pager, parent_id, leftmost, &new_entries)?;
        }
        return Ok(());
    }

    // No sibling at all: parent has exactly one child, nothing to
    // rebalance against. The engine handles a single-child root by
    // collapsing it; a non-root internal node never ends up with only
    // one child because it would itself have been merged by its parent.
    let _ = NONE_PAGE;
    Ok(())
}
