//! A single routing entry point used by the engine, split and merge code,
//! so the child-selection convention is defined in exactly one place.

use crate::error::PageError;
use crate::page::internal::InternalPage;
use crate::page::{Page, PageType};

/// Resolves the child page id to descend into for `key`, given the raw
/// bytes of an internal page. See `page::internal` for the routing
/// convention this implements.
pub fn route_child(buf: &mut [u8], key: &[u8]) -> Result<u32, PageError> {
    let node = InternalPage::open(buf)?;
    node.child_for_key(key)
}

pub fn is_leaf(buf: &[u8]) -> Result<bool, PageError> {
    // Page::open requires `&mut [u8]`; a short read-only peek at the type
    // tag avoids needing mutability just to inspect the header.
    if buf.is_empty() {
        return Err(PageError::Corrupt("empty page buffer".into()));
    }
    match buf[0] {
        1 => Ok(true),
        2 => Ok(false),
        other => Err(PageError::Corrupt(format!("unknown page type tag {other}"))),
    }
}

pub fn page_type(buf: &mut [u8]) -> Result<PageType, PageError> {
    Ok(Page::open(buf)?.page_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::internal::InternalPage;
    use crate::page::PAGE_SIZE;

    #[test]
    fn route_child_matches_internal_page_semantics() {
        let mut raw = vec![0u8; PAGE_SIZE];
        {
            let mut node = InternalPage::init(&mut raw, 10);
            node.insert_separator(b"m", 20).unwrap();
        }
        assert_eq!(route_child(&mut raw, b"a").unwrap(), 10);
        assert_eq!(route_child(&mut raw, b"m").unwrap(), 20);
        assert_eq!(route_child(&mut raw, b"z").unwrap(), 20);
    }

    #[test]
    fn is_leaf_reads_type_tag_without_full_validation() {
        let mut raw = vec![0u8; PAGE_SIZE];
        let _ = crate::page::leaf::LeafPage::init(&mut raw);
        assert!(is_leaf(&raw).unwrap());
    }
}
