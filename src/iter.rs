//! Forward range scan `[start, end)`, implemented by descending once to
//! the starting leaf and then following `right_ptr` sibling links. An
//! empty `end` means unbounded: the scan runs to the last key in the
//! tree rather than stopping at the (nonexistent) empty key. No
//! snapshot isolation is taken: a concurrent mutation may be observed or
//! missed, but the scan stays memory-safe because it only ever reads
//! whole, self-consistent pages through the pager.

use crate::error::Result;
use crate::node;
use crate::page::leaf::LeafPage;
use crate::page::NONE_PAGE;
use crate::pager::Pager;

pub struct RangeIter<'a> {
    pager: &'a mut Pager,
    next_leaf: u32,
    buffered: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    end: Vec<u8>,
    finished: bool,
}

impl<'a> RangeIter<'a> {
    pub fn new(pager: &'a mut Pager, start: &[u8], end: &[u8]) -> Result<Self> {
        let mut page_id = pager.root_page_id();
        loop {
            let mut buf = pager.read_page(page_id)?;
            if node::is_leaf(&buf)? {
                break;
            }
            page_id = node::route_child(&mut buf, start)?;
        }
        let mut buf = pager.read_page(page_id)?;
        let leaf = LeafPage::open(&mut buf)?;
        let next_leaf = leaf.next_leaf();
        let mut entries = leaf.entries()?;
        entries.retain(|(k, _)| k.as_slice() >= start);

        Ok(RangeIter {
            pager,
            next_leaf,
            buffered: entries.into_iter(),
            end: end.to_vec(),
            finished: false,
        })
    }
}

impl<'a> Iterator for RangeIter<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            if let Some((k, v)) = self.buffered.next() {
                if !self.end.is_empty() && k.as_slice() >= self.end.as_slice() {
                    self.finished = true;
                    return None;
                }
                return Some(Ok((k, v)));
            }
            if self.next_leaf == NONE_PAGE {
                self.finished = true;
                return None;
            }
            match self.pager.read_page(self.next_leaf) {
                Ok(mut buf) => match LeafPage::open(&mut buf) {
                    Ok(leaf) => {
                        self.next_leaf = leaf.next_leaf();
                        match leaf.entries() {
                            Ok(entries) => self.buffered = entries.into_iter(),
                            Err(e) => {
                                self.finished = true;
                                return Some(Err(e.into()));
                            }
                        }
                    }
                    Err(e) => {
                        self.finished = true;
                        return Some(Err(e.into()));
                    }
                },
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
