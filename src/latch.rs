//! Optional per-page latch manager: a fast path layered over the coarse
//! engine-level lock. Not required for correctness — the engine's
//! coarse `RwLock` (shared for `Get`, exclusive for `Put`/`Delete`) is
//! the default, always-correct path; this lets callers who need finer
//! granularity latch-couple down a root-to-leaf path instead.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Default)]
pub struct LatchManager {
    latches: RwLock<HashMap<u32, Arc<RwLock<()>>>>,
}

impl LatchManager {
    pub fn new() -> Self {
        LatchManager {
            latches: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the `Arc`-shared lock for `page_id`, creating it on first
    /// use. Callers latch-couple by acquiring the child's lock before
    /// dropping the parent's guard.
    pub fn latch_for(&self, page_id: u32) -> Arc<RwLock<()>> {
        if let Some(latch) = self.latches.read().get(&page_id) {
            return latch.clone();
        }
        self.latches
            .write()
            .entry(page_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_pages_do_not_contend() {
        let mgr = LatchManager::new();
        let a = mgr.latch_for(1);
        let b = mgr.latch_for(2);
        let _ga = a.write();
        let _gb = b.write();
    }

    #[test]
    fn readers_on_same_page_can_coexist() {
        let mgr = LatchManager::new();
        let latch = mgr.latch_for(1);
        let _ga = latch.read();
        let _gb = latch.read();
    }

    #[test]
    fn same_page_id_returns_the_same_latch() {
        let mgr = LatchManager::new();
        let a = mgr.latch_for(7);
        let b = mgr.latch_for(7);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
