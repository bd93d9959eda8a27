//! LRU (Least Recently Used) victim ordering.
//!
//! Pages are kept in a queue ordered by recency: front = least recent, back = most
//! recent. Eviction scans from the front and takes the first page the pool reports
//! as evictable (clean).
//!
//! # Complexity
//!
//! - Hit: O(n) to find and move the page
//! - Eviction: O(n) worst case if every page is dirty

use std::collections::VecDeque;

use crate::page::PageId;

#[derive(Debug, Default)]
pub struct PolicyState {
    recency: VecDeque<PageId>,
}

impl PolicyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&mut self, pid: PageId) {
        self.record_remove(pid);
        self.recency.push_back(pid);
    }

    /// Move a re-fetched page to the most recent end
    pub fn record_hit(&mut self, pid: PageId) {
        if let Some(position) = self.recency.iter().position(|p| *p == pid) {
            if position + 1 != self.recency.len() {
                self.recency.remove(position);
                self.recency.push_back(pid);
            }
        }
    }

    pub fn record_remove(&mut self, pid: PageId) {
        self.recency.retain(|p| *p != pid);
    }

    /// Choose the least recently used page for which `evictable` holds
    pub fn pick_victim(&mut self, mut evictable: impl FnMut(&PageId) -> bool) -> Option<PageId> {
        let position = self.recency.iter().position(|pid| evictable(pid))?;
        self.recency.remove(position)
    }
}
