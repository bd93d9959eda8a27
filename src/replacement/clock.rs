//! Clock (Second-Chance) victim ordering.
//!
//! Pages sit on a ring, each with a reference bit.
//!
//! # Algorithm
//!
//! - On insert or hit: set the reference bit
//! - On eviction: sweep the hand around the ring
//!   - If the page is not evictable (dirty): skip
//!   - If the ref bit is set: clear it and continue
//!   - Otherwise: evict the page
//!
//! Two full sweeps are enough to visit every page with its bit cleared.

use crate::page::PageId;

#[derive(Debug, Default)]
pub struct PolicyState {
    ring: Vec<(PageId, bool)>,
    hand: usize,
}

impl PolicyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&mut self, pid: PageId) {
        match self.ring.iter_mut().find(|(p, _)| *p == pid) {
            Some(entry) => entry.1 = true,
            None => self.ring.push((pid, true)),
        }
    }

    pub fn record_hit(&mut self, pid: PageId) {
        if let Some(entry) = self.ring.iter_mut().find(|(p, _)| *p == pid) {
            entry.1 = true;
        }
    }

    pub fn record_remove(&mut self, pid: PageId) {
        if let Some(position) = self.ring.iter().position(|(p, _)| *p == pid) {
            self.remove_at(position);
        }
    }

    fn remove_at(&mut self, position: usize) -> PageId {
        let (pid, _) = self.ring.remove(position);
        if position < self.hand {
            self.hand -= 1;
        }
        if self.hand >= self.ring.len() {
            self.hand = 0;
        }
        pid
    }

    pub fn pick_victim(&mut self, mut evictable: impl FnMut(&PageId) -> bool) -> Option<PageId> {
        for _ in 0..2 * self.ring.len() {
            let idx = self.hand;
            let (pid, ref_bit) = &mut self.ring[idx];
            if !evictable(pid) {
                self.hand = (idx + 1) % self.ring.len();
                continue;
            }
            if *ref_bit {
                *ref_bit = false;
                self.hand = (idx + 1) % self.ring.len();
                continue;
            }
            return Some(self.remove_at(idx));
        }
        None
    }
}
