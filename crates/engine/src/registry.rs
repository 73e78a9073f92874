//! Per-position registry of open fixed-term loans.
//!
//! The on-chain original keeps an intrusive doubly linked list inside
//! id-keyed mappings; this is the same structure as an explicit arena:
//! nodes keyed by `(position, loan_id)` store their neighbor ids, and
//! per-position metadata tracks head, tail, and length. Splicing is
//! O(1) once the node is located, and loan counts per position are
//! unbounded - no array ever shifts.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{LedgerError, Result};
use crate::position::{LoanId, PositionKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LoanNode {
    prev: Option<LoanId>,
    next: Option<LoanId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LoanList {
    head: Option<LoanId>,
    tail: Option<LoanId>,
    len: u64,
}

/// Intrusive loan list over id-keyed maps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoanRegistry {
    nodes: BTreeMap<(PositionKey, LoanId), LoanNode>,
    lists: BTreeMap<PositionKey, LoanList>,
}

impl LoanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` at the tail of `position`'s list.
    pub fn add(&mut self, position: PositionKey, id: LoanId) -> Result<()> {
        if self.nodes.contains_key(&(position, id)) {
            return Err(LedgerError::LoanAlreadyExists);
        }

        let list = self.lists.entry(position).or_default();
        let node = LoanNode { prev: list.tail, next: None };

        if let Some(tail) = list.tail {
            // Old tail gains a successor.
            if let Some(tail_node) = self.nodes.get_mut(&(position, tail)) {
                tail_node.next = Some(id);
            }
        } else {
            list.head = Some(id);
        }
        list.tail = Some(id);
        list.len += 1;

        self.nodes.insert((position, id), node);
        Ok(())
    }

    /// Splice `id` out of `position`'s list using its stored neighbors.
    pub fn remove(&mut self, position: PositionKey, id: LoanId) -> Result<()> {
        let node = self
            .nodes
            .remove(&(position, id))
            .ok_or(LedgerError::LoanNotFound)?;

        if let Some(prev) = node.prev {
            if let Some(prev_node) = self.nodes.get_mut(&(position, prev)) {
                prev_node.next = node.next;
            }
        }
        if let Some(next) = node.next {
            if let Some(next_node) = self.nodes.get_mut(&(position, next)) {
                next_node.prev = node.prev;
            }
        }

        let list = self
            .lists
            .get_mut(&position)
            .ok_or(LedgerError::LoanNotFound)?;
        if list.head == Some(id) {
            list.head = node.next;
        }
        if list.tail == Some(id) {
            list.tail = node.prev;
        }
        list.len -= 1;
        if list.len == 0 {
            self.lists.remove(&position);
        }
        Ok(())
    }

    pub fn contains(&self, position: PositionKey, id: LoanId) -> bool {
        self.nodes.contains_key(&(position, id))
    }

    pub fn count(&self, position: PositionKey) -> u64 {
        self.lists.get(&position).map_or(0, |l| l.len)
    }

    /// Paginated enumeration in insertion order.
    ///
    /// Walks from the head, skips `offset` nodes, collects up to
    /// `limit` ids. An offset beyond the list yields an empty vec with
    /// the correct total.
    pub fn loans_by_position(
        &self,
        position: PositionKey,
        offset: u64,
        limit: u64,
    ) -> (Vec<LoanId>, u64) {
        let Some(list) = self.lists.get(&position) else {
            return (Vec::new(), 0);
        };

        let mut ids = Vec::new();
        let mut cursor = list.head;
        let mut skipped = 0u64;
        while let Some(id) = cursor {
            if skipped < offset {
                skipped += 1;
            } else {
                if ids.len() as u64 >= limit {
                    break;
                }
                ids.push(id);
            }
            cursor = self
                .nodes
                .get(&(position, id))
                .and_then(|node| node.next);
        }
        (ids, list.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> PositionKey {
        PositionKey::from_u64(n)
    }

    #[test]
    fn test_append_order_and_total() {
        let mut reg = LoanRegistry::new();
        for id in [3, 1, 7] {
            reg.add(key(1), id).unwrap();
        }
        let (ids, total) = reg.loans_by_position(key(1), 0, 10);
        assert_eq!(ids, [3, 1, 7]);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut reg = LoanRegistry::new();
        reg.add(key(1), 5).unwrap();
        assert_eq!(reg.add(key(1), 5), Err(LedgerError::LoanAlreadyExists));
        // Same id under a different position is fine.
        reg.add(key(2), 5).unwrap();
    }

    #[test]
    fn test_remove_middle_splices() {
        let mut reg = LoanRegistry::new();
        for id in [1, 2, 3] {
            reg.add(key(9), id).unwrap();
        }
        reg.remove(key(9), 2).unwrap();
        let (ids, total) = reg.loans_by_position(key(9), 0, 10);
        assert_eq!(ids, [1, 3]);
        assert_eq!(total, 2);
    }

    #[test]
    fn test_remove_head_and_tail() {
        let mut reg = LoanRegistry::new();
        for id in [1, 2, 3] {
            reg.add(key(9), id).unwrap();
        }
        reg.remove(key(9), 1).unwrap();
        reg.remove(key(9), 3).unwrap();
        let (ids, total) = reg.loans_by_position(key(9), 0, 10);
        assert_eq!(ids, [2]);
        assert_eq!(total, 1);

        reg.remove(key(9), 2).unwrap();
        assert_eq!(reg.count(key(9)), 0);
        assert_eq!(reg.remove(key(9), 2), Err(LedgerError::LoanNotFound));
    }

    #[test]
    fn test_pagination() {
        let mut reg = LoanRegistry::new();
        for id in 0..5 {
            reg.add(key(4), id).unwrap();
        }

        let (ids, total) = reg.loans_by_position(key(4), 1, 2);
        assert_eq!(ids, [1, 2]);
        assert_eq!(total, 5);

        // Offset past the end: empty page, correct total.
        let (ids, total) = reg.loans_by_position(key(4), 9, 2);
        assert!(ids.is_empty());
        assert_eq!(total, 5);

        let (ids, _) = reg.loans_by_position(key(4), 3, 100);
        assert_eq!(ids, [3, 4]);
    }

    #[test]
    fn test_reinsert_after_remove() {
        let mut reg = LoanRegistry::new();
        reg.add(key(1), 10).unwrap();
        reg.remove(key(1), 10).unwrap();
        reg.add(key(1), 10).unwrap();
        assert_eq!(reg.count(key(1)), 1);
    }
}
