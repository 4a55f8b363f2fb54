//! Sorted list of idle-connection timers.
//!
//! Timers live in a doubly-linked list ordered by ascending expiration,
//! so the next timer to fire is always at the head. Nodes are stored in an
//! index arena; a [`TimerId`] is a direct handle to a node, which makes
//! removal O(1). The list is only touched from the reactor thread.

use std::time::Instant;

/// Handle to a timer in a [`TimerList`].
///
/// Valid until the timer is deleted or fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

#[derive(Debug)]
struct Node<T> {
    expire: Instant,
    data: T,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Timers sorted by expiration, each carrying the user data handed back
/// when it fires.
#[derive(Debug)]
pub struct TimerList<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerList<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a timer, keeping the list ordered.
    ///
    /// Timers with equal expiration fire in insertion order.
    pub fn add_timer(&mut self, expire: Instant, data: T) -> TimerId {
        let node = Node {
            expire,
            data,
            prev: None,
            next: None,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        self.link_from(self.head, idx);
        self.len += 1;
        TimerId(idx)
    }

    /// Moves a timer to a new expiration.
    ///
    /// The timer is unlinked and reinserted: walking on from its old
    /// position when it moved later, from the head when it moved earlier.
    /// Returns `false` if `id` is not a live timer.
    pub fn adjust_timer(&mut self, id: TimerId, expire: Instant) -> bool {
        let Some(node) = self.node(id.0) else {
            return false;
        };
        let old = node.expire;
        let next = node.next;
        let prev = node.prev;

        if let Some(node) = self.node_mut(id.0) {
            node.expire = expire;
        }

        if expire >= old {
            let in_place = next.is_none_or(|n| self.expire_at(n) > expire);
            if !in_place {
                self.unlink(id.0);
                self.link_from(next, id.0);
            }
        } else {
            let in_place = prev.is_none_or(|p| self.expire_at(p) <= expire);
            if !in_place {
                self.unlink(id.0);
                self.link_from(self.head, id.0);
            }
        }

        true
    }

    /// Removes a timer without firing it, returning its user data.
    pub fn del_timer(&mut self, id: TimerId) -> Option<T> {
        self.node(id.0)?;
        self.unlink(id.0);
        self.release(id.0)
    }

    /// Fires every timer whose expiration is at or before `now`.
    ///
    /// Expired timers are unlinked from the head one at a time and their
    /// user data is passed to `on_expire`. Stops at the first timer that
    /// has not expired yet.
    pub fn tick(&mut self, now: Instant, mut on_expire: impl FnMut(T)) {
        while let Some(head) = self.head {
            if self.expire_at(head) > now {
                break;
            }

            self.unlink(head);
            if let Some(data) = self.release(head) {
                on_expire(data);
            }
        }
    }

    /// Expiration of a live timer.
    pub fn expire_of(&self, id: TimerId) -> Option<Instant> {
        self.node(id.0).map(|n| n.expire)
    }

    /// Earliest expiration in the list.
    pub fn next_expire(&self) -> Option<Instant> {
        self.head.map(|h| self.expire_at(h))
    }

    /// User data of every timer, from the head.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.next;
            Some(&node.data)
        })
    }

    fn node(&self, idx: usize) -> Option<&Node<T>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<T>> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn expire_at(&self, idx: usize) -> Instant {
        match self.node(idx) {
            Some(node) => node.expire,
            None => unreachable!("linked timer index must be live"),
        }
    }

    /// Links the detached node `idx` before the first node, starting the
    /// walk at `start`, that expires strictly later than it.
    fn link_from(&mut self, start: Option<usize>, idx: usize) {
        let expire = self.expire_at(idx);

        let mut cursor = start;
        while let Some(c) = cursor {
            if self.expire_at(c) > expire {
                break;
            }
            cursor = self.node(c).and_then(|n| n.next);
        }

        let prev = match cursor {
            Some(c) => self.node(c).and_then(|n| n.prev),
            None => self.tail,
        };

        if let Some(node) = self.node_mut(idx) {
            node.prev = prev;
            node.next = cursor;
        }

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }

        match cursor {
            Some(c) => {
                if let Some(node) = self.node_mut(c) {
                    node.prev = Some(idx);
                }
            }
            None => self.tail = Some(idx),
        }
    }

    /// Detaches `idx` from its neighbours, leaving the node in the arena.
    fn unlink(&mut self, idx: usize) {
        let Some(node) = self.node_mut(idx) else {
            return;
        };
        let prev = node.prev.take();
        let next = node.next.take();

        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn release(&mut self, idx: usize) -> Option<T> {
        let node = self.nodes.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.len -= 1;
        Some(node.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn head_is_earliest_after_out_of_order_inserts() {
        let base = Instant::now();
        let mut list = TimerList::new();

        list.add_timer(base + Duration::from_secs(3), 3);
        list.add_timer(base + Duration::from_secs(1), 1);
        list.add_timer(base + Duration::from_secs(2), 2);

        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(list.next_expire(), Some(base + Duration::from_secs(1)));
    }

    #[test]
    fn freed_slots_are_reused() {
        let base = Instant::now();
        let mut list = TimerList::new();

        let a = list.add_timer(base, "a");
        list.del_timer(a);
        let b = list.add_timer(base, "b");

        assert_eq!(a, b);
        assert_eq!(list.len(), 1);
    }
}
