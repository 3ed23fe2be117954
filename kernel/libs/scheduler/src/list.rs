// SPDX-License-Identifier: MPL-2.0

//! A doubly linked list stored in a slab.
//!
//! Nodes are addressed by the index of their slot, so that an element can be
//! removed from the middle of the list in O(1) once its key is known.

use alloc::vec::Vec;

const NIL: usize = usize::MAX;

struct Node<T> {
    value: T,
    prev: usize,
    next: usize,
}

enum Slot<T> {
    Occupied(Node<T>),
    Vacant { next_free: usize },
}

pub(crate) struct LinkedSlab<T> {
    slots: Vec<Slot<T>>,
    head: usize,
    tail: usize,
    free: usize,
    len: usize,
}

impl<T> LinkedSlab<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: NIL,
            tail: NIL,
            free: NIL,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Appends `value` and returns its key.
    pub(crate) fn push_back(&mut self, value: T) -> usize {
        let node = Node {
            value,
            prev: self.tail,
            next: NIL,
        };
        let key = match self.free {
            NIL => {
                self.slots.push(Slot::Occupied(node));
                self.slots.len() - 1
            }
            key => {
                let Slot::Vacant { next_free } = self.slots[key] else {
                    unreachable!("the free list points to an occupied slot");
                };
                self.free = next_free;
                self.slots[key] = Slot::Occupied(node);
                key
            }
        };

        match self.tail {
            NIL => self.head = key,
            tail => self.node_mut(tail).next = key,
        }
        self.tail = key;
        self.len += 1;
        key
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        match self.head {
            NIL => None,
            head => self.remove(head),
        }
    }

    pub(crate) fn get(&self, key: usize) -> Option<&T> {
        match self.slots.get(key) {
            Some(Slot::Occupied(node)) => Some(&node.value),
            _ => None,
        }
    }

    /// Unlinks the element at `key`.
    ///
    /// Returns `None` if the slot is vacant.
    pub(crate) fn remove(&mut self, key: usize) -> Option<T> {
        if !matches!(self.slots.get(key), Some(Slot::Occupied(_))) {
            return None;
        }
        let Slot::Occupied(node) = core::mem::replace(
            &mut self.slots[key],
            Slot::Vacant {
                next_free: self.free,
            },
        ) else {
            unreachable!();
        };
        self.free = key;

        match node.prev {
            NIL => self.head = node.next,
            prev => self.node_mut(prev).next = node.next,
        }
        match node.next {
            NIL => self.tail = node.prev,
            next => self.node_mut(next).prev = node.prev,
        }
        self.len -= 1;
        Some(node.value)
    }

    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            slab: self,
            cursor: self.head,
        }
    }

    fn node_mut(&mut self, key: usize) -> &mut Node<T> {
        match &mut self.slots[key] {
            Slot::Occupied(node) => node,
            Slot::Vacant { .. } => unreachable!("a link points to a vacant slot"),
        }
    }
}

pub(crate) struct Iter<'a, T> {
    slab: &'a LinkedSlab<T>,
    cursor: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        match self.slab.slots.get(self.cursor) {
            Some(Slot::Occupied(node)) => {
                self.cursor = node.next;
                Some(&node.value)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn collect(list: &LinkedSlab<u32>) -> Vec<u32> {
        list.iter().copied().collect()
    }

    #[test]
    fn push_and_pop_in_order() {
        let mut list = LinkedSlab::new();
        for i in 0..4 {
            list.push_back(i);
        }
        assert_eq!(list.len(), 4);
        assert_eq!(list.pop_front(), Some(0));
        assert_eq!(list.pop_front(), Some(1));
        assert_eq!(collect(&list), [2, 3]);
    }

    #[test]
    fn remove_from_middle() {
        let mut list = LinkedSlab::new();
        let keys: Vec<usize> = (0..5).map(|i| list.push_back(i)).collect();
        assert_eq!(list.remove(keys[2]), Some(2));
        assert_eq!(list.remove(keys[2]), None);
        assert_eq!(list.remove(keys[0]), Some(0));
        assert_eq!(list.remove(keys[4]), Some(4));
        assert_eq!(collect(&list), [1, 3]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn vacant_slots_are_reused() {
        let mut list = LinkedSlab::new();
        let a = list.push_back(1);
        list.push_back(2);
        list.remove(a);
        let c = list.push_back(3);
        assert_eq!(a, c);
        assert_eq!(list.get(c), Some(&3));
        assert_eq!(collect(&list), [2, 3]);
    }

    #[test]
    fn drain_to_empty_and_refill() {
        let mut list = LinkedSlab::new();
        list.push_back(1);
        list.push_back(2);
        while list.pop_front().is_some() {}
        assert_eq!(list.len(), 0);
        assert_eq!(list.iter().next(), None);
        list.push_back(7);
        assert_eq!(collect(&list), [7]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Push(u32),
        Pop,
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::Push),
            Just(Op::Pop),
            any::<usize>().prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_a_queue(ops in prop::collection::vec(op(), 0..128)) {
            let mut list = LinkedSlab::new();
            // The live keys and values, in queue order.
            let mut model: Vec<(usize, u32)> = Vec::new();

            for op in ops {
                match op {
                    Op::Push(value) => {
                        let key = list.push_back(value);
                        prop_assert!(model.iter().all(|(live, _)| *live != key));
                        model.push((key, value));
                    }
                    Op::Pop => {
                        let expected = (!model.is_empty()).then(|| model.remove(0).1);
                        prop_assert_eq!(list.pop_front(), expected);
                    }
                    Op::Remove(nth) => {
                        if model.is_empty() {
                            continue;
                        }
                        let (key, value) = model.remove(nth % model.len());
                        prop_assert_eq!(list.remove(key), Some(value));
                        prop_assert_eq!(list.remove(key), None);
                    }
                }
                prop_assert_eq!(list.len(), model.len());
                prop_assert_eq!(
                    collect(&list),
                    model.iter().map(|(_, value)| *value).collect::<Vec<_>>()
                );
            }
        }
    }
}
