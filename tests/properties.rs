//! Property-based invariant tests for streams, observable arrays, filters and
//! keyed lists.
//!
//! 1. Every subscriber sees every write, in subscription order.
//! 2. Replaying an array's change records onto a copy reproduces the array.
//! 3. A filter's output equals the source filtered by the predicate.
//! 4. A keyed list renders the array in order and keeps nodes of surviving keys.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use proptest::prelude::*;
use spark_dom::{
    value_stream, ArrayChange, Attrs, Dom, Filter, MemoryHost, NodeId, ObservableArray,
};

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Push(u8),
    Splice { at: usize, remove: usize, items: Vec<u8> },
    RemoveAt(usize),
    Set(usize, u8),
    Retain(u8),
    Batch(Vec<(usize, u8)>),
    Reset(Vec<u8>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u8>().prop_map(Op::Push),
        3 => (0usize..12, 0usize..4, prop::collection::vec(any::<u8>(), 0..4))
            .prop_map(|(at, remove, items)| Op::Splice { at, remove, items }),
        2 => (0usize..12).prop_map(Op::RemoveAt),
        2 => (0usize..12, any::<u8>()).prop_map(|(i, v)| Op::Set(i, v)),
        1 => (2u8..5).prop_map(Op::Retain),
        1 => prop::collection::vec((0usize..12, any::<u8>()), 0..4).prop_map(Op::Batch),
        1 => prop::collection::vec(any::<u8>(), 0..6).prop_map(Op::Reset),
    ]
}

/// Apply `op`, ignoring out-of-range errors.
fn apply(array: &ObservableArray<u8>, op: &Op) {
    match op {
        Op::Push(v) => array.push(*v),
        Op::Splice { at, remove, items } => {
            let _ = array.splice(*at, *remove, items.iter().copied());
        }
        Op::RemoveAt(i) => {
            let _ = array.remove_at(*i);
        }
        Op::Set(i, v) => {
            let _ = array.set(*i, *v);
        }
        Op::Retain(m) => array.retain(|v| v % m != 0),
        Op::Batch(inserts) => array.apply_changes(|| {
            for (at, v) in inserts {
                let at = (*at).min(array.len());
                let _ = array.insert(at, *v);
                if v % 3 == 0 {
                    let _ = array.remove_at(at);
                }
            }
        }),
        Op::Reset(items) => array.replace_all(items.iter().copied()),
    }
}

fn replay(copy: &mut Vec<u8>, change: &ArrayChange<u8>, source: &ObservableArray<u8>) {
    match change {
        ArrayChange::Insert { index, items } => {
            copy.splice(*index..*index, items.iter().copied());
        }
        ArrayChange::Remove { index, items } => {
            let removed: Vec<u8> = copy.drain(*index..*index + items.len()).collect();
            assert_eq!(&removed, items);
        }
        ArrayChange::Replace { index, old, new } => {
            assert_eq!(copy[*index], *old);
            copy[*index] = *new;
        }
        ArrayChange::Reset => *copy = source.peek(),
        ArrayChange::Batch(changes) => {
            for change in changes {
                replay(copy, change, source);
            }
        }
    }
}

// ── 1. Stream delivery ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn subscribers_see_every_write_in_order(
        writes in prop::collection::vec(any::<i32>(), 0..20),
        subscribers in 1usize..5,
    ) {
        let stream = value_stream(0);
        let log = Rc::new(RefCell::new(Vec::new()));
        let _subs: Vec<_> = (0..subscribers)
            .map(|id| {
                let log = log.clone();
                stream.subscribe(move |v| log.borrow_mut().push((id, *v)))
            })
            .collect();

        for w in &writes {
            stream.set(*w);
        }

        let expected: Vec<(usize, i32)> = writes
            .iter()
            .flat_map(|w| (0..subscribers).map(move |id| (id, *w)))
            .collect();
        prop_assert_eq!(&*log.borrow(), &expected);
    }
}

// ── 2. Change records ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn change_records_replay_to_the_same_array(
        initial in prop::collection::vec(any::<u8>(), 0..8),
        ops in prop::collection::vec(op_strategy(), 1..25),
    ) {
        let array = ObservableArray::from_vec(initial.clone());
        let copy = Rc::new(RefCell::new(initial));
        let (c, a) = (copy.clone(), array.downgrade());
        let _sub = array.add_listener(move |change| {
            if let Some(source) = a.upgrade() {
                replay(&mut c.borrow_mut(), change, &source);
            }
        });

        for op in &ops {
            apply(&array, op);
            prop_assert_eq!(&*copy.borrow(), &array.peek());
        }
    }
}

// ── 3. Filter membership ────────────────────────────────────────────────

proptest! {
    #[test]
    fn filter_matches_source_filtered(
        initial in prop::collection::vec(any::<u8>(), 0..8),
        ops in prop::collection::vec(op_strategy(), 1..25),
        modulus in 2u8..5,
    ) {
        let array = ObservableArray::from_vec(initial);
        let filter = Filter::new(&array, move |v: &u8| v % modulus == 0);

        for op in &ops {
            apply(&array, op);
            let expected: Vec<u8> = array.peek().into_iter().filter(|v| v % modulus == 0).collect();
            prop_assert_eq!(filter.filtered().peek(), expected);
        }

        // Re-applying with nothing changed is silent
        let version = filter.filtered().version();
        filter.apply_filter();
        prop_assert_eq!(filter.filtered().version(), version);
    }
}

// ── 4. Keyed lists ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn keyed_list_renders_in_order_and_keeps_nodes(
        count in 0usize..10,
        steps in prop::collection::vec((0usize..3, any::<prop::sample::Index>(), any::<prop::sample::Index>()), 1..15),
    ) {
        let dom = Dom::new(MemoryHost::new());
        let array: ObservableArray<u32> = (0..count as u32).collect();
        let mut next = count as u32;

        let d = dom.clone();
        let list = dom
            .element_list_keyed(
                "ul",
                Attrs::new(),
                &array,
                move |_, n| d.h("li", Attrs::new(), *n),
                |n| *n,
            )
            .unwrap();
        let ul = *list.node();
        let host = dom.host().clone();

        let nodes_by_key = || -> HashMap<u32, NodeId> {
            array.peek().into_iter().zip(host.children(ul)).collect()
        };

        for (kind, a, b) in steps {
            let before = nodes_by_key();
            let len = array.len();
            match kind {
                0 => {
                    let at = a.index(len + 1);
                    array.insert(at, next).unwrap();
                    next += 1;
                }
                1 if len > 0 => {
                    array.remove_at(a.index(len)).unwrap();
                }
                _ if len > 0 => {
                    // One batch, so the list sees a move rather than remove + add
                    array.apply_changes(|| {
                        let item = array.remove_at(a.index(len)).unwrap();
                        array.insert(b.index(len), item).unwrap();
                    });
                }
                _ => {}
            }

            let texts: Vec<String> = host.children(ul).iter().map(|n| host.text_content(*n)).collect();
            let expected: Vec<String> = array.peek().iter().map(u32::to_string).collect();
            prop_assert_eq!(texts, expected);

            for (key, node) in nodes_by_key() {
                if let Some(old) = before.get(&key) {
                    prop_assert_eq!(*old, node);
                }
            }
        }
    }
}
