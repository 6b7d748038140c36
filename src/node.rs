//! The recursive trie node.
//!
//! Every node is either [`NodeBody::Terminal`] (a bin of values, no edges)
//! or [`NodeBody::Branching`] (a jump table keyed by one [`KeyDomain::Unit`],
//! plus an optional internal value for the exact-prefix match). This module
//! owns every structural rewrite that keeps those two shapes canonical:
//! insertion into a bin, lazy sort-and-dedup, explosion of an overfull bin
//! into a branching node, the split that carves a branching node's `skip`
//! down when a new key's prefix only partially matches it, and the
//! compaction that runs after a deletion removes an edge.
//!
//! Structurally this generalizes a `HashMap<u8, Box<TrieNode>>` of
//! single-byte edges with a recursive `insert`/`lookup` to a pluggable
//! [`KeyDomain::Unit`] and the split/explode/compact rewrites a
//! *compressed* trie needs that an uncompressed byte trie does not.

use std::collections::HashMap;

use log::{debug, trace};

use crate::key::{KeyDomain, KeyedValue};
use crate::multi_value::{assign, merge_slots, Slot};

/// The shape of a `get`/`delete` result: either one value, or (under
/// duplicate keys) every value sharing the looked-up key.
#[derive(Debug)]
pub enum Found<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Found<T> {
    fn from_vec(mut values: Vec<T>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => Some(Found::One(values.pop().unwrap())),
            _ => Some(Found::Many(values)),
        }
    }
}

pub(crate) enum NodeBody<D: KeyDomain, V> {
    Terminal { bin: Vec<Slot<D, V>>, dirty: bool },
    Branching { edges: HashMap<D::Unit, Box<Node<D, V>>>, value: Option<Slot<D, V>> },
}

pub(crate) struct Node<D: KeyDomain, V> {
    pub(crate) skip: D::Key,
    pub(crate) body: NodeBody<D, V>,
}

impl<D: KeyDomain, V> Node<D, V> {
    pub(crate) fn empty_terminal(skip: D::Key) -> Self {
        Node { skip, body: NodeBody::Terminal { bin: Vec::new(), dirty: false } }
    }

    pub(crate) fn is_empty_terminal(&self) -> bool {
        matches!(&self.body, NodeBody::Terminal { bin, .. } if bin.is_empty())
    }
}

impl<D: KeyDomain, V: KeyedValue<D>> Node<D, V> {
    /// Build a (possibly still overfull) terminal from an already-sorted,
    /// already-deduped slice of slots, recomputing `skip` and exploding if
    /// needed. Used both for brand-new single-value terminals and for the
    /// per-group children `explode` creates.
    fn from_slots(domain: &D, slots: Vec<Slot<D, V>>, unique_keys: bool, bin_size: usize) -> Self {
        let skip = common_prefix_of_slots(domain, &slots);
        let mut node = Node { skip, body: NodeBody::Terminal { bin: slots, dirty: false } };
        node.explode(domain, unique_keys, bin_size);
        node
    }

    /// Insert `value` under its own key, absorbing it into whichever bin
    /// or edge its key currently routes to.
    pub(crate) fn add(&mut self, domain: &D, value: V, unique_keys: bool, bin_size: usize) {
        let key = value.get_key(domain);
        let n = domain.match_len(&key, &self.skip);
        match &mut self.body {
            NodeBody::Terminal { .. } => {
                self.insert_into_bin(domain, value, key, n);
                self.explode(domain, unique_keys, bin_size);
            }
            NodeBody::Branching { .. } => {
                let skip_len = domain.unit_len(&self.skip);
                if n == skip_len {
                    let key_len = domain.unit_len(&key);
                    if key_len == skip_len {
                        if let NodeBody::Branching { value: slot, .. } = &mut self.body {
                            let existing = slot.take();
                            *slot = Some(assign(domain, value, key, existing, unique_keys));
                        }
                    } else {
                        let unit = domain.unit_at(&key, skip_len);
                        if let NodeBody::Branching { edges, .. } = &mut self.body {
                            if let Some(child) = edges.get_mut(&unit) {
                                child.add(domain, value, unique_keys, bin_size);
                            } else {
                                let mut child = Node::empty_terminal(key.clone());
                                child.insert_into_bin(domain, value, key, key_len);
                                child.explode(domain, unique_keys, bin_size);
                                edges.insert(unit, Box::new(child));
                            }
                        }
                    }
                } else {
                    self.split(domain, n);
                    self.add(domain, value, unique_keys, bin_size);
                }
            }
        }
    }

    /// `_insert`: append to the bin, shrinking `skip` to the common prefix
    /// if the new key diverges from it, and flagging the bin dirty if the
    /// insert broke sortedness.
    fn insert_into_bin(&mut self, domain: &D, value: V, key: D::Key, match_against_skip: usize) {
        if match_against_skip < domain.unit_len(&self.skip) {
            self.skip = domain.prefix(&self.skip, match_against_skip);
        }
        if let NodeBody::Terminal { bin, dirty } = &mut self.body {
            if let Some(last) = bin.last() {
                let last_key = last.key(domain);
                if domain.cmp_keys(&key, &last_key) != std::cmp::Ordering::Greater {
                    *dirty = true;
                }
            }
            bin.push(Slot::Single(value));
        }
    }

    /// Rewrite an overfull terminal bin into a branching node, grouping
    /// its slots by their next diverging unit.
    fn explode(&mut self, domain: &D, unique_keys: bool, bin_size: usize) {
        let over_limit = match &self.body {
            NodeBody::Terminal { bin, .. } => bin.len() > bin_size,
            NodeBody::Branching { .. } => false,
        };
        if !over_limit {
            return;
        }
        if let NodeBody::Terminal { bin, dirty } = &mut self.body {
            sort_and_dedup(domain, bin, unique_keys);
            *dirty = false;
        }
        let still_over = match &self.body {
            NodeBody::Terminal { bin, .. } => bin.len() > bin_size,
            NodeBody::Branching { .. } => unreachable!(),
        };
        // A bin of 0 or 1 distinct keys can never be split into a branching
        // node with at least two outgoing paths; the only way to reach here
        // with such a bin is a degenerate `bin_size = 0` config, since any
        // real overflow needs at least `bin_size + 1 >= 2` distinct keys.
        let slot_count = match &self.body {
            NodeBody::Terminal { bin, .. } => bin.len(),
            NodeBody::Branching { .. } => unreachable!(),
        };
        if !still_over || slot_count < 2 {
            return;
        }

        let bin = match std::mem::replace(&mut self.body, NodeBody::Branching { edges: HashMap::new(), value: None }) {
            NodeBody::Terminal { bin, .. } => bin,
            NodeBody::Branching { .. } => unreachable!(),
        };

        let skip = common_prefix_of_slots(domain, &bin);
        let skip_len = domain.unit_len(&skip);

        let mut slots = bin.into_iter();
        let mut internal_value = None;
        let mut first = slots.next();
        if let Some(slot) = &first {
            if domain.unit_len(&slot.key(domain)) == skip_len {
                internal_value = first.take();
                first = slots.next();
            }
        }

        let mut groups: Vec<(D::Unit, Vec<Slot<D, V>>)> = Vec::new();
        for slot in first.into_iter().chain(slots) {
            let unit = domain.unit_at(&slot.key(domain), skip_len);
            match groups.last_mut() {
                Some((u, g)) if *u == unit => g.push(slot),
                _ => groups.push((unit, vec![slot])),
            }
        }

        let mut edges = HashMap::new();
        for (unit, group) in groups {
            let child = Node::from_slots(domain, group, unique_keys, bin_size);
            edges.insert(unit, Box::new(child));
        }

        trace!("explode: skip={skip:?} -> {} edge(s), internal_value={}", edges.len(), internal_value.is_some());
        self.skip = skip;
        self.body = NodeBody::Branching { edges, value: internal_value };
    }

    /// Carve this branching node's `skip` down to its first `n` units,
    /// demoting the rest of the old skip (and all existing edges/value)
    /// into a single child under the diverging unit. Only reachable on a
    /// branching node — terminal nodes absorb partial matches into their
    /// bin instead (see `add`'s terminal arm).
    fn split(&mut self, domain: &D, n: usize) {
        let old_skip = self.skip.clone();
        let (edges, value) = match std::mem::replace(&mut self.body, NodeBody::Branching { edges: HashMap::new(), value: None }) {
            NodeBody::Branching { edges, value } => (edges, value),
            NodeBody::Terminal { .. } => unreachable!("split only applies to branching nodes"),
        };
        let child = Node { skip: old_skip.clone(), body: NodeBody::Branching { edges, value } };
        let unit = domain.unit_at(&old_skip, n);
        trace!("split: skip={old_skip:?} at {n} -> new skip, child under {unit:?}");
        self.skip = domain.prefix(&old_skip, n);
        let mut new_edges = HashMap::new();
        new_edges.insert(unit, Box::new(child));
        self.body = NodeBody::Branching { edges: new_edges, value: None };
    }

    /// Look up `key`, returning the matching slot if any. Takes `&mut self`
    /// because a dirty terminal bin is sorted lazily on first lookup.
    pub(crate) fn find(&mut self, domain: &D, key: &D::Key, unique_keys: bool) -> Option<&Slot<D, V>> {
        let skip_len = domain.unit_len(&self.skip);
        if domain.match_len(key, &self.skip) != skip_len {
            return None;
        }
        match &mut self.body {
            NodeBody::Terminal { bin, dirty } => {
                if *dirty {
                    sort_and_dedup(domain, bin, unique_keys);
                    *dirty = false;
                }
                binary_search(domain, bin, key)
            }
            NodeBody::Branching { edges, value } => {
                if domain.unit_len(key) == skip_len {
                    value.as_ref()
                } else {
                    let unit = domain.unit_at(key, skip_len);
                    edges.get_mut(&unit).and_then(|child| child.find(domain, key, unique_keys))
                }
            }
        }
    }

    /// Remove the value(s) at `key` (optionally narrowed by `filter`),
    /// compacting the tree afterward if anything was actually removed.
    pub(crate) fn delete(
        &mut self,
        domain: &D,
        key: &D::Key,
        filter: Option<&dyn Fn(&V) -> bool>,
        unique_keys: bool,
        bin_size: usize,
    ) -> Option<Found<V>> {
        let skip_len = domain.unit_len(&self.skip);
        if domain.match_len(key, &self.skip) != skip_len {
            return None;
        }
        match &mut self.body {
            NodeBody::Terminal { bin, dirty } => {
                if *dirty {
                    sort_and_dedup(domain, bin, unique_keys);
                    *dirty = false;
                }
                let idx = binary_search_index(domain, bin, key)?;
                let slot = bin.remove(idx);
                let (keep, removed) = split_slot(slot, filter);
                if let Some(keep) = keep {
                    bin.insert(idx, keep);
                }
                removed
            }
            NodeBody::Branching { .. } => {
                if domain.unit_len(key) == skip_len {
                    let slot = if let NodeBody::Branching { value, .. } = &mut self.body { value.take() } else { unreachable!() };
                    let slot = slot?;
                    let (keep, removed) = split_slot(slot, filter);
                    if let NodeBody::Branching { value, .. } = &mut self.body {
                        *value = keep;
                    }
                    self.collapse_if_needed();
                    removed
                } else {
                    let unit = domain.unit_at(key, skip_len);
                    let result = if let NodeBody::Branching { edges, .. } = &mut self.body {
                        edges.get_mut(&unit).and_then(|child| child.delete(domain, key, filter, unique_keys, bin_size))
                    } else {
                        None
                    };
                    if result.is_some() {
                        self.compact(unit);
                    }
                    result
                }
            }
        }
    }

    /// Compaction, run after a child deletion actually removed something:
    /// drop an edge whose child collapsed to an empty terminal, then
    /// collapse this node itself if it's left with fewer than two
    /// outgoing paths.
    fn compact(&mut self, removed_unit: D::Unit) {
        if let NodeBody::Branching { edges, .. } = &mut self.body {
            if let Some(child) = edges.get(&removed_unit) {
                if child.is_empty_terminal() {
                    edges.remove(&removed_unit);
                }
            }
        }
        self.collapse_if_needed();
    }

    /// Collapse this node if it's a branching node left with fewer than
    /// two outgoing paths (edge count + internal-value presence):
    /// - no edges, no value: become an empty terminal.
    /// - no edges, one internal value: become a terminal bin holding just
    ///   that value — `skip` is already that value's own key, since the
    ///   internal value slot only ever holds a value whose key has
    ///   unit-length `skip_len` and matches `skip` on every unit.
    /// - one edge, no value: splice that child in verbatim. The child's
    ///   `skip` is copied over, not concatenated with this node's former
    ///   `skip` — see DESIGN.md for why concatenation would produce a
    ///   value that isn't even a prefix of any stored key.
    fn collapse_if_needed(&mut self) {
        let (edge_count, has_value) = match &self.body {
            NodeBody::Branching { edges, value } => (edges.len(), value.is_some()),
            NodeBody::Terminal { .. } => return,
        };

        if edge_count == 0 && !has_value {
            debug!("compact: {:?} has no edges and no internal value, collapsing to empty terminal", self.skip);
            self.body = NodeBody::Terminal { bin: Vec::new(), dirty: false };
        } else if edge_count == 0 && has_value {
            let value = match &mut self.body {
                NodeBody::Branching { value, .. } => value.take().expect("has_value"),
                NodeBody::Terminal { .. } => unreachable!(),
            };
            debug!("compact: {:?} has no edges, collapsing its internal value into a terminal bin", self.skip);
            self.body = NodeBody::Terminal { bin: vec![value], dirty: false };
        } else if edge_count == 1 && !has_value {
            let only_unit = match &self.body {
                NodeBody::Branching { edges, .. } => *edges.keys().next().expect("edge_count == 1"),
                NodeBody::Terminal { .. } => unreachable!(),
            };
            let child = match &mut self.body {
                NodeBody::Branching { edges, .. } => edges.remove(&only_unit).expect("edge_count == 1"),
                NodeBody::Terminal { .. } => unreachable!(),
            };
            debug!("compact: {:?} splices in single remaining child {:?}", self.skip, child.skip);
            self.skip = child.skip;
            self.body = child.body;
        }
    }
}

/// The longest common prefix of a non-empty slice of slots' keys.
fn common_prefix_of_slots<D: KeyDomain, V: KeyedValue<D>>(domain: &D, slots: &[Slot<D, V>]) -> D::Key {
    let mut slots_iter = slots.iter();
    let first_key = slots_iter.next().expect("explode/from_slots always has at least one slot").key(domain);
    let mut n = domain.unit_len(&first_key);
    for slot in slots_iter {
        let k = slot.key(domain);
        n = n.min(domain.match_len(&first_key, &k));
    }
    domain.prefix(&first_key, n)
}

/// Sort the bin by key and fold adjacent equal-keyed entries together via
/// `assign`, the same dedup rule `explode`, `find` and `delete` all use
/// before treating a bin as a sorted, distinct-keyed sequence.
fn sort_and_dedup<D: KeyDomain, V: KeyedValue<D>>(domain: &D, bin: &mut Vec<Slot<D, V>>, unique_keys: bool) {
    bin.sort_by(|a, b| domain.cmp_keys(&a.key(domain), &b.key(domain)));
    let mut deduped: Vec<Slot<D, V>> = Vec::with_capacity(bin.len());
    for slot in bin.drain(..) {
        let key = slot.key(domain);
        let merge = deduped.last().is_some_and(|last| domain.cmp_keys(&last.key(domain), &key) == std::cmp::Ordering::Equal);
        if merge {
            let existing = deduped.pop().expect("merge is only true when deduped is non-empty");
            deduped.push(merge_slots(domain, existing, slot, key, unique_keys));
        } else {
            deduped.push(slot);
        }
    }
    *bin = deduped;
}

fn binary_search<'a, D: KeyDomain, V: KeyedValue<D>>(domain: &D, bin: &'a [Slot<D, V>], key: &D::Key) -> Option<&'a Slot<D, V>> {
    binary_search_index(domain, bin, key).map(|idx| &bin[idx])
}

fn binary_search_index<D: KeyDomain, V: KeyedValue<D>>(domain: &D, bin: &[Slot<D, V>], key: &D::Key) -> Option<usize> {
    bin.binary_search_by(|slot| domain.cmp_keys(&slot.key(domain), key)).ok()
}

/// Partition a removed slot into what stays (`keep`) and what was actually
/// removed (`removed`).
fn split_slot<D: KeyDomain, V>(slot: Slot<D, V>, filter: Option<&dyn Fn(&V) -> bool>) -> (Option<Slot<D, V>>, Option<Found<V>>) {
    match slot {
        Slot::Single(v) => {
            if filter.is_none_or(|f| f(&v)) {
                (None, Some(Found::One(v)))
            } else {
                (Some(Slot::Single(v)), None)
            }
        }
        Slot::Multi(mv) => {
            let (removed, keep): (Vec<V>, Vec<V>) = mv.values.into_iter().partition(|v| filter.is_none_or(|f| f(v)));
            let removed = Found::from_vec(removed);
            let keep_slot = match keep.len() {
                0 => None,
                1 => Some(Slot::Single(keep.into_iter().next().unwrap())),
                _ => Some(Slot::Multi(crate::multi_value::MultiValue { key: mv.key, values: keep })),
            };
            (keep_slot, removed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{StringDomain, StringKey};

    fn add_str(root: &mut Node<StringDomain, String>, domain: &StringDomain, s: &str, bin_size: usize) {
        root.add(domain, s.to_string(), true, bin_size);
    }

    #[test]
    fn split_on_insert_shrinks_skip_and_creates_two_children() {
        let domain = StringDomain;
        let mut root = Node::empty_terminal(domain.create_key("abcdef".to_string()));
        root.add(&domain, "abcdef".to_string(), true, 256);
        add_str(&mut root, &domain, "abcxyz", 0); // bin_size 0 forces immediate explosion

        match &root.body {
            NodeBody::Branching { edges, .. } => {
                assert_eq!(root.skip.to_string(), "abc");
                assert_eq!(edges.len(), 2);
                assert!(edges.contains_key(&'d'));
                assert!(edges.contains_key(&'x'));
            }
            _ => panic!("expected branching root after explosion"),
        }
    }

    /// Crawl a subtree collecting every stored key, checking along the way
    /// that every branching node has at least two outgoing paths and no
    /// terminal bin exceeds `bin_size` distinct keys. When `check_skip` is
    /// set, also checks that each node's `skip` is the longest common
    /// prefix of the subtree beneath it — true right after a split/explode
    /// but not guaranteed after a plain deletion shrinks a bin in place
    /// without re-tightening `skip`.
    fn crawl_and_check(domain: &StringDomain, node: &Node<StringDomain, String>, bin_size: usize, check_skip: bool) -> Vec<StringKey> {
        let keys: Vec<StringKey> = match &node.body {
            NodeBody::Terminal { bin, .. } => {
                assert!(bin.len() <= bin_size, "terminal bin exceeds bin_size: {} > {bin_size}", bin.len());
                bin.iter().map(|slot| slot.key(domain)).collect()
            }
            NodeBody::Branching { edges, value } => {
                assert!(edges.len() + usize::from(value.is_some()) >= 2, "branching node with fewer than two outgoing paths");
                let mut keys: Vec<StringKey> = value.iter().map(|slot| slot.key(domain)).collect();
                for child in edges.values() {
                    keys.extend(crawl_and_check(domain, child, bin_size, check_skip));
                }
                keys
            }
        };
        if check_skip {
            if let Some((first, rest)) = keys.split_first() {
                let mut n = domain.unit_len(first);
                for k in rest {
                    n = n.min(domain.match_len(first, k));
                }
                let expected = domain.prefix(first, n);
                assert_eq!(node.skip, expected, "skip is not the longest common prefix of its subtree's keys");
            }
        }
        keys
    }

    #[test]
    fn structural_invariants_hold_after_inserts_and_deletes() {
        let domain = StringDomain;
        let bin_size = 2;
        let mut root = Node::empty_terminal(domain.empty_prefix());
        for word in ["romane", "romanus", "romulus", "rubens", "ruber", "rubicon", "rubicundus"] {
            add_str(&mut root, &domain, word, bin_size);
        }
        let keys = crawl_and_check(&domain, &root, bin_size, true);
        assert_eq!(keys.len(), 7);

        let key = domain.create_key("romane".to_string());
        root.delete(&domain, &key, None, true, bin_size);
        let keys = crawl_and_check(&domain, &root, bin_size, false);
        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn explode_twice_in_a_row_is_idempotent() {
        let domain = StringDomain;
        let mut root = Node::empty_terminal(domain.create_key("abcdef".to_string()));
        root.add(&domain, "abcdef".to_string(), true, 256);
        add_str(&mut root, &domain, "abcxyz", 0);

        let before_edges = match &root.body {
            NodeBody::Branching { edges, .. } => edges.len(),
            NodeBody::Terminal { .. } => panic!("expected branching after first explode"),
        };
        root.explode(&domain, true, 0);
        let after_edges = match &root.body {
            NodeBody::Branching { edges, .. } => edges.len(),
            NodeBody::Terminal { .. } => panic!("expected still branching after second explode"),
        };
        assert_eq!(before_edges, after_edges);
    }

    #[test]
    fn roman_family_resolves_correctly() {
        let domain = StringDomain;
        let mut root = Node::empty_terminal(domain.empty_prefix());
        for word in ["romane", "romanus", "romulus", "rubens", "ruber", "rubicon", "rubicundus"] {
            add_str(&mut root, &domain, word, 2);
        }
        assert_eq!(root.skip.to_string(), "r");

        let key = domain.create_key("rubicon".to_string());
        let found = root.find(&domain, &key, true);
        assert!(matches!(found, Some(Slot::Single(v)) if v == "rubicon"));

        let miss = domain.create_key("rom".to_string());
        assert!(root.find(&domain, &miss, true).is_none());
    }

    #[test]
    fn deleting_child_then_internal_value_empties_a_prefix_node() {
        let _ = env_logger::try_init();
        let domain = StringDomain;
        let mut root = Node::empty_terminal(domain.create_key("ab".to_string()));
        add_str(&mut root, &domain, "ab", 1);
        add_str(&mut root, &domain, "abc", 1); // explodes into skip="ab", value=Some("ab"), edges={'c': ...}

        let abc = domain.create_key("abc".to_string());
        let removed = root.delete(&domain, &abc, None, true, 1);
        assert!(matches!(removed, Some(Found::One(v)) if v == "abc"));
        // The node had no edges left but still held its internal value, so
        // it must collapse into a terminal bin rather than stay branching
        // with zero outgoing paths.
        assert!(matches!(&root.body, NodeBody::Terminal { bin, .. } if bin.len() == 1));

        let ab = domain.create_key("ab".to_string());
        let removed = root.delete(&domain, &ab, None, true, 1);
        assert!(matches!(removed, Some(Found::One(v)) if v == "ab"));
        assert!(root.is_empty_terminal());
    }
}
