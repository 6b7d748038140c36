//! The duplicate-key carrier.
//!
//! A tagged variant rather than a dynamic type check: a bin slot or
//! branching node's internal slot is always either a lone [`Slot::Single`]
//! value or a [`Slot::Multi`] bucket of values that share one key.
//! `MultiValue` only ever appears when a trie is configured with
//! `unique_keys = false`.

use crate::key::{KeyDomain, KeyedValue};

/// Multiple values sharing one key, plus a cached copy of that key so it
/// doesn't need to be re-derived from the first member on every lookup.
#[derive(Debug)]
pub struct MultiValue<D: KeyDomain, V> {
    pub(crate) key: D::Key,
    pub(crate) values: Vec<V>,
}

impl<D: KeyDomain, V> MultiValue<D, V> {
    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn into_values(self) -> Vec<V> {
        self.values
    }
}

/// One bin slot, or a branching node's internal value slot: a single value,
/// or (under `unique_keys = false`) a bucket of values sharing a key.
#[derive(Debug)]
pub enum Slot<D: KeyDomain, V> {
    Single(V),
    Multi(MultiValue<D, V>),
}

impl<D: KeyDomain, V: KeyedValue<D>> Slot<D, V> {
    /// This slot's key, whether it's a lone value or a cached `MultiValue`
    /// key.
    pub(crate) fn key(&self, domain: &D) -> D::Key {
        match self {
            Slot::Single(v) => v.get_key(domain),
            Slot::Multi(mv) => mv.key.clone(),
        }
    }
}

/// Fold `new` into the existing slot at a key:
/// - `unique_keys`, or no prior slot: overwrite with `new`.
/// - prior slot is already a `Multi`: append.
/// - prior slot is a lone value: wrap both into a fresh `Multi`, stamping
///   its cached key via `set_key`.
pub(crate) fn assign<D: KeyDomain, V: KeyedValue<D>>(
    domain: &D,
    new: V,
    new_key: D::Key,
    existing: Option<Slot<D, V>>,
    unique_keys: bool,
) -> Slot<D, V> {
    if unique_keys {
        return Slot::Single(new);
    }
    match existing {
        None => Slot::Single(new),
        Some(Slot::Multi(mut mv)) => {
            mv.values.push(new);
            Slot::Multi(mv)
        }
        Some(Slot::Single(old)) => {
            let old = old.set_key(domain, new_key.clone());
            Slot::Multi(MultiValue { key: new_key, values: vec![old, new] })
        }
    }
}

/// Merge two slots that sort-and-dedup has discovered share a key.
///
/// Unlike [`assign`] (which folds one freshly-added raw value into an
/// existing slot), both sides here may already be `Multi` buckets — a
/// terminal bin can accumulate inserts across more than one dirty/sort
/// cycle, so by the time a second sort runs, either side of an equal-key
/// pair may already be a bucket from the previous pass.
pub(crate) fn merge_slots<D: KeyDomain, V: KeyedValue<D>>(
    domain: &D,
    existing: Slot<D, V>,
    incoming: Slot<D, V>,
    key: D::Key,
    unique_keys: bool,
) -> Slot<D, V> {
    if unique_keys {
        return incoming;
    }
    let mut values = match existing {
        Slot::Single(v) => vec![v.set_key(domain, key.clone())],
        Slot::Multi(mv) => mv.values,
    };
    match incoming {
        Slot::Single(v) => values.push(v),
        Slot::Multi(mv) => values.extend(mv.values),
    }
    Slot::Multi(MultiValue { key, values })
}
