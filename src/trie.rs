//! The trie facade: the public `add`/`get`/`delete` surface over a root
//! node and a resolved key domain.
//!
//! The key domain and attribute are resolved at compile time here rather
//! than at runtime: the domain becomes the `D: KeyDomain` type parameter
//! (pick `StringDomain` or `NumberDomain` by instantiating
//! `Trie<StringDomain, _>` / `Trie<NumberDomain, _>`), and the attribute
//! becomes whichever `KeyedValue<D>` impl the caller's value type
//! provides (see `src/key.rs`). `unique_keys` and `bin_size` remain plain
//! runtime config on a plain struct rather than a builder.

use log::trace;

use crate::key::{KeyDomain, KeyedValue};
use crate::multi_value::Slot;
use crate::node::{Found, Node};

/// Runtime configuration for a [`Trie`]. The key domain and attribute are
/// resolved via generics/traits instead — see the module docs.
#[derive(Debug, Clone)]
pub struct TrieConfig {
    /// When `false`, values sharing a key are kept together (as a
    /// `MultiValue`) instead of overwriting one another. Default `true`.
    pub unique_keys: bool,
    /// Terminal-bin explosion threshold. Default `256`.
    pub bin_size: usize,
}

impl Default for TrieConfig {
    fn default() -> Self {
        TrieConfig { unique_keys: true, bin_size: 256 }
    }
}

/// A compressed prefix tree mapping keys from domain `D` to values `V`.
///
/// See the crate root docs for the model this implements; this type is
/// the thin facade separate from the node engine: it holds the root node
/// and the resolved domain, and owns the one cross-cutting invariant the
/// node engine can't enforce on itself — that the root's `skip` resets to
/// the empty prefix once the tree goes empty, since compaction can never
/// remove the root itself.
pub struct Trie<D: KeyDomain, V> {
    domain: D,
    config: TrieConfig,
    root: Node<D, V>,
}

impl<D: KeyDomain, V: KeyedValue<D>> Trie<D, V> {
    pub fn new(domain: D, config: TrieConfig) -> Self {
        let root = Node::empty_terminal(domain.empty_prefix());
        Trie { domain, config, root }
    }

    /// Insert `value` under the key its own [`KeyedValue`] impl reports.
    pub fn add(&mut self, value: V) {
        self.root.add(&self.domain, value, self.config.unique_keys, self.config.bin_size);
    }

    /// Look up `raw`, optionally narrowed by `filter`.
    ///
    /// A `MultiValue` hit is unwrapped to its members and passed through
    /// `filter`; a lone value is returned only if it passes `filter` (or
    /// none was given).
    pub fn get(&mut self, raw: D::Raw, filter: Option<&dyn Fn(&V) -> bool>) -> Option<Found<&V>> {
        let key = self.domain.create_key(raw);
        match self.root.find(&self.domain, &key, self.config.unique_keys)? {
            Slot::Single(v) => filter.is_none_or(|f| f(v)).then_some(Found::One(v)),
            Slot::Multi(mv) => {
                let matched: Vec<&V> = mv.values().iter().filter(|v| filter.is_none_or(|f| f(v))).collect();
                match matched.len() {
                    0 => None,
                    1 => Some(Found::One(matched.into_iter().next().unwrap())),
                    _ => Some(Found::Many(matched)),
                }
            }
        }
    }

    /// Remove the value(s) at `raw`, optionally narrowed by `filter`. When
    /// the tree becomes empty, the root's `skip` resets to the empty
    /// prefix.
    pub fn delete(&mut self, raw: D::Raw, filter: Option<&dyn Fn(&V) -> bool>) -> Option<Found<V>> {
        let key = self.domain.create_key(raw);
        let removed = self.root.delete(&self.domain, &key, filter, self.config.unique_keys, self.config.bin_size);
        if removed.is_some() && self.root.is_empty_terminal() {
            trace!("delete: tree is empty, resetting root skip to empty prefix");
            self.root = Node::empty_terminal(self.domain.empty_prefix());
        }
        removed
    }
}
