//! A compressed prefix tree (radix / PATRICIA trie) mapping keys from a
//! pluggable key domain to user-supplied values.
//!
//! Built for keys that share long common prefixes — paths, identifiers,
//! numeric ranges bucketed by high bits — where a balanced search tree
//! would waste comparisons re-checking redundant prefix units. Two key
//! domains ship: [`key::StringDomain`] (variable-length sequences of
//! `char`) and [`key::NumberDomain`] (fixed-length, 16-nibble 64-bit
//! words).
//!
//! ```
//! use radix_trie::{Trie, TrieConfig};
//! use radix_trie::key::StringDomain;
//!
//! let mut trie: Trie<StringDomain, String> = Trie::new(StringDomain, TrieConfig::default());
//! trie.add("romane".to_string());
//! trie.add("romanus".to_string());
//!
//! assert!(trie.get("romane".to_string(), None).is_some());
//! assert!(trie.get("rom".to_string(), None).is_none());
//! ```
//!
//! The engine is single-threaded and non-reentrant: every call mutates
//! the tree eagerly and returns synchronously, there is no internal
//! locking, and callers share a [`Trie`] across threads at their own
//! risk. Serialization, iteration/range scans and any concurrency
//! wrapper are deliberately out of scope — those are external
//! collaborators, not this crate's job.

pub mod key;
pub mod multi_value;
mod node;
mod trie;

pub use multi_value::MultiValue;
pub use node::Found;
pub use trie::{Trie, TrieConfig};
