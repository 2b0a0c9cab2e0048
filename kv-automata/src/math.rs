//! Collection aliases, we use these to hide which map and set implementations are used.

use std::collections::{BTreeMap, BTreeSet};

pub use indexmap::map;
pub use indexmap::set;

/// Type alias for sets that are ordered by their elements.
pub type OrderedSet<S> = BTreeSet<S>;
/// Type alias for sets that remember the order in which elements were inserted.
pub type Set<S> = indexmap::IndexSet<S>;

/// Type alias for maps that are ordered by their keys.
pub type OrderedMap<K, V> = BTreeMap<K, V>;
/// Type alias for maps that remember the order in which keys were inserted.
pub type Map<K, V> = indexmap::IndexMap<K, V>;
