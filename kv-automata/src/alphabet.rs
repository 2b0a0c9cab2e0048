use std::fmt::Debug;

use itertools::Itertools;

use crate::{math, Symbol};

/// An ordered, append-only collection of input [`Symbol`]s. Every symbol is assigned a stable
/// index on insertion, which is used by the automata in this crate to address the columns of
/// their transition tables. Symbols are never removed, so an index stays valid for the lifetime
/// of the alphabet.
///
/// Two alphabets are only considered equal if they contain the same symbols **in the same
/// order**, as otherwise the same index would refer to different symbols.
#[derive(Clone)]
pub struct Alphabet<S: Symbol>(math::Set<S>);

/// Represents an alphabet where a [`Symbol`] is just a single `char`.
pub type CharAlphabet = Alphabet<char>;

impl<S: Symbol> Alphabet<S> {
    /// Creates a new, empty alphabet.
    pub fn new() -> Self {
        Self(math::Set::default())
    }

    /// Returns the number of symbols in the alphabet.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the alphabet contains no symbols.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the given symbol is present in the alphabet.
    pub fn contains(&self, symbol: S) -> bool {
        self.0.contains(&symbol)
    }

    /// Returns the index of the given symbol, if it is present.
    pub fn index_of(&self, symbol: S) -> Option<usize> {
        self.0.get_index_of(&symbol)
    }

    /// Returns the symbol with the given index, if it exists.
    pub fn symbol(&self, index: usize) -> Option<S> {
        self.0.get_index(index).copied()
    }

    /// Returns an iterator over all symbols in the order of their indices.
    pub fn universe(&self) -> impl Iterator<Item = S> + '_ {
        self.0.iter().copied()
    }

    /// Appends `symbol` to the alphabet. Returns the index of the symbol together with a flag
    /// that indicates whether the symbol was newly inserted. Adding a symbol that is already
    /// present does not change its index.
    pub fn add_symbol(&mut self, symbol: S) -> (usize, bool) {
        self.0.insert_full(symbol)
    }
}

impl CharAlphabet {
    /// Creates a new [`CharAlphabet`] of the given size. The symbols are just the first `size`
    /// letters of the latin alphabet, i.e. 'a' to 'z'.
    pub fn of_size(size: usize) -> Self {
        assert!(size <= 26, "Alphabet is too large");
        (0..size).map(|i| (b'a' + i as u8) as char).collect()
    }
}

impl<S: Symbol> Default for Alphabet<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Symbol> PartialEq for Alphabet<S> {
    fn eq(&self, other: &Self) -> bool {
        self.0.iter().eq(other.0.iter())
    }
}

impl<S: Symbol> Eq for Alphabet<S> {}

impl<S: Symbol> std::ops::Index<usize> for Alphabet<S> {
    type Output = S;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<S: Symbol> FromIterator<S> for Alphabet<S> {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<S: Symbol> From<Vec<S>> for Alphabet<S> {
    fn from(value: Vec<S>) -> Self {
        value.into_iter().collect()
    }
}

impl<S: Symbol> Debug for Alphabet<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0.iter().map(|sym| sym.show()).join(", "))
    }
}

/// Helper macro for creating an [`Alphabet`]. Is called simply with a list of symbols
/// that are separated by commata, the order of the symbols determines their indices.
///
/// # Examples
/// ```
/// use kv_automata::prelude::*;
/// let alphabet = alphabet!('a', 'b', 'c');
/// assert_eq!(alphabet.size(), 3);
/// assert_eq!(alphabet.index_of('b'), Some(1));
/// ```
#[macro_export]
macro_rules! alphabet {
    ($($c:expr),* $(,)?) => {
        $crate::alphabet::Alphabet::from(vec![$($c),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_indices_are_stable() {
        let mut alphabet = crate::alphabet!('b', 'a');
        assert_eq!(alphabet.index_of('b'), Some(0));
        assert_eq!(alphabet.index_of('a'), Some(1));
        assert_eq!(alphabet.add_symbol('c'), (2, true));
        assert_eq!(alphabet.add_symbol('a'), (1, false));
        assert_eq!(alphabet.size(), 3);
        assert_eq!(alphabet[2], 'c');
        assert_eq!(alphabet.symbol(3), None);
        assert_eq!(alphabet.universe().collect::<Vec<_>>(), vec!['b', 'a', 'c']);
    }

    #[test]
    fn alphabet_equality_respects_order() {
        let ab: CharAlphabet = crate::alphabet!('a', 'b');
        let ba: CharAlphabet = crate::alphabet!('b', 'a');
        assert_ne!(ab, ba);
        assert_eq!(ab, CharAlphabet::of_size(2));
    }

    #[test]
    fn alphabet_debug_shows_symbols_in_order() {
        let alphabet: CharAlphabet = crate::alphabet!('b', 'a');
        assert_eq!(format!("{alphabet:?}"), "{b, a}");
        assert_eq!(format!("{:?}", Alphabet::<char>::default()), "{}");
    }
}
