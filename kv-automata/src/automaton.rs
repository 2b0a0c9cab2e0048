use crate::{alphabet::Alphabet, Color, StateIndex, Symbol};

mod dfa;
pub use dfa::{Dfa, DfaBuilder};

mod mealy;
pub use mealy::{MealyBuilder, MealyMachine};

/// Read-only view on a deterministic hypothesis. This is what a learner hands out and what an
/// equivalence oracle inspects. The view is only valid until the next mutating call on the
/// learner, callers that need a stable copy have to clone the underlying automaton.
pub trait Hypothesis {
    /// The type of input symbols.
    type Symbol: Symbol;
    /// What the hypothesis produces for a finite word, `bool` for acceptors and a word of
    /// output symbols for transducers.
    type Output: Color;

    /// The input alphabet of the hypothesis.
    fn alphabet(&self) -> &Alphabet<Self::Symbol>;

    /// The number of states.
    fn size(&self) -> usize;

    /// The initial state, if one was designated already.
    fn initial(&self) -> Option<StateIndex>;

    /// The state reached from `state` on reading `symbol`, if this transition is defined.
    fn successor(&self, state: StateIndex, symbol: Self::Symbol) -> Option<StateIndex>;

    /// Computes the output for the given word, or `None` if the run on `word` is not defined.
    fn output(&self, word: &[Self::Symbol]) -> Option<Self::Output>;

    /// Returns the state that is reached from `state` by reading `word`.
    fn reached_from<W: IntoIterator<Item = Self::Symbol>>(
        &self,
        state: StateIndex,
        word: W,
    ) -> Option<StateIndex> {
        word.into_iter()
            .try_fold(state, |current, symbol| self.successor(current, symbol))
    }

    /// Returns the state that is reached from the initial state by reading `word`.
    fn reached<W: IntoIterator<Item = Self::Symbol>>(&self, word: W) -> Option<StateIndex> {
        self.reached_from(self.initial()?, word)
    }

    /// Returns the sequence of all states visited while reading `word`, including the initial
    /// state. For a word of length `n`, the trajectory has length `n + 1`.
    fn trajectory(&self, word: &[Self::Symbol]) -> Option<Vec<StateIndex>> {
        let mut current = self.initial()?;
        let mut states = Vec::with_capacity(word.len() + 1);
        states.push(current);
        for &symbol in word {
            current = self.successor(current, symbol)?;
            states.push(current);
        }
        Some(states)
    }

    /// Returns true if every state has a transition for every symbol of the alphabet.
    fn is_complete(&self) -> bool {
        (0..self.size()).all(|state| {
            self.alphabet()
                .universe()
                .all(|symbol| self.successor(state, symbol).is_some())
        })
    }
}

/// Collects the symbols of both alphabets, first those of `left` in index order, then those
/// that only appear in `right`.
pub(crate) fn joint_symbols<S: Symbol>(left: &Alphabet<S>, right: &Alphabet<S>) -> Vec<S> {
    left.universe()
        .chain(right.universe().filter(|sym| !left.contains(*sym)))
        .collect()
}
