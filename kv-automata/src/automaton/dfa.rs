use std::{collections::VecDeque, fmt::Debug};

use itertools::Itertools;
use tracing::trace;

use crate::{alphabet::Alphabet, math, Show, StateIndex, Symbol};

use super::{joint_symbols, Hypothesis};

/// A deterministic finite automaton over finite words. Every state is either accepting or
/// rejecting, and the transitions are stored in a dense table that is indexed by the state and
/// the index of a symbol in the [`Alphabet`]. Transitions may be missing while the automaton is
/// under construction, a learner guarantees completeness before handing it out.
#[derive(Clone, PartialEq, Eq)]
pub struct Dfa<S: Symbol> {
    alphabet: Alphabet<S>,
    initial: Option<StateIndex>,
    accepting: Vec<bool>,
    transitions: Vec<Vec<Option<StateIndex>>>,
}

impl<S: Symbol> Dfa<S> {
    /// Creates an automaton without any states over the given alphabet.
    pub fn new(alphabet: Alphabet<S>) -> Self {
        Self {
            alphabet,
            initial: None,
            accepting: vec![],
            transitions: vec![],
        }
    }

    /// Returns a [`DfaBuilder`] that can be used to construct an automaton from a list of
    /// transitions.
    pub fn builder() -> DfaBuilder<S> {
        DfaBuilder::default()
    }

    /// Adds a new state with the given acceptance and returns its index.
    pub fn add_state(&mut self, accepting: bool) -> StateIndex {
        let state = self.accepting.len();
        self.accepting.push(accepting);
        self.transitions.push(vec![None; self.alphabet.size()]);
        state
    }

    /// Adds a new state and makes it the initial state.
    pub fn add_initial_state(&mut self, accepting: bool) -> StateIndex {
        let state = self.add_state(accepting);
        self.set_initial(state);
        state
    }

    /// Designates `state` as the initial state.
    pub fn set_initial(&mut self, state: StateIndex) {
        assert!(state < self.size(), "state {state} does not exist");
        self.initial = Some(state);
    }

    /// Returns whether `state` is accepting.
    pub fn is_accepting(&self, state: StateIndex) -> bool {
        self.accepting[state]
    }

    /// Changes the acceptance of `state`.
    pub fn set_accepting(&mut self, state: StateIndex, accepting: bool) {
        self.accepting[state] = accepting;
    }

    /// Sets the target of the transition leaving `state` with the symbol of index `symbol`.
    /// Returns the previous target, if there was one.
    pub fn set_transition(
        &mut self,
        state: StateIndex,
        symbol: usize,
        target: StateIndex,
    ) -> Option<StateIndex> {
        assert!(target < self.size(), "target state {target} does not exist");
        self.transitions[state][symbol].replace(target)
    }

    /// Returns the target of the transition leaving `state` with the symbol of index `symbol`.
    pub fn successor_by_index(&self, state: StateIndex, symbol: usize) -> Option<StateIndex> {
        self.transitions.get(state)?.get(symbol).copied().flatten()
    }

    /// Returns true if the run on `word` is defined and ends in an accepting state. Missing
    /// transitions lead to rejection.
    pub fn accepts<W: IntoIterator<Item = S>>(&self, word: W) -> bool {
        self.reached(word)
            .map(|state| self.is_accepting(state))
            .unwrap_or(false)
    }

    /// Extends the alphabet by `symbol` and adds an (undefined) column to the transition
    /// table. Returns the index of the symbol, adding a symbol twice is a no-op.
    pub fn add_alphabet_symbol(&mut self, symbol: S) -> usize {
        let (index, inserted) = self.alphabet.add_symbol(symbol);
        if inserted {
            for row in &mut self.transitions {
                row.push(None);
            }
        }
        index
    }

    /// Iterates over all states that are accepting.
    pub fn accepting_states(&self) -> impl Iterator<Item = StateIndex> + '_ {
        self.accepting
            .iter()
            .enumerate()
            .filter_map(|(state, &acc)| acc.then_some(state))
    }

    /// Computes a shortest word on which `self` and `other` disagree, or `None` if both accept
    /// the same language. The search explores the product of both automata in breadth-first
    /// order, a missing transition leads into an implicit rejecting sink.
    pub fn separating_word(&self, other: &Dfa<S>) -> Option<Vec<S>> {
        let symbols = joint_symbols(&self.alphabet, &other.alphabet);
        let accepting = |dfa: &Dfa<S>, state: Option<StateIndex>| {
            state.map(|q| dfa.is_accepting(q)).unwrap_or(false)
        };

        let start = (self.initial, other.initial);
        let mut seen = math::Set::from_iter([start]);
        let mut queue = VecDeque::from_iter([(start, vec![])]);

        while let Some(((left, right), word)) = queue.pop_front() {
            if accepting(self, left) != accepting(other, right) {
                trace!("found separating word {}", word.show());
                return Some(word);
            }
            for &symbol in &symbols {
                let next = (
                    left.and_then(|q| self.successor(q, symbol)),
                    right.and_then(|q| other.successor(q, symbol)),
                );
                if seen.insert(next) {
                    let mut extended = word.clone();
                    extended.push(symbol);
                    queue.push_back((next, extended));
                }
            }
        }
        None
    }
}

impl<S: Symbol> Hypothesis for Dfa<S> {
    type Symbol = S;
    type Output = bool;

    fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    fn size(&self) -> usize {
        self.accepting.len()
    }

    fn initial(&self) -> Option<StateIndex> {
        self.initial
    }

    fn successor(&self, state: StateIndex, symbol: S) -> Option<StateIndex> {
        self.successor_by_index(state, self.alphabet.index_of(symbol)?)
    }

    fn output(&self, word: &[S]) -> Option<bool> {
        self.reached(word.iter().copied())
            .map(|state| self.is_accepting(state))
    }
}

impl<S: Symbol> Debug for Dfa<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec!["DFA".to_string()];
        header.extend(self.alphabet.universe().map(|sym| sym.show()));
        builder.push_record(header);

        for state in 0..self.size() {
            let mut row = vec![format!(
                "{}{}{}",
                if self.initial == Some(state) { "→" } else { "" },
                state,
                if self.is_accepting(state) { "*" } else { "" }
            )];
            row.extend(self.transitions[state].iter().map(|target| match target {
                Some(q) => q.to_string(),
                None => "-".to_string(),
            }));
            builder.push_record(row);
        }

        write!(f, "{}", builder.build())
    }
}

/// Helper for constructing a [`Dfa`], mainly used in tests and for building targets that a
/// simulating oracle answers queries from. The alphabet consists of all symbols that appear
/// on some transition, ordered by the symbols themselves.
#[derive(Debug, Clone)]
pub struct DfaBuilder<S: Symbol> {
    accepting: Vec<bool>,
    transitions: Vec<(StateIndex, S, StateIndex)>,
}

impl<S: Symbol> Default for DfaBuilder<S> {
    fn default() -> Self {
        Self {
            accepting: vec![],
            transitions: vec![],
        }
    }
}

impl<S: Symbol> DfaBuilder<S> {
    /// Sets the acceptance of the states, the i-th entry determines whether state i accepts.
    pub fn with_accepting<I: IntoIterator<Item = bool>>(mut self, accepting: I) -> Self {
        self.accepting = accepting.into_iter().collect();
        self
    }

    /// Adds transitions in the form `(source, symbol, target)`.
    pub fn with_transitions<I: IntoIterator<Item = (StateIndex, S, StateIndex)>>(
        mut self,
        transitions: I,
    ) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Builds the automaton with the given initial state. States that are mentioned by a
    /// transition but have no acceptance given are rejecting.
    pub fn into_dfa(self, initial: StateIndex) -> Dfa<S> {
        let alphabet: Alphabet<S> = self
            .transitions
            .iter()
            .map(|(_, sym, _)| *sym)
            .sorted()
            .dedup()
            .collect();
        let size = self
            .transitions
            .iter()
            .flat_map(|(p, _, q)| [*p + 1, *q + 1])
            .chain([self.accepting.len(), initial + 1])
            .max()
            .unwrap_or(0);

        let mut dfa = Dfa::new(alphabet);
        for state in 0..size {
            dfa.add_state(self.accepting.get(state).copied().unwrap_or(false));
        }
        dfa.set_initial(initial);
        for (source, symbol, target) in self.transitions {
            let index = dfa
                .alphabet
                .index_of(symbol)
                .expect("alphabet was built from the transitions");
            dfa.set_transition(source, index, target);
        }
        dfa
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even_number_of_a() -> Dfa<char> {
        Dfa::builder()
            .with_accepting([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa(0)
    }

    #[test]
    fn dfa_runs() {
        let dfa = even_number_of_a();
        assert_eq!(dfa.size(), 2);
        assert!(dfa.is_complete());
        assert!(dfa.accepts("".chars()));
        assert!(dfa.accepts("abab".chars()));
        assert!(!dfa.accepts("ab".chars()));
        assert_eq!(dfa.trajectory(&['a', 'b', 'a']), Some(vec![0, 1, 1, 0]));
        assert_eq!(dfa.output(&['a', 'c']), None);
        assert!(!dfa.accepts("ac".chars()));
        assert_eq!(dfa.accepting_states().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn dfa_grows_alphabet() {
        let mut dfa = even_number_of_a();
        assert_eq!(dfa.add_alphabet_symbol('c'), 2);
        assert_eq!(dfa.add_alphabet_symbol('a'), 0);
        assert!(!dfa.is_complete());
        dfa.set_transition(0, 2, 0);
        dfa.set_transition(1, 2, 1);
        assert!(dfa.is_complete());
        assert!(dfa.accepts("acca".chars()));
    }

    #[test_log::test]
    fn dfa_separating_word() {
        let dfa = even_number_of_a();
        assert_eq!(dfa.separating_word(&dfa.clone()), None);

        let all_words = Dfa::builder()
            .with_accepting([true])
            .with_transitions([(0, 'a', 0), (0, 'b', 0)])
            .into_dfa(0);
        assert_eq!(dfa.separating_word(&all_words), Some(vec!['a']));

        let partial = Dfa::builder()
            .with_accepting([true, false])
            .with_transitions([(0, 'a', 1), (1, 'a', 0)])
            .into_dfa(0);
        // `b` is missing in `partial`, so "b" is rejected there but accepted by `dfa`
        assert_eq!(dfa.separating_word(&partial), Some(vec!['b']));
    }
}
