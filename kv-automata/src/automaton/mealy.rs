use std::{collections::VecDeque, fmt::Debug};

use itertools::Itertools;
use tracing::trace;

use crate::{alphabet::Alphabet, math, Color, Show, StateIndex, Symbol};

use super::{joint_symbols, Hypothesis};

/// A Mealy machine reads one input symbol at a time and emits one output symbol per
/// transition. The transitions are kept in a table indexed by state and symbol index, where
/// every entry stores the target state together with the produced output.
#[derive(Clone, PartialEq, Eq)]
pub struct MealyMachine<S: Symbol, O: Color> {
    alphabet: Alphabet<S>,
    initial: Option<StateIndex>,
    transitions: Vec<Vec<Option<(StateIndex, O)>>>,
}

impl<S: Symbol, O: Color> MealyMachine<S, O> {
    /// Creates a machine without any states.
    pub fn new(alphabet: Alphabet<S>) -> Self {
        Self {
            alphabet,
            initial: None,
            transitions: vec![],
        }
    }

    /// Returns a [`MealyBuilder`].
    pub fn builder() -> MealyBuilder<S, O> {
        MealyBuilder::default()
    }

    /// Adds a state without outgoing transitions and returns its index.
    pub fn add_state(&mut self) -> StateIndex {
        self.transitions.push(vec![None; self.alphabet.size()]);
        self.transitions.len() - 1
    }

    /// Adds a state and designates it as initial.
    pub fn add_initial_state(&mut self) -> StateIndex {
        let state = self.add_state();
        self.set_initial(state);
        state
    }

    /// Designates `state` as the initial state.
    pub fn set_initial(&mut self, state: StateIndex) {
        assert!(state < self.size(), "state {state} does not exist");
        self.initial = Some(state);
    }

    /// Sets the transition leaving `state` on the symbol with index `symbol`, returning the
    /// previous target and output if there were any.
    pub fn set_transition(
        &mut self,
        state: StateIndex,
        symbol: usize,
        target: StateIndex,
        output: O,
    ) -> Option<(StateIndex, O)> {
        assert!(target < self.size(), "target state {target} does not exist");
        self.transitions[state][symbol].replace((target, output))
    }

    /// Returns target and output of the transition leaving `state` on `symbol`.
    pub fn transition(&self, state: StateIndex, symbol: S) -> Option<(StateIndex, &O)> {
        let index = self.alphabet.index_of(symbol)?;
        self.transitions
            .get(state)?
            .get(index)?
            .as_ref()
            .map(|(target, output)| (*target, output))
    }

    /// Returns the output of the transition leaving `state` on the symbol of index `symbol`.
    pub fn transition_output(&self, state: StateIndex, symbol: usize) -> Option<&O> {
        self.transitions
            .get(state)?
            .get(symbol)?
            .as_ref()
            .map(|(_, output)| output)
    }

    /// Runs the machine on `word` from the initial state and collects the emitted outputs.
    pub fn transform<W: IntoIterator<Item = S>>(&self, word: W) -> Option<Vec<O>> {
        self.transform_from(self.initial?, word)
    }

    /// Runs the machine on `word` starting in `state`.
    pub fn transform_from<W: IntoIterator<Item = S>>(
        &self,
        state: StateIndex,
        word: W,
    ) -> Option<Vec<O>> {
        let mut current = state;
        let mut outputs = vec![];
        for symbol in word {
            let (target, output) = self.transition(current, symbol)?;
            outputs.push(output.clone());
            current = target;
        }
        Some(outputs)
    }

    /// Adds `symbol` to the alphabet and widens the transition table. Returns the index of the
    /// symbol, a symbol that is already known keeps its index.
    pub fn add_alphabet_symbol(&mut self, symbol: S) -> usize {
        let (index, inserted) = self.alphabet.add_symbol(symbol);
        if inserted {
            for row in &mut self.transitions {
                row.push(None);
            }
        }
        index
    }

    /// Computes a shortest input word on which `self` and `other` produce different outputs.
    /// A transition that exists in only one of the machines is a witness as well, since the
    /// other machine cannot produce any output for it.
    pub fn separating_word(&self, other: &MealyMachine<S, O>) -> Option<Vec<S>> {
        let symbols = joint_symbols(&self.alphabet, &other.alphabet);
        let (Some(left), Some(right)) = (self.initial, other.initial) else {
            return (self.initial != other.initial).then(Vec::new);
        };

        let mut seen = math::Set::from_iter([(left, right)]);
        let mut queue = VecDeque::from_iter([((left, right), vec![])]);

        while let Some(((left, right), word)) = queue.pop_front() {
            for &symbol in &symbols {
                let mut extended: Vec<S> = word.clone();
                extended.push(symbol);
                match (self.transition(left, symbol), other.transition(right, symbol)) {
                    (None, None) => {}
                    (Some((p, x)), Some((q, y))) if x == y => {
                        if seen.insert((p, q)) {
                            queue.push_back(((p, q), extended));
                        }
                    }
                    _ => {
                        trace!("found separating word {}", extended.show());
                        return Some(extended);
                    }
                }
            }
        }
        None
    }
}

impl<S: Symbol, O: Color> Hypothesis for MealyMachine<S, O> {
    type Symbol = S;
    type Output = Vec<O>;

    fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    fn size(&self) -> usize {
        self.transitions.len()
    }

    fn initial(&self) -> Option<StateIndex> {
        self.initial
    }

    fn successor(&self, state: StateIndex, symbol: S) -> Option<StateIndex> {
        self.transition(state, symbol).map(|(target, _)| target)
    }

    fn output(&self, word: &[S]) -> Option<Vec<O>> {
        self.transform(word.iter().copied())
    }
}

impl<S: Symbol, O: Color> Debug for MealyMachine<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(
            std::iter::once("Mealy".to_string())
                .chain(self.alphabet.universe().map(|sym| sym.show()))
                .collect_vec(),
        );
        for (state, row) in self.transitions.iter().enumerate() {
            let mut record = vec![if self.initial == Some(state) {
                format!("→{state}")
            } else {
                state.to_string()
            }];
            record.extend(row.iter().map(|entry| match entry {
                Some((target, output)) => format!("{target}|{output:?}"),
                None => "-".to_string(),
            }));
            builder.push_record(record);
        }
        write!(f, "{}", builder.build())
    }
}

/// Builds a [`MealyMachine`] from transitions of the form `(source, symbol, output, target)`.
#[derive(Debug, Clone)]
pub struct MealyBuilder<S: Symbol, O: Color> {
    transitions: Vec<(StateIndex, S, O, StateIndex)>,
}

impl<S: Symbol, O: Color> Default for MealyBuilder<S, O> {
    fn default() -> Self {
        Self {
            transitions: vec![],
        }
    }
}

impl<S: Symbol, O: Color> MealyBuilder<S, O> {
    /// Adds the given transitions.
    pub fn with_transitions<I: IntoIterator<Item = (StateIndex, S, O, StateIndex)>>(
        mut self,
        transitions: I,
    ) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Consumes the builder and produces a machine with the given initial state. The alphabet
    /// is made up of the symbols on the transitions in ascending order.
    pub fn into_mealy(self, initial: StateIndex) -> MealyMachine<S, O> {
        let alphabet: Alphabet<S> = self
            .transitions
            .iter()
            .map(|(_, sym, _, _)| *sym)
            .sorted()
            .dedup()
            .collect();
        let size = self
            .transitions
            .iter()
            .flat_map(|(p, _, _, q)| [*p + 1, *q + 1])
            .chain([initial + 1])
            .max()
            .unwrap_or(0);

        let mut mealy = MealyMachine::new(alphabet);
        for _ in 0..size {
            mealy.add_state();
        }
        mealy.set_initial(initial);
        for (source, symbol, output, target) in self.transitions {
            let index = mealy
                .alphabet
                .index_of(symbol)
                .expect("alphabet was built from the transitions");
            mealy.set_transition(source, index, target, output);
        }
        mealy
    }
}
