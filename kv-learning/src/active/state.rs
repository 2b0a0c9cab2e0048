use kv_automata::{Show, StateIndex, Symbol};

use crate::datastructure::NodeId;

/// A transition of the hypothesis, identified by its source state and the index of its
/// symbol in the alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionRef {
    /// Source state.
    pub source: StateIndex,
    /// Index of the symbol in the alphabet.
    pub symbol: usize,
}

/// Bookkeeping for a single state of the hypothesis: the word that reaches it, the leaf of
/// the discrimination tree that represents it, and the transitions that currently point to
/// it. The latter are exactly the transitions that have to be redirected when the state is
/// split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo<I> {
    id: StateIndex,
    access_sequence: Vec<I>,
    leaf: NodeId,
    incoming: Vec<TransitionRef>,
}

impl<I: Symbol> StateInfo<I> {
    pub(crate) fn new(id: StateIndex, access_sequence: Vec<I>, leaf: NodeId) -> Self {
        Self {
            id,
            access_sequence,
            leaf,
            incoming: vec![],
        }
    }

    /// The state in the hypothesis.
    pub fn id(&self) -> StateIndex {
        self.id
    }

    /// The word that leads to the state from the initial state.
    pub fn access_sequence(&self) -> &[I] {
        &self.access_sequence
    }

    /// The leaf of the discrimination tree bound to this state.
    pub fn leaf(&self) -> NodeId {
        self.leaf
    }

    /// The transitions that currently lead into this state.
    pub fn incoming(&self) -> &[TransitionRef] {
        &self.incoming
    }

    pub(crate) fn set_leaf(&mut self, leaf: NodeId) {
        self.leaf = leaf;
    }

    pub(crate) fn add_incoming(&mut self, transition: TransitionRef) {
        self.incoming.push(transition);
    }

    /// Removes and returns all incoming transitions.
    pub(crate) fn take_incoming(&mut self) -> Vec<TransitionRef> {
        std::mem::take(&mut self.incoming)
    }
}

impl<I: Symbol> Show for StateInfo<I> {
    fn show(&self) -> String {
        format!(
            "q{} ({}, {:?})",
            self.id,
            self.access_sequence.show(),
            self.leaf
        )
    }
}
