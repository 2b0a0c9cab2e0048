//! Alphabets and deterministic finite-state hypotheses that are produced by
//! active learning algorithms.
//!
//! The crate is small: a [`Dfa`](automaton::Dfa) classifies finite words by the
//! acceptance of the reached state, while a [`MealyMachine`](automaton::MealyMachine) emits one
//! output symbol for every input symbol it reads. Both are backed by dense transition tables that
//! can grow together with their [`Alphabet`](alphabet::Alphabet).
#![warn(missing_docs)]
use std::{fmt::Debug, hash::Hash};

pub mod math;

mod show;
pub use show::Show;

/// Ordered input alphabets with stable symbol indices.
pub mod alphabet;

/// Deterministic hypotheses, i.e. acceptors and Mealy machines, behind a common trait.
pub mod automaton;

/// A symbol of an alphabet, which is also the type of the symbols in a word.
pub trait Symbol: PartialEq + Eq + Debug + Copy + Ord + PartialOrd + Hash + Show {}
impl<S: PartialEq + Eq + Debug + Copy + Ord + PartialOrd + Hash + Show> Symbol for S {}

/// A color is simply a type that can be used as the output of a transition or
/// as the outcome of a classification.
pub trait Color: Clone + Eq + Hash + Debug {}
impl<T: Eq + Clone + Hash + Debug> Color for T {}

/// States of a hypothesis are identified by dense indices, starting at zero.
pub type StateIndex = usize;

/// Re-exports the most commonly used types and traits.
pub mod prelude {
    pub use super::{
        alphabet,
        alphabet::{Alphabet, CharAlphabet},
        automaton::{Dfa, DfaBuilder, Hypothesis, MealyBuilder, MealyMachine},
        math, Color, Show, StateIndex, Symbol,
    };
}
