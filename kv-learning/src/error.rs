use kv_automata::{alphabet::Alphabet, Symbol};
use thiserror::Error;

/// Errors that can occur while driving one of the learners.
#[derive(Debug, Error)]
pub enum LearnerError<E: std::error::Error + 'static> {
    /// An operation that requires a started learner was called before `start_learning`.
    #[error("learning has not been started yet")]
    NotStarted,
    /// `start_learning` was called twice.
    #[error("learning has already been started")]
    AlreadyStarted,
    /// An earlier oracle failure interrupted an update of the hypothesis, so its structure can
    /// no longer be trusted. Resume from a suspended state to continue.
    #[error("learner is poisoned by an interrupted update, resume from a suspended state")]
    Poisoned,
    /// The counterexample contains a symbol that is not part of the learner's alphabet.
    #[error("counterexample contains an unknown symbol at position {position}")]
    UnknownSymbol {
        /// Position of the first unknown symbol.
        position: usize,
    },
    /// Input and output of a Mealy counterexample have different lengths.
    #[error("counterexample has {inputs} input symbols but {outputs} output symbols")]
    MalformedCounterexample {
        /// Length of the input word.
        inputs: usize,
        /// Length of the output word.
        outputs: usize,
    },
    /// The membership oracle answers differently than the counterexample claims, so the
    /// counterexample cannot refute the hypothesis.
    #[error("counterexample contradicts the membership oracle at position {position}")]
    InconsistentCounterexample {
        /// Position of the output that the oracle does not confirm.
        position: usize,
    },
    /// The membership oracle failed to answer a query.
    #[error("membership oracle failed: {0}")]
    Oracle(#[from] E),
}

/// Errors that arise when reading a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The given name does not refer to a counterexample analyzer.
    #[error("unknown counterexample analyzer \"{0}\"")]
    UnknownAnalyzer(String),
    /// A boolean flag could not be parsed.
    #[error("could not parse value \"{value}\" of {variable} as a flag")]
    InvalidFlag {
        /// The environment variable that was read.
        variable: String,
        /// Its value.
        value: String,
    },
}

/// Failures of the oracles that simulate a known automaton.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// The simulated automaton has no transition for the symbol at `position` of the query.
    #[error("simulated automaton has no transition for the symbol at position {position}")]
    UndefinedTransition {
        /// Position in the concatenation of prefix and suffix.
        position: usize,
    },
}

/// Non-fatal observations made while resuming a learner from a suspended state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumeDiagnostic<I: Symbol> {
    /// The suspended state was produced over a different alphabet than the one the learner
    /// currently uses. Learning may continue, but transitions for symbols that only one of
    /// them knows may be missing.
    #[error("resumed state uses alphabet {suspended:?} while the learner uses {learner:?}")]
    AlphabetMismatch {
        /// Alphabet of the learner.
        learner: Alphabet<I>,
        /// Alphabet of the resumed hypothesis.
        suspended: Alphabet<I>,
    },
}
