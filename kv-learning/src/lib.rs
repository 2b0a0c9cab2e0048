//! Active learning of deterministic finite automata and Mealy machines with discrimination
//! trees, following the approach of Kearns and Vazirani.
//!
//! A learner is started with
//! [`KearnsVaziraniDfa::start_learning`](active::KearnsVaziraniDfa::start_learning) and then
//! repeatedly refined with counterexamples until an equivalence oracle accepts the hypothesis.
//! All membership queries are posed through a
//! [`MembershipOracle`](active::MembershipOracle), which the learner prefers to use in batches.
#![warn(missing_docs)]

/// Abstract counterexamples and the search strategies used to locate the point at which a
/// counterexample diverges from the hypothesis.
pub mod acex;

/// Contains the active learners together with the oracle abstractions they rely on.
pub mod active;

/// Classification structures used by the learners.
pub mod datastructure;

mod error;
pub use error::{ConfigError, LearnerError, ResumeDiagnostic, SimulationError};

/// Re-exports everything that is needed to run a learner.
pub mod prelude {
    pub use super::{
        acex::{AbstractCounterexample, AcexAnalyzer, LazyCounterexample},
        active::{
            Counterexample, CountingOracle, DfaOracle, EquivalenceOracle, FnOracle,
            KearnsVaziraniDfa, KearnsVaziraniMealy, KvConfig, KvDfaState, KvMealyState,
            MealyOracle, MembershipOracle, Query, StateInfo,
        },
        datastructure::{DiscriminationTree, NodeId},
        ConfigError, LearnerError, ResumeDiagnostic, SimulationError,
    };
    pub use kv_automata::prelude::*;
}
