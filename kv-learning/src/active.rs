pub(crate) mod oracle;
pub use oracle::*;

mod config;
pub use config::{KvConfig, ANALYZER_VARIABLE, REPEATED_EVALUATION_VARIABLE};

mod state;
pub use state::{StateInfo, TransitionRef};

mod counterexample;
pub use counterexample::Separator;

mod dfa;
pub use dfa::{KearnsVaziraniDfa, KvDfaState};

mod mealy;
pub use mealy::{KearnsVaziraniMealy, KvMealyState};

pub(crate) type LearnerResult<T, M> =
    Result<T, crate::LearnerError<<M as MembershipOracle>::Error>>;

#[cfg(test)]
mod tests;
