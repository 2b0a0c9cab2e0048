use std::{fmt::Display, str::FromStr};

use tracing::trace;

use crate::ConfigError;

/// An abstract counterexample assigns an *effect* to every position `0..len()`. An effect of
/// `false` means that hypothesis and system agree when the prefix up to that position is
/// replaced by its representative in the hypothesis, `true` means they disagree. Analysis
/// searches for a position `i` such that the effect at `i` is `false` and the effect at
/// `i + 1` is `true`.
pub trait AbstractCounterexample {
    /// Failures that can occur while computing an effect.
    type Error;

    /// Number of positions.
    fn len(&self) -> usize;

    /// Returns true if there are no positions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluates the effect at `index`. This usually requires membership queries.
    fn compute_effect(&mut self, index: usize) -> Result<bool, Self::Error>;
}

/// Wraps an [`AbstractCounterexample`] and remembers every effect that was computed, so no
/// position is ever evaluated twice.
#[derive(Debug, Clone)]
pub struct LazyCounterexample<A> {
    inner: A,
    effects: Vec<Option<bool>>,
    evaluations: usize,
}

impl<A: AbstractCounterexample> LazyCounterexample<A> {
    /// Wraps `inner`, no effect is known initially.
    pub fn new(inner: A) -> Self {
        let effects = vec![None; inner.len()];
        Self {
            inner,
            effects,
            evaluations: 0,
        }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Returns true if there are no positions.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Records an effect that is known without evaluation.
    pub fn set_effect(&mut self, index: usize, effect: bool) {
        self.effects[index] = Some(effect);
    }

    /// Returns the effect at `index`, evaluating it if it is not known yet.
    pub fn effect(&mut self, index: usize) -> Result<bool, A::Error> {
        if let Some(effect) = self.effects[index] {
            return Ok(effect);
        }
        let effect = self.inner.compute_effect(index)?;
        self.evaluations += 1;
        trace!("effect at {index} is {effect}");
        self.effects[index] = Some(effect);
        Ok(effect)
    }

    /// How often the wrapped counterexample was asked to compute an effect.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// The wrapped counterexample.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Unwraps the counterexample.
    pub fn into_inner(self) -> A {
        self.inner
    }
}

/// Strategies for locating a breakpoint in an abstract counterexample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AcexAnalyzer {
    /// Scans from the lower end upwards.
    LinearForward,
    /// Scans from the upper end downwards.
    LinearBackward,
    /// Bisects the search range. Effects are booleans with a fixed `false` at the lower and
    /// `true` at the upper end, so bisecting towards either end finds the same breakpoint and
    /// `binary-search-fwd` and `binary-search-bwd` both select this analyzer.
    #[default]
    BinarySearch,
    /// Takes exponentially growing steps from the lower end, then bisects.
    ExponentialForward,
    /// Takes exponentially growing steps from the upper end, then bisects.
    ExponentialBackward,
}

impl AcexAnalyzer {
    /// All available analyzers.
    pub const ALL: [AcexAnalyzer; 5] = [
        AcexAnalyzer::LinearForward,
        AcexAnalyzer::LinearBackward,
        AcexAnalyzer::BinarySearch,
        AcexAnalyzer::ExponentialForward,
        AcexAnalyzer::ExponentialBackward,
    ];

    /// The name under which the analyzer can be selected.
    pub fn name(&self) -> &'static str {
        match self {
            AcexAnalyzer::LinearForward => "linear-fwd",
            AcexAnalyzer::LinearBackward => "linear-bwd",
            AcexAnalyzer::BinarySearch => "binary-search",
            AcexAnalyzer::ExponentialForward => "exponential-fwd",
            AcexAnalyzer::ExponentialBackward => "exponential-bwd",
        }
    }

    /// Finds an index `i` in `[low, len - 1)` such that the effect at `i` is `false` and the
    /// effect at `i + 1` is `true`. The effect at `low` is assumed to be `false` and the
    /// effect at `len - 1` to be `true`, neither of them is evaluated.
    ///
    /// # Panics
    /// If `low` is not below the last position, or if a linear scan does not find a
    /// breakpoint, which can only happen if the assumptions above are violated.
    pub fn analyze<A: AbstractCounterexample>(
        &self,
        acex: &mut LazyCounterexample<A>,
        low: usize,
    ) -> Result<usize, A::Error> {
        assert!(
            low + 1 < acex.len(),
            "search range [{low}, {}) is empty",
            acex.len()
        );
        let high = acex.len() - 1;
        let index = match self {
            AcexAnalyzer::LinearForward => linear_forward(acex, low, high)?,
            AcexAnalyzer::LinearBackward => linear_backward(acex, low, high)?,
            AcexAnalyzer::BinarySearch => binary_search(acex, low, high)?,
            AcexAnalyzer::ExponentialForward => exponential_forward(acex, low, high)?,
            AcexAnalyzer::ExponentialBackward => exponential_backward(acex, low, high)?,
        };
        trace!(
            "{} located breakpoint {index} in [{low}, {high}] after {} evaluations",
            self.name(),
            acex.evaluations()
        );
        Ok(index)
    }
}

fn linear_forward<A: AbstractCounterexample>(
    acex: &mut LazyCounterexample<A>,
    low: usize,
    high: usize,
) -> Result<usize, A::Error> {
    for i in low + 1..high {
        if acex.effect(i)? {
            return Ok(i - 1);
        }
    }
    Ok(high - 1)
}

fn linear_backward<A: AbstractCounterexample>(
    acex: &mut LazyCounterexample<A>,
    low: usize,
    high: usize,
) -> Result<usize, A::Error> {
    for i in (low + 1..high).rev() {
        if !acex.effect(i)? {
            return Ok(i);
        }
    }
    Ok(low)
}

/// Invariant: effect at `low` is `false`, effect at `high` is `true`.
fn binary_search<A: AbstractCounterexample>(
    acex: &mut LazyCounterexample<A>,
    mut low: usize,
    mut high: usize,
) -> Result<usize, A::Error> {
    while high - low > 1 {
        let mid = low + (high - low) / 2;
        if acex.effect(mid)? {
            high = mid;
        } else {
            low = mid;
        }
    }
    Ok(low)
}

fn exponential_forward<A: AbstractCounterexample>(
    acex: &mut LazyCounterexample<A>,
    mut low: usize,
    mut high: usize,
) -> Result<usize, A::Error> {
    let mut step = 1;
    while low + step < high {
        let next = low + step;
        if acex.effect(next)? {
            high = next;
            break;
        }
        low = next;
        step *= 2;
    }
    binary_search(acex, low, high)
}

fn exponential_backward<A: AbstractCounterexample>(
    acex: &mut LazyCounterexample<A>,
    mut low: usize,
    mut high: usize,
) -> Result<usize, A::Error> {
    let mut step = 1;
    while high > low + step {
        let next = high - step;
        if !acex.effect(next)? {
            low = next;
            break;
        }
        high = next;
        step *= 2;
    }
    binary_search(acex, low, high)
}

impl Display for AcexAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AcexAnalyzer {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if matches!(name.as_str(), "binary-search-fwd" | "binary-search-bwd") {
            return Ok(AcexAnalyzer::BinarySearch);
        }
        Self::ALL
            .into_iter()
            .find(|analyzer| analyzer.name() == name)
            .ok_or_else(|| ConfigError::UnknownAnalyzer(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    /// Effects switch from `false` to `true` at `breakpoint + 1`.
    struct Step {
        len: usize,
        breakpoint: usize,
    }

    impl AbstractCounterexample for Step {
        type Error = Infallible;

        fn len(&self) -> usize {
            self.len
        }

        fn compute_effect(&mut self, index: usize) -> Result<bool, Infallible> {
            Ok(index > self.breakpoint)
        }
    }

    struct Failing;

    impl AbstractCounterexample for Failing {
        type Error = &'static str;

        fn len(&self) -> usize {
            10
        }

        fn compute_effect(&mut self, _: usize) -> Result<bool, &'static str> {
            Err("no answer")
        }
    }

    #[test_log::test]
    fn analyzers_find_the_breakpoint() {
        for len in 2..40 {
            for low in 0..len - 1 {
                for breakpoint in low..len - 1 {
                    for analyzer in AcexAnalyzer::ALL {
                        let mut acex = LazyCounterexample::new(Step { len, breakpoint });
                        assert_eq!(
                            analyzer.analyze(&mut acex, low),
                            Ok(breakpoint),
                            "{analyzer} failed for len {len}, low {low}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn binary_search_is_logarithmic() {
        for len in 2..130usize {
            let bound = (usize::BITS - (len - 2).leading_zeros()) as usize;
            for breakpoint in 0..len - 1 {
                let mut acex = LazyCounterexample::new(Step { len, breakpoint });
                acex.set_effect(len - 1, true);
                AcexAnalyzer::BinarySearch.analyze(&mut acex, 0).unwrap();
                // ⌈log2(len - 1)⌉
                assert!(
                    acex.evaluations() <= bound,
                    "{} evaluations for length {len}",
                    acex.evaluations()
                );
            }
        }
    }

    #[test]
    fn effects_are_memoized() {
        let mut acex = LazyCounterexample::new(Step {
            len: 8,
            breakpoint: 3,
        });
        assert_eq!(acex.effect(5), Ok(true));
        assert_eq!(acex.effect(5), Ok(true));
        acex.set_effect(2, false);
        assert_eq!(acex.effect(2), Ok(false));
        assert_eq!(acex.evaluations(), 1);
        assert_eq!(acex.into_inner().breakpoint, 3);
    }

    #[test]
    fn analyzer_errors_propagate() {
        let mut acex = LazyCounterexample::new(Failing);
        assert_eq!(
            AcexAnalyzer::BinarySearch.analyze(&mut acex, 0),
            Err("no answer")
        );
        assert_eq!(acex.evaluations(), 0);
    }

    #[test]
    fn analyzer_names() {
        for analyzer in AcexAnalyzer::ALL {
            assert_eq!(analyzer.to_string().parse(), Ok(analyzer));
        }
        assert_eq!(" Binary-Search".parse(), Ok(AcexAnalyzer::BinarySearch));
        assert_eq!("binary-search-fwd".parse(), Ok(AcexAnalyzer::BinarySearch));
        assert_eq!("BINARY-SEARCH-BWD".parse(), Ok(AcexAnalyzer::BinarySearch));
        assert_eq!(AcexAnalyzer::BinarySearch.name(), "binary-search");
        assert_eq!(
            "rivest-schapire".parse::<AcexAnalyzer>(),
            Err(ConfigError::UnknownAnalyzer("rivest-schapire".into()))
        );
        assert_eq!(AcexAnalyzer::default(), AcexAnalyzer::BinarySearch);
    }
}
