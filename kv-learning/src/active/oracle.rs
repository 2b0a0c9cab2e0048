use std::{cell::Cell, convert::Infallible, marker::PhantomData};

use kv_automata::prelude::*;
use tracing::{trace, warn};

use crate::SimulationError;

/// A membership query for the word `prefix · suffix`. The two parts are kept apart since
/// transducers only report the output that is produced while reading the suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Query<'a, I> {
    prefix: &'a [I],
    suffix: &'a [I],
}

impl<'a, I> Query<'a, I> {
    /// Creates a query for `prefix · suffix`.
    pub fn new(prefix: &'a [I], suffix: &'a [I]) -> Self {
        Self { prefix, suffix }
    }

    /// The part of the word that leads to the state which is queried.
    pub fn prefix(&self) -> &'a [I] {
        self.prefix
    }

    /// The part of the word whose effect is observed.
    pub fn suffix(&self) -> &'a [I] {
        self.suffix
    }

    /// Length of the queried word.
    pub fn len(&self) -> usize {
        self.prefix.len() + self.suffix.len()
    }

    /// Returns true if both prefix and suffix are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the symbols of the concatenation.
    pub fn symbols(&self) -> impl Iterator<Item = &'a I> + 'a {
        self.prefix.iter().chain(self.suffix.iter())
    }

    /// Returns the concatenation of prefix and suffix.
    pub fn input(&self) -> Vec<I>
    where
        I: Clone,
    {
        self.symbols().cloned().collect()
    }
}

impl<I: Show> Show for Query<'_, I> {
    fn show(&self) -> String {
        format!("{}·{}", self.prefix.show(), self.suffix.show())
    }
}

/// A membership oracle answers queries about the system under learning. For acceptors the
/// output is the classification of the whole word `prefix · suffix`, for Mealy machines it is
/// the output word produced while reading the suffix (so its length equals that of the
/// suffix).
///
/// Learners pose their queries through [`MembershipOracle::answer_batch`] whenever they have
/// more than one independent query at hand. Implementations are free to answer a batch in
/// parallel, the results must however be returned in the order of the queries.
pub trait MembershipOracle {
    /// The type of input symbols.
    type Input: Symbol;
    /// The type of answers.
    type Output: Color;
    /// Failures of the oracle, these are handed to the caller unchanged.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Answers a single query.
    fn answer(&self, query: Query<'_, Self::Input>) -> Result<Self::Output, Self::Error>;

    /// Answers a batch of queries, the i-th answer belongs to the i-th query.
    fn answer_batch(
        &self,
        queries: &[Query<'_, Self::Input>],
    ) -> Result<Vec<Self::Output>, Self::Error> {
        queries.iter().map(|query| self.answer(*query)).collect()
    }
}

impl<M: MembershipOracle> MembershipOracle for &M {
    type Input = M::Input;
    type Output = M::Output;
    type Error = M::Error;

    fn answer(&self, query: Query<'_, Self::Input>) -> Result<Self::Output, Self::Error> {
        M::answer(self, query)
    }

    fn answer_batch(
        &self,
        queries: &[Query<'_, Self::Input>],
    ) -> Result<Vec<Self::Output>, Self::Error> {
        M::answer_batch(self, queries)
    }
}

/// A word on which the hypothesis and the system under learning disagree, together with the
/// output the system produces on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Counterexample<I, O> {
    /// The input word.
    pub input: Vec<I>,
    /// What the system under learning produces on `input`.
    pub output: O,
}

impl<I, O> Counterexample<I, O> {
    /// Creates a new counterexample.
    pub fn new(input: Vec<I>, output: O) -> Self {
        Self { input, output }
    }
}

impl<I: Show, O: Show> Show for Counterexample<I, O> {
    fn show(&self) -> String {
        format!("{} ↦ {}", self.input.show(), self.output.show())
    }
}

/// An equivalence oracle checks whether a hypothesis is correct and otherwise produces a
/// [`Counterexample`].
pub trait EquivalenceOracle<H: Hypothesis> {
    /// Returns a counterexample for `hypothesis` or `None` if none could be found.
    fn find_counterexample(&self, hypothesis: &H) -> Option<Counterexample<H::Symbol, H::Output>>;
}

/// Answers queries by simulating a known [`Dfa`]. Mainly used to evaluate learners, as it
/// also decides equivalence exactly.
#[derive(Debug, Clone)]
pub struct DfaOracle<S: Symbol> {
    automaton: Dfa<S>,
}

impl<S: Symbol> DfaOracle<S> {
    /// Creates an oracle for the language of `automaton`.
    pub fn new(automaton: Dfa<S>) -> Self {
        Self { automaton }
    }

    /// The simulated automaton.
    pub fn automaton(&self) -> &Dfa<S> {
        &self.automaton
    }
}

impl<S: Symbol> MembershipOracle for DfaOracle<S> {
    type Input = S;
    type Output = bool;
    type Error = Infallible;

    fn answer(&self, query: Query<'_, S>) -> Result<bool, Infallible> {
        Ok(self.automaton.accepts(query.symbols().copied()))
    }
}

impl<S: Symbol> EquivalenceOracle<Dfa<S>> for DfaOracle<S> {
    fn find_counterexample(&self, hypothesis: &Dfa<S>) -> Option<Counterexample<S, bool>> {
        let word = self.automaton.separating_word(hypothesis)?;
        let output = self.automaton.accepts(word.iter().copied());
        trace!("hypothesis is refuted by {}", word.show());
        Some(Counterexample::new(word, output))
    }
}

/// Answers queries by simulating a known [`MealyMachine`]. If the simulated machine is partial,
/// queries that leave its domain fail with a [`SimulationError`].
#[derive(Debug, Clone)]
pub struct MealyOracle<S: Symbol, O: Color> {
    automaton: MealyMachine<S, O>,
}

impl<S: Symbol, O: Color> MealyOracle<S, O> {
    /// Creates an oracle that simulates `automaton`.
    pub fn new(automaton: MealyMachine<S, O>) -> Self {
        Self { automaton }
    }

    /// The simulated automaton.
    pub fn automaton(&self) -> &MealyMachine<S, O> {
        &self.automaton
    }
}

impl<S: Symbol, O: Color> MembershipOracle for MealyOracle<S, O> {
    type Input = S;
    type Output = Vec<O>;
    type Error = SimulationError;

    fn answer(&self, query: Query<'_, S>) -> Result<Vec<O>, SimulationError> {
        let mut state = self
            .automaton
            .initial()
            .ok_or(SimulationError::UndefinedTransition { position: 0 })?;
        let mut outputs = Vec::with_capacity(query.suffix().len());
        for (position, &symbol) in query.symbols().enumerate() {
            let (target, output) = self
                .automaton
                .transition(state, symbol)
                .ok_or(SimulationError::UndefinedTransition { position })?;
            if position >= query.prefix().len() {
                outputs.push(output.clone());
            }
            state = target;
        }
        Ok(outputs)
    }
}

impl<S: Symbol, O: Color> EquivalenceOracle<MealyMachine<S, O>> for MealyOracle<S, O> {
    fn find_counterexample(
        &self,
        hypothesis: &MealyMachine<S, O>,
    ) -> Option<Counterexample<S, Vec<O>>> {
        let word = self.automaton.separating_word(hypothesis)?;
        match self.automaton.transform(word.iter().copied()) {
            Some(output) => Some(Counterexample::new(word, output)),
            None => {
                warn!(
                    "simulated machine is undefined on separating word {}",
                    word.show()
                );
                None
            }
        }
    }
}

/// Wraps a function that answers queries. The function cannot fail.
pub struct FnOracle<I, O, F> {
    function: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnOracle<I, O, F>
where
    F: Fn(Query<'_, I>) -> O,
{
    /// Creates an oracle which answers queries by calling `function`.
    pub fn new(function: F) -> Self {
        Self {
            function,
            _marker: PhantomData,
        }
    }
}

impl<I: Symbol, O: Color, F> MembershipOracle for FnOracle<I, O, F>
where
    F: Fn(Query<'_, I>) -> O,
{
    type Input = I;
    type Output = O;
    type Error = Infallible;

    fn answer(&self, query: Query<'_, I>) -> Result<O, Infallible> {
        Ok((self.function)(query))
    }
}

/// Forwards every query to an inner oracle and keeps track of how many queries and how many
/// batches were posed.
#[derive(Debug)]
pub struct CountingOracle<M> {
    inner: M,
    queries: Cell<usize>,
    batches: Cell<usize>,
}

impl<M: MembershipOracle> CountingOracle<M> {
    /// Wraps `inner`.
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            queries: Cell::new(0),
            batches: Cell::new(0),
        }
    }

    /// Number of queries answered so far, queries in a batch are counted individually.
    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    /// Number of calls to [`MembershipOracle::answer_batch`].
    pub fn batches(&self) -> usize {
        self.batches.get()
    }

    /// Sets both counters to zero.
    pub fn reset(&self) {
        self.queries.set(0);
        self.batches.set(0);
    }

    /// Gives access to the wrapped oracle.
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: MembershipOracle> MembershipOracle for CountingOracle<M> {
    type Input = M::Input;
    type Output = M::Output;
    type Error = M::Error;

    fn answer(&self, query: Query<'_, M::Input>) -> Result<M::Output, M::Error> {
        self.queries.set(self.queries.get() + 1);
        self.inner.answer(query)
    }

    fn answer_batch(
        &self,
        queries: &[Query<'_, M::Input>],
    ) -> Result<Vec<M::Output>, M::Error> {
        self.batches.set(self.batches.get() + 1);
        self.queries.set(self.queries.get() + queries.len());
        self.inner.answer_batch(queries)
    }
}

#[cfg(test)]
mod tests {
    use kv_automata::prelude::*;

    use super::*;

    #[test]
    fn dfa_oracle_answers_concatenation() {
        let dfa = Dfa::builder()
            .with_accepting([true, false])
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .into_dfa(0);
        let oracle = DfaOracle::new(dfa);
        assert_eq!(oracle.answer(Query::new(&['a'], &['a'])), Ok(true));
        assert_eq!(oracle.answer(Query::new(&['a'], &[])), Ok(false));
        assert_eq!(
            oracle.answer_batch(&[Query::new(&[], &[]), Query::new(&['b'], &['a', 'b'])]),
            Ok(vec![true, false])
        );
    }

    #[test]
    fn mealy_oracle_reports_suffix_output() {
        let mm = MealyMachine::builder()
            .with_transitions([(0, 'a', 1u8, 1), (1, 'a', 2, 0)])
            .into_mealy(0);
        let oracle = MealyOracle::new(mm);
        assert_eq!(oracle.answer(Query::new(&['a'], &['a', 'a'])), Ok(vec![2, 1]));
        assert_eq!(oracle.answer(Query::new(&['a', 'a'], &[])), Ok(vec![]));
        assert_eq!(
            oracle.answer(Query::new(&['a'], &['b'])),
            Err(SimulationError::UndefinedTransition { position: 1 })
        );
    }

    #[test]
    fn counting_oracle_counts() {
        let oracle = CountingOracle::new(FnOracle::new(|q: Query<'_, char>| q.len()));
        assert_eq!(oracle.answer(Query::new(&['a'], &['b'])), Ok(2));
        assert_eq!(
            oracle.answer_batch(&[Query::new(&[], &[]), Query::new(&['a'], &[])]),
            Ok(vec![0, 1])
        );
        assert_eq!(oracle.queries(), 3);
        assert_eq!(oracle.batches(), 1);
        oracle.reset();
        assert_eq!(oracle.queries(), 0);
    }

    #[test_log::test]
    fn equivalence_through_separating_words() {
        let target = Dfa::builder()
            .with_accepting([true, false])
            .with_transitions([(0, 'a', 1), (1, 'a', 0)])
            .into_dfa(0);
        let oracle = DfaOracle::new(target.clone());
        assert_eq!(oracle.find_counterexample(&target), None);

        let all = Dfa::builder()
            .with_accepting([true])
            .with_transitions([(0, 'a', 0)])
            .into_dfa(0);
        assert_eq!(
            oracle.find_counterexample(&all),
            Some(Counterexample::new(vec!['a'], false))
        );
    }
}
