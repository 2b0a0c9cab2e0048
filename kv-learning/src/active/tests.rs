use std::{cell::Cell, convert::Infallible};

use kv_automata::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::{
    acex::AcexAnalyzer, datastructure::DiscriminationTree, LearnerError, ResumeDiagnostic,
};

use super::*;

fn even_number_of_a() -> Dfa<char> {
    Dfa::builder()
        .with_accepting([true, false])
        .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
        .into_dfa(0)
}

fn count_a_modulo(modulus: usize) -> Dfa<char> {
    Dfa::builder()
        .with_accepting((0..modulus).map(|state| state == 0))
        .with_transitions(
            (0..modulus)
                .flat_map(|state| [(state, 'a', (state + 1) % modulus), (state, 'b', state)]),
        )
        .into_dfa(0)
}

fn alternating() -> MealyMachine<char, u8> {
    MealyMachine::builder()
        .with_transitions([(0, 'a', 1, 1), (1, 'a', 2, 0)])
        .into_mealy(0)
}

fn word(w: &str) -> Vec<char> {
    w.chars().collect()
}

fn random_dfa(rng: &mut StdRng, alphabet: &CharAlphabet) -> Dfa<char> {
    let size = rng.gen_range(1..=7);
    let mut dfa = Dfa::new(alphabet.clone());
    for _ in 0..size {
        dfa.add_state(rng.gen_bool(0.5));
    }
    dfa.set_initial(0);
    for state in 0..size {
        for symbol in 0..alphabet.size() {
            dfa.set_transition(state, symbol, rng.gen_range(0..size));
        }
    }
    dfa
}

fn random_mealy(rng: &mut StdRng, alphabet: &CharAlphabet) -> MealyMachine<char, u8> {
    let size = rng.gen_range(1..=6);
    let mut mm = MealyMachine::new(alphabet.clone());
    for _ in 0..size {
        mm.add_state();
    }
    mm.set_initial(0);
    for state in 0..size {
        for symbol in 0..alphabet.size() {
            mm.set_transition(state, symbol, rng.gen_range(0..size), rng.gen_range(0..3));
        }
    }
    mm
}

/// Runs the learner against the simulated target until no counterexample is left, returns
/// the number of counterexamples that were used.
fn learn_dfa<M>(learner: &mut KearnsVaziraniDfa<char, M>, simulator: &DfaOracle<char>) -> usize
where
    M: MembershipOracle<Input = char, Output = bool>,
{
    let mut rounds = 0;
    while let Some(ce) = simulator.find_counterexample(learner.hypothesis().unwrap()) {
        assert!(
            learner.refine_hypothesis(&ce).unwrap(),
            "counterexample {} was rejected",
            ce.show()
        );
        rounds += 1;
        assert!(rounds <= 64, "learning does not terminate");
    }
    rounds
}

fn learn_mealy<M>(
    learner: &mut KearnsVaziraniMealy<char, u8, M>,
    simulator: &MealyOracle<char, u8>,
) -> usize
where
    M: MembershipOracle<Input = char, Output = Vec<u8>>,
{
    let mut rounds = 0;
    while let Some(ce) = simulator.find_counterexample(learner.hypothesis().unwrap()) {
        assert!(
            learner.refine_hypothesis(&ce).unwrap(),
            "counterexample {} was rejected",
            ce.show()
        );
        rounds += 1;
        assert!(rounds <= 64, "learning does not terminate");
    }
    rounds
}

/// Sifting the access sequence of every state from the root must lead to the leaf of that
/// state.
fn assert_access_sequences_sift_home<O: Color, M>(
    tree: &DiscriminationTree<char, O>,
    state_infos: &[StateInfo<char>],
    oracle: &M,
) where
    M: MembershipOracle<Input = char, Output = O>,
{
    let mut tree = tree.clone();
    for info in state_infos {
        let root = tree.root();
        let leaf = tree
            .sift(oracle, info.access_sequence(), root)
            .unwrap_or_else(|_| panic!("oracle failed"));
        assert_eq!(leaf, info.leaf(), "state {} is misplaced", info.show());
        assert_eq!(tree.state(leaf), Some(info.id()));
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("oracle ran out of queries")]
struct OutOfQueries;

/// Answers at most `budget` queries, if a budget is set.
struct Limited<M> {
    inner: M,
    budget: Cell<Option<usize>>,
}

impl<M> Limited<M> {
    fn new(inner: M) -> Self {
        Self {
            inner,
            budget: Cell::new(None),
        }
    }

    fn limit(&self, budget: Option<usize>) {
        self.budget.set(budget);
    }

    fn consume(&self, queries: usize) -> Result<(), OutOfQueries> {
        match self.budget.get() {
            Some(left) if left < queries => Err(OutOfQueries),
            Some(left) => {
                self.budget.set(Some(left - queries));
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<M: MembershipOracle<Error = Infallible>> MembershipOracle for Limited<M> {
    type Input = M::Input;
    type Output = M::Output;
    type Error = OutOfQueries;

    fn answer(&self, query: Query<'_, M::Input>) -> Result<M::Output, OutOfQueries> {
        self.consume(1)?;
        self.inner.answer(query).map_err(|never| match never {})
    }

    fn answer_batch(
        &self,
        queries: &[Query<'_, M::Input>],
    ) -> Result<Vec<M::Output>, OutOfQueries> {
        self.consume(queries.len())?;
        self.inner
            .answer_batch(queries)
            .map_err(|never| match never {})
    }
}

/// Counts only queries that are posed one at a time.
struct SingleQueries<M> {
    inner: M,
    single: Cell<usize>,
}

impl<M: MembershipOracle> MembershipOracle for SingleQueries<M> {
    type Input = M::Input;
    type Output = M::Output;
    type Error = M::Error;

    fn answer(&self, query: Query<'_, M::Input>) -> Result<M::Output, M::Error> {
        self.single.set(self.single.get() + 1);
        self.inner.answer(query)
    }

    fn answer_batch(&self, queries: &[Query<'_, M::Input>]) -> Result<Vec<M::Output>, M::Error> {
        self.inner.answer_batch(queries)
    }
}

#[test_log::test]
fn kv_dfa_even_number_of_a() {
    let simulator = DfaOracle::new(even_number_of_a());
    let oracle = CountingOracle::new(simulator.clone());
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &oracle);
    learner.start_learning().unwrap();

    // ε is asked on its own, then one batch per initialized state
    assert_eq!(oracle.queries(), 5);
    assert_eq!(oracle.batches(), 2);

    let hypothesis = learner.hypothesis().unwrap();
    assert_eq!(hypothesis.size(), 2);
    assert!(hypothesis.accepts(word("aa")));
    assert!(!hypothesis.accepts(word("ab")));
    assert_eq!(simulator.automaton().separating_word(hypothesis), None);

    let before = learner.suspend();
    assert!(!learner
        .refine_hypothesis(&Counterexample::new(word("aa"), true))
        .unwrap());
    assert_eq!(learner.suspend(), before);
    assert_access_sequences_sift_home(
        learner.discrimination_tree(),
        learner.state_infos(),
        &simulator,
    );
}

#[test_log::test]
fn kv_dfa_grows_for_modulo_three() {
    let simulator = DfaOracle::new(count_a_modulo(3));
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &simulator);
    learner.start_learning().unwrap();
    assert_eq!(learner.hypothesis().unwrap().size(), 2);
    assert!(!learner.hypothesis().unwrap().accepts(word("aaa")));

    assert!(learner
        .refine_hypothesis(&Counterexample::new(word("aaa"), true))
        .unwrap());
    let hypothesis = learner.hypothesis().unwrap();
    assert_eq!(hypothesis.size(), 3);
    assert!(hypothesis.accepts(word("aaa")));
    assert_eq!(simulator.automaton().separating_word(hypothesis), None);

    // the state that was split and the new state are siblings
    let infos = learner.state_infos();
    assert_eq!(infos[2].access_sequence(), &['a', 'a']);
    let tree = learner.discrimination_tree();
    assert_eq!(tree.parent(infos[1].leaf()), tree.parent(infos[2].leaf()));
    assert_eq!(
        tree.parent(infos[1].leaf()).and_then(|node| tree.discriminator(node)),
        Some(&['a'][..])
    );
    assert_eq!(tree.size(), 5);
    assert_access_sequences_sift_home(tree, infos, &simulator);
}

#[test_log::test]
fn kv_mealy_alternating_outputs() {
    let simulator = MealyOracle::new(alternating());
    let mut learner = KearnsVaziraniMealy::new(alphabet!('a'), &simulator)
        .with_config(KvConfig::default().with_repeated_evaluation(false));
    learner.start_learning().unwrap();
    assert_eq!(learner.hypothesis().unwrap().size(), 1);
    assert_eq!(
        learner.hypothesis().unwrap().transform(word("aaa")),
        Some(vec![1, 1, 1])
    );

    let ce = Counterexample::new(word("aaa"), vec![1, 2, 1]);
    assert!(learner.refine_hypothesis(&ce).unwrap());
    let hypothesis = learner.hypothesis().unwrap();
    assert_eq!(hypothesis.size(), 2);
    assert_eq!(hypothesis.transform(word("aaaa")), Some(vec![1, 2, 1, 2]));
    assert_eq!(simulator.automaton().separating_word(hypothesis), None);

    let tree = learner.discrimination_tree();
    assert_eq!(tree.discriminator(tree.root()), Some(&['a'][..]));
    assert_eq!(tree.state(tree.child(tree.root(), &vec![1]).unwrap()), Some(0));
    assert_eq!(tree.state(tree.child(tree.root(), &vec![2]).unwrap()), Some(1));
    assert_access_sequences_sift_home(tree, learner.state_infos(), &simulator);

    // no longer a counterexample
    let before = learner.suspend();
    assert!(!learner.refine_hypothesis(&ce).unwrap());
    assert_eq!(learner.suspend(), before);
}

#[test]
fn kv_short_counterexamples_are_ignored() {
    let simulator = DfaOracle::new(count_a_modulo(3));
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &simulator);
    learner.start_learning().unwrap();
    let before = learner.suspend();
    // wrong output, but too short to be analyzed
    assert!(!learner
        .refine_hypothesis(&Counterexample::new(word("a"), true))
        .unwrap());
    assert!(!learner
        .refine_hypothesis(&Counterexample::new(vec![], false))
        .unwrap());
    assert_eq!(learner.suspend(), before);
}

#[test]
fn kv_usage_errors() {
    let simulator = DfaOracle::new(even_number_of_a());
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &simulator);
    assert!(!learner.is_started());
    assert!(matches!(learner.hypothesis(), Err(LearnerError::NotStarted)));
    assert!(matches!(
        learner.refine_hypothesis(&Counterexample::new(word("aa"), false)),
        Err(LearnerError::NotStarted)
    ));

    learner.start_learning().unwrap();
    assert!(matches!(
        learner.start_learning(),
        Err(LearnerError::AlreadyStarted)
    ));
    assert!(matches!(
        learner.refine_hypothesis(&Counterexample::new(word("aca"), false)),
        Err(LearnerError::UnknownSymbol { position: 1 })
    ));

    let simulator = MealyOracle::new(alternating());
    let mut learner = KearnsVaziraniMealy::new(alphabet!('a'), &simulator);
    learner.start_learning().unwrap();
    assert!(matches!(
        learner.refine_hypothesis(&Counterexample::new(word("aa"), vec![1])),
        Err(LearnerError::MalformedCounterexample {
            inputs: 2,
            outputs: 1
        })
    ));
}

#[test_log::test]
fn kv_failed_start_leaves_learner_unstarted() {
    let oracle = Limited::new(DfaOracle::new(count_a_modulo(3)));
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &oracle);

    // ε can be classified, but the transitions of the initial state cannot
    oracle.limit(Some(1));
    assert!(matches!(
        learner.start_learning(),
        Err(LearnerError::Oracle(OutOfQueries))
    ));
    assert!(!learner.is_started());
    assert!(!learner.is_poisoned());
    assert!(learner.state_infos().is_empty());

    oracle.limit(None);
    learner.start_learning().unwrap();
    assert_eq!(learner.hypothesis().unwrap().size(), 2);
}

#[test_log::test]
fn kv_oracle_failures_poison_only_during_updates() {
    let oracle = Limited::new(DfaOracle::new(count_a_modulo(3)));
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &oracle);
    learner.start_learning().unwrap();
    let snapshot = learner.suspend();
    let ce = Counterexample::new(word("aaa"), true);

    // failing during the analysis leaves everything as it was
    oracle.limit(Some(0));
    assert!(matches!(
        learner.refine_hypothesis(&ce),
        Err(LearnerError::Oracle(OutOfQueries))
    ));
    assert!(!learner.is_poisoned());
    assert_eq!(learner.suspend(), snapshot);

    // enough for confirming the counterexample and the analysis, but not for the split
    oracle.limit(Some(2));
    assert!(matches!(
        learner.refine_hypothesis(&ce),
        Err(LearnerError::Oracle(OutOfQueries))
    ));
    assert!(learner.is_poisoned());
    assert!(matches!(learner.hypothesis(), Err(LearnerError::Poisoned)));
    oracle.limit(None);
    assert!(matches!(
        learner.refine_hypothesis(&ce),
        Err(LearnerError::Poisoned)
    ));
    assert!(matches!(
        learner.add_alphabet_symbol('c'),
        Err(LearnerError::Poisoned)
    ));

    assert_eq!(learner.resume(snapshot), None);
    assert!(!learner.is_poisoned());
    assert!(learner.refine_hypothesis(&ce).unwrap());
    assert_eq!(learner.hypothesis().unwrap().size(), 3);
}

#[test_log::test]
fn kv_inconsistent_counterexamples_are_rejected() {
    let simulator = MealyOracle::new(alternating());
    let mut learner = KearnsVaziraniMealy::new(alphabet!('a'), &simulator);
    learner.start_learning().unwrap();
    let snapshot = learner.suspend();

    // the target never outputs 9, repeating this must not keep adding states
    for _ in 0..3 {
        assert!(matches!(
            learner.refine_hypothesis(&Counterexample::new(word("aa"), vec![9, 9])),
            Err(LearnerError::InconsistentCounterexample { position: 0 })
        ));
        assert!(!learner.is_poisoned());
        assert_eq!(learner.suspend(), snapshot);
    }
    assert!(matches!(
        learner.refine_hypothesis(&Counterexample::new(word("aa"), vec![1, 9])),
        Err(LearnerError::InconsistentCounterexample { position: 1 })
    ));
    assert_eq!(learner.suspend(), snapshot);
    assert!(learner
        .refine_hypothesis(&Counterexample::new(word("aa"), vec![1, 2]))
        .unwrap());
    assert_eq!(learner.hypothesis().unwrap().size(), 2);

    let simulator = DfaOracle::new(count_a_modulo(3));
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &simulator);
    learner.start_learning().unwrap();
    let snapshot = learner.suspend();
    assert!(!learner.hypothesis().unwrap().accepts(word("aa")));
    assert!(matches!(
        learner.refine_hypothesis(&Counterexample::new(word("aa"), true)),
        Err(LearnerError::InconsistentCounterexample { position: 2 })
    ));
    assert!(!learner.is_poisoned());
    assert_eq!(learner.suspend(), snapshot);
    assert_eq!(learner.hypothesis().unwrap().size(), 2);
}

#[test_log::test]
fn kv_suspend_and_resume() {
    let simulator = DfaOracle::new(count_a_modulo(3));
    let mut first = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &simulator);
    first.start_learning().unwrap();
    let snapshot = first.suspend();

    let mut second = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &simulator);
    assert_eq!(second.resume(snapshot.clone()), None);
    assert!(second.is_started());
    assert_eq!(second.hypothesis().unwrap(), snapshot.hypothesis());

    let ce = Counterexample::new(word("aaa"), true);
    assert!(first.refine_hypothesis(&ce).unwrap());
    assert!(second.refine_hypothesis(&ce).unwrap());
    assert_eq!(first.suspend(), second.suspend());

    let mut reordered = KearnsVaziraniDfa::new(alphabet!('b', 'a'), &simulator);
    assert_eq!(
        reordered.resume(snapshot),
        Some(ResumeDiagnostic::AlphabetMismatch {
            learner: alphabet!('b', 'a'),
            suspended: alphabet!('a', 'b'),
        })
    );
    // learning continues with the resumed state
    assert_eq!(learn_dfa(&mut reordered, &simulator), 1);

    let simulator = MealyOracle::new(alternating());
    let mut mealy = KearnsVaziraniMealy::new(alphabet!('a'), &simulator);
    mealy.start_learning().unwrap();
    let snapshot = mealy.suspend();
    learn_mealy(&mut mealy, &simulator);
    let mut resumed = KearnsVaziraniMealy::new(alphabet!('a'), &simulator);
    assert_eq!(resumed.resume(snapshot), None);
    learn_mealy(&mut resumed, &simulator);
    assert_eq!(mealy.suspend(), resumed.suspend());
}

#[test_log::test]
fn kv_dfa_add_alphabet_symbol() {
    let simulator = DfaOracle::new(count_a_modulo(3));
    // counterexamples over `a` only, while queries are answered for the full alphabet
    let restricted = DfaOracle::new(
        Dfa::builder()
            .with_accepting([true, false, false])
            .with_transitions([(0, 'a', 1), (1, 'a', 2), (2, 'a', 0)])
            .into_dfa(0),
    );
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a'), &simulator);
    learner.start_learning().unwrap();
    learn_dfa(&mut learner, &restricted);
    assert_eq!(learner.hypothesis().unwrap().size(), 3);

    assert!(!learner.add_alphabet_symbol('a').unwrap());
    assert!(learner.add_alphabet_symbol('b').unwrap());
    assert_eq!(learner.alphabet(), &alphabet!('a', 'b'));
    let hypothesis = learner.hypothesis().unwrap();
    assert!(hypothesis.is_complete());
    assert_eq!(hypothesis.size(), 3);
    assert_eq!(simulator.automaton().separating_word(hypothesis), None);
    assert!(!learner.add_alphabet_symbol('b').unwrap());

    // symbols added before learning starts are simply part of the alphabet
    let mut unstarted = KearnsVaziraniDfa::new(alphabet!('a'), &simulator);
    assert!(unstarted.add_alphabet_symbol('b').unwrap());
    unstarted.start_learning().unwrap();
    learn_dfa(&mut unstarted, &simulator);
    assert_eq!(unstarted.suspend().hypothesis().size(), 3);
}

#[test_log::test]
fn kv_mealy_add_alphabet_symbol() {
    // `b` moves into a second state that outputs 1 on `a`
    let target = MealyMachine::builder()
        .with_transitions([
            (0, 'a', 0u8, 0),
            (0, 'b', 0, 1),
            (1, 'a', 1, 1),
            (1, 'b', 0, 1),
        ])
        .into_mealy(0);
    let simulator = MealyOracle::new(target);
    let mut learner = KearnsVaziraniMealy::new(alphabet!('a'), &simulator);
    learner.start_learning().unwrap();
    assert_eq!(learner.hypothesis().unwrap().size(), 1);

    let sizes_before = learner.state_infos().len();
    assert!(learner.add_alphabet_symbol('b').unwrap());
    assert!(learner.state_infos().len() >= sizes_before);
    assert!(learner.hypothesis().unwrap().is_complete());

    learn_mealy(&mut learner, &simulator);
    assert_eq!(learner.hypothesis().unwrap().size(), 2);
}

#[test]
fn kv_binary_search_needs_logarithmically_many_effects() {
    let simulator = DfaOracle::new(count_a_modulo(8));
    let oracle = SingleQueries {
        inner: &simulator,
        single: Cell::new(0),
    };
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &oracle)
        .with_config(KvConfig::default().with_repeated_evaluation(false));
    learner.start_learning().unwrap();
    // ε is the only query that is not batched
    assert_eq!(oracle.single.get(), 1);
    oracle.single.set(0);

    // one query confirms the counterexample, and every state sits directly below the root,
    // so an effect costs exactly one query
    assert!(learner
        .refine_hypothesis(&Counterexample::new(vec!['a'; 8], true))
        .unwrap());
    assert!(oracle.single.get() <= 1 + 3, "{} queries", oracle.single.get());
}

#[test_log::test]
fn kv_monotone_growth() {
    let simulator = DfaOracle::new(count_a_modulo(5));
    let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &simulator)
        .with_config(KvConfig::default().with_repeated_evaluation(false));
    learner.start_learning().unwrap();

    let mut states = learner.hypothesis().unwrap().size();
    let mut nodes = learner.discrimination_tree().size();
    while let Some(ce) = simulator.find_counterexample(learner.hypothesis().unwrap()) {
        assert!(learner.refine_hypothesis(&ce).unwrap());
        let hypothesis = learner.hypothesis().unwrap();
        assert!(hypothesis.size() > states);
        assert!(learner.discrimination_tree().size() > nodes);
        assert_eq!(learner.state_infos().len(), hypothesis.size());
        assert_eq!(
            learner.discrimination_tree().leaves().count(),
            hypothesis.size()
        );
        states = hypothesis.size();
        nodes = learner.discrimination_tree().size();
    }
    assert_eq!(states, 5);
}

#[test_log::test]
fn kv_dfa_learns_random_targets() {
    let mut rng = StdRng::seed_from_u64(0x6b76);
    let alphabet = CharAlphabet::of_size(3);
    for round in 0..40 {
        let target = random_dfa(&mut rng, &alphabet);
        let simulator = DfaOracle::new(target);
        let analyzer = AcexAnalyzer::ALL[round % AcexAnalyzer::ALL.len()];
        let config = KvConfig::default()
            .with_analyzer(analyzer)
            .with_repeated_evaluation(round % 2 == 0);
        let mut learner =
            KearnsVaziraniDfa::new(alphabet.clone(), &simulator).with_config(config);
        learner.start_learning().unwrap();
        learn_dfa(&mut learner, &simulator);

        let hypothesis = learner.hypothesis().unwrap();
        assert!(hypothesis.is_complete());
        assert!(hypothesis.size() <= simulator.automaton().size());
        assert_eq!(simulator.automaton().separating_word(hypothesis), None);
        assert_access_sequences_sift_home(
            learner.discrimination_tree(),
            learner.state_infos(),
            &simulator,
        );
    }
}

#[test_log::test]
fn kv_mealy_learns_random_targets() {
    let mut rng = StdRng::seed_from_u64(0x6d6d);
    let alphabet = CharAlphabet::of_size(2);
    for round in 0..40 {
        let target = random_mealy(&mut rng, &alphabet);
        let simulator = MealyOracle::new(target);
        let analyzer = AcexAnalyzer::ALL[round % AcexAnalyzer::ALL.len()];
        let config = KvConfig::default()
            .with_analyzer(analyzer)
            .with_repeated_evaluation(round % 3 != 0);
        let mut learner =
            KearnsVaziraniMealy::new(alphabet.clone(), &simulator).with_config(config);
        learner.start_learning().unwrap();
        learn_mealy(&mut learner, &simulator);

        let hypothesis = learner.hypothesis().unwrap();
        assert!(hypothesis.is_complete());
        assert!(hypothesis.size() <= simulator.automaton().size());
        assert_eq!(simulator.automaton().separating_word(hypothesis), None);
        assert_access_sequences_sift_home(
            learner.discrimination_tree(),
            learner.state_infos(),
            &simulator,
        );
    }
}
