use std::collections::VecDeque;

use kv_automata::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::{
    acex::LazyCounterexample,
    active::{
        counterexample::KvCounterexample, Counterexample, KvConfig, LearnerResult,
        MembershipOracle, Query, Separator, StateInfo, TransitionRef,
    },
    datastructure::{DiscriminationTree, NodeId},
    LearnerError, ResumeDiagnostic,
};

/// The learned structure of a [`KearnsVaziraniMealy`], see [`KearnsVaziraniMealy::suspend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvMealyState<I: Symbol, O: Color> {
    hypothesis: MealyMachine<I, O>,
    tree: DiscriminationTree<I, Vec<O>>,
    state_infos: Vec<StateInfo<I>>,
}

impl<I: Symbol, O: Color> KvMealyState<I, O> {
    fn new(alphabet: Alphabet<I>) -> Self {
        Self {
            hypothesis: MealyMachine::new(alphabet),
            tree: DiscriminationTree::new(),
            state_infos: vec![],
        }
    }

    /// The hypothesis.
    pub fn hypothesis(&self) -> &MealyMachine<I, O> {
        &self.hypothesis
    }

    /// The discrimination tree, whose outcomes are output words.
    pub fn discrimination_tree(&self) -> &DiscriminationTree<I, Vec<O>> {
        &self.tree
    }

    /// Information about the states, indexed by state.
    pub fn state_infos(&self) -> &[StateInfo<I>] {
        &self.state_infos
    }
}

/// Learns a [`MealyMachine`]. Inner nodes of the discrimination tree may have arbitrarily many
/// children, one for every output word that was observed for their discriminator.
///
/// Initially the tree is a single leaf representing the initial state, all states are only
/// told apart once a counterexample exhibits a difference. The output of a transition is
/// always obtained directly from the oracle.
pub struct KearnsVaziraniMealy<I: Symbol, O: Color, M> {
    alphabet: Alphabet<I>,
    oracle: M,
    config: KvConfig,
    core: KvMealyState<I, O>,
    poisoned: bool,
}

impl<I, O, M> KearnsVaziraniMealy<I, O, M>
where
    I: Symbol,
    O: Color,
    M: MembershipOracle<Input = I, Output = Vec<O>>,
{
    /// Creates a learner with the default [`KvConfig`].
    pub fn new(alphabet: Alphabet<I>, oracle: M) -> Self {
        Self {
            core: KvMealyState::new(alphabet.clone()),
            alphabet,
            oracle,
            config: KvConfig::default(),
            poisoned: false,
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: KvConfig) -> Self {
        self.config = config;
        self
    }

    /// The alphabet the learner works with.
    pub fn alphabet(&self) -> &Alphabet<I> {
        &self.alphabet
    }

    /// The configuration in use.
    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    /// The membership oracle.
    pub fn oracle(&self) -> &M {
        &self.oracle
    }

    /// Returns true if the learner has an initial hypothesis.
    pub fn is_started(&self) -> bool {
        self.core.hypothesis.initial().is_some()
    }

    /// Returns true if an oracle failure interrupted an update of the hypothesis.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The current hypothesis.
    pub fn hypothesis(&self) -> LearnerResult<&MealyMachine<I, O>, M> {
        self.ensure_ready()?;
        Ok(&self.core.hypothesis)
    }

    /// The discrimination tree.
    pub fn discrimination_tree(&self) -> &DiscriminationTree<I, Vec<O>> {
        &self.core.tree
    }

    /// Information about the states of the hypothesis.
    pub fn state_infos(&self) -> &[StateInfo<I>] {
        &self.core.state_infos
    }

    fn ensure_ready(&self) -> LearnerResult<(), M> {
        if !self.is_started() {
            return Err(LearnerError::NotStarted);
        }
        if self.poisoned {
            return Err(LearnerError::Poisoned);
        }
        Ok(())
    }

    /// Creates the initial state and determines its transitions.
    pub fn start_learning(&mut self) -> LearnerResult<(), M> {
        if self.is_started() {
            return Err(LearnerError::AlreadyStarted);
        }
        if let Err(e) = self.initialize() {
            warn!("failed to start learning: {e}");
            self.core = KvMealyState::new(self.alphabet.clone());
            self.poisoned = false;
            return Err(e.into());
        }
        info!(
            "started learning with {} states",
            self.core.hypothesis.size()
        );
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), M::Error> {
        let initial = self.core.hypothesis.add_initial_state();
        let root = self.core.tree.root();
        self.core.tree.bind(root, initial);
        self.core
            .state_infos
            .push(StateInfo::new(initial, vec![], root));
        debug!("created initial state");

        self.connect(self.outgoing(initial), root)
    }

    /// Processes a counterexample, which is first cut off after the first symbol whose output
    /// the hypothesis predicts wrongly. Returns `false` without modifying anything if the
    /// counterexample is too short or does not contradict the hypothesis.
    ///
    /// The output at the cut is confirmed with the oracle first, a counterexample the oracle
    /// disagrees with is rejected as [`LearnerError::InconsistentCounterexample`].
    pub fn refine_hypothesis(
        &mut self,
        counterexample: &Counterexample<I, Vec<O>>,
    ) -> LearnerResult<bool, M> {
        self.ensure_ready()?;
        let Counterexample { input, output } = counterexample;
        if input.len() != output.len() {
            return Err(LearnerError::MalformedCounterexample {
                inputs: input.len(),
                outputs: output.len(),
            });
        }
        if let Some(position) = input
            .iter()
            .position(|symbol| !self.core.hypothesis.alphabet().contains(*symbol))
        {
            return Err(LearnerError::UnknownSymbol { position });
        }

        if !self.refine_once(input, output)? {
            return Ok(false);
        }
        if self.config.repeated_counterexample_evaluation {
            while self.refine_once(input, output)? {}
        }
        info!(
            "refined hypothesis with {}, now has {} states",
            input.show(),
            self.core.hypothesis.size()
        );
        Ok(true)
    }

    fn refine_once(&mut self, input: &[I], output: &[O]) -> LearnerResult<bool, M> {
        if input.len() < 2 {
            return Ok(false);
        }
        let predicted = self
            .core
            .hypothesis
            .transform(input.iter().copied())
            .expect("Hypothesis must be complete");
        let Some(mismatch) = predicted
            .iter()
            .zip(output)
            .position(|(predicted, actual)| predicted != actual)
        else {
            return Ok(false);
        };
        let observed = self
            .oracle
            .answer(Query::new(&input[..mismatch], &input[mismatch..=mismatch]))?;
        if observed.last() != Some(&output[mismatch]) {
            return Err(LearnerError::InconsistentCounterexample { position: mismatch });
        }

        let word = &input[..=mismatch];
        let trajectory = self
            .core
            .hypothesis
            .trajectory(word)
            .expect("Hypothesis must be complete");
        let mut kv = KvCounterexample::new(
            word,
            trajectory,
            &self.core.state_infos,
            &self.core.tree,
            &self.oracle,
        );
        kv.set_separator(
            word.len(),
            Separator {
                ancestor: None,
                old_outcome: vec![predicted[mismatch].clone()],
                new_outcome: vec![output[mismatch].clone()],
            },
        );
        let mut acex = LazyCounterexample::new(kv);
        acex.set_effect(word.len(), true);

        let index = self.config.analyzer.analyze(&mut acex, 0)?;
        let mut kv = acex.into_inner();
        let state = kv.state(index);
        let separator = kv
            .take_separator(index + 1)
            .expect("effect after the breakpoint records a separator");
        debug!(
            "breakpoint {index} of {} splits state {state} on {:?}",
            word.show(),
            separator
        );

        let access_sequence = word[..index].to_vec();
        if let Err(e) = self.split_state(state, access_sequence, word[index], separator) {
            warn!("oracle failed while splitting state {state}, learner is poisoned: {e}");
            self.poisoned = true;
            return Err(e.into());
        }
        Ok(true)
    }

    fn split_state(
        &mut self,
        state: StateIndex,
        access_sequence: Vec<I>,
        symbol: I,
        separator: Separator<Vec<O>>,
    ) -> Result<(), M::Error> {
        let incoming = self.core.state_infos[state].take_incoming();
        let new_state = self.core.hypothesis.add_state();

        let Separator {
            ancestor,
            old_outcome,
            new_outcome,
        } = separator;
        let (discriminator, old_outcome, new_outcome) = match ancestor {
            None => (vec![symbol], old_outcome, new_outcome),
            Some(ancestor) => {
                let (_, transition_output) = self
                    .core
                    .hypothesis
                    .transition(state, symbol)
                    .expect("Hypothesis must be complete");
                let prepend = |outcome: Vec<O>| {
                    std::iter::once(transition_output.clone())
                        .chain(outcome)
                        .collect::<Vec<_>>()
                };
                let discriminator: Vec<I> = std::iter::once(symbol)
                    .chain(
                        self.core
                            .tree
                            .discriminator(ancestor)
                            .expect("separator is an inner node")
                            .iter()
                            .copied(),
                    )
                    .collect();
                (discriminator, prepend(old_outcome), prepend(new_outcome))
            }
        };

        let old_leaf = self.core.state_infos[state].leaf();
        debug!(
            "splitting state {state} with discriminator {}, new state {new_state}",
            discriminator.show()
        );
        let split = self.core.tree.split(
            old_leaf,
            discriminator,
            old_outcome,
            new_outcome,
            Some(new_state),
        );
        self.core.state_infos[state].set_leaf(split.old);
        self.core
            .state_infos
            .push(StateInfo::new(new_state, access_sequence, split.new));

        self.connect(self.outgoing(new_state), self.core.tree.root())?;
        self.connect(incoming, old_leaf)
    }

    /// Extends the alphabet by `symbol`, returns `false` if it is already known. Once learning
    /// has started, target and output of the new transition of every state are determined
    /// right away.
    pub fn add_alphabet_symbol(&mut self, symbol: I) -> LearnerResult<bool, M> {
        if self.alphabet.contains(symbol) {
            return Ok(false);
        }
        if self.poisoned {
            return Err(LearnerError::Poisoned);
        }
        self.alphabet.add_symbol(symbol);
        if self.core.hypothesis.alphabet().contains(symbol) {
            return Ok(true);
        }
        let index = self.core.hypothesis.add_alphabet_symbol(symbol);
        if !self.is_started() {
            return Ok(true);
        }

        let transitions: Vec<_> = (0..self.core.hypothesis.size())
            .map(|source| TransitionRef {
                source,
                symbol: index,
            })
            .collect();
        if let Err(e) = self.connect(transitions, self.core.tree.root()) {
            warn!(
                "oracle failed while adding {}, learner is poisoned: {e}",
                symbol.show()
            );
            self.poisoned = true;
            return Err(e.into());
        }
        debug!(
            "added symbol {}, hypothesis has {} states",
            symbol.show(),
            self.core.hypothesis.size()
        );
        Ok(true)
    }

    /// Returns a copy of everything that was learned so far.
    pub fn suspend(&self) -> KvMealyState<I, O> {
        self.core.clone()
    }

    /// Replaces everything that was learned so far by `state` and clears a poisoned learner.
    /// A diagnostic is returned if `state` was learned over a different alphabet.
    pub fn resume(&mut self, state: KvMealyState<I, O>) -> Option<ResumeDiagnostic<I>> {
        let diagnostic = (state.hypothesis.alphabet() != &self.alphabet).then(|| {
            ResumeDiagnostic::AlphabetMismatch {
                learner: self.alphabet.clone(),
                suspended: state.hypothesis.alphabet().clone(),
            }
        });
        if let Some(diagnostic) = &diagnostic {
            warn!("{diagnostic}");
        }
        self.core = state;
        self.poisoned = false;
        debug!("resumed with {} states", self.core.hypothesis.size());
        diagnostic
    }

    fn outgoing(&self, source: StateIndex) -> Vec<TransitionRef> {
        (0..self.core.hypothesis.alphabet().size())
            .map(|symbol| TransitionRef { source, symbol })
            .collect()
    }

    fn transition_word(&self, transition: TransitionRef) -> Vec<I> {
        let mut word = self.core.state_infos[transition.source]
            .access_sequence()
            .to_vec();
        word.push(self.core.hypothesis.alphabet()[transition.symbol]);
        word
    }

    /// Sifts the words of the given transitions from `start` and redirects them to the state of
    /// the reached leaf, adding states for unbound leaves. Transitions that have no output yet
    /// obtain it from the oracle in a single batch.
    fn connect(
        &mut self,
        transitions: Vec<TransitionRef>,
        start: NodeId,
    ) -> Result<(), M::Error> {
        let mut batch = transitions;
        let mut start = start;
        let mut pending = VecDeque::new();
        loop {
            let words: Vec<_> = batch.iter().map(|t| self.transition_word(*t)).collect();
            let leaves = self
                .core
                .tree
                .sift_batch(&self.oracle, &words, &vec![start; words.len()])?;
            let outputs = self.transition_outputs(&batch, &words)?;

            for (((transition, word), leaf), output) in batch
                .into_iter()
                .zip(words)
                .zip(leaves)
                .zip(outputs)
            {
                let target = match self.core.tree.state(leaf) {
                    Some(target) => target,
                    None => {
                        let created = self.create_state(word, leaf);
                        pending.push_back(created);
                        created
                    }
                };
                self.set_transition(transition, target, output);
            }

            let Some(state) = pending.pop_front() else {
                return Ok(());
            };
            batch = self.outgoing(state);
            start = self.core.tree.root();
        }
    }

    /// Returns the output of every transition. Known outputs are taken from the hypothesis,
    /// the remaining ones are queried as the last symbol of the transition's word.
    fn transition_outputs(
        &self,
        transitions: &[TransitionRef],
        words: &[Vec<I>],
    ) -> Result<Vec<O>, M::Error> {
        let known: Vec<Option<O>> = transitions
            .iter()
            .map(|t| {
                self.core
                    .hypothesis
                    .transition_output(t.source, t.symbol)
                    .cloned()
            })
            .collect();
        let queries: Vec<_> = known
            .iter()
            .zip(words)
            .filter(|(output, _)| output.is_none())
            .map(|(_, word)| {
                let (prefix, suffix) = word.split_at(word.len() - 1);
                Query::new(prefix, suffix)
            })
            .collect();
        let mut answers = if queries.is_empty() {
            vec![]
        } else {
            self.oracle.answer_batch(&queries)?
        }
        .into_iter();

        Ok(known
            .into_iter()
            .map(|output| {
                output.unwrap_or_else(|| {
                    answers
                        .next()
                        .and_then(|answer| answer.into_iter().next())
                        .expect("oracle answers with one output per suffix symbol")
                })
            })
            .collect())
    }

    fn create_state(&mut self, access_sequence: Vec<I>, leaf: NodeId) -> StateIndex {
        let state = self.core.hypothesis.add_state();
        self.core.tree.bind(leaf, state);
        debug!(
            "created state {state} with access sequence {}",
            access_sequence.show()
        );
        self.core
            .state_infos
            .push(StateInfo::new(state, access_sequence, leaf));
        state
    }

    fn set_transition(&mut self, transition: TransitionRef, target: StateIndex, output: O) {
        trace!(
            "transition {} --{}|{output:?}--> {target}",
            transition.source,
            self.core.hypothesis.alphabet()[transition.symbol].show()
        );
        self.core
            .hypothesis
            .set_transition(transition.source, transition.symbol, target, output);
        self.core.state_infos[target].add_incoming(transition);
    }
}
