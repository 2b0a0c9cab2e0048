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

/// Everything a [`KearnsVaziraniDfa`] learns: the hypothesis, the discrimination tree and the
/// information about every state. This is what [`KearnsVaziraniDfa::suspend`] hands out and
/// what [`KearnsVaziraniDfa::resume`] takes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvDfaState<I: Symbol> {
    hypothesis: Dfa<I>,
    tree: DiscriminationTree<I, bool>,
    state_infos: Vec<StateInfo<I>>,
}

impl<I: Symbol> KvDfaState<I> {
    fn new(alphabet: Alphabet<I>) -> Self {
        Self {
            hypothesis: Dfa::new(alphabet),
            tree: DiscriminationTree::new(),
            state_infos: vec![],
        }
    }

    /// The hypothesis automaton.
    pub fn hypothesis(&self) -> &Dfa<I> {
        &self.hypothesis
    }

    /// The discrimination tree.
    pub fn discrimination_tree(&self) -> &DiscriminationTree<I, bool> {
        &self.tree
    }

    /// Information about the states, indexed by state.
    pub fn state_infos(&self) -> &[StateInfo<I>] {
        &self.state_infos
    }
}

/// Learns a [`Dfa`] with a binary discrimination tree.
///
/// The root of the tree discriminates with the empty word, i.e. it separates accepting from
/// rejecting words. Every further discriminator is obtained from a counterexample by
/// prepending a single symbol to the discriminator of an existing inner node.
///
/// # Example
/// ```
/// use kv_learning::prelude::*;
///
/// let target = Dfa::builder()
///     .with_accepting([true, false])
///     .with_transitions([(0, 'a', 1), (1, 'a', 0), (0, 'b', 0), (1, 'b', 1)])
///     .into_dfa(0);
/// let oracle = DfaOracle::new(target);
/// let mut learner = KearnsVaziraniDfa::new(alphabet!('a', 'b'), &oracle);
/// learner.start_learning().unwrap();
/// while let Some(ce) = oracle.find_counterexample(learner.hypothesis().unwrap()) {
///     assert!(learner.refine_hypothesis(&ce).unwrap());
/// }
/// assert_eq!(learner.hypothesis().unwrap().size(), 2);
/// ```
pub struct KearnsVaziraniDfa<I: Symbol, M> {
    alphabet: Alphabet<I>,
    oracle: M,
    config: KvConfig,
    core: KvDfaState<I>,
    poisoned: bool,
}

impl<I, M> KearnsVaziraniDfa<I, M>
where
    I: Symbol,
    M: MembershipOracle<Input = I, Output = bool>,
{
    /// Creates a learner with the default [`KvConfig`].
    pub fn new(alphabet: Alphabet<I>, oracle: M) -> Self {
        Self {
            core: KvDfaState::new(alphabet.clone()),
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

    /// Returns true once [`Self::start_learning`] succeeded (or a started state was resumed).
    pub fn is_started(&self) -> bool {
        self.core.hypothesis.initial().is_some()
    }

    /// Returns true if an oracle failure interrupted an update of the hypothesis.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// The current hypothesis. The reference is only valid until the next refinement.
    pub fn hypothesis(&self) -> LearnerResult<&Dfa<I>, M> {
        self.ensure_ready()?;
        Ok(&self.core.hypothesis)
    }

    /// The discrimination tree.
    pub fn discrimination_tree(&self) -> &DiscriminationTree<I, bool> {
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

    /// Builds the initial hypothesis. The empty word is classified first, the root of the tree
    /// is then split on the empty discriminator so that its two children separate accepting
    /// from rejecting states.
    ///
    /// If the oracle fails, the learner stays unstarted and the error is returned.
    pub fn start_learning(&mut self) -> LearnerResult<(), M> {
        if self.is_started() {
            return Err(LearnerError::AlreadyStarted);
        }
        if let Err(e) = self.initialize() {
            warn!("failed to start learning: {e}");
            self.core = KvDfaState::new(self.alphabet.clone());
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
        let accepting = self.oracle.answer(Query::new(&[], &[]))?;
        let initial = self.core.hypothesis.add_initial_state(accepting);
        let root = self.core.tree.root();
        self.core.tree.bind(root, initial);
        let split = self
            .core
            .tree
            .split(root, vec![], accepting, !accepting, None);
        self.core
            .state_infos
            .push(StateInfo::new(initial, vec![], split.old));
        debug!("created initial state, accepting: {accepting}");

        self.connect(self.outgoing(initial), root)
    }

    /// Processes a counterexample. Returns `false` without modifying anything if the
    /// counterexample is too short or is already classified correctly by the hypothesis.
    /// Otherwise at least one state is added and `true` is returned. Depending on the
    /// configuration, the counterexample is used repeatedly until it no longer refutes the
    /// hypothesis.
    ///
    /// Before the counterexample is analyzed, its output is confirmed with one query. If the
    /// oracle disagrees, [`LearnerError::InconsistentCounterexample`] is returned and nothing
    /// is modified.
    pub fn refine_hypothesis(
        &mut self,
        counterexample: &Counterexample<I, bool>,
    ) -> LearnerResult<bool, M> {
        self.ensure_ready()?;
        let Counterexample { input, output } = counterexample;
        if let Some(position) = input
            .iter()
            .position(|symbol| !self.core.hypothesis.alphabet().contains(*symbol))
        {
            return Err(LearnerError::UnknownSymbol { position });
        }

        if !self.refine_once(input, *output)? {
            return Ok(false);
        }
        if self.config.repeated_counterexample_evaluation {
            while self.refine_once(input, *output)? {}
        }
        info!(
            "refined hypothesis with {}, now has {} states",
            input.show(),
            self.core.hypothesis.size()
        );
        Ok(true)
    }

    fn refine_once(&mut self, word: &[I], output: bool) -> LearnerResult<bool, M> {
        if word.len() < 2 || self.core.hypothesis.accepts(word.iter().copied()) == output {
            return Ok(false);
        }
        if self.oracle.answer(Query::new(word, &[]))? != output {
            return Err(LearnerError::InconsistentCounterexample {
                position: word.len(),
            });
        }

        let trajectory = self
            .core
            .hypothesis
            .trajectory(word)
            .expect("Hypothesis must be complete");
        let root = self.core.tree.root();
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
                ancestor: Some(root),
                old_outcome: !output,
                new_outcome: output,
            },
        );
        let mut acex = LazyCounterexample::new(kv);
        acex.set_effect(word.len(), true);

        let index = self.config.analyzer.analyze(&mut acex, 1)?;
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
        separator: Separator<bool>,
    ) -> Result<(), M::Error> {
        let incoming = self.core.state_infos[state].take_incoming();
        let accepting = self.core.hypothesis.is_accepting(state);
        let new_state = self.core.hypothesis.add_state(accepting);

        let discriminator: Vec<I> = match separator.ancestor {
            Some(ancestor) => std::iter::once(symbol)
                .chain(
                    self.core
                        .tree
                        .discriminator(ancestor)
                        .expect("separator is an inner node")
                        .iter()
                        .copied(),
                )
                .collect(),
            None => vec![symbol],
        };
        let old_leaf = self.core.state_infos[state].leaf();
        debug!(
            "splitting state {state} with discriminator {}, new state {new_state}",
            discriminator.show()
        );
        let split = self.core.tree.split(
            old_leaf,
            discriminator,
            separator.old_outcome,
            separator.new_outcome,
            Some(new_state),
        );
        self.core.state_infos[state].set_leaf(split.old);
        self.core
            .state_infos
            .push(StateInfo::new(new_state, access_sequence, split.new));

        self.connect(self.outgoing(new_state), self.core.tree.root())?;
        self.connect(incoming, old_leaf)
    }

    /// Extends the alphabet by `symbol`. Returns `false` if the symbol is already known. If
    /// learning has started, the new transition of every state is determined right away.
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
    pub fn suspend(&self) -> KvDfaState<I> {
        self.core.clone()
    }

    /// Continues from a previously suspended state, replacing everything that was learned
    /// so far. This also clears a poisoned learner. If the state was learned over a
    /// different alphabet, a diagnostic is returned but the state is used nonetheless.
    pub fn resume(&mut self, state: KvDfaState<I>) -> Option<ResumeDiagnostic<I>> {
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

    /// Sifts the words of the given transitions from `start` and points every transition to
    /// the state of the leaf it reaches. Leaves without a state get a new one, whose outgoing
    /// transitions are then determined in the same way.
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

            for ((transition, word), leaf) in batch.into_iter().zip(words).zip(leaves) {
                let target = match self.core.tree.state(leaf) {
                    Some(target) => target,
                    None => {
                        let created = self.create_state(word, leaf);
                        pending.push_back(created);
                        created
                    }
                };
                self.set_transition(transition, target);
            }

            let Some(state) = pending.pop_front() else {
                return Ok(());
            };
            batch = self.outgoing(state);
            start = self.core.tree.root();
        }
    }

    /// Adds a state for a leaf that was reached for the first time. Such a leaf always sits
    /// below the root edge that the initial state does not take, so its acceptance is the
    /// outcome of that edge.
    fn create_state(&mut self, access_sequence: Vec<I>, leaf: NodeId) -> StateIndex {
        let accepting = *self
            .core
            .tree
            .root_branch(leaf)
            .expect("leaves of a started learner lie below the root");
        let state = self.core.hypothesis.add_state(accepting);
        self.core.tree.bind(leaf, state);
        debug!(
            "created state {state} with access sequence {}, accepting: {accepting}",
            access_sequence.show()
        );
        self.core
            .state_infos
            .push(StateInfo::new(state, access_sequence, leaf));
        state
    }

    fn set_transition(&mut self, transition: TransitionRef, target: StateIndex) {
        trace!(
            "transition {} --{}--> {target}",
            transition.source,
            self.core.hypothesis.alphabet()[transition.symbol].show()
        );
        self.core
            .hypothesis
            .set_transition(transition.source, transition.symbol, target);
        self.core.state_infos[target].add_incoming(transition);
    }
}
