use kv_automata::{Color, Show, StateIndex, Symbol};
use tracing::trace;

use crate::{
    acex::AbstractCounterexample,
    active::{MembershipOracle, Query, StateInfo},
    datastructure::{DiscriminationTree, NodeId},
};

/// Records why a prefix of a counterexample is not correctly represented by the hypothesis
/// state it leads to: replaying the discriminator of `ancestor` after the prefix yields
/// `new_outcome`, while the leaf of the state lies below the `old_outcome` edge. Without an
/// ancestor the outcomes are the differing outputs of the last transition itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separator<O> {
    /// The inner node whose discriminator tells the two apart.
    pub ancestor: Option<NodeId>,
    /// Outcome that the hypothesis expects.
    pub old_outcome: O,
    /// Outcome that was observed.
    pub new_outcome: O,
}

/// The abstract counterexample of the discrimination tree learners. Position `i` corresponds
/// to the decomposition of the counterexample into its first `i` symbols and the rest. Its
/// effect is computed by checking whether the first `i` symbols are classified by the tree
/// like the access sequence of the hypothesis state they lead to.
pub(crate) struct KvCounterexample<'a, I: Symbol, O: Color, M> {
    word: &'a [I],
    trajectory: Vec<StateIndex>,
    state_infos: &'a [StateInfo<I>],
    tree: &'a DiscriminationTree<I, O>,
    oracle: &'a M,
    separators: Vec<Option<Separator<O>>>,
}

impl<'a, I, O, M> KvCounterexample<'a, I, O, M>
where
    I: Symbol,
    O: Color,
    M: MembershipOracle<Input = I, Output = O>,
{
    /// `trajectory` lists the hypothesis states visited on `word`, including the initial one.
    pub(crate) fn new(
        word: &'a [I],
        trajectory: Vec<StateIndex>,
        state_infos: &'a [StateInfo<I>],
        tree: &'a DiscriminationTree<I, O>,
        oracle: &'a M,
    ) -> Self {
        assert_eq!(trajectory.len(), word.len() + 1);
        Self {
            word,
            separators: vec![None; trajectory.len()],
            trajectory,
            state_infos,
            tree,
            oracle,
        }
    }

    pub(crate) fn set_separator(&mut self, index: usize, separator: Separator<O>) {
        self.separators[index] = Some(separator);
    }

    pub(crate) fn take_separator(&mut self, index: usize) -> Option<Separator<O>> {
        self.separators[index].take()
    }

    pub(crate) fn state(&self, index: usize) -> StateIndex {
        self.trajectory[index]
    }
}

impl<I, O, M> AbstractCounterexample for KvCounterexample<'_, I, O, M>
where
    I: Symbol,
    O: Color,
    M: MembershipOracle<Input = I, Output = O>,
{
    type Error = M::Error;

    fn len(&self) -> usize {
        self.trajectory.len()
    }

    fn compute_effect(&mut self, index: usize) -> Result<bool, M::Error> {
        let prefix = &self.word[..index];
        let leaf = self.state_infos[self.trajectory[index]].leaf();

        for (node, expected) in self.tree.path_from_root(leaf) {
            let discriminator = self
                .tree
                .discriminator(node)
                .expect("nodes on a path from the root are inner nodes");
            let observed = self.oracle.answer(Query::new(prefix, discriminator))?;
            if observed != expected {
                trace!(
                    "{} diverges at {node:?}, expected {expected:?} but got {observed:?}",
                    prefix.show()
                );
                self.separators[index] = Some(Separator {
                    ancestor: Some(node),
                    old_outcome: expected,
                    new_outcome: observed,
                });
                return Ok(true);
            }
        }
        Ok(false)
    }
}
