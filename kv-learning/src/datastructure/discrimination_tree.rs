use std::fmt::Debug;

use itertools::Itertools;
use kv_automata::{math, Color, Show, StateIndex, Symbol};
use tracing::trace;

use crate::active::{MembershipOracle, Query};

/// Identifies a node of a [`DiscriminationTree`]. Ids are handed out densely and stay valid for
/// the lifetime of the tree, since nodes are never removed.
#[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The position of the node in the arena of its tree.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// What a node does: inner nodes carry a discriminator and map outcomes to children, leaves
/// are associated with (at most) one hypothesis state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind<I, O: Color> {
    /// An inner node.
    Inner {
        /// The suffix that is appended to sifted words.
        discriminator: Vec<I>,
        /// Children keyed by the outcome of the query.
        children: math::Map<O, NodeId>,
    },
    /// A leaf, which may not be bound to a state yet.
    Leaf {
        /// The state that the leaf represents.
        state: Option<StateIndex>,
    },
}

/// A node of a [`DiscriminationTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<I, O: Color> {
    parent: Option<NodeId>,
    parent_outcome: Option<O>,
    depth: usize,
    kind: NodeKind<I, O>,
}

impl<I, O: Color> Node<I, O> {
    /// Parent of the node, absent for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Outcome on the edge from the parent to this node.
    pub fn parent_outcome(&self) -> Option<&O> {
        self.parent_outcome.as_ref()
    }

    /// Distance from the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the node is an inner node or a leaf.
    pub fn kind(&self) -> &NodeKind<I, O> {
        &self.kind
    }

    fn leaf(
        parent: Option<NodeId>,
        parent_outcome: Option<O>,
        depth: usize,
        state: Option<StateIndex>,
    ) -> Self {
        Self {
            parent,
            parent_outcome,
            depth,
            kind: NodeKind::Leaf { state },
        }
    }
}

/// The two leaves that are produced when splitting a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitResult {
    /// Leaf that inherits the binding of the split leaf.
    pub old: NodeId,
    /// Leaf bound to the newly added state.
    pub new: NodeId,
}

/// Describes where two nodes meet in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcaInfo<O> {
    /// The lowest common ancestor, always an inner node.
    pub ancestor: NodeId,
    /// Outcome of the edge leaving `ancestor` towards the first node, absent if the first
    /// node is the ancestor itself.
    pub first_label: Option<O>,
    /// Same as `first_label`, but for the second node.
    pub second_label: Option<O>,
}

/// A discrimination tree classifies words by the outcomes of appending discriminators to them.
/// Starting from some node, a word is *sifted* down by querying the word followed by the
/// discriminator of the current inner node and descending into the child for the observed
/// outcome, until a leaf is reached. Two words end up in different leaves iff some
/// discriminator on the way distinguishes them.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. The tree only ever grows:
/// leaves are split into inner nodes, and children for outcomes that were not observed before
/// are created on demand as unbound leaves.
#[derive(Clone, PartialEq, Eq)]
pub struct DiscriminationTree<I, O: Color> {
    nodes: Vec<Node<I, O>>,
}

impl<I: Symbol, O: Color> Default for DiscriminationTree<I, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Symbol, O: Color> DiscriminationTree<I, O> {
    /// Creates a tree that consists of a single unbound leaf.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::leaf(None, None, 0, None)],
        }
    }

    /// Creates a tree whose only node is a leaf bound to `state`.
    pub fn with_root_state(state: StateIndex) -> Self {
        Self {
            nodes: vec![Node::leaf(None, None, 0, Some(state))],
        }
    }

    /// The root of the tree.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The number of nodes.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    /// If the id does not belong to this tree.
    pub fn node(&self, node: NodeId) -> &Node<I, O> {
        assert!(node.0 < self.nodes.len(), "node {node:?} does not exist");
        &self.nodes[node.0]
    }

    /// Returns true if `node` is a leaf.
    pub fn is_leaf(&self, node: NodeId) -> bool {
        matches!(self.node(node).kind, NodeKind::Leaf { .. })
    }

    /// The discriminator of an inner node, `None` for leaves.
    pub fn discriminator(&self, node: NodeId) -> Option<&[I]> {
        match &self.node(node).kind {
            NodeKind::Inner { discriminator, .. } => Some(discriminator),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// The state bound to a leaf, `None` for inner nodes and unbound leaves.
    pub fn state(&self, node: NodeId) -> Option<StateIndex> {
        match self.node(node).kind {
            NodeKind::Leaf { state } => state,
            NodeKind::Inner { .. } => None,
        }
    }

    /// The parent of `node`.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    /// The outcome on the edge between `node` and its parent.
    pub fn parent_outcome(&self, node: NodeId) -> Option<&O> {
        self.node(node).parent_outcome.as_ref()
    }

    /// The distance of `node` from the root.
    pub fn depth(&self, node: NodeId) -> usize {
        self.node(node).depth
    }

    /// The child of `node` for the given outcome, if it exists.
    pub fn child(&self, node: NodeId, outcome: &O) -> Option<NodeId> {
        match &self.node(node).kind {
            NodeKind::Inner { children, .. } => children.get(outcome).copied(),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Iterates over all leaves in the order of their creation.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node.kind, NodeKind::Leaf { .. }))
            .map(|(id, _)| NodeId(id))
    }

    /// Associates the leaf `node` with `state`.
    ///
    /// # Panics
    /// If `node` is an inner node.
    pub fn bind(&mut self, node: NodeId, state: StateIndex) {
        assert!(node.0 < self.nodes.len(), "node {node:?} does not exist");
        match &mut self.nodes[node.0].kind {
            NodeKind::Leaf { state: binding } => *binding = Some(state),
            NodeKind::Inner { .. } => panic!("cannot bind inner node {node:?} to a state"),
        }
    }

    /// Returns the child of `node` for `outcome` and creates it as an unbound leaf if it does
    /// not exist.
    fn child_or_insert(&mut self, node: NodeId, outcome: O) -> NodeId {
        let fresh = NodeId(self.nodes.len());
        let depth = self.depth(node) + 1;
        match &mut self.nodes[node.0].kind {
            NodeKind::Inner { children, .. } => {
                if let Some(child) = children.get(&outcome) {
                    return *child;
                }
                children.insert(outcome.clone(), fresh);
            }
            NodeKind::Leaf { .. } => panic!("leaf {node:?} has no children"),
        }
        trace!("creating leaf {fresh:?} below {node:?}");
        self.nodes
            .push(Node::leaf(Some(node), Some(outcome), depth, None));
        fresh
    }

    fn expect_discriminator(&self, node: NodeId) -> &[I] {
        self.discriminator(node)
            .unwrap_or_else(|| panic!("node {node:?} is not an inner node"))
    }

    /// Sifts `word` starting at `start` and returns the leaf it ends up in. Whenever the
    /// observed outcome has no child yet, a new unbound leaf is created for it.
    pub fn sift<M>(&mut self, oracle: &M, word: &[I], start: NodeId) -> Result<NodeId, M::Error>
    where
        M: MembershipOracle<Input = I, Output = O>,
    {
        let mut current = start;
        while !self.is_leaf(current) {
            let outcome = oracle.answer(Query::new(word, self.expect_discriminator(current)))?;
            trace!(
                "sifting {} at {current:?} gives {outcome:?}",
                word.show()
            );
            current = self.child_or_insert(current, outcome);
        }
        Ok(current)
    }

    /// Sifts several words at once, the i-th word starts at the i-th node in `starts`. All
    /// words that have not yet reached a leaf advance by one level per round, and the queries
    /// of a round are posed as one batch. The result is the same as sifting every word on
    /// its own.
    pub fn sift_batch<M, W>(
        &mut self,
        oracle: &M,
        words: &[W],
        starts: &[NodeId],
    ) -> Result<Vec<NodeId>, M::Error>
    where
        M: MembershipOracle<Input = I, Output = O>,
        W: AsRef<[I]>,
    {
        assert_eq!(
            words.len(),
            starts.len(),
            "every word needs a node to start sifting at"
        );
        let mut current = starts.to_vec();
        let mut round = 0;
        loop {
            let active: Vec<usize> = current
                .iter()
                .positions(|&node| !self.is_leaf(node))
                .collect();
            if active.is_empty() {
                break;
            }
            let queries: Vec<_> = active
                .iter()
                .map(|&i| Query::new(words[i].as_ref(), self.expect_discriminator(current[i])))
                .collect();
            let outcomes = oracle.answer_batch(&queries)?;
            assert_eq!(
                outcomes.len(),
                active.len(),
                "oracle must answer every query of a batch"
            );
            trace!("sift round {round} advanced {} words", active.len());
            for (i, outcome) in active.into_iter().zip(outcomes) {
                current[i] = self.child_or_insert(current[i], outcome);
            }
            round += 1;
        }
        Ok(current)
    }

    /// Turns the leaf `leaf` into an inner node with the given discriminator. Its state moves
    /// into a new leaf below the `old_outcome` edge, while `new_state` is placed in a new
    /// leaf below the `new_outcome` edge.
    ///
    /// # Panics
    /// If `leaf` is not a leaf or if both outcomes coincide.
    pub fn split(
        &mut self,
        leaf: NodeId,
        discriminator: Vec<I>,
        old_outcome: O,
        new_outcome: O,
        new_state: Option<StateIndex>,
    ) -> SplitResult {
        assert_ne!(
            old_outcome, new_outcome,
            "split of {leaf:?} requires distinct outcomes"
        );
        let old_state = match self.node(leaf).kind {
            NodeKind::Leaf { state } => state,
            NodeKind::Inner { .. } => panic!("cannot split inner node {leaf:?}"),
        };
        let depth = self.depth(leaf) + 1;

        let old = NodeId(self.nodes.len());
        self.nodes.push(Node::leaf(
            Some(leaf),
            Some(old_outcome.clone()),
            depth,
            old_state,
        ));
        let new = NodeId(self.nodes.len());
        self.nodes.push(Node::leaf(
            Some(leaf),
            Some(new_outcome.clone()),
            depth,
            new_state,
        ));

        self.nodes[leaf.0].kind = NodeKind::Inner {
            discriminator,
            children: math::Map::from_iter([(old_outcome, old), (new_outcome, new)]),
        };
        SplitResult { old, new }
    }

    /// Computes the lowest common ancestor of `first` and `second`.
    ///
    /// # Panics
    /// If the nodes do not meet in an inner node, which happens when both are the same leaf.
    pub fn lca(&self, first: NodeId, second: NodeId) -> LcaInfo<O> {
        let (mut a, mut b) = (first, second);
        let (mut a_label, mut b_label) = (None, None);

        let step = |node: NodeId| {
            let parent = self
                .parent(node)
                .unwrap_or_else(|| panic!("{first:?} and {second:?} have no common ancestor"));
            (parent, self.parent_outcome(node).cloned())
        };

        while self.depth(a) > self.depth(b) {
            (a, a_label) = step(a);
        }
        while self.depth(b) > self.depth(a) {
            (b, b_label) = step(b);
        }
        while a != b {
            (a, a_label) = step(a);
            (b, b_label) = step(b);
        }

        assert!(
            !self.is_leaf(a),
            "lowest common ancestor of {first:?} and {second:?} is the leaf {a:?}"
        );
        LcaInfo {
            ancestor: a,
            first_label: a_label,
            second_label: b_label,
        }
    }

    /// Lists the inner nodes from the root down to `node` (exclusive), each paired with the
    /// outcome that leads towards `node`.
    pub fn path_from_root(&self, node: NodeId) -> Vec<(NodeId, O)> {
        let mut path = Vec::with_capacity(self.depth(node));
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            let outcome = self
                .parent_outcome(current)
                .cloned()
                .unwrap_or_else(|| panic!("non-root node {current:?} has no outcome"));
            path.push((parent, outcome));
            current = parent;
        }
        path.reverse();
        path
    }

    /// The outcome of the root's discriminator on the path to `node`, `None` for the root.
    pub fn root_branch(&self, node: NodeId) -> Option<&O> {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            if parent == self.root() {
                return self.parent_outcome(current);
            }
            current = parent;
        }
        None
    }

    fn fmt_node(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        node: NodeId,
        indent: usize,
    ) -> std::fmt::Result {
        let label = match self.parent_outcome(node) {
            Some(outcome) => format!("{outcome:?} → "),
            None => String::new(),
        };
        match &self.node(node).kind {
            NodeKind::Leaf { state } => {
                writeln!(f, "{:indent$}{label}{node:?} [{}]", "", state.show())
            }
            NodeKind::Inner {
                discriminator,
                children,
            } => {
                writeln!(f, "{:indent$}{label}{node:?} ({})", "", discriminator.show())?;
                for child in children.values() {
                    self.fmt_node(f, *child, indent + 2)?;
                }
                Ok(())
            }
        }
    }
}

impl<I: Symbol, O: Color> Debug for DiscriminationTree<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_node(f, self.root(), 0)
    }
}
