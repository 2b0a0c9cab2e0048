mod discrimination_tree;
pub use discrimination_tree::{DiscriminationTree, LcaInfo, Node, NodeId, NodeKind, SplitResult};
