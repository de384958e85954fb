//! Lowering into the runtime vocabulary.

pub mod ir;
pub mod lower;

pub use ir::{IREdge, IRGraph, IRNode, IRNodeKind, PersistenceMode};
pub use lower::lower;
