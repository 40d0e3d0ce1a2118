//! Analyses over a `rill_ir` world.
//!
//! All analyses are read-only views computed on demand:
//! - [`Scope`]: the reachable subgraph of a set of entry continuations,
//!   with forward/backward RPO numberings and induced pred/succ edges;
//! - [`Cfg`]: a direction-parametric control-flow view with a virtual
//!   root and dense node indices;
//! - [`DomTree`]: iterative Cooper-Harvey-Kennedy dominators with LCA
//!   and interval-based dominance tests;
//! - [`LoopTree`]: the Ramalingam loop-nesting forest;
//! - [`Schedule`]: early/late/smart placement of pure ops into blocks.
//!
//! Everything is deterministic: member lists are gid-sorted and
//! traversals follow operand order, so identical worlds produce
//! bit-identical numberings and schedules.

pub mod cfg;
pub mod domtree;
pub mod looptree;
pub mod schedule;
pub mod scope;

pub use cfg::{Cfg, CfgNode, CfgNodeId};
pub use domtree::DomTree;
pub use looptree::{LoopEdge, LoopHeader, LoopLeaf, LoopTree, LoopTreeNode};
pub use schedule::{Block, Schedule, Strategy};
pub use scope::Scope;
