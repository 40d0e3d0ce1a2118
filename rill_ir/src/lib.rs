//! Hash-consed program graph for a CPS-based functional IR.
//!
//! Everything is a [`Def`]: types, literals, primitive operations,
//! aggregates, continuations and parameters. Structural Defs are unified
//! by content in the [`World`]'s interner, which buys constant pooling,
//! folding, CSE and canonicalization in a single mechanism; nominal Defs
//! (continuations, named records, globals) are identified by allocation
//! and may close cycles through their mutable operands.
//!
//! The crate provides:
//! - the builder: one constructor per node family, each running type
//!   check, literal fold, Bottom propagation, canonicalization and
//!   unification, in that order;
//! - the rewriter: [`World::replace`] and [`World::update`], preserving
//!   use-list consistency and structural uniqueness;
//! - cleanup: [`World::uce`], [`World::dce`], [`World::cleanup`];
//! - simplification: [`World::cfg_simplify`], [`World::param_opt`],
//!   [`World::opt`].
//!
//! Analyses over the graph (scope, CFG, dominators, loop forest,
//! schedule) live in the `rill_analyses` crate.
//!
//! Worlds are single-threaded and independent of each other; tests
//! instantiate fresh worlds freely.

pub mod arena;
mod cleanup;
pub mod def;
pub mod error;
mod fold;
pub mod operators;
mod rewrite;
mod simplify;
pub mod types;
pub mod world;

pub use arena::{Arena, Id};
pub use def::{Def, DefId, DefKind, DebugInfo, Location, Use};
pub use error::{BuildError, BuildResult};
pub use operators::{ArithOpKind, ConvOpKind, RelOpKind};
pub use types::PrimTypeKind;
pub use world::World;
