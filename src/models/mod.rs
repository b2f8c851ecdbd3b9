//! Declarative resource model for sitestack.
//!
//! # Core Concepts
//!
//! ## Declarations
//!
//! - [`ResourceNode`]: One declared infrastructure object. Its inputs are a tree of
//!   [`Input`] values, some literal and some referring to another node's outputs.
//! - [`OutputRef`]: A `(node, field)` pair naming an output attribute of another node.
//!   Every output reference is an implicit dependency edge.
//!
//! ## Recorded State
//!
//! These are written by the engine after each successful step and persisted between runs:
//!
//! - [`ResourceState`]: The provider id, resolved inputs and outputs of one applied node.
//! - [`StackState`]: Every recorded resource of a stack plus its exported values.
//!
//! ## Typed Arguments
//!
//! - [`BucketArgs`], [`DistributionArgs`], [`SwagProps`]: Typed configuration that is
//!   flattened into node inputs when a stack is declared.

mod bucket;
mod distribution;
mod input;
mod resource;
mod state;
mod swag;

pub use bucket::*;
pub use distribution::*;
pub use input::*;
pub use resource::*;
pub use state::*;
pub use swag::*;
