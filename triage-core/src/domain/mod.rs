//! Domain types
//!
//! Core business entities: recipe definitions, the opaque incident
//! envelope, and the results recipes publish.

pub mod execution;
pub mod incident;
pub mod recipe;

pub use execution::{Execution, ExecutionResults};
pub use incident::{Action, EnvelopeError, Incident};
pub use recipe::{Flavor, Recipe, RecipeParam, RecipeSpec};
