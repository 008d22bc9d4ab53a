//! Regression (backward application) of planning operators.
//!
//! Given an operator and a description of what must hold after its application, either as a
//! [`Cnf`] formula or as a partial [`RelativeState`], the engine computes what must hold before
//! the application. Forward application of effects is provided as well, mostly for relaxed reasoning.
//!
//! The engine relies on two services: a [`Grounder`] that instantiates lifted constructs and
//! an [`Evaluator`] that knows about the static facts of the problem. [`Universe`] implements both.

mod conditions;
mod effects;
pub mod errors;
mod evaluation;
mod expressions;
pub mod forward;
pub mod grounding;
pub mod regression;
mod state;
mod substitution;
mod sym;
mod terms;
mod universe;
pub(crate) mod utils;

pub use conditions::*;
pub use effects::*;
pub use evaluation::*;
pub use expressions::*;
pub use grounding::Grounder;
pub use state::*;
pub use substitution::*;
pub use sym::*;
pub use terms::*;
pub use universe::*;

pub use forward::{ForwardApplier, apply_forward, collect_result_atoms};
pub use regression::{
    BackwardConditions, BackwardRelativeState, Relevance, SubstitutionMode, apply_backwards_conditions,
    apply_backwards_relative_state, is_relevant, is_relevant_state,
};
