//! Evaluation service: truth of formulas in concrete states and detection of rigid relations.

use crate::*;

pub trait Evaluator {
    /// True if the ground atom holds in every state reachable from the initial one,
    /// i.e. it is a static fact of the problem.
    fn is_rigid_relation(&self, atom: &Atom) -> bool;

    /// Evaluates the formula, grounded by `sub`, in the given state.
    /// Remaining existential parameters are satisfied if one of their instantiations is.
    fn evaluate(&self, cnf: &Cnf, sub: &Substitution, state: &State) -> bool;
}
