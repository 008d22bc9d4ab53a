use itertools::Itertools;
use tracing::Level;

use crate::regression::*;

/// Regression of relative states through an operator.
pub struct BackwardRelativeState<'a, G: Grounder, E: Evaluator> {
    grounder: &'a G,
    evaluator: &'a E,
    operator: &'a Operator,
    max_branches: usize,
}

impl<G: Grounder, E: Evaluator> Clone for BackwardRelativeState<'_, G, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: Grounder, E: Evaluator> Copy for BackwardRelativeState<'_, G, E> {}

impl<'a, G: Grounder, E: Evaluator> BackwardRelativeState<'a, G, E> {
    pub fn new(grounder: &'a G, evaluator: &'a E, operator: &'a Operator) -> Self {
        BackwardRelativeState {
            grounder,
            evaluator,
            operator,
            max_branches: MAX_CONDITIONAL_BRANCHES.get(),
        }
    }

    pub fn with_max_branches(mut self, max_branches: usize) -> Self {
        self.max_branches = max_branches.max(1);
        self
    }

    /// Relative states from which the application of the operator leads to a state matching `target`.
    ///
    /// Constraints that cannot be expressed by a relative state (e.g. strict numeric inequalities
    /// on unknown values) are left unconstrained.
    ///
    /// # Panics
    /// If the operator has an equality effect.
    pub fn apply_backwards(
        &self,
        target: &RelativeState,
        sub: &mut Substitution,
    ) -> Box<dyn Iterator<Item = RelativeState> + 'a> {
        let _span = tracing::span!(Level::TRACE, "regression", op = %self.operator.name).entered();
        let effects = ground_effects(self.grounder, self.operator, sub);
        let sub = sub.flattened();

        let (relevance, touching) = StateRelevance::new(self.grounder, &effects, &sub).evaluate(target);
        if relevance == Relevance::AntiRelevant {
            tracing::trace!("{target} is contradicted by {}", self.operator.name);
            return Box::new(std::iter::empty());
        }

        let (branches, truncated) = combinations(&touching, self.max_branches);
        if truncated {
            tracing::warn!(
                "{}: {} conditional effects affect the target, only {} combinations considered",
                self.operator.name,
                touching.len(),
                branches.len()
            );
        }
        tracing::debug!(num_branches = branches.len(), "relative state regression");

        let preconditions = self.preconditions(&sub);
        let this = *self;
        let target = target.clone();
        // branches are only regressed as the candidates are consumed
        let candidates = branches.into_iter().flat_map(move |firing| {
            match this.regress(&target, &effects.with_firing(&firing), &sub) {
                Some(candidate) => this.apply_guards(candidate, &effects, &touching, &firing),
                None => Vec::new(),
            }
        });
        Box::new(
            candidates
                .unique()
                .flat_map(move |candidate| apply_cnf(candidate, &preconditions))
                .unique(),
        )
    }

    /// Refinements of the candidate in which exactly the `firing` conditional effects fire among the touching ones.
    fn apply_guards(
        &self,
        candidate: RelativeState,
        effects: &GroundEffects,
        touching: &[usize],
        firing: &[usize],
    ) -> Vec<RelativeState> {
        touching.iter().fold(vec![candidate], |states, i| {
            let guard = &effects.conditional[*i].guard;
            if firing.contains(i) {
                // a quantified guard holds when any of its instances does
                let instances = guard_instances(self.grounder, guard);
                states
                    .iter()
                    .flat_map(|s| instances.iter().flat_map(move |instance| apply_cnf(s.clone(), instance)))
                    .unique()
                    .collect()
            } else {
                let negated = negate_guard(self.grounder, guard);
                states.into_iter().flat_map(|s| apply_cnf(s, &negated)).unique().collect()
            }
        })
    }

    /// Relative state before effects without conditional effects, or `None` if the effects contradict
    /// the target in a way that no state before can avoid.
    fn regress(&self, target: &RelativeState, effects: &GroundEffects, sub: &Substitution) -> Option<RelativeState> {
        let mut res = target.clone();
        for atom in target.positive() {
            if effects.adds(atom) {
                res.forget(atom);
            } else if effects.deletes(atom) {
                return None;
            }
        }
        for atom in target.negative() {
            if effects.deletes(atom) {
                res.forget(atom);
            } else if effects.adds(atom) {
                return None;
            }
        }

        // values after the effects are forgotten before adding the constraints they induce on values before
        let mut numeric_constraints = Vec::new();
        for (function, value) in target.numeric_values() {
            if !effects.numeric.contains_key(function) {
                continue;
            }
            res.forget_numeric(function);
            let mut replacer = NumericReplacer::new(self.grounder, &effects.numeric, sub);
            let after = replacer.replace(&NumExpr::Function(function.clone()));
            if let Some(n) = after.as_number() {
                if n != value {
                    return None;
                }
                continue;
            }
            match solve_comparison(CmpOp::Eq, after, NumExpr::number(value)) {
                (CmpOp::Eq, NumExpr::Function(before), rhs) if rhs.as_number().is_some() => {
                    numeric_constraints.push((before, rhs.as_number().unwrap_or(value)));
                }
                (_, lhs, _) => {
                    tracing::trace!("dropped candidate: cannot express {lhs} = {value} on a relative state");
                    return None;
                }
            }
        }
        let mut object_constraints = Vec::new();
        for (function, value) in target.object_values() {
            let Some(assigned) = effects.objects.get(function) else {
                continue;
            };
            res.forget_object(function);
            match assigned {
                Term::Cst(c) if c == value => {}
                Term::Cst(_) => return None,
                Term::Fun(before) if before.is_ground() => object_constraints.push(((**before).clone(), value.clone())),
                _ => {
                    tracing::trace!("dropped candidate: cannot express {function} = {value} on a relative state");
                    return None;
                }
            }
        }
        for (function, value) in numeric_constraints {
            if !res.require_numeric(function, value) {
                return None;
            }
        }
        for (function, value) in object_constraints {
            if !res.require_object(function, value) {
                return None;
            }
        }
        Some(res)
    }

    /// Ground preconditions of the operator, without the clauses satisfied by rigid relations.
    fn preconditions(&self, sub: &Substitution) -> Cnf {
        let grounded = self.grounder.ground_conditions(&self.operator.preconditions, sub);
        if !RIGID_FILTER.get() {
            return grounded;
        }
        let clauses = grounded
            .clauses()
            .filter(|clause| {
                !clause.literals().any(|l| match l {
                    Literal::Pred { atom, negated: false } => atom.is_ground() && self.evaluator.is_rigid_relation(atom),
                    _ => false,
                })
            })
            .cloned();
        Cnf::new(clauses).with_params(grounded.params().to_vec())
    }
}

/// All minimal refinements of the relative state that satisfy the formula, one per choice of a
/// literal in each clause.
fn apply_cnf(state: RelativeState, cnf: &Cnf) -> Vec<RelativeState> {
    let mut states = vec![state];
    for clause in cnf.clauses() {
        let mut next = Vec::with_capacity(states.len());
        for s in &states {
            if clause.literals().any(|l| known(s, l) == Some(true)) {
                next.push(s.clone());
                continue;
            }
            next.extend(clause.literals().filter_map(|l| require(s, l)));
        }
        states = next.into_iter().unique().collect();
        if states.is_empty() {
            break;
        }
    }
    states
}

/// Truth value of a ground literal in the relative state, if it is known.
fn known(state: &RelativeState, literal: &Literal) -> Option<bool> {
    let value = match literal {
        Literal::Pred { atom, .. } => {
            if state.is_positive(atom) {
                Some(true)
            } else if state.is_negative(atom) {
                Some(false)
            } else {
                None
            }
        }
        Literal::Equals { lhs, rhs, .. } => {
            let l = known_term(state, lhs)?;
            let r = known_term(state, rhs)?;
            Some(l == r)
        }
        Literal::Compare { op, lhs, rhs, .. } => {
            let l = lhs.eval(&|f: &Atom| state.numeric_value(f))?;
            let r = rhs.eval(&|f: &Atom| state.numeric_value(f))?;
            Some(op.holds(l, r))
        }
    };
    value.map(|v| v != literal.is_negated())
}

fn known_term<'a>(state: &'a RelativeState, term: &'a Term) -> Option<&'a Sym> {
    match term {
        Term::Cst(c) => Some(c),
        Term::Fun(f) => state.object_value(f),
        Term::Var(_) => None,
    }
}

/// Refinement of the relative state in which the literal holds, or `None` if it cannot hold.
/// Literals that cannot be expressed on a relative state leave it unchanged.
fn require(state: &RelativeState, literal: &Literal) -> Option<RelativeState> {
    match known(state, literal) {
        Some(true) => return Some(state.clone()),
        Some(false) => return None,
        None => {}
    }
    let mut res = state.clone();
    let consistent = match literal {
        Literal::Pred { atom, negated } if atom.is_ground() => res.require(atom.clone(), !negated),
        Literal::Equals {
            lhs,
            rhs,
            negated: false,
        } => match (lhs, rhs) {
            (Term::Fun(f), Term::Cst(c)) | (Term::Cst(c), Term::Fun(f)) if f.is_ground() => {
                res.require_object((**f).clone(), c.clone())
            }
            _ => true,
        },
        Literal::Compare {
            op: CmpOp::Eq,
            lhs,
            rhs,
            negated: false,
        } => match solve_comparison(CmpOp::Eq, lhs.clone(), rhs.clone()) {
            (CmpOp::Eq, NumExpr::Function(f), NumExpr::Number(n)) if f.is_ground() => res.require_numeric(f, n.0),
            _ => true,
        },
        _ => true,
    };
    consistent.then_some(res)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn atom(name: &str, arg: &str) -> Atom {
        Atom::ground(name, &[arg])
    }

    fn universe() -> Universe {
        Universe::new().with_objects("obj", &["a", "b"]).expect("distinct objects")
    }

    #[test]
    fn achieved_facts_are_forgotten() {
        let universe = universe();
        let op = Operator::new("op", vec![])
            .with_preconditions(Cnf::all([Literal::pos(atom("Q", "b"))]))
            .with_effects(vec![
                Effect::Add(atom("P", "a")),
                Effect::Delete(atom("Q", "b")),
            ]);
        let mut target = RelativeState::new();
        target.require(atom("P", "a"), true);
        target.require(atom("Q", "b"), false);
        target.require(atom("R", "c"), true);

        let res = apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();
        let mut expected = RelativeState::new();
        expected.require(atom("R", "c"), true);
        expected.require(atom("Q", "b"), true);
        assert_eq!(res, vec![expected]);

        let mut deleted = RelativeState::new();
        deleted.require(atom("Q", "b"), true);
        let contradicted = apply_backwards_relative_state(&universe, &universe, &op, &deleted, &mut Substitution::new());
        assert_eq!(contradicted.count(), 0);
    }

    #[test]
    fn disjunctive_preconditions_branch() {
        let universe = universe();
        let op = Operator::new("op", vec![])
            .with_preconditions(Cnf::new([Clause::new([
                Literal::pos(atom("A", "a")),
                Literal::pos(atom("B", "a")),
            ])]))
            .with_effects(vec![Effect::Add(atom("P", "a"))]);
        let mut target = RelativeState::new();
        target.require(atom("P", "a"), true);
        let res = apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();
        assert_eq!(res.len(), 2);

        // a known literal satisfies the clause without branching
        target.require(atom("B", "a"), true);
        let res = apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();
        assert_eq!(res.len(), 1);
        assert!(res[0].is_positive(&atom("B", "a")));
    }

    #[test]
    fn conditional_candidates() {
        let universe = universe();
        let op = Operator::new("op", vec![]).with_effects(vec![Effect::when(
            Cnf::all([Literal::pos(atom("G", "a"))]),
            vec![Effect::Add(atom("P", "a"))],
        )]);
        let mut target = RelativeState::new();
        target.require(atom("P", "a"), true);
        let res: Vec<RelativeState> =
            apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect();
        // either P(a) already held and G(a) did not, or G(a) held
        let mut held = RelativeState::new();
        held.require(atom("P", "a"), true);
        held.require(atom("G", "a"), false);
        let mut fired = RelativeState::new();
        fired.require(atom("G", "a"), true);
        assert_eq!(res.len(), 2);
        assert!(res.contains(&held));
        assert!(res.contains(&fired));
    }

    #[test]
    fn quantified_guard() {
        let universe = universe();
        let y = Var(3);
        let op = Operator::new("op", vec![]).with_effects(vec![Effect::when(
            Cnf::all([Literal::pos(Atom::new("G", [Term::Var(y)]))]).with_params(vec![Param::new(y, "obj")]),
            vec![Effect::Add(atom("P", "a"))],
        )]);
        let mut target = RelativeState::new();
        target.require(atom("P", "a"), true);
        let res = apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();

        // P(a) held and no object satisfied the guard, or some object did
        let mut held = RelativeState::new();
        held.require(atom("P", "a"), true);
        held.require(atom("G", "a"), false);
        held.require(atom("G", "b"), false);
        let mut fired_a = RelativeState::new();
        fired_a.require(atom("G", "a"), true);
        let mut fired_b = RelativeState::new();
        fired_b.require(atom("G", "b"), true);
        assert_eq!(res.len(), 3);
        assert!(res.contains(&held));
        assert!(res.contains(&fired_a));
        assert!(res.contains(&fired_b));
    }

    #[test]
    fn deleted_fact_restored_by_conditional_effect() {
        let universe = universe();
        let op = Operator::new("op", vec![]).with_effects(vec![
            Effect::Delete(atom("P", "a")),
            Effect::when(Cnf::all([Literal::pos(atom("G", "a"))]), vec![Effect::Add(atom("P", "a"))]),
        ]);
        let mut target = RelativeState::new();
        target.require(atom("P", "a"), true);
        assert_eq!(
            is_relevant_state(&universe, &op, &target, &mut Substitution::new()),
            Relevance::Relevant
        );
        let res = apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();
        let mut fired = RelativeState::new();
        fired.require(atom("G", "a"), true);
        assert_eq!(res, vec![fired]);
    }

    /// Universe counting the enumerations of object domains.
    struct Counting {
        universe: Universe,
        calls: Cell<usize>,
    }

    impl Grounder for Counting {
        fn objects_of(&self, tpe: &Sym) -> &[Sym] {
            self.calls.set(self.calls.get() + 1);
            self.universe.objects_of(tpe)
        }
    }

    #[test]
    fn branches_are_regressed_on_demand() {
        let counting = Counting {
            universe: universe(),
            calls: Cell::new(0),
        };
        let y = Var(3);
        let op = Operator::new("op", vec![]).with_effects(vec![Effect::when(
            Cnf::all([Literal::pos(Atom::new("G", [Term::Var(y)]))]).with_params(vec![Param::new(y, "obj")]),
            vec![Effect::Add(atom("P", "a"))],
        )]);
        let mut target = RelativeState::new();
        target.require(atom("P", "a"), true);
        let mut predecessors =
            apply_backwards_relative_state(&counting, &counting.universe, &op, &target, &mut Substitution::new());
        assert_eq!(counting.calls.get(), 0);
        assert!(predecessors.next().is_some());
        let first = counting.calls.get();
        assert!(first > 0);
        assert_eq!(predecessors.count(), 2);
        assert!(counting.calls.get() > first);
    }

    #[test]
    fn numeric_values_before() {
        let universe = universe();
        let fuel = Atom::ground("fuel", &[]);
        let op = Operator::new("refuel", vec![]).with_effects(vec![Effect::increase(fuel.clone(), NumExpr::number(5.0))]);
        let mut target = RelativeState::new();
        target.require_numeric(fuel.clone(), 12.0);
        let res = apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].numeric_value(&fuel), Some(7.0));

        let reset = Operator::new("reset", vec![]).with_effects(vec![Effect::assign(fuel.clone(), NumExpr::number(0.0))]);
        assert_eq!(
            apply_backwards_relative_state(&universe, &universe, &reset, &target, &mut Substitution::new()).count(),
            0
        );
    }
}
