//! Backward application of operators, either on CNF conditions or on relative states.

use std::collections::BTreeSet;

use env_param::EnvParam;
use itertools::Itertools;

use crate::*;

pub mod collector;
pub mod conditions;
pub mod numeric;
pub mod relative;
pub mod relevance;

pub use collector::{ConditionalEffects, EffectCollector, GroundEffects, PreprocessedEffects};
pub use conditions::BackwardConditions;
pub use numeric::{NumericReplacer, solve_comparison};
pub use relative::BackwardRelativeState;
pub use relevance::{CnfRelevance, ConditionRelevance, Relevance, StateRelevance};

/// Maximal number of combinations of conditional effects considered when regressing through an operator.
/// Above it, only the combinations with the fewest firing effects are kept.
pub static MAX_CONDITIONAL_BRANCHES: EnvParam<usize> = EnvParam::new("ARIES_REGRESSION_MAX_CONDITIONAL_BRANCHES", "4096");

/// If true, precondition clauses that contain a rigid relation known to hold are dropped.
pub static RIGID_FILTER: EnvParam<bool> = EnvParam::new("ARIES_REGRESSION_RIGID_FILTER", "true");

/// Substitution used to ground the preconditions of the operator.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum SubstitutionMode {
    /// Ground with the full substitution of the operator.
    #[default]
    Full,
    /// Only bind the parameters needed to justify the effects used by the regression.
    /// Other parameters remain existentially quantified.
    Minimal,
}

/// Regresses `target` through the operator whose parameters are bound by `sub`.
/// With no target, the result is the preconditions of the operator.
///
/// # Panics
/// If the operator has an equality effect.
pub fn apply_backwards_conditions(
    grounder: &impl Grounder,
    evaluator: &impl Evaluator,
    operator: &Operator,
    target: Option<&Cnf>,
    sub: &mut Substitution,
) -> Condition {
    BackwardConditions::new(grounder, evaluator, operator).apply_backwards(target, sub)
}

/// All relative states from which applying the operator leads to a state matching `target`.
///
/// # Panics
/// If the operator has an equality effect.
pub fn apply_backwards_relative_state<'a>(
    grounder: &'a impl Grounder,
    evaluator: &'a impl Evaluator,
    operator: &'a Operator,
    target: &RelativeState,
    sub: &mut Substitution,
) -> Box<dyn Iterator<Item = RelativeState> + 'a> {
    BackwardRelativeState::new(grounder, evaluator, operator).apply_backwards(target, sub)
}

/// True if the effects of the operator contribute to `target` without falsifying it.
/// For a quantified target, at least one of its instances must be relevant.
pub fn is_relevant(grounder: &impl Grounder, operator: &Operator, target: &Cnf, sub: &mut Substitution) -> bool {
    let target = target.rename_apart(&reserved_variables(operator, sub));
    let effects = ground_effects(grounder, operator, sub);
    let target = grounder.ground_conditions(&target, sub);
    let relevance = ConditionRelevance::new(grounder, &effects, sub);
    if target.is_lifted() {
        let body = target.clone().with_params(Vec::new());
        grounder
            .groundings(target.params())
            .any(|instance| relevance.evaluate(&grounder.ground_conditions(&body, &instance)).is_relevant())
    } else {
        relevance.evaluate(&target).is_relevant()
    }
}

pub fn is_relevant_state(
    grounder: &impl Grounder,
    operator: &Operator,
    target: &RelativeState,
    sub: &mut Substitution,
) -> Relevance {
    let effects = ground_effects(grounder, operator, sub);
    StateRelevance::new(grounder, &effects, sub).evaluate(target).0
}

/// Variables that the parameters of a regressed target must not reuse:
/// those of the operator and those bound by its substitution.
pub(crate) fn reserved_variables(operator: &Operator, sub: &Substitution) -> BTreeSet<Var> {
    let mut vars = operator.variables();
    vars.extend(sub.bindings().keys().copied());
    vars
}

pub(crate) fn ground_effects(grounder: &impl Grounder, operator: &Operator, sub: &mut Substitution) -> GroundEffects {
    GroundEffects::build(grounder, &operator.effects, sub).unwrap_or_else(|e| panic!("{}: {e}", operator.name))
}

/// Combinations of the given conditional effects, by increasing number of firing effects.
/// Returns the combinations and whether some were left out because of `limit`.
pub(crate) fn combinations(touching: &[usize], limit: usize) -> (Vec<Vec<usize>>, bool) {
    let all = (0..=touching.len()).flat_map(|size| touching.iter().copied().combinations(size));
    let mut res = all.take(limit.saturating_add(1)).collect_vec();
    let truncated = res.len() > limit;
    res.truncate(limit);
    (res, truncated)
}

/// Outcome of the regression of a ground literal through some effects.
#[derive(Clone, PartialEq, Debug)]
pub(crate) enum Regressed {
    /// The literal holds after the effects, whatever the state before.
    True,
    /// The literal does not hold after the effects, whatever the state before.
    False,
    /// The literal holds after the effects iff this one holds before.
    Literal(Literal),
    /// The literal holds after the effects iff this formula holds before.
    Formula(Cnf),
}

impl Regressed {
    fn from_cnf(cnf: Cnf) -> Regressed {
        if cnf.is_tautology() {
            Regressed::True
        } else if cnf.is_contradiction() {
            Regressed::False
        } else {
            Regressed::Formula(cnf)
        }
    }

    pub fn to_cnf(&self) -> Cnf {
        match self {
            Regressed::True => Cnf::tautology(),
            Regressed::False => Cnf::contradiction(),
            Regressed::Literal(l) => Cnf::all([l.clone()]),
            Regressed::Formula(f) => f.clone(),
        }
    }
}

/// Regressed literal, together with whether the effects had any influence on it.
pub(crate) struct LiteralRegression {
    pub result: Regressed,
    pub touched: bool,
}

/// Regression of individual literals through a set of ground effects.
///
/// Records the grounded atoms and functions of the effects that were used.
pub(crate) struct Regressor<'a, G: Grounder> {
    grounder: &'a G,
    sub: &'a Substitution,
    pub consumed: BTreeSet<Atom>,
}

impl<'a, G: Grounder> Regressor<'a, G> {
    pub fn new(grounder: &'a G, sub: &'a Substitution) -> Self {
        Regressor {
            grounder,
            sub,
            consumed: BTreeSet::new(),
        }
    }

    pub fn sub(&self) -> &'a Substitution {
        self.sub
    }

    pub fn literal(&mut self, literal: &Literal, effects: &GroundEffects) -> LiteralRegression {
        match literal {
            Literal::Pred { atom, negated } => {
                let mut touched = false;
                let atom = self.atom(atom, effects, &mut touched);
                let result = if effects.adds(&atom) {
                    self.consumed.insert(atom);
                    touched = true;
                    if *negated { Regressed::False } else { Regressed::True }
                } else if effects.deletes(&atom) {
                    self.consumed.insert(atom);
                    touched = true;
                    if *negated { Regressed::True } else { Regressed::False }
                } else if atom.has_function_terms() {
                    self.unresolved_atom(atom, *negated, effects, &mut touched)
                } else {
                    Regressed::Literal(Literal::Pred {
                        atom,
                        negated: *negated,
                    })
                };
                LiteralRegression { result, touched }
            }
            Literal::Equals { lhs, rhs, negated } => {
                let mut touched = false;
                let lhs = self.term(lhs, effects, &mut touched);
                let rhs = self.term(rhs, effects, &mut touched);
                let result = if lhs == rhs {
                    decided(!*negated)
                } else if lhs.as_cst().is_some() && rhs.as_cst().is_some() {
                    decided(*negated)
                } else {
                    Regressed::Literal(Literal::Equals {
                        lhs,
                        rhs,
                        negated: *negated,
                    })
                };
                LiteralRegression { result, touched }
            }
            Literal::Compare { op, lhs, rhs, negated } => {
                let mut touched = false;
                let lhs = self.numeric(lhs, effects, &mut touched);
                let rhs = self.numeric(rhs, effects, &mut touched);
                let result = self.comparison(*op, lhs, rhs, *negated, effects, &mut Vec::new(), &mut touched);
                LiteralRegression { result, touched }
            }
        }
    }

    /// Regression of a whole formula through effects without conditional effects.
    pub fn cnf(&mut self, target: &Cnf, effects: &GroundEffects) -> Cnf {
        let mut res = Cnf::tautology();
        for clause in target.clauses() {
            let mut regressed = Cnf::contradiction();
            for lit in clause.literals() {
                match self.literal(lit, effects).result {
                    Regressed::True => {
                        regressed = Cnf::tautology();
                        break;
                    }
                    Regressed::False => {}
                    Regressed::Literal(l) => regressed = regressed.or(&Cnf::all([l])),
                    Regressed::Formula(f) => regressed = regressed.or(&f),
                }
            }
            res = res.and(&regressed);
        }
        res.with_params(target.params().to_vec())
    }

    /// Regression of a predicate literal whose arguments are function terms that the effects leave unchanged.
    /// The atom may denote any added or deleted atom of the same relation, depending on the value of its arguments.
    fn unresolved_atom(&mut self, atom: Atom, negated: bool, effects: &GroundEffects, touched: &mut bool) -> Regressed {
        let added = effects.add.iter().filter_map(|a| Some((a, denotes(&atom, a)?))).collect_vec();
        let deleted = effects
            .del
            .iter()
            .filter(|d| effects.deletes(d))
            .filter_map(|d| Some((d, denotes(&atom, d)?)))
            .collect_vec();
        if added.is_empty() && deleted.is_empty() {
            return Regressed::Literal(Literal::Pred { atom, negated });
        }
        *touched = true;
        self.consumed.extend(added.iter().chain(&deleted).map(|(a, _)| (*a).clone()));
        // holds after iff it is one of the added atoms, or it held before and is none of the deleted ones
        let kept = deleted
            .iter()
            .fold(Cnf::all([Literal::pos(atom)]), |acc, (_, eq)| acc.and(&eq.negate()));
        let holds = added.iter().fold(kept, |acc, (_, eq)| acc.or(eq));
        Regressed::from_cnf(if negated { holds.negate() } else { holds })
    }

    /// Numeric expression in which the function terms appearing as arguments of its functions
    /// are replaced by the object they are assigned.
    fn numeric(&mut self, expr: &NumExpr, effects: &GroundEffects, touched: &mut bool) -> NumExpr {
        expr.map_functions(&mut |f| self.atom(f, effects, touched))
    }

    /// Regression of a comparison. A function whose arguments are unknown is split on the assigned
    /// functions it may denote. Functions in `frozen` are known to denote none of them.
    #[allow(clippy::too_many_arguments)]
    fn comparison(
        &mut self,
        op: CmpOp,
        lhs: NumExpr,
        rhs: NumExpr,
        negated: bool,
        effects: &GroundEffects,
        frozen: &mut Vec<Atom>,
        touched: &mut bool,
    ) -> Regressed {
        let split = lhs.functions().into_iter().chain(rhs.functions()).find_map(|f| {
            if !f.has_function_terms() || frozen.contains(f) {
                return None;
            }
            let candidates = effects
                .numeric
                .keys()
                .filter_map(|k| Some((k.clone(), denotes(f, k)?)))
                .collect_vec();
            (!candidates.is_empty()).then(|| (f.clone(), candidates))
        });
        let Some((function, candidates)) = split else {
            return self.solved(op, lhs, rhs, negated, effects, touched);
        };
        *touched = true;
        let mut result = Cnf::contradiction();
        let mut excluded = Cnf::tautology();
        for (key, eq) in candidates {
            let substitute = |e: &NumExpr| e.map_functions(&mut |f| if f == &function { key.clone() } else { f.clone() });
            let (l, r) = (substitute(&lhs), substitute(&rhs));
            let branch = self.comparison(op, l, r, negated, effects, frozen, touched);
            result = result.or(&eq.and(&branch.to_cnf()));
            excluded = excluded.and(&eq.negate());
        }
        frozen.push(function);
        let unchanged = self.comparison(op, lhs, rhs, negated, effects, frozen, touched);
        frozen.pop();
        Regressed::from_cnf(result.or(&excluded.and(&unchanged.to_cnf())))
    }

    /// Regression of a comparison whose functions are known, by inlining the assigned values.
    fn solved(
        &mut self,
        op: CmpOp,
        lhs: NumExpr,
        rhs: NumExpr,
        negated: bool,
        effects: &GroundEffects,
        touched: &mut bool,
    ) -> Regressed {
        let mut replacer = NumericReplacer::new(self.grounder, &effects.numeric, self.sub);
        let lhs = replacer.replace(&lhs);
        let rhs = replacer.replace(&rhs);
        let replaced = !replacer.replaced().is_empty();
        self.consumed.extend(replacer.replaced().iter().cloned());
        *touched |= replaced;
        match (lhs.as_number(), rhs.as_number()) {
            (Some(l), Some(r)) => decided(op.holds(l, r) != negated),
            _ => {
                let (op, lhs, rhs) = if replaced {
                    solve_comparison(op, lhs, rhs)
                } else {
                    (op, lhs, rhs)
                };
                Regressed::Literal(Literal::Compare { op, lhs, rhs, negated })
            }
        }
    }

    /// Atom with its function terms replaced by the object they are assigned.
    fn atom(&mut self, atom: &Atom, effects: &GroundEffects, touched: &mut bool) -> Atom {
        let atom = self.grounder.ground_atom(atom, self.sub);
        if !atom.has_function_terms() {
            return atom;
        }
        Atom {
            symbol: atom.symbol.clone(),
            args: atom.args.iter().map(|t| self.term(t, effects, touched)).collect(),
        }
    }

    /// Term as a function of the state before the effects. Inner function terms are rewritten first.
    fn term(&mut self, term: &Term, effects: &GroundEffects, touched: &mut bool) -> Term {
        match term {
            Term::Cst(_) => term.clone(),
            Term::Var(_) => self.grounder.ground_term(term, self.sub),
            Term::Fun(function) => {
                let function = self.atom(function, effects, touched);
                match effects.objects.get(&function) {
                    Some(value) => {
                        *touched = true;
                        self.consumed.insert(function);
                        value.clone()
                    }
                    None => Term::fun(function),
                }
            }
        }
    }
}

fn decided(value: bool) -> Regressed {
    if value { Regressed::True } else { Regressed::False }
}

/// Condition under which `atom`, whose arguments may be function terms, denotes the ground atom `other`.
/// None if it never does.
fn denotes(atom: &Atom, other: &Atom) -> Option<Cnf> {
    if atom.symbol != other.symbol || atom.args.len() != other.args.len() {
        return None;
    }
    let mut equalities = Vec::new();
    for (arg, value) in atom.args.iter().zip(other.args.iter()) {
        match arg {
            Term::Fun(_) => equalities.push(Literal::equals(arg.clone(), value.clone())),
            _ if arg == value => {}
            _ => return None,
        }
    }
    Some(Cnf::all(equalities))
}

/// Conjunction of two formulas whose parameters denote distinct variables.
pub(crate) fn conjoin(acc: &Cnf, other: &Cnf) -> Cnf {
    if other.is_lifted() {
        acc.and(&other.rename_apart(&acc.variables()))
    } else {
        acc.and(other)
    }
}

/// Instances of a guard, one for each binding of its existential parameters.
/// A guard without parameters is its only instance.
pub(crate) fn guard_instances(grounder: &impl Grounder, guard: &Cnf) -> Vec<Cnf> {
    if !guard.is_lifted() {
        return vec![guard.clone()];
    }
    let body = guard.clone().with_params(Vec::new());
    grounder
        .groundings(guard.params())
        .map(|instance| grounder.ground_conditions(&body, &instance))
        .collect()
}

/// Negation of a guard. A quantified guard `exists y. G(y)` becomes the conjunction of `not G(o)`
/// over all objects `o` of the type of `y`.
pub(crate) fn negate_guard(grounder: &impl Grounder, guard: &Cnf) -> Cnf {
    guard_instances(grounder, guard)
        .iter()
        .fold(Cnf::tautology(), |acc, instance| acc.and(&instance.negate()))
}

/// Disjunction of two formulas whose parameters denote distinct variables.
pub(crate) fn disjoin(acc: &Cnf, other: &Cnf) -> Cnf {
    if other.is_lifted() {
        acc.or(&other.rename_apart(&acc.variables()))
    } else {
        acc.or(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combinations_by_size() {
        let (all, truncated) = combinations(&[3, 5], 10);
        assert_eq!(all, vec![vec![], vec![3], vec![5], vec![3, 5]]);
        assert!(!truncated);
        let (some, truncated) = combinations(&[1, 2, 3], 4);
        assert_eq!(some.len(), 4);
        assert!(truncated);
        assert!(some.iter().all(|c| c.len() <= 1));
    }

    #[test]
    fn regress_object_equality() {
        let universe = Universe::new();
        let holder = Atom::ground("holder", &["key"]);
        let mut effects = GroundEffects::default();
        effects.objects.insert(holder.clone(), Term::cst("bob"));
        let sub = Substitution::new();
        let mut regressor = Regressor::new(&universe, &sub);

        let lit = Literal::equals(Term::fun(holder.clone()), Term::cst("bob"));
        let res = regressor.literal(&lit, &effects);
        assert!(res.touched);
        assert_eq!(res.result, Regressed::True);

        let lit = Literal::pos(Atom::new("at", [Term::fun(holder.clone()), Term::cst("kitchen")]));
        let res = regressor.literal(&lit, &effects);
        assert_eq!(
            res.result,
            Regressed::Literal(Literal::pos(Atom::ground("at", &["bob", "kitchen"])))
        );
        assert!(regressor.consumed.contains(&holder));
    }

    #[test]
    fn unassigned_function_argument() {
        let universe = Universe::new();
        let holder = Term::fun(Atom::ground("holder", &["key"]));
        let mut effects = GroundEffects::default();
        effects.del.insert(Atom::ground("P", &["a"]));
        let sub = Substitution::new();
        let mut regressor = Regressor::new(&universe, &sub);

        // P(holder(key)) survives iff the key is not held by a
        let lit = Literal::pos(Atom::new("P", [holder.clone()]));
        let res = regressor.literal(&lit, &effects);
        assert!(res.touched);
        let expected = Cnf::all([lit.clone(), Literal::not_equals(holder.clone(), Term::cst("a"))]);
        assert_eq!(res.result, Regressed::Formula(expected));
        assert!(regressor.consumed.contains(&Atom::ground("P", &["a"])));

        let unrelated = Literal::pos(Atom::new("Q", [holder]));
        let res = regressor.literal(&unrelated, &effects);
        assert!(!res.touched);
        assert_eq!(res.result, Regressed::Literal(unrelated));
    }

    #[test]
    fn numeric_function_arguments() {
        let universe = Universe::new();
        let holder = Atom::ground("holder", &["key"]);
        let fuel = |arg: Term| NumExpr::function(Atom::new("fuel", [arg]));
        let sub = Substitution::new();

        // the argument is assigned by the effects
        let mut effects = GroundEffects::default();
        effects.objects.insert(holder.clone(), Term::cst("bob"));
        let mut regressor = Regressor::new(&universe, &sub);
        let lit = Literal::compare(CmpOp::Gt, fuel(Term::fun(holder.clone())), NumExpr::number(2.0));
        let res = regressor.literal(&lit, &effects);
        assert!(res.touched);
        let expected = Literal::compare(CmpOp::Gt, fuel(Term::cst("bob")), NumExpr::number(2.0));
        assert_eq!(res.result, Regressed::Literal(expected));

        // the argument is unknown and may denote the assigned function
        let mut effects = GroundEffects::default();
        effects
            .numeric
            .insert(Atom::ground("fuel", &["a"]), NumExpr::number(3.0));
        let lit = Literal::compare(CmpOp::Eq, fuel(Term::fun(holder.clone())), NumExpr::number(5.0));
        let res = regressor.literal(&lit, &effects);
        assert!(res.touched);
        let expected = Cnf::all([lit, Literal::not_equals(Term::fun(holder), Term::cst("a"))]);
        assert_eq!(res.result, Regressed::Formula(expected));
    }
}
