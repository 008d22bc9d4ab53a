use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display};

use itertools::Itertools;

use crate::*;

/// Concrete state: association of each state variable to its value.
///
/// Predicates follow the closed world assumption (an atom absent from the state is false).
/// Function values may be undefined.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct State {
    facts: BTreeSet<Atom>,
    numeric: BTreeMap<Atom, Num>,
    objects: BTreeMap<Atom, Sym>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_facts(facts: impl IntoIterator<Item = Atom>) -> Self {
        State {
            facts: facts.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn holds(&self, atom: &Atom) -> bool {
        self.facts.contains(atom)
    }

    pub fn add(&mut self, atom: Atom) {
        debug_assert!(atom.is_ground(), "Adding a lifted atom to a state: {atom}");
        self.facts.insert(atom);
    }

    pub fn del(&mut self, atom: &Atom) {
        self.facts.remove(atom);
    }

    pub fn facts(&self) -> impl Iterator<Item = &Atom> + '_ {
        self.facts.iter()
    }

    pub fn numeric_value(&self, function: &Atom) -> Option<f64> {
        self.numeric.get(function).map(|n| n.0)
    }

    pub fn set_numeric(&mut self, function: Atom, value: f64) {
        self.numeric.insert(function, Num(value));
    }

    pub fn unset_numeric(&mut self, function: &Atom) {
        self.numeric.remove(function);
    }

    pub fn numeric_values(&self) -> impl Iterator<Item = (&Atom, f64)> + '_ {
        self.numeric.iter().map(|(a, n)| (a, n.0))
    }

    pub fn object_value(&self, function: &Atom) -> Option<&Sym> {
        self.objects.get(function)
    }

    pub fn set_object(&mut self, function: Atom, value: Sym) {
        self.objects.insert(function, value);
    }

    pub fn unset_object(&mut self, function: &Atom) {
        self.objects.remove(function);
    }

    pub fn object_values(&self) -> impl Iterator<Item = (&Atom, &Sym)> + '_ {
        self.objects.iter()
    }

    /// Replaces all function applications in the arguments of the atom by their value.
    /// Returns `None` if the atom is lifted or one of the functions has no value.
    pub fn resolve_atom(&self, atom: &Atom) -> Option<Atom> {
        let args = atom
            .args
            .iter()
            .map(|t| self.eval_term(t).map(Term::Cst))
            .collect::<Option<SeqTerm>>()?;
        Some(Atom {
            symbol: atom.symbol.clone(),
            args,
        })
    }

    /// Value of the term in this state, if it is defined.
    pub fn eval_term(&self, term: &Term) -> Option<Sym> {
        match term {
            Term::Cst(sym) => Some(sym.clone()),
            Term::Var(_) => None,
            Term::Fun(function) => {
                let function = self.resolve_atom(function)?;
                self.objects.get(&function).cloned()
            }
        }
    }

    pub fn eval_numeric(&self, expr: &NumExpr) -> Option<f64> {
        expr.eval(&|f: &Atom| {
            let f = self.resolve_atom(f)?;
            self.numeric_value(&f)
        })
    }

    /// Truth value of a ground literal. Literals referring to undefined values are false.
    pub fn entails(&self, literal: &Literal) -> bool {
        match literal {
            Literal::Pred { atom, negated } => match self.resolve_atom(atom) {
                Some(atom) => self.holds(&atom) != *negated,
                None => false,
            },
            Literal::Equals { lhs, rhs, negated } => match (self.eval_term(lhs), self.eval_term(rhs)) {
                (Some(l), Some(r)) => (l == r) != *negated,
                _ => false,
            },
            Literal::Compare { op, lhs, rhs, negated } => match (self.eval_numeric(lhs), self.eval_numeric(rhs)) {
                (Some(l), Some(r)) => op.holds(l, r) != *negated,
                _ => false,
            },
        }
    }

    /// True if the state is a model of the ground formula.
    pub fn satisfies(&self, cnf: &Cnf) -> bool {
        debug_assert!(!cnf.is_lifted(), "Evaluating a quantified formula against a state");
        cnf.clauses().all(|clause| clause.literals().any(|l| self.entails(l)))
    }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}", self.facts.iter().format(", "))?;
        for (function, value) in &self.numeric {
            write!(f, ", {function} = {value}")?;
        }
        for (function, value) in &self.objects {
            write!(f, ", {function} = {value}")?;
        }
        write!(f, "}}")
    }
}

impl Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Partial state, used as a node of backward search.
///
/// Each state variable is either known positively (atom true, function value fixed),
/// known negatively (atom false) or unconstrained.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativeState {
    positive: BTreeSet<Atom>,
    negative: BTreeSet<Atom>,
    numeric: BTreeMap<Atom, Num>,
    objects: BTreeMap<Atom, Sym>,
}

impl RelativeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative state that is only satisfied by the given state, assuming `universe` lists all atoms
    /// of the problem (atoms of the universe absent from the state are known to be false).
    pub fn from_state<'a>(state: &State, universe: impl IntoIterator<Item = &'a Atom>) -> Self {
        let mut rel = RelativeState {
            positive: state.facts.clone(),
            negative: BTreeSet::new(),
            numeric: state.numeric.clone(),
            objects: state.objects.clone(),
        };
        for atom in universe {
            if !state.holds(atom) {
                rel.negative.insert(atom.clone());
            }
        }
        rel
    }

    pub fn positive(&self) -> impl Iterator<Item = &Atom> + '_ {
        self.positive.iter()
    }

    pub fn negative(&self) -> impl Iterator<Item = &Atom> + '_ {
        self.negative.iter()
    }

    pub fn numeric_values(&self) -> impl Iterator<Item = (&Atom, f64)> + '_ {
        self.numeric.iter().map(|(a, n)| (a, n.0))
    }

    pub fn object_values(&self) -> impl Iterator<Item = (&Atom, &Sym)> + '_ {
        self.objects.iter()
    }

    pub fn is_positive(&self, atom: &Atom) -> bool {
        self.positive.contains(atom)
    }

    pub fn is_negative(&self, atom: &Atom) -> bool {
        self.negative.contains(atom)
    }

    pub fn numeric_value(&self, function: &Atom) -> Option<f64> {
        self.numeric.get(function).map(|n| n.0)
    }

    pub fn object_value(&self, function: &Atom) -> Option<&Sym> {
        self.objects.get(function)
    }

    /// True if nothing is known.
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty() && self.numeric.is_empty() && self.objects.is_empty()
    }

    /// Requires the atom to have the given value.
    /// Returns false (and leaves the state unchanged) if the opposite value is already required.
    pub fn require(&mut self, atom: Atom, value: bool) -> bool {
        let (same, opposite) = if value {
            (&mut self.positive, &self.negative)
        } else {
            (&mut self.negative, &self.positive)
        };
        if opposite.contains(&atom) {
            false
        } else {
            same.insert(atom);
            true
        }
    }

    /// Requires the numeric function to have the given value.
    /// Returns false (and leaves the state unchanged) if another value is already required.
    pub fn require_numeric(&mut self, function: Atom, value: f64) -> bool {
        match self.numeric.get(&function) {
            Some(&previous) => previous == Num(value),
            None => {
                self.numeric.insert(function, Num(value));
                true
            }
        }
    }

    /// Requires the object function to have the given value.
    /// Returns false (and leaves the state unchanged) if another value is already required.
    pub fn require_object(&mut self, function: Atom, value: Sym) -> bool {
        match self.objects.get(&function) {
            Some(previous) => previous == &value,
            None => {
                self.objects.insert(function, value);
                true
            }
        }
    }

    /// Makes the atom unconstrained.
    pub fn forget(&mut self, atom: &Atom) {
        self.positive.remove(atom);
        self.negative.remove(atom);
    }

    pub fn forget_numeric(&mut self, function: &Atom) {
        self.numeric.remove(function);
    }

    pub fn forget_object(&mut self, function: &Atom) {
        self.objects.remove(function);
    }

    /// True if every known fact of the relative state holds in `state`.
    pub fn is_satisfied_by(&self, state: &State) -> bool {
        self.positive.iter().all(|a| state.holds(a))
            && self.negative.iter().all(|a| !state.holds(a))
            && self
                .numeric
                .iter()
                .all(|(f, v)| state.numeric_value(f) == Some(v.0))
            && self.objects.iter().all(|(f, v)| state.object_value(f) == Some(v))
    }

    /// Conjunction of unit literals describing the known facts.
    pub fn to_cnf(&self) -> Cnf {
        let preds = self
            .positive
            .iter()
            .map(|a| Literal::pos(a.clone()))
            .chain(self.negative.iter().map(|a| Literal::neg(a.clone())));
        let numeric = self.numeric.iter().map(|(f, v)| {
            Literal::compare(CmpOp::Eq, NumExpr::Function(f.clone()), NumExpr::Number(*v))
        });
        let objects = self
            .objects
            .iter()
            .map(|(f, v)| Literal::equals(Term::fun(f.clone()), Term::Cst(v.clone())));
        Cnf::all(preds.chain(numeric).chain(objects))
    }
}

impl Display for RelativeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let known = self
            .positive
            .iter()
            .map(|a| a.to_string())
            .chain(self.negative.iter().map(|a| format!("¬{a}")))
            .chain(self.numeric.iter().map(|(a, v)| format!("{a} = {v}")))
            .chain(self.objects.iter().map(|(a, v)| format!("{a} = {v}")));
        write!(f, "[{}]", known.format(", "))
    }
}

impl Debug for RelativeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}
