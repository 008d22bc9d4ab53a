use std::collections::BTreeSet;
use std::fmt::{Debug, Display};

use itertools::Itertools;

use crate::grounding::substitute_literal;
use crate::{Atom, NumExpr, Param, Substitution, Term, Var};

/// Comparison operator of a numeric literal.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum CmpOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }

    /// Operator obtained when swapping the two sides of the comparison.
    pub fn mirrored(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
        }
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            CmpOp::Eq => "=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "{op}")
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Literal {
    Pred {
        atom: Atom,
        negated: bool,
    },
    Equals {
        lhs: Term,
        rhs: Term,
        negated: bool,
    },
    Compare {
        op: CmpOp,
        lhs: NumExpr,
        rhs: NumExpr,
        negated: bool,
    },
}

impl Literal {
    pub fn pos(atom: Atom) -> Literal {
        Literal::Pred { atom, negated: false }
    }

    pub fn neg(atom: Atom) -> Literal {
        Literal::Pred { atom, negated: true }
    }

    pub fn equals(lhs: Term, rhs: Term) -> Literal {
        Literal::Equals {
            lhs,
            rhs,
            negated: false,
        }
    }

    pub fn not_equals(lhs: Term, rhs: Term) -> Literal {
        Literal::Equals { lhs, rhs, negated: true }
    }

    pub fn compare(op: CmpOp, lhs: NumExpr, rhs: NumExpr) -> Literal {
        Literal::Compare {
            op,
            lhs,
            rhs,
            negated: false,
        }
    }

    pub fn is_negated(&self) -> bool {
        match self {
            Literal::Pred { negated, .. } | Literal::Equals { negated, .. } | Literal::Compare { negated, .. } => {
                *negated
            }
        }
    }

    /// Returns the complement of this literal.
    pub fn negation(&self) -> Literal {
        let mut res = self.clone();
        match &mut res {
            Literal::Pred { negated, .. } | Literal::Equals { negated, .. } | Literal::Compare { negated, .. } => {
                *negated = !*negated
            }
        }
        res
    }

    pub fn collect_variables(&self, out: &mut BTreeSet<Var>) {
        match self {
            Literal::Pred { atom, .. } => atom.collect_variables(out),
            Literal::Equals { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Literal::Compare { lhs, rhs, .. } => {
                lhs.visit_functions(&mut |a| a.collect_variables(out));
                rhs.visit_functions(&mut |a| a.collect_variables(out));
            }
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Pred { atom, negated } => {
                if *negated {
                    write!(f, "¬")?;
                }
                write!(f, "{atom}")
            }
            Literal::Equals { lhs, rhs, negated } => {
                let op = if *negated { "!=" } else { "=" };
                write!(f, "{lhs} {op} {rhs}")
            }
            Literal::Compare { op, lhs, rhs, negated } => {
                if *negated {
                    write!(f, "¬({lhs} {op} {rhs})")
                } else {
                    write!(f, "{lhs} {op} {rhs}")
                }
            }
        }
    }
}

impl Debug for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Disjunction of literals. The empty clause is unsatisfiable.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Clause {
    literals: BTreeSet<Literal>,
}

impl Clause {
    pub fn new(literals: impl IntoIterator<Item = Literal>) -> Clause {
        Clause {
            literals: literals.into_iter().collect(),
        }
    }

    pub fn unit(literal: Literal) -> Clause {
        Clause::new([literal])
    }

    pub fn empty() -> Clause {
        Clause::default()
    }

    pub fn literals(&self) -> impl Iterator<Item = &Literal> + '_ {
        self.literals.iter()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn contains(&self, lit: &Literal) -> bool {
        self.literals.contains(lit)
    }

    pub fn insert(&mut self, lit: Literal) -> bool {
        self.literals.insert(lit)
    }

    /// A clause that contains both a literal and its complement is always true.
    pub fn is_tautology(&self) -> bool {
        self.literals
            .iter()
            .filter(|l| !l.is_negated())
            .any(|l| self.literals.contains(&l.negation()))
    }

    /// True if every literal of `self` appears in `other`, in which case `self` entails `other`.
    pub fn subsumes(&self, other: &Clause) -> bool {
        self.literals.is_subset(&other.literals)
    }

    pub fn union(&self, other: &Clause) -> Clause {
        Clause {
            literals: self.literals.union(&other.literals).cloned().collect(),
        }
    }
}

impl FromIterator<Literal> for Clause {
    fn from_iter<T: IntoIterator<Item = Literal>>(iter: T) -> Self {
        Clause::new(iter)
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.literals.len() {
            0 => write!(f, "⊥"),
            1 => write!(f, "{}", self.literals.iter().format(" ∨ ")),
            _ => write!(f, "({})", self.literals.iter().format(" ∨ ")),
        }
    }
}

impl Debug for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Conjunction of clauses, possibly over existentially quantified parameters.
///
/// A CNF with no clause is always true. Any CNF containing the empty clause is normalized into
/// the canonical contradiction that has exactly one, empty, clause.
/// Tautological clauses are never stored and clauses subsumed by another one are removed.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cnf {
    params: Vec<Param>,
    clauses: BTreeSet<Clause>,
}

impl Cnf {
    pub fn tautology() -> Cnf {
        Cnf::default()
    }

    pub fn contradiction() -> Cnf {
        Cnf {
            params: Vec::new(),
            clauses: [Clause::empty()].into_iter().collect(),
        }
    }

    pub fn new(clauses: impl IntoIterator<Item = Clause>) -> Cnf {
        let mut clauses: BTreeSet<Clause> = clauses.into_iter().filter(|c| !c.is_tautology()).collect();
        if clauses.iter().any(|c| c.is_empty()) {
            return Cnf::contradiction();
        }
        let subsumed: Vec<Clause> = clauses
            .iter()
            .filter(|&c| clauses.iter().any(|d| d != c && d.subsumes(c)))
            .cloned()
            .collect();
        for c in &subsumed {
            clauses.remove(c);
        }
        Cnf {
            params: Vec::new(),
            clauses,
        }
    }

    /// Conjunction of the given literals, each in its own clause.
    pub fn all(literals: impl IntoIterator<Item = Literal>) -> Cnf {
        Cnf::new(literals.into_iter().map(Clause::unit))
    }

    /// Attaches existentially quantified parameters to the formula.
    pub fn with_params(mut self, params: Vec<Param>) -> Cnf {
        if !self.is_contradiction() {
            self.params = params;
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_lifted(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Clause> + '_ {
        self.clauses.iter()
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn literals(&self) -> impl Iterator<Item = &Literal> + '_ {
        self.clauses.iter().flat_map(|c| c.literals())
    }

    pub fn is_tautology(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn is_contradiction(&self) -> bool {
        self.clauses.iter().any(|c| c.is_empty())
    }

    /// All variables appearing in the formula, including its existential parameters.
    pub fn variables(&self) -> BTreeSet<Var> {
        let mut vars: BTreeSet<Var> = self.params.iter().map(|p| p.var).collect();
        for lit in self.literals() {
            lit.collect_variables(&mut vars);
        }
        vars
    }

    /// Variables that appear in the formula but are not declared as parameters.
    pub fn free_variables(&self) -> BTreeSet<Var> {
        let mut vars = BTreeSet::new();
        for lit in self.literals() {
            lit.collect_variables(&mut vars);
        }
        for p in &self.params {
            vars.remove(&p.var);
        }
        vars
    }

    pub fn and(&self, other: &Cnf) -> Cnf {
        if self.is_contradiction() || other.is_contradiction() {
            return Cnf::contradiction();
        }
        let mut res = Cnf::new(self.clauses.iter().chain(other.clauses.iter()).cloned());
        res.params = merge_params(&self.params, &other.params);
        res
    }

    /// Disjunction of two CNFs, obtained by distributing the clauses of one over the other.
    ///
    /// Parameters of both formulas are merged: the caller is responsible for renaming them apart
    /// when they should denote distinct variables.
    pub fn or(&self, other: &Cnf) -> Cnf {
        if self.is_contradiction() {
            return other.clone();
        }
        if other.is_contradiction() {
            return self.clone();
        }
        if self.is_tautology() || other.is_tautology() {
            return Cnf::tautology();
        }
        let clauses = self
            .clauses
            .iter()
            .cartesian_product(other.clauses.iter())
            .map(|(a, b)| a.union(b));
        let mut res = Cnf::new(clauses);
        if !res.is_tautology() {
            res.params = merge_params(&self.params, &other.params);
        }
        res
    }

    /// Renames the parameters that appear in `used` to fresh variables.
    pub fn rename_apart(&self, used: &BTreeSet<Var>) -> Cnf {
        let clashing: Vec<Var> = self.params.iter().map(|p| p.var).filter(|v| used.contains(v)).collect();
        if clashing.is_empty() {
            return self.clone();
        }
        let first_fresh = used
            .iter()
            .chain(self.variables().iter())
            .map(|v| v.0 + 1)
            .max()
            .unwrap_or(0);
        let renaming = Substitution::from_bindings(
            clashing
                .iter()
                .enumerate()
                .map(|(i, v)| (*v, Term::Var(Var(first_fresh + i as u32)))),
        );
        let clauses = self
            .clauses
            .iter()
            .map(|c| c.literals().map(|l| substitute_literal(l, &renaming)).collect::<Clause>());
        let params = self
            .params
            .iter()
            .map(|p| match renaming.get(p.var) {
                Some(Term::Var(fresh)) => Param::new(*fresh, p.tpe.clone()),
                _ => p.clone(),
            })
            .collect();
        Cnf::new(clauses).with_params(params)
    }

    /// Negation of a (parameter free) CNF.
    pub fn negate(&self) -> Cnf {
        debug_assert!(self.params.is_empty(), "Negating a quantified formula");
        self.clauses.iter().fold(Cnf::contradiction(), |acc, clause| {
            let negated_clause = Cnf::all(clause.literals().map(Literal::negation));
            acc.or(&negated_clause)
        })
    }
}

fn merge_params(a: &[Param], b: &[Param]) -> Vec<Param> {
    a.iter().chain(b.iter()).unique().cloned().collect()
}

impl FromIterator<Clause> for Cnf {
    fn from_iter<T: IntoIterator<Item = Clause>>(iter: T) -> Self {
        Cnf::new(iter)
    }
}

impl Display for Cnf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.params.is_empty() {
            write!(f, "∃ {}. ", self.params.iter().format(", "))?;
        }
        if self.clauses.is_empty() {
            write!(f, "⊤")
        } else {
            write!(f, "{}", self.clauses.iter().format(" ∧ "))
        }
    }
}

impl Debug for Cnf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Result of a regression: distinguishes the absence of constraint from the absence of solution.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Condition {
    /// Any state is a valid predecessor.
    Unconstrained,
    /// No state is a valid predecessor.
    Contradiction,
    /// Predecessor states are exactly the models of the formula.
    Cnf(Cnf),
}

impl Condition {
    pub fn is_contradiction(&self) -> bool {
        matches!(self, Condition::Contradiction)
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Condition::Unconstrained)
    }

    pub fn to_cnf(&self) -> Cnf {
        match self {
            Condition::Unconstrained => Cnf::tautology(),
            Condition::Contradiction => Cnf::contradiction(),
            Condition::Cnf(cnf) => cnf.clone(),
        }
    }

    pub fn as_cnf(&self) -> Option<&Cnf> {
        match self {
            Condition::Cnf(cnf) => Some(cnf),
            _ => None,
        }
    }
}

impl From<Cnf> for Condition {
    fn from(cnf: Cnf) -> Self {
        if cnf.is_contradiction() {
            Condition::Contradiction
        } else if cnf.is_tautology() {
            Condition::Unconstrained
        } else {
            Condition::Cnf(cnf)
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Unconstrained => write!(f, "⊤"),
            Condition::Contradiction => write!(f, "⊥"),
            Condition::Cnf(cnf) => write!(f, "{cnf}"),
        }
    }
}
