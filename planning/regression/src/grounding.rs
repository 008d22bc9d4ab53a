//! Grounding service: replacement of variables by the terms they are bound to, and enumeration
//! of the instantiations of typed parameters.

use itertools::Itertools;

use crate::*;

/// Provides the objects of the problem and, based on them, all grounding operations.
///
/// Only [`Grounder::objects_of`] is required, all other operations have a structural default implementation.
pub trait Grounder {
    /// All objects of the given type.
    fn objects_of(&self, tpe: &Sym) -> &[Sym];

    fn ground_term(&self, term: &Term, sub: &Substitution) -> Term {
        substitute_term(term, sub)
    }

    fn ground_atom(&self, atom: &Atom, sub: &Substitution) -> Atom {
        substitute_atom(atom, sub)
    }

    fn ground_numeric(&self, expr: &NumExpr, sub: &Substitution) -> NumExpr {
        substitute_numeric(expr, sub)
    }

    fn ground_literal(&self, literal: &Literal, sub: &Substitution) -> Literal {
        substitute_literal(literal, sub)
    }

    /// Grounds all literals of the formula. Parameters of the formula that are bound by `sub` are removed.
    fn ground_conditions(&self, cnf: &Cnf, sub: &Substitution) -> Cnf {
        substitute_cnf(cnf, sub)
    }

    /// Most general substitution that makes the `lifted` atom equal to the `ground` one, if any.
    fn unify(&self, lifted: &Atom, ground: &Atom) -> Option<Substitution> {
        let mut sub = Substitution::new();
        if unify_atoms(lifted, ground, &mut sub) {
            Some(sub)
        } else {
            None
        }
    }

    /// All instantiations of the parameters with objects of their types.
    fn groundings<'a>(&'a self, params: &'a [Param]) -> Box<dyn Iterator<Item = Substitution> + 'a> {
        if params.is_empty() {
            return Box::new(std::iter::once(Substitution::new()));
        }
        if params.iter().any(|p| self.objects_of(&p.tpe).is_empty()) {
            return Box::new(std::iter::empty());
        }
        let domains = params.iter().map(|p| self.objects_of(&p.tpe).iter()).collect_vec();
        Box::new(domains.into_iter().multi_cartesian_product().map(move |values| {
            Substitution::from_bindings(
                params
                    .iter()
                    .zip(values)
                    .map(|(p, value)| (p.var, Term::Cst(value.clone()))),
            )
        }))
    }
}

pub fn substitute_term(term: &Term, sub: &Substitution) -> Term {
    match term {
        Term::Cst(_) => term.clone(),
        Term::Var(v) => sub.get(*v).cloned().unwrap_or_else(|| term.clone()),
        Term::Fun(atom) => Term::fun(substitute_atom(atom, sub)),
    }
}

pub fn substitute_atom(atom: &Atom, sub: &Substitution) -> Atom {
    if sub.is_empty() || atom.is_ground() {
        return atom.clone();
    }
    Atom {
        symbol: atom.symbol.clone(),
        args: atom.args.iter().map(|t| substitute_term(t, sub)).collect(),
    }
}

pub fn substitute_numeric(expr: &NumExpr, sub: &Substitution) -> NumExpr {
    if sub.is_empty() {
        return expr.clone();
    }
    let rec = |e: &NumExpr| substitute_numeric(e, sub);
    match expr {
        NumExpr::Number(_) | NumExpr::Duration => expr.clone(),
        NumExpr::Function(atom) => NumExpr::Function(substitute_atom(atom, sub)),
        NumExpr::Plus(children) => NumExpr::Plus(children.iter().map(rec).collect()),
        NumExpr::Multiply(children) => NumExpr::Multiply(children.iter().map(rec).collect()),
        NumExpr::Minus(a, b) => NumExpr::minus(rec(a), rec(b)),
        NumExpr::Neg(a) => NumExpr::neg(rec(a)),
        NumExpr::Divide(a, b) => NumExpr::divide(rec(a), rec(b)),
    }
}

pub fn substitute_literal(literal: &Literal, sub: &Substitution) -> Literal {
    match literal {
        Literal::Pred { atom, negated } => Literal::Pred {
            atom: substitute_atom(atom, sub),
            negated: *negated,
        },
        Literal::Equals { lhs, rhs, negated } => Literal::Equals {
            lhs: substitute_term(lhs, sub),
            rhs: substitute_term(rhs, sub),
            negated: *negated,
        },
        Literal::Compare { op, lhs, rhs, negated } => Literal::Compare {
            op: *op,
            lhs: substitute_numeric(lhs, sub),
            rhs: substitute_numeric(rhs, sub),
            negated: *negated,
        },
    }
}

pub fn substitute_cnf(cnf: &Cnf, sub: &Substitution) -> Cnf {
    if sub.is_empty() {
        return cnf.clone();
    }
    let grounded: Cnf = cnf
        .clauses()
        .map(|c| c.literals().map(|l| substitute_literal(l, sub)).collect::<Clause>())
        .collect();
    let remaining = cnf.params().iter().filter(|p| !sub.contains(p.var)).cloned().collect();
    grounded.with_params(remaining)
}

fn unify_terms(lifted: &Term, ground: &Term, sub: &mut Substitution) -> bool {
    match (lifted, ground) {
        (Term::Var(v), _) => match sub.get(*v) {
            Some(bound) => bound == ground,
            None => {
                sub.bind(*v, ground.clone());
                true
            }
        },
        (Term::Cst(a), Term::Cst(b)) => a == b,
        (Term::Fun(a), Term::Fun(b)) => unify_atoms(a, b, sub),
        _ => false,
    }
}

fn unify_atoms(lifted: &Atom, ground: &Atom, sub: &mut Substitution) -> bool {
    lifted.symbol == ground.symbol
        && lifted.args.len() == ground.args.len()
        && lifted
            .args
            .iter()
            .zip(ground.args.iter())
            .all(|(l, g)| unify_terms(l, g, sub))
}
