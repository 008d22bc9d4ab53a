use std::collections::BTreeSet;
use std::fmt::{Debug, Display};

use derive_more::derive::Display;
use smallvec::SmallVec;

use crate::{Sym, utils::disp_iter};

/// Identifier of a variable (an operator parameter or a quantified variable).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("?v{_0}")]
pub struct Var(pub u32);

impl Debug for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// A typed variable, as declared by an operator or a quantifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("{var}: {tpe}")]
pub struct Param {
    pub var: Var,
    pub tpe: Sym,
}

impl Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl Param {
    pub fn new(var: Var, tpe: impl Into<Sym>) -> Self {
        Param { var, tpe: tpe.into() }
    }
}

pub type SeqTerm = SmallVec<[Term; 3]>;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    /// A resolved object.
    Cst(Sym),
    /// An unbound parameter.
    Var(Var),
    /// Application of an object-valued function, whose value depends on the state.
    Fun(Box<Atom>),
}

impl Term {
    pub fn cst(name: impl Into<Sym>) -> Term {
        Term::Cst(name.into())
    }

    pub fn fun(atom: Atom) -> Term {
        Term::Fun(Box::new(atom))
    }

    pub fn as_cst(&self) -> Option<&Sym> {
        match self {
            Term::Cst(sym) => Some(sym),
            _ => None,
        }
    }

    /// True if the term contains no variable (it may still contain function applications).
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Cst(_) => true,
            Term::Var(_) => false,
            Term::Fun(atom) => atom.is_ground(),
        }
    }

    /// True if the term is a constant, i.e. its value does not depend on any state or binding.
    pub fn is_closed(&self) -> bool {
        matches!(self, Term::Cst(_))
    }

    pub fn collect_variables(&self, out: &mut BTreeSet<Var>) {
        match self {
            Term::Cst(_) => {}
            Term::Var(v) => {
                out.insert(*v);
            }
            Term::Fun(atom) => atom.collect_variables(out),
        }
    }
}

impl From<Var> for Term {
    fn from(v: Var) -> Self {
        Term::Var(v)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Cst(sym) => write!(f, "{sym}"),
            Term::Var(v) => write!(f, "{v}"),
            Term::Fun(atom) => write!(f, "{atom}"),
        }
    }
}

impl Debug for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// A predicate or function symbol applied to a sequence of terms, e.g. `at(bob, kitchen)`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Atom {
    pub symbol: Sym,
    pub args: SeqTerm,
}

impl Atom {
    pub fn new(symbol: impl Into<Sym>, args: impl IntoIterator<Item = Term>) -> Self {
        Atom {
            symbol: symbol.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Builds an atom whose arguments are all constants.
    pub fn ground(symbol: impl Into<Sym>, args: &[&str]) -> Self {
        Atom::new(symbol, args.iter().map(|&a| Term::cst(a)))
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_ground)
    }

    pub fn is_lifted(&self) -> bool {
        !self.is_ground()
    }

    /// True if one of the arguments (recursively) is an object-valued function application.
    pub fn has_function_terms(&self) -> bool {
        self.args.iter().any(|t| matches!(t, Term::Fun(_)))
    }

    pub fn collect_variables(&self, out: &mut BTreeSet<Var>) {
        for arg in &self.args {
            arg.collect_variables(out);
        }
    }

    /// Invokes `f` on every function application appearing in the arguments, innermost first.
    pub fn visit_function_terms(&self, f: &mut impl FnMut(&Atom)) {
        for arg in &self.args {
            if let Term::Fun(inner) = arg {
                inner.visit_function_terms(f);
                f(inner);
            }
        }
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.symbol)?;
        disp_iter(f, &self.args, ", ")?;
        write!(f, ")")
    }
}

impl Debug for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}
