use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};

use crate::{Atom, utils::disp_iter};

/// A numeric value, with a total order and a hash so that expressions can be stored in sets.
///
/// `-0.0` and `0.0` are considered equal, NaN values are all equal to each other.
#[derive(Copy, Clone)]
pub struct Num(pub f64);

impl Num {
    pub fn value(self) -> f64 {
        self.0
    }

    fn canonical_bits(self) -> u64 {
        if self.0 == 0.0 {
            0u64
        } else if self.0.is_nan() {
            f64::NAN.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for Num {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Num {}

impl PartialOrd for Num {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Num {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.is_nan(), other.0.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            // zeros are handled by the regular comparison
            (false, false) => self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal),
        }
    }
}

impl Hash for Num {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state)
    }
}

impl From<f64> for Num {
    fn from(value: f64) -> Self {
        Num(value)
    }
}

impl Display for Num {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for Num {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric expression, as appearing in numeric effects and comparisons.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumExpr {
    Number(Num),
    /// Value of a numeric function in the current state.
    Function(Atom),
    /// Duration of the enclosing action.
    Duration,
    Plus(Vec<NumExpr>),
    Minus(Box<NumExpr>, Box<NumExpr>),
    Neg(Box<NumExpr>),
    Multiply(Vec<NumExpr>),
    Divide(Box<NumExpr>, Box<NumExpr>),
}

impl NumExpr {
    pub fn number(value: f64) -> NumExpr {
        NumExpr::Number(Num(value))
    }

    pub fn function(atom: Atom) -> NumExpr {
        NumExpr::Function(atom)
    }

    /// Sum of the given expressions.
    ///
    /// # Panics
    /// Panics if `children` is empty.
    pub fn plus(children: Vec<NumExpr>) -> NumExpr {
        assert!(!children.is_empty(), "Empty sum");
        NumExpr::Plus(children)
    }

    /// Product of the given expressions.
    ///
    /// # Panics
    /// Panics if `children` is empty.
    pub fn multiply(children: Vec<NumExpr>) -> NumExpr {
        assert!(!children.is_empty(), "Empty product");
        NumExpr::Multiply(children)
    }

    pub fn minus(lhs: NumExpr, rhs: NumExpr) -> NumExpr {
        NumExpr::Minus(Box::new(lhs), Box::new(rhs))
    }

    pub fn neg(e: NumExpr) -> NumExpr {
        NumExpr::Neg(Box::new(e))
    }

    pub fn divide(lhs: NumExpr, rhs: NumExpr) -> NumExpr {
        NumExpr::Divide(Box::new(lhs), Box::new(rhs))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            NumExpr::Number(n) => Some(n.0),
            _ => None,
        }
    }

    /// Invokes `f` on every function atom appearing in the expression.
    pub fn visit_functions<'a>(&'a self, f: &mut impl FnMut(&'a Atom)) {
        match self {
            NumExpr::Number(_) | NumExpr::Duration => {}
            NumExpr::Function(atom) => f(atom),
            NumExpr::Plus(children) | NumExpr::Multiply(children) => {
                for c in children {
                    c.visit_functions(f);
                }
            }
            NumExpr::Minus(a, b) | NumExpr::Divide(a, b) => {
                a.visit_functions(f);
                b.visit_functions(f);
            }
            NumExpr::Neg(a) => a.visit_functions(f),
        }
    }

    /// Expression in which every function atom is replaced by the result of `f`.
    pub fn map_functions(&self, f: &mut impl FnMut(&Atom) -> Atom) -> NumExpr {
        match self {
            NumExpr::Number(_) | NumExpr::Duration => self.clone(),
            NumExpr::Function(atom) => NumExpr::Function(f(atom)),
            NumExpr::Plus(children) => NumExpr::Plus(children.iter().map(|c| c.map_functions(f)).collect()),
            NumExpr::Multiply(children) => NumExpr::Multiply(children.iter().map(|c| c.map_functions(f)).collect()),
            NumExpr::Minus(a, b) => NumExpr::minus(a.map_functions(f), b.map_functions(f)),
            NumExpr::Neg(a) => NumExpr::neg(a.map_functions(f)),
            NumExpr::Divide(a, b) => NumExpr::divide(a.map_functions(f), b.map_functions(f)),
        }
    }

    pub fn functions(&self) -> BTreeSet<&Atom> {
        let mut out = BTreeSet::new();
        self.visit_functions(&mut |a| {
            out.insert(a);
        });
        out
    }

    /// Evaluates the expression, using `value_of` to obtain the value of functions.
    ///
    /// Returns `None` if a function value (or the duration) is undefined.
    pub fn eval(&self, value_of: &impl Fn(&Atom) -> Option<f64>) -> Option<f64> {
        match self {
            NumExpr::Number(n) => Some(n.0),
            NumExpr::Function(atom) => value_of(atom),
            NumExpr::Duration => None,
            NumExpr::Plus(children) => children.iter().map(|c| c.eval(value_of)).sum(),
            NumExpr::Multiply(children) => children.iter().map(|c| c.eval(value_of)).product(),
            NumExpr::Minus(a, b) => Some(a.eval(value_of)? - b.eval(value_of)?),
            NumExpr::Neg(a) => Some(-a.eval(value_of)?),
            NumExpr::Divide(a, b) => {
                let divisor = b.eval(value_of)?;
                if divisor == 0.0 {
                    None
                } else {
                    Some(a.eval(value_of)? / divisor)
                }
            }
        }
    }
}

impl Display for NumExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumExpr::Number(n) => write!(f, "{n}"),
            NumExpr::Function(atom) => write!(f, "{atom}"),
            NumExpr::Duration => write!(f, "?duration"),
            NumExpr::Plus(children) => {
                write!(f, "(+ ")?;
                disp_iter(f, children, " ")?;
                write!(f, ")")
            }
            NumExpr::Multiply(children) => {
                write!(f, "(* ")?;
                disp_iter(f, children, " ")?;
                write!(f, ")")
            }
            NumExpr::Minus(a, b) => write!(f, "(- {a} {b})"),
            NumExpr::Neg(a) => write!(f, "(- {a})"),
            NumExpr::Divide(a, b) => write!(f, "(/ {a} {b})"),
        }
    }
}

impl Debug for NumExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}
