//! Backward replacement of numeric functions by the value they are assigned, and partial evaluation.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::*;

/// Rewrites numeric expressions over the state after an operator into expressions over the state before it.
pub struct NumericReplacer<'a, G: Grounder> {
    grounder: &'a G,
    assignments: &'a HashMap<Atom, NumExpr>,
    sub: &'a Substitution,
    /// Functions whose assigned value is being expanded.
    /// Function references met while non-empty denote values before the operator and are never replaced.
    expanding: Vec<Atom>,
    replaced: BTreeSet<Atom>,
}

impl<'a, G: Grounder> NumericReplacer<'a, G> {
    pub fn new(grounder: &'a G, assignments: &'a HashMap<Atom, NumExpr>, sub: &'a Substitution) -> Self {
        NumericReplacer {
            grounder,
            assignments,
            sub,
            expanding: Vec::new(),
            replaced: BTreeSet::new(),
        }
    }

    /// Grounded functions that were replaced by their assigned value so far.
    pub fn replaced(&self) -> &BTreeSet<Atom> {
        &self.replaced
    }

    pub fn replace(&mut self, expr: &NumExpr) -> NumExpr {
        match expr {
            NumExpr::Number(_) | NumExpr::Duration => expr.clone(),
            NumExpr::Function(f) => {
                let f = self.grounder.ground_atom(f, self.sub);
                if !self.expanding.is_empty() {
                    return NumExpr::Function(f);
                }
                match self.assignments.get(&f) {
                    Some(value) => {
                        let value = self.grounder.ground_numeric(value, self.sub);
                        self.expanding.push(f.clone());
                        let res = self.replace(&value);
                        self.expanding.pop();
                        self.replaced.insert(f);
                        res
                    }
                    None => NumExpr::Function(f),
                }
            }
            NumExpr::Plus(children) => {
                let children = children.iter().map(|c| self.replace(c)).collect();
                fold_associative(children, true)
            }
            NumExpr::Multiply(children) => {
                let children = children.iter().map(|c| self.replace(c)).collect();
                fold_associative(children, false)
            }
            NumExpr::Minus(a, b) => match (self.replace(a), self.replace(b)) {
                (NumExpr::Number(a), NumExpr::Number(b)) => NumExpr::number(a.0 - b.0),
                (a, b) => NumExpr::minus(a, b),
            },
            NumExpr::Neg(a) => match self.replace(a) {
                NumExpr::Number(a) => NumExpr::number(-a.0),
                a => NumExpr::neg(a),
            },
            NumExpr::Divide(a, b) => match (self.replace(a), self.replace(b)) {
                (NumExpr::Number(a), NumExpr::Number(b)) if b.0 != 0.0 => NumExpr::number(a.0 / b.0),
                (a, b) => NumExpr::divide(a, b),
            },
        }
    }
}

/// Partial evaluation of a sum (`sum = true`) or product of already reduced children.
/// Constants are folded into a single trailing number, omitted if neutral.
fn fold_associative(children: Vec<NumExpr>, sum: bool) -> NumExpr {
    let neutral = if sum { 0.0 } else { 1.0 };
    let mut acc = neutral;
    let mut others = Vec::with_capacity(children.len());
    for c in children {
        match c {
            NumExpr::Number(n) if sum => acc += n.0,
            NumExpr::Number(n) => acc *= n.0,
            NumExpr::Plus(nested) if sum => others.extend(nested),
            NumExpr::Multiply(nested) if !sum => others.extend(nested),
            c => others.push(c),
        }
    }
    // flattened children may carry their own constant
    let mut rest = Vec::with_capacity(others.len());
    for c in others {
        match c {
            NumExpr::Number(n) if sum => acc += n.0,
            NumExpr::Number(n) => acc *= n.0,
            c => rest.push(c),
        }
    }
    if rest.is_empty() {
        return NumExpr::number(acc);
    }
    if acc != neutral {
        rest.push(NumExpr::number(acc));
    }
    match rest.len() {
        1 => rest.pop().unwrap_or(NumExpr::number(neutral)),
        _ if sum => NumExpr::Plus(rest),
        _ => NumExpr::Multiply(rest),
    }
}

/// Moves constants from the left-hand side to the right-hand side of a comparison, so that
/// `f + 5 = 12` becomes `f = 7`. Sides are swapped first if only the left one is a constant.
pub fn solve_comparison(op: CmpOp, lhs: NumExpr, rhs: NumExpr) -> (CmpOp, NumExpr, NumExpr) {
    let (mut op, mut lhs, mut rhs) = match (&lhs, &rhs) {
        (NumExpr::Number(_), r) if r.as_number().is_none() => (op.mirrored(), rhs, lhs),
        _ => (op, lhs, rhs),
    };
    while let Some(n) = rhs.as_number() {
        let step = match &lhs {
            NumExpr::Plus(children) => match children.iter().position(|c| c.as_number().is_some()) {
                Some(i) => {
                    let mut children = children.clone();
                    let c = children.remove(i).as_number().unwrap_or(0.0);
                    Some((op, rebuild(children, true), n - c))
                }
                None => None,
            },
            NumExpr::Multiply(children) => match children.iter().position(|c| c.as_number().is_some_and(|c| c != 0.0)) {
                Some(i) => {
                    let mut children = children.clone();
                    let c = children.remove(i).as_number().unwrap_or(1.0);
                    let op = if c < 0.0 { op.mirrored() } else { op };
                    Some((op, rebuild(children, false), n / c))
                }
                None => None,
            },
            NumExpr::Minus(a, b) => match (a.as_number(), b.as_number()) {
                (_, Some(c)) => Some((op, (**a).clone(), n + c)),
                // c - b op n  <=>  b op' c - n
                (Some(c), None) => Some((op.mirrored(), (**b).clone(), c - n)),
                (None, None) => None,
            },
            NumExpr::Divide(a, b) => match b.as_number() {
                Some(c) if c != 0.0 => {
                    let op = if c < 0.0 { op.mirrored() } else { op };
                    Some((op, (**a).clone(), n * c))
                }
                _ => None,
            },
            NumExpr::Neg(a) => Some((op.mirrored(), (**a).clone(), -n)),
            _ => None,
        };
        match step {
            Some((new_op, new_lhs, value)) => {
                op = new_op;
                lhs = new_lhs;
                rhs = NumExpr::number(value);
            }
            None => break,
        }
    }
    (op, lhs, rhs)
}

fn rebuild(mut children: Vec<NumExpr>, sum: bool) -> NumExpr {
    match children.len() {
        0 => NumExpr::number(if sum { 0.0 } else { 1.0 }),
        1 => children.pop().unwrap_or(NumExpr::number(0.0)),
        _ if sum => NumExpr::Plus(children),
        _ => NumExpr::Multiply(children),
    }
}
