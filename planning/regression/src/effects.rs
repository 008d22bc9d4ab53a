use std::collections::BTreeSet;
use std::fmt::Display;

use itertools::Itertools;

use crate::*;

/// Operation of a numeric effect.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AssignOp {
    Assign,
    Increase,
    Decrease,
    ScaleUp,
    ScaleDown,
}

impl AssignOp {
    /// Expression of the function value after the effect, given its value before and the operand.
    pub fn value_after(self, before: NumExpr, operand: NumExpr) -> NumExpr {
        match self {
            AssignOp::Assign => operand,
            AssignOp::Increase => NumExpr::plus(vec![before, operand]),
            AssignOp::Decrease => NumExpr::minus(before, operand),
            AssignOp::ScaleUp => NumExpr::multiply(vec![before, operand]),
            AssignOp::ScaleDown => NumExpr::divide(before, operand),
        }
    }
}

impl Display for AssignOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            AssignOp::Assign => ":=",
            AssignOp::Increase => "+=",
            AssignOp::Decrease => "-=",
            AssignOp::ScaleUp => "*=",
            AssignOp::ScaleDown => "/=",
        };
        write!(f, "{op}")
    }
}

/// Effect of an operator, possibly quantified or conditional.
#[derive(Clone, PartialEq, Debug)]
pub enum Effect {
    /// Makes the atom true.
    Add(Atom),
    /// Makes the atom false.
    Delete(Atom),
    /// Updates the value of a numeric function.
    Numeric {
        op: AssignOp,
        function: Atom,
        value: NumExpr,
    },
    /// Sets the value of an object-valued function.
    Object { function: Atom, value: Term },
    /// Applies the sub-effects for every instantiation of the parameters.
    Forall { params: Vec<Param>, effects: Vec<Effect> },
    /// Applies the sub-effects if the guard holds in the state where the operator is applied.
    When { guard: Cnf, effects: Vec<Effect> },
    /// Equality effect: accepted by some grammars but without any semantics.
    Equals(Term, Term),
}

impl Effect {
    pub fn numeric(op: AssignOp, function: Atom, value: NumExpr) -> Effect {
        Effect::Numeric { op, function, value }
    }

    pub fn increase(function: Atom, value: NumExpr) -> Effect {
        Effect::numeric(AssignOp::Increase, function, value)
    }

    pub fn assign(function: Atom, value: NumExpr) -> Effect {
        Effect::numeric(AssignOp::Assign, function, value)
    }

    pub fn object(function: Atom, value: Term) -> Effect {
        Effect::Object { function, value }
    }

    pub fn forall(params: Vec<Param>, effects: Vec<Effect>) -> Effect {
        Effect::Forall { params, effects }
    }

    pub fn when(guard: Cnf, effects: Vec<Effect>) -> Effect {
        Effect::When { guard, effects }
    }

    /// Adds all variables of the effect to `out`, including quantified ones.
    pub fn collect_variables(&self, out: &mut BTreeSet<Var>) {
        match self {
            Effect::Add(atom) | Effect::Delete(atom) => atom.collect_variables(out),
            Effect::Numeric { function, value, .. } => {
                function.collect_variables(out);
                value.visit_functions(&mut |a| a.collect_variables(out));
            }
            Effect::Object { function, value } => {
                function.collect_variables(out);
                value.collect_variables(out);
            }
            Effect::Forall { params, effects } => {
                out.extend(params.iter().map(|p| p.var));
                for e in effects {
                    e.collect_variables(out);
                }
            }
            Effect::When { guard, effects } => {
                out.extend(guard.variables());
                for e in effects {
                    e.collect_variables(out);
                }
            }
            Effect::Equals(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
        }
    }
}

impl Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Add(atom) => write!(f, "+{atom}"),
            Effect::Delete(atom) => write!(f, "-{atom}"),
            Effect::Numeric { op, function, value } => write!(f, "{function} {op} {value}"),
            Effect::Object { function, value } => write!(f, "{function} := {value}"),
            Effect::Forall { params, effects } => write!(
                f,
                "forall ({}) [{}]",
                params.iter().format(", "),
                effects.iter().format(", ")
            ),
            Effect::When { guard, effects } => write!(f, "when {guard} [{}]", effects.iter().format(", ")),
            Effect::Equals(a, b) => write!(f, "{a} == {b}"),
        }
    }
}

/// A (possibly lifted) planning operator.
#[derive(Clone, Debug)]
pub struct Operator {
    pub name: Sym,
    pub parameters: Vec<Param>,
    pub preconditions: Cnf,
    pub effects: Vec<Effect>,
}

impl Operator {
    pub fn new(name: impl Into<Sym>, parameters: Vec<Param>) -> Self {
        Operator {
            name: name.into(),
            parameters,
            preconditions: Cnf::tautology(),
            effects: Vec::new(),
        }
    }

    pub fn with_preconditions(mut self, preconditions: Cnf) -> Self {
        self.preconditions = preconditions;
        self
    }

    pub fn with_effects(mut self, effects: Vec<Effect>) -> Self {
        self.effects = effects;
        self
    }

    pub fn is_parameter(&self, var: Var) -> bool {
        self.parameters.iter().any(|p| p.var == var)
    }

    /// Parameters of the operator and all variables of its preconditions and effects.
    pub fn variables(&self) -> BTreeSet<Var> {
        let mut vars: BTreeSet<Var> = self.parameters.iter().map(|p| p.var).collect();
        vars.extend(self.preconditions.variables());
        for eff in &self.effects {
            eff.collect_variables(&mut vars);
        }
        vars
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.parameters.iter().format(", "))?;
        write!(f, "\n    preconditions: {}", self.preconditions)?;
        write!(f, "\n    effects:")?;
        for eff in &self.effects {
            write!(f, "\n      {eff}")?;
        }
        Ok(())
    }
}
