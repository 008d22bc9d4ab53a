//! Sorting of the effects of an operator by kind, and their grounding.

use hashbrown::{HashMap, HashSet};

use crate::errors::EffectError;
use crate::*;

/// Effects of a single nesting level, sorted by kind.
///
/// Nested quantified and conditional effects are kept as raw lists, to be processed by the consumer.
#[derive(Clone, Debug, Default)]
pub struct PreprocessedEffects<'a> {
    pub pos_predicates: Vec<&'a Atom>,
    pub neg_predicates: Vec<&'a Atom>,
    /// Numeric functions with the expression of their value after the effect.
    pub numeric_assignments: Vec<(&'a Atom, NumExpr)>,
    pub object_assignments: Vec<(&'a Atom, &'a Term)>,
    pub forall_effects: Vec<(&'a [Param], &'a [Effect])>,
    pub when_effects: Vec<(&'a Cnf, &'a [Effect])>,
    /// Grounded view of the primitive effects, filled by [`PreprocessedEffects::ground`].
    pub grounded: GroundEffects,
}

pub struct EffectCollector;

impl EffectCollector {
    /// Sorts the effects, panicking on constructs that have no semantics.
    pub fn collect(effects: &[Effect]) -> PreprocessedEffects<'_> {
        Self::try_collect(effects).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_collect(effects: &[Effect]) -> Result<PreprocessedEffects<'_>, EffectError> {
        let mut res = PreprocessedEffects::default();
        for eff in effects {
            match eff {
                Effect::Add(atom) => res.pos_predicates.push(atom),
                Effect::Delete(atom) => res.neg_predicates.push(atom),
                Effect::Numeric { op, function, value } => {
                    let after = op.value_after(NumExpr::Function(function.clone()), value.clone());
                    res.numeric_assignments.push((function, after))
                }
                Effect::Object { function, value } => res.object_assignments.push((function, value)),
                Effect::Forall { params, effects } => res.forall_effects.push((params, effects)),
                Effect::When { guard, effects } => res.when_effects.push((guard, effects)),
                Effect::Equals(a, b) => return Err(EffectError::UnsupportedEquals(a.clone(), b.clone())),
            }
        }
        Ok(res)
    }
}

impl PreprocessedEffects<'_> {
    /// Grounds all primitive effects of this level with the substitution.
    /// An empty substitution leaves the atoms untouched.
    pub fn ground(&mut self, grounder: &impl Grounder, sub: &Substitution) {
        let ground_atom = |atom: &Atom| {
            if sub.is_empty() {
                atom.clone()
            } else {
                grounder.ground_atom(atom, sub)
            }
        };
        let out = &mut self.grounded;
        for &atom in &self.pos_predicates {
            let g = ground_atom(atom);
            out.record_origin(&g, atom);
            out.add.insert(g);
        }
        for &atom in &self.neg_predicates {
            let g = ground_atom(atom);
            out.record_origin(&g, atom);
            out.del.insert(g);
        }
        for (function, value) in &self.numeric_assignments {
            let g = ground_atom(function);
            out.record_origin(&g, function);
            let value = if sub.is_empty() {
                value.clone()
            } else {
                grounder.ground_numeric(value, sub)
            };
            out.numeric.entry(g).or_insert(value);
        }
        for &(function, value) in &self.object_assignments {
            let g = ground_atom(function);
            out.record_origin(&g, function);
            let value = if sub.is_empty() {
                value.clone()
            } else {
                grounder.ground_term(value, sub)
            };
            out.objects.entry(g).or_insert(value);
        }
    }
}

/// Effects whose application depends on a guard evaluated in the state before the operator.
#[derive(Clone, Debug)]
pub struct ConditionalEffects {
    pub guard: Cnf,
    pub effects: GroundEffects,
}

/// Fully grounded and flattened effects of an operator.
///
/// Quantified effects are expanded into their instances and nested conditional effects are
/// flattened into a list of guarded effect sets.
#[derive(Clone, Debug, Default)]
pub struct GroundEffects {
    pub add: HashSet<Atom>,
    pub del: HashSet<Atom>,
    /// Value of each assigned numeric function after the effects, in terms of the values before.
    pub numeric: HashMap<Atom, NumExpr>,
    pub objects: HashMap<Atom, Term>,
    pub conditional: Vec<ConditionalEffects>,
    /// Lifted atom from which each grounded atom was obtained.
    pub origins: HashMap<Atom, Atom>,
}

impl GroundEffects {
    /// Collects and grounds the effects with `sub`, expanding foralls for every instance of their parameters.
    pub fn build(grounder: &impl Grounder, effects: &[Effect], sub: &mut Substitution) -> Result<Self, EffectError> {
        let mut base = GroundEffects::default();
        let mut conditional = Vec::new();
        expand(grounder, effects, sub, &Cnf::tautology(), &mut base, &mut conditional)?;
        base.conditional = conditional;
        Ok(base)
    }

    fn record_origin(&mut self, grounded: &Atom, lifted: &Atom) {
        if !self.origins.contains_key(grounded) {
            self.origins.insert(grounded.clone(), lifted.clone());
        }
    }

    /// Lifted origin of a grounded atom, looking into conditional effects as well.
    pub fn origin(&self, grounded: &Atom) -> Option<&Atom> {
        self.origins
            .get(grounded)
            .or_else(|| self.conditional.iter().find_map(|c| c.effects.origin(grounded)))
    }

    pub fn adds(&self, atom: &Atom) -> bool {
        self.add.contains(atom)
    }

    /// True if the atom is deleted and not added back.
    pub fn deletes(&self, atom: &Atom) -> bool {
        self.del.contains(atom) && !self.add.contains(atom)
    }

    /// True if the effects modify the truth value of the atom.
    pub fn touches(&self, atom: &Atom) -> bool {
        self.add.contains(atom) || self.del.contains(atom)
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty()
            && self.del.is_empty()
            && self.numeric.is_empty()
            && self.objects.is_empty()
            && self.conditional.is_empty()
    }

    /// Primitive effects of `self` together with those of the selected conditional effects.
    /// In case of conflicting assignments, the first one wins.
    pub fn with_firing(&self, firing: &[usize]) -> GroundEffects {
        let mut res = GroundEffects {
            add: self.add.clone(),
            del: self.del.clone(),
            numeric: self.numeric.clone(),
            objects: self.objects.clone(),
            conditional: Vec::new(),
            origins: self.origins.clone(),
        };
        for &i in firing {
            res.merge(&self.conditional[i].effects);
        }
        res
    }

    fn merge(&mut self, other: &GroundEffects) {
        self.add.extend(other.add.iter().cloned());
        self.del.extend(other.del.iter().cloned());
        for (f, v) in &other.numeric {
            self.numeric.entry(f.clone()).or_insert_with(|| v.clone());
        }
        for (f, v) in &other.objects {
            self.objects.entry(f.clone()).or_insert_with(|| v.clone());
        }
        for (g, l) in &other.origins {
            self.record_origin(g, l);
        }
    }
}

fn expand(
    grounder: &impl Grounder,
    effects: &[Effect],
    sub: &mut Substitution,
    guard: &Cnf,
    out: &mut GroundEffects,
    conditional: &mut Vec<ConditionalEffects>,
) -> Result<(), EffectError> {
    let mut level = EffectCollector::try_collect(effects)?;
    level.ground(grounder, sub);
    out.merge(&level.grounded);

    for &(params, nested) in &level.forall_effects {
        for instance in grounder.groundings(params) {
            let mut scope = sub.scope(instance.to_bindings());
            expand(grounder, nested, &mut scope, guard, out, conditional)?;
        }
    }
    for &(inner, nested) in &level.when_effects {
        let inner = grounder.ground_conditions(inner, sub);
        let guard = super::conjoin(guard, &inner);
        let mut effects = GroundEffects::default();
        expand(grounder, nested, sub, &guard, &mut effects, conditional)?;
        if !effects.is_empty() && !guard.is_contradiction() {
            conditional.push(ConditionalEffects { guard, effects });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Universe {
        Universe::new()
            .with_objects("block", &["a", "b"])
            .expect("distinct objects")
    }

    #[test]
    fn sort_effects() {
        let x = Term::Var(Var(0));
        let effects = vec![
            Effect::Add(Atom::new("clear", [x.clone()])),
            Effect::Delete(Atom::ground("handempty", &[])),
            Effect::increase(Atom::ground("cost", &[]), NumExpr::number(1.0)),
            Effect::object(Atom::ground("holding", &[]), x.clone()),
        ];
        let level = EffectCollector::collect(&effects);
        assert_eq!(level.pos_predicates.len(), 1);
        assert_eq!(level.neg_predicates.len(), 1);
        assert_eq!(
            level.numeric_assignments[0].1,
            NumExpr::plus(vec![NumExpr::function(Atom::ground("cost", &[])), NumExpr::number(1.0)])
        );
        assert_eq!(level.object_assignments.len(), 1);
    }

    #[test]
    fn equality_effects_are_rejected() {
        let effects = vec![Effect::Equals(Term::cst("a"), Term::cst("b"))];
        assert!(matches!(
            EffectCollector::try_collect(&effects),
            Err(EffectError::UnsupportedEquals(_, _))
        ));
    }

    #[test]
    #[should_panic]
    fn equality_effects_panic() {
        EffectCollector::collect(&[Effect::Equals(Term::cst("a"), Term::cst("b"))]);
    }

    #[test]
    fn origins_of_grounded_atoms() {
        let universe = universe();
        let lifted = Atom::new("clear", [Term::Var(Var(0))]);
        let effects = vec![Effect::Add(lifted.clone())];
        let mut level = EffectCollector::collect(&effects);
        let sub = Substitution::from_bindings([(Var(0), Term::cst("a"))]);
        level.ground(&universe, &sub);
        let g = Atom::ground("clear", &["a"]);
        assert!(level.grounded.adds(&g));
        assert_eq!(level.grounded.origins.get(&g), Some(&lifted));

        // empty substitution: lifted atoms are kept as is
        let mut level = EffectCollector::collect(&effects);
        level.ground(&universe, &Substitution::new());
        assert!(level.grounded.adds(&lifted));
    }

    #[test]
    fn flatten_quantified_and_conditional() -> anyhow::Result<()> {
        let universe = universe();
        let (x, y) = (Var(0), Var(1));
        let g = Atom::ground("g", &[]);
        let effects = vec![
            Effect::forall(
                vec![Param::new(y, "block")],
                vec![Effect::Delete(Atom::new("on", [Term::Var(x), Term::Var(y)]))],
            ),
            Effect::when(
                Cnf::all([Literal::pos(g.clone())]),
                vec![
                    Effect::Add(Atom::new("clear", [Term::Var(x)])),
                    Effect::when(
                        Cnf::all([Literal::pos(Atom::ground("h", &[]))]),
                        vec![Effect::Add(Atom::ground("done", &[]))],
                    ),
                ],
            ),
        ];
        let mut sub = Substitution::from_bindings([(x, Term::cst("a"))]);
        let ground = GroundEffects::build(&universe, &effects, &mut sub)?;
        assert_eq!(sub.depth(), 0);
        assert!(ground.deletes(&Atom::ground("on", &["a", "a"])));
        assert!(ground.deletes(&Atom::ground("on", &["a", "b"])));
        assert_eq!(ground.conditional.len(), 2);
        let nested = ground
            .conditional
            .iter()
            .find(|c| c.effects.adds(&Atom::ground("done", &[])))
            .expect("nested conditional effect");
        assert_eq!(nested.guard.num_clauses(), 2);
        Ok(())
    }

    #[test]
    fn add_wins_over_delete() -> anyhow::Result<()> {
        let p = Atom::ground("p", &[]);
        let effects = vec![Effect::Delete(p.clone()), Effect::Add(p.clone())];
        let ground = GroundEffects::build(&universe(), &effects, &mut Substitution::new())?;
        assert!(ground.adds(&p));
        assert!(!ground.deletes(&p));
        Ok(())
    }
}
