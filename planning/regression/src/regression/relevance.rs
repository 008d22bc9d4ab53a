//! Relevance of the effects of an operator for a target, used to prune operators before regressing through them.

use std::collections::BTreeSet;

use crate::regression::{GroundEffects, LiteralRegression, NumericReplacer, Regressed, Regressor};
use crate::*;

/// Relevance of effects for a CNF target.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CnfRelevance {
    /// Some literal of the target is made true (or rewritten) by the effects.
    pub contributes: bool,
    /// No clause of the target is made false by the effects.
    pub not_forbidden: bool,
    /// Indices of the conditional effects that have an influence on some literal of the target.
    pub conditional: Vec<usize>,
}

impl CnfRelevance {
    pub fn is_relevant(&self) -> bool {
        self.contributes && self.not_forbidden
    }
}

/// Evaluates the relevance of ground effects for ground CNF targets.
pub struct ConditionRelevance<'a, G: Grounder> {
    grounder: &'a G,
    effects: &'a GroundEffects,
    sub: &'a Substitution,
}

impl<'a, G: Grounder> ConditionRelevance<'a, G> {
    pub fn new(grounder: &'a G, effects: &'a GroundEffects, sub: &'a Substitution) -> Self {
        ConditionRelevance { grounder, effects, sub }
    }

    pub fn evaluate(&self, target: &Cnf) -> CnfRelevance {
        let mut regressor = Regressor::new(self.grounder, self.sub);
        let mut contributes = false;
        let mut not_forbidden = true;
        let mut conditional = BTreeSet::new();
        for clause in target.clauses() {
            let mut all_forbidden = !clause.is_empty();
            for lit in clause.literals() {
                let (contrib, forbidden) = influence(lit, &regressor.literal(lit, self.effects));
                contributes |= contrib;
                // a literal falsified by the unconditional effects may be restored by a conditional one
                let mut overridden = false;
                for (i, cond) in self.effects.conditional.iter().enumerate() {
                    let regressed = regressor.literal(lit, &cond.effects);
                    if regressed.touched {
                        conditional.insert(i);
                        overridden = true;
                        contributes |= influence(lit, &regressed).0;
                    }
                }
                all_forbidden &= forbidden && !overridden;
            }
            not_forbidden &= !all_forbidden;
        }
        CnfRelevance {
            contributes,
            not_forbidden,
            conditional: conditional.into_iter().collect(),
        }
    }
}

/// Whether a regressed literal is achieved by the effects, and whether it is falsified by them.
fn influence(literal: &Literal, regressed: &LiteralRegression) -> (bool, bool) {
    match literal {
        Literal::Pred { .. } => (
            regressed.result == Regressed::True || (regressed.touched && regressed.result != Regressed::False),
            regressed.result == Regressed::False,
        ),
        Literal::Equals { .. } => (regressed.touched, regressed.touched && regressed.result == Regressed::False),
        Literal::Compare { .. } => (regressed.touched, false),
    }
}

/// Relevance of effects for a relative state.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Relevance {
    /// Some known fact is achieved by the effects, none is contradicted.
    Relevant,
    /// No known fact is affected by the effects.
    Irrelevant,
    /// Some known fact is contradicted by the effects.
    AntiRelevant,
}

pub struct StateRelevance<'a, G: Grounder> {
    grounder: &'a G,
    effects: &'a GroundEffects,
    sub: &'a Substitution,
}

impl<'a, G: Grounder> StateRelevance<'a, G> {
    pub fn new(grounder: &'a G, effects: &'a GroundEffects, sub: &'a Substitution) -> Self {
        StateRelevance { grounder, effects, sub }
    }

    /// Relevance of the effects, with the indices of the conditional effects that affect the target.
    /// Anti-relevant conditional effects are reported but do not make the whole evaluation anti-relevant.
    /// A fact deleted by the unconditional effects is not anti-relevant when a conditional effect adds it back.
    pub fn evaluate(&self, target: &RelativeState) -> (Relevance, Vec<usize>) {
        let restored = |atom: &Atom| self.effects.conditional.iter().any(|c| c.effects.adds(atom));
        let base = self.primitive(target, self.effects, &restored);
        if base == Relevance::AntiRelevant {
            return (base, Vec::new());
        }
        let mut relevant = base == Relevance::Relevant;
        let mut touching = Vec::new();
        for (i, cond) in self.effects.conditional.iter().enumerate() {
            match self.primitive(target, &cond.effects, &|_: &Atom| false) {
                Relevance::Irrelevant => {}
                Relevance::Relevant => {
                    relevant = true;
                    touching.push(i);
                }
                Relevance::AntiRelevant => touching.push(i),
            }
        }
        let relevance = if relevant {
            Relevance::Relevant
        } else {
            Relevance::Irrelevant
        };
        (relevance, touching)
    }

    fn primitive(&self, target: &RelativeState, effects: &GroundEffects, restored: &impl Fn(&Atom) -> bool) -> Relevance {
        let mut relevant = false;
        for atom in target.positive() {
            if effects.deletes(atom) {
                if restored(atom) {
                    continue;
                }
                return Relevance::AntiRelevant;
            }
            relevant |= effects.adds(atom);
        }
        for atom in target.negative() {
            if effects.adds(atom) {
                return Relevance::AntiRelevant;
            }
            relevant |= effects.deletes(atom);
        }
        for (function, value) in target.numeric_values() {
            if effects.numeric.contains_key(function) {
                relevant = true;
                let mut replacer = NumericReplacer::new(self.grounder, &effects.numeric, self.sub);
                let after = replacer.replace(&NumExpr::Function(function.clone()));
                if after.as_number().is_some_and(|n| n != value) {
                    return Relevance::AntiRelevant;
                }
            }
        }
        for (function, value) in target.object_values() {
            if let Some(assigned) = effects.objects.get(function) {
                relevant = true;
                if assigned.as_cst().is_some_and(|c| c != value) {
                    return Relevance::AntiRelevant;
                }
            }
        }
        if relevant {
            Relevance::Relevant
        } else {
            Relevance::Irrelevant
        }
    }
}
