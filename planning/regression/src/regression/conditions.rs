use std::collections::BTreeSet;

use tracing::Level;

use crate::regression::*;

/// Regression of CNF conditions through an operator.
pub struct BackwardConditions<'a, G: Grounder, E: Evaluator> {
    grounder: &'a G,
    evaluator: &'a E,
    operator: &'a Operator,
    mode: SubstitutionMode,
    max_branches: usize,
    minimal_substitution: Substitution,
}

impl<'a, G: Grounder, E: Evaluator> BackwardConditions<'a, G, E> {
    pub fn new(grounder: &'a G, evaluator: &'a E, operator: &'a Operator) -> Self {
        BackwardConditions {
            grounder,
            evaluator,
            operator,
            mode: SubstitutionMode::Full,
            max_branches: MAX_CONDITIONAL_BRANCHES.get(),
            minimal_substitution: Substitution::new(),
        }
    }

    pub fn with_mode(mut self, mode: SubstitutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_branches(mut self, max_branches: usize) -> Self {
        self.max_branches = max_branches.max(1);
        self
    }

    /// Bindings of the operator parameters that justify the effects used by the last regression.
    pub fn minimal_substitution(&self) -> &Substitution {
        &self.minimal_substitution
    }

    /// Weakest condition on the state before the operator that guarantees `target` after it.
    /// With no target, this is the preconditions of the operator.
    ///
    /// # Panics
    /// If the operator has an equality effect.
    pub fn apply_backwards(&mut self, target: Option<&Cnf>, sub: &mut Substitution) -> Condition {
        let _span = tracing::span!(Level::TRACE, "regression", op = %self.operator.name).entered();
        // parameters of the target are distinct from the variables of the operator
        let target = target.map(|t| t.rename_apart(&reserved_variables(self.operator, sub)));
        let effects = ground_effects(self.grounder, self.operator, sub);
        let sub: &Substitution = sub;
        let mut regressor = Regressor::new(self.grounder, sub);

        let regressed = match target {
            None => Condition::Unconstrained,
            Some(target) => {
                let target = self.grounder.ground_conditions(&target, sub);
                if target.is_lifted() {
                    self.regress_existential(&target, &effects, &mut regressor)
                } else {
                    self.regress(&target, &effects, &mut regressor)
                }
            }
        };
        self.minimal_substitution = self.extract_minimal(&effects, &regressor.consumed);
        if regressed.is_contradiction() {
            return Condition::Contradiction;
        }
        let preconditions = self.preconditions(sub);
        Condition::from(conjoin(&preconditions, &regressed.to_cnf()))
    }

    /// Regresses each instance of a quantified target and disjoins the results.
    /// Instances on which the effects have no influence, or that they falsify, are ignored.
    fn regress_existential(&self, target: &Cnf, effects: &GroundEffects, regressor: &mut Regressor<'_, G>) -> Condition {
        let body = target.clone().with_params(Vec::new());
        let relevance = ConditionRelevance::new(self.grounder, effects, regressor.sub());
        let mut result = Cnf::contradiction();
        let mut num_instances = 0;
        for instance in self.grounder.groundings(target.params()) {
            let instance = self.grounder.ground_conditions(&body, &instance);
            if !relevance.evaluate(&instance).is_relevant() {
                tracing::trace!("pruned instance: {instance}");
                continue;
            }
            num_instances += 1;
            match self.regress(&instance, effects, regressor) {
                Condition::Unconstrained => return Condition::Unconstrained,
                Condition::Contradiction => {}
                Condition::Cnf(cnf) => result = disjoin(&result, &cnf),
            }
        }
        tracing::debug!(num_instances, "regressed existential target");
        Condition::from(result)
    }

    /// Regression of a ground target, branching on the conditional effects that affect it.
    fn regress(&self, target: &Cnf, effects: &GroundEffects, regressor: &mut Regressor<'_, G>) -> Condition {
        let touching = ConditionRelevance::new(self.grounder, effects, regressor.sub())
            .evaluate(target)
            .conditional;
        if touching.is_empty() {
            return Condition::from(regressor.cnf(target, effects));
        }
        let (branches, truncated) = combinations(&touching, self.max_branches);
        if truncated {
            tracing::warn!(
                "{}: {} conditional effects affect the target, only {} combinations considered",
                self.operator.name,
                touching.len(),
                branches.len()
            );
        }
        tracing::debug!(num_branches = branches.len(), "conditional regression");

        let mut result = Cnf::contradiction();
        for firing in branches {
            let mut branch = regressor.cnf(target, &effects.with_firing(&firing));
            for &i in &touching {
                let guard = &effects.conditional[i].guard;
                branch = if firing.contains(&i) {
                    conjoin(&branch, guard)
                } else {
                    branch.and(&negate_guard(self.grounder, guard))
                };
            }
            if branch.is_tautology() {
                return Condition::Unconstrained;
            }
            result = disjoin(&result, &branch);
        }
        Condition::from(result)
    }

    /// Preconditions of the operator, grounded according to the substitution mode.
    /// Operator parameters left unbound become existentially quantified.
    fn preconditions(&self, sub: &Substitution) -> Cnf {
        let grounding = match self.mode {
            SubstitutionMode::Full => sub.flattened(),
            SubstitutionMode::Minimal => self.minimal_substitution.clone(),
        };
        let grounded = self.grounder.ground_conditions(&self.operator.preconditions, &grounding);
        let filter_rigid = RIGID_FILTER.get();
        let clauses = grounded
            .clauses()
            .filter(|clause| !(filter_rigid && clause.literals().any(|l| self.is_rigid(l))))
            .cloned();
        let cnf = Cnf::new(clauses);

        let free = cnf.free_variables();
        let mut params: Vec<Param> = grounded
            .params()
            .iter()
            .filter(|p| free.contains(&p.var))
            .cloned()
            .collect();
        let unbound: Vec<Param> = self
            .operator
            .parameters
            .iter()
            .filter(|p| free.contains(&p.var) && !params.contains(p))
            .cloned()
            .collect();
        params.extend(unbound);
        cnf.with_params(params)
    }

    fn is_rigid(&self, literal: &Literal) -> bool {
        match literal {
            Literal::Pred { atom, negated: false } => atom.is_ground() && self.evaluator.is_rigid_relation(atom),
            _ => false,
        }
    }

    /// Union of the unifiers of every effect atom used by the regression with its lifted origin,
    /// restricted to the operator parameters.
    fn extract_minimal(&self, effects: &GroundEffects, consumed: &BTreeSet<Atom>) -> Substitution {
        let mut minimal = Substitution::new();
        for atom in consumed {
            let Some(lifted) = effects.origin(atom) else {
                continue;
            };
            if let Some(unifier) = self.grounder.unify(lifted, atom) {
                let consistent = minimal.union(&unifier);
                debug_assert!(consistent, "incompatible bindings for {lifted} and {atom}");
            }
        }
        minimal.restricted(|v| self.operator.is_parameter(v))
    }
}
