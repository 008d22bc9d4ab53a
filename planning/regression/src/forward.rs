//! Forward application of effects on concrete states, and extraction of the atoms they add.

use std::collections::BTreeSet;

use crate::regression::GroundEffects;
use crate::*;

/// Applies effects on concrete states.
///
/// All guards and assigned values are evaluated in the state before the effects.
/// Deletions are applied before additions so that an atom both deleted and added ends up true.
pub struct ForwardApplier<'a, G: Grounder> {
    grounder: &'a G,
    /// If true, deletions are ignored.
    pub delete_relaxation: bool,
}

impl<'a, G: Grounder> ForwardApplier<'a, G> {
    pub fn new(grounder: &'a G) -> Self {
        ForwardApplier {
            grounder,
            delete_relaxation: false,
        }
    }

    pub fn with_delete_relaxation(mut self, delete_relaxation: bool) -> Self {
        self.delete_relaxation = delete_relaxation;
        self
    }

    pub fn apply(&self, effect: &Effect, state: &mut State, sub: &mut Substitution) {
        self.apply_all(std::slice::from_ref(effect), state, sub)
    }

    /// # Panics
    /// If one of the effects is an equality effect.
    pub fn apply_all(&self, effects: &[Effect], state: &mut State, sub: &mut Substitution) {
        let ground = GroundEffects::build(self.grounder, effects, sub).unwrap_or_else(|e| panic!("{e}"));
        let firing: Vec<usize> = ground
            .conditional
            .iter()
            .enumerate()
            .filter(|(_, c)| self.holds(&c.guard, state))
            .map(|(i, _)| i)
            .collect();
        let effects = ground.with_firing(&firing);

        let resolve = |atoms: &hashbrown::HashSet<Atom>| -> Vec<Atom> {
            atoms
                .iter()
                .filter_map(|a| {
                    let resolved = state.resolve_atom(a);
                    if resolved.is_none() {
                        tracing::trace!("ignored effect on unresolved atom {a}");
                    }
                    resolved
                })
                .collect()
        };
        let deleted = if self.delete_relaxation {
            Vec::new()
        } else {
            resolve(&effects.del)
        };
        let added = resolve(&effects.add);
        let numeric: Vec<(Option<Atom>, Option<f64>)> = effects
            .numeric
            .iter()
            .map(|(f, value)| (state.resolve_atom(f), state.eval_numeric(value)))
            .collect();
        let objects: Vec<(Option<Atom>, Option<Sym>)> = effects
            .objects
            .iter()
            .map(|(f, value)| (state.resolve_atom(f), state.eval_term(value)))
            .collect();

        for atom in &deleted {
            state.del(atom);
        }
        for atom in added {
            state.add(atom);
        }
        for (function, value) in numeric {
            match (function, value) {
                (Some(f), Some(v)) => state.set_numeric(f, v),
                (Some(f), None) => state.unset_numeric(&f),
                (None, _) => {}
            }
        }
        for (function, value) in objects {
            match (function, value) {
                (Some(f), Some(v)) => state.set_object(f, v),
                (Some(f), None) => state.unset_object(&f),
                (None, _) => {}
            }
        }
    }

    fn holds(&self, guard: &Cnf, state: &State) -> bool {
        if guard.is_lifted() {
            let body = guard.clone().with_params(Vec::new());
            self.grounder
                .groundings(guard.params())
                .any(|instance| state.satisfies(&self.grounder.ground_conditions(&body, &instance)))
        } else {
            state.satisfies(guard)
        }
    }
}

/// Applies the effects on the state.
///
/// # Panics
/// If one of the effects is an equality effect.
pub fn apply_forward(grounder: &impl Grounder, effects: &[Effect], state: &mut State, sub: &mut Substitution) {
    ForwardApplier::new(grounder).apply_all(effects, state, sub)
}

/// Atoms that may be added by the effects, including those of every conditional effect whatever its guard.
pub fn collect_result_atoms(grounder: &impl Grounder, effects: &[Effect], sub: &mut Substitution) -> Vec<Atom> {
    let ground = GroundEffects::build(grounder, effects, sub).unwrap_or_else(|e| panic!("{e}"));
    let mut atoms: BTreeSet<Atom> = ground.add.iter().cloned().collect();
    for cond in &ground.conditional {
        atoms.extend(cond.effects.add.iter().cloned());
    }
    atoms.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Universe {
        Universe::new()
            .with_objects("room", &["kitchen", "garden"])
            .expect("distinct objects")
    }

    fn at(room: &str) -> Atom {
        Atom::ground("at", &[room])
    }

    #[test]
    fn delete_then_add() {
        let universe = universe();
        let x = Var(0);
        let effects = vec![
            Effect::forall(
                vec![Param::new(x, "room")],
                vec![Effect::Delete(Atom::new("at", [Term::Var(x)]))],
            ),
            Effect::Add(at("garden")),
        ];
        let mut state = State::from_facts([at("kitchen"), at("garden")]);
        apply_forward(&universe, &effects, &mut state, &mut Substitution::new());
        assert_eq!(state, State::from_facts([at("garden")]));

        let relaxed = ForwardApplier::new(&universe).with_delete_relaxation(true);
        let mut state = State::from_facts([at("kitchen")]);
        relaxed.apply_all(&effects, &mut state, &mut Substitution::new());
        assert!(state.holds(&at("kitchen")));
        assert!(state.holds(&at("garden")));
    }

    #[test]
    fn values_are_evaluated_before_the_effects() {
        let universe = universe();
        let a = Atom::ground("a", &[]);
        let b = Atom::ground("b", &[]);
        let effects = vec![
            Effect::assign(a.clone(), NumExpr::function(b.clone())),
            Effect::assign(b.clone(), NumExpr::function(a.clone())),
            Effect::increase(Atom::ground("cost", &[]), NumExpr::number(2.0)),
        ];
        let mut state = State::new();
        state.set_numeric(a.clone(), 1.0);
        state.set_numeric(b.clone(), 2.0);
        state.set_numeric(Atom::ground("cost", &[]), 10.0);
        apply_forward(&universe, &effects, &mut state, &mut Substitution::new());
        assert_eq!(state.numeric_value(&a), Some(2.0));
        assert_eq!(state.numeric_value(&b), Some(1.0));
        assert_eq!(state.numeric_value(&Atom::ground("cost", &[])), Some(12.0));
    }

    #[test]
    fn conditional_effects() {
        let universe = universe();
        let light = Atom::ground("light", &[]);
        let effects = vec![Effect::when(
            Cnf::all([Literal::pos(at("kitchen"))]),
            vec![Effect::Add(light.clone())],
        )];
        let mut state = State::from_facts([at("garden")]);
        apply_forward(&universe, &effects, &mut state, &mut Substitution::new());
        assert!(!state.holds(&light));
        let mut state = State::from_facts([at("kitchen")]);
        apply_forward(&universe, &effects, &mut state, &mut Substitution::new());
        assert!(state.holds(&light));

        let atoms = collect_result_atoms(&universe, &effects, &mut Substitution::new());
        assert_eq!(atoms, vec![light]);
    }
}
