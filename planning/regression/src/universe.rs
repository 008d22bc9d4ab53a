use hashbrown::{HashMap, HashSet};

use crate::errors::ObjectError;
use crate::*;

/// Finite universe of a problem: typed objects and static facts.
///
/// This is the default implementation of both the [`Grounder`] and the [`Evaluator`] services.
#[derive(Clone, Debug, Default)]
pub struct Universe {
    /// Objects of each type, in declaration order.
    objects: HashMap<Sym, Vec<Sym>>,
    /// Type of each object
    types: HashMap<Sym, Sym>,
    /// Predicates that no operator can modify.
    static_predicates: HashSet<Sym>,
    /// Ground atoms of static predicates that hold in the initial state (and thus in every reachable state).
    static_facts: HashSet<Atom>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, name: impl Into<Sym>, tpe: impl Into<Sym>) -> Result<(), ObjectError> {
        let name = name.into();
        let tpe = tpe.into();
        if let Some(previous) = self.types.get(&name) {
            if previous == &tpe {
                // same declaration twice, accepted
                Ok(())
            } else {
                Err(ObjectError::DuplicateObjectDeclaration(name, previous.clone(), tpe))
            }
        } else {
            self.types.insert(name.clone(), tpe.clone());
            self.objects.entry(tpe).or_default().push(name);
            Ok(())
        }
    }

    pub fn with_objects(mut self, tpe: &str, names: &[&str]) -> Result<Self, ObjectError> {
        for name in names {
            self.add_object(*name, tpe)?;
        }
        Ok(self)
    }

    pub fn type_of(&self, object: &Sym) -> Option<&Sym> {
        self.types.get(object)
    }

    /// Detects the static predicates of the problem and records their facts in the initial state.
    ///
    /// A predicate is static if it does not appear in the effects of any operator.
    pub fn detect_statics<'a>(&mut self, init: &State, operators: impl IntoIterator<Item = &'a Operator>) {
        let mut modified = HashSet::new();
        for op in operators {
            for eff in &op.effects {
                collect_modified(eff, &mut modified);
            }
        }
        let mut candidates: HashSet<Sym> = init.facts().map(|a| a.symbol.clone()).collect();
        candidates.retain(|p| !modified.contains(p));
        for fact in init.facts().filter(|a| candidates.contains(&a.symbol)) {
            self.static_facts.insert(fact.clone());
        }
        self.static_predicates.extend(candidates);
    }

    /// Declares a ground fact of a static predicate.
    pub fn add_static_fact(&mut self, fact: Atom) {
        debug_assert!(fact.is_ground());
        self.static_predicates.insert(fact.symbol.clone());
        self.static_facts.insert(fact);
    }

    pub fn is_static(&self, predicate: &Sym) -> bool {
        self.static_predicates.contains(predicate)
    }
}

fn collect_modified(eff: &Effect, modified: &mut HashSet<Sym>) {
    match eff {
        Effect::Add(atom) | Effect::Delete(atom) => {
            modified.insert(atom.symbol.clone());
        }
        Effect::Numeric { function, .. } | Effect::Object { function, .. } => {
            modified.insert(function.symbol.clone());
        }
        Effect::Forall { effects, .. } | Effect::When { effects, .. } => {
            for e in effects {
                collect_modified(e, modified);
            }
        }
        Effect::Equals(_, _) => {}
    }
}

impl Grounder for Universe {
    fn objects_of(&self, tpe: &Sym) -> &[Sym] {
        self.objects.get(tpe).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

impl Evaluator for Universe {
    fn is_rigid_relation(&self, atom: &Atom) -> bool {
        atom.is_ground() && self.static_predicates.contains(&atom.symbol) && self.static_facts.contains(atom)
    }

    fn evaluate(&self, cnf: &Cnf, sub: &Substitution, state: &State) -> bool {
        let grounded = self.ground_conditions(cnf, sub);
        if grounded.is_lifted() {
            let params = grounded.params().to_vec();
            let unquantified = grounded.clone().with_params(Vec::new());
            self.groundings(&params)
                .any(|instance| state.satisfies(&self.ground_conditions(&unquantified, &instance)))
        } else {
            state.satisfies(&grounded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_by_type() -> anyhow::Result<()> {
        let mut universe = Universe::new().with_objects("robot", &["r1", "r2"])?;
        universe.add_object("r1", "robot")?;
        assert_eq!(universe.objects_of(&"robot".into()).len(), 2);
        assert!(universe.add_object("r1", "room").is_err());
        assert!(universe.objects_of(&"room".into()).is_empty());
        Ok(())
    }

    #[test]
    fn static_detection() {
        let connected = Atom::ground("connected", &["a", "b"]);
        let at = Atom::ground("at", &["a"]);
        let init = State::from_facts([connected.clone(), at.clone()]);
        let mv = Operator::new("move", vec![]).with_effects(vec![
            Effect::Delete(at.clone()),
            Effect::Add(Atom::ground("at", &["b"])),
        ]);
        let mut universe = Universe::new();
        universe.detect_statics(&init, [&mv]);
        assert!(universe.is_rigid_relation(&connected));
        assert!(!universe.is_rigid_relation(&Atom::ground("connected", &["b", "a"])));
        assert!(!universe.is_rigid_relation(&at));
    }

    #[test]
    fn existential_evaluation() -> anyhow::Result<()> {
        let universe = Universe::new().with_objects("room", &["a", "b"])?;
        let x = Var(0);
        let cnf = Cnf::all([Literal::pos(Atom::new("at", [Term::Var(x)]))]).with_params(vec![Param::new(x, "room")]);
        let state = State::from_facts([Atom::ground("at", &["b"])]);
        assert!(universe.evaluate(&cnf, &Substitution::new(), &state));
        assert!(!universe.evaluate(&cnf, &Substitution::new(), &State::new()));
        Ok(())
    }
}
