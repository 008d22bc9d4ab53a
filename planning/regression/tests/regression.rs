use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use ::regression::regression::NumericReplacer;
use ::regression::*;

const NUM_ATOMS: usize = 5;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn atom(i: usize) -> Atom {
    Atom::ground(format!("p{i}"), &[])
}

fn all_atoms() -> Vec<Atom> {
    (0..NUM_ATOMS).map(atom).collect()
}

/// All states over the atoms of the problem.
fn all_states() -> Vec<State> {
    (0..(1u32 << NUM_ATOMS))
        .map(|bits| State::from_facts((0..NUM_ATOMS).filter(|i| bits & (1 << i) != 0).map(atom)))
        .collect()
}

fn random_literal(rng: &mut SmallRng) -> Literal {
    let a = atom(rng.random_range(0..NUM_ATOMS));
    if rng.random_bool(0.5) { Literal::pos(a) } else { Literal::neg(a) }
}

fn random_clause(rng: &mut SmallRng, max_len: usize) -> Clause {
    let len = rng.random_range(1..=max_len);
    (0..len).map(|_| random_literal(rng)).collect()
}

fn random_cnf(rng: &mut SmallRng, max_clauses: usize, max_len: usize) -> Cnf {
    let num = rng.random_range(0..=max_clauses);
    (0..num).map(|_| random_clause(rng, max_len)).collect()
}

fn random_primitive_effects(rng: &mut SmallRng, max: usize) -> Vec<Effect> {
    let num = rng.random_range(1..=max);
    (0..num)
        .map(|_| {
            let a = atom(rng.random_range(0..NUM_ATOMS));
            if rng.random_bool(0.5) { Effect::Add(a) } else { Effect::Delete(a) }
        })
        .collect()
}

fn random_operator(rng: &mut SmallRng, conditional: bool) -> Operator {
    let mut effects = random_primitive_effects(rng, 3);
    if conditional {
        for _ in 0..rng.random_range(0..=2) {
            let guard = random_cnf(rng, 2, 2);
            effects.push(Effect::when(guard, random_primitive_effects(rng, 2)));
        }
    }
    Operator::new("op", vec![])
        .with_preconditions(random_cnf(rng, 2, 2))
        .with_effects(effects)
}

fn successor(universe: &Universe, op: &Operator, state: &State) -> State {
    let mut next = state.clone();
    apply_forward(universe, &op.effects, &mut next, &mut Substitution::new());
    next
}

#[test]
fn scenario_forbidden_literal_is_removed() {
    init_tracing();
    let universe = Universe::new();
    let p = Atom::ground("P", &["a"]);
    let q = Atom::ground("Q", &["b"]);
    let r = Atom::ground("R", &["c"]);
    let op = Operator::new("op", vec![]).with_effects(vec![Effect::Add(p.clone()), Effect::Delete(q)]);
    let target = Cnf::new([Clause::new([Literal::neg(p), Literal::pos(r.clone())])]);
    let res = apply_backwards_conditions(&universe, &universe, &op, Some(&target), &mut Substitution::new());
    assert_eq!(res, Condition::Cnf(Cnf::all([Literal::pos(r)])));
}

#[test]
fn scenario_conditional_effect() {
    init_tracing();
    let universe = Universe::new();
    let p = Atom::ground("P", &["a"]);
    let g = Atom::ground("G", &[]);
    let op = Operator::new("op", vec![]).with_effects(vec![Effect::when(
        Cnf::all([Literal::pos(g.clone())]),
        vec![Effect::Add(p.clone())],
    )]);
    let target = Cnf::all([Literal::pos(p.clone())]);
    let res = apply_backwards_conditions(&universe, &universe, &op, Some(&target), &mut Substitution::new());
    let expected = Cnf::all([Literal::pos(p)]).or(&Cnf::all([Literal::pos(g)]));
    assert_eq!(res, Condition::Cnf(expected));
}

#[test]
fn scenario_numeric_increase() {
    init_tracing();
    let universe = Universe::new()
        .with_objects("obj", &["x"])
        .expect("single object");
    let v = Var(0);
    let lifted = Atom::new("F", [Term::Var(v)]);
    let op = Operator::new("inc", vec![Param::new(v, "obj")])
        .with_effects(vec![Effect::increase(lifted.clone(), NumExpr::number(5.0))]);
    let fx = Atom::ground("F", &["x"]);
    let target = Cnf::all([Literal::compare(
        CmpOp::Eq,
        NumExpr::function(fx.clone()),
        NumExpr::number(12.0),
    )]);
    let mut sub = Substitution::from_bindings([(v, Term::cst("x"))]);
    let mut applier = BackwardConditions::new(&universe, &universe, &op).with_mode(SubstitutionMode::Minimal);
    let res = applier.apply_backwards(Some(&target), &mut sub);
    let expected = Literal::compare(CmpOp::Eq, NumExpr::function(fx), NumExpr::number(7.0));
    assert_eq!(res, Condition::Cnf(Cnf::all([expected])));
    assert_eq!(applier.minimal_substitution(), &Substitution::from_bindings([(v, Term::cst("x"))]));
    assert_eq!(sub.depth(), 0);
}

#[test]
fn function_arguments_are_compared_with_effects() {
    init_tracing();
    let universe = Universe::new();
    let objects = ["a", "b", "c"];
    let holder = Atom::ground("holder", &["key"]);
    let p = |arg: &str| Atom::ground("P", &[arg]);
    let held = Atom::new("P", [Term::fun(holder.clone())]);
    let op = Operator::new("op", vec![]).with_effects(vec![Effect::Delete(p("a")), Effect::Add(p("b"))]);
    for target in [Cnf::all([Literal::pos(held.clone())]), Cnf::all([Literal::neg(held.clone())])] {
        let res = apply_backwards_conditions(&universe, &universe, &op, Some(&target), &mut Substitution::new()).to_cnf();
        for value in objects {
            for bits in 0..(1u32 << objects.len()) {
                let facts = (0..objects.len()).filter(|i| bits & (1 << i) != 0).map(|i| p(objects[i]));
                let mut state = State::from_facts(facts);
                state.set_object(holder.clone(), value.into());
                let reaches = successor(&universe, &op, &state).satisfies(&target);
                assert_eq!(state.satisfies(&res), reaches, "target: {target}\nregressed: {res}\nstate: {state}");
            }
        }
    }

    let fuel = |arg: &str| Atom::ground("fuel", &[arg]);
    let op = Operator::new("refuel", vec![]).with_effects(vec![Effect::assign(fuel("a"), NumExpr::number(3.0))]);
    let target = Cnf::all([Literal::compare(
        CmpOp::Eq,
        NumExpr::function(Atom::new("fuel", [Term::fun(holder.clone())])),
        NumExpr::number(5.0),
    )]);
    let res = apply_backwards_conditions(&universe, &universe, &op, Some(&target), &mut Substitution::new()).to_cnf();
    for value in ["a", "b"] {
        for (fa, fb) in [(3.0, 3.0), (3.0, 5.0), (5.0, 3.0), (5.0, 5.0)] {
            let mut state = State::new();
            state.set_object(holder.clone(), value.into());
            state.set_numeric(fuel("a"), fa);
            state.set_numeric(fuel("b"), fb);
            let reaches = successor(&universe, &op, &state).satisfies(&target);
            assert_eq!(state.satisfies(&res), reaches, "regressed: {res}\nstate: {state}");
        }
    }
}

#[test]
fn regression_is_sound_and_complete() {
    init_tracing();
    let universe = Universe::new();
    let states = all_states();
    for seed in 0..200 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let op = random_operator(&mut rng, true);
        let target = random_cnf(&mut rng, 3, 3);
        let res = apply_backwards_conditions(&universe, &universe, &op, Some(&target), &mut Substitution::new());
        let res = res.to_cnf();
        for state in &states {
            let applicable = state.satisfies(&op.preconditions);
            let reaches = applicable && successor(&universe, &op, state).satisfies(&target);
            assert_eq!(
                state.satisfies(&res),
                reaches,
                "seed {seed}\n{op}\ntarget: {target}\nregressed: {res}\nstate: {state}"
            );
        }
    }
}

#[test]
fn relative_states_precede_their_successors() {
    init_tracing();
    let universe = Universe::new();
    let atoms = all_atoms();
    let cost = Atom::ground("cost", &[]);
    for seed in 0..200 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut op = random_operator(&mut rng, false);
        op.effects
            .push(Effect::increase(cost.clone(), NumExpr::number(rng.random_range(1..4) as f64)));
        for state in all_states() {
            if !state.satisfies(&op.preconditions) {
                continue;
            }
            let mut state = state;
            state.set_numeric(cost.clone(), rng.random_range(0..10) as f64);
            let next = successor(&universe, &op, &state);
            let target = RelativeState::from_state(&next, &atoms);
            let predecessors =
                apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();
            assert!(
                predecessors.iter().any(|p| p.is_satisfied_by(&state)),
                "seed {seed}\n{op}\nstate: {state}\ntarget: {target}\npredecessors: {predecessors:?}"
            );
        }
    }
}

#[test]
fn relative_predecessors_lead_to_target() {
    init_tracing();
    let universe = Universe::new();
    let states = all_states();
    for seed in 0..200 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let op = random_operator(&mut rng, true);
        let mut target = RelativeState::new();
        for _ in 0..rng.random_range(1..=3) {
            target.require(atom(rng.random_range(0..NUM_ATOMS)), rng.random_bool(0.5));
        }
        let predecessors =
            apply_backwards_relative_state(&universe, &universe, &op, &target, &mut Substitution::new()).collect_vec();
        for state in &states {
            if predecessors.iter().any(|p| p.is_satisfied_by(state)) {
                assert!(state.satisfies(&op.preconditions), "seed {seed}: {state} not applicable");
                let next = successor(&universe, &op, state);
                assert!(target.is_satisfied_by(&next), "seed {seed}\n{op}\ntarget: {target}\nstate: {state}");
            }
        }
    }
}

#[test]
fn anti_relevant_effects_never_reach_target() {
    init_tracing();
    let universe = Universe::new();
    let states = all_states();
    let mut num_anti_relevant = 0;
    for seed in 0..200 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let op = random_operator(&mut rng, true);
        let mut target = RelativeState::new();
        for _ in 0..rng.random_range(1..=3) {
            target.require(atom(rng.random_range(0..NUM_ATOMS)), rng.random_bool(0.5));
        }
        if is_relevant_state(&universe, &op, &target, &mut Substitution::new()) != Relevance::AntiRelevant {
            continue;
        }
        num_anti_relevant += 1;
        for state in &states {
            let next = successor(&universe, &op, state);
            assert!(!target.is_satisfied_by(&next), "seed {seed}\n{op}\ntarget: {target}");
        }
    }
    assert!(num_anti_relevant > 0);
}

#[test]
fn grounding_ground_constructs_is_identity() {
    let universe = Universe::new()
        .with_objects("obj", &["a", "b"])
        .expect("distinct objects");
    let mut rng = SmallRng::seed_from_u64(7);
    let objects = ["a", "b", "c"];
    for _ in 0..100 {
        let args = (0..rng.random_range(0..3))
            .map(|_| objects[rng.random_range(0..objects.len())])
            .collect_vec();
        let a = Atom::ground("p", &args);
        let sub = Substitution::from_bindings(
            (0..rng.random_range(0..3)).map(|i| (Var(i), Term::cst(objects[rng.random_range(0..objects.len())]))),
        );
        assert_eq!(universe.ground_atom(&a, &sub), a);
        let term = Term::fun(a.clone());
        assert_eq!(universe.ground_term(&term, &sub), term);
        let expr = NumExpr::plus(vec![NumExpr::function(a.clone()), NumExpr::number(1.0)]);
        assert_eq!(universe.ground_numeric(&expr, &sub), expr);
        let cnf = Cnf::all([Literal::pos(a)]);
        assert_eq!(universe.ground_conditions(&cnf, &sub), cnf);
    }
}

fn random_constant_expr(rng: &mut SmallRng, depth: u32) -> NumExpr {
    if depth == 0 {
        return NumExpr::number(rng.random_range(-5..=5) as f64);
    }
    let depth = depth - 1;
    match rng.random_range(0..6) {
        0 => NumExpr::number(rng.random_range(-5..=5) as f64),
        1 => NumExpr::plus((0..rng.random_range(1..4)).map(|_| random_constant_expr(rng, depth)).collect()),
        2 => NumExpr::multiply((0..rng.random_range(1..4)).map(|_| random_constant_expr(rng, depth)).collect()),
        3 => NumExpr::minus(random_constant_expr(rng, depth), random_constant_expr(rng, depth)),
        4 => NumExpr::neg(random_constant_expr(rng, depth)),
        _ => {
            let divisor = rng.random_range(1..=4) as f64;
            let divisor = if rng.random_bool(0.5) { divisor } else { -divisor };
            NumExpr::divide(random_constant_expr(rng, depth), NumExpr::number(divisor))
        }
    }
}

#[test]
fn constant_expressions_reduce_to_numbers() {
    let universe = Universe::new();
    let assignments = Default::default();
    let sub = Substitution::new();
    let mut rng = SmallRng::seed_from_u64(3);
    for _ in 0..200 {
        let expr = random_constant_expr(&mut rng, 3);
        let mut replacer = NumericReplacer::new(&universe, &assignments, &sub);
        let reduced = replacer.replace(&expr);
        assert!(reduced.as_number().is_some(), "{expr} reduced to {reduced}");
        assert_eq!(reduced.as_number(), expr.eval(&|_: &Atom| None));
    }
}
