use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use stochastic_service_composition::{
    ActionId, CompositionConfig, CompositionEngine, CompositionError, CompositionState, FormulaCompiler,
    GoalAutomaton, MdpTransition, SeedStrategy, Service, StateId, Symbol, SystemAction, SystemState,
};

fn ids(labels: &[&str]) -> Vec<StateId> {
    labels.iter().map(|l| StateId::new(l)).collect()
}

/// DFA accepting `pick drill`, with a dead branch `q0 --weld--> trap`
fn pick_then_drill() -> GoalAutomaton {
    let mut transitions = IndexMap::new();
    let mut q0 = IndexMap::new();
    q0.insert(Symbol::new("pick"), StateId::new("q1"));
    q0.insert(Symbol::new("weld"), StateId::new("trap"));
    transitions.insert(StateId::new("q0"), q0);
    let mut q1 = IndexMap::new();
    q1.insert(Symbol::new("drill"), StateId::new("q2"));
    transitions.insert(StateId::new("q1"), q1);
    GoalAutomaton::new(
        ids(&["q0", "q1", "q2", "trap"]),
        "q0",
        [Symbol::new("pick"), Symbol::new("drill"), Symbol::new("weld")],
        transitions,
        ids(&["q2"]),
    )
    .unwrap()
}

fn community() -> Vec<Service> {
    vec![
        Service::one_state("picker", ["pick"], -1.0).unwrap(),
        Service::breakable("driller", "drill", 0.5, -4.0, -2.0).unwrap(),
        Service::one_state("welder", ["weld"], -1.0).unwrap(),
    ]
}

fn goal(system: &[&str], automaton: &str) -> CompositionState {
    CompositionState::Goal {
        system: SystemState::new(ids(system)),
        automaton: automaton.into(),
    }
}

fn invoke(symbol: &str, service: usize) -> ActionId {
    ActionId::Invoke(SystemAction {
        symbol: symbol.into(),
        service,
    })
}

#[test]
fn test_sink_is_absorbing() {
    let mdp = CompositionEngine::default()
        .compose_goal(&pick_then_drill(), &community())
        .unwrap();

    let row = mdp.actions_at(&CompositionState::Sink).unwrap();
    assert_eq!(row.len(), 1);
    assert_eq!(
        row[&ActionId::Undefined],
        MdpTransition::certain(CompositionState::Sink)
    );
    mdp.validate().unwrap();
}

#[test]
fn test_trimming_removes_dead_branches() {
    let mdp = CompositionEngine::default()
        .compose_goal(&pick_then_drill(), &community())
        .unwrap();
    let start = goal(&["ready", "available", "ready"], "q0");
    assert_eq!(mdp.initial_state(), &start);

    let row = mdp.actions_at(&start).unwrap();
    assert_eq!(row.keys().cloned().collect::<Vec<_>>(), vec![invoke("pick", 0)]);
    assert!(mdp.states().all(|state| !state.to_string().contains("trap")));
}

#[test]
fn test_untrimmed_automaton_keeps_dead_branches() {
    let config = CompositionConfig {
        trim_goal: false,
        ..CompositionConfig::default()
    };
    let mdp = CompositionEngine::new(config)
        .compose_goal(&pick_then_drill(), &community())
        .unwrap();

    let start = goal(&["ready", "available", "ready"], "q0");
    let weld = mdp.transition(&start, &invoke("weld", 2)).unwrap();
    let trapped = goal(&["ready", "available", "ready"], "trap");
    assert_eq!(weld.outcomes.probability(&trapped), 1.0);
    assert_eq!(
        mdp.transition(&trapped, &ActionId::Undefined),
        Some(&MdpTransition::certain(CompositionState::Sink))
    );
}

#[test]
fn test_accepting_reward_is_added_to_service_reward() {
    let mdp = CompositionEngine::default()
        .compose_goal(&pick_then_drill(), &community())
        .unwrap();

    let ready_to_drill = goal(&["ready", "available", "ready"], "q1");
    let drill = mdp.transition(&ready_to_drill, &invoke("drill", 1)).unwrap();
    assert_eq!(drill.reward, -1.0);
    assert_eq!(drill.outcomes.probability(&goal(&["ready", "done", "ready"], "q2")), 0.5);
    assert_eq!(drill.outcomes.probability(&goal(&["ready", "broken", "ready"], "q2")), 0.5);
}

#[test]
fn test_internal_steps_keep_the_automaton_state() {
    let services = vec![Service::breakable("driller", "drill", 0.5, -4.0, -2.0).unwrap()];
    let mut transitions = IndexMap::new();
    let mut q0 = IndexMap::new();
    q0.insert(Symbol::new("drill"), StateId::new("q0"));
    transitions.insert(StateId::new("q0"), q0);
    let forever_drilling =
        GoalAutomaton::new(ids(&["q0"]), "q0", [Symbol::new("drill")], transitions, ids(&["q0"])).unwrap();

    let mdp = CompositionEngine::default()
        .compose_goal(&forever_drilling, &services)
        .unwrap();

    let check = mdp
        .transition(&goal(&["broken"], "q0"), &invoke("check_drill", 0))
        .unwrap();
    assert_eq!(check.reward, -4.0);
    assert_eq!(check.outcomes.probability(&goal(&["available"], "q0")), 1.0);
    assert!(!mdp.contains_state(&CompositionState::Sink));
}

#[test]
fn test_ambiguous_service_is_a_configuration_error() {
    let services = vec![Service::one_state("handyman", ["pick", "drill"], -1.0).unwrap()];
    let err = CompositionEngine::default()
        .compose_goal(&pick_then_drill(), &services)
        .unwrap_err();
    assert!(err.is_configuration_error());
    assert!(matches!(
        err,
        CompositionError::AmbiguousServiceSymbols { ref service, .. } if service == "handyman"
    ));
}

#[test]
fn test_idle_seeding_adds_quiescent_configurations() {
    let config = CompositionConfig {
        seed: SeedStrategy::idle(["ready", "available", "broken"]),
        ..CompositionConfig::default()
    };
    let engine = CompositionEngine::new(config);
    let seeded = engine.compose_goal(&pick_then_drill(), &community()).unwrap();
    let plain = CompositionEngine::default()
        .compose_goal(&pick_then_drill(), &community())
        .unwrap();

    let broken_start = goal(&["ready", "broken", "ready"], "q0");
    assert!(seeded.contains_state(&broken_start));
    assert!(!plain.contains_state(&broken_start));
    assert_eq!(seeded.initial_state(), plain.initial_state());
    seeded.validate().unwrap();
}

struct FixedCompiler(GoalAutomaton);

impl FormulaCompiler for FixedCompiler {
    fn compile(&self, formula: &str, alphabet: &indexmap::IndexSet<Symbol>) -> Result<GoalAutomaton, String> {
        if formula != "pick; drill" {
            return Err(format!("cannot parse `{formula}`"));
        }
        if !alphabet.contains(&Symbol::new("pick")) {
            return Err("alphabet lacks pick".to_string());
        }
        Ok(self.0.clone())
    }
}

#[test]
fn test_compose_from_formula() {
    let compiler = FixedCompiler(pick_then_drill());
    let engine = CompositionEngine::default();

    let mdp = engine
        .compose_from_formula(&compiler, "pick; drill", &community())
        .unwrap();
    assert_eq!(
        mdp,
        engine.compose_goal(&pick_then_drill(), &community()).unwrap()
    );

    let err = engine
        .compose_from_formula(&compiler, "G pick", &community())
        .unwrap_err();
    assert_eq!(
        err,
        CompositionError::Compiler {
            formula: "G pick".to_string(),
            message: "cannot parse `G pick`".to_string(),
        }
    );
}
