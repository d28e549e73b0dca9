// Copyright 2025 Cowboy AI, LLC.

//! Goal automaton composition
//!
//! A toy compiler turns a sequence formula `a; b; c` into the DFA accepting
//! exactly that word. Breakable machines are composed against it, starting
//! from any idle configuration of the community.

use indexmap::{IndexMap, IndexSet};
use stochastic_service_composition::{
    CompositionConfig, CompositionEngine, FormulaCompiler, GoalAutomaton, SeedStrategy, Service, StateId,
    Symbol,
};
use tracing_subscriber::EnvFilter;

/// Compiles `;`-separated sequences of symbols
struct SequenceCompiler;

impl FormulaCompiler for SequenceCompiler {
    fn compile(&self, formula: &str, alphabet: &IndexSet<Symbol>) -> Result<GoalAutomaton, String> {
        let word: Vec<Symbol> = formula.split(';').map(|s| Symbol::new(s.trim())).collect();
        if let Some(unknown) = word.iter().find(|s| !alphabet.contains(*s)) {
            return Err(format!("symbol `{unknown}` is not offered by any service"));
        }

        let states: Vec<StateId> = (0..=word.len()).map(|i| StateId::new(format!("q{i}"))).collect();
        let mut transitions = IndexMap::new();
        for (i, symbol) in word.iter().enumerate() {
            let mut row = IndexMap::new();
            row.insert(symbol.clone(), states[i + 1].clone());
            transitions.insert(states[i].clone(), row);
        }
        let accepting = states[word.len()].clone();
        GoalAutomaton::new(states, "q0", word, transitions, [accepting]).map_err(|e| e.to_string())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let services = vec![
        Service::breakable("cutter", "cut", 0.1, -10.0, -1.0)?,
        Service::breakable("drill", "drill", 0.2, -10.0, -1.5)?,
        Service::breakable("painter", "paint", 0.05, -10.0, -0.5)?,
    ];

    let config = CompositionConfig {
        seed: SeedStrategy::idle(["available", "broken"]),
        ..CompositionConfig::default()
    };
    let engine = CompositionEngine::new(config);
    let mdp = engine.compose_from_formula(&SequenceCompiler, "cut; drill; paint", &services)?;
    mdp.validate()?;

    println!("Goal composition MDP");
    println!("  states:  {}", mdp.state_count());
    println!("  actions: {}", mdp.actions().len());
    println!("  initial: {}", mdp.initial_state());

    match engine.compose_from_formula(&SequenceCompiler, "cut; weld", &services) {
        Ok(_) => println!("unexpected success"),
        Err(err) => println!("As expected: {err}"),
    }

    Ok(())
}
