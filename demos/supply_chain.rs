// Copyright 2025 Cowboy AI, LLC.

//! Chip production supply chain
//!
//! Warehouses in several countries can supply silicon, machines that may
//! break can etch and package the wafers. The target picks silicon, then
//! etches or tests, then packages. The composition MDP is built, checked,
//! encoded, snapshotted to a temporary file
//! and restored.
//!
//! Run with `RUST_LOG=debug cargo run --example supply_chain` for details.

use stochastic_service_composition::{
    CompositionConfig, CompositionEngine, Encoder, MdpSnapshot, Service, StochasticTarget,
};
use tracing_subscriber::EnvFilter;

const BROKEN_PROB: f64 = 0.05;
const BROKEN_REWARD: f64 = -10.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let services = vec![
        Service::one_state("silicon_usa", ["pick_silicon"], -2.0)?,
        Service::one_state("silicon_canada", ["pick_silicon"], -1.8)?,
        Service::one_state("silicon_taiwan", ["pick_silicon"], -12.2)?,
        Service::breakable("etcher_usa", "etch", BROKEN_PROB, BROKEN_REWARD, -1.0)?,
        Service::complex_breakable("etcher_uk", "etch", BROKEN_PROB, 0.1, BROKEN_REWARD, -6.8)?,
        Service::breakable("tester", "test", 0.5, BROKEN_REWARD, -1.0)?,
        Service::one_state("packager", ["package", "check_etch", "check_test"], -0.5)?,
    ];

    let target = StochasticTarget::builder()
        .initial_state("t0")
        .final_state("t0")
        .transition("t0", "pick_silicon", "t1", 1.0, 0.0)
        .transition("t1", "etch", "t2", 0.8, 1.0)
        .transition("t1", "test", "t2", 0.2, 1.0)
        .transition("t2", "package", "t0", 1.0, 2.0)
        .build()?;

    let engine = CompositionEngine::new(CompositionConfig::with_gamma(0.9));
    let mdp = engine.compose_target(&target, &services)?;
    mdp.validate()?;

    println!("Composition MDP");
    println!("  states:   {}", mdp.state_count());
    println!("  actions:  {}", mdp.actions().len());
    println!("  discount: {}", mdp.discount_factor());
    println!("  initial:  {}", mdp.initial_state());

    let mut encoder = Encoder::in_memory();
    let encoded = mdp.encode(&mut encoder)?;
    println!("Encoded with {} ids, initial state id {}", encoder.assigned(), encoded.initial_state());

    let snapshot = MdpSnapshot::new(mdp);
    let file = tempfile::NamedTempFile::new()?;
    snapshot.save(file.as_file())?;
    let restored = MdpSnapshot::load(file.reopen()?)?;
    println!(
        "Snapshot {} restored from {} with {} states",
        restored.id,
        file.path().display(),
        restored.mdp.state_count()
    );

    Ok(())
}
