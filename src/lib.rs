// Copyright 2025 Cowboy AI, LLC.

//! # Stochastic Service Composition
//!
//! Builds the Markov Decision Process that an orchestrator solves to
//! delegate work to a community of unreliable services.
//!
//! - **Service**: a probabilistic automaton with rewarded transitions
//! - **System service**: the interleaved product of a community, expanded lazily
//! - **Stochastic target**: a policy-driven specification of the desired behavior
//! - **Goal automaton**: a DFA, usually compiled from a temporal formula
//! - **Composition MDP**: the reachable product of the community and a target,
//!   ready for an external solver
//! - **Encoder**: dense integer ids for very large MDPs
//!
//! ## Example
//!
//! ```rust
//! use stochastic_service_composition::{
//!     ActionId, CompositionEngine, CompositionState, Service, StochasticTarget,
//! };
//!
//! let services = vec![
//!     Service::one_state("near_warehouse", ["pick"], -1.0).unwrap(),
//!     Service::one_state("far_warehouse", ["pick"], -3.0).unwrap(),
//! ];
//! let target = StochasticTarget::builder()
//!     .initial_state("t0")
//!     .final_state("t1")
//!     .transition("t0", "pick", "t1", 1.0, 0.0)
//!     .build()
//!     .unwrap();
//!
//! let mdp = CompositionEngine::default().compose_target(&target, &services).unwrap();
//! assert_eq!(mdp.initial_state(), &CompositionState::VirtualInitial);
//! assert!(mdp.actions().contains(&ActionId::Service(1)));
//! ```

#![warn(missing_docs)]

mod errors;
mod identifiers;

pub mod composition;
pub mod config;
pub mod distribution;
pub mod encoder;
pub mod goal;
pub mod service;
pub mod snapshot;
pub mod system_service;
pub mod target;

pub use composition::{
    ActionId, CompositionEngine, CompositionMdp, CompositionState, MdpTransition, TransitionFunction,
};
pub use config::{CompositionConfig, SeedStrategy, DEFAULT_GAMMA, DEFAULT_MAX_STATES};
pub use distribution::{Distribution, PROBABILITY_TOLERANCE};
pub use encoder::{EncodedMdp, EncodedTransition, Encoder, InMemoryKeyStore, KeyStore};
pub use errors::{CompositionError, CompositionResult};
pub use goal::{compile_goal, FormulaCompiler, GoalAutomaton};
pub use identifiers::{ServiceIndex, StateId, Symbol};
pub use service::{Service, ServiceBuilder, ServiceTransition};
pub use snapshot::MdpSnapshot;
pub use system_service::{SystemAction, SystemService, SystemState};
pub use target::{StochasticTarget, TargetBuilder, TargetTransition};

#[cfg(feature = "nats-kv")]
pub use encoder::NatsKvKeyStore;
