// Copyright 2025 Cowboy AI, LLC.

//! Lazy product exploration shared by both composition variants
//!
//! [`explore`] walks the reachable part of `system × goal` breadth first,
//! expanding each composite state exactly once. What the goal component is
//! and how it reacts to a system action is left to a [`ProductStrategy`].

use super::goal::GoalStrategy;
use super::stochastic::StochasticStrategy;
use super::{ActionId, CompositionMdp, CompositionState, MdpTransition, TransitionFunction};
use crate::config::CompositionConfig;
use crate::distribution::{Distribution, PROBABILITY_TOLERANCE};
use crate::errors::{CompositionError, CompositionResult};
use crate::goal::{compile_goal, FormulaCompiler, GoalAutomaton};
use crate::service::Service;
use crate::system_service::{SystemAction, SystemService, SystemState, SystemTransition, SystemTransitions};
use crate::target::StochasticTarget;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Where exploration starts
#[derive(Debug, Clone, PartialEq)]
pub enum Seeding<C> {
    /// A virtual initial state fans out to the given states under
    /// [`ActionId::Initial`], with the given probabilities
    Virtual(Vec<(SystemState, C, f64)>),
    /// The given states are explored directly; the first is the MDP's
    /// initial state
    Roots(Vec<(SystemState, C)>),
}

/// Reaction of the goal component to one system action
#[derive(Debug, Clone, PartialEq)]
pub enum Step<C> {
    /// The action is admissible: the goal component moves to one of `next`
    /// and the goal awards `reward` on top of the service reward
    Advance {
        /// Distribution over the next goal component
        next: Vec<(C, f64)>,
        /// Goal reward for the step
        reward: f64,
    },
    /// The action is not compatible with the goal here
    Skip,
}

/// Treatment of a composite state left without any admissible action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadEnd {
    /// `undefined` loops back to the state itself
    SelfLoop,
    /// `undefined` moves to the shared absorbing sink
    Sink,
}

/// Goal side of a product exploration
pub trait ProductStrategy {
    /// Goal component paired with a system state in each composite state
    type Component: Clone + Eq + Hash;

    /// Variant name used in logs
    fn name(&self) -> &'static str;

    /// Initial composite states
    fn seeds(&self, system: &SystemService, config: &CompositionConfig) -> CompositionResult<Seeding<Self::Component>>;

    /// System actions worth considering from a composite state
    fn candidates<'t>(
        &self,
        component: &Self::Component,
        transitions: &'t SystemTransitions,
    ) -> Vec<(&'t SystemAction, &'t SystemTransition)>;

    /// How the goal component reacts to `action`
    fn advance(&self, component: &Self::Component, action: &SystemAction) -> Step<Self::Component>;

    /// MDP action recorded for `action`
    fn action_id(&self, action: &SystemAction) -> ActionId;

    /// Composite state made of a system state and a goal component
    fn state(&self, system: SystemState, component: Self::Component) -> CompositionState;

    /// Dead-end convention of the variant
    fn dead_end(&self) -> DeadEnd;
}

struct Frontier<C> {
    discovered: HashSet<CompositionState>,
    queue: VecDeque<(CompositionState, SystemState, C)>,
    limit: usize,
    warned: bool,
}

impl<C> Frontier<C> {
    fn new(limit: usize) -> Self {
        Self {
            discovered: HashSet::new(),
            queue: VecDeque::new(),
            limit,
            warned: false,
        }
    }

    /// Enqueue `state` unless it was already discovered
    fn offer(&mut self, state: &CompositionState, system: &SystemState, component: &C) -> CompositionResult<()>
    where
        C: Clone,
    {
        if self.discovered.contains(state) {
            return Ok(());
        }
        if self.discovered.len() >= self.limit {
            return Err(CompositionError::StateSpaceTooLarge { limit: self.limit });
        }
        self.discovered.insert(state.clone());
        if !self.warned && self.discovered.len() as f64 >= self.limit as f64 * 0.9 {
            self.warned = true;
            warn!(
                discovered = self.discovered.len(),
                limit = self.limit,
                "composition is close to the state ceiling"
            );
        }
        self.queue
            .push_back((state.clone(), system.clone(), component.clone()));
        Ok(())
    }
}

/// Explore the product of `system` with the goal side described by `strategy`
///
/// Returns the complete MDP, or [`CompositionError::StateSpaceTooLarge`] as
/// soon as more than `config.max_states` composite states are discovered.
/// The virtual initial state and the sink are not counted.
pub fn explore<S: ProductStrategy>(
    strategy: &S,
    system: &mut SystemService,
    config: &CompositionConfig,
) -> CompositionResult<CompositionMdp> {
    let started = Instant::now();
    info!(
        variant = strategy.name(),
        services = system.services().len(),
        max_states = config.max_states,
        "starting composition"
    );

    let mut table = TransitionFunction::new();
    let mut frontier = Frontier::new(config.max_states);

    let initial_state = match strategy.seeds(system, config)? {
        Seeding::Virtual(seeds) => {
            let mut outcomes = Distribution::empty();
            for (system_state, component, probability) in seeds {
                let state = strategy.state(system_state.clone(), component.clone());
                frontier.offer(&state, &system_state, &component)?;
                outcomes.accumulate(state, probability);
            }
            debug_assert!(outcomes.is_stochastic(PROBABILITY_TOLERANCE));
            let mut row = IndexMap::with_capacity(1);
            row.insert(ActionId::Initial, MdpTransition { outcomes, reward: 0.0 });
            table.insert(CompositionState::VirtualInitial, row);
            CompositionState::VirtualInitial
        }
        Seeding::Roots(roots) => {
            let mut initial = None;
            for (system_state, component) in roots {
                let state = strategy.state(system_state.clone(), component.clone());
                frontier.offer(&state, &system_state, &component)?;
                if initial.is_none() {
                    initial = Some(state);
                }
            }
            initial.ok_or_else(|| {
                CompositionError::InvalidConfiguration("exploration has no initial state".to_string())
            })?
        }
    };

    let mut sink_used = false;
    while let Some((state, system_state, component)) = frontier.queue.pop_front() {
        trace!(%state, "expanding composite state");
        let transitions = system.transitions(&system_state);
        let mut row: IndexMap<ActionId, MdpTransition> = IndexMap::new();

        for (action, edge) in strategy.candidates(&component, &transitions) {
            let (next, goal_reward) = match strategy.advance(&component, action) {
                Step::Advance { next, reward } => (next, reward),
                Step::Skip => continue,
            };

            let mut outcomes = Distribution::empty();
            for (next_system, p_system) in edge.outcomes.iter() {
                for (next_component, p_goal) in &next {
                    let probability = p_system * p_goal;
                    if probability <= 0.0 {
                        continue;
                    }
                    let next_state = strategy.state(next_system.clone(), next_component.clone());
                    frontier.offer(&next_state, next_system, next_component)?;
                    outcomes.accumulate(next_state, probability);
                }
            }
            debug_assert!(outcomes.is_stochastic(PROBABILITY_TOLERANCE));

            row.insert(
                strategy.action_id(action),
                MdpTransition {
                    outcomes,
                    reward: goal_reward + edge.reward,
                },
            );
        }

        if row.is_empty() {
            let fallback = match strategy.dead_end() {
                DeadEnd::SelfLoop => state.clone(),
                DeadEnd::Sink => {
                    sink_used = true;
                    CompositionState::Sink
                }
            };
            debug!(%state, to = %fallback, "dead end, adding undefined action");
            row.insert(ActionId::Undefined, MdpTransition::certain(fallback));
        }
        table.insert(state, row);
    }

    if sink_used {
        let mut row = IndexMap::with_capacity(1);
        row.insert(ActionId::Undefined, MdpTransition::certain(CompositionState::Sink));
        table.insert(CompositionState::Sink, row);
    }

    info!(
        variant = strategy.name(),
        states = table.len(),
        cached_system_states = system.cached_states(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "composition finished"
    );
    Ok(CompositionMdp::new(table, config.gamma, initial_state))
}

/// Builds composition MDPs from a community of services and a goal
///
/// # Example
///
/// ```rust
/// use stochastic_service_composition::{CompositionEngine, CompositionConfig, Service, StochasticTarget};
///
/// let services = vec![
///     Service::one_state("near", ["pick"], -1.0).unwrap(),
///     Service::one_state("far", ["pick"], -3.0).unwrap(),
/// ];
/// let target = StochasticTarget::builder()
///     .initial_state("t0")
///     .final_state("t1")
///     .transition("t0", "pick", "t1", 1.0, 0.0)
///     .build()
///     .unwrap();
///
/// let engine = CompositionEngine::new(CompositionConfig::default());
/// let mdp = engine.compose_target(&target, &services).unwrap();
/// assert_eq!(mdp.discount_factor(), 0.9);
/// mdp.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompositionEngine {
    config: CompositionConfig,
}

impl CompositionEngine {
    /// Create an engine with the given configuration
    pub fn new(config: CompositionConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Compose `services` against a policy-driven target
    pub fn compose_target(&self, target: &StochasticTarget, services: &[Service]) -> CompositionResult<CompositionMdp> {
        self.config.validate()?;
        let strategy = StochasticStrategy::new(target, services)?;
        let mut system = self.system_service(services)?;
        explore(&strategy, &mut system, &self.config)
    }

    /// Compose `services` against a goal automaton
    pub fn compose_goal(&self, automaton: &GoalAutomaton, services: &[Service]) -> CompositionResult<CompositionMdp> {
        self.config.validate()?;
        let strategy = GoalStrategy::new(automaton, services, self.config.trim_goal)?;
        let mut system = self.system_service(services)?;
        explore(&strategy, &mut system, &self.config)
    }

    /// Compile `formula` over the symbols of `services`, then compose against it
    pub fn compose_from_formula(
        &self,
        compiler: &dyn FormulaCompiler,
        formula: &str,
        services: &[Service],
    ) -> CompositionResult<CompositionMdp> {
        let alphabet = services
            .iter()
            .flat_map(|s| s.actions().iter().cloned())
            .collect();
        let automaton = compile_goal(compiler, formula, &alphabet)?;
        debug!(formula, states = automaton.states().len(), "compiled goal automaton");
        self.compose_goal(&automaton, services)
    }

    fn system_service(&self, services: &[Service]) -> CompositionResult<SystemService> {
        SystemService::with_cache_capacity(services.to_vec(), self.config.cache_capacity)
    }
}
