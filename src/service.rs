// Copyright 2025 Cowboy AI, LLC.

//! Services: finite probabilistic automata with rewarded transitions
//!
//! A [`Service`] is one participant of the community (a machine, a human, a
//! warehouse). It is validated once at construction and immutable afterwards.
//!
//! ```rust
//! use stochastic_service_composition::Service;
//!
//! let drill = Service::builder("drill")
//!     .initial_state("ready")
//!     .final_state("ready")
//!     .transition("ready", "drill", [("ready", 0.9), ("broken", 0.1)], -1.0)
//!     .transition("broken", "repair", [("ready", 1.0)], -5.0)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(drill.states().len(), 2);
//! assert!(drill.supports(&"drill".into()));
//! ```

use crate::distribution::{Distribution, DistributionSite};
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::{StateId, Symbol};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Caller-supplied transition table: `state → symbol → (outcomes, reward)`
pub type TransitionTable = IndexMap<StateId, IndexMap<Symbol, (Vec<(StateId, f64)>, f64)>>;

/// Outcome distribution and reward of one `(state, symbol)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTransition {
    /// Distribution over successor states
    pub outcomes: Distribution<StateId>,
    /// Reward collected when the symbol is executed
    pub reward: f64,
}

/// A validated, immutable stochastic service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    name: String,
    states: IndexSet<StateId>,
    actions: IndexSet<Symbol>,
    initial_state: StateId,
    final_states: IndexSet<StateId>,
    transitions: IndexMap<StateId, IndexMap<Symbol, ServiceTransition>>,
}

impl Service {
    /// Start building a service
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder::new(name)
    }

    /// Build a service from a raw transition table
    ///
    /// Fails with [`CompositionError::InvalidDistribution`] when a
    /// per-state, per-symbol distribution is not a probability distribution
    /// and with [`CompositionError::UnknownState`] when a final state is not
    /// part of the automaton.
    pub fn build(
        name: impl Into<String>,
        transitions: TransitionTable,
        initial_state: impl Into<StateId>,
        final_states: impl IntoIterator<Item = StateId>,
    ) -> CompositionResult<Self> {
        let name = name.into();
        let initial_state = initial_state.into();

        let mut states = IndexSet::new();
        let mut actions = IndexSet::new();
        states.insert(initial_state.clone());

        let mut validated = IndexMap::with_capacity(transitions.len());
        for (state, by_symbol) in transitions {
            states.insert(state.clone());
            let mut row = IndexMap::with_capacity(by_symbol.len());
            for (symbol, (outcomes, reward)) in by_symbol {
                if !reward.is_finite() {
                    return Err(CompositionError::invalid_distribution(
                        &name,
                        state.as_str(),
                        symbol.as_str(),
                        format!("reward {reward} is not finite"),
                    ));
                }
                let site = DistributionSite {
                    component: &name,
                    state: state.as_str(),
                    action: symbol.as_str(),
                };
                let outcomes = Distribution::validated(outcomes, site)?;
                states.extend(outcomes.support().cloned());
                actions.insert(symbol.clone());
                row.insert(symbol, ServiceTransition { outcomes, reward });
            }
            validated.insert(state, row);
        }

        let final_states: IndexSet<StateId> = final_states.into_iter().collect();
        if let Some(unknown) = final_states.iter().find(|s| !states.contains(*s)) {
            return Err(CompositionError::UnknownState {
                component: name,
                state: unknown.to_string(),
            });
        }

        Ok(Self {
            name,
            states,
            actions,
            initial_state,
            final_states,
            transitions: validated,
        })
    }

    /// Single-state service that can always perform each of `symbols`
    pub fn one_state<I, S>(name: impl Into<String>, symbols: I, reward: f64) -> CompositionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut builder = Self::builder(name).initial_state("ready").final_state("ready");
        for symbol in symbols {
            builder = builder.transition("ready", symbol, [("ready", 1.0)], reward);
        }
        builder.build()
    }

    /// Service that may break while executing `symbol`
    ///
    /// `available --symbol--> done | broken`, then `check_<symbol>` brings it
    /// back to `available`, costing `broken_reward` when it was broken.
    pub fn breakable(
        name: impl Into<String>,
        symbol: &str,
        broken_prob: f64,
        broken_reward: f64,
        reward: f64,
    ) -> CompositionResult<Self> {
        let check = format!("check_{symbol}");
        Self::builder(name)
            .initial_state("available")
            .final_state("available")
            .transition(
                "available",
                symbol,
                [("done", 1.0 - broken_prob), ("broken", broken_prob)],
                reward,
            )
            .transition("broken", check.as_str(), [("available", 1.0)], broken_reward)
            .transition("done", check.as_str(), [("available", 1.0)], 0.0)
            .build()
    }

    /// Service with a configuration phase that may leave it unemployable
    ///
    /// `ready --config_x--> configured --checked_x--> executing | broken`,
    /// `executing --x--> ready | broken`, and a two-step repair
    /// `broken --restore_x--> repairing --repaired_x--> ready`.
    pub fn complex_breakable(
        name: impl Into<String>,
        symbol: &str,
        broken_prob: f64,
        unemployable_prob: f64,
        broken_reward: f64,
        reward: f64,
    ) -> CompositionResult<Self> {
        Self::builder(name)
            .initial_state("ready")
            .final_state("ready")
            .transition("ready", format!("config_{symbol}"), [("configured", 1.0)], 0.0)
            .transition(
                "configured",
                format!("checked_{symbol}"),
                [("executing", 1.0 - unemployable_prob), ("broken", unemployable_prob)],
                0.0,
            )
            .transition(
                "executing",
                symbol,
                [("ready", 1.0 - broken_prob), ("broken", broken_prob)],
                reward,
            )
            .transition("broken", format!("restore_{symbol}"), [("repairing", 1.0)], broken_reward)
            .transition("repairing", format!("repaired_{symbol}"), [("ready", 1.0)], 0.0)
            .build()
    }

    /// Name of the service, used in error reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All states of the service
    pub fn states(&self) -> &IndexSet<StateId> {
        &self.states
    }

    /// The action alphabet
    pub fn actions(&self) -> &IndexSet<Symbol> {
        &self.actions
    }

    /// Initial state
    pub fn initial_state(&self) -> &StateId {
        &self.initial_state
    }

    /// Final states
    pub fn final_states(&self) -> &IndexSet<StateId> {
        &self.final_states
    }

    /// Whether `symbol` appears anywhere in the service
    pub fn supports(&self, symbol: &Symbol) -> bool {
        self.actions.contains(symbol)
    }

    /// Transitions enabled in `state`, keyed by symbol
    pub fn transitions_from(&self, state: &StateId) -> Option<&IndexMap<Symbol, ServiceTransition>> {
        self.transitions.get(state)
    }

    /// Transition for `(state, symbol)`, if enabled
    pub fn transition(&self, state: &StateId, symbol: &Symbol) -> Option<&ServiceTransition> {
        self.transitions.get(state).and_then(|row| row.get(symbol))
    }

    /// Symbols enabled in `state`
    pub fn enabled_symbols<'a>(&'a self, state: &StateId) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.transitions
            .get(state)
            .into_iter()
            .flat_map(|row| row.keys())
    }
}

/// Fluent builder for [`Service`]
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    name: String,
    initial_state: Option<StateId>,
    final_states: Vec<StateId>,
    transitions: TransitionTable,
}

impl ServiceBuilder {
    /// Create a builder for a service called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: None,
            final_states: Vec::new(),
            transitions: IndexMap::new(),
        }
    }

    /// Set the initial state
    pub fn initial_state(mut self, state: impl Into<StateId>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Add a final state
    pub fn final_state(mut self, state: impl Into<StateId>) -> Self {
        self.final_states.push(state.into());
        self
    }

    /// Declare the transition for `(from, symbol)`
    pub fn transition<O, S>(
        mut self,
        from: impl Into<StateId>,
        symbol: impl Into<Symbol>,
        outcomes: O,
        reward: f64,
    ) -> Self
    where
        O: IntoIterator<Item = (S, f64)>,
        S: Into<StateId>,
    {
        let outcomes = outcomes.into_iter().map(|(s, p)| (s.into(), p)).collect();
        self.transitions
            .entry(from.into())
            .or_default()
            .insert(symbol.into(), (outcomes, reward));
        self
    }

    /// Validate and build the service
    pub fn build(self) -> CompositionResult<Service> {
        let initial_state = self.initial_state.ok_or_else(|| {
            CompositionError::InvalidConfiguration(format!(
                "service {} has no initial state",
                self.name
            ))
        })?;
        Service::build(self.name, self.transitions, initial_state, self.final_states)
    }
}
