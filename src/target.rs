// Copyright 2025 Cowboy AI, LLC.

//! Stochastic targets: policy-driven goal specifications
//!
//! A [`StochasticTarget`] is a small automaton whose randomized policy picks
//! the next symbol to execute in each state. Executing a symbol moves the
//! target deterministically and yields a reward. A state without a policy is
//! terminal.

use crate::distribution::{Distribution, DistributionSite};
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::{StateId, Symbol};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

const COMPONENT: &str = "target";

/// Raw target table: `state → symbol → (next_state, probability, reward)`
pub type TargetTable = IndexMap<StateId, IndexMap<Symbol, (StateId, f64, f64)>>;

/// Deterministic move of the target on one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTransition {
    /// State reached
    pub next_state: StateId,
    /// Reward awarded for executing the symbol
    pub reward: f64,
}

/// Goal specification driven by a randomized policy over symbols
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochasticTarget {
    states: IndexSet<StateId>,
    initial_state: StateId,
    final_states: IndexSet<StateId>,
    policy: IndexMap<StateId, Distribution<Symbol>>,
    transitions: IndexMap<StateId, IndexMap<Symbol, TargetTransition>>,
}

impl StochasticTarget {
    /// Start building a target
    pub fn builder() -> TargetBuilder {
        TargetBuilder::default()
    }

    /// Build a target from a transition table carrying policy probabilities
    ///
    /// Each entry `state → symbol → (next, p, r)` declares that the policy
    /// picks `symbol` with probability `p` in `state`, that the target then
    /// moves to `next`, and that it awards `r`.
    pub fn from_transitions(
        table: TargetTable,
        initial_state: impl Into<StateId>,
        final_states: impl IntoIterator<Item = StateId>,
    ) -> CompositionResult<Self> {
        let mut policy: IndexMap<StateId, Vec<(Symbol, f64)>> = IndexMap::new();
        let mut transitions: IndexMap<StateId, IndexMap<Symbol, TargetTransition>> = IndexMap::new();

        for (state, row) in table {
            let policy_row = policy.entry(state.clone()).or_default();
            let transition_row = transitions.entry(state).or_default();
            for (symbol, (next_state, probability, reward)) in row {
                policy_row.push((symbol.clone(), probability));
                transition_row.insert(symbol, TargetTransition { next_state, reward });
            }
        }

        Self::new(initial_state, final_states, policy, transitions)
    }

    /// Build a target from separate policy and transition tables
    pub fn new(
        initial_state: impl Into<StateId>,
        final_states: impl IntoIterator<Item = StateId>,
        policy: IndexMap<StateId, Vec<(Symbol, f64)>>,
        transitions: IndexMap<StateId, IndexMap<Symbol, TargetTransition>>,
    ) -> CompositionResult<Self> {
        let initial_state = initial_state.into();

        let mut states = IndexSet::new();
        states.insert(initial_state.clone());
        for (state, row) in &transitions {
            states.insert(state.clone());
            for (symbol, transition) in row {
                if !transition.reward.is_finite() {
                    return Err(CompositionError::invalid_distribution(
                        COMPONENT,
                        state.as_str(),
                        symbol.as_str(),
                        format!("reward {} is not finite", transition.reward),
                    ));
                }
                states.insert(transition.next_state.clone());
            }
        }

        let mut validated = IndexMap::with_capacity(policy.len());
        for (state, choices) in policy {
            if choices.iter().all(|(_, p)| *p == 0.0) {
                // a state whose policy never picks anything is terminal
                continue;
            }
            let site = DistributionSite {
                component: COMPONENT,
                state: state.as_str(),
                action: "policy",
            };
            let distribution = Distribution::validated(choices, site)?;
            for symbol in distribution.support() {
                let defined = transitions
                    .get(&state)
                    .is_some_and(|row| row.contains_key(symbol));
                if !defined {
                    return Err(CompositionError::UndefinedTargetTransition {
                        state: state.to_string(),
                        symbol: symbol.to_string(),
                    });
                }
            }
            if !states.contains(&state) {
                return Err(CompositionError::UnknownState {
                    component: COMPONENT.to_string(),
                    state: state.to_string(),
                });
            }
            validated.insert(state, distribution);
        }

        let final_states: IndexSet<StateId> = final_states.into_iter().collect();
        if let Some(unknown) = final_states.iter().find(|s| !states.contains(*s)) {
            return Err(CompositionError::UnknownState {
                component: COMPONENT.to_string(),
                state: unknown.to_string(),
            });
        }

        Ok(Self {
            states,
            initial_state,
            final_states,
            policy: validated,
            transitions,
        })
    }

    /// All target states
    pub fn states(&self) -> &IndexSet<StateId> {
        &self.states
    }

    /// Initial state
    pub fn initial_state(&self) -> &StateId {
        &self.initial_state
    }

    /// Final states
    pub fn final_states(&self) -> &IndexSet<StateId> {
        &self.final_states
    }

    /// Policy at `state`; `None` when the state is terminal
    pub fn policy(&self, state: &StateId) -> Option<&Distribution<Symbol>> {
        self.policy.get(state)
    }

    /// Deterministic move on `symbol` from `state`
    pub fn transition(&self, state: &StateId, symbol: &Symbol) -> Option<&TargetTransition> {
        self.transitions.get(state).and_then(|row| row.get(symbol))
    }

    /// Whether the target can execute `symbol` from `state`
    pub fn accepts(&self, state: &StateId, symbol: &Symbol) -> bool {
        self.transition(state, symbol).is_some()
    }

    /// Every symbol the target mentions
    pub fn alphabet(&self) -> IndexSet<Symbol> {
        self.transitions
            .values()
            .flat_map(|row| row.keys().cloned())
            .collect()
    }
}

/// Fluent builder for [`StochasticTarget`]
#[derive(Debug, Clone, Default)]
pub struct TargetBuilder {
    initial_state: Option<StateId>,
    final_states: Vec<StateId>,
    table: TargetTable,
}

impl TargetBuilder {
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

    /// Declare that in `from` the policy picks `symbol` with `probability`,
    /// moving to `to` and awarding `reward`
    pub fn transition(
        mut self,
        from: impl Into<StateId>,
        symbol: impl Into<Symbol>,
        to: impl Into<StateId>,
        probability: f64,
        reward: f64,
    ) -> Self {
        self.table
            .entry(from.into())
            .or_default()
            .insert(symbol.into(), (to.into(), probability, reward));
        self
    }

    /// Validate and build the target
    pub fn build(self) -> CompositionResult<StochasticTarget> {
        let initial_state = self.initial_state.ok_or_else(|| {
            CompositionError::InvalidConfiguration("target has no initial state".to_string())
        })?;
        StochasticTarget::from_transitions(self.table, initial_state, self.final_states)
    }
}
