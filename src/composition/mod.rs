// Copyright 2025 Cowboy AI, LLC.

//! Composition of a service community with a target into an MDP
//!
//! The [`CompositionEngine`] explores the reachable part of the product of
//! the system service and a goal specification, breadth first, and hands
//! back a complete [`CompositionMdp`]. The goal can be a
//! [`StochasticTarget`](crate::StochasticTarget) or a
//! [`GoalAutomaton`](crate::GoalAutomaton); both share one exploration loop
//! and differ only in the [`ProductStrategy`](engine::ProductStrategy) that
//! drives it.

pub mod engine;
pub mod goal;
pub mod stochastic;

use crate::distribution::{Distribution, PROBABILITY_TOLERANCE};
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::{ServiceIndex, StateId, Symbol};
use crate::system_service::{SystemAction, SystemState};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use engine::CompositionEngine;
pub use goal::GoalStrategy;
pub use stochastic::{StochasticComponent, StochasticStrategy};

/// State of a composition MDP
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionState {
    /// Entry point of the stochastic-target variant, before the first policy draw
    VirtualInitial,
    /// Absorbing dead end
    Sink,
    /// Stochastic-target variant: the target has picked `symbol` to run next
    ///
    /// `symbol` is `None` once the target reaches a state without policy.
    Pending {
        /// System-service state
        system: SystemState,
        /// Target state
        target: StateId,
        /// Symbol the target wants executed next
        symbol: Option<Symbol>,
    },
    /// Goal-automaton variant: system-service state paired with a DFA state
    Goal {
        /// System-service state
        system: SystemState,
        /// Goal automaton state
        automaton: StateId,
    },
}

impl CompositionState {
    /// System-service component, when the state has one
    pub fn system(&self) -> Option<&SystemState> {
        match self {
            CompositionState::Pending { system, .. } | CompositionState::Goal { system, .. } => {
                Some(system)
            }
            CompositionState::VirtualInitial | CompositionState::Sink => None,
        }
    }
}

impl fmt::Display for CompositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositionState::VirtualInitial => f.write_str("initial"),
            CompositionState::Sink => f.write_str("sink"),
            CompositionState::Pending {
                system,
                target,
                symbol: Some(symbol),
            } => write!(f, "({system}, {target}, {symbol})"),
            CompositionState::Pending {
                system,
                target,
                symbol: None,
            } => write!(f, "({system}, {target}, -)"),
            CompositionState::Goal { system, automaton } => write!(f, "({system}, {automaton})"),
        }
    }
}

/// Action of a composition MDP
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    /// Reserved: leaves the virtual initial state
    Initial,
    /// Reserved: self-loop or move to the sink from a dead end
    Undefined,
    /// Stochastic-target variant: delegate the pending symbol to a service
    Service(ServiceIndex),
    /// Goal-automaton variant: a service executes a symbol
    Invoke(SystemAction),
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionId::Initial => f.write_str("initial"),
            ActionId::Undefined => f.write_str("undefined"),
            ActionId::Service(index) => write!(f, "{index}"),
            ActionId::Invoke(action) => write!(f, "{action}"),
        }
    }
}

/// Outcome of taking an action in a composition state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdpTransition {
    /// Distribution over successor states
    pub outcomes: Distribution<CompositionState>,
    /// Immediate reward
    pub reward: f64,
}

impl MdpTransition {
    /// Deterministic move to `state` with zero reward
    pub fn certain(state: CompositionState) -> Self {
        Self {
            outcomes: Distribution::certain(state),
            reward: 0.0,
        }
    }
}

/// Transition table: `state → action → (distribution, reward)`
pub type TransitionFunction = IndexMap<CompositionState, IndexMap<ActionId, MdpTransition>>;

/// Finite MDP produced by the composition engine
///
/// Immutable once returned; it is the input of an external solver, which
/// reads [`transition_function`](Self::transition_function),
/// [`discount_factor`](Self::discount_factor) and
/// [`initial_state`](Self::initial_state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionMdp {
    #[serde(with = "table_serde")]
    transitions: TransitionFunction,
    discount: f64,
    initial_state: CompositionState,
}

impl CompositionMdp {
    pub(crate) fn new(transitions: TransitionFunction, discount: f64, initial_state: CompositionState) -> Self {
        Self {
            transitions,
            discount,
            initial_state,
        }
    }

    /// The full transition table
    pub fn transition_function(&self) -> &TransitionFunction {
        &self.transitions
    }

    /// Discount factor
    pub fn discount_factor(&self) -> f64 {
        self.discount
    }

    /// Initial state
    pub fn initial_state(&self) -> &CompositionState {
        &self.initial_state
    }

    /// All states, in discovery order
    pub fn states(&self) -> impl Iterator<Item = &CompositionState> + '_ {
        self.transitions.keys()
    }

    /// Number of states
    pub fn state_count(&self) -> usize {
        self.transitions.len()
    }

    /// Every action used anywhere in the table
    pub fn actions(&self) -> IndexSet<ActionId> {
        self.transitions
            .values()
            .flat_map(|row| row.keys().cloned())
            .collect()
    }

    /// Whether `state` belongs to the MDP
    pub fn contains_state(&self, state: &CompositionState) -> bool {
        self.transitions.contains_key(state)
    }

    /// Actions available in `state`
    pub fn actions_at(&self, state: &CompositionState) -> Option<&IndexMap<ActionId, MdpTransition>> {
        self.transitions.get(state)
    }

    /// Outcome of `action` in `state`
    pub fn transition(&self, state: &CompositionState, action: &ActionId) -> Option<&MdpTransition> {
        self.transitions.get(state).and_then(|row| row.get(action))
    }

    /// Check the structural invariants a solver relies on
    ///
    /// Every state has at least one action, every action's distribution
    /// sums to one within [`PROBABILITY_TOLERANCE`], and every successor is
    /// itself a state of the MDP.
    pub fn validate(&self) -> CompositionResult<()> {
        if !self.transitions.contains_key(&self.initial_state) {
            return Err(CompositionError::MalformedMdp(format!(
                "initial state {} has no entry",
                self.initial_state
            )));
        }
        for (state, row) in &self.transitions {
            if row.is_empty() {
                return Err(CompositionError::MalformedMdp(format!(
                    "state {state} has no action"
                )));
            }
            for (action, transition) in row {
                if !transition.outcomes.is_stochastic(PROBABILITY_TOLERANCE) {
                    return Err(CompositionError::MalformedMdp(format!(
                        "action {action} at {state} sums to {}",
                        transition.outcomes.total()
                    )));
                }
                if let Some(missing) = transition
                    .outcomes
                    .support()
                    .find(|next| !self.transitions.contains_key(*next))
                {
                    return Err(CompositionError::MalformedMdp(format!(
                        "action {action} at {state} leads to unknown state {missing}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Nested maps keyed by enums have no JSON object form; store them as pairs
mod table_serde {
    use super::{ActionId, CompositionState, MdpTransition, TransitionFunction};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(table: &TransitionFunction, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            table
                .iter()
                .map(|(state, row)| (state, row.iter().collect::<Vec<_>>())),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TransitionFunction, D::Error> {
        let rows: Vec<(CompositionState, Vec<(ActionId, MdpTransition)>)> = Vec::deserialize(deserializer)?;
        Ok(rows
            .into_iter()
            .map(|(state, row)| (state, row.into_iter().collect()))
            .collect())
    }
}
