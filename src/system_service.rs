// Copyright 2025 Cowboy AI, LLC.

//! The system service: interleaved product of a community of services
//!
//! A composite state is the tuple of every component service's state. Acting
//! with `(symbol, i)` moves only component `i`, following its own
//! distribution for `symbol`, while every other component stays put.
//!
//! The product is never materialised. Transitions out of a composite state
//! are computed on first request and kept in an LRU cache, since the
//! reachable part of the product is usually a small fraction of it.

use crate::distribution::Distribution;
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::{ServiceIndex, StateId, Symbol};
use crate::service::Service;
use indexmap::{IndexMap, IndexSet};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Default number of composite states whose transitions are cached
pub const DEFAULT_CACHE_CAPACITY: usize = 65_536;

/// Tuple of component service states
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemState(Arc<[StateId]>);

impl SystemState {
    /// Build a composite state from its components
    pub fn new(components: impl IntoIterator<Item = StateId>) -> Self {
        Self(components.into_iter().collect())
    }

    /// Component states, in service order
    pub fn components(&self) -> &[StateId] {
        &self.0
    }

    /// State of component `index`
    pub fn component(&self, index: ServiceIndex) -> Option<&StateId> {
        self.0.get(index)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of this state with component `index` replaced
    pub fn with_component(&self, index: ServiceIndex, state: StateId) -> Self {
        let mut components = self.0.to_vec();
        components[index] = state;
        Self(components.into())
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{component}")?;
        }
        f.write_str(")")
    }
}

/// System-service action: service `service` executes `symbol`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemAction {
    /// Symbol being executed
    pub symbol: Symbol,
    /// Service executing it
    pub service: ServiceIndex,
}

impl fmt::Display for SystemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.symbol, self.service)
    }
}

/// Outcome of a system-service action
#[derive(Debug, Clone, PartialEq)]
pub struct SystemTransition {
    /// Distribution over successor composite states
    pub outcomes: Distribution<SystemState>,
    /// Reward of the executing service
    pub reward: f64,
}

/// Every action enabled in one composite state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemTransitions {
    edges: IndexMap<SystemAction, SystemTransition>,
    by_symbol: IndexMap<Symbol, Vec<ServiceIndex>>,
}

impl SystemTransitions {
    /// All enabled actions with their outcomes
    pub fn iter(&self) -> impl Iterator<Item = (&SystemAction, &SystemTransition)> + '_ {
        self.edges.iter()
    }

    /// Outcome of one action, if enabled
    pub fn get(&self, action: &SystemAction) -> Option<&SystemTransition> {
        self.edges.get(action)
    }

    /// Action and outcome stored for `(symbol, service)`
    pub fn edge(&self, symbol: &Symbol, service: ServiceIndex) -> Option<(&SystemAction, &SystemTransition)> {
        self.edges.get_key_value(&SystemAction {
            symbol: symbol.clone(),
            service,
        })
    }

    /// Services able to execute `symbol` from this composite state
    pub fn services_for(&self, symbol: &Symbol) -> &[ServiceIndex] {
        self.by_symbol
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of enabled actions
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether no action is enabled
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Lazily expanded interleaved product of a community of services
pub struct SystemService {
    services: Vec<Service>,
    initial_state: SystemState,
    cache: LruCache<SystemState, Arc<SystemTransitions>>,
}

impl fmt::Debug for SystemService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemService")
            .field("services", &self.service_names().collect::<Vec<_>>())
            .field("initial_state", &self.initial_state)
            .field("cached_states", &self.cache.len())
            .finish()
    }
}

impl SystemService {
    /// Compose an ordered community of services
    pub fn compose(services: Vec<Service>) -> CompositionResult<Self> {
        Self::with_cache_capacity(services, DEFAULT_CACHE_CAPACITY)
    }

    /// Compose with an explicit transition cache capacity
    pub fn with_cache_capacity(services: Vec<Service>, capacity: usize) -> CompositionResult<Self> {
        if services.is_empty() {
            return Err(CompositionError::EmptyCommunity);
        }
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            CompositionError::InvalidConfiguration("cache capacity must be positive".to_string())
        })?;
        let initial_state = SystemState::new(services.iter().map(|s| s.initial_state().clone()));

        Ok(Self {
            services,
            initial_state,
            cache: LruCache::new(capacity),
        })
    }

    /// Component services, in index order
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Names of the component services
    pub fn service_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.services.iter().map(Service::name)
    }

    /// Tuple of component initial states
    pub fn initial_state(&self) -> &SystemState {
        &self.initial_state
    }

    /// Union of the component alphabets
    pub fn symbols(&self) -> IndexSet<Symbol> {
        self.services
            .iter()
            .flat_map(|s| s.actions().iter().cloned())
            .collect()
    }

    /// Number of composite states whose transitions are currently cached
    pub fn cached_states(&self) -> usize {
        self.cache.len()
    }

    /// Transitions out of `state`, computed on first request and cached
    pub fn transitions(&mut self, state: &SystemState) -> Arc<SystemTransitions> {
        if let Some(cached) = self.cache.get(state) {
            return Arc::clone(cached);
        }
        let expanded = Arc::new(self.expand(state));
        self.cache.put(state.clone(), Arc::clone(&expanded));
        expanded
    }

    /// Compute the transitions out of `state` without touching the cache
    pub fn expand(&self, state: &SystemState) -> SystemTransitions {
        debug_assert_eq!(state.len(), self.services.len());

        let mut transitions = SystemTransitions::default();
        for (index, (service, component)) in self.services.iter().zip(state.components()).enumerate() {
            let Some(row) = service.transitions_from(component) else {
                continue;
            };
            for (symbol, transition) in row {
                let outcomes = transition
                    .outcomes
                    .map(|next| state.with_component(index, next.clone()));
                transitions.edges.insert(
                    SystemAction {
                        symbol: symbol.clone(),
                        service: index,
                    },
                    SystemTransition {
                        outcomes,
                        reward: transition.reward,
                    },
                );
                transitions
                    .by_symbol
                    .entry(symbol.clone())
                    .or_default()
                    .push(index);
            }
        }
        transitions
    }

    /// Every composite state whose components all belong to `idle_states`
    ///
    /// Enumerates the product of each service's idle states. Fails with
    /// [`CompositionError::StateSpaceTooLarge`] before enumerating when the
    /// product exceeds `limit`.
    pub fn idle_configurations(
        &self,
        idle_states: &IndexSet<StateId>,
        limit: usize,
    ) -> CompositionResult<Vec<SystemState>> {
        let per_service: Vec<Vec<StateId>> = self
            .services
            .iter()
            .map(|service| {
                service
                    .states()
                    .iter()
                    .filter(|s| idle_states.contains(*s))
                    .cloned()
                    .collect()
            })
            .collect();

        let mut count: usize = 1;
        for choices in &per_service {
            count = count
                .checked_mul(choices.len())
                .filter(|c| *c <= limit)
                .ok_or(CompositionError::StateSpaceTooLarge { limit })?;
        }
        debug!(configurations = count, "enumerating idle configurations");

        let mut configurations: Vec<Vec<StateId>> = vec![Vec::with_capacity(per_service.len())];
        for choices in &per_service {
            let mut extended = Vec::with_capacity(configurations.len() * choices.len());
            for prefix in &configurations {
                for choice in choices {
                    let mut next = prefix.clone();
                    next.push(choice.clone());
                    extended.push(next);
                }
            }
            configurations = extended;
        }
        Ok(configurations.into_iter().map(SystemState::new).collect())
    }
}
