// Copyright 2025 Cowboy AI, LLC.

//! Dense integer encoding of composition MDPs
//!
//! Solvers for very large MDPs work on integer ids rather than structured
//! states. The [`Encoder`] assigns ids on first sight and keeps the
//! bidirectional mapping in an injected [`KeyStore`]: an in-memory map by
//! default, or a NATS JetStream key-value bucket with the `nats-kv` feature.
//!
//! States and actions share one id space; their keys live in disjoint
//! namespaces, so a state and an action never share an id.

use crate::composition::{ActionId, CompositionMdp, CompositionState};
use crate::distribution::Distribution;
use crate::errors::{CompositionError, CompositionResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[cfg(feature = "nats-kv")]
mod nats;

#[cfg(feature = "nats-kv")]
pub use nats::NatsKvKeyStore;

const STATE_PREFIX: &str = "s:";
const ACTION_PREFIX: &str = "a:";

/// Bidirectional key ↔ id storage behind an [`Encoder`]
#[cfg_attr(test, mockall::automock)]
pub trait KeyStore {
    /// Id bound to `key`, if any
    fn get(&self, key: &str) -> CompositionResult<Option<u64>>;

    /// Bind `key` to `id` in both directions
    fn put(&mut self, key: &str, id: u64) -> CompositionResult<()>;

    /// Key bound to `id`, if any
    fn reverse(&self, id: u64) -> CompositionResult<Option<String>>;

    /// Smallest id above every id already bound
    fn next_id(&self) -> CompositionResult<u64>;
}

/// [`KeyStore`] kept in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyStore {
    forward: HashMap<String, u64>,
    backward: HashMap<u64, String>,
}

impl InMemoryKeyStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound keys
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether no key is bound
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn get(&self, key: &str) -> CompositionResult<Option<u64>> {
        Ok(self.forward.get(key).copied())
    }

    fn put(&mut self, key: &str, id: u64) -> CompositionResult<()> {
        self.forward.insert(key.to_string(), id);
        self.backward.insert(id, key.to_string());
        Ok(())
    }

    fn reverse(&self, id: u64) -> CompositionResult<Option<String>> {
        Ok(self.backward.get(&id).cloned())
    }

    fn next_id(&self) -> CompositionResult<u64> {
        Ok(self.backward.keys().max().map_or(0, |id| id + 1))
    }
}

/// Outcome of an action in an encoded MDP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedTransition {
    /// Distribution over successor state ids
    pub outcomes: Distribution<u64>,
    /// Immediate reward
    pub reward: f64,
}

/// Composition MDP with every state and action replaced by its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedMdp {
    transitions: IndexMap<u64, IndexMap<u64, EncodedTransition>>,
    discount: f64,
    initial_state: u64,
}

impl EncodedMdp {
    /// Transition table: `state id → action id → outcome`
    pub fn transition_function(&self) -> &IndexMap<u64, IndexMap<u64, EncodedTransition>> {
        &self.transitions
    }

    /// Discount factor
    pub fn discount_factor(&self) -> f64 {
        self.discount
    }

    /// Id of the initial state
    pub fn initial_state(&self) -> u64 {
        self.initial_state
    }

    /// Number of states
    pub fn state_count(&self) -> usize {
        self.transitions.len()
    }
}

/// Assigns dense ids to states and actions
#[derive(Debug)]
pub struct Encoder<S: KeyStore = InMemoryKeyStore> {
    store: S,
    next_id: u64,
    capacity: u64,
}

impl Encoder<InMemoryKeyStore> {
    /// Encoder over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self {
            store: InMemoryKeyStore::new(),
            next_id: 0,
            capacity: u64::MAX,
        }
    }
}

impl Default for Encoder<InMemoryKeyStore> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<S: KeyStore> Encoder<S> {
    /// Encoder over `store` with an unbounded id space
    ///
    /// New ids continue after the ones `store` already holds.
    pub fn new(store: S) -> CompositionResult<Self> {
        Self::with_capacity(store, u64::MAX)
    }

    /// Encoder whose ids all stay below `capacity`
    pub fn with_capacity(store: S, capacity: u64) -> CompositionResult<Self> {
        let next_id = store.next_id()?;
        if next_id > 0 {
            debug!(next_id, "resuming encoder on populated key store");
        }
        Ok(Self {
            store,
            next_id,
            capacity,
        })
    }

    /// Next id to hand out, which is the number of ids bound in a dense store
    pub fn assigned(&self) -> u64 {
        self.next_id
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the backing store back
    pub fn into_store(self) -> S {
        self.store
    }

    /// Id of `state`, assigning one if needed
    pub fn encode_state(&mut self, state: &CompositionState) -> CompositionResult<u64> {
        let key = format!("{STATE_PREFIX}{}", serde_json::to_string(state)?);
        self.id_for(&key)
    }

    /// Id of `action`, assigning one if needed
    pub fn encode_action(&mut self, action: &ActionId) -> CompositionResult<u64> {
        let key = format!("{ACTION_PREFIX}{}", serde_json::to_string(action)?);
        self.id_for(&key)
    }

    /// State bound to `id`
    pub fn decode_state(&self, id: u64) -> CompositionResult<CompositionState> {
        let key = self.key_of(id)?;
        match key.strip_prefix(STATE_PREFIX) {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Err(CompositionError::UnknownId { id }),
        }
    }

    /// Action bound to `id`
    pub fn decode_action(&self, id: u64) -> CompositionResult<ActionId> {
        let key = self.key_of(id)?;
        match key.strip_prefix(ACTION_PREFIX) {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Err(CompositionError::UnknownId { id }),
        }
    }

    /// Isomorphic copy of `mdp` keyed by ids
    ///
    /// Probabilities and rewards are carried over unchanged.
    pub fn encode(&mut self, mdp: &CompositionMdp) -> CompositionResult<EncodedMdp> {
        let mut transitions = IndexMap::with_capacity(mdp.state_count());
        for (state, row) in mdp.transition_function() {
            let state_id = self.encode_state(state)?;
            let mut encoded_row = IndexMap::with_capacity(row.len());
            for (action, transition) in row {
                let action_id = self.encode_action(action)?;
                let mut outcomes = Distribution::empty();
                for (next, probability) in transition.outcomes.iter() {
                    outcomes.accumulate(self.encode_state(next)?, probability);
                }
                encoded_row.insert(
                    action_id,
                    EncodedTransition {
                        outcomes,
                        reward: transition.reward,
                    },
                );
            }
            transitions.insert(state_id, encoded_row);
        }
        let initial_state = self.encode_state(mdp.initial_state())?;

        debug!(
            states = transitions.len(),
            ids = self.next_id,
            "encoded composition MDP"
        );
        Ok(EncodedMdp {
            transitions,
            discount: mdp.discount_factor(),
            initial_state,
        })
    }

    fn id_for(&mut self, key: &str) -> CompositionResult<u64> {
        if let Some(id) = self.store.get(key)? {
            return Ok(id);
        }
        if self.next_id >= self.capacity {
            return Err(CompositionError::KeySpaceExhausted {
                capacity: self.capacity,
            });
        }
        let id = self.next_id;
        if let Some(existing) = self.store.reverse(id)? {
            if existing != key {
                return Err(CompositionError::IdCollision {
                    id,
                    existing,
                    incoming: key.to_string(),
                });
            }
        }
        self.store.put(key, id)?;
        self.next_id += 1;
        Ok(id)
    }

    fn key_of(&self, id: u64) -> CompositionResult<String> {
        self.store
            .reverse(id)?
            .ok_or(CompositionError::UnknownId { id })
    }
}

impl CompositionMdp {
    /// Encode this MDP with `encoder`
    pub fn encode<S: KeyStore>(&self, encoder: &mut Encoder<S>) -> CompositionResult<EncodedMdp> {
        encoder.encode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::CompositionEngine;
    use crate::service::Service;
    use crate::target::StochasticTarget;
    use mockall::predicate::eq;

    fn mdp() -> CompositionMdp {
        let services = vec![
            Service::one_state("near", ["pick"], -1.0).unwrap(),
            Service::one_state("far", ["pick"], -3.0).unwrap(),
        ];
        let target = StochasticTarget::builder()
            .initial_state("t0")
            .final_state("t1")
            .transition("t0", "pick", "t1", 1.0, 0.0)
            .build()
            .unwrap();
        CompositionEngine::default()
            .compose_target(&target, &services)
            .unwrap()
    }

    #[test]
    fn test_ids_are_dense_and_stable() {
        let mut encoder = Encoder::in_memory();
        let a = encoder.encode_state(&CompositionState::Sink).unwrap();
        let b = encoder.encode_action(&ActionId::Undefined).unwrap();
        let again = encoder.encode_state(&CompositionState::Sink).unwrap();
        assert_eq!((a, b, again), (0, 1, 0));
        assert_eq!(encoder.assigned(), 2);
        assert_eq!(encoder.decode_state(0).unwrap(), CompositionState::Sink);
        assert_eq!(encoder.decode_action(1).unwrap(), ActionId::Undefined);
        assert!(matches!(
            encoder.decode_state(1),
            Err(CompositionError::UnknownId { id: 1 })
        ));
    }

    #[test]
    fn test_encoding_preserves_structure() {
        let mdp = mdp();
        let mut encoder = Encoder::in_memory();
        let encoded = mdp.encode(&mut encoder).unwrap();

        assert_eq!(encoded.state_count(), mdp.state_count());
        assert_eq!(encoded.discount_factor(), mdp.discount_factor());
        assert_eq!(
            encoder.decode_state(encoded.initial_state()).unwrap(),
            *mdp.initial_state()
        );

        for (state_id, row) in encoded.transition_function() {
            let state = encoder.decode_state(*state_id).unwrap();
            for (action_id, transition) in row {
                let action = encoder.decode_action(*action_id).unwrap();
                let original = mdp.transition(&state, &action).unwrap();
                assert_eq!(transition.reward, original.reward);
                for (next_id, p) in transition.outcomes.iter() {
                    let next = encoder.decode_state(*next_id).unwrap();
                    assert_eq!(p, original.outcomes.probability(&next));
                }
            }
        }
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut encoder = Encoder::with_capacity(InMemoryKeyStore::new(), 1).unwrap();
        encoder.encode_state(&CompositionState::Sink).unwrap();
        let err = encoder.encode_state(&CompositionState::VirtualInitial).unwrap_err();
        assert_eq!(err, CompositionError::KeySpaceExhausted { capacity: 1 });
    }

    #[test]
    fn test_collision_with_preexisting_binding() {
        let mut store = MockKeyStore::new();
        store.expect_next_id().returning(|| Ok(0));
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_reverse()
            .with(eq(0))
            .returning(|_| Ok(Some("s:\"someone_else\"".to_string())));
        store.expect_put().never();

        let mut encoder = Encoder::new(store).unwrap();
        let err = encoder.encode_state(&CompositionState::Sink).unwrap_err();
        assert!(matches!(err, CompositionError::IdCollision { id: 0, .. }));
    }

    #[test]
    fn test_store_failure_is_propagated() {
        let mut store = MockKeyStore::new();
        store.expect_next_id().returning(|| Ok(0));
        store.expect_get().returning(|_| {
            Err(CompositionError::KeyStore {
                store: "ids".to_string(),
                message: "connection refused".to_string(),
            })
        });

        let mut encoder = Encoder::new(store).unwrap();
        let err = encoder.encode_action(&ActionId::Initial).unwrap_err();
        assert!(matches!(err, CompositionError::KeyStore { .. }));
    }

    #[test]
    fn test_reopened_store_continues_after_bound_ids() {
        let mut first = Encoder::in_memory();
        first.encode_state(&CompositionState::Sink).unwrap();
        first.encode_action(&ActionId::Undefined).unwrap();

        let mut reopened = Encoder::new(first.into_store()).unwrap();
        assert_eq!(reopened.assigned(), 2);
        assert_eq!(reopened.encode_state(&CompositionState::Sink).unwrap(), 0);
        assert_eq!(reopened.encode_action(&ActionId::Initial).unwrap(), 2);
        assert_eq!(reopened.store().len(), 3);
    }

    #[test]
    fn test_resume_point_comes_from_store() {
        let mut store = MockKeyStore::new();
        store.expect_next_id().returning(|| Ok(7));
        store.expect_get().returning(|_| Ok(None));
        store.expect_reverse().with(eq(7)).returning(|_| Ok(None));
        store
            .expect_put()
            .withf(|key, id| key.to_string() == "s:\"sink\"" && *id == 7)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut encoder = Encoder::new(store).unwrap();
        assert_eq!(encoder.encode_state(&CompositionState::Sink).unwrap(), 7);
        assert_eq!(encoder.assigned(), 8);
    }
}
