// Copyright 2025 Cowboy AI, LLC.

//! Error types for composition operations

use thiserror::Error;

/// Errors that can occur while building services, targets and composition MDPs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    /// A transition or policy distribution is not a probability distribution
    #[error("Invalid distribution in {component} at state {state} for {action}: {reason}")]
    InvalidDistribution {
        /// Component that declared the distribution (service name, `target`, ...)
        component: String,
        /// State the distribution is attached to
        state: String,
        /// Action (or `policy`) the distribution is attached to
        action: String,
        /// What is wrong with it
        reason: String,
    },

    /// A state was referenced but never declared
    #[error("Unknown state in {component}: {state}")]
    UnknownState {
        /// Component that references the state
        component: String,
        /// The state that could not be resolved
        state: String,
    },

    /// The stochastic target may choose a symbol it cannot execute
    #[error("Target policy at state {state} chooses symbol {symbol} which has no transition")]
    UndefinedTargetTransition {
        /// Target state
        state: String,
        /// Symbol chosen by the policy
        symbol: String,
    },

    /// A service shares no symbol with the target alphabet
    #[error("Service {service} supports no symbol of the target alphabet")]
    UnusableService {
        /// Name of the service
        service: String,
    },

    /// Goal composition requires each service to support exactly one goal symbol
    #[error("Service {service} must support exactly one goal symbol, found {symbols:?}")]
    AmbiguousServiceSymbols {
        /// Name of the service
        service: String,
        /// Goal symbols the service supports
        symbols: Vec<String>,
    },

    /// Composition over an empty community
    #[error("Cannot compose an empty community of services")]
    EmptyCommunity,

    /// Discount factor outside `(0, 1]`
    #[error("Discount factor must lie in (0, 1], got {gamma}")]
    InvalidDiscount {
        /// The rejected discount factor
        gamma: f64,
    },

    /// Any other configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Exploration exceeded the configured state ceiling
    #[error("State space too large: more than {limit} composite states")]
    StateSpaceTooLarge {
        /// The configured ceiling
        limit: usize,
    },

    /// The external formula-to-automaton compiler failed
    #[error("Compiler failed on formula `{formula}`: {message}")]
    Compiler {
        /// Formula handed to the compiler
        formula: String,
        /// Error message from the compiler, verbatim
        message: String,
    },

    /// Two distinct keys were mapped to the same id
    #[error("Id collision: {id} is bound to {existing}, cannot bind {incoming}")]
    IdCollision {
        /// The contended id
        id: u64,
        /// Key already bound to the id
        existing: String,
        /// Key that tried to claim the id
        incoming: String,
    },

    /// The encoder ran out of ids
    #[error("Key space exhausted: capacity of {capacity} ids reached")]
    KeySpaceExhausted {
        /// Maximum number of ids
        capacity: u64,
    },

    /// The key-value store backing the encoder failed
    #[error("Key store error: {store} - {message}")]
    KeyStore {
        /// Name of the store
        store: String,
        /// Error message from the store
        message: String,
    },

    /// An id has no key bound to it
    #[error("Unknown id: {id}")]
    UnknownId {
        /// The id that could not be resolved
        id: u64,
    },

    /// A composition MDP violates a structural invariant
    #[error("Malformed MDP: {0}")]
    MalformedMdp(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for composition operations
pub type CompositionResult<T> = Result<T, CompositionError>;

impl From<serde_json::Error> for CompositionError {
    fn from(err: serde_json::Error) -> Self {
        CompositionError::Serialization(err.to_string())
    }
}

impl CompositionError {
    /// Build an [`CompositionError::InvalidDistribution`]
    pub fn invalid_distribution(
        component: impl Into<String>,
        state: impl Into<String>,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CompositionError::InvalidDistribution {
            component: component.into(),
            state: state.into(),
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error stems from bad input configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CompositionError::InvalidDistribution { .. }
                | CompositionError::UnknownState { .. }
                | CompositionError::UndefinedTargetTransition { .. }
                | CompositionError::UnusableService { .. }
                | CompositionError::AmbiguousServiceSymbols { .. }
                | CompositionError::EmptyCommunity
                | CompositionError::InvalidDiscount { .. }
                | CompositionError::InvalidConfiguration(_)
        )
    }

    /// Check if this error is a capacity limit
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            CompositionError::StateSpaceTooLarge { .. } | CompositionError::KeySpaceExhausted { .. }
        )
    }
}
