// Copyright 2025 Cowboy AI, LLC.

//! Identifier types for service states and symbols
//!
//! Both identifiers wrap a shared string so that cloning them while building
//! composite states is a reference-count bump rather than an allocation.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Position of a service inside the community handed to the composer
pub type ServiceIndex = usize;

/// State identifier, local to one service, target or goal automaton
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(Arc<str>);

impl StateId {
    /// Create a state identifier from its label
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(Arc::from(label.as_ref()))
    }

    /// Get the label
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateId {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for StateId {
    fn from(label: String) -> Self {
        Self(Arc::from(label))
    }
}

impl Borrow<str> for StateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Atomic operation label shared by services, targets and goal automata
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Create a symbol from its label
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(Arc::from(label.as_ref()))
    }

    /// Get the label
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Symbol {
    fn from(label: String) -> Self {
        Self(Arc::from(label))
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_structural_equality_and_hash() {
        let a = StateId::new("ready");
        let b = StateId::from("ready".to_string());
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(set.contains("ready"));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let symbol = Symbol::new("pick_wafer");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"pick_wafer\"");

        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, symbol);
        assert_eq!(back.to_string(), "pick_wafer");
    }
}
