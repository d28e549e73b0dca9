// Copyright 2025 Cowboy AI, LLC.

//! Finite probability distributions
//!
//! A [`Distribution`] is an insertion-ordered map from outcomes to strictly
//! positive probabilities. Distributions handed in by callers go through
//! [`Distribution::validated`]; distributions produced by the composer are
//! built with [`Distribution::accumulate`] from already validated inputs.

use crate::errors::{CompositionError, CompositionResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Tolerance applied when checking that probabilities sum to one
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Where a distribution comes from, used to report validation failures
#[derive(Debug, Clone, Copy)]
pub struct DistributionSite<'a> {
    /// Owning component (service name, `target`, ...)
    pub component: &'a str,
    /// State the distribution hangs off
    pub state: &'a str,
    /// Action or policy label
    pub action: &'a str,
}

impl DistributionSite<'_> {
    fn error(&self, reason: impl Into<String>) -> CompositionError {
        CompositionError::invalid_distribution(self.component, self.state, self.action, reason)
    }
}

/// Probability distribution over a finite set of outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize + Hash + Eq",
    deserialize = "T: Deserialize<'de> + Hash + Eq"
))]
pub struct Distribution<T: Hash + Eq> {
    #[serde(with = "indexmap::map::serde_seq")]
    outcomes: IndexMap<T, f64>,
}

impl<T: Hash + Eq> Distribution<T> {
    /// Empty distribution, to be filled with [`Distribution::accumulate`]
    pub fn empty() -> Self {
        Self {
            outcomes: IndexMap::new(),
        }
    }

    /// Point mass on a single outcome
    pub fn certain(outcome: T) -> Self {
        let mut outcomes = IndexMap::with_capacity(1);
        outcomes.insert(outcome, 1.0);
        Self { outcomes }
    }

    /// Build a distribution from caller-supplied pairs
    ///
    /// Zero-probability outcomes are dropped, negative or non-finite ones are
    /// rejected, and the remaining mass must sum to one within
    /// [`PROBABILITY_TOLERANCE`]. Repeated outcomes have their mass added.
    pub fn validated(
        pairs: impl IntoIterator<Item = (T, f64)>,
        site: DistributionSite<'_>,
    ) -> CompositionResult<Self> {
        let mut outcomes: IndexMap<T, f64> = IndexMap::new();
        for (outcome, probability) in pairs {
            if !probability.is_finite() || probability < 0.0 {
                return Err(site.error(format!("probability {probability} is not in [0, 1]")));
            }
            if probability == 0.0 {
                continue;
            }
            *outcomes.entry(outcome).or_insert(0.0) += probability;
        }

        if outcomes.is_empty() {
            return Err(site.error("distribution has no outcome with positive probability"));
        }

        let total: f64 = outcomes.values().sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(site.error(format!("probabilities sum to {total}")));
        }

        Ok(Self { outcomes })
    }

    /// Add probability mass to an outcome; non-positive mass is ignored
    pub fn accumulate(&mut self, outcome: T, probability: f64) {
        if probability > 0.0 {
            *self.outcomes.entry(outcome).or_insert(0.0) += probability;
        }
    }

    /// Probability of an outcome (zero when absent)
    pub fn probability(&self, outcome: &T) -> f64 {
        self.outcomes.get(outcome).copied().unwrap_or(0.0)
    }

    /// Iterate over `(outcome, probability)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> + '_ {
        self.outcomes.iter().map(|(outcome, p)| (outcome, *p))
    }

    /// Iterate over the outcomes
    pub fn support(&self) -> impl Iterator<Item = &T> + '_ {
        self.outcomes.keys()
    }

    /// Total probability mass
    pub fn total(&self) -> f64 {
        self.outcomes.values().sum()
    }

    /// Number of outcomes with positive probability
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the distribution has no outcome
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whether the mass sums to one within `tolerance` and every entry is positive
    pub fn is_stochastic(&self, tolerance: f64) -> bool {
        !self.outcomes.is_empty()
            && self.outcomes.values().all(|p| *p > 0.0)
            && (self.total() - 1.0).abs() <= tolerance
    }

    /// Map outcomes, merging mass of outcomes that collapse together
    pub fn map<U: Hash + Eq>(&self, mut f: impl FnMut(&T) -> U) -> Distribution<U> {
        let mut mapped = Distribution::empty();
        for (outcome, probability) in self.iter() {
            mapped.accumulate(f(outcome), probability);
        }
        mapped
    }
}
