// Copyright 2025 Cowboy AI, LLC.

//! Product with a policy-driven target
//!
//! A composite state carries the symbol the target's policy picked next.
//! Each service able to execute that symbol is one MDP action; the target
//! then moves deterministically and draws its next symbol.

use super::engine::{DeadEnd, ProductStrategy, Seeding, Step};
use super::{ActionId, CompositionState};
use crate::config::CompositionConfig;
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::{StateId, Symbol};
use crate::service::Service;
use crate::system_service::{SystemAction, SystemService, SystemState, SystemTransition, SystemTransitions};
use crate::target::StochasticTarget;

/// Target side of a composite state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StochasticComponent {
    /// Current target state
    pub target: StateId,
    /// Symbol drawn by the policy; `None` in a terminal target state
    pub pending: Option<Symbol>,
}

/// [`ProductStrategy`] for a [`StochasticTarget`]
#[derive(Debug, Clone)]
pub struct StochasticStrategy<'a> {
    target: &'a StochasticTarget,
}

impl<'a> StochasticStrategy<'a> {
    /// Check that every service can serve the target at all
    pub fn new(target: &'a StochasticTarget, services: &[Service]) -> CompositionResult<Self> {
        let alphabet = target.alphabet();
        if let Some(unusable) = services
            .iter()
            .find(|s| !s.actions().iter().any(|symbol| alphabet.contains(symbol)))
        {
            return Err(CompositionError::UnusableService {
                service: unusable.name().to_string(),
            });
        }
        Ok(Self { target })
    }

    /// Components reached once the target is in `state`
    fn draws(&self, state: &StateId) -> Vec<(StochasticComponent, f64)> {
        match self.target.policy(state) {
            Some(policy) => policy
                .iter()
                .map(|(symbol, p)| {
                    let component = StochasticComponent {
                        target: state.clone(),
                        pending: Some(symbol.clone()),
                    };
                    (component, p)
                })
                .collect(),
            None => vec![(
                StochasticComponent {
                    target: state.clone(),
                    pending: None,
                },
                1.0,
            )],
        }
    }
}

impl ProductStrategy for StochasticStrategy<'_> {
    type Component = StochasticComponent;

    fn name(&self) -> &'static str {
        "stochastic_target"
    }

    fn seeds(&self, system: &SystemService, _config: &CompositionConfig) -> CompositionResult<Seeding<Self::Component>> {
        let initial = system.initial_state();
        Ok(Seeding::Virtual(
            self.draws(self.target.initial_state())
                .into_iter()
                .map(|(component, p)| (initial.clone(), component, p))
                .collect(),
        ))
    }

    fn candidates<'t>(
        &self,
        component: &Self::Component,
        transitions: &'t SystemTransitions,
    ) -> Vec<(&'t SystemAction, &'t SystemTransition)> {
        let Some(symbol) = &component.pending else {
            return Vec::new();
        };
        if !self.target.accepts(&component.target, symbol) {
            return Vec::new();
        }
        transitions
            .services_for(symbol)
            .iter()
            .filter_map(|service| transitions.edge(symbol, *service))
            .collect()
    }

    fn advance(&self, component: &Self::Component, action: &SystemAction) -> Step<Self::Component> {
        match self.target.transition(&component.target, &action.symbol) {
            Some(step) => Step::Advance {
                next: self.draws(&step.next_state),
                reward: step.reward,
            },
            None => Step::Skip,
        }
    }

    fn action_id(&self, action: &SystemAction) -> ActionId {
        ActionId::Service(action.service)
    }

    fn state(&self, system: SystemState, component: Self::Component) -> CompositionState {
        CompositionState::Pending {
            system,
            target: component.target,
            symbol: component.pending,
        }
    }

    fn dead_end(&self) -> DeadEnd {
        DeadEnd::SelfLoop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::engine::explore;
    use crate::composition::MdpTransition;
    use crate::distribution::Distribution;
    use pretty_assertions::assert_eq;

    fn system(labels: &[&str]) -> SystemState {
        SystemState::new(labels.iter().map(|l| StateId::new(l)))
    }

    fn pending(sys: &[&str], target: &str, symbol: Option<&str>) -> CompositionState {
        CompositionState::Pending {
            system: system(sys),
            target: target.into(),
            symbol: symbol.map(Symbol::new),
        }
    }

    #[test]
    fn test_unusable_service_is_rejected() {
        let target = StochasticTarget::builder()
            .initial_state("t0")
            .transition("t0", "pick", "t0", 1.0, 0.0)
            .build()
            .unwrap();
        let services = vec![
            Service::one_state("picker", ["pick"], -1.0).unwrap(),
            Service::one_state("welder", ["weld"], -1.0).unwrap(),
        ];
        let err = StochasticStrategy::new(&target, &services).unwrap_err();
        assert_eq!(
            err,
            CompositionError::UnusableService {
                service: "welder".to_string()
            }
        );
    }

    #[test]
    fn test_policy_branches_at_seed_and_after_each_step() {
        let target = StochasticTarget::builder()
            .initial_state("t0")
            .final_state("t1")
            .transition("t0", "a", "t1", 0.25, 0.0)
            .transition("t0", "b", "t1", 0.75, 0.0)
            .build()
            .unwrap();
        let services = vec![Service::one_state("s", ["a", "b"], -1.0).unwrap()];
        let strategy = StochasticStrategy::new(&target, &services).unwrap();
        let mut system_service = SystemService::compose(services).unwrap();

        let mdp = explore(&strategy, &mut system_service, &CompositionConfig::default()).unwrap();

        let initial = mdp
            .transition(&CompositionState::VirtualInitial, &ActionId::Initial)
            .unwrap();
        assert_eq!(initial.reward, 0.0);
        assert_eq!(initial.outcomes.probability(&pending(&["ready"], "t0", Some("a"))), 0.25);
        assert_eq!(initial.outcomes.probability(&pending(&["ready"], "t0", Some("b"))), 0.75);

        let done = pending(&["ready"], "t1", None);
        let from_a = mdp
            .transition(&pending(&["ready"], "t0", Some("a")), &ActionId::Service(0))
            .unwrap();
        assert_eq!(from_a.outcomes, Distribution::certain(done.clone()));
        assert_eq!(
            mdp.transition(&done, &ActionId::Undefined),
            Some(&MdpTransition::certain(done.clone()))
        );
        assert_eq!(mdp.state_count(), 4);
    }

    #[test]
    fn test_unexecutable_symbol_loops_on_undefined() {
        let target = StochasticTarget::builder()
            .initial_state("t0")
            .transition("t0", "pick", "t1", 1.0, 0.0)
            .transition("t1", "drop", "t0", 1.0, 0.0)
            .build()
            .unwrap();
        let services = vec![Service::breakable("picker", "pick", 0.0, 0.0, -1.0).unwrap()];
        let strategy = StochasticStrategy::new(&target, &services).unwrap();
        let mut system_service = SystemService::compose(services).unwrap();

        let mdp = explore(&strategy, &mut system_service, &CompositionConfig::default()).unwrap();

        let stuck = pending(&["done"], "t1", Some("drop"));
        let row = mdp.actions_at(&stuck).unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row[&ActionId::Undefined], MdpTransition::certain(stuck.clone()));
        mdp.validate().unwrap();
    }
}
