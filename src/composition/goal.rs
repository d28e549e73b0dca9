// Copyright 2025 Cowboy AI, LLC.

//! Product with a goal automaton
//!
//! Every service must contribute exactly one symbol of the goal alphabet.
//! In a given automaton state only the services whose symbol is enabled may
//! act; their moves on symbols outside the alphabet are internal steps that
//! leave the automaton where it is. Reaching an accepting state earns 1.

use super::engine::{DeadEnd, ProductStrategy, Seeding, Step};
use super::{ActionId, CompositionState};
use crate::config::{CompositionConfig, SeedStrategy};
use crate::errors::{CompositionError, CompositionResult};
use crate::goal::GoalAutomaton;
use crate::identifiers::{ServiceIndex, StateId, Symbol};
use crate::service::Service;
use crate::system_service::{SystemAction, SystemService, SystemState, SystemTransition, SystemTransitions};
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

/// Reward for entering an accepting state
const ACCEPT_REWARD: f64 = 1.0;

/// [`ProductStrategy`] for a [`GoalAutomaton`]
#[derive(Debug, Clone)]
pub struct GoalStrategy {
    automaton: GoalAutomaton,
    allowed: IndexMap<StateId, IndexSet<ServiceIndex>>,
}

impl GoalStrategy {
    /// Prepare the automaton and check the one-symbol-per-service rule
    ///
    /// With `trim` set, states that are unreachable or cannot reach an
    /// accepting state are removed first.
    pub fn new(automaton: &GoalAutomaton, services: &[Service], trim: bool) -> CompositionResult<Self> {
        let service_symbols = services
            .iter()
            .map(|service| goal_symbol(automaton, service))
            .collect::<CompositionResult<Vec<Symbol>>>()?;

        let automaton = if trim {
            let trimmed = automaton.trim();
            debug!(
                before = automaton.states().len(),
                after = trimmed.states().len(),
                "trimmed goal automaton"
            );
            trimmed
        } else {
            automaton.clone()
        };

        let allowed = automaton
            .states()
            .iter()
            .map(|state| {
                let enabled: IndexSet<&Symbol> = automaton.enabled_symbols(state).collect();
                let services = service_symbols
                    .iter()
                    .enumerate()
                    .filter(|(_, symbol)| enabled.contains(symbol))
                    .map(|(index, _)| index)
                    .collect();
                (state.clone(), services)
            })
            .collect();

        Ok(Self { automaton, allowed })
    }

    /// Automaton driving the composition, after trimming
    pub fn automaton(&self) -> &GoalAutomaton {
        &self.automaton
    }

    /// Services allowed to act in automaton state `state`
    pub fn allowed_services(&self, state: &StateId) -> Option<&IndexSet<ServiceIndex>> {
        self.allowed.get(state)
    }
}

fn goal_symbol(automaton: &GoalAutomaton, service: &Service) -> CompositionResult<Symbol> {
    let shared: Vec<&Symbol> = service
        .actions()
        .iter()
        .filter(|symbol| automaton.in_alphabet(symbol))
        .collect();
    match shared.as_slice() {
        [symbol] => Ok((*symbol).clone()),
        [] => Err(CompositionError::UnusableService {
            service: service.name().to_string(),
        }),
        _ => Err(CompositionError::AmbiguousServiceSymbols {
            service: service.name().to_string(),
            symbols: shared.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

impl ProductStrategy for GoalStrategy {
    type Component = StateId;

    fn name(&self) -> &'static str {
        "goal_automaton"
    }

    fn seeds(&self, system: &SystemService, config: &CompositionConfig) -> CompositionResult<Seeding<StateId>> {
        let initial = self.automaton.initial_state();
        let mut roots = vec![(system.initial_state().clone(), initial.clone())];
        if let SeedStrategy::IdleConfigurations { idle_states } = &config.seed {
            let configurations = system.idle_configurations(idle_states, config.max_states)?;
            debug!(configurations = configurations.len(), "seeding from idle configurations");
            roots.extend(configurations.into_iter().map(|c| (c, initial.clone())));
        }
        Ok(Seeding::Roots(roots))
    }

    fn candidates<'t>(
        &self,
        component: &StateId,
        transitions: &'t SystemTransitions,
    ) -> Vec<(&'t SystemAction, &'t SystemTransition)> {
        let Some(allowed) = self.allowed.get(component) else {
            return Vec::new();
        };
        transitions
            .iter()
            .filter(|(action, _)| allowed.contains(&action.service))
            .collect()
    }

    fn advance(&self, component: &StateId, action: &SystemAction) -> Step<StateId> {
        if !self.automaton.in_alphabet(&action.symbol) {
            return Step::Advance {
                next: vec![(component.clone(), 1.0)],
                reward: 0.0,
            };
        }
        match self.automaton.transition(component, &action.symbol) {
            Some(next) => {
                let reward = if self.automaton.is_accepting(next) {
                    ACCEPT_REWARD
                } else {
                    0.0
                };
                Step::Advance {
                    next: vec![(next.clone(), 1.0)],
                    reward,
                }
            }
            None => Step::Skip,
        }
    }

    fn action_id(&self, action: &SystemAction) -> ActionId {
        ActionId::Invoke(action.clone())
    }

    fn state(&self, system: SystemState, automaton: StateId) -> CompositionState {
        CompositionState::Goal { system, automaton }
    }

    fn dead_end(&self) -> DeadEnd {
        DeadEnd::Sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::engine::explore;
    use crate::composition::MdpTransition;
    use pretty_assertions::assert_eq;

    fn ids(labels: &[&str]) -> Vec<StateId> {
        labels.iter().map(|l| StateId::new(l)).collect()
    }

    /// `q0 --pick--> q1 --drill--> q2`, with `q2` accepting
    fn pick_then_drill() -> GoalAutomaton {
        let mut transitions = IndexMap::new();
        let mut q0 = IndexMap::new();
        q0.insert(Symbol::new("pick"), StateId::new("q1"));
        transitions.insert(StateId::new("q0"), q0);
        let mut q1 = IndexMap::new();
        q1.insert(Symbol::new("drill"), StateId::new("q2"));
        transitions.insert(StateId::new("q1"), q1);
        GoalAutomaton::new(
            ids(&["q0", "q1", "q2"]),
            "q0",
            [Symbol::new("pick"), Symbol::new("drill")],
            transitions,
            ids(&["q2"]),
        )
        .unwrap()
    }

    fn goal(system: &[&str], automaton: &str) -> CompositionState {
        CompositionState::Goal {
            system: SystemState::new(ids(system)),
            automaton: automaton.into(),
        }
    }

    fn invoke(symbol: &str, service: ServiceIndex) -> ActionId {
        ActionId::Invoke(SystemAction {
            symbol: symbol.into(),
            service,
        })
    }

    #[test]
    fn test_service_with_two_goal_symbols_is_rejected() {
        let services = vec![Service::one_state("both", ["pick", "drill"], -1.0).unwrap()];
        let err = GoalStrategy::new(&pick_then_drill(), &services, true).unwrap_err();
        assert_eq!(
            err,
            CompositionError::AmbiguousServiceSymbols {
                service: "both".to_string(),
                symbols: vec!["pick".to_string(), "drill".to_string()],
            }
        );
    }

    #[test]
    fn test_service_without_goal_symbol_is_rejected() {
        let services = vec![Service::one_state("welder", ["weld"], -1.0).unwrap()];
        let err = GoalStrategy::new(&pick_then_drill(), &services, true).unwrap_err();
        assert!(matches!(err, CompositionError::UnusableService { .. }));
    }

    #[test]
    fn test_allowed_services_follow_enabled_symbols() {
        let services = vec![
            Service::one_state("picker", ["pick"], -1.0).unwrap(),
            Service::one_state("driller", ["drill"], -1.0).unwrap(),
        ];
        let strategy = GoalStrategy::new(&pick_then_drill(), &services, false).unwrap();
        assert_eq!(
            strategy.allowed_services(&"q0".into()).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![0]
        );
        assert_eq!(
            strategy.allowed_services(&"q1".into()).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![1]
        );
        assert!(strategy.allowed_services(&"q2".into()).unwrap().is_empty());
    }

    #[test]
    fn test_accepting_step_is_rewarded_and_end_goes_to_sink() {
        let services = vec![
            Service::one_state("picker", ["pick"], -1.0).unwrap(),
            Service::one_state("driller", ["drill"], -2.0).unwrap(),
        ];
        let strategy = GoalStrategy::new(&pick_then_drill(), &services, true).unwrap();
        let mut system = SystemService::compose(services).unwrap();
        let mdp = explore(&strategy, &mut system, &CompositionConfig::default()).unwrap();

        let start = goal(&["ready", "ready"], "q0");
        assert_eq!(mdp.initial_state(), &start);

        let pick = mdp.transition(&start, &invoke("pick", 0)).unwrap();
        assert_eq!(pick.reward, -1.0);
        let drill = mdp
            .transition(&goal(&["ready", "ready"], "q1"), &invoke("drill", 1))
            .unwrap();
        assert_eq!(drill.reward, 1.0 - 2.0);

        let accepted = goal(&["ready", "ready"], "q2");
        assert_eq!(
            mdp.transition(&accepted, &ActionId::Undefined),
            Some(&MdpTransition::certain(CompositionState::Sink))
        );
        assert_eq!(
            mdp.transition(&CompositionState::Sink, &ActionId::Undefined),
            Some(&MdpTransition::certain(CompositionState::Sink))
        );
        assert_eq!(mdp.state_count(), 4);
        mdp.validate().unwrap();
    }

    #[test]
    fn test_symbols_outside_alphabet_are_internal_steps() {
        let services = vec![
            Service::breakable("picker", "pick", 0.5, -5.0, -1.0).unwrap(),
            Service::one_state("driller", ["drill"], -1.0).unwrap(),
        ];
        let strategy = GoalStrategy::new(&pick_then_drill(), &services, true).unwrap();
        let mut system = SystemService::compose(services).unwrap();
        let mdp = explore(&strategy, &mut system, &CompositionConfig::default()).unwrap();

        // the picker is no longer allowed once pick was taken, so its check
        // step is never offered from q1
        let after_pick = goal(&["broken", "ready"], "q1");
        let row = mdp.actions_at(&after_pick).unwrap();
        assert_eq!(row.keys().cloned().collect::<Vec<_>>(), vec![invoke("drill", 1)]);

        let idle_seeded = CompositionConfig {
            seed: SeedStrategy::idle(["available", "broken", "ready"]),
            ..CompositionConfig::default()
        };
        let mut system = SystemService::compose(vec![
            Service::breakable("picker", "pick", 0.5, -5.0, -1.0).unwrap(),
            Service::one_state("driller", ["drill"], -1.0).unwrap(),
        ])
        .unwrap();
        let mdp = explore(&strategy, &mut system, &idle_seeded).unwrap();

        let broken_start = goal(&["broken", "ready"], "q0");
        let check = mdp.transition(&broken_start, &invoke("check_pick", 0)).unwrap();
        assert_eq!(check.reward, -5.0);
        assert_eq!(check.outcomes.probability(&goal(&["available", "ready"], "q0")), 1.0);
        mdp.validate().unwrap();
    }
}
