// Copyright 2025 Cowboy AI, LLC.

//! Goal automata: deterministic finite automata over the service alphabet
//!
//! Goal automata are normally produced from a temporal formula by an
//! external compiler, reached through the [`FormulaCompiler`] seam. The
//! composer only reads them.

use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::{StateId, Symbol};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const COMPONENT: &str = "goal automaton";

/// Deterministic finite automaton with accepting states
///
/// The transition function is partial: a symbol without an entry is not
/// enabled in that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalAutomaton {
    states: IndexSet<StateId>,
    initial_state: StateId,
    alphabet: IndexSet<Symbol>,
    transitions: IndexMap<StateId, IndexMap<Symbol, StateId>>,
    accepting: IndexSet<StateId>,
}

impl GoalAutomaton {
    /// Build and validate a goal automaton
    ///
    /// Every state mentioned by the initial state, the transitions or the
    /// accepting set must be declared, and every transition symbol must
    /// belong to the alphabet.
    pub fn new(
        states: impl IntoIterator<Item = StateId>,
        initial_state: impl Into<StateId>,
        alphabet: impl IntoIterator<Item = Symbol>,
        transitions: IndexMap<StateId, IndexMap<Symbol, StateId>>,
        accepting: impl IntoIterator<Item = StateId>,
    ) -> CompositionResult<Self> {
        let states: IndexSet<StateId> = states.into_iter().collect();
        let initial_state = initial_state.into();
        let alphabet: IndexSet<Symbol> = alphabet.into_iter().collect();
        let accepting: IndexSet<StateId> = accepting.into_iter().collect();

        let unknown = |state: &StateId| CompositionError::UnknownState {
            component: COMPONENT.to_string(),
            state: state.to_string(),
        };

        if !states.contains(&initial_state) {
            return Err(unknown(&initial_state));
        }
        for (from, row) in &transitions {
            if !states.contains(from) {
                return Err(unknown(from));
            }
            for (symbol, to) in row {
                if !states.contains(to) {
                    return Err(unknown(to));
                }
                if !alphabet.contains(symbol) {
                    return Err(CompositionError::InvalidConfiguration(format!(
                        "{COMPONENT} transition {from} --{symbol}--> {to} uses a symbol outside its alphabet"
                    )));
                }
            }
        }
        if let Some(state) = accepting.iter().find(|s| !states.contains(*s)) {
            return Err(unknown(state));
        }

        Ok(Self {
            states,
            initial_state,
            alphabet,
            transitions,
            accepting,
        })
    }

    /// All states
    pub fn states(&self) -> &IndexSet<StateId> {
        &self.states
    }

    /// Initial state
    pub fn initial_state(&self) -> &StateId {
        &self.initial_state
    }

    /// Alphabet
    pub fn alphabet(&self) -> &IndexSet<Symbol> {
        &self.alphabet
    }

    /// Accepting states
    pub fn accepting(&self) -> &IndexSet<StateId> {
        &self.accepting
    }

    /// Whether `state` is accepting
    pub fn is_accepting(&self, state: &StateId) -> bool {
        self.accepting.contains(state)
    }

    /// Whether `symbol` belongs to the alphabet
    pub fn in_alphabet(&self, symbol: &Symbol) -> bool {
        self.alphabet.contains(symbol)
    }

    /// Successor of `state` on `symbol`, if enabled
    pub fn transition(&self, state: &StateId, symbol: &Symbol) -> Option<&StateId> {
        self.transitions.get(state).and_then(|row| row.get(symbol))
    }

    /// Symbols enabled in `state`
    pub fn enabled_symbols<'a>(&'a self, state: &StateId) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.transitions
            .get(state)
            .into_iter()
            .flat_map(|row| row.keys())
    }

    /// Whether `state` has at least one outgoing transition
    pub fn has_transitions(&self, state: &StateId) -> bool {
        self.transitions.get(state).is_some_and(|row| !row.is_empty())
    }

    /// Remove useless states
    ///
    /// Keeps the states that are reachable from the initial state and can
    /// still reach an accepting state, along with the transitions between
    /// them. The initial state is always kept.
    pub fn trim(&self) -> Self {
        let reachable = self.reachable_from_initial();
        let productive = self.productive();

        let keep = |state: &StateId| {
            state == &self.initial_state || (reachable.contains(state) && productive.contains(state))
        };

        let states: IndexSet<StateId> = self.states.iter().filter(|s| keep(s)).cloned().collect();
        let transitions = self
            .transitions
            .iter()
            .filter(|(from, _)| keep(from))
            .map(|(from, row)| {
                let row: IndexMap<Symbol, StateId> = row
                    .iter()
                    .filter(|(_, to)| keep(to))
                    .map(|(symbol, to)| (symbol.clone(), to.clone()))
                    .collect();
                (from.clone(), row)
            })
            .filter(|(_, row)| !row.is_empty())
            .collect();
        let accepting = self.accepting.iter().filter(|s| keep(s)).cloned().collect();

        Self {
            states,
            initial_state: self.initial_state.clone(),
            alphabet: self.alphabet.clone(),
            transitions,
            accepting,
        }
    }

    fn reachable_from_initial(&self) -> IndexSet<StateId> {
        let mut seen = IndexSet::new();
        let mut queue = VecDeque::new();
        seen.insert(self.initial_state.clone());
        queue.push_back(self.initial_state.clone());
        while let Some(state) = queue.pop_front() {
            for next in self.transitions.get(&state).into_iter().flat_map(|row| row.values()) {
                if seen.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }
        seen
    }

    fn productive(&self) -> IndexSet<StateId> {
        let mut predecessors: IndexMap<&StateId, Vec<&StateId>> = IndexMap::new();
        for (from, row) in &self.transitions {
            for to in row.values() {
                predecessors.entry(to).or_default().push(from);
            }
        }

        let mut seen: IndexSet<StateId> = self.accepting.clone();
        let mut queue: VecDeque<&StateId> = self.accepting.iter().collect();
        while let Some(state) = queue.pop_front() {
            for pred in predecessors.get(state).into_iter().flatten() {
                if seen.insert((*pred).clone()) {
                    queue.push_back(*pred);
                }
            }
        }
        seen
    }
}

/// Contract of the external formula-to-automaton compiler
///
/// Given a temporal formula over a declared finite alphabet, the compiler
/// returns the equivalent goal automaton or reports why it cannot.
#[cfg_attr(test, mockall::automock)]
pub trait FormulaCompiler {
    /// Compile `formula` over `alphabet`
    fn compile(&self, formula: &str, alphabet: &IndexSet<Symbol>) -> Result<GoalAutomaton, String>;
}

/// Run the compiler, surfacing its failure verbatim
pub fn compile_goal(
    compiler: &dyn FormulaCompiler,
    formula: &str,
    alphabet: &IndexSet<Symbol>,
) -> CompositionResult<GoalAutomaton> {
    compiler
        .compile(formula, alphabet)
        .map_err(|message| CompositionError::Compiler {
            formula: formula.to_string(),
            message,
        })
}
