// Copyright 2025 Cowboy AI, LLC.

//! Snapshots of composition MDPs for reuse across runs

use crate::composition::CompositionMdp;
use crate::errors::CompositionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;
use uuid::Uuid;

/// A composition MDP captured at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdpSnapshot {
    /// Snapshot identifier
    pub id: Uuid,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// The captured MDP
    pub mdp: CompositionMdp,
}

impl MdpSnapshot {
    /// Capture `mdp`
    pub fn new(mdp: CompositionMdp) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            mdp,
        }
    }

    /// Write the snapshot as JSON
    pub fn save<W: Write>(&self, writer: W) -> CompositionResult<()> {
        serde_json::to_writer(writer, self)?;
        debug!(snapshot_id = %self.id, states = self.mdp.state_count(), "Saved MDP snapshot");
        Ok(())
    }

    /// Read a snapshot written by [`MdpSnapshot::save`]
    pub fn load<R: Read>(reader: R) -> CompositionResult<Self> {
        let snapshot: Self = serde_json::from_reader(reader)?;
        debug!(snapshot_id = %snapshot.id, "Loaded MDP snapshot");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::CompositionEngine;
    use crate::errors::CompositionError;
    use crate::goal::GoalAutomaton;
    use crate::identifiers::{StateId, Symbol};
    use crate::service::Service;
    use indexmap::IndexMap;

    #[test]
    fn test_save_then_load_gives_same_mdp() {
        let mut transitions = IndexMap::new();
        let mut row = IndexMap::new();
        row.insert(Symbol::new("pick"), StateId::new("done"));
        transitions.insert(StateId::new("start"), row);
        let automaton = GoalAutomaton::new(
            [StateId::new("start"), StateId::new("done")],
            "start",
            [Symbol::new("pick")],
            transitions,
            [StateId::new("done")],
        )
        .unwrap();
        let services = vec![Service::breakable("picker", "pick", 0.2, -4.0, -1.0).unwrap()];
        let mdp = CompositionEngine::default()
            .compose_goal(&automaton, &services)
            .unwrap();

        let snapshot = MdpSnapshot::new(mdp);
        let mut buffer = Vec::new();
        snapshot.save(&mut buffer).unwrap();
        let loaded = MdpSnapshot::load(buffer.as_slice()).unwrap();

        assert_eq!(loaded, snapshot);
        loaded.mdp.validate().unwrap();
    }

    #[test]
    fn test_load_rejects_garbage() {
        let err = MdpSnapshot::load("{\"id\": 3}".as_bytes()).unwrap_err();
        assert!(matches!(err, CompositionError::Serialization(_)));
    }
}
