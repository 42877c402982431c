//! The durable memory document, the only state that survives between ticks.
//!
//! The host persists one [`MemoryStore`] and hands it back unchanged at the
//! start of the next tick. Everything in here is plain data: identifiers,
//! coordinates, enum tags. Live handles are re-resolved every tick.
//!
//! # Schema
//!
//! ```text
//! {
//!   "version": 1,
//!   "agents":   { "<agent id>":    AgentRecord },
//!   "missions": { "<target room>": MissionRecord },
//!   "routes":   { "<route key>":   CachedRoute }
//! }
//! ```
//!
//! The JSON layout is the compatibility contract: keys are camelCase and
//! every field added after version 1 carries `#[serde(default)]`, so older
//! documents keep loading. Loading is tolerant per record: one corrupt
//! agent record never takes the whole document down with it.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::behavior::BehaviorState;
use crate::geometry::{Position, RoomName};
use crate::mission::{MissionPhase, MissionRecord};
use crate::route::CachedRoute;
use crate::world::{AgentView, ObjectId};

/// Current schema version written by [`MemoryStore::to_json`].
pub const MEMORY_VERSION: u32 = 1;

/// Errors loading or saving the memory document.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("memory version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

// ============================================================================
// AGENT RECORD
// ============================================================================

/// Per-agent durable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Selects the behavior in the role registry.
    pub role_tag: String,
    #[serde(default)]
    pub behavior_state: BehaviorState,
    /// Last acquisition source, trusted while still valid.
    #[serde(default)]
    pub remembered_source_ref: Option<ObjectId>,
    /// Last work target, trusted while still valid.
    #[serde(default)]
    pub remembered_target_ref: Option<ObjectId>,
    /// Walk here before entering the work cycle.
    #[serde(default)]
    pub approach_position: Option<Position>,
    #[serde(default)]
    pub home_room: Option<RoomName>,
    /// Target room of the mission this agent serves.
    #[serde(default)]
    pub mission_room: Option<RoomName>,
    /// Phase the agent was spawned for.
    #[serde(default)]
    pub mission_phase: Option<MissionPhase>,
}

impl AgentRecord {
    /// A fresh record for a local agent.
    pub fn new(role_tag: impl Into<String>) -> Self {
        Self {
            role_tag: role_tag.into(),
            behavior_state: BehaviorState::Idle,
            remembered_source_ref: None,
            remembered_target_ref: None,
            approach_position: None,
            home_room: None,
            mission_room: None,
            mission_phase: None,
        }
    }

    /// A fresh record for an agent spawned for a mission phase. It starts in
    /// INITIAL and walks to the mission room before working.
    pub fn for_mission(
        role_tag: impl Into<String>,
        home: &RoomName,
        target: &RoomName,
        phase: MissionPhase,
    ) -> Self {
        Self {
            behavior_state: BehaviorState::Initial,
            approach_position: Some(Position::center_of(target)),
            home_room: Some(home.clone()),
            mission_room: Some(target.clone()),
            mission_phase: Some(phase),
            ..Self::new(role_tag)
        }
    }

    /// Room the agent does its job in: the mission room, else the home
    /// room, else wherever it stands.
    pub fn work_room(&self, agent: &AgentView) -> RoomName {
        self.mission_room
            .as_ref()
            .or(self.home_room.as_ref())
            .cloned()
            .unwrap_or_else(|| agent.pos.room.clone())
    }

    /// Forget both remembered targets.
    pub fn forget_targets(&mut self) {
        self.remembered_source_ref = None;
        self.remembered_target_ref = None;
    }
}

// ============================================================================
// STORE
// ============================================================================

/// The whole durable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStore {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub agents: BTreeMap<ObjectId, AgentRecord>,
    /// Keyed by target room: at most one mission per target.
    #[serde(default)]
    pub missions: BTreeMap<RoomName, MissionRecord>,
    #[serde(default)]
    pub routes: BTreeMap<String, CachedRoute>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            version: MEMORY_VERSION,
            agents: BTreeMap::new(),
            missions: BTreeMap::new(),
            routes: BTreeMap::new(),
        }
    }
}

/// Loosely-typed mirror of [`MemoryStore`] used to decode record by record.
#[derive(Deserialize)]
struct RawStore {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    agents: BTreeMap<ObjectId, serde_json::Value>,
    #[serde(default)]
    missions: BTreeMap<RoomName, serde_json::Value>,
    #[serde(default)]
    routes: BTreeMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the document. An empty string is an empty store.
    ///
    /// Undecodable agent records are reset to a fresh record for the same
    /// role (or dropped if even the role tag is unreadable); undecodable
    /// missions and routes are dropped. Each case logs a warning.
    pub fn from_json(json: &str) -> Result<Self, MemoryError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawStore = serde_json::from_str(json)?;
        if raw.version > MEMORY_VERSION {
            return Err(MemoryError::UnsupportedVersion {
                found: raw.version,
                supported: MEMORY_VERSION,
            });
        }

        let mut store = Self::default();
        for (id, value) in raw.agents {
            match serde_json::from_value::<AgentRecord>(value.clone()) {
                Ok(record) => {
                    store.agents.insert(id, record);
                }
                Err(e) => match value.get("roleTag").and_then(|v| v.as_str()) {
                    Some(role) => {
                        warn!("agent {}: resetting unreadable record ({})", id, e);
                        store.agents.insert(id, AgentRecord::new(role));
                    }
                    None => warn!("agent {}: dropping record without role tag ({})", id, e),
                },
            }
        }
        for (room, value) in raw.missions {
            match serde_json::from_value::<MissionRecord>(value) {
                Ok(mission) => {
                    store.missions.insert(room, mission);
                }
                Err(e) => warn!("mission {}: dropping unreadable record ({})", room, e),
            }
        }
        for (key, value) in raw.routes {
            if let Ok(route) = serde_json::from_value::<CachedRoute>(value) {
                store.routes.insert(key, route);
            }
        }
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String, MemoryError> {
        let mut out = self.clone();
        out.version = MEMORY_VERSION;
        Ok(serde_json::to_string(&out)?)
    }

    pub fn agent(&self, id: &ObjectId) -> Option<&AgentRecord> {
        self.agents.get(id)
    }

    pub fn agent_mut(&mut self, id: &ObjectId) -> Option<&mut AgentRecord> {
        self.agents.get_mut(id)
    }

    /// Drop records of agents the host no longer has. Returns the ids removed.
    pub fn retain_agents(&mut self, live: &BTreeSet<ObjectId>) -> Vec<ObjectId> {
        let dead: Vec<ObjectId> = self
            .agents
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        for id in &dead {
            self.agents.remove(id);
        }
        dead
    }
}
