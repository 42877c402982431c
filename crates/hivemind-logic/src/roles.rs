//! Role registry and the concrete roles.
//!
//! Cycling roles are [`BehaviorFsm`]s assembled from the capabilities below;
//! mission roles that never carry energy ([`Scout`], [`Claimer`],
//! [`Invader`]) implement [`AgentBehavior`] directly and issue at most one
//! action per tick.
//!
//! | Role tag | Acquire from | Work on |
//! |----------|--------------|---------|
//! | `harvester` | [`HarvestNode`] | [`FillSinksOrUpgrade`] |
//! | `hauler` | [`Salvage`] | [`FillSinks`] |
//! | `upgrader` | [`EnergyPickup`] | [`UpgradeController`] |
//! | `builder` | [`EnergyPickup`] | [`BuildSites`] |
//! | `repairer` | [`EnergyPickup`] | [`RepairStructures`] |
//! | `pioneer_upgrader` | [`HarvestNode`] | [`UpgradeController`] |
//! | `pioneer_builder` | [`HarvestNode`] | [`BuildSites`] |

use std::collections::BTreeMap;

use crate::action::{Action, ActionKind};
use crate::behavior::{
    approach_step, AgentBehavior, BehaviorFsm, BehaviorState, DispatchReport, SourceCapability,
    WorkCapability,
};
use crate::config::EngineConfig;
use crate::geometry::{Position, RoomName};
use crate::memory::AgentRecord;
use crate::resolver;
use crate::world::{AgentView, Host, ObjectKind, Ownership, WorldObject, WorldView};

pub mod tags {
    pub const HARVESTER: &str = "harvester";
    pub const HAULER: &str = "hauler";
    pub const UPGRADER: &str = "upgrader";
    pub const BUILDER: &str = "builder";
    pub const REPAIRER: &str = "repairer";
    pub const PIONEER_UPGRADER: &str = "pioneer_upgrader";
    pub const PIONEER_BUILDER: &str = "pioneer_builder";
    pub const SCOUT: &str = "scout";
    pub const CLAIMER: &str = "claimer";
    pub const INVADER: &str = "invader";
}

// ============================================================================
// SOURCES
// ============================================================================

/// Harvest straight from a node with a free slot.
pub struct HarvestNode;

impl SourceCapability for HarvestNode {
    fn find<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::harvest_node(world, agent, room)
    }
}

/// Best-scored pickup of any kind.
pub struct EnergyPickup;

impl SourceCapability for EnergyPickup {
    fn find<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::energy_pickup(world, agent, room)
    }
}

/// Leftovers only: drops, remains, containers.
pub struct Salvage;

impl SourceCapability for Salvage {
    fn find<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::salvage(world, agent, room)
    }
}

// ============================================================================
// WORK
// ============================================================================

pub struct FillSinks;

impl WorkCapability for FillSinks {
    fn find<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::energy_sink(world, agent, room)
    }

    fn action(&self, target: &WorldObject) -> Action {
        Action::on(ActionKind::Transfer, target)
    }
}

/// Feed the spawner; once everything is full, pour the rest into the controller.
pub struct FillSinksOrUpgrade;

impl WorkCapability for FillSinksOrUpgrade {
    fn find<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::energy_sink(world, agent, room).or_else(|| resolver::owned_controller(world, room))
    }

    fn action(&self, target: &WorldObject) -> Action {
        match target.kind {
            ObjectKind::Controller => Action::on(ActionKind::Upgrade, target),
            _ => Action::on(ActionKind::Transfer, target),
        }
    }
}

pub struct UpgradeController;

impl WorkCapability for UpgradeController {
    fn find<V: WorldView + ?Sized>(&self, world: &V, _agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::owned_controller(world, room)
    }

    fn action(&self, target: &WorldObject) -> Action {
        Action::on(ActionKind::Upgrade, target)
    }

    fn has_work<V: WorldView + ?Sized>(&self, world: &V, _agent: &AgentView, room: &RoomName) -> bool {
        resolver::owned_controller(world, room).is_some()
    }
}

pub struct BuildSites;

impl WorkCapability for BuildSites {
    fn find<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::construction_site(world, agent, room)
    }

    fn action(&self, target: &WorldObject) -> Action {
        Action::on(ActionKind::Build, target)
    }

    fn has_work<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> bool {
        resolver::construction_site(world, agent, room).is_some()
    }
}

pub struct RepairStructures {
    pub wall_ceiling: u32,
}

impl WorkCapability for RepairStructures {
    fn find<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> Option<WorldObject> {
        resolver::repair_target(world, agent, room, self.wall_ceiling)
    }

    fn action(&self, target: &WorldObject) -> Action {
        Action::on(ActionKind::Repair, target)
    }

    fn has_work<V: WorldView + ?Sized>(&self, world: &V, agent: &AgentView, room: &RoomName) -> bool {
        resolver::repair_target(world, agent, room, self.wall_ceiling).is_some()
    }
}

// ============================================================================
// DIRECT MISSION ROLES
// ============================================================================

/// Tiles from the room centre a mission agent holds at.
const HOLD_RANGE: u32 = 5;

/// Run a single-action role: travel first, then whatever `act` picks.
/// An acting agent is WORKING, a waiting one IDLE, a travelling one INITIAL.
fn direct_dispatch<F>(host: &mut dyn Host, agent: &AgentView, record: &mut AgentRecord, act: F) -> DispatchReport
where
    F: FnOnce(&dyn Host, &RoomName) -> Option<Action>,
{
    let room = record.work_room(agent);
    let (action, state) = match approach_step(agent, record) {
        Some(travel) => (travel, BehaviorState::Initial),
        None => match act(&*host, &room) {
            Some(action) => (action, BehaviorState::Working),
            None => (Action::move_to(Position::center_of(&room), HOLD_RANGE), BehaviorState::Idle),
        },
    };
    record.behavior_state = state;
    let outcome = action.execute(&mut *host, agent);
    DispatchReport {
        state,
        action: action.kind(),
        outcome: Some(outcome),
        transitions: 0,
        halted: false,
    }
}

/// Walks to the mission room and keeps it in view.
pub struct Scout;

impl AgentBehavior for Scout {
    fn dispatch(&self, host: &mut dyn Host, agent: &AgentView, record: &mut AgentRecord, _max: u32) -> DispatchReport {
        direct_dispatch(host, agent, record, |_, _| None)
    }
}

/// Claims the mission room's controller.
pub struct Claimer;

impl AgentBehavior for Claimer {
    fn dispatch(&self, host: &mut dyn Host, agent: &AgentView, record: &mut AgentRecord, _max: u32) -> DispatchReport {
        direct_dispatch(host, agent, record, |world, room| {
            resolver::controller(world, room)
                .filter(|c| c.owner != Ownership::Mine)
                .map(|c| Action::on(ActionKind::Claim, &c))
        })
    }
}

/// Clears hostile agents, then hostile structures, from the mission room.
pub struct Invader;

impl AgentBehavior for Invader {
    fn dispatch(&self, host: &mut dyn Host, agent: &AgentView, record: &mut AgentRecord, _max: u32) -> DispatchReport {
        direct_dispatch(host, agent, record, |world, room| {
            resolver::hostile_target(world, agent, room).map(|t| Action::on(ActionKind::Attack, &t))
        })
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Role tag → behavior, populated once when the engine is built.
pub struct RoleRegistry {
    roles: BTreeMap<String, Box<dyn AgentBehavior>>,
}

impl RoleRegistry {
    pub fn empty() -> Self {
        Self {
            roles: BTreeMap::new(),
        }
    }

    /// Every built-in role.
    pub fn standard(config: &EngineConfig) -> Self {
        let mut registry = Self::empty();
        registry.register(tags::HARVESTER, BehaviorFsm::new(HarvestNode, FillSinksOrUpgrade));
        registry.register(tags::HAULER, BehaviorFsm::new(Salvage, FillSinks));
        registry.register(tags::UPGRADER, BehaviorFsm::new(EnergyPickup, UpgradeController));
        registry.register(tags::BUILDER, BehaviorFsm::new(EnergyPickup, BuildSites));
        registry.register(
            tags::REPAIRER,
            BehaviorFsm::new(
                EnergyPickup,
                RepairStructures {
                    wall_ceiling: config.wall_repair_ceiling,
                },
            ),
        );
        registry.register(tags::PIONEER_UPGRADER, BehaviorFsm::new(HarvestNode, UpgradeController));
        registry.register(tags::PIONEER_BUILDER, BehaviorFsm::new(HarvestNode, BuildSites));
        registry.register(tags::SCOUT, Scout);
        registry.register(tags::CLAIMER, Claimer);
        registry.register(tags::INVADER, Invader);
        registry
    }

    /// Add or replace a role.
    pub fn register<B: AgentBehavior + 'static>(&mut self, tag: impl Into<String>, behavior: B) {
        self.roles.insert(tag.into(), Box::new(behavior));
    }

    pub fn get(&self, tag: &str) -> Option<&dyn AgentBehavior> {
        self.roles.get(tag).map(|b| b.as_ref())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}
