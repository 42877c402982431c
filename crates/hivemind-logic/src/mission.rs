//! Multi-stage missions: take over a remote room and give it a spawn.
//!
//! A mission is a coarse state machine over [`MissionPhase`], evaluated once
//! per tick after every agent has acted. It only ever moves forward; the
//! record is deleted the tick it completes, or when the operator aborts it.
//!
//! | Phase | Advances when |
//! |-------|---------------|
//! | SCOUTING | target visible and has a controller |
//! | INVADING | no hostile agents or structures remain |
//! | CLAIMING | controller is ours |
//! | UPGRADING | controller reaches the target level |
//! | BUILDING | a spawn of ours stands in the target |
//!
//! A mission that cannot reach its goal stalls: it is never rolled back, and
//! past `stall_warning_ticks` it logs a warning once per interval.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::geometry::{Position, RoomName};
use crate::memory::MemoryStore;
use crate::resolver;
use crate::route::RouteCache;
use crate::world::{
    find_in_room, Host, ObjectId, ObjectKind, Ownership, PlacementResult, ReturnCode, Route,
    WorldObject, WorldView,
};

// ============================================================================
// PHASES & RECORD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionPhase {
    Scouting,
    Invading,
    Claiming,
    Upgrading,
    Building,
    Completed,
}

impl MissionPhase {
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Scouting => Some(Self::Invading),
            Self::Invading => Some(Self::Claiming),
            Self::Claiming => Some(Self::Upgrading),
            Self::Upgrading => Some(Self::Building),
            Self::Building => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

/// Durable state of one mission, keyed by its target room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionRecord {
    pub target_location: RoomName,
    pub home_location: RoomName,
    #[serde(default)]
    pub waypoints: Vec<RoomName>,
    pub current_phase: MissionPhase,
    pub phase_start_tick: u64,
    /// Agents serving the mission, by the phase they were spawned for.
    #[serde(default)]
    pub active_agents: BTreeMap<MissionPhase, BTreeSet<ObjectId>>,
    #[serde(default)]
    pub created_tick: u64,
    /// Tick of the outstanding spawn placement request, if any.
    #[serde(default)]
    pub placement_requested_tick: Option<u64>,
    #[serde(default)]
    pub last_stall_warning_tick: Option<u64>,
}

impl MissionRecord {
    pub fn new(target: RoomName, home: RoomName, waypoints: Vec<RoomName>, now: u64) -> Self {
        Self {
            target_location: target,
            home_location: home,
            waypoints,
            current_phase: MissionPhase::Scouting,
            phase_start_tick: now,
            active_agents: BTreeMap::new(),
            created_tick: now,
            placement_requested_tick: None,
            last_stall_warning_tick: None,
        }
    }

    pub fn assign(&mut self, phase: MissionPhase, agent: ObjectId) {
        self.active_agents.entry(phase).or_default().insert(agent);
    }

    /// Every agent serving the mission, whatever phase it came from.
    pub fn agents(&self) -> impl Iterator<Item = &ObjectId> {
        self.active_agents.values().flatten()
    }

    pub fn agent_count(&self) -> usize {
        self.active_agents.values().map(BTreeSet::len).sum()
    }

    /// Forget agents that are no longer alive. Returns how many were dropped.
    pub fn prune(&mut self, live: &BTreeSet<ObjectId>) -> usize {
        let before = self.agent_count();
        for set in self.active_agents.values_mut() {
            set.retain(|id| live.contains(id));
        }
        self.active_agents.retain(|_, set| !set.is_empty());
        before - self.agent_count()
    }

    pub fn phase_age(&self, now: u64) -> u64 {
        now.saturating_sub(self.phase_start_tick)
    }
}

// ============================================================================
// FEASIBILITY
// ============================================================================

/// Whether a mission's tightest-lived agent has time to work after travel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeasibilityReport {
    pub can_complete: bool,
    pub travel_ticks: u32,
    pub lifetime: u32,
    pub working_ticks: u32,
    pub min_working_ticks: u32,
    pub recommendation: String,
}

impl fmt::Display for FeasibilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.recommendation)
    }
}

pub fn estimate_travel_ticks(route: &Route, ticks_per_room: u32) -> u32 {
    route.total_distance.saturating_mul(ticks_per_room)
}

pub fn check_feasibility(travel_ticks: u32, lifetime: u32, min_working_ticks: u32) -> FeasibilityReport {
    let working_ticks = lifetime.saturating_sub(travel_ticks);
    let can_complete = working_ticks >= min_working_ticks;
    let recommendation = if can_complete {
        format!(
            "feasible: {} working ticks remain after {} ticks of travel",
            working_ticks, travel_ticks
        )
    } else {
        format!(
            "travel takes {} of {} lifetime ticks, leaving {} (need {}); \
             pick a target within {} ticks of travel or a closer home room",
            travel_ticks,
            lifetime,
            working_ticks,
            min_working_ticks,
            lifetime.saturating_sub(min_working_ticks)
        )
    };
    FeasibilityReport {
        can_complete,
        travel_ticks,
        lifetime,
        working_ticks,
        min_working_ticks,
        recommendation,
    }
}

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("a mission to {0} already exists")]
    AlreadyExists(RoomName),
    #[error("no route from {from} to {to}")]
    NoRoute { from: RoomName, to: RoomName },
    #[error("mission to {target} is infeasible: {report}")]
    Infeasible { target: RoomName, report: FeasibilityReport },
}

// ============================================================================
// OPERATOR SURFACE
// ============================================================================

/// Validate and record a new mission.
pub fn create<H: Host + ?Sized>(
    host: &H,
    memory: &mut MemoryStore,
    config: &EngineConfig,
    target: &RoomName,
    home: &RoomName,
    waypoints: &[RoomName],
) -> Result<FeasibilityReport, MissionError> {
    if memory.missions.contains_key(target) {
        return Err(MissionError::AlreadyExists(target.clone()));
    }
    let now = host.time();
    let route = RouteCache::new(&mut memory.routes, config.route_ttl)
        .route(host, now, home, target, waypoints)
        .ok_or_else(|| MissionError::NoRoute {
            from: home.clone(),
            to: target.clone(),
        })?;

    let travel = estimate_travel_ticks(&route, config.ticks_per_room);
    let report = check_feasibility(travel, config.claimer_lifetime, config.min_working_ticks);
    if !report.can_complete {
        return Err(MissionError::Infeasible {
            target: target.clone(),
            report,
        });
    }

    info!("mission {} -> {} created: {}", home, target, report);
    memory.missions.insert(
        target.clone(),
        MissionRecord::new(target.clone(), home.clone(), waypoints.to_vec(), now),
    );
    Ok(report)
}

/// Cancel a mission immediately: terminate its agents, delete their records,
/// the mission record and its cached routes. Returns the number of agents
/// terminated, or `None` if there was no such mission.
pub fn abort<H: Host + ?Sized>(host: &mut H, memory: &mut MemoryStore, target: &RoomName) -> Option<usize> {
    let mission = memory.missions.remove(target)?;

    let mut doomed: BTreeSet<ObjectId> = mission.agents().cloned().collect();
    doomed.extend(
        memory
            .agents
            .iter()
            .filter(|(_, rec)| rec.mission_room.as_ref() == Some(target))
            .map(|(id, _)| id.clone()),
    );

    let mut terminated = 0;
    for id in &doomed {
        if host.terminate(id) == ReturnCode::Ok {
            terminated += 1;
        }
        memory.agents.remove(id);
    }
    let routes = RouteCache::new(&mut memory.routes, 0).invalidate_between(&mission.home_location, target);

    info!(
        "mission {} aborted in {:?}: {} agents terminated, {} routes dropped",
        target, mission.current_phase, terminated, routes
    );
    Some(terminated)
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Result of evaluating a mission for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Goal of the current phase not met yet.
    Stalled(MissionPhase),
    Advanced { from: MissionPhase, to: MissionPhase },
    /// Reached COMPLETED; the caller deletes the record.
    Completed,
}

/// Hostile agents and structures in a room.
pub fn hostiles<W: WorldView + ?Sized>(world: &W, room: &RoomName) -> Vec<WorldObject> {
    find_in_room(world, room, |o| {
        o.owner == Ownership::Hostile && (o.kind == ObjectKind::HostileAgent || o.kind.is_structure())
    })
}

fn own_spawn_exists<W: WorldView + ?Sized>(world: &W, room: &RoomName) -> bool {
    !find_in_room(world, room, |o| o.kind == ObjectKind::Spawn && o.owner == Ownership::Mine).is_empty()
}

fn spawn_site_exists<W: WorldView + ?Sized>(world: &W, room: &RoomName) -> bool {
    !find_in_room(world, room, |o| {
        o.kind == ObjectKind::ConstructionSite
            && o.owner == Ownership::Mine
            && o.site_kind == Some(ObjectKind::Spawn)
    })
    .is_empty()
}

/// Whether the current phase's goal is met. BUILDING may issue a placement
/// request as a side effect.
fn goal_met<H: Host + ?Sized>(host: &mut H, mission: &mut MissionRecord, config: &EngineConfig) -> bool {
    let target = mission.target_location.clone();
    if !host.is_visible(&target) {
        return false;
    }
    match mission.current_phase {
        MissionPhase::Scouting => resolver::controller(&*host, &target).is_some(),
        MissionPhase::Invading => hostiles(&*host, &target).is_empty(),
        MissionPhase::Claiming => resolver::owned_controller(&*host, &target).is_some(),
        MissionPhase::Upgrading => resolver::owned_controller(&*host, &target)
            .map(|c| c.level >= config.target_controller_level)
            .unwrap_or(false),
        MissionPhase::Building => {
            if own_spawn_exists(&*host, &target) {
                return true;
            }
            ensure_spawn_placement(host, mission, config);
            false
        }
        MissionPhase::Completed => true,
    }
}

/// Keep at most one spawn placement request outstanding. A request stays
/// outstanding until a spawn site shows up or the retry window lapses.
fn ensure_spawn_placement<H: Host + ?Sized>(host: &mut H, mission: &mut MissionRecord, config: &EngineConfig) {
    let target = &mission.target_location;
    let now = host.time();
    if spawn_site_exists(&*host, target) {
        mission.placement_requested_tick = None;
        return;
    }
    if let Some(requested) = mission.placement_requested_tick {
        if now.saturating_sub(requested) < config.placement_retry_ticks {
            return;
        }
    }
    match host.request_placement(ObjectKind::Spawn, &Position::center_of(target)) {
        PlacementResult::Ok(pos) => info!("mission {}: spawn placement requested at {}", target, pos),
        PlacementResult::NoSuitableSite => warn!("mission {}: no suitable site for a spawn", target),
    }
    mission.placement_requested_tick = Some(now);
}

/// Advance a mission by at most one phase.
pub fn evaluate<H: Host + ?Sized>(host: &mut H, mission: &mut MissionRecord, config: &EngineConfig) -> PhaseOutcome {
    let now = host.time();
    let from = mission.current_phase;
    let next = match from.next() {
        Some(next) if goal_met(host, mission, config) => next,
        Some(_) => {
            warn_if_stalled(mission, now, config);
            return PhaseOutcome::Stalled(from);
        }
        None => return PhaseOutcome::Completed,
    };

    mission.current_phase = next;
    mission.phase_start_tick = now;
    mission.last_stall_warning_tick = None;
    info!(
        "mission {}: {:?} -> {:?} after {} ticks",
        mission.target_location,
        from,
        next,
        now.saturating_sub(mission.created_tick)
    );
    if next == MissionPhase::Completed {
        PhaseOutcome::Completed
    } else {
        PhaseOutcome::Advanced { from, to: next }
    }
}

fn warn_if_stalled(mission: &mut MissionRecord, now: u64, config: &EngineConfig) {
    let age = mission.phase_age(now);
    if age < config.stall_warning_ticks {
        return;
    }
    let due = match mission.last_stall_warning_tick {
        Some(last) => now.saturating_sub(last) >= config.stall_warning_ticks,
        None => true,
    };
    if due {
        warn!(
            "mission {} stalled in {:?} for {} ticks ({} agents assigned)",
            mission.target_location,
            mission.current_phase,
            age,
            mission.agent_count()
        );
        mission.last_stall_warning_tick = Some(now);
    }
}
