//! Mission staffing under a shared harvest capacity.
//!
//! Pioneers harvest for themselves, so upgraders and builders in the target
//! room compete for the same few tiles around its sources. Each pass:
//!
//! 1. Survey the [`CapacityLedger`]: walkable slots around every source,
//!    no more than the source's regeneration can keep busy.
//! 2. [`split_capacity`] between the two roles, favouring the active phase.
//! 3. Convert slots to an agent cap with [`agents_for_slots`]: an agent only
//!    occupies a slot for the extracting part of its life.
//! 4. Cap the demand-based count (remaining work ÷ lifetime throughput) by it.
//! 5. [`top_up`] spawns at most one agent per role short of its target.
//!
//! Nothing here is persisted: the ledger is rebuilt from live counts every
//! tick, and a spawn that cannot be afforded is simply retried next tick.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use crate::config::EngineConfig;
use crate::geometry::RoomName;
use crate::memory::AgentRecord;
use crate::mission::{hostiles, MissionPhase, MissionRecord};
use crate::resolver;
use crate::roles::tags;
use crate::world::{
    body_cost, find_in_room, Host, ObjectId, ObjectKind, Ownership, SpawnRequest, SpawnResult,
    WorldObject, WorldView,
};

/// Float tolerance for the ceilings below, so 0.7 × 10 is 7 and not 8.
const CEIL_EPSILON: f64 = 1e-6;

fn ceil_u32(x: f64) -> u32 {
    (x - CEIL_EPSILON).ceil().max(0.0) as u32
}

// ============================================================================
// CAPACITY
// ============================================================================

/// Harvest slots around one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCapacity {
    pub source: ObjectId,
    /// Walkable tiles next to the source.
    pub tiles: u32,
    /// Tiles the source's regeneration can keep busy.
    pub slots: u32,
}

impl NodeCapacity {
    /// Bound `tiles` by how many slots drawing `slot_rate` energy per tick
    /// the node's regeneration sustains. A node that regenerates at all keeps
    /// at least one slot; one with no known rate keeps every tile.
    pub fn new(source: &WorldObject, tiles: u32, slot_rate: f32) -> Self {
        let slots = match source.regen_rate() {
            Some(rate) if slot_rate > 0.0 => {
                let sustained = (rate / slot_rate as f64 + CEIL_EPSILON).floor().max(1.0) as u32;
                tiles.min(sustained)
            }
            _ => tiles,
        };
        Self {
            source: source.id.clone(),
            tiles,
            slots,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityLedger {
    pub nodes: Vec<NodeCapacity>,
}

impl CapacityLedger {
    /// Usable slots around every source in the room.
    pub fn survey<W: WorldView + ?Sized>(world: &W, room: &RoomName, slot_rate: f32) -> Self {
        let nodes = find_in_room(world, room, |o| o.kind == ObjectKind::Source)
            .iter()
            .map(|src| {
                let tiles = resolver::harvest_slots(world, &src.pos).len() as u32;
                NodeCapacity::new(src, tiles, slot_rate)
            })
            .collect();
        Self { nodes }
    }

    pub fn total(&self) -> u32 {
        self.nodes.iter().map(|n| n.slots).sum()
    }
}

/// Slots granted to each pioneer role. Always sums to the ledger total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacitySplit {
    pub upgrader_slots: u32,
    pub builder_slots: u32,
}

/// Split `total` slots: the active phase's role gets `ceil(total × floor_share)`,
/// the other role the rest. Outside the pioneer phases the split is even.
pub fn split_capacity(total: u32, phase: MissionPhase, floor_share: f32) -> CapacitySplit {
    let active = ceil_u32(total as f64 * floor_share.clamp(0.0, 1.0) as f64).min(total);
    match phase {
        MissionPhase::Upgrading => CapacitySplit {
            upgrader_slots: active,
            builder_slots: total - active,
        },
        MissionPhase::Building => CapacitySplit {
            upgrader_slots: total - active,
            builder_slots: active,
        },
        _ => CapacitySplit {
            upgrader_slots: total - total / 2,
            builder_slots: total / 2,
        },
    }
}

/// Agents a number of slots supports when each agent extracts for only
/// `extraction_fraction` of its life.
pub fn agents_for_slots(slots: u32, extraction_fraction: f32) -> u32 {
    let fraction = extraction_fraction.clamp(0.05, 1.0) as f64;
    ceil_u32(slots as f64 / fraction)
}

// ============================================================================
// DEMAND
// ============================================================================

/// Pioneer upgraders needed to lift the controller to `target_level`.
pub fn upgrade_demand(controller: Option<&WorldObject>, target_level: u8, per_agent: f64) -> u32 {
    let Some(ctrl) = controller else {
        return 0;
    };
    if ctrl.level >= target_level {
        return 0;
    }
    // Later levels cost at least as much as the current one.
    let this_level = ctrl.progress_total.saturating_sub(ctrl.progress) as f64;
    let later = (target_level - ctrl.level - 1) as f64 * ctrl.progress_total as f64;
    demand_for(this_level + later, per_agent)
}

/// Pioneer builders needed to finish every site. `awaiting_site` asks for
/// one builder ahead of a site that is about to be placed.
pub fn build_demand(sites: &[WorldObject], awaiting_site: bool, per_agent: f64) -> u32 {
    let remaining: f64 = sites
        .iter()
        .map(|s| s.progress_total.saturating_sub(s.progress) as f64)
        .sum();
    if remaining <= 0.0 && awaiting_site {
        return 1;
    }
    demand_for(remaining, per_agent)
}

fn demand_for(remaining: f64, per_agent: f64) -> u32 {
    if remaining <= 0.0 {
        return 0;
    }
    if per_agent <= 0.0 {
        return 1;
    }
    ceil_u32(remaining / per_agent).max(1)
}

// ============================================================================
// STAFFING
// ============================================================================

/// How many agents of a role the mission wants right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staffing {
    pub role: &'static str,
    pub wanted: u32,
}

/// Desired head count per role for the mission's current phase.
pub fn plan_staffing<W: WorldView + ?Sized>(
    world: &W,
    mission: &MissionRecord,
    config: &EngineConfig,
) -> Vec<Staffing> {
    let target = &mission.target_location;
    match mission.current_phase {
        MissionPhase::Scouting => vec![Staffing {
            role: tags::SCOUT,
            wanted: 1,
        }],
        MissionPhase::Invading => {
            let hostile_count = hostiles(world, target).len() as u32;
            vec![Staffing {
                role: tags::INVADER,
                wanted: hostile_count.max(1).min(config.max_invaders),
            }]
        }
        MissionPhase::Claiming => vec![Staffing {
            role: tags::CLAIMER,
            wanted: 1,
        }],
        MissionPhase::Upgrading | MissionPhase::Building => {
            let total = CapacityLedger::survey(world, target, config.slot_extraction_rate).total();
            let split = split_capacity(total, mission.current_phase, config.active_share_floor);
            let upgrader_cap = agents_for_slots(split.upgrader_slots, config.upgrader_extraction_fraction);
            let builder_cap = agents_for_slots(split.builder_slots, config.builder_extraction_fraction);

            let lifetime = config.agent_lifetime as f64;
            let controller = resolver::owned_controller(world, target);
            let upgraders = upgrade_demand(
                controller.as_ref(),
                config.target_controller_level,
                config.upgrade_throughput as f64 * lifetime,
            );
            let sites = find_in_room(world, target, |o| {
                o.kind == ObjectKind::ConstructionSite && o.owner == Ownership::Mine
            });
            let awaiting_site = mission.current_phase == MissionPhase::Building;
            let builders = build_demand(&sites, awaiting_site, config.build_throughput as f64 * lifetime);

            vec![
                Staffing {
                    role: tags::PIONEER_UPGRADER,
                    wanted: upgraders.min(upgrader_cap),
                },
                Staffing {
                    role: tags::PIONEER_BUILDER,
                    wanted: builders.min(builder_cap),
                },
            ]
        }
        MissionPhase::Completed => Vec::new(),
    }
}

/// Agents of `role` currently serving the mission, from any phase.
fn staffed(mission: &MissionRecord, agents: &BTreeMap<ObjectId, AgentRecord>, role: &str) -> u32 {
    mission
        .agents()
        .filter(|id| agents.get(*id).map(|r| r.role_tag == role).unwrap_or(false))
        .count() as u32
}

/// Prune dead agents from the mission, then spawn at most one agent for each
/// role below its wanted count. Returns the ids spawned.
pub fn top_up<H: Host + ?Sized>(
    host: &mut H,
    agents: &mut BTreeMap<ObjectId, AgentRecord>,
    mission: &mut MissionRecord,
    config: &EngineConfig,
) -> Vec<ObjectId> {
    let live: BTreeSet<ObjectId> = host.agents().into_iter().map(|a| a.id).collect();
    let pruned = mission.prune(&live);
    if pruned > 0 {
        debug!("mission {}: {} dead agents pruned", mission.target_location, pruned);
    }

    let plan = plan_staffing(&*host, mission, config);
    let home = mission.home_location.clone();
    let target = mission.target_location.clone();
    let phase = mission.current_phase;
    let mut budget = host.spawn_energy(&home);
    let mut spawned = Vec::new();

    for Staffing { role, wanted } in plan {
        let have = staffed(mission, agents, role);
        if have >= wanted {
            continue;
        }
        let body = host.compose_body(role, budget);
        let cost = body_cost(&body);
        if body.is_empty() || cost > budget {
            debug!(
                "mission {}: {} {}/{}, {} energy is not enough",
                target, role, have, wanted, budget
            );
            continue;
        }
        let record = AgentRecord::for_mission(role, &home, &target, phase);
        let request = SpawnRequest {
            role: role.to_string(),
            body,
            memory: record.clone(),
        };
        match host.try_spawn(&home, &request) {
            SpawnResult::Ok(id) => {
                budget -= cost;
                info!(
                    "mission {}: spawning {} {} ({}/{}) for {:?}",
                    target,
                    role,
                    id,
                    have + 1,
                    wanted,
                    phase
                );
                agents.insert(id.clone(), record);
                mission.assign(phase, id.clone());
                spawned.push(id);
            }
            SpawnResult::InsufficientResource | SpawnResult::Busy => {
                debug!("mission {}: spawner in {} cannot take {} now", target, home, role);
            }
        }
    }
    spawned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::test_support::{agent_at, MockHost};
    use crate::world::Store;

    fn pos(x: u8, y: u8) -> Position {
        Position::new("W1N1", x, y)
    }

    /// Source with exactly three walkable neighbours.
    fn walled_source(host: &mut MockHost, id: &str, x: u8, y: u8) {
        let at = pos(x, y);
        host.add_object(WorldObject::new(id, ObjectKind::Source, at.clone()).with_store(3000, 3000));
        for (i, p) in at.neighbors().into_iter().enumerate() {
            if i >= 3 {
                host.walls.insert(p);
            }
        }
    }

    fn pioneer_mission(phase: MissionPhase) -> MissionRecord {
        let mut m = MissionRecord::new(RoomName::from("W1N1"), RoomName::from("W3N1"), vec![], 0);
        m.current_phase = phase;
        m
    }

    #[test]
    fn test_ledger_counts_walkable_slots() {
        let mut host = MockHost::new();
        walled_source(&mut host, "a", 10, 10);
        walled_source(&mut host, "b", 30, 30);
        let ledger = CapacityLedger::survey(&host, &RoomName::from("W1N1"), 2.0);
        assert_eq!(ledger.nodes.len(), 2);
        assert_eq!(ledger.total(), 6);
    }

    #[test]
    fn test_slow_node_supports_fewer_slots_than_tiles() {
        let mut host = MockHost::new();
        // 3000 over 1000 ticks is 3 energy a tick: one slot at 2 a tick.
        host.add_object(
            WorldObject::new("slow", ObjectKind::Source, pos(10, 10))
                .with_store(3000, 3000)
                .with_regen(1000),
        );
        // 10 a tick: five slots, but only eight tiles to stand on.
        host.add_object(
            WorldObject::new("fast", ObjectKind::Source, pos(30, 30))
                .with_store(3000, 3000)
                .with_regen(300),
        );
        let ledger = CapacityLedger::survey(&host, &RoomName::from("W1N1"), 2.0);
        let slow = ledger.nodes.iter().find(|n| n.source == ObjectId::from("slow")).unwrap();
        assert_eq!((slow.tiles, slow.slots), (8, 1));
        let fast = ledger.nodes.iter().find(|n| n.source == ObjectId::from("fast")).unwrap();
        assert_eq!((fast.tiles, fast.slots), (8, 5));
        assert_eq!(ledger.total(), 6);
    }

    #[test]
    fn test_trickle_node_keeps_one_slot() {
        let src = WorldObject::new("s", ObjectKind::Source, pos(10, 10))
            .with_store(300, 300)
            .with_regen(3000);
        assert_eq!(NodeCapacity::new(&src, 4, 2.0).slots, 1);
        assert_eq!(NodeCapacity::new(&src, 0, 2.0).slots, 0);
    }

    #[test]
    fn test_split_six_slots_upgrading() {
        let split = split_capacity(6, MissionPhase::Upgrading, 0.7);
        assert!(split.upgrader_slots >= 4);
        assert_eq!(split.upgrader_slots + split.builder_slots, 6);
        assert_eq!(split, CapacitySplit { upgrader_slots: 5, builder_slots: 1 });
    }

    #[test]
    fn test_split_favours_builders_when_building() {
        let split = split_capacity(6, MissionPhase::Building, 0.7);
        assert_eq!(split, CapacitySplit { upgrader_slots: 1, builder_slots: 5 });
    }

    #[test]
    fn test_split_exact_multiples_do_not_round_up() {
        let split = split_capacity(10, MissionPhase::Upgrading, 0.7);
        assert_eq!(split.upgrader_slots, 7);
    }

    #[test]
    fn test_split_always_sums_to_total() {
        let phases = [
            MissionPhase::Scouting,
            MissionPhase::Upgrading,
            MissionPhase::Building,
            MissionPhase::Completed,
        ];
        for total in 0..40 {
            for phase in phases {
                for share in [0.0, 0.3, 0.5, 0.7, 1.0, 1.7] {
                    let s = split_capacity(total, phase, share);
                    assert_eq!(s.upgrader_slots + s.builder_slots, total, "{total} {phase:?} {share}");
                }
            }
        }
    }

    #[test]
    fn test_agents_for_slots() {
        assert_eq!(agents_for_slots(5, 0.5), 10);
        assert_eq!(agents_for_slots(1, 0.6), 2);
        assert_eq!(agents_for_slots(0, 0.6), 0);
        // Degenerate fractions are clamped.
        assert_eq!(agents_for_slots(1, 0.0), 20);
    }

    #[test]
    fn test_upgrade_demand() {
        let ctrl = WorldObject::new("c", ObjectKind::Controller, pos(20, 20))
            .with_owner(Ownership::Mine)
            .with_level(1)
            .with_progress(0, 200);
        assert_eq!(upgrade_demand(Some(&ctrl), 2, 1500.0), 1);
        assert_eq!(upgrade_demand(Some(&ctrl), 4, 100.0), 6);
        assert_eq!(upgrade_demand(Some(&ctrl), 1, 1500.0), 0);
        assert_eq!(upgrade_demand(None, 2, 1500.0), 0);
    }

    #[test]
    fn test_build_demand() {
        let site = WorldObject::new("s", ObjectKind::ConstructionSite, pos(20, 20)).with_progress(1000, 15000);
        assert_eq!(build_demand(&[site], false, 3750.0), 4);
        assert_eq!(build_demand(&[], true, 3750.0), 1);
        assert_eq!(build_demand(&[], false, 3750.0), 0);
    }

    #[test]
    fn test_plan_invaders_capped() {
        let mut host = MockHost::new();
        for i in 0..5 {
            host.add_object(
                WorldObject::new(format!("h{i}"), ObjectKind::HostileAgent, pos(10 + i, 10))
                    .with_owner(Ownership::Hostile),
            );
        }
        let plan = plan_staffing(&host, &pioneer_mission(MissionPhase::Invading), &EngineConfig::default());
        assert_eq!(plan, vec![Staffing { role: tags::INVADER, wanted: 2 }]);
    }

    #[test]
    fn test_plan_pioneers_capped_by_capacity() {
        let mut host = MockHost::new();
        walled_source(&mut host, "a", 10, 10);
        host.add_object(
            WorldObject::new("c", ObjectKind::Controller, pos(20, 20))
                .with_owner(Ownership::Mine)
                .with_level(1)
                .with_progress(0, 1_000_000),
        );
        let plan = plan_staffing(&host, &pioneer_mission(MissionPhase::Upgrading), &EngineConfig::default());
        // 3 slots: 3 to upgraders (ceil 2.1), cap 3 / 0.5 = 6; no sites, no builders.
        assert_eq!(
            plan,
            vec![
                Staffing { role: tags::PIONEER_UPGRADER, wanted: 6 },
                Staffing { role: tags::PIONEER_BUILDER, wanted: 0 },
            ]
        );
    }

    #[test]
    fn test_top_up_spawns_one_per_shortfall_within_budget() {
        let mut host = MockHost::new();
        host.energy = 200;
        let mut agents = BTreeMap::new();
        let mut mission = pioneer_mission(MissionPhase::Scouting);
        let config = EngineConfig::default();

        let spawned = top_up(&mut host, &mut agents, &mut mission, &config);
        assert_eq!(spawned.len(), 1);
        assert_eq!(host.spawned[0].role, tags::SCOUT);
        assert_eq!(host.energy, 150);
        let record = &agents[&spawned[0]];
        assert_eq!(record.mission_room, Some(RoomName::from("W1N1")));
        assert_eq!(record.mission_phase, Some(MissionPhase::Scouting));
        assert_eq!(mission.agent_count(), 1);

        // Alive and counted: nothing more to spawn.
        host.add_agent(agent_at(spawned[0].as_str(), 25, 25, Store::new(0, 0)));
        assert!(top_up(&mut host, &mut agents, &mut mission, &config).is_empty());
    }

    #[test]
    fn test_top_up_skips_unaffordable() {
        let mut host = MockHost::new();
        host.energy = 300;
        let mut agents = BTreeMap::new();
        let mut mission = pioneer_mission(MissionPhase::Claiming);
        let spawned = top_up(&mut host, &mut agents, &mut mission, &EngineConfig::default());
        assert!(spawned.is_empty());
        assert!(host.spawned.is_empty());
        assert_eq!(mission.agent_count(), 0);
    }

    #[test]
    fn test_top_up_replaces_dead_agents() {
        let mut host = MockHost::new();
        host.energy = 1000;
        let mut agents = BTreeMap::new();
        let mut mission = pioneer_mission(MissionPhase::Scouting);
        mission.assign(MissionPhase::Scouting, ObjectId::from("dead_scout"));
        agents.insert(
            ObjectId::from("dead_scout"),
            AgentRecord::for_mission(tags::SCOUT, &RoomName::from("W3N1"), &RoomName::from("W1N1"), MissionPhase::Scouting),
        );
        let spawned = top_up(&mut host, &mut agents, &mut mission, &EngineConfig::default());
        assert_eq!(spawned.len(), 1);
        assert_eq!(mission.agent_count(), 1);
        assert!(!mission.agents().any(|id| id.as_str() == "dead_scout"));
    }
}
