//! Target resolution: pick the best world object for a job.
//!
//! Every resolver is a pure function of the current world snapshot: no side
//! effects, never panics, `None` when nothing qualifies. Each encodes one
//! priority order. Where several kinds of object compete (energy pickup),
//! kind weight, distance and available quantity are folded into one score so
//! a large pile a few tiles further away can beat a trickle next door.

use crate::geometry::{Position, RoomName};
use crate::world::{
    find_in_room, find_nearest, AgentView, ObjectKind, Ownership, WorldObject, WorldView,
};

/// Preference for each kind of energy pickup. Decaying drops first, then
/// ephemeral remains, then stores, then slow regenerating nodes.
fn pickup_weight(kind: ObjectKind) -> Option<f32> {
    match kind {
        ObjectKind::Dropped => Some(4.0),
        ObjectKind::Tombstone => Some(3.0),
        ObjectKind::Ruin => Some(2.5),
        ObjectKind::Container | ObjectKind::Storage => Some(2.0),
        ObjectKind::Source => Some(1.0),
        _ => None,
    }
}

/// Score of taking energy from `obj`: weight × fill fraction ÷ (1 + range).
fn pickup_score(agent: &AgentView, obj: &WorldObject, weight: f32) -> f32 {
    let want = agent.store.free().max(1);
    let fill = obj.store.used.min(want) as f32 / want as f32;
    weight * fill / (1.0 + agent.pos.range_to(&obj.pos) as f32)
}

fn best_scored<I>(agent: &AgentView, candidates: I) -> Option<WorldObject>
where
    I: Iterator<Item = (WorldObject, f32)>,
{
    candidates
        .map(|(obj, weight)| {
            let score = pickup_score(agent, &obj, weight);
            (obj, score)
        })
        .max_by(|(a, sa), (b, sb)| {
            sa.total_cmp(sb)
                // Lower id wins ties, so invert for max_by.
                .then_with(|| b.id.cmp(&a.id))
        })
        .map(|(obj, _)| obj)
}

// ============================================================================
// ACQUISITION
// ============================================================================

/// Best place to pick up energy in `room`.
///
/// Sources only count for agents that can harvest. Hostile stores are
/// never considered.
pub fn energy_pickup<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
) -> Option<WorldObject> {
    let can_harvest = agent.parts(crate::world::BodyPart::Work) > 0;
    let candidates = world.objects_in(room).into_iter().filter_map(|obj| {
        let weight = pickup_weight(obj.kind)?;
        if obj.store.used == 0 || obj.owner == Ownership::Hostile {
            return None;
        }
        if obj.kind == ObjectKind::Source && !can_harvest {
            return None;
        }
        Some((obj, weight))
    });
    best_scored(agent, candidates)
}

/// Best leftover energy to haul: drops, remains and containers (no sources,
/// no storage, since storage is where haulers unload).
pub fn salvage<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
) -> Option<WorldObject> {
    let candidates = world.objects_in(room).into_iter().filter_map(|obj| {
        if obj.store.used == 0 || obj.owner == Ownership::Hostile {
            return None;
        }
        match obj.kind {
            ObjectKind::Dropped | ObjectKind::Tombstone | ObjectKind::Ruin | ObjectKind::Container => {
                pickup_weight(obj.kind).map(|w| (obj, w))
            }
            _ => None,
        }
    });
    best_scored(agent, candidates)
}

/// Walkable tiles around a resource node: the positions harvesters can
/// occupy concurrently.
pub fn harvest_slots<W: WorldView + ?Sized>(world: &W, node: &Position) -> Vec<Position> {
    node.neighbors()
        .into_iter()
        .filter(|p| world.is_walkable(p))
        .collect()
}

/// Nearest source with energy left and a slot this agent can stand in.
///
/// A slot is free if no other agent stands on it; an agent already next to
/// the source always has a slot.
pub fn harvest_node<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
) -> Option<WorldObject> {
    let others: Vec<Position> = world
        .agents()
        .into_iter()
        .filter(|a| a.id != agent.id)
        .map(|a| a.pos)
        .collect();
    find_nearest(world, &agent.pos, room, |o| {
        if o.kind != ObjectKind::Source || o.store.used == 0 {
            return false;
        }
        if agent.pos.in_range_to(&o.pos, 1) {
            return true;
        }
        harvest_slots(world, &o.pos)
            .iter()
            .any(|slot| !others.contains(slot))
    })
}

// ============================================================================
// WORK TARGETS
// ============================================================================

/// Spawns and extensions needing energy, nearest first; towers only when
/// every spawn-class structure is full.
pub fn energy_sink<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
) -> Option<WorldObject> {
    find_nearest(world, &agent.pos, room, |o| {
        o.kind.is_spawn_class() && o.owner == Ownership::Mine && o.store.free() > 0
    })
    .or_else(|| {
        find_nearest(world, &agent.pos, room, |o| {
            o.kind == ObjectKind::Tower && o.owner == Ownership::Mine && o.store.free() > 0
        })
    })
}

/// Build priority of a construction site, lower first.
fn site_priority(kind: Option<ObjectKind>) -> u8 {
    match kind {
        Some(ObjectKind::Spawn) => 0,
        Some(ObjectKind::Extension) => 1,
        Some(ObjectKind::Tower) => 2,
        Some(ObjectKind::Container) | Some(ObjectKind::Storage) => 3,
        Some(ObjectKind::Road) => 5,
        _ => 4,
    }
}

/// Our construction site with the highest build priority, nearest among equals.
pub fn construction_site<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
) -> Option<WorldObject> {
    find_in_room(world, room, |o| {
        o.kind == ObjectKind::ConstructionSite && o.owner == Ownership::Mine
    })
    .into_iter()
    .min_by(|a, b| {
        site_priority(a.site_kind)
            .cmp(&site_priority(b.site_kind))
            .then_with(|| agent.pos.range_to(&a.pos).cmp(&agent.pos.range_to(&b.pos)))
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// Hit points a structure is worth repairing up to. Walls and ramparts are
/// capped at `wall_ceiling`.
fn repair_goal(obj: &WorldObject, wall_ceiling: u32) -> u32 {
    match obj.kind {
        ObjectKind::Wall | ObjectKind::Rampart => obj.hits_max.min(wall_ceiling),
        _ => obj.hits_max,
    }
}

/// Most damaged repairable structure, relative to its repair goal, with
/// distance as a mild penalty.
pub fn repair_target<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
    wall_ceiling: u32,
) -> Option<WorldObject> {
    world
        .objects_in(room)
        .into_iter()
        .filter(|o| {
            o.kind.is_structure()
                && o.owner != Ownership::Hostile
                && o.kind != ObjectKind::InvaderCore
                && o.hits < repair_goal(o, wall_ceiling)
        })
        .map(|o| {
            let goal = repair_goal(&o, wall_ceiling).max(1) as f32;
            let damage = 1.0 - o.hits as f32 / goal;
            let score = damage / (1.0 + 0.05 * agent.pos.range_to(&o.pos) as f32);
            (o, score)
        })
        .max_by(|(a, sa), (b, sb)| sa.total_cmp(sb).then_with(|| b.id.cmp(&a.id)))
        .map(|(o, _)| o)
}

/// The room's controller, whoever owns it.
pub fn controller<W: WorldView + ?Sized>(world: &W, room: &RoomName) -> Option<WorldObject> {
    find_in_room(world, room, |o| o.kind == ObjectKind::Controller)
        .into_iter()
        .next()
}

/// The room's controller if we own it.
pub fn owned_controller<W: WorldView + ?Sized>(world: &W, room: &RoomName) -> Option<WorldObject> {
    controller(world, room).filter(|c| c.owner == Ownership::Mine)
}

/// Somewhere safe to unload surplus: storage, then containers, then
/// spawn-class structures.
pub fn safe_deposit<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
) -> Option<WorldObject> {
    let tiers: [&dyn Fn(&WorldObject) -> bool; 3] = [
        &|o| o.kind == ObjectKind::Storage && o.owner == Ownership::Mine,
        &|o| o.kind == ObjectKind::Container && o.owner != Ownership::Hostile,
        &|o| o.kind.is_spawn_class() && o.owner == Ownership::Mine,
    ];
    tiers.iter().find_map(|tier| {
        find_nearest(world, &agent.pos, room, |o| tier(o) && o.store.free() > 0)
    })
}

/// Where an agent with nothing to do should wait, with the range to hold.
pub fn idle_spot<W: WorldView + ?Sized>(world: &W, agent: &AgentView, room: &RoomName) -> (Position, u32) {
    match find_nearest(world, &agent.pos, room, |o| {
        o.kind == ObjectKind::Spawn && o.owner == Ownership::Mine
    }) {
        Some(spawn) => (spawn.pos, 3),
        None => (Position::center_of(room), 5),
    }
}

/// Hostile agents first, then hostile structures, nearest within each.
pub fn hostile_target<W: WorldView + ?Sized>(
    world: &W,
    agent: &AgentView,
    room: &RoomName,
) -> Option<WorldObject> {
    find_nearest(world, &agent.pos, room, |o| {
        o.kind == ObjectKind::HostileAgent && o.owner == Ownership::Hostile
    })
    .or_else(|| {
        find_nearest(world, &agent.pos, room, |o| {
            o.owner == Ownership::Hostile && o.kind.is_structure()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{agent_at, room, MockHost};
    use crate::world::{BodyPart, ObjectId, Store};

    fn pos(x: u8, y: u8) -> Position {
        Position::new("W1N1", x, y)
    }

    #[test]
    fn test_pickup_prefers_drop_over_source_at_same_distance() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("src", ObjectKind::Source, pos(13, 10)).with_store(3000, 3000));
        host.add_object(WorldObject::new("drop", ObjectKind::Dropped, pos(10, 13)).with_store(500, 500));
        let agent = agent_at("a", 10, 10, Store::new(0, 50));
        let best = energy_pickup(&host, &agent, &room()).unwrap();
        assert_eq!(best.id.as_str(), "drop");
    }

    #[test]
    fn test_pickup_weighs_distance() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("far_drop", ObjectKind::Dropped, pos(40, 40)).with_store(500, 500));
        host.add_object(WorldObject::new("near_src", ObjectKind::Source, pos(11, 10)).with_store(3000, 3000));
        let agent = agent_at("a", 10, 10, Store::new(0, 50));
        // 4.0 / 31 < 1.0 / 2
        assert_eq!(energy_pickup(&host, &agent, &room()).unwrap().id.as_str(), "near_src");
    }

    #[test]
    fn test_pickup_weighs_quantity() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("crumbs", ObjectKind::Dropped, pos(11, 10)).with_store(2, 2));
        host.add_object(WorldObject::new("box", ObjectKind::Container, pos(12, 10)).with_store(1000, 2000));
        let agent = agent_at("a", 10, 10, Store::new(0, 50));
        // crumbs: 4.0 * 2/50 / 2 = 0.08; box: 2.0 * 1 / 3 = 0.67
        assert_eq!(energy_pickup(&host, &agent, &room()).unwrap().id.as_str(), "box");
    }

    #[test]
    fn test_pickup_skips_sources_without_work_parts() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("src", ObjectKind::Source, pos(11, 10)).with_store(3000, 3000));
        let mut agent = agent_at("a", 10, 10, Store::new(0, 50));
        agent.body = vec![BodyPart::Carry, BodyPart::Move];
        assert!(energy_pickup(&host, &agent, &room()).is_none());
    }

    #[test]
    fn test_pickup_ignores_empty_and_hostile() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("empty", ObjectKind::Container, pos(11, 10)).with_store(0, 2000));
        host.add_object(
            WorldObject::new("theirs", ObjectKind::Storage, pos(12, 10))
                .with_store(5000, 10000)
                .with_owner(Ownership::Hostile),
        );
        let agent = agent_at("a", 10, 10, Store::new(0, 50));
        assert!(energy_pickup(&host, &agent, &room()).is_none());
    }

    #[test]
    fn test_harvest_node_requires_free_slot() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("src", ObjectKind::Source, pos(20, 20)).with_store(3000, 3000));
        // Wall off everything except one tile, then stand someone on it.
        for p in pos(20, 20).neighbors() {
            if p != pos(21, 20) {
                host.walls.insert(p);
            }
        }
        let me = agent_at("me", 10, 10, Store::new(0, 50));
        assert!(harvest_node(&host, &me, &room()).is_some());
        host.add_agent(agent_at("other", 21, 20, Store::new(0, 50)));
        assert!(harvest_node(&host, &me, &room()).is_none());
        // Standing in the slot already counts as having it.
        let occupant = agent_at("other", 21, 20, Store::new(0, 50));
        assert!(harvest_node(&host, &occupant, &room()).is_some());
    }

    #[test]
    fn test_energy_sink_prefers_spawn_class_over_tower() {
        let mut host = MockHost::new();
        host.add_object(
            WorldObject::new("tower", ObjectKind::Tower, pos(11, 10))
                .with_owner(Ownership::Mine)
                .with_store(0, 1000),
        );
        host.add_object(
            WorldObject::new("ext", ObjectKind::Extension, pos(30, 30))
                .with_owner(Ownership::Mine)
                .with_store(0, 50),
        );
        let agent = agent_at("a", 10, 10, Store::new(50, 50));
        assert_eq!(energy_sink(&host, &agent, &room()).unwrap().id.as_str(), "ext");
        host.objects.get_mut(&ObjectId::from("ext")).unwrap().store.used = 50;
        assert_eq!(energy_sink(&host, &agent, &room()).unwrap().id.as_str(), "tower");
    }

    #[test]
    fn test_construction_site_priority() {
        let mut host = MockHost::new();
        host.add_object(
            WorldObject::new("road", ObjectKind::ConstructionSite, pos(11, 10))
                .with_owner(Ownership::Mine)
                .with_site_kind(ObjectKind::Road),
        );
        host.add_object(
            WorldObject::new("spawn", ObjectKind::ConstructionSite, pos(40, 40))
                .with_owner(Ownership::Mine)
                .with_site_kind(ObjectKind::Spawn),
        );
        let agent = agent_at("a", 10, 10, Store::new(50, 50));
        assert_eq!(construction_site(&host, &agent, &room()).unwrap().id.as_str(), "spawn");
    }

    #[test]
    fn test_repair_caps_walls() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("wall", ObjectKind::Wall, pos(11, 10)).with_hits(20_000, 300_000_000));
        let agent = agent_at("a", 10, 10, Store::new(50, 50));
        assert!(repair_target(&host, &agent, &room(), 10_000).is_none());
        assert!(repair_target(&host, &agent, &room(), 50_000).is_some());
    }

    #[test]
    fn test_repair_picks_most_damaged() {
        let mut host = MockHost::new();
        host.add_object(WorldObject::new("road", ObjectKind::Road, pos(11, 10)).with_hits(4500, 5000));
        host.add_object(
            WorldObject::new("box", ObjectKind::Container, pos(15, 10)).with_hits(50_000, 250_000),
        );
        let agent = agent_at("a", 10, 10, Store::new(50, 50));
        assert_eq!(repair_target(&host, &agent, &room(), 10_000).unwrap().id.as_str(), "box");
    }

    #[test]
    fn test_safe_deposit_tiers() {
        let mut host = MockHost::new();
        host.add_object(
            WorldObject::new("spawn", ObjectKind::Spawn, pos(11, 10))
                .with_owner(Ownership::Mine)
                .with_store(0, 300),
        );
        host.add_object(
            WorldObject::new("storage", ObjectKind::Storage, pos(30, 30))
                .with_owner(Ownership::Mine)
                .with_store(0, 1_000_000),
        );
        let agent = agent_at("a", 10, 10, Store::new(50, 50));
        assert_eq!(safe_deposit(&host, &agent, &room()).unwrap().id.as_str(), "storage");
    }

    #[test]
    fn test_idle_spot_without_spawn_is_center() {
        let host = MockHost::new();
        let agent = agent_at("a", 10, 10, Store::new(0, 50));
        let (spot, range) = idle_spot(&host, &agent, &room());
        assert_eq!(spot, Position::center_of(&room()));
        assert_eq!(range, 5);
    }

    #[test]
    fn test_hostile_agents_before_structures() {
        let mut host = MockHost::new();
        host.add_object(
            WorldObject::new("core", ObjectKind::InvaderCore, pos(11, 10))
                .with_owner(Ownership::Hostile)
                .with_hits(1000, 1000),
        );
        host.add_object(
            WorldObject::new("raider", ObjectKind::HostileAgent, pos(40, 40))
                .with_owner(Ownership::Hostile)
                .with_hits(300, 300),
        );
        let agent = agent_at("a", 10, 10, Store::new(0, 0));
        assert_eq!(hostile_target(&host, &agent, &room()).unwrap().id.as_str(), "raider");
        host.objects.remove(&ObjectId::from("raider"));
        assert_eq!(hostile_target(&host, &agent, &room()).unwrap().id.as_str(), "core");
    }

    #[test]
    fn test_resolvers_are_total_on_empty_world() {
        let host = MockHost::new();
        let agent = agent_at("a", 10, 10, Store::new(10, 50));
        let r = room();
        assert!(energy_pickup(&host, &agent, &r).is_none());
        assert!(salvage(&host, &agent, &r).is_none());
        assert!(harvest_node(&host, &agent, &r).is_none());
        assert!(energy_sink(&host, &agent, &r).is_none());
        assert!(construction_site(&host, &agent, &r).is_none());
        assert!(repair_target(&host, &agent, &r, 10_000).is_none());
        assert!(controller(&host, &r).is_none());
        assert!(safe_deposit(&host, &agent, &r).is_none());
        assert!(hostile_target(&host, &agent, &r).is_none());
    }
}
