//! Tick entry point.
//!
//! The host builds an [`Engine`] (or reuses one; it holds no per-tick state),
//! loads the [`MemoryStore`], calls [`Engine::run_tick`] and saves the store.
//! Within a tick:
//!
//! 1. Records of agents the host no longer has are reclaimed.
//! 2. Expired cached routes are purged.
//! 3. Every live, non-spawning agent is dispatched, in id order.
//! 4. Every mission is evaluated once, then topped up with agents.

use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::behavior::BehaviorState;
use crate::config::{EngineConfig, MIN_TRANSITIONS_PER_TICK};
use crate::geometry::RoomName;
use crate::memory::MemoryStore;
use crate::mission::{self, FeasibilityReport, MissionError, MissionPhase, PhaseOutcome};
use crate::population;
use crate::roles::RoleRegistry;
use crate::route::RouteCache;
use crate::world::{Host, ObjectId};

/// Summary of one tick, for the host's logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub dispatched: usize,
    /// Agents whose chain was cut by the transition guard.
    pub halted: Vec<ObjectId>,
    /// Live agents skipped for an unknown role or missing record.
    pub skipped: Vec<ObjectId>,
    pub reclaimed: usize,
    pub routes_purged: usize,
    pub spawned: Vec<ObjectId>,
    pub advanced: Vec<(RoomName, MissionPhase, MissionPhase)>,
    pub completed: Vec<RoomName>,
}

pub struct Engine {
    config: EngineConfig,
    registry: RoleRegistry,
}

impl Engine {
    /// Engine with every built-in role registered.
    pub fn new(config: EngineConfig) -> Self {
        let config = checked(config);
        let registry = RoleRegistry::standard(&config);
        Self { config, registry }
    }

    pub fn with_registry(config: EngineConfig, registry: RoleRegistry) -> Self {
        Self {
            config: checked(config),
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn run_tick(&self, host: &mut dyn Host, memory: &mut MemoryStore) -> TickReport {
        let now = host.time();
        let mut report = TickReport {
            tick: now,
            ..TickReport::default()
        };

        let mut agents = host.agents();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        let live: BTreeSet<ObjectId> = agents.iter().map(|a| a.id.clone()).collect();
        let reclaimed = memory.retain_agents(&live);
        if !reclaimed.is_empty() {
            debug!("tick {}: reclaimed {} dead agent records", now, reclaimed.len());
        }
        report.reclaimed = reclaimed.len();
        report.routes_purged = RouteCache::new(&mut memory.routes, self.config.route_ttl).purge_expired(now);

        for agent in agents.iter().filter(|a| !a.spawning) {
            let Some(record) = memory.agents.get_mut(&agent.id) else {
                debug!("{}: no memory record, skipping", agent.id);
                report.skipped.push(agent.id.clone());
                continue;
            };
            let Some(behavior) = self.registry.get(&record.role_tag) else {
                warn!("{}: unknown role '{}', skipping", agent.id, record.role_tag);
                report.skipped.push(agent.id.clone());
                continue;
            };
            let outcome = behavior.dispatch(host, agent, record, self.config.max_transitions_per_tick);
            if outcome.halted {
                report.halted.push(agent.id.clone());
            }
            report.dispatched += 1;
        }

        let targets: Vec<RoomName> = memory.missions.keys().cloned().collect();
        for target in targets {
            let Some(mut mission) = memory.missions.remove(&target) else {
                continue;
            };
            match mission::evaluate(&mut *host, &mut mission, &self.config) {
                PhaseOutcome::Completed => {
                    info!(
                        "mission {} completed after {} ticks",
                        target,
                        now.saturating_sub(mission.created_tick)
                    );
                    report.completed.push(target);
                    continue;
                }
                PhaseOutcome::Advanced { from, to } => report.advanced.push((target.clone(), from, to)),
                PhaseOutcome::Stalled(_) => {}
            }
            let spawned = population::top_up(&mut *host, &mut memory.agents, &mut mission, &self.config);
            report.spawned.extend(spawned);
            memory.missions.insert(target, mission);
        }

        report
    }

    /// Validate and start a mission. No mission is recorded on error; the
    /// planned route stays cached either way.
    pub fn create_mission(
        &self,
        host: &dyn Host,
        memory: &mut MemoryStore,
        target: &RoomName,
        home: &RoomName,
        waypoints: &[RoomName],
    ) -> Result<FeasibilityReport, MissionError> {
        mission::create(host, memory, &self.config, target, home, waypoints)
    }

    /// Cancel a mission; see [`mission::abort`].
    pub fn abort_mission(&self, host: &mut dyn Host, memory: &mut MemoryStore, target: &RoomName) -> Option<usize> {
        mission::abort(&mut *host, memory, target)
    }

    /// Count live agents per behavior state, for host-side reporting.
    pub fn state_census(memory: &MemoryStore) -> [(BehaviorState, usize); 5] {
        let mut census = [
            (BehaviorState::Initial, 0),
            (BehaviorState::Idle, 0),
            (BehaviorState::Acquiring, 0),
            (BehaviorState::Working, 0),
            (BehaviorState::Returning, 0),
        ];
        for record in memory.agents.values() {
            if let Some(slot) = census.iter_mut().find(|(s, _)| *s == record.behavior_state) {
                slot.1 += 1;
            }
        }
        census
    }
}

/// Log every config problem and raise the transition guard to the smallest
/// cap under which agents can act at all.
fn checked(mut config: EngineConfig) -> EngineConfig {
    for problem in config.validate() {
        warn!("engine config: {}", problem);
    }
    if config.max_transitions_per_tick < MIN_TRANSITIONS_PER_TICK {
        config.max_transitions_per_tick = MIN_TRANSITIONS_PER_TICK;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::memory::AgentRecord;
    use crate::mission::MissionRecord;
    use crate::roles::tags;
    use crate::test_support::{agent_at, MockHost};
    use crate::world::{AgentView, ObjectKind, Ownership, Store, WorldObject};

    fn economy_host() -> MockHost {
        let mut host = MockHost::new();
        host.add_object(
            WorldObject::new("src", ObjectKind::Source, Position::new("W1N1", 11, 10)).with_store(3000, 3000),
        );
        host.add_object(
            WorldObject::new("spawn", ObjectKind::Spawn, Position::new("W1N1", 20, 20))
                .with_owner(Ownership::Mine)
                .with_store(0, 300),
        );
        host
    }

    #[test]
    fn test_reclaims_dead_and_skips_unknown() {
        let mut host = economy_host();
        host.add_agent(agent_at("h1", 10, 10, Store::new(0, 50)));
        host.add_agent(agent_at("x1", 10, 12, Store::new(0, 50)));
        let mut memory = MemoryStore::new();
        memory.agents.insert(ObjectId::from("h1"), AgentRecord::new(tags::HARVESTER));
        memory.agents.insert(ObjectId::from("x1"), AgentRecord::new("juggler"));
        memory.agents.insert(ObjectId::from("ghost"), AgentRecord::new(tags::HAULER));

        let engine = Engine::new(EngineConfig::default());
        let report = engine.run_tick(&mut host, &mut memory);
        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.skipped, vec![ObjectId::from("x1")]);
        assert!(memory.agent(&ObjectId::from("ghost")).is_none());
        assert_eq!(
            memory.agent(&ObjectId::from("h1")).unwrap().behavior_state,
            BehaviorState::Acquiring
        );
    }

    #[test]
    fn test_zero_guard_is_raised_so_agents_still_act() {
        let engine = Engine::new(EngineConfig {
            max_transitions_per_tick: 0,
            ..EngineConfig::default()
        });
        assert_eq!(engine.config().max_transitions_per_tick, MIN_TRANSITIONS_PER_TICK);

        let mut host = economy_host();
        host.add_agent(agent_at("h1", 10, 10, Store::new(0, 50)));
        let mut memory = MemoryStore::new();
        memory.agents.insert(ObjectId::from("h1"), AgentRecord::new(tags::HARVESTER));
        let report = engine.run_tick(&mut host, &mut memory);
        assert!(report.halted.is_empty());
        assert_eq!(
            memory.agent(&ObjectId::from("h1")).unwrap().behavior_state,
            BehaviorState::Acquiring
        );
        assert_eq!(host.intents.last().map(|i| i.1), Some(crate::world::Intent::Harvest));
    }

    #[test]
    fn test_spawning_agents_are_not_dispatched() {
        let mut host = economy_host();
        host.add_agent(AgentView {
            spawning: true,
            ..agent_at("h1", 10, 10, Store::new(0, 50))
        });
        let mut memory = MemoryStore::new();
        memory.agents.insert(ObjectId::from("h1"), AgentRecord::new(tags::HARVESTER));
        let report = Engine::new(EngineConfig::default()).run_tick(&mut host, &mut memory);
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.reclaimed, 0);
        assert!(host.intents.is_empty() && host.moves.is_empty());
    }

    #[test]
    fn test_resume_from_persisted_json() {
        // Tick N in one engine, tick N+1 in a brand-new one via the JSON store.
        let mut host = economy_host();
        host.add_agent(agent_at("h1", 10, 10, Store::new(0, 50)));
        let mut memory = MemoryStore::new();
        memory.agents.insert(ObjectId::from("h1"), AgentRecord::new(tags::HARVESTER));
        Engine::new(EngineConfig::default()).run_tick(&mut host, &mut memory);

        let json = memory.to_json().unwrap();
        let mut restored = MemoryStore::from_json(&json).unwrap();
        host.add_agent(agent_at("h1", 10, 10, Store::new(50, 50)));
        host.time += 1;
        Engine::new(EngineConfig::default()).run_tick(&mut host, &mut restored);
        let rec = restored.agent(&ObjectId::from("h1")).unwrap();
        assert_eq!(rec.behavior_state, BehaviorState::Working);
        assert_eq!(rec.remembered_target_ref, Some(ObjectId::from("spawn")));
    }

    #[test]
    fn test_mission_completion_deletes_record_same_tick() {
        let mut host = MockHost::new();
        host.add_object(
            WorldObject::new("spawn2", ObjectKind::Spawn, Position::new("W2N1", 25, 25)).with_owner(Ownership::Mine),
        );
        let mut memory = MemoryStore::new();
        let mut mission = MissionRecord::new(RoomName::from("W2N1"), RoomName::from("W1N1"), vec![], 0);
        mission.current_phase = MissionPhase::Building;
        memory.missions.insert(RoomName::from("W2N1"), mission);

        let report = Engine::new(EngineConfig::default()).run_tick(&mut host, &mut memory);
        assert_eq!(report.completed, vec![RoomName::from("W2N1")]);
        assert!(memory.missions.is_empty());
        assert!(host.spawned.is_empty());
    }

    #[test]
    fn test_mission_advances_then_staffs() {
        let mut host = MockHost::new();
        host.energy = 1000;
        host.add_route("W1N1", "W2N1", 1);
        host.add_object(WorldObject::new("ctrl", ObjectKind::Controller, Position::new("W2N1", 20, 20)));
        let mut memory = MemoryStore::new();
        let engine = Engine::new(EngineConfig::default());
        engine
            .create_mission(&host, &mut memory, &RoomName::from("W2N1"), &RoomName::from("W1N1"), &[])
            .unwrap();

        let report = engine.run_tick(&mut host, &mut memory);
        // Controller visible: straight to INVADING, and an invader is ordered.
        assert_eq!(
            report.advanced,
            vec![(RoomName::from("W2N1"), MissionPhase::Scouting, MissionPhase::Invading)]
        );
        assert_eq!(report.spawned.len(), 1);
        assert_eq!(host.spawned[0].role, tags::INVADER);
        let spawned = &memory.agents[&report.spawned[0]];
        assert_eq!(spawned.behavior_state, BehaviorState::Initial);
        assert_eq!(spawned.mission_phase, Some(MissionPhase::Invading));
    }

    #[test]
    fn test_abort_mission_via_engine() {
        let mut host = MockHost::new();
        host.add_route("W1N1", "W2N1", 1);
        let mut memory = MemoryStore::new();
        let engine = Engine::new(EngineConfig::default());
        engine
            .create_mission(&host, &mut memory, &RoomName::from("W2N1"), &RoomName::from("W1N1"), &[])
            .unwrap();
        assert_eq!(engine.abort_mission(&mut host, &mut memory, &RoomName::from("W2N1")), Some(0));
        assert!(memory.missions.is_empty());
    }

    #[test]
    fn test_state_census() {
        let mut memory = MemoryStore::new();
        memory.agents.insert(ObjectId::from("a"), AgentRecord::new(tags::HAULER));
        let mut working = AgentRecord::new(tags::HAULER);
        working.behavior_state = BehaviorState::Working;
        memory.agents.insert(ObjectId::from("b"), working);
        let census = Engine::state_census(&memory);
        assert_eq!(census[1], (BehaviorState::Idle, 1));
        assert_eq!(census[3], (BehaviorState::Working, 1));
    }
}
