//! Hivemind Headless Simulation Harness
//!
//! Drives the behavior engine tick by tick against a synthetic world,
//! persisting memory between ticks the way a real host process would.
//! Runs entirely in-process: no game server, no networking.
//!
//! Usage:
//!   cargo run -p hivemind-simtest
//!   cargo run -p hivemind-simtest -- --verbose

mod logger;
mod sim;

use std::collections::BTreeSet;

use hivemind_logic::behavior::BehaviorState;
use hivemind_logic::config::EngineConfig;
use hivemind_logic::engine::{Engine, TickReport};
use hivemind_logic::geometry::{Position, RoomName};
use hivemind_logic::memory::{AgentRecord, MemoryStore};
use hivemind_logic::mission::{MissionError, MissionPhase, MissionRecord};
use hivemind_logic::population::{self, CapacityLedger};
use hivemind_logic::resolver;
use hivemind_logic::roles::tags;
use hivemind_logic::world::{BodyPart, ObjectId, ObjectKind, Ownership, WorldView};
use serde::{Deserialize, Serialize};

use sim::{SimParams, SimWorld};

// ── Engine config (same JSON a deployed host ships) ─────────────────────
const CONFIG_JSON: &str = include_str!("../data/engine_config.json");

const SEED: u64 = 0x5eed;

/// What a bincode-persisting host writes between ticks.
#[derive(Debug, Serialize, Deserialize)]
struct SavedTick {
    tick: u64,
    memory: MemoryStore,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    logger::init(verbose);
    println!("=== Hivemind Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Engine config
    let (config_results, config) = validate_config(verbose);
    results.extend(config_results);

    // 2. Home economy cycle
    results.extend(validate_home_economy(&config, verbose));

    // 3. Stateless resume across persistence formats
    results.extend(validate_stateless_resume(&config, verbose));

    // 4. Memory recovery from damaged records
    results.extend(validate_memory_recovery(&config, verbose));

    // 5. Mission feasibility & routing
    results.extend(validate_feasibility(&config, verbose));

    // 6. Mission pipeline to completion
    results.extend(validate_mission_pipeline(&config, verbose));

    // 7. Mission abort
    results.extend(validate_mission_abort(&config, verbose));

    // 8. Stall warnings
    results.extend(validate_stall_warning(&config, verbose));

    // 9. Harvest capacity sweep
    results.extend(validate_capacity(&config, verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── Shared setup ────────────────────────────────────────────────────────

fn home() -> RoomName {
    RoomName::from("W1N1")
}

fn frontier() -> RoomName {
    RoomName::from("W2N1")
}

fn worker_body() -> Vec<BodyPart> {
    vec![
        BodyPart::Work,
        BodyPart::Carry,
        BodyPart::Move,
        BodyPart::Work,
        BodyPart::Carry,
        BodyPart::Move,
    ]
}

/// A home room with one agent of every local role and a little of
/// everything for them to do.
fn economy_world(seed: u64) -> (SimWorld, MemoryStore) {
    let room = home();
    let mut world = SimWorld::new(seed, SimParams::default());
    world.add_sources(&room, 2);
    world.add_spawn(Position::new(room.clone(), 25, 30), 0);
    world.add_controller(Position::new(room.clone(), 25, 19), Ownership::Mine, 1);
    world.add_site(Position::new(room.clone(), 28, 30), ObjectKind::Extension, 300);
    world.add_structure(
        Position::new(room.clone(), 22, 30),
        ObjectKind::Road,
        Ownership::Mine,
        1000,
        5000,
    );
    world.add_container(Position::new(room.clone(), 30, 25), 400);
    world.add_dropped(Position::new(room.clone(), 20, 28), 150);

    let mut memory = MemoryStore::new();
    for (role, x) in [
        (tags::HARVESTER, 24),
        (tags::HARVESTER, 25),
        (tags::HAULER, 26),
        (tags::UPGRADER, 27),
        (tags::BUILDER, 23),
        (tags::REPAIRER, 22),
    ] {
        let id = world.add_agent(role, worker_body(), Position::new(room.clone(), x, 31));
        memory.agents.insert(id, AgentRecord::new(role));
    }
    (world, memory)
}

/// A well-funded home room next to an unclaimed frontier room with one
/// hostile standing guard.
fn mission_world(seed: u64, hostile_hits: u32) -> SimWorld {
    let params = SimParams {
        income_per_tick: 15,
        level_cost: 300,
        spawn_site_cost: 600,
        ..SimParams::default()
    };
    let mut world = SimWorld::new(seed, params);
    let room = home();
    world.add_spawn(Position::new(room.clone(), 25, 30), 300);
    world.add_extensions(&Position::new(room.clone(), 20, 35), 8);
    world.add_controller(Position::new(room, 25, 19), Ownership::Mine, 3);

    let target = frontier();
    world.add_sources(&target, 2);
    world.add_controller(Position::new(target.clone(), 25, 19), Ownership::Unowned, 0);
    world.add_hostile(Position::new(target, 30, 30), hostile_hits);
    world
}

/// Totals over a stretch of ticks.
#[derive(Default)]
struct RunTotals {
    ticks: u64,
    dispatched: usize,
    halted: usize,
    skipped: usize,
    spawned: Vec<ObjectId>,
    /// Roles of everything spawned, read from memory as it was created.
    roles: BTreeSet<String>,
    advanced: Vec<(MissionPhase, MissionPhase)>,
    completed: Vec<RoomName>,
}

impl RunTotals {
    fn absorb(&mut self, report: TickReport) {
        self.ticks += 1;
        self.dispatched += report.dispatched;
        self.halted += report.halted.len();
        self.skipped += report.skipped.len();
        self.spawned.extend(report.spawned);
        self.advanced
            .extend(report.advanced.into_iter().map(|(_, from, to)| (from, to)));
        self.completed.extend(report.completed);
    }
}

/// Run up to `ticks` ticks with one engine and in-process memory, stopping
/// early once `done` holds.
fn run_ticks(
    engine: &Engine,
    world: &mut SimWorld,
    memory: &mut MemoryStore,
    ticks: u64,
    done: impl Fn(&RunTotals) -> bool,
) -> RunTotals {
    let mut totals = RunTotals::default();
    for _ in 0..ticks {
        let report = engine.run_tick(world, memory);
        world.end_tick();
        totals.roles.extend(
            report
                .spawned
                .iter()
                .filter_map(|id| memory.agent(id).map(|r| r.role_tag.clone())),
        );
        totals.absorb(report);
        if done(&totals) {
            break;
        }
    }
    totals
}

fn live_ids(world: &SimWorld) -> BTreeSet<ObjectId> {
    world.agents().into_iter().map(|a| a.id).collect()
}

fn census_line(memory: &MemoryStore) -> String {
    Engine::state_census(memory)
        .iter()
        .map(|(state, n)| format!("{:?}={}", state, n))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── 1. Engine Config ────────────────────────────────────────────────────

fn validate_config(verbose: bool) -> (Vec<TestResult>, EngineConfig) {
    println!("--- Engine Config ---");
    let mut results = Vec::new();

    let config = match EngineConfig::from_json(CONFIG_JSON) {
        Ok(c) => c,
        Err(e) => {
            results.push(TestResult {
                name: "config_parse".into(),
                passed: false,
                detail: format!("JSON parse error: {}", e),
            });
            return (results, EngineConfig::default());
        }
    };

    let errors = config.validate();
    results.push(TestResult {
        name: "config_valid".into(),
        passed: errors.is_empty(),
        detail: if errors.is_empty() {
            "shipped config passes validation".into()
        } else {
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        },
    });

    // Shipped values match the built-in defaults
    results.push(TestResult {
        name: "config_matches_defaults".into(),
        passed: config == EngineConfig::default(),
        detail: "data/engine_config.json restates the defaults".into(),
    });

    // A bad override is caught, not silently used
    let broken = EngineConfig {
        max_transitions_per_tick: 1,
        builder_extraction_fraction: 0.0,
        ..config.clone()
    };
    results.push(TestResult {
        name: "config_rejects_bad_values".into(),
        passed: broken.validate().len() == 2,
        detail: format!("{} problems reported", broken.validate().len()),
    });

    if verbose {
        println!(
            "  guard={} lifetime={}/{} floor={:.2}",
            config.max_transitions_per_tick,
            config.agent_lifetime,
            config.claimer_lifetime,
            config.active_share_floor
        );
    }

    (results, config)
}

// ── 2. Home Economy ─────────────────────────────────────────────────────

fn validate_home_economy(config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Home Economy ---");
    let mut results = Vec::new();

    let (mut world, mut memory) = economy_world(SEED);
    let engine = Engine::new(config.clone());
    let totals = run_ticks(&engine, &mut world, &mut memory, 600, |_| false);

    results.push(TestResult {
        name: "economy_guard_never_trips".into(),
        passed: totals.halted == 0,
        detail: format!(
            "{} dispatches, {} halted, {} skipped",
            totals.dispatched, totals.halted, totals.skipped
        ),
    });

    results.push(TestResult {
        name: "economy_energy_delivered".into(),
        passed: world.stats.harvested > 0 && world.stats.delivered > 0,
        detail: format!(
            "harvested {}, delivered {}",
            world.stats.harvested, world.stats.delivered
        ),
    });

    let objects = world.all_objects_in(&home());
    let sites_left = objects
        .iter()
        .filter(|o| o.kind == ObjectKind::ConstructionSite)
        .count();
    let extensions = objects
        .iter()
        .filter(|o| o.kind == ObjectKind::Extension)
        .count();
    results.push(TestResult {
        name: "economy_site_built".into(),
        passed: sites_left == 0 && extensions == 1,
        detail: format!("{} sites left, {} extensions standing", sites_left, extensions),
    });

    results.push(TestResult {
        name: "economy_controller_upgraded".into(),
        passed: world.stats.upgraded > 0,
        detail: format!("{} progress added", world.stats.upgraded),
    });

    let road = objects.iter().find(|o| o.kind == ObjectKind::Road);
    results.push(TestResult {
        name: "economy_road_repaired".into(),
        passed: road.map_or(false, |r| r.hits > 1000),
        detail: format!("road hits {:?}", road.map(|r| (r.hits, r.hits_max))),
    });

    let live = live_ids(&world);
    let recorded: BTreeSet<ObjectId> = memory.agents.keys().cloned().collect();
    results.push(TestResult {
        name: "economy_records_match_agents".into(),
        passed: live == recorded,
        detail: format!("{} agents, {} records", live.len(), recorded.len()),
    });

    if verbose {
        println!("  States after 600 ticks: {}", census_line(&memory));
        println!("  World stats: {:?}", world.stats);
    }

    results
}

// ── 3. Stateless Resume ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Persistence {
    /// One engine, memory never leaves the process.
    InProcess,
    /// A fresh engine every tick, memory through the JSON document.
    Json,
    /// A fresh engine every tick, memory through a bincode save.
    Bincode,
}

/// Run the economy and return the world fingerprint and final memory JSON.
fn run_persisted(config: &EngineConfig, mode: Persistence, ticks: u64) -> Result<(String, String), String> {
    let (mut world, memory) = economy_world(SEED);
    let shared = Engine::new(config.clone());
    let mut live = memory.clone();
    let mut json = memory.to_json().map_err(|e| e.to_string())?;
    let mut bytes = bincode::serialize(&SavedTick { tick: 0, memory })
        .map_err(|e| e.to_string())?;

    for _ in 0..ticks {
        match mode {
            Persistence::InProcess => {
                shared.run_tick(&mut world, &mut live);
            }
            Persistence::Json => {
                let mut memory = MemoryStore::from_json(&json).map_err(|e| e.to_string())?;
                Engine::new(config.clone()).run_tick(&mut world, &mut memory);
                json = memory.to_json().map_err(|e| e.to_string())?;
            }
            Persistence::Bincode => {
                let saved: SavedTick = bincode::deserialize(&bytes).map_err(|e| e.to_string())?;
                let mut memory = saved.memory;
                let report = Engine::new(config.clone()).run_tick(&mut world, &mut memory);
                bytes = bincode::serialize(&SavedTick {
                    tick: report.tick,
                    memory,
                })
                .map_err(|e| e.to_string())?;
            }
        }
        world.end_tick();
    }

    let memory = match mode {
        Persistence::InProcess => live,
        Persistence::Json => MemoryStore::from_json(&json).map_err(|e| e.to_string())?,
        Persistence::Bincode => {
            let saved: SavedTick = bincode::deserialize(&bytes).map_err(|e| e.to_string())?;
            if saved.tick + 1 != world.time() {
                return Err(format!("save is from tick {}, world at {}", saved.tick, world.time()));
            }
            saved.memory
        }
    };
    Ok((world.fingerprint(), memory.to_json().map_err(|e| e.to_string())?))
}

fn validate_stateless_resume(config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Stateless Resume ---");
    let mut results = Vec::new();
    let ticks = 300;

    let runs: Vec<(Persistence, Result<(String, String), String>)> =
        [Persistence::InProcess, Persistence::Json, Persistence::Bincode]
            .into_iter()
            .map(|mode| (mode, run_persisted(config, mode, ticks)))
            .collect();

    for (mode, run) in &runs {
        results.push(TestResult {
            name: format!("resume_{:?}_runs", mode).to_lowercase(),
            passed: run.is_ok(),
            detail: match run {
                Ok(_) => format!("{} ticks persisted", ticks),
                Err(e) => format!("persistence failed: {}", e),
            },
        });
    }

    if let (Some((_, Ok(base))), rest) = (runs.first(), &runs[1..]) {
        for (mode, run) in rest {
            let Ok(other) = run else {
                continue;
            };
            results.push(TestResult {
                name: format!("resume_{:?}_matches_in_process", mode).to_lowercase(),
                passed: other.0 == base.0 && other.1 == base.1,
                detail: format!(
                    "world identical: {}, memory identical: {}",
                    other.0 == base.0,
                    other.1 == base.1
                ),
            });
        }
        if verbose {
            println!("  Memory document after {} ticks: {} bytes", ticks, base.1.len());
        }
    }

    // Same seed, same run
    let again = run_persisted(config, Persistence::InProcess, ticks);
    let first = runs.first().and_then(|(_, r)| r.as_ref().ok());
    results.push(TestResult {
        name: "resume_deterministic".into(),
        passed: matches!((first, &again), (Some(a), Ok(b)) if a == b),
        detail: "two in-process runs from one seed agree".into(),
    });

    results
}

// ── 4. Memory Recovery ──────────────────────────────────────────────────

fn validate_memory_recovery(config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Memory Recovery ---");
    let mut results = Vec::new();

    let (mut world, mut memory) = economy_world(SEED);
    let engine = Engine::new(config.clone());
    run_ticks(&engine, &mut world, &mut memory, 50, |_| false);

    let victim = memory.agents.keys().next().cloned();
    let damaged = memory.to_json().ok().and_then(|json| {
        let mut doc: serde_json::Value = serde_json::from_str(&json).ok()?;
        let agents = doc.get_mut("agents")?.as_object_mut()?;
        let victim = victim.as_ref()?;
        agents.get_mut(victim.as_str())?["behaviorState"] = serde_json::json!(42);
        agents.insert("orphan".into(), serde_json::json!({ "behaviorState": "IDLE" }));
        Some(doc.to_string())
    });
    let Some(damaged) = damaged else {
        results.push(TestResult {
            name: "recovery_setup".into(),
            passed: false,
            detail: "could not build damaged document".into(),
        });
        return results;
    };

    let reloaded = MemoryStore::from_json(&damaged);
    let reset_ok = match (&reloaded, &victim) {
        (Ok(m), Some(id)) => m
            .agent(id)
            .map_or(false, |r| r.behavior_state == BehaviorState::Idle && r.remembered_source_ref.is_none()),
        _ => false,
    };
    results.push(TestResult {
        name: "recovery_resets_corrupt_record".into(),
        passed: reset_ok,
        detail: "unreadable record restarts IDLE with its role".into(),
    });

    let orphan_dropped = reloaded
        .as_ref()
        .map_or(false, |m| m.agent(&ObjectId::from("orphan")).is_none());
    results.push(TestResult {
        name: "recovery_drops_roleless_record".into(),
        passed: orphan_dropped,
        detail: "record without a role tag is dropped".into(),
    });

    let Ok(mut memory) = reloaded else {
        return results;
    };
    let totals = run_ticks(&engine, &mut world, &mut memory, 100, |_| false);
    results.push(TestResult {
        name: "recovery_run_continues".into(),
        passed: totals.halted == 0 && totals.skipped == 0 && memory.agents.len() == world.agents().len(),
        detail: format!(
            "{} dispatches after reload, {} halted, {} skipped",
            totals.dispatched, totals.halted, totals.skipped
        ),
    });

    if verbose {
        println!("  States after recovery: {}", census_line(&memory));
    }

    results
}

// ── 5. Feasibility & Routing ────────────────────────────────────────────

fn validate_feasibility(config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Mission Feasibility ---");
    let mut results = Vec::new();

    let mut world = SimWorld::new(SEED, SimParams::default());
    world.add_spawn(Position::new(home(), 25, 30), 300);
    let engine = Engine::new(config.clone());
    let mut memory = MemoryStore::new();

    // 14 rooms at 50 ticks each leaves a 600-tick claimer nothing
    let far = RoomName::from("W15N1");
    let far_result = engine.create_mission(&world, &mut memory, &far, &home(), &[]);
    results.push(TestResult {
        name: "feasibility_rejects_far_target".into(),
        passed: matches!(&far_result, Err(MissionError::Infeasible { .. })) && memory.missions.is_empty(),
        detail: match &far_result {
            Err(e) => e.to_string(),
            Ok(r) => format!("unexpectedly accepted: {}", r),
        },
    });

    // Two rooms is fine
    let near = RoomName::from("W3N1");
    let near_result = engine.create_mission(&world, &mut memory, &near, &home(), &[]);
    results.push(TestResult {
        name: "feasibility_accepts_near_target".into(),
        passed: near_result
            .as_ref()
            .map_or(false, |r| r.can_complete && r.working_ticks == 500),
        detail: match &near_result {
            Ok(r) => r.to_string(),
            Err(e) => e.to_string(),
        },
    });

    // Duplicate target
    let dup = engine.create_mission(&world, &mut memory, &near, &home(), &[]);
    results.push(TestResult {
        name: "feasibility_rejects_duplicate".into(),
        passed: matches!(dup, Err(MissionError::AlreadyExists(_))) && memory.missions.len() == 1,
        detail: format!("{} missions recorded", memory.missions.len()),
    });

    // A waypoint detour makes an adjacent room infeasible
    let detour = engine.create_mission(&world, &mut memory, &frontier(), &home(), &[RoomName::from("W1N7")]);
    results.push(TestResult {
        name: "feasibility_counts_waypoints".into(),
        passed: matches!(&detour, Err(MissionError::Infeasible { report, .. }) if report.travel_ticks == 650),
        detail: match &detour {
            Err(e) => e.to_string(),
            Ok(r) => format!("unexpectedly accepted: {}", r),
        },
    });

    // No route at all
    world.block_room(&RoomName::from("W4N1"));
    let walled = engine.create_mission(&world, &mut memory, &RoomName::from("W5N1"), &home(), &[]);
    results.push(TestResult {
        name: "feasibility_no_route".into(),
        passed: matches!(walled, Err(MissionError::NoRoute { .. })),
        detail: "blocked corridor yields no route".into(),
    });

    if verbose {
        for (key, route) in &memory.routes {
            println!(
                "    cached {} ({} rooms, expires {})",
                key, route.total_distance, route.expires_at
            );
        }
    }

    results
}

// ── 6. Mission Pipeline ─────────────────────────────────────────────────

fn validate_mission_pipeline(config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Mission Pipeline ---");
    let mut results = Vec::new();

    let mut world = mission_world(SEED, 600);
    let engine = Engine::new(config.clone());
    let mut memory = MemoryStore::new();
    let target = frontier();

    let created = engine.create_mission(&world, &mut memory, &target, &home(), &[]);
    results.push(TestResult {
        name: "pipeline_created".into(),
        passed: created.is_ok(),
        detail: match &created {
            Ok(r) => r.to_string(),
            Err(e) => e.to_string(),
        },
    });
    if created.is_err() {
        return results;
    }

    let totals = run_ticks(&engine, &mut world, &mut memory, 4000, |t| !t.completed.is_empty());

    let expected = [
        (MissionPhase::Scouting, MissionPhase::Invading),
        (MissionPhase::Invading, MissionPhase::Claiming),
        (MissionPhase::Claiming, MissionPhase::Upgrading),
        (MissionPhase::Upgrading, MissionPhase::Building),
    ];
    results.push(TestResult {
        name: "pipeline_phase_order".into(),
        passed: totals.advanced == expected,
        detail: format!("{:?}", totals.advanced),
    });

    results.push(TestResult {
        name: "pipeline_completed".into(),
        passed: totals.completed == vec![target.clone()] && memory.missions.is_empty(),
        detail: format!("finished after {} ticks", totals.ticks),
    });

    let spawn_standing = world
        .all_objects_in(&target)
        .iter()
        .any(|o| o.kind == ObjectKind::Spawn && o.owner == Ownership::Mine);
    let level = resolver::owned_controller(&world, &target).map(|c| c.level);
    results.push(TestResult {
        name: "pipeline_room_established".into(),
        passed: spawn_standing && level.map_or(false, |l| l >= config.target_controller_level),
        detail: format!("spawn={} controller level={:?}", spawn_standing, level),
    });

    let roles = &totals.roles;
    let wanted = [
        tags::SCOUT,
        tags::INVADER,
        tags::CLAIMER,
        tags::PIONEER_UPGRADER,
        tags::PIONEER_BUILDER,
    ];
    results.push(TestResult {
        name: "pipeline_every_role_served".into(),
        passed: wanted.iter().all(|r| roles.contains(*r)),
        detail: format!("roles seen: {:?}", roles),
    });

    results.push(TestResult {
        name: "pipeline_guard_never_trips".into(),
        passed: totals.halted == 0,
        detail: format!("{} dispatches, {} halted", totals.dispatched, totals.halted),
    });

    if verbose {
        println!(
            "  {} agents spawned, world stats: {:?}",
            totals.spawned.len(),
            world.stats
        );
        println!("  Live roles at completion: {:?}", world.role_census());
    }

    results
}

// ── 7. Mission Abort ────────────────────────────────────────────────────

fn validate_mission_abort(config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Mission Abort ---");
    let mut results = Vec::new();

    // A guard that cannot be beaten keeps the mission in INVADING
    let mut world = mission_world(SEED, 1_000_000_000);
    let engine = Engine::new(config.clone());
    let mut memory = MemoryStore::new();
    let target = frontier();
    if let Err(e) = engine.create_mission(&world, &mut memory, &target, &home(), &[]) {
        results.push(TestResult {
            name: "abort_setup".into(),
            passed: false,
            detail: e.to_string(),
        });
        return results;
    }
    run_ticks(&engine, &mut world, &mut memory, 200, |_| false);

    let phase = memory.missions.get(&target).map(|m| m.current_phase);
    let assigned = memory.missions.get(&target).map_or(0, MissionRecord::agent_count);
    results.push(TestResult {
        name: "abort_mission_staffed".into(),
        passed: phase == Some(MissionPhase::Invading) && assigned >= 2,
        detail: format!("phase {:?} with {} agents", phase, assigned),
    });

    let terminated = engine.abort_mission(&mut world, &mut memory, &target);
    let leftover_records = memory
        .agents
        .values()
        .filter(|r| r.mission_room.as_ref() == Some(&target))
        .count();
    let leftover_routes = memory
        .routes
        .keys()
        .filter(|k| k.contains(target.as_str()))
        .count();
    results.push(TestResult {
        name: "abort_cleans_up".into(),
        passed: terminated == Some(assigned)
            && memory.missions.is_empty()
            && leftover_records == 0
            && leftover_routes == 0,
        detail: format!(
            "terminated {:?}, {} records and {} routes left",
            terminated, leftover_records, leftover_routes
        ),
    });

    results.push(TestResult {
        name: "abort_unknown_is_none".into(),
        passed: engine.abort_mission(&mut world, &mut memory, &target).is_none(),
        detail: "second abort finds nothing".into(),
    });

    let after = run_ticks(&engine, &mut world, &mut memory, 50, |_| false);
    results.push(TestResult {
        name: "abort_no_respawn".into(),
        passed: after.spawned.is_empty() && world.role_census().is_empty(),
        detail: format!("{} spawned after abort", after.spawned.len()),
    });

    if verbose {
        println!("  World stats: {:?}", world.stats);
    }

    results
}

// ── 8. Stall Warnings ───────────────────────────────────────────────────

fn validate_stall_warning(config: &EngineConfig, _verbose: bool) -> Vec<TestResult> {
    println!("--- Stall Warnings ---");
    let mut results = Vec::new();

    let config = EngineConfig {
        stall_warning_ticks: 100,
        ..config.clone()
    };
    let mut world = mission_world(SEED, 1_000_000_000);
    let engine = Engine::new(config);
    let mut memory = MemoryStore::new();
    let target = frontier();
    if engine
        .create_mission(&world, &mut memory, &target, &home(), &[])
        .is_err()
    {
        results.push(TestResult {
            name: "stall_setup".into(),
            passed: false,
            detail: "mission rejected".into(),
        });
        return results;
    }

    let before = logger::warnings();
    run_ticks(&engine, &mut world, &mut memory, 350, |_| false);
    let raised = logger::warnings() - before;

    let phase = memory.missions.get(&target).map(|m| m.current_phase);
    results.push(TestResult {
        name: "stall_never_rolls_back".into(),
        passed: phase == Some(MissionPhase::Invading),
        detail: format!("phase {:?} after 350 ticks", phase),
    });

    // At most one warning per interval
    results.push(TestResult {
        name: "stall_warning_rate_limited".into(),
        passed: (1..=4).contains(&raised),
        detail: format!("{} warnings over 350 ticks at a 100-tick interval", raised),
    });

    results
}

// ── 9. Harvest Capacity ─────────────────────────────────────────────────

fn validate_capacity(config: &EngineConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Harvest Capacity ---");
    let mut results = Vec::new();

    // Split always adds up, and the active role never gets less
    let mut bad = Vec::new();
    for total in 0..=64u32 {
        for floor in [0.5f32, 0.6, 0.7, 0.8, 1.0] {
            for phase in [MissionPhase::Upgrading, MissionPhase::Building] {
                let split = population::split_capacity(total, phase, floor);
                let (active, other) = match phase {
                    MissionPhase::Upgrading => (split.upgrader_slots, split.builder_slots),
                    _ => (split.builder_slots, split.upgrader_slots),
                };
                if active + other != total || active < other {
                    bad.push((total, floor, phase));
                }
            }
        }
    }
    results.push(TestResult {
        name: "capacity_split_sweep".into(),
        passed: bad.is_empty(),
        detail: if bad.is_empty() {
            "650 splits add up with the active role ahead".into()
        } else {
            format!("{} bad splits, first {:?}", bad.len(), bad[0])
        },
    });

    let six = population::split_capacity(6, MissionPhase::Upgrading, 0.7);
    results.push(TestResult {
        name: "capacity_six_slot_split".into(),
        passed: (six.upgrader_slots, six.builder_slots) == (5, 1),
        detail: format!("{:?}", six),
    });

    // Ledger agrees with a brute-force count over several seeded rooms
    let mut mismatches = 0;
    let mut totals = Vec::new();
    for seed in 0..8u64 {
        let mut world = SimWorld::new(seed, SimParams::default());
        let room = frontier();
        world.add_sources(&room, 2);
        world.add_agent(tags::SCOUT, vec![BodyPart::Move], Position::center_of(&room));
        let ledger = CapacityLedger::survey(&world, &room, config.slot_extraction_rate);
        // Walkable tiles per source, capped by what its refill rate sustains
        let brute: u32 = world
            .objects_in(&room)
            .iter()
            .filter(|o| o.kind == ObjectKind::Source)
            .map(|o| {
                let tiles = o.pos.neighbors().iter().filter(|p| world.is_walkable(p)).count() as u32;
                let per_tick = o.store.capacity / o.regen_ticks.max(1);
                let sustained = (per_tick as f32 / config.slot_extraction_rate).floor().max(1.0) as u32;
                tiles.min(sustained)
            })
            .sum();
        if ledger.total() != brute || ledger.nodes.len() != 2 {
            mismatches += 1;
        }
        totals.push(ledger.total());

        // Staffing never exceeds what the slots support
        let mut mission = MissionRecord::new(room.clone(), home(), Vec::new(), 0);
        mission.current_phase = MissionPhase::Upgrading;
        let split = population::split_capacity(ledger.total(), mission.current_phase, config.active_share_floor);
        let cap = population::agents_for_slots(split.builder_slots, config.builder_extraction_fraction);
        let plan = population::plan_staffing(&world, &mission, config);
        if plan
            .iter()
            .any(|s| s.role == tags::PIONEER_BUILDER && s.wanted > cap)
        {
            mismatches += 1;
        }
    }
    results.push(TestResult {
        name: "capacity_ledger_matches_terrain".into(),
        passed: mismatches == 0,
        detail: format!("slot totals {:?}", totals),
    });

    if verbose {
        for total in [4u32, 6, 10, 16] {
            let split = population::split_capacity(total, MissionPhase::Building, config.active_share_floor);
            println!(
                "    {:2} slots in BUILDING: {} upgrader / {} builder",
                total, split.upgrader_slots, split.builder_slots
            );
        }
    }

    results
}
