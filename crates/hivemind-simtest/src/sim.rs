//! Synthetic world the harness drives the engine against.
//!
//! Rooms sit on the compass grid. Objects and agents are hecs entities; the
//! engine only ever sees them through the collaborator traits. Intents and
//! moves queue during a tick and resolve in [`SimWorld::end_tick`], in id
//! order, so a run is a pure function of its seed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write;

use hecs::{Entity, World};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hivemind_logic::geometry::{Position, RoomName, ROOM_SIZE};
use hivemind_logic::roles::tags;
use hivemind_logic::world::{
    body_cost, Actuator, AgentView, BodyComposer, BodyPart, Intent, MoveOutcome, Movement,
    ObjectId, ObjectKind, Ownership, Placement, PlacementResult, ReturnCode, Route, RoutePlanner,
    SpawnRequest, SpawnResult, Spawner, Store, WorldObject, WorldView,
};

// ============================================================================
// COMPONENTS
// ============================================================================

/// Stable id of an entity.
struct Tag(ObjectId);

struct Hits {
    hits: u32,
    max: u32,
}

/// Construction or controller progress.
struct Progress {
    progress: u32,
    total: u32,
}

struct Level(u8);

/// What a construction site becomes.
struct SiteOf(ObjectKind);

/// Removed once the clock reaches this tick.
struct Decay(u64);

/// Refills to capacity on every regeneration tick.
struct Regen;

/// A spawn's queue.
struct Spawning {
    busy_until: u64,
}

/// One of our agents.
struct Creep {
    role: String,
    body: Vec<BodyPart>,
    ready_at: u64,
    dies_at: u64,
}

const SCOUT_UNIT: &[BodyPart] = &[BodyPart::Move];
const CLAIMER_UNIT: &[BodyPart] = &[BodyPart::Claim, BodyPart::Move];
const INVADER_UNIT: &[BodyPart] = &[BodyPart::Attack, BodyPart::Move];
const WORKER_UNIT: &[BodyPart] = &[BodyPart::Work, BodyPart::Carry, BodyPart::Move];

// ============================================================================
// PARAMETERS & STATS
// ============================================================================

#[derive(Debug, Clone)]
pub struct SimParams {
    pub agent_lifetime: u32,
    pub claimer_lifetime: u32,
    /// Spawn time per body part.
    pub ticks_per_part: u64,
    /// Energy credited to our spawns and extensions every tick.
    pub income_per_tick: u32,
    /// Controller progress needed per level, times the level.
    pub level_cost: u32,
    pub spawn_site_cost: u32,
    pub source_capacity: u32,
    pub regen_ticks: u64,
    /// Lifetime of drops and tombstones.
    pub remains_ticks: u64,
    /// Largest number of body units a composed body repeats.
    pub max_units: u32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            agent_lifetime: 1500,
            claimer_lifetime: 600,
            ticks_per_part: 3,
            income_per_tick: 0,
            level_cost: 1000,
            spawn_site_cost: 1500,
            source_capacity: 3000,
            regen_ticks: 300,
            remains_ticks: 100,
            max_units: 5,
        }
    }
}

/// What happened in the world, summed over the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub harvested: u32,
    pub delivered: u32,
    pub built: u32,
    pub upgraded: u32,
    pub repaired: u32,
    pub damage: u32,
    pub spawned: u32,
    pub died: u32,
    pub terminated: u32,
    /// Intents refused for a reason other than range.
    pub rejected: u32,
}

// ============================================================================
// WORLD
// ============================================================================

pub struct SimWorld {
    world: World,
    index: BTreeMap<ObjectId, Entity>,
    time: u64,
    serial: u64,
    walls: BTreeSet<Position>,
    blocked: BTreeSet<RoomName>,
    intents: BTreeMap<ObjectId, (Intent, ObjectId)>,
    moves: BTreeMap<ObjectId, Position>,
    rng: StdRng,
    pub params: SimParams,
    pub stats: SimStats,
}

impl SimWorld {
    pub fn new(seed: u64, params: SimParams) -> Self {
        Self {
            world: World::new(),
            index: BTreeMap::new(),
            time: 1,
            serial: 0,
            walls: BTreeSet::new(),
            blocked: BTreeSet::new(),
            intents: BTreeMap::new(),
            moves: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            params,
            stats: SimStats::default(),
        }
    }

    fn mint(&mut self, prefix: &str) -> ObjectId {
        self.serial += 1;
        ObjectId::new(format!("{}{:04}", prefix, self.serial))
    }

    fn insert(&mut self, prefix: &str, kind: ObjectKind, owner: Ownership, pos: Position) -> (ObjectId, Entity) {
        let id = self.mint(prefix);
        let entity = self
            .world
            .spawn((Tag(id.clone()), kind, owner, pos, Store::default()));
        self.index.insert(id.clone(), entity);
        (id, entity)
    }

    fn attach<C: hecs::Component>(&mut self, entity: Entity, component: C) {
        let _ = self.world.insert_one(entity, component);
    }

    fn remove(&mut self, id: &ObjectId) {
        if let Some(entity) = self.index.remove(id) {
            let _ = self.world.despawn(entity);
        }
    }

    // ── Scenario building ──────────────────────────────────────────────

    /// Scatter sources over a room, each with up to three wall tiles along
    /// its north side.
    pub fn add_sources(&mut self, room: &RoomName, count: usize) -> Vec<ObjectId> {
        let center = Position::center_of(room);
        let mut placed: Vec<Position> = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..count {
            let mut spot = None;
            for _ in 0..200 {
                let pos = Position::new(room.clone(), self.rng.gen_range(6..44), self.rng.gen_range(6..44));
                let clear = pos.range_to(&center) >= 8 && placed.iter().all(|p| p.range_to(&pos) >= 6);
                if clear && self.occupant(&pos).is_none() {
                    spot = Some(pos);
                    break;
                }
            }
            let Some(pos) = spot else {
                continue;
            };
            let walls = self.rng.gen_range(0..=3u8);
            for dx in 0..walls {
                self.walls
                    .insert(Position::new(room.clone(), pos.x - 1 + dx, pos.y - 1));
            }
            let capacity = self.params.source_capacity;
            let (id, entity) = self.insert("src", ObjectKind::Source, Ownership::Unowned, pos.clone());
            self.attach(entity, Store::new(capacity, capacity));
            self.attach(entity, Regen);
            placed.push(pos);
            ids.push(id);
        }
        ids
    }

    pub fn add_spawn(&mut self, pos: Position, energy: u32) -> ObjectId {
        let (id, entity) = self.insert("spn", ObjectKind::Spawn, Ownership::Mine, pos);
        self.attach(entity, Store::new(energy.min(300), 300));
        self.attach(entity, Hits { hits: 5000, max: 5000 });
        self.attach(entity, Spawning { busy_until: 0 });
        id
    }

    /// A row of full extensions starting at `first`, running east.
    pub fn add_extensions(&mut self, first: &Position, count: u8) {
        for i in 0..count {
            let pos = Position::new(first.room.clone(), first.x + i, first.y);
            let (_, entity) = self.insert("ext", ObjectKind::Extension, Ownership::Mine, pos);
            self.attach(entity, Store::new(50, 50));
            self.attach(entity, Hits { hits: 1000, max: 1000 });
        }
    }

    pub fn add_controller(&mut self, pos: Position, owner: Ownership, level: u8) -> ObjectId {
        let total = self.params.level_cost * level.max(1) as u32;
        let (id, entity) = self.insert("ctl", ObjectKind::Controller, owner, pos);
        self.attach(entity, Level(level));
        self.attach(entity, Progress { progress: 0, total });
        id
    }

    pub fn add_site(&mut self, pos: Position, kind: ObjectKind, total: u32) -> ObjectId {
        let (id, entity) = self.insert("cs", ObjectKind::ConstructionSite, Ownership::Mine, pos);
        self.attach(entity, SiteOf(kind));
        self.attach(entity, Progress { progress: 0, total });
        id
    }

    pub fn add_structure(&mut self, pos: Position, kind: ObjectKind, owner: Ownership, hits: u32, max: u32) -> ObjectId {
        let (id, entity) = self.insert("st", kind, owner, pos);
        self.attach(entity, Hits { hits, max });
        id
    }

    pub fn add_container(&mut self, pos: Position, energy: u32) -> ObjectId {
        let id = self.add_structure(pos, ObjectKind::Container, Ownership::Unowned, 5000, 5000);
        if let Some(&entity) = self.index.get(&id) {
            self.attach(entity, Store::new(energy, 2000));
        }
        id
    }

    pub fn add_dropped(&mut self, pos: Position, amount: u32) -> ObjectId {
        let until = self.time + self.params.remains_ticks;
        let (id, entity) = self.insert("drp", ObjectKind::Dropped, Ownership::Unowned, pos);
        self.attach(entity, Store::new(amount, amount));
        self.attach(entity, Decay(until));
        id
    }

    pub fn add_hostile(&mut self, pos: Position, hits: u32) -> ObjectId {
        let (id, entity) = self.insert("hos", ObjectKind::HostileAgent, Ownership::Hostile, pos);
        self.attach(entity, Hits { hits, max: hits });
        id
    }

    /// An agent that is ready to act this tick.
    pub fn add_agent(&mut self, role: &str, body: Vec<BodyPart>, pos: Position) -> ObjectId {
        let id = self.mint("c");
        let creep = Creep {
            role: role.to_string(),
            dies_at: self.time + self.params.agent_lifetime as u64,
            ready_at: self.time,
            body,
        };
        let carry = 50 * creep.body.iter().filter(|p| **p == BodyPart::Carry).count() as u32;
        let entity = self
            .world
            .spawn((Tag(id.clone()), pos, Store::new(0, carry), creep));
        self.index.insert(id.clone(), entity);
        id
    }

    /// Make a room impassable to movement and routing.
    pub fn block_room(&mut self, room: &RoomName) {
        self.blocked.insert(room.clone());
    }

    // ── Inspection ─────────────────────────────────────────────────────

    /// Any object or agent standing on a tile.
    fn occupant(&self, pos: &Position) -> Option<Entity> {
        self.index.values().copied().find(|&e| {
            self.world
                .get::<&Position>(e)
                .map(|p| *p == *pos)
                .unwrap_or(false)
        })
    }

    fn snapshot(&self, entity: Entity) -> Option<WorldObject> {
        if self.world.get::<&Creep>(entity).is_ok() {
            return None;
        }
        let id = self.world.get::<&Tag>(entity).ok()?.0.clone();
        let kind = *self.world.get::<&ObjectKind>(entity).ok()?;
        let pos = (*self.world.get::<&Position>(entity).ok()?).clone();
        let mut obj = WorldObject::new(id.0, kind, pos);
        if let Ok(owner) = self.world.get::<&Ownership>(entity) {
            obj.owner = *owner;
        }
        if let Ok(store) = self.world.get::<&Store>(entity) {
            obj.store = *store;
        }
        if let Ok(hits) = self.world.get::<&Hits>(entity) {
            obj.hits = hits.hits;
            obj.hits_max = hits.max;
        }
        if let Ok(progress) = self.world.get::<&Progress>(entity) {
            obj.progress = progress.progress;
            obj.progress_total = progress.total;
        }
        if let Ok(level) = self.world.get::<&Level>(entity) {
            obj.level = level.0;
        }
        if let Ok(site) = self.world.get::<&SiteOf>(entity) {
            obj.site_kind = Some(site.0);
        }
        if self.world.get::<&Regen>(entity).is_ok() {
            obj.regen_ticks = u32::try_from(self.params.regen_ticks).unwrap_or(u32::MAX);
        }
        Some(obj)
    }

    fn agent_view(&self, entity: Entity) -> Option<AgentView> {
        let creep = self.world.get::<&Creep>(entity).ok()?;
        Some(AgentView {
            id: self.world.get::<&Tag>(entity).ok()?.0.clone(),
            pos: (*self.world.get::<&Position>(entity).ok()?).clone(),
            store: self.world.get::<&Store>(entity).map(|s| *s).unwrap_or_default(),
            body: creep.body.clone(),
            ticks_to_live: Some(creep.dies_at.saturating_sub(self.time) as u32),
            spawning: self.time < creep.ready_at,
        })
    }

    /// Live agents per role.
    pub fn role_census(&self) -> BTreeMap<String, usize> {
        let mut census = BTreeMap::new();
        for (_, creep) in self.world.query::<&Creep>().iter() {
            *census.entry(creep.role.clone()).or_insert(0) += 1;
        }
        census
    }

    /// Every object in a room regardless of visibility.
    pub fn all_objects_in(&self, room: &RoomName) -> Vec<WorldObject> {
        self.index
            .values()
            .filter_map(|&e| self.snapshot(e))
            .filter(|o| &o.pos.room == room)
            .collect()
    }

    /// Text dump of the whole world, for comparing runs.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "t={} {:?}", self.time, self.stats);
        for &entity in self.index.values() {
            if let Some(agent) = self.agent_view(entity) {
                let _ = writeln!(out, "{:?}", agent);
            } else if let Some(obj) = self.snapshot(entity) {
                let _ = writeln!(out, "{:?}", obj);
            }
        }
        out
    }

    // ── Store helpers ──────────────────────────────────────────────────

    fn with_store(&mut self, entity: Entity, f: impl FnOnce(&mut Store)) {
        if let Ok(mut store) = self.world.get::<&mut Store>(entity) {
            f(&mut *store);
        }
    }

    fn shift(&mut self, from: Entity, to: Entity, amount: u32) {
        self.with_store(from, |s| s.used -= amount);
        self.with_store(to, |s| s.used += amount);
    }

    /// Our spawns and extensions in a room, in id order.
    fn spawn_class_in(&self, room: Option<&RoomName>) -> Vec<Entity> {
        self.index
            .values()
            .copied()
            .filter(|&e| {
                self.snapshot(e).map_or(false, |o| {
                    o.kind.is_spawn_class()
                        && o.owner == Ownership::Mine
                        && room.map_or(true, |r| &o.pos.room == r)
                })
            })
            .collect()
    }

    // ── Movement ───────────────────────────────────────────────────────

    fn passable(&self, pos: &Position) -> bool {
        self.is_walkable(pos) && !self.blocked.contains(&pos.room)
    }

    /// First step of a shortest in-room path to any tile within `range`.
    fn path_step(&self, from: &Position, to: &Position, range: u32) -> Option<Position> {
        let size = ROOM_SIZE as usize;
        let index = |x: u8, y: u8| y as usize * size + x as usize;
        let mut prev: Vec<Option<(u8, u8)>> = vec![None; size * size];
        let mut seen = vec![false; size * size];
        let mut queue = VecDeque::new();
        seen[index(from.x, from.y)] = true;
        queue.push_back(from.clone());

        while let Some(cur) = queue.pop_front() {
            if cur.in_range_to(to, range) {
                let mut step = (cur.x, cur.y);
                while let Some(back) = prev[index(step.0, step.1)] {
                    if back == (from.x, from.y) {
                        return Some(Position::new(from.room.clone(), step.0, step.1));
                    }
                    step = back;
                }
                return None;
            }
            for next in cur.neighbors() {
                let i = index(next.x, next.y);
                if seen[i] || !self.passable(&next) {
                    continue;
                }
                seen[i] = true;
                prev[i] = Some((cur.x, cur.y));
                queue.push_back(next);
            }
        }
        None
    }

    /// Next tile toward `to`. Across rooms: path to the gate tile nearest the
    /// destination, then step straight over the border.
    fn next_step(&self, from: &Position, to: &Position, range: u32) -> Option<Position> {
        if from.room == to.room {
            return self.path_step(from, to, range);
        }
        let (fx, fy) = from.global()?;
        let (tx, ty) = to.global()?;
        let (ox, oy) = (fx - from.x as i32, fy - from.y as i32);
        let gate = Position::new(
            from.room.clone(),
            (tx - ox).clamp(1, ROOM_SIZE - 2) as u8,
            (ty - oy).clamp(1, ROOM_SIZE - 2) as u8,
        );
        let edge = ROOM_SIZE as u8 - 1;
        let on_edge = from.x == 0 || from.y == 0 || from.x == edge || from.y == edge;
        if !on_edge && *from != gate {
            return self.path_step(from, &gate, 0);
        }
        let (dx, dy) = ((tx - fx).signum(), (ty - fy).signum());
        [(dx, dy), (dx, 0), (0, dy)]
            .into_iter()
            .filter(|d| *d != (0, 0))
            .map(|(sx, sy)| Position::from_global(fx + sx, fy + sy))
            .find(|p| self.passable(p))
    }

    // ── Intents ────────────────────────────────────────────────────────

    fn check_intent(&self, me: &AgentView, intent: Intent, obj: &WorldObject) -> ReturnCode {
        if !me.pos.in_range_to(&obj.pos, intent.range()) {
            return ReturnCode::NotInRange;
        }
        let needs = match intent {
            Intent::Harvest | Intent::Build | Intent::Repair | Intent::Upgrade => Some(BodyPart::Work),
            Intent::Claim => Some(BodyPart::Claim),
            Intent::Attack => Some(BodyPart::Attack),
            _ => None,
        };
        if needs.map_or(false, |part| me.parts(part) == 0) {
            return ReturnCode::NoBodyPart;
        }
        match intent {
            Intent::Harvest if obj.kind != ObjectKind::Source => ReturnCode::InvalidTarget,
            Intent::Pickup if obj.kind != ObjectKind::Dropped => ReturnCode::InvalidTarget,
            Intent::Harvest | Intent::Pickup | Intent::Withdraw => {
                if obj.owner == Ownership::Hostile {
                    ReturnCode::NotOwner
                } else if obj.store.is_empty() {
                    ReturnCode::NotEnoughResources
                } else if me.store.is_full() {
                    ReturnCode::Full
                } else {
                    ReturnCode::Ok
                }
            }
            Intent::Transfer if me.store.is_empty() => ReturnCode::NotEnoughResources,
            Intent::Transfer if obj.store.free() == 0 => ReturnCode::Full,
            Intent::Build if obj.kind != ObjectKind::ConstructionSite || obj.owner != Ownership::Mine => {
                ReturnCode::InvalidTarget
            }
            Intent::Repair if !obj.kind.is_structure() || obj.hits >= obj.hits_max => ReturnCode::InvalidTarget,
            Intent::Upgrade if obj.kind != ObjectKind::Controller => ReturnCode::InvalidTarget,
            Intent::Upgrade if obj.owner != Ownership::Mine => ReturnCode::NotOwner,
            Intent::Build | Intent::Repair | Intent::Upgrade if me.store.is_empty() => {
                ReturnCode::NotEnoughResources
            }
            Intent::Claim if obj.kind != ObjectKind::Controller || obj.owner != Ownership::Unowned => {
                ReturnCode::InvalidTarget
            }
            Intent::Attack if obj.owner != Ownership::Hostile => ReturnCode::InvalidTarget,
            _ => ReturnCode::Ok,
        }
    }

    fn resolve(&mut self, agent: &ObjectId, intent: Intent, target: &ObjectId) {
        let (Some(me), Some(obj)) = (self.agent(agent), self.object(target)) else {
            return;
        };
        // Earlier intents this tick may have changed either side.
        if self.check_intent(&me, intent, &obj) != ReturnCode::Ok {
            return;
        }
        let (Some(&me_e), Some(&obj_e)) = (self.index.get(agent), self.index.get(target)) else {
            return;
        };
        let work = me.parts(BodyPart::Work) as u32;

        match intent {
            Intent::Harvest => {
                let amount = (2 * work).min(obj.store.used).min(me.store.free());
                self.shift(obj_e, me_e, amount);
                self.stats.harvested += amount;
            }
            Intent::Pickup | Intent::Withdraw => {
                let amount = obj.store.used.min(me.store.free());
                self.shift(obj_e, me_e, amount);
                if obj.kind == ObjectKind::Dropped && amount == obj.store.used {
                    self.remove(target);
                }
            }
            Intent::Transfer => {
                let amount = me.store.used.min(obj.store.free());
                self.shift(me_e, obj_e, amount);
                self.stats.delivered += amount;
            }
            Intent::Build => {
                let remaining = obj.progress_total.saturating_sub(obj.progress);
                let amount = (5 * work).min(me.store.used).min(remaining);
                self.with_store(me_e, |s| s.used -= amount);
                self.stats.built += amount;
                if amount >= remaining {
                    self.finish_site(target, &obj);
                } else if let Ok(mut progress) = self.world.get::<&mut Progress>(obj_e) {
                    progress.progress += amount;
                }
            }
            Intent::Repair => {
                let energy = work.min(me.store.used);
                let healed = (energy * 100).min(obj.hits_max - obj.hits);
                self.with_store(me_e, |s| s.used -= energy);
                self.stats.repaired += healed;
                if let Ok(mut hits) = self.world.get::<&mut Hits>(obj_e) {
                    hits.hits += healed;
                }
            }
            Intent::Upgrade => {
                let amount = work.min(me.store.used);
                self.with_store(me_e, |s| s.used -= amount);
                self.stats.upgraded += amount;
                self.advance_controller(obj_e, &obj, amount);
            }
            Intent::Claim => {
                let total = self.params.level_cost;
                let _ = self
                    .world
                    .insert(obj_e, (Ownership::Mine, Level(1), Progress { progress: 0, total }));
            }
            Intent::Attack => {
                let damage = 30 * me.parts(BodyPart::Attack) as u32;
                let left = obj.hits.saturating_sub(damage);
                self.stats.damage += obj.hits - left;
                if left == 0 {
                    self.remove(target);
                } else if let Ok(mut hits) = self.world.get::<&mut Hits>(obj_e) {
                    hits.hits = left;
                }
            }
        }
    }

    fn advance_controller(&mut self, entity: Entity, ctrl: &WorldObject, amount: u32) {
        let mut level = ctrl.level;
        let mut progress = ctrl.progress + amount;
        let mut total = ctrl.progress_total;
        while total > 0 && progress >= total && level < 8 {
            progress -= total;
            level += 1;
            total = self.params.level_cost * level as u32;
        }
        let _ = self.world.insert(entity, (Level(level), Progress { progress, total }));
    }

    /// Replace a finished site with the structure it was for.
    fn finish_site(&mut self, site: &ObjectId, obj: &WorldObject) {
        self.remove(site);
        let pos = obj.pos.clone();
        match obj.site_kind {
            Some(ObjectKind::Spawn) => {
                self.add_spawn(pos, 0);
            }
            Some(ObjectKind::Extension) => {
                let (_, entity) = self.insert("ext", ObjectKind::Extension, Ownership::Mine, pos);
                self.attach(entity, Store::new(0, 50));
                self.attach(entity, Hits { hits: 1000, max: 1000 });
            }
            Some(kind) => {
                self.add_structure(pos, kind, Ownership::Mine, 1000, 1000);
            }
            None => {}
        }
    }

    // ── Tick end ───────────────────────────────────────────────────────

    /// Resolve this tick's intents and moves, then advance the clock.
    pub fn end_tick(&mut self) {
        let intents = std::mem::take(&mut self.intents);
        for (agent, (intent, target)) in intents {
            self.resolve(&agent, intent, &target);
        }
        let moves = std::mem::take(&mut self.moves);
        for (agent, step) in moves {
            if let Some(&entity) = self.index.get(&agent) {
                if let Ok(mut pos) = self.world.get::<&mut Position>(entity) {
                    *pos = step;
                }
            }
        }

        self.time += 1;
        self.regenerate();
        self.expire();
    }

    fn regenerate(&mut self) {
        if self.params.regen_ticks > 0 && self.time % self.params.regen_ticks == 0 {
            for (_, (store, _)) in self.world.query_mut::<(&mut Store, &Regen)>() {
                store.used = store.capacity;
            }
        }
        let mut income = self.params.income_per_tick;
        for entity in self.spawn_class_in(None) {
            if income == 0 {
                break;
            }
            self.with_store(entity, |s| {
                let add = s.free().min(income);
                s.used += add;
                income -= add;
            });
        }
    }

    fn expire(&mut self) {
        let now = self.time;
        let decayed: Vec<ObjectId> = self
            .world
            .query::<(&Tag, &Decay)>()
            .iter()
            .filter(|(_, (_, decay))| decay.0 <= now)
            .map(|(_, (tag, _))| tag.0.clone())
            .collect();
        for id in &decayed {
            self.remove(id);
        }

        let mut dead: Vec<(ObjectId, Position, Store)> = self
            .world
            .query::<(&Tag, &Creep, &Position, &Store)>()
            .iter()
            .filter(|(_, (_, creep, _, _))| creep.dies_at <= now)
            .map(|(_, (tag, _, pos, store))| (tag.0.clone(), pos.clone(), *store))
            .collect();
        dead.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, pos, store) in dead {
            self.remove(&id);
            self.stats.died += 1;
            if !store.is_empty() {
                let until = now + self.params.remains_ticks;
                let (_, entity) = self.insert("tmb", ObjectKind::Tombstone, Ownership::Unowned, pos);
                self.attach(entity, Store::new(store.used, store.used));
                self.attach(entity, Decay(until));
            }
        }
    }
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

impl WorldView for SimWorld {
    fn time(&self) -> u64 {
        self.time
    }

    /// Rooms where we have an agent or own something.
    fn is_visible(&self, room: &RoomName) -> bool {
        self.index.values().any(|&e| {
            let in_room = self
                .world
                .get::<&Position>(e)
                .map(|p| &p.room == room)
                .unwrap_or(false);
            in_room
                && (self.world.get::<&Creep>(e).is_ok()
                    || matches!(self.world.get::<&Ownership>(e).map(|o| *o), Ok(Ownership::Mine)))
        })
    }

    fn object(&self, id: &ObjectId) -> Option<WorldObject> {
        let obj = self.snapshot(*self.index.get(id)?)?;
        self.is_visible(&obj.pos.room).then_some(obj)
    }

    fn objects_in(&self, room: &RoomName) -> Vec<WorldObject> {
        if !self.is_visible(room) {
            return Vec::new();
        }
        self.all_objects_in(room)
    }

    fn agents(&self) -> Vec<AgentView> {
        self.index.values().filter_map(|&e| self.agent_view(e)).collect()
    }

    fn agent(&self, id: &ObjectId) -> Option<AgentView> {
        self.agent_view(*self.index.get(id)?)
    }

    fn is_walkable(&self, pos: &Position) -> bool {
        !self.walls.contains(pos)
    }
}

impl Actuator for SimWorld {
    fn perform(&mut self, agent: &ObjectId, intent: Intent, target: &ObjectId) -> ReturnCode {
        let (Some(me), Some(obj)) = (self.agent(agent), self.object(target)) else {
            return ReturnCode::NotFound;
        };
        if me.spawning {
            return ReturnCode::Busy;
        }
        let code = self.check_intent(&me, intent, &obj);
        match code {
            ReturnCode::Ok => {
                self.intents.insert(agent.clone(), (intent, target.clone()));
            }
            ReturnCode::NotInRange => {}
            _ => self.stats.rejected += 1,
        }
        code
    }

    fn terminate(&mut self, agent: &ObjectId) -> ReturnCode {
        if self.agent(agent).is_none() {
            return ReturnCode::NotFound;
        }
        self.remove(agent);
        self.intents.remove(agent);
        self.moves.remove(agent);
        self.stats.terminated += 1;
        ReturnCode::Ok
    }
}

impl Movement for SimWorld {
    fn move_toward(&mut self, agent: &ObjectId, to: &Position, range: u32) -> MoveOutcome {
        let Some(me) = self.agent(agent) else {
            return MoveOutcome::Blocked;
        };
        if me.spawning {
            return MoveOutcome::Blocked;
        }
        if me.pos.in_range_to(to, range) {
            return MoveOutcome::Arrived;
        }
        match self.next_step(&me.pos, to, range) {
            Some(step) => {
                self.moves.insert(agent.clone(), step);
                MoveOutcome::Closer
            }
            None => MoveOutcome::Blocked,
        }
    }
}

impl Spawner for SimWorld {
    fn spawn_energy(&self, room: &RoomName) -> u32 {
        self.spawn_class_in(Some(room))
            .into_iter()
            .filter_map(|e| self.world.get::<&Store>(e).ok().map(|s| s.used))
            .sum()
    }

    fn try_spawn(&mut self, room: &RoomName, request: &SpawnRequest) -> SpawnResult {
        let now = self.time;
        let free_spawn = self.spawn_class_in(Some(room)).into_iter().find_map(|e| {
            let ready = self.world.get::<&Spawning>(e).ok()?.busy_until <= now;
            let pos = (*self.world.get::<&Position>(e).ok()?).clone();
            ready.then_some((e, pos))
        });
        let Some((spawn, spawn_pos)) = free_spawn else {
            return SpawnResult::Busy;
        };
        let cost = body_cost(&request.body);
        if request.body.is_empty() || cost > self.spawn_energy(room) {
            return SpawnResult::InsufficientResource;
        }

        let mut owed = cost;
        for entity in self.spawn_class_in(Some(room)) {
            self.with_store(entity, |s| {
                let take = s.used.min(owed);
                s.used -= take;
                owed -= take;
            });
        }

        let build = request.body.len() as u64 * self.params.ticks_per_part;
        let lifetime = if request.body.contains(&BodyPart::Claim) {
            self.params.claimer_lifetime
        } else {
            self.params.agent_lifetime
        };
        let pos = spawn_pos
            .neighbors()
            .into_iter()
            .find(|p| self.is_walkable(p))
            .unwrap_or(spawn_pos);
        let id = self.mint("c");
        let carry = 50 * request.body.iter().filter(|p| **p == BodyPart::Carry).count() as u32;
        let creep = Creep {
            role: request.role.clone(),
            body: request.body.clone(),
            ready_at: now + build,
            dies_at: now + build + lifetime as u64,
        };
        let entity = self
            .world
            .spawn((Tag(id.clone()), pos, Store::new(0, carry), creep));
        self.index.insert(id.clone(), entity);
        if let Ok(mut queue) = self.world.get::<&mut Spawning>(spawn) {
            queue.busy_until = now + build;
        }
        self.stats.spawned += 1;
        SpawnResult::Ok(id)
    }
}

impl BodyComposer for SimWorld {
    fn compose_body(&self, role: &str, energy: u32) -> Vec<BodyPart> {
        let (unit, repeats) = match role {
            tags::SCOUT => (SCOUT_UNIT, false),
            tags::CLAIMER => (CLAIMER_UNIT, false),
            tags::INVADER => (INVADER_UNIT, true),
            _ => (WORKER_UNIT, true),
        };
        let cap = if repeats { self.params.max_units } else { 1 };
        let units = (energy / body_cost(unit)).min(cap) as usize;
        unit.iter().copied().cycle().take(unit.len() * units).collect()
    }
}

impl Placement for SimWorld {
    fn request_placement(&mut self, kind: ObjectKind, near: &Position) -> PlacementResult {
        let taken: BTreeSet<Position> = self
            .all_objects_in(&near.room)
            .into_iter()
            .map(|o| o.pos)
            .collect();
        let room = near.room.clone();
        let spot = (1..ROOM_SIZE - 1)
            .flat_map(|y| {
                let room = room.clone();
                (1..ROOM_SIZE - 1).map(move |x| Position::new(room.clone(), x as u8, y as u8))
            })
            .filter(|p| p.range_to(near) <= 5 && self.is_walkable(p) && !taken.contains(p))
            .min_by_key(|p| (p.range_to(near), p.y, p.x));
        let Some(pos) = spot else {
            return PlacementResult::NoSuitableSite;
        };
        let total = match kind {
            ObjectKind::Spawn => self.params.spawn_site_cost,
            _ => 1000,
        };
        self.add_site(pos.clone(), kind, total);
        PlacementResult::Ok(pos)
    }
}

impl RoutePlanner for SimWorld {
    /// Walk the room grid column-first through each waypoint.
    fn find_route(&self, from: &RoomName, to: &RoomName, waypoints: &[RoomName]) -> Option<Route> {
        let mut at = from.coords()?;
        let mut rooms = Vec::new();
        for stop in waypoints.iter().chain(std::iter::once(to)) {
            let goal = stop.coords()?;
            while at != goal {
                if at.0 != goal.0 {
                    at.0 += (goal.0 - at.0).signum();
                } else {
                    at.1 += (goal.1 - at.1).signum();
                }
                let room = RoomName::from_coords(at.0, at.1);
                if self.blocked.contains(&room) {
                    return None;
                }
                rooms.push(room);
            }
        }
        Some(Route {
            total_distance: rooms.len() as u32,
            rooms,
        })
    }
}
