//! In-crate test host: a scriptable implementation of every collaborator.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use crate::geometry::{Position, RoomName};
use crate::world::{
    body_cost, Actuator, AgentView, BodyComposer, BodyPart, Intent, MoveOutcome, Movement, ObjectId,
    ObjectKind, Placement, PlacementResult, ReturnCode, Route, RoutePlanner, SpawnRequest, SpawnResult,
    Spawner, Store, WorldObject, WorldView,
};

pub fn room() -> RoomName {
    RoomName::from("W1N1")
}

pub fn agent_at(id: &str, x: u8, y: u8, store: Store) -> AgentView {
    AgentView {
        id: ObjectId::from(id),
        pos: Position::new("W1N1", x, y),
        store,
        body: vec![BodyPart::Work, BodyPart::Carry, BodyPart::Move],
        ticks_to_live: Some(1500),
        spawning: false,
    }
}

/// Records every call; intents succeed when in range unless `force_code` is set.
/// Nothing changes state on its own: tests mutate `objects`/`agents` directly.
pub struct MockHost {
    pub time: u64,
    pub objects: BTreeMap<ObjectId, WorldObject>,
    pub agents: BTreeMap<ObjectId, AgentView>,
    /// Rooms that are not observable.
    pub hidden: BTreeSet<RoomName>,
    pub walls: BTreeSet<Position>,
    pub intents: Vec<(ObjectId, Intent, ObjectId)>,
    pub moves: Vec<(ObjectId, Position)>,
    pub force_code: Option<ReturnCode>,
    pub block_moves: bool,
    pub energy: u32,
    pub spawn_override: Option<SpawnResult>,
    pub spawned: Vec<SpawnRequest>,
    pub next_id: u32,
    pub placements: Vec<(ObjectKind, Position)>,
    pub placement_result: Option<PlacementResult>,
    pub routes: BTreeMap<(RoomName, RoomName), Route>,
    pub route_calls: Cell<u32>,
    pub terminated: Vec<ObjectId>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            time: 100,
            objects: BTreeMap::new(),
            agents: BTreeMap::new(),
            hidden: BTreeSet::new(),
            walls: BTreeSet::new(),
            intents: Vec::new(),
            moves: Vec::new(),
            force_code: None,
            block_moves: false,
            energy: 0,
            spawn_override: None,
            spawned: Vec::new(),
            next_id: 0,
            placements: Vec::new(),
            placement_result: None,
            routes: BTreeMap::new(),
            route_calls: Cell::new(0),
            terminated: Vec::new(),
        }
    }

    pub fn add_object(&mut self, obj: WorldObject) {
        self.objects.insert(obj.id.clone(), obj);
    }

    pub fn add_agent(&mut self, agent: AgentView) -> AgentView {
        self.agents.insert(agent.id.clone(), agent.clone());
        agent
    }

    /// Route of `distance` rooms between two rooms, in both directions.
    pub fn add_route(&mut self, from: &str, to: &str, distance: u32) {
        let route = Route {
            rooms: vec![RoomName::from(to)],
            total_distance: distance,
        };
        self.routes
            .insert((RoomName::from(from), RoomName::from(to)), route.clone());
        self.routes.insert(
            (RoomName::from(to), RoomName::from(from)),
            Route {
                rooms: vec![RoomName::from(from)],
                ..route
            },
        );
    }
}

impl WorldView for MockHost {
    fn time(&self) -> u64 {
        self.time
    }

    fn is_visible(&self, room: &RoomName) -> bool {
        !self.hidden.contains(room)
    }

    fn object(&self, id: &ObjectId) -> Option<WorldObject> {
        self.objects
            .get(id)
            .filter(|o| self.is_visible(&o.pos.room))
            .cloned()
    }

    fn objects_in(&self, room: &RoomName) -> Vec<WorldObject> {
        if !self.is_visible(room) {
            return Vec::new();
        }
        self.objects
            .values()
            .filter(|o| &o.pos.room == room)
            .cloned()
            .collect()
    }

    fn agents(&self) -> Vec<AgentView> {
        self.agents.values().cloned().collect()
    }

    fn agent(&self, id: &ObjectId) -> Option<AgentView> {
        self.agents.get(id).cloned()
    }

    fn is_walkable(&self, pos: &Position) -> bool {
        !self.walls.contains(pos)
    }
}

impl Actuator for MockHost {
    fn perform(&mut self, agent: &ObjectId, intent: Intent, target: &ObjectId) -> ReturnCode {
        let Some(obj) = self.objects.get(target) else {
            return ReturnCode::NotFound;
        };
        if let Some(code) = self.force_code {
            return code;
        }
        let Some(me) = self.agents.get(agent) else {
            return ReturnCode::NotFound;
        };
        if !me.pos.in_range_to(&obj.pos, intent.range()) {
            return ReturnCode::NotInRange;
        }
        self.intents.push((agent.clone(), intent, target.clone()));
        ReturnCode::Ok
    }

    fn terminate(&mut self, agent: &ObjectId) -> ReturnCode {
        if self.agents.remove(agent).is_none() {
            return ReturnCode::NotFound;
        }
        self.terminated.push(agent.clone());
        ReturnCode::Ok
    }
}

impl Movement for MockHost {
    fn move_toward(&mut self, agent: &ObjectId, to: &Position, range: u32) -> MoveOutcome {
        self.moves.push((agent.clone(), to.clone()));
        if self.block_moves {
            return MoveOutcome::Blocked;
        }
        match self.agents.get(agent) {
            Some(a) if a.pos.in_range_to(to, range) => MoveOutcome::Arrived,
            _ => MoveOutcome::Closer,
        }
    }
}

impl Spawner for MockHost {
    fn spawn_energy(&self, _room: &RoomName) -> u32 {
        self.energy
    }

    fn try_spawn(&mut self, _room: &RoomName, request: &SpawnRequest) -> SpawnResult {
        if let Some(result) = &self.spawn_override {
            return result.clone();
        }
        let cost = body_cost(&request.body);
        if cost > self.energy {
            return SpawnResult::InsufficientResource;
        }
        self.energy -= cost;
        self.next_id += 1;
        self.spawned.push(request.clone());
        SpawnResult::Ok(ObjectId::new(format!("spawned{}", self.next_id)))
    }
}

impl BodyComposer for MockHost {
    fn compose_body(&self, role: &str, energy: u32) -> Vec<BodyPart> {
        let body = match role {
            "claimer" => vec![BodyPart::Claim, BodyPart::Move],
            "scout" => vec![BodyPart::Move],
            "invader" => vec![BodyPart::Attack, BodyPart::Move],
            _ => vec![BodyPart::Work, BodyPart::Carry, BodyPart::Move],
        };
        if body_cost(&body) > energy {
            return Vec::new();
        }
        body
    }
}

impl Placement for MockHost {
    fn request_placement(&mut self, kind: ObjectKind, near: &Position) -> PlacementResult {
        self.placements.push((kind, near.clone()));
        self.placement_result
            .clone()
            .unwrap_or_else(|| PlacementResult::Ok(near.clone()))
    }
}

impl RoutePlanner for MockHost {
    fn find_route(
        &self,
        from: &RoomName,
        to: &RoomName,
        _waypoints: &[RoomName],
    ) -> Option<Route> {
        self.route_calls.set(self.route_calls.get() + 1);
        self.routes.get(&(from.clone(), to.clone())).cloned()
    }
}
