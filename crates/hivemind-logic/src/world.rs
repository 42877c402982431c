//! Collaborator interfaces: everything the engine consumes from its host.
//!
//! The engine never holds live world handles across ticks. Each tick the
//! host hands out plain snapshots ([`WorldObject`], [`AgentView`]) and
//! accepts intents through narrow action traits. Effects of intents resolve
//! at the end of the tick, on the host's side.
//!
//! | Trait | Consumed for |
//! |-------|--------------|
//! | [`WorldView`] | Object lookup, room scans, visibility, terrain |
//! | [`Actuator`] | Issuing intents at targets, terminating agents |
//! | [`Movement`] | Stepping an agent toward a position |
//! | [`Spawner`] | Spawn energy and new agents |
//! | [`BodyComposer`] | Body layout for a role under an energy budget |
//! | [`Placement`] | Siting new structures |
//! | [`RoutePlanner`] | Room-level routes (cached by the caller) |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Position, RoomName};
use crate::memory::AgentRecord;

// ============================================================================
// IDENTIFIERS & OBJECTS
// ============================================================================

/// Opaque identifier of a world object or agent, stable across ticks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a world object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Regenerating energy node.
    Source,
    /// Resource lying on the ground; decays quickly.
    Dropped,
    /// Remains of a dead agent, holding its inventory for a while.
    Tombstone,
    /// Remains of a destroyed structure.
    Ruin,
    Container,
    Storage,
    Spawn,
    Extension,
    Tower,
    Controller,
    ConstructionSite,
    Road,
    Wall,
    Rampart,
    /// An agent controlled by someone else.
    HostileAgent,
    /// Forward-operating structure of a hostile faction.
    InvaderCore,
}

impl ObjectKind {
    /// Structures that feed the spawner.
    pub fn is_spawn_class(&self) -> bool {
        matches!(self, Self::Spawn | Self::Extension)
    }

    /// Built structures (repairable, attackable).
    pub fn is_structure(&self) -> bool {
        matches!(
            self,
            Self::Container
                | Self::Storage
                | Self::Spawn
                | Self::Extension
                | Self::Tower
                | Self::Road
                | Self::Wall
                | Self::Rampart
                | Self::InvaderCore
        )
    }
}

/// Who controls an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    Mine,
    Hostile,
    #[default]
    Unowned,
}

/// Energy held by an object: used amount against capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Store {
    pub used: u32,
    pub capacity: u32,
}

impl Store {
    pub fn new(used: u32, capacity: u32) -> Self {
        Self { used, capacity }
    }

    pub fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.used)
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Full when nothing more fits. A zero-capacity store is both empty and full.
    pub fn is_full(&self) -> bool {
        self.used >= self.capacity
    }
}

/// Snapshot of a world object for this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub pos: Position,
    pub owner: Ownership,
    pub store: Store,
    pub hits: u32,
    pub hits_max: u32,
    /// Construction progress, or controller progress toward the next level.
    pub progress: u32,
    pub progress_total: u32,
    /// Controller level.
    pub level: u8,
    /// What a construction site turns into.
    pub site_kind: Option<ObjectKind>,
    /// Ticks a source takes to refill to capacity. 0 when unknown.
    pub regen_ticks: u32,
}

impl WorldObject {
    pub fn new(id: impl Into<String>, kind: ObjectKind, pos: Position) -> Self {
        Self {
            id: ObjectId::new(id),
            kind,
            pos,
            owner: Ownership::Unowned,
            store: Store::default(),
            hits: 0,
            hits_max: 0,
            progress: 0,
            progress_total: 0,
            level: 0,
            site_kind: None,
            regen_ticks: 0,
        }
    }

    pub fn with_owner(mut self, owner: Ownership) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_store(mut self, used: u32, capacity: u32) -> Self {
        self.store = Store::new(used, capacity);
        self
    }

    pub fn with_hits(mut self, hits: u32, hits_max: u32) -> Self {
        self.hits = hits;
        self.hits_max = hits_max;
        self
    }

    pub fn with_progress(mut self, progress: u32, total: u32) -> Self {
        self.progress = progress;
        self.progress_total = total;
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_site_kind(mut self, kind: ObjectKind) -> Self {
        self.site_kind = Some(kind);
        self
    }

    pub fn with_regen(mut self, ticks: u32) -> Self {
        self.regen_ticks = ticks;
        self
    }

    /// Energy per tick the object regenerates, if it regenerates at all.
    pub fn regen_rate(&self) -> Option<f64> {
        if self.regen_ticks == 0 {
            return None;
        }
        Some(self.store.capacity as f64 / self.regen_ticks as f64)
    }
}

// ============================================================================
// AGENTS
// ============================================================================

/// One segment of an agent body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Work,
    Carry,
    Move,
    Claim,
    Attack,
    Tough,
}

impl BodyPart {
    /// Spawn cost in energy.
    pub fn cost(&self) -> u32 {
        match self {
            Self::Work => 100,
            Self::Carry => 50,
            Self::Move => 50,
            Self::Claim => 600,
            Self::Attack => 80,
            Self::Tough => 10,
        }
    }
}

/// Total spawn cost of a body.
pub fn body_cost(body: &[BodyPart]) -> u32 {
    body.iter().map(BodyPart::cost).sum()
}

/// Snapshot of one of our own agents for this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentView {
    pub id: ObjectId,
    pub pos: Position,
    pub store: Store,
    pub body: Vec<BodyPart>,
    pub ticks_to_live: Option<u32>,
    /// Still being assembled by a spawner; cannot act.
    pub spawning: bool,
}

impl AgentView {
    pub fn parts(&self, part: BodyPart) -> usize {
        self.body.iter().filter(|p| **p == part).count()
    }
}

// ============================================================================
// HOST RESULTS
// ============================================================================

/// Result code of an intent, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    Ok,
    NotOwner,
    Busy,
    NotFound,
    NotEnoughResources,
    InvalidTarget,
    Full,
    NotInRange,
    Tired,
    NoBodyPart,
}

/// An atomic interaction an agent can attempt against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Harvest,
    Pickup,
    Withdraw,
    Transfer,
    Build,
    Repair,
    Upgrade,
    Claim,
    Attack,
}

impl Intent {
    /// Working range in tiles.
    pub fn range(&self) -> u32 {
        match self {
            Self::Build | Self::Repair | Self::Upgrade => 3,
            _ => 1,
        }
    }
}

/// Result of a movement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Moved (or will move) a step closer.
    Closer,
    /// Could not make progress; unreachable targets report this too.
    Blocked,
    /// Already within the requested range.
    Arrived,
}

/// What to spawn and the memory the new agent starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub role: String,
    pub body: Vec<BodyPart>,
    pub memory: AgentRecord,
}

/// Result of a spawn attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnResult {
    Ok(ObjectId),
    InsufficientResource,
    Busy,
}

/// Result of a structure placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementResult {
    Ok(Position),
    NoSuitableSite,
}

/// A room-level route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Rooms entered in order, ending at the destination.
    pub rooms: Vec<RoomName>,
    /// Distance in rooms.
    pub total_distance: u32,
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Read-only view of the world this tick. Pure: no side effects.
pub trait WorldView {
    /// Current tick.
    fn time(&self) -> u64;

    /// Whether objects in the room can be observed this tick.
    fn is_visible(&self, room: &RoomName) -> bool;

    fn object(&self, id: &ObjectId) -> Option<WorldObject>;

    /// Every observable object in a room. Empty when not visible.
    fn objects_in(&self, room: &RoomName) -> Vec<WorldObject>;

    /// All of our own live agents, including ones still spawning.
    fn agents(&self) -> Vec<AgentView>;

    fn agent(&self, id: &ObjectId) -> Option<AgentView>;

    /// Whether the tile can be stood on (terrain only).
    fn is_walkable(&self, pos: &Position) -> bool;
}

/// Intent issuing.
pub trait Actuator {
    fn perform(&mut self, agent: &ObjectId, intent: Intent, target: &ObjectId) -> ReturnCode;

    /// Remove one of our agents immediately.
    fn terminate(&mut self, agent: &ObjectId) -> ReturnCode;
}

pub trait Movement {
    fn move_toward(&mut self, agent: &ObjectId, to: &Position, range: u32) -> MoveOutcome;
}

pub trait Spawner {
    /// Energy available for spawning in a room this tick.
    fn spawn_energy(&self, room: &RoomName) -> u32;

    fn try_spawn(&mut self, room: &RoomName, request: &SpawnRequest) -> SpawnResult;
}

pub trait BodyComposer {
    /// Body for a role within an energy budget. Empty when nothing useful fits.
    fn compose_body(&self, role: &str, energy: u32) -> Vec<BodyPart>;
}

pub trait Placement {
    fn request_placement(&mut self, kind: ObjectKind, near: &Position) -> PlacementResult;
}

pub trait RoutePlanner {
    fn find_route(&self, from: &RoomName, to: &RoomName, waypoints: &[RoomName])
        -> Option<Route>;
}

/// Everything the engine needs from its host.
pub trait Host:
    WorldView + Actuator + Movement + Spawner + BodyComposer + Placement + RoutePlanner
{
}

impl<T> Host for T where
    T: WorldView + Actuator + Movement + Spawner + BodyComposer + Placement + RoutePlanner + ?Sized
{
}

// ============================================================================
// QUERY HELPERS
// ============================================================================

/// Objects in a room matching a predicate.
pub fn find_in_room<W, F>(world: &W, room: &RoomName, pred: F) -> Vec<WorldObject>
where
    W: WorldView + ?Sized,
    F: Fn(&WorldObject) -> bool,
{
    world.objects_in(room).into_iter().filter(|o| pred(o)).collect()
}

/// Nearest object in a room matching a predicate. Ties break on id so the
/// answer is stable across repeated calls.
pub fn find_nearest<W, F>(world: &W, from: &Position, room: &RoomName, pred: F) -> Option<WorldObject>
where
    W: WorldView + ?Sized,
    F: Fn(&WorldObject) -> bool,
{
    world
        .objects_in(room)
        .into_iter()
        .filter(|o| pred(o))
        .min_by(|a, b| {
            from.range_to(&a.pos)
                .cmp(&from.range_to(&b.pos))
                .then_with(|| a.id.cmp(&b.id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_fullness() {
        assert!(Store::new(0, 50).is_empty());
        assert!(!Store::new(0, 50).is_full());
        assert!(Store::new(50, 50).is_full());
        assert_eq!(Store::new(20, 50).free(), 30);
        // Over-full stores never underflow
        assert_eq!(Store::new(60, 50).free(), 0);
    }

    #[test]
    fn test_body_cost() {
        let body = [BodyPart::Work, BodyPart::Carry, BodyPart::Move];
        assert_eq!(body_cost(&body), 200);
        assert_eq!(body_cost(&[BodyPart::Claim, BodyPart::Move]), 650);
        assert_eq!(body_cost(&[]), 0);
    }

    #[test]
    fn test_intent_ranges() {
        assert_eq!(Intent::Upgrade.range(), 3);
        assert_eq!(Intent::Build.range(), 3);
        assert_eq!(Intent::Harvest.range(), 1);
        assert_eq!(Intent::Transfer.range(), 1);
    }

    #[test]
    fn test_regen_rate() {
        let pos = Position::new("W1N1", 5, 5);
        let src = WorldObject::new("s", ObjectKind::Source, pos.clone()).with_store(3000, 3000);
        assert_eq!(src.regen_rate(), None);
        assert_eq!(src.with_regen(300).regen_rate(), Some(10.0));
    }

    #[test]
    fn test_kind_classes() {
        assert!(ObjectKind::Spawn.is_spawn_class());
        assert!(!ObjectKind::Tower.is_spawn_class());
        assert!(ObjectKind::Wall.is_structure());
        assert!(!ObjectKind::ConstructionSite.is_structure());
        assert!(!ObjectKind::Source.is_structure());
    }
}
