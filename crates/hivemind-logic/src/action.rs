//! Atomic agent actions with out-of-range fallback.
//!
//! An [`Action`] wraps one interaction with one target. Callers ask
//! [`Action::is_valid`] before trusting it and call [`Action::execute`] to
//! issue it; when the host says the agent is too far away the action steps
//! toward the target instead and reports [`ActionOutcome::OutOfRange`].
//!
//! [`Action::null`] is the universal "nothing to do" value: never valid,
//! executes to [`ActionOutcome::NotFound`]. Resolvers hand it back instead of
//! an empty option so call sites branch on validity only.

use log::debug;

use crate::geometry::Position;
use crate::world::{
    AgentView, Host, Intent, MoveOutcome, ObjectId, ObjectKind, Ownership, ReturnCode, WorldObject,
    WorldView,
};

/// What an action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Null,
    Harvest,
    Pickup,
    Withdraw,
    Transfer,
    Build,
    Repair,
    Upgrade,
    Claim,
    Attack,
    MoveTo,
}

impl ActionKind {
    fn intent(&self) -> Option<Intent> {
        match self {
            Self::Harvest => Some(Intent::Harvest),
            Self::Pickup => Some(Intent::Pickup),
            Self::Withdraw => Some(Intent::Withdraw),
            Self::Transfer => Some(Intent::Transfer),
            Self::Build => Some(Intent::Build),
            Self::Repair => Some(Intent::Repair),
            Self::Upgrade => Some(Intent::Upgrade),
            Self::Claim => Some(Intent::Claim),
            Self::Attack => Some(Intent::Attack),
            Self::Null | Self::MoveTo => None,
        }
    }
}

/// Result of executing an action this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    /// Target was too far; a move toward it was issued instead.
    OutOfRange,
    /// Host refused the intent for any reason other than range.
    Rejected(ReturnCode),
    /// Null action, or the target no longer exists.
    NotFound,
}

/// One interaction with one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    kind: ActionKind,
    target: Option<ObjectId>,
    destination: Option<Position>,
    range: u32,
}

impl Action {
    pub fn null() -> Self {
        Self {
            kind: ActionKind::Null,
            target: None,
            destination: None,
            range: 0,
        }
    }

    /// An intent-backed action against an object.
    pub fn on(kind: ActionKind, target: &WorldObject) -> Self {
        let range = kind.intent().map(|i| i.range()).unwrap_or(1);
        Self {
            kind,
            target: Some(target.id.clone()),
            destination: Some(target.pos.clone()),
            range,
        }
    }

    /// Walk until within `range` of a position.
    pub fn move_to(pos: Position, range: u32) -> Self {
        Self {
            kind: ActionKind::MoveTo,
            target: None,
            destination: Some(pos),
            range,
        }
    }

    /// The natural way to take energy out of an object.
    pub fn acquire_from(target: &WorldObject) -> Self {
        let kind = match target.kind {
            ObjectKind::Source => ActionKind::Harvest,
            ObjectKind::Dropped => ActionKind::Pickup,
            _ => ActionKind::Withdraw,
        };
        Self::on(kind, target)
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn target(&self) -> Option<&ObjectId> {
        self.target.as_ref()
    }

    pub fn destination(&self) -> Option<&Position> {
        self.destination.as_ref()
    }

    /// Whether the target is still usable for this kind of action.
    ///
    /// Looks the target up fresh, so a target that vanished or filled up
    /// since it was remembered is reported invalid.
    pub fn is_valid<W: WorldView + ?Sized>(&self, world: &W) -> bool {
        match self.kind {
            ActionKind::Null => false,
            ActionKind::MoveTo => self.destination.is_some(),
            kind => {
                let Some(obj) = self.target.as_ref().and_then(|id| world.object(id)) else {
                    return false;
                };
                target_accepts(kind, &obj)
            }
        }
    }

    /// Issue the action for `agent`.
    pub fn execute<H: Host + ?Sized>(&self, host: &mut H, agent: &AgentView) -> ActionOutcome {
        if self.kind == ActionKind::MoveTo {
            let Some(dest) = &self.destination else {
                return ActionOutcome::NotFound;
            };
            return match host.move_toward(&agent.id, dest, self.range) {
                MoveOutcome::Closer | MoveOutcome::Arrived => ActionOutcome::Success,
                MoveOutcome::Blocked => ActionOutcome::Rejected(ReturnCode::Tired),
            };
        }

        let (Some(intent), Some(target)) = (self.kind.intent(), self.target.as_ref()) else {
            return ActionOutcome::NotFound;
        };
        // Re-read the target: it may have moved or vanished since it was resolved.
        let Some(obj) = host.object(target) else {
            return ActionOutcome::NotFound;
        };

        match host.perform(&agent.id, intent, target) {
            ReturnCode::Ok => ActionOutcome::Success,
            ReturnCode::NotInRange => {
                if host.move_toward(&agent.id, &obj.pos, self.range) == MoveOutcome::Blocked {
                    debug!("{}: blocked approaching {} for {:?}", agent.id, target, intent);
                }
                ActionOutcome::OutOfRange
            }
            code => {
                debug!("{}: {:?} on {} rejected with {:?}", agent.id, intent, target, code);
                ActionOutcome::Rejected(code)
            }
        }
    }
}

fn target_accepts(kind: ActionKind, obj: &WorldObject) -> bool {
    match kind {
        ActionKind::Harvest => obj.kind == ObjectKind::Source && obj.store.used > 0,
        ActionKind::Pickup => obj.kind == ObjectKind::Dropped && obj.store.used > 0,
        ActionKind::Withdraw => obj.store.used > 0 && obj.owner != Ownership::Hostile,
        ActionKind::Transfer => obj.store.free() > 0,
        ActionKind::Build => obj.kind == ObjectKind::ConstructionSite,
        ActionKind::Repair => obj.kind.is_structure() && obj.hits < obj.hits_max,
        ActionKind::Upgrade => obj.kind == ObjectKind::Controller && obj.owner == Ownership::Mine,
        ActionKind::Claim => obj.kind == ObjectKind::Controller && obj.owner != Ownership::Mine,
        ActionKind::Attack => obj.owner == Ownership::Hostile,
        ActionKind::Null | ActionKind::MoveTo => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{agent_at, MockHost};
    use crate::world::Store;

    fn source(id: &str, x: u8, energy: u32) -> WorldObject {
        WorldObject::new(id, ObjectKind::Source, Position::new("W1N1", x, 10))
            .with_store(energy, 3000)
    }

    #[test]
    fn test_null_action_is_never_valid() {
        let mut host = MockHost::new();
        let agent = agent_at("a1", 10, 10, Store::new(0, 50));
        let null = Action::null();
        assert!(!null.is_valid(&host));
        assert_eq!(null.execute(&mut host, &agent), ActionOutcome::NotFound);
        assert!(host.intents.is_empty());
        assert!(host.moves.is_empty());
    }

    #[test]
    fn test_validity_tracks_target_state() {
        let mut host = MockHost::new();
        host.add_object(source("s1", 12, 100));
        let action = Action::acquire_from(&host.objects[&ObjectId::from("s1")]);
        assert_eq!(action.kind(), ActionKind::Harvest);
        assert!(action.is_valid(&host));

        // Depleted source
        host.objects.get_mut(&ObjectId::from("s1")).unwrap().store.used = 0;
        assert!(!action.is_valid(&host));

        // Vanished source
        host.objects.remove(&ObjectId::from("s1"));
        assert!(!action.is_valid(&host));
    }

    #[test]
    fn test_transfer_needs_free_capacity() {
        let mut host = MockHost::new();
        let spawn = WorldObject::new("sp", ObjectKind::Spawn, Position::new("W1N1", 20, 20))
            .with_owner(Ownership::Mine)
            .with_store(300, 300);
        host.add_object(spawn.clone());
        assert!(!Action::on(ActionKind::Transfer, &spawn).is_valid(&host));
        host.objects.get_mut(&spawn.id).unwrap().store.used = 100;
        assert!(Action::on(ActionKind::Transfer, &spawn).is_valid(&host));
    }

    #[test]
    fn test_execute_in_range_succeeds() {
        let mut host = MockHost::new();
        host.add_object(source("s1", 11, 100));
        let agent = host.add_agent(agent_at("a1", 10, 10, Store::new(0, 50)));
        let action = Action::acquire_from(&host.objects[&ObjectId::from("s1")]);
        assert_eq!(action.execute(&mut host, &agent), ActionOutcome::Success);
        assert_eq!(host.intents.len(), 1);
        assert!(host.moves.is_empty());
    }

    #[test]
    fn test_execute_out_of_range_moves_closer() {
        let mut host = MockHost::new();
        host.add_object(source("s1", 15, 100));
        let agent = host.add_agent(agent_at("a1", 10, 10, Store::new(0, 50)));
        let action = Action::acquire_from(&host.objects[&ObjectId::from("s1")]);
        assert_eq!(action.execute(&mut host, &agent), ActionOutcome::OutOfRange);
        assert_eq!(host.moves.len(), 1);
        assert_eq!(host.moves[0].1, Position::new("W1N1", 15, 10));
    }

    #[test]
    fn test_execute_other_rejection_is_reported() {
        let mut host = MockHost::new();
        host.add_object(source("s1", 11, 100));
        host.force_code = Some(ReturnCode::NoBodyPart);
        let agent = host.add_agent(agent_at("a1", 10, 10, Store::new(0, 50)));
        let action = Action::acquire_from(&host.objects[&ObjectId::from("s1")]);
        assert_eq!(
            action.execute(&mut host, &agent),
            ActionOutcome::Rejected(ReturnCode::NoBodyPart)
        );
        assert!(host.moves.is_empty());
    }

    #[test]
    fn test_execute_vanished_target_is_not_found() {
        let mut host = MockHost::new();
        let s = source("s1", 11, 100);
        let action = Action::acquire_from(&s);
        let agent = agent_at("a1", 10, 10, Store::new(0, 50));
        assert_eq!(action.execute(&mut host, &agent), ActionOutcome::NotFound);
    }

    #[test]
    fn test_move_to_reports_success_until_blocked() {
        let mut host = MockHost::new();
        let agent = host.add_agent(agent_at("a1", 10, 10, Store::new(0, 50)));
        let action = Action::move_to(Position::new("W1N1", 30, 30), 1);
        assert!(action.is_valid(&host));
        assert_eq!(action.execute(&mut host, &agent), ActionOutcome::Success);
        host.block_moves = true;
        assert_eq!(
            action.execute(&mut host, &agent),
            ActionOutcome::Rejected(ReturnCode::Tired)
        );
    }

    #[test]
    fn test_acquire_kind_follows_object_kind() {
        let pos = Position::new("W1N1", 5, 5);
        let drop = WorldObject::new("d", ObjectKind::Dropped, pos.clone());
        let tomb = WorldObject::new("t", ObjectKind::Tombstone, pos);
        assert_eq!(Action::acquire_from(&drop).kind(), ActionKind::Pickup);
        assert_eq!(Action::acquire_from(&tomb).kind(), ActionKind::Withdraw);
    }
}
