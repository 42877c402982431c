//! Per-agent behavior state machine.
//!
//! An agent is a resumable coroutine: its whole position in the cycle lives
//! in [`AgentRecord::behavior_state`], so a fresh process can pick it up on
//! any tick. One generic machine, [`BehaviorFsm`], serves every cycling role;
//! what differs between roles is *where energy comes from*
//! ([`SourceCapability`]) and *what it is spent on* ([`WorkCapability`]).
//!
//! # Cycle
//!
//! | State | Leaves when | To |
//! |-------|-------------|----|
//! | INITIAL | approach position reached (or none set) | IDLE |
//! | IDLE | store full | WORKING |
//! | IDLE | acquisition target resolvable | ACQUIRING |
//! | ACQUIRING | store full, or nothing to take while carrying | WORKING |
//! | ACQUIRING | nothing to take, store empty | IDLE |
//! | WORKING | store empty | IDLE |
//! | WORKING | no work target | RETURNING |
//! | RETURNING | store empty, or no deposit | IDLE |
//!
//! Every transition re-dispatches immediately in the same tick, so an agent
//! that finishes harvesting starts walking to its work target on that same
//! tick. The loop is capped at `max_transitions` per tick.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind, ActionOutcome};
use crate::geometry::RoomName;
use crate::memory::AgentRecord;
use crate::resolver;
use crate::world::{AgentView, Host, ObjectId, WorldObject, WorldView};

/// Tiles from the approach position that count as having arrived.
pub const APPROACH_RANGE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorState {
    Initial,
    #[default]
    Idle,
    Acquiring,
    Working,
    Returning,
}

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Where a role takes energy from.
pub trait SourceCapability {
    fn find<V: WorldView + ?Sized>(
        &self,
        world: &V,
        agent: &AgentView,
        room: &RoomName,
    ) -> Option<WorldObject>;

    fn action(&self, target: &WorldObject) -> Action {
        Action::acquire_from(target)
    }
}

/// What a role spends energy on.
pub trait WorkCapability {
    fn find<V: WorldView + ?Sized>(
        &self,
        world: &V,
        agent: &AgentView,
        room: &RoomName,
    ) -> Option<WorldObject>;

    fn action(&self, target: &WorldObject) -> Action;

    /// Whether the role has anything to do at all. An agent without work
    /// waits at the idle spot instead of collecting energy it cannot spend.
    fn has_work<V: WorldView + ?Sized>(&self, _world: &V, _agent: &AgentView, _room: &RoomName) -> bool {
        true
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// What happened to one agent this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// State the agent ends the tick in.
    pub state: BehaviorState,
    pub action: ActionKind,
    /// `None` when no action was executed.
    pub outcome: Option<ActionOutcome>,
    pub transitions: u32,
    /// The transition guard stopped the chain.
    pub halted: bool,
}

/// A role's behavior, looked up by role tag each tick.
pub trait AgentBehavior {
    fn dispatch(
        &self,
        host: &mut dyn Host,
        agent: &AgentView,
        record: &mut AgentRecord,
        max_transitions: u32,
    ) -> DispatchReport;
}

/// Result of evaluating the current state once.
enum Step {
    /// Execute this action and end the tick.
    Act(Action),
    /// Enter a state and re-dispatch.
    Goto(BehaviorState),
    /// Enter a state and end the tick without acting.
    Settle(BehaviorState),
}

/// Walk toward the record's approach position. Clears it once reached and
/// returns `None`; returns the move while still travelling.
pub fn approach_step(agent: &AgentView, record: &mut AgentRecord) -> Option<Action> {
    let target = record.approach_position.as_ref()?;
    if agent.pos.in_range_to(target, APPROACH_RANGE) {
        record.approach_position = None;
        return None;
    }
    Some(Action::move_to(target.clone(), APPROACH_RANGE))
}

/// Trust a remembered target while its action is still valid, otherwise
/// search afresh and remember the result.
fn resolve_memo<V, B, F>(
    world: &V,
    remembered: &mut Option<ObjectId>,
    build: B,
    find: F,
) -> Option<Action>
where
    V: WorldView + ?Sized,
    B: Fn(&WorldObject) -> Action,
    F: FnOnce() -> Option<WorldObject>,
{
    if let Some(id) = remembered.take() {
        if let Some(action) = world.object(&id).map(|obj| build(&obj)) {
            if action.is_valid(world) {
                *remembered = Some(id);
                return Some(action);
            }
        }
    }
    let obj = find()?;
    let action = build(&obj);
    if !action.is_valid(world) {
        return None;
    }
    *remembered = Some(obj.id);
    Some(action)
}

/// A target the host refused is not trusted again; the next dispatch in this
/// state searches afresh.
fn forget_rejected(record: &mut AgentRecord) {
    match record.behavior_state {
        BehaviorState::Acquiring => record.remembered_source_ref = None,
        BehaviorState::Working => record.remembered_target_ref = None,
        _ => {}
    }
}

/// The acquire → work → return cycle, parametrized by two capabilities.
pub struct BehaviorFsm<S, W> {
    source: S,
    work: W,
}

impl<S: SourceCapability, W: WorkCapability> BehaviorFsm<S, W> {
    pub fn new(source: S, work: W) -> Self {
        Self { source, work }
    }

    fn step(&self, host: &dyn Host, agent: &AgentView, record: &mut AgentRecord) -> Step {
        let room = record.work_room(agent);
        match record.behavior_state {
            BehaviorState::Initial => match approach_step(agent, record) {
                Some(travel) => Step::Act(travel),
                None => Step::Goto(BehaviorState::Idle),
            },

            BehaviorState::Idle => {
                if !self.work.has_work(host, agent, &room) {
                    let (spot, range) = resolver::idle_spot(host, agent, &room);
                    return Step::Act(Action::move_to(spot, range));
                }
                if agent.store.is_full() {
                    return Step::Goto(BehaviorState::Working);
                }
                let acquirable = self
                    .source
                    .find(host, agent, &room)
                    .map(|obj| self.source.action(&obj).is_valid(host))
                    .unwrap_or(false);
                if acquirable {
                    Step::Goto(BehaviorState::Acquiring)
                } else {
                    Step::Act(Action::null())
                }
            }

            BehaviorState::Acquiring => {
                if agent.store.is_full() {
                    return Step::Goto(BehaviorState::Working);
                }
                let found = resolve_memo(
                    host,
                    &mut record.remembered_source_ref,
                    |obj| self.source.action(obj),
                    || self.source.find(host, agent, &room),
                );
                match found {
                    Some(action) => Step::Act(action),
                    None if agent.store.is_empty() => Step::Goto(BehaviorState::Idle),
                    None => Step::Goto(BehaviorState::Working),
                }
            }

            BehaviorState::Working => {
                if agent.store.is_empty() {
                    return Step::Goto(BehaviorState::Idle);
                }
                let found = resolve_memo(
                    host,
                    &mut record.remembered_target_ref,
                    |obj| self.work.action(obj),
                    || self.work.find(host, agent, &room),
                );
                match found {
                    Some(action) => Step::Act(action),
                    None => Step::Goto(BehaviorState::Returning),
                }
            }

            BehaviorState::Returning => {
                if agent.store.is_empty() {
                    return Step::Goto(BehaviorState::Idle);
                }
                match resolver::safe_deposit(host, agent, &room) {
                    Some(deposit) => Step::Act(Action::on(ActionKind::Transfer, &deposit)),
                    // Holding the surplus is a steady state; re-dispatching
                    // from here would only loop back through WORKING.
                    None => Step::Settle(BehaviorState::Idle),
                }
            }
        }
    }
}

impl<S: SourceCapability, W: WorkCapability> AgentBehavior for BehaviorFsm<S, W> {
    fn dispatch(
        &self,
        host: &mut dyn Host,
        agent: &AgentView,
        record: &mut AgentRecord,
        max_transitions: u32,
    ) -> DispatchReport {
        let mut transitions = 0;
        loop {
            let (next, settle) = match self.step(&*host, agent, record) {
                Step::Act(action) => {
                    let outcome = action.execute(&mut *host, agent);
                    if matches!(outcome, ActionOutcome::Rejected(_)) {
                        forget_rejected(record);
                    }
                    return DispatchReport {
                        state: record.behavior_state,
                        action: action.kind(),
                        outcome: Some(outcome),
                        transitions,
                        halted: false,
                    };
                }
                Step::Goto(next) => (next, false),
                Step::Settle(next) => (next, true),
            };

            if transitions >= max_transitions {
                warn!(
                    "{} ({}): {} transitions in one tick, halting in {:?}",
                    agent.id, record.role_tag, transitions, record.behavior_state
                );
                return DispatchReport {
                    state: record.behavior_state,
                    action: ActionKind::Null,
                    outcome: None,
                    transitions,
                    halted: true,
                };
            }
            if record.behavior_state == BehaviorState::Idle && next == BehaviorState::Acquiring {
                record.forget_targets();
            }
            record.behavior_state = next;
            transitions += 1;

            if settle {
                return DispatchReport {
                    state: next,
                    action: ActionKind::Null,
                    outcome: None,
                    transitions,
                    halted: false,
                };
            }
        }
    }
}
