//! Persistent behavior engine for tick-driven worker agents.
//!
//! The host process is re-run from scratch every tick, so nothing survives in
//! memory between ticks. This crate keeps every agent's place in its work
//! cycle, and every multi-stage mission's progress, in a small serializable
//! [`memory::MemoryStore`] and resumes from it on the next tick. It depends on
//! no game engine or runtime: the world is reached only through the
//! collaborator traits in [`world`].
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`action`] | Atomic agent actions with move-closer fallback and a null sentinel |
//! | [`behavior`] | Generic acquire/work/return state machine with re-entrancy guard |
//! | [`config`] | Engine tunables with defaults and JSON overrides |
//! | [`engine`] | Tick entry point and the mission operator surface |
//! | [`geometry`] | Room names, tile positions, range math |
//! | [`memory`] | Durable memory document: agent, mission and route records |
//! | [`mission`] | Mission phase machine, feasibility, abort |
//! | [`population`] | Harvest capacity ledger, capacity split, mission spawning |
//! | [`resolver`] | Stateless target selection heuristics |
//! | [`roles`] | Role tags, capabilities, direct mission roles, registry |
//! | [`route`] | TTL cache of room-level routes |
//! | [`world`] | Collaborator traits and the snapshots exchanged with them |

pub mod action;
pub mod behavior;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod memory;
pub mod mission;
pub mod population;
pub mod resolver;
pub mod roles;
pub mod route;
pub mod world;

#[cfg(test)]
mod test_support;
