//! Caller-owned cache of room-level routes.
//!
//! The route planner is expensive and pure, so its answers are cached in the
//! memory document with an expiry tick. Keys combine origin, destination and
//! waypoints; failed lookups are never cached so a route that opens up later
//! is found on the next call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::RoomName;
use crate::world::{Route, RoutePlanner};

/// A planner answer with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRoute {
    pub from: RoomName,
    pub to: RoomName,
    pub rooms: Vec<RoomName>,
    pub total_distance: u32,
    pub expires_at: u64,
}

impl CachedRoute {
    pub fn route(&self) -> Route {
        Route {
            rooms: self.rooms.clone(),
            total_distance: self.total_distance,
        }
    }
}

/// Cache key for a (from, to, waypoints) query, e.g. `W1N1>W3N1` or
/// `W1N1>W3N1|W2N2,W2N1`.
pub fn route_key(from: &RoomName, to: &RoomName, waypoints: &[RoomName]) -> String {
    let mut key = format!("{}>{}", from, to);
    if !waypoints.is_empty() {
        key.push('|');
        let names: Vec<&str> = waypoints.iter().map(RoomName::as_str).collect();
        key.push_str(&names.join(","));
    }
    key
}

/// View over the persisted route table.
pub struct RouteCache<'a> {
    entries: &'a mut BTreeMap<String, CachedRoute>,
    ttl: u64,
}

impl<'a> RouteCache<'a> {
    pub fn new(entries: &'a mut BTreeMap<String, CachedRoute>, ttl: u64) -> Self {
        Self { entries, ttl }
    }

    /// Cached route if fresh, otherwise ask the planner and remember a hit.
    pub fn route<P: RoutePlanner + ?Sized>(
        &mut self,
        planner: &P,
        now: u64,
        from: &RoomName,
        to: &RoomName,
        waypoints: &[RoomName],
    ) -> Option<Route> {
        let key = route_key(from, to, waypoints);
        if let Some(hit) = self.entries.get(&key).filter(|c| c.expires_at > now) {
            return Some(hit.route());
        }
        let route = planner.find_route(from, to, waypoints)?;
        self.entries.insert(
            key,
            CachedRoute {
                from: from.clone(),
                to: to.clone(),
                rooms: route.rooms.clone(),
                total_distance: route.total_distance,
                expires_at: now + self.ttl,
            },
        );
        Some(route)
    }

    /// Drop every entry between two rooms in either direction, whatever the
    /// waypoints. Returns the number removed.
    pub fn invalidate_between(&mut self, a: &RoomName, b: &RoomName) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, c| !((&c.from == a && &c.to == b) || (&c.from == b && &c.to == a)));
        before - self.entries.len()
    }

    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, c| c.expires_at > now);
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockHost;

    #[test]
    fn test_route_key_includes_waypoints() {
        let a = RoomName::from("W1N1");
        let b = RoomName::from("W3N1");
        assert_eq!(route_key(&a, &b, &[]), "W1N1>W3N1");
        assert_eq!(
            route_key(&a, &b, &[RoomName::from("W2N2")]),
            "W1N1>W3N1|W2N2"
        );
    }

    #[test]
    fn test_hit_skips_planner_until_expiry() {
        let mut host = MockHost::new();
        host.add_route("W1N1", "W3N1", 2);
        let mut table = BTreeMap::new();
        let mut cache = RouteCache::new(&mut table, 100);
        let (a, b) = (RoomName::from("W1N1"), RoomName::from("W3N1"));

        assert_eq!(cache.route(&host, 10, &a, &b, &[]).unwrap().total_distance, 2);
        assert!(cache.route(&host, 50, &a, &b, &[]).is_some());
        assert_eq!(host.route_calls.get(), 1);

        // Expired at 110
        assert!(cache.route(&host, 110, &a, &b, &[]).is_some());
        assert_eq!(host.route_calls.get(), 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let host = MockHost::new();
        let mut table = BTreeMap::new();
        let mut cache = RouteCache::new(&mut table, 100);
        let (a, b) = (RoomName::from("W1N1"), RoomName::from("W9N9"));
        assert!(cache.route(&host, 0, &a, &b, &[]).is_none());
        assert!(cache.route(&host, 1, &a, &b, &[]).is_none());
        assert_eq!(host.route_calls.get(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn test_invalidate_between_both_directions() {
        let mut host = MockHost::new();
        host.add_route("W1N1", "W3N1", 2);
        host.add_route("W1N1", "W5N1", 4);
        let mut table = BTreeMap::new();
        let mut cache = RouteCache::new(&mut table, 100);
        let (a, b, c) = (
            RoomName::from("W1N1"),
            RoomName::from("W3N1"),
            RoomName::from("W5N1"),
        );
        cache.route(&host, 0, &a, &b, &[]);
        cache.route(&host, 0, &b, &a, &[]);
        cache.route(&host, 0, &a, &c, &[]);
        assert_eq!(cache.invalidate_between(&b, &a), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let mut host = MockHost::new();
        host.add_route("W1N1", "W3N1", 2);
        let mut table = BTreeMap::new();
        let mut cache = RouteCache::new(&mut table, 10);
        let (a, b) = (RoomName::from("W1N1"), RoomName::from("W3N1"));
        cache.route(&host, 0, &a, &b, &[]);
        assert_eq!(cache.purge_expired(5), 0);
        assert_eq!(cache.purge_expired(10), 1);
    }
}
