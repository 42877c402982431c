//! Room names, tile positions, and range math.
//!
//! The world is a grid of rooms, each `ROOM_SIZE` tiles square. Rooms are
//! named on a compass grid (`W1N1`, `E0S3`, …); positions are stored as a
//! room name plus local tile coordinates so they serialize into agent memory
//! as plain data and never hold a live handle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width and height of a room in tiles.
pub const ROOM_SIZE: i32 = 50;

/// Range reported between positions whose rooms cannot be placed on the grid.
pub const UNKNOWN_RANGE: u32 = u32::MAX / 2;

/// Largest room number on either axis. Global tile coordinates of every room
/// up to here fit in an `i32`.
pub const MAX_ROOM_NUMBER: i32 = 1_000_000;

// ============================================================================
// ROOM NAMES
// ============================================================================

/// Name of a room, e.g. `W1N1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(pub String);

impl RoomName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Grid coordinates of this room: x grows east, y grows south.
    ///
    /// `W0` is column -1 and `E0` is column 0 (likewise `N0`/`S0`), so the
    /// grid has no gap at the origin. Returns `None` for names that are not
    /// in compass form or lie beyond [`MAX_ROOM_NUMBER`].
    pub fn coords(&self) -> Option<(i32, i32)> {
        let s = self.0.as_bytes();
        let (h, rest) = s.split_first()?;
        let split = rest.iter().position(|c| !c.is_ascii_digit())?;
        let (xs, rest) = rest.split_at(split);
        let (v, ys) = rest.split_first()?;
        if xs.is_empty() || ys.is_empty() || !ys.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let xn: i32 = std::str::from_utf8(xs).ok()?.parse().ok()?;
        let yn: i32 = std::str::from_utf8(ys).ok()?.parse().ok()?;
        if xn > MAX_ROOM_NUMBER || yn > MAX_ROOM_NUMBER {
            return None;
        }
        let x = match h {
            b'W' => -xn - 1,
            b'E' => xn,
            _ => return None,
        };
        let y = match v {
            b'N' => -yn - 1,
            b'S' => yn,
            _ => return None,
        };
        Some((x, y))
    }

    /// Inverse of [`RoomName::coords`].
    pub fn from_coords(x: i32, y: i32) -> Self {
        let h = if x < 0 {
            format!("W{}", x.unsigned_abs() - 1)
        } else {
            format!("E{}", x)
        };
        let v = if y < 0 {
            format!("N{}", y.unsigned_abs() - 1)
        } else {
            format!("S{}", y)
        };
        Self(format!("{h}{v}"))
    }

    /// Straight-line distance in rooms (Chebyshev over the room grid).
    pub fn linear_distance(&self, other: &RoomName) -> Option<u32> {
        let (ax, ay) = self.coords()?;
        let (bx, by) = other.coords()?;
        Some((ax - bx).unsigned_abs().max((ay - by).unsigned_abs()))
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// POSITIONS
// ============================================================================

/// A tile inside a room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub room: RoomName,
    pub x: u8,
    pub y: u8,
}

impl Position {
    pub fn new(room: impl Into<RoomName>, x: u8, y: u8) -> Self {
        Self {
            room: room.into(),
            x,
            y,
        }
    }

    /// Centre tile of a room.
    pub fn center_of(room: &RoomName) -> Self {
        Self {
            room: room.clone(),
            x: (ROOM_SIZE / 2) as u8,
            y: (ROOM_SIZE / 2) as u8,
        }
    }

    /// World-global tile coordinates, if the room name is on the grid.
    pub fn global(&self) -> Option<(i32, i32)> {
        let (rx, ry) = self.room.coords()?;
        let gx = rx.checked_mul(ROOM_SIZE)?.checked_add(self.x as i32)?;
        let gy = ry.checked_mul(ROOM_SIZE)?.checked_add(self.y as i32)?;
        Some((gx, gy))
    }

    /// Position at world-global tile coordinates.
    pub fn from_global(gx: i32, gy: i32) -> Self {
        let room = RoomName::from_coords(gx.div_euclid(ROOM_SIZE), gy.div_euclid(ROOM_SIZE));
        Self {
            room,
            x: gx.rem_euclid(ROOM_SIZE) as u8,
            y: gy.rem_euclid(ROOM_SIZE) as u8,
        }
    }

    /// Chebyshev range in tiles. Crosses room borders when both rooms are on
    /// the grid; otherwise positions in different rooms are [`UNKNOWN_RANGE`]
    /// apart.
    pub fn range_to(&self, other: &Position) -> u32 {
        if self.room == other.room {
            let dx = (self.x as i32 - other.x as i32).unsigned_abs();
            let dy = (self.y as i32 - other.y as i32).unsigned_abs();
            return dx.max(dy);
        }
        match (self.global(), other.global()) {
            (Some((ax, ay)), Some((bx, by))) => {
                (ax - bx).unsigned_abs().max((ay - by).unsigned_abs())
            }
            _ => UNKNOWN_RANGE,
        }
    }

    pub fn in_range_to(&self, other: &Position, range: u32) -> bool {
        self.range_to(other) <= range
    }

    /// The up-to-eight tiles adjacent to this one, staying inside the room's
    /// buildable interior (border tiles are exits).
    pub fn neighbors(&self) -> Vec<Position> {
        let mut out = Vec::with_capacity(8);
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let x = self.x as i32 + dx;
                let y = self.y as i32 + dy;
                if (1..ROOM_SIZE - 1).contains(&x) && (1..ROOM_SIZE - 1).contains(&y) {
                    out.push(Position {
                        room: self.room.clone(),
                        x: x as u8,
                        y: y as u8,
                    });
                }
            }
        }
        out
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {},{}]", self.room, self.x, self.y)
    }
}
