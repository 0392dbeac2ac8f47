pub mod containment;
pub mod map;
pub mod object;
pub mod region;
pub mod registry;
pub mod sector;
pub mod state;
pub mod terrain;

use crate::world::registry::Uid;
use std::fmt;

/// Failure modes of the world-state operations. Recoverable outcomes such
/// as a refused stack merge are ordinary return values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldError {
    InvalidPosition { x: i32, y: i32, plane: u8 },
    UnknownObject(Uid),
    NotLimbo(Uid),
    NotOnGround(Uid),
    NotAContainer(Uid),
    NotACharacter(Uid),
    NotEquippable(Uid),
    BadLayer(u8),
    ContainmentCycle { item: Uid, container: Uid },
    BadUid(Uid),
    UidOccupied(Uid),
    Denied,
}

impl fmt::Display for WorldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldError::InvalidPosition { x, y, plane } => {
                write!(f, "position ({}, {}) is outside map plane {}", x, y, plane)
            }
            WorldError::UnknownObject(uid) => write!(f, "no object with uid {}", uid),
            WorldError::NotLimbo(uid) => {
                write!(f, "object {} must be detached before it can enter a new place", uid)
            }
            WorldError::NotOnGround(uid) => write!(f, "object {} is not on the ground", uid),
            WorldError::NotAContainer(uid) => write!(f, "object {} is not a container", uid),
            WorldError::NotACharacter(uid) => write!(f, "object {} is not a character", uid),
            WorldError::NotEquippable(uid) => write!(f, "object {} cannot be equipped", uid),
            WorldError::BadLayer(layer) => write!(f, "invalid equipment layer {}", layer),
            WorldError::ContainmentCycle { item, container } => {
                write!(f, "putting {} into {} would close a containment cycle", item, container)
            }
            WorldError::BadUid(uid) => write!(f, "uid {} is outside the valid range", uid),
            WorldError::UidOccupied(uid) => {
                write!(f, "uid {} is already taken by a live object", uid)
            }
            WorldError::Denied => write!(f, "operation denied by a script hook"),
        }
    }
}

impl std::error::Error for WorldError {}
