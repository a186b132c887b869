//! Error types shared across zone-core's modules.

use std::fmt;

#[derive(Debug, Eq, PartialEq)]
pub enum ZoneError {
    UnknownPlayer,
    UnknownArena,
    ArenaNameInvalid,
    NotInWaitHolds,
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::UnknownPlayer => write!(f, "unknown player"),
            ZoneError::UnknownArena => write!(f, "unknown arena"),
            ZoneError::ArenaNameInvalid => write!(f, "arena name sanitizes to empty"),
            ZoneError::NotInWaitHolds => write!(f, "arena is not in a WaitHolds state"),
        }
    }
}

impl std::error::Error for ZoneError {}
