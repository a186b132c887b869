//! Core zone-server engine: component broker plumbing aside (that lives in
//! the `broker` crate), this crate owns the mainloop, module lifecycle,
//! player/arena tables, the player state machine, and the position/weapon
//! fan-out wire format and visibility rules (spec.md §§4.2-4.7, C2-C7).

pub mod arena;
pub mod auth;
pub mod capability;
pub mod chat;
pub mod config;
pub mod entry;
pub mod error;
pub mod fanout;
pub mod login;
pub mod mainloop;
pub mod module;
pub mod player;
pub mod player_sm;
pub mod protocol;

pub use error::ZoneError;
