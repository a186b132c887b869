//! The transport boundary (spec.md §1's explicit non-goal: "the reliable
//! UDP transport itself" is out of scope). `zone-core` produces wire
//! bytes via `flux::wire::Serialize`; something implementing `Transport`
//! is responsible for actually getting those bytes onto the network,
//! reliability and ordering included. This trait is the seam, not an
//! implementation of it.

use zone_core::player::PlayerId;

/// Minimum surface the rest of the binary needs to hand a player outbound
/// bytes or ask for its reliability class, without caring how the bytes
/// actually travel.
pub trait Transport: Send + Sync {
    fn send_reliable(&self, player: PlayerId, bytes: &[u8]);
    fn send_unreliable(&self, player: PlayerId, bytes: &[u8]);
    fn is_connected(&self, player: PlayerId) -> bool;
}

/// Discards everything. Lets the rest of the binary (and its tests) run
/// without a real socket; a deployment substitutes its own `Transport`.
pub struct NullTransport;

impl Transport for NullTransport {
    fn send_reliable(&self, _player: PlayerId, _bytes: &[u8]) {}
    fn send_unreliable(&self, _player: PlayerId, _bytes: &[u8]) {}
    fn is_connected(&self, _player: PlayerId) -> bool {
        false
    }
}
