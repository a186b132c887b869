//! Arena-entry response assembly (spec.md §4.6): the packet sequence a
//! player's `ArenaRespAndCBS` handler triggers once it has set `arena =
//! new_arena` and is about to fire `EnterArena`. Built on
//! `protocol::outbound`/`chat`'s wire primitives; actually getting bytes to
//! a socket is the caller's concern, not this module's (spec.md §1 keeps
//! the transport itself out of scope).

use crate::arena::ArenaId;
use crate::chat::OutboundChatLine;
use crate::player::{ClientKind, PlayerId, PlayerStatus, PlayerTable};
use crate::protocol::outbound::{EnteringArenaPacket, PlayerEnteringPacket, WarpToPacket, WhoAmIPacket};
use flux::wire::{PayloadBatch, Serialize};
use std::io::Cursor;

/// Collaborators the arena-entry response needs beyond the player table
/// itself: delivering bytes/lines to a client, and the map-download
/// collaborator's filename packet (map parsing itself is out of scope per
/// spec.md §1 — this only asks for the bytes of whatever it already
/// produced).
pub trait EntryResponseSink {
    fn send_reliable(&self, player: PlayerId, bytes: &[u8]);
    fn send_chat_line(&self, player: PlayerId, line: &str);
    /// Bytes of the map-filename packet, if a map-download collaborator is
    /// registered (spec.md §4.6 step 5); `None` skips that send.
    fn map_filename_packet(&self, player: PlayerId) -> Option<Vec<u8>>;
    /// Requests client settings from the settings provider (spec.md §4.6
    /// step 1); fire-and-forget, nothing assembled by this module.
    fn request_client_settings(&self, player: PlayerId);
}

fn serialize_to_vec<P: Serialize>(packet: &P) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 512];
    {
        let mut cursor = Cursor::new(&mut buf[..]);
        packet.serialize(&mut cursor).ok()?;
        let pos = cursor.position() as usize;
        buf.truncate(pos);
    }
    Some(buf)
}

/// Runs spec.md §4.6's full sequence for `player`, who must already have
/// `.arena == Some(arena_id)` and `.status == Playing` (the `ArenaRespAndCBS`
/// handler sets both just before calling this).
pub fn send_arena_entry_response(players: &PlayerTable, arena_id: ArenaId, player: PlayerId, sink: &dyn EntryResponseSink) {
    let guard = players.read();
    let Some(entering) = guard.get(&player) else { return };
    if entering.client_kind == ClientKind::Fake {
        return;
    }
    let entering_is_standard = entering.client_kind == ClientKind::Standard;

    // Step 1: "who am I" then client settings, standard clients only.
    if entering_is_standard {
        if let Some(bytes) = serialize_to_vec(&WhoAmIPacket { player_id: player as u16 }) {
            sink.send_reliable(player, &bytes);
        }
        sink.request_client_settings(player);
    }

    // Step 3's burst starts with the entering player's own packet.
    let mut burst: PayloadBatch<PlayerEnteringPacket> = PayloadBatch::new();
    if entering_is_standard {
        burst.push(PlayerEnteringPacket {
            player_id: player as u16,
            ship: entering.ship,
            freq: entering.freq,
            name: &entering.name,
            squad: &entering.squad,
        });
    }

    // Steps 2 and 4: every other player already Playing in this arena.
    for other in guard.values() {
        if other.id == player || other.arena != Some(arena_id) || other.status != PlayerStatus::Playing {
            continue;
        }

        match other.client_kind {
            ClientKind::Standard => {
                if let Some(bytes) = serialize_to_vec(&PlayerEnteringPacket {
                    player_id: player as u16,
                    ship: entering.ship,
                    freq: entering.freq,
                    name: &entering.name,
                    squad: &entering.squad,
                }) {
                    sink.send_reliable(other.id, &bytes);
                }
            }
            ClientKind::Chat => {
                sink.send_chat_line(
                    other.id,
                    &OutboundChatLine::Player { name: &entering.name, ship: entering.ship, freq: entering.freq }.format(),
                );
            }
            ClientKind::Fake => {}
        }

        match entering.client_kind {
            ClientKind::Standard => burst.push(PlayerEnteringPacket {
                player_id: other.id as u16,
                ship: other.ship,
                freq: other.freq,
                name: &other.name,
                squad: &other.squad,
            }),
            ClientKind::Chat => sink.send_chat_line(
                player,
                &OutboundChatLine::Entering { name: &other.name, ship: other.ship, freq: other.freq }.format(),
            ),
            ClientKind::Fake => {}
        }
    }

    if !entering_is_standard {
        return;
    }

    let mut buf = vec![0u8; 4096];
    let burst_len = {
        let mut cursor = Cursor::new(&mut buf[..]);
        while !burst.is_empty() {
            if burst.write(&mut cursor).is_err() {
                break;
            }
        }
        cursor.position() as usize
    };
    if burst_len > 0 {
        sink.send_reliable(player, &buf[..burst_len]);
    }

    // Step 5: map filename, the 1-byte arena-join marker, then an optional
    // pending spawn warp.
    if let Some(map_bytes) = sink.map_filename_packet(player) {
        sink.send_reliable(player, &map_bytes);
    }
    if let Some(bytes) = serialize_to_vec(&EnteringArenaPacket) {
        sink.send_reliable(player, &bytes);
    }
    if let Some((x, y)) = entering.spawn_location {
        if WarpToPacket::in_bounds(x, y) {
            if let Some(bytes) = serialize_to_vec(&WarpToPacket { x, y }) {
                sink.send_reliable(player, &bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Ship;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        reliable: Mutex<Vec<(PlayerId, Vec<u8>)>>,
        chat_lines: Mutex<Vec<(PlayerId, String)>>,
    }

    impl EntryResponseSink for RecordingSink {
        fn send_reliable(&self, player: PlayerId, bytes: &[u8]) {
            self.reliable.lock().unwrap().push((player, bytes.to_vec()));
        }
        fn send_chat_line(&self, player: PlayerId, line: &str) {
            self.chat_lines.lock().unwrap().push((player, line.to_string()));
        }
        fn map_filename_packet(&self, _player: PlayerId) -> Option<Vec<u8>> {
            None
        }
        fn request_client_settings(&self, _player: PlayerId) {}
    }

    fn make_playing(players: &PlayerTable, arena: ArenaId, name: &str, kind: ClientKind) -> PlayerId {
        let id = players.create(kind);
        let mut guard = players.write();
        let p = guard.get_mut(&id).unwrap();
        p.name = name.to_string();
        p.arena = Some(arena);
        p.status = PlayerStatus::Playing;
        p.ship = Ship::Warbird;
        id
    }

    #[test]
    fn standard_entry_sends_who_am_i_burst_and_marker() {
        let players = PlayerTable::new();
        let arena = ArenaId(1);
        let existing = make_playing(&players, arena, "Bob", ClientKind::Standard);
        let entering = make_playing(&players, arena, "Alice", ClientKind::Standard);

        let sink = RecordingSink::default();
        send_arena_entry_response(&players, arena, entering, &sink);

        let reliable = sink.reliable.lock().unwrap();
        // WhoAmI, PlayerEntering-to-Bob, burst-to-Alice, EnteringArena marker.
        assert_eq!(reliable.iter().filter(|(p, _)| *p == entering).count(), 3);
        assert_eq!(reliable.iter().filter(|(p, _)| *p == existing).count(), 1);
    }

    #[test]
    fn chat_entry_emits_player_and_entering_lines() {
        let players = PlayerTable::new();
        let arena = ArenaId(1);
        let existing = make_playing(&players, arena, "Bob", ClientKind::Chat);
        let entering = make_playing(&players, arena, "Alice", ClientKind::Chat);

        let sink = RecordingSink::default();
        send_arena_entry_response(&players, arena, entering, &sink);

        let lines = sink.chat_lines.lock().unwrap();
        assert!(lines.iter().any(|(p, l)| *p == existing && l == "PLAYER:Alice:0:0"));
        assert!(lines.iter().any(|(p, l)| *p == entering && l == "ENTERING:Bob:0:0"));
        assert!(sink.reliable.lock().unwrap().is_empty());
    }

    #[test]
    fn fake_player_gets_no_response() {
        let players = PlayerTable::new();
        let arena = ArenaId(1);
        let fake = make_playing(&players, arena, "Bot", ClientKind::Fake);

        let sink = RecordingSink::default();
        send_arena_entry_response(&players, arena, fake, &sink);

        assert!(sink.reliable.lock().unwrap().is_empty());
        assert!(sink.chat_lines.lock().unwrap().is_empty());
    }

    #[test]
    fn spawn_location_out_of_bounds_is_skipped() {
        let players = PlayerTable::new();
        let arena = ArenaId(1);
        let entering = make_playing(&players, arena, "Alice", ClientKind::Standard);
        players.write().get_mut(&entering).unwrap().spawn_location = Some((2000, 2000));

        let sink = RecordingSink::default();
        send_arena_entry_response(&players, arena, entering, &sink);

        // WhoAmI, empty burst (own packet still goes through), EnteringArena:
        // no WarpTo because (2000, 2000) fails `in_bounds`.
        let reliable = sink.reliable.lock().unwrap();
        assert_eq!(reliable.len(), 3);
    }
}
