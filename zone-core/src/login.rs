//! Login-response packet assembly (spec.md §4.5's `SendLoginResponse`
//! handler): the binary/chat-text response emitted once an `IAuth` result
//! has landed on the player record (`complete_auth`) and the state machine
//! has reached `SendLoginResponse`. Built on `protocol::outbound`/`chat`'s
//! wire primitives; delivering the bytes is the caller's `Transport`.

use crate::auth::AuthCode;
use crate::capability::{CapabilityManager, CAP_SEE_PRIV_FREQ};
use crate::chat::OutboundChatLine;
use crate::player::{ClientKind, PlayerId, PlayerTable};
use crate::protocol::outbound::{ContVersionPacket, LoginResponsePacket, LoginTextPacket};
use flux::wire::Serialize;
use std::io::Cursor;

/// Collaborators the login response needs beyond the player table: packet
/// delivery, and the server-chosen checksums/version spec.md §4.5 says a
/// standard client's `LoginResponse` carries. Checksum computation itself
/// (executable/code hashing, news-file hashing) is an external
/// collaborator's concern; this only asks for the already-computed values.
pub trait LoginResponseSink {
    fn send_reliable(&self, player: PlayerId, bytes: &[u8]);
    fn send_chat_line(&self, player: PlayerId, line: &str);
    fn server_version(&self) -> u32;
    fn exe_checksum(&self) -> u32;
    fn code_checksum(&self) -> u32;
    fn news_checksum(&self) -> u32;
    fn cont_version(&self) -> u16;
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

fn code_byte(code: AuthCode) -> u8 {
    match code {
        AuthCode::Ok => 0x00,
        AuthCode::NewName => 0x01,
        AuthCode::BadPassword => 0x02,
        AuthCode::LockedOut => 0x03,
        AuthCode::NoPermission => 0x04,
        AuthCode::CustomText => 0x08,
    }
}

/// Runs spec.md §4.5's `SendLoginResponse` sequence for `player`, reading
/// back the `AuthResult` fields `complete_auth` recorded on the player
/// record.
pub fn send_login_response(players: &PlayerTable, player: PlayerId, capabilities: &dyn CapabilityManager, sink: &dyn LoginResponseSink) {
    let guard = players.read();
    let Some(p) = guard.get(&player) else { return };

    match p.client_kind {
        ClientKind::Fake => {}
        ClientKind::Chat => {
            let line = if p.auth_code == AuthCode::Ok {
                OutboundChatLine::LoginOk { name: &p.name }.format()
            } else {
                OutboundChatLine::LoginBad { reason: &auth_code_reason(p.auth_code) }.format()
            };
            sink.send_chat_line(player, &line);
        }
        ClientKind::Standard => {
            // VIE clients cannot render a custom-text screen (spec.md §4.5).
            let code = if p.continuum { p.auth_code } else { p.auth_code.for_vie_client() };

            // A player holding the "see priv freq" capability gets
            // all-ones checksums so its client treats itself as a
            // moderator (spec.md §4.5).
            let see_priv_freq = capabilities.has_capability(player, p.arena, CAP_SEE_PRIV_FREQ);
            let (exe_checksum, code_checksum, news_checksum) = if see_priv_freq {
                (u32::MAX, u32::MAX, u32::MAX)
            } else {
                (sink.exe_checksum(), sink.code_checksum(), sink.news_checksum())
            };

            if let Some(bytes) = serialize_to_vec(&LoginResponsePacket {
                code: code_byte(code),
                server_version: sink.server_version(),
                exe_checksum,
                code_checksum,
                news_checksum,
            }) {
                sink.send_reliable(player, &bytes);
            }

            if p.continuum {
                if let Some(bytes) = serialize_to_vec(&ContVersionPacket { cont_version: sink.cont_version() }) {
                    sink.send_reliable(player, &bytes);
                }
            }

            if code == AuthCode::CustomText {
                if let Some(text) = &p.auth_custom_text {
                    if let Some(bytes) = serialize_to_vec(&LoginTextPacket { text }) {
                        sink.send_reliable(player, &bytes);
                    }
                }
            }
        }
    }
}

fn auth_code_reason(code: AuthCode) -> String {
    match code {
        AuthCode::Ok => "ok".to_string(),
        AuthCode::NewName => "new name not allowed".to_string(),
        AuthCode::BadPassword => "bad password".to_string(),
        AuthCode::LockedOut => "locked out".to_string(),
        AuthCode::NoPermission => "no permission".to_string(),
        AuthCode::CustomText => "custom".to_string(),
    }
}
