//! Inbound binary control packets (spec.md §6): arena entry/exit, login,
//! ship/freq/spec requests, death reports, and the carry-flag protocol's
//! `TouchFlag`/`DropFlags`. Position/weapon packets have their own module
//! (`position.rs`) since they are the hot path and get a dedicated
//! checksum/sentinel treatment.

use super::types::*;
use flux::wire::{Deserialize, SizedRead, WireError, WireErrorKind, WireResult};
use std::io::Read;

/// `GotoArena` (spec.md §6): VIE sends an 8-byte fixed header, Continuum
/// a 9-byte header with one extra flag byte; a private-arena request
/// (`arena_type == -3`) is followed by the requested name as a trailing
/// ASCII tail, read from whatever remains in the packet.
#[derive(Clone, Debug)]
pub struct GotoArenaPacket {
    pub ship: i8,
    pub xres: u16,
    pub yres: u16,
    pub arena_type: i16,
    pub exempt_from_death_lag: bool,
    pub arena_name: Option<String>,
}

impl Deserialize for GotoArenaPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 8 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut header = [0u8; 8];
        stream.read_exact(&mut header)?;

        let ship = header[0] as i8;
        let xres = u16::from_le_bytes([header[1], header[2]]);
        let yres = u16::from_le_bytes([header[3], header[4]]);
        let arena_type = i16::from_le_bytes([header[5], header[6]]);

        let exempt_from_death_lag = if stream.remaining_data() > 0 {
            let mut extra = [0u8; 1];
            stream.read_exact(&mut extra)?;
            extra[0] != 0
        } else {
            false
        };

        let arena_name = if arena_type == -3 && stream.remaining_data() > 0 {
            let mut tail = vec![0u8; stream.remaining_data()];
            stream.read_exact(&mut tail)?;
            let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
            Some(String::from_utf8_lossy(&tail[..end]).into_owned())
        } else {
            None
        };

        Ok(GotoArenaPacket { ship, xres, yres, arena_type, exempt_from_death_lag, arena_name })
    }
}

/// `LeaveArena` (spec.md §6): 1 byte, the type tag only.
pub struct LeaveArenaPacket;

impl Deserialize for LeaveArenaPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 1 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut tag = [0u8; 1];
        stream.read_exact(&mut tag)?;
        if tag[0] != C2S_LEAVE_ARENA {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        Ok(LeaveArenaPacket)
    }
}

/// `Login` (spec.md §6): VIE clients send a smaller fixed-size packet,
/// Continuum a larger one carrying macro/checksum fields, both capped at
/// 512 bytes. Only the fields C6's auth dispatch needs are surfaced here;
/// everything past the password is exposed as `raw` for the `IAuth`
/// adapter to hash against (spec.md §4.9).
#[derive(Clone, Debug)]
pub struct LoginPacket {
    pub is_continuum: bool,
    pub name: String,
    pub password: String,
    pub raw: Vec<u8>,
}

const LOGIN_NAME_FIELD: usize = 32;
const LOGIN_PASSWORD_FIELD: usize = 32;
const LOGIN_VIE_FIXED_SIZE: usize = 1 + LOGIN_NAME_FIELD + LOGIN_PASSWORD_FIELD + 4;

impl Deserialize for LoginPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        let total = stream.remaining_data();
        if total < LOGIN_VIE_FIXED_SIZE || total > crate::auth::MAX_LOGIN_BYTES {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }

        let mut raw = vec![0u8; total];
        stream.read_exact(&mut raw)?;

        let name_start = 1;
        let name_end = name_start + LOGIN_NAME_FIELD;
        let pass_end = name_end + LOGIN_PASSWORD_FIELD;

        let name = field_to_string(&raw[name_start..name_end]);
        let password = field_to_string(&raw[name_end..pass_end]);
        let is_continuum = total > LOGIN_VIE_FIXED_SIZE;

        Ok(LoginPacket { is_continuum, name, password, raw })
    }
}

fn field_to_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// `SpecRequest` (spec.md §6): 3 bytes, type tag plus the target player
/// id to spectate (`0xffff` requests free-roam spec, no fixed target).
pub struct SpecRequestPacket {
    pub target: u16,
}

impl Deserialize for SpecRequestPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 3 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut body = [0u8; 3];
        stream.read_exact(&mut body)?;
        Ok(SpecRequestPacket { target: u16::from_le_bytes([body[1], body[2]]) })
    }
}

/// `SetShip` (spec.md §6): 2 bytes, type tag plus requested ship index.
pub struct SetShipPacket {
    pub ship: u8,
}

impl Deserialize for SetShipPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 2 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut body = [0u8; 2];
        stream.read_exact(&mut body)?;
        Ok(SetShipPacket { ship: body[1] })
    }
}

/// `SetFreq` (spec.md §6): 3 bytes, type tag plus the requested frequency.
pub struct SetFreqPacket {
    pub freq: u16,
}

impl Deserialize for SetFreqPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 3 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut body = [0u8; 3];
        stream.read_exact(&mut body)?;
        Ok(SetFreqPacket { freq: u16::from_le_bytes([body[1], body[2]]) })
    }
}

/// `Die` (spec.md §6): 5 bytes — type tag, killer id, bounty at death.
pub struct DiePacket {
    pub killer: u16,
    pub bounty: u16,
}

impl Deserialize for DiePacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 5 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut body = [0u8; 5];
        stream.read_exact(&mut body)?;
        Ok(DiePacket {
            killer: u16::from_le_bytes([body[1], body[2]]),
            bounty: u16::from_le_bytes([body[3], body[4]]),
        })
    }
}

/// `TouchFlag` (spec.md §6, §4.8): 3 bytes, type tag plus flag id.
pub struct TouchFlagPacket {
    pub flag_id: u16,
}

impl Deserialize for TouchFlagPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 3 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut body = [0u8; 3];
        stream.read_exact(&mut body)?;
        Ok(TouchFlagPacket { flag_id: u16::from_le_bytes([body[1], body[2]]) })
    }
}

/// `DropFlags` (spec.md §6, §4.8): 1 byte, the type tag only.
pub struct DropFlagsPacket;

impl Deserialize for DropFlagsPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 1 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }
        let mut tag = [0u8; 1];
        stream.read_exact(&mut tag)?;
        Ok(DropFlagsPacket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> Cursor<&[u8]> {
        Cursor::new(bytes)
    }

    #[test]
    fn goto_arena_private_request_reads_trailing_name() {
        let mut bytes = vec![2u8, 0, 0, 0, 0, 0, 0xfd, 0xff, 0];
        bytes.extend_from_slice(b"test#1\0");
        let mut cursor = reader(&bytes);
        let pkt = GotoArenaPacket::deserialize(&mut cursor).unwrap();
        assert_eq!(pkt.ship, 2);
        assert_eq!(pkt.arena_type, -3);
        assert_eq!(pkt.arena_name.as_deref(), Some("test#1"));
    }

    #[test]
    fn login_packet_extracts_name_and_password() {
        let mut raw = vec![0u8; LOGIN_VIE_FIXED_SIZE];
        raw[0] = C2S_LOGIN;
        raw[1..5].copy_from_slice(b"Ace\0");
        raw[33..41].copy_from_slice(b"hunter2\0");
        let mut cursor = reader(&raw);
        let pkt = LoginPacket::deserialize(&mut cursor).unwrap();
        assert_eq!(pkt.name, "Ace");
        assert_eq!(pkt.password, "hunter2");
        assert!(!pkt.is_continuum);
    }

    #[test]
    fn login_packet_rejects_oversize_payload() {
        let raw = vec![0u8; crate::auth::MAX_LOGIN_BYTES + 1];
        let mut cursor = reader(&raw);
        assert!(LoginPacket::deserialize(&mut cursor).is_err());
    }

    #[test]
    fn touch_flag_reads_flag_id() {
        let bytes = [C2S_TOUCH_FLAG, 7, 0];
        let mut cursor = reader(&bytes);
        let pkt = TouchFlagPacket::deserialize(&mut cursor).unwrap();
        assert_eq!(pkt.flag_id, 7);
    }
}
