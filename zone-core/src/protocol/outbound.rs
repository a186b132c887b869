//! Outbound binary response packets (spec.md §6) for the arena-entry
//! response (§4.6) and carry-flag protocol (§4.8). `PositionPacket`'s own
//! outbound variant lives in `position.rs`.

use super::types::*;
use crate::player::Ship;
use flux::wire::{Serialize, SizedWrite, WireError, WireResult};
use std::io::Write;

fn write_name_field<W: SizedWrite>(stream: &mut W, name: &str, field_len: usize) -> WireResult<()> {
    let mut field = vec![0u8; field_len];
    let bytes = name.as_bytes();
    let len = bytes.len().min(field_len - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    stream.write_all(&field).map_err(Into::into)
}

/// `WhoAmI` (spec.md §6, §4.6): sent to a standard client with its own
/// id, once at arena-entry (§4.6 step 1) and once per `recycle_arena`
/// player (§4.4) so the client knows to leave and rejoin cleanly.
pub struct WhoAmIPacket {
    pub player_id: u16,
}

impl Serialize for WhoAmIPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 3 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_WHO_AM_I])?;
        stream.write_all(&self.player_id.to_le_bytes())?;
        Ok(())
    }
}

/// `LoginResponse` (spec.md §6, §4.5): the standard-client login
/// response, carrying the server-chosen exe/code checksums and news
/// checksum C6's `SendLoginResponse` handler computes.
pub struct LoginResponsePacket {
    pub code: u8,
    pub server_version: u32,
    pub exe_checksum: u32,
    pub code_checksum: u32,
    pub news_checksum: u32,
}

impl Serialize for LoginResponsePacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 17 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_LOGIN_RESPONSE, self.code])?;
        stream.write_all(&self.server_version.to_le_bytes())?;
        stream.write_all(&self.exe_checksum.to_le_bytes())?;
        stream.write_all(&self.code_checksum.to_le_bytes())?;
        stream.write_all(&self.news_checksum.to_le_bytes())?;
        Ok(())
    }
}

/// `LoginText` (spec.md §4.5): the secondary text packet custom-text auth
/// codes get, carrying the `IAuth` implementation's message.
pub struct LoginTextPacket<'a> {
    pub text: &'a str,
}

impl<'a> Serialize for LoginTextPacket<'a> {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        let bytes = self.text.as_bytes();
        if stream.free_capacity() < 1 + bytes.len() {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_LOGIN_TEXT])?;
        stream.write_all(bytes)?;
        Ok(())
    }
}

fn ship_index(ship: Ship) -> u8 {
    match ship {
        Ship::Warbird => 0,
        Ship::Javelin => 1,
        Ship::Spider => 2,
        Ship::Leviathan => 3,
        Ship::Terrier => 4,
        Ship::Weasel => 5,
        Ship::Lancaster => 6,
        Ship::Shark => 7,
        Ship::Spectator => 8,
    }
}

/// `ContVersion` (spec.md §4.5, §6): a separate packet Continuum clients
/// get alongside `LoginResponse`, carrying the server's expected client
/// build number.
pub struct ContVersionPacket {
    pub cont_version: u16,
}

impl Serialize for ContVersionPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 3 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_CONT_VERSION])?;
        stream.write_all(&self.cont_version.to_le_bytes())?;
        Ok(())
    }
}

/// `PlayerEntering` (spec.md §4.6): one per existing player, sent to an
/// entering standard client concatenated via `flux::wire::PayloadBatch`
/// into a single reliable burst; the entering player's own packet is sent
/// to everyone else individually.
pub struct PlayerEnteringPacket<'a> {
    pub player_id: u16,
    pub ship: Ship,
    pub freq: u16,
    pub name: &'a str,
    pub squad: &'a str,
}

const PLAYER_ENTERING_NAME_FIELD: usize = 24;
const PLAYER_ENTERING_SQUAD_FIELD: usize = 24;

impl<'a> Serialize for PlayerEnteringPacket<'a> {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        let size = 1 + 1 + 2 + 2 + PLAYER_ENTERING_NAME_FIELD + PLAYER_ENTERING_SQUAD_FIELD;
        if stream.free_capacity() < size {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_PLAYER_ENTERING, ship_index(self.ship)])?;
        stream.write_all(&self.freq.to_le_bytes())?;
        stream.write_all(&self.player_id.to_le_bytes())?;
        write_name_field(stream, self.name, PLAYER_ENTERING_NAME_FIELD)?;
        write_name_field(stream, self.squad, PLAYER_ENTERING_SQUAD_FIELD)?;
        Ok(())
    }
}

/// `EnteringArena` (spec.md §4.6): the 1-byte marker sent after the
/// `PlayerEntering` burst and map-filename packet, telling the client the
/// arena join is complete.
pub struct EnteringArenaPacket;

impl Serialize for EnteringArenaPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 1 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_ENTERING_ARENA]).map_err(Into::into)
    }
}

/// `WarpTo` (spec.md §4.6): sent after `EnteringArena` only if a pending
/// spawn location was recorded, bounded `0 < x,y < 1024` (spec.md §4.6
/// step 5).
pub struct WarpToPacket {
    pub x: u16,
    pub y: u16,
}

impl WarpToPacket {
    pub fn in_bounds(x: u16, y: u16) -> bool {
        x > 0 && x < 1024 && y > 0 && y < 1024
    }
}

impl Serialize for WarpToPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 5 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_WARP_TO])?;
        stream.write_all(&self.x.to_le_bytes())?;
        stream.write_all(&self.y.to_le_bytes())?;
        Ok(())
    }
}

/// `FlagLocation` (spec.md §4.8): broadcast on pickup/drop/neut and to an
/// entering player for every `OnMap` flag. The fake-remove sentinel is
/// `(-1,-1,freq=0xffff)` (spec.md §4.8's `try_set_flag_neuted`).
pub struct FlagLocationPacket {
    pub flag_id: u16,
    pub x: i16,
    pub y: i16,
    pub freq: u16,
}

impl Serialize for FlagLocationPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 9 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_FLAG_LOCATION])?;
        stream.write_all(&self.flag_id.to_le_bytes())?;
        stream.write_all(&self.x.to_le_bytes())?;
        stream.write_all(&self.y.to_le_bytes())?;
        stream.write_all(&self.freq.to_le_bytes())?;
        Ok(())
    }
}

/// `FlagPickup` (spec.md §4.8): broadcast on a non-kill pickup.
pub struct FlagPickupPacket {
    pub flag_id: u16,
    pub player_id: u16,
}

impl Serialize for FlagPickupPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 5 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_FLAG_PICKUP])?;
        stream.write_all(&self.flag_id.to_le_bytes())?;
        stream.write_all(&self.player_id.to_le_bytes())?;
        Ok(())
    }
}

/// `FlagDrop` (spec.md §4.8): broadcast once per `DropFlags` request,
/// before each carried flag's individual transition is applied.
pub struct FlagDropPacket {
    pub player_id: u16,
}

impl Serialize for FlagDropPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 3 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_FLAG_DROP])?;
        stream.write_all(&self.player_id.to_le_bytes())?;
        Ok(())
    }
}

/// `FlagReset` (spec.md §4.8): broadcast by `reset_game` while the game
/// was running, carrying the winning frequency and its point award.
pub struct FlagResetPacket {
    pub winner_freq: u16,
    pub points: u32,
}

impl Serialize for FlagResetPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 7 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_FLAG_RESET])?;
        stream.write_all(&self.winner_freq.to_le_bytes())?;
        stream.write_all(&self.points.to_le_bytes())?;
        Ok(())
    }
}

/// `KeepAlive` (spec.md §6): 1-byte transport-level heartbeat.
pub struct KeepAlivePacket;

impl Serialize for KeepAlivePacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        if stream.free_capacity() < 1 {
            return Err(WireError::Wait);
        }
        stream.write_all(&[S2C_KEEP_ALIVE]).map_err(Into::into)
    }
}
