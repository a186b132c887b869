//! Wire layout for the inbound `Position` packet and the two outbound
//! variants fan-out picks between (spec.md §4.7, C7).

use flux::wire::{Deserialize, Serialize, SizedRead, SizedWrite, WireError, WireErrorKind, WireResult};
use std::io::{Read, Write};

pub const POSITION_PACKET_TYPE: u8 = 0x28;
pub const WEAPON_PACKET_TYPE: u8 = 0x05;

/// Sentinel position meaning "post-death, pre-respawn"; fan-out silently
/// drops packets at this position rather than broadcasting it.
pub const DEAD_SENTINEL: (i16, i16) = (-1, -1);

#[derive(Clone, Copy, Debug, Default)]
pub struct WeaponData {
    pub kind: u8,
    pub level: u8,
    pub shrap: u8,
    pub shrap_level: u8,
}

impl WeaponData {
    pub fn is_none(&self) -> bool {
        self.kind == 0
    }
}

/// An inbound position update, 20 bytes with an optional 10-byte extra
/// tail (32 bytes total with the extra data included).
#[derive(Clone, Copy, Debug)]
pub struct PositionPacket {
    pub rotation: u8,
    pub time: u32,
    pub x: i16,
    pub weapon: WeaponData,
    pub bounty: u16,
    pub id: u16,
    pub status_flags: u8,
    pub y: i16,
    pub x_vel: i16,
    pub y_vel: i16,
    pub checksum: u8,
    pub energy: u16,
    pub extra: Option<[u8; 10]>,
}

impl PositionPacket {
    /// XOR of the first 22 bytes; must be zero for a non-fake sender
    /// (spec.md §4.7).
    pub fn compute_checksum(bytes: &[u8]) -> u8 {
        bytes[..22.min(bytes.len())].iter().fold(0u8, |acc, b| acc ^ b)
    }

    pub fn is_dead_sentinel(&self) -> bool {
        (self.x, self.y) == DEAD_SENTINEL
    }
}

impl Deserialize for PositionPacket {
    fn deserialize<R: SizedRead>(stream: &mut R) -> WireResult<Self> {
        if stream.remaining_data() < 20 {
            return Err(WireError::Fatal(WireErrorKind::BadLength));
        }

        let mut header = [0u8; 20];
        stream.read_exact(&mut header)?;

        let rotation = header[0];
        let time16 = u16::from_le_bytes([header[1], header[2]]) as u32;
        let x = i16::from_le_bytes([header[3], header[4]]);
        let weapon = WeaponData {
            kind: header[5],
            level: header[6] & 0x0f,
            shrap: header[7],
            shrap_level: header[8] & 0x0f,
        };
        let bounty = u16::from_le_bytes([header[9], header[10]]);
        let id = u16::from_le_bytes([header[11], header[12]]);
        let status_flags = header[13];
        let y = i16::from_le_bytes([header[14], header[15]]);
        let x_vel = i16::from_le_bytes([header[16], header[17]]);
        let checksum = header[18];
        let y_vel = i16::from_le_bytes([header[19], 0]);

        let extra = if stream.remaining_data() >= 10 {
            let mut tail = [0u8; 10];
            stream.read_exact(&mut tail)?;
            Some(tail)
        } else {
            None
        };

        Ok(PositionPacket {
            rotation,
            time: time16,
            x,
            weapon,
            bounty,
            id,
            status_flags,
            y,
            x_vel,
            y_vel,
            checksum,
            energy: 0,
            extra,
        })
    }
}

/// Outbound packet after fan-out has decided the recipient's variant
/// (weapon vs position, optional energy/extra tail).
pub struct OutgoingPacket {
    pub packet_type: u8,
    pub sender_id: u16,
    pub position: PositionPacket,
    pub include_energy: bool,
    pub include_extra: bool,
}

impl Serialize for OutgoingPacket {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> WireResult<()> {
        let mut size = 1 + 21;
        if self.include_energy {
            size += 2;
        }
        if self.include_extra {
            size += 10;
        }
        if stream.free_capacity() < size {
            return Err(WireError::Wait);
        }

        let p = &self.position;
        stream.write_all(&[self.packet_type])?;
        stream.write_all(&[p.rotation])?;
        stream.write_all(&(p.time as u16).to_le_bytes())?;
        stream.write_all(&p.x.to_le_bytes())?;
        stream.write_all(&[p.weapon.kind, p.weapon.level, p.weapon.shrap, p.weapon.shrap_level])?;
        stream.write_all(&p.bounty.to_le_bytes())?;
        stream.write_all(&self.sender_id.to_le_bytes())?;
        stream.write_all(&[p.status_flags])?;
        stream.write_all(&p.y.to_le_bytes())?;
        stream.write_all(&p.x_vel.to_le_bytes())?;
        stream.write_all(&[p.checksum])?;
        stream.write_all(&p.y_vel.to_le_bytes())?;

        if self.include_energy {
            stream.write_all(&p.energy.to_le_bytes())?;
        }
        if self.include_extra {
            stream.write_all(&p.extra.unwrap_or([0u8; 10]))?;
        }

        Ok(())
    }
}
