//! Per-recipient visibility computation for inbound `Position` packets
//! (spec.md §4.7, C7). This module decides *whether* and *how* to send to
//! each candidate recipient; actual transport is out of scope.

use crate::player::{Player, PlayerStatus, Ship};
use crate::protocol::position::{POSITION_PACKET_TYPE, WEAPON_PACKET_TYPE};

/// Tunable distances and rates a deployment reads from its `Net:`/`Misc:`
/// configuration section; defaults mirror spec.md §4.7.
#[derive(Clone, Copy, Debug)]
pub struct FanoutSettings {
    pub bullet_pixels: u32,
    pub weapon_pixels: u32,
    pub thor_pixels: u32,
    pub position_extra_pixels: u32,
    pub antiwarp_send_percent: u8,
    pub region_check_interval_ms: u32,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        FanoutSettings {
            bullet_pixels: 1500,
            weapon_pixels: 2000,
            thor_pixels: 30000,
            position_extra_pixels: 8000,
            antiwarp_send_percent: 5,
            region_check_interval_ms: 100,
        }
    }
}

/// Weapon-type discriminants relevant to fan-out range/priority selection.
/// The concrete numbering is owned by the game-rules module; fan-out only
/// needs to tell these four classes apart.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum WeaponClass {
    None,
    Bullet,
    Thor,
    Mine,
    OtherWeapon,
}

pub fn classify_weapon(kind: u8) -> WeaponClass {
    match kind {
        0 => WeaponClass::None,
        1 | 2 => WeaponClass::Bullet,
        8 => WeaponClass::Thor,
        3 | 5 => WeaponClass::Mine,
        _ => WeaponClass::OtherWeapon,
    }
}

fn range_for(class: WeaponClass, settings: &FanoutSettings) -> u32 {
    match class {
        WeaponClass::None => 0,
        WeaponClass::Bullet => settings.bullet_pixels,
        WeaponClass::Thor => settings.thor_pixels,
        WeaponClass::Mine => u32::MAX,
        WeaponClass::OtherWeapon => settings.weapon_pixels,
    }
}

/// Transport priority/reliability hint fan-out attaches to a decision; the
/// transport collaborator maps this onto its own flags.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum SendKind {
    UnreliableDroppable,
    UnreliableDroppableHighPriority,
    Reliable,
}

#[derive(Clone, Copy, Debug)]
pub struct RecipientDecision {
    pub packet_type: u8,
    pub include_energy: bool,
    pub include_extra: bool,
    pub send_kind: SendKind,
}

pub fn euclidean_distance(a: (i16, i16), b: (i16, i16)) -> f64 {
    let dx = (a.0 as i64 - b.0 as i64) as f64;
    let dy = (a.1 as i64 - b.1 as i64) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Energy-visibility policy an arena assigns per recipient class (spec.md
/// §4.7): everyone, teammates only, or only those spectating the sender.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum EnergyPolicy {
    All,
    Team,
    Spec,
    None,
}

/// Picks the outbound packet type for a position update: a weapon packet
/// when a real weapon is present or id/bounty overflow a byte, otherwise a
/// plain position packet (spec.md §4.7).
pub fn select_packet_type(weapon_class: WeaponClass, bounty: u16, sender_id: u32) -> u8 {
    if weapon_class != WeaponClass::None || bounty > 255 || sender_id > 255 {
        WEAPON_PACKET_TYPE
    } else {
        POSITION_PACKET_TYPE
    }
}

/// Decides whether `recipient` should receive `sender`'s position update,
/// and if so with what variant/priority. `sample` is a caller-supplied
/// `[0, 1)` random draw used for the antiwarp and radar-tick probability
/// checks — PRNG itself is out of this crate's scope.
#[allow(clippy::too_many_arguments)]
pub fn decide_recipient(
    sender: &Player,
    sender_weapon_class: WeaponClass,
    recipient: &Player,
    antiwarp_engaged: bool,
    safe_zone_event: bool,
    flash: bool,
    radar_tick: bool,
    energy_policy: EnergyPolicy,
    settings: &FanoutSettings,
    sample: f64,
) -> Option<RecipientDecision> {
    if recipient.status != PlayerStatus::Playing {
        return None;
    }
    if recipient.id == sender.id {
        return None;
    }

    let packet_type = select_packet_type(sender_weapon_class, sender.position.bounty, sender.id);
    let spectating_sender = recipient.ship == Ship::Spectator && recipient.attached_to == Some(sender.id);
    let turret_attached = recipient.attached_to == Some(sender.id);

    let mut send = false;
    let mut send_kind = SendKind::UnreliableDroppable;

    if safe_zone_event || flash {
        send = true;
        send_kind = SendKind::Reliable;
    } else if sender_weapon_class == WeaponClass::Mine {
        send = true;
    } else if spectating_sender || turret_attached {
        send = true;
    } else {
        let distance = euclidean_distance(
            (sender.position.x, sender.position.y),
            (recipient.position.x, recipient.position.y),
        );
        let range = range_for(sender_weapon_class, settings) as f64;
        if sender_weapon_class != WeaponClass::None && distance <= range {
            send = true;
            send_kind = SendKind::UnreliableDroppableHighPriority;
        } else if sender_weapon_class == WeaponClass::None {
            if antiwarp_engaged && sample < (settings.antiwarp_send_percent as f64 / 100.0) {
                send = true;
            } else if radar_tick && distance <= settings.position_extra_pixels as f64 {
                let probability = 1.0 - distance / settings.position_extra_pixels as f64;
                if sample < probability {
                    send = true;
                }
            }
        }
    }

    if !send {
        return None;
    }

    let include_extra = spectating_sender;
    let include_energy = match energy_policy {
        EnergyPolicy::All => true,
        EnergyPolicy::Team => recipient.freq == sender.freq,
        EnergyPolicy::Spec => spectating_sender,
        EnergyPolicy::None => false,
    };

    Some(RecipientDecision {
        packet_type,
        include_energy,
        include_extra,
        send_kind,
    })
}

/// Ship-change rate limiting: an exponential-decay counter that halves
/// every 10 s, limiting ship changes to `limit` within roughly a 10 s
/// window (spec.md §4.7's `General:ShipChangeLimit`).
pub struct ShipChangeLimiter {
    counter: f64,
    last_update_ms: u64,
}

impl ShipChangeLimiter {
    pub fn new(now_ms: u64) -> Self {
        ShipChangeLimiter { counter: 0.0, last_update_ms: now_ms }
    }

    /// Returns `true` if a ship change is currently allowed, and records
    /// one if so.
    pub fn try_consume(&mut self, now_ms: u64, limit: f64) -> bool {
        let elapsed_s = now_ms.saturating_sub(self.last_update_ms) as f64 / 1000.0;
        self.counter *= 0.5f64.powf(elapsed_s / 10.0);
        self.last_update_ms = now_ms;

        if self.counter >= limit {
            false
        } else {
            self.counter += 1.0;
            true
        }
    }
}
