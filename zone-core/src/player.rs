//! Process-wide player table (spec.md §3, §4.5, C4): identity assignment,
//! the status state machine C6 drives, and typed per-player extra-data
//! slots modules can reserve.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type PlayerId = u32;

/// Ship selection; `Spectator` is the ninth value spec.md §3 counts among
/// "8 values including spectator" (indices 0..=7 are flyable, 8 is spec).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Ship {
    Warbird,
    Javelin,
    Spider,
    Leviathan,
    Terrier,
    Weasel,
    Lancaster,
    Shark,
    Spectator,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ClientKind {
    Standard,
    Chat,
    Fake,
}

/// The full login → arena → leave → disconnect pipeline (spec.md §3, §4.5).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum PlayerStatus {
    Connected,
    NeedAuth,
    WaitAuth,
    NeedGlobalSync,
    WaitGlobalSync1,
    DoGlobalCallbacks,
    SendLoginResponse,
    LoggedIn,
    DoFreqAndArenaSync,
    WaitArenaSync1,
    ArenaRespAndCBS,
    Playing,
    LeavingArena,
    DoArenaSync2,
    WaitArenaSync2,
    LeavingZone,
    WaitGlobalSync2,
    TimeWait,
}

#[derive(Clone, Copy, Default, Debug)]
pub struct PositionSnapshot {
    pub x: i16,
    pub y: i16,
    pub x_vel: i16,
    pub y_vel: i16,
    pub rotation: u8,
    pub bounty: u16,
    pub status_flags: u16,
    pub time: u32,
}

#[derive(Default)]
pub struct PlayerFlags {
    pub authenticated: bool,
    pub sent_weapon_packet: bool,
    pub see_own_position: bool,
    pub obscenity_filter: bool,
    pub voice_accept: bool,
}

pub struct Player {
    pub id: PlayerId,
    pub client_kind: ClientKind,
    pub name: String,
    pub squad: String,
    pub status: PlayerStatus,
    pub arena: Option<super::arena::ArenaId>,
    pub new_arena: Option<super::arena::ArenaId>,
    pub ship: Ship,
    pub freq: u16,
    pub position: PositionSnapshot,
    pub flag_count: u16,
    pub attached_to: Option<PlayerId>,
    pub flags: PlayerFlags,
    pub when_logged_in: Option<PlayerStatus>,
    pub replaced_by: Option<PlayerId>,
    pub spawn_location: Option<(u16, u16)>,
    /// Whether the standard client identified itself as Continuum rather
    /// than VIE during login (spec.md §4.5: Continuum gets a separate
    /// version packet; VIE clients never see a `CustomText` login code).
    pub continuum: bool,
    /// The `IAuth` result's code/custom-text, recorded by `complete_auth`
    /// and consumed by the `SendLoginResponse` handler (spec.md §4.5).
    pub auth_code: super::auth::AuthCode,
    pub auth_custom_text: Option<String>,
    /// Set by `kick` for a player waiting in `WaitArenaSync1`: `sync_done`
    /// routes them to `DoArenaSync2` instead of `ArenaRespAndCBS` once the
    /// load completes (spec.md §4.5's persistence-completing-after-leave
    /// race).
    pub leave_arena_when_done_waiting: bool,
    /// Set once the player's `DoGlobalCallbacks` handler has actually run;
    /// `LeavingZone` only fires `Disconnect` for a player who reached it
    /// (spec.md §4.5 — a player kicked before `NeedGlobalSync` completes
    /// never got a `Connect` callback either).
    pub reached_callbacks: bool,
    extra: HashMap<u32, Arc<dyn Any + Send + Sync>>,
}

impl Player {
    fn new(id: PlayerId, client_kind: ClientKind) -> Self {
        Player {
            id,
            client_kind,
            name: String::new(),
            squad: String::new(),
            status: PlayerStatus::Connected,
            arena: None,
            new_arena: None,
            ship: Ship::Spectator,
            freq: 0,
            position: PositionSnapshot::default(),
            flag_count: 0,
            attached_to: None,
            flags: PlayerFlags::default(),
            when_logged_in: None,
            replaced_by: None,
            spawn_location: None,
            continuum: false,
            auth_code: super::auth::AuthCode::Ok,
            auth_custom_text: None,
            leave_arena_when_done_waiting: false,
            reached_callbacks: false,
            extra: HashMap::new(),
        }
    }

    /// Fetches (creating if absent) the per-player slot for extra-data key
    /// `slot`, constructing it with `default` on first access.
    pub fn extra_data<T, F>(&mut self, slot: u32, default: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let entry = self.extra.entry(slot).or_insert_with(|| Arc::new(default()) as Arc<dyn Any + Send + Sync>);
        entry.clone().downcast::<T>().expect("extra-data slot type mismatch")
    }

    pub fn clear_extra_data(&mut self, slot: u32) {
        self.extra.remove(&slot);
    }
}

/// Process-wide table of players, guarded by a single read/write lock per
/// spec.md's invariant that the table is mutated only under its own write
/// lock and iterated under at least a read lock.
#[derive(Default)]
pub struct PlayerTable {
    players: RwLock<HashMap<PlayerId, Player>>,
    next_id: std::sync::atomic::AtomicU32,
}

impl PlayerTable {
    pub fn new() -> Self {
        PlayerTable {
            players: RwLock::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicU32::new(1),
        }
    }

    /// Allocates a new player id and inserts a freshly `Connected` player.
    pub fn create(&self, client_kind: ClientKind) -> PlayerId {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let player = Player::new(id, client_kind);
        self.players.write().unwrap().insert(id, player);
        id
    }

    /// Removes a player once it has reached the end of its lifecycle
    /// (`TimeWait`, per spec.md §3).
    pub fn free(&self, id: PlayerId) {
        self.players.write().unwrap().remove(&id);
    }

    pub fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PlayerId, Player>> {
        self.players.read().unwrap()
    }

    pub fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<PlayerId, Player>> {
        self.players.write().unwrap()
    }

    /// Finds the (at most one) logged-in player whose sanitized name
    /// matches, for duplicate-login detection (spec.md §4.5).
    pub fn find_by_name(&self, name: &str) -> Option<PlayerId> {
        self.players
            .read()
            .unwrap()
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name) && p.status != PlayerStatus::TimeWait)
            .map(|p| p.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_unique_ids() {
        let table = PlayerTable::new();
        let a = table.create(ClientKind::Standard);
        let b = table.create(ClientKind::Standard);
        assert_ne!(a, b);
        assert_eq!(table.read().len(), 2);
    }

    #[test]
    fn extra_data_slot_persists_across_calls() {
        let table = PlayerTable::new();
        let id = table.create(ClientKind::Standard);
        let mut guard = table.write();
        let player = guard.get_mut(&id).unwrap();

        let first = player.extra_data(1, || 42u32);
        assert_eq!(*first, 42);

        let second = player.extra_data(1, || 99u32);
        assert_eq!(*second, 42);
    }

    #[test]
    fn free_removes_player() {
        let table = PlayerTable::new();
        let id = table.create(ClientKind::Standard);
        table.free(id);
        assert!(table.read().get(&id).is_none());
    }

    #[test]
    fn find_by_name_ignores_time_wait_players() {
        let table = PlayerTable::new();
        let id = table.create(ClientKind::Standard);
        {
            let mut guard = table.write();
            let player = guard.get_mut(&id).unwrap();
            player.name = "Ace".to_string();
        }
        assert_eq!(table.find_by_name("ace"), Some(id));

        table.write().get_mut(&id).unwrap().status = PlayerStatus::TimeWait;
        assert_eq!(table.find_by_name("ace"), None);
    }
}
