//! Per-arena carry-flag game: spawn/touch/drop/kill/reset protocol with a
//! pluggable placement `behavior` (spec.md §4.8, C8). Arena-scoped state
//! only; the module manager (C2) attaches one `ArenaFlagGame` per arena
//! that opts in.

use std::time::Duration;
use zone_core::player::PlayerId;

pub type FlagId = u16;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum GameState {
    Stopped,
    Starting,
    Running,
}

/// A flag's current ownership. `None` is the "neuted, nobody owns it" rest
/// state distinct from `OnMap`, which is claimed by a frequency even while
/// sitting on a tile.
#[derive(Clone, Copy, Debug)]
pub enum FlagState {
    None { freq: Option<u16> },
    OnMap { x: i16, y: i16, freq: u16 },
    Carried { carrier: PlayerId, freq: u16 },
}

#[derive(Clone, Copy, Debug)]
pub struct Flag {
    pub id: FlagId,
    pub state: FlagState,
}

/// `Flag:*` settings; a deployment reads these from its arena config
/// section once per `reset_game`/arena attach (spec.md §4.8).
#[derive(Clone, Debug)]
pub struct FlagSettings {
    pub auto_start: bool,
    pub reset_delay_centis: u32,
    pub spawn_x: u16,
    pub spawn_y: u16,
    pub spawn_radius: u16,
    pub drop_radius: u16,
    pub friendly_transfer: bool,
    pub carry_flags: CarryFlagsMode,
    pub drop_owned: bool,
    pub drop_center: bool,
    pub neut_owned: bool,
    pub neut_center: bool,
    pub tk_owned: bool,
    pub tk_center: bool,
    pub safe_owned: bool,
    pub safe_center: bool,
    pub win_delay_centis: u32,
    pub min_flags: u16,
    pub max_flags: u16,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum CarryFlagsMode {
    None,
    All,
    Team,
}

impl Default for FlagSettings {
    fn default() -> Self {
        FlagSettings {
            auto_start: true,
            reset_delay_centis: 0,
            spawn_x: 512,
            spawn_y: 512,
            spawn_radius: 0,
            drop_radius: 2,
            friendly_transfer: true,
            carry_flags: CarryFlagsMode::All,
            drop_owned: false,
            drop_center: false,
            neut_owned: false,
            neut_center: false,
            tk_owned: false,
            tk_center: false,
            safe_owned: false,
            safe_center: false,
            win_delay_centis: 0,
            min_flags: 0,
            max_flags: 0,
        }
    }
}

/// Parses `FlagCount` as either a bare integer or a `min-max` range,
/// clamping both ends to `[0, 256]` (spec.md §4.8).
pub fn parse_flag_count(raw: &str) -> (u16, u16) {
    let clamp = |v: i64| v.clamp(0, 256) as u16;
    if let Some((min_str, max_str)) = raw.split_once('-') {
        let min = min_str.trim().parse::<i64>().unwrap_or(0);
        let max = max_str.trim().parse::<i64>().unwrap_or(min);
        let (min, max) = (clamp(min), clamp(max));
        if min <= max {
            (min, max)
        } else {
            (max, min)
        }
    } else {
        let n = clamp(raw.trim().parse::<i64>().unwrap_or(0));
        (n, n)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum DropReason {
    Normal,
    Killed,
}

/// Placement policy, pluggable per arena (spec.md §4.8's "pluggable
/// behavior"). The built-in implementation scatters flags randomly around
/// `SpawnX`/`SpawnY` within `SpawnRadius`; deployments may substitute their
/// own (e.g. a fixed-position CTF layout).
pub trait PlacementBehavior: Send + Sync {
    /// Called once when the game transitions `Starting -> Running`.
    fn start_game(&self, game: &mut ArenaFlagGame);

    /// Called on the 5 s timer while `Running`, to top the flag count up
    /// toward `[MinFlags, MaxFlags]`.
    fn spawn_flags(&self, game: &mut ArenaFlagGame);

    /// Called whenever a flag needs a fresh on-map location after being
    /// dropped/neuted/transferred, e.g. `DropCenter`/`NeutCenter` policy.
    fn place_dropped_flag(&self, game: &ArenaFlagGame, flag: FlagId) -> (i16, i16);
}

/// Collaborators outside this crate's scope: broadcasting wire packets,
/// firing broker callbacks, and reading the transient player state needed
/// to validate `TouchFlag`.
pub trait FlagGameCollaborators {
    fn broadcast_flag_location(&self, flag: FlagId, x: i16, y: i16, freq: u16);
    fn broadcast_flag_pickup(&self, flag: FlagId, carrier: PlayerId);
    fn broadcast_flag_drop(&self, player: PlayerId);
    fn broadcast_flag_reset(&self, winner_freq: u16, points: u32);
    fn fire_flag_on_map(&self, flag: FlagId);
    fn fire_flag_gain(&self, flag: FlagId, carrier: PlayerId);
    fn fire_flag_lost(&self, flag: FlagId, player: PlayerId, reason: DropReason);
    fn fire_flag_game_reset(&self, winner_freq: u16, points: u32);
    fn is_in_safe_zone(&self, player: PlayerId) -> bool;
    fn is_lag_degraded(&self, player: PlayerId) -> bool;
    fn is_mid_ship_or_freq_change(&self, player: PlayerId) -> bool;

    /// Adjusts `player`'s carried-flag count by `delta` (`Player` lives in
    /// `zone-core`, a crate this one does not depend on).
    fn adjust_flag_count(&self, player: PlayerId, delta: i32);
}

pub struct ArenaFlagGame {
    pub state: GameState,
    pub flags: Vec<Flag>,
    pub settings: FlagSettings,
    pub start_deadline: Option<Duration>,
}

impl ArenaFlagGame {
    pub fn new(settings: FlagSettings) -> Self {
        ArenaFlagGame { state: GameState::Stopped, flags: Vec::new(), settings, start_deadline: None }
    }

    fn flag_mut(&mut self, id: FlagId) -> Option<&mut Flag> {
        self.flags.iter_mut().find(|f| f.id == id)
    }

    fn flag(&self, id: FlagId) -> Option<&Flag> {
        self.flags.iter().find(|f| f.id == id)
    }

    /// Valid from `None` (update stored loc/freq) and `OnMap` (send the
    /// fake-remove `FlagLocation(-1,-1,-1)` sentinel then neut). Invalid
    /// from `Carried` — returns `false` without mutating.
    pub fn try_set_flag_neuted<C: FlagGameCollaborators>(&mut self, flag_id: FlagId, freq: Option<u16>, collab: &C) -> bool {
        let Some(flag) = self.flag_mut(flag_id) else { return false };
        match flag.state {
            FlagState::None { .. } => {
                flag.state = FlagState::None { freq };
                true
            }
            FlagState::OnMap { .. } => {
                collab.broadcast_flag_location(flag_id, -1, -1, 0xffff);
                flag.state = FlagState::None { freq };
                true
            }
            FlagState::Carried { .. } => false,
        }
    }

    /// Valid from `None`/`OnMap`. Broadcasts `FlagLocation` and fires
    /// `FlagOnMap`.
    pub fn try_set_flag_on_map<C: FlagGameCollaborators>(&mut self, flag_id: FlagId, x: i16, y: i16, freq: u16, collab: &C) -> bool {
        let Some(flag) = self.flag_mut(flag_id) else { return false };
        match flag.state {
            FlagState::None { .. } | FlagState::OnMap { .. } => {
                flag.state = FlagState::OnMap { x, y, freq };
                collab.broadcast_flag_location(flag_id, x, y, freq);
                collab.fire_flag_on_map(flag_id);
                true
            }
            FlagState::Carried { .. } => false,
        }
    }

    /// Valid from `None`/`OnMap`. Broadcasts `FlagPickup` unless `reason`
    /// is a kill (the kill packet itself implies pickup). Fires `FlagGain`.
    pub fn try_set_flag_carried<C: FlagGameCollaborators>(
        &mut self,
        flag_id: FlagId,
        carrier: PlayerId,
        carrier_freq: u16,
        is_kill: bool,
        collab: &C,
    ) -> bool {
        let Some(flag) = self.flag_mut(flag_id) else { return false };
        match flag.state {
            FlagState::None { .. } | FlagState::OnMap { .. } => {
                flag.state = FlagState::Carried { carrier, freq: carrier_freq };
                if !is_kill {
                    collab.broadcast_flag_pickup(flag_id, carrier);
                }
                collab.adjust_flag_count(carrier, 1);
                collab.fire_flag_gain(flag_id, carrier);
                true
            }
            FlagState::Carried { .. } => false,
        }
    }

    /// All flags `Carried(killed)` transition to `None`, firing
    /// `FlagLost(Killed)` per flag and asking `behavior` to place them.
    pub fn transfer_flags_for_player_kill<C: FlagGameCollaborators, B: PlacementBehavior>(
        &mut self,
        killed: PlayerId,
        collab: &C,
        behavior: &B,
    ) {
        let ids: Vec<FlagId> = self
            .flags
            .iter()
            .filter_map(|f| match f.state {
                FlagState::Carried { carrier, .. } if carrier == killed => Some(f.id),
                _ => None,
            })
            .collect();

        for id in ids {
            if let Some(flag) = self.flag_mut(id) {
                flag.state = FlagState::None { freq: None };
            }
            collab.adjust_flag_count(killed, -1);
            collab.fire_flag_lost(id, killed, DropReason::Killed);
            let (x, y) = behavior.place_dropped_flag(self, id);
            if let Some(flag) = self.flag_mut(id) {
                let freq = 0;
                flag.state = FlagState::OnMap { x, y, freq };
            }
            collab.broadcast_flag_location(id, x, y, 0);
        }
    }

    /// Validates and applies an inbound `TouchFlag(flag_id)` for `player`
    /// (spec.md §4.8): only while `Running`, for a non-spectating,
    /// non-mid-change, non-lag-degraded player, and only against a flag
    /// currently `OnMap`. Delegates the actual pickup to `try_set_flag_carried`.
    pub fn handle_touch_flag<C: FlagGameCollaborators>(
        &mut self,
        flag_id: FlagId,
        player: PlayerId,
        player_freq: u16,
        is_spectating: bool,
        collab: &C,
        log: &flux::logging::Logger,
    ) -> bool {
        if self.state != GameState::Running {
            return false;
        }
        if is_spectating || collab.is_mid_ship_or_freq_change(player) || collab.is_lag_degraded(player) {
            return false;
        }
        match self.flag(flag_id) {
            Some(Flag { state: FlagState::OnMap { .. }, .. }) => {}
            Some(_) => return false,
            None => {
                flux::logging::debug!(log, "TouchFlag for missing flag"; "context" => "handle_touch_flag", "flag" => flag_id);
                return false;
            }
        }
        self.try_set_flag_carried(flag_id, player, player_freq, false, collab)
    }

    /// Inbound `DropFlags`: broadcasts `FlagDrop`, then for every flag
    /// `player` carries, transitions to `Neut` (if in a safe zone) or
    /// `Dropped`, firing `FlagLost` per flag and asking `behavior` to place
    /// the dropped ones.
    pub fn handle_drop_flags<C: FlagGameCollaborators, B: PlacementBehavior>(
        &mut self,
        player: PlayerId,
        collab: &C,
        behavior: &B,
    ) {
        let carried: Vec<FlagId> = self
            .flags
            .iter()
            .filter_map(|f| match f.state {
                FlagState::Carried { carrier, .. } if carrier == player => Some(f.id),
                _ => None,
            })
            .collect();

        if carried.is_empty() {
            return;
        }

        collab.broadcast_flag_drop(player);
        let in_safe_zone = collab.is_in_safe_zone(player);

        for id in carried {
            if in_safe_zone {
                self.try_set_flag_neuted(id, None, collab);
            } else {
                let (x, y) = behavior.place_dropped_flag(self, id);
                if let Some(flag) = self.flag_mut(id) {
                    flag.state = FlagState::OnMap { x, y, freq: 0 };
                }
                collab.broadcast_flag_location(id, x, y, 0);
            }
            collab.adjust_flag_count(player, -1);
            collab.fire_flag_lost(id, player, DropReason::Normal);
        }
    }

    /// If running, broadcasts `FlagReset(winner,points)`, decrements every
    /// carrier's flag count, clears the flag list, and fires
    /// `FlagGameReset`. Optionally auto-starts again.
    pub fn reset_game<C: FlagGameCollaborators>(&mut self, winner_freq: u16, points: u32, allow_auto_start: bool, collab: &C) {
        if self.state == GameState::Running {
            collab.broadcast_flag_reset(winner_freq, points);
        }
        for flag in &self.flags {
            if let FlagState::Carried { carrier, .. } = flag.state {
                collab.adjust_flag_count(carrier, -1);
            }
        }
        self.flags.clear();
        collab.fire_flag_game_reset(winner_freq, points);

        self.state = if allow_auto_start && self.settings.auto_start {
            GameState::Starting
        } else {
            GameState::Stopped
        };
    }

    /// 5 s mainloop step: `Starting` with its deadline reached transitions
    /// to `Running` via `behavior.start_game`; `Running` tops up the flag
    /// count via `behavior.spawn_flags`.
    pub fn step<B: PlacementBehavior>(&mut self, now: Duration, behavior: &B) {
        match self.state {
            GameState::Starting => {
                if self.start_deadline.map(|d| now >= d).unwrap_or(true) {
                    self.state = GameState::Running;
                    behavior.start_game(self);
                }
            }
            GameState::Running => {
                if (self.flags.len() as u16) < self.settings.max_flags {
                    behavior.spawn_flags(self);
                }
            }
            GameState::Stopped => {}
        }
    }

    /// Every flag currently `OnMap`, for the arena-entry `FlagLocation`
    /// burst (spec.md §4.8).
    pub fn on_map_flags(&self) -> impl Iterator<Item = (FlagId, i16, i16, u16)> + '_ {
        self.flags.iter().filter_map(|f| match f.state {
            FlagState::OnMap { x, y, freq } => Some((f.id, x, y, freq)),
            _ => None,
        })
    }
}
