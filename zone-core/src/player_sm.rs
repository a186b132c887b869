//! Player state machine tick (spec.md §4.5, C6): scans every player once
//! per 100 ms tick under the write lock, records a status transition per
//! player, drops the lock, then runs handlers that may take any lock they
//! need.

use crate::arena::{ArenaStatus, ArenaTable};
use crate::player::{PlayerId, PlayerStatus, PlayerTable};
use flux::logging;
use std::time::Duration;

pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Purely mechanical transitions: setting the new status is the entire
/// handler body (spec.md §4.5).
fn automatic_next(status: PlayerStatus) -> Option<PlayerStatus> {
    use PlayerStatus::*;
    match status {
        NeedAuth => Some(WaitAuth),
        NeedGlobalSync => Some(WaitGlobalSync1),
        DoGlobalCallbacks => Some(SendLoginResponse),
        SendLoginResponse => Some(LoggedIn),
        DoFreqAndArenaSync => Some(WaitArenaSync1),
        ArenaRespAndCBS => Some(Playing),
        LeavingArena => Some(DoArenaSync2),
        DoArenaSync2 => Some(WaitArenaSync2),
        LeavingZone => Some(WaitGlobalSync2),
        _ => None,
    }
}

/// A `(player, old_status)` pair recorded while the write lock was held,
/// to be handled after it is dropped.
pub struct PendingTransition {
    pub player: PlayerId,
    pub old_status: PlayerStatus,
}

/// Scans every player under the write lock, advancing automatic
/// transitions in place and recording every transition (automatic or
/// not) for the handler pass. Statuses with no automatic next state are
/// left untouched here — their handler decides what comes next (often by
/// writing a different status itself, or by waiting for `sync_done`).
pub fn scan_players(players: &PlayerTable) -> Vec<PendingTransition> {
    let mut pending = Vec::new();
    let mut guard = players.write();

    for (id, player) in guard.iter_mut() {
        let old_status = player.status;
        if let Some(next) = automatic_next(old_status) {
            player.status = next;
        }
        if handled_status(old_status) {
            pending.push(PendingTransition { player: *id, old_status });
        }
    }

    pending
}

/// Every status whose *old* value has handler-visible behavior in
/// spec.md §4.5, whether or not it also has an automatic next state.
fn handled_status(status: PlayerStatus) -> bool {
    use PlayerStatus::*;
    matches!(
        status,
        Connected
            | NeedAuth
            | NeedGlobalSync
            | DoGlobalCallbacks
            | SendLoginResponse
            | LoggedIn
            | DoFreqAndArenaSync
            | ArenaRespAndCBS
            | LeavingArena
            | DoArenaSync2
            | LeavingZone
    )
}

/// Collaborators the handler pass needs but that are out of this crate's
/// scope (persistence, auth dispatch, packet transport); the mainloop
/// wires concrete implementations in.
pub trait PlayerSmCollaborators {
    fn authenticate(&self, player: PlayerId);
    fn request_global_sync_load(&self, player: PlayerId) -> bool;
    fn fire_connect(&self, player: PlayerId);
    fn send_login_response(&self, player: PlayerId);
    fn fire_pre_enter_arena(&self, player: PlayerId);
    fn request_arena_sync_load(&self, player: PlayerId) -> bool;
    fn send_arena_entry_response(&self, player: PlayerId);
    fn fire_enter_arena(&self, player: PlayerId);
    fn fire_leave_arena(&self, player: PlayerId);
    fn request_arena_sync_save(&self, player: PlayerId) -> bool;
    fn fire_disconnect(&self, player: PlayerId);
    fn request_global_sync_save(&self, player: PlayerId) -> bool;
}

/// Runs the handler for one recorded `(player, old_status)` pair. `sync`
/// requests that return `false` mean the collaborator will call
/// `sync_done` asynchronously; `true` means it completed inline and
/// `sync_done` should be invoked synchronously by the caller.
pub fn run_handler<C: PlayerSmCollaborators>(
    collaborators: &C,
    players: &PlayerTable,
    arenas: &ArenaTable,
    transition: &PendingTransition,
    log: &logging::Logger,
) {
    use PlayerStatus::*;

    let player = transition.player;
    match transition.old_status {
        NeedAuth => {
            collaborators.authenticate(player);
        }
        NeedGlobalSync => {
            if collaborators.request_global_sync_load(player) {
                sync_done(players, player, log);
            }
        }
        DoGlobalCallbacks => {
            {
                let mut guard = players.write();
                if let Some(p) = guard.get_mut(&player) {
                    p.reached_callbacks = true;
                }
            }
            collaborators.fire_connect(player);
        }
        SendLoginResponse => {
            collaborators.send_login_response(player);
        }
        LoggedIn | Connected => {
            let mut guard = players.write();
            if let Some(p) = guard.get_mut(&player) {
                p.arena = None;
                let ready = p
                    .new_arena
                    .and_then(|a| arenas.read().get(&a).map(|arena| arena.status == ArenaStatus::Running))
                    .unwrap_or(false);
                if ready {
                    p.status = DoFreqAndArenaSync;
                }
                if let Some(target) = p.when_logged_in.take() {
                    p.status = target;
                }
            }
            drop(guard);
        }
        DoFreqAndArenaSync => {
            {
                let mut guard = players.write();
                if let Some(p) = guard.get_mut(&player) {
                    p.ship = crate::player::Ship::Spectator;
                    p.freq = 0;
                }
            }
            collaborators.fire_pre_enter_arena(player);
            if collaborators.request_arena_sync_load(player) {
                sync_done(players, player, log);
            }
        }
        ArenaRespAndCBS => {
            {
                let mut guard = players.write();
                if let Some(p) = guard.get_mut(&player) {
                    p.arena = p.new_arena;
                }
            }
            collaborators.send_arena_entry_response(player);
            collaborators.fire_enter_arena(player);
        }
        LeavingArena => {
            collaborators.fire_leave_arena(player);
        }
        DoArenaSync2 => {
            if collaborators.request_arena_sync_save(player) {
                sync_done(players, player, log);
            }
        }
        LeavingZone => {
            let reached_callbacks = players.read().get(&player).map(|p| p.reached_callbacks).unwrap_or(false);
            if reached_callbacks {
                collaborators.fire_disconnect(player);
            }
            if collaborators.request_global_sync_save(player) {
                sync_done(players, player, log);
            }
        }
        _ => {}
    }
}

/// Called by the persistence collaborator when a load/save completes
/// (possibly off the mainloop thread — callers are responsible for
/// posting through `MainHandle::queue_main_work` if so). Advances the
/// relevant `Wait*` status per spec.md §4.5.
pub fn sync_done(players: &PlayerTable, player: PlayerId, log: &logging::Logger) {
    use PlayerStatus::*;

    let mut guard = players.write();
    let Some(p) = guard.get_mut(&player) else {
        logging::warn!(log, "sync_done for unknown player"; "context" => "sync_done", "player" => player);
        return;
    };

    let was_wait_global_sync2 = p.status == WaitGlobalSync2;
    let replaced_by = p.replaced_by;
    let leave_while_waiting = p.leave_arena_when_done_waiting;

    p.status = match p.status {
        WaitArenaSync1 if leave_while_waiting => DoArenaSync2,
        WaitArenaSync1 => ArenaRespAndCBS,
        WaitArenaSync2 => LoggedIn,
        WaitGlobalSync1 => DoGlobalCallbacks,
        WaitGlobalSync2 => TimeWait,
        other => other,
    };
    if leave_while_waiting {
        p.leave_arena_when_done_waiting = false;
    }
    drop(guard);

    if was_wait_global_sync2 {
        if let Some(next_player) = replaced_by {
            let mut guard = players.write();
            if let Some(next) = guard.get_mut(&next_player) {
                if next.status == WaitAuth {
                    next.status = NeedGlobalSync;
                }
            }
        }
    }
}

/// Applies an `IAuth` result to `player` (spec.md §3, §4.5, §9): records
/// the returned name/squad/authenticated flag, and either advances past
/// `WaitAuth` or kicks the player. A non-`Ok` code kicks immediately. An
/// `Ok` result that collides by name with another still-logged-in player
/// kicks the *old* session and leaves the new one parked in `WaitAuth` —
/// `sync_done`'s `WaitGlobalSync2` branch releases it to `NeedGlobalSync`
/// once the old session finishes leaving (S2, "Duplicate login").
pub fn complete_auth(players: &PlayerTable, player: PlayerId, result: crate::auth::AuthResult, log: &logging::Logger) {
    use crate::auth::AuthCode;

    {
        let mut guard = players.write();
        let Some(p) = guard.get_mut(&player) else {
            logging::warn!(log, "complete_auth for unknown player"; "context" => "complete_auth", "player" => player);
            return;
        };
        p.name = result.send_name.clone();
        p.squad = result.squad.clone();
        p.flags.authenticated = result.authenticated;
        p.auth_code = result.code;
        p.auth_custom_text = result.custom_text.clone();
    }

    if result.code != AuthCode::Ok {
        kick(players, player, log);
        return;
    }

    let duplicate = players.find_by_name(&result.name).filter(|&existing| existing != player);
    if let Some(existing) = duplicate {
        {
            let mut guard = players.write();
            if let Some(old) = guard.get_mut(&existing) {
                old.replaced_by = Some(player);
            }
        }
        kick(players, existing, log);
    } else {
        let mut guard = players.write();
        if let Some(p) = guard.get_mut(&player) {
            if p.status == PlayerStatus::WaitAuth {
                p.status = PlayerStatus::NeedGlobalSync;
            }
        }
    }
}

/// Routes `player` toward disconnect from whatever status it currently
/// has. A player mid-arena-subchain is left to finish its current step
/// and deferred to `LeavingZone` via `when_logged_in` once it returns to
/// `LoggedIn`; `Playing` starts the normal arena-exit subchain directly;
/// `WaitArenaSync1` is deferred via `leave_arena_when_done_waiting`
/// (spec.md §4.5); anything else moves straight to `LeavingZone`.
pub fn kick(players: &PlayerTable, player: PlayerId, log: &logging::Logger) {
    use PlayerStatus::*;

    let mut guard = players.write();
    let Some(p) = guard.get_mut(&player) else {
        logging::warn!(log, "kick for unknown player"; "context" => "kick", "player" => player);
        return;
    };

    match p.status {
        LeavingZone | WaitGlobalSync2 | TimeWait => {}
        WaitArenaSync1 => {
            p.leave_arena_when_done_waiting = true;
        }
        Playing => {
            p.status = LeavingArena;
            p.when_logged_in = Some(LeavingZone);
        }
        DoFreqAndArenaSync | ArenaRespAndCBS | LeavingArena | DoArenaSync2 | WaitArenaSync2 => {
            p.when_logged_in = Some(LeavingZone);
        }
        _ => {
            p.status = LeavingZone;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::ClientKind;

    #[test]
    fn automatic_transitions_apply_during_scan() {
        let players = PlayerTable::new();
        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::SendLoginResponse;

        let pending = scan_players(&players);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].old_status, PlayerStatus::SendLoginResponse);
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::LoggedIn);
    }

    #[test]
    fn sync_done_advances_wait_arena_sync1() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let players = PlayerTable::new();
        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::WaitArenaSync1;

        sync_done(&players, id, &log);
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::ArenaRespAndCBS);
    }

    #[test]
    fn sync_done_releases_queued_replacement_from_global_sync2() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let players = PlayerTable::new();
        let old = players.create(ClientKind::Standard);
        let new = players.create(ClientKind::Standard);
        {
            let mut guard = players.write();
            guard.get_mut(&old).unwrap().status = PlayerStatus::WaitGlobalSync2;
            guard.get_mut(&old).unwrap().replaced_by = Some(new);
            guard.get_mut(&new).unwrap().status = PlayerStatus::WaitAuth;
        }

        sync_done(&players, old, &log);
        assert_eq!(players.read().get(&old).unwrap().status, PlayerStatus::TimeWait);
        assert_eq!(players.read().get(&new).unwrap().status, PlayerStatus::NeedGlobalSync);
    }

    #[test]
    fn sync_done_routes_wait_arena_sync1_to_exit_when_flagged() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let players = PlayerTable::new();
        let id = players.create(ClientKind::Standard);
        {
            let mut guard = players.write();
            let p = guard.get_mut(&id).unwrap();
            p.status = PlayerStatus::WaitArenaSync1;
            p.leave_arena_when_done_waiting = true;
        }

        sync_done(&players, id, &log);
        let p = players.read();
        let p = p.get(&id).unwrap();
        assert_eq!(p.status, PlayerStatus::DoArenaSync2);
        assert!(!p.leave_arena_when_done_waiting);
    }

    #[test]
    fn complete_auth_kicks_existing_session_with_same_name() {
        use crate::auth::AuthResult;

        let log = logging::Logger::root(slog::Discard, logging::o!());
        let players = PlayerTable::new();
        let old = players.create(ClientKind::Standard);
        let new = players.create(ClientKind::Standard);
        {
            let mut guard = players.write();
            guard.get_mut(&old).unwrap().name = "Ace".to_string();
            guard.get_mut(&old).unwrap().status = PlayerStatus::Playing;
            guard.get_mut(&new).unwrap().status = PlayerStatus::WaitAuth;
        }

        complete_auth(&players, new, AuthResult::ok("ace"), &log);

        let guard = players.read();
        assert_eq!(guard.get(&old).unwrap().replaced_by, Some(new));
        assert_eq!(guard.get(&old).unwrap().status, PlayerStatus::LeavingArena);
        // The new session stays parked until the old one fully leaves.
        assert_eq!(guard.get(&new).unwrap().status, PlayerStatus::WaitAuth);
    }

    #[test]
    fn complete_auth_advances_straight_through_when_no_duplicate() {
        use crate::auth::AuthResult;

        let log = logging::Logger::root(slog::Discard, logging::o!());
        let players = PlayerTable::new();
        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::WaitAuth;

        complete_auth(&players, id, AuthResult::ok("ace"), &log);
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::NeedGlobalSync);
    }

    #[test]
    fn complete_auth_kicks_on_denial() {
        use crate::auth::{AuthCode, AuthResult};

        let log = logging::Logger::root(slog::Discard, logging::o!());
        let players = PlayerTable::new();
        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::WaitAuth;

        complete_auth(&players, id, AuthResult::denied(AuthCode::BadPassword, "ace"), &log);
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::LeavingZone);
    }

    #[test]
    fn leaving_zone_only_fires_disconnect_after_reaching_callbacks() {
        struct Recording {
            disconnects: std::sync::Mutex<Vec<PlayerId>>,
        }
        impl PlayerSmCollaborators for Recording {
            fn authenticate(&self, _player: PlayerId) {}
            fn request_global_sync_load(&self, _player: PlayerId) -> bool {
                true
            }
            fn fire_connect(&self, _player: PlayerId) {}
            fn send_login_response(&self, _player: PlayerId) {}
            fn fire_pre_enter_arena(&self, _player: PlayerId) {}
            fn request_arena_sync_load(&self, _player: PlayerId) -> bool {
                true
            }
            fn send_arena_entry_response(&self, _player: PlayerId) {}
            fn fire_enter_arena(&self, _player: PlayerId) {}
            fn fire_leave_arena(&self, _player: PlayerId) {}
            fn request_arena_sync_save(&self, _player: PlayerId) -> bool {
                true
            }
            fn fire_disconnect(&self, player: PlayerId) {
                self.disconnects.lock().unwrap().push(player);
            }
            fn request_global_sync_save(&self, _player: PlayerId) -> bool {
                true
            }
        }

        let log = logging::Logger::root(slog::Discard, logging::o!());
        let players = PlayerTable::new();
        let arenas = crate::arena::ArenaTable::new(&log);
        let collab = Recording { disconnects: std::sync::Mutex::new(Vec::new()) };

        let never_reached = players.create(ClientKind::Standard);
        players.write().get_mut(&never_reached).unwrap().status = PlayerStatus::LeavingZone;
        run_handler(
            &collab,
            &players,
            &arenas,
            &PendingTransition { player: never_reached, old_status: PlayerStatus::LeavingZone },
            &log,
        );
        assert!(collab.disconnects.lock().unwrap().is_empty());

        let reached = players.create(ClientKind::Standard);
        {
            let mut guard = players.write();
            let p = guard.get_mut(&reached).unwrap();
            p.status = PlayerStatus::LeavingZone;
            p.reached_callbacks = true;
        }
        run_handler(
            &collab,
            &players,
            &arenas,
            &PendingTransition { player: reached, old_status: PlayerStatus::LeavingZone },
            &log,
        );
        assert_eq!(*collab.disconnects.lock().unwrap(), vec![reached]);
    }
}
