//! Wires the player state machine's 100 ms tick (spec.md §4.5, C6) into
//! the mainloop. `LiveCollaborators` dispatches real login through
//! whatever `IAuth` is on top of the broker's stack and fires the real
//! broker callbacks; persistence stays stubbed (inline completion) since
//! a storage backend is out of scope (spec.md §1).

use crate::config::ZoneServerConfig;
use crate::modules::InterfaceKind;
use crate::transport::Transport;
use broker::Broker;
use flux::logging;
use std::sync::{Arc, RwLock};
use zone_core::arena::{ArenaId, ArenaTable};
use zone_core::auth::{AuthRequest, IAuth};
use zone_core::capability::CapabilityManager;
use zone_core::entry::{self, EntryResponseSink};
use zone_core::login::{self, LoginResponseSink};
use zone_core::player::{PlayerId, PlayerTable};
use zone_core::player_sm::{self, PlayerSmCollaborators};

type PlayerCallback = dyn Fn(PlayerId) + Send + Sync;

/// Dispatches `NeedAuth` through the broker's registered `IAuth` and fires
/// every lifecycle callback through the broker, arena-scoped where the
/// player has an arena to scope it to. Packet assembly for login response
/// (§4.5) and arena entry (§4.6) delegates to `zone_core::login`/
/// `zone_core::entry`; this struct only supplies the live `Transport` and
/// checksum/capability values those modules ask for.
pub struct LiveCollaborators {
    broker: Arc<RwLock<Broker<InterfaceKind, ArenaId>>>,
    players: Arc<PlayerTable>,
    transport: Arc<dyn Transport>,
    capabilities: Arc<dyn CapabilityManager>,
    checksums: Arc<ZoneServerConfig>,
    log: logging::Logger,
}

impl LiveCollaborators {
    pub fn new(
        broker: Arc<RwLock<Broker<InterfaceKind, ArenaId>>>,
        players: Arc<PlayerTable>,
        transport: Arc<dyn Transport>,
        capabilities: Arc<dyn CapabilityManager>,
        checksums: Arc<ZoneServerConfig>,
        log: logging::Logger,
    ) -> Self {
        LiveCollaborators { broker, players, transport, capabilities, checksums, log }
    }

    fn fire_global(&self, player: PlayerId, kind: InterfaceKind) {
        let broker = self.broker.read().unwrap();
        broker.fire::<PlayerCallback>(None, &kind, |h| h(player));
    }

    /// `new_arena` is the player's destination while still mid-entry
    /// (`PreEnterArena`); `arena` is the one it currently occupies, used
    /// once entry has completed or while leaving.
    fn fire_arena_scoped(&self, player: PlayerId, kind: InterfaceKind, use_new_arena: bool) {
        let arena = {
            let players = self.players.read();
            let Some(p) = players.get(&player) else { return };
            if use_new_arena { p.new_arena } else { p.arena }
        };
        let broker = self.broker.read().unwrap();
        broker.fire::<PlayerCallback>(arena.as_ref(), &kind, |h| h(player));
    }

    fn sink(&self) -> PacketSink<'_> {
        PacketSink { transport: self.transport.as_ref(), checksums: &self.checksums }
    }
}

/// Adapts the live `Transport` to the `LoginResponseSink`/`EntryResponseSink`
/// contracts `zone_core::login`/`zone_core::entry` assemble packets
/// against. Chat-text lines travel as UTF-8 bytes (newline-terminated)
/// over the same reliable channel standard binary packets use — the chat
/// protocol is line-oriented (spec.md §6), not a distinct transport.
struct PacketSink<'a> {
    transport: &'a dyn Transport,
    checksums: &'a ZoneServerConfig,
}

impl<'a> LoginResponseSink for PacketSink<'a> {
    fn send_reliable(&self, player: PlayerId, bytes: &[u8]) {
        self.transport.send_reliable(player, bytes);
    }
    fn send_chat_line(&self, player: PlayerId, line: &str) {
        self.transport.send_reliable(player, format!("{line}\n").as_bytes());
    }
    fn server_version(&self) -> u32 {
        self.checksums.general.server_version
    }
    fn exe_checksum(&self) -> u32 {
        self.checksums.general.exe_checksum
    }
    fn code_checksum(&self) -> u32 {
        self.checksums.general.code_checksum
    }
    fn news_checksum(&self) -> u32 {
        self.checksums.general.news_checksum
    }
    fn cont_version(&self) -> u16 {
        self.checksums.general.cont_version
    }
}

impl<'a> EntryResponseSink for PacketSink<'a> {
    fn send_reliable(&self, player: PlayerId, bytes: &[u8]) {
        self.transport.send_reliable(player, bytes);
    }
    fn send_chat_line(&self, player: PlayerId, line: &str) {
        self.transport.send_reliable(player, format!("{line}\n").as_bytes());
    }
    fn map_filename_packet(&self, _player: PlayerId) -> Option<Vec<u8>> {
        // Map download is an external collaborator (spec.md §1's explicit
        // non-goal); a deployment wiring one in replaces this sink.
        None
    }
    fn request_client_settings(&self, _player: PlayerId) {}
}

impl PlayerSmCollaborators for LiveCollaborators {
    fn authenticate(&self, player: PlayerId) {
        let auth = {
            let broker = self.broker.read().unwrap();
            broker.get_interface::<dyn IAuth>(None, &InterfaceKind::Auth)
        };
        let Some(auth) = auth else {
            logging::error!(self.log, "no IAuth implementation registered"; "context" => "authenticate", "player" => player);
            player_sm::kick(&self.players, player, &self.log);
            return;
        };

        let players = self.players.clone();
        let log = self.log.clone();
        // Transport is an explicit non-goal (spec.md §1), so there is no
        // raw login packet to forward; the raw buffer stays empty.
        let Some(request) = AuthRequest::new(player, Vec::new(), move |result| {
            player_sm::complete_auth(&players, player, result, &log);
        }) else {
            return;
        };
        auth.authenticate(Arc::new(request));
    }

    fn request_global_sync_load(&self, _player: PlayerId) -> bool {
        true
    }

    fn fire_connect(&self, player: PlayerId) {
        self.fire_global(player, InterfaceKind::PlayerConnect);
    }

    fn send_login_response(&self, player: PlayerId) {
        login::send_login_response(&self.players, player, self.capabilities.as_ref(), &self.sink());
    }

    fn fire_pre_enter_arena(&self, player: PlayerId) {
        self.fire_arena_scoped(player, InterfaceKind::PreEnterArena, true);
    }

    fn request_arena_sync_load(&self, _player: PlayerId) -> bool {
        true
    }

    fn send_arena_entry_response(&self, player: PlayerId) {
        let Some(arena) = self.players.read().get(&player).and_then(|p| p.arena) else { return };
        entry::send_arena_entry_response(&self.players, arena, player, &self.sink());
    }

    fn fire_enter_arena(&self, player: PlayerId) {
        self.fire_arena_scoped(player, InterfaceKind::EnterArena, false);
    }

    fn fire_leave_arena(&self, player: PlayerId) {
        self.fire_arena_scoped(player, InterfaceKind::LeaveArena, false);
    }

    fn request_arena_sync_save(&self, _player: PlayerId) -> bool {
        true
    }

    fn fire_disconnect(&self, player: PlayerId) {
        self.fire_global(player, InterfaceKind::PlayerDisconnect);
    }

    fn request_global_sync_save(&self, _player: PlayerId) -> bool {
        true
    }
}

/// One 100 ms tick: scan every player's status, then run the handler for
/// each recorded transition (spec.md §4.5).
#[allow(clippy::too_many_arguments)]
pub fn tick(
    players: &Arc<PlayerTable>,
    arenas: &ArenaTable,
    broker: &Arc<RwLock<Broker<InterfaceKind, ArenaId>>>,
    transport: &Arc<dyn Transport>,
    capabilities: &Arc<dyn CapabilityManager>,
    checksums: &Arc<ZoneServerConfig>,
    log: &logging::Logger,
) {
    let collaborators =
        LiveCollaborators::new(broker.clone(), players.clone(), transport.clone(), capabilities.clone(), checksums.clone(), log.clone());
    for transition in player_sm::scan_players(players) {
        player_sm::run_handler(&collaborators, players, arenas, &transition, log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NullTransport;
    use std::collections::HashMap;
    use zone_core::auth::{AuthCode, AuthResult, UnauthenticatedAuth};
    use zone_core::capability::GroupCapabilityManager;
    use zone_core::player::{ClientKind, PlayerStatus};

    fn logger() -> logging::Logger {
        logging::Logger::root(slog::Discard, logging::o!())
    }

    fn transport() -> Arc<dyn Transport> {
        Arc::new(NullTransport)
    }

    fn capabilities() -> Arc<dyn CapabilityManager> {
        Arc::new(GroupCapabilityManager::new(HashMap::new(), "default"))
    }

    fn checksums() -> Arc<ZoneServerConfig> {
        Arc::new(ZoneServerConfig::default())
    }

    #[test]
    fn tick_advances_a_player_through_its_automatic_transition() {
        let log = logger();
        let players = Arc::new(PlayerTable::new());
        let arenas = ArenaTable::new(&log);
        let broker = Arc::new(RwLock::new(Broker::new(&log)));
        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::SendLoginResponse;

        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);

        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::LoggedIn);
    }

    #[test]
    fn tick_dispatches_auth_through_registered_iauth() {
        let log = logger();
        let players = Arc::new(PlayerTable::new());
        let arenas = ArenaTable::new(&log);
        let broker = Arc::new(RwLock::new(Broker::new(&log)));
        broker.write().unwrap().register_interface(None, InterfaceKind::Auth, Arc::new(UnauthenticatedAuth) as Arc<dyn IAuth>);

        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::NeedAuth;

        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);

        // `UnauthenticatedAuth` always reports `Ok`, which advances the
        // (now-`WaitAuth`) player straight through to `NeedGlobalSync`.
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::NeedGlobalSync);
    }

    #[test]
    fn tick_kicks_player_when_no_auth_registered() {
        let log = logger();
        let players = Arc::new(PlayerTable::new());
        let arenas = ArenaTable::new(&log);
        let broker = Arc::new(RwLock::new(Broker::new(&log)));

        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::NeedAuth;

        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);

        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::LeavingZone);
    }

    #[test]
    fn connect_and_disconnect_callbacks_fire_through_the_broker() {
        let log = logger();
        let players = Arc::new(PlayerTable::new());
        let arenas = ArenaTable::new(&log);
        let broker = Arc::new(RwLock::new(Broker::new(&log)));

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            broker.write().unwrap().register_callback(
                None,
                InterfaceKind::PlayerConnect,
                Arc::new(move |player: PlayerId| seen.lock().unwrap().push(("connect", player))) as Arc<PlayerCallback>,
            );
        }
        {
            let seen = seen.clone();
            broker.write().unwrap().register_callback(
                None,
                InterfaceKind::PlayerDisconnect,
                Arc::new(move |player: PlayerId| seen.lock().unwrap().push(("disconnect", player))) as Arc<PlayerCallback>,
            );
        }

        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::DoGlobalCallbacks;
        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);
        assert_eq!(*seen.lock().unwrap(), vec![("connect", id)]);

        players.write().get_mut(&id).unwrap().status = PlayerStatus::LeavingZone;
        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);
        assert_eq!(*seen.lock().unwrap(), vec![("connect", id), ("disconnect", id)]);
        // LeavingZone's stub persistence completes inline, landing in TimeWait.
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::TimeWait);
    }

    #[test]
    fn denied_auth_kicks_without_advancing() {
        let log = logger();
        let players = Arc::new(PlayerTable::new());
        let arenas = ArenaTable::new(&log);
        let broker = Arc::new(RwLock::new(Broker::new(&log)));

        struct DenyAuth;
        impl IAuth for DenyAuth {
            fn authenticate(&self, request: Arc<AuthRequest>) {
                request.done(AuthResult::denied(AuthCode::BadPassword, "ace"));
            }
        }
        broker.write().unwrap().register_interface(None, InterfaceKind::Auth, Arc::new(DenyAuth) as Arc<dyn IAuth>);

        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::NeedAuth;

        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::LeavingZone);
    }

    #[test]
    fn send_login_response_handler_runs_without_a_registered_sync_collaborator() {
        let log = logger();
        let players = Arc::new(PlayerTable::new());
        let arenas = ArenaTable::new(&log);
        let broker = Arc::new(RwLock::new(Broker::new(&log)));

        let id = players.create(ClientKind::Standard);
        players.write().get_mut(&id).unwrap().status = PlayerStatus::DoGlobalCallbacks;
        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);
        // DoGlobalCallbacks -> SendLoginResponse this tick (automatic);
        // SendLoginResponse's handler (which assembles and sends the real
        // login-response packet via `zone_core::login`) runs next tick.
        tick(&players, &arenas, &broker, &transport(), &capabilities(), &checksums(), &log);
        assert_eq!(players.read().get(&id).unwrap().status, PlayerStatus::LoggedIn);
    }
}
