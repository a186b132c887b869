//! Built-in modules registered with the module manager at boot (spec.md
//! §4.2, C2): the auth adapter on the interface stack, and the carry-flag
//! game attached per arena.

use broker::Broker;
use flaggame::{ArenaFlagGame, Flag, FlagId, FlagSettings, FlagState, PlacementBehavior};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use zone_core::arena::ArenaId;
use zone_core::auth::IAuth;
use zone_core::module::Module;

/// The broker's closed interface/callback/advisor kind enum (spec.md
/// §4.1); `zoneserver` is the only crate that needs to name every kind a
/// deployment actually uses. The `Player*`/`*Arena` variants are callback
/// kinds the player and arena state machines fire through the broker
/// (spec.md §4.1, §4.4, §4.5); `Auth` is the only registered interface.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum InterfaceKind {
    Auth,
    PlayerConnect,
    PlayerDisconnect,
    PreEnterArena,
    EnterArena,
    LeaveArena,
    ArenaPreCreate,
    ArenaCreate,
    ArenaDestroy,
    ArenaPostDestroy,
}

/// Registers a single `IAuth` implementation at the process scope, at
/// whatever position in load order the caller places it — the broker's
/// single-slot-per-kind stack means the last one loaded shadows earlier
/// ones, so `NullAuth` should load before any real adapter (spec.md
/// §4.9/§9: it is the always-present lowest-priority fallback).
pub struct AuthModule<A: IAuth + 'static> {
    name: &'static str,
    auth: Arc<A>,
}

impl<A: IAuth + 'static> AuthModule<A> {
    pub fn new(name: &'static str, auth: Arc<A>) -> Self {
        AuthModule { name, auth }
    }
}

impl<A: IAuth + 'static> Module<InterfaceKind, ArenaId> for AuthModule<A> {
    fn name(&self) -> &str {
        self.name
    }

    fn load(&self, broker: &mut Broker<InterfaceKind, ArenaId>) -> bool {
        broker.register_interface(None, InterfaceKind::Auth, self.auth.clone() as Arc<dyn IAuth>);
        true
    }

    fn unload(&self, _broker: &mut Broker<InterfaceKind, ArenaId>) -> bool {
        true
    }
}

/// Scatters a flag randomly within `SpawnRadius` of `(SpawnX, SpawnY)`
/// (spec.md §4.8). PRNG is an explicit non-goal (spec.md §1); the caller
/// supplies a `[0,1)` sampler, the same pattern `zone_core::fanout` uses
/// for its own probability checks.
pub struct RadialPlacement {
    sampler: Box<dyn Fn() -> f64 + Send + Sync>,
}

impl RadialPlacement {
    pub fn new(sampler: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        RadialPlacement { sampler: Box::new(sampler) }
    }

    fn random_point(&self, game: &ArenaFlagGame) -> (i16, i16) {
        let settings = &game.settings;
        let radius = (settings.spawn_radius.max(1)) as f64;
        let angle = (self.sampler)() * std::f64::consts::TAU;
        let r = (self.sampler)().sqrt() * radius;
        let x = settings.spawn_x as f64 + r * angle.cos();
        let y = settings.spawn_y as f64 + r * angle.sin();
        (x.round() as i16, y.round() as i16)
    }
}

impl PlacementBehavior for RadialPlacement {
    fn start_game(&self, game: &mut ArenaFlagGame) {
        for id in 0..game.settings.min_flags {
            let (x, y) = self.random_point(game);
            game.flags.push(Flag { id, state: FlagState::OnMap { x, y, freq: 0 } });
        }
    }

    fn spawn_flags(&self, game: &mut ArenaFlagGame) {
        let next_id = game.flags.len() as FlagId;
        if (game.flags.len() as u16) < game.settings.max_flags {
            let (x, y) = self.random_point(game);
            game.flags.push(Flag { id: next_id, state: FlagState::OnMap { x, y, freq: 0 } });
        }
    }

    fn place_dropped_flag(&self, game: &ArenaFlagGame, _flag: FlagId) -> (i16, i16) {
        self.random_point(game)
    }
}

/// One `ArenaFlagGame` per attached arena, ticked by `step_all` on the 5 s
/// timer (spec.md §4.8). Per-touch/drop wire handling lives wherever the
/// (out-of-scope) transport dispatches inbound packets; this module only
/// owns the lifecycle and the tick.
pub struct FlagGameModule<B: PlacementBehavior + 'static> {
    behavior: Arc<B>,
    settings_for: Box<dyn Fn(ArenaId) -> FlagSettings + Send + Sync>,
    games: RwLock<HashMap<ArenaId, Mutex<ArenaFlagGame>>>,
}

impl<B: PlacementBehavior + 'static> FlagGameModule<B> {
    pub fn new(behavior: Arc<B>, settings_for: impl Fn(ArenaId) -> FlagSettings + Send + Sync + 'static) -> Self {
        FlagGameModule { behavior, settings_for: Box::new(settings_for), games: RwLock::new(HashMap::new()) }
    }

    /// 5 s mainloop step (spec.md §4.8): advances every attached arena's
    /// game independently.
    pub fn step_all(&self, now: Duration) {
        for game in self.games.read().unwrap().values() {
            game.lock().unwrap().step(now, self.behavior.as_ref());
        }
    }

    pub fn is_attached(&self, arena: &ArenaId) -> bool {
        self.games.read().unwrap().contains_key(arena)
    }
}

impl<B: PlacementBehavior + 'static> Module<InterfaceKind, ArenaId> for FlagGameModule<B> {
    fn name(&self) -> &str {
        "flaggame"
    }

    fn load(&self, _broker: &mut Broker<InterfaceKind, ArenaId>) -> bool {
        true
    }

    fn unload(&self, _broker: &mut Broker<InterfaceKind, ArenaId>) -> bool {
        true
    }

    fn attach(&self, arena: &ArenaId, _broker: &mut Broker<InterfaceKind, ArenaId>) {
        let settings = (self.settings_for)(*arena);
        self.games.write().unwrap().insert(*arena, Mutex::new(ArenaFlagGame::new(settings)));
    }

    fn detach(&self, arena: &ArenaId, _broker: &mut Broker<InterfaceKind, ArenaId>) {
        self.games.write().unwrap().remove(arena);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_core::auth::{AuthRequest, AuthResult, UnauthenticatedAuth};

    #[test]
    fn auth_module_registers_interface_resolvable_by_lookup() {
        let log = flux::logging::Logger::root(slog::Discard, flux::logging::o!());
        let mut broker: Broker<InterfaceKind, ArenaId> = Broker::new(&log);
        let module = AuthModule::new("unauthenticated", Arc::new(UnauthenticatedAuth));

        assert!(module.load(&mut broker));

        let handle = broker.get_interface::<dyn IAuth>(None, &InterfaceKind::Auth).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        let request = AuthRequest::new(1, vec![], move |result: AuthResult| *slot.lock().unwrap() = Some(result)).unwrap();
        handle.authenticate(Arc::new(request));

        assert!(seen.lock().unwrap().is_some());
    }

    #[test]
    fn flag_game_module_attach_detach_tracks_membership() {
        let log = flux::logging::Logger::root(slog::Discard, flux::logging::o!());
        let mut broker: Broker<InterfaceKind, ArenaId> = Broker::new(&log);
        let module = FlagGameModule::new(Arc::new(RadialPlacement::new(|| 0.5)), |_arena| FlagSettings::default());

        let arena = ArenaId(1);
        assert!(!module.is_attached(&arena));
        module.attach(&arena, &mut broker);
        assert!(module.is_attached(&arena));
        module.detach(&arena, &mut broker);
        assert!(!module.is_attached(&arena));
    }
}
