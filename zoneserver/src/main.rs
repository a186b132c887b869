//! The assembled zone-server binary (spec.md §1-§5, `game/runner`
//! equivalent): parses its CLI arguments, loads `zone.toml`, builds the
//! broker and module manager, registers the built-in modules, and drives
//! the mainloop. Networking itself is a `Transport` the binary never
//! implements (spec.md §1's explicit non-goal).

mod arenasm;
mod config;
mod modules;
mod playersm;
mod transport;

use authfile::{AuthFileSettings, FileAuth, PasswdFile};
use broker::Broker;
use clap::{App, Arg};
use config::ZoneServerConfig;
use flaggame::FlagSettings;
use flux::logging;
use modules::{AuthModule, FlagGameModule, InterfaceKind, RadialPlacement};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use transport::{NullTransport, Transport};
use zone_core::arena::{self, ArenaId, ArenaTable, PopulationCache};
use zone_core::capability::{CapabilityManager, GroupCapabilityManager};
use zone_core::config::ConfigStore;
use zone_core::mainloop::MainLoop;
use zone_core::module::ModuleManager;
use zone_core::player::PlayerTable;
use zone_core::player_sm::TICK_INTERVAL as PLAYER_SM_TICK;

/// 5 s carry-flag game step (spec.md §4.8).
const FLAG_GAME_TICK: Duration = Duration::from_secs(5);

/// Arena state-machine tick cadence; no dedicated constant exists in
/// `zone_core::arena` (only `REAP_INTERVAL` for the reap scan), so this
/// binary drives it at the same cadence as the player state machine.
const ARENA_SM_TICK: Duration = PLAYER_SM_TICK;

fn main() {
    let matches = App::new("zoneserver")
        .version("0.1.0")
        .about("Zone server core: broker, module manager, mainloop, player/arena registries")
        .arg(Arg::with_name("CONFIG_FILE").help("Path to zone.toml").required(true))
        .arg(Arg::with_name("PASSWD_FILE").help("Path to passwd.conf").required(true))
        .get_matches();

    let config_path = PathBuf::from(matches.value_of("CONFIG_FILE").unwrap());
    let passwd_path = PathBuf::from(matches.value_of("PASSWD_FILE").unwrap());

    let server_config: ZoneServerConfig = flux::config::load_toml(&config_path);
    let log = logging::init(&server_config.log);

    logging::info!(log, "starting zone server"; "context" => "main", "config" => config_path.display().to_string());

    let mut broker: Broker<InterfaceKind, ArenaId> = Broker::new(&log);
    let mut modules: ModuleManager<InterfaceKind, ArenaId> = ModuleManager::new(&log);
    let player_table = Arc::new(PlayerTable::new());
    let arena_table = Arc::new(ArenaTable::new(&log));
    let config_store = Arc::new(ConfigStore::new(&log));
    config_store.load_global(&config_path);

    arena_table.sync_permanent_arenas(&server_config.arenas.permanent_arenas);

    // `NullAuth` always loads first so the interface stack never goes
    // empty (spec.md §4.9/§9); a configured `FileAuth` loads after it and
    // shadows it via the broker's single-slot-per-kind stack.
    let null_auth = AuthModule::new("null_auth", Arc::new(authfile::NullAuth));
    modules.load_module(Arc::new(null_auth), &mut broker);

    let passwd_settings: AuthFileSettings = server_config.auth.clone();
    let passwd_file = Arc::new(PasswdFile::load(&passwd_path, passwd_settings, &log));
    let file_auth = AuthModule::new("file_auth", Arc::new(FileAuth::new(passwd_file)));
    modules.load_module(Arc::new(file_auth), &mut broker);

    let flag_game = Arc::new(FlagGameModule::new(Arc::new(RadialPlacement::new(lcg_sampler())), |_arena: ArenaId| {
        FlagSettings::default()
    }));
    modules.load_module(flag_game.clone(), &mut broker);

    modules.post_load_all(&mut broker);

    // Past this point every arena (pre-existing permanent ones included,
    // since `Arena::new` always starts in `DoInit0`) attaches its modules
    // through the arena state machine's `DoInit1` handler, not here.
    let broker = Arc::new(RwLock::new(broker));
    let modules = Arc::new(Mutex::new(modules));

    // Networking itself stays a thin trait boundary (spec.md §1); a real
    // deployment substitutes its own `Transport` here.
    let transport: Arc<dyn Transport> = Arc::new(NullTransport);
    let capabilities: Arc<dyn CapabilityManager> = Arc::new(GroupCapabilityManager::new(HashMap::new(), "default"));
    let checksums = Arc::new(server_config.clone());

    let mut mainloop = MainLoop::new(Duration::from_millis(server_config.general.tick_interval_ms), &log);

    {
        let flag_game = flag_game.clone();
        mainloop.set_timer(FLAG_GAME_TICK.as_millis() as u64, FLAG_GAME_TICK.as_millis() as u64, move || {
            flag_game.step_all(FLAG_GAME_TICK);
        });
    }

    {
        let arena_table = arena_table.clone();
        let player_table = player_table.clone();
        let population_cache = PopulationCache::default();
        let interval = arena::REAP_INTERVAL.as_millis() as u64;
        let log_for_reap = log.clone();
        mainloop.set_timer(interval, interval, move || {
            let candidates = arena::mark_reap_candidates(&arena_table);
            if !candidates.is_empty() {
                // An arena is kept alive by a player sitting in it or
                // mid-transition into it, or by being a keep-alive
                // (permanent) arena that isn't already pending recycle;
                // everything else reaped is pushed into DoWriteData to
                // start its teardown.
                let occupied: HashSet<ArenaId> =
                    player_table.read().values().flat_map(|p| [p.arena, p.new_arena]).flatten().collect();
                let to_destroy: Vec<ArenaId> = candidates
                    .into_iter()
                    .filter(|id| !occupied.contains(id))
                    .filter(|id| {
                        let arenas = arena_table.read();
                        match arenas.get(id) {
                            Some(a) => !a.keep_alive || a.status == arena::ArenaStatus::Closing,
                            None => false,
                        }
                    })
                    .collect();
                if !to_destroy.is_empty() {
                    logging::debug!(log_for_reap, "reaping empty arenas"; "context" => "reap_tick", "count" => to_destroy.len());
                    arena::begin_destroy(&arena_table, &to_destroy);
                }
            }
            let _ = &population_cache;
        });
    }

    {
        let arena_collab = Arc::new(arenasm::LiveArenaCollaborators::new(
            broker.clone(),
            modules.clone(),
            config_store.clone(),
            arena_table.clone(),
            player_table.clone(),
            server_config.attach_modules(),
        ));
        let arena_table = arena_table.clone();
        let log_for_arena_tick = log.clone();
        let interval = ARENA_SM_TICK.as_millis() as u64;
        mainloop.set_timer(interval, interval, move || {
            arena::run_arena_tick(arena_collab.as_ref(), &arena_table, &log_for_arena_tick);
        });
    }

    {
        let player_table = player_table.clone();
        let arena_table = arena_table.clone();
        let broker = broker.clone();
        let transport = transport.clone();
        let capabilities = capabilities.clone();
        let checksums = checksums.clone();
        let log_for_tick = log.clone();
        let interval = PLAYER_SM_TICK.as_millis() as u64;
        mainloop.set_timer(interval, interval, move || {
            playersm::tick(&player_table, &arena_table, &broker, &transport, &capabilities, &checksums, &log_for_tick);
        });
    }

    logging::info!(log, "entering mainloop"; "context" => "main", "tick_ms" => server_config.general.tick_interval_ms);
    mainloop.run();
}

/// A small deterministic linear-congruential sampler standing in for the
/// caller-supplied `[0,1)` randomness `RadialPlacement`/`zone_core::fanout`
/// expect (PRNG is an explicit non-goal of spec.md §1; a deployment wires
/// in whatever generator it already uses elsewhere).
fn lcg_sampler() -> impl Fn() -> f64 + Send + Sync {
    let state = std::sync::atomic::AtomicU64::new(0x2545F4914F6CDD1D);
    move || {
        let prev = state.load(std::sync::atomic::Ordering::Relaxed);
        let next = prev.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        state.store(next, std::sync::atomic::Ordering::Relaxed);
        ((next >> 11) as f64) / ((1u64 << 53) as f64)
    }
}
