//! Wires the arena state machine's tick (spec.md §4.4, C5) into the
//! mainloop: config open/close, module attach/detach through the module
//! manager, and the `PreCreate`/`Create`/`Destroy`/`PostDestroy` broker
//! callbacks. Persistence stays stubbed (inline completion), same as
//! `playersm::LiveCollaborators` — a storage backend is out of scope
//! (spec.md §1).

use crate::modules::InterfaceKind;
use broker::Broker;
use std::sync::{Arc, Mutex, RwLock};
use zone_core::arena::{ArenaId, ArenaSmCollaborators, ArenaTable};
use zone_core::config::ConfigStore;
use zone_core::module::ModuleManager;
use zone_core::player::PlayerTable;

type ArenaCallback = dyn Fn(ArenaId) + Send + Sync;

pub struct LiveArenaCollaborators {
    broker: Arc<RwLock<Broker<InterfaceKind, ArenaId>>>,
    modules: Arc<Mutex<ModuleManager<InterfaceKind, ArenaId>>>,
    config: Arc<ConfigStore>,
    arenas: Arc<ArenaTable>,
    players: Arc<PlayerTable>,
    /// The `Modules:AttachModules` list every arena attaches on `DoInit1`.
    /// Per-arena overrides are not modeled (spec.md's distillation gives
    /// only the one process-wide list); every arena gets the same set.
    attach_modules: Vec<String>,
}

impl LiveArenaCollaborators {
    pub fn new(
        broker: Arc<RwLock<Broker<InterfaceKind, ArenaId>>>,
        modules: Arc<Mutex<ModuleManager<InterfaceKind, ArenaId>>>,
        config: Arc<ConfigStore>,
        arenas: Arc<ArenaTable>,
        players: Arc<PlayerTable>,
        attach_modules: Vec<String>,
    ) -> Self {
        LiveArenaCollaborators { broker, modules, config, arenas, players, attach_modules }
    }

    fn name_and_base(&self, arena: ArenaId) -> Option<(String, String)> {
        self.arenas.read().get(&arena).map(|a| (a.name.clone(), a.base_name.clone()))
    }

    fn fire(&self, arena: ArenaId, kind: InterfaceKind) {
        let broker = self.broker.read().unwrap();
        broker.fire::<ArenaCallback>(Some(&arena), &kind, |h| h(arena));
    }
}

impl ArenaSmCollaborators for LiveArenaCollaborators {
    fn open_config(&self, arena: ArenaId) -> bool {
        let Some((name, base)) = self.name_and_base(arena) else { return false };
        self.config.load_base(&base, format!("arenas/{base}.conf"));
        self.config.load_arena(&name, format!("arenas/{name}.conf"));
        true
    }

    fn close_config(&self, arena: ArenaId) {
        if let Some((name, _)) = self.name_and_base(arena) {
            self.config.unload_arena(&name);
        }
    }

    fn attach_modules(&self, arena: ArenaId) {
        let mut modules = self.modules.lock().unwrap();
        let mut broker = self.broker.write().unwrap();
        for name in &self.attach_modules {
            modules.attach_module_async(name, arena, &mut broker);
        }
    }

    fn detach_all_modules(&self, arena: ArenaId) -> bool {
        let mut modules = self.modules.lock().unwrap();
        let mut broker = self.broker.write().unwrap();
        modules.detach_all_from_arena_async(&arena, &mut broker)
    }

    fn request_arena_sync_load(&self, _arena: ArenaId) -> bool {
        true
    }

    fn request_arena_sync_save(&self, _arena: ArenaId) -> bool {
        true
    }

    fn arena_has_player(&self, arena: ArenaId) -> bool {
        self.players.read().values().any(|p| p.arena == Some(arena) || p.new_arena == Some(arena))
    }

    fn fire_pre_create(&self, arena: ArenaId) {
        self.fire(arena, InterfaceKind::ArenaPreCreate);
    }

    fn fire_create(&self, arena: ArenaId) {
        self.fire(arena, InterfaceKind::ArenaCreate);
    }

    fn fire_destroy(&self, arena: ArenaId) {
        self.fire(arena, InterfaceKind::ArenaDestroy);
    }

    fn fire_post_destroy(&self, arena: ArenaId) {
        self.fire(arena, InterfaceKind::ArenaPostDestroy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_core::arena::ArenaStatus;
    use zone_core::module::Module;

    fn logger() -> flux::logging::Logger {
        flux::logging::Logger::root(slog::Discard, flux::logging::o!())
    }

    struct CountingModule {
        name: &'static str,
        attaches: std::sync::Mutex<Vec<ArenaId>>,
    }

    impl Module<InterfaceKind, ArenaId> for CountingModule {
        fn name(&self) -> &str {
            self.name
        }
        fn load(&self, _broker: &mut Broker<InterfaceKind, ArenaId>) -> bool {
            true
        }
        fn unload(&self, _broker: &mut Broker<InterfaceKind, ArenaId>) -> bool {
            true
        }
        fn attach(&self, arena: &ArenaId, _broker: &mut Broker<InterfaceKind, ArenaId>) {
            self.attaches.lock().unwrap().push(*arena);
        }
        fn detach(&self, _arena: &ArenaId, _broker: &mut Broker<InterfaceKind, ArenaId>) {}
    }

    #[test]
    fn arena_tick_drives_a_fresh_arena_to_running_and_attaches_its_modules() {
        let log = logger();
        let arenas = Arc::new(ArenaTable::new(&log));
        let id = arenas.complete_go("duel");

        let broker = Arc::new(RwLock::new(Broker::new(&log)));
        let mut mgr: ModuleManager<InterfaceKind, ArenaId> = ModuleManager::new(&log);
        let module = Arc::new(CountingModule { name: "flaggame", attaches: std::sync::Mutex::new(Vec::new()) });
        mgr.load_module(module.clone(), &mut broker.write().unwrap());
        let modules = Arc::new(Mutex::new(mgr));

        let config = Arc::new(ConfigStore::new(&log));
        let players = Arc::new(PlayerTable::new());
        let collab = LiveArenaCollaborators::new(broker, modules, config, arenas.clone(), players, vec!["flaggame".to_string()]);

        for _ in 0..5 {
            zone_core::arena::run_arena_tick(&collab, &arenas, &log);
        }

        assert_eq!(arenas.read().get(&id).unwrap().status, ArenaStatus::Running);
        assert_eq!(*module.attaches.lock().unwrap(), vec![id]);
    }

    #[test]
    fn destroy_fires_callbacks_and_detaches_modules() {
        let log = logger();
        let arenas = Arc::new(ArenaTable::new(&log));
        let id = arenas.complete_go("duel");
        arenas.write().get_mut(&id).unwrap().status = ArenaStatus::DoDestroy1;

        let broker = Arc::new(RwLock::new(Broker::new(&log)));
        let mut mgr: ModuleManager<InterfaceKind, ArenaId> = ModuleManager::new(&log);
        let module = Arc::new(CountingModule { name: "flaggame", attaches: std::sync::Mutex::new(Vec::new()) });
        mgr.load_module(module, &mut broker.write().unwrap());
        let modules = Arc::new(Mutex::new(mgr));

        let config = Arc::new(ConfigStore::new(&log));
        let players = Arc::new(PlayerTable::new());
        let collab = LiveArenaCollaborators::new(broker.clone(), modules, config, arenas.clone(), players, vec!["flaggame".to_string()]);

        let destroyed = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let destroyed = destroyed.clone();
            broker.write().unwrap().register_callback(
                None,
                InterfaceKind::ArenaPostDestroy,
                Arc::new(move |arena: ArenaId| destroyed.lock().unwrap().push(arena)) as Arc<ArenaCallback>,
            );
        }

        for _ in 0..3 {
            zone_core::arena::run_arena_tick(&collab, &arenas, &log);
        }

        assert!(arenas.read().get(&id).is_none());
        assert_eq!(*destroyed.lock().unwrap(), vec![id]);
    }
}
