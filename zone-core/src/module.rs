//! Named, lifecycle-managed units that register interfaces/callbacks with
//! the broker and, optionally, attach to individual arenas (spec.md §4.2,
//! C2). All lifecycle calls are expected to run on the mainloop (C3); this
//! crate does not itself enforce that — callers post through
//! `MainHandle::queue_main_work`.

use broker::Broker;
use flux::logging;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

/// A module's fixed lifecycle. `attach`/`detach` are only meaningful for
/// modules that opt into per-arena state; the default no-ops let a
/// zone-global-only module ignore arenas entirely.
pub trait Module<K: Eq + Hash + Clone, A: Eq + Hash + Clone + 'static>: Send + Sync {
    fn name(&self) -> &str;

    /// Registers this module's interfaces/callbacks with the broker.
    /// Returning `false` aborts the load.
    fn load(&self, broker: &mut Broker<K, A>) -> bool;

    /// Runs once every requested module's `load` has returned `true`; used
    /// to bind optional collaborators looked up via `get_interface`.
    fn post_load(&self, _broker: &mut Broker<K, A>) {}

    /// Runs before `unload`, in reverse load order.
    fn pre_unload(&self, _broker: &mut Broker<K, A>) {}

    /// Unregisters this module's interfaces/callbacks. Returning `false`
    /// signals a failed unload (e.g. refs still outstanding); the manager
    /// keeps the module in the active set in that case.
    fn unload(&self, broker: &mut Broker<K, A>) -> bool;

    fn attach(&self, _arena: &A, _broker: &mut Broker<K, A>) {}

    fn detach(&self, _arena: &A, _broker: &mut Broker<K, A>) {}
}

struct Loaded<K: Eq + Hash + Clone, A: Eq + Hash + Clone + 'static> {
    module: Arc<dyn Module<K, A>>,
    attached: Vec<A>,
}

/// Drives the ordered load/post_load/pre_unload/unload and attach/detach
/// lifecycle for every module active in the zone.
pub struct ModuleManager<K: Eq + Hash + Clone, A: Eq + Hash + Clone + 'static> {
    load_order: Vec<String>,
    active: hashbrown::HashMap<String, Loaded<K, A>>,
    log: logging::Logger,
}

impl<K: Eq + Hash + Clone, A: Eq + Hash + Clone + 'static> ModuleManager<K, A> {
    pub fn new(log: &logging::Logger) -> Self {
        ModuleManager {
            load_order: Vec::new(),
            active: hashbrown::HashMap::new(),
            log: log.new(logging::o!("component" => "module_manager")),
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    /// Constructs and runs `module.load`, adding it to the active set on
    /// success. Does not call `post_load` — that is a separate pass once
    /// every module requested for this boot has loaded, per spec.md §4.2.
    pub fn load_module(&mut self, module: Arc<dyn Module<K, A>>, broker: &mut Broker<K, A>) -> bool {
        let name = module.name().to_string();
        if self.active.contains_key(&name) {
            logging::warn!(self.log, "module already loaded"; "context" => "load_module", "module" => name.clone());
            return true;
        }

        if !module.load(broker) {
            logging::warn!(self.log, "module load failed"; "context" => "load_module", "module" => name);
            return false;
        }

        logging::debug!(self.log, "module loaded"; "context" => "load_module", "module" => name.clone());
        self.load_order.push(name.clone());
        self.active.insert(name, Loaded { module, attached: Vec::new() });
        true
    }

    /// Runs `post_load` on every currently active module, in load order.
    pub fn post_load_all(&self, broker: &mut Broker<K, A>) {
        for name in &self.load_order {
            if let Some(loaded) = self.active.get(name) {
                loaded.module.post_load(broker);
            }
        }
    }

    /// Runs `pre_unload` then `unload` on every active module, in reverse
    /// load order. A module whose `unload` returns `false` is left active
    /// and logged as a fatal inconsistency.
    pub fn unload_all(&mut self, broker: &mut Broker<K, A>) {
        for name in self.load_order.iter().rev() {
            if let Some(loaded) = self.active.get(name) {
                loaded.module.pre_unload(broker);
            }
        }

        let mut still_active = Vec::new();
        for name in self.load_order.iter().rev() {
            if let Some(loaded) = self.active.get(name) {
                if loaded.module.unload(broker) {
                    logging::debug!(self.log, "module unloaded"; "context" => "unload_all", "module" => name.clone());
                } else {
                    logging::error!(self.log, "module unload failed, leaving it active";
                        "context" => "unload_all", "module" => name.clone());
                    still_active.push(name.clone());
                }
            }
        }

        self.active.retain(|name, _| still_active.contains(name));
        self.load_order = still_active.into_iter().rev().collect();
    }

    /// Attaches every module named in `modules` to `arena`, in the order
    /// given, awaiting each attach's completion before starting the next
    /// (spec.md §4.4's `DoInit1`).
    pub fn attach_module_async(&mut self, name: &str, arena: A, broker: &mut Broker<K, A>) {
        if let Some(loaded) = self.active.get_mut(name) {
            loaded.module.attach(&arena, broker);
            loaded.attached.push(arena);
        } else {
            logging::warn!(self.log, "attach requested for unknown module";
                "context" => "attach_module_async", "module" => name.to_string());
        }
    }

    /// Detaches every module attached to `arena`, in reverse attachment
    /// order. Returns `false` if any module was not actually attached
    /// (treated as fatal-to-arena by the caller per spec.md §4.4).
    pub fn detach_all_from_arena_async(&mut self, arena: &A, broker: &mut Broker<K, A>) -> bool {
        let mut order: Vec<String> = self
            .active
            .iter()
            .filter(|(_, loaded)| loaded.attached.contains(arena))
            .map(|(name, _)| name.clone())
            .collect();
        // Reverse attachment order across modules is approximated by
        // reverse load order among the attached set; within a module only
        // one attachment per arena exists, so there is nothing further to
        // order.
        order.sort_by_key(|name| std::cmp::Reverse(self.load_order.iter().position(|n| n == name)));

        let mut all_ok = true;
        for name in &order {
            if let Some(loaded) = self.active.get_mut(name) {
                loaded.module.detach(arena, broker);
                let before = loaded.attached.len();
                loaded.attached.retain(|a| a != arena);
                if loaded.attached.len() == before {
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    pub fn attached_arenas(&self, name: &str) -> HashSet<A>
    where
        A: Hash,
    {
        self.active
            .get(name)
            .map(|loaded| loaded.attached.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    enum Kind {
        Noop,
    }

    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    struct ArenaId(u32);

    struct Counting {
        loads: Arc<AtomicUsize>,
    }

    impl Module<Kind, ArenaId> for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn load(&self, _broker: &mut Broker<Kind, ArenaId>) -> bool {
            self.loads.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn unload(&self, _broker: &mut Broker<Kind, ArenaId>) -> bool {
            true
        }
    }

    #[test]
    fn load_module_is_idempotent() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let mut mgr: ModuleManager<Kind, ArenaId> = ModuleManager::new(&log);
        let mut broker: Broker<Kind, ArenaId> = Broker::default();

        let loads = Arc::new(AtomicUsize::new(0));
        let module = Arc::new(Counting { loads: loads.clone() });

        assert!(mgr.load_module(module.clone(), &mut broker));
        assert!(mgr.load_module(module, &mut broker));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unload_all_runs_in_reverse_load_order() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let mut mgr: ModuleManager<Kind, ArenaId> = ModuleManager::new(&log);
        let mut broker: Broker<Kind, ArenaId> = Broker::default();

        struct Named {
            name: &'static str,
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        impl Module<Kind, ArenaId> for Named {
            fn name(&self) -> &str {
                self.name
            }
            fn load(&self, _broker: &mut Broker<Kind, ArenaId>) -> bool {
                true
            }
            fn unload(&self, _broker: &mut Broker<Kind, ArenaId>) -> bool {
                self.order.lock().unwrap().push(self.name);
                true
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        mgr.load_module(Arc::new(Named { name: "first", order: order.clone() }), &mut broker);
        mgr.load_module(Arc::new(Named { name: "second", order: order.clone() }), &mut broker);

        mgr.unload_all(&mut broker);

        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }
}
