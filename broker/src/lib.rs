//! Component broker (spec.md §4.1, C1): a hierarchical interface,
//! callback and advisor registry shared by every other module in the
//! zone server. One process-global scope always exists; arena scopes are
//! created and destroyed by the arena manager as arenas come and go.
//!
//! Interfaces are single-slot-per-kind, refcounted, and resolved with
//! parent fallback: a lookup in an arena scope that finds nothing falls
//! through to the process scope. Callbacks and advisors are
//! multi-subscriber and are *not* shadowed by scope: firing always visits
//! the arena scope's subscribers first, then the process scope's.

mod advisor;
mod callback;
pub mod error;
mod interface;
mod scope;

pub use advisor::{AdvisorId, AdvisorToken};
pub use callback::{CallbackId, CallbackToken};
pub use error::{DestroyScopeError, UnregisterError};
pub use interface::{InterfaceHandle, InterfaceToken, RegistrationId};

use flux::logging;
use scope::Scope;
use std::hash::Hash;
use std::sync::Arc;

/// A registration made in a particular scope. Holds enough to route
/// `unregister_interface` back to the scope it came from.
pub struct InterfaceRegistration<K, A> {
    arena: Option<A>,
    token: InterfaceToken<K>,
}

pub struct CallbackRegistration<K, A> {
    arena: Option<A>,
    token: CallbackToken<K>,
}

pub struct AdvisorRegistration<K, A> {
    arena: Option<A>,
    token: AdvisorToken<K>,
}

/// The broker itself: one process-global scope plus a table of
/// arena-keyed scopes. `K` is the closed enum of interface/callback/
/// advisor kinds a deployment defines; `A` is the arena identifier type.
pub struct Broker<K: Eq + Hash + Clone, A: Eq + Hash + Clone> {
    root: Scope<K>,
    arenas: std::collections::HashMap<A, Scope<K>>,
    log: logging::Logger,
}

impl<K: Eq + Hash + Clone, A: Eq + Hash + Clone> Default for Broker<K, A> {
    fn default() -> Self {
        Broker::new(&logging::Logger::root(slog::Discard, logging::o!()))
    }
}

impl<K: Eq + Hash + Clone, A: Eq + Hash + Clone> Broker<K, A> {
    pub fn new(log: &logging::Logger) -> Self {
        Broker {
            root: Scope::new(),
            arenas: std::collections::HashMap::new(),
            log: log.new(logging::o!("component" => "broker")),
        }
    }

    /// Creates an empty scope for `arena`. Returns `false` if one already
    /// exists (the arena manager should treat this as a programming
    /// error — arena ids are not reused while a scope is live).
    pub fn create_scope(&mut self, arena: A) -> bool {
        if self.arenas.contains_key(&arena) {
            return false;
        }
        self.arenas.insert(arena, Scope::new());
        logging::debug!(self.log, "scope created"; "context" => "create_scope");
        true
    }

    /// Tears down the scope for `arena`, failing if it still holds live
    /// registrations — the arena manager must drive every module's
    /// `detach` to completion first (spec.md §4.4's `DoDestroy2`).
    pub fn destroy_scope(&mut self, arena: &A) -> Result<(), DestroyScopeError> {
        match self.arenas.get(arena) {
            None => Err(DestroyScopeError::NoSuchScope),
            Some(scope) if !scope.is_empty() => Err(DestroyScopeError::NotEmpty),
            Some(_) => {
                self.arenas.remove(arena);
                logging::debug!(self.log, "scope destroyed"; "context" => "destroy_scope");
                Ok(())
            }
        }
    }

    fn scope_mut(&mut self, arena: Option<&A>) -> Option<&mut Scope<K>> {
        match arena {
            Some(a) => self.arenas.get_mut(a),
            None => Some(&mut self.root),
        }
    }

    // -- interfaces ---------------------------------------------------

    pub fn register_interface<T>(
        &mut self,
        arena: Option<A>,
        kind: K,
        implementation: Arc<T>,
    ) -> InterfaceRegistration<K, A>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let scope = match &arena {
            Some(a) => self.arenas.entry(a.clone()).or_insert_with(Scope::new),
            None => &mut self.root,
        };
        let token = scope.interfaces.register(kind, implementation);
        InterfaceRegistration { arena, token }
    }

    /// Looks up `kind` in `arena`'s scope; if nothing is registered there
    /// (or no arena is given), falls back to the process scope.
    pub fn get_interface<T>(&self, arena: Option<&A>, kind: &K) -> Option<InterfaceHandle<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if let Some(a) = arena {
            if let Some(scope) = self.arenas.get(a) {
                if let Some(handle) = scope.interfaces.top::<T>(kind) {
                    return Some(handle);
                }
            }
        }
        self.root.interfaces.top::<T>(kind)
    }

    pub fn unregister_interface(&mut self, reg: InterfaceRegistration<K, A>) -> Result<(), UnregisterError> {
        let scope = self
            .scope_mut(reg.arena.as_ref())
            .expect("scope for a live registration must still exist");
        scope.interfaces.unregister(reg.token)
    }

    // -- callbacks ------------------------------------------------------

    pub fn register_callback<H>(&mut self, arena: Option<A>, kind: K, handler: Arc<H>) -> CallbackRegistration<K, A>
    where
        H: ?Sized + Send + Sync + 'static,
    {
        let scope = match &arena {
            Some(a) => self.arenas.entry(a.clone()).or_insert_with(Scope::new),
            None => &mut self.root,
        };
        let token = scope.callbacks.register(kind, handler);
        CallbackRegistration { arena, token }
    }

    pub fn unregister_callback(&mut self, reg: CallbackRegistration<K, A>) {
        if let Some(scope) = self.scope_mut(reg.arena.as_ref()) {
            scope.callbacks.unregister(reg.token);
        }
    }

    /// Fires `kind`, visiting the arena scope's subscribers (if an arena
    /// is given) before the process scope's, per spec.md §4.1.
    pub fn fire<H>(&self, arena: Option<&A>, kind: &K, mut visit: impl FnMut(&H))
    where
        H: ?Sized + Send + Sync + 'static,
    {
        if let Some(a) = arena {
            if let Some(scope) = self.arenas.get(a) {
                scope.callbacks.for_each::<H>(kind, &mut visit);
            }
        }
        self.root.callbacks.for_each::<H>(kind, &mut visit);
    }

    // -- advisors ------------------------------------------------------

    pub fn register_advisor<T>(&mut self, arena: Option<A>, kind: K, advisor: Arc<T>) -> AdvisorRegistration<K, A>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let scope = match &arena {
            Some(a) => self.arenas.entry(a.clone()).or_insert_with(Scope::new),
            None => &mut self.root,
        };
        let token = scope.advisors.register(kind, advisor);
        AdvisorRegistration { arena, token }
    }

    pub fn unregister_advisor(&mut self, reg: AdvisorRegistration<K, A>) {
        if let Some(scope) = self.scope_mut(reg.arena.as_ref()) {
            scope.advisors.unregister(reg.token);
        }
    }

    /// Visits `kind`'s advisors, arena scope first then process scope;
    /// iteration order within each scope is registration order. The
    /// caller combines the individual contributions per its own
    /// semantics (boolean AND/OR, min/max, etc).
    pub fn for_each_advisor<T>(&self, arena: Option<&A>, kind: &K, mut visit: impl FnMut(&T))
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if let Some(a) = arena {
            if let Some(scope) = self.arenas.get(a) {
                scope.advisors.for_each::<T>(kind, &mut visit);
            }
        }
        self.root.advisors.for_each::<T>(kind, &mut visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    enum Kind {
        Greeting,
    }

    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    struct ArenaId(u32);

    trait Greeter: Send + Sync {
        fn greet(&self) -> &str;
    }

    struct Global;
    impl Greeter for Global {
        fn greet(&self) -> &str {
            "global"
        }
    }

    struct Local;
    impl Greeter for Local {
        fn greet(&self) -> &str {
            "local"
        }
    }

    #[test]
    fn interface_falls_back_to_root_when_arena_scope_empty() {
        let mut broker: Broker<Kind, ArenaId> = Broker::default();
        broker.register_interface(None, Kind::Greeting, Arc::new(Global) as Arc<dyn Greeter>);
        broker.create_scope(ArenaId(1));

        let handle = broker.get_interface::<dyn Greeter>(Some(&ArenaId(1)), &Kind::Greeting).unwrap();
        assert_eq!(handle.greet(), "global");
    }

    #[test]
    fn interface_prefers_arena_scope_over_root() {
        let mut broker: Broker<Kind, ArenaId> = Broker::default();
        broker.register_interface(None, Kind::Greeting, Arc::new(Global) as Arc<dyn Greeter>);
        broker.register_interface(Some(ArenaId(1)), Kind::Greeting, Arc::new(Local) as Arc<dyn Greeter>);

        let handle = broker.get_interface::<dyn Greeter>(Some(&ArenaId(1)), &Kind::Greeting).unwrap();
        assert_eq!(handle.greet(), "local");
    }

    #[test]
    fn callback_fires_arena_then_root() {
        let mut broker: Broker<Kind, ArenaId> = Broker::default();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        type Handler = dyn Fn() + Send + Sync;
        let root_order = order.clone();
        broker.register_callback(None, Kind::Greeting, Arc::new(move || root_order.lock().unwrap().push("root")) as Arc<Handler>);
        let arena_order = order.clone();
        broker.register_callback(
            Some(ArenaId(1)),
            Kind::Greeting,
            Arc::new(move || arena_order.lock().unwrap().push("arena")) as Arc<Handler>,
        );

        broker.fire::<Handler>(Some(&ArenaId(1)), &Kind::Greeting, |h| h());

        assert_eq!(*order.lock().unwrap(), vec!["arena", "root"]);
    }

    #[test]
    fn destroy_scope_rejects_nonempty_scope() {
        let mut broker: Broker<Kind, ArenaId> = Broker::default();
        broker.register_interface(Some(ArenaId(1)), Kind::Greeting, Arc::new(Local) as Arc<dyn Greeter>);

        assert_eq!(broker.destroy_scope(&ArenaId(1)), Err(DestroyScopeError::NotEmpty));
    }

    #[test]
    fn destroy_scope_succeeds_once_empty() {
        let mut broker: Broker<Kind, ArenaId> = Broker::default();
        let reg = broker.register_interface(Some(ArenaId(1)), Kind::Greeting, Arc::new(Local) as Arc<dyn Greeter>);
        broker.unregister_interface(reg).unwrap();

        assert!(broker.destroy_scope(&ArenaId(1)).is_ok());
    }
}
