use std::any::Any;
use std::sync::Arc;

/// Monotonically increasing registration id, unique within one kind's
/// subscriber list in one scope.
pub type CallbackId = u64;

/// Presented back to the broker to unregister a previously registered
/// callback subscriber.
pub struct CallbackToken<K> {
    pub(crate) kind: K,
    pub(crate) id: CallbackId,
}

/// Sized wrapper so an unsized handler type (`dyn Fn(..)`) can be erased
/// into `Arc<dyn Any + Send + Sync>` and downcast back; see the identical
/// trick in `interface::Boxed`.
struct Boxed<T: ?Sized>(Arc<T>);

struct Subscriber {
    id: CallbackId,
    handler: Arc<dyn Any + Send + Sync>,
}

/// Ordered, multi-subscriber list of handlers registered under callback
/// kinds of type `K`. Unlike [`crate::interface::InterfaceTable`], every
/// subscriber fires on every `fire` call — there is no shadowing.
pub struct CallbackTable<K: Eq + std::hash::Hash + Clone> {
    subscribers: std::collections::HashMap<K, Vec<Subscriber>>,
    next_id: CallbackId,
}

impl<K: Eq + std::hash::Hash + Clone> Default for CallbackTable<K> {
    fn default() -> Self {
        CallbackTable {
            subscribers: std::collections::HashMap::new(),
            next_id: 0,
        }
    }
}

impl<K: Eq + std::hash::Hash + Clone> CallbackTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to `kind`, appending it to the end of the
    /// subscriber list. Registration order is fire order.
    pub fn register<H>(&mut self, kind: K, handler: Arc<H>) -> CallbackToken<K>
    where
        H: ?Sized + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        self.subscribers.entry(kind.clone()).or_default().push(Subscriber {
            id,
            handler: Arc::new(Boxed(handler)),
        });

        CallbackToken { kind, id }
    }

    /// Removes a previously registered subscriber. Unlike interfaces,
    /// callbacks may be unregistered regardless of position in the list.
    pub fn unregister(&mut self, token: CallbackToken<K>) {
        if let Some(list) = self.subscribers.get_mut(&token.kind) {
            list.retain(|s| s.id != token.id);
        }
    }

    /// Invokes `visit` once per subscriber of `kind` whose handler was
    /// registered as an `H`, in registration order, within this scope only.
    /// The broker composes arena-then-root order across scopes.
    pub fn for_each<H>(&self, kind: &K, mut visit: impl FnMut(&H))
    where
        H: ?Sized + Send + Sync + 'static,
    {
        if let Some(list) = self.subscribers.get(kind) {
            for sub in list {
                if let Some(boxed) = sub.handler.downcast_ref::<Boxed<H>>() {
                    visit(&boxed.0);
                }
            }
        }
    }

    pub fn has(&self, kind: &K) -> bool {
        self.subscribers.get(kind).map_or(false, |s| !s.is_empty())
    }

    pub(crate) fn has_any(&self) -> bool {
        self.subscribers.values().any(|s| !s.is_empty())
    }
}
