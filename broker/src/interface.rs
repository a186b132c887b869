use crate::error::UnregisterError;
use std::any::Any;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

/// Monotonically increasing registration id, unique within one kind's stack
/// in one scope. Used to confirm a token still names the top entry.
pub type RegistrationId = u64;

/// Presented back to the broker to unregister a previously registered
/// interface. Consumed (by value) on unregister so it cannot be reused.
pub struct InterfaceToken<K> {
    pub(crate) kind: K,
    pub(crate) id: RegistrationId,
}

/// Sized wrapper around a (possibly unsized) `Arc<T>` purely so it can be
/// type-erased into `Arc<dyn Any + Send + Sync>` and downcast back; `Arc<T>`
/// itself is always a sized smart pointer, so `Boxed<T>` is sized even when
/// `T` is a trait object.
struct Boxed<T: ?Sized>(Arc<T>);

struct Entry {
    id: RegistrationId,
    value: Arc<dyn Any + Send + Sync>,
    refcount: Arc<AtomicIsize>,
}

/// Ordered stack of implementations registered under interface kinds of
/// type `K`. One instance lives in every broker scope (spec.md §4.1).
pub struct InterfaceTable<K: Eq + std::hash::Hash + Clone> {
    stacks: std::collections::HashMap<K, Vec<Entry>>,
    next_id: RegistrationId,
}

impl<K: Eq + std::hash::Hash + Clone> Default for InterfaceTable<K> {
    fn default() -> Self {
        InterfaceTable {
            stacks: std::collections::HashMap::new(),
            next_id: 0,
        }
    }
}

impl<K: Eq + std::hash::Hash + Clone> InterfaceTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a new implementation onto `kind`'s stack, returning the token
    /// needed to unregister it later.
    pub fn register<T>(&mut self, kind: K, implementation: Arc<T>) -> InterfaceToken<K>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        self.stacks.entry(kind.clone()).or_default().push(Entry {
            id,
            value: Arc::new(Boxed(implementation)),
            refcount: Arc::new(AtomicIsize::new(0)),
        });

        InterfaceToken { kind, id }
    }

    /// Returns the top-of-stack implementation for `kind` in this scope
    /// only (no parent fallback — that is the broker's job), incrementing
    /// its refcount.
    pub fn top<T>(&self, kind: &K) -> Option<InterfaceHandle<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = self.stacks.get(kind)?.last()?;
        let boxed = entry.value.clone().downcast::<Boxed<T>>().ok()?;
        entry.refcount.fetch_add(1, Ordering::AcqRel);
        Some(InterfaceHandle {
            value: Some(boxed),
            refcount: entry.refcount.clone(),
        })
    }

    pub fn has(&self, kind: &K) -> bool {
        self.stacks.get(kind).map_or(false, |s| !s.is_empty())
    }

    pub(crate) fn has_any(&self) -> bool {
        self.stacks.values().any(|s| !s.is_empty())
    }

    /// Unregisters the implementation named by `token`. Fails if the token
    /// is not the current top of its stack, or if references are still
    /// outstanding.
    pub fn unregister(&mut self, token: InterfaceToken<K>) -> Result<(), UnregisterError> {
        let stack = self.stacks.get_mut(&token.kind).ok_or(UnregisterError::NotTop)?;

        match stack.last() {
            Some(top) if top.id == token.id => {
                let refs = stack.last().unwrap().refcount.load(Ordering::Acquire);
                if refs != 0 {
                    return Err(UnregisterError::RefsOutstanding(refs.max(0) as usize));
                }
                stack.pop();
                Ok(())
            }
            _ => Err(UnregisterError::NotTop),
        }
    }
}

/// A refcounted handle to an interface implementation returned by
/// `get_interface`. Dropping it (or calling `release`) decrements the
/// refcount; after `release` the handle is left empty.
pub struct InterfaceHandle<T: ?Sized> {
    value: Option<Arc<Boxed<T>>>,
    refcount: Arc<AtomicIsize>,
}

impl<T: ?Sized> InterfaceHandle<T> {
    /// Explicitly releases the handle. Equivalent to dropping it, except it
    /// leaves the (now empty) handle behind for callers that want to keep
    /// holding the slot without a live reference.
    pub fn release(&mut self) {
        if self.value.take().is_some() {
            self.refcount.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn is_released(&self) -> bool {
        self.value.is_none()
    }
}

impl<T: ?Sized> std::ops::Deref for InterfaceHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value.as_deref().expect("interface handle used after release").0
    }
}

impl<T: ?Sized> Drop for InterfaceHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}
