use std::any::Any;
use std::sync::Arc;

/// Monotonically increasing registration id, unique within one kind's
/// advisor list in one scope.
pub type AdvisorId = u64;

/// Presented back to the broker to unregister a previously registered
/// advisor.
pub struct AdvisorToken<K> {
    pub(crate) kind: K,
    pub(crate) id: AdvisorId,
}

struct Boxed<T: ?Sized>(Arc<T>);

struct Advisor {
    id: AdvisorId,
    value: Arc<dyn Any + Send + Sync>,
}

/// Ordered, multi-subscriber list of advisors registered under advisor
/// kinds of type `K`. Advisors differ from callbacks in intent, not
/// mechanism: each contributes a boolean or value that the caller of
/// `for_each` combines per its own semantics (spec.md §4.1), rather than
/// being fired purely for side effects.
pub struct AdvisorTable<K: Eq + std::hash::Hash + Clone> {
    advisors: std::collections::HashMap<K, Vec<Advisor>>,
    next_id: AdvisorId,
}

impl<K: Eq + std::hash::Hash + Clone> Default for AdvisorTable<K> {
    fn default() -> Self {
        AdvisorTable {
            advisors: std::collections::HashMap::new(),
            next_id: 0,
        }
    }
}

impl<K: Eq + std::hash::Hash + Clone> AdvisorTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A>(&mut self, kind: K, advisor: Arc<A>) -> AdvisorToken<K>
    where
        A: ?Sized + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        self.advisors.entry(kind.clone()).or_default().push(Advisor {
            id,
            value: Arc::new(Boxed(advisor)),
        });

        AdvisorToken { kind, id }
    }

    pub fn unregister(&mut self, token: AdvisorToken<K>) {
        if let Some(list) = self.advisors.get_mut(&token.kind) {
            list.retain(|a| a.id != token.id);
        }
    }

    /// Visits every advisor of `kind` registered as an `A`, in stable
    /// registration order, within this scope only.
    pub fn for_each<A>(&self, kind: &K, mut visit: impl FnMut(&A))
    where
        A: ?Sized + Send + Sync + 'static,
    {
        if let Some(list) = self.advisors.get(kind) {
            for advisor in list {
                if let Some(boxed) = advisor.value.downcast_ref::<Boxed<A>>() {
                    visit(&boxed.0);
                }
            }
        }
    }

    pub fn has(&self, kind: &K) -> bool {
        self.advisors.get(kind).map_or(false, |a| !a.is_empty())
    }

    pub(crate) fn has_any(&self) -> bool {
        self.advisors.values().any(|a| !a.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
    struct Kind(u8);

    type CanWarp = dyn Fn() -> bool + Send + Sync;

    #[test]
    fn combines_votes_in_registration_order() {
        let mut table: AdvisorTable<Kind> = AdvisorTable::new();
        table.register(Kind(0), Arc::new(|| true) as Arc<CanWarp>);
        table.register(Kind(0), Arc::new(|| false) as Arc<CanWarp>);

        let mut votes = Vec::new();
        table.for_each::<CanWarp>(&Kind(0), |advisor| votes.push(advisor()));

        assert_eq!(votes, vec![true, false]);
        assert!(!votes.into_iter().all(|v| v));
    }

    #[test]
    fn unregistered_advisor_is_not_visited() {
        let mut table: AdvisorTable<Kind> = AdvisorTable::new();
        let token = table.register(Kind(0), Arc::new(|| true) as Arc<CanWarp>);
        table.unregister(token);

        let mut count = 0;
        table.for_each::<CanWarp>(&Kind(0), |_| count += 1);
        assert_eq!(count, 0);
    }
}
