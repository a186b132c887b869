use crate::advisor::AdvisorTable;
use crate::callback::CallbackTable;
use crate::interface::InterfaceTable;

/// One level of the broker hierarchy: the process-global scope, or one
/// arena's scope. Bundles the three registries spec.md §4.1 requires per
/// scope.
pub(crate) struct Scope<K: Eq + std::hash::Hash + Clone> {
    pub(crate) interfaces: InterfaceTable<K>,
    pub(crate) callbacks: CallbackTable<K>,
    pub(crate) advisors: AdvisorTable<K>,
}

impl<K: Eq + std::hash::Hash + Clone> Scope<K> {
    pub(crate) fn new() -> Self {
        Scope {
            interfaces: InterfaceTable::new(),
            callbacks: CallbackTable::new(),
            advisors: AdvisorTable::new(),
        }
    }

    /// True once every kind registered in this scope has been fully
    /// unregistered; arena teardown should not proceed otherwise.
    pub(crate) fn is_empty(&self) -> bool {
        !self.interfaces.has_any() && !self.callbacks.has_any() && !self.advisors.has_any()
    }
}
