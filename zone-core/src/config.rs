//! Configuration handle abstraction (spec.md §3): opaque, read by section
//! and key, with per-arena handles falling back arena-specific ->
//! base-name -> global, and a change-notification observer list. The
//! config *store*'s own file format/watcher is an external collaborator
//! per spec.md §1; this module specifies the trait it is consumed through
//! and ships an in-memory/TOML-file-backed implementation good enough to
//! run standalone.

use flux::logging;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Default, Clone)]
struct Document {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Document {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(|s| s.as_str())
    }
}

fn load_document(path: &Path) -> Result<Document, serdeconv::Error> {
    let raw: HashMap<String, HashMap<String, String>> = serdeconv::from_toml_file(path)?;
    Ok(Document { sections: raw })
}

/// Read by section and key; an implementation decides its own fallback
/// policy (spec.md §3's "per-arena handles fall back through a hierarchy").
pub trait ConfigHandle: Send + Sync {
    fn get_str(&self, section: &str, key: &str) -> Option<String>;

    fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.get_str(section, key)?.trim().parse().ok()
    }

    fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get_str(section, key)?.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Splits a delimited-list value (`,`, space, tab, newline) per
    /// `Arenas:PermanentArenas`'s convention (spec.md §4.4).
    fn get_list(&self, section: &str, key: &str) -> Vec<String> {
        self.get_str(section, key)
            .map(|raw| raw.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default()
    }

    /// Registers `observer` to run on the next `ConfigStore::notify_all`
    /// (spec.md §3's "emits a change notification").
    fn subscribe(&self, observer: Arc<dyn Fn() + Send + Sync>);
}

/// In-memory/TOML-file-backed config store: one global document, any
/// number of base-name documents, any number of arena-specific documents.
pub struct ConfigStore {
    global: RwLock<Document>,
    bases: RwLock<HashMap<String, Document>>,
    arenas: RwLock<HashMap<String, Document>>,
    observers: RwLock<Vec<Arc<dyn Fn() + Send + Sync>>>,
    log: logging::Logger,
}

impl ConfigStore {
    pub fn new(log: &logging::Logger) -> Self {
        ConfigStore {
            global: RwLock::new(Document::default()),
            bases: RwLock::new(HashMap::new()),
            arenas: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            log: log.new(logging::o!("component" => "config_store")),
        }
    }

    pub fn load_global<P: AsRef<Path>>(&self, path: P) {
        match load_document(path.as_ref()) {
            Ok(doc) => *self.global.write().unwrap() = doc,
            Err(err) => {
                logging::warn!(self.log, "failed to load global config"; "context" => "load_global", "error" => err.to_string())
            }
        }
    }

    /// Loads `base_name`'s own config section, if the deployment keeps one
    /// (e.g. `arenas/<base_name>.conf`). Missing files are routine — a
    /// base name with no dedicated config just falls through to global.
    pub fn load_base<P: AsRef<Path>>(&self, base_name: &str, path: P) {
        match load_document(path.as_ref()) {
            Ok(doc) => {
                self.bases.write().unwrap().insert(base_name.to_string(), doc);
            }
            Err(err) => logging::debug!(self.log, "no base-name config, falling back to global";
                "context" => "load_base", "base_name" => base_name.to_string(), "error" => err.to_string()),
        }
    }

    pub fn load_arena<P: AsRef<Path>>(&self, arena_name: &str, path: P) {
        match load_document(path.as_ref()) {
            Ok(doc) => {
                self.arenas.write().unwrap().insert(arena_name.to_string(), doc);
            }
            Err(err) => logging::debug!(self.log, "no arena-specific config, falling back";
                "context" => "load_arena", "arena" => arena_name.to_string(), "error" => err.to_string()),
        }
    }

    pub fn unload_arena(&self, arena_name: &str) {
        self.arenas.write().unwrap().remove(arena_name);
    }

    /// Returns a handle resolving `arena_name`/`base_name` through the
    /// fallback hierarchy, sharing this store's subscriber list.
    pub fn handle_for(self: &Arc<Self>, arena_name: impl Into<String>, base_name: impl Into<String>) -> ArenaConfigHandle {
        ArenaConfigHandle { store: self.clone(), arena_name: arena_name.into(), base_name: base_name.into() }
    }

    pub fn global_handle(self: &Arc<Self>) -> GlobalConfigHandle {
        GlobalConfigHandle { store: self.clone() }
    }

    /// Runs every subscribed observer once. Called by whatever drives
    /// reloads externally (a file watcher, a `reconfigure` admin command);
    /// this store has no opinion on when that should happen.
    pub fn notify_all(&self) {
        for observer in self.observers.read().unwrap().iter() {
            observer();
        }
    }
}

/// Falls back arena-specific -> base-name -> global, per spec.md §3.
pub struct ArenaConfigHandle {
    store: Arc<ConfigStore>,
    arena_name: String,
    base_name: String,
}

impl ConfigHandle for ArenaConfigHandle {
    fn get_str(&self, section: &str, key: &str) -> Option<String> {
        if let Some(doc) = self.store.arenas.read().unwrap().get(&self.arena_name) {
            if let Some(value) = doc.get(section, key) {
                return Some(value.to_string());
            }
        }
        if let Some(doc) = self.store.bases.read().unwrap().get(&self.base_name) {
            if let Some(value) = doc.get(section, key) {
                return Some(value.to_string());
            }
        }
        self.store.global.read().unwrap().get(section, key).map(String::from)
    }

    fn subscribe(&self, observer: Arc<dyn Fn() + Send + Sync>) {
        self.store.observers.write().unwrap().push(observer);
    }
}

/// The process-wide global document only, no fallback needed.
pub struct GlobalConfigHandle {
    store: Arc<ConfigStore>,
}

impl ConfigHandle for GlobalConfigHandle {
    fn get_str(&self, section: &str, key: &str) -> Option<String> {
        self.store.global.read().unwrap().get(section, key).map(String::from)
    }

    fn subscribe(&self, observer: Arc<dyn Fn() + Send + Sync>) {
        self.store.observers.write().unwrap().push(observer);
    }
}
