//! Arena table, state machine, holds, reaping, permanent arenas and
//! population summary (spec.md §4.4, C5).

use flux::logging;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub type ArenaIdRaw = u32;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ArenaId(pub ArenaIdRaw);

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ArenaStatus {
    DoInit0,
    WaitHolds0,
    DoInit1,
    WaitHolds1,
    DoInit2,
    WaitSync1,
    Running,
    Closing,
    DoWriteData,
    WaitSync2,
    DoDestroy1,
    WaitHolds2,
    DoDestroy2,
}

impl ArenaStatus {
    fn is_wait_holds(self) -> bool {
        matches!(self, ArenaStatus::WaitHolds0 | ArenaStatus::WaitHolds1 | ArenaStatus::WaitHolds2)
    }
}

pub struct Arena {
    pub id: ArenaId,
    pub name: String,
    pub base_name: String,
    pub status: ArenaStatus,
    pub spec_freq: u16,
    pub keep_alive: bool,
    pub resurrect: bool,
    pub reap: bool,
    holds: u32,
    playing_count: u32,
    total_count: u32,
    extra: HashMap<u32, std::sync::Arc<dyn Any + Send + Sync>>,
}

impl Arena {
    fn new(id: ArenaId, name: String) -> Self {
        let base_name = base_name_of(&name);
        Arena {
            id,
            name,
            base_name,
            status: ArenaStatus::DoInit0,
            spec_freq: 8025,
            keep_alive: false,
            resurrect: false,
            reap: false,
            holds: 0,
            playing_count: 0,
            total_count: 0,
            extra: HashMap::new(),
        }
    }

    /// Only valid in one of the three `WaitHolds*` states; a decrement to
    /// zero there is the caller's cue to advance the state machine.
    pub fn add_hold(&mut self, log: &logging::Logger) {
        if !self.status.is_wait_holds() {
            logging::warn!(log, "add_hold outside a WaitHolds state, ignored";
                "context" => "add_hold", "arena" => self.name.clone());
            return;
        }
        self.holds += 1;
    }

    /// Returns `true` if this decrement brought the hold counter to zero
    /// while in a `WaitHolds*` state — the caller's cue to advance.
    pub fn remove_hold(&mut self, log: &logging::Logger) -> bool {
        if !self.status.is_wait_holds() {
            logging::warn!(log, "remove_hold outside a WaitHolds state, ignored";
                "context" => "remove_hold", "arena" => self.name.clone());
            return false;
        }
        self.holds = self.holds.saturating_sub(1);
        self.holds == 0
    }

    pub fn holds(&self) -> u32 {
        self.holds
    }

    pub fn extra_data<T, F>(&mut self, slot: u32, default: F) -> std::sync::Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let entry = self
            .extra
            .entry(slot)
            .or_insert_with(|| std::sync::Arc::new(default()) as std::sync::Arc<dyn Any + Send + Sync>);
        entry.clone().downcast::<T>().expect("extra-data slot type mismatch")
    }

    pub fn clear_extra_data(&mut self, slot: u32) {
        self.extra.remove(&slot);
    }

    /// Overwrites (or inserts) an extra-data slot unconditionally, unlike
    /// `extra_data`'s get-or-default.
    pub fn put_extra_data<T: Send + Sync + 'static>(&mut self, slot: u32, value: T) {
        self.extra.insert(slot, std::sync::Arc::new(value));
    }

    /// Clears all per-arena extra-data slots and resets the hold/
    /// population counters. Called when an arena resurrects back into
    /// `DoInit0` so stale module state from its previous incarnation
    /// doesn't leak into the next one (spec.md §4.4).
    fn reinit_for_resurrection(&mut self) {
        self.extra.clear();
        self.playing_count = 0;
        self.total_count = 0;
        self.holds = 0;
    }

    pub fn set_population(&mut self, playing: u32, total: u32) {
        self.playing_count = playing;
        self.total_count = total;
    }

    pub fn population(&self) -> (u32, u32) {
        (self.playing_count, self.total_count)
    }
}

/// Strips trailing ASCII digits from an arena name to find the base name
/// used to select its configuration (spec.md §3).
fn base_name_of(name: &str) -> String {
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.is_empty() {
        name.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Maximum length of a sanitized arena name, in bytes (spec.md §4.4).
const MAX_ARENA_NAME_BYTES: usize = 16;

/// Sanitizes a requested arena name per spec.md §4.4's `CompleteGo` rule:
/// first character must be an ASCII letter/digit (a leading `#` is
/// permitted as the "private arena" marker), remaining non-alphanumeric
/// characters become `x`, the whole thing is lowercased, and the result is
/// truncated to `MAX_ARENA_NAME_BYTES`. An empty result is the caller's
/// cue to fall back (placement advisor, then `"0"`).
pub fn sanitize_arena_name(requested: &str) -> Option<String> {
    if requested.is_empty() {
        return None;
    }

    let mut chars = requested.chars();
    let first = chars.next().unwrap();
    let mut out = String::with_capacity(requested.len().min(MAX_ARENA_NAME_BYTES));

    if first == '#' {
        out.push('#');
    } else if first.is_ascii_alphanumeric() {
        out.push(first.to_ascii_lowercase());
    } else {
        return None;
    }

    for c in chars {
        if out.len() >= MAX_ARENA_NAME_BYTES {
            break;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('x');
        }
    }
    out.truncate(MAX_ARENA_NAME_BYTES);

    if out.is_empty() || out == "#" {
        None
    } else {
        Some(out)
    }
}

/// The half of the arena lifecycle counted as "on the way out"; an arena
/// found here during `CompleteGo` is marked for resurrection instead of
/// being joined directly.
fn is_destroy_half(status: ArenaStatus) -> bool {
    matches!(
        status,
        ArenaStatus::DoWriteData
            | ArenaStatus::WaitSync2
            | ArenaStatus::DoDestroy1
            | ArenaStatus::WaitHolds2
            | ArenaStatus::DoDestroy2
    )
}

pub struct ArenaTable {
    arenas: RwLock<HashMap<ArenaId, Arena>>,
    by_name: RwLock<HashMap<String, ArenaId>>,
    next_id: AtomicU32,
    log: logging::Logger,
}

impl ArenaTable {
    pub fn new(log: &logging::Logger) -> Self {
        ArenaTable {
            arenas: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            log: log.new(logging::o!("component" => "arena_manager")),
        }
    }

    /// Implements spec.md §4.4's `CompleteGo`: find an existing arena in
    /// `[DoInit0..DoDestroy2]` by name, or create a fresh non-permanent one
    /// in `DoInit0`. Marks a found destroy-half arena for resurrection.
    pub fn complete_go(&self, requested: &str) -> ArenaId {
        let name = sanitize_arena_name(requested).unwrap_or_else(|| "0".to_string());

        if let Some(&id) = self.by_name.read().unwrap().get(&name) {
            let mut arenas = self.arenas.write().unwrap();
            let arena = arenas.get_mut(&id).expect("by_name entry without arena row");
            if is_destroy_half(arena.status) {
                arena.resurrect = true;
            }
            return id;
        }

        let id = ArenaId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let arena = Arena::new(id, name.clone());
        self.arenas.write().unwrap().insert(id, arena);
        self.by_name.write().unwrap().insert(name, id);
        logging::debug!(self.log, "arena created"; "context" => "complete_go", "arena" => id.0);
        id
    }

    pub fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ArenaId, Arena>> {
        self.arenas.read().unwrap()
    }

    pub fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ArenaId, Arena>> {
        self.arenas.write().unwrap()
    }

    /// Permanently removes an arena row once `DoDestroy2` decides not to
    /// resurrect it.
    pub fn remove(&self, id: ArenaId) {
        if let Some(arena) = self.arenas.write().unwrap().remove(&id) {
            self.by_name.write().unwrap().remove(&arena.name);
        }
    }

    /// Renames an arena in place (spec.md §4.4's `DoDestroy2` failure
    /// path: detach failure renames to a fresh GUID-like name and keeps
    /// the arena alive rather than risking a second destroy attempt).
    pub fn rename(&self, id: ArenaId, new_name: String) {
        let mut arenas = self.arenas.write().unwrap();
        let mut by_name = self.by_name.write().unwrap();
        if let Some(arena) = arenas.get_mut(&id) {
            by_name.remove(&arena.name);
            by_name.insert(new_name.clone(), id);
            arena.name = new_name;
        }
    }

    /// Creates any `Arenas:PermanentArenas` entries that do not yet exist
    /// as keep-alive arenas, and un-marks keep-alive on any previously
    /// permanent arena no longer listed (spec.md §4.4). The delimiter set
    /// is comma, space, tab, or newline.
    pub fn sync_permanent_arenas(&self, permanent_arenas: &str) {
        let wanted: HashSet<String> = permanent_arenas
            .split([',', ' ', '\t', '\n'])
            .filter(|s| !s.is_empty())
            .filter_map(sanitize_arena_name)
            .collect();

        for name in &wanted {
            if !self.by_name.read().unwrap().contains_key(name) {
                let id = self.complete_go(name);
                self.arenas.write().unwrap().get_mut(&id).unwrap().keep_alive = true;
            } else {
                let id = self.by_name.read().unwrap()[name];
                self.arenas.write().unwrap().get_mut(&id).unwrap().keep_alive = true;
            }
        }

        for (name, &id) in self.by_name.read().unwrap().iter() {
            if !wanted.contains(name) {
                if let Some(arena) = self.arenas.write().unwrap().get_mut(&id) {
                    arena.keep_alive = false;
                }
            }
        }
    }
}

/// Drives the periodic (1.7 s) reaping scan: marks every `Running`/
/// `Closing` arena as a reap candidate, then the caller clears `reap` on
/// any arena that still has a player in it or is someone's `new_arena`.
/// Remaining candidates are handed to the caller to push into
/// `DoWriteData`.
pub fn mark_reap_candidates(table: &ArenaTable) -> Vec<ArenaId> {
    let mut arenas = table.arenas.write().unwrap();
    for arena in arenas.values_mut() {
        arena.reap = matches!(arena.status, ArenaStatus::Running | ArenaStatus::Closing);
    }
    arenas
        .values()
        .filter(|a| a.reap)
        .map(|a| a.id)
        .collect()
}

pub const REAP_INTERVAL: Duration = Duration::from_millis(1700);

/// Splits a `Modules:AttachModules` config value into module names, the
/// same delimiter set `sync_permanent_arenas` uses for arena names
/// (spec.md §4.4).
pub fn parse_attach_modules(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\t', '\n']).filter(|s| !s.is_empty()).map(String::from).collect()
}

/// Reserved `Arena::extra_data` slot recording whether `DoDestroy1`'s
/// module detach fully succeeded, read back by `DoDestroy2`.
const DETACH_FAILED_SLOT: u32 = 0;

/// Collaborators the arena state-machine tick needs but that are out of
/// this crate's scope: config load/unload, module attach/detach,
/// persistence, and broker callback firing (spec.md §4.4, C2/C5).
pub trait ArenaSmCollaborators {
    /// Opens this arena's configuration. `false` sends it straight to
    /// teardown instead of continuing init.
    fn open_config(&self, arena: ArenaId) -> bool;

    /// Releases the configuration opened by `open_config`.
    fn close_config(&self, arena: ArenaId);

    /// Attaches every module named by this arena's `Modules:AttachModules`.
    fn attach_modules(&self, arena: ArenaId);

    /// Detaches every module currently attached to this arena. Returns
    /// `false` if any module failed to detach.
    fn detach_all_modules(&self, arena: ArenaId) -> bool;

    /// Requests this arena's persistent data be loaded. `true` means the
    /// load already completed inline; `false` means the collaborator will
    /// call `arena_sync_done` later.
    fn request_arena_sync_load(&self, arena: ArenaId) -> bool;

    /// Requests this arena's persistent data be saved, same completion
    /// convention as `request_arena_sync_load`.
    fn request_arena_sync_save(&self, arena: ArenaId) -> bool;

    /// Whether any player currently sits in this arena (`arena` or
    /// `new_arena`). `DoWriteData` reverts to `Running` rather than
    /// tearing down out from under a player whose entry landed between
    /// the reap scan and this handler (spec.md §4.4).
    fn arena_has_player(&self, arena: ArenaId) -> bool;

    fn fire_pre_create(&self, arena: ArenaId);
    fn fire_create(&self, arena: ArenaId);
    fn fire_destroy(&self, arena: ArenaId);
    fn fire_post_destroy(&self, arena: ArenaId);
}

/// One tick's pass over every arena's state machine (spec.md §4.4): reads
/// each arena's current status and runs its handler, mirroring
/// `player_sm`'s scan-then-handle shape but without a separate recording
/// pass, since an arena's status change is always driven by this same
/// tick or by an async completion callback (`arena_sync_done`).
pub fn run_arena_tick<C: ArenaSmCollaborators>(collaborators: &C, table: &ArenaTable, log: &logging::Logger) {
    let ids: Vec<ArenaId> = table.read().keys().copied().collect();
    for id in ids {
        let status = match table.read().get(&id) {
            Some(arena) => arena.status,
            None => continue,
        };
        run_arena_handler(collaborators, table, id, status, log);
    }
}

fn run_arena_handler<C: ArenaSmCollaborators>(
    collaborators: &C,
    table: &ArenaTable,
    id: ArenaId,
    status: ArenaStatus,
    log: &logging::Logger,
) {
    match status {
        ArenaStatus::DoInit0 => handle_do_init0(collaborators, table, id, log),
        ArenaStatus::WaitHolds0 => advance_if_holds_zero(table, id, ArenaStatus::DoInit1),
        ArenaStatus::DoInit1 => handle_do_init1(collaborators, table, id),
        ArenaStatus::WaitHolds1 => advance_if_holds_zero(table, id, ArenaStatus::DoInit2),
        ArenaStatus::DoInit2 => handle_do_init2(collaborators, table, id, log),
        ArenaStatus::DoWriteData => handle_do_write_data(collaborators, table, id, log),
        ArenaStatus::DoDestroy1 => handle_do_destroy1(collaborators, table, id),
        ArenaStatus::WaitHolds2 => advance_if_holds_zero(table, id, ArenaStatus::DoDestroy2),
        ArenaStatus::DoDestroy2 => handle_do_destroy2(collaborators, table, id, log),
        _ => {}
    }
}

fn handle_do_init0<C: ArenaSmCollaborators>(collaborators: &C, table: &ArenaTable, id: ArenaId, log: &logging::Logger) {
    if !collaborators.open_config(id) {
        logging::warn!(log, "arena config open failed, tearing down"; "context" => "handle_do_init0", "arena" => id.0);
        let mut arenas = table.write();
        if let Some(a) = arenas.get_mut(&id) {
            a.status = ArenaStatus::DoDestroy1;
        }
        return;
    }
    collaborators.fire_pre_create(id);
    let mut arenas = table.write();
    if let Some(a) = arenas.get_mut(&id) {
        a.status = ArenaStatus::WaitHolds0;
    }
}

fn handle_do_init1<C: ArenaSmCollaborators>(collaborators: &C, table: &ArenaTable, id: ArenaId) {
    collaborators.attach_modules(id);
    collaborators.fire_create(id);
    let mut arenas = table.write();
    if let Some(a) = arenas.get_mut(&id) {
        a.status = ArenaStatus::WaitHolds1;
    }
}

fn handle_do_init2<C: ArenaSmCollaborators>(collaborators: &C, table: &ArenaTable, id: ArenaId, log: &logging::Logger) {
    {
        let mut arenas = table.write();
        if let Some(a) = arenas.get_mut(&id) {
            a.status = ArenaStatus::WaitSync1;
        }
    }
    if collaborators.request_arena_sync_load(id) {
        arena_sync_done(table, id, log);
    }
}

fn advance_if_holds_zero(table: &ArenaTable, id: ArenaId, next: ArenaStatus) {
    let mut arenas = table.write();
    if let Some(a) = arenas.get_mut(&id) {
        if a.holds() == 0 {
            a.status = next;
        }
    }
}

fn handle_do_write_data<C: ArenaSmCollaborators>(collaborators: &C, table: &ArenaTable, id: ArenaId, log: &logging::Logger) {
    if collaborators.arena_has_player(id) {
        let mut arenas = table.write();
        if let Some(a) = arenas.get_mut(&id) {
            a.status = ArenaStatus::Running;
        }
        return;
    }

    {
        let mut arenas = table.write();
        if let Some(a) = arenas.get_mut(&id) {
            a.status = ArenaStatus::WaitSync2;
        }
    }
    if collaborators.request_arena_sync_save(id) {
        arena_sync_done(table, id, log);
    }
}

fn handle_do_destroy1<C: ArenaSmCollaborators>(collaborators: &C, table: &ArenaTable, id: ArenaId) {
    collaborators.fire_destroy(id);
    let all_detached = collaborators.detach_all_modules(id);
    let mut arenas = table.write();
    if let Some(a) = arenas.get_mut(&id) {
        a.put_extra_data(DETACH_FAILED_SLOT, !all_detached);
        a.status = ArenaStatus::WaitHolds2;
    }
}

/// `DoDestroy2`: a module that failed to detach means the arena can't be
/// safely torn down, so it is renamed to a fresh GUID-like name and left
/// running rather than retried (spec.md §4.4). Otherwise it fires
/// `PostDestroy`, closes its config, and either resurrects back into
/// `DoInit0` (`resurrect` or `keep_alive`) or is removed from the table.
fn handle_do_destroy2<C: ArenaSmCollaborators>(collaborators: &C, table: &ArenaTable, id: ArenaId, log: &logging::Logger) {
    let detach_failed = {
        let mut arenas = table.write();
        let Some(a) = arenas.get_mut(&id) else { return };
        let failed = *a.extra_data(DETACH_FAILED_SLOT, || false);
        a.clear_extra_data(DETACH_FAILED_SLOT);
        failed
    };

    if detach_failed {
        let fresh_name = {
            let arenas = table.read();
            let base = arenas.get(&id).map(|a| a.base_name.clone()).unwrap_or_default();
            format!("{base}~{}", id.0)
        };
        table.rename(id, fresh_name);
        logging::error!(log, "arena module detach failed during destroy, renamed and kept alive";
            "context" => "handle_do_destroy2", "arena" => id.0);
        let mut arenas = table.write();
        if let Some(a) = arenas.get_mut(&id) {
            a.status = ArenaStatus::Running;
        }
        return;
    }

    collaborators.fire_post_destroy(id);
    collaborators.close_config(id);

    let resurrect = table.read().get(&id).map(|a| a.resurrect || a.keep_alive).unwrap_or(false);
    if resurrect {
        let mut arenas = table.write();
        if let Some(a) = arenas.get_mut(&id) {
            a.resurrect = false;
            a.reinit_for_resurrection();
            a.status = ArenaStatus::DoInit0;
        }
    } else {
        table.remove(id);
    }
}

/// Called by the persistence collaborator when an arena load/save
/// completes (mirrors `player_sm::sync_done`). Advances `WaitSync1` into
/// `Running` and `WaitSync2` into `DoDestroy1`.
pub fn arena_sync_done(table: &ArenaTable, id: ArenaId, log: &logging::Logger) {
    let mut arenas = table.write();
    let Some(a) = arenas.get_mut(&id) else {
        logging::warn!(log, "arena_sync_done for unknown arena"; "context" => "arena_sync_done", "arena" => id.0);
        return;
    };
    a.status = match a.status {
        ArenaStatus::WaitSync1 => ArenaStatus::Running,
        ArenaStatus::WaitSync2 => ArenaStatus::DoDestroy1,
        other => other,
    };
}

/// Moves every listed arena from `Running`/`Closing` into `DoWriteData`,
/// starting the teardown half of the lifecycle (spec.md §4.4). The
/// caller (the reap timer) is expected to have already dropped any
/// candidate that still has a player in it or is someone's `new_arena`.
pub fn begin_destroy(table: &ArenaTable, ids: &[ArenaId]) {
    let mut arenas = table.write();
    for id in ids {
        if let Some(a) = arenas.get_mut(id) {
            if matches!(a.status, ArenaStatus::Running | ArenaStatus::Closing) {
                a.status = ArenaStatus::DoWriteData;
            }
        }
    }
}

/// Delivers the single packet `recycle_arena` sends, to each real player
/// it evicts (spec.md §4.4). Kept minimal rather than reusing
/// `entry::EntryResponseSink`, since recycle only ever sends one packet
/// kind and has no chat-line or map-filename concerns.
pub trait RecycleSink {
    fn send_who_am_i(&self, player: super::player::PlayerId, player_id_on_wire: u16);
}

/// Implements spec.md §4.4's `recycle_arena`: valid only in `Running`,
/// fails if any fake player is present. Sends each real player a "who am
/// I" packet so its client leaves, reinitiates that player's leave
/// locally (the same `Playing -> LeavingArena` step `player_sm::kick`
/// takes, but without deferring to `LeavingZone` — these players are
/// coming back), marks `new_arena` as this arena, and moves the arena to
/// `Closing` with the resurrect flag set.
pub fn recycle_arena(table: &ArenaTable, players: &super::player::PlayerTable, id: ArenaId, sink: &dyn RecycleSink) -> bool {
    use super::player::{ClientKind, PlayerStatus};

    {
        let arenas = table.read();
        match arenas.get(&id) {
            Some(a) if a.status == ArenaStatus::Running => {}
            _ => return false,
        }
    }

    let in_arena: Vec<super::player::PlayerId> =
        players.read().iter().filter(|(_, p)| p.arena == Some(id)).map(|(pid, _)| *pid).collect();
    let has_fake = players.read().iter().any(|(_, p)| p.arena == Some(id) && p.client_kind == ClientKind::Fake);
    if has_fake {
        return false;
    }

    {
        let mut guard = players.write();
        for pid in &in_arena {
            if let Some(p) = guard.get_mut(pid) {
                sink.send_who_am_i(*pid, *pid as u16);
                if p.status == PlayerStatus::Playing {
                    p.status = PlayerStatus::LeavingArena;
                }
                p.new_arena = Some(id);
            }
        }
    }

    let mut arenas = table.write();
    if let Some(a) = arenas.get_mut(&id) {
        a.resurrect = true;
        a.status = ArenaStatus::Closing;
    }
    true
}

/// Cached population counts, refreshed at most once per second (spec.md
/// §4.4).
pub struct PopulationCache {
    last_refresh: RwLock<Option<Instant>>,
}

impl Default for PopulationCache {
    fn default() -> Self {
        PopulationCache { last_refresh: RwLock::new(None) }
    }
}

impl PopulationCache {
    pub fn needs_refresh(&self) -> bool {
        match *self.last_refresh.read().unwrap() {
            None => true,
            Some(last) => last.elapsed() >= Duration::from_secs(1),
        }
    }

    pub fn mark_refreshed(&self) {
        *self.last_refresh.write().unwrap() = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_replaces_non_alnum() {
        assert_eq!(sanitize_arena_name("Foo Bar!").as_deref(), Some("fooxbarx"));
        assert_eq!(sanitize_arena_name("#private").as_deref(), Some("#private"));
        assert_eq!(sanitize_arena_name("").as_deref(), None);
        assert_eq!(sanitize_arena_name("!").as_deref(), None);
    }

    #[test]
    fn sanitize_truncates_to_sixteen_bytes() {
        let sanitized = sanitize_arena_name("abcdefghijklmnopqrstuvwxyz").unwrap();
        assert_eq!(sanitized.len(), MAX_ARENA_NAME_BYTES);
        assert_eq!(sanitized, "abcdefghijklmnop");
    }

    #[test]
    fn base_name_strips_trailing_digits() {
        assert_eq!(base_name_of("duel42"), "duel");
        assert_eq!(base_name_of("42"), "42");
    }

    #[test]
    fn complete_go_creates_then_reuses_by_name() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);

        let a = table.complete_go("Duel");
        let b = table.complete_go("duel");
        assert_eq!(a, b);
        assert_eq!(table.read().len(), 1);
    }

    #[test]
    fn complete_go_marks_destroy_half_arena_for_resurrection() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().status = ArenaStatus::DoDestroy1;

        table.complete_go("duel");
        assert!(table.read().get(&id).unwrap().resurrect);
    }

    #[test]
    fn holds_only_change_in_wait_holds_states() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let mut arena = Arena::new(ArenaId(1), "duel".to_string());

        arena.add_hold(&log);
        assert_eq!(arena.holds(), 0);

        arena.status = ArenaStatus::WaitHolds0;
        arena.add_hold(&log);
        assert_eq!(arena.holds(), 1);
        assert!(arena.remove_hold(&log));
        assert_eq!(arena.holds(), 0);
    }

    #[test]
    fn sync_permanent_arenas_toggles_keep_alive() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);

        table.sync_permanent_arenas("duel, flag");
        let duel = table.by_name.read().unwrap()["duel"];
        assert!(table.read().get(&duel).unwrap().keep_alive);

        table.sync_permanent_arenas("flag");
        assert!(!table.read().get(&duel).unwrap().keep_alive);
    }

    #[test]
    fn parse_attach_modules_splits_on_delimiters() {
        assert_eq!(parse_attach_modules("flaggame, chat\tauth"), vec!["flaggame", "chat", "auth"]);
    }

    #[derive(Default)]
    struct RecordingArenaCollab {
        config_open: std::sync::atomic::AtomicBool,
        detach_ok: std::sync::atomic::AtomicBool,
        sync_inline: std::sync::atomic::AtomicBool,
        has_player: std::sync::atomic::AtomicBool,
        events: std::sync::Mutex<Vec<&'static str>>,
    }

    impl ArenaSmCollaborators for RecordingArenaCollab {
        fn open_config(&self, _arena: ArenaId) -> bool {
            self.events.lock().unwrap().push("open_config");
            self.config_open.load(Ordering::SeqCst)
        }
        fn close_config(&self, _arena: ArenaId) {
            self.events.lock().unwrap().push("close_config");
        }
        fn attach_modules(&self, _arena: ArenaId) {
            self.events.lock().unwrap().push("attach_modules");
        }
        fn detach_all_modules(&self, _arena: ArenaId) -> bool {
            self.events.lock().unwrap().push("detach_all_modules");
            self.detach_ok.load(Ordering::SeqCst)
        }
        fn request_arena_sync_load(&self, _arena: ArenaId) -> bool {
            self.events.lock().unwrap().push("request_arena_sync_load");
            self.sync_inline.load(Ordering::SeqCst)
        }
        fn request_arena_sync_save(&self, _arena: ArenaId) -> bool {
            self.events.lock().unwrap().push("request_arena_sync_save");
            self.sync_inline.load(Ordering::SeqCst)
        }
        fn arena_has_player(&self, _arena: ArenaId) -> bool {
            self.has_player.load(Ordering::SeqCst)
        }
        fn fire_pre_create(&self, _arena: ArenaId) {
            self.events.lock().unwrap().push("fire_pre_create");
        }
        fn fire_create(&self, _arena: ArenaId) {
            self.events.lock().unwrap().push("fire_create");
        }
        fn fire_destroy(&self, _arena: ArenaId) {
            self.events.lock().unwrap().push("fire_destroy");
        }
        fn fire_post_destroy(&self, _arena: ArenaId) {
            self.events.lock().unwrap().push("fire_post_destroy");
        }
    }

    #[test]
    fn arena_tick_drives_init_chain_to_running() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        let collab = RecordingArenaCollab::default();
        collab.config_open.store(true, Ordering::SeqCst);
        collab.sync_inline.store(true, Ordering::SeqCst);

        run_arena_tick(&collab, &table, &log); // DoInit0 -> WaitHolds0
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::WaitHolds0);

        run_arena_tick(&collab, &table, &log); // holds already zero -> DoInit1
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::DoInit1);

        run_arena_tick(&collab, &table, &log); // DoInit1 -> WaitHolds1
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::WaitHolds1);

        run_arena_tick(&collab, &table, &log); // -> DoInit2
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::DoInit2);

        run_arena_tick(&collab, &table, &log); // sync load completes inline -> Running
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::Running);

        let events = collab.events.lock().unwrap();
        assert!(events.contains(&"open_config"));
        assert!(events.contains(&"fire_pre_create"));
        assert!(events.contains(&"attach_modules"));
        assert!(events.contains(&"fire_create"));
        assert!(events.contains(&"request_arena_sync_load"));
    }

    #[test]
    fn arena_tick_init0_failure_routes_to_destroy() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        let collab = RecordingArenaCollab::default(); // config_open stays false

        run_arena_tick(&collab, &table, &log);
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::DoDestroy1);
    }

    #[test]
    fn destroy_cycle_resurrects_a_keep_alive_arena() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().keep_alive = true;
        table.write().get_mut(&id).unwrap().status = ArenaStatus::DoDestroy1;

        let collab = RecordingArenaCollab::default();
        collab.detach_ok.store(true, Ordering::SeqCst);

        run_arena_tick(&collab, &table, &log); // DoDestroy1 -> WaitHolds2
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::WaitHolds2);

        run_arena_tick(&collab, &table, &log); // holds zero -> DoDestroy2
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::DoDestroy2);

        run_arena_tick(&collab, &table, &log); // resurrects
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::DoInit0);
        assert!(collab.events.lock().unwrap().contains(&"fire_post_destroy"));
    }

    #[test]
    fn destroy_cycle_removes_a_non_permanent_arena() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().status = ArenaStatus::DoDestroy2;
        table.write().get_mut(&id).unwrap().put_extra_data(DETACH_FAILED_SLOT, false);

        let collab = RecordingArenaCollab::default();
        run_arena_tick(&collab, &table, &log);
        assert!(table.read().get(&id).is_none());
    }

    #[test]
    fn destroy_cycle_renames_and_survives_detach_failure() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().status = ArenaStatus::DoDestroy1;

        let collab = RecordingArenaCollab::default();
        collab.detach_ok.store(false, Ordering::SeqCst);

        run_arena_tick(&collab, &table, &log); // -> WaitHolds2
        run_arena_tick(&collab, &table, &log); // holds zero -> DoDestroy2
        run_arena_tick(&collab, &table, &log); // detach had failed -> renamed, Running

        let arenas = table.read();
        let arena = arenas.get(&id).unwrap();
        assert_eq!(arena.status, ArenaStatus::Running);
        assert_ne!(arena.name, "duel");
        assert!(arena.name.starts_with("duel~"));
    }

    #[test]
    fn arena_sync_done_advances_both_wait_sync_states() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");

        table.write().get_mut(&id).unwrap().status = ArenaStatus::WaitSync1;
        arena_sync_done(&table, id, &log);
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::Running);

        table.write().get_mut(&id).unwrap().status = ArenaStatus::WaitSync2;
        arena_sync_done(&table, id, &log);
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::DoDestroy1);
    }

    #[test]
    fn begin_destroy_moves_running_arenas_into_write_data() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().status = ArenaStatus::Running;

        begin_destroy(&table, &[id]);
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::DoWriteData);
    }

    #[test]
    fn do_write_data_reverts_to_running_if_a_player_landed() {
        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().status = ArenaStatus::DoWriteData;

        let collab = RecordingArenaCollab::default();
        collab.has_player.store(true, Ordering::SeqCst);

        run_arena_tick(&collab, &table, &log);

        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::Running);
        assert!(!collab.events.lock().unwrap().contains(&"request_arena_sync_save"));
    }

    #[derive(Default)]
    struct RecordingRecycleSink {
        who_am_i: std::sync::Mutex<Vec<(super::super::player::PlayerId, u16)>>,
    }

    impl RecycleSink for RecordingRecycleSink {
        fn send_who_am_i(&self, player: super::super::player::PlayerId, player_id_on_wire: u16) {
            self.who_am_i.lock().unwrap().push((player, player_id_on_wire));
        }
    }

    #[test]
    fn recycle_arena_evicts_players_locally_and_closes() {
        use super::super::player::{ClientKind, PlayerStatus, PlayerTable};

        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().status = ArenaStatus::Running;

        let players = PlayerTable::new();
        let a = players.create(ClientKind::Standard);
        let b = players.create(ClientKind::Standard);
        for pid in [a, b] {
            let mut guard = players.write();
            let p = guard.get_mut(&pid).unwrap();
            p.arena = Some(id);
            p.status = PlayerStatus::Playing;
        }

        let sink = RecordingRecycleSink::default();
        assert!(recycle_arena(&table, &players, id, &sink));

        let arenas = table.read();
        let arena = arenas.get(&id).unwrap();
        assert!(arena.resurrect);
        assert_eq!(arena.status, ArenaStatus::Closing);

        let guard = players.read();
        for pid in [a, b] {
            let p = guard.get(&pid).unwrap();
            assert_eq!(p.status, PlayerStatus::LeavingArena);
            assert_eq!(p.new_arena, Some(id));
        }
        assert_eq!(sink.who_am_i.lock().unwrap().len(), 2);
    }

    #[test]
    fn recycle_arena_fails_with_a_fake_player_present() {
        use super::super::player::{ClientKind, PlayerStatus, PlayerTable};

        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        table.write().get_mut(&id).unwrap().status = ArenaStatus::Running;

        let players = PlayerTable::new();
        let fake = players.create(ClientKind::Fake);
        {
            let mut guard = players.write();
            let p = guard.get_mut(&fake).unwrap();
            p.arena = Some(id);
            p.status = PlayerStatus::Playing;
        }

        let sink = RecordingRecycleSink::default();
        assert!(!recycle_arena(&table, &players, id, &sink));
        assert_eq!(table.read().get(&id).unwrap().status, ArenaStatus::Running);
        assert!(sink.who_am_i.lock().unwrap().is_empty());
    }

    #[test]
    fn recycle_arena_fails_outside_running() {
        use super::super::player::PlayerTable;

        let log = logging::Logger::root(slog::Discard, logging::o!());
        let table = ArenaTable::new(&log);
        let id = table.complete_go("duel");
        let players = PlayerTable::new();

        let sink = RecordingRecycleSink::default();
        assert!(!recycle_arena(&table, &players, id, &sink));
    }
}
