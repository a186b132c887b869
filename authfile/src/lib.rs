//! Reference `IAuth` implementation (spec.md §4.9, C9): a salted hash of
//! `(lowercased name, password)` matched against a local `passwd.conf`-
//! style file, plus the `passwd`/`addallowed`/`set_local_password` local
//! commands spec.md §6 lists under the CLI surface.

use flux::hashing::{self, HashAlgorithm, HashEncoding};
use flux::logging;
use flux::wire::Deserialize;
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use zone_core::auth::{AuthCode, AuthRequest, AuthResult, IAuth};
use zone_core::protocol::control::LoginPacket;

const LOCK_USER: &str = "lock";
const ANY_USER: &str = "any";

/// `passwd.conf -> General:{HashAlgorithm,HashEncoding,AllowUnknown,
/// RequireAuthenticationToSetPassword}` (spec.md §6).
#[derive(Clone, SerdeSerialize, SerdeDeserialize)]
pub struct AuthFileSettings {
    pub hash_algorithm: HashAlgorithm,
    pub hash_encoding: HashEncoding,
    pub allow_unknown: bool,
    pub require_authentication_to_set_password: bool,
}

impl Default for AuthFileSettings {
    fn default() -> Self {
        AuthFileSettings {
            hash_algorithm: HashAlgorithm::Md5,
            hash_encoding: HashEncoding::Hex,
            allow_unknown: true,
            require_authentication_to_set_password: false,
        }
    }
}

#[derive(Default, SerdeSerialize, SerdeDeserialize)]
struct UserRecords {
    users: HashMap<String, String>,
}

/// The `users:<name>` table itself (spec.md §6): one stored string per
/// name, either a literal `lock`/`any` or a computed hash.
pub struct PasswdFile {
    path: PathBuf,
    settings: AuthFileSettings,
    records: RwLock<UserRecords>,
    log: logging::Logger,
}

impl PasswdFile {
    pub fn load<P: AsRef<Path>>(path: P, settings: AuthFileSettings, log: &logging::Logger) -> Self {
        let records = serdeconv::from_toml_file(path.as_ref()).unwrap_or_default();
        PasswdFile {
            path: path.as_ref().to_path_buf(),
            settings,
            records: RwLock::new(records),
            log: log.new(logging::o!("component" => "authfile")),
        }
    }

    fn save(&self) {
        let records = self.records.read().unwrap();
        if let Err(err) = serdeconv::to_toml_file(&*records, &self.path) {
            logging::error!(self.log, "failed to persist passwd file"; "context" => "save", "error" => err.to_string());
        }
    }

    /// `passwd` local command: sets `name`'s stored hash to that of
    /// `new_password`. Refuses when the deployment requires the calling
    /// session to already be authenticated and it is not.
    pub fn passwd(&self, name: &str, new_password: &str, caller_authenticated: bool) -> bool {
        if self.settings.require_authentication_to_set_password && !caller_authenticated {
            return false;
        }
        let sanitized = sanitize_name(name);
        let hash = hashing::derive(&sanitized, new_password, self.settings.hash_algorithm, self.settings.hash_encoding);
        self.records.write().unwrap().users.insert(sanitized, hash);
        self.save();
        true
    }

    /// `addallowed` local command: grants `name` passwordless entry.
    pub fn addallowed(&self, name: &str) {
        let sanitized = sanitize_name(name);
        self.records.write().unwrap().users.insert(sanitized, ANY_USER.to_string());
        self.save();
    }

    /// `set_local_password` local command: copies the calling session's
    /// already-computed hash to `target`, only if `target` has no stored
    /// entry yet (spec.md §4.9).
    pub fn set_local_password(&self, target: &str, session_hash: &str) -> bool {
        let sanitized = sanitize_name(target);
        let mut records = self.records.write().unwrap();
        if records.users.contains_key(&sanitized) {
            return false;
        }
        records.users.insert(sanitized, session_hash.to_string());
        drop(records);
        self.save();
        true
    }

    fn lookup(&self, name: &str, password: &str) -> AuthResult {
        let sanitized = sanitize_name(name);
        let stored = self.records.read().unwrap().users.get(&sanitized).cloned();

        match stored.as_deref() {
            Some(LOCK_USER) => AuthResult::denied(AuthCode::NoPermission, sanitized),
            Some(ANY_USER) => AuthResult::ok(sanitized),
            Some(stored_hash) => {
                let computed =
                    hashing::derive(&sanitized, password, self.settings.hash_algorithm, self.settings.hash_encoding);
                if computed == stored_hash {
                    AuthResult::ok(sanitized)
                } else {
                    AuthResult::denied(AuthCode::BadPassword, sanitized)
                }
            }
            None if self.settings.allow_unknown => AuthResult::ok(sanitized),
            None => AuthResult::denied(AuthCode::NoPermission, sanitized),
        }
    }
}

/// Lowercases the name for the `users:<name>` lookup (spec.md §4.9); the
/// display-name sanitization the rest of the login pipeline applies is
/// C6's concern, not this adapter's.
fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
}

/// Registered as the broker's top-of-stack `IAuth` implementation. The
/// `AuthRequest`'s raw bytes are the wire-format `Login` packet; this
/// adapter deserializes it itself rather than asking the caller to have
/// pre-parsed name/password, so the contract at the broker boundary stays
/// exactly the "raw login bytes" spec.md §3 describes.
pub struct FileAuth {
    file: Arc<PasswdFile>,
}

impl FileAuth {
    pub fn new(file: Arc<PasswdFile>) -> Self {
        FileAuth { file }
    }
}

impl IAuth for FileAuth {
    fn authenticate(&self, request: Arc<AuthRequest>) {
        let mut cursor = Cursor::new(request.raw());
        let login = match LoginPacket::deserialize(&mut cursor) {
            Ok(login) => login,
            Err(_) => {
                request.done(AuthResult::denied(AuthCode::NoPermission, ""));
                return;
            }
        };
        request.done(self.file.lookup(&login.name, &login.password));
    }
}

/// The always-present lowest-priority fallback (spec.md §4.9/§9): "a
/// default provider also exists that authenticates everyone as
/// unauthenticated". Re-exported under this crate's name so a deployment
/// that wires `authfile` in doesn't also need to depend on `zone-core`
/// just to register the default.
pub type NullAuth = zone_core::auth::UnauthenticatedAuth;

#[cfg(test)]
mod tests {
    use super::*;
    use zone_core::player::ClientKind;
    use zone_core::protocol::types::C2S_LOGIN;

    fn logger() -> logging::Logger {
        logging::Logger::root(slog::Discard, logging::o!())
    }

    fn temp_passwd_path() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("authfile-test-{}.toml", std::process::id()));
        path
    }

    fn login_request(name: &str, password: &str, player: u32, on_done: impl FnOnce(AuthResult) + Send + 'static) -> Arc<AuthRequest> {
        let mut raw = vec![0u8; 1 + 32 + 32 + 4];
        raw[0] = C2S_LOGIN;
        let name_bytes = name.as_bytes();
        raw[1..1 + name_bytes.len()].copy_from_slice(name_bytes);
        let pass_bytes = password.as_bytes();
        raw[33..33 + pass_bytes.len()].copy_from_slice(pass_bytes);
        Arc::new(AuthRequest::new(player, raw, on_done).unwrap())
    }

    #[test]
    fn hash_round_trip_matches_worked_example() {
        let path = temp_passwd_path();
        let log = logger();
        let settings = AuthFileSettings::default();
        let expected = hashing::derive("alice", "secret", settings.hash_algorithm, settings.hash_encoding);

        let passwd = PasswdFile::load(&path, settings, &log);
        passwd.passwd("Alice", "secret", true);

        assert_eq!(passwd.records.read().unwrap().users.get("alice"), Some(&expected));

        let result = passwd.lookup("alice", "secret");
        assert!(result.authenticated);
        assert_eq!(result.code, AuthCode::Ok);

        assert_eq!(passwd.lookup("alice", "wrong").code, AuthCode::BadPassword);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_name_is_allowed_or_denied_per_setting() {
        let path = temp_passwd_path();
        let log = logger();

        let mut settings = AuthFileSettings::default();
        settings.allow_unknown = false;
        let passwd = PasswdFile::load(&path, settings, &log);
        assert_eq!(passwd.lookup("nobody", "x").code, AuthCode::NoPermission);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn locked_name_denies_regardless_of_password() {
        let path = temp_passwd_path();
        let log = logger();
        let passwd = PasswdFile::load(&path, AuthFileSettings::default(), &log);
        passwd.records.write().unwrap().users.insert("bob".to_string(), LOCK_USER.to_string());

        let result = passwd.lookup("bob", "anything");
        assert_eq!(result.code, AuthCode::NoPermission);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn any_name_authenticates_without_checking_password() {
        let path = temp_passwd_path();
        let log = logger();
        let passwd = PasswdFile::load(&path, AuthFileSettings::default(), &log);
        passwd.addallowed("carl");

        let result = passwd.lookup("Carl", "whatever");
        assert_eq!(result.code, AuthCode::Ok);
        assert!(result.authenticated);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn file_auth_dispatches_through_login_packet_bytes() {
        let path = temp_passwd_path();
        let log = logger();
        let settings = AuthFileSettings::default();
        let passwd = Arc::new(PasswdFile::load(&path, settings, &log));
        passwd.passwd("ace", "hunter2", true);

        let adapter = FileAuth::new(passwd);
        let table = zone_core::player::PlayerTable::new();
        let player = table.create(ClientKind::Standard);

        let seen = Arc::new(std::sync::Mutex::new(None));
        let slot = seen.clone();
        let request = login_request("ace", "hunter2", player, move |result| *slot.lock().unwrap() = Some(result));

        adapter.authenticate(request);

        let result = seen.lock().unwrap().take().unwrap();
        assert!(result.authenticated);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn set_local_password_refuses_once_target_has_a_record() {
        let path = temp_passwd_path();
        let log = logger();
        let passwd = PasswdFile::load(&path, AuthFileSettings::default(), &log);

        assert!(passwd.set_local_password("dave", "somehash"));
        assert!(!passwd.set_local_password("dave", "otherhash"));

        let _ = std::fs::remove_file(&path);
    }
}
