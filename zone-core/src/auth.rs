//! The `IAuth` interface boundary (spec.md §3, §4.9, C9): the broker
//! interface a zone's player state machine looks up to dispatch login
//! (`NeedAuth`'s handler calls `get_interface` for the top-of-stack
//! registration). This crate only specifies the contract; `authfile`
//! supplies the salted-hash-against-a-file implementation, and a
//! deployment may register others above it on the stack.

use crate::player::PlayerId;
use std::sync::{Arc, Mutex};

/// Per-player scratch object carrying the raw login bytes and the
/// completion callback `IAuth::authenticate` must eventually invoke
/// (spec.md §3). Bounded to 512 bytes at construction per spec.md §6's
/// `Login` packet size cap.
pub struct AuthRequest {
    pub player: PlayerId,
    raw: Vec<u8>,
    completion: Mutex<Option<Box<dyn FnOnce(AuthResult) + Send>>>,
}

pub const MAX_LOGIN_BYTES: usize = 512;

impl AuthRequest {
    /// Returns `None` if `raw` exceeds the 512-byte login packet cap —
    /// the caller should kick the player rather than hand this to an
    /// `IAuth` implementation (spec.md §7's fatal-to-session class).
    pub fn new<F>(player: PlayerId, raw: Vec<u8>, completion: F) -> Option<Self>
    where
        F: FnOnce(AuthResult) + Send + 'static,
    {
        if raw.len() > MAX_LOGIN_BYTES {
            return None;
        }
        Some(AuthRequest { player, raw, completion: Mutex::new(Some(Box::new(completion))) })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Completes the request exactly once. Implementations that finish
    /// asynchronously, off the mainloop thread, must post this call
    /// through `MainHandle::queue_main_work` themselves (spec.md §5) —
    /// this type has no opinion on which thread calls it.
    pub fn done(&self, result: AuthResult) {
        if let Some(completion) = self.completion.lock().unwrap().take() {
            completion(result);
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum AuthCode {
    Ok,
    NewName,
    BadPassword,
    LockedOut,
    NoPermission,
    CustomText,
}

impl AuthCode {
    /// VIE clients cannot render a custom-text login-bad screen and see
    /// the generic locked-out code instead (spec.md §4.5).
    pub fn for_vie_client(self) -> AuthCode {
        if self == AuthCode::CustomText {
            AuthCode::LockedOut
        } else {
            self
        }
    }
}

/// The outcome `IAuth::authenticate` reports back through `AuthRequest::done`
/// (spec.md §3).
#[derive(Clone, Debug)]
pub struct AuthResult {
    pub code: AuthCode,
    pub custom_text: Option<String>,
    pub authenticated: bool,
    pub demo: bool,
    pub name: String,
    pub send_name: String,
    pub squad: String,
}

impl AuthResult {
    pub fn ok(name: impl Into<String>) -> Self {
        let name = name.into();
        AuthResult {
            code: AuthCode::Ok,
            custom_text: None,
            authenticated: true,
            demo: false,
            send_name: name.clone(),
            squad: String::new(),
            name,
        }
    }

    pub fn denied(code: AuthCode, name: impl Into<String>) -> Self {
        let name = name.into();
        AuthResult {
            code,
            custom_text: None,
            authenticated: false,
            demo: false,
            send_name: name.clone(),
            squad: String::new(),
            name,
        }
    }
}

/// Registered as a broker interface (spec.md §4.1); the player state
/// machine's `NeedAuth` handler looks up the top implementation and calls
/// this, then waits for `request.done()`.
pub trait IAuth: Send + Sync {
    fn authenticate(&self, request: Arc<AuthRequest>);
}

/// Authenticates everyone as unauthenticated — the always-present
/// lowest-priority fallback spec.md §4.9/§9 describes ("a default
/// provider also exists"). `authfile::NullAuth` is this exact type
/// re-exported for registration convenience; kept here too so `zone-core`
/// alone is enough to exercise the `NeedAuth` pipeline in tests.
pub struct UnauthenticatedAuth;

impl IAuth for UnauthenticatedAuth {
    fn authenticate(&self, request: Arc<AuthRequest>) {
        request.done(AuthResult {
            code: AuthCode::Ok,
            custom_text: None,
            authenticated: false,
            demo: false,
            name: String::from("unauthenticated"),
            send_name: String::from("unauthenticated"),
            squad: String::new(),
        });
    }
}
