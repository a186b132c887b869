use std::fmt;

/// Failure returned when an interface cannot be unregistered. Per spec.md
/// §4.1, this is always a programming error at the call site — the broker
/// does not silently succeed.
#[derive(Debug, Eq, PartialEq)]
pub enum UnregisterError {
    /// The presented token no longer refers to the top of its stack (a
    /// later registration has shadowed it, or it was already removed).
    NotTop,
    /// The token is the top of its stack, but other holders are still
    /// using it; the caller must not proceed with teardown.
    RefsOutstanding(usize),
}

impl fmt::Display for UnregisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnregisterError::NotTop => write!(f, "token is not the top of its interface stack"),
            UnregisterError::RefsOutstanding(n) => write!(f, "{} references still outstanding", n),
        }
    }
}

impl std::error::Error for UnregisterError {}

/// Failure returned when an arena scope cannot be torn down.
#[derive(Debug, Eq, PartialEq)]
pub enum DestroyScopeError {
    /// No scope is registered for that arena id.
    NoSuchScope,
    /// The scope still holds registrations; the caller (arena manager)
    /// must unregister or release them before the scope can be dropped.
    NotEmpty,
}

impl fmt::Display for DestroyScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyScopeError::NoSuchScope => write!(f, "no scope registered for that arena"),
            DestroyScopeError::NotEmpty => write!(f, "scope still holds live registrations"),
        }
    }
}

impl std::error::Error for DestroyScopeError {}
