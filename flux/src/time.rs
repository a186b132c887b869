use std::time::SystemTime;

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01).
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}

/// Returns the current unix timestamp in milliseconds, used for the mainloop's
/// timer scheduling (spec.md §4.3 wants millisecond-resolution intervals).
#[inline]
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as u64
}

/// Returns the current unix timestamp in centiseconds (1/100s), the unit
/// `Flag:ResetDelay` and `Flag:WinDelay` are expressed in.
#[inline]
pub fn timestamp_centis() -> u64 {
    timestamp_millis() / 10
}
