use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Loads a TOML configuration file into `T`, panicking with a descriptive
/// message on failure — the same fail-fast posture the corpus's
/// `GameConfig::load` uses for the top-level process configuration (as
/// opposed to the per-arena `Config` handle hierarchy, which must degrade
/// gracefully and is specified separately in `zone_core::config`).
pub fn load_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> T {
    serdeconv::from_toml_file(path.as_ref())
        .unwrap_or_else(|err| panic!("error loading configuration file {:?}: {}", path.as_ref(), err))
}

/// Writes `value` out as a TOML configuration file.
pub fn save_toml<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> std::io::Result<()> {
    serdeconv::to_toml_file(value, path.as_ref())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}
