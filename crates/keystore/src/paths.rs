//! Path utilities for cross-platform support

use std::path::{Path, PathBuf};

/// File name of the persisted overlay identity
const IDENTITY_FILE: &str = "node.key";

/// Expand a path, replacing `~` with the user's home directory
///
/// # Examples
///
/// ```
/// use veilhop_keystore::expand_path;
/// use std::path::PathBuf;
///
/// let path = expand_path(&PathBuf::from("~/keys/node.key"));
/// assert!(!path.starts_with("~"));
/// ```
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

/// Default keystore directory for the current platform
///
/// - macOS: `~/Library/Application Support/veilhop/keys`
/// - Linux: `$XDG_DATA_HOME/veilhop/keys` (falls back to `~/.local/share`)
/// - elsewhere: `~/.veilhop/keys`
pub fn default_keystore_dir() -> PathBuf {
    data_dir().join("keys")
}

/// Default location of the node identity file
pub fn default_identity_path() -> PathBuf {
    default_keystore_dir().join(IDENTITY_FILE)
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        home_dir()
            .map(|h| h.join("Library/Application Support/veilhop"))
            .unwrap_or_else(|| PathBuf::from(".veilhop"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                home_dir()
                    .map(|h| h.join(".local/share"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("veilhop")
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        home_dir()
            .map(|h| h.join(".veilhop"))
            .unwrap_or_else(|| PathBuf::from(".veilhop"))
    }
}
