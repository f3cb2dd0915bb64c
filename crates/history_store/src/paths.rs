use std::path::{Path, PathBuf};

pub const HISTORY_DIR: &str = ".campaign";
pub const HISTORY_FILE: &str = "history.json";

#[must_use]
pub fn history_path(root: &Path) -> PathBuf {
    root.join(HISTORY_DIR).join(HISTORY_FILE)
}

/// Sibling path used while a save is in flight.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| HISTORY_FILE.into());
    name.push(".tmp");
    path.with_file_name(name)
}
