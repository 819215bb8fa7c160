use std::{
    fs,
    path::{Path, PathBuf},
};

use dirs::data_dir;
use tracing::warn;

pub fn data_root() -> PathBuf {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    base.join("museo-agenda")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return;
        }
        if let Err(err) = fs::create_dir_all(parent) {
            warn!(?parent, %err, "failed to create parent directory");
        }
    }
}
