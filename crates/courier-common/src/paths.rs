//! Data directory layout for Courier
//!
//! Directory layout:
//! ```text
//! courier_data/
//! ├── conversations/   # One JSON file per conversation
//! └── tmp/             # Scratch space for atomic writes
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DATA_DIR_ENV: &str = "COURIER_DATA_DIR";

/// Root data directory from the environment, the platform data dir, or a
/// relative default.
pub fn data_root() -> PathBuf {
    if let Ok(val) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(val);
    }

    if let Some(dir) = dirs::data_local_dir() {
        return dir.join("courier");
    }

    PathBuf::from("courier_data")
}

pub fn conversations_dir(root: &Path) -> PathBuf {
    root.join("conversations")
}

pub fn tmp_dir(root: &Path) -> PathBuf {
    root.join("tmp")
}

/// Ensure a single directory exists
pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        info!("Creating directory: {:?}", path);
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensure the whole layout under `root` exists
pub fn ensure_layout(root: &Path) -> anyhow::Result<()> {
    ensure_dir(root)?;
    ensure_dir(&conversations_dir(root))?;
    ensure_dir(&tmp_dir(root))?;
    Ok(())
}
