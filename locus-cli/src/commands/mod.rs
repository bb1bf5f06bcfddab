pub mod replay;
pub mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};

/// `--home` when given, the user's home directory otherwise.
pub fn resolve_home(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(home) => Ok(home),
        None => dirs::home_dir().context("could not determine home directory"),
    }
}
