//! On-disk layout of an installation:
//!
//! ```text
//! <root>/bin/script_desk
//! <root>/conf/config.json
//! <root>/data/script_desk.db
//! ```
//!
//! The root comes from `SCRIPT_DESK_HOME` when set. Otherwise it is the
//! directory holding the executable, or its parent when that directory is
//! `bin/`.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

const HOME_ENV: &str = "SCRIPT_DESK_HOME";

pub fn install_root() -> Result<PathBuf> {
    match std::env::var(HOME_ENV) {
        Ok(home) if home.trim().is_empty() => bail!("{} is set but empty", HOME_ENV),
        Ok(home) => Ok(PathBuf::from(home)),
        Err(_) => {
            let exe = std::env::current_exe().context("Failed to locate the running executable")?;
            root_for_executable(&exe)
        }
    }
}

fn root_for_executable(exe: &Path) -> Result<PathBuf> {
    let exe_dir = exe
        .parent()
        .with_context(|| format!("Executable path {} has no parent", exe.display()))?;

    if exe_dir.file_name().is_some_and(|name| name == "bin") {
        if let Some(root) = exe_dir.parent() {
            return Ok(root.to_path_buf());
        }
    }
    Ok(exe_dir.to_path_buf())
}

pub fn conf_dir() -> Result<PathBuf> {
    Ok(install_root()?.join("conf"))
}

pub fn data_dir() -> Result<PathBuf> {
    Ok(install_root()?.join("data"))
}
