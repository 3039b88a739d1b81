use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

fn home_dir() -> anyhow::Result<PathBuf> {
    // On Unix, HOME is standard. (Windows support can be expanded later.)
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn pet_chat_home() -> Option<PathBuf> {
    env::var_os("PET_CHAT_HOME").map(PathBuf::from)
}

fn config_dir_from(
    home: Option<PathBuf>,
    xdg: Option<PathBuf>,
    user_home: impl FnOnce() -> anyhow::Result<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if let Some(base) = home {
        return Ok(base.join("config"));
    }

    if let Some(xdg) = xdg {
        return Ok(xdg.join("pet-chat"));
    }

    Ok(user_home()?.join(".config").join("pet-chat"))
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    let dir = config_dir_from(
        pet_chat_home(),
        env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        home_dir,
    )?;
    ensure_dir(&dir)
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
