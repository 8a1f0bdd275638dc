//! Configuration and data directory management.
//!
//! Jockey reads three settings once at startup: the music directory, the
//! database location and the default volume. Each can come from a CLI
//! flag, an environment variable (`MUSIC_DIR`, `DATABASE_PATH`,
//! `DEFAULT_VOLUME`) or a platform default:
//!
//! - Linux: `~/.local/share/jockey/music.db`
//! - macOS: `~/Library/Application Support/jockey/music.db`
//! - Windows: `%APPDATA%\jockey\music.db`
//!
//! There is no other runtime-mutable global configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use serde::Serialize;

/// Volume applied to the output before the first explicit `set_volume`.
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Resolved startup settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Root of the music collection scanned into the library.
    pub music_dir: PathBuf,
    /// SQLite database file backing the track store.
    pub db_path: PathBuf,
    /// Initial output volume, clamped to [0, 1].
    pub default_volume: f32,
}

impl Settings {
    /// Resolve settings from optional overrides (CLI flags, which clap has
    /// already merged with the environment) falling back to platform
    /// defaults. Relative paths are absolutized against the current
    /// working directory.
    pub fn resolve(
        music_dir: Option<PathBuf>,
        db_path: Option<PathBuf>,
        volume: Option<f32>,
    ) -> Result<Self> {
        let music_dir = match music_dir {
            Some(dir) => absolutize(&dir)?,
            None => default_music_dir(),
        };

        let db_path = match db_path {
            Some(path) => absolutize(&path)?,
            None => default_db_path()?,
        };

        let default_volume = volume.unwrap_or(DEFAULT_VOLUME).clamp(0.0, 1.0);

        Ok(Self {
            music_dir,
            db_path,
            default_volume,
        })
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    let absolute = path
        .absolutize()
        .with_context(|| format!("failed to absolutize path {}", path.display()))?;
    Ok(absolute.into_owned())
}

/// Platform data directory for Jockey, created on demand.
pub fn data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine the system data directory")?;
    let dir = base.join("jockey");
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

fn default_db_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("music.db"))
}

fn default_music_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .unwrap_or_else(|| PathBuf::from("."))
}
