//! Command-line interface definitions.
//!
//! Clap derive structures for the `jockey` binary. Library management
//! commands (scan, search, listings) run one-shot against the store;
//! `serve` starts the long-running session behind the stdio front-end.
//!
//! ## Examples
//!
//! ```bash
//! jockey scan ~/Music
//! jockey search "blue in green"
//! jockey serve
//! RUST_LOG=debug jockey serve --silent
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main application arguments.
///
/// The shared options below can also come from the environment
/// (`MUSIC_DIR`, `DATABASE_PATH`, `DEFAULT_VOLUME`); explicit flags win.
#[derive(Parser)]
#[command(name = "jockey")]
#[command(about = "Jockey: tool-driven local music playback")]
#[command(version)]
pub struct Args {
    /// Root of the music collection
    #[arg(long, env = "MUSIC_DIR", global = true)]
    pub music_dir: Option<PathBuf>,

    /// Location of the SQLite library database
    #[arg(long, env = "DATABASE_PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Initial output volume in [0, 1]
    #[arg(long, env = "DEFAULT_VOLUME", global = true)]
    pub volume: Option<f32>,

    #[command(subcommand)]
    pub command: Command,
}

/// One subcommand per operation family.
#[derive(Subcommand)]
pub enum Command {
    /// Scan the music directory into the library database
    ///
    /// Walks the directory tree, reads embedded tags and reconciles the
    /// database: new files are added, changed files re-read, missing
    /// files soft-deleted. Re-running against an unchanged tree is a
    /// no-op. Supported formats: mp3, flac, wav, m4a, ogg.
    Scan {
        /// Directory to scan instead of the configured music directory
        path: Option<PathBuf>,
    },

    /// Search the library by title or artist
    Search {
        /// Text to look for (case-insensitive substring)
        query: String,
    },

    /// List the artists in the library
    Artists {
        /// Maximum number of names to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List the genres in the library
    Genres {
        /// Maximum number of names to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Run the playback session behind a stdio front-end
    ///
    /// Reads one JSON request per line on stdin and writes one JSON
    /// result per line on stdout, e.g.:
    ///
    ///   {"op":"play","criteria":{"kind":"artist","name":"Miles Davis"}}
    ///   {"op":"pause"}
    ///   {"op":"status"}
    ///
    /// This is the surface an agent-facing tool transport drives.
    Serve {
        /// Use a silent output instead of the default audio device
        #[arg(long)]
        silent: bool,
    },
}
