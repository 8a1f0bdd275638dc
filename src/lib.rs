//! Jockey exposes a local music collection as a set of callable playback
//! operations, so a natural-language front-end (an agent's tool
//! transport) can say "play songs by X" and something actually happens.
//!
//! Core modules:
//! - [`store`] - durable SQLite track index
//! - [`scanner`] - directory walk, tag extraction, reconciliation
//! - [`selector`] - criteria resolution and recommendations
//! - [`session`] - the playback state machine
//! - [`dispatch`] - the tool-facing command surface
//!
//! ### Supporting modules
//!
//! - [`track`] - track model and query filters
//! - [`history`] - bounded play history ring
//! - [`player`] - audio output primitive (rodio-backed and silent)
//! - [`config`] - startup settings and data directories
//! - [`cli`] - clap definitions for the `jockey` binary
//!
//! ## Quick start
//!
//! ```no_run
//! use jockey::dispatch::Dispatcher;
//! use jockey::player::NullOutput;
//! use jockey::selector::{Criteria, Selector};
//! use jockey::store::Store;
//!
//! let store = Store::open("music.db".as_ref())?;
//! let dispatcher = Dispatcher::new(
//!     store,
//!     Selector::new(),
//!     Box::new(NullOutput::new()),
//!     0.7,
//!     "/music".into(),
//! );
//!
//! dispatcher.scan_library(None);
//! let outcome = dispatcher.resolve_and_play(&Criteria::Artist {
//!     name: "Miles Davis".into(),
//! });
//! println!("{}", outcome.message);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error handling
//!
//! Dispatcher methods never fail: every command returns an
//! [`dispatch::Outcome`] with `ok: false` and a readable message when
//! something went wrong. Underneath, the library uses typed errors
//! (`SelectError`, `SessionError`, `OutputError`) and `anyhow` context
//! for store failures.
//!
//! ## Logging
//!
//! All modules log through the `log` facade; the binary installs
//! `env_logger`, so `RUST_LOG=jockey=debug jockey serve` traces every
//! transition.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod history;
pub mod player;
pub mod scanner;
pub mod selector;
pub mod session;
pub mod store;
pub mod track;
