//! The `jockey` binary.
//!
//! Library management commands run one-shot against the store; `serve`
//! keeps a playback session alive and speaks line-delimited JSON on
//! stdin/stdout, which is the surface an agent-facing tool transport
//! drives. Logging goes through `env_logger` and is controlled with
//! `RUST_LOG`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use jockey::cli::{Args, Command};
use jockey::config::Settings;
use jockey::dispatch::{Dispatcher, Outcome, Request};
use jockey::player::{AudioOutput, NullOutput, RodioOutput};
use jockey::scanner;
use jockey::selector::Selector;
use jockey::store::Store;
use jockey::track::Filter;

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::resolve(args.music_dir, args.database, args.volume)?;
    let store = Store::open(&settings.db_path)?;

    match args.command {
        Command::Scan { path } => {
            let root = path.unwrap_or_else(|| settings.music_dir.clone());
            let report = scanner::scan(&root, &store)
                .with_context(|| format!("scan of {} failed", root.display()))?;
            println!("{}", report.summary());
            for path in &report.invalid {
                eprintln!("unreadable: {}", path.display());
            }
        }
        Command::Search { query } => {
            let mut tracks = store.find(&Filter::by_title(&query))?;
            for track in store.find(&Filter::by_artist(&query))? {
                if tracks.iter().all(|seen| seen.id != track.id) {
                    tracks.push(track);
                }
            }
            if tracks.is_empty() {
                println!("no matches for '{query}'");
            }
            for track in tracks {
                println!("{}", track.display_line());
            }
        }
        Command::Artists { limit } => {
            for artist in store.artists()?.into_iter().take(limit) {
                println!("{artist}");
            }
        }
        Command::Genres { limit } => {
            for genre in store.genres()?.into_iter().take(limit) {
                println!("{genre}");
            }
        }
        Command::Serve { silent } => {
            let output: Box<dyn AudioOutput> = if silent {
                Box::new(NullOutput::new())
            } else {
                Box::new(
                    RodioOutput::new(settings.default_volume)
                        .context("failed to open the audio output device")?,
                )
            };
            let dispatcher = Arc::new(Dispatcher::new(
                store,
                Selector::new(),
                output,
                settings.default_volume,
                settings.music_dir.clone(),
            ));

            // Natural end-of-track is otherwise only observed at command
            // boundaries; the ticker keeps a queue advancing while the
            // caller is quiet.
            let ticker = Arc::clone(&dispatcher);
            thread::spawn(move || loop {
                thread::sleep(Duration::from_secs(1));
                ticker.poll_completion();
            });

            serve(&dispatcher)?;
        }
    }

    Ok(())
}

/// Stdio front-end: one JSON request per line in, one JSON outcome per
/// line out. Unparseable input becomes a structured failure, so the
/// process survives a confused caller.
fn serve(dispatcher: &Dispatcher) -> Result<()> {
    info!("serving on stdin/stdout");
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read from stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatcher.handle(&request),
            Err(err) => {
                warn!("unparseable request: {err}");
                Outcome::failure(format!("malformed request: {err}"))
            }
        };

        serde_json::to_writer(&mut stdout, &outcome)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}
