//! Audio output primitive.
//!
//! The playback session drives a narrow [`AudioOutput`] trait. The
//! production implementation decodes on the calling thread (so load
//! failures surface synchronously) and hands the decoded source to a
//! dedicated audio thread owning the rodio output stream; all other
//! commands are cheap channel sends. [`NullOutput`] implements the same
//! contract without a sound device for tests and headless runs.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    /// The file exists but cannot be decoded.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(PathBuf),
    /// The file is missing or unreadable.
    #[error("audio file not found: {0}")]
    NotFound(PathBuf),
    /// No usable output device.
    #[error("audio device unavailable: {0}")]
    Device(String),
}

/// The one thing allowed to make noise. Every call returns quickly;
/// `load` is the only fallible operation.
pub trait AudioOutput: Send {
    /// Decode and stage a file, replacing whatever was loaded before.
    /// The output starts paused; call [`AudioOutput::play`].
    fn load(&mut self, path: &Path) -> Result<(), OutputError>;
    fn play(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    /// Release the loaded source entirely.
    fn stop(&mut self);
    /// Applies immediately and persists for subsequent loads. Callers
    /// clamp; implementations may assume [0, 1].
    fn set_volume(&mut self, volume: f32);
    fn seek(&mut self, position: Duration);
    fn is_playing(&self) -> bool;
    /// True once the loaded source has drained naturally. Stays false
    /// after `stop`.
    fn finished(&self) -> bool;
}

enum OutputCmd {
    Load(Box<Decoder<BufReader<File>>>),
    Play,
    Pause,
    Stop,
    SetVolume(f32),
    Seek(Duration),
    Quit,
}

#[derive(Default)]
struct SharedState {
    playing: AtomicBool,
    finished: AtomicBool,
}

/// Rodio-backed output on a dedicated audio thread.
pub struct RodioOutput {
    tx: Sender<OutputCmd>,
    shared: Arc<SharedState>,
}

impl RodioOutput {
    /// Open the default output device. Fails fast when no device is
    /// usable instead of failing on the first `load`.
    pub fn new(initial_volume: f32) -> Result<Self, OutputError> {
        let shared = Arc::new(SharedState::default());
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_shared = Arc::clone(&shared);
        thread::spawn(move || audio_thread(rx, ready_tx, thread_shared, initial_volume));

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx, shared }),
            Ok(Err(message)) => Err(OutputError::Device(message)),
            Err(_) => Err(OutputError::Device("audio thread died during startup".into())),
        }
    }

    fn send(&self, cmd: OutputCmd) {
        if self.tx.send(cmd).is_err() {
            warn!("audio thread is gone; dropping output command");
        }
    }
}

impl AudioOutput for RodioOutput {
    fn load(&mut self, path: &Path) -> Result<(), OutputError> {
        let file = File::open(path).map_err(|_| OutputError::NotFound(path.to_path_buf()))?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|_| OutputError::UnsupportedFormat(path.to_path_buf()))?;
        debug!("decoded {}", path.display());
        self.send(OutputCmd::Load(Box::new(source)));
        Ok(())
    }

    fn play(&mut self) {
        self.send(OutputCmd::Play);
    }

    fn pause(&mut self) {
        self.send(OutputCmd::Pause);
    }

    fn resume(&mut self) {
        self.send(OutputCmd::Play);
    }

    fn stop(&mut self) {
        self.send(OutputCmd::Stop);
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(OutputCmd::SetVolume(volume));
    }

    fn seek(&mut self, position: Duration) {
        self.send(OutputCmd::Seek(position));
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    fn finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        let _ = self.tx.send(OutputCmd::Quit);
    }
}

fn audio_thread(
    rx: Receiver<OutputCmd>,
    ready_tx: Sender<Result<(), String>>,
    shared: Arc<SharedState>,
    mut volume: f32,
) {
    let stream: OutputStream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err.to_string()));
            return;
        }
    };
    // rodio logs to stderr when the stream drops; noisy next to our own
    // logging.
    let mut stream = stream;
    stream.log_on_drop(false);
    let _ = ready_tx.send(Ok(()));

    let mut sink: Option<Sink> = None;

    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(OutputCmd::Load(source)) => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
                let new_sink = Sink::connect_new(stream.mixer());
                new_sink.set_volume(volume);
                new_sink.append(*source);
                new_sink.pause();
                sink = Some(new_sink);
                shared.playing.store(false, Ordering::SeqCst);
                shared.finished.store(false, Ordering::SeqCst);
            }
            Ok(OutputCmd::Play) => {
                if let Some(sink) = sink.as_ref() {
                    sink.play();
                    shared.playing.store(true, Ordering::SeqCst);
                }
            }
            Ok(OutputCmd::Pause) => {
                if let Some(sink) = sink.as_ref() {
                    sink.pause();
                    shared.playing.store(false, Ordering::SeqCst);
                }
            }
            Ok(OutputCmd::Stop) => {
                if let Some(sink) = sink.take() {
                    sink.stop();
                }
                shared.playing.store(false, Ordering::SeqCst);
                shared.finished.store(false, Ordering::SeqCst);
            }
            Ok(OutputCmd::SetVolume(new_volume)) => {
                volume = new_volume;
                if let Some(sink) = sink.as_ref() {
                    sink.set_volume(volume);
                }
            }
            Ok(OutputCmd::Seek(position)) => {
                if let Some(sink) = sink.as_ref() {
                    if let Err(err) = sink.try_seek(position) {
                        warn!("seek failed: {err}");
                    }
                }
            }
            Ok(OutputCmd::Quit) => {
                if let Some(sink) = sink.take() {
                    sink.stop();
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                // Natural end-of-track detection: a playing sink that ran
                // out of queued audio has drained.
                if let Some(current) = sink.as_ref() {
                    if !current.is_paused() && current.empty() {
                        sink = None;
                        shared.playing.store(false, Ordering::SeqCst);
                        shared.finished.store(true, Ordering::SeqCst);
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[derive(Debug, Default)]
struct NullState {
    loaded: Option<PathBuf>,
    playing: bool,
    paused: bool,
    finished: bool,
    volume: f32,
    position: Duration,
    loads: usize,
}

/// Silent [`AudioOutput`]: validates loads against the filesystem and the
/// supported extension list but produces no sound. Used by the test suite
/// and by `serve --silent` on machines without an audio device.
pub struct NullOutput {
    state: Arc<Mutex<NullState>>,
}

/// Inspection/steering handle onto a [`NullOutput`], for tests that need
/// to observe the output or simulate a track draining.
#[derive(Clone)]
pub struct NullOutputHandle {
    state: Arc<Mutex<NullState>>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NullState::default())),
        }
    }

    pub fn handle(&self) -> NullOutputHandle {
        NullOutputHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for NullOutput {
    fn load(&mut self, path: &Path) -> Result<(), OutputError> {
        if !path.is_file() {
            return Err(OutputError::NotFound(path.to_path_buf()));
        }
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                crate::scanner::SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| *known == ext)
            })
            .unwrap_or(false);
        if !supported {
            return Err(OutputError::UnsupportedFormat(path.to_path_buf()));
        }

        let mut state = self.state.lock().unwrap();
        state.loaded = Some(path.to_path_buf());
        state.playing = false;
        state.paused = false;
        state.finished = false;
        state.position = Duration::ZERO;
        state.loads += 1;
        Ok(())
    }

    fn play(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.loaded.is_some() {
            state.playing = true;
            state.paused = false;
        }
    }

    fn pause(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.playing {
            state.playing = false;
            state.paused = true;
        }
    }

    fn resume(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.paused {
            state.playing = true;
            state.paused = false;
        }
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.loaded = None;
        state.playing = false;
        state.paused = false;
        state.finished = false;
        state.position = Duration::ZERO;
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().unwrap().volume = volume;
    }

    fn seek(&mut self, position: Duration) {
        self.state.lock().unwrap().position = position;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    fn finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }
}

impl NullOutputHandle {
    /// Pretend the loaded track drained naturally.
    pub fn finish_current(&self) {
        let mut state = self.state.lock().unwrap();
        if state.loaded.is_some() {
            state.loaded = None;
            state.playing = false;
            state.paused = false;
            state.finished = true;
        }
    }

    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().loaded.clone()
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }

    pub fn position(&self) -> Duration {
        self.state.lock().unwrap().position
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().unwrap().loads
    }
}
