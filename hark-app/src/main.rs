//! Hark - microphone level and spectrum monitor
//!
//! Captures the default input device, logs a live meter line, and records
//! level readings on request.
//!
//! Commands on stdin: `r` toggles recording, `c` clears the log, `s` saves
//! it, `q` (or end of input) quits.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing_subscriber::EnvFilter;

use hark_analysis::{BarSmoother, DisplayBars, DisplayBinner, SPECTRUM_FLOOR_DB};
use hark_audio::{AnalysisStream, CaptureSession};
use hark_library::{Config, FileStore, SampleRecorder, SampleStore};

/// Meter line refresh rate
const FPS: u64 = 4;

/// Bar glyphs from quietest to loudest
const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    ToggleRecording,
    Clear,
    Save,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "r" => Some(Command::ToggleRecording),
            "c" => Some(Command::Clear),
            "s" => Some(Command::Save),
            "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    let binner = DisplayBinner::new(config.bar_count).context("invalid bar_count")?;

    let store: Arc<dyn SampleStore> = Arc::new(FileStore::new(config.data_dir()));
    let mut recorder = SampleRecorder::new();
    if let Some(interval) = config.autosave_interval() {
        recorder = recorder.with_autosave(store.clone(), interval);
    }
    match recorder.load(store.as_ref()) {
        Ok(points) => tracing::info!(points, "level log loaded"),
        Err(e) => tracing::warn!(error = %e, "could not load level log, starting empty"),
    }

    let stream = AnalysisStream::new();
    let capture = CaptureSession::start(config.capture_config(), stream.clone())
        .context("failed to start microphone capture")?;

    if config.record {
        recorder.start_collecting(&stream);
    }

    // Shutdown flag
    let shutdown = Arc::new(AtomicBool::new(false));
    let meter_handle = {
        let stream = stream.clone();
        let shutdown = shutdown.clone();
        thread::spawn(move || run_meter(stream, binner, shutdown))
    };

    let commands = spawn_stdin_reader();
    run_commands(&commands, &config, &stream, &mut recorder, store.as_ref());

    // Cleanup
    shutdown.store(true, Ordering::SeqCst);
    capture.stop();
    recorder.stop_collecting();
    join_logged(meter_handle, "meter");

    let saved = recorder
        .save(store.as_ref())
        .context("failed to save level log")?;
    tracing::info!(points = saved, "level log saved");

    Ok(())
}

fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::bounded(16);
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if let Some(cmd) = Command::parse(&line) {
                if tx.send(cmd).is_err() {
                    return;
                }
            }
        }
        let _ = tx.send(Command::Quit);
    });
    rx
}

fn run_commands(
    commands: &Receiver<Command>,
    config: &Config,
    stream: &AnalysisStream,
    recorder: &mut SampleRecorder,
    store: &dyn SampleStore,
) {
    let deadline = config.run_duration().map(|d| Instant::now() + d);

    loop {
        let timeout = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => break,
            },
            None => Duration::from_secs(3600),
        };

        match commands.recv_timeout(timeout) {
            Ok(Command::ToggleRecording) => {
                let state = recorder.toggle(stream);
                tracing::info!(?state, "recorder toggled");
            }
            Ok(Command::Clear) => {
                recorder.clear();
                tracing::info!("level log cleared");
            }
            Ok(Command::Save) => match recorder.save(store) {
                Ok(points) => tracing::info!(points, "level log saved"),
                Err(e) => tracing::error!(error = %e, "failed to save level log"),
            },
            Ok(Command::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn run_meter(stream: AnalysisStream, binner: DisplayBinner, shutdown: Arc<AtomicBool>) {
    let subscription = stream.subscribe();
    let mut smoother = BarSmoother::new(binner.bar_count(), 0.2, 0.7);
    let frame_interval = Duration::from_millis(1000 / FPS);

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(frame_interval);

        let Some(frame) = subscription.latest() else {
            continue;
        };
        let bars = smoother.update(&binner.bin(&frame.spectrum));
        let peak_hz = frame.spectrum.peak().map(|p| p.frequency_hz).unwrap_or(0.0);

        tracing::info!(
            level_db = format_args!("{:7.1}", frame.level.decibels),
            peak_hz = format_args!("{:7.0}", peak_hz),
            "{}",
            render_bars(&bars)
        );
    }
}

/// Join a worker thread, logging instead of propagating its panic
fn join_logged(handle: JoinHandle<()>, name: &str) -> bool {
    let joined = handle.join().is_ok();
    if !joined {
        tracing::error!(thread = name, "worker thread panicked");
    }
    joined
}

fn render_bars(bars: &DisplayBars) -> String {
    let top = BAR_GLYPHS.len() - 1;
    bars.values()
        .iter()
        .map(|&db| {
            let t = ((db - SPECTRUM_FLOOR_DB) / -SPECTRUM_FLOOR_DB).clamp(0.0, 1.0);
            BAR_GLYPHS[(t * top as f32).round() as usize]
        })
        .collect()
}
