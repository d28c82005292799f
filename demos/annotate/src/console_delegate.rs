use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use annotation_capture_core::{
    AudioLevels, CaptureDelegate, CaptureError, RecordingResult, RecordingState,
};

const METER_INTERVAL: Duration = Duration::from_millis(100);
const METER_WIDTH: usize = 30;

/// Forwards session events to the terminal.
///
/// Levels arrive on the audio thread and are only stored; a separate
/// `level-meter` thread draws them on stderr while recording. Everything
/// else goes through the logger.
#[derive(Default)]
pub struct ConsoleDelegate {
    level: AtomicU32,
    peak_level: AtomicU32,
    recording: AtomicBool,
}

impl ConsoleDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start redrawing the meter. The thread exits once `delegate` is dropped.
    pub fn spawn_meter(delegate: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(delegate);
        let spawned = thread::Builder::new()
            .name("level-meter".into())
            .spawn(move || {
                while let Some(delegate) = weak.upgrade() {
                    if delegate.recording.load(Ordering::Relaxed) {
                        let mut stderr = std::io::stderr().lock();
                        let _ = write!(stderr, "\r{}", render_meter(&delegate.levels()));
                        let _ = stderr.flush();
                    }
                    drop(delegate);
                    thread::sleep(METER_INTERVAL);
                }
            });
        if let Err(e) = spawned {
            log::warn!("level meter unavailable: {}", e);
        }
    }

    /// Most recent levels reported by the session.
    pub fn levels(&self) -> AudioLevels {
        AudioLevels {
            level: f32::from_bits(self.level.load(Ordering::Relaxed)),
            peak_level: f32::from_bits(self.peak_level.load(Ordering::Relaxed)),
        }
    }
}

impl CaptureDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: RecordingState) {
        match state {
            RecordingState::Active => {
                self.level.store(0, Ordering::Relaxed);
                self.peak_level.store(0, Ordering::Relaxed);
                self.recording.store(true, Ordering::Relaxed);
            }
            RecordingState::Flushing | RecordingState::Idle => {
                // Leave the meter line before anything else is printed.
                if self.recording.swap(false, Ordering::Relaxed) {
                    eprintln!();
                }
            }
        }
        log::debug!("session is {}", state);
    }

    fn on_levels_updated(&self, levels: &AudioLevels) {
        self.level.store(levels.level.to_bits(), Ordering::Relaxed);
        self.peak_level.store(levels.peak_level.to_bits(), Ordering::Relaxed);
    }

    fn on_error(&self, error: &CaptureError) {
        log::warn!("recording ended with an error: {}", error);
    }

    fn on_recording_finished(&self, result: &RecordingResult) {
        log::info!(
            "wrote {} samples ({:.2}s) to {}",
            result.sample_count,
            result.duration_secs,
            result.file_path.display()
        );
    }
}

/// `[#######.......] -18 dBFS` style meter for one level reading.
pub fn render_meter(levels: &AudioLevels) -> String {
    let filled = ((levels.level.clamp(0.0, 1.0)) * METER_WIDTH as f32).round() as usize;
    let db = if levels.peak_level > 0.0 {
        20.0 * levels.peak_level.log10()
    } else {
        f32::NEG_INFINITY
    };
    let db_text = if db.is_finite() {
        format!("{:>4.0} dBFS", db)
    } else {
        "-inf dBFS".to_string()
    };
    format!(
        "[{}{}] {}",
        "#".repeat(filled),
        ".".repeat(METER_WIDTH - filled),
        db_text
    )
}
