//! Tone-generating capture provider.
//!
//! Produces a sine wave in fixed-size blocks on a dedicated thread, paced at
//! real time. Stands in for a microphone on machines without one.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioBlock, AudioSource};
use crate::models::error::CaptureError;
use crate::traits::capture_provider::{BlockCallback, CaptureProvider};

pub struct SyntheticCapture {
    sample_rate: u32,
    block_frames: usize,
    frequency_hz: f32,
    amplitude: f32,
    available: bool,
    running: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<BlockCallback>>>,
    capture_handle: Option<thread::JoinHandle<()>>,
}

impl SyntheticCapture {
    /// A 440 Hz tone at half amplitude in blocks of `block_frames`.
    pub fn new(sample_rate: u32, block_frames: usize) -> Self {
        Self {
            sample_rate,
            block_frames: block_frames.max(1),
            frequency_hz: 440.0,
            amplitude: 0.5,
            available: true,
            running: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(Mutex::new(None)),
            capture_handle: None,
        }
    }

    pub fn with_tone(mut self, frequency_hz: f32, amplitude: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Make `start()` fail as if no device were present.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn block_interval(&self) -> Duration {
        Duration::from_secs_f64(self.block_frames as f64 / self.sample_rate as f64)
    }
}

impl CaptureProvider for SyntheticCapture {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self, callback: BlockCallback) -> Result<(), CaptureError> {
        if !self.available {
            return Err(CaptureError::DeviceUnavailable("synthetic source disabled".into()));
        }
        if self.capture_handle.is_some() {
            return Err(CaptureError::InvalidState("synthetic capture already running".into()));
        }

        *self.callback.lock() = Some(callback);
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let slot = Arc::clone(&self.callback);
        let interval = self.block_interval();
        let block_frames = self.block_frames;
        let step = TAU * self.frequency_hz / self.sample_rate as f32;
        let amplitude = self.amplitude;

        let handle = thread::Builder::new()
            .name("synthetic-capture".into())
            .spawn(move || {
                let mut sequence = 0u64;
                let mut phase = 0.0f32;
                while running.load(Ordering::SeqCst) {
                    let samples: Vec<f32> = (0..block_frames)
                        .map(|_| {
                            let sample = amplitude * phase.sin();
                            phase = (phase + step) % TAU;
                            sample
                        })
                        .collect();

                    {
                        let guard = slot.lock();
                        let Some(callback) = guard.as_ref() else {
                            break;
                        };
                        callback(AudioBlock::new(sequence, samples));
                    }
                    sequence += 1;
                    thread::sleep(interval);
                }
            })
            .map_err(|e| {
                self.callback.lock().take();
                self.running.store(false, Ordering::SeqCst);
                CaptureError::Unknown(format!("failed to spawn capture thread: {}", e))
            })?;

        self.capture_handle = Some(handle);
        log::debug!("synthetic capture started at {} Hz", self.sample_rate);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        // Clearing the slot waits out any in-flight callback.
        self.callback.lock().take();
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capture_handle.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn device_info(&self) -> AudioSource {
        AudioSource {
            id: "synthetic".into(),
            name: format!("Synthetic {:.0} Hz tone", self.frequency_hz),
            is_default: false,
        }
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
