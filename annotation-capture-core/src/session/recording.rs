use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::audio_models::{AudioBlock, AudioLevels, CaptureSessionDiagnostics};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult, StopOutcome};
use crate::models::state::RecordingState;
use crate::processing::block_buffer::RecordingBuffer;
use crate::processing::sample_converter::SampleConverter;
use crate::storage::metadata::write_metadata;
use crate::storage::paths;
use crate::storage::wav_writer::WavFileWriter;
use crate::traits::audio_writer::AudioFileWriter;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::{BlockCallback, CaptureProvider};
use crate::traits::capture_session::CaptureSession;

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    state: RecordingState,
    target: Option<String>,
    levels: AudioLevels,
    capture_start: Option<Instant>,
    diagnostics: CaptureSessionDiagnostics,
    last_outcome: Option<StopOutcome>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            target: None,
            levels: AudioLevels::default(),
            capture_start: None,
            diagnostics: CaptureSessionDiagnostics::default(),
            last_outcome: None,
        }
    }
}

/// Cancellable auto-stop thread armed by `start()` when a max duration is set.
struct AutoStopTimer {
    cancel: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

struct SessionInner<P: CaptureProvider, W: AudioFileWriter> {
    provider: Mutex<P>,
    writer: W,
    config: Mutex<CaptureConfiguration>,
    session_state: Arc<Mutex<SessionState>>,
    buffer: Arc<Mutex<RecordingBuffer>>,
    delegate: Mutex<Option<Arc<dyn CaptureDelegate>>>,
    timer: Mutex<Option<AutoStopTimer>>,
}

/// Records one spoken annotation at a time.
///
/// Owns the block buffer; the capture provider only ever sees a callback.
/// ```text
/// [CaptureProvider] --block--> [callback] --push--> [RecordingBuffer]
///                                                        │ stop(): close gate,
///                                                        │ provider barrier, drain
///                                                        ↓
///                                               [AudioFileWriter] → <output>/<target>
/// ```
///
/// Lock order: provider, then session state or buffer. The provider lock is
/// held for the whole of `start()` and for the capture half of `stop()` and
/// `abort()`, which serialises lifecycle calls from the caller and from the
/// auto-stop timer.
pub struct RecordingSession<P, W>
where
    P: CaptureProvider + 'static,
    W: AudioFileWriter + 'static,
{
    inner: Arc<SessionInner<P, W>>,
}

impl<P: CaptureProvider + 'static> RecordingSession<P, WavFileWriter> {
    /// Session that persists to WAV at the configured bit depth.
    pub fn with_wav_writer(provider: P, config: CaptureConfiguration) -> Result<Self, CaptureError> {
        Self::new(provider, WavFileWriter::new(), config)
    }
}

impl<P, W> RecordingSession<P, W>
where
    P: CaptureProvider + 'static,
    W: AudioFileWriter + 'static,
{
    /// Fails with `ConfigurationFailed` if the configuration is invalid or
    /// asks for a sample rate the provider does not deliver.
    pub fn new(provider: P, writer: W, config: CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        check_source_rate(&provider, &config)?;
        Ok(Self {
            inner: Arc::new(SessionInner {
                provider: Mutex::new(provider),
                writer,
                config: Mutex::new(config),
                session_state: Arc::new(Mutex::new(SessionState::new())),
                buffer: Arc::new(Mutex::new(RecordingBuffer::new())),
                delegate: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        })
    }

    /// Install the event delegate. Takes effect from the next `start()` for
    /// level updates, immediately for state changes.
    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.inner.delegate.lock() = Some(delegate);
    }

    /// Replace the configuration. Only allowed while idle.
    ///
    /// Sample rate, input device and block size belong to the provider,
    /// which fixed them when it was built; a configuration that changes
    /// them is rejected with `ConfigurationFailed` and nothing is replaced.
    pub fn configure(&self, config: CaptureConfiguration) -> Result<(), CaptureError> {
        let provider = self.inner.provider.lock();
        let state = self.inner.session_state.lock().state;
        if !state.is_idle() {
            return Err(CaptureError::InvalidState(format!(
                "can only configure while idle, session is {}",
                state
            )));
        }
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        check_source_rate(&*provider, &config)?;

        let mut current = self.inner.config.lock();
        if config.mic_device_name != current.mic_device_name
            || config.block_frames != current.block_frames
        {
            return Err(CaptureError::ConfigurationFailed(
                "input device and block size are fixed by the capture provider".into(),
            ));
        }
        *current = config;
        Ok(())
    }

    pub fn config(&self) -> CaptureConfiguration {
        self.inner.config.lock().clone()
    }

    pub fn state(&self) -> RecordingState {
        self.inner.session_state.lock().state
    }

    pub fn current_levels(&self) -> AudioLevels {
        self.inner.session_state.lock().levels
    }

    pub fn diagnostics(&self) -> CaptureSessionDiagnostics {
        self.inner.session_state.lock().diagnostics.clone()
    }

    /// Target of the recording in progress, if any.
    pub fn target(&self) -> Option<String> {
        self.inner.session_state.lock().target.clone()
    }

    /// Seconds since the current recording started (0 when not active).
    pub fn elapsed_secs(&self) -> f64 {
        let s = self.inner.session_state.lock();
        match (s.state, s.capture_start) {
            (RecordingState::Active, Some(start)) => start.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }

    /// Samples currently held in the buffer.
    pub fn buffered_sample_count(&self) -> usize {
        self.inner.buffer.lock().sample_count()
    }

    /// Outcome of the most recent completed `stop()`, including stops fired
    /// by the auto-stop timer.
    pub fn last_outcome(&self) -> Option<StopOutcome> {
        self.inner.session_state.lock().last_outcome.clone()
    }

    /// Start recording towards `target` (a file name inside the output directory).
    ///
    /// Transitions: idle → active. On failure the session stays idle with an
    /// empty, closed buffer.
    pub fn start(&self, target: &str) -> Result<(), CaptureError> {
        self.inner.start(target)
    }

    /// Stop capture and flush the buffer to `<output_directory>/<target>`.
    ///
    /// Transitions: active → flushing → idle. Blocks until the provider
    /// guarantees no further callbacks. The buffer is empty afterwards
    /// whatever the outcome.
    pub fn stop(&self) -> Result<RecordingResult, CaptureError> {
        self.inner.stop()
    }

    /// Stop capture and discard the buffer without writing.
    ///
    /// Transitions: active → idle.
    pub fn abort(&self) -> Result<(), CaptureError> {
        self.inner.abort()
    }
}

impl<P, W> CaptureSession for RecordingSession<P, W>
where
    P: CaptureProvider + 'static,
    W: AudioFileWriter + 'static,
{
    fn state(&self) -> RecordingState {
        RecordingSession::state(self)
    }

    fn current_levels(&self) -> AudioLevels {
        RecordingSession::current_levels(self)
    }

    fn start(&self, target: &str) -> Result<(), CaptureError> {
        RecordingSession::start(self, target)
    }

    fn stop(&self) -> Result<RecordingResult, CaptureError> {
        RecordingSession::stop(self)
    }

    fn abort(&self) -> Result<(), CaptureError> {
        RecordingSession::abort(self)
    }
}

impl<P, W> Drop for RecordingSession<P, W>
where
    P: CaptureProvider + 'static,
    W: AudioFileWriter + 'static,
{
    fn drop(&mut self) {
        if self.inner.session_state.lock().state.is_active() {
            log::debug!("dropping active recording session, discarding capture");
            let _ = self.inner.abort();
        }
    }
}

impl<P, W> SessionInner<P, W>
where
    P: CaptureProvider + 'static,
    W: AudioFileWriter + 'static,
{
    fn start(self: &Arc<Self>, target: &str) -> Result<(), CaptureError> {
        let mut provider = self.provider.lock();

        let state = self.session_state.lock().state;
        if !state.is_idle() {
            log::warn!("start requested while {}", state);
            return Err(CaptureError::AlreadyRecording);
        }

        let config = self.config.lock().clone();
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        check_source_rate(&*provider, &config)?;
        paths::validate_target(target)?;

        self.buffer.lock().open();
        {
            let mut s = self.session_state.lock();
            s.levels = AudioLevels::default();
            s.diagnostics = CaptureSessionDiagnostics::default();
        }

        if let Err(e) = provider.start(self.block_callback()) {
            let mut buffer = self.buffer.lock();
            buffer.close();
            buffer.clear();
            log::error!("failed to start capture for {}: {}", target, e);
            return Err(e);
        }

        {
            let mut s = self.session_state.lock();
            s.state = RecordingState::Active;
            s.target = Some(target.to_string());
            s.capture_start = Some(Instant::now());
        }
        if let Some(secs) = config.max_duration_secs {
            self.arm_timer(Duration::from_secs_f64(secs));
        }
        drop(provider);

        log::info!("recording started: {}", target);
        self.notify_state(RecordingState::Active);
        Ok(())
    }

    fn stop(self: &Arc<Self>) -> Result<RecordingResult, CaptureError> {
        let (target, timer) = {
            let mut provider = self.provider.lock();
            let target = {
                let mut s = self.session_state.lock();
                if !s.state.is_active() {
                    return Err(CaptureError::InvalidState(format!(
                        "can only stop while active, session is {}",
                        s.state
                    )));
                }
                s.state = RecordingState::Flushing;
                s.target.take()
            };
            self.notify_state(RecordingState::Flushing);
            self.halt_capture(&mut *provider);
            (target, self.timer.lock().take())
        };
        cancel_timer(timer);

        let samples = self.buffer.lock().drain();
        let config = self.config.lock().clone();
        let outcome = match target {
            Some(target) => self.flush(&target, samples, &config),
            None => Err(CaptureError::InvalidState("active session without a target".into())),
        };

        {
            let mut s = self.session_state.lock();
            s.state = RecordingState::Idle;
            s.capture_start = None;
            s.last_outcome = Some(outcome.clone());
        }
        self.buffer.lock().clear();
        self.notify_state(RecordingState::Idle);
        self.notify_outcome(&outcome);
        outcome
    }

    fn abort(self: &Arc<Self>) -> Result<(), CaptureError> {
        let timer = {
            let mut provider = self.provider.lock();
            let target = {
                let mut s = self.session_state.lock();
                if !s.state.is_active() {
                    return Err(CaptureError::InvalidState(format!(
                        "can only abort while active, session is {}",
                        s.state
                    )));
                }
                s.state = RecordingState::Flushing;
                s.target.take()
            };
            self.halt_capture(&mut *provider);
            self.buffer.lock().clear();
            {
                let mut s = self.session_state.lock();
                s.state = RecordingState::Idle;
                s.capture_start = None;
            }
            log::info!("recording aborted: {}", target.unwrap_or_default());
            self.timer.lock().take()
        };
        cancel_timer(timer);
        self.notify_state(RecordingState::Idle);
        Ok(())
    }

    /// Close the buffer gate, then wait for the provider's stop barrier.
    ///
    /// Blocks racing the stop are refused by the closed gate and counted as
    /// discarded.
    fn halt_capture(&self, provider: &mut P) {
        self.buffer.lock().close();
        if let Err(e) = provider.stop() {
            log::error!("capture provider failed to stop cleanly: {}", e);
        }
    }

    fn flush(
        &self,
        target: &str,
        samples: Vec<f32>,
        config: &CaptureConfiguration,
    ) -> Result<RecordingResult, CaptureError> {
        if samples.is_empty() {
            log::warn!("no audio captured for {}, nothing written", target);
            return Err(CaptureError::NoAudioCaptured);
        }

        let path = paths::annotation_path(&config.output_directory, target)?;
        let checksum = self
            .writer
            .write(&samples, config.sample_rate, config.bit_depth, &path)
            .map_err(|e| match e {
                CaptureError::WriteFailed(_) => e,
                other => CaptureError::WriteFailed(other.to_string()),
            })?;

        let metadata = RecordingMetadata::new_mono(
            target,
            &path.to_string_lossy(),
            samples.len(),
            config.sample_rate,
            config.bit_depth,
            &checksum,
        );
        if config.write_metadata {
            if let Err(e) = write_metadata(&metadata, &path) {
                log::warn!("recording saved but metadata sidecar failed: {}", e);
            }
        }

        log::info!(
            "saved {} samples ({:.2}s) to {}",
            samples.len(),
            metadata.duration_secs,
            path.display()
        );

        Ok(RecordingResult {
            file_path: path,
            target: target.to_string(),
            duration_secs: metadata.duration_secs,
            sample_count: samples.len(),
            checksum,
            metadata,
        })
    }

    /// Callback handed to the provider: append to the buffer, meter, count.
    fn block_callback(&self) -> BlockCallback {
        let buffer = Arc::clone(&self.buffer);
        let state = Arc::clone(&self.session_state);
        let delegate = self.delegate.lock().clone();

        Arc::new(move |block: AudioBlock| {
            let levels = AudioLevels {
                level: SampleConverter::rms_level(&block.samples),
                peak_level: SampleConverter::peak_level(&block.samples),
            };
            let sequence = block.sequence;
            let sample_count = block.len() as u64;

            let accepted = buffer.lock().push(block);
            {
                let mut s = state.lock();
                if accepted {
                    s.levels = levels;
                    s.diagnostics.blocks_received += 1;
                    s.diagnostics.samples_received += sample_count;
                } else {
                    s.diagnostics.blocks_discarded += 1;
                }
            }

            if !accepted {
                log::debug!("discarded block {} delivered after stop", sequence);
            } else if let Some(ref d) = delegate {
                d.on_levels_updated(&levels);
            }
        })
    }

    fn arm_timer(self: &Arc<Self>, after: Duration) {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let session = Arc::downgrade(self);

        let spawned = thread::Builder::new()
            .name("auto-stop-timer".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(after) {
                    let Some(session) = session.upgrade() else {
                        return;
                    };
                    log::info!("max duration of {:.1}s reached, stopping", after.as_secs_f64());
                    // The outcome is recorded and delivered to the delegate by stop().
                    if let Err(CaptureError::InvalidState(_)) = session.stop() {
                        log::debug!("auto-stop found session already stopped");
                    }
                }
            });

        match spawned {
            Ok(handle) => *self.timer.lock() = Some(AutoStopTimer { cancel, handle }),
            Err(e) => log::error!("failed to spawn auto-stop timer: {}", e),
        }
    }

    fn notify_state(&self, state: RecordingState) {
        log::debug!("session state: {}", state);
        let delegate = self.delegate.lock().clone();
        if let Some(d) = delegate {
            d.on_state_changed(state);
        }
    }

    fn notify_outcome(&self, outcome: &StopOutcome) {
        let delegate = self.delegate.lock().clone();
        let Some(d) = delegate else {
            return;
        };
        match outcome {
            Ok(result) => d.on_recording_finished(result),
            Err(e) => d.on_error(e),
        }
    }
}

/// Blocks are written at `config.sample_rate`, so it must be the rate the
/// provider actually delivers.
fn check_source_rate<P: CaptureProvider>(
    provider: &P,
    config: &CaptureConfiguration,
) -> Result<(), CaptureError> {
    let source_rate = provider.sample_rate();
    if source_rate != config.sample_rate {
        return Err(CaptureError::ConfigurationFailed(format!(
            "capture provider delivers {} Hz but the session is configured for {} Hz",
            source_rate, config.sample_rate
        )));
    }
    Ok(())
}

/// Cancel a pending auto-stop and wait for its thread, unless called from it.
fn cancel_timer(timer: Option<AutoStopTimer>) {
    let Some(timer) = timer else {
        return;
    };
    drop(timer.cancel);
    if timer.handle.thread().id() != thread::current().id() {
        let _ = timer.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use crate::models::audio_models::AudioSource;
    use crate::sources::synthetic::SyntheticCapture;

    /// Provider whose blocks are pushed by the test.
    #[derive(Clone)]
    struct ManualProvider {
        slot: Arc<Mutex<Option<BlockCallback>>>,
        next_sequence: Arc<AtomicU64>,
        stop_calls: Arc<AtomicUsize>,
        fail_start: bool,
        sample_rate: u32,
        /// Keep the callback after stop, to simulate a late in-flight block.
        leak_callback: Arc<Mutex<Option<BlockCallback>>>,
    }

    impl Default for ManualProvider {
        fn default() -> Self {
            Self {
                slot: Arc::default(),
                next_sequence: Arc::default(),
                stop_calls: Arc::default(),
                fail_start: false,
                sample_rate: 44100,
                leak_callback: Arc::default(),
            }
        }
    }

    impl ManualProvider {
        fn failing() -> Self {
            Self {
                fail_start: true,
                ..Default::default()
            }
        }

        fn deliver(&self, samples: Vec<f32>) -> bool {
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            let slot = self.slot.lock();
            match slot.as_ref() {
                Some(callback) => {
                    callback(AudioBlock::new(sequence, samples));
                    true
                }
                None => false,
            }
        }

        fn deliver_late(&self, samples: Vec<f32>) {
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            if let Some(callback) = self.leak_callback.lock().as_ref() {
                callback(AudioBlock::new(sequence, samples));
            }
        }
    }

    impl CaptureProvider for ManualProvider {
        fn is_available(&self) -> bool {
            !self.fail_start
        }

        fn start(&mut self, callback: BlockCallback) -> Result<(), CaptureError> {
            if self.fail_start {
                return Err(CaptureError::DeviceUnavailable("no input device".into()));
            }
            let mut slot = self.slot.lock();
            if slot.is_some() {
                return Err(CaptureError::InvalidState("already capturing".into()));
            }
            *self.leak_callback.lock() = Some(Arc::clone(&callback));
            *slot = Some(callback);
            self.next_sequence.store(0, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            self.slot.lock().take();
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_capturing(&self) -> bool {
            self.slot.lock().is_some()
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn device_info(&self) -> AudioSource {
            AudioSource {
                id: "manual".into(),
                name: "Manual".into(),
                is_default: true,
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeWriter {
        writes: Arc<Mutex<Vec<Written>>>,
        fail_with: Option<CaptureError>,
    }

    struct Written {
        samples: Vec<f32>,
        sample_rate: u32,
        bit_depth: u16,
        path: PathBuf,
    }

    impl AudioFileWriter for FakeWriter {
        fn write(
            &self,
            samples: &[f32],
            sample_rate: u32,
            bit_depth: u16,
            path: &Path,
        ) -> Result<String, CaptureError> {
            if let Some(ref e) = self.fail_with {
                return Err(e.clone());
            }
            self.writes.lock().push(Written {
                samples: samples.to_vec(),
                sample_rate,
                bit_depth,
                path: path.to_path_buf(),
            });
            Ok("checksum".into())
        }
    }

    #[derive(Default)]
    struct EventLog {
        states: Mutex<Vec<RecordingState>>,
        errors: Mutex<Vec<CaptureError>>,
        finished: Mutex<Vec<RecordingResult>>,
        level_updates: AtomicUsize,
    }

    impl CaptureDelegate for EventLog {
        fn on_state_changed(&self, state: RecordingState) {
            self.states.lock().push(state);
        }

        fn on_levels_updated(&self, _levels: &AudioLevels) {
            self.level_updates.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, error: &CaptureError) {
            self.errors.lock().push(error.clone());
        }

        fn on_recording_finished(&self, result: &RecordingResult) {
            self.finished.lock().push(result.clone());
        }
    }

    fn config() -> CaptureConfiguration {
        CaptureConfiguration {
            output_directory: PathBuf::from("annotations"),
            ..Default::default()
        }
    }

    fn session(
        provider: &ManualProvider,
        writer: &FakeWriter,
    ) -> RecordingSession<ManualProvider, FakeWriter> {
        RecordingSession::new(provider.clone(), writer.clone(), config()).unwrap()
    }

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32 / 1000.0).collect()
    }

    #[test]
    fn stop_writes_blocks_in_delivery_order() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        session.start("cat.wav").unwrap();
        assert!(session.state().is_active());
        assert!(provider.deliver(ramp(0, 100)));
        assert!(provider.deliver(ramp(100, 150)));

        let result = session.stop().unwrap();

        let writes = writer.writes.lock();
        assert_eq!(writes.len(), 1);
        let written = &writes[0];
        assert_eq!(written.samples.len(), 250);
        assert_eq!(written.samples, ramp(0, 250));
        assert_eq!(written.sample_rate, 44100);
        assert_eq!(written.bit_depth, 16);
        assert_eq!(written.path, PathBuf::from("annotations").join("cat.wav"));
        let path = &written.path;

        assert_eq!(result.target, "cat.wav");
        assert_eq!(result.sample_count, 250);
        assert_eq!(result.file_path, *path);
        assert!(session.state().is_idle());
        assert_eq!(session.buffered_sample_count(), 0);
        assert_eq!(provider.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_without_blocks_reports_no_audio_and_writes_nothing() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        session.start("cat.wav").unwrap();
        assert_eq!(session.stop().unwrap_err(), CaptureError::NoAudioCaptured);

        assert!(writer.writes.lock().is_empty());
        assert!(session.state().is_idle());
        assert_eq!(session.last_outcome(), Some(Err(CaptureError::NoAudioCaptured)));
    }

    #[test]
    fn stop_while_idle_is_invalid_state() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        assert!(matches!(session.stop(), Err(CaptureError::InvalidState(_))));
        assert!(session.state().is_idle());
        assert_eq!(session.buffered_sample_count(), 0);
        assert_eq!(provider.stop_calls.load(Ordering::SeqCst), 0);
        assert!(session.last_outcome().is_none());
    }

    #[test]
    fn start_while_active_keeps_buffer() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.5; 64]);

        assert_eq!(session.start("dog.wav"), Err(CaptureError::AlreadyRecording));
        assert_eq!(session.buffered_sample_count(), 64);
        assert_eq!(session.target().as_deref(), Some("cat.wav"));

        provider.deliver(vec![0.25; 16]);
        let result = session.stop().unwrap();
        assert_eq!(result.sample_count, 80);
        assert_eq!(result.target, "cat.wav");
    }

    #[test]
    fn device_failure_leaves_session_idle() {
        let provider = ManualProvider::failing();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        let err = session.start("cat.wav").unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert!(session.state().is_idle());
        assert_eq!(session.buffered_sample_count(), 0);
        assert!(session.target().is_none());
        assert!(matches!(session.stop(), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn write_failure_returns_to_idle_with_cause() {
        let provider = ManualProvider::default();
        let writer = FakeWriter {
            fail_with: Some(CaptureError::StorageError("disk full".into())),
            ..Default::default()
        };
        let session = session(&provider, &writer);

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.1; 32]);

        match session.stop() {
            Err(CaptureError::WriteFailed(cause)) => assert!(cause.contains("disk full")),
            other => panic!("expected WriteFailed, got {:?}", other),
        }
        assert!(session.state().is_idle());
        assert_eq!(session.buffered_sample_count(), 0);

        // The session is reusable after a failed flush.
        session.start("cat.wav").unwrap();
        assert!(session.state().is_active());
    }

    #[test]
    fn blocks_after_stop_are_discarded() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.3; 10]);
        session.stop().unwrap();

        assert!(!provider.deliver(vec![0.9; 10]));
        provider.deliver_late(vec![0.9; 10]);

        assert_eq!(session.buffered_sample_count(), 0);
        assert_eq!(session.diagnostics().blocks_discarded, 1);
        assert_eq!(writer.writes.lock()[0].samples, vec![0.3; 10]);
    }

    #[test]
    fn abort_discards_without_writing() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.3; 10]);
        session.abort().unwrap();

        assert!(session.state().is_idle());
        assert_eq!(session.buffered_sample_count(), 0);
        assert!(writer.writes.lock().is_empty());
        assert!(matches!(session.abort(), Err(CaptureError::InvalidState(_))));
        assert!(session.last_outcome().is_none());
    }

    #[test]
    fn invalid_target_is_rejected_before_capture() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        let err = session.start("../escape.wav").unwrap_err();
        assert!(matches!(err, CaptureError::InvalidTarget(_)));
        assert!(session.state().is_idle());
        assert!(!provider.is_capturing());
    }

    #[test]
    fn delegate_sees_transitions_and_outcomes() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);
        let events = Arc::new(EventLog::default());
        session.set_delegate(events.clone());

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.5; 8]);
        provider.deliver(vec![0.5; 8]);
        session.stop().unwrap();

        session.start("dog.wav").unwrap();
        let _ = session.stop();

        assert_eq!(
            *events.states.lock(),
            vec![
                RecordingState::Active,
                RecordingState::Flushing,
                RecordingState::Idle,
                RecordingState::Active,
                RecordingState::Flushing,
                RecordingState::Idle,
            ]
        );
        assert_eq!(events.level_updates.load(Ordering::SeqCst), 2);
        assert_eq!(events.finished.lock().len(), 1);
        assert_eq!(*events.errors.lock(), vec![CaptureError::NoAudioCaptured]);
    }

    #[test]
    fn levels_and_diagnostics_track_accepted_blocks() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.5, -0.5, 0.5, -0.5]);

        let levels = session.current_levels();
        assert!((levels.level - 0.5).abs() < 1e-6);
        assert!((levels.peak_level - 0.5).abs() < 1e-6);
        assert_eq!(
            session.diagnostics(),
            CaptureSessionDiagnostics {
                blocks_received: 1,
                samples_received: 4,
                blocks_discarded: 0,
            }
        );
    }

    #[test]
    fn auto_stop_timer_flushes_and_reports() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = RecordingSession::new(
            provider.clone(),
            writer.clone(),
            CaptureConfiguration {
                max_duration_secs: Some(0.05),
                ..config()
            },
        )
        .unwrap();
        let events = Arc::new(EventLog::default());
        session.set_delegate(events.clone());

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.2; 100]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !session.state().is_idle() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(session.state().is_idle());
        assert_eq!(writer.writes.lock().len(), 1);
        assert!(matches!(session.last_outcome(), Some(Ok(ref r)) if r.sample_count == 100));
        assert_eq!(events.finished.lock().len(), 1);
        assert!(matches!(session.stop(), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn manual_stop_cancels_auto_stop() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = RecordingSession::new(
            provider.clone(),
            writer.clone(),
            CaptureConfiguration {
                max_duration_secs: Some(0.2),
                ..config()
            },
        )
        .unwrap();

        session.start("cat.wav").unwrap();
        provider.deliver(vec![0.2; 10]);
        session.stop().unwrap();

        session.start("dog.wav").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(session.state().is_active());
        session.abort().unwrap();
        assert_eq!(writer.writes.lock().len(), 1);
    }

    #[test]
    fn configure_only_while_idle() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        session
            .configure(CaptureConfiguration {
                bit_depth: 32,
                ..config()
            })
            .unwrap();
        session.start("cat.wav").unwrap();
        assert!(matches!(
            session.configure(config()),
            Err(CaptureError::InvalidState(_))
        ));

        provider.deliver(vec![0.1; 16]);
        let result = session.stop().unwrap();
        assert_eq!(writer.writes.lock()[0].bit_depth, 32);
        assert_eq!(result.metadata.bit_depth, 32);
    }

    #[test]
    fn session_rate_must_match_provider_rate() {
        let mismatched = RecordingSession::new(
            SyntheticCapture::new(8000, 80),
            FakeWriter::default(),
            config(),
        );
        assert!(matches!(mismatched, Err(CaptureError::ConfigurationFailed(_))));

        let writer = FakeWriter::default();
        let session = RecordingSession::new(
            SyntheticCapture::new(44100, 441),
            writer.clone(),
            config(),
        )
        .unwrap();
        let rejected = session.configure(CaptureConfiguration {
            sample_rate: 8000,
            ..config()
        });
        assert!(matches!(rejected, Err(CaptureError::ConfigurationFailed(_))));
        assert_eq!(session.config().sample_rate, 44100);

        session.start("cat.wav").unwrap();
        thread::sleep(Duration::from_millis(50));
        session.stop().unwrap();
        assert_eq!(writer.writes.lock()[0].sample_rate, 44100);
    }

    #[test]
    fn configure_rejects_provider_owned_settings() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        let session = session(&provider, &writer);

        let device = session.configure(CaptureConfiguration {
            mic_device_name: Some("USB Mic".into()),
            ..config()
        });
        assert!(matches!(device, Err(CaptureError::ConfigurationFailed(_))));

        let block = session.configure(CaptureConfiguration {
            block_frames: Some(256),
            ..config()
        });
        assert!(matches!(block, Err(CaptureError::ConfigurationFailed(_))));
        assert_eq!(session.config(), config());
    }

    #[test]
    fn elapsed_time_counts_only_while_active() {
        let session = RecordingSession::new(
            SyntheticCapture::new(44100, 441),
            FakeWriter::default(),
            config(),
        )
        .unwrap();
        assert_eq!(session.elapsed_secs(), 0.0);

        session.start("cat.wav").unwrap();
        thread::sleep(Duration::from_millis(40));
        let elapsed = session.elapsed_secs();
        assert!(elapsed >= 0.04, "elapsed {}", elapsed);
        assert!(session.elapsed_secs() >= elapsed);

        session.stop().unwrap();
        assert_eq!(session.elapsed_secs(), 0.0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let result = RecordingSession::new(
            ManualProvider::default(),
            FakeWriter::default(),
            CaptureConfiguration {
                channels: 2,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn dropping_active_session_stops_provider() {
        let provider = ManualProvider::default();
        let writer = FakeWriter::default();
        {
            let session = session(&provider, &writer);
            session.start("cat.wav").unwrap();
            provider.deliver(vec![0.1; 16]);
        }
        assert!(!provider.is_capturing());
        assert!(writer.writes.lock().is_empty());
    }
}
