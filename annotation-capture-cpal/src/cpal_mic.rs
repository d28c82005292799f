//! cpal microphone capture provider.
//!
//! Opens the input device on a dedicated thread (cpal streams are not `Send`
//! on every host), converts whatever the device delivers to mono f32 at the
//! configured rate, and hands each buffer to the `BlockCallback`.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, FromSample, SampleFormat, SizedSample, StreamConfig, StreamError};
use parking_lot::Mutex;

use annotation_capture_core::models::audio_models::{AudioBlock, AudioSource};
use annotation_capture_core::models::config::CaptureConfiguration;
use annotation_capture_core::models::error::CaptureError;
use annotation_capture_core::processing::sample_converter::{
    downmix_to_mono, SampleConverter, StreamResampler,
};
use annotation_capture_core::traits::capture_provider::{BlockCallback, CaptureProvider};

use crate::device_enumerator::DeviceEnumerator;

type CallbackSlot = Arc<Mutex<Option<BlockCallback>>>;

/// Format the device actually runs at, before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

/// cpal microphone capture.
///
/// The stream lives on a `cpal-mic-capture` thread for its whole lifetime;
/// `stop()` clears the callback slot (waiting out any in-flight delivery),
/// then signals the thread to drop the stream and joins it.
pub struct CpalMicCapture {
    device_name: Option<String>,
    target_sample_rate: u32,
    block_frames: Option<u32>,
    callback: CallbackSlot,
    stop_signal: Option<mpsc::Sender<()>>,
    capture_handle: Option<thread::JoinHandle<()>>,
    device_format: Option<DeviceFormat>,
}

impl CpalMicCapture {
    /// Capture from the host's default input device.
    pub fn default_device(target_sample_rate: u32) -> Self {
        Self {
            device_name: None,
            target_sample_rate,
            block_frames: None,
            callback: Arc::new(Mutex::new(None)),
            stop_signal: None,
            capture_handle: None,
            device_format: None,
        }
    }

    /// Capture from the input device called `name`.
    pub fn with_device(name: String, target_sample_rate: u32) -> Self {
        let mut capture = Self::default_device(target_sample_rate);
        capture.device_name = Some(name);
        capture
    }

    /// Device, rate and buffer size taken from a session configuration.
    pub fn from_configuration(config: &CaptureConfiguration) -> Self {
        let mut capture = Self::default_device(config.sample_rate);
        capture.device_name = config.mic_device_name.clone();
        capture.block_frames = config.block_frames;
        capture
    }

    /// Native format of the open device, while capturing.
    pub fn device_format(&self) -> Option<DeviceFormat> {
        self.device_format
    }
}

impl CaptureProvider for CpalMicCapture {
    fn is_available(&self) -> bool {
        DeviceEnumerator::new()
            .find_capture_device(self.device_name.as_deref())
            .is_ok()
    }

    fn start(&mut self, callback: BlockCallback) -> Result<(), CaptureError> {
        if self.capture_handle.is_some() {
            return Err(CaptureError::InvalidState("mic capture already running".into()));
        }

        *self.callback.lock() = Some(callback);

        let (ready_tx, ready_rx) = mpsc::channel::<Result<DeviceFormat, CaptureError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let slot = Arc::clone(&self.callback);
        let device_name = self.device_name.clone();
        let target_sample_rate = self.target_sample_rate;
        let block_frames = self.block_frames;

        let spawned = thread::Builder::new()
            .name("cpal-mic-capture".into())
            .spawn(move || {
                let stream = match open_input_stream(
                    device_name.as_deref(),
                    target_sample_rate,
                    block_frames,
                    slot,
                ) {
                    Ok((stream, format)) => {
                        let _ = ready_tx.send(Ok(format));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stop() signals or the provider is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("mic stream closed");
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.callback.lock().take();
                return Err(CaptureError::Unknown(format!("failed to spawn mic thread: {}", e)));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(format)) => {
                log::info!(
                    "mic capture started: device {} Hz, {} ch, {:?} → {} Hz mono",
                    format.sample_rate,
                    format.channels,
                    format.sample_format,
                    target_sample_rate
                );
                self.device_format = Some(format);
                self.stop_signal = Some(stop_tx);
                self.capture_handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.callback.lock().take();
                let _ = handle.join();
                log::error!("mic capture failed to start: {}", e);
                Err(e)
            }
            Err(_) => {
                self.callback.lock().take();
                let _ = handle.join();
                Err(CaptureError::Unknown(
                    "capture thread exited before opening the device".into(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.callback.lock().take();
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("mic capture thread panicked");
            }
            log::info!("mic capture stopped");
        }
        self.device_format = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capture_handle.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    fn device_info(&self) -> AudioSource {
        match self.device_name {
            Some(ref name) => AudioSource {
                id: name.clone(),
                name: name.clone(),
                is_default: false,
            },
            None => AudioSource {
                id: "default-mic".into(),
                name: "Default Microphone".into(),
                is_default: true,
            },
        }
    }
}

impl Drop for CpalMicCapture {
    fn drop(&mut self) {
        if self.capture_handle.is_some() {
            log::debug!("dropping active CpalMicCapture, cleaning up");
            let _ = self.stop();
        }
    }
}

/// Open the device and start a playing input stream. Runs on the capture thread.
fn open_input_stream(
    device_name: Option<&str>,
    target_sample_rate: u32,
    block_frames: Option<u32>,
    slot: CallbackSlot,
) -> Result<(cpal::Stream, DeviceFormat), CaptureError> {
    let device = DeviceEnumerator::new().find_capture_device(device_name)?;

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("no usable input config: {}", e)))?;

    let format = DeviceFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
        sample_format: supported.sample_format(),
    };

    let mut config: StreamConfig = supported.config();
    if let Some(frames) = block_frames {
        config.buffer_size = BufferSize::Fixed(frames);
    }

    let stream = match format.sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, target_sample_rate, slot)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, target_sample_rate, slot)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &config, target_sample_rate, slot)?,
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to start stream: {}", e)))?;

    Ok((stream, format))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    target_sample_rate: u32,
    slot: CallbackSlot,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let mut converter = InputConverter::new(config, target_sample_rate);
    let mut sequence = 0u64;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples = converter.convert(data);
                if samples.is_empty() {
                    return;
                }

                let guard = slot.lock();
                if let Some(callback) = guard.as_ref() {
                    callback(AudioBlock::new(sequence, samples));
                    sequence += 1;
                }
            },
            log_stream_error,
            None,
        )
        .map_err(map_build_error)
}

/// Turns successive device buffers into mono f32 at the session rate.
///
/// Lives inside the stream callback so the resampler's phase carries over
/// from one device buffer to the next.
pub(crate) struct InputConverter {
    channels: usize,
    resampler: StreamResampler,
    scratch: Vec<f32>,
}

impl InputConverter {
    pub(crate) fn new(config: &StreamConfig, target_sample_rate: u32) -> Self {
        let converter = SampleConverter::new(target_sample_rate as f64);
        Self {
            channels: config.channels as usize,
            resampler: converter.stream(config.sample_rate.0 as f64),
            scratch: Vec::new(),
        }
    }

    pub(crate) fn convert<T>(&mut self, data: &[T]) -> Vec<f32>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        convert_into(data, &mut self.scratch);
        if self.channels > 1 {
            let mono = downmix_to_mono(&self.scratch, self.channels);
            self.resampler.process(&mono)
        } else {
            self.resampler.process(&self.scratch)
        }
    }
}

/// Convert device samples of any supported type to f32, reusing `out`.
pub(crate) fn convert_into<T>(data: &[T], out: &mut Vec<f32>)
where
    T: SizedSample,
    f32: FromSample<T>,
{
    out.clear();
    out.extend(data.iter().map(|&s| -> f32 { cpal::Sample::from_sample(s) }));
}

/// Stream errors are advisory: logged, never surfaced to the session.
fn log_stream_error(err: StreamError) {
    match err {
        StreamError::DeviceNotAvailable => {
            log::error!("input device became unavailable during capture")
        }
        StreamError::BackendSpecific { err } => {
            log::warn!("input stream reported a non-fatal condition: {}", err)
        }
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::StreamConfigNotSupported | cpal::BuildStreamError::InvalidArgument => {
            CaptureError::ConfigurationFailed(format!("input stream rejected configuration: {}", err))
        }
        other => CaptureError::DeviceUnavailable(format!("failed to open input stream: {}", other)),
    }
}
