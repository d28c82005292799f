use std::fs;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::traits::audio_writer::AudioFileWriter;

/// Mono WAV writer backed by `hound`.
///
/// ## File Format
///
/// ```text
/// bit_depth 16 → [RIFF/WAVE header, format 1] [i16 PCM, samples clamped to ±1.0]
/// bit_depth 32 → [RIFF/WAVE header, format 3] [f32 IEEE float]
/// ```
///
/// The file is staged next to the target and renamed over it once
/// finalized, so a failed write never truncates an existing recording. The
/// returned checksum is the SHA-256 hex digest of the finished file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavFileWriter;

impl WavFileWriter {
    pub fn new() -> Self {
        Self
    }
}

fn wav_spec(sample_rate: u32, bit_depth: u16) -> Result<WavSpec, CaptureError> {
    let sample_format = match bit_depth {
        16 => SampleFormat::Int,
        32 => SampleFormat::Float,
        other => {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported bit depth: {}",
                other
            )))
        }
    };
    Ok(WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: bit_depth,
        sample_format,
    })
}

impl AudioFileWriter for WavFileWriter {
    fn write(
        &self,
        samples: &[f32],
        sample_rate: u32,
        bit_depth: u16,
        path: &Path,
    ) -> Result<String, CaptureError> {
        let spec = wav_spec(sample_rate, bit_depth)?;

        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent)
                    .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
                parent
            }
            None => Path::new("."),
        };

        let mut staging = tempfile::Builder::new()
            .prefix(".annotation-")
            .suffix(".wav.part")
            .tempfile_in(dir)
            .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;

        {
            let mut writer = WavWriter::new(BufWriter::new(staging.as_file_mut()), spec)
                .map_err(|e| CaptureError::StorageError(format!("failed to start file: {}", e)))?;

            let written = if bit_depth == 32 {
                samples.iter().try_for_each(|&s| writer.write_sample(s))
            } else {
                samples.iter().try_for_each(|&s| writer.write_sample(sample_to_i16(s)))
            };
            written.map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;

            writer
                .finalize()
                .map_err(|e| CaptureError::StorageError(format!("failed to finalize file: {}", e)))?;
        }

        let checksum = sha256_file(staging.path())?;
        staging.persist(path).map_err(|e| {
            CaptureError::StorageError(format!("failed to replace {}: {}", path.display(), e.error))
        })?;

        log::debug!("wrote {} samples to {}", samples.len(), path.display());
        Ok(checksum)
    }
}

/// Read a WAV file back as mono f32 samples.
///
/// Returns the samples and the file's sample rate. Multi-channel files are
/// rejected.
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), CaptureError> {
    let reader = WavReader::open(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to open {}: {}", path.display(), e)))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(CaptureError::StorageError(format!(
            "expected mono file, got {} channels",
            spec.channels
        )));
    }

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>(),
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<Vec<_>, _>>(),
        (format, bits) => {
            return Err(CaptureError::StorageError(format!(
                "unsupported sample format: {:?} {}-bit",
                format, bits
            )))
        }
    }
    .map_err(|e| CaptureError::StorageError(format!("failed to read samples: {}", e)))?;

    Ok((samples, spec.sample_rate))
}

/// Convert an f32 sample in `[-1.0, 1.0]` to i16, clamping out-of-range values.
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data = fs::read(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
