/// Converts raw device audio into mono samples at a fixed rate, and meters it.
///
/// Downmixing averages channels; resampling is linear interpolation. Pure
/// math, no platform dependencies.
#[derive(Debug, Clone)]
pub struct SampleConverter {
    pub target_sample_rate: f64,
}

impl SampleConverter {
    pub fn new(target_sample_rate: f64) -> Self {
        Self { target_sample_rate }
    }

    /// Resampler for a continuous stream arriving at `source_sample_rate`.
    pub fn stream(&self, source_sample_rate: f64) -> StreamResampler {
        StreamResampler::new(source_sample_rate, self.target_sample_rate)
    }

    /// Resample one self-contained buffer of mono audio.
    ///
    /// Returns input unchanged if rates match.
    pub fn resample(&self, samples: &[f32], source_sample_rate: f64) -> Vec<f32> {
        self.stream(source_sample_rate).process(samples)
    }

    /// RMS level of samples (0.0–1.0 for normalized audio).
    pub fn rms_level(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    /// Peak absolute level of samples.
    pub fn peak_level(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }
}

/// Linear-interpolation resampler that carries its phase across buffers.
///
/// Output positions are spaced `source / target` input samples apart over
/// the whole stream, not per buffer, so splitting the input into buffers of
/// any size yields the same samples at the same overall rate. The last input
/// sample is kept to interpolate across a buffer boundary.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    step: f64,
    /// Next output position, in input samples relative to the next buffer's
    /// first sample. In `(-1, 0]` once a buffer has been consumed.
    position: f64,
    previous: Option<f32>,
    passthrough: bool,
}

impl StreamResampler {
    pub fn new(source_sample_rate: f64, target_sample_rate: f64) -> Self {
        Self {
            step: source_sample_rate / target_sample_rate,
            position: 0.0,
            previous: None,
            passthrough: (source_sample_rate - target_sample_rate).abs() < 0.01,
        }
    }

    /// Resample the next buffer of the stream.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.passthrough || input.is_empty() {
            return input.to_vec();
        }

        let len = input.len();
        let last = (len - 1) as f64;
        let mut output = Vec::with_capacity((len as f64 / self.step) as usize + 1);

        while self.position <= last {
            let index = self.position.floor();
            let fraction = (self.position - index) as f32;
            let index = index as isize;

            let a = if index < 0 {
                self.previous.unwrap_or(input[0])
            } else {
                input[index as usize]
            };
            let b = input.get((index + 1) as usize).copied().unwrap_or(a);
            output.push(a + (b - a) * fraction);

            self.position += self.step;
        }

        self.position -= len as f64;
        self.previous = Some(input[len - 1]);
        output
    }

    /// Forget stream history, as if no input had been seen.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.previous = None;
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
///
/// A trailing partial frame is dropped.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn resample_same_rate_is_identity() {
        let converter = SampleConverter::new(44100.0);
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(converter.resample(&input, 44100.0), input);
    }

    #[test]
    fn resample_halves_length_when_downsampling() {
        let converter = SampleConverter::new(22050.0);
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let output = converter.resample(&input, 44100.0);
        assert_eq!(output.len(), 50);
        assert_abs_diff_eq!(output[10], input[20], epsilon = 1e-6);
    }

    #[test]
    fn resample_upsampling_interpolates() {
        let converter = SampleConverter::new(88200.0);
        let output = converter.resample(&[0.0, 1.0], 44100.0);
        assert_eq!(output.len(), 3);
        assert_abs_diff_eq!(output[0], 0.0);
        assert_abs_diff_eq!(output[1], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(output[2], 1.0);
    }

    #[test]
    fn streamed_blocks_keep_the_target_rate() {
        let converter = SampleConverter::new(44100.0);
        let mut resampler = converter.stream(48000.0);
        let block = vec![0.1f32; 512];
        let blocks = 937;

        let total: usize = (0..blocks).map(|_| resampler.process(&block).len()).sum();
        let expected = (blocks as f64 * 512.0 * 44100.0 / 48000.0).round() as i64;
        assert!((total as i64 - expected).abs() <= 1, "got {}, expected {}", total, expected);
    }

    #[test]
    fn block_boundaries_do_not_change_output() {
        let input: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.013).sin()).collect();
        let whole = SampleConverter::new(44100.0).resample(&input, 48000.0);

        let mut resampler = StreamResampler::new(48000.0, 44100.0);
        let mut pieces = Vec::new();
        let mut offset = 0;
        for n in [100usize, 512, 7, 1, 1000, 2476] {
            pieces.extend(resampler.process(&input[offset..offset + n]));
            offset += n;
        }
        assert_eq!(offset, input.len());

        assert_eq!(pieces.len(), whole.len());
        for (a, b) in pieces.iter().zip(&whole) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[test]
    fn reset_starts_a_fresh_stream() {
        let mut resampler = StreamResampler::new(48000.0, 16000.0);
        let first = resampler.process(&[0.0, 0.3, 0.6, 0.9, 1.2]);
        resampler.reset();
        assert_eq!(resampler.process(&[0.0, 0.3, 0.6, 0.9, 1.2]), first);
    }

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix_to_mono(&[0.2, 0.8, 0.4, 0.6], 2);
        assert_eq!(mono.len(), 2);
        assert_abs_diff_eq!(mono[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(mono[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn downmix_drops_partial_frame() {
        let mono = downmix_to_mono(&[1.0, 1.0, 1.0, 0.0, 0.0], 3);
        assert_eq!(mono.len(), 1);
        assert_abs_diff_eq!(mono[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn levels() {
        assert_eq!(SampleConverter::rms_level(&[]), 0.0);
        assert_abs_diff_eq!(SampleConverter::rms_level(&[0.5, -0.5]), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(SampleConverter::peak_level(&[0.1, -0.9, 0.3]), 0.9);
    }
}
