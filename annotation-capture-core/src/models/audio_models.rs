/// A chunk of consecutively sampled mono audio, in arrival order.
///
/// `sequence` starts at 0 for each capture run and increases by one per block.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub sequence: u64,
    pub samples: Vec<f32>,
}

impl AudioBlock {
    pub fn new(sequence: u64, samples: Vec<f32>) -> Self {
        Self { sequence, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// An input device available for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Real-time input level metering (RMS and peak, 0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioLevels {
    pub level: f32,
    pub peak_level: f32,
}

/// Counters for debugging a recording session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSessionDiagnostics {
    pub blocks_received: u64,
    pub samples_received: u64,
    /// Blocks that arrived after `stop()` or `abort()` was accepted.
    pub blocks_discarded: u64,
}
