use crate::models::audio_models::AudioBlock;

/// Append-only list of captured blocks with an acceptance gate.
///
/// The session wraps this in `Arc<parking_lot::Mutex<_>>`. The capture
/// callback appends through `push`; `stop()` closes the gate and drains.
/// Once closed, `push` refuses blocks until the buffer is reopened, so a
/// block racing a stop can never land in the flushed output.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    blocks: Vec<AudioBlock>,
    sample_count: usize,
    accepting: bool,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear any content and start accepting blocks.
    pub fn open(&mut self) {
        self.clear();
        self.accepting = true;
    }

    /// Stop accepting blocks. Content is kept until drained or cleared.
    pub fn close(&mut self) {
        self.accepting = false;
    }

    /// Append a block. Returns `false` (and drops the block) when closed.
    pub fn push(&mut self, block: AudioBlock) -> bool {
        if !self.accepting {
            return false;
        }
        if let Some(last) = self.blocks.last() {
            if block.sequence <= last.sequence {
                log::warn!(
                    "block sequence went backwards ({} after {})",
                    block.sequence,
                    last.sequence
                );
            }
        }
        self.sample_count += block.len();
        self.blocks.push(block);
        true
    }

    /// Concatenate all blocks in arrival order and empty the buffer.
    pub fn drain(&mut self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.sample_count);
        for block in self.blocks.drain(..) {
            samples.extend_from_slice(&block.samples);
        }
        self.sample_count = 0;
        samples
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.blocks.shrink_to_fit();
        self.sample_count = 0;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total samples across all buffered blocks.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
