//! Read side of the master analysis tap.

use rtrb::Consumer;

/// Mono master samples for visualisers.
///
/// The audio thread pushes every post-gain master sample and drops them when
/// the ring is full, so a reader that falls behind loses data rather than
/// stalling playback.
pub struct AnalysisTap {
    consumer: Consumer<f32>,
    sample_rate: u32,
}

impl AnalysisTap {
    pub(crate) fn new(consumer: Consumer<f32>, sample_rate: u32) -> Self {
        Self {
            consumer,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples waiting to be read.
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }

    /// Copies as many pending samples as fit into `out`; returns the count.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.consumer.slots());
        let Ok(chunk) = self.consumer.read_chunk(count) else {
            return 0;
        };

        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..count].copy_from_slice(second);
        chunk.commit_all();

        count
    }
}
