//! Per-class sample collection
//!
//! A [`SampleCollector`] accumulates decoded frames for the class currently
//! being recorded. Once exactly `quota` frames are held it stops accepting
//! frames and converts the batch, in arrival order, into labeled samples.

use log::{debug, warn};

use crate::decoder::FrameDecoder;
use crate::error::{FormatError, TrackerError};
use crate::features::FeatureProjector;
use crate::transport::PacketSource;
use crate::types::{ClassId, Frame, LabeledSample};

/// Collection progress after offering one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub collected: usize,
    pub quota: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.collected >= self.quota
    }
}

/// Quota-bounded frame accumulator for one class
#[derive(Debug, Clone)]
pub struct SampleCollector {
    class_id: ClassId,
    quota: usize,
    frames: Vec<Frame>,
}

impl SampleCollector {
    pub fn new(class_id: ClassId, quota: usize) -> Self {
        Self {
            class_id,
            quota,
            frames: Vec::with_capacity(quota),
        }
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Number of frames accumulated so far
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.quota
    }

    pub fn progress(&self) -> Progress {
        Progress {
            collected: self.frames.len(),
            quota: self.quota,
        }
    }

    /// Append a decoded frame. Returns `false` and drops the frame once the
    /// quota has been reached.
    pub fn push(&mut self, frame: Frame) -> bool {
        if self.is_full() {
            return false;
        }
        self.frames.push(frame);
        debug!(
            "Class {}: sample {}/{}",
            self.class_id,
            self.frames.len(),
            self.quota
        );
        true
    }

    /// Decode a raw packet and append it.
    ///
    /// A malformed packet leaves the collector unchanged.
    pub fn offer(&mut self, packet: &[u8]) -> Result<Progress, FormatError> {
        let frame = FrameDecoder::decode(packet)?;
        self.push(frame);
        Ok(self.progress())
    }

    /// Consume packets from `source` in order until the quota is reached,
    /// then return the labeled batch.
    ///
    /// Malformed packets are logged and skipped. A finite source running dry
    /// before the quota is met is a transport error.
    pub fn collect<S: PacketSource + ?Sized>(
        mut self,
        source: &mut S,
    ) -> Result<Vec<LabeledSample>, TrackerError> {
        while !self.is_full() {
            let packet = source.recv()?.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "packet source ended after {}/{} samples of class {}",
                        self.frames.len(),
                        self.quota,
                        self.class_id
                    ),
                )
            })?;

            if let Err(e) = self.offer(&packet) {
                warn!("Dropping packet while recording class {}: {}", self.class_id, e);
            }
        }

        Ok(self.into_samples())
    }

    /// Project every accumulated frame and tag it with this collector's class
    pub fn into_samples(self) -> Vec<LabeledSample> {
        let label = self.class_id;
        self.frames
            .iter()
            .map(|frame| LabeledSample {
                label,
                features: FeatureProjector::project(frame),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::tests::synthetic_frame;
    use std::collections::VecDeque;

    fn packets(seeds: &[f32]) -> VecDeque<Vec<u8>> {
        seeds
            .iter()
            .map(|s| FrameDecoder::encode(&synthetic_frame(*s)))
            .collect()
    }

    #[test]
    fn test_quota_is_exact() {
        for quota in [1usize, 3, 7] {
            let mut source = packets(&[0.0; 10]);
            let samples = SampleCollector::new(2, quota).collect(&mut source).unwrap();

            assert_eq!(samples.len(), quota);
            assert!(samples.iter().all(|s| s.label == 2));
            // Nothing beyond the quota was consumed
            assert_eq!(source.len(), 10 - quota);
        }
    }

    #[test]
    fn test_samples_keep_arrival_order() {
        let seeds = [0.1, 0.2, 0.3];
        let mut source = packets(&seeds);
        let samples = SampleCollector::new(1, 3).collect(&mut source).unwrap();

        for (sample, seed) in samples.iter().zip(seeds.iter()) {
            let expected = FeatureProjector::project(&synthetic_frame(*seed));
            assert_eq!(sample.features, expected);
        }
    }

    #[test]
    fn test_malformed_packet_leaves_count_unchanged() {
        let mut collector = SampleCollector::new(1, 3);
        collector
            .offer(&FrameDecoder::encode(&synthetic_frame(0.0)))
            .unwrap();
        assert_eq!(collector.len(), 1);

        let result = collector.offer(&[0u8; 12]);
        assert!(matches!(result, Err(FormatError::WrongLength { actual: 12, .. })));
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_collect_skips_malformed_packets() {
        let mut source = packets(&[0.0, 0.0]);
        source.insert(1, vec![0u8; 100]);

        let samples = SampleCollector::new(1, 2).collect(&mut source).unwrap();
        assert_eq!(samples.len(), 2);
        assert!(source.is_empty());
    }

    #[test]
    fn test_push_rejected_after_quota() {
        let mut collector = SampleCollector::new(1, 2);
        assert!(collector.push(synthetic_frame(0.0)));
        assert!(collector.push(synthetic_frame(0.0)));
        assert!(!collector.push(synthetic_frame(0.0)));
        assert_eq!(collector.len(), 2);
        assert!(collector.progress().is_complete());
    }

    #[test]
    fn test_exhausted_source_is_transport_error() {
        let mut source = packets(&[0.0]);
        let result = SampleCollector::new(1, 2).collect(&mut source);
        assert!(matches!(result, Err(TrackerError::Transport(_))));
    }
}
