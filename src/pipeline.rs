//! Pipeline orchestration
//!
//! This module provides the public API for osf-expression. The
//! [`TrainingOrchestrator`] sequences a run through explicit states:
//!
//! ```text
//! AwaitingClass(1) -> Collecting(1) -> AwaitingClass(2) -> ... -> Collecting(n)
//!     -> Training -> Trained -> Inferring
//! ```
//!
//! Inferring is terminal. Once training starts there is no way back to
//! collection; the model is fixed for the lifetime of the orchestrator.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::classifier::{Classifier, Trainer};
use crate::collector::{Progress, SampleCollector};
use crate::config::Config;
use crate::dataset::Dataset;
use crate::decoder::FrameDecoder;
use crate::error::{FormatError, TrackerError};
use crate::features::FeatureProjector;
use crate::labels::LabelTable;
use crate::transport::PacketSource;
use crate::types::{ClassId, Frame, LabeledSample, Prediction};

/// Observable state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the operator to start recording this class
    AwaitingClass(ClassId),
    /// Recording samples for this class
    Collecting(ClassId),
    Training,
    Trained,
    Inferring,
}

/// Outcome of handling one packet
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Packet arrived while no class was being recorded
    Ignored,
    /// Packet did not decode and was dropped
    Dropped(FormatError),
    /// Sample recorded; the current class still needs more
    Collected(Progress),
    /// The class reached its quota and the next class is awaited
    ClassComplete { class_id: ClassId, next: ClassId },
    /// The last class reached its quota and a model was trained
    Trained { samples: usize },
    Prediction(Prediction),
}

enum State<M> {
    AwaitingClass(ClassId),
    Collecting(SampleCollector),
    Training,
    Trained(M),
    Inferring(M),
}

impl<M> State<M> {
    fn name(&self) -> &'static str {
        match self {
            State::AwaitingClass(_) => "awaiting a class",
            State::Collecting(_) => "collecting",
            State::Training => "training",
            State::Trained(_) => "trained",
            State::Inferring(_) => "inferring",
        }
    }
}

/// State machine driving collection, training and inference
pub struct TrainingOrchestrator<T: Trainer> {
    trainer: T,
    labels: LabelTable,
    class_count: ClassId,
    samples_per_class: usize,
    state: State<T::Model>,
    batches: Vec<Vec<LabeledSample>>,
    rng: StdRng,
    export_dataset: Option<PathBuf>,
    session_id: String,
}

impl<T: Trainer> TrainingOrchestrator<T> {
    /// Create an orchestrator from a validated configuration.
    ///
    /// Fails unless every class id that will be recorded has a label, so
    /// that label resolution cannot fail during inference.
    pub fn new(config: &Config, trainer: T) -> Result<Self, TrackerError> {
        config.validate()?;

        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            trainer,
            labels: config.labels.clone(),
            class_count: config.classes(),
            samples_per_class: config.samples_per_class,
            state: State::AwaitingClass(1),
            batches: Vec::new(),
            rng,
            export_dataset: config.export_dataset.clone(),
            session_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            State::AwaitingClass(id) => Phase::AwaitingClass(*id),
            State::Collecting(collector) => Phase::Collecting(collector.class_id()),
            State::Training => Phase::Training,
            State::Trained(_) => Phase::Trained,
            State::Inferring(_) => Phase::Inferring,
        }
    }

    /// Progress of the class being recorded, if any
    pub fn progress(&self) -> Option<Progress> {
        match &self.state {
            State::Collecting(collector) => Some(collector.progress()),
            _ => None,
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn class_count(&self) -> ClassId {
        self.class_count
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Start recording the awaited class
    pub fn begin_class(&mut self) -> Result<ClassId, TrackerError> {
        let class_id = match self.state {
            State::AwaitingClass(class_id) => class_id,
            ref other => return Err(invalid("begin a class", other.name())),
        };

        let label = self.labels.resolve(class_id)?;
        info!(
            "Recording class {} ({}): {} samples",
            class_id, label, self.samples_per_class
        );
        self.state = State::Collecting(SampleCollector::new(class_id, self.samples_per_class));
        Ok(class_id)
    }

    /// Decode one packet and route it through the current state.
    ///
    /// Malformed packets are logged and reported as [`Step::Dropped`]; they
    /// never change the state. All returned errors are fatal to the run.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<Step, TrackerError> {
        match FrameDecoder::decode(packet) {
            Ok(frame) => self.handle_frame(frame),
            Err(e) => {
                warn!("Dropping packet ({}): {}", self.state.name(), e);
                Ok(Step::Dropped(e))
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Step, TrackerError> {
        match &mut self.state {
            State::AwaitingClass(_) => Ok(Step::Ignored),
            State::Collecting(collector) => {
                collector.push(frame);
                if !collector.is_full() {
                    return Ok(Step::Collected(collector.progress()));
                }
                self.finish_class()
            }
            State::Training => Err(invalid("process a packet", "training")),
            State::Trained(_) => {
                self.start_inference()?;
                self.classify(&frame)
            }
            State::Inferring(_) => self.classify(&frame),
        }
    }

    fn finish_class(&mut self) -> Result<Step, TrackerError> {
        let collector = match std::mem::replace(&mut self.state, State::Training) {
            State::Collecting(collector) => collector,
            other => {
                let err = invalid("finish a class", other.name());
                self.state = other;
                return Err(err);
            }
        };

        let class_id = collector.class_id();
        self.batches.push(collector.into_samples());
        let label = self.labels.resolve(class_id)?;
        info!("Class {} ({}) complete", class_id, label);

        if class_id < self.class_count {
            let next = class_id + 1;
            self.state = State::AwaitingClass(next);
            return Ok(Step::ClassComplete { class_id, next });
        }

        let samples = self.train()?;
        Ok(Step::Trained { samples })
    }

    /// Build the dataset and run the trainer. Entered exactly once.
    fn train(&mut self) -> Result<usize, TrackerError> {
        let batches = std::mem::take(&mut self.batches);
        let dataset = Dataset::build(batches, &mut self.rng);
        info!(
            "Training on {} samples ({:?} per class)",
            dataset.len(),
            dataset.class_counts()
        );

        // Export failures are logged; training still runs
        if let Some(path) = &self.export_dataset {
            match export(&dataset, path) {
                Ok(()) => info!("Dataset written to {}", path.display()),
                Err(e) => error!("Could not write dataset to {}: {}", path.display(), e),
            }
        }

        let model = self.trainer.train(&dataset).map_err(|e| {
            error!("{}", e);
            e
        })?;

        self.state = State::Trained(model);
        info!("Training complete");
        Ok(dataset.len())
    }

    /// Move from `Trained` to `Inferring`
    pub fn start_inference(&mut self) -> Result<(), TrackerError> {
        match std::mem::replace(&mut self.state, State::Training) {
            State::Trained(model) => {
                self.state = State::Inferring(model);
                info!("Inference started (session {})", self.session_id);
                Ok(())
            }
            other => {
                let err = invalid("start inference", other.name());
                self.state = other;
                Err(err)
            }
        }
    }

    fn classify(&self, frame: &Frame) -> Result<Step, TrackerError> {
        let State::Inferring(model) = &self.state else {
            return Err(invalid("classify a frame", self.state.name()));
        };

        let features = FeatureProjector::project(frame);
        let class_id = model.predict(&features);
        let label = self.labels.resolve(class_id).map_err(|e| {
            error!("Classifier returned class {} which has no label", class_id);
            e
        })?;
        debug!("Frame {:.3} -> {} ({})", frame.timestamp, class_id, label);

        Ok(Step::Prediction(Prediction {
            session_id: self.session_id.clone(),
            class_id,
            label: label.to_string(),
            frame_timestamp: frame.timestamp,
            tracking_id: frame.id,
            received_at: Utc::now(),
        }))
    }

    /// Drive the whole run from `source`.
    ///
    /// `operator` is called once per class before recording starts (e.g. to
    /// prompt for the expression to pose). `sink` receives every prediction.
    /// Returns only on a fatal error, or when a finite source runs dry during
    /// inference; running dry earlier is a transport error.
    pub fn run<S, O, F>(
        &mut self,
        source: &mut S,
        mut operator: O,
        mut sink: F,
    ) -> Result<(), TrackerError>
    where
        S: PacketSource + ?Sized,
        O: FnMut(ClassId, &str) -> io::Result<()>,
        F: FnMut(&Prediction) -> Result<(), TrackerError>,
    {
        loop {
            if let State::AwaitingClass(class_id) = self.state {
                operator(class_id, self.labels.resolve(class_id)?)?;
                // Frames queued while the operator was getting ready belong to no class
                let stale = source.discard_pending()?;
                if stale > 0 {
                    debug!("Discarded {} packets queued before class {}", stale, class_id);
                }
                self.begin_class()?;
                continue;
            }

            let Some(packet) = source.recv()? else {
                if matches!(self.state, State::Inferring(_)) {
                    info!("Packet source exhausted");
                    return Ok(());
                }
                return Err(TrackerError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("packet source ended while {}", self.state.name()),
                )));
            };

            match self.handle_packet(&packet)? {
                Step::Trained { .. } => self.start_inference()?,
                Step::Prediction(prediction) => sink(&prediction)?,
                _ => {}
            }
        }
    }
}

fn export(dataset: &Dataset, path: &Path) -> io::Result<()> {
    dataset.write_libsvm(BufWriter::new(File::create(path)?))
}

fn invalid(action: &'static str, state: &'static str) -> TrackerError {
    TrackerError::InvalidTransition { action, state }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CentroidTrainer;
    use crate::decoder::tests::synthetic_frame;
    use crate::decoder::FRAME_SIZE;
    use crate::error::TrainingError;
    use crate::features::FeatureVector;
    use crate::transport::UdpSource;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::net::{SocketAddr, UdpSocket};
    use std::rc::Rc;

    /// Trainer that records every dataset it sees and returns a constant model
    #[derive(Clone)]
    struct RecordingTrainer {
        answer: ClassId,
        fail: bool,
        seen: Rc<RefCell<Vec<Dataset>>>,
    }

    impl RecordingTrainer {
        fn answering(answer: ClassId) -> Self {
            Self {
                answer,
                fail: false,
                seen: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    struct ConstantModel(ClassId);

    impl Classifier for ConstantModel {
        fn predict(&self, _features: &FeatureVector) -> ClassId {
            self.0
        }
    }

    impl Trainer for RecordingTrainer {
        type Model = ConstantModel;

        fn train(&self, dataset: &Dataset) -> Result<ConstantModel, TrainingError> {
            self.seen.borrow_mut().push(dataset.clone());
            if self.fail {
                return Err(TrainingError("solver diverged".to_string()));
            }
            Ok(ConstantModel(self.answer))
        }
    }

    fn config(quota: usize) -> Config {
        Config {
            samples_per_class: quota,
            labels: LabelTable::from_names(["neutral", "smile"]),
            shuffle_seed: Some(9),
            ..Config::default()
        }
    }

    fn packet(seed: f32) -> Vec<u8> {
        FrameDecoder::encode(&synthetic_frame(seed))
    }

    #[test]
    fn test_two_class_scenario() {
        let trainer = RecordingTrainer::answering(1);
        let seen = trainer.seen.clone();
        let mut orch = TrainingOrchestrator::new(&config(3), trainer).unwrap();

        assert_eq!(orch.phase(), Phase::AwaitingClass(1));
        assert_eq!(orch.begin_class().unwrap(), 1);

        let mut arrival = Vec::new();
        for seed in [0.1, 0.2, 0.3] {
            arrival.push(LabeledSample {
                label: 1,
                features: FeatureProjector::project(&synthetic_frame(seed)),
            });
            let step = orch.handle_packet(&packet(seed)).unwrap();
            if seed < 0.3 {
                assert!(matches!(step, Step::Collected(_)));
            } else {
                assert_eq!(step, Step::ClassComplete { class_id: 1, next: 2 });
            }
        }

        assert_eq!(orch.phase(), Phase::AwaitingClass(2));
        orch.begin_class().unwrap();

        let mut last = Step::Ignored;
        for seed in [0.6, 0.7, 0.8] {
            arrival.push(LabeledSample {
                label: 2,
                features: FeatureProjector::project(&synthetic_frame(seed)),
            });
            last = orch.handle_packet(&packet(seed)).unwrap();
        }

        assert_eq!(last, Step::Trained { samples: 6 });
        assert_eq!(orch.phase(), Phase::Trained);

        // Trained exactly once, on all six samples, shuffled with the configured seed
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        let dataset = &seen[0];
        let mut labels: Vec<_> = dataset.samples().iter().map(|s| s.label).collect();
        labels.sort_unstable();
        assert_eq!(labels, vec![1, 1, 1, 2, 2, 2]);

        let midpoint = arrival.len() / 2;
        let expected = Dataset::build(
            vec![arrival[..midpoint].to_vec(), arrival[midpoint..].to_vec()],
            &mut StdRng::seed_from_u64(9),
        );
        assert_eq!(dataset, &expected);

        match orch.handle_packet(&packet(0.5)).unwrap() {
            Step::Prediction(p) => {
                assert_eq!(p.class_id, 1);
                assert_eq!(p.label, "neutral");
                assert_eq!(p.session_id, orch.session_id());
            }
            other => panic!("expected a prediction, got {:?}", other),
        }
        assert_eq!(orch.phase(), Phase::Inferring);
    }

    #[test]
    fn test_malformed_packet_during_collection() {
        let mut orch =
            TrainingOrchestrator::new(&config(3), RecordingTrainer::answering(1)).unwrap();
        orch.begin_class().unwrap();
        orch.handle_packet(&packet(0.0)).unwrap();

        let step = orch.handle_packet(&[0u8; FRAME_SIZE - 1]).unwrap();
        assert_eq!(
            step,
            Step::Dropped(FormatError::WrongLength {
                expected: FRAME_SIZE,
                actual: FRAME_SIZE - 1
            })
        );
        assert_eq!(orch.phase(), Phase::Collecting(1));
        assert_eq!(orch.progress().unwrap().collected, 1);

        // The loop carries on with the next packet
        assert!(matches!(
            orch.handle_packet(&packet(0.0)).unwrap(),
            Step::Collected(Progress { collected: 2, .. })
        ));
    }

    #[test]
    fn test_packets_ignored_while_awaiting_class() {
        let mut orch =
            TrainingOrchestrator::new(&config(2), RecordingTrainer::answering(1)).unwrap();
        assert_eq!(orch.handle_packet(&packet(0.0)).unwrap(), Step::Ignored);
        assert_eq!(orch.phase(), Phase::AwaitingClass(1));
    }

    #[test]
    fn test_training_failure_is_fatal() {
        let mut trainer = RecordingTrainer::answering(1);
        trainer.fail = true;
        let cfg = Config {
            labels: LabelTable::from_names(["neutral"]),
            ..config(1)
        };
        let mut orch = TrainingOrchestrator::new(&cfg, trainer).unwrap();
        orch.begin_class().unwrap();

        let result = orch.handle_packet(&packet(0.0));
        assert!(matches!(result, Err(TrackerError::Training(_))));
        assert_eq!(orch.phase(), Phase::Training);

        // No model, no inference
        assert!(orch.start_inference().is_err());
        assert!(matches!(
            orch.handle_packet(&packet(0.0)),
            Err(TrackerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_unknown_predicted_label_is_fatal() {
        let cfg = Config {
            labels: LabelTable::from_names(["neutral"]),
            ..config(1)
        };
        let mut orch = TrainingOrchestrator::new(&cfg, RecordingTrainer::answering(9)).unwrap();
        orch.begin_class().unwrap();
        orch.handle_packet(&packet(0.0)).unwrap();

        assert!(matches!(
            orch.handle_packet(&packet(0.0)),
            Err(TrackerError::UnknownLabel(9))
        ));
    }

    #[test]
    fn test_uncovered_label_table_rejected() {
        let cfg = Config {
            class_count: Some(3),
            ..config(1)
        };
        let result = TrainingOrchestrator::new(&cfg, RecordingTrainer::answering(1));
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_begin_class_only_when_awaiting() {
        let mut orch =
            TrainingOrchestrator::new(&config(2), RecordingTrainer::answering(1)).unwrap();
        orch.begin_class().unwrap();
        assert!(matches!(
            orch.begin_class(),
            Err(TrackerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_run_with_centroid_classifier() {
        let mut orch = TrainingOrchestrator::new(&config(4), CentroidTrainer).unwrap();

        let mut source: VecDeque<Vec<u8>> = VecDeque::new();
        // Class 1: mouth closed, class 2: mouth open
        for _ in 0..4 {
            source.push_back(packet(0.0));
        }
        source.push_back(vec![1, 2, 3]);
        for _ in 0..4 {
            source.push_back(packet(1.0));
        }
        source.push_back(packet(1.0));
        source.push_back(packet(0.0));

        let mut prompts = Vec::new();
        let mut predictions = Vec::new();
        orch.run(
            &mut source,
            |class_id, label| {
                prompts.push((class_id, label.to_string()));
                Ok(())
            },
            |p| {
                predictions.push(p.label.clone());
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(
            prompts,
            vec![(1, "neutral".to_string()), (2, "smile".to_string())]
        );
        assert_eq!(predictions, vec!["smile".to_string(), "neutral".to_string()]);
        assert_eq!(orch.phase(), Phase::Inferring);
    }

    #[test]
    fn test_run_source_ending_before_training_is_error() {
        let mut orch =
            TrainingOrchestrator::new(&config(3), RecordingTrainer::answering(1)).unwrap();
        let mut source: VecDeque<Vec<u8>> = VecDeque::from(vec![packet(0.0)]);

        let result = orch.run(&mut source, |_, _| Ok(()), |_| Ok(()));
        assert!(matches!(result, Err(TrackerError::Transport(_))));
    }

    #[test]
    fn test_dataset_export() {
        let path = std::env::temp_dir().join(format!("osfx-export-{}.libsvm", Uuid::new_v4()));
        let cfg = Config {
            export_dataset: Some(path.clone()),
            ..config(2)
        };
        let mut orch = TrainingOrchestrator::new(&cfg, RecordingTrainer::answering(1)).unwrap();
        let mut source: VecDeque<Vec<u8>> = (0..4).map(|_| packet(0.0)).collect();
        orch.run(&mut source, |_, _| Ok(()), |_| Ok(())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().all(|l| l.starts_with("1 ") || l.starts_with("2 ")));
    }

    #[test]
    fn test_export_failure_still_trains() {
        let path = std::env::temp_dir()
            .join(format!("osfx-missing-{}", Uuid::new_v4()))
            .join("dataset.libsvm");
        let cfg = Config {
            export_dataset: Some(path.clone()),
            ..config(2)
        };
        let mut orch = TrainingOrchestrator::new(&cfg, CentroidTrainer).unwrap();
        let mut source: VecDeque<Vec<u8>> = [0.0, 0.0, 1.0, 1.0, 1.0, 0.0]
            .into_iter()
            .map(packet)
            .collect();

        let mut predictions = Vec::new();
        orch.run(
            &mut source,
            |_, _| Ok(()),
            |p| {
                predictions.push(p.class_id);
                Ok(())
            },
        )
        .unwrap();

        assert!(!path.exists());
        assert_eq!(orch.phase(), Phase::Inferring);
        assert_eq!(predictions, vec![2, 1]);
    }

    /// UDP source fed by a tracker that keeps streaming while the operator
    /// is prompted, and settles into the pose once recording starts
    struct LiveTracker {
        source: UdpSource,
        sender: UdpSocket,
        addr: SocketAddr,
        remaining: usize,
    }

    impl PacketSource for LiveTracker {
        fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.source.recv()
        }

        fn discard_pending(&mut self) -> io::Result<usize> {
            let dropped = self.source.discard_pending()?;
            for _ in 0..3 {
                self.sender.send_to(&packet(0.5), self.addr)?;
            }
            Ok(dropped)
        }
    }

    #[test]
    fn test_run_drops_packets_sent_during_prompt() {
        let source = UdpSource::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = source.local_addr().unwrap();
        let mut live = LiveTracker {
            source,
            sender: UdpSocket::bind("127.0.0.1:0").unwrap(),
            addr,
            remaining: 3,
        };
        let transition = UdpSocket::bind("127.0.0.1:0").unwrap();

        let trainer = RecordingTrainer::answering(1);
        let seen = trainer.seen.clone();
        let cfg = Config {
            labels: LabelTable::from_names(["neutral"]),
            ..config(3)
        };
        let mut orch = TrainingOrchestrator::new(&cfg, trainer).unwrap();

        orch.run(
            &mut live,
            |_, _| {
                for _ in 0..3 {
                    transition.send_to(&packet(9.0), addr)?;
                }
                Ok(())
            },
            |_| Ok(()),
        )
        .unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        let settled = FeatureProjector::project(&synthetic_frame(0.5));
        assert_eq!(seen[0].len(), 3);
        assert!(seen[0].samples().iter().all(|s| s.features == settled));
    }
}
