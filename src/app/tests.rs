use super::*;
use crate::actuator::{Actuator, DoorCommand, SendOutcome};
use crate::camera::FrameSource;
use crate::config::FacedoorConfig;
use crate::detection::FaceDetector;
use crate::door::{DoorController, DoorState};
use crate::error::{DoorError, Result};
use crate::events::{DoorEvent, EventBus};
use crate::frame::{FaceRegion, Frame};
use crate::recognition::{ClassificationResult, FaceClassifier, LabeledSample};
use crate::review::ReviewStore;
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const EMPTY: u8 = 0;
const BROKEN: u8 = 13;
const STRANGER: u8 = 60;
const ALICE: u8 = 200;

#[derive(Default)]
struct Trace {
    calls: Vec<String>,
}

type SharedTrace = Arc<Mutex<Trace>>;

struct ScriptedSource {
    frames: VecDeque<u8>,
    next_id: u64,
    trace: SharedTrace,
}

impl ScriptedSource {
    fn new(frames: &[u8], trace: &SharedTrace) -> Self {
        Self {
            frames: frames.iter().copied().collect(),
            next_id: 0,
            trace: trace.clone(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(value) = self.frames.pop_front() else {
            return Ok(None);
        };
        self.next_id += 1;
        Ok(Some(Frame::new(
            self.next_id,
            SystemTime::now(),
            GrayImage::from_pixel(64, 64, Luma([value])),
        )))
    }

    fn release(&mut self) {
        self.trace.lock().calls.push("release".to_string());
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// One face in the middle of every non-empty frame; BROKEN frames fail
struct PixelDetector;

impl FaceDetector for PixelDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>> {
        match frame.image().get_pixel(0, 0)[0] {
            EMPTY => Ok(Vec::new()),
            BROKEN => Err(DoorError::detector("inference failed")),
            _ => Ok(vec![FaceRegion::new(16, 16, 32, 32)]),
        }
    }
}

/// Bright faces are alice, everything else is unknown
struct BrightnessClassifier {
    trained: bool,
}

impl FaceClassifier for BrightnessClassifier {
    fn train(&mut self, samples: &[LabeledSample]) -> bool {
        self.trained = !samples.is_empty();
        self.trained
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn classify(&self, face: &GrayImage) -> ClassificationResult {
        if face.get_pixel(0, 0)[0] >= 128 {
            ClassificationResult::from_match("alice", 30.0, 100.0)
        } else {
            ClassificationResult::from_match("alice", 170.0, 100.0)
        }
    }

    fn labels(&self) -> Vec<String> {
        vec!["alice".to_string()]
    }
}

struct TracingActuator {
    trace: SharedTrace,
}

impl Actuator for TracingActuator {
    fn send(&mut self, command: DoorCommand) -> SendOutcome {
        self.trace.lock().calls.push(command.to_string());
        SendOutcome::Delivered { response: None }
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn close(&mut self) {
        self.trace.lock().calls.push("close".to_string());
    }
}

type TestLoop = LiveLoop<ScriptedSource, PixelDetector, BrightnessClassifier, TracingActuator>;

fn live_loop(frames: &[u8], trace: &SharedTrace, review_dir: &TempDir, events: &EventBus) -> TestLoop {
    let door = DoorController::new(
        TracingActuator {
            trace: trace.clone(),
        },
        Duration::from_secs(5),
    )
    .with_events(events.clone());

    LiveLoop::new(
        ScriptedSource::new(frames, trace),
        PixelDetector,
        BrightnessClassifier { trained: true },
        door,
        ReviewStore::new(review_dir.path(), Duration::from_secs(1), false),
        events.clone(),
    )
    .unwrap()
}

fn calls(trace: &SharedTrace) -> Vec<String> {
    trace.lock().calls.clone()
}

#[test]
fn test_untrained_classifier_is_refused() {
    let trace = SharedTrace::default();
    let review_dir = TempDir::new().unwrap();

    let result = LiveLoop::new(
        ScriptedSource::new(&[ALICE], &trace),
        PixelDetector,
        BrightnessClassifier { trained: false },
        DoorController::new(
            TracingActuator {
                trace: trace.clone(),
            },
            Duration::from_secs(5),
        ),
        ReviewStore::new(review_dir.path(), Duration::ZERO, false),
        EventBus::new(8),
    );

    assert!(matches!(result, Err(DoorError::NotTrained)));
    assert!(calls(&trace).is_empty());
}

#[test]
fn test_end_of_stream_closes_open_door_then_releases() {
    let trace = SharedTrace::default();
    let review_dir = TempDir::new().unwrap();
    let events = EventBus::new(32);

    let report = live_loop(&[EMPTY, ALICE, ALICE], &trace, &review_dir, &events)
        .run(&CancellationToken::new());

    assert_eq!(report.reason, ShutdownReason::EndOfStream);
    assert_eq!(report.reason.exit_code(), 0);
    assert_eq!(report.frames, 3);
    assert_eq!(report.authorized_faces, 2);
    assert_eq!(report.commands, vec![DoorCommand::Open, DoorCommand::Close]);
    assert_eq!(calls(&trace), vec!["OPEN", "CLOSE", "close", "release"]);
}

#[test]
fn test_quit_before_first_frame_still_cleans_up() {
    let trace = SharedTrace::default();
    let review_dir = TempDir::new().unwrap();
    let events = EventBus::new(8);
    let quit = CancellationToken::new();
    quit.cancel();

    let report = live_loop(&[ALICE, ALICE], &trace, &review_dir, &events).run(&quit);

    assert_eq!(report.reason, ShutdownReason::Requested);
    assert_eq!(report.frames, 0);
    assert_eq!(calls(&trace), vec!["close", "release"]);
}

#[test]
fn test_detector_error_counts_as_no_faces() {
    let trace = SharedTrace::default();
    let review_dir = TempDir::new().unwrap();
    let events = EventBus::new(8);
    let mut live = live_loop(&[], &trace, &review_dir, &events);
    let start = Instant::now();

    let frame = |id, value| Frame::new(id, SystemTime::now(), GrayImage::from_pixel(64, 64, Luma([value])));

    live.process_frame(frame(1, ALICE), start);
    let outcome = live.process_frame(frame(2, BROKEN), start + Duration::from_secs(6));

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.command, Some(DoorCommand::Close));
    assert_eq!(live.door().state(), DoorState::Closed);
}

#[test]
fn test_unknown_faces_are_audited_and_rate_limited() {
    let trace = SharedTrace::default();
    let review_dir = TempDir::new().unwrap();
    let events = EventBus::new(32);
    let mut receiver = events.subscribe();
    let mut live = live_loop(&[], &trace, &review_dir, &events);
    let start = Instant::now();

    let frame = |id| Frame::new(id, SystemTime::now(), GrayImage::from_pixel(64, 64, Luma([STRANGER])));

    for (id, offset_ms) in [(1, 0), (2, 200), (3, 1200)] {
        let outcome = live.process_frame(frame(id), start + Duration::from_millis(offset_ms));
        assert_eq!(outcome.command, None);
        assert!(!outcome.results[0].is_authorized());
    }

    let snapshots: Vec<_> = std::iter::from_fn(|| receiver.try_recv().ok())
        .filter_map(|event| match event {
            DoorEvent::UnknownFace { snapshot, .. } => snapshot,
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|p| p.starts_with(review_dir.path()) && p.exists()));
    assert_eq!(live.door().state(), DoorState::Closed);
    assert!(calls(&trace).is_empty());
}

#[test]
fn test_mixed_faces_in_one_frame_open_door() {
    struct TwoFaces;

    impl FaceDetector for TwoFaces {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>> {
            Ok(vec![FaceRegion::new(0, 0, 32, 64), FaceRegion::new(32, 0, 32, 64)])
        }
    }

    let trace = SharedTrace::default();
    let review_dir = TempDir::new().unwrap();
    let mut live = LiveLoop::new(
        ScriptedSource::new(&[], &trace),
        TwoFaces,
        BrightnessClassifier { trained: true },
        DoorController::new(
            TracingActuator {
                trace: trace.clone(),
            },
            Duration::from_secs(5),
        ),
        ReviewStore::new(review_dir.path(), Duration::ZERO, false),
        EventBus::new(8),
    )
    .unwrap();

    // Left half dark, right half bright
    let image = GrayImage::from_fn(64, 64, |x, _| Luma([if x < 32 { STRANGER } else { ALICE }]));
    let outcome = live.process_frame(Frame::new(1, SystemTime::now(), image), Instant::now());

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.command, Some(DoorCommand::Open));
    assert_eq!(calls(&trace), vec!["OPEN"]);
}

#[tokio::test]
async fn test_app_refuses_to_run_without_enrollment() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = FacedoorConfig::default();
    config.enrollment.path = temp_dir.path().join("known_faces").to_string_lossy().to_string();
    config.review.path = temp_dir.path().join("review").to_string_lossy().to_string();
    config.system.keyboard_quit = false;

    let mut app = DoorApp::new(config);

    assert!(app.train().is_none());
    let result = app.run(Some(temp_dir.path().to_path_buf())).await;
    assert!(matches!(result, Err(DoorError::NotTrained)));
}

#[tokio::test]
async fn test_app_trains_from_enrollment_folder() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = FacedoorConfig::default();
    config.enrollment.path = temp_dir.path().to_string_lossy().to_string();

    let app = DoorApp::new(config);
    let face = GrayImage::from_fn(40, 40, |x, y| Luma([((x * 9 + y * 4) % 256) as u8]));
    app.enrollment_store().save_sample("alice", 1, &face).unwrap();

    let recognizer = app.train().unwrap();
    assert_eq!(recognizer.labels(), vec!["alice".to_string()]);

    let stored = app.enrollment_store().load_all().unwrap();
    let result = recognizer.classify(&stored[0].image);
    assert_eq!(result.identity(), Some("alice"));
    assert_eq!(result.confidence(), 0.0);
}

#[tokio::test]
async fn test_enroll_without_usable_detector_fails() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = FacedoorConfig::default();
    config.enrollment.path = temp_dir.path().to_string_lossy().to_string();
    config.detector.model_path = temp_dir
        .path()
        .join("missing.onnx")
        .to_string_lossy()
        .to_string();
    config.system.keyboard_quit = false;

    let mut app = DoorApp::new(config);
    let result = app.enroll("alice".to_string(), Some(1)).await;

    assert!(matches!(result, Err(DoorError::Detector { .. })));
    assert!(app.enrollment_store().load_all().unwrap().is_empty());
}

#[cfg(feature = "onnx")]
#[test]
fn test_detector_backend_is_compiled_in() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = FacedoorConfig::default().detector;
    config.model_path = temp_dir.path().join("missing.onnx").to_string_lossy().to_string();

    // The error names the model file, not a missing backend
    let Err(error) = crate::detection::build_detector(&config) else {
        panic!("loaded a model that does not exist");
    };
    assert!(error.to_string().contains("missing.onnx"));
    assert!(!error.to_string().contains("rebuild with --features onnx"));
}
