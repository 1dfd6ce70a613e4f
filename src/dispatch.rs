//! Classification throttle and dispatcher.
//!
//! The inference worker receives frames from the session's frame sink one at
//! a time. For each frame the dispatcher consults the throttle, runs the
//! classifier synchronously when the window has passed, and publishes either
//! the top candidate or an error status.

use anyhow::{anyhow, Result};
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::classify::Classifier;
use crate::frame::{Frame, Orientation};
use crate::state::{ClassificationResult, StatePublisher};
use crate::status;
use crate::throttle::ClassificationThrottle;

/// Orientation hint handed to the classifier. Frames arrive already rotated
/// by the output connection.
pub const ORIENTATION_HINT: Orientation = Orientation::Up;

/// What happened to one delivered frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    /// Arrived inside the throttle window; discarded.
    Throttled,
    Classified(ClassificationResult),
    /// Classification failed; carries the published status.
    Failed(String),
}

pub struct ClassificationDispatcher {
    throttle: ClassificationThrottle,
    classifier: Box<dyn Classifier>,
    publisher: StatePublisher,
}

impl ClassificationDispatcher {
    pub fn new(
        classifier: Box<dyn Classifier>,
        interval: Duration,
        publisher: StatePublisher,
    ) -> Self {
        Self {
            throttle: ClassificationThrottle::new(interval),
            classifier,
            publisher,
        }
    }

    pub fn on_frame(&mut self, frame: &Frame) -> Dispatch {
        self.on_frame_at(frame, Instant::now())
    }

    /// Handle a frame arriving at `now`.
    pub fn on_frame_at(&mut self, frame: &Frame, now: Instant) -> Dispatch {
        if !self.throttle.try_acquire(now) {
            return Dispatch::Throttled;
        }

        if let Err(err) = frame.validate() {
            let message = status::invocation_failed(&err);
            log::warn!("{}", message);
            self.publisher.classification_failed(message.clone());
            return Dispatch::Failed(message);
        }

        let started = Instant::now();
        let outcome = self
            .classifier
            .classify(frame, ORIENTATION_HINT)
            .and_then(|candidates| {
                candidates
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("classifier returned no candidates"))
            });
        match outcome {
            Ok(best) => {
                let result = ClassificationResult::new(best.identifier, best.confidence);
                log::debug!(
                    "{}: {} {} in {:?} ({:?} after capture)",
                    self.classifier.name(),
                    result.identifier,
                    result.confidence_description(),
                    started.elapsed(),
                    frame.captured_at().elapsed()
                );
                self.publisher.classified(result.clone());
                Dispatch::Classified(result)
            }
            Err(err) => {
                let message = status::classification_error(&err);
                log::warn!("{}", message);
                self.publisher.classification_failed(message.clone());
                Dispatch::Failed(message)
            }
        }
    }
}

/// Counters kept by the inference worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InferenceStats {
    pub frames: u64,
    pub throttled: u64,
    pub classified: u64,
    pub failed: u64,
}

impl InferenceStats {
    fn record(&mut self, dispatch: &Dispatch) {
        self.frames += 1;
        match dispatch {
            Dispatch::Throttled => self.throttled += 1,
            Dispatch::Classified(_) => self.classified += 1,
            Dispatch::Failed(_) => self.failed += 1,
        }
    }
}

/// Thread draining the frame sink into a dispatcher.
///
/// Exits once every sender of the frame channel is gone.
pub struct InferenceWorker {
    join: Option<JoinHandle<InferenceStats>>,
}

impl InferenceWorker {
    pub fn spawn(
        mut dispatcher: ClassificationDispatcher,
        frames: Receiver<Frame>,
    ) -> Result<Self> {
        let join = std::thread::Builder::new()
            .name("camera.inference".to_string())
            .spawn(move || {
                let mut stats = InferenceStats::default();
                for frame in frames {
                    let dispatch = dispatcher.on_frame(&frame);
                    stats.record(&dispatch);
                }
                stats
            })
            .map_err(|e| anyhow!("failed to spawn inference worker: {}", e))?;
        Ok(Self { join: Some(join) })
    }

    /// Wait for the worker to drain and exit.
    pub fn join(mut self) -> Result<InferenceStats> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<InferenceStats> {
        let Some(join) = self.join.take() else {
            return Ok(InferenceStats::default());
        };
        join.join().map_err(|_| anyhow!("inference worker panicked"))
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        match self.join_inner() {
            Ok(stats) if stats.frames > 0 => log::info!(
                "inference worker stopped: frames={} classified={} failed={} throttled={}",
                stats.frames,
                stats.classified,
                stats.failed,
                stats.throttled
            ),
            Ok(_) => {}
            Err(err) => log::error!("{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Candidate;
    use crate::frame::PixelFormat;
    use crate::state::{self, PublishedState, StateUpdate};

    struct Scripted {
        response: fn() -> Result<Vec<Candidate>>,
    }

    impl Classifier for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn classify(
            &mut self,
            _frame: &Frame,
            _orientation: Orientation,
        ) -> Result<Vec<Candidate>> {
            (self.response)()
        }
    }

    fn cat_and_dog() -> Result<Vec<Candidate>> {
        Ok(vec![Candidate::new("cat", 0.92), Candidate::new("dog", 0.05)])
    }

    fn failing() -> Result<Vec<Candidate>> {
        Err(anyhow!("model exploded"))
    }

    fn nothing() -> Result<Vec<Candidate>> {
        Ok(Vec::new())
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 16], 2, 2, PixelFormat::Bgra32)
    }

    fn dispatcher(
        response: fn() -> Result<Vec<Candidate>>,
    ) -> (ClassificationDispatcher, Receiver<StateUpdate>) {
        let (publisher, rx) = state::channel();
        let classifier = Box::new(Scripted { response });
        (
            ClassificationDispatcher::new(classifier, Duration::from_millis(500), publisher),
            rx,
        )
    }

    fn replay(rx: &Receiver<StateUpdate>) -> PublishedState {
        let mut state = PublishedState::default();
        for update in rx.try_iter() {
            state.apply(update);
        }
        state
    }

    #[test]
    fn publishes_top_candidate() {
        let (mut dispatcher, rx) = dispatcher(cat_and_dog);
        let dispatch = dispatcher.on_frame(&frame());

        let expected = ClassificationResult::new("cat", 0.92);
        assert_eq!(dispatch, Dispatch::Classified(expected.clone()));
        assert_eq!(expected.confidence, 0.92);
        let state = replay(&rx);
        assert_eq!(state.latest_result, Some(expected));
        assert_eq!(state.status, status::RESULT_READY);
        assert_eq!(
            state.latest_result.unwrap().confidence_description(),
            "92%"
        );
    }

    #[test]
    fn classifier_error_clears_result() {
        let (mut dispatcher, rx) = dispatcher(failing);
        let dispatch = dispatcher.on_frame(&frame());

        let mut state = PublishedState::default();
        state.apply(StateUpdate::Classified(ClassificationResult::new("cat", 0.9)));
        for update in rx.try_iter() {
            state.apply(update);
        }
        assert!(matches!(dispatch, Dispatch::Failed(_)));
        assert!(state.latest_result.is_none());
        assert!(!state.status.is_empty());
        assert_ne!(state.status, status::RESULT_READY);
        assert!(state.status.contains("model exploded"));
    }

    #[test]
    fn malformed_frame_is_reported_as_invocation_failure() {
        let (mut dispatcher, rx) = dispatcher(cat_and_dog);
        let bad = Frame::new(vec![0u8; 5], 2, 2, PixelFormat::Bgra32);
        let dispatch = dispatcher.on_frame(&bad);

        let Dispatch::Failed(message) = &dispatch else {
            panic!("expected failure, got {:?}", dispatch);
        };
        assert!(message.starts_with("Failed to run classification"));
        assert!(replay(&rx).latest_result.is_none());
    }

    #[test]
    fn empty_candidates_are_an_error() {
        let (mut dispatcher, _rx) = dispatcher(nothing);
        let Dispatch::Failed(message) = dispatcher.on_frame(&frame()) else {
            panic!("expected failure");
        };
        assert!(message.contains("no candidates"));
    }

    #[test]
    fn frames_inside_the_window_are_discarded() {
        let (mut dispatcher, rx) = dispatcher(cat_and_dog);
        let start = Instant::now();
        let f = frame();
        assert!(matches!(dispatcher.on_frame_at(&f, start), Dispatch::Classified(_)));
        assert_eq!(
            dispatcher.on_frame_at(&f, start + Duration::from_millis(250)),
            Dispatch::Throttled
        );
        assert_eq!(
            dispatcher.on_frame_at(&f, start + Duration::from_millis(500)),
            Dispatch::Throttled
        );
        assert!(matches!(
            dispatcher.on_frame_at(&f, start + Duration::from_millis(501)),
            Dispatch::Classified(_)
        ));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn worker_exits_when_sink_closes() -> Result<()> {
        let (dispatcher, _rx) = dispatcher(cat_and_dog);
        let (sink, frames) = crate::session::frame_channel();
        let worker = InferenceWorker::spawn(dispatcher, frames)?;
        sink.deliver(frame(), false);
        drop(sink);
        let stats = worker.join()?;
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.classified, 1);
        Ok(())
    }
}
