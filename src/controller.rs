//! Capture controller.
//!
//! Owns the permission flow and the capture session lifecycle. Two workers
//! do the actual work:
//! - `camera.session`: a `SerialQueue` owning the session; configuration,
//!   start and stop run there in submission order
//! - `camera.inference`: drains the frame sink into the classification
//!   dispatcher
//!
//! Permission callbacks hold a `Weak` reference to the controller and do
//! nothing once it has been dropped.
//!
//! The session also feeds a preview channel with downscaled frames, taken
//! once by the presentation layer through `take_preview`.

use anyhow::Result;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::classify::Classifier;
use crate::dispatch::{ClassificationDispatcher, InferenceWorker};
use crate::frame::{Frame, Orientation};
use crate::ingest::{CameraProvider, DevicePosition};
use crate::permission::{AccessStep, PermissionProvider};
use crate::queue::SerialQueue;
use crate::session::{
    frame_channel, CaptureSession, FrameOutput, FrameSink, SessionInput, SessionSnapshot,
};
use crate::state::StatePublisher;
use crate::status;

/// External collaborators the controller drives.
pub struct Collaborators {
    pub camera: Box<dyn CameraProvider>,
    pub permissions: Box<dyn PermissionProvider>,
    pub classifier: Box<dyn Classifier>,
}

pub struct CaptureController {
    inner: Arc<ControllerInner>,
    preview: Option<Receiver<Frame>>,
    // Declared after `inner`: the worker exits once the session (and with it
    // the frame sink) has been dropped.
    _inference: InferenceWorker,
}

struct ControllerInner {
    session_queue: SerialQueue<SessionContext>,
    permissions: Box<dyn PermissionProvider>,
    publisher: StatePublisher,
}

impl CaptureController {
    pub fn new(
        collaborators: Collaborators,
        classification_interval: Duration,
        publisher: StatePublisher,
    ) -> Result<Self> {
        let Collaborators {
            camera,
            permissions,
            classifier,
        } = collaborators;

        let (sink, frames) = frame_channel();
        let dispatcher =
            ClassificationDispatcher::new(classifier, classification_interval, publisher.clone());
        let inference = InferenceWorker::spawn(dispatcher, frames)?;

        let (preview_sink, preview) = frame_channel();
        let mut session = CaptureSession::new();
        session.attach_preview(preview_sink);

        let context = SessionContext {
            session,
            camera,
            publisher: publisher.clone(),
            sink: Some(sink),
            authorized: false,
            configuration_attempted: false,
        };
        let session_queue = SerialQueue::spawn("camera.session", context)?;

        Ok(Self {
            inner: Arc::new(ControllerInner {
                session_queue,
                permissions,
                publisher,
            }),
            preview: Some(preview),
            _inference: inference,
        })
    }

    /// Check permission and, when allowed, configure and start capture.
    pub fn request_access_and_configure(&self) {
        let state = self.inner.permissions.status();
        log::debug!("camera permission: {:?}", state);
        match state.access_step() {
            AccessStep::Proceed => self.inner.proceed_authorized(),
            AccessStep::Request => {
                let weak: Weak<ControllerInner> = Arc::downgrade(&self.inner);
                self.inner
                    .permissions
                    .request_access(Box::new(move |granted| {
                        let Some(inner) = weak.upgrade() else {
                            log::debug!("camera access answered after controller shutdown");
                            return;
                        };
                        let answered = state.after_request(granted);
                        log::info!("camera access request answered: {:?}", answered);
                        if answered.is_authorized() {
                            inner.proceed_authorized();
                        } else {
                            inner.refuse(status::ACCESS_NOT_GRANTED);
                        }
                    }));
            }
            AccessStep::Refuse(message) => self.inner.refuse(message),
        }
    }

    /// Configure the session once. Later calls are no-ops.
    pub fn configure_session_if_needed(&self) {
        self.inner.configure_session_if_needed();
    }

    pub fn start_session(&self) {
        self.inner.start_session();
    }

    pub fn stop_session(&self) {
        self.inner.session_queue.dispatch(|ctx| ctx.stop());
    }

    /// Session state after every previously submitted session job has run.
    pub fn session_snapshot(&self) -> Result<SessionSnapshot> {
        self.inner.session_queue.run_sync(|ctx| ctx.session.snapshot())
    }

    /// Receiver of downscaled preview frames. `None` after the first call.
    pub fn take_preview(&mut self) -> Option<Receiver<Frame>> {
        self.preview.take()
    }
}

impl ControllerInner {
    fn proceed_authorized(&self) {
        self.publisher.authorization(true, status::PREPARING_INFERENCE);
        self.session_queue.dispatch(|ctx| ctx.authorized = true);
        self.configure_session_if_needed();
        self.start_session();
    }

    fn refuse(&self, message: &str) {
        self.publisher.authorization(false, message);
        self.session_queue.dispatch(|ctx| ctx.authorized = false);
    }

    fn configure_session_if_needed(&self) {
        self.session_queue.dispatch(|ctx| ctx.configure_if_needed());
    }

    fn start_session(&self) {
        self.session_queue.dispatch(|ctx| ctx.start());
    }
}

// ----------------------------------------------------------------------------
// Session worker state
// ----------------------------------------------------------------------------

/// Everything owned by the `camera.session` queue.
struct SessionContext {
    session: CaptureSession,
    camera: Box<dyn CameraProvider>,
    publisher: StatePublisher,
    /// Moved into the frame output on configuration.
    sink: Option<FrameSink>,
    authorized: bool,
    configuration_attempted: bool,
}

impl SessionContext {
    fn configure_if_needed(&mut self) {
        if self.configuration_attempted {
            return;
        }
        self.configuration_attempted = true;
        match self.configure() {
            Ok(()) => log::info!("capture session configured: {:?}", self.session.snapshot()),
            Err(message) => {
                log::warn!("capture session configuration aborted: {}", message);
                self.publisher.status(message);
            }
        }
    }

    /// One configuration transaction. An early return drops the guard, which
    /// commits what was added so far and leaves the session degraded.
    fn configure(&mut self) -> Result<(), String> {
        let mut config = self.session.begin_configuration(self.camera.as_ref());

        let Some(device) = self.camera.default_device(DevicePosition::Back) else {
            return Err(status::BACK_CAMERA_UNAVAILABLE.to_string());
        };
        let input = SessionInput::open(self.camera.as_ref(), device)
            .map_err(|err| status::input_failed(&err))?;
        if !config.can_add_input(&input) {
            return Err(status::INPUT_REJECTED.to_string());
        }
        config
            .add_input(input)
            .map_err(|_| status::INPUT_REJECTED.to_string())?;

        let Some(sink) = self.sink.take() else {
            return Err(status::OUTPUT_REJECTED.to_string());
        };
        let output = FrameOutput::new(sink);
        if !config.can_add_output(&output) {
            return Err(status::OUTPUT_REJECTED.to_string());
        }
        config
            .add_output(output)
            .map_err(|_| status::OUTPUT_REJECTED.to_string())?;

        if !config.set_output_orientation(Orientation::Portrait) {
            log::debug!("output orientation unsupported; frames stay upright");
        }

        config.commit();
        Ok(())
    }

    fn start(&mut self) {
        if !self.authorized {
            log::debug!("session start skipped: camera not authorized");
            return;
        }
        self.session.start_running();
    }

    fn stop(&mut self) {
        self.session.stop_running();
    }
}
