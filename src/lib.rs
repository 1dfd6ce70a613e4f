//! Live camera classification.
//!
//! Captures frames from a camera, classifies the most recent one at most
//! once per throttle interval and publishes the top label and confidence for
//! a presentation layer to render.
//!
//! # Architecture
//!
//! Data flows one way:
//!
//! camera → capture session → frame sink → throttle → classifier → published state → overlay
//!
//! - Camera permission is checked first; capture never starts without it.
//! - The session is configured lazily, once, inside a bracketed transaction.
//! - Session work runs on one serial worker, classification on another.
//! - Workers never share mutable state with the presentation layer; they send
//!   `StateUpdate`s through a single channel. Downscaled preview frames
//!   travel on their own single-slot channel from the capture thread.
//!
//! # Module Structure
//!
//! - `controller`: permission flow and session lifecycle
//! - `session`: capture session, configuration transaction, frame and preview sinks
//! - `dispatch`: throttled classification on the inference worker
//! - `ingest`: camera providers (synthetic, V4L2)
//! - `classify`: classifier backends (stub, tract)
//! - `state`, `status`: published state and its user-facing messages
//! - `ui`: overlay rendering and the presentation loop

pub mod classify;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod frame;
pub mod ingest;
pub mod permission;
pub mod queue;
pub mod session;
pub mod state;
pub mod status;
pub mod throttle;
pub mod ui;

pub use classify::{classifier_for, Candidate, Classifier, StubClassifier};
pub use config::{CameraSettings, ClassifierSettings, LiveClassifyConfig, PermissionMode};
pub use controller::{CaptureController, Collaborators};
pub use dispatch::{ClassificationDispatcher, Dispatch, InferenceWorker};
pub use frame::{Frame, Orientation, PixelFormat};
pub use ingest::{camera_for, CameraProvider, DeviceInfo, DevicePosition, FrameSource};
pub use permission::{provider_for, PermissionProvider, PermissionState};
pub use session::{CaptureSession, SessionSnapshot, SessionState};
pub use state::{ClassificationResult, PublishedState, StatePublisher, StateUpdate};
pub use throttle::{ClassificationThrottle, DEFAULT_CLASSIFICATION_INTERVAL};
pub use ui::{Overlay, Presenter, Ui, UiMode};
