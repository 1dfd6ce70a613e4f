//! Published state observed by the presentation layer.
//!
//! Workers never share mutable fields with the presentation layer. They send
//! `StateUpdate`s through a `StatePublisher`; the presentation side owns a
//! `PublishedState` and folds each update into it with `apply`, so every
//! rendered frame is a consistent snapshot.

use std::sync::mpsc;

use crate::status;

/// Top classification candidate, as displayed.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationResult {
    pub identifier: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

impl ClassificationResult {
    pub fn new(identifier: impl Into<String>, confidence: f64) -> Self {
        Self {
            identifier: identifier.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Whole-percent rendering, e.g. `"92%"`.
    pub fn confidence_description(&self) -> String {
        format!("{:.0}%", self.confidence * 100.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PublishedState {
    pub is_authorized: bool,
    pub status: String,
    pub latest_result: Option<ClassificationResult>,
}

impl Default for PublishedState {
    fn default() -> Self {
        Self {
            is_authorized: false,
            status: status::PREPARING_CAMERA.to_string(),
            latest_result: None,
        }
    }
}

/// One change to the published state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateUpdate {
    Authorization { authorized: bool, status: String },
    Status(String),
    Classified(ClassificationResult),
    ClassificationFailed(String),
}

impl PublishedState {
    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Authorization { authorized, status } => {
                self.is_authorized = authorized;
                self.status = status;
            }
            StateUpdate::Status(status) => self.status = status,
            StateUpdate::Classified(result) => {
                self.latest_result = Some(result);
                self.status = status::RESULT_READY.to_string();
            }
            StateUpdate::ClassificationFailed(status) => {
                self.latest_result = None;
                self.status = status;
            }
        }
    }
}

/// Sending half of the update channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct StatePublisher {
    tx: mpsc::Sender<StateUpdate>,
}

/// Create the update channel.
pub fn channel() -> (StatePublisher, mpsc::Receiver<StateUpdate>) {
    let (tx, rx) = mpsc::channel();
    (StatePublisher { tx }, rx)
}

impl StatePublisher {
    pub fn publish(&self, update: StateUpdate) {
        if self.tx.send(update).is_err() {
            log::debug!("presentation gone; state update dropped");
        }
    }

    pub fn authorization(&self, authorized: bool, status: impl Into<String>) {
        self.publish(StateUpdate::Authorization {
            authorized,
            status: status.into(),
        });
    }

    pub fn status(&self, status: impl Into<String>) {
        self.publish(StateUpdate::Status(status.into()));
    }

    pub fn classified(&self, result: ClassificationResult) {
        self.publish(StateUpdate::Classified(result));
    }

    pub fn classification_failed(&self, status: impl Into<String>) {
        self.publish(StateUpdate::ClassificationFailed(status.into()));
    }
}
