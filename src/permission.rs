//! Camera permission.
//!
//! `PermissionState` is a small state machine: a query yields the current
//! state, `access_step` decides what the controller does with it, and
//! `after_request` folds the answer of an access request back in.
//!
//! Linux has no interactive camera prompt. `DeviceNodePermission` maps read
//! access on the device node onto the same states; `StaticPermission` answers
//! from configuration and is what tests and synthetic cameras use.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::{CameraSettings, PermissionMode};
use crate::status;

/// Authorization status for video capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionState {
    /// Platform returned a status this build does not understand.
    Unknown,
    Authorized,
    Denied,
    Restricted,
    /// Access has not been decided yet; a request may be made.
    NotDetermined,
}

/// What the controller should do for a given permission state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStep {
    /// Configure and start the session.
    Proceed,
    /// Ask the platform, then continue with `after_request`.
    Request,
    /// Stay unauthorized and show this status.
    Refuse(&'static str),
}

impl PermissionState {
    pub fn access_step(self) -> AccessStep {
        match self {
            PermissionState::Authorized => AccessStep::Proceed,
            PermissionState::NotDetermined => AccessStep::Request,
            PermissionState::Denied | PermissionState::Restricted => {
                AccessStep::Refuse(status::ALLOW_IN_SETTINGS)
            }
            PermissionState::Unknown => AccessStep::Refuse(status::PERMISSION_UNKNOWN),
        }
    }

    /// State after an access request was answered.
    pub fn after_request(self, granted: bool) -> PermissionState {
        match (self, granted) {
            (PermissionState::NotDetermined, true) => PermissionState::Authorized,
            (PermissionState::NotDetermined, false) => PermissionState::Denied,
            (state, _) => state,
        }
    }

    pub fn is_authorized(self) -> bool {
        self == PermissionState::Authorized
    }
}

/// Callback receiving the answer of an access request.
pub type AccessCallback = Box<dyn FnOnce(bool) + Send>;

/// Permission query and request.
pub trait PermissionProvider: Send + Sync {
    fn status(&self) -> PermissionState;

    /// Ask for access. The callback may run on any thread, after this returns.
    fn request_access(&self, on_response: AccessCallback);
}

/// Build the permission provider for the configured camera.
pub fn provider_for(settings: &CameraSettings) -> Box<dyn PermissionProvider> {
    let fixed = |state| -> Box<dyn PermissionProvider> {
        Box::new(StaticPermission::new(state).grant_on_request(settings.grant_on_prompt))
    };
    match settings.permission {
        PermissionMode::Granted => fixed(PermissionState::Authorized),
        PermissionMode::Denied => fixed(PermissionState::Denied),
        PermissionMode::Restricted => fixed(PermissionState::Restricted),
        PermissionMode::Prompt => fixed(PermissionState::NotDetermined),
        PermissionMode::Auto if settings.device.starts_with("stub://") => {
            fixed(PermissionState::Authorized)
        }
        PermissionMode::Auto => Box::new(DeviceNodePermission::new(&settings.device)),
    }
}

// ----------------------------------------------------------------------------
// StaticPermission
// ----------------------------------------------------------------------------

/// Permission with a fixed status and a fixed answer to requests.
#[derive(Clone, Debug)]
pub struct StaticPermission {
    state: PermissionState,
    grant: bool,
    response_delay: Duration,
}

impl StaticPermission {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state,
            grant: true,
            response_delay: Duration::ZERO,
        }
    }

    pub fn grant_on_request(mut self, grant: bool) -> Self {
        self.grant = grant;
        self
    }

    /// Delay before the request callback fires.
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }
}

impl PermissionProvider for StaticPermission {
    fn status(&self) -> PermissionState {
        self.state
    }

    fn request_access(&self, on_response: AccessCallback) {
        let grant = self.grant;
        let delay = self.response_delay;
        spawn_responder(
            move || {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                grant
            },
            on_response,
        );
    }
}

// ----------------------------------------------------------------------------
// DeviceNodePermission
// ----------------------------------------------------------------------------

/// Raw OS error for EPERM.
const EPERM: i32 = 1;

/// Permission derived from read access on a device node.
///
/// A missing node is `NotDetermined`: the request path waits for it to appear
/// (hotplug, udev rule reload) and grants once it is readable.
#[derive(Clone, Debug)]
pub struct DeviceNodePermission {
    path: PathBuf,
    wait: Duration,
    poll: Duration,
}

impl DeviceNodePermission {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wait: Duration::from_secs(5),
            poll: Duration::from_millis(250),
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    fn probe(&self) -> PermissionState {
        probe_node(&self.path)
    }
}

fn probe_node(path: &std::path::Path) -> PermissionState {
    match OpenOptions::new().read(true).open(path) {
        Ok(_) => PermissionState::Authorized,
        Err(err) if err.kind() == ErrorKind::NotFound => PermissionState::NotDetermined,
        Err(err) if err.raw_os_error() == Some(EPERM) => PermissionState::Restricted,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => PermissionState::Denied,
        Err(err) => {
            log::debug!("permission probe on {} failed: {}", path.display(), err);
            PermissionState::Unknown
        }
    }
}

impl PermissionProvider for DeviceNodePermission {
    fn status(&self) -> PermissionState {
        self.probe()
    }

    fn request_access(&self, on_response: AccessCallback) {
        let path = self.path.clone();
        let wait = self.wait;
        let poll = self.poll;
        spawn_responder(
            move || {
                let deadline = Instant::now() + wait;
                loop {
                    match probe_node(&path) {
                        PermissionState::Authorized => return true,
                        PermissionState::NotDetermined if Instant::now() < deadline => {
                            std::thread::sleep(poll)
                        }
                        _ => return false,
                    }
                }
            },
            on_response,
        );
    }
}

fn spawn_responder<F>(decide: F, on_response: AccessCallback)
where
    F: FnOnce() -> bool + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name("camera.permission".to_string())
        .spawn(move || on_response(decide()));
    if let Err(err) = spawned {
        log::error!("failed to spawn permission responder: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn access_steps() {
        assert_eq!(PermissionState::Authorized.access_step(), AccessStep::Proceed);
        assert_eq!(PermissionState::NotDetermined.access_step(), AccessStep::Request);
        assert_eq!(
            PermissionState::Denied.access_step(),
            AccessStep::Refuse(status::ALLOW_IN_SETTINGS)
        );
        assert_eq!(
            PermissionState::Restricted.access_step(),
            AccessStep::Refuse(status::ALLOW_IN_SETTINGS)
        );
        assert_eq!(
            PermissionState::Unknown.access_step(),
            AccessStep::Refuse(status::PERMISSION_UNKNOWN)
        );
    }

    #[test]
    fn request_only_resolves_undetermined() {
        let undetermined = PermissionState::NotDetermined;
        assert_eq!(undetermined.after_request(true), PermissionState::Authorized);
        assert_eq!(undetermined.after_request(false), PermissionState::Denied);
        assert_eq!(
            PermissionState::Restricted.after_request(true),
            PermissionState::Restricted
        );
    }

    #[test]
    fn static_permission_answers_asynchronously() {
        let permission =
            StaticPermission::new(PermissionState::NotDetermined).grant_on_request(false);
        let (tx, rx) = mpsc::channel();
        permission.request_access(Box::new(move |granted| {
            let _ = tx.send(granted);
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(false));
    }

    #[test]
    fn missing_node_is_undetermined_and_request_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let permission = DeviceNodePermission::new(dir.path().join("video9"))
            .with_wait(Duration::from_millis(50));
        assert_eq!(permission.status(), PermissionState::NotDetermined);

        let (tx, rx) = mpsc::channel();
        permission.request_access(Box::new(move |granted| {
            let _ = tx.send(granted);
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(false));
    }

    #[test]
    fn readable_node_is_authorized() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let permission = DeviceNodePermission::new(file.path());
        assert_eq!(permission.status(), PermissionState::Authorized);
    }
}
