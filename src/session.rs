//! Capture session.
//!
//! A `CaptureSession` coordinates at most one input (an opened camera) and
//! one output (a frame sink). Inputs and outputs are only added inside a
//! configuration transaction obtained from `begin_configuration`; the
//! transaction commits when the guard drops, and a guard dropped without
//! `commit()` leaves the session `Degraded` with whatever was added so far.
//!
//! While running, a capture thread owns the input's `FrameSource`, pulls
//! frames from it and hands them to the output sink. Every captured frame
//! also goes, downscaled, to the preview sink when one is attached. Stopping
//! joins the thread and returns the source to the input.

use anyhow::{anyhow, bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::{Frame, Orientation, PixelFormat};
use crate::ingest::{CameraProvider, DeviceInfo, FrameSource};

/// Pause after a failed capture before trying the source again.
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Preview frames are downscaled to at most this many pixels across.
pub const PREVIEW_MAX_WIDTH: u32 = 24;

// ----------------------------------------------------------------------------
// Session state machine
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configured,
    /// Configuration was aborted part way; the session keeps what was added.
    Degraded,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    ConfigurationCommitted,
    ConfigurationAborted,
    Start,
    Stop,
}

impl SessionState {
    /// Pure transition function. Events that do not apply leave the state as is.
    pub fn transition(self, event: SessionEvent) -> SessionState {
        use SessionEvent::*;
        use SessionState::*;
        match (self, event) {
            (Unconfigured, ConfigurationCommitted) => Configured,
            (Unconfigured, ConfigurationAborted) => Degraded,
            (Configured | Degraded | Stopped, Start) => Running,
            (Running, Stop) => Stopped,
            (state, _) => state,
        }
    }

    pub fn is_running(self) -> bool {
        self == SessionState::Running
    }
}

// ----------------------------------------------------------------------------
// Input and output
// ----------------------------------------------------------------------------

/// An opened camera attached (or attachable) to a session.
pub struct SessionInput {
    device: DeviceInfo,
    /// `None` while the capture thread owns the source.
    source: Option<Box<dyn FrameSource>>,
}

impl SessionInput {
    /// Open `device` through `camera`.
    pub fn open(camera: &dyn CameraProvider, device: DeviceInfo) -> Result<Self> {
        let source = camera
            .open(&device)
            .with_context(|| format!("open camera {}", device.id))?;
        Ok(Self {
            device,
            source: Some(source),
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }
}

/// Outcome of handing a frame to the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The consumer was still busy with the previous frame.
    Dropped,
    /// The consumer is gone.
    Closed,
}

/// Single-slot frame channel between the capture thread and its consumer.
#[derive(Clone, Debug)]
pub struct FrameSink {
    tx: SyncSender<Frame>,
}

/// Create a frame sink and the receiver the inference worker drains.
pub fn frame_channel() -> (FrameSink, Receiver<Frame>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (FrameSink { tx }, rx)
}

impl FrameSink {
    pub fn deliver(&self, frame: Frame, discard_late: bool) -> Delivery {
        if discard_late {
            return match self.tx.try_send(frame) {
                Ok(()) => Delivery::Delivered,
                Err(TrySendError::Full(_)) => Delivery::Dropped,
                Err(TrySendError::Disconnected(_)) => Delivery::Closed,
            };
        }
        match self.tx.send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Closed,
        }
    }
}

/// Frame output: where frames go and in which layout.
pub struct FrameOutput {
    pub discard_late_frames: bool,
    pub pixel_format: PixelFormat,
    orientation: Orientation,
    sink: FrameSink,
}

impl FrameOutput {
    /// Output delivering BGRA frames and dropping late ones.
    pub fn new(sink: FrameSink) -> Self {
        Self {
            discard_late_frames: true,
            pixel_format: PixelFormat::Bgra32,
            orientation: Orientation::Up,
            sink,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

// ----------------------------------------------------------------------------
// CaptureSession
// ----------------------------------------------------------------------------

struct CaptureThread {
    stop: Arc<AtomicBool>,
    join: JoinHandle<Box<dyn FrameSource>>,
}

/// Point-in-time view of a session, for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub device: Option<String>,
    pub has_output: bool,
    pub has_preview: bool,
    pub orientation: Option<Orientation>,
    pub running: bool,
}

pub struct CaptureSession {
    state: SessionState,
    input: Option<SessionInput>,
    output: Option<FrameOutput>,
    preview: Option<FrameSink>,
    capture: Option<CaptureThread>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Unconfigured,
            input: None,
            output: None,
            preview: None,
            capture: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            device: self.input.as_ref().map(|input| input.device.id.clone()),
            has_output: self.output.is_some(),
            has_preview: self.preview.is_some(),
            orientation: self.output.as_ref().map(FrameOutput::orientation),
            running: self.is_running(),
        }
    }

    /// Open a configuration transaction. `camera` decides which inputs and
    /// outputs the session may take.
    pub fn begin_configuration<'a>(
        &'a mut self,
        camera: &'a dyn CameraProvider,
    ) -> SessionConfiguration<'a> {
        log::debug!("session configuration begin");
        SessionConfiguration {
            session: self,
            camera,
            committed: false,
        }
    }

    /// Route downscaled copies of captured frames to `sink`. Late preview
    /// frames are dropped. Takes effect on the next start.
    pub fn attach_preview(&mut self, sink: FrameSink) {
        self.preview = Some(sink);
    }

    /// Start capture. Returns false when already running or not startable.
    pub fn start_running(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        if !self.state.transition(SessionEvent::Start).is_running() {
            log::warn!("session start ignored: session is {:?}", self.state);
            return false;
        }
        let Some(input) = self.input.as_mut() else {
            log::warn!("session start ignored: no camera input");
            return false;
        };
        let Some(source) = input.source.take() else {
            log::warn!("session start ignored: camera source unavailable");
            return false;
        };
        let device = input.device.id.clone();
        let output = self.output.as_ref().map(|output| OutputRoute {
            sink: output.sink.clone(),
            format: output.pixel_format,
            discard_late: output.discard_late_frames,
        });
        if output.is_none() {
            log::warn!("session {} running without a frame output", device);
        }

        let preview = self.preview.clone();

        let stop = Arc::new(AtomicBool::new(false));
        match spawn_capture(source, output, preview, stop.clone()) {
            Ok(join) => {
                self.capture = Some(CaptureThread { stop, join });
                self.state = self.state.transition(SessionEvent::Start);
                log::info!("session started on {}", device);
                true
            }
            Err(err) => {
                log::error!("session start failed: {:#}", err);
                false
            }
        }
    }

    /// Stop capture. Returns false when not running.
    pub fn stop_running(&mut self) -> bool {
        let Some(capture) = self.capture.take() else {
            return false;
        };
        capture.stop.store(true, Ordering::SeqCst);
        match capture.join.join() {
            Ok(source) => {
                if let Some(input) = self.input.as_mut() {
                    input.source = Some(source);
                }
            }
            Err(_) => log::error!("capture thread panicked; camera input lost"),
        }
        self.state = self.state.transition(SessionEvent::Stop);
        log::info!("session stopped");
        true
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop_running();
    }
}

/// Bracketed configuration change. See the module docs.
pub struct SessionConfiguration<'a> {
    session: &'a mut CaptureSession,
    camera: &'a dyn CameraProvider,
    committed: bool,
}

impl SessionConfiguration<'_> {
    /// The session has no input yet and the camera accepts this one.
    pub fn can_add_input(&self, input: &SessionInput) -> bool {
        self.session.input.is_none() && self.camera.accepts_input(input.device())
    }

    pub fn add_input(&mut self, input: SessionInput) -> Result<()> {
        if self.session.input.is_some() {
            bail!("session already has an input; cannot add {}", input.device.id);
        }
        if !self.camera.accepts_input(input.device()) {
            bail!("camera refused input {}", input.device.id);
        }
        log::debug!("session input added: {} ({})", input.device.name, input.device.id);
        self.session.input = Some(input);
        Ok(())
    }

    /// The session has no output yet and the camera accepts this one.
    pub fn can_add_output(&self, output: &FrameOutput) -> bool {
        self.session.output.is_none() && self.camera.accepts_output(output)
    }

    pub fn add_output(&mut self, output: FrameOutput) -> Result<()> {
        if self.session.output.is_some() {
            return Err(anyhow!("session already has a frame output"));
        }
        if !self.camera.accepts_output(&output) {
            bail!("camera refused {:?} frame output", output.pixel_format);
        }
        log::debug!(
            "session output added: {:?}, discard_late_frames={}",
            output.pixel_format,
            output.discard_late_frames
        );
        self.session.output = Some(output);
        Ok(())
    }

    /// Whether the output connection can be rotated to `orientation`.
    pub fn supports_output_orientation(&self, orientation: Orientation) -> bool {
        let source_supports = self
            .session
            .input
            .as_ref()
            .and_then(|input| input.source.as_ref())
            .is_some_and(|source| source.supports_orientation(orientation));
        source_supports && self.session.output.is_some()
    }

    /// Rotate the output connection. Returns false when unsupported.
    pub fn set_output_orientation(&mut self, orientation: Orientation) -> bool {
        if !self.supports_output_orientation(orientation) {
            return false;
        }
        if let Some(source) = self
            .session
            .input
            .as_mut()
            .and_then(|input| input.source.as_mut())
        {
            source.set_orientation(orientation);
        }
        if let Some(output) = self.session.output.as_mut() {
            output.orientation = orientation;
        }
        true
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SessionConfiguration<'_> {
    fn drop(&mut self) {
        let event = if self.committed {
            SessionEvent::ConfigurationCommitted
        } else {
            SessionEvent::ConfigurationAborted
        };
        self.session.state = self.session.state.transition(event);
        log::debug!(
            "session configuration commit ({:?}) -> {:?}",
            event,
            self.session.state
        );
    }
}

// ----------------------------------------------------------------------------
// Capture thread
// ----------------------------------------------------------------------------

struct OutputRoute {
    sink: FrameSink,
    format: PixelFormat,
    discard_late: bool,
}

/// Source health as seen by the capture thread.
struct HealthWatch {
    healthy: bool,
    consecutive_failures: u64,
    last_report: Instant,
}

impl HealthWatch {
    fn new(now: Instant) -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_report: now,
        }
    }

    /// Count a failed capture. True for the first failure of a run.
    fn failed(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures == 1
    }

    /// Count a captured frame. Returns how many failures it ended.
    fn captured(&mut self) -> u64 {
        std::mem::take(&mut self.consecutive_failures)
    }

    /// Record the source's health. True when it changed.
    fn observe(&mut self, healthy: bool) -> bool {
        let changed = healthy != self.healthy;
        self.healthy = healthy;
        changed
    }

    fn report_due(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_report) < HEALTH_LOG_INTERVAL {
            return false;
        }
        self.last_report = now;
        true
    }

    fn check(&mut self, source: &dyn FrameSource) {
        let healthy = source.is_healthy();
        if self.observe(healthy) {
            let device = source.stats().device;
            if healthy {
                log::info!("capture source {} healthy again", device);
            } else {
                log::warn!("capture source {} unhealthy", device);
            }
        }
        if self.report_due(Instant::now()) {
            let stats = source.stats();
            log::info!(
                "capture health={} frames={} device={}",
                healthy,
                stats.frames_captured,
                stats.device
            );
        }
    }
}

fn spawn_capture(
    mut source: Box<dyn FrameSource>,
    output: Option<OutputRoute>,
    mut preview: Option<FrameSink>,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<Box<dyn FrameSource>>> {
    std::thread::Builder::new()
        .name("camera.capture".to_string())
        .spawn(move || {
            let mut delivered = 0u64;
            let mut dropped = 0u64;
            let mut health = HealthWatch::new(Instant::now());
            while !stop.load(Ordering::SeqCst) {
                let result = source.next_frame();
                health.check(source.as_ref());
                let frame = match result {
                    Ok(frame) => frame,
                    Err(err) => {
                        if health.failed() {
                            log::warn!("capture failed: {:#}", err);
                        } else {
                            log::debug!("capture failed again: {:#}", err);
                        }
                        std::thread::sleep(CAPTURE_RETRY_DELAY);
                        continue;
                    }
                };
                let recovered = health.captured();
                if recovered > 0 {
                    log::info!("capture recovered after {} failed attempts", recovered);
                }
                if let Some(sink) = &preview {
                    let closed = match frame.thumbnail(PREVIEW_MAX_WIDTH) {
                        Ok(thumb) => sink.deliver(thumb, true) == Delivery::Closed,
                        Err(err) => {
                            log::debug!("preview frame skipped: {:#}", err);
                            false
                        }
                    };
                    if closed {
                        log::debug!("preview consumer gone");
                        preview = None;
                    }
                }
                let Some(route) = &output else {
                    continue;
                };
                let frame = match frame.convert(route.format) {
                    Ok(frame) => frame,
                    Err(err) => {
                        log::warn!("frame conversion failed: {:#}", err);
                        continue;
                    }
                };
                match route.sink.deliver(frame, route.discard_late) {
                    Delivery::Delivered => delivered += 1,
                    Delivery::Dropped => dropped += 1,
                    Delivery::Closed => {
                        log::debug!("frame consumer gone; capture thread exiting");
                        break;
                    }
                }
            }
            let stats = source.stats();
            log::debug!(
                "capture on {} finished: captured={} delivered={} dropped={}",
                stats.device,
                stats.frames_captured,
                delivered,
                dropped
            );
            source
        })
        .context("spawn capture thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{DevicePosition, SyntheticCamera, SyntheticConfig};

    fn camera() -> SyntheticCamera {
        SyntheticCamera::new(SyntheticConfig {
            device: "stub://back_camera".to_string(),
            width: 4,
            height: 2,
            target_fps: 200,
        })
    }

    fn configured_session() -> Result<(CaptureSession, Receiver<Frame>)> {
        let camera = camera();
        let device = camera.default_device(DevicePosition::Back).unwrap();
        let (sink, rx) = frame_channel();
        let mut session = CaptureSession::new();
        let mut config = session.begin_configuration(&camera);
        config.add_input(SessionInput::open(&camera, device)?)?;
        config.add_output(FrameOutput::new(sink))?;
        assert!(config.set_output_orientation(Orientation::Portrait));
        config.commit();
        Ok((session, rx))
    }

    #[test]
    fn transitions() {
        use SessionEvent::*;
        use SessionState::*;
        assert_eq!(Unconfigured.transition(ConfigurationCommitted), Configured);
        assert_eq!(Unconfigured.transition(ConfigurationAborted), Degraded);
        assert_eq!(Unconfigured.transition(Start), Unconfigured);
        assert_eq!(Configured.transition(Start), Running);
        assert_eq!(Degraded.transition(Start), Running);
        assert_eq!(Running.transition(Start), Running);
        assert_eq!(Running.transition(Stop), Stopped);
        assert_eq!(Stopped.transition(Stop), Stopped);
        assert_eq!(Stopped.transition(Start), Running);
        assert_eq!(Configured.transition(ConfigurationAborted), Configured);
    }

    #[test]
    fn dropped_guard_degrades_session() {
        let camera = camera();
        let mut session = CaptureSession::new();
        {
            let _config = session.begin_configuration(&camera);
        }
        assert_eq!(session.state(), SessionState::Degraded);
    }

    #[test]
    fn second_input_is_rejected() -> Result<()> {
        let (mut session, _rx) = configured_session()?;
        let camera = camera();
        let device = camera.default_device(DevicePosition::Back).unwrap();
        let input = SessionInput::open(&camera, device)?;
        let (sink, _preview) = frame_channel();
        let output = FrameOutput::new(sink);
        let mut config = session.begin_configuration(&camera);
        assert!(!config.can_add_input(&input));
        assert!(!config.can_add_output(&output));
        assert!(config.add_input(input).is_err());
        assert!(config.add_output(output).is_err());
        Ok(())
    }

    struct PickyCamera {
        inner: SyntheticCamera,
        accept_input: bool,
        accept_output: bool,
    }

    impl CameraProvider for PickyCamera {
        fn default_device(&self, position: DevicePosition) -> Option<DeviceInfo> {
            self.inner.default_device(position)
        }

        fn open(&self, device: &DeviceInfo) -> Result<Box<dyn FrameSource>> {
            self.inner.open(device)
        }

        fn accepts_input(&self, _device: &DeviceInfo) -> bool {
            self.accept_input
        }

        fn accepts_output(&self, _output: &FrameOutput) -> bool {
            self.accept_output
        }
    }

    #[test]
    fn camera_can_refuse_input_and_output() -> Result<()> {
        let picky = PickyCamera {
            inner: camera(),
            accept_input: false,
            accept_output: false,
        };
        let device = picky.default_device(DevicePosition::Back).unwrap();
        let input = SessionInput::open(&picky, device)?;
        let (sink, _rx) = frame_channel();
        let output = FrameOutput::new(sink);

        let mut session = CaptureSession::new();
        {
            let mut config = session.begin_configuration(&picky);
            assert!(!config.can_add_input(&input));
            assert!(!config.can_add_output(&output));
            let err = config.add_input(input).unwrap_err();
            assert!(err.to_string().contains("refused input stub://back_camera"));
            assert!(config.add_output(output).is_err());
        }
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Degraded);
        assert_eq!(snapshot.device, None);
        assert!(!snapshot.has_output);
        Ok(())
    }

    #[test]
    fn refused_output_leaves_input_only_session() -> Result<()> {
        let picky = PickyCamera {
            inner: camera(),
            accept_input: true,
            accept_output: false,
        };
        let device = picky.default_device(DevicePosition::Back).unwrap();
        let (sink, rx) = frame_channel();
        let mut session = CaptureSession::new();
        {
            let mut config = session.begin_configuration(&picky);
            config.add_input(SessionInput::open(&picky, device)?)?;
            let output = FrameOutput::new(sink);
            assert!(!config.can_add_output(&output));
        }
        assert_eq!(session.state(), SessionState::Degraded);
        assert!(session.start_running());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(session.stop_running());
        Ok(())
    }

    #[test]
    fn preview_receives_downscaled_frames_without_an_output() -> Result<()> {
        let wide = SyntheticCamera::new(SyntheticConfig {
            device: "stub://back_camera".to_string(),
            width: 64,
            height: 48,
            target_fps: 200,
        });
        let device = wide.default_device(DevicePosition::Back).unwrap();
        let (preview_sink, preview) = frame_channel();
        let mut session = CaptureSession::new();
        session.attach_preview(preview_sink);
        {
            let mut config = session.begin_configuration(&wide);
            config.add_input(SessionInput::open(&wide, device)?)?;
        }
        assert!(session.snapshot().has_preview);
        assert!(session.start_running());

        let frame = preview.recv_timeout(Duration::from_secs(2))?;
        assert_eq!(frame.format, PixelFormat::Rgb24);
        assert_eq!((frame.width, frame.height), (PREVIEW_MAX_WIDTH, 18));

        drop(preview);
        assert!(session.stop_running());
        Ok(())
    }

    struct FlakySource {
        health_checks: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl FrameSource for FlakySource {
        fn next_frame(&mut self) -> Result<Frame> {
            Err(anyhow!("device unplugged"))
        }

        fn is_healthy(&self) -> bool {
            self.health_checks.fetch_add(1, Ordering::SeqCst);
            false
        }

        fn stats(&self) -> crate::ingest::SourceStats {
            crate::ingest::SourceStats {
                frames_captured: 0,
                device: "test://flaky".to_string(),
            }
        }
    }

    struct FlakyCamera {
        health_checks: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl CameraProvider for FlakyCamera {
        fn default_device(&self, position: DevicePosition) -> Option<DeviceInfo> {
            Some(DeviceInfo {
                id: "test://flaky".to_string(),
                name: "Flaky camera".to_string(),
                position,
            })
        }

        fn open(&self, _device: &DeviceInfo) -> Result<Box<dyn FrameSource>> {
            Ok(Box::new(FlakySource {
                health_checks: self.health_checks.clone(),
            }))
        }
    }

    #[test]
    fn failing_source_is_health_checked_and_still_stops() -> Result<()> {
        let health_checks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let camera = FlakyCamera {
            health_checks: health_checks.clone(),
        };
        let device = camera.default_device(DevicePosition::Back).unwrap();
        let (sink, rx) = frame_channel();
        let mut session = CaptureSession::new();
        {
            let mut config = session.begin_configuration(&camera);
            config.add_input(SessionInput::open(&camera, device)?)?;
            config.add_output(FrameOutput::new(sink))?;
            config.commit();
        }
        assert!(session.start_running());

        let deadline = Instant::now() + Duration::from_secs(2);
        while health_checks.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(health_checks.load(Ordering::SeqCst) >= 2);
        assert!(rx.try_recv().is_err());

        assert!(session.stop_running());
        assert!(session.input.as_ref().is_some_and(|input| input.source.is_some()));
        Ok(())
    }

    #[test]
    fn health_watch_reports_first_failure_and_changes_only() {
        let start = Instant::now();
        let mut health = HealthWatch::new(start);
        assert!(health.failed());
        assert!(!health.failed());
        assert_eq!(health.captured(), 2);
        assert!(health.failed());

        assert!(!health.observe(true));
        assert!(health.observe(false));
        assert!(!health.observe(false));
        assert!(health.observe(true));

        assert!(!health.report_due(start + Duration::from_secs(1)));
        assert!(health.report_due(start + HEALTH_LOG_INTERVAL));
        assert!(!health.report_due(start + HEALTH_LOG_INTERVAL + Duration::from_secs(1)));
    }

    #[test]
    fn unconfigured_session_does_not_start() {
        let mut session = CaptureSession::new();
        assert!(!session.start_running());
        assert_eq!(session.state(), SessionState::Unconfigured);
    }

    #[test]
    fn running_session_delivers_oriented_bgra_frames() -> Result<()> {
        let (mut session, rx) = configured_session()?;
        assert_eq!(session.state(), SessionState::Configured);
        assert!(session.start_running());

        let frame = rx.recv_timeout(Duration::from_secs(2))?;
        assert_eq!(frame.format, PixelFormat::Bgra32);
        assert_eq!(frame.orientation, Orientation::Portrait);
        assert_eq!((frame.width, frame.height), (2, 4));

        assert!(session.stop_running());
        assert_eq!(session.state(), SessionState::Stopped);
        Ok(())
    }

    #[test]
    fn start_and_stop_are_idempotent() -> Result<()> {
        let (mut session, _rx) = configured_session()?;
        assert!(!session.stop_running());
        assert!(session.start_running());
        assert!(!session.start_running());
        assert!(session.stop_running());
        assert!(!session.stop_running());
        assert!(session.start_running());
        assert!(session.snapshot().running);
        assert!(session.stop_running());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.snapshot().running);
        Ok(())
    }

    #[test]
    fn late_frames_are_dropped_not_queued() {
        let (sink, rx) = frame_channel();
        let frame = || Frame::new(vec![0u8; 4], 1, 1, PixelFormat::Bgra32);
        assert_eq!(sink.deliver(frame(), true), Delivery::Delivered);
        assert_eq!(sink.deliver(frame(), true), Delivery::Dropped);
        drop(rx);
        assert_eq!(sink.deliver(frame(), true), Delivery::Closed);
    }
}
