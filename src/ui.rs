use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::controller::CaptureController;
use crate::frame::Frame;
use crate::state::{PublishedState, StateUpdate};
use crate::status;

const CAMERA_GLYPH: &str = "📷";

/// Luma ramp for the preview, darkest first.
const PREVIEW_RAMP: &[u8] = b" .:-=+*#%@";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "plain" => Ok(Self::Plain),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow!("unknown ui mode '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    fn spinner(&self) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = self.spinner();
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live preview and overlay line. Plain mode prints only the overlay.
    pub fn overlay_view(&self) -> OverlayView {
        let spinner = self.use_pretty().then(|| self.spinner());
        OverlayView {
            spinner,
            preview: Vec::new(),
            last: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// What the preview overlay shows for one published snapshot.
///
/// The result panel is always present: the latest result when there is one,
/// otherwise the status message. Without camera access a notice is layered
/// on top of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overlay {
    pub caption: &'static str,
    pub headline: String,
    pub detail: Option<String>,
    pub permission_notice: Option<String>,
}

impl Overlay {
    pub fn from_state(state: &PublishedState) -> Self {
        let (headline, detail) = match &state.latest_result {
            Some(result) => (
                result.identifier.clone(),
                Some(result.confidence_description()),
            ),
            None => (state.status.clone(), None),
        };
        Self {
            caption: status::RESULT_READY,
            headline,
            detail,
            permission_notice: (!state.is_authorized).then(|| state.status.clone()),
        }
    }

    /// Single-line rendering: notice first, then the result panel.
    pub fn line(&self) -> String {
        let mut line = String::new();
        if let Some(notice) = &self.permission_notice {
            line.push_str(&format!("{CAMERA_GLYPH} {notice} | "));
        }
        line.push_str(self.caption);
        line.push_str(": ");
        line.push_str(&self.headline);
        if let Some(detail) = &self.detail {
            line.push_str(&format!(" ({detail})"));
        }
        line
    }
}

/// Render a frame as rows of luma characters, two pixel rows per text row.
pub fn render_preview(frame: &Frame) -> Result<Vec<String>> {
    let luma = frame.luma()?;
    let width = frame.width as usize;
    let rows: Vec<&[u8]> = luma.chunks_exact(width).collect();
    let top = PREVIEW_RAMP.len() - 1;
    let lines: Vec<String> = rows
        .chunks(2)
        .map(|pair| {
            (0..width)
                .map(|x| {
                    let sum: usize = pair.iter().map(|row| row[x] as usize).sum();
                    let mean = sum / pair.len();
                    PREVIEW_RAMP[mean * top / 255] as char
                })
                .collect::<String>()
        })
        .collect();
    Ok(lines)
}

pub struct OverlayView {
    spinner: Option<ProgressBar>,
    preview: Vec<String>,
    last: Option<Overlay>,
}

impl OverlayView {
    /// Redraw when the overlay changed since the last call.
    pub fn show(&mut self, overlay: Overlay) {
        if self.last.as_ref() == Some(&overlay) {
            return;
        }
        if self.spinner.is_none() {
            eprintln!("{}", overlay.line());
        }
        self.last = Some(overlay);
        self.redraw();
    }

    /// Replace the preview picture drawn above the overlay line.
    pub fn show_preview(&mut self, frame: &Frame) {
        match render_preview(frame) {
            Ok(lines) => self.preview = lines,
            Err(err) => {
                log::debug!("preview frame not rendered: {:#}", err);
                return;
            }
        }
        self.redraw();
    }

    pub fn preview(&self) -> &[String] {
        &self.preview
    }

    fn redraw(&self) {
        let Some(spinner) = &self.spinner else {
            return;
        };
        let mut message = self.preview.join("\n");
        if !message.is_empty() {
            message.push('\n');
        }
        if let Some(overlay) = &self.last {
            message.push_str(&overlay.line());
        }
        spinner.set_message(message);
    }

    pub fn finish(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            let line = self.last.as_ref().map(Overlay::line).unwrap_or_default();
            spinner.finish_with_message(line);
        }
    }
}

impl Drop for OverlayView {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Presentation loop: folds state updates into a snapshot and renders it.
pub struct Presenter {
    controller: CaptureController,
    updates: Receiver<StateUpdate>,
    preview: Option<Receiver<Frame>>,
    state: PublishedState,
    view: OverlayView,
}

impl Presenter {
    pub fn new(
        mut controller: CaptureController,
        updates: Receiver<StateUpdate>,
        view: OverlayView,
    ) -> Self {
        let preview = controller.take_preview();
        let mut presenter = Self {
            controller,
            updates,
            preview,
            state: PublishedState::default(),
            view,
        };
        presenter.render();
        presenter
    }

    /// First appearance: ask for camera access and start capture.
    pub fn appear(&self) {
        self.controller.request_access_and_configure();
    }

    pub fn disappear(&self) {
        self.controller.stop_session();
    }

    pub fn state(&self) -> &PublishedState {
        &self.state
    }

    pub fn controller(&self) -> &CaptureController {
        &self.controller
    }

    /// Preview rows currently drawn.
    pub fn preview(&self) -> &[String] {
        self.view.preview()
    }

    /// Wait up to `timeout` for updates, apply everything queued, then draw
    /// the newest preview frame. Returns false once every publisher is gone.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        match self.updates.recv_timeout(timeout) {
            Ok(first) => {
                self.state.apply(first);
                while let Ok(update) = self.updates.try_recv() {
                    self.state.apply(update);
                }
                self.render();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return false,
        }
        let latest = self
            .preview
            .as_ref()
            .and_then(|preview| preview.try_iter().last());
        if let Some(frame) = latest {
            self.view.show_preview(&frame);
        }
        true
    }

    fn render(&mut self) {
        self.view.show(Overlay::from_state(&self.state));
    }

    /// Stop capture, shut the controller down and return the final snapshot.
    pub fn finish(self) -> PublishedState {
        self.disappear();
        let Self {
            controller,
            updates,
            preview,
            mut state,
            mut view,
        } = self;
        drop(preview);
        drop(controller);
        for update in updates.try_iter() {
            state.apply(update);
        }
        view.show(Overlay::from_state(&state));
        view.finish();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ClassificationResult;

    #[test]
    fn ui_mode_parses() {
        assert_eq!(UiMode::parse("Pretty").unwrap(), UiMode::Pretty);
        assert!(UiMode::parse("fancy").is_err());
    }

    #[test]
    fn result_overlay_shows_label_and_percentage() {
        let state = PublishedState {
            is_authorized: true,
            status: status::RESULT_READY.to_string(),
            latest_result: Some(ClassificationResult::new("cat", 0.92)),
        };
        let overlay = Overlay::from_state(&state);
        assert_eq!(overlay.headline, "cat");
        assert_eq!(overlay.detail.as_deref(), Some("92%"));
        assert_eq!(overlay.line(), "Classification result: cat (92%)");
    }

    #[test]
    fn status_overlay_without_result() {
        let state = PublishedState {
            is_authorized: true,
            status: "Classification error: boom".to_string(),
            latest_result: None,
        };
        let overlay = Overlay::from_state(&state);
        assert_eq!(overlay.caption, status::RESULT_READY);
        assert_eq!(
            overlay.line(),
            "Classification result: Classification error: boom"
        );
        assert!(overlay.permission_notice.is_none());
    }

    #[test]
    fn permission_notice_is_layered_over_the_result_panel() {
        let state = PublishedState {
            is_authorized: false,
            status: status::ALLOW_IN_SETTINGS.to_string(),
            latest_result: None,
        };
        let overlay = Overlay::from_state(&state);
        assert_eq!(
            overlay.permission_notice.as_deref(),
            Some(status::ALLOW_IN_SETTINGS)
        );
        assert_eq!(overlay.caption, status::RESULT_READY);
        assert_eq!(overlay.headline, status::ALLOW_IN_SETTINGS);
        let line = overlay.line();
        assert!(line.starts_with(CAMERA_GLYPH));
        assert!(line.ends_with(&format!(
            "| {}: {}",
            status::RESULT_READY,
            status::ALLOW_IN_SETTINGS
        )));
    }

    #[test]
    fn preview_maps_luma_to_ramp() -> Result<()> {
        use crate::frame::PixelFormat;
        let white = [255u8, 255, 255];
        let black = [0u8, 0, 0];
        let mut data = Vec::new();
        for row in [[white, black], [white, black], [black, white]] {
            for px in row {
                data.extend_from_slice(&px);
            }
        }
        let frame = Frame::new(data, 2, 3, PixelFormat::Rgb24);
        assert_eq!(render_preview(&frame)?, vec!["@ ".to_string(), " @".to_string()]);
        Ok(())
    }

    #[test]
    fn plain_view_keeps_preview_without_printing_it() -> Result<()> {
        use crate::frame::PixelFormat;
        let mut view = Ui::new(UiMode::Plain, false, false).overlay_view();
        view.show_preview(&Frame::new(vec![128u8; 3], 1, 1, PixelFormat::Rgb24));
        assert_eq!(view.preview(), &["=".to_string()]);
        view.show_preview(&Frame::new(vec![0u8; 2], 1, 1, PixelFormat::Rgb24));
        assert_eq!(view.preview(), &["=".to_string()]);
        Ok(())
    }

    #[test]
    fn plain_ui_never_spins() {
        let ui = Ui::new(UiMode::Plain, true, false);
        assert!(!ui.use_pretty());
        let ui = Ui::new(UiMode::Auto, false, false);
        assert!(!ui.use_pretty());
        let ui = Ui::new(UiMode::Auto, true, true);
        assert!(!ui.use_pretty());
    }
}
