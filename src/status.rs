//! User-facing status messages.

use anyhow::Error;

pub const PREPARING_CAMERA: &str = "Preparing camera...";
pub const PREPARING_INFERENCE: &str = "Preparing inference...";
pub const ACCESS_NOT_GRANTED: &str = "Camera access has not been granted";
pub const ALLOW_IN_SETTINGS: &str = "Allow camera access in your system settings";
pub const PERMISSION_UNKNOWN: &str = "Unable to determine camera permission";
pub const BACK_CAMERA_UNAVAILABLE: &str = "Back camera is unavailable";
pub const INPUT_REJECTED: &str = "Unable to add camera input";
pub const OUTPUT_REJECTED: &str = "Failed to add video output";
/// Shown alongside a fresh classification result.
pub const RESULT_READY: &str = "Classification result";

pub fn input_failed(err: &Error) -> String {
    format!("Failed to configure camera input: {err:#}")
}

pub fn classification_error(err: &Error) -> String {
    format!("Classification error: {err:#}")
}

pub fn invocation_failed(err: &Error) -> String {
    format!("Failed to run classification: {err:#}")
}
