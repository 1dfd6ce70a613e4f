//! Classifier collaborators.
//!
//! - `stub`: deterministic luma-band classifier, no model file
//! - `tract`: ONNX models through tract (feature: backend-tract)

mod backend;
mod backends;
mod labels;

pub use backend::{rank, Candidate, Classifier};
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use labels::{load_labels, parse_labels};

use anyhow::{bail, Result};

use crate::config::ClassifierSettings;

/// ImageNet channel statistics.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Build the configured classifier.
pub fn classifier_for(settings: &ClassifierSettings) -> Result<Box<dyn Classifier>> {
    let labels = match &settings.labels_path {
        Some(path) => Some(load_labels(path)?),
        None => None,
    };
    match settings.backend.as_str() {
        "stub" => {
            let classifier = match labels {
                Some(labels) => StubClassifier::with_labels(labels),
                None => StubClassifier::new(),
            };
            Ok(Box::new(classifier.with_top_k(settings.top_k)))
        }
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let Some(model_path) = &settings.model_path else {
                bail!("the tract classifier requires a model path");
            };
            let mut classifier =
                TractClassifier::new(model_path, settings.input_width, settings.input_height)?
                    .with_labels(labels.unwrap_or_default())
                    .with_top_k(settings.top_k);
            if settings.imagenet_normalization {
                classifier = classifier.with_normalization(IMAGENET_MEAN, IMAGENET_STD);
            }
            Ok(Box::new(classifier))
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => bail!("the tract classifier requires the backend-tract feature"),
        other => bail!("unknown classifier backend '{}'", other),
    }
}
