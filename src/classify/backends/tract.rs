#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::classify::backend::{rank, Candidate, Classifier};
use crate::frame::{Frame, Orientation};

/// Tract-based backend for ONNX image classification models.
///
/// The model must take a `1x3xHxW` f32 tensor and produce one score per
/// class. Frames are rotated to the orientation hint, resized to the model
/// input and scaled to [0, 1] (then mean/std normalized when configured).
/// Scores that are not already a probability distribution go through softmax.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    labels: Vec<String>,
    top_k: usize,
    normalization: Option<([f32; 3], [f32; 3])>,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            labels: Vec::new(),
            top_k: 5,
            normalization: None,
        })
    }

    /// Class names indexed by model output position.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Per-channel mean/std applied after scaling to [0, 1].
    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.normalization = Some((mean, std));
        self
    }

    fn build_input(&self, frame: &Frame, orientation: Orientation) -> Result<Tensor> {
        let rgb = frame.to_rgb()?;
        let image = RgbImage::from_raw(frame.width, frame.height, rgb).ok_or_else(|| {
            anyhow!("frame buffer does not match {}x{}", frame.width, frame.height)
        })?;
        let image = match orientation {
            Orientation::Portrait if image.width() > image.height() => imageops::rotate90(&image),
            Orientation::Landscape if image.height() > image.width() => {
                imageops::rotate270(&image)
            }
            _ => image,
        };
        let image = imageops::resize(&image, self.width, self.height, FilterType::Triangle);

        let (mean, std) = self.normalization.unwrap_or(([0.0; 3], [1.0; 3]));
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| {
                let value = image.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0;
                (value - mean[channel]) / std[channel]
            },
        );

        Ok(input.into_tensor())
    }

    fn extract_candidates(&self, outputs: TVec<TValue>) -> Result<Vec<Candidate>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        if scores.is_empty() {
            return Err(anyhow!("model produced an empty score tensor"));
        }
        let probabilities = if is_distribution(&scores) {
            scores
        } else {
            softmax(&scores)
        };
        let candidates = probabilities
            .into_iter()
            .enumerate()
            .map(|(idx, p)| {
                let label = self
                    .labels
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{idx}"));
                Candidate::new(label, p as f64)
            })
            .collect();
        Ok(rank(candidates, self.top_k))
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &Frame, orientation: Orientation) -> Result<Vec<Candidate>> {
        let input = self.build_input(frame, orientation)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_candidates(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let input = Tensor::zero::<f32>(&[1, 3, self.height as usize, self.width as usize])?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}

fn is_distribution(scores: &[f32]) -> bool {
    let in_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    let sum: f32 = scores.iter().sum();
    in_range && (sum - 1.0).abs() < 1e-3
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
