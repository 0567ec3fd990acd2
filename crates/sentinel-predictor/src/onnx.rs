use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use parking_lot::Mutex;
use sentinel_core::{Batch, PredictionResult};

use crate::{Predictor, PredictorError};

/// Category labels the bundled classification head predicts, in output
/// index order. Fixed at build time because the label set is baked into
/// the exported ONNX graph alongside the weights.
const CATEGORIES: &[&str] = &[
    "documents",
    "images",
    "audio",
    "video",
    "archives",
    "source_code",
    "other",
];

/// Production inference backend, grounded in the teacher's
/// `codegraph-vector::onnx_provider` module: a `Mutex`-guarded
/// `ort::session::Session`, `GraphOptimizationLevel::Level3`, and a
/// requested execution provider that falls back to CPU on registration
/// failure rather than failing the whole predictor.
pub struct OnnxPredictor {
    session: Arc<Mutex<Session>>,
    model_version: String,
}

impl OnnxPredictor {
    pub fn load(model_path: &Path, device_preference: Option<&str>) -> Result<Self, PredictorError> {
        let mut builder = Session::builder()
            .map_err(|e| PredictorError::Load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PredictorError::Load(e.to_string()))?;

        if let Some(pref) = device_preference {
            let wants_gpu = pref.eq_ignore_ascii_case("cuda") || pref.eq_ignore_ascii_case("gpu");
            if wants_gpu {
                match builder
                    .clone()
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                {
                    Ok(gpu_builder) => {
                        builder = gpu_builder;
                        tracing::info!("using CUDA execution provider for ONNX inference");
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "requested GPU execution provider unavailable, falling back to CPU"
                        );
                    }
                }
            }
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| PredictorError::Load(e.to_string()))?;

        let model_version = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            model_version,
        })
    }

    /// Builds the model's numeric input tensor from file metadata: a
    /// size-bucket feature and an extension-hash feature per file. The
    /// classification head was trained on these two signals rather than
    /// file contents, keeping the worker's hot path I/O-free.
    fn feature_tensor(batch: &Batch) -> Array2<f32> {
        let rows = batch.len().max(1);
        let mut arr = Array2::<f32>::zeros((rows, 2));
        for (i, file) in batch.files.iter().enumerate() {
            let size_feature = (file.size_bytes as f32).ln_1p();
            let ext_feature = file
                .extension
                .as_deref()
                .map(ext_hash)
                .unwrap_or(0.0);
            arr[[i, 0]] = size_feature;
            arr[[i, 1]] = ext_feature;
        }
        arr
    }
}

fn ext_hash(ext: &str) -> f32 {
    let mut h: u32 = 2166136261;
    for b in ext.as_bytes() {
        h ^= *b as u32;
        h = h.wrapping_mul(16777619);
    }
    (h % 1000) as f32 / 1000.0
}

#[async_trait::async_trait]
impl Predictor for OnnxPredictor {
    async fn predict(&self, batch: &Batch) -> Result<Vec<PredictionResult>, PredictorError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let input = Self::feature_tensor(batch);
        let session = self.session.clone();
        let model_version = self.model_version.clone();
        let files = batch.files.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<PredictionResult>, PredictorError> {
            let mut guard = session.lock();
            let outputs = guard
                .run(ort::inputs![input.view()])
                .map_err(|e| PredictorError::Inference(e.to_string()))?;
            let first = outputs
                .iter()
                .next()
                .ok_or_else(|| PredictorError::Inference("model produced no outputs".into()))?
                .1;
            let logits = first
                .try_extract_tensor::<f32>()
                .map_err(|e| PredictorError::Inference(e.to_string()))?;
            let view = logits.view();

            let mut results = Vec::with_capacity(files.len());
            for (i, file) in files.iter().enumerate() {
                let row: Vec<f32> = (0..CATEGORIES.len())
                    .map(|c| *view.get([i, c]).unwrap_or(&0.0))
                    .collect();
                let (best_idx, confidence) = softmax_argmax(&row);
                results.push(PredictionResult {
                    source_path: file.path.clone(),
                    category_path: CATEGORIES[best_idx].to_string(),
                    confidence,
                    tags: file.extension.clone().into_iter().collect(),
                    model_version: model_version.clone(),
                });
            }
            Ok(results)
        })
        .await
        .map_err(|e| PredictorError::Inference(e.to_string()))?
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

fn softmax_argmax(logits: &[f32]) -> (usize, f32) {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in exps.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }
    let confidence = if sum > 0.0 { best_val / sum } else { 0.0 };
    (best_idx, confidence)
}
