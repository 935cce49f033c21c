//! ONNX Runtime embedder using the `ort` crate.
//!
//! Loads a sentence-transformer ONNX model, runs inference, applies mean
//! pooling with the attention mask, and L2-normalizes the result.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{info, warn};

use super::tokenizer::BertTokenizer;
use super::{Embedder, EmbedderError};

/// ONNX-backed embedder implementing the `Embedder` trait.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Load a model from `model_dir` (expects `model.onnx` and `tokenizer.json`).
    ///
    /// The session is first built for `device` ("auto" | "cuda" | "cpu").
    /// If that fails and `fallback_to_cpu` is set, one CPU attempt follows;
    /// a failure of both is fatal to the caller.
    pub fn new(
        model_dir: &Path,
        device: &str,
        fallback_to_cpu: bool,
        dimensions: usize,
    ) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime (device: {device})...");

        let session = match build_session(&model_path, device) {
            Ok(s) => s,
            Err(e) if fallback_to_cpu && device != "cpu" => {
                warn!("Session init failed on {device}: {e}; falling back to CPU");
                build_session(&model_path, "cpu").map_err(|e2| {
                    EmbedderError::ModelLoadFailed(format!(
                        "model load failed on {device} ({e}) and on cpu fallback ({e2})"
                    ))
                })?
            }
            Err(e) => {
                return Err(EmbedderError::ModelLoadFailed(format!(
                    "model load error: {e}"
                )));
            }
        };

        info!("ONNX model loaded successfully");

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer error: {e}")))?;

        info!("Tokenizer loaded (vocab size: {})", tokenizer.vocab_size());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }
}

/// Build an ort session for the requested device.
#[allow(unused_variables)]
fn build_session(model_path: &Path, device: &str) -> Result<Session, String> {
    let builder = Session::builder()
        .map_err(|e| format!("session builder error: {e}"))?
        .with_intra_threads(4)
        .map_err(|e| format!("thread config error: {e}"))?
        .with_inter_threads(4)
        .map_err(|e| format!("thread config error: {e}"))?;

    #[cfg(feature = "cuda")]
    let builder = if device == "cuda" || device == "auto" {
        use ort::execution_providers::CUDAExecutionProvider;
        builder
            .with_execution_providers([CUDAExecutionProvider::default()
                .build()
                .error_on_failure()])
            .map_err(|e| format!("cuda provider error: {e}"))?
    } else {
        builder
    };

    #[cfg(not(feature = "cuda"))]
    if device == "cuda" {
        return Err("built without the `cuda` feature".to_string());
    }

    builder
        .commit_from_file(model_path)
        .map_err(|e| format!("model load error: {e}"))
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let tokens = self
            .tokenizer
            .tokenize(text)
            .map_err(|e| EmbedderError::InferenceFailed(format!("tokenization failed: {e}")))?;

        let seq_len = tokens.input_ids.len();

        // (shape, data) tuple form avoids ndarray version coupling with ort
        let input_ids_val = Tensor::from_array(([1usize, seq_len], tokens.input_ids.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val =
            Tensor::from_array(([1usize, seq_len], tokens.attention_mask.clone())).map_err(
                |e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")),
            )?;
        let token_type_ids_val = Tensor::from_array(([1usize, seq_len], vec![0i64; seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // Output shape: [batch_size=1, seq_length, hidden_size]
        let (shape, hidden_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        // Pool with the model's own hidden size; a config that disagrees
        // must fail loudly, not index past the buffer or truncate silently
        let hidden_size = hidden_size_from_shape(shape, self.dimensions)?;

        let embedding = mean_pooling(hidden_data, &tokens.attention_mask, seq_len, hidden_size);

        Ok(l2_normalize(&embedding))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Validate a `[batch, seq, hidden]` output shape against the configured
/// embedding dimension, returning the model's actual hidden size.
fn hidden_size_from_shape(shape: &[i64], expected: usize) -> Result<usize, EmbedderError> {
    if shape.len() != 3 {
        return Err(EmbedderError::InferenceFailed(format!(
            "unexpected model output shape {shape:?}, expected [batch, seq, hidden]"
        )));
    }

    let hidden = shape[2] as usize;
    if hidden != expected {
        return Err(EmbedderError::InferenceFailed(format!(
            "model hidden size {hidden} does not match configured dimension {expected}"
        )));
    }

    Ok(hidden)
}

/// Mean pooling over hidden states weighted by attention mask.
///
/// `hidden_data` is a flat array with shape `[1, seq_len, hidden_size]`.
fn mean_pooling(
    hidden_data: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum: f32 = 0.0;

    for t in 0..seq_len {
        let mask = attention_mask[t] as f32;
        mask_sum += mask;

        for h in 0..hidden_size {
            result[h] += hidden_data[t * hidden_size + h] * mask;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

/// L2-normalize a vector, returning the normalized copy.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = vec![3.0, 4.0];
        let normed = l2_normalize(&v);
        let norm: f32 = normed.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((normed[0] - 0.6).abs() < 1e-6);
        assert!((normed[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero() {
        let v = vec![0.0, 0.0, 0.0];
        assert_eq!(l2_normalize(&v), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mean_pooling_simple() {
        // 1 token, hidden_size=3, full attention
        let hidden = vec![1.0, 2.0, 3.0];
        let mask = vec![1i64];
        assert_eq!(mean_pooling(&hidden, &mask, 1, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mean_pooling_with_padding() {
        // 2 tokens, hidden_size=2, second token is padding
        let hidden = vec![1.0, 2.0, 10.0, 20.0];
        let mask = vec![1i64, 0i64];
        assert_eq!(mean_pooling(&hidden, &mask, 2, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn test_hidden_size_matches_config() {
        assert_eq!(hidden_size_from_shape(&[1, 7, 384], 384).unwrap(), 384);
    }

    #[test]
    fn test_hidden_size_mismatch_errors() {
        // Config claims 512 but the model produces 384-wide hidden states
        let err = hidden_size_from_shape(&[1, 7, 384], 512);
        assert!(matches!(err, Err(EmbedderError::InferenceFailed(_))));

        // Config smaller than the model would silently truncate
        let err = hidden_size_from_shape(&[1, 7, 384], 256);
        assert!(matches!(err, Err(EmbedderError::InferenceFailed(_))));
    }

    #[test]
    fn test_hidden_size_rejects_wrong_rank() {
        let err = hidden_size_from_shape(&[1, 384], 384);
        assert!(matches!(err, Err(EmbedderError::InferenceFailed(_))));
    }

    #[test]
    fn test_missing_model_dir() {
        let err = OnnxEmbedder::new(Path::new("/nonexistent"), "cpu", true, 384);
        assert!(matches!(err, Err(EmbedderError::ModelLoadFailed(_))));
    }

    /// Requires downloaded model files; run with `-- --ignored`.
    #[test]
    #[ignore]
    fn test_onnx_embed() {
        let model_dir = Path::new("models/all-MiniLM-L6-v2");
        if !model_dir.join("model.onnx").exists() {
            eprintln!("Skipping: model files not downloaded");
            return;
        }

        let embedder = OnnxEmbedder::new(model_dir, "cpu", true, 384).unwrap();
        let vec = embedder.embed("Hello, world!").unwrap();
        assert_eq!(vec.len(), 384);

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
