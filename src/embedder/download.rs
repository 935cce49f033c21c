//! Model file auto-download from HuggingFace.
//!
//! Downloads the ONNX model and tokenizer files if they don't already
//! exist locally. TLS verification is controlled by an explicit,
//! download-scoped config flag instead of any process-global setting.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::DownloadConfig;

/// Base URL for HuggingFace model files.
const HF_BASE: &str = "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main";

/// Files required for the embedder, with their relative URL paths.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

/// Download model files from HuggingFace if any are missing.
///
/// Creates the model directory if needed and skips files already present.
pub fn ensure_model_files(model_dir: &Path, download: &DownloadConfig) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found, skipping download");
        return Ok(());
    }

    if download.insecure_tls {
        warn!("TLS certificate verification is DISABLED for model downloads");
    }

    let client = reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(download.insecure_tls)
        .build()
        .context("failed to build download client")?;

    eprintln!("[INFO] Downloading model files from HuggingFace...");
    eprintln!("[INFO] This is a one-time download (~90MB), please wait...");

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);

        if dest.exists() {
            info!("File already exists: {filename}");
            continue;
        }

        let url = format!("{HF_BASE}/{url_path}");
        eprintln!("[INFO] Downloading {filename}...");
        download_file(&client, &dest, &url)
            .with_context(|| format!("failed to download {filename}"))?;
    }

    eprintln!("[INFO] Model download complete!");
    Ok(())
}

/// Download a single file with a progress bar, streaming to disk.
fn download_file(client: &reqwest::blocking::Client, dest: &Path, url: &str) -> Result<()> {
    let mut resp = client
        .get(url)
        .send()
        .with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);

    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                .expect("valid template")
                .progress_chars("█▓░"),
        );
        pb
    } else {
        ProgressBar::new_spinner()
    };

    let file = fs::File::create(dest)
        .with_context(|| format!("failed to create file: {}", dest.display()))?;

    std::io::copy(&mut resp, &mut pb.wrap_write(file)).context("failed to stream file")?;
    pb.finish_and_clear();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_files_present_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!all_files_present(dir.path()));
    }

    #[test]
    fn test_all_files_present_complete() {
        let dir = tempfile::tempdir().unwrap();
        for (name, _) in MODEL_FILES {
            fs::write(dir.path().join(name), b"stub").unwrap();
        }
        assert!(all_files_present(dir.path()));
    }

    #[test]
    fn test_all_files_present_partial() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tokenizer.json"), b"stub").unwrap();
        assert!(!all_files_present(dir.path()));
    }
}
