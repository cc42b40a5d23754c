// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run fetch of local ONNX models.
//!
//! A model and its `tokenizer.json` are cached under
//! `{data_dir}/models/{name}/`.

use std::path::{Path, PathBuf};

use mnemo_core::error::MnemoError;
use tokio::sync::OnceCell;
use tracing::info;

/// Where a local model's files come from.
#[derive(Debug, Clone)]
pub struct ModelSource {
    /// Model name, also used as the cache directory name.
    pub name: String,
    pub model_url: String,
    pub tokenizer_url: String,
}

/// Resolves and fetches the files of one local model.
pub struct ModelManager {
    data_dir: PathBuf,
    source: ModelSource,
    init_guard: OnceCell<PathBuf>,
}

impl ModelManager {
    pub fn new(data_dir: PathBuf, source: ModelSource) -> Self {
        Self {
            data_dir,
            source,
            init_guard: OnceCell::new(),
        }
    }

    /// Cache directory of this model. Slashes in hub-style names (`BAAI/bge-m3`) become `--`.
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir
            .join("models")
            .join(self.source.name.replace(['/', '\\'], "--"))
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    /// Both files are on disk.
    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Path of `model.onnx`, fetching the model first if needed. Concurrent
    /// callers share one download.
    pub async fn ensure_model(&self) -> Result<PathBuf, MnemoError> {
        self.init_guard
            .get_or_try_init(|| self.download_missing())
            .await
            .cloned()
    }

    async fn download_missing(&self) -> Result<PathBuf, MnemoError> {
        if self.is_model_available() {
            return Ok(self.model_path());
        }

        let model_dir = self.model_dir();
        info!(model = %self.source.name, dir = %model_dir.display(), "fetching local model");
        tokio::fs::create_dir_all(&model_dir)
            .await
            .map_err(MnemoError::storage)?;

        for (file, url) in [
            (self.model_path(), &self.source.model_url),
            (self.tokenizer_path(), &self.source.tokenizer_url),
        ] {
            if !file.exists() {
                fetch_to(url, &file).await?;
            }
        }

        Ok(self.model_path())
    }
}

/// Fetch `url` into `dest` through a `.part` sibling, so an interrupted
/// download never looks like a usable model file.
async fn fetch_to(url: &str, dest: &Path) -> Result<(), MnemoError> {
    let partial = dest.with_extension("part");
    let fetched = async {
        let body = reqwest::get(url)
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MnemoError::Config(format!("cannot fetch {url}: {e}")))?
            .bytes()
            .await
            .map_err(|e| MnemoError::Config(format!("truncated response from {url}: {e}")))?;
        tokio::fs::write(&partial, &body)
            .await
            .map_err(MnemoError::storage)?;
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(MnemoError::storage)?;
        Ok::<_, MnemoError>(body.len())
    }
    .await;

    match fetched {
        Ok(bytes) => {
            info!(file = %dest.display(), bytes, "model file stored");
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}
