use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::modeling::{DurationModel, FittedModel, ModelKind};
use crate::models::{PipelineError, Result};

/// File layout under the output directory: `raw/`, `models/` and `reports/`.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_layout(&self) -> Result<()> {
        for dir in ["raw", "models", "reports"] {
            fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    pub fn store_raw_csv(&self, data: &[u8]) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let path = self.root.join("raw").join(format!("{}.csv", timestamp));

        write_file(&path, data)?;
        info!("Stored raw CSV ({} bytes): {}", data.len(), path.display());
        Ok(path)
    }

    /// Raw CSV files, most recent first.
    pub fn list_raw_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.root.join("raw");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut raw_files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                raw_files.push(path);
            }
        }

        // Timestamped names sort chronologically
        raw_files.sort_by(|a, b| b.cmp(a));
        Ok(raw_files)
    }

    pub fn get_latest_raw_file(&self) -> Result<Option<PathBuf>> {
        Ok(self.list_raw_files()?.into_iter().next())
    }

    pub fn load_latest_raw_csv(&self) -> Result<Vec<u8>> {
        let latest = self
            .get_latest_raw_file()?
            .ok_or_else(|| PipelineError::SourceFetch(format!("no raw CSV under {}", self.root.display())))?;

        info!("Loading raw data from: {}", latest.display());
        Ok(fs::read(latest)?)
    }

    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.root.join("models").join(format!("{}.json", kind))
    }

    pub fn store_model(&self, model: &FittedModel) -> Result<PathBuf> {
        let path = self.model_path(model.kind());
        let json = serde_json::to_vec(model)?;

        write_file(&path, &json)?;
        info!("Stored {} model artifact: {}", model.kind(), path.display());
        Ok(path)
    }

    pub fn store_report<T: Serialize>(&self, run_id: &Uuid, report: &T) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let path = self
            .root
            .join("reports")
            .join(format!("{}-{}.json", timestamp, run_id));

        write_file(&path, &serde_json::to_vec_pretty(report)?)?;
        info!("Stored run report: {}", path.display());
        Ok(path)
    }
}

/// Reads a stored model back; needs only the artifact file.
pub fn load_model(path: impl AsRef<Path>) -> Result<FittedModel> {
    let bytes = fs::read(path.as_ref())?;
    let model: FittedModel = serde_json::from_slice(&bytes)?;
    info!("Loaded {} model from: {}", model.kind(), path.as_ref().display());
    Ok(model)
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    Ok(())
}
