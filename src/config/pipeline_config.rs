use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::models::{DEFAULT_VIOLATION_CODES, VIOLATION_CODE_ABSENT};
use crate::modeling::ModelKind;

pub const DEFAULT_CONFIG_PATH: &str = "src/configs/pipeline.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source: SourceSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub split: SplitSection,
    #[serde(default)]
    pub models: ModelsSection,
    #[serde(default)]
    pub forest: ForestSection,
    #[serde(default)]
    pub schema: SchemaSection,
    // Optional environment variable names for customization
    pub env_source_url: Option<String>,
    pub env_output_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    pub name: String,
    pub url: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    pub directory: PathBuf,
    pub analysis_table: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSection {
    pub train_fraction: f64,
    pub seed: u64,
    pub quantile_groups: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsSection {
    pub kinds: Vec<ModelKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestSection {
    pub n_trees: usize,
    pub max_features: usize,
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
}

/// Allowed categorical domains checked by the normalizer and the validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSection {
    pub violation_codes: Vec<String>,
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;

        let mut config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Environment variables win over the file, so a `.env` can point a run at
    /// a mirror of the dataset or a scratch output directory.
    pub fn apply_env_overrides(&mut self) {
        let url_var = self
            .env_source_url
            .as_deref()
            .unwrap_or("FIRE_INSPECTIONS_SOURCE_URL");
        let output_var = self
            .env_output_dir
            .as_deref()
            .unwrap_or("FIRE_INSPECTIONS_OUTPUT_DIR");

        if let Ok(url) = env::var(url_var) {
            self.source.url = url;
        }

        if let Ok(dir) = env::var(output_var) {
            let dir = PathBuf::from(dir);
            if let Some(file_name) = self.output.analysis_table.file_name() {
                self.output.analysis_table = dir.join("data").join(file_name);
            }
            self.output.directory = dir;
        }
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.source.timeout_seconds.unwrap_or(60)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.url.is_empty() {
            return Err(anyhow::anyhow!("Source URL cannot be empty"));
        }

        if !(self.split.train_fraction > 0.0 && self.split.train_fraction < 1.0) {
            return Err(anyhow::anyhow!(
                "Train fraction must lie strictly between 0 and 1, got {}",
                self.split.train_fraction
            ));
        }

        if self.split.quantile_groups < 2 {
            return Err(anyhow::anyhow!("At least two quantile groups are required"));
        }

        if self.models.kinds.is_empty() {
            return Err(anyhow::anyhow!("No model kinds configured"));
        }

        if self.forest.n_trees == 0 || self.forest.max_features == 0 || self.forest.min_samples_leaf == 0 {
            return Err(anyhow::anyhow!(
                "Forest n_trees, max_features and min_samples_leaf must be positive"
            ));
        }

        if self.schema.violation_codes.is_empty() {
            return Err(anyhow::anyhow!("Violation code domain cannot be empty"));
        }

        Ok(())
    }
}

impl SchemaSection {
    /// Configured codes plus the explicit "no violation" marker.
    pub fn violation_domain(&self) -> Vec<String> {
        let mut domain: Vec<String> = self
            .violation_codes
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect();
        domain.push(VIOLATION_CODE_ABSENT.to_string());
        domain.sort();
        domain.dedup();
        domain
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceSection {
                name: "highrise_residential_fire_inspections".to_string(),
                url: "https://ckan0.cf.opendata.inter.prod-toronto.ca/api/3/action/package_show?id=highrise-residential-fire-inspection-results".to_string(),
                timeout_seconds: Some(60),
            },
            output: OutputSection::default(),
            split: SplitSection::default(),
            models: ModelsSection::default(),
            forest: ForestSection::default(),
            schema: SchemaSection::default(),
            env_source_url: None,
            env_output_dir: None,
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("outputs"),
            analysis_table: PathBuf::from("outputs/data/analysis_data.parquet"),
        }
    }
}

impl Default for SplitSection {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            seed: 853,
            quantile_groups: 5,
        }
    }
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            kinds: vec![ModelKind::Linear, ModelKind::RandomForest],
        }
    }
}

impl Default for ForestSection {
    fn default() -> Self {
        Self {
            n_trees: 500,
            max_features: 3,
            min_samples_leaf: 5,
            max_depth: None,
        }
    }
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            violation_codes: DEFAULT_VIOLATION_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.split.train_fraction, 0.8);
        assert_eq!(config.forest.n_trees, 500);
        assert_eq!(config.forest.max_features, 3);
        assert_eq!(config.models.kinds.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_toml_uses_section_defaults() {
        let content = r#"
            [source]
            name = "fixture"
            url = "https://example.com/inspections.csv"
        "#;

        let config: PipelineConfig = toml::from_str(content).unwrap();
        assert_eq!(config.source.name, "fixture");
        assert_eq!(config.timeout_seconds(), 60);
        assert_eq!(config.split.seed, 853);
        assert_eq!(config.forest.min_samples_leaf, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let mut config = PipelineConfig::default();
        config.split.train_fraction = 1.0;
        assert!(config.validate().is_err());

        config.split.train_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_violation_domain_includes_absent_marker() {
        let schema = SchemaSection {
            violation_codes: vec!["2.2.1.1".to_string(), " 2.2.1.1 ".to_string()],
        };
        assert_eq!(schema.violation_domain(), vec!["2.2.1.1".to_string(), "none".to_string()]);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            env::set_var("TEST_FIRE_SOURCE_URL", "https://mirror.example.com/data.csv");
            env::set_var("TEST_FIRE_OUTPUT_DIR", "/tmp/fire-run");
        }

        let mut config = PipelineConfig::default();
        config.env_source_url = Some("TEST_FIRE_SOURCE_URL".to_string());
        config.env_output_dir = Some("TEST_FIRE_OUTPUT_DIR".to_string());
        config.apply_env_overrides();

        assert_eq!(config.source.url, "https://mirror.example.com/data.csv");
        assert_eq!(config.output.directory, PathBuf::from("/tmp/fire-run"));
        assert_eq!(
            config.output.analysis_table,
            PathBuf::from("/tmp/fire-run/data/analysis_data.parquet")
        );

        // Clean up
        unsafe {
            env::remove_var("TEST_FIRE_SOURCE_URL");
            env::remove_var("TEST_FIRE_OUTPUT_DIR");
        }
    }
}
