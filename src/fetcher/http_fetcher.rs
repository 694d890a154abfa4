use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use reqwest::Client;

use crate::config::PipelineConfig;
use crate::models::{PipelineError, Result};

/// CKAN action that describes a dataset and its downloadable resources.
const CATALOG_ACTION: &str = "/api/3/action/package_show";

/// Where the raw inspection CSV comes from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch_csv(&self) -> Result<Vec<u8>>;
}

/// The one fixed HTTP download of the published dataset. The URL is either
/// the CSV itself or the portal's `package_show` endpoint, in which case the
/// dataset's CSV resource is looked up first.
pub struct HttpCsvSource {
    client: Client,
    url: String,
}

impl HttpCsvSource {
    pub fn new(url: &str, timeout_seconds: u64) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(PipelineError::SourceFetch("source URL is empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!("fire-inspection-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| PipelineError::SourceFetch(format!("cannot build HTTP client: {}", e)))?;

        Ok(HttpCsvSource {
            client,
            url: url.trim().to_string(),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Self::new(&config.source.url, config.timeout_seconds())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Request to {} failed: {}", url, e);
            PipelineError::SourceFetch(format!("request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceFetch(format!("HTTP error: {}", response.status())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("cannot read response body: {}", e)))?;

        if body.is_empty() {
            return Err(PipelineError::SourceFetch(format!("{} returned an empty body", url)));
        }
        Ok(body.to_vec())
    }

    async fn resolve_csv_url(&self) -> Result<String> {
        if !is_catalog_url(&self.url) {
            return Ok(self.url.clone());
        }

        info!("Looking up the CSV resource through {}", self.url);
        let body = self.download(&self.url).await?;
        let package: Value = serde_json::from_slice(&body)
            .map_err(|e| PipelineError::SourceFetch(format!("catalog response is not JSON: {}", e)))?;
        csv_resource_url(&package)
    }
}

pub fn is_catalog_url(url: &str) -> bool {
    url.contains(CATALOG_ACTION)
}

/// Picks the CSV resource out of a `package_show` response, preferring one
/// loaded into the portal's datastore.
pub fn csv_resource_url(package: &Value) -> Result<String> {
    if package.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(PipelineError::SourceFetch(format!(
            "catalog lookup failed: {}",
            package.get("error").unwrap_or(&Value::Null)
        )));
    }

    let resources = package
        .get("result")
        .and_then(|r| r.get("resources"))
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::SourceFetch("catalog response lists no resources".to_string()))?;

    let csv: Vec<&Value> = resources
        .iter()
        .filter(|r| {
            r.get("format")
                .and_then(Value::as_str)
                .is_some_and(|f| f.trim().eq_ignore_ascii_case("csv"))
        })
        .collect();

    csv.iter()
        .find(|r| r.get("datastore_active").and_then(Value::as_bool) == Some(true))
        .or_else(|| csv.first())
        .and_then(|r| r.get("url"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::SourceFetch("dataset has no CSV resource".to_string()))
}

fn looks_like_html(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(256)]).trim_start().to_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

#[async_trait]
impl RecordSource for HttpCsvSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch_csv(&self) -> Result<Vec<u8>> {
        let csv_url = self.resolve_csv_url().await?;
        info!("Downloading inspections from {}", csv_url);

        let body = self.download(&csv_url).await?;
        if looks_like_html(&body) {
            return Err(PipelineError::SourceFetch(format!(
                "{} returned an HTML page, not CSV",
                csv_url
            )));
        }

        info!("Downloaded {} bytes", body.len());
        Ok(body)
    }
}

/// A CSV already on disk, for offline runs and tests.
pub struct FileCsvSource {
    path: PathBuf,
}

impl FileCsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCsvSource { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for FileCsvSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_csv(&self) -> Result<Vec<u8>> {
        info!("Reading inspections from {}", self.path.display());

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("cannot read {}: {}", self.path.display(), e)))?;

        if bytes.is_empty() {
            return Err(PipelineError::SourceFetch(format!("{} is empty", self.path.display())));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_source_reads_bytes() {
        let path = std::env::temp_dir().join(format!("inspections-{}.csv", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"_id,PROPERTY_WARD\n1,3\n").await.unwrap();

        let source = FileCsvSource::new(&path);
        let bytes = source.fetch_csv().await.unwrap();
        assert_eq!(bytes, b"_id,PROPERTY_WARD\n1,3\n".to_vec());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_missing_file_is_a_fetch_error() {
        let source: Box<dyn RecordSource> = Box::new(FileCsvSource::new("/nonexistent/inspections.csv"));
        assert!(matches!(source.fetch_csv().await, Err(PipelineError::SourceFetch(_))));
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(matches!(HttpCsvSource::new("  ", 5), Err(PipelineError::SourceFetch(_))));
    }

    #[test]
    fn test_http_source_from_config() {
        let config = PipelineConfig::default();
        let source = HttpCsvSource::from_config(&config).unwrap();
        assert_eq!(source.describe(), config.source.url);
    }

    #[test]
    fn test_default_source_is_the_catalog_endpoint() {
        let config = PipelineConfig::default();
        assert!(is_catalog_url(&config.source.url));
        assert!(!is_catalog_url("https://example.com/inspections.csv"));
    }

    #[test]
    fn test_csv_resource_prefers_datastore_copy() {
        let package = serde_json::json!({
            "success": true,
            "result": {
                "resources": [
                    { "format": "XLSX", "url": "https://portal/inspections.xlsx", "datastore_active": false },
                    { "format": "csv", "url": "https://portal/inspections-archive.csv", "datastore_active": false },
                    { "format": "CSV", "url": "https://portal/datastore/dump/inspections.csv", "datastore_active": true }
                ]
            }
        });

        assert_eq!(
            csv_resource_url(&package).unwrap(),
            "https://portal/datastore/dump/inspections.csv"
        );
    }

    #[test]
    fn test_csv_resource_falls_back_to_first_csv() {
        let package = serde_json::json!({
            "success": true,
            "result": { "resources": [
                { "format": "JSON", "url": "https://portal/inspections.json" },
                { "format": "CSV", "url": "https://portal/inspections.csv" }
            ] }
        });
        assert_eq!(csv_resource_url(&package).unwrap(), "https://portal/inspections.csv");
    }

    #[test]
    fn test_catalog_without_csv_is_a_fetch_error() {
        let no_csv = serde_json::json!({
            "success": true,
            "result": { "resources": [{ "format": "JSON", "url": "https://portal/inspections.json" }] }
        });
        let failed = serde_json::json!({ "success": false, "error": { "message": "Not found" } });

        assert!(matches!(csv_resource_url(&no_csv), Err(PipelineError::SourceFetch(_))));
        assert!(matches!(csv_resource_url(&failed), Err(PipelineError::SourceFetch(_))));
    }

    #[test]
    fn test_html_body_is_detected() {
        assert!(looks_like_html(b"  <!DOCTYPE html><html><body>dataset</body></html>"));
        assert!(!looks_like_html(b"_id,PROPERTY_ADDRESS\n1,100 Queen St W\n"));
    }
}
