//! Settings loading for the daemon.
//!
//! The remote endpoint serves the two-group JSON document; any failure to
//! reach or parse it leaves the built-in defaults in place and is never
//! fatal. Each load builds a complete snapshot, so callers re-invoking
//! `load` on a schedule get refresh-by-replacement with no partially
//! updated state.

use anyhow::{Context, Result};
use linecheck_common::{RemoteDocument, Settings};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// A config endpoint that takes longer than this is treated as
/// unavailable.
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// CLI-level overrides applied after the remote document.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub watched_files: Vec<PathBuf>,
}

/// Builds the settings snapshot for one run.
pub async fn load(config_url: Option<&str>, overrides: &Overrides) -> Settings {
    let mut settings = Settings::default();

    if let Some(url) = config_url {
        match fetch_remote(url).await {
            Ok(doc) => {
                settings = settings.with_remote(doc);
                info!("configuration loaded from {}", url);
            }
            Err(e) => {
                warn!(
                    "remote configuration unavailable ({:#}); using built-in defaults",
                    e
                );
            }
        }
    }

    if let Some(data_dir) = &overrides.data_dir {
        settings.data_dir = data_dir.clone();
    }
    if let Some(output_dir) = &overrides.output_dir {
        settings.minio.local_file_path = output_dir.clone();
    }
    if !overrides.watched_files.is_empty() {
        settings.watched_files = overrides.watched_files.clone();
    }

    settings
}

async fn fetch_remote(url: &str) -> Result<RemoteDocument> {
    let http = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("building HTTP client")?;
    let response = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()
        .context("config endpoint returned an error status")?;
    response
        .json::<RemoteDocument>()
        .await
        .context("parsing configuration document")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back_to_defaults() {
        // Reserved TEST-NET address; nothing listens there.
        let settings = load(Some("http://192.0.2.1:1/config"), &Overrides::default()).await;
        assert_eq!(settings.plc.host, Settings::default().plc.host);
        assert_eq!(settings.minio.endpoint, Settings::default().minio.endpoint);
    }

    #[tokio::test]
    async fn test_no_url_is_defaults_plus_overrides() {
        let overrides = Overrides {
            data_dir: Some(PathBuf::from("/data/line7")),
            output_dir: Some(PathBuf::from("/tmp/reports")),
            watched_files: vec![PathBuf::from("/deploy/model.onnx")],
        };
        let settings = load(None, &overrides).await;
        assert_eq!(settings.data_dir, PathBuf::from("/data/line7"));
        assert_eq!(settings.minio.local_file_path, PathBuf::from("/tmp/reports"));
        assert_eq!(settings.watched_files, vec![PathBuf::from("/deploy/model.onnx")]);
        // Remote-controlled groups stay at defaults.
        assert_eq!(settings.plc.port, 102);
    }
}
