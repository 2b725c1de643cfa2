//! Diagnostic run orchestration.
//!
//! One run walks a fixed sequence: collect inputs, render the report,
//! write it, hand it to the uploader. Collection calls every source
//! behind the [`DiagnosisSources`] trait; each failure is caught at that
//! source's boundary and becomes an unavailable section, so no single
//! subsystem outage ever aborts the run. The only hard failure is being
//! unable to write the report file itself.

use crate::anomaly::{self, AnomalyStats};
use crate::plc::{self, PlcError, SampleSet};
use crate::scan::{self, ArtifactTimestamp, ScanError};
use crate::upload::MinioUploader;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use linecheck_common::{report, ReportInputs, SectionValue, Settings};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Fixed message rendered when the data tree holds fewer than two blank
/// reference images. A real comparison never ran, so this is content,
/// not an unavailable section.
pub const INSUFFICIENT_IMAGES_MSG: &str = "fewer than 2 blank reference images available";

/// Blank-noise collection result, before report normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlankNoiseOutcome {
    Stats(AnomalyStats),
    NotEnoughImages,
    Unparseable,
}

/// Every data source one diagnostic run consults.
///
/// The live implementation talks to the real line; tests inject fakes to
/// prove that one failing collaborator downgrades only its own section.
#[async_trait]
pub trait DiagnosisSources: Send + Sync {
    /// X-ray source state. Externally supplied; not wired up yet.
    async fn optical_state(&self) -> Option<String>;
    /// Detector state. Externally supplied; not wired up yet.
    async fn detector_state(&self) -> Option<String>;
    /// Air-jet ejector state. Externally supplied; not wired up yet.
    async fn ejector_state(&self) -> Option<String>;
    /// Sorting program state. Externally supplied; not wired up yet.
    async fn sorting_program_state(&self) -> Option<String>;
    /// Data collection state. Externally supplied; not wired up yet.
    async fn data_collection_state(&self) -> Option<String>;

    async fn belt_speed(&self) -> Result<SampleSet, PlcError>;
    async fn blank_noise(&self) -> Result<BlankNoiseOutcome, ScanError>;
    async fn artifact_timestamps(&self) -> Result<Vec<ArtifactTimestamp>, ScanError>;
}

/// Production sources driven by one settings snapshot.
pub struct LiveSources<'a> {
    settings: &'a Settings,
}

impl<'a> LiveSources<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DiagnosisSources for LiveSources<'_> {
    async fn optical_state(&self) -> Option<String> {
        None
    }

    async fn detector_state(&self) -> Option<String> {
        None
    }

    async fn ejector_state(&self) -> Option<String> {
        None
    }

    async fn sorting_program_state(&self) -> Option<String> {
        None
    }

    async fn data_collection_state(&self) -> Option<String> {
        None
    }

    async fn belt_speed(&self) -> Result<SampleSet, PlcError> {
        plc::sample(&self.settings.plc).await
    }

    async fn blank_noise(&self) -> Result<BlankNoiseOutcome, ScanError> {
        let (newest, second) = match scan::find_latest_pair(&self.settings.data_dir) {
            Ok(pair) => pair,
            Err(ScanError::NotEnoughImages(_)) => return Ok(BlankNoiseOutcome::NotEnoughImages),
            Err(e) => return Err(e),
        };
        match anomaly::compare(&self.settings.anomaly, &newest.path, &second.path).await {
            Some(stats) => Ok(BlankNoiseOutcome::Stats(stats)),
            None => Ok(BlankNoiseOutcome::Unparseable),
        }
    }

    async fn artifact_timestamps(&self) -> Result<Vec<ArtifactTimestamp>, ScanError> {
        scan::artifact_timestamps(&self.settings.watched_files)
    }
}

/// Collects all eight sections, downgrading each failure in place.
pub async fn collect_inputs<S: DiagnosisSources + ?Sized>(sources: &S) -> ReportInputs {
    let mut inputs = ReportInputs::empty();

    inputs.optical = SectionValue::from(sources.optical_state().await);
    inputs.detector = SectionValue::from(sources.detector_state().await);
    inputs.ejector = SectionValue::from(sources.ejector_state().await);
    inputs.sorting_program = SectionValue::from(sources.sorting_program_state().await);
    inputs.data_collection = SectionValue::from(sources.data_collection_state().await);

    inputs.belt_speed = match sources.belt_speed().await {
        Ok(set) => SectionValue::Present(set.render()),
        Err(e) => {
            warn!("belt speed sampling failed: {}", e);
            SectionValue::Unavailable
        }
    };

    inputs.blank_noise = match sources.blank_noise().await {
        Ok(BlankNoiseOutcome::Stats(stats)) => SectionValue::Present(stats.render()),
        Ok(BlankNoiseOutcome::NotEnoughImages) => {
            SectionValue::Present(INSUFFICIENT_IMAGES_MSG.to_string())
        }
        Ok(BlankNoiseOutcome::Unparseable) => SectionValue::Unavailable,
        Err(e) => {
            warn!("blank image scan failed: {}", e);
            SectionValue::Unavailable
        }
    };

    inputs.artifact_freshness = match sources.artifact_timestamps().await {
        Ok(stamps) => SectionValue::from_text(render_freshness(&stamps)),
        Err(e) => {
            warn!("artifact timestamp lookup failed: {}", e);
            SectionValue::Unavailable
        }
    };

    inputs
}

fn render_freshness(stamps: &[ArtifactTimestamp]) -> String {
    stamps
        .iter()
        .map(|stamp| format!("\t{}", stamp.render()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// What one run produced.
#[derive(Debug)]
pub struct DiagnosisOutcome {
    pub report_name: String,
    pub report_path: PathBuf,
    pub upload: UploadStatus,
}

#[derive(Debug)]
pub enum UploadStatus {
    Uploaded { object: String },
    Failed { error: String },
    Skipped,
}

/// Runs one full diagnosis against the live line.
pub async fn run(settings: &Settings, upload_enabled: bool) -> Result<DiagnosisOutcome> {
    let sources = LiveSources::new(settings);
    run_with_sources(settings, &sources, upload_enabled).await
}

/// Runs one full diagnosis with injected sources.
pub async fn run_with_sources<S: DiagnosisSources + ?Sized>(
    settings: &Settings,
    sources: &S,
    upload_enabled: bool,
) -> Result<DiagnosisOutcome> {
    info!("collecting diagnostic inputs");
    let inputs = collect_inputs(sources).await;

    let generated_at = Local::now();
    let report_name = report::file_name(&generated_at);
    let body = report::render(&inputs);
    let report_path = settings.minio.local_file_path.join(&report_name);
    fs::write(&report_path, &body)
        .with_context(|| format!("failed to write report {}", report_path.display()))?;
    info!("report written: {}", report_path.display());

    let upload = if upload_enabled {
        let object = format!("{}{}", settings.minio.object_path, report_name);
        let uploader = MinioUploader::new(&settings.minio);
        match uploader
            .upload_file(&settings.minio.bucket_name, &object, &report_path)
            .await
        {
            Ok(()) => {
                info!("report uploaded as {}", object);
                UploadStatus::Uploaded { object }
            }
            Err(e) => {
                // Surfaced, not retried; the report on disk stays valid.
                warn!("report upload failed: {}", e);
                UploadStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    } else {
        UploadStatus::Skipped
    };

    Ok(DiagnosisOutcome {
        report_name,
        report_path,
        upload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plc::SampleSeries;

    /// Fake sources with per-collaborator failure switches.
    struct FakeSources {
        belt_speed_fails: bool,
        blank_noise: Result<BlankNoiseOutcome, ()>,
        artifacts_fail: bool,
    }

    impl Default for FakeSources {
        fn default() -> Self {
            Self {
                belt_speed_fails: false,
                blank_noise: Ok(BlankNoiseOutcome::Stats(AnomalyStats {
                    mean_std: "0.43".to_string(),
                    max_std: "12.0".to_string(),
                    min_std: "0.0".to_string(),
                })),
                artifacts_fail: false,
            }
        }
    }

    #[async_trait]
    impl DiagnosisSources for FakeSources {
        async fn optical_state(&self) -> Option<String> {
            Some("emitter warm".to_string())
        }

        async fn detector_state(&self) -> Option<String> {
            Some("online".to_string())
        }

        async fn ejector_state(&self) -> Option<String> {
            None
        }

        async fn sorting_program_state(&self) -> Option<String> {
            Some("running".to_string())
        }

        async fn data_collection_state(&self) -> Option<String> {
            Some("idle".to_string())
        }

        async fn belt_speed(&self) -> Result<SampleSet, PlcError> {
            if self.belt_speed_fails {
                return Err(PlcError::Connect("unreachable".to_string()));
            }
            Ok(SampleSet {
                speed_feedback: SampleSeries::new(vec![1.5; 5]),
                frequency_feedback: SampleSeries::new(vec![2.5; 5]),
                frequency_setpoint: SampleSeries::new(vec![3.5; 5]),
            })
        }

        async fn blank_noise(&self) -> Result<BlankNoiseOutcome, ScanError> {
            self.blank_noise.clone().map_err(|_| {
                ScanError::Io(std::io::Error::new(std::io::ErrorKind::Other, "walk failed"))
            })
        }

        async fn artifact_timestamps(&self) -> Result<Vec<ArtifactTimestamp>, ScanError> {
            if self.artifacts_fail {
                return Err(ScanError::NotFound(PathBuf::from("/gone")));
            }
            Ok(vec![ArtifactTimestamp {
                path: PathBuf::from("/deploy/model.onnx"),
                modified: std::time::SystemTime::UNIX_EPOCH,
            }])
        }
    }

    #[tokio::test]
    async fn test_all_sources_healthy() {
        let inputs = collect_inputs(&FakeSources::default()).await;
        assert!(inputs.optical.is_available());
        assert!(inputs.detector.is_available());
        // The ejector feed is a stub and stays unavailable.
        assert!(!inputs.ejector.is_available());
        assert!(inputs.belt_speed.is_available());
        assert_eq!(
            inputs.blank_noise,
            SectionValue::Present("mean_std: 0.43, max_std: 12.0, min_std: 0.0".to_string())
        );
        assert!(inputs.artifact_freshness.is_available());
    }

    #[tokio::test]
    async fn test_plc_failure_downgrades_only_belt_speed() {
        let sources = FakeSources {
            belt_speed_fails: true,
            ..FakeSources::default()
        };
        let inputs = collect_inputs(&sources).await;
        assert_eq!(inputs.belt_speed, SectionValue::Unavailable);
        // Every other live section still carries real data.
        assert!(inputs.optical.is_available());
        assert!(inputs.blank_noise.is_available());
        assert!(inputs.artifact_freshness.is_available());
    }

    #[tokio::test]
    async fn test_not_enough_images_renders_fixed_message() {
        let sources = FakeSources {
            blank_noise: Ok(BlankNoiseOutcome::NotEnoughImages),
            ..FakeSources::default()
        };
        let inputs = collect_inputs(&sources).await;
        assert_eq!(
            inputs.blank_noise,
            SectionValue::Present(INSUFFICIENT_IMAGES_MSG.to_string())
        );
    }

    #[tokio::test]
    async fn test_unparseable_comparison_is_unavailable() {
        let sources = FakeSources {
            blank_noise: Ok(BlankNoiseOutcome::Unparseable),
            ..FakeSources::default()
        };
        let inputs = collect_inputs(&sources).await;
        assert_eq!(inputs.blank_noise, SectionValue::Unavailable);
    }

    #[tokio::test]
    async fn test_failed_image_scan_is_unavailable() {
        let sources = FakeSources {
            blank_noise: Err(()),
            ..FakeSources::default()
        };
        let inputs = collect_inputs(&sources).await;
        assert_eq!(inputs.blank_noise, SectionValue::Unavailable);
        assert!(inputs.belt_speed.is_available());
    }

    #[tokio::test]
    async fn test_missing_artifact_downgrades_freshness_section() {
        let sources = FakeSources {
            artifacts_fail: true,
            ..FakeSources::default()
        };
        let inputs = collect_inputs(&sources).await;
        assert_eq!(inputs.artifact_freshness, SectionValue::Unavailable);
        assert!(inputs.belt_speed.is_available());
    }

    #[tokio::test]
    async fn test_freshness_body_is_tab_indented_lines() {
        let inputs = collect_inputs(&FakeSources::default()).await;
        match &inputs.artifact_freshness {
            SectionValue::Present(body) => {
                assert!(body.starts_with("\t/deploy/model.onnx : "));
            }
            SectionValue::Unavailable => panic!("freshness should be present"),
        }
    }
}
