//! Blank-image anomaly delegation.
//!
//! The numeric comparison lives in an external tool; this module only
//! spawns it and scrapes its textual output. The output contract is
//! positional and has no schema: the combined stdout must contain the
//! literal `success` marker, and the first three numeric tokens are, in
//! order, the mean, max and min standard deviation. Today's tool prints
//! `check blank success:[mean,max,min]`. Any change to that output format
//! breaks this parser; it is the one deliberate point of coupling with
//! the tool.

use linecheck_common::AnomalySettings;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Marker the tool prints on a successful comparison.
pub const SUCCESS_MARKER: &str = "success";

/// Integer or decimal tokens. Tokens led by a bare decimal point are
/// discarded after matching rather than re-matched, mirroring the tool
/// contract.
static NUMERIC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").expect("static regex"));

/// Parsed comparison statistics.
///
/// Tokens are kept verbatim so the report reproduces the tool's own
/// rounding instead of re-formatting the numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnomalyStats {
    pub mean_std: String,
    pub max_std: String,
    pub min_std: String,
}

impl AnomalyStats {
    /// Report body for the blank-noise section.
    pub fn render(&self) -> String {
        format!(
            "mean_std: {}, max_std: {}, min_std: {}",
            self.mean_std, self.max_std, self.min_std
        )
    }
}

/// Runs the external comparison on the two freshest blank images.
///
/// Every failure path (spawn error, missing marker, too few tokens) is
/// the same `None` outcome: the section renders as unavailable and the
/// run continues.
pub async fn compare(
    anomaly: &AnomalySettings,
    newest: &Path,
    second: &Path,
) -> Option<AnomalyStats> {
    let output = match Command::new(&anomaly.interpreter)
        .arg(&anomaly.script)
        .arg(newest)
        .arg(second)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!(
                "failed to spawn {} {}: {}",
                anomaly.interpreter,
                anomaly.script.display(),
                e
            );
            return None;
        }
    };

    // output() drains stdout and stderr concurrently to EOF, so a chatty
    // tool cannot deadlock on a full stderr pipe. stderr never affects
    // the outcome.
    if !output.stderr.is_empty() {
        debug!(
            "comparison tool stderr: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stats = parse_output(&stdout);
    if stats.is_none() {
        warn!("comparison tool produced no parseable result");
    }
    stats
}

/// Extracts the positional statistics from the tool's combined output.
pub fn parse_output(output: &str) -> Option<AnomalyStats> {
    if !output.contains(SUCCESS_MARKER) {
        return None;
    }
    let mut tokens = NUMERIC_TOKEN
        .find_iter(output)
        .map(|m| m.as_str())
        .filter(|token| !token.starts_with('.'));
    let mean_std = tokens.next()?.to_string();
    let max_std = tokens.next()?.to_string();
    let min_std = tokens.next()?.to_string();
    Some(AnomalyStats {
        mean_std,
        max_std,
        min_std,
    })
}
