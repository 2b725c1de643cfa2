//! Configuration snapshot for a diagnostic run.
//!
//! The orchestrator loads one immutable [`Settings`] value at startup and
//! passes it to every subsystem call. Refresh means building a *new*
//! snapshot from the remote document and swapping it wholesale; no partial
//! field updates are ever observable by a running diagnosis.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Object-storage connection parameters for report archival.
#[derive(Debug, Clone)]
pub struct MinioSettings {
    /// Endpoint including scheme and port, e.g. `http://127.0.0.1:9000`.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    /// Object key prefix the report filename is appended to.
    pub object_path: String,
    /// Local directory the report file is written into before upload.
    pub local_file_path: PathBuf,
}

impl Default for MinioSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket_name: "uploadtest".to_string(),
            object_path: "checkReport/".to_string(),
            local_file_path: PathBuf::from("."),
        }
    }
}

/// Addressing parameters for the belt-drive PLC.
///
/// Reads target a data block and a byte offset within it; each monitored
/// register is a 4-byte REAL in the controller's native big-endian layout.
#[derive(Debug, Clone)]
pub struct PlcSettings {
    pub host: String,
    pub port: u16,
    pub rack: u16,
    pub slot: u16,
    pub db_number: u16,
    pub speed_feedback_offset: u32,
    pub frequency_feedback_offset: u32,
    pub frequency_setpoint_offset: u32,
    /// Applies to the TCP connect and to every request/response exchange.
    pub io_timeout: Duration,
}

impl Default for PlcSettings {
    fn default() -> Self {
        Self {
            host: "192.168.10.22".to_string(),
            port: 102,
            rack: 0,
            slot: 1,
            db_number: 4,
            speed_feedback_offset: 28,
            frequency_feedback_offset: 20,
            frequency_setpoint_offset: 44,
            io_timeout: Duration::from_secs(10),
        }
    }
}

/// Invocation of the external blank-image comparison tool.
#[derive(Debug, Clone)]
pub struct AnomalySettings {
    pub interpreter: String,
    pub script: PathBuf,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            script: PathBuf::from("./blank_check.py"),
        }
    }
}

/// Immutable configuration snapshot for one diagnostic run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub minio: MinioSettings,
    pub plc: PlcSettings,
    pub anomaly: AnomalySettings,
    /// Root directory scanned for `blank/High` reference images.
    pub data_dir: PathBuf,
    /// Deployed program/model files whose staleness the report tracks.
    /// Not remotely configurable; overridable from the CLI.
    pub watched_files: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            minio: MinioSettings::default(),
            plc: PlcSettings::default(),
            anomaly: AnomalySettings::default(),
            data_dir: PathBuf::from("."),
            watched_files: vec![
                PathBuf::from("./blank_check.py"),
                PathBuf::from("./sorting_model.onnx"),
            ],
        }
    }
}

impl Settings {
    /// Applies a remote document on top of this snapshot, returning the
    /// merged result. A present group replaces its settings group as a
    /// whole; an absent group leaves the current values in place.
    pub fn with_remote(mut self, doc: RemoteDocument) -> Self {
        if let Some(minio) = doc.minio {
            self.minio = MinioSettings {
                endpoint: minio.endpoint,
                access_key: minio.access_key,
                secret_key: minio.secret_key,
                bucket_name: minio.bucket_name,
                object_path: minio.object_path,
                local_file_path: PathBuf::from(minio.local_file_path),
            };
        }
        if let Some(plc) = doc.plc {
            let io_timeout = self.plc.io_timeout;
            self.plc = PlcSettings {
                host: plc.ip,
                port: plc.port,
                rack: plc.rack,
                slot: plc.slot,
                db_number: plc.db_number,
                speed_feedback_offset: plc.speed_feedback_offset,
                frequency_feedback_offset: plc.frequency_feedback_offset,
                frequency_setpoint_offset: plc.frequency_setpoint_offset,
                io_timeout,
            };
        }
        self
    }
}

/// Wire shape of the remote configuration document.
///
/// Two optional top-level groups, camelCase keys. The watch list and the
/// data directory are deliberately not part of the document.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDocument {
    #[serde(default)]
    pub minio: Option<RemoteMinio>,
    #[serde(default)]
    pub plc: Option<RemotePlc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMinio {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    pub object_path: String,
    pub local_file_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlc {
    pub ip: String,
    pub port: u16,
    pub rack: u16,
    pub slot: u16,
    pub db_number: u16,
    pub speed_feedback_offset: u32,
    pub frequency_feedback_offset: u32,
    pub frequency_setpoint_offset: u32,
}
