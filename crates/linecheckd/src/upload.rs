//! Report archival to S3-compatible object storage.
//!
//! A thin wrapper around one signed HTTP PUT. Signing is AWS Signature
//! V4 over the three headers MinIO requires (host, x-amz-date,
//! x-amz-content-sha256). Upload failure is reported, never retried,
//! and never affects the already-written report.

use chrono::Utc;
use hmac::{Hmac, Mac};
use linecheck_common::MinioSettings;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// MinIO deployments default to this region.
const REGION: &str = "us-east-1";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("local file error: {0}")]
    LocalFile(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server rejected upload: HTTP {0}")]
    Rejected(u16),
}

/// Upload client bound to one endpoint and credential pair.
pub struct MinioUploader {
    http: reqwest::Client,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl MinioUploader {
    pub fn new(minio: &MinioSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: minio.endpoint.trim_end_matches('/').to_string(),
            access_key: minio.access_key.clone(),
            secret_key: minio.secret_key.clone(),
        }
    }

    /// PUTs a local file to `bucket` under the `object` key.
    pub async fn upload_file(
        &self,
        bucket: &str,
        object: &str,
        local: &Path,
    ) -> Result<(), UploadError> {
        if bucket.trim().is_empty() {
            return Err(UploadError::InvalidArgument("empty bucket name".to_string()));
        }
        if object.trim().is_empty() {
            return Err(UploadError::InvalidArgument("empty object key".to_string()));
        }
        let body = fs::read(local)
            .map_err(|e| UploadError::LocalFile(format!("{}: {}", local.display(), e)))?;

        let url = format!("{}/{}/{}", self.endpoint, bucket, object);
        let host = host_header(&self.endpoint)
            .ok_or_else(|| UploadError::InvalidArgument(format!("bad endpoint {}", self.endpoint)))?;

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(&body));

        // Report names and the configured prefix are plain ASCII path
        // segments, so the canonical URI needs no extra encoding.
        let canonical_uri = format!("/{}/{}", bucket, object);
        let canonical = canonical_request(&canonical_uri, &host, &payload_hash, &amz_date);
        let scope = format!("{}/{}/s3/aws4_request", date, REGION);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let signature = hex::encode(hmac_sha256(
            &signing_key(&self.secret_key, &date),
            string_to_sign.as_bytes(),
        ));
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key, scope, SIGNED_HEADERS, signature
        );

        let content_type = content_type_for(local);
        debug!("uploading {} to {}", local.display(), url);
        let response = self
            .http
            .put(&url)
            .header("Host", host.as_str())
            .header("x-amz-date", amz_date.as_str())
            .header("x-amz-content-sha256", payload_hash.as_str())
            .header("Authorization", authorization)
            .header("Content-Type", content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

fn canonical_request(uri: &str, host: &str, payload_hash: &str, amz_date: &str) -> String {
    format!(
        "PUT\n{}\n\nhost:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n\n{}\n{}",
        uri, host, payload_hash, amz_date, SIGNED_HEADERS, payload_hash
    )
}

/// SigV4 key derivation chain for one signing date.
fn signing_key(secret_key: &str, date: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, REGION.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Host header value (with port when the endpoint carries one).
fn host_header(endpoint: &str) -> Option<String> {
    let url = reqwest::Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("txt") => "text/plain",
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        Some(ext) if ext.eq_ignore_ascii_case("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_bucket_rejected_before_network() {
        let uploader = MinioUploader::new(&MinioSettings::default());
        let err = uploader
            .upload_file("", "key", Path::new("/nonexistent"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_missing_local_file_rejected_before_network() {
        let uploader = MinioUploader::new(&MinioSettings::default());
        let err = uploader
            .upload_file("bucket", "key", Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::LocalFile(_)));
    }

    #[test]
    fn test_canonical_request_layout() {
        let canonical = canonical_request("/bucket/checkReport/x.txt", "storage.local:9000", "abc", "20260805T120000Z");
        assert_eq!(
            canonical,
            "PUT\n/bucket/checkReport/x.txt\n\n\
             host:storage.local:9000\n\
             x-amz-content-sha256:abc\n\
             x-amz-date:20260805T120000Z\n\n\
             host;x-amz-content-sha256;x-amz-date\n\
             abc"
        );
    }

    #[test]
    fn test_host_header_keeps_explicit_port() {
        assert_eq!(
            host_header("http://storage.local:9000").as_deref(),
            Some("storage.local:9000")
        );
        assert_eq!(host_header("https://storage.local").as_deref(), Some("storage.local"));
        assert_eq!(host_header("not a url"), None);
    }

    #[test]
    fn test_signing_key_is_deterministic() {
        let a = signing_key("secret", "20260805");
        let b = signing_key("secret", "20260805");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, signing_key("secret", "20260806"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("checkReport_x.txt")), "text/plain");
        assert_eq!(content_type_for(Path::new("blank.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
