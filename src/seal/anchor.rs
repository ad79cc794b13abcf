//! Cloud Anchor
//!
//! Remote copy of a sealed report plus a metadata record, acting as an
//! independent timestamp witness. Runs after the local export and never
//! blocks it: failures end up in the message's sealing metadata.

use crate::case::CloudAnchorStatus;
use crate::error::AnchorError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";
const STORAGE_URL: &str = "https://firebasestorage.googleapis.com";
const FIRESTORE_URL: &str = "https://firestore.googleapis.com";

const STORAGE_PREFIX: &str = "sealed_reports";
const COLLECTION: &str = "sealedReports";

/// A sealed document ready to be anchored
#[derive(Debug, Clone)]
pub struct AnchorUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// SHA-512 of `bytes`
    pub hash: String,
    pub original_prompt: String,
    pub file_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorReceipt {
    pub storage_path: String,
    pub record_id: String,
}

#[async_trait]
pub trait CloudAnchor: Send + Sync {
    async fn anchor(&self, upload: &AnchorUpload) -> Result<AnchorReceipt, AnchorError>;
}

/// Anchor `upload` and describe the outcome for the message's sealing metadata
pub async fn anchor_status(anchor: &dyn CloudAnchor, upload: &AnchorUpload) -> CloudAnchorStatus {
    match anchor.anchor(upload).await {
        Ok(receipt) => {
            tracing::info!(path = %receipt.storage_path, record = %receipt.record_id, "Report anchored");
            CloudAnchorStatus::confirmed(receipt.storage_path, receipt.record_id)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cloud anchoring failed");
            CloudAnchorStatus::failed(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub identity_url: String,
    pub storage_url: String,
    pub firestore_url: String,
}

impl FirebaseConfig {
    pub fn new(api_key: String, project_id: String, storage_bucket: String) -> Self {
        Self {
            api_key,
            project_id,
            storage_bucket,
            identity_url: IDENTITY_URL.to_string(),
            storage_url: STORAGE_URL.to_string(),
            firestore_url: FIRESTORE_URL.to_string(),
        }
    }

    fn missing_field(&self) -> Option<&'static str> {
        if self.api_key.trim().is_empty() {
            Some("api key")
        } else if self.project_id.trim().is_empty() {
            Some("project id")
        } else if self.storage_bucket.trim().is_empty() {
            Some("storage bucket")
        } else {
            None
        }
    }
}

/// Anonymous Firebase user, Cloud Storage upload, Firestore record
pub struct FirebaseAnchor {
    client: Client,
    config: FirebaseConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    name: String,
}

impl FirebaseAnchor {
    pub fn new(client: Client, config: FirebaseConfig) -> Self {
        Self { client, config }
    }

    async fn sign_in(&self) -> Result<SignUpResponse, AnchorError> {
        let url = format!(
            "{}/v1/accounts:signUp?key={}",
            self.config.identity_url, self.config.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|e| AnchorError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Auth(format!("{}: {}", status, body)));
        }
        response
            .json::<SignUpResponse>()
            .await
            .map_err(|e| AnchorError::Auth(format!("unexpected response: {}", e)))
    }

    async fn upload(&self, token: &str, path: &str, bytes: &[u8]) -> Result<(), AnchorError> {
        let url = upload_url(&self.config.storage_url, &self.config.storage_bucket, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Content-Type", "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| AnchorError::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Upload(format!("{}: {}", status, body)));
        }
        Ok(())
    }

    async fn record(&self, token: &str, fields: Value) -> Result<String, AnchorError> {
        let url = format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.config.firestore_url, self.config.project_id, COLLECTION
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .map_err(|e| AnchorError::Record(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnchorError::Record(format!("{}: {}", status, body)));
        }
        let document = response
            .json::<DocumentResponse>()
            .await
            .map_err(|e| AnchorError::Record(format!("unexpected response: {}", e)))?;
        Ok(record_id(&document.name))
    }
}

#[async_trait]
impl CloudAnchor for FirebaseAnchor {
    async fn anchor(&self, upload: &AnchorUpload) -> Result<AnchorReceipt, AnchorError> {
        if let Some(field) = self.config.missing_field() {
            return Err(AnchorError::NotConfigured(format!("missing {}", field)));
        }

        let user = self.sign_in().await?;
        let path = storage_path(&user.local_id, &upload.file_name);

        tracing::debug!(path = %path, bytes = upload.bytes.len(), "Uploading sealed report");
        self.upload(&user.id_token, &path, &upload.bytes).await?;

        let record_id = self
            .record(&user.id_token, record_fields(&user.local_id, &path, upload))
            .await?;

        Ok(AnchorReceipt {
            storage_path: path,
            record_id,
        })
    }
}

pub fn storage_path(user_id: &str, file_name: &str) -> String {
    format!("{}/{}/{}", STORAGE_PREFIX, user_id, file_name)
}

fn upload_url(base: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/v0/b/{}/o?uploadType=media&name={}",
        base,
        bucket,
        utf8_percent_encode(path, NON_ALPHANUMERIC)
    )
}

/// Firestore typed-value document for the sealed report record
fn record_fields(user_id: &str, path: &str, upload: &AnchorUpload) -> Value {
    json!({
        "userId": { "stringValue": user_id },
        "fileName": { "stringValue": upload.file_name },
        "hash": { "stringValue": upload.hash },
        "path": { "stringValue": path },
        "createdAt": {
            "timestampValue": upload.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        },
        "originalPrompt": { "stringValue": upload.original_prompt },
        "fileCount": { "integerValue": upload.file_count.to_string() },
    })
}

/// Last segment of a Firestore document resource name
fn record_id(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn upload() -> AnchorUpload {
        AnchorUpload {
            file_name: "Verum_Omnis_Report_1.pdf".to_string(),
            bytes: b"%PDF-1.5".to_vec(),
            hash: "abc".to_string(),
            original_prompt: "Find contradictions".to_string(),
            file_count: 2,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    struct Failing;

    #[async_trait]
    impl CloudAnchor for Failing {
        async fn anchor(&self, _: &AnchorUpload) -> Result<AnchorReceipt, AnchorError> {
            Err(AnchorError::Upload("403 Forbidden".to_string()))
        }
    }

    #[test]
    fn test_storage_path() {
        assert_eq!(
            storage_path("uid123", "report.pdf"),
            "sealed_reports/uid123/report.pdf"
        );
    }

    #[test]
    fn test_upload_url_encodes_path() {
        let url = upload_url(STORAGE_URL, "bucket", "sealed_reports/u/r.pdf");
        assert!(url.ends_with("name=sealed%5Freports%2Fu%2Fr%2Epdf"));
    }

    #[test]
    fn test_record_fields() {
        let fields = record_fields("uid", "sealed_reports/uid/x.pdf", &upload());
        assert_eq!(fields["userId"]["stringValue"], "uid");
        assert_eq!(fields["fileCount"]["integerValue"], "2");
        assert_eq!(
            fields["createdAt"]["timestampValue"],
            "2024-05-01T12:00:00.000Z"
        );
        assert_eq!(fields["originalPrompt"]["stringValue"], "Find contradictions");
    }

    #[test]
    fn test_record_id() {
        assert_eq!(
            record_id("projects/p/databases/(default)/documents/sealedReports/AbC123"),
            "AbC123"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_anchor_fails_fast() {
        let anchor = FirebaseAnchor::new(
            Client::new(),
            FirebaseConfig::new(String::new(), "p".to_string(), "b".to_string()),
        );
        let err = anchor.anchor(&upload()).await.unwrap_err();
        assert!(matches!(err, AnchorError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_raised() {
        let status = anchor_status(&Failing, &upload()).await;
        assert_eq!(status.status, crate::case::AnchorState::Failed);
        assert!(status.error.unwrap().contains("403"));
    }
}
