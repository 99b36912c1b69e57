//! PKI secrets engine: issue and revoke leaf certificates

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::VaultClient;
use super::error::VaultError;

/// Parameters for `pki/issue/:role`
#[derive(Debug, Clone, Serialize)]
pub struct IssueRequest {
    pub common_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    pub private_key_format: String,
}

impl IssueRequest {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            user_ids: None,
            ttl: None,
            private_key_format: "pem".to_string(),
        }
    }
}

/// Issued certificate and private key, exactly as Vault returned them
#[derive(Debug, Clone, Deserialize)]
pub struct Certificate {
    pub certificate: String,
    pub issuing_ca: String,
    #[serde(default)]
    pub ca_chain: Vec<String>,
    pub private_key: String,
    pub private_key_type: String,
    pub serial_number: String,
    #[serde(rename = "expiration", default, with = "chrono::serde::ts_seconds_option")]
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Revocation {
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub revocation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revocation_time_rfc3339: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VaultResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MaybeData<T> {
    data: Option<T>,
}

/// Handle on one PKI mount
pub struct Pki<'a> {
    client: &'a VaultClient,
    mount: String,
}

impl VaultClient {
    pub fn pki(&self, mount: &str) -> Pki<'_> {
        Pki {
            client: self,
            mount: mount.trim_matches('/').to_string(),
        }
    }
}

impl Pki<'_> {
    pub async fn issue(&self, role: &str, request: &IssueRequest) -> Result<Certificate, VaultError> {
        let path = format!("{}/issue/{}", self.mount, role);
        debug!("Issuing certificate for {} via {}", request.common_name, path);

        let response: VaultResponse<Certificate> =
            self.client.write_json(Method::POST, &path, request).await?;
        Ok(response.data)
    }

    /// Revoke by serial number. Vault may accept the revocation without
    /// reporting any details, in which case `None` is returned.
    pub async fn revoke(&self, serial_number: &str) -> Result<Option<Revocation>, VaultError> {
        let path = format!("{}/revoke", self.mount);
        debug!("Revoking certificate {}", serial_number);

        let body = serde_json::json!({ "serial_number": serial_number });
        let response: Option<MaybeData<Revocation>> = self
            .client
            .write_json_optional(Method::POST, &path, &body)
            .await?;

        Ok(response.and_then(|r| r.data))
    }
}
