//! KV version 2 secrets engine

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::client::VaultClient;
use super::error::VaultError;

/// Metadata of a single version of a versioned secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionMetadata {
    pub version: u64,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destroyed: bool,
}

impl VersionMetadata {
    pub fn is_live(&self) -> bool {
        !self.destroyed && self.deletion_time.is_none()
    }
}

/// Latest readable version of a secret
#[derive(Debug, Clone)]
pub struct KvSecret {
    pub data: HashMap<String, Value>,
    pub metadata: VersionMetadata,
}

impl KvSecret {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct VaultResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ReadData {
    #[serde(default)]
    data: Option<HashMap<String, Value>>,
    metadata: VersionMetadata,
}

#[derive(Debug, Deserialize)]
struct MetadataData {
    #[serde(default)]
    versions: HashMap<u64, VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    destroyed: bool,
}

// Vault reports "not deleted" as an empty deletion_time string.
fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
    }
}

/// Handle on one KV v2 mount
pub struct KvV2<'a> {
    client: &'a VaultClient,
    mount: String,
}

impl VaultClient {
    pub fn kv2(&self, mount: &str) -> KvV2<'_> {
        KvV2 {
            client: self,
            mount: mount.trim_matches('/').to_string(),
        }
    }
}

impl KvV2<'_> {
    fn api_path(&self, kind: &str, path: &str) -> String {
        format!("{}/{}/{}", self.mount, kind, path.trim_start_matches('/'))
    }

    /// Store `data` as a new version and return that version's metadata
    pub async fn put(
        &self,
        path: &str,
        data: HashMap<String, String>,
    ) -> Result<VersionMetadata, VaultError> {
        let api_path = self.api_path("data", path);
        debug!("Writing secret to: {}", api_path);

        let response: VaultResponse<VersionMetadata> = self
            .client
            .write_json(Method::POST, &api_path, &json!({ "data": data }))
            .await?;

        info!(
            "Wrote version {} of {}/{}",
            response.data.version, self.mount, path
        );
        Ok(response.data)
    }

    /// Read the latest version; `None` if there is none or it was deleted
    pub async fn get(&self, path: &str) -> Result<Option<KvSecret>, VaultError> {
        let api_path = self.api_path("data", path);
        debug!("Reading secret from: {}", api_path);

        let response: Option<VaultResponse<ReadData>> = self.client.read_json(&api_path).await?;
        let Some(response) = response else {
            return Ok(None);
        };

        let ReadData { data, metadata } = response.data;
        match data {
            Some(data) if metadata.is_live() => Ok(Some(KvSecret { data, metadata })),
            _ => Ok(None),
        }
    }

    /// All versions known to the metadata endpoint, oldest first
    pub async fn versions(&self, path: &str) -> Result<Vec<VersionMetadata>, VaultError> {
        let api_path = self.api_path("metadata", path);
        debug!("Reading metadata from: {}", api_path);

        let response: Option<VaultResponse<MetadataData>> =
            self.client.read_json(&api_path).await?;
        let Some(response) = response else {
            return Ok(Vec::new());
        };

        let mut versions: Vec<VersionMetadata> = response
            .data
            .versions
            .into_iter()
            .map(|(version, info)| VersionMetadata {
                version,
                created_time: info.created_time,
                deletion_time: info.deletion_time,
                destroyed: info.destroyed,
            })
            .collect();
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    /// Permanently remove the data of the given versions
    pub async fn destroy(&self, path: &str, versions: &[u64]) -> Result<(), VaultError> {
        if versions.is_empty() {
            debug!("No versions to destroy for {}/{}", self.mount, path);
            return Ok(());
        }

        let api_path = self.api_path("destroy", path);
        self.client
            .write_empty(Method::POST, &api_path, &json!({ "versions": versions }))
            .await?;

        info!(
            "Destroyed {} version(s) of {}/{}",
            versions.len(),
            self.mount,
            path
        );
        Ok(())
    }
}
