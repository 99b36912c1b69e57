//! Vault password policies (`sys/policies/password`)

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::client::VaultClient;
use super::error::VaultError;

#[derive(Debug, Deserialize)]
struct VaultResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PolicyData {
    policy: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedPassword {
    #[serde(default)]
    password: Option<String>,
}

fn policy_path(name: &str) -> String {
    format!("sys/policies/password/{}", name)
}

impl VaultClient {
    /// Create or replace the named password policy
    pub async fn write_password_policy(&self, name: &str, policy: &str) -> Result<(), VaultError> {
        self.write_empty(Method::POST, &policy_path(name), &json!({ "policy": policy }))
            .await?;
        info!("Wrote password policy {}", name);
        Ok(())
    }

    /// Read back the policy text, `None` if the policy does not exist
    pub async fn read_password_policy(&self, name: &str) -> Result<Option<String>, VaultError> {
        let response: Option<VaultResponse<PolicyData>> =
            self.read_json(&policy_path(name)).await?;
        Ok(response.map(|r| r.data.policy))
    }

    /// Generate a password from an existing policy
    pub async fn generate_password(&self, name: &str) -> Result<String, VaultError> {
        let path = format!("{}/generate", policy_path(name));
        debug!("Generating password from policy {}", name);

        // A missing policy comes back as 400 rather than 404 here, but treat
        // both the same way.
        let response: Option<VaultResponse<GeneratedPassword>> = self.read_json(&path).await?;
        let Some(response) = response else {
            return Err(VaultError::Status {
                path,
                status: reqwest::StatusCode::NOT_FOUND,
                message: format!("password policy {} not found", name),
            });
        };

        response.data.password.ok_or(VaultError::MissingField {
            path,
            field: "data.password",
        })
    }
}
