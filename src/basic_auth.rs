//! HTTP Basic-Auth credentials backed by a Vault password policy
//!
//! Passwords are generated by Vault from a named policy and stored as
//! versioned secrets, one per username, under a KV v2 mount.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::BasicAuthConfig;
use crate::vault::VaultClient;

const PASSWORD_KEY: &str = "password";

pub struct BasicAuthClient {
    vault: VaultClient,
    policy_name: String,
    mount: String,
}

impl BasicAuthClient {
    /// Upload the password policy from `config` and return a ready client
    pub async fn new(vault: VaultClient, config: &BasicAuthConfig) -> Result<Self> {
        let policy = read_policy_file(&config.password_policy_file)?;

        vault
            .write_password_policy(&config.policy_name, &policy)
            .await
            .with_context(|| format!("Failed to write password policy {}", config.policy_name))?;

        Ok(Self {
            vault,
            policy_name: config.policy_name.clone(),
            mount: config.mount.clone(),
        })
    }

    /// Generate a password for `username` and store it as a new version
    pub async fn generate_credentials(&self, username: &str) -> Result<String> {
        info!("Generating basic auth credentials for {}", username);

        let password = self
            .vault
            .generate_password(&self.policy_name)
            .await
            .context("Unable to generate password")?;

        let mut data = HashMap::new();
        data.insert(PASSWORD_KEY.to_string(), password.clone());

        self.vault
            .kv2(&self.mount)
            .put(username, data)
            .await
            .context("Failed to write basic auth credentials")?;

        Ok(password)
    }

    /// Compare `password` with the latest stored version for `username`
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        info!("Authenticating {}", username);

        let secret = self
            .vault
            .kv2(&self.mount)
            .get(username)
            .await
            .with_context(|| format!("Failed to read credentials for {}", username))?;

        Ok(secret
            .as_ref()
            .and_then(|s| s.get_str(PASSWORD_KEY))
            .is_some_and(|stored| stored == password))
    }

    /// Destroy every stored version of the credentials for `username`
    pub async fn remove_credentials(&self, username: &str) -> Result<()> {
        info!("Removing credentials for {}", username);

        let kv = self.vault.kv2(&self.mount);
        let versions: Vec<u64> = kv
            .versions(username)
            .await
            .with_context(|| format!("Failed to list versions for {}", username))?
            .into_iter()
            .map(|v| v.version)
            .collect();

        if versions.is_empty() {
            warn!("No stored credentials for {}", username);
            return Ok(());
        }

        kv.destroy(username, &versions)
            .await
            .with_context(|| format!("Failed to destroy credentials for {}", username))
    }
}

fn read_policy_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("Failed to read password policy file: {:?}", path))
}
