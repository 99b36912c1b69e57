use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub vault: VaultConfig,
    #[serde(default)]
    pub basic_auth: BasicAuthConfig,
    #[serde(default)]
    pub pki: PkiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub address: String,
    pub token: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_min_retry_wait_ms")]
    pub min_retry_wait_ms: u64,
    #[serde(default = "default_max_retry_wait_seconds")]
    pub max_retry_wait_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    /// File holding the HCL password policy uploaded at startup
    #[serde(default = "default_policy_file")]
    pub password_policy_file: PathBuf,
    #[serde(default = "default_policy_name")]
    pub policy_name: String,
    /// KV v2 mount the credentials are stored under
    #[serde(default = "default_basic_auth_mount")]
    pub mount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkiConfig {
    #[serde(default = "default_pki_mount")]
    pub mount: String,
    #[serde(default = "default_pki_role")]
    pub role: String,
    /// Requested certificate lifetime, e.g. "24h". Role default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_retry_wait_ms() -> u64 {
    1000
}

fn default_max_retry_wait_seconds() -> u64 {
    30
}

fn default_policy_file() -> PathBuf {
    PathBuf::from("./policy.hcl")
}

fn default_policy_name() -> String {
    "basicAuth".to_string()
}

fn default_basic_auth_mount() -> String {
    "http/auth".to_string()
}

fn default_pki_mount() -> String {
    "pki".to_string()
}

fn default_pki_role() -> String {
    "mtls".to_string()
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            min_retry_wait_ms: default_min_retry_wait_ms(),
            max_retry_wait_seconds: default_max_retry_wait_seconds(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for BasicAuthConfig {
    fn default() -> Self {
        Self {
            password_policy_file: default_policy_file(),
            policy_name: default_policy_name(),
            mount: default_basic_auth_mount(),
        }
    }
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            mount: default_pki_mount(),
            role: default_pki_role(),
            ttl: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut vault = VaultConfig::new(
            std::env::var("VAULT_ADDR").context("VAULT_ADDR environment variable not set")?,
            std::env::var("VAULT_TOKEN").context("VAULT_TOKEN environment variable not set")?,
        );
        if let Some(retries) = env_parse("VAULT_MAX_RETRIES") {
            vault.max_retries = retries;
        }
        if let Some(timeout) = env_parse("VAULT_TIMEOUT_SECONDS") {
            vault.timeout_seconds = timeout;
        }

        let basic_auth = BasicAuthConfig {
            password_policy_file: std::env::var("BASIC_AUTH_POLICY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_policy_file()),
            policy_name: std::env::var("BASIC_AUTH_POLICY_NAME")
                .unwrap_or_else(|_| default_policy_name()),
            mount: std::env::var("BASIC_AUTH_MOUNT").unwrap_or_else(|_| default_basic_auth_mount()),
        };

        let pki = PkiConfig {
            mount: std::env::var("PKI_MOUNT").unwrap_or_else(|_| default_pki_mount()),
            role: std::env::var("PKI_ROLE").unwrap_or_else(|_| default_pki_role()),
            ttl: std::env::var("PKI_TTL").ok().filter(|s| !s.is_empty()),
        };

        Ok(Self {
            vault,
            basic_auth,
            pki,
        })
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample = Self {
            vault: VaultConfig::new(
                "http://127.0.0.1:8200",
                "00000000-0000-0000-0000-000000000000",
            ),
            basic_auth: BasicAuthConfig::default(),
            pki: PkiConfig::default(),
        };

        let toml_string =
            toml::to_string_pretty(&sample).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[vault]
address = "http://vault:8200"
token = "root"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.vault.address, "http://vault:8200");
        assert_eq!(config.vault.max_retries, 3);
        assert_eq!(config.vault.max_retry_wait_seconds, 30);
        assert_eq!(config.basic_auth.policy_name, "basicAuth");
        assert_eq!(config.basic_auth.mount, "http/auth");
        assert_eq!(config.pki.role, "mtls");
        assert!(config.pki.ttl.is_none());
    }

    #[test]
    fn test_sample_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");

        Config::create_sample(&path).unwrap();
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.vault.address, "http://127.0.0.1:8200");
        assert_eq!(
            config.basic_auth.password_policy_file,
            PathBuf::from("./policy.hcl")
        );
        assert_eq!(config.pki.mount, "pki");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Config::from_file("/nonexistent/vault-creds.toml").unwrap_err();
        assert!(format!("{:#}", err).contains("vault-creds.toml"));
    }

    // Tests touching process environment hold this lock
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    const ENV_VARS: [&str; 10] = [
        "VAULT_ADDR",
        "VAULT_TOKEN",
        "VAULT_MAX_RETRIES",
        "VAULT_TIMEOUT_SECONDS",
        "BASIC_AUTH_POLICY_FILE",
        "BASIC_AUTH_POLICY_NAME",
        "BASIC_AUTH_MOUNT",
        "PKI_MOUNT",
        "PKI_ROLE",
        "PKI_TTL",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_from_env_reads_every_setting() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var("VAULT_ADDR", "https://vault.internal:8200");
        std::env::set_var("VAULT_TOKEN", "s.env");
        std::env::set_var("VAULT_MAX_RETRIES", "5");
        std::env::set_var("VAULT_TIMEOUT_SECONDS", "15");
        std::env::set_var("BASIC_AUTH_POLICY_FILE", "/etc/vault-creds/policy.hcl");
        std::env::set_var("BASIC_AUTH_POLICY_NAME", "webAuth");
        std::env::set_var("BASIC_AUTH_MOUNT", "secret/web");
        std::env::set_var("PKI_MOUNT", "pki_int");
        std::env::set_var("PKI_ROLE", "clients");
        std::env::set_var("PKI_TTL", "12h");

        let config = Config::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.vault.address, "https://vault.internal:8200");
        assert_eq!(config.vault.token, "s.env");
        assert_eq!(config.vault.max_retries, 5);
        assert_eq!(config.vault.timeout(), Duration::from_secs(15));
        assert_eq!(
            config.basic_auth.password_policy_file,
            PathBuf::from("/etc/vault-creds/policy.hcl")
        );
        assert_eq!(config.basic_auth.policy_name, "webAuth");
        assert_eq!(config.basic_auth.mount, "secret/web");
        assert_eq!(config.pki.mount, "pki_int");
        assert_eq!(config.pki.role, "clients");
        assert_eq!(config.pki.ttl.as_deref(), Some("12h"));
    }

    #[test]
    fn test_from_env_defaults_and_empty_ttl() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var("VAULT_ADDR", "http://127.0.0.1:8200");
        std::env::set_var("VAULT_TOKEN", "root");
        std::env::set_var("VAULT_MAX_RETRIES", "not-a-number");
        std::env::set_var("PKI_TTL", "");

        let config = Config::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.vault.max_retries, 3);
        assert_eq!(config.vault.timeout_seconds, 60);
        assert_eq!(config.basic_auth.policy_name, "basicAuth");
        assert_eq!(config.basic_auth.mount, "http/auth");
        assert_eq!(config.pki.mount, "pki");
        assert_eq!(config.pki.role, "mtls");
        assert!(config.pki.ttl.is_none());
    }

    #[test]
    fn test_from_env_requires_token() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var("VAULT_ADDR", "http://127.0.0.1:8200");

        let result = Config::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("VAULT_TOKEN"));
    }

    #[test]
    fn test_missing_vault_section_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pki]\nrole = \"clients\"\n").unwrap();

        assert!(Config::from_file(&path).is_err());
    }
}
