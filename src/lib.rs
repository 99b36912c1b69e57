//! Vault-backed credentials
//!
//! HTTP Basic-Auth credentials generated from a Vault password policy and
//! kept in a versioned KV store, plus mTLS client certificates issued and
//! revoked through Vault's PKI engine.

pub mod basic_auth;
pub mod cli;
pub mod config;
pub mod mtls;
pub mod vault;

pub use basic_auth::BasicAuthClient;
pub use config::Config;
pub use mtls::CertificateClient;
pub use vault::{VaultClient, VaultError};
