//! HashiCorp Vault HTTP API
//!
//! A thin client over the handful of engines the credential workflows use:
//! password policies, KV version 2 and PKI.

mod client;
mod error;
mod kv;
mod password_policy;
mod pki;

pub use client::{RetryPolicy, VaultClient};
pub use error::VaultError;
pub use kv::{KvSecret, KvV2, VersionMetadata};
pub use pki::{Certificate, IssueRequest, Pki, Revocation};
