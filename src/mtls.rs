//! Short-lived mTLS client certificates from a Vault PKI mount

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::PkiConfig;
use crate::vault::{Certificate, IssueRequest, Revocation, VaultClient};

pub struct CertificateClient {
    vault: VaultClient,
    mount: String,
    role: String,
    ttl: Option<String>,
}

/// Paths written by [`write_pem_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemFiles {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub ca_chain: PathBuf,
}

impl CertificateClient {
    pub fn new(vault: VaultClient, config: &PkiConfig) -> Self {
        Self {
            vault,
            mount: config.mount.clone(),
            role: config.role.clone(),
            ttl: config.ttl.clone(),
        }
    }

    /// Issue a certificate whose common name and user id are `user_id`
    pub async fn issue_certificate(&self, user_id: &str) -> Result<Certificate> {
        info!("Issuing a certificate for {}", user_id);

        let mut request = IssueRequest::new(user_id);
        request.user_ids = Some(user_id.to_string());
        request.ttl = self.ttl.clone();

        let certificate = self
            .vault
            .pki(&self.mount)
            .issue(&self.role, &request)
            .await
            .context("Failed to create a certificate")?;

        info!(
            "Issued certificate {} for {}",
            certificate.serial_number, user_id
        );
        Ok(certificate)
    }

    /// Revoke by serial number; `None` when Vault accepted it without details
    pub async fn revoke_certificate(&self, serial_number: &str) -> Result<Option<Revocation>> {
        info!("Revoking certificate {}", serial_number);

        self.vault
            .pki(&self.mount)
            .revoke(serial_number)
            .await
            .with_context(|| format!("Failed to revoke certificate {}", serial_number))
    }
}

/// Write certificate, key and CA chain as PEM files into `dir`
///
/// Files are named after the serial number. The private key is only
/// readable by the owner on Unix.
pub fn write_pem_files(certificate: &Certificate, dir: &Path) -> Result<PemFiles> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let stem = certificate.serial_number.replace(':', "-");
    let files = PemFiles {
        certificate: dir.join(format!("{}.crt", stem)),
        private_key: dir.join(format!("{}.key", stem)),
        ca_chain: dir.join("ca_chain.pem"),
    };

    fs::write(&files.certificate, pem_block(&certificate.certificate))
        .with_context(|| format!("Failed to write {}", files.certificate.display()))?;

    write_private(&files.private_key, &pem_block(&certificate.private_key))
        .with_context(|| format!("Failed to write {}", files.private_key.display()))?;

    let chain = if certificate.ca_chain.is_empty() {
        pem_block(&certificate.issuing_ca)
    } else {
        certificate.ca_chain.iter().map(|c| pem_block(c)).collect()
    };
    fs::write(&files.ca_chain, chain)
        .with_context(|| format!("Failed to write {}", files.ca_chain.display()))?;

    Ok(files)
}

fn pem_block(pem: &str) -> String {
    format!("{}\n", pem.trim_end())
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies when the file is created
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())
}
