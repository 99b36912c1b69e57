//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the appropriate handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::basic_auth::BasicAuthClient;
use crate::config::Config;
use crate::mtls::{self, CertificateClient};
use crate::vault::{Certificate, Revocation, VaultClient};

#[derive(Parser)]
#[command(name = "vault-creds")]
#[command(about = "Basic-Auth credentials and mTLS certificates backed by HashiCorp Vault", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "VAULT_CREDS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Vault address (overrides config file)
    #[arg(long, env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// Vault token (overrides config file)
    #[arg(long, env = "VAULT_TOKEN", hide_env_values = true)]
    pub vault_token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "vault-creds.toml")]
        output: PathBuf,
    },

    /// HTTP Basic-Auth credentials generated from a password policy
    BasicAuth {
        #[command(subcommand)]
        command: BasicAuthCommand,
    },

    /// mTLS client certificates from the PKI engine
    Mtls {
        #[command(subcommand)]
        command: MtlsCommand,
    },
}

#[derive(Subcommand)]
pub enum BasicAuthCommand {
    /// Generate and store a new password for a user
    Generate { username: String },

    /// Check a password against the stored credentials
    Authenticate {
        username: String,

        #[arg(short, long, env = "BASIC_AUTH_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Destroy every stored version of a user's credentials
    Remove { username: String },

    /// Generate, authenticate, remove, then authenticate again
    Demo {
        #[arg(default_value = "username")]
        username: String,
    },
}

#[derive(Subcommand)]
pub enum MtlsCommand {
    /// Issue a certificate for a user
    Issue {
        user_id: String,

        /// Write certificate, key and CA chain as PEM files into this directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Revoke a certificate by serial number
    Revoke { serial_number: String },

    /// Issue a certificate, then revoke it
    Demo { user_id: String },
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // Handle init command separately as it doesn't need Vault
    if let Commands::Init { output } = cli.command {
        Config::create_sample(&output)
            .with_context(|| format!("Failed to create sample config at {:?}", output))?;
        info!("Sample configuration created at {:?}", output);
        return Ok(());
    }

    let config = load_config(cli.config, cli.vault_addr, cli.vault_token)?;
    let vault = VaultClient::new(&config.vault).context("Failed to create Vault client")?;

    match cli.command {
        Commands::Init { .. } => unreachable!(), // Handled above
        Commands::BasicAuth { command } => {
            let client = BasicAuthClient::new(vault, &config.basic_auth)
                .await
                .context("Failed to create basic auth client")?;
            run_basic_auth(&client, command).await
        }
        Commands::Mtls { command } => {
            let client = CertificateClient::new(vault, &config.pki);
            run_mtls(&client, command).await
        }
    }
}

fn load_config(
    path: Option<PathBuf>,
    vault_addr: Option<String>,
    vault_token: Option<String>,
) -> Result<Config> {
    let mut config = if let Some(config_path) = path {
        Config::from_file(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        Config::from_env().context("Failed to load config from environment")?
    };

    // Override with CLI arguments if provided
    if let Some(addr) = vault_addr {
        config.vault.address = addr;
    }
    if let Some(token) = vault_token {
        config.vault.token = token;
    }

    Ok(config)
}

async fn run_basic_auth(client: &BasicAuthClient, command: BasicAuthCommand) -> Result<()> {
    match command {
        BasicAuthCommand::Generate { username } => {
            let password = client
                .generate_credentials(&username)
                .await
                .context("Failed to generate basic auth credentials")?;
            print_credentials(&username, &password);
        }

        BasicAuthCommand::Authenticate { username, password } => {
            let authenticated = client
                .authenticate(&username, &password)
                .await
                .context("Failed to authenticate")?;
            println!("authenticated: {}", authenticated);
            if !authenticated {
                anyhow::bail!("Credentials for {} did not match", username);
            }
        }

        BasicAuthCommand::Remove { username } => {
            client
                .remove_credentials(&username)
                .await
                .context("Failed to remove basic auth credentials")?;
            println!("Removed basic auth credentials for {}", username);
        }

        BasicAuthCommand::Demo { username } => {
            let password = client
                .generate_credentials(&username)
                .await
                .context("Failed to generate basic auth credentials")?;
            print_credentials(&username, &password);

            let authenticated = client
                .authenticate(&username, &password)
                .await
                .context("Failed to authenticate")?;
            info!("Authenticated {}: {}", username, authenticated);
            println!("authenticated: {}", authenticated);

            client
                .remove_credentials(&username)
                .await
                .context("Failed to remove basic auth credentials")?;
            info!("Removed basic auth credentials for {}", username);

            let authenticated = client
                .authenticate(&username, &password)
                .await
                .context("Failed to authenticate")?;
            info!("Authenticated {} after removal: {}", username, authenticated);
            println!("authenticated after removal: {}", authenticated);
        }
    }

    Ok(())
}

async fn run_mtls(client: &CertificateClient, command: MtlsCommand) -> Result<()> {
    match command {
        MtlsCommand::Issue { user_id, out_dir } => {
            let certificate = client
                .issue_certificate(&user_id)
                .await
                .context("Failed to issue certificate")?;

            match out_dir {
                Some(dir) => {
                    let files = mtls::write_pem_files(&certificate, &dir)?;
                    print_certificate_summary(&certificate);
                    println!("  Certificate: {}", files.certificate.display());
                    println!("  Private key: {}", files.private_key.display());
                    println!("  CA chain: {}", files.ca_chain.display());
                }
                None => {
                    print_certificate_summary(&certificate);
                    eprintln!("WARNING: Private key will be displayed. Ensure this output is secured.");
                    println!("{}", certificate.certificate);
                    println!("{}", certificate.private_key);
                }
            }
        }

        MtlsCommand::Revoke { serial_number } => {
            let revocation = client
                .revoke_certificate(&serial_number)
                .await
                .context("Failed to revoke certificate")?;
            print_revocation(&serial_number, revocation.as_ref());
        }

        MtlsCommand::Demo { user_id } => {
            let certificate = client
                .issue_certificate(&user_id)
                .await
                .context("Failed to issue certificate")?;
            print_certificate_summary(&certificate);

            let revocation = client
                .revoke_certificate(&certificate.serial_number)
                .await
                .context("Failed to revoke certificate")?;
            print_revocation(&certificate.serial_number, revocation.as_ref());
        }
    }

    Ok(())
}

fn print_credentials(username: &str, password: &str) {
    println!("Generated basic auth credentials");
    println!("  Username: {}", username);
    eprintln!("WARNING: Password will be displayed. Ensure this output is secured.");
    println!("  Password: {}", password);
}

fn print_certificate_summary(certificate: &Certificate) {
    println!("Issued certificate");
    println!("  Serial: {}", certificate.serial_number);
    println!("  Key type: {}", certificate.private_key_type);
    if let Some(expiry) = certificate.expiry {
        println!("  Expires: {}", expiry.to_rfc3339());
    }
}

fn print_revocation(serial_number: &str, revocation: Option<&Revocation>) {
    match revocation.and_then(|r| r.revocation_time_rfc3339.as_deref()) {
        Some(at) => println!("Revoked certificate {} at {}", serial_number, at),
        None => println!("Revoked certificate {}", serial_number),
    }
}
