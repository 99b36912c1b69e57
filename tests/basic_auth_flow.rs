use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

use vault_creds::config::{BasicAuthConfig, VaultConfig};
use vault_creds::vault::RetryPolicy;
use vault_creds::{BasicAuthClient, VaultClient};

const POLICY: &str = include_str!("../policy.hcl");

fn vault(url: String) -> VaultClient {
    VaultClient::new(&VaultConfig::new(url, "root"))
        .unwrap()
        .with_retry_policy(RetryPolicy {
            max_retries: 1,
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(2),
        })
}

#[tokio::test]
async fn generate_authenticate_remove_authenticate() {
    let mut server = Server::new_async().await;

    let upload = server
        .mock("POST", "/v1/sys/policies/password/basicAuth")
        .match_header("X-Vault-Token", "root")
        .match_body(Matcher::Json(json!({ "policy": POLICY })))
        .with_status(204)
        .create_async()
        .await;
    let generate = server
        .mock("GET", "/v1/sys/policies/password/basicAuth/generate")
        .with_status(200)
        .with_body(r#"{"data":{"password":"Zq7!mW2pXr9#kT4vLb8s"}}"#)
        .expect(1)
        .create_async()
        .await;
    let store = server
        .mock("POST", "/v1/http/auth/data/username")
        .match_body(Matcher::Json(json!({ "data": { "password": "Zq7!mW2pXr9#kT4vLb8s" } })))
        .with_status(200)
        .with_body(r#"{"data":{"created_time":"2024-05-01T10:00:00Z","deletion_time":"","destroyed":false,"version":1}}"#)
        .create_async()
        .await;
    let stored = server
        .mock("GET", "/v1/http/auth/data/username")
        .with_status(200)
        .with_body(
            r#"{"data":{"data":{"password":"Zq7!mW2pXr9#kT4vLb8s"},"metadata":{"created_time":"2024-05-01T10:00:00Z","deletion_time":"","destroyed":false,"version":1}}}"#,
        )
        .create_async()
        .await;
    let metadata = server
        .mock("GET", "/v1/http/auth/metadata/username")
        .with_status(200)
        .with_body(
            r#"{"data":{"current_version":1,"versions":{"1":{"created_time":"2024-05-01T10:00:00Z","deletion_time":"","destroyed":false}}}}"#,
        )
        .create_async()
        .await;
    let destroy = server
        .mock("POST", "/v1/http/auth/destroy/username")
        .match_body(Matcher::Json(json!({ "versions": [1] })))
        .with_status(204)
        .create_async()
        .await;

    let policy_dir = tempfile::tempdir().unwrap();
    let policy_file = policy_dir.path().join("policy.hcl");
    std::fs::write(&policy_file, POLICY).unwrap();
    let config = BasicAuthConfig {
        password_policy_file: policy_file,
        ..BasicAuthConfig::default()
    };

    let client = BasicAuthClient::new(vault(server.url()), &config)
        .await
        .unwrap();
    upload.assert_async().await;

    let password = client.generate_credentials("username").await.unwrap();
    assert_eq!(password, "Zq7!mW2pXr9#kT4vLb8s");
    generate.assert_async().await;
    store.assert_async().await;

    assert!(client.authenticate("username", &password).await.unwrap());

    client.remove_credentials("username").await.unwrap();
    metadata.assert_async().await;
    destroy.assert_async().await;

    // Once destroyed the latest version reads back as not found
    stored.remove_async().await;
    let _gone = server
        .mock("GET", "/v1/http/auth/data/username")
        .with_status(404)
        .with_body(
            r#"{"data":{"data":null,"metadata":{"created_time":"2024-05-01T10:00:00Z","deletion_time":"","destroyed":true,"version":1}}}"#,
        )
        .create_async()
        .await;

    assert!(!client.authenticate("username", &password).await.unwrap());
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let mut server = Server::new_async().await;

    let _upload = server
        .mock("POST", "/v1/sys/policies/password/basicAuth")
        .with_status(204)
        .create_async()
        .await;
    let sealed = server
        .mock("GET", "/v1/sys/policies/password/basicAuth/generate")
        .with_status(503)
        .with_body(r#"{"errors":["Vault is sealed"]}"#)
        .expect(2)
        .create_async()
        .await;

    let policy_dir = tempfile::tempdir().unwrap();
    let policy_file = policy_dir.path().join("policy.hcl");
    std::fs::write(&policy_file, POLICY).unwrap();
    let config = BasicAuthConfig {
        password_policy_file: policy_file,
        ..BasicAuthConfig::default()
    };

    let client = BasicAuthClient::new(vault(server.url()), &config)
        .await
        .unwrap();
    let err = client.generate_credentials("username").await.unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.starts_with("Unable to generate password"));
    assert!(message.contains("Vault is sealed"));
    sealed.assert_async().await;
}
