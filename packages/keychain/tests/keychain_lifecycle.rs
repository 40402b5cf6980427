//! End-to-end keychain behaviour through the public API

use dynamo_keychain::config::{BackendKind, MasterKeySource};
use dynamo_keychain::prelude::*;
use dynamo_keychain::store::{FileKeychainStore, MasterKey};
use dynamo_keychain::{IdentityGenerator, logging};
use std::path::Path;

fn config_for(dir: &Path) -> KeychainConfig {
    let mut config = KeychainConfig {
        keychain_dir: dir.to_path_buf(),
        backend: BackendKind::File,
        master_key: MasterKeySource::KeyFile { path: None },
        ..KeychainConfig::default()
    };
    config.identity.include_hostname = false;
    config
}

#[tokio::test]
async fn test_server_bootstrap_flow() {
    logging::init_test();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let keychain = Keychain::from_config(config_for(dir.path())).expect("Failed to open keychain");

    // First start: nothing stored yet
    assert!(
        keychain
            .ssl_identity_and_certificates("DynamoSSL")
            .await
            .expect("lookup")
            .is_none()
    );
    keychain
        .create_new_identity("DynamoSSL")
        .await
        .expect("Failed to create identity");

    let credentials = keychain
        .ssl_identity_and_certificates("DynamoSSL")
        .await
        .expect("lookup")
        .expect("identity present after creation");
    let info = credentials.identity().certificate().info();
    assert_eq!(info.common_name.as_deref(), Some("DynamoSSL"));
    assert!(info.dns_names.contains(&"localhost".to_string()));
    credentials
        .server_config()
        .expect("rustls accepts the identity");

    println!("✅ Bootstrapped identity {}", info.sha256_fingerprint);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let fingerprint = {
        let keychain = Keychain::from_config(config_for(dir.path())).expect("open");
        keychain
            .set_password_for_http_server("persisted")
            .await
            .expect("set password");
        keychain
            .ensure_ssl_identity("DynamoSSL")
            .await
            .expect("ensure identity")
            .identity()
            .certificate()
            .info()
            .sha256_fingerprint
            .clone()
    };

    let reopened = Keychain::from_config(config_for(dir.path())).expect("reopen");
    let password = reopened
        .password_for_http_server()
        .await
        .expect("lookup")
        .expect("password persisted");
    assert_eq!(password.as_str(), "persisted");

    let credentials = reopened
        .ensure_ssl_identity("DynamoSSL")
        .await
        .expect("ensure identity");
    assert_eq!(
        credentials.identity().certificate().info().sha256_fingerprint,
        fingerprint
    );
    assert_eq!(reopened.items("DynamoSSL").await.expect("items").len(), 2);
}

#[tokio::test]
async fn test_foreign_master_key_is_rejected() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = config_for(dir.path());
    let keychain = Keychain::from_config(config.clone()).expect("open");
    keychain
        .set_password_for_http_server("secret")
        .await
        .expect("set password");
    keychain.create_new_identity("k").await.expect("create");

    let foreign = Keychain::new(
        FileKeychainStore::at(dir.path()).with_master_key(MasterKey::generate()),
        config,
    );
    assert!(matches!(
        foreign.password_for_http_server().await,
        Err(KeychainError::DecryptionFailed(_))
    ));
    assert!(matches!(
        foreign.ssl_identity_and_certificates("k").await,
        Err(KeychainError::DecryptionFailed(_))
    ));
}

#[tokio::test]
async fn test_certificate_only_import_travels_with_identity() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let keychain = Keychain::from_config(config_for(dir.path())).expect("open");
    keychain.create_new_identity("web").await.expect("create");

    let intermediate = IdentityGenerator::new("intermediate")
        .include_hostname(false)
        .generate()
        .expect("generate")
        .certificate()
        .clone();
    let summary = keychain
        .import("web", Some("chain"), intermediate.to_pem().as_bytes())
        .await
        .expect("import");
    assert_eq!(summary.format, ExternalFormat::X509Cert);
    assert_eq!(summary.item_type, ExternalItemType::Certificate);
    assert_eq!((summary.identities, summary.certificates), (0, 1));

    let credentials = keychain
        .ssl_identity_and_certificates("web")
        .await
        .expect("lookup")
        .expect("identity");
    assert_eq!(credentials.certificates(), &[intermediate]);
    assert_eq!(credentials.certificate_chain().len(), 2);
}

#[tokio::test]
async fn test_der_certificate_import() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let keychain = Keychain::from_config(config_for(dir.path())).expect("open");
    let cert = IdentityGenerator::new("der")
        .include_hostname(false)
        .generate()
        .expect("generate")
        .certificate()
        .clone();

    let summary = keychain
        .import("certs", None, cert.as_bytes())
        .await
        .expect("import");
    assert_eq!(summary.certificates, 1);
    let items = keychain.items("certs").await.expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class, KeychainAttrType::Certificate);
    assert_eq!(items[0].label, "certs");
}

#[tokio::test]
async fn test_unsupported_import_stores_nothing() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let keychain = Keychain::from_config(config_for(dir.path())).expect("open");

    let result = keychain.import("k", None, b"definitely not a certificate").await;
    assert!(matches!(result, Err(KeychainError::UnsupportedFormat(_))));
    assert!(keychain.items("k").await.expect("items").is_empty());
}

#[tokio::test]
async fn test_invalid_names_touch_nothing() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let keychain = Keychain::from_config(config_for(dir.path())).expect("open");

    for name in ["", "../outside", "a/b", ".hidden"] {
        assert!(matches!(
            keychain.create_new_identity(name).await,
            Err(KeychainError::InvalidKeychainName(_))
        ));
    }
    let files: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .map(|e| e.expect("entry").file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("master.key")]);
}
