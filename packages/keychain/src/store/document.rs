//! On-disk keychain document and the item operations shared by every backend

use super::{DocumentStore, KeychainStorage};
use crate::config::HttpCredential;
use crate::format::{ExternalItemType, KeychainAttrType};
use crate::identity::{Certificate, Identity, PrivateKey, PrivateKeyKind};
use crate::logging::log_secret_access;
use crate::paths::validate_keychain_name;
use crate::{KeychainError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Current keychain document layout
pub const FORMAT_VERSION: u32 = 1;

const ATTR_SERVICE: &str = "service";
const ATTR_ACCOUNT: &str = "account";
const ATTR_CERTIFICATE: &str = "certificate";
const ATTR_KEY_KIND: &str = "key_kind";
const ATTR_FINGERPRINT: &str = "fingerprint";

/// Serialized contents of one keychain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeychainDocument {
    /// Layout version
    pub format_version: u32,
    /// Stored items in insertion order
    #[serde(default)]
    pub items: Vec<StoredItem>,
}

impl Default for KeychainDocument {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            items: Vec::new(),
        }
    }
}

/// One keychain item
///
/// `data` is base64 DER for certificates and the backend's sealed form for
/// passwords and private keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    /// Item id, also bound into sealed payloads
    pub id: Uuid,
    /// Item class
    pub class: KeychainAttrType,
    /// Human-readable label
    pub label: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Non-secret attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Payload
    pub data: String,
}

impl StoredItem {
    fn new(class: KeychainAttrType, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            class,
            label: label.into(),
            created_at: Utc::now(),
            attributes: BTreeMap::new(),
            data: String::new(),
        }
    }

    fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Store `payload`, sealed when the item class is secret
    fn set_payload<D: DocumentStore>(&mut self, store: &D, payload: &[u8]) -> Result<()> {
        self.data = if self.class.is_secret() {
            store.seal(&self.id, payload)?
        } else {
            STANDARD.encode(payload)
        };
        Ok(())
    }

    fn payload<D: DocumentStore>(&self, store: &D) -> Result<Zeroizing<Vec<u8>>> {
        if self.class.is_secret() {
            return store.unseal(&self.id, &self.data);
        }
        STANDARD.decode(&self.data).map(Zeroizing::new).map_err(|e| {
            KeychainError::CertificateParsing(format!("item {}: {e}", self.id))
        })
    }

    fn is_credential(&self, credential: &HttpCredential) -> bool {
        self.class == KeychainAttrType::GenericPassword
            && self.attribute(ATTR_SERVICE) == Some(credential.service.as_str())
            && self.attribute(ATTR_ACCOUNT) == Some(credential.account.as_str())
    }

    fn certificate_ref(&self) -> Option<Uuid> {
        self.attribute(ATTR_CERTIFICATE)
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

/// Item listing without secret payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    /// Item id
    pub id: Uuid,
    /// Item class
    pub class: KeychainAttrType,
    /// Item type the class exports as
    pub item_type: ExternalItemType,
    /// Label
    pub label: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Non-secret attributes
    pub attributes: BTreeMap<String, String>,
}

impl From<&StoredItem> for ItemSummary {
    fn from(item: &StoredItem) -> Self {
        Self {
            id: item.id,
            class: item.class,
            item_type: ExternalItemType::for_item_class(item.class),
            label: item.label.clone(),
            created_at: item.created_at,
            attributes: item.attributes.clone(),
        }
    }
}

fn key_kind_name(kind: PrivateKeyKind) -> &'static str {
    match kind {
        PrivateKeyKind::Pkcs8 => "pkcs8",
        PrivateKeyKind::Pkcs1 => "pkcs1",
        PrivateKeyKind::Sec1 => "sec1",
    }
}

fn key_kind_from_name(name: Option<&str>) -> Result<PrivateKeyKind> {
    match name {
        None | Some("pkcs8") => Ok(PrivateKeyKind::Pkcs8),
        Some("pkcs1") => Ok(PrivateKeyKind::Pkcs1),
        Some("sec1") => Ok(PrivateKeyKind::Sec1),
        Some(other) => Err(KeychainError::InvalidPrivateKey(format!(
            "unknown stored key encoding {other:?}"
        ))),
    }
}

fn decode_certificate<D: DocumentStore>(store: &D, item: &StoredItem) -> Result<Certificate> {
    let der = item.payload(store)?;
    Certificate::from_der(der.as_slice())
}

fn certificate_item<D: DocumentStore>(
    store: &D,
    label: &str,
    certificate: &Certificate,
) -> Result<StoredItem> {
    let mut item = StoredItem::new(KeychainAttrType::Certificate, label)
        .with_attribute(ATTR_FINGERPRINT, certificate.info().sha256_fingerprint.clone());
    item.set_payload(store, certificate.as_bytes())?;
    Ok(item)
}

/// Append the certificate item and linked key item of `identity`
fn push_identity<D: DocumentStore>(
    store: &D,
    document: &mut KeychainDocument,
    identity: &Identity,
) -> Result<()> {
    let cert_item = certificate_item(store, identity.label(), identity.certificate())?;
    let key = identity.private_key();
    let mut key_item = StoredItem::new(KeychainAttrType::PrivateKey, identity.label())
        .with_attribute(ATTR_CERTIFICATE, cert_item.id.to_string())
        .with_attribute(ATTR_KEY_KIND, key_kind_name(key.kind()));
    key_item.created_at = identity.created_at();
    key_item.set_payload(store, key.as_bytes())?;

    document.items.push(cert_item);
    document.items.push(key_item);
    Ok(())
}

async fn load_or_default<D: DocumentStore>(
    store: &D,
    keychain: &str,
) -> Result<KeychainDocument> {
    validate_keychain_name(keychain)?;
    let document = store.load(keychain).await?.unwrap_or_default();
    if document.format_version > FORMAT_VERSION {
        return Err(KeychainError::backend(
            "load",
            format!(
                "keychain {keychain:?} uses layout version {}, newest supported is {FORMAT_VERSION}",
                document.format_version
            ),
        ));
    }
    Ok(document)
}

fn assemble_identities<D: DocumentStore>(
    store: &D,
    document: &KeychainDocument,
) -> Result<Vec<Identity>> {
    let certificates: HashMap<Uuid, &StoredItem> = document
        .items
        .iter()
        .filter(|item| item.class == KeychainAttrType::Certificate)
        .map(|item| (item.id, item))
        .collect();

    let mut identities = Vec::new();
    for key_item in document
        .items
        .iter()
        .filter(|item| item.class == KeychainAttrType::PrivateKey)
    {
        let Some(cert_item) = key_item
            .certificate_ref()
            .and_then(|id| certificates.get(&id))
        else {
            warn!(
                "Private key {} ({:?}) has no certificate, skipping",
                key_item.id, key_item.label
            );
            continue;
        };

        let certificate = decode_certificate(store, cert_item)?;
        let kind = key_kind_from_name(key_item.attribute(ATTR_KEY_KIND))?;
        let mut der = key_item.payload(store)?;
        let private_key = PrivateKey::new(kind, std::mem::take(&mut *der));
        let identity = Identity::new(key_item.label.clone(), certificate, private_key)?
            .with_created_at(key_item.created_at);
        identities.push(identity);
    }
    Ok(identities)
}

impl<D: DocumentStore> KeychainStorage for D {
    async fn find_generic_password(
        &self,
        keychain: &str,
        credential: &HttpCredential,
    ) -> Result<Option<Zeroizing<String>>> {
        let document = load_or_default(self, keychain).await?;
        let Some(item) = document.items.iter().find(|i| i.is_credential(credential)) else {
            log_secret_access("lookup", keychain, &credential.account, false);
            return Ok(None);
        };

        let mut bytes = item.payload(self)?;
        let password = String::from_utf8(std::mem::take(&mut *bytes)).map_err(|e| {
            KeychainError::DecryptionFailed(format!("stored password is not UTF-8: {e}"))
        })?;
        log_secret_access("lookup", keychain, &credential.account, true);
        Ok(Some(Zeroizing::new(password)))
    }

    async fn set_generic_password(
        &self,
        keychain: &str,
        credential: &HttpCredential,
        password: &str,
    ) -> Result<()> {
        validate_keychain_name(keychain)?;
        let _guard = self.locks().acquire(keychain).await;
        let mut document = load_or_default(self, keychain).await?;

        match document.items.iter_mut().find(|i| i.is_credential(credential)) {
            Some(item) => {
                item.set_payload(self, password.as_bytes())?;
                item.created_at = Utc::now();
            }
            None => {
                let mut item =
                    StoredItem::new(KeychainAttrType::GenericPassword, &credential.service)
                        .with_attribute(ATTR_SERVICE, credential.service.clone())
                        .with_attribute(ATTR_ACCOUNT, credential.account.clone());
                item.set_payload(self, password.as_bytes())?;
                document.items.push(item);
            }
        }

        self.save(keychain, &document).await?;
        log_secret_access("store", keychain, &credential.account, true);
        Ok(())
    }

    async fn delete_generic_password(
        &self,
        keychain: &str,
        credential: &HttpCredential,
    ) -> Result<bool> {
        validate_keychain_name(keychain)?;
        let _guard = self.locks().acquire(keychain).await;
        let mut document = load_or_default(self, keychain).await?;

        let before = document.items.len();
        document.items.retain(|i| !i.is_credential(credential));
        let removed = document.items.len() != before;
        if removed {
            self.save(keychain, &document).await?;
        }
        log_secret_access("delete", keychain, &credential.account, removed);
        Ok(removed)
    }

    async fn add_identity(&self, keychain: &str, identity: &Identity) -> Result<()> {
        self.add_items(keychain, std::slice::from_ref(identity), &[]).await
    }

    async fn add_items(
        &self,
        keychain: &str,
        identities: &[Identity],
        certificates: &[(String, Certificate)],
    ) -> Result<()> {
        validate_keychain_name(keychain)?;
        let _guard = self.locks().acquire(keychain).await;
        let mut document = load_or_default(self, keychain).await?;

        for identity in identities {
            debug!(
                "Adding identity {:?} to keychain {keychain} via {} backend",
                identity.label(),
                self.backend_name()
            );
            push_identity(self, &mut document, identity)?;
        }
        for (label, certificate) in certificates {
            document.items.push(certificate_item(self, label, certificate)?);
        }
        self.save(keychain, &document).await
    }

    async fn identities(&self, keychain: &str) -> Result<Vec<Identity>> {
        let document = load_or_default(self, keychain).await?;
        assemble_identities(self, &document)
    }

    async fn add_certificate(
        &self,
        keychain: &str,
        label: &str,
        certificate: &Certificate,
    ) -> Result<()> {
        self.add_items(keychain, &[], &[(label.to_string(), certificate.clone())])
            .await
    }

    async fn certificates(&self, keychain: &str) -> Result<Vec<Certificate>> {
        let document = load_or_default(self, keychain).await?;
        let bound: HashSet<Uuid> = document
            .items
            .iter()
            .filter(|item| item.class == KeychainAttrType::PrivateKey)
            .filter_map(StoredItem::certificate_ref)
            .collect();

        document
            .items
            .iter()
            .filter(|item| item.class == KeychainAttrType::Certificate)
            .filter(|item| !bound.contains(&item.id))
            .map(|item| decode_certificate(self, item))
            .collect()
    }

    async fn delete_identities(&self, keychain: &str, label: Option<&str>) -> Result<usize> {
        validate_keychain_name(keychain)?;
        let _guard = self.locks().acquire(keychain).await;
        let mut document = load_or_default(self, keychain).await?;

        let doomed_keys: Vec<&StoredItem> = document
            .items
            .iter()
            .filter(|item| item.class == KeychainAttrType::PrivateKey)
            .filter(|item| label.is_none_or(|l| item.label == l))
            .collect();
        let removed = doomed_keys.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut doomed: HashSet<Uuid> = doomed_keys.iter().map(|item| item.id).collect();
        doomed.extend(doomed_keys.iter().filter_map(|item| item.certificate_ref()));
        document.items.retain(|item| !doomed.contains(&item.id));

        self.save(keychain, &document).await?;
        Ok(removed)
    }

    async fn items(&self, keychain: &str) -> Result<Vec<ItemSummary>> {
        let document = load_or_default(self, keychain).await?;
        Ok(document.items.iter().map(ItemSummary::from).collect())
    }

    async fn delete_keychain(&self, keychain: &str) -> Result<bool> {
        validate_keychain_name(keychain)?;
        let _guard = self.locks().acquire(keychain).await;
        self.remove(keychain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeychainLocks;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory store with reversible, id-bound "sealing"
    #[derive(Default)]
    struct MemoryStore {
        documents: Mutex<HashMap<String, KeychainDocument>>,
        locks: KeychainLocks,
        saves: AtomicUsize,
        fail_saves: AtomicBool,
    }

    impl DocumentStore for MemoryStore {
        fn backend_name(&self) -> &'static str {
            "memory"
        }

        async fn load(&self, keychain: &str) -> Result<Option<KeychainDocument>> {
            Ok(self.documents.lock().unwrap().get(keychain).cloned())
        }

        async fn save(&self, keychain: &str, document: &KeychainDocument) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(KeychainError::backend("save", "disk full"));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.documents
                .lock()
                .unwrap()
                .insert(keychain.to_string(), document.clone());
            Ok(())
        }

        async fn remove(&self, keychain: &str) -> Result<bool> {
            Ok(self.documents.lock().unwrap().remove(keychain).is_some())
        }

        fn seal(&self, item_id: &Uuid, plaintext: &[u8]) -> Result<String> {
            Ok(format!("{item_id}:{}", STANDARD.encode(plaintext)))
        }

        fn unseal(&self, item_id: &Uuid, sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
            let payload = sealed
                .strip_prefix(&format!("{item_id}:"))
                .ok_or_else(|| KeychainError::DecryptionFailed("wrong item".into()))?;
            Ok(Zeroizing::new(STANDARD.decode(payload).unwrap()))
        }

        fn locks(&self) -> &KeychainLocks {
            &self.locks
        }
    }

    fn identity(label: &str) -> Identity {
        crate::generation::IdentityGenerator::new(label)
            .include_hostname(false)
            .generate()
            .unwrap()
    }

    #[tokio::test]
    async fn test_password_overwrite_keeps_single_item() {
        let store = MemoryStore::default();
        let credential = HttpCredential::default();

        assert!(
            store
                .find_generic_password("login", &credential)
                .await
                .unwrap()
                .is_none()
        );
        store
            .set_generic_password("login", &credential, "first")
            .await
            .unwrap();
        store
            .set_generic_password("login", &credential, "second")
            .await
            .unwrap();

        let found = store
            .find_generic_password("login", &credential)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.as_str(), "second");
        let items = store.items("login").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].class, KeychainAttrType::GenericPassword);
        assert_eq!(items[0].item_type, ExternalItemType::Unknown);

        let raw = store.documents.lock().unwrap()["login"].items[0].data.clone();
        assert!(raw.starts_with(&items[0].id.to_string()));

        assert!(store.delete_generic_password("login", &credential).await.unwrap());
        assert!(!store.delete_generic_password("login", &credential).await.unwrap());
    }

    #[tokio::test]
    async fn test_identity_items_are_linked() {
        let store = MemoryStore::default();
        let id = identity("DynamoSSL");
        store.add_identity("DynamoSSL", &id).await.unwrap();

        let items = store.items("DynamoSSL").await.unwrap();
        assert_eq!(items.len(), 2);
        let cert = items
            .iter()
            .find(|i| i.class == KeychainAttrType::Certificate)
            .unwrap();
        let key = items
            .iter()
            .find(|i| i.class == KeychainAttrType::PrivateKey)
            .unwrap();
        assert_eq!(
            key.attributes.get(ATTR_CERTIFICATE),
            Some(&cert.id.to_string())
        );
        assert_eq!(cert.item_type, ExternalItemType::Certificate);
        assert_eq!(key.item_type, ExternalItemType::PrivateKey);

        let loaded = store.identities("DynamoSSL").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].certificate(), id.certificate());
        assert_eq!(loaded[0].private_key().as_bytes(), id.private_key().as_bytes());
        assert!(store.certificates("DynamoSSL").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_identities_by_label_keeps_others() {
        let store = MemoryStore::default();
        store.add_identity("k", &identity("one")).await.unwrap();
        store.add_identity("k", &identity("two")).await.unwrap();
        let loose = identity("loose").certificate().clone();
        store.add_certificate("k", "loose", &loose).await.unwrap();

        assert_eq!(store.delete_identities("k", Some("one")).await.unwrap(), 1);
        let left = store.identities("k").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].label(), "two");
        assert_eq!(store.certificates("k").await.unwrap(), vec![loose]);

        assert_eq!(store.delete_identities("k", None).await.unwrap(), 1);
        assert_eq!(store.items("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_items_is_one_write() {
        let store = MemoryStore::default();
        let loose = identity("ca").certificate().clone();
        store
            .add_items(
                "batch",
                &[identity("a"), identity("b")],
                &[("ca".to_string(), loose.clone())],
            )
            .await
            .unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert_eq!(store.identities("batch").await.unwrap().len(), 2);
        assert_eq!(store.certificates("batch").await.unwrap(), vec![loose]);

        store.fail_saves.store(true, Ordering::SeqCst);
        assert!(
            store
                .add_items("batch", &[identity("c")], &[])
                .await
                .is_err()
        );
        store.fail_saves.store(false, Ordering::SeqCst);
        assert_eq!(store.items("batch").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_orphan_key_is_skipped() {
        let store = MemoryStore::default();
        store.add_identity("k", &identity("x")).await.unwrap();
        {
            let mut documents = store.documents.lock().unwrap();
            let document = documents.get_mut("k").unwrap();
            document
                .items
                .retain(|item| item.class != KeychainAttrType::Certificate);
        }
        assert!(store.identities("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_newer_layout_is_rejected() {
        let store = MemoryStore::default();
        store
            .save(
                "future",
                &KeychainDocument {
                    format_version: FORMAT_VERSION + 1,
                    items: Vec::new(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            store.items("future").await,
            Err(KeychainError::StorageBackendError { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_keychain_name_rejected() {
        let store = MemoryStore::default();
        assert!(matches!(
            store.identities("../etc").await,
            Err(KeychainError::InvalidKeychainName(_))
        ));
    }
}
