//! Certificates, private keys and SSL identities
//!
//! An [`Identity`] pairs a certificate with the private key whose public half
//! appears in it. [`SslCredentials`] is what a TLS server needs: one identity
//! followed by any further certificates kept in the same keychain.

use crate::{KeychainError, Result};
use chrono::{DateTime, Utc};
use rustls::pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};
use zeroize::Zeroizing;

/// Details extracted from a certificate when it is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    /// Subject common name
    pub common_name: Option<String>,
    /// Subject organization
    pub organization: Option<String>,
    /// Serial number as colon-separated hex
    pub serial: String,
    /// Start of the validity window
    pub not_before: DateTime<Utc>,
    /// End of the validity window
    pub not_after: DateTime<Utc>,
    /// Whether basic constraints mark this as a CA
    pub is_ca: bool,
    /// Whether subject and issuer are identical
    pub self_signed: bool,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
    /// IP subject alternative names
    pub ip_addresses: Vec<IpAddr>,
    /// SHA-256 of the DER encoding, upper-case hex
    pub sha256_fingerprint: String,
    /// DER-encoded SubjectPublicKeyInfo
    #[serde(skip)]
    pub subject_public_key_info: Vec<u8>,
}

/// X.509 certificate
#[derive(Clone)]
pub struct Certificate {
    der: CertificateDer<'static>,
    info: CertificateInfo,
}

impl Certificate {
    /// Load a DER-encoded certificate
    ///
    /// # Errors
    ///
    /// Returns `CertificateParsing` if the bytes are not a valid X.509 certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let der = CertificateDer::from(der.into());
        let info = parse_certificate_info(&der)?;
        Ok(Self { der, info })
    }

    /// Load the first certificate of a PEM document
    ///
    /// # Errors
    ///
    /// Returns `CertificateParsing` if the document holds no valid certificate.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let der = rustls_pemfile::certs(&mut pem.as_bytes())
            .next()
            .ok_or_else(|| KeychainError::CertificateParsing("No certificate in PEM data".into()))?
            .map_err(|e| KeychainError::CertificateParsing(format!("Failed to parse PEM: {e}")))?;
        let info = parse_certificate_info(&der)?;
        Ok(Self { der, info })
    }

    /// DER encoding
    #[must_use]
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// DER bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.der.as_ref()
    }

    /// PEM encoding
    #[must_use]
    pub fn to_pem(&self) -> String {
        encode_pem("CERTIFICATE", self.as_bytes())
    }

    /// Parsed details
    #[must_use]
    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    /// Whether `at` falls inside the validity window
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.info.not_before <= at && at <= self.info.not_after
    }

    /// Whether the certificate is valid right now
    #[must_use]
    pub fn is_currently_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.info.common_name)
            .field("not_after", &self.info.not_after)
            .field("sha256_fingerprint", &self.info.sha256_fingerprint)
            .finish()
    }
}

fn parse_certificate_info(der: &[u8]) -> Result<CertificateInfo> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| KeychainError::CertificateParsing(format!("X.509 parsing failed: {e}")))?;

    let subject = cert.subject();
    let common_name = subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned);
    let organization = subject
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned);

    let validity = cert.validity();
    let not_before = utc_from_timestamp(validity.not_before.timestamp())?;
    let not_after = utc_from_timestamp(validity.not_after.timestamp())?;

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        ip_addresses.push(ip);
                    }
                }
                _ => {}
            }
        }
    }

    Ok(CertificateInfo {
        common_name,
        organization,
        serial: cert.tbs_certificate.raw_serial_as_string(),
        not_before,
        not_after,
        is_ca: cert.is_ca(),
        self_signed: cert.subject().as_raw() == cert.issuer().as_raw(),
        dns_names,
        ip_addresses,
        sha256_fingerprint: hex::encode_upper(Sha256::digest(der)),
        subject_public_key_info: cert.public_key().raw.to_vec(),
    })
}

fn utc_from_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        KeychainError::CertificateParsing(format!("validity timestamp {secs} out of range"))
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

pub(crate) fn encode_pem(tag: &str, contents: &[u8]) -> String {
    let config = pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF);
    pem::encode_config(&pem::Pem::new(tag, contents.to_vec()), config)
}

/// Encoding of private key DER
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivateKeyKind {
    /// PKCS#8 `PrivateKeyInfo`
    Pkcs8,
    /// PKCS#1 `RSAPrivateKey`
    Pkcs1,
    /// SEC1 `ECPrivateKey`
    Sec1,
}

impl PrivateKeyKind {
    fn pem_label(self) -> &'static str {
        match self {
            Self::Pkcs8 => "PRIVATE KEY",
            Self::Pkcs1 => "RSA PRIVATE KEY",
            Self::Sec1 => "EC PRIVATE KEY",
        }
    }
}

/// Private key material, wiped from memory on drop
#[derive(Clone)]
pub struct PrivateKey {
    kind: PrivateKeyKind,
    der: Zeroizing<Vec<u8>>,
}

impl PrivateKey {
    /// Wrap DER bytes of the given encoding
    #[must_use]
    pub fn new(kind: PrivateKeyKind, der: Vec<u8>) -> Self {
        Self {
            kind,
            der: Zeroizing::new(der),
        }
    }

    /// Wrap PKCS#8 DER bytes
    #[must_use]
    pub fn pkcs8(der: Vec<u8>) -> Self {
        Self::new(PrivateKeyKind::Pkcs8, der)
    }

    /// Convert from the rustls key representation
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrivateKey` for encodings this crate does not store.
    pub fn from_key_der(key: &PrivateKeyDer<'_>) -> Result<Self> {
        let kind = match key {
            PrivateKeyDer::Pkcs8(_) => PrivateKeyKind::Pkcs8,
            PrivateKeyDer::Pkcs1(_) => PrivateKeyKind::Pkcs1,
            PrivateKeyDer::Sec1(_) => PrivateKeyKind::Sec1,
            _ => {
                return Err(KeychainError::InvalidPrivateKey(
                    "unsupported private key encoding".to_string(),
                ));
            }
        };
        Ok(Self::new(kind, key.secret_der().to_vec()))
    }

    /// Load the first private key of a PEM document
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrivateKey` if the document holds no usable key.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = rustls_pemfile::private_key(&mut pem.as_bytes())
            .map_err(|e| KeychainError::InvalidPrivateKey(format!("Failed to parse PEM: {e}")))?
            .ok_or_else(|| KeychainError::InvalidPrivateKey("No private key in PEM data".into()))?;
        Self::from_key_der(&key)
    }

    /// DER encoding
    #[must_use]
    pub fn kind(&self) -> PrivateKeyKind {
        self.kind
    }

    /// Raw DER bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.der
    }

    /// Copy into the rustls key representation
    #[must_use]
    pub fn to_der(&self) -> PrivateKeyDer<'static> {
        let der = self.der.to_vec();
        match self.kind {
            PrivateKeyKind::Pkcs8 => PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)),
            PrivateKeyKind::Pkcs1 => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der)),
            PrivateKeyKind::Sec1 => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(der)),
        }
    }

    /// PEM encoding
    #[must_use]
    pub fn to_pem(&self) -> Zeroizing<String> {
        Zeroizing::new(encode_pem(self.kind.pem_label(), &self.der))
    }

    /// DER SubjectPublicKeyInfo of the public half, when the algorithm exposes it
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrivateKey` if the key cannot be loaded.
    pub fn public_key_info(&self) -> Result<Option<Vec<u8>>> {
        let provider = rustls::crypto::ring::default_provider();
        let signing_key = provider
            .key_provider
            .load_private_key(self.to_der())
            .map_err(|e| KeychainError::InvalidPrivateKey(e.to_string()))?;
        Ok(signing_key.public_key().map(|spki| spki.as_ref().to_vec()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("kind", &self.kind)
            .field("der", &"<redacted>")
            .finish()
    }
}

/// Certificate paired with its private key
#[derive(Clone, Debug)]
pub struct Identity {
    label: String,
    certificate: Certificate,
    private_key: PrivateKey,
    created_at: DateTime<Utc>,
}

impl Identity {
    /// Pair a certificate with its private key
    ///
    /// # Errors
    ///
    /// Returns `KeyMismatch` if the key's public half is not the one in the
    /// certificate, or `InvalidPrivateKey` if the key cannot be loaded.
    pub fn new(
        label: impl Into<String>,
        certificate: Certificate,
        private_key: PrivateKey,
    ) -> Result<Self> {
        let label = label.into();
        if !key_matches_certificate(&private_key, &certificate)? {
            return Err(KeychainError::KeyMismatch(format!(
                "key for {label:?} does not match certificate {}",
                certificate
                    .info()
                    .common_name
                    .as_deref()
                    .unwrap_or("<no common name>")
            )));
        }
        Ok(Self {
            label,
            certificate,
            private_key,
            created_at: Utc::now(),
        })
    }

    pub(crate) fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Label the identity is stored under
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Certificate
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Private key
    #[must_use]
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// When the identity was created or imported
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Whether the key's public half appears in the certificate
///
/// Keys whose algorithm cannot report a public key are assumed to match.
///
/// # Errors
///
/// Returns `InvalidPrivateKey` if the key cannot be loaded.
pub fn key_matches_certificate(key: &PrivateKey, certificate: &Certificate) -> Result<bool> {
    Ok(match key.public_key_info()? {
        Some(spki) => spki == certificate.info().subject_public_key_info,
        None => true,
    })
}

/// SSL identity plus the other certificates kept with it
#[derive(Clone, Debug)]
pub struct SslCredentials {
    identity: Identity,
    certificates: Vec<Certificate>,
}

impl SslCredentials {
    /// Combine an identity with additional certificates
    #[must_use]
    pub fn new(identity: Identity, certificates: Vec<Certificate>) -> Self {
        let certificates = certificates
            .into_iter()
            .filter(|c| c != identity.certificate())
            .collect();
        Self {
            identity,
            certificates,
        }
    }

    /// The identity
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Certificates other than the identity's own
    #[must_use]
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Identity certificate first, then the others
    #[must_use]
    pub fn certificate_chain(&self) -> Vec<CertificateDer<'static>> {
        std::iter::once(self.identity.certificate())
            .chain(&self.certificates)
            .map(|c| c.der().clone())
            .collect()
    }

    /// Server-side TLS configuration presenting this identity
    ///
    /// # Errors
    ///
    /// Returns `Tls` if rustls rejects the certificate chain or key.
    pub fn server_config(&self) -> Result<rustls::ServerConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(
                self.certificate_chain(),
                self.identity.private_key().to_der(),
            )?;
        Ok(config)
    }
}
