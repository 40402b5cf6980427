//! Import and export of certificates and keys in external formats

use crate::format::{ExternalFormat, ExternalItemType};
use crate::identity::{
    Certificate, Identity, PrivateKey, SslCredentials, key_matches_certificate,
};
use crate::{KeychainError, Result};
use log::debug;
use rustls::pki_types::PrivateKeyDer;
use rustls_pemfile::Item;
use serde::Serialize;
use x509_parser::prelude::{FromDer, X509Certificate};
use zeroize::Zeroizing;

/// Certificates and keys found in an external blob
#[derive(Debug)]
pub struct ParsedItems {
    /// Detected input format
    pub format: ExternalFormat,
    /// Certificates in input order
    pub certificates: Vec<Certificate>,
    /// Private keys in input order
    pub private_keys: Vec<PrivateKey>,
}

impl ParsedItems {
    /// Item type of each parsed item
    #[must_use]
    pub fn item_types(&self) -> Vec<ExternalItemType> {
        std::iter::repeat_n(ExternalItemType::Certificate, self.certificates.len())
            .chain(std::iter::repeat_n(
                ExternalItemType::PrivateKey,
                self.private_keys.len(),
            ))
            .collect()
    }
}

/// Outcome of an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Detected input format
    pub format: ExternalFormat,
    /// Single item type, or `Aggregate` for mixed input
    pub item_type: ExternalItemType,
    /// Identities stored
    pub identities: usize,
    /// Stand-alone certificates stored
    pub certificates: usize,
}

const PEM_BEGIN: &[u8] = b"-----BEGIN ";

/// Guess the external format of `data`
///
/// Text before and between PEM blocks (comments, `Bag Attributes`) is ignored.
#[must_use]
pub fn detect_format(data: &[u8]) -> ExternalFormat {
    let trimmed = data.trim_ascii_start();
    if trimmed.first() == Some(&0x30) {
        if X509Certificate::from_der(trimmed).is_ok() {
            return ExternalFormat::X509Cert;
        }
        if looks_like_pkcs12(trimmed) {
            return ExternalFormat::Pkcs12;
        }
    }
    match pem_blocks(data) {
        Some(blocks) => detect_pem_format(&blocks),
        None => ExternalFormat::Unknown,
    }
}

/// PEM blocks of `data`, or `None` if it has none
fn pem_blocks(data: &[u8]) -> Option<Vec<pem::Pem>> {
    let start = data
        .windows(PEM_BEGIN.len())
        .position(|window| window == PEM_BEGIN)?;
    pem::parse_many(&data[start..])
        .ok()
        .filter(|blocks| !blocks.is_empty())
}

fn detect_pem_format(blocks: &[pem::Pem]) -> ExternalFormat {
    match blocks {
        [] => ExternalFormat::Unknown,
        [single] => match single.tag() {
            "CERTIFICATE" | "X509 CERTIFICATE" | "TRUSTED CERTIFICATE" => {
                ExternalFormat::X509Cert
            }
            "PKCS7" => ExternalFormat::Pkcs7,
            "ENCRYPTED PRIVATE KEY" => ExternalFormat::WrappedPkcs8,
            "OPENSSH PRIVATE KEY" => ExternalFormat::SshV2,
            tag if tag.ends_with("PRIVATE KEY") => ExternalFormat::OpenSsl,
            _ => ExternalFormat::Unknown,
        },
        _ => ExternalFormat::PemSequence,
    }
}

/// DER SEQUENCE whose first element is INTEGER 3 (PFX version)
fn looks_like_pkcs12(der: &[u8]) -> bool {
    let Some(&len_byte) = der.get(1) else {
        return false;
    };
    let header = if len_byte < 0x80 {
        2
    } else {
        2 + usize::from(len_byte & 0x7f)
    };
    der.get(header..header + 3) == Some(&[0x02, 0x01, 0x03][..])
}

/// Extract certificates and private keys
///
/// # Errors
///
/// Returns `UnsupportedFormat` for formats other than DER certificates and
/// unencrypted PEM, or when nothing usable is found.
pub fn parse_items(data: &[u8]) -> Result<ParsedItems> {
    let format = detect_format(data);
    let mut parsed = ParsedItems {
        format,
        certificates: Vec::new(),
        private_keys: Vec::new(),
    };

    let blocks = pem_blocks(data);
    match format {
        ExternalFormat::X509Cert if blocks.is_none() => {
            parsed
                .certificates
                .push(Certificate::from_der(data.trim_ascii_start())?);
        }
        ExternalFormat::X509Cert | ExternalFormat::OpenSsl | ExternalFormat::PemSequence => {
            if let Some(tag) = blocks
                .iter()
                .flatten()
                .map(pem::Pem::tag)
                .find(|tag| is_protected_key_tag(tag))
            {
                return Err(KeychainError::UnsupportedFormat(format!(
                    "{tag} sections cannot be imported"
                )));
            }
            let mut reader = data;
            for item in rustls_pemfile::read_all(&mut reader) {
                let item = item.map_err(|e| {
                    KeychainError::CertificateParsing(format!("malformed PEM: {e}"))
                })?;
                match item {
                    Item::X509Certificate(der) => {
                        parsed.certificates.push(Certificate::from_der(der.to_vec())?);
                    }
                    Item::Pkcs8Key(key) => parsed
                        .private_keys
                        .push(PrivateKey::from_key_der(&PrivateKeyDer::Pkcs8(key))?),
                    Item::Pkcs1Key(key) => parsed
                        .private_keys
                        .push(PrivateKey::from_key_der(&PrivateKeyDer::Pkcs1(key))?),
                    Item::Sec1Key(key) => parsed
                        .private_keys
                        .push(PrivateKey::from_key_der(&PrivateKeyDer::Sec1(key))?),
                    other => debug!("Skipping unsupported PEM section: {other:?}"),
                }
            }
        }
        other => {
            return Err(KeychainError::UnsupportedFormat(format!(
                "{other} input cannot be imported"
            )));
        }
    }

    if parsed.certificates.is_empty() && parsed.private_keys.is_empty() {
        return Err(KeychainError::UnsupportedFormat(
            "no certificates or private keys found".to_string(),
        ));
    }
    Ok(parsed)
}

/// Key sections that would be silently skipped by the PEM reader
fn is_protected_key_tag(tag: &str) -> bool {
    matches!(tag, "ENCRYPTED PRIVATE KEY" | "OPENSSH PRIVATE KEY")
}

/// Pair each private key with the certificate carrying its public key
///
/// Identities are labelled `label`, or `label-N` when several keys are
/// present. Unpaired certificates are returned separately.
///
/// # Errors
///
/// Returns `KeyMismatch` if a key has no matching certificate.
pub fn pair_identities(
    label: &str,
    parsed: ParsedItems,
) -> Result<(Vec<Identity>, Vec<Certificate>)> {
    let ParsedItems {
        mut certificates,
        private_keys,
        ..
    } = parsed;
    let numbered = private_keys.len() > 1;

    let mut identities = Vec::with_capacity(private_keys.len());
    for (index, key) in private_keys.into_iter().enumerate() {
        let mut position = None;
        for (i, cert) in certificates.iter().enumerate() {
            if key_matches_certificate(&key, cert)? {
                position = Some(i);
                break;
            }
        }
        let Some(position) = position else {
            return Err(KeychainError::KeyMismatch(
                "private key has no matching certificate in the input".to_string(),
            ));
        };

        let certificate = certificates.remove(position);
        let identity_label = if numbered {
            format!("{label}-{}", index + 1)
        } else {
            label.to_string()
        };
        identities.push(Identity::new(identity_label, certificate, key)?);
    }
    Ok((identities, certificates))
}

/// `Aggregate` when more than one distinct item type is present
#[must_use]
pub fn summarize_item_types(types: &[ExternalItemType]) -> ExternalItemType {
    match types.split_first() {
        None => ExternalItemType::Unknown,
        Some((first, rest)) if rest.iter().all(|t| t == first) => *first,
        Some(_) => ExternalItemType::Aggregate,
    }
}

/// PEM bundle: certificate chain followed by the private key
#[must_use]
pub fn export_pem(credentials: &SslCredentials) -> Zeroizing<String> {
    let mut bundle = Zeroizing::new(credentials.identity().certificate().to_pem());
    for certificate in credentials.certificates() {
        bundle.push_str(&certificate.to_pem());
    }
    bundle.push_str(&credentials.identity().private_key().to_pem());
    bundle
}
