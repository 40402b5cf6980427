//! Self-signed SSL identity generation

use crate::config::IdentityConfig;
use crate::identity::{Certificate, Identity, PrivateKey};
use crate::{KeychainError, Result};
use chrono::{DateTime, Duration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, info};

/// Longest validity period accepted for a generated certificate (100 years)
pub const MAX_VALID_FOR_DAYS: u32 = 36_500;

/// Builder for self-signed server identities
#[derive(Debug, Clone)]
pub struct IdentityGenerator {
    label: String,
    common_name: Option<String>,
    organization: Option<String>,
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    include_hostname: bool,
    valid_for_days: u32,
    valid_from: Option<DateTime<Utc>>,
}

impl IdentityGenerator {
    /// Start a generator for an identity stored under `label`
    ///
    /// The common name defaults to the label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            common_name: None,
            organization: None,
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            include_hostname: true,
            valid_for_days: 365,
            valid_from: None,
        }
    }

    /// Start a generator with configured defaults
    pub fn from_config(label: impl Into<String>, config: &IdentityConfig) -> Self {
        let mut generator = Self::new(label)
            .organization(config.organization.clone())
            .include_hostname(config.include_hostname)
            .valid_for_days(config.valid_for_days);
        if let Some(cn) = &config.common_name {
            generator = generator.common_name(cn.clone());
        }
        for name in &config.extra_dns_names {
            generator = generator.dns_name(name.clone());
        }
        generator
    }

    /// Set the subject common name
    #[must_use]
    pub fn common_name(self, common_name: impl Into<String>) -> Self {
        Self {
            common_name: Some(common_name.into()),
            ..self
        }
    }

    /// Set the subject organization
    #[must_use]
    pub fn organization(self, organization: impl Into<String>) -> Self {
        Self {
            organization: Some(organization.into()),
            ..self
        }
    }

    /// Add a DNS subject alternative name
    #[must_use]
    pub fn dns_name(mut self, name: impl Into<String>) -> Self {
        self.dns_names.push(name.into());
        self
    }

    /// Add an IP subject alternative name
    #[must_use]
    pub fn ip_address(mut self, ip: IpAddr) -> Self {
        self.ip_addresses.push(ip);
        self
    }

    /// Whether to add the local host name as a DNS name
    #[must_use]
    pub fn include_hostname(self, include: bool) -> Self {
        Self {
            include_hostname: include,
            ..self
        }
    }

    /// Set validity period in days
    #[must_use]
    pub fn valid_for_days(self, days: u32) -> Self {
        Self {
            valid_for_days: days,
            ..self
        }
    }

    /// Start the validity window at `start` instead of one minute ago
    #[must_use]
    pub fn valid_from(self, start: DateTime<Utc>) -> Self {
        Self {
            valid_from: Some(start),
            ..self
        }
    }

    /// Execute identity generation
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a validity period outside
    /// `1..=MAX_VALID_FOR_DAYS` or an unusable subject alternative name, and
    /// `CertificateGeneration` if signing fails.
    pub fn generate(self) -> Result<Identity> {
        if !(1..=MAX_VALID_FOR_DAYS).contains(&self.valid_for_days) {
            return Err(KeychainError::InvalidInput(format!(
                "validity period must be between 1 and {MAX_VALID_FOR_DAYS} days, got {}",
                self.valid_for_days
            )));
        }

        let common_name = self.common_name.clone().unwrap_or_else(|| self.label.clone());
        let mut params = CertificateParams::new(Vec::default())?;

        let mut dn = DistinguishedName::new();
        if let Some(org) = &self.organization {
            dn.push(DnType::OrganizationName, org.as_str());
        }
        dn.push(DnType::CommonName, common_name.as_str());
        params.distinguished_name = dn;

        params.subject_alt_names = self.subject_alt_names()?;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.serial_number = Some(random_serial());

        let start = self
            .valid_from
            .unwrap_or_else(|| Utc::now() - Duration::minutes(1));
        let end = start
            .checked_add_signed(Duration::days(i64::from(self.valid_for_days)))
            .ok_or_else(|| {
                KeychainError::InvalidInput(format!("validity end after {start} is out of range"))
            })?;
        params.not_before = to_offset_date_time(start)?;
        params.not_after = to_offset_date_time(end)?;

        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;
        info!(
            "Generated self-signed identity {:?} (CN={common_name}, valid until {end})",
            self.label
        );

        let certificate = Certificate::from_der(cert.der().to_vec())?;
        let private_key = PrivateKey::pkcs8(key_pair.serialize_der());
        Identity::new(self.label, certificate, private_key)
    }

    fn subject_alt_names(&self) -> Result<Vec<SanType>> {
        let mut dns_names = vec!["localhost".to_string()];
        if self.include_hostname {
            match hostname::get().map(|h| h.to_str().map(str::to_ascii_lowercase)) {
                Ok(Some(host)) if !host.is_empty() => dns_names.push(host),
                other => debug!("Skipping host name subject alternative name: {other:?}"),
            }
        }
        dns_names.extend(self.dns_names.iter().cloned());
        dns_names.sort();
        dns_names.dedup();

        let mut ips = vec![
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
        ];
        for ip in &self.ip_addresses {
            if !ips.contains(ip) {
                ips.push(*ip);
            }
        }

        let mut sans = Vec::with_capacity(dns_names.len() + ips.len());
        for name in dns_names {
            let ia5 = name.as_str().try_into().map_err(|e| {
                KeychainError::InvalidInput(format!("invalid DNS name {name:?}: {e}"))
            })?;
            sans.push(SanType::DnsName(ia5));
        }
        sans.extend(ips.into_iter().map(SanType::IpAddress));
        Ok(sans)
    }
}

fn random_serial() -> SerialNumber {
    use rand::RngCore;

    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    // Keep the DER INTEGER positive and at full length
    bytes[0] = (bytes[0] & 0x7f) | 0x40;
    SerialNumber::from_slice(&bytes)
}

fn to_offset_date_time(at: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| KeychainError::InvalidInput(format!("validity date out of range: {e}")))
}
