//! Platform security constants and their descriptive names
//!
//! External formats, external item types and keychain item classes keep the raw
//! values used by the platform security framework so that values read from
//! other tools can be described verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Text returned for raw values that do not name a known constant
pub const UNKNOWN: &str = "Unknown";

macro_rules! platform_constants {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $raw:expr => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "u32", try_from = "u32")]
        #[repr(u32)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $raw, )+
        }

        impl $name {
            /// Every known constant, in declaration order
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// Look up a constant by its raw platform value
            #[must_use]
            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $( x if x == $raw => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Raw platform value
            #[must_use]
            pub fn raw(self) -> u32 {
                self as u32
            }

            /// Platform constant name
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.raw()
            }
        }

        impl TryFrom<u32> for $name {
            type Error = String;

            fn try_from(raw: u32) -> Result<Self, Self::Error> {
                Self::from_raw(raw)
                    .ok_or_else(|| format!("unknown {} value {raw:#x}", stringify!($name)))
            }
        }
    };
}

platform_constants! {
    /// Format of externally represented key and certificate material
    ExternalFormat {
        /// Format could not be determined
        Unknown = 0 => "kSecFormatUnknown",
        /// OpenSSL (PKCS#1 / SEC1) key
        OpenSsl = 1 => "kSecFormatOpenSSL",
        /// OpenSSH 1 key
        Ssh = 2 => "kSecFormatSSH",
        /// BSAFE key
        Bsafe = 3 => "kSecFormatBSAFE",
        /// Raw key bytes
        RawKey = 4 => "kSecFormatRawKey",
        /// Encrypted PKCS#8 key
        WrappedPkcs8 = 5 => "kSecFormatWrappedPKCS8",
        /// Encrypted OpenSSL key
        WrappedOpenSsl = 6 => "kSecFormatWrappedOpenSSL",
        /// Encrypted OpenSSH 1 key
        WrappedSsh = 7 => "kSecFormatWrappedSSH",
        /// Encrypted LSH key
        WrappedLsh = 8 => "kSecFormatWrappedLSH",
        /// Single DER or PEM X.509 certificate
        X509Cert = 9 => "kSecFormatX509Cert",
        /// Sequence of PEM items
        PemSequence = 10 => "kSecFormatPEMSequence",
        /// PKCS#7 certificate bundle
        Pkcs7 = 11 => "kSecFormatPKCS7",
        /// PKCS#12 archive
        Pkcs12 = 12 => "kSecFormatPKCS12",
        /// Netscape certificate sequence
        NetscapeCertSequence = 13 => "kSecFormatNetscapeCertSequence",
        /// OpenSSH 2 key
        SshV2 = 14 => "kSecFormatSSHv2",
    }
}

platform_constants! {
    /// Kind of item found in externally represented material
    ExternalItemType {
        /// Item kind could not be determined
        Unknown = 0 => "kSecItemTypeUnknown",
        /// Private key
        PrivateKey = 1 => "kSecItemTypePrivateKey",
        /// Public key
        PublicKey = 2 => "kSecItemTypePublicKey",
        /// Symmetric session key
        SessionKey = 3 => "kSecItemTypeSessionKey",
        /// Certificate
        Certificate = 4 => "kSecItemTypeCertificate",
        /// Several items of mixed kinds
        Aggregate = 5 => "kSecItemTypeAggregate",
    }
}

platform_constants! {
    /// Keychain item class, stored as a four-character code
    KeychainAttrType {
        /// Generic password (`genp`)
        GenericPassword = 0x6765_6e70 => "kSecGenericPasswordItemClass",
        /// Internet password (`inet`)
        InternetPassword = 0x696e_6574 => "kSecInternetPasswordItemClass",
        /// AppleShare password (`ashp`)
        AppleSharePassword = 0x6173_6870 => "kSecAppleSharePasswordItemClass",
        /// X.509 certificate
        Certificate = 0x8000_1000 => "kSecCertificateItemClass",
        /// Public key
        PublicKey = 0x0000_000f => "kSecPublicKeyItemClass",
        /// Private key
        PrivateKey = 0x0000_0010 => "kSecPrivateKeyItemClass",
        /// Symmetric key
        SymmetricKey = 0x0000_0011 => "kSecSymmetricKeyItemClass",
    }
}

impl ExternalItemType {
    /// Item type a keychain item class exports as
    #[must_use]
    pub fn for_item_class(class: KeychainAttrType) -> Self {
        match class {
            KeychainAttrType::Certificate => Self::Certificate,
            KeychainAttrType::PublicKey => Self::PublicKey,
            KeychainAttrType::PrivateKey => Self::PrivateKey,
            KeychainAttrType::SymmetricKey => Self::SessionKey,
            KeychainAttrType::GenericPassword
            | KeychainAttrType::InternetPassword
            | KeychainAttrType::AppleSharePassword => Self::Unknown,
        }
    }
}

impl KeychainAttrType {
    /// Parse a four-character code such as `inet`
    #[must_use]
    pub fn from_four_char_code(code: &str) -> Option<Self> {
        let bytes: [u8; 4] = code.as_bytes().try_into().ok()?;
        Self::from_raw(u32::from_be_bytes(bytes))
    }

    /// Four-character code, when every byte of the raw value is printable ASCII
    #[must_use]
    pub fn four_char_code(self) -> Option<String> {
        let bytes = self.raw().to_be_bytes();
        bytes
            .iter()
            .all(|b| b.is_ascii_graphic())
            .then(|| bytes.iter().map(|&b| char::from(b)).collect())
    }

    /// Classes whose payload is secret and must be sealed at rest
    #[must_use]
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            Self::GenericPassword
                | Self::InternetPassword
                | Self::AppleSharePassword
                | Self::PrivateKey
                | Self::SymmetricKey
        )
    }
}

/// Descriptive text for a raw external format value
#[must_use]
pub fn string_for_external_format(raw: u32) -> &'static str {
    ExternalFormat::from_raw(raw).map_or(UNKNOWN, ExternalFormat::as_str)
}

/// Descriptive text for a raw external item type value
#[must_use]
pub fn string_for_external_item_type(raw: u32) -> &'static str {
    ExternalItemType::from_raw(raw).map_or(UNKNOWN, ExternalItemType::as_str)
}

/// Descriptive text for a raw keychain attribute type value
#[must_use]
pub fn string_for_keychain_attr_type(raw: u32) -> &'static str {
    KeychainAttrType::from_raw(raw).map_or(UNKNOWN, KeychainAttrType::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_format_names() {
        assert_eq!(string_for_external_format(0), "kSecFormatUnknown");
        assert_eq!(string_for_external_format(9), "kSecFormatX509Cert");
        assert_eq!(string_for_external_format(10), "kSecFormatPEMSequence");
        assert_eq!(string_for_external_format(12), "kSecFormatPKCS12");
        assert_eq!(string_for_external_format(14), "kSecFormatSSHv2");
        assert_eq!(string_for_external_format(15), UNKNOWN);
        assert_eq!(ExternalFormat::ALL.len(), 15);
    }

    #[test]
    fn test_external_item_type_names() {
        assert_eq!(string_for_external_item_type(1), "kSecItemTypePrivateKey");
        assert_eq!(string_for_external_item_type(4), "kSecItemTypeCertificate");
        assert_eq!(string_for_external_item_type(5), "kSecItemTypeAggregate");
        assert_eq!(string_for_external_item_type(6), UNKNOWN);
    }

    #[test]
    fn test_keychain_attr_type_names() {
        assert_eq!(
            string_for_keychain_attr_type(0x696e_6574),
            "kSecInternetPasswordItemClass"
        );
        assert_eq!(
            string_for_keychain_attr_type(0x8000_1000),
            "kSecCertificateItemClass"
        );
        assert_eq!(string_for_keychain_attr_type(0x10), "kSecPrivateKeyItemClass");
        assert_eq!(string_for_keychain_attr_type(0xdead_beef), UNKNOWN);
    }

    #[test]
    fn test_four_char_codes() {
        assert_eq!(
            KeychainAttrType::from_four_char_code("inet"),
            Some(KeychainAttrType::InternetPassword)
        );
        assert_eq!(
            KeychainAttrType::GenericPassword.four_char_code().as_deref(),
            Some("genp")
        );
        assert_eq!(KeychainAttrType::Certificate.four_char_code(), None);
        assert_eq!(KeychainAttrType::from_four_char_code("toolong"), None);
    }

    #[test]
    fn test_item_class_serializes_as_raw_value() {
        let json = serde_json::to_string(&KeychainAttrType::PrivateKey).unwrap();
        assert_eq!(json, "16");
        let parsed: KeychainAttrType = serde_json::from_str("2147487744").unwrap();
        assert_eq!(parsed, KeychainAttrType::Certificate);
        assert!(serde_json::from_str::<KeychainAttrType>("1").is_err());
    }
}
