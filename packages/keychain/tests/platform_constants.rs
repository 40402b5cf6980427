//! Raw platform constant naming

use dynamo_keychain::format::{
    ExternalFormat, ExternalItemType, KeychainAttrType, UNKNOWN, string_for_external_format,
    string_for_external_item_type, string_for_keychain_attr_type,
};
use proptest::prelude::*;

#[test]
fn test_every_known_constant_round_trips_its_name() {
    for format in ExternalFormat::ALL {
        assert_eq!(string_for_external_format(format.raw()), format.as_str());
        assert!(format.as_str().starts_with("kSecFormat"));
    }
    for item_type in ExternalItemType::ALL {
        assert_eq!(string_for_external_item_type(item_type.raw()), item_type.as_str());
    }
    for class in KeychainAttrType::ALL {
        assert_eq!(string_for_keychain_attr_type(class.raw()), class.as_str());
        assert!(class.as_str().ends_with("ItemClass"));
    }
}

#[test]
fn test_item_classes_of_identity_items() {
    assert_eq!(
        ExternalItemType::for_item_class(KeychainAttrType::Certificate),
        ExternalItemType::Certificate
    );
    assert_eq!(
        ExternalItemType::for_item_class(KeychainAttrType::PrivateKey),
        ExternalItemType::PrivateKey
    );
    assert!(KeychainAttrType::PrivateKey.is_secret());
    assert!(KeychainAttrType::InternetPassword.is_secret());
    assert!(!KeychainAttrType::Certificate.is_secret());
}

proptest! {
    #[test]
    fn prop_names_are_known_or_unknown(raw in any::<u32>()) {
        let name = string_for_external_format(raw);
        prop_assert_eq!(name == UNKNOWN, ExternalFormat::from_raw(raw).is_none());

        let name = string_for_external_item_type(raw);
        prop_assert_eq!(name == UNKNOWN, ExternalItemType::from_raw(raw).is_none());

        let name = string_for_keychain_attr_type(raw);
        prop_assert_eq!(name == UNKNOWN, KeychainAttrType::from_raw(raw).is_none());
    }
}
