//! `describe` subcommand: raw platform values to names

use anyhow::{Context, bail};
use dynamo_keychain::format::{
    KeychainAttrType, UNKNOWN, string_for_external_format, string_for_external_item_type,
    string_for_keychain_attr_type,
};
use serde_json::json;

use super::commands::DescribeCommand;

/// Parse decimal or `0x`-prefixed hex
fn parse_raw(value: &str) -> anyhow::Result<u32> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => {
            u32::from_str_radix(hex, 16).with_context(|| format!("invalid hex value {value:?}"))
        }
        None => value
            .parse()
            .with_context(|| format!("invalid value {value:?}, expected decimal or 0x hex")),
    }
}

fn parse_attr_type(value: &str) -> anyhow::Result<u32> {
    if value.len() == 4
        && !value.starts_with("0x")
        && value.bytes().any(|b| !b.is_ascii_digit())
    {
        return match KeychainAttrType::from_four_char_code(value) {
            Some(class) => Ok(class.raw()),
            None => bail!("unknown four-character code {value:?}"),
        };
    }
    parse_raw(value)
}

/// Resolve a describe command to (kind, raw value, name)
pub fn describe(command: &DescribeCommand) -> anyhow::Result<(&'static str, u32, &'static str)> {
    Ok(match command {
        DescribeCommand::Format { value } => {
            let raw = parse_raw(value)?;
            ("format", raw, string_for_external_format(raw))
        }
        DescribeCommand::ItemType { value } => {
            let raw = parse_raw(value)?;
            ("item-type", raw, string_for_external_item_type(raw))
        }
        DescribeCommand::AttrType { value } => {
            let raw = parse_attr_type(value)?;
            ("attr-type", raw, string_for_keychain_attr_type(raw))
        }
    })
}

pub fn handle_describe(command: &DescribeCommand, use_json: bool) -> anyhow::Result<()> {
    let (kind, raw, name) = describe(command)?;
    if use_json {
        println!(
            "{}",
            json!({ "kind": kind, "value": raw, "name": name, "known": name != UNKNOWN })
        );
    } else {
        println!("{name}");
    }
    Ok(())
}
