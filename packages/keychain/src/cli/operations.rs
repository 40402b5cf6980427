//! Keychain operations behind the CLI subcommands
//!
//! Handlers write to `out` so output can be captured.

use super::commands::{IdentityCommand, PasswordCommand};
use anyhow::{Context, bail};
use dynamo_keychain::identity::{CertificateInfo, SslCredentials};
use dynamo_keychain::{Keychain, KeychainBackend, KeychainStorage};
use serde_json::json;
use std::io::{BufRead, Write};
use std::path::Path;
use zeroize::Zeroizing;

pub async fn handle_password<S: KeychainStorage>(
    keychain: &Keychain<S>,
    command: PasswordCommand,
    use_json: bool,
    input: impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        PasswordCommand::Get => match keychain.password_for_http_server().await? {
            Some(password) if use_json => {
                let value = json!({ "found": true, "password": password.as_str() });
                writeln!(out, "{value}")?;
            }
            Some(password) => writeln!(out, "{}", password.as_str())?,
            None if use_json => writeln!(out, "{}", json!({ "found": false }))?,
            None => bail!("no HTTP server password is stored"),
        },
        PasswordCommand::Set { password } => {
            let password = match password {
                Some(password) => Zeroizing::new(password),
                None => read_password_line(input)?,
            };
            keychain.set_password_for_http_server(&password).await?;
            if use_json {
                let value = json!({ "success": true, "operation": "password set" });
                writeln!(out, "{value}")?;
            } else {
                writeln!(out, "HTTP server password stored")?;
            }
        }
        PasswordCommand::Delete => {
            let removed = keychain.delete_http_password().await?;
            if use_json {
                writeln!(out, "{}", json!({ "removed": removed }))?;
            } else if removed {
                writeln!(out, "HTTP server password removed")?;
            } else {
                writeln!(out, "No HTTP server password was stored")?;
            }
        }
    }
    Ok(())
}

fn read_password_line(mut input: impl BufRead) -> anyhow::Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    input
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

fn certificate_json(info: &CertificateInfo) -> serde_json::Value {
    json!({
        "common_name": info.common_name,
        "organization": info.organization,
        "serial": info.serial,
        "not_before": info.not_before.to_rfc3339(),
        "not_after": info.not_after.to_rfc3339(),
        "dns_names": info.dns_names,
        "ip_addresses": info.ip_addresses,
        "sha256_fingerprint": info.sha256_fingerprint,
    })
}

fn print_credentials(
    out: &mut impl Write,
    keychain_name: &str,
    credentials: &SslCredentials,
    use_json: bool,
) -> std::io::Result<()> {
    let identity = credentials.identity();
    let info = identity.certificate().info();
    if use_json {
        let others: Vec<_> = credentials
            .certificates()
            .iter()
            .map(|c| certificate_json(c.info()))
            .collect();
        let value = json!({
            "keychain": keychain_name,
            "label": identity.label(),
            "created_at": identity.created_at().to_rfc3339(),
            "certificate": certificate_json(info),
            "certificates": others,
        });
        return writeln!(out, "{value}");
    }

    writeln!(out, "Keychain:     {keychain_name}")?;
    writeln!(out, "Label:        {}", identity.label())?;
    writeln!(
        out,
        "Subject:      CN={}",
        info.common_name.as_deref().unwrap_or("<none>")
    )?;
    writeln!(out, "Valid:        {} .. {}", info.not_before, info.not_after)?;
    writeln!(out, "DNS names:    {}", info.dns_names.join(", "))?;
    writeln!(out, "SHA-256:      {}", info.sha256_fingerprint)?;
    if !credentials.certificates().is_empty() {
        writeln!(out, "Other certificates: {}", credentials.certificates().len())?;
    }
    Ok(())
}

pub async fn handle_identity<S: KeychainStorage>(
    keychain: &Keychain<S>,
    command: IdentityCommand,
    use_json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        IdentityCommand::Create { keychain: name } => {
            let identity = keychain.create_new_identity(&name).await?;
            if use_json {
                let value = json!({
                    "keychain": name,
                    "label": identity.label(),
                    "certificate": certificate_json(identity.certificate().info()),
                });
                writeln!(out, "{value}")?;
            } else {
                writeln!(
                    out,
                    "Created identity in {name} (SHA-256 {})",
                    identity.certificate().info().sha256_fingerprint
                )?;
            }
        }
        IdentityCommand::Show { keychain: name } => {
            match keychain.ssl_identity_and_certificates(&name).await? {
                Some(credentials) => print_credentials(out, &name, &credentials, use_json)?,
                None if use_json => {
                    writeln!(out, "{}", json!({ "keychain": name, "found": false }))?;
                }
                None => bail!("no valid SSL identity in keychain {name}"),
            }
        }
        IdentityCommand::Ensure { keychain: name } => {
            let credentials = keychain.ensure_ssl_identity(&name).await?;
            print_credentials(out, &name, &credentials, use_json)?;
        }
        IdentityCommand::Export {
            keychain: name,
            output,
        } => {
            let Some(pem) = keychain.export_identity(&name).await? else {
                bail!("no valid SSL identity in keychain {name}");
            };
            match output {
                Some(path) => {
                    write_private_file(&path, pem.as_bytes())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    if use_json {
                        writeln!(out, "{}", json!({ "keychain": name, "output": path }))?;
                    } else {
                        writeln!(out, "Wrote {}", path.display())?;
                    }
                }
                None => write!(out, "{}", pem.as_str())?,
            }
        }
        IdentityCommand::Delete { keychain: name } => {
            let removed = keychain.delete_identities(&name).await?;
            if use_json {
                writeln!(out, "{}", json!({ "keychain": name, "removed": removed }))?;
            } else {
                writeln!(out, "Removed {removed} identities from {name}")?;
            }
        }
    }
    Ok(())
}

fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

pub async fn handle_import<S: KeychainStorage>(
    keychain: &Keychain<S>,
    name: &str,
    file: &Path,
    label: Option<&str>,
    use_json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let data = Zeroizing::new(
        tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?,
    );
    let summary = keychain.import(name, label, &data).await?;
    if use_json {
        let value = json!({
            "keychain": name,
            "format": summary.format.as_str(),
            "item_type": summary.item_type.as_str(),
            "identities": summary.identities,
            "certificates": summary.certificates,
        });
        writeln!(out, "{value}")?;
    } else {
        writeln!(
            out,
            "Imported {} identities and {} certificates ({}) into {name}",
            summary.identities, summary.certificates, summary.format
        )?;
    }
    Ok(())
}

pub async fn handle_list<S: KeychainStorage>(
    keychain: &Keychain<S>,
    name: &str,
    use_json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let items = keychain.items(name).await?;
    if use_json {
        let items: Vec<_> = items
            .iter()
            .map(|item| {
                json!({
                    "id": item.id,
                    "class": item.class.as_str(),
                    "item_type": item.item_type.as_str(),
                    "label": item.label,
                    "created_at": item.created_at.to_rfc3339(),
                    "attributes": item.attributes,
                })
            })
            .collect();
        writeln!(out, "{}", json!({ "keychain": name, "items": items }))?;
        return Ok(());
    }

    if items.is_empty() {
        writeln!(out, "Keychain {name} is empty")?;
    }
    for item in items {
        writeln!(
            out,
            "{}  {:<32}  {}  {}",
            item.id,
            item.class.as_str(),
            item.created_at.format("%Y-%m-%d %H:%M:%S"),
            item.label
        )?;
    }
    Ok(())
}

pub fn handle_list_keychains(
    keychain: &Keychain<KeychainBackend>,
    use_json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let names = keychain.keychain_names()?;
    if use_json {
        writeln!(out, "{}", json!({ "keychains": names }))?;
    } else if names.is_empty() {
        writeln!(out, "No keychains")?;
    } else {
        for name in names {
            writeln!(out, "{name}")?;
        }
    }
    Ok(())
}

pub fn handle_temp_dir<S: KeychainStorage>(
    keychain: &Keychain<S>,
    use_json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let dir = keychain.application_temporary_directory()?;
    if use_json {
        writeln!(out, "{}", json!({ "path": dir }))?;
    } else {
        writeln!(out, "{}", dir.display())?;
    }
    Ok(())
}
