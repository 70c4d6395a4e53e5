//! SSH credential loading. The private key itself stays on disk and is
//! handed to the `ssh` client by path; we only derive the MD5 fingerprint
//! the provider needs to authorize the key on new instances. Passphrase
//! prompts for encrypted keys stay on the ssh-keygen/ssh tty.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// A usable SSH identity: key location, remote user, and the provider-side
/// fingerprint of the public key.
#[derive(Debug, Clone)]
pub struct SshCredential {
    pub key_path: PathBuf,
    pub user: String,
    pub fingerprint: String,
}

impl SshCredential {
    pub async fn load(location: &str) -> Result<Self> {
        let key_path = expand_tilde(location);
        anyhow::ensure!(
            key_path.exists(),
            "ssh key not found at {}",
            key_path.display()
        );
        let fingerprint = md5_fingerprint(&key_path).await?;
        Ok(Self {
            key_path,
            user: "root".to_string(),
            fingerprint,
        })
    }
}

async fn md5_fingerprint(key_path: &Path) -> Result<String> {
    let output = Command::new("ssh-keygen")
        .args(["-E", "md5", "-l", "-f"])
        .arg(key_path)
        .output()
        .await
        .context("failed to run ssh-keygen")?;
    if !output.status.success() {
        anyhow::bail!(
            "ssh-keygen could not fingerprint {}: {}",
            key_path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_fingerprint_line(&String::from_utf8_lossy(&output.stdout))
}

/// Parses `ssh-keygen -l -E md5` output, e.g.
/// `2048 MD5:ab:cd:... user@host (RSA)`, into the bare colon-separated
/// fingerprint the provider API expects.
fn parse_fingerprint_line(line: &str) -> Result<String> {
    let field = line
        .split_whitespace()
        .nth(1)
        .context("unexpected ssh-keygen output")?;
    Ok(field.strip_prefix("MD5:").unwrap_or(field).to_string())
}

fn expand_tilde(location: &str) -> PathBuf {
    if let Some(rest) = location.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ssh_keygen_fingerprint_line() {
        let line = "2048 MD5:16:27:ac:a5:76:28:2d:36:63:1b:56:4d:eb:df:a6:48 user@host (RSA)\n";
        assert_eq!(
            parse_fingerprint_line(line).unwrap(),
            "16:27:ac:a5:76:28:2d:36:63:1b:56:4d:eb:df:a6:48"
        );
    }

    #[test]
    fn rejects_garbage_fingerprint_output() {
        assert!(parse_fingerprint_line("nonsense").is_err());
        assert!(parse_fingerprint_line("").is_err());
    }

    #[test]
    fn tilde_expands_against_home() {
        std::env::set_var("HOME", "/home/operator");
        assert_eq!(
            expand_tilde("~/.ssh/id_rsa"),
            PathBuf::from("/home/operator/.ssh/id_rsa")
        );
        assert_eq!(expand_tilde("/abs/key"), PathBuf::from("/abs/key"));
    }
}
