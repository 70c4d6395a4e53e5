//! Remote-shell transport. The production implementation spawns the system
//! `ssh` client: host-key checking is disabled because every target is an
//! ephemeral, first-contact host that will be destroyed within hours.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::info;

use crate::keys::SshCredential;

/// Opens sessions to remote hosts.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Box<dyn RemoteSession>>;
}

/// One established session. Owned exclusively by a single session worker.
#[async_trait]
pub trait RemoteSession: Send {
    /// Runs a short setup command. Non-zero exit is an error carrying the
    /// remote stderr.
    async fn exec(&mut self, command: &str) -> Result<()>;

    /// Runs the main command: remote stdout goes to a file at
    /// `output_path`, remote stderr is drained line-by-line to the console
    /// prefixed with `tag`, and `stdin` (when present) feeds operator
    /// keystrokes to the remote process. Blocks until the remote command
    /// exits and returns its exit code.
    async fn run(
        &mut self,
        command: &str,
        output_path: &Path,
        tag: &str,
        stdin: Option<mpsc::Receiver<u8>>,
    ) -> Result<i32>;
}

pub struct OpenSsh {
    credential: SshCredential,
}

impl OpenSsh {
    pub fn new(credential: SshCredential) -> Self {
        Self { credential }
    }
}

fn ssh_command(credential: &SshCredential, address: &str) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-o")
        .arg("UserKnownHostsFile=/dev/null")
        .arg("-o")
        .arg("ConnectTimeout=10")
        .arg("-o")
        .arg("LogLevel=ERROR")
        .arg("-i")
        .arg(&credential.key_path)
        .arg(format!("{}@{}", credential.user, address));
    cmd
}

#[async_trait]
impl RemoteShell for OpenSsh {
    async fn connect(&self, address: &str) -> Result<Box<dyn RemoteSession>> {
        // Probe with a no-op command; sshd usually takes a few attempts to
        // come up after boot.
        let output = ssh_command(&self.credential, address)
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("failed to spawn ssh")?;
        if !output.status.success() {
            anyhow::bail!(
                "ssh connection to {} failed: {}",
                address,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(Box::new(OpenSshSession {
            credential: self.credential.clone(),
            address: address.to_string(),
        }))
    }
}

struct OpenSshSession {
    credential: SshCredential,
    address: String,
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn exec(&mut self, command: &str) -> Result<()> {
        let output = ssh_command(&self.credential, &self.address)
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .context("failed to spawn ssh")?;
        if !output.status.success() {
            anyhow::bail!(
                "remote command {:?} exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn run(
        &mut self,
        command: &str,
        output_path: &Path,
        tag: &str,
        stdin: Option<mpsc::Receiver<u8>>,
    ) -> Result<i32> {
        let sink = std::fs::File::create(output_path)
            .with_context(|| format!("could not create output file {}", output_path.display()))?;

        let mut cmd = ssh_command(&self.credential, &self.address);
        cmd.arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::from(sink))
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("failed to spawn ssh")?;

        if let Some(mut rx) = stdin {
            let mut child_stdin = child.stdin.take().context("no stdin pipe on ssh child")?;
            tokio::spawn(async move {
                while let Some(byte) = rx.recv().await {
                    if child_stdin.write_all(&[byte]).await.is_err() {
                        break;
                    }
                    let _ = child_stdin.flush().await;
                }
            });
        }

        // Drain stderr continuously until the remote side closes it, so
        // progress output (e.g. nmap status lines) reaches the operator.
        let stderr = child.stderr.take().context("no stderr pipe on ssh child")?;
        let stderr_tag = tag.to_string();
        let drain = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("{} 2>: {}", stderr_tag, line);
            }
        });

        let status = child.wait().await.context("ssh child wait failed")?;
        let _ = drain.await;
        Ok(status.code().unwrap_or(-1))
    }
}
