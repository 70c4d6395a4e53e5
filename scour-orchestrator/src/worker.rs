//! The per-instance session worker: drives one machine from "created" to a
//! terminal state. Every failure here belongs to this instance alone and is
//! logged with its identity; nothing propagates to sibling workers.

use std::path::PathBuf;
use std::sync::Arc;

use scour_common::{template, RunConfig};
use scour_providers::CloudProvider;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::machine::Machine;
use crate::ssh::RemoteShell;

/// Terminal state of one session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

#[derive(Debug)]
pub struct WorkerReport {
    pub index: usize,
    pub name: String,
    pub outcome: Outcome,
}

/// Everything a worker needs beyond its own machine record. The config is
/// immutable and shared; provider and shell tolerate concurrent use.
pub struct WorkerContext {
    pub config: Arc<RunConfig>,
    pub provider: Arc<dyn CloudProvider>,
    pub shell: Arc<dyn RemoteShell>,
    /// Operator keystroke channel when stdin fan-out is on.
    pub stdin: Option<mpsc::Receiver<u8>>,
}

/// Runs the worker to a terminal state. Never returns early on error: the
/// outcome is always reported so the orchestrator's join completes.
pub async fn run(mut machine: Machine, mut ctx: WorkerContext) -> WorkerReport {
    let tag = machine.tag();
    let stdin = ctx.stdin.take();
    let outcome = match drive(&mut machine, &ctx, stdin, &tag).await {
        Ok(()) => {
            info!("{}: done", tag);
            Outcome::Completed
        }
        Err(reason) => {
            error!("{}: {}", tag, reason);
            Outcome::Failed(reason)
        }
    };
    WorkerReport {
        index: machine.index,
        name: machine.name,
        outcome,
    }
}

async fn drive(
    machine: &mut Machine,
    ctx: &WorkerContext,
    stdin: Option<mpsc::Receiver<u8>>,
    tag: &str,
) -> Result<(), String> {
    // WaitingForAddress: poll until the provider reports an IPv4. Never
    // gives up on its own; a stuck instance is abandoned only through the
    // global interrupt and teardown.
    loop {
        match ctx.provider.get_instance_address(&machine.id).await {
            Ok(Some(address)) => {
                machine.set_address(address);
                info!("{}: IPv4 address: {}", tag, machine.address());
                break;
            }
            Ok(None) => info!(
                "{}: instance not ready yet, sleeping {:?}",
                tag, ctx.config.poll_interval
            ),
            Err(e) => warn!("{}: error polling for address: {:#}", tag, e),
        }
        sleep(ctx.config.poll_interval).await;
    }

    // Connecting: retry indefinitely. Transient unreachability right after
    // boot is expected and must not cost this host its place in the run.
    let mut session = loop {
        match ctx.shell.connect(machine.address()).await {
            Ok(session) => {
                info!("{}: SSH connection established", tag);
                break session;
            }
            Err(e) => {
                warn!(
                    "{}: SSH connect failed, retrying in {:?}: {:#}",
                    tag, ctx.config.connect_backoff, e
                );
                sleep(ctx.config.connect_backoff).await;
            }
        }
    };

    // Installing (optional): update then install, two sequential remote
    // commands. A non-zero exit from either is terminal for this instance.
    if !ctx.config.packages.is_empty() {
        info!(
            "{}: installing packages: {}",
            tag,
            ctx.config.packages.join(", ")
        );
        session
            .exec("apt-get update")
            .await
            .map_err(|e| format!("package index update failed: {:#}", e))?;
        let install = format!("apt-get install -y {}", ctx.config.packages.join(" "));
        session
            .exec(&install)
            .await
            .map_err(|e| format!("package install failed: {:#}", e))?;
    }

    // Running: render, open the output sink, block until the remote exits.
    let vars = machine.render_vars();
    let command = template::render(&ctx.config.command_template, &vars)
        .map_err(|e| format!("command template: {}", e))?;
    let output_path = PathBuf::from(
        template::render(&ctx.config.output_template, &vars)
            .map_err(|e| format!("output path template: {}", e))?,
    );

    info!("{}: running command: {}", tag, command);
    let code = session
        .run(&command, &output_path, tag, stdin)
        .await
        .map_err(|e| format!("remote execution failed: {:#}", e))?;
    if code != 0 {
        return Err(format!("remote command exited with status {}", code));
    }
    info!("{}: results: {}", tag, output_path.display());
    Ok(())
}
