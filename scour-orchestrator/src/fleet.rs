//! The fleet orchestrator: provisioning per the region plan, concurrent
//! session workers, and the teardown path that must cover every instance
//! the provider ever confirmed, however the run ends.

use std::sync::Arc;

use anyhow::{Context, Result};
use scour_common::{ports, region, RunConfig};
use scour_providers::CloudProvider;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::machine::Machine;
use crate::ssh::RemoteShell;
use crate::worker::{self, Outcome, WorkerContext, WorkerReport};

/// The minimum needed to delete an instance, snapshotted before workers
/// take ownership of the full records.
#[derive(Debug, Clone)]
pub struct TeardownTarget {
    pub id: String,
    pub name: String,
}

pub fn teardown_targets(machines: &[Machine]) -> Vec<TeardownTarget> {
    machines
        .iter()
        .map(|m| TeardownTarget {
            id: m.id.clone(),
            name: m.name.clone(),
        })
        .collect()
}

/// Resolves the region plan and issues one batched create call per region.
/// Results are appended to the fleet immediately, so if a later call fails
/// the teardown covers exactly what was created.
pub async fn provision(
    config: &RunConfig,
    provider: &Arc<dyn CloudProvider>,
    key_fingerprint: &str,
) -> Result<Vec<Machine>> {
    let available = provider
        .list_regions()
        .await
        .context("could not list provider regions")?;
    let plan = region::allocate(&available, &config.region_selector, config.instance_count)?;

    info!(
        "creating {} instance(s) across {} region(s)",
        config.instance_count,
        plan.len()
    );

    let mut created = Vec::with_capacity(config.instance_count);
    for (region_slug, count) in &plan {
        info!("creating {} instance(s) in region {}", count, region_slug);
        match provider
            .create_instances(&config.name_prefix, region_slug, key_fingerprint, *count)
            .await
        {
            Ok(batch) => created.extend(batch),
            Err(e) => {
                error!(
                    "instance creation failed in region {}: {:#}",
                    region_slug, e
                );
                let targets: Vec<TeardownTarget> = created
                    .iter()
                    .map(|c| TeardownTarget {
                        id: c.id.clone(),
                        name: c.name.clone(),
                    })
                    .collect();
                info!(
                    "attempting cleanup of {} already-created instance(s)",
                    targets.len()
                );
                let failures = teardown(provider.as_ref(), &targets).await;
                if failures > 0 {
                    warn!("{} instance(s) may need manual cleanup", failures);
                }
                return Err(e).context(format!("provisioning failed in region {}", region_slug));
            }
        }
    }

    // Indexes are 1..N in provider-return order, fixed before any worker
    // starts.
    let fleet_size = created.len();
    Ok(created
        .into_iter()
        .enumerate()
        .map(|(i, c)| Machine::new(c, i + 1, fleet_size))
        .collect())
}

/// Launches one session worker per machine and blocks until every worker
/// reaches a terminal state. Reports come back sorted by instance index.
pub async fn execute(
    mut machines: Vec<Machine>,
    config: Arc<RunConfig>,
    provider: Arc<dyn CloudProvider>,
    shell: Arc<dyn RemoteShell>,
) -> Result<Vec<WorkerReport>> {
    if let Some(spec) = &config.port_spec {
        let buckets = ports::split_contiguous(spec, machines.len())?;
        for (machine, bucket) in machines.iter_mut().zip(buckets) {
            machine.assigned_ports = bucket;
        }
    }

    let mut stdin_senders = Vec::new();
    let mut set = JoinSet::new();
    for machine in machines {
        let stdin = if config.forward_stdin {
            let (tx, rx) = mpsc::channel(1);
            stdin_senders.push(tx);
            Some(rx)
        } else {
            None
        };
        let ctx = WorkerContext {
            config: config.clone(),
            provider: provider.clone(),
            shell: shell.clone(),
            stdin,
        };
        set.spawn(worker::run(machine, ctx));
    }

    if config.forward_stdin {
        tokio::spawn(broadcast_bytes(tokio::io::stdin(), stdin_senders));
    }

    let mut reports = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => warn!("worker task failed to join: {}", e),
        }
    }
    reports.sort_by_key(|r| r.index);
    Ok(reports)
}

/// Broadcasts every byte read from `source` to all workers synchronously:
/// each channel has capacity one, so the send completes only once that
/// worker has consumed the previous byte. A slow worker therefore throttles
/// delivery to all, keeping keystrokes simultaneous rather than buffered
/// per consumer.
pub async fn broadcast_bytes<R>(mut source: R, senders: Vec<mpsc::Sender<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1];
    loop {
        match source.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                for tx in &senders {
                    // A closed receiver just means that worker already
                    // finished.
                    let _ = tx.send(buf[0]).await;
                }
            }
        }
    }
}

/// Deletes every target, logging per-instance success or failure. One
/// delete failure never blocks attempts on the rest; the console record is
/// the operator's manual-cleanup list. An empty set performs no provider
/// calls. Returns the number of failed deletions.
pub async fn teardown(provider: &dyn CloudProvider, targets: &[TeardownTarget]) -> usize {
    let mut failures = 0;
    for target in targets {
        match provider.delete_instance(&target.id).await {
            Ok(true) => info!("deleted instance {}", target.name),
            Ok(false) => {
                failures += 1;
                warn!(
                    "could not delete instance {} ({}): provider refused",
                    target.name, target.id
                );
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "could not delete instance {} ({}): {:#}",
                    target.name, target.id, e
                );
            }
        }
    }
    failures
}

/// The full run: validate, provision, execute, then hold the fleet alive
/// until the operator interrupt destroys it. "Run commands" and "destroy
/// resources" are deliberately operator-separated steps.
pub async fn run(
    config: RunConfig,
    provider: Arc<dyn CloudProvider>,
    shell: Arc<dyn RemoteShell>,
    key_fingerprint: &str,
) -> Result<()> {
    config.validate()?;
    if let Some(spec) = &config.port_spec {
        // Surface an unsplittable port spec before anything is created.
        ports::split_contiguous(spec, config.instance_count)?;
    }

    let config = Arc::new(config);
    let machines = provision(&config, &provider, key_fingerprint).await?;
    let targets = teardown_targets(&machines);

    // Interrupt path, installed before any worker starts: safe to trigger
    // from any point, tears down the whole fleet and exits.
    {
        let config = config.clone();
        let provider = provider.clone();
        let targets = targets.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, terminating fleet...");
                if config.forward_stdin {
                    crate::console::restore().await;
                }
                let failures = teardown(provider.as_ref(), &targets).await;
                if failures > 0 {
                    warn!("{} instance(s) may need manual cleanup", failures);
                }
                std::process::exit(0);
            }
        });
    }

    info!("fleet deployed; press ctrl-c at any time to destroy it");

    let reports = match execute(machines, config.clone(), provider.clone(), shell).await {
        Ok(reports) => reports,
        Err(e) => {
            // Keep teardown deterministic even when the run itself fails.
            error!("run failed: {:#}", e);
            teardown(provider.as_ref(), &targets).await;
            return Err(e);
        }
    };

    let completed = reports
        .iter()
        .filter(|r| r.outcome == Outcome::Completed)
        .count();
    info!(
        "all commands have been run: {}/{} completed",
        completed,
        reports.len()
    );
    for report in &reports {
        if let Outcome::Failed(reason) = &report.outcome {
            warn!("{}: failed: {}", report.name, reason);
        }
    }

    // Hold the fleet for inspection; the ctrl-c task owns teardown and
    // process exit.
    info!("press ctrl-c to destroy the fleet");
    std::future::pending::<()>().await;
    unreachable!("pending future resolved");
}
