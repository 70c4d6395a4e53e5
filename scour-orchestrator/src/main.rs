//! scour: deploy a fleet of disposable cloud instances and run a templated
//! command on each over SSH. Built for parallel network-scanning workloads
//! spread across many short-lived hosts.

use anyhow::Result;
use clap::Parser;
use scour_common::RunConfig;
use scour_orchestrator::{console, fleet, keys::SshCredential, ssh::OpenSsh};
use scour_providers::CloudProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[cfg(not(feature = "provider-digitalocean"))]
compile_error!("the scour binary needs a cloud provider; enable the provider-digitalocean feature");

use scour_providers::digitalocean::DigitalOceanProvider;

/// Deploy a fleet of disposable cloud instances and run a templated command
/// on each over SSH. The fleet stays alive after the commands finish until
/// you press ctrl-c.
#[derive(Parser, Debug)]
#[command(name = "scour", version, about)]
struct Cli {
    /// Number of instances to deploy
    #[arg(long, default_value_t = 5)]
    count: usize,

    /// Instance name prefix
    #[arg(long, default_value = "scour")]
    name: String,

    /// Comma-separated regions to deploy to; "*" means all available
    #[arg(long, default_value = "*")]
    regions: String,

    /// Templated command to run on each instance; substitutes {{index}},
    /// {{address}}, {{name}} and {{ports}}
    #[arg(long)]
    cmd: String,

    /// Comma-separated packages to install first; pass an empty string to
    /// skip the install step
    #[arg(long, default_value = "nmap")]
    pkg: String,

    /// nmap-style port list, split into one contiguous bucket per instance
    /// and exposed to the command template as {{ports}}
    #[arg(long)]
    ports: Option<String>,

    /// Per-instance output file template for remote stdout
    #[arg(long, default_value = "out-{{index}}.xml")]
    out: String,

    /// SSH private key location
    #[arg(long, default_value = "~/.ssh/id_rsa")]
    key_location: String,

    /// DigitalOcean API token
    #[arg(long, env = "DOTOKEN", hide_env_values = true)]
    token: String,

    /// Forward operator keystrokes to every instance's running command
    #[arg(long)]
    interactive: bool,

    /// Bypass the 50-instance safety cap
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_env("SCOUR_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let credential = SshCredential::load(&cli.key_location).await?;

    let config = RunConfig {
        instance_count: cli.count,
        name_prefix: cli.name,
        region_selector: cli.regions,
        command_template: cli.cmd,
        packages: cli
            .pkg
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect(),
        port_spec: cli.ports,
        output_template: cli.out,
        forward_stdin: cli.interactive,
        safety_override: cli.force,
        poll_interval: Duration::from_secs(5),
        connect_backoff: Duration::from_secs(10),
    };

    if config.forward_stdin {
        console::enable_raw().await;
    }

    let provider: Arc<dyn CloudProvider> = Arc::new(DigitalOceanProvider::new(cli.token));
    let shell = Arc::new(OpenSsh::new(credential.clone()));
    fleet::run(config, provider, shell, &credential.fingerprint).await
}
