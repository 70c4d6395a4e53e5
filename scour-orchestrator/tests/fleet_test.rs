// Scenario tests for the fleet orchestrator, driven by the in-memory mock
// provider and a scripted mock remote shell. No real cloud or SSH anywhere.

use anyhow::Result;
use async_trait::async_trait;
use scour_common::RunConfig;
use scour_orchestrator::fleet;
use scour_orchestrator::ssh::{RemoteSession, RemoteShell};
use scour_orchestrator::worker::Outcome;
use scour_providers::mock::MockProvider;
use scour_providers::CloudProvider;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct ShellState {
    /// Remaining connect attempts that must fail, per address.
    connect_failures: Mutex<HashMap<String, usize>>,
    connect_attempts: AtomicUsize,
    /// Addresses whose exec (install) step fails.
    exec_fail_addresses: Mutex<Vec<String>>,
    /// (address, command) in call order, exec and run alike.
    commands: Mutex<Vec<(String, String)>>,
}

#[derive(Clone, Default)]
struct MockShell {
    state: Arc<ShellState>,
}

impl MockShell {
    fn fail_connects(&self, address: &str, times: usize) {
        self.state
            .connect_failures
            .lock()
            .unwrap()
            .insert(address.to_string(), times);
    }

    fn fail_exec_for(&self, address: &str) {
        self.state
            .exec_fail_addresses
            .lock()
            .unwrap()
            .push(address.to_string());
    }

    fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    fn commands(&self) -> Vec<(String, String)> {
        self.state.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn connect(&self, address: &str) -> Result<Box<dyn RemoteSession>> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.state.connect_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(address) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("mock: connection refused to {}", address);
                }
            }
        }
        Ok(Box::new(MockSession {
            state: self.state.clone(),
            address: address.to_string(),
        }))
    }
}

struct MockSession {
    state: Arc<ShellState>,
    address: String,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(&mut self, command: &str) -> Result<()> {
        self.state
            .commands
            .lock()
            .unwrap()
            .push((self.address.clone(), command.to_string()));
        if self
            .state
            .exec_fail_addresses
            .lock()
            .unwrap()
            .contains(&self.address)
        {
            anyhow::bail!("mock: remote command exited with status 100");
        }
        Ok(())
    }

    async fn run(
        &mut self,
        command: &str,
        output_path: &Path,
        _tag: &str,
        _stdin: Option<mpsc::Receiver<u8>>,
    ) -> Result<i32> {
        self.state
            .commands
            .lock()
            .unwrap()
            .push((self.address.clone(), command.to_string()));
        std::fs::write(output_path, format!("ran: {}\n", command))?;
        Ok(0)
    }
}

/// Unique-per-test output template under the system temp dir.
fn out_template(test: &str) -> String {
    std::env::temp_dir()
        .join(format!(
            "scour-{}-{}-{{{{index}}}}.out",
            test,
            std::process::id()
        ))
        .to_string_lossy()
        .into_owned()
}

fn test_config(count: usize, test: &str) -> RunConfig {
    RunConfig {
        instance_count: count,
        name_prefix: "scour-test".to_string(),
        region_selector: "*".to_string(),
        command_template: "scan {{name}} at {{address}}".to_string(),
        packages: vec![],
        port_spec: None,
        output_template: out_template(test),
        forward_stdin: false,
        safety_override: false,
        poll_interval: Duration::from_millis(5),
        connect_backoff: Duration::from_millis(5),
    }
}

fn rendered_out_path(template: &str, index_label: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(template.replace("{{index}}", index_label))
}

// 5 requested instances, selector "*", 2 available regions.
#[tokio::test]
async fn five_instances_spread_across_two_regions() {
    let provider = Arc::new(MockProvider::new(&["region1", "region2"]));
    let provider_dyn: Arc<dyn CloudProvider> = provider.clone();

    let machines = fleet::provision(&test_config(5, "spread"), &provider_dyn, "fp")
        .await
        .unwrap();

    assert_eq!(machines.len(), 5);
    // Indexes are a contiguous 1..N sequence in creation order.
    let indexes: Vec<usize> = machines.iter().map(|m| m.index).collect();
    assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
    for m in &machines {
        assert!(m.name.starts_with("scour-test-"));
        assert!(!m.is_ready());
    }

    let per_region = provider.created_per_region();
    let counts: Vec<usize> = per_region.values().copied().collect();
    assert_eq!(counts.iter().sum::<usize>(), 5);
    assert_eq!(per_region.len(), 2);
    // Either {3,2} or {2,3}: sums exact, difference at most one.
    assert!(counts.iter().all(|c| *c == 2 || *c == 3));
}

// The second region's create call fails after the first region's 3
// instances succeeded.
#[tokio::test]
async fn partial_create_failure_tears_down_exactly_what_exists() {
    let provider = Arc::new(MockProvider::new(&["region1", "region2"]).fail_create_from_call(1));
    let provider_dyn: Arc<dyn CloudProvider> = provider.clone();

    let err = fleet::provision(&test_config(5, "partial"), &provider_dyn, "fp")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("provisioning failed"));

    // Exactly the 3 created instances were deleted: none omitted, none
    // invented.
    let created = provider.created_ids();
    assert_eq!(created.len(), 3);
    assert_eq!(provider.delete_log(), created);
    assert_eq!(provider.live_count(), 0);
}

// Connection attempts fail twice, succeed on the third; the worker still
// completes and its output file exists.
#[tokio::test]
async fn connect_retries_until_success_and_completes() {
    let provider = Arc::new(MockProvider::new(&["region1"]));
    let provider_dyn: Arc<dyn CloudProvider> = provider.clone();
    let config = test_config(1, "retry");

    let machines = fleet::provision(&config, &provider_dyn, "fp").await.unwrap();
    let shell = MockShell::default();
    shell.fail_connects("192.0.2.1", 2);

    let reports = fleet::execute(
        machines,
        Arc::new(config.clone()),
        provider_dyn,
        Arc::new(shell.clone()),
    )
    .await
    .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, Outcome::Completed);
    assert_eq!(shell.connect_attempts(), 3);

    let out = rendered_out_path(&config.output_template, "1");
    assert!(out.exists(), "output file {} missing", out.display());
    std::fs::remove_file(out).unwrap();
}

// The address poll keeps retrying while the provider reports not-ready;
// once an address appears the worker runs to completion.
#[tokio::test]
async fn address_poll_retries_until_ready_and_completes() {
    let provider = Arc::new(MockProvider::new(&["region1"]).ready_after_polls(3));
    let provider_dyn: Arc<dyn CloudProvider> = provider.clone();
    let config = test_config(1, "poll");

    let machines = fleet::provision(&config, &provider_dyn, "fp").await.unwrap();
    assert!(!machines[0].is_ready());
    let shell = MockShell::default();

    let reports = fleet::execute(
        machines,
        Arc::new(config.clone()),
        provider_dyn,
        Arc::new(shell.clone()),
    )
    .await
    .unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, Outcome::Completed);
    // The command only ran after the address became known.
    let cmds = shell.commands();
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].0, "192.0.2.1");
    assert!(cmds[0].1.starts_with("scan scour-test-"));
    assert!(cmds[0].1.ends_with("at 192.0.2.1"));

    let out = rendered_out_path(&config.output_template, "1");
    assert!(out.exists(), "output file {} missing", out.display());
    std::fs::remove_file(out).unwrap();
}

// A failed package install is terminal for that instance only; siblings
// run to completion and the join covers everyone.
#[tokio::test]
async fn install_failure_stays_local_to_its_instance() {
    let provider = Arc::new(MockProvider::new(&["region1"]));
    let provider_dyn: Arc<dyn CloudProvider> = provider.clone();
    let mut config = test_config(2, "install");
    config.packages = vec!["nmap".to_string()];

    let machines = fleet::provision(&config, &provider_dyn, "fp").await.unwrap();
    let shell = MockShell::default();
    shell.fail_exec_for("192.0.2.1");

    let reports = fleet::execute(
        machines,
        Arc::new(config.clone()),
        provider_dyn,
        Arc::new(shell.clone()),
    )
    .await
    .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(matches!(reports[0].outcome, Outcome::Failed(_)));
    assert_eq!(reports[1].outcome, Outcome::Completed);

    // The healthy instance ran update then install, in that order.
    let cmds: Vec<String> = shell
        .commands()
        .into_iter()
        .filter(|(addr, _)| addr == "192.0.2.2")
        .map(|(_, c)| c)
        .collect();
    assert_eq!(cmds[0], "apt-get update");
    assert_eq!(cmds[1], "apt-get install -y nmap");
    assert!(cmds[2].starts_with("scan "));

    let out = rendered_out_path(&config.output_template, "2");
    assert!(out.exists());
    std::fs::remove_file(out).unwrap();
}

// Port distribution: bucket i goes to instance i, exposed via {{ports}}.
#[tokio::test]
async fn port_buckets_are_assigned_by_index() {
    let provider = Arc::new(MockProvider::new(&["region1"]));
    let provider_dyn: Arc<dyn CloudProvider> = provider.clone();
    let mut config = test_config(4, "ports");
    config.command_template = "scan -p {{ports}}".to_string();
    config.port_spec = Some("1-100".to_string());

    let machines = fleet::provision(&config, &provider_dyn, "fp").await.unwrap();
    let shell = MockShell::default();

    let reports = fleet::execute(
        machines,
        Arc::new(config.clone()),
        provider_dyn,
        Arc::new(shell.clone()),
    )
    .await
    .unwrap();
    assert!(reports.iter().all(|r| r.outcome == Outcome::Completed));

    // Instance i (address 192.0.2.i) receives bucket i.
    let by_addr: HashMap<String, String> = shell.commands().into_iter().collect();
    assert_eq!(by_addr["192.0.2.1"], "scan -p 1-25");
    assert_eq!(by_addr["192.0.2.2"], "scan -p 26-50");
    assert_eq!(by_addr["192.0.2.3"], "scan -p 51-75");
    assert_eq!(by_addr["192.0.2.4"], "scan -p 76-100");

    for label in ["1", "2", "3", "4"] {
        let out = rendered_out_path(&config.output_template, label);
        assert!(out.exists());
        std::fs::remove_file(out).unwrap();
    }
}

// Teardown on an empty set performs no provider calls and succeeds.
#[tokio::test]
async fn teardown_of_empty_fleet_is_a_noop() {
    let provider = MockProvider::new(&["region1"]);
    let failures = fleet::teardown(&provider, &[]).await;
    assert_eq!(failures, 0);
    assert!(provider.delete_log().is_empty());
}

// One failed delete never blocks deletion attempts for the rest.
#[tokio::test]
async fn teardown_continues_past_failed_deletes() {
    let provider = Arc::new(MockProvider::new(&["region1"]));
    let provider_dyn: Arc<dyn CloudProvider> = provider.clone();
    let machines = fleet::provision(&test_config(2, "teardown"), &provider_dyn, "fp")
        .await
        .unwrap();

    let mut targets = fleet::teardown_targets(&machines);
    targets.insert(
        0,
        fleet::TeardownTarget {
            id: "mock-never-existed".to_string(),
            name: "ghost".to_string(),
        },
    );

    let failures = fleet::teardown(provider_dyn.as_ref(), &targets).await;
    assert_eq!(failures, 1);
    assert_eq!(provider.delete_log().len(), 3);
    assert_eq!(provider.live_count(), 0);
}

// The stdin broadcast is synchronous: every worker sees byte n before any
// worker sees byte n+1.
#[tokio::test]
async fn stdin_broadcast_is_synchronous_and_ordered() {
    let (tx1, mut rx1) = mpsc::channel::<u8>(1);
    let (tx2, mut rx2) = mpsc::channel::<u8>(1);
    let source = std::io::Cursor::new(b"ab".to_vec());

    let broadcaster = tokio::spawn(fleet::broadcast_bytes(source, vec![tx1, tx2]));

    assert_eq!(rx1.recv().await, Some(b'a'));
    assert_eq!(rx2.recv().await, Some(b'a'));
    assert_eq!(rx1.recv().await, Some(b'b'));
    assert_eq!(rx2.recv().await, Some(b'b'));
    // Senders dropped after EOF.
    assert_eq!(rx1.recv().await, None);
    assert_eq!(rx2.recv().await, None);

    broadcaster.await.unwrap();
}
