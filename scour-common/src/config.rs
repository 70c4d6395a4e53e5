//! The immutable run configuration. Built once at startup from the CLI and
//! environment, then shared by reference into the orchestrator and every
//! session worker. Nothing mutates it after construction.

use std::time::Duration;

use crate::error::ConfigError;

/// Refuse to deploy more than this many instances unless the operator
/// explicitly overrides. Guards against runaway cost from a typo.
pub const SAFETY_CAP: usize = 50;

/// Operator-supplied settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of instances to deploy.
    pub instance_count: usize,
    /// Instance name prefix; each instance gets a random suffix.
    pub name_prefix: String,
    /// `"*"` or a comma-separated region allow-list.
    pub region_selector: String,
    /// Command template rendered per instance (see `template`).
    pub command_template: String,
    /// Packages to install before running the command; empty skips install.
    pub packages: Vec<String>,
    /// nmap-style port spec to split across the fleet; `None` disables
    /// port distribution.
    pub port_spec: Option<String>,
    /// Template for per-instance output file paths.
    pub output_template: String,
    /// Forward operator keystrokes to every remote command's stdin.
    pub forward_stdin: bool,
    /// Bypass the safety cap.
    pub safety_override: bool,
    /// Address-poll interval while waiting for an instance to become ready.
    pub poll_interval: Duration,
    /// Backoff between SSH connection attempts.
    pub connect_backoff: Duration,
}

impl RunConfig {
    /// Fatal pre-provisioning checks. Nothing exists yet when these fail,
    /// so there is nothing to tear down.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_count == 0 {
            return Err(ConfigError::ZeroInstances);
        }
        if self.instance_count > SAFETY_CAP && !self.safety_override {
            return Err(ConfigError::SafetyCapExceeded(self.instance_count));
        }
        if self.command_template.trim().is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            instance_count: 5,
            name_prefix: "scour".to_string(),
            region_selector: "*".to_string(),
            command_template: String::new(),
            packages: vec!["nmap".to_string()],
            port_spec: None,
            output_template: "out-{{index}}.xml".to_string(),
            forward_stdin: false,
            safety_override: false,
            poll_interval: Duration::from_secs(5),
            connect_backoff: Duration::from_secs(10),
        }
    }
}
