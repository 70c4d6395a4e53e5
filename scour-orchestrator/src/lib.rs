//! Fleet provisioning & remote-execution orchestrator.
//!
//! Drives a fleet of disposable cloud instances from creation to command
//! completion: region allocation, concurrent per-instance session workers
//! (readiness polling, SSH connect with retry, optional package install,
//! templated command execution), and deterministic teardown on interrupt.

pub mod console;
pub mod fleet;
pub mod keys;
pub mod machine;
pub mod ssh;
pub mod worker;
