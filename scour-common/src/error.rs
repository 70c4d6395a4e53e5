use thiserror::Error;

/// Failures from the region allocator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("no eligible regions match selector {selector:?}")]
    NoEligibleRegions { selector: String },
}

/// Failures from the command template engine. Unknown references are a hard
/// error, never silently rendered as empty.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template variable {0:?} (supported: index, address, name, ports)")]
    UnknownVariable(String),
    #[error("unterminated {{{{...}}}} placeholder at byte {0}")]
    Unterminated(usize),
}

/// Failures from the port-range splitter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortSplitError {
    #[error("invalid port spec {0:?}")]
    InvalidSpec(String),
    #[error("cannot split {total} port(s) into {requested} buckets")]
    TooManyBuckets { total: usize, requested: usize },
}

/// Fatal configuration errors, reported before any instance is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("instance count must be at least 1")]
    ZeroInstances,
    #[error("instance count {0} exceeds the safety cap; pass --force to override")]
    SafetyCapExceeded(usize),
    #[error("a command template is required (--cmd)")]
    MissingCommand,
}
