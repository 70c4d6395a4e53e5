//! Shared leaf logic for scour: the immutable run configuration, the error
//! taxonomy, and the pure planning helpers (region allocation, command
//! templating, port splitting). Nothing in this crate performs I/O.

pub mod config;
pub mod error;
pub mod ports;
pub mod region;
pub mod template;

pub use config::{RunConfig, SAFETY_CAP};
pub use error::{AllocationError, ConfigError, PortSplitError, TemplateError};
