//! The in-memory record of one provisioned instance.

use scour_common::template::RenderVars;
use scour_providers::CreatedInstance;

/// One provisioned host and its derived runtime state. Populated by the
/// orchestrator, then moved into its session worker, which is the only
/// mutator from that point on.
#[derive(Debug)]
pub struct Machine {
    /// Provider-assigned id. Immutable.
    pub id: String,
    /// 1-based creation-order position. Immutable.
    pub index: usize,
    /// `index` zero-padded to the width of the fleet size, used for
    /// output-file naming and log tags.
    pub index_label: String,
    /// Human-readable label, unique within a run.
    pub name: String,
    /// Public IPv4; empty until the provider reports one, then fixed.
    address: String,
    /// Port bucket assigned to this instance; empty when port distribution
    /// is off.
    pub assigned_ports: String,
}

impl Machine {
    pub fn new(created: CreatedInstance, index: usize, fleet_size: usize) -> Self {
        Self {
            id: created.id,
            index,
            index_label: zero_pad(fleet_size, index),
            name: created.name,
            address: String::new(),
            assigned_ports: String::new(),
        }
    }

    /// An instance is ready once it has an address.
    pub fn is_ready(&self) -> bool {
        !self.address.is_empty()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Records the observed address. Write-once: later calls are ignored so
    /// the address never changes after first assignment.
    pub fn set_address(&mut self, address: String) {
        if self.address.is_empty() {
            self.address = address;
        }
    }

    /// Log prefix identifying this instance on the shared console.
    pub fn tag(&self) -> String {
        format!("{} ({})", self.name, self.index_label)
    }

    pub fn render_vars(&self) -> RenderVars<'_> {
        RenderVars {
            index: &self.index_label,
            address: &self.address,
            name: &self.name,
            ports: &self.assigned_ports,
        }
    }
}

/// Zero pads `idx` to the number of digits in `total`, so file listings
/// sort in creation order.
pub fn zero_pad(total: usize, idx: usize) -> String {
    let width = total.to_string().len();
    format!("{:0width$}", idx, width = width)
}
