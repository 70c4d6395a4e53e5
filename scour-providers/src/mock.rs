//! In-memory provider for tests: scriptable create failures and
//! address-readiness delays, with a recorded delete log so tests can assert
//! teardown called exactly the right set.

use crate::{instance_names, CloudProvider, CreatedInstance};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug)]
struct MockInstance {
    name: String,
    region: String,
    polls: u32,
    deleted: bool,
}

#[derive(Default)]
struct State {
    instances: HashMap<String, MockInstance>,
    create_calls: usize,
    creation_order: Vec<String>,
    delete_log: Vec<String>,
}

pub struct MockProvider {
    regions: Vec<String>,
    /// Create calls at or beyond this count fail (0-based).
    fail_create_from_call: Option<usize>,
    /// Address polls needed before an instance reports an IPv4.
    ready_after_polls: u32,
    state: Mutex<State>,
}

impl MockProvider {
    pub fn new(regions: &[&str]) -> Self {
        Self {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            fail_create_from_call: None,
            ready_after_polls: 1,
            state: Mutex::new(State::default()),
        }
    }

    /// Make the `n`-th create call (0-based) and all later ones fail.
    pub fn fail_create_from_call(mut self, n: usize) -> Self {
        self.fail_create_from_call = Some(n);
        self
    }

    pub fn ready_after_polls(mut self, polls: u32) -> Self {
        self.ready_after_polls = polls;
        self
    }

    /// Instance ids passed to delete, in call order.
    pub fn delete_log(&self) -> Vec<String> {
        self.state.lock().unwrap().delete_log.clone()
    }

    /// Instance ids in creation order.
    pub fn created_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().creation_order.clone()
    }

    pub fn live_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .instances
            .values()
            .filter(|i| !i.deleted)
            .count()
    }

    /// How many live-or-deleted instances each region received.
    pub fn created_per_region(&self) -> HashMap<String, usize> {
        let state = self.state.lock().unwrap();
        let mut counts = HashMap::new();
        for inst in state.instances.values() {
            *counts.entry(inst.region.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn list_regions(&self) -> Result<Vec<String>> {
        Ok(self.regions.clone())
    }

    async fn create_instances(
        &self,
        name_prefix: &str,
        region: &str,
        _key_fingerprint: &str,
        count: usize,
    ) -> Result<Vec<CreatedInstance>> {
        let mut state = self.state.lock().unwrap();
        let call = state.create_calls;
        state.create_calls += 1;
        if let Some(fail_from) = self.fail_create_from_call {
            if call >= fail_from {
                anyhow::bail!("mock create failure (call {})", call);
            }
        }

        let mut created = Vec::with_capacity(count);
        for name in instance_names(name_prefix, count) {
            let id = format!("mock-{}", uuid::Uuid::new_v4());
            state.instances.insert(
                id.clone(),
                MockInstance {
                    name: name.clone(),
                    region: region.to_string(),
                    polls: 0,
                    deleted: false,
                },
            );
            state.creation_order.push(id.clone());
            created.push(CreatedInstance { id, name });
        }
        Ok(created)
    }

    async fn get_instance_address(&self, id: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        let position = state.creation_order.iter().position(|i| i == id);
        let inst = state
            .instances
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("mock: unknown instance {}", id))?;
        inst.polls += 1;
        if inst.polls >= self.ready_after_polls {
            // Deterministic per-instance test address.
            let octet = position.unwrap_or(0) + 1;
            Ok(Some(format!("192.0.2.{}", octet)))
        } else {
            Ok(None)
        }
    }

    async fn delete_instance(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.delete_log.push(id.to_string());
        match state.instances.get_mut(id) {
            Some(inst) => {
                inst.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
