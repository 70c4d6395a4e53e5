use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;

/// One instance as confirmed by the provider's create call.
#[derive(Debug, Clone)]
pub struct CreatedInstance {
    /// Provider-assigned unique identifier.
    pub id: String,
    /// Human-readable label, `<prefix>-<random-suffix>`.
    pub name: String,
}

/// The cloud-provider boundary. Implementations must tolerate concurrent
/// calls from multiple workers (polling and deletion happen from many tasks
/// at once) without external locking.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Region identifiers currently accepting new instances.
    async fn list_regions(&self) -> Result<Vec<String>>;

    /// Batched create of `count` instances in one region. Must be
    /// all-or-nothing: on `Err` no instance from this call may exist on the
    /// provider side, since only returned records ever enter the teardown
    /// set. Provider-imposed per-call count limits are a caller concern.
    async fn create_instances(
        &self,
        name_prefix: &str,
        region: &str,
        key_fingerprint: &str,
        count: usize,
    ) -> Result<Vec<CreatedInstance>>;

    /// Public IPv4 address of the instance, `None` until the provider
    /// reports one.
    async fn get_instance_address(&self, id: &str) -> Result<Option<String>>;

    /// Deletes the instance. `Ok(false)` means the provider refused
    /// (already gone, or not deletable right now).
    async fn delete_instance(&self, id: &str) -> Result<bool>;
}

/// Generates `count` instance names, `<prefix>-<8 random lowercase letters>`,
/// unique within a run.
pub fn instance_names(prefix: &str, count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let suffix: String = (0..8).map(|_| rng.gen_range('a'..='z')).collect();
            format!("{}-{}", prefix, suffix)
        })
        .collect()
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "digitalocean")]
pub mod digitalocean;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_carry_prefix_and_random_suffix() {
        let names = instance_names("scour", 4);
        assert_eq!(names.len(), 4);
        for name in &names {
            let (prefix, suffix) = name.split_once('-').unwrap();
            assert_eq!(prefix, "scour");
            assert_eq!(suffix.len(), 8);
            assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
        }
    }
}
