//! Region allocation: distribute a requested instance count across the
//! regions a provider actually offers, honoring an optional allow-list.

use crate::error::AllocationError;

/// Computes a region -> instance-count plan that sums exactly to `total`.
///
/// `selector` is either `"*"` (all available regions) or a comma-separated
/// allow-list. The number of *distinct* regions used is capped at `total`
/// so that every region in the plan receives at least one instance. Counts
/// are distributed as evenly as possible; the first `total % len` regions
/// (in available-list order) receive one extra.
///
/// The returned plan preserves the iteration order of `available`, which
/// keeps creation order, and therefore instance index assignment,
/// reproducible for a given provider response.
pub fn allocate(
    available: &[String],
    selector: &str,
    total: usize,
) -> Result<Vec<(String, usize)>, AllocationError> {
    let eligible: Vec<&String> = if selector.trim() == "*" {
        available.iter().take(total).collect()
    } else {
        let allowed: Vec<&str> = selector.split(',').map(str::trim).collect();
        available
            .iter()
            .filter(|r| allowed.contains(&r.as_str()))
            .take(total)
            .collect()
    };

    if eligible.is_empty() {
        return Err(AllocationError::NoEligibleRegions {
            selector: selector.to_string(),
        });
    }

    let base = total / eligible.len();
    let remainder = total % eligible.len();

    Ok(eligible
        .into_iter()
        .enumerate()
        .map(|(i, region)| {
            let extra = if i < remainder { 1 } else { 0 };
            (region.clone(), base + extra)
        })
        .collect())
}
