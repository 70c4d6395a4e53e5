//! Port-range splitting: divides an nmap-style port spec into contiguous
//! per-instance buckets so a fleet can partition one large scan.

use crate::error::PortSplitError;

/// Parses an nmap-style spec (`"80"`, `"1-1024"`, `"22,80,8000-8100"`) into
/// a sorted, deduplicated port list.
pub fn parse(spec: &str) -> Result<Vec<u16>, PortSplitError> {
    let invalid = || PortSplitError::InvalidSpec(spec.to_string());

    let mut ports: Vec<u16> = Vec::new();
    for segment in spec.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(invalid());
        }
        match segment.split_once('-') {
            Some((lo, hi)) => {
                let lo: u16 = lo.trim().parse().map_err(|_| invalid())?;
                let hi: u16 = hi.trim().parse().map_err(|_| invalid())?;
                if lo == 0 || lo > hi {
                    return Err(invalid());
                }
                ports.extend(lo..=hi);
            }
            None => {
                let p: u16 = segment.parse().map_err(|_| invalid())?;
                if p == 0 {
                    return Err(invalid());
                }
                ports.push(p);
            }
        }
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Splits `spec` into `n` contiguous buckets whose union reconstructs the
/// spec. Bucket sizes differ by at most one port. Fails when `n` exceeds
/// the number of ports (an empty bucket would mean an instance scanning
/// nothing).
pub fn split_contiguous(spec: &str, n: usize) -> Result<Vec<String>, PortSplitError> {
    let ports = parse(spec)?;
    if n == 0 || ports.len() < n {
        return Err(PortSplitError::TooManyBuckets {
            total: ports.len(),
            requested: n,
        });
    }

    let base = ports.len() / n;
    let remainder = ports.len() % n;

    let mut buckets = Vec::with_capacity(n);
    let mut cursor = 0usize;
    for i in 0..n {
        let len = base + if i < remainder { 1 } else { 0 };
        buckets.push(format_ports(&ports[cursor..cursor + len]));
        cursor += len;
    }
    Ok(buckets)
}

/// Collapses a sorted port slice back into spec form (`"1-25,443"`).
fn format_ports(ports: &[u16]) -> String {
    let mut runs: Vec<String> = Vec::new();
    let mut iter = ports.iter().copied();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut end = start;
    for p in iter {
        if p == end + 1 {
            end = p;
        } else {
            runs.push(format_run(start, end));
            start = p;
            end = p;
        }
    }
    runs.push(format_run(start, end));
    runs.join(",")
}

fn format_run(start: u16, end: u16) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_one_to_one_hundred_into_four_quarters() {
        let buckets = split_contiguous("1-100", 4).unwrap();
        assert_eq!(buckets, vec!["1-25", "26-50", "51-75", "76-100"]);
    }

    #[test]
    fn buckets_are_disjoint_and_reconstruct_the_spec() {
        let buckets = split_contiguous("1-100", 4).unwrap();
        let mut all: Vec<u16> = Vec::new();
        for b in &buckets {
            let ports = parse(b).unwrap();
            // No overlap with what we have so far.
            assert!(ports.iter().all(|p| !all.contains(p)));
            all.extend(ports);
        }
        all.sort_unstable();
        assert_eq!(all, parse("1-100").unwrap());
    }

    #[test]
    fn uneven_split_differs_by_at_most_one() {
        let buckets = split_contiguous("1-10", 3).unwrap();
        let sizes: Vec<usize> = buckets.iter().map(|b| parse(b).unwrap().len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert!(sizes.iter().all(|s| *s == 3 || *s == 4));
    }

    #[test]
    fn comma_lists_and_ranges_mix() {
        let buckets = split_contiguous("22,80,8000-8003", 2).unwrap();
        assert_eq!(buckets, vec!["22,80,8000", "8001-8003"]);
    }

    #[test]
    fn more_buckets_than_ports_fails() {
        let err = split_contiguous("1-3", 4).unwrap_err();
        assert_eq!(
            err,
            PortSplitError::TooManyBuckets {
                total: 3,
                requested: 4
            }
        );
    }

    #[test]
    fn duplicate_and_unordered_segments_normalize() {
        assert_eq!(parse("80,22,22,21-23").unwrap(), vec![21, 22, 23, 80]);
    }

    #[test]
    fn rejects_garbage_specs() {
        for bad in ["", "a-b", "10-2", "0", "1-", "70000"] {
            assert!(parse(bad).is_err(), "spec {:?} should be rejected", bad);
        }
    }
}
