//! Work partitioning and CPU budgeting for the worker pool.

/// Number of workers to start: the configured count, or one per available
/// CPU core when `configured` is `None`/zero. Never less than one.
pub fn resolve_worker_count(configured: Option<usize>) -> usize {
    match configured {
        Some(n) if n > 0 => n,
        _ => available_cores(),
    }
}

pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Split `urls` into contiguous chunks of `ceil(len / workers)`.
///
/// Chunks never overlap, concatenate back to `urls`, and are never empty,
/// so there can be fewer chunks than workers.
pub fn partition(urls: &[String], workers: usize) -> Vec<Vec<String>> {
    let workers = workers.max(1);
    if urls.is_empty() {
        return Vec::new();
    }
    let chunk_size = urls.len().div_ceil(workers);
    urls.chunks(chunk_size).map(<[String]>::to_vec).collect()
}

/// Build parallelism per repository so that `workers * jobs` stays within
/// `cpu_budget`. The configured `jobs` is an upper bound; the result is at
/// least one.
pub fn effective_build_jobs(jobs: usize, workers: usize, cpu_budget: usize) -> usize {
    let per_worker = (cpu_budget / workers.max(1)).max(1);
    jobs.clamp(1, per_worker)
}

/// Default CPU budget: twice the core count, leaving room for the I/O-bound
/// clone phases overlapping with builds.
pub fn default_cpu_budget() -> usize {
    available_cores().saturating_mul(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://host/org/repo{}.git", i)).collect()
    }

    #[test]
    fn test_seven_urls_four_workers() {
        let chunks = partition(&urls(7), 4);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 2, 1]);
    }

    #[test]
    fn test_more_workers_than_urls_starts_fewer_chunks() {
        let chunks = partition(&urls(3), 8);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 1, 1]);
    }

    #[test]
    fn test_empty_input() {
        assert!(partition(&[], 4).is_empty());
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let chunks = partition(&urls(5), 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 5);
    }

    #[test]
    fn test_partition_is_a_bijection() {
        for len in 0..40 {
            let input = urls(len);
            for workers in 1..12 {
                let chunks = partition(&input, workers);
                assert!(chunks.len() <= workers);
                assert!(chunks.iter().all(|c| !c.is_empty()));
                let rejoined: Vec<String> = chunks.concat();
                assert_eq!(rejoined, input, "len={} workers={}", len, workers);
            }
        }
    }

    #[test]
    fn test_gap_case_ceil_leaves_trailing_workers_idle() {
        // ceil(9 / 4) = 3 → only three chunks are needed.
        let sizes: Vec<usize> = partition(&urls(9), 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3]);
    }

    #[test]
    fn test_resolve_worker_count() {
        assert_eq!(resolve_worker_count(Some(3)), 3);
        assert!(resolve_worker_count(Some(0)) >= 1);
        assert!(resolve_worker_count(None) >= 1);
    }

    #[test]
    fn test_effective_build_jobs() {
        // 8 workers on a 16-slot budget → 2 jobs each, even if 6 configured.
        assert_eq!(effective_build_jobs(6, 8, 16), 2);
        // Plenty of budget → configured value wins.
        assert_eq!(effective_build_jobs(6, 2, 32), 6);
        // Never zero.
        assert_eq!(effective_build_jobs(0, 4, 16), 1);
        assert_eq!(effective_build_jobs(6, 64, 16), 1);
    }
}
