use rayon::prelude::*;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};

/// Runs `work` over `items` on a dedicated pool of `workers` threads, returning
/// results in input order.
pub fn run_bounded<T, R, F>(
    items: Vec<T>,
    workers: usize,
    work: F,
) -> Result<Vec<R>, ThreadPoolBuildError>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers.clamp(1, items.len()))
        .thread_name(|idx| format!("detail-worker-{idx}"))
        .build()?;
    Ok(pool.install(|| items.into_par_iter().map(|item| work(item)).collect()))
}
