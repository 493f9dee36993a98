//! Thread-pool selection shared by the Monte-Carlo stages.

use pz_core::{Error, Result};

/// Run `f` on a dedicated pool of `n_threads` workers, or on rayon's global
/// pool when `n_threads == 0`.
pub(crate) fn install<T, F>(n_threads: usize, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    if n_threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| Error::Computation(format!("failed to create thread pool: {e}")))?;
        pool.install(f)
    } else {
        f()
    }
}
