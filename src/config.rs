//! Process-wide evaluation configuration.
//!
//! The worker pool is fixed-size and built once, at initialization time —
//! there is no per-call pool. [`init_config`] installs the configuration
//! before first use; afterwards it is immutable. Entry points that take an
//! explicit [`EvalConfig`] reuse the same pool and only reinterpret the
//! dispatch knobs (threshold, block shape, pool-size gate), which keeps
//! serial/parallel comparisons possible without re-initializing the
//! process.

use std::sync::OnceLock;

use crate::{EvalError, Result};

/// Default minimum element count before parallel dispatch is considered.
pub const MIN_PARALLEL_LENGTH: usize = 1 << 15;

/// Tile dimensions for parallel partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockShape {
    /// Preferred number of rows per worker task.
    pub block_rows: usize,
    /// Preferred number of columns per worker task (reserved for future
    /// column partitioning; the scheduler currently splits rows and keeps
    /// rows contiguous).
    pub block_cols: usize,
    /// Floor on elements per task, so small problems do not oversubscribe
    /// the pool.
    pub min_block_elems: usize,
}

impl Default for BlockShape {
    fn default() -> Self {
        BlockShape {
            block_rows: 64,
            block_cols: 64,
            min_block_elems: 1 << 12,
        }
    }
}

/// Evaluation engine configuration.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Thread count for parallel evaluation; 0 disables parallel dispatch.
    pub worker_pool_size: usize,
    /// Minimum element count before parallel dispatch is considered.
    pub parallel_threshold: usize,
    /// Default tile dimensions for parallel partitioning.
    pub block_shape: BlockShape,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            worker_pool_size: default_pool_size(),
            parallel_threshold: MIN_PARALLEL_LENGTH,
            block_shape: BlockShape::default(),
        }
    }
}

impl EvalConfig {
    /// Fully serial configuration: parallel dispatch never triggers.
    pub fn serial() -> Self {
        EvalConfig {
            worker_pool_size: 0,
            ..Default::default()
        }
    }

    /// Whether a problem of `total` elements should be dispatched to the
    /// worker pool under this configuration.
    pub(crate) fn wants_parallel(&self, total: usize) -> bool {
        cfg!(feature = "parallel") && self.worker_pool_size > 0 && total > self.parallel_threshold
    }
}

fn default_pool_size() -> usize {
    #[cfg(feature = "parallel")]
    {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
    #[cfg(not(feature = "parallel"))]
    {
        0
    }
}

static CONFIG: OnceLock<EvalConfig> = OnceLock::new();

/// Install the process-wide configuration.
///
/// Must be called before the first evaluation; fails once the
/// configuration has been read or set.
pub fn init_config(cfg: EvalConfig) -> Result<()> {
    CONFIG
        .set(cfg)
        .map_err(|_| EvalError::Config("configuration already initialized"))
}

/// The process-wide configuration, defaulting on first read.
pub fn config() -> &'static EvalConfig {
    CONFIG.get_or_init(EvalConfig::default)
}

/// The fixed worker pool, built once from the process-wide configuration.
///
/// Returns `None` when the pool size is 0 or the pool could not be built;
/// callers fall back to serial execution.
#[cfg(feature = "parallel")]
pub(crate) fn worker_pool() -> Option<&'static rayon::ThreadPool> {
    static POOL: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();
    POOL.get_or_init(|| {
        let n = config().worker_pool_size;
        if n == 0 {
            return None;
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("matexpr-worker-{i}"))
            .build()
            .ok()
    })
    .as_ref()
}

/// Opt-in kernel-dispatch tracing via the `MATEXPR_TRACE` environment
/// variable.
#[inline]
pub(crate) fn trace_enabled() -> bool {
    matches!(std::env::var("MATEXPR_TRACE"), Ok(ref v) if v == "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_block_shape_floor() {
        let shape = BlockShape::default();
        assert!(shape.min_block_elems >= shape.block_rows);
        assert!(shape.block_rows > 0 && shape.block_cols > 0);
    }

    #[test]
    fn test_serial_config_never_parallel() {
        let cfg = EvalConfig::serial();
        assert!(!cfg.wants_parallel(usize::MAX));
    }

    #[test]
    fn test_threshold_gates_parallel() {
        let cfg = EvalConfig {
            worker_pool_size: 4,
            parallel_threshold: 100,
            block_shape: BlockShape::default(),
        };
        assert!(!cfg.wants_parallel(100));
        if cfg!(feature = "parallel") {
            assert!(cfg.wants_parallel(101));
        }
    }
}
