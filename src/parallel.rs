//! Parallel evaluation scheduler: disjoint row-block tasks over a fixed
//! worker pool.
//!
//! The target's row-major buffer is split into contiguous row blocks sized
//! by the configured [`BlockShape`]; each block is one task, and blocks are
//! disjoint sub-slices, so tasks share no mutable state and need no
//! synchronization. The calling thread blocks until every task of the call
//! completes (barrier semantics). On task failure the first error is
//! surfaced after in-flight tasks finish; blocks not yet started are
//! skipped, leaving the target in the documented undefined state.

use crate::config::{BlockShape, EvalConfig};
use crate::Result;

/// Rows per worker task for a `rows × cols` target.
///
/// The preferred block row count is raised to the configured element floor
/// so small problems do not oversubscribe the pool.
pub(crate) fn rows_per_block(rows: usize, cols: usize, shape: &BlockShape) -> usize {
    if rows == 0 {
        return 1;
    }
    let c = cols.max(1);
    let floor = (shape.min_block_elems + c - 1) / c;
    shape.block_rows.max(floor).max(1).min(rows)
}

/// Run `f` over disjoint row blocks of a row-major buffer.
///
/// `f(row_offset, block)` receives the first row index of the block and
/// the block's element slice. Dispatches to the worker pool when the
/// configuration asks for it and more than one block exists; otherwise
/// runs on the calling thread.
pub(crate) fn run_row_blocks<T, F>(
    data: &mut [T],
    rows: usize,
    cols: usize,
    cfg: &EvalConfig,
    f: &F,
) -> Result<()>
where
    T: Send,
    F: Fn(usize, &mut [T]) -> Result<()> + Sync,
{
    let total = data.len();
    debug_assert_eq!(total, rows * cols);
    if total == 0 {
        return Ok(());
    }
    let rpb = rows_per_block(rows, cols, &cfg.block_shape);
    let chunk = rpb * cols.max(1);

    #[cfg(feature = "parallel")]
    if cfg.wants_parallel(total) && total > chunk {
        if let Some(pool) = crate::config::worker_pool() {
            use rayon::prelude::*;
            if crate::config::trace_enabled() {
                eprintln!(
                    "matexpr: parallel dispatch, {} rows in blocks of {}",
                    rows, rpb
                );
            }
            return pool.install(|| {
                data.par_chunks_mut(chunk)
                    .enumerate()
                    .try_for_each(|(bi, block)| f(bi * rpb, block))
            });
        }
    }

    for (bi, block) in data.chunks_mut(chunk).enumerate() {
        f(bi * rpb, block)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvalConfig;
    use crate::EvalError;

    fn shape(block_rows: usize, min_elems: usize) -> BlockShape {
        BlockShape {
            block_rows,
            block_cols: 64,
            min_block_elems: min_elems,
        }
    }

    #[test]
    fn test_rows_per_block_floor() {
        // 8 rows of 10 elements, floor of 32 elements -> at least 4 rows.
        assert_eq!(rows_per_block(8, 10, &shape(1, 32)), 4);
        // Preferred block wins when larger than the floor.
        assert_eq!(rows_per_block(100, 10, &shape(16, 32)), 16);
        // Never exceeds the row count.
        assert_eq!(rows_per_block(3, 10, &shape(64, 32)), 3);
    }

    #[test]
    fn test_blocks_cover_every_row_once() {
        let rows = 13;
        let cols = 7;
        let mut data = vec![0u32; rows * cols];
        let cfg = EvalConfig {
            worker_pool_size: 0,
            parallel_threshold: 1,
            block_shape: shape(3, 1),
        };
        run_row_blocks(&mut data, rows, cols, &cfg, &|r0, block| {
            let rows_here = block.len() / cols;
            for local in 0..rows_here {
                for x in &mut block[local * cols..(local + 1) * cols] {
                    *x += (r0 + local) as u32 + 1;
                }
            }
            Ok(())
        })
        .unwrap();
        for i in 0..rows {
            for j in 0..cols {
                assert_eq!(data[i * cols + j], i as u32 + 1, "row {i} col {j}");
            }
        }
    }

    #[test]
    fn test_error_propagates() {
        let mut data = vec![0.0f64; 100];
        let cfg = EvalConfig {
            worker_pool_size: 0,
            parallel_threshold: 1,
            block_shape: shape(2, 1),
        };
        let err = run_row_blocks(&mut data, 10, 10, &cfg, &|r0, _block| {
            if r0 >= 4 {
                Err(EvalError::AllocationFailure)
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(matches!(err, EvalError::AllocationFailure));
    }

    #[test]
    fn test_empty_target_is_noop() {
        let mut data: Vec<f64> = Vec::new();
        let cfg = EvalConfig::serial();
        run_row_blocks(&mut data, 0, 0, &cfg, &|_, _| {
            panic!("no tasks expected")
        })
        .unwrap();
    }
}
