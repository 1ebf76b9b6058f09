// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Bounded fork-join worker pool for heavy cryptographic work.
//!
//! Rounds fan per-peer proof generation and prime sampling out through
//! [`Pool::parallelize`]. The closure must not touch round state; it returns a
//! value per index and the caller merges the ordered results back
//! sequentially.

use rayon::prelude::*;

/// A bounded worker pool.
///
/// Cloneable handles share the same underlying threads. A pool is owned by
/// the session helper and threaded into the calls that fan out; it is not a
/// field of any key manager.
#[derive(Debug)]
pub struct Pool {
    threads: Option<rayon::ThreadPool>,
}

impl Pool {
    /// A pool bounded to `workers` threads.
    pub fn bounded(workers: usize) -> Self {
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .ok();
        Self { threads }
    }

    /// A pool that borrows the global worker threads.
    pub fn global() -> Self {
        Self { threads: None }
    }

    /// Invoke `f(i)` for every `i ∊ [0, n)` in parallel and collect the `n`
    /// results preserving `i`-indexed ordering.
    pub fn parallelize<T, F>(&self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let run = || (0..n).into_par_iter().map(&f).collect();
        match &self.threads {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_preserve_index_order() {
        let pool = Pool::bounded(4);
        let squares = pool.parallelize(100, |i| i * i);
        assert_eq!(squares.len(), 100);
        for (i, sq) in squares.iter().enumerate() {
            assert_eq!(*sq, i * i);
        }
    }

    #[test]
    fn errors_propagate_per_index() {
        let pool = Pool::global();
        let results = pool.parallelize(10, |i| if i % 2 == 0 { Ok(i) } else { Err(i) });
        for (i, r) in results.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(*r, Ok(i));
            } else {
                assert_eq!(*r, Err(i));
            }
        }
    }
}
