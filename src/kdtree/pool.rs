use rayon::ThreadPool;

use crate::error::Result;

/// The worker pool embedded in a tree, with the depth gate that decides
/// whether a recursion may submit half of its work.
///
/// Every parallel decomposition in this crate follows the same rule: while
/// `depth <= max_submit_depth`, one half is submitted to the pool and the
/// other half runs on the calling thread; past the gate both halves run
/// inline. A tree configured for one thread (or none) has no pool at all.
#[derive(Debug)]
pub(crate) struct Executor {
    pool: Option<ThreadPool>,
    max_submit_depth: Option<usize>,
}

impl Executor {
    pub(crate) fn sequential() -> Self {
        Self {
            pool: None,
            max_submit_depth: None,
        }
    }

    /// Rounds `num_threads` down to a power of two, then builds a fixed pool
    /// of `num_threads - 1` workers and derives the submit depth that
    /// consumes them evenly. One thread or zero threads disables submission.
    pub(crate) fn with_threads(num_threads: usize) -> Result<Self> {
        let rounded = if num_threads == 0 {
            0
        } else {
            1usize << num_threads.ilog2()
        };
        let workers = rounded.saturating_sub(1);
        if workers == 0 {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?;
        Ok(Self {
            pool: Some(pool),
            max_submit_depth: Some(workers.ilog2() as usize),
        })
    }

    /// Whether a recursion at `depth` may submit work to the pool.
    pub(crate) fn should_fork(&self, depth: usize) -> bool {
        self.pool.is_some() && self.max_submit_depth.is_some_and(|max| depth <= max)
    }

    /// Runs both closures and returns both results. While the depth gate
    /// holds, `a` is submitted to the pool and `b` runs simultaneously;
    /// otherwise both run inline on the calling thread. A panic in a
    /// submitted closure propagates through the join and aborts the query.
    pub(crate) fn forked<A, B, RA, RB>(&self, depth: usize, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        match (&self.pool, self.max_submit_depth) {
            (Some(pool), Some(max)) if depth <= max => pool.join(a, b),
            _ => (a(), b()),
        }
    }
}
