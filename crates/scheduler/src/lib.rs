//! Worker pool primitives for batch runs: pool sizing, a fixed-size rayon
//! pool that drains a job iterator, and counters describing how busy the pool
//! got. The batch crate decides what a job does; this crate only decides
//! where and how many run at once.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;

/// Worker threads spawned per available core when no size is configured.
pub const WORKERS_PER_CORE: usize = 2;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    ZeroWorkers,
    #[error("failed to start worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Cores the OS reports for this process, at least 1.
pub fn available_cores() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Twice the available cores.
pub fn default_worker_count() -> usize {
    available_cores().saturating_mul(WORKERS_PER_CORE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub thread_name: String,
}

impl PoolConfig {
    /// Explicit size when given, otherwise [`default_worker_count`].
    pub fn with_workers(workers: Option<usize>) -> Self {
        Self {
            workers: workers.unwrap_or_else(default_worker_count),
            ..Self::default()
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            thread_name: "docbatch-worker".to_string(),
        }
    }
}

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSnapshot {
    pub workers: usize,
    pub active: usize,
    pub peak_active: usize,
    pub submitted: usize,
    pub finished: usize,
}

#[derive(Debug, Default)]
struct PoolStats {
    active: AtomicUsize,
    peak_active: AtomicUsize,
    submitted: AtomicUsize,
    finished: AtomicUsize,
}

impl PoolStats {
    fn start(&self) -> ActiveJob<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        ActiveJob(self)
    }
}

/// Marks a job finished when dropped, including when the job panics.
struct ActiveJob<'a>(&'a PoolStats);

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// A rayon pool whose size is fixed at construction.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
    stats: PoolStats,
}

impl WorkerPool {
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::ZeroWorkers);
        }
        let name = config.thread_name.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(move |i| format!("{name}-{i}"))
            .build()?;
        debug!(workers = config.workers, "worker pool started");
        Ok(Self {
            pool,
            workers: config.workers,
            stats: PoolStats::default(),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            workers: self.workers,
            active: self.stats.active.load(Ordering::SeqCst),
            peak_active: self.stats.peak_active.load(Ordering::SeqCst),
            submitted: self.stats.submitted.load(Ordering::SeqCst),
            finished: self.stats.finished.load(Ordering::SeqCst),
        }
    }

    /// Submit every job yielded by `jobs` and block until all of them have
    /// finished.
    ///
    /// The iterator is consumed on the calling thread, so producing jobs
    /// overlaps with running them, while the jobs themselves only ever run on
    /// the pool's threads. Jobs are independent: one panicking does not stop
    /// the others, and the first panic is resumed here once every job is done.
    pub fn run_all<'a, I, F>(&'a self, jobs: I)
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'a,
    {
        let stats = &self.stats;
        self.pool.in_place_scope(|scope| {
            for job in jobs {
                stats.submitted.fetch_add(1, Ordering::SeqCst);
                scope.spawn(move |_| {
                    let _active = stats.start();
                    job();
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::thread;
    use std::time::Duration;

    fn pool(workers: usize) -> WorkerPool {
        WorkerPool::new(&PoolConfig::with_workers(Some(workers))).unwrap()
    }

    #[test]
    fn default_size_is_twice_the_cores() {
        assert_eq!(default_worker_count(), available_cores() * 2);
        assert_eq!(PoolConfig::with_workers(None).workers, default_worker_count());
        assert_eq!(PoolConfig::with_workers(Some(3)).workers, 3);
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(&PoolConfig::with_workers(Some(0))),
            Err(PoolError::ZeroWorkers)
        ));
    }

    #[test]
    fn concurrency_never_exceeds_pool_size() {
        let pool = pool(3);
        let running = AtomicUsize::new(0);
        let observed_max = AtomicUsize::new(0);

        let (running_ref, max_ref) = (&running, &observed_max);
        pool.run_all((0..24).map(move |_| {
            move || {
                let now = running_ref.fetch_add(1, Ordering::SeqCst) + 1;
                max_ref.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                running_ref.fetch_sub(1, Ordering::SeqCst);
            }
        }));

        let snap = pool.snapshot();
        assert!(observed_max.load(Ordering::SeqCst) <= 3);
        assert!(snap.peak_active <= 3);
        assert_eq!(snap.submitted, 24);
        assert_eq!(snap.finished, 24);
        assert_eq!(snap.active, 0);
    }

    #[test]
    fn returns_only_after_every_job_finished() {
        let pool = pool(4);
        let done = Mutex::new(Vec::new());
        let done_ref = &done;
        pool.run_all((0..50).map(move |i| {
            move || {
                if i % 7 == 0 {
                    thread::sleep(Duration::from_millis(2));
                }
                done_ref.lock().push(i);
            }
        }));
        let mut done = done.into_inner();
        done.sort_unstable();
        assert_eq!(done, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn jobs_run_off_the_calling_thread() {
        let pool = pool(2);
        let caller = thread::current().id();
        let seen = Mutex::new(Vec::new());
        let seen_ref = &seen;
        pool.run_all((0..4).map(move |_| move || seen_ref.lock().push(thread::current().id())));
        assert!(seen.lock().iter().all(|id| *id != caller));
    }

    #[test]
    fn panicking_job_does_not_stop_siblings() {
        let pool = pool(2);
        let completed = AtomicUsize::new(0);
        let completed_ref = &completed;
        let result = catch_unwind(AssertUnwindSafe(|| {
            pool.run_all((0..10).map(move |i| {
                move || {
                    assert!(i != 4, "job {i} blew up");
                    completed_ref.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }));
        assert!(result.is_err());
        assert_eq!(completed.load(Ordering::SeqCst), 9);
        assert_eq!(pool.snapshot().finished, 10);
        assert_eq!(pool.snapshot().active, 0);
    }
}
