//! Shared thread pool for decode jobs
//!
//! Uses work-stealing deques so fresh decode requests run promptly:
//! - New jobs pushed to the global injector
//! - Workers drain their own deque first, then the injector, then steal
//!
//! Per-job epoch checks let a stopped playback unit abandon decodes that are
//! still queued; the check happens at execution time, not enqueue time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::deque::{Injector, Worker};
use log::trace;
use once_cell::sync::OnceCell;

type Job = Box<dyn FnOnce() + Send + 'static>;

static DECODE_POOL: OnceCell<Workers> = OnceCell::new();

/// Process-wide decode pool, initialized on first use.
///
/// `size_override` is honored only by the first caller; later calls return
/// the existing pool.
pub fn decode_pool(size_override: Option<usize>) -> &'static Workers {
    DECODE_POOL.get_or_init(|| {
        let n = size_override.unwrap_or_else(|| (num_cpus::get() * 3 / 4).max(1));
        Workers::new(n)
    })
}

/// Work-stealing pool. One per process; playback units share it.
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    pub fn new(num_threads: usize) -> Self {
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut locals: Vec<Worker<Job>> = Vec::new();
        let mut stealers = Vec::new();
        for _ in 0..num_threads {
            let w: Worker<Job> = Worker::new_fifo();
            stealers.push(w.stealer());
            locals.push(w);
        }

        let mut handles = Vec::new();
        for (worker_id, worker) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("flipbook-decode-{}", worker_id))
                .spawn(move || {
                    trace!("Decode worker {} started", worker_id);
                    loop {
                        if let Some(job) = worker.pop() {
                            job();
                            continue;
                        }
                        if let Some(job) = injector.steal().success() {
                            job();
                            continue;
                        }
                        let mut found = false;
                        for stealer in &stealers {
                            if let Some(job) = stealer.steal().success() {
                                job();
                                found = true;
                                break;
                            }
                        }
                        if found {
                            continue;
                        }
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        // 1ms sleep instead of pure yield to keep idle CPU low
                        thread::sleep(Duration::from_millis(1));
                    }
                    trace!("Decode worker {} stopped", worker_id);
                })
                .expect("spawn decode worker");
            handles.push(handle);
        }

        trace!("Decode pool initialized: {} threads", num_threads);
        Self {
            injector,
            handles,
            shutdown,
        }
    }

    /// Run a closure on a pool thread. No return value; callers communicate
    /// over channels.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    /// Run a closure only if `epoch` still matches the unit's counter when a
    /// worker picks the job up. A `stop()` between enqueue and execution
    /// bumps the counter and the job is silently dropped.
    pub fn execute_with_epoch<F>(&self, unit_epoch: Arc<AtomicU64>, epoch: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let wrapped = move || {
            if unit_epoch.load(Ordering::Relaxed) == epoch {
                f();
            }
        };
        self.injector.push(Box::new(wrapped));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Decode pool shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        // Bounded wait; stragglers die with the process.
        let deadline = Instant::now() + Duration::from_millis(500);
        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Decode pool shutdown timeout, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} decode workers stopped", num_threads);
    }
}
