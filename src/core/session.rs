// thumbgate/src/core/session.rs
//! Backend runtime sessions.
//!
//! Several independent processors may share one backend runtime. Each calls
//! [`Runtime::startup`] and gets a [`LibrarySession`]; the first session builds
//! the shared worker pool, and only the last one to shut down tears it down.
//! The count lives behind a single lock inside the `Runtime` value, which is
//! passed around explicitly.

use super::{Result, ThumbnailError};
use rayon::ThreadPool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Worker threads for backend operations. 0 means one per core.
    pub concurrency: usize,
    /// Log backend operations at debug level instead of errors only.
    pub debug: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            debug: false,
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    sessions: usize,
    pool: Option<Arc<ThreadPool>>,
    debug: bool,
}

#[derive(Default)]
pub struct Runtime {
    state: Mutex<RuntimeState>,
}

impl Runtime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        // The state stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn startup(self: &Arc<Self>, settings: &RuntimeSettings) -> Result<LibrarySession> {
        let mut state = self.lock();
        if state.sessions == 0 {
            let threads = match settings.concurrency {
                0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
                n => n,
            };
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("thumbgate-backend-{}", i))
                .build()
                .map_err(|e| {
                    ThumbnailError::Config(format!("Failed to create thread pool: {}", e))
                })?;
            state.pool = Some(Arc::new(pool));
            state.debug = settings.debug;
            log::debug!("backend runtime started with {} threads", threads);
        }
        state.sessions += 1;

        let pool = state
            .pool
            .clone()
            .ok_or_else(|| ThumbnailError::Config("backend runtime has no pool".to_string()))?;
        Ok(LibrarySession {
            runtime: Arc::clone(self),
            pool,
            debug: state.debug,
            released: false,
        })
    }

    pub fn sessions(&self) -> usize {
        self.lock().sessions
    }

    pub fn is_running(&self) -> bool {
        self.lock().pool.is_some()
    }

    /// Returns true when this release tore the runtime down.
    fn release(&self) -> bool {
        let mut state = self.lock();
        if state.sessions == 0 {
            return false;
        }
        state.sessions -= 1;
        if state.sessions == 0 {
            state.pool = None;
            log::debug!("backend runtime shut down");
            return true;
        }
        false
    }
}

/// One owner's claim on the runtime. Dropping it releases the claim too.
pub struct LibrarySession {
    runtime: Arc<Runtime>,
    pool: Arc<ThreadPool>,
    debug: bool,
    released: bool,
}

impl LibrarySession {
    pub fn pool(&self) -> Arc<ThreadPool> {
        Arc::clone(&self.pool)
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns true when this was the last session and shared state is gone.
    pub fn shutdown(mut self) -> bool {
        self.released = true;
        self.runtime.release()
    }
}

impl Drop for LibrarySession {
    fn drop(&mut self) {
        if !self.released {
            self.runtime.release();
        }
    }
}
