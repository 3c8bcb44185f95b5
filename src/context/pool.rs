use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::core::Context;

/// Default number of idle contexts kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Returned by [`ContextPool::acquire`] when the in-flight cap is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolExhausted {
    pub max_in_flight: usize,
}

impl fmt::Display for PoolExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "context pool exhausted ({} requests in flight)",
            self.max_in_flight
        )
    }
}

impl std::error::Error for PoolExhausted {}

/// Reusable pool of request contexts.
///
/// Idle contexts sit behind a `parking_lot::Mutex`; the lock is held only for
/// a push or pop. `max_in_flight` optionally bounds concurrently checked-out
/// contexts.
pub struct ContextPool {
    idle: Mutex<Vec<Context>>,
    max_idle: usize,
    max_in_flight: Option<usize>,
    in_flight: AtomicUsize,
    created: AtomicUsize,
}

impl fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.max_idle)
            .field("max_in_flight", &self.max_in_flight)
            .field("in_flight", &self.in_flight())
            .field("created", &self.created())
            .finish()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE, None)
    }
}

impl ContextPool {
    #[must_use]
    pub fn new(max_idle: usize, max_in_flight: Option<usize>) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
            max_in_flight,
            in_flight: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
        }
    }

    /// Check out a clean context.
    pub fn acquire(&self) -> Result<PooledContext<'_>, PoolExhausted> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(max) = self.max_in_flight {
            if now > max {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                return Err(PoolExhausted { max_in_flight: max });
            }
        }
        let ctx = self.idle.lock().pop().unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            Context::default()
        });
        Ok(PooledContext { pool: self, ctx })
    }

    fn release(&self, mut ctx: Context) {
        ctx.reset();
        {
            let mut idle = self.idle.lock();
            if idle.len() < self.max_idle {
                idle.push(ctx);
            }
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Contexts waiting for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Contexts currently checked out.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Contexts allocated over the pool's lifetime.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// A checked-out context; resets and returns itself to the pool on drop,
/// including during unwinding.
#[derive(Debug)]
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    ctx: Context,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.ctx
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.ctx));
    }
}
