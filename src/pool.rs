use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use crate::config::RouterConfig;
use crate::context::Context;

/// A free list of request contexts.
///
/// Contexts are allocated on demand, reset on every acquisition and release,
/// and kept for reuse up to `capacity` idle instances.
pub(crate) struct ContextPool {
    config: Arc<RouterConfig>,
    free: Mutex<Vec<Box<Context>>>,
    capacity: usize,
}

impl ContextPool {
    pub(crate) fn new(config: Arc<RouterConfig>) -> Self {
        Self {
            capacity: config.pool_capacity,
            config,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Hands out a context in its reset state.
    pub(crate) fn acquire(&self) -> PooledContext<'_> {
        let reused = match self.free.lock() {
            Ok(mut free) => free.pop(),
            Err(_) => {
                log::warn!("context pool lock poisoned, allocating a fresh context");
                None
            }
        };

        let ctx = match reused {
            Some(mut ctx) => {
                ctx.reset();
                ctx
            }
            None => Box::new(Context::new(self.config.clone())),
        };

        PooledContext {
            pool: self,
            ctx: Some(ctx),
        }
    }

    fn release(&self, ctx: Box<Context>) {
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.capacity {
                free.push(ctx);
            }
        }
    }

    /// Number of contexts waiting for reuse.
    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

/// Exclusive use of a pooled context; returned to the pool on drop.
pub(crate) struct PooledContext<'p> {
    pool: &'p ContextPool,
    /// Only `None` once the guard is being dropped.
    ctx: Option<Box<Context>>,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx.as_deref().expect("pooled context used after release")
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx.as_deref_mut().expect("pooled context used after release")
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            ctx.reset();
            self.pool.release(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn pool(capacity: usize) -> ContextPool {
        let config = RouterConfig {
            pool_capacity: capacity,
            ..RouterConfig::default()
        };
        ContextPool::new(Arc::new(config))
    }

    /// Tests that a reused context carries nothing from its previous request.
    #[test]
    fn test_reuse_resets_state() {
        let pool = pool(4);
        {
            let mut ctx = pool.acquire();
            ctx.set("user", 7u32);
            ctx.error("boom").set_kind(ErrorKind::PUBLIC);
            ctx.params_mut().push("id", "1".into());
            ctx.abort_with_status(404);
        }
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire();
        assert_eq!(pool.idle(), 0);
        assert!(ctx.get::<u32>("user").is_none());
        assert!(ctx.errors().is_empty());
        assert!(ctx.params().is_empty());
        assert!(!ctx.is_aborted());
        assert!(!ctx.writer().written());
        assert_eq!(ctx.writer().status(), hyper::StatusCode::OK);
    }

    /// Tests that concurrent holders get distinct contexts and idle ones are capped.
    #[test]
    fn test_capacity() {
        let pool = pool(2);
        {
            let a = pool.acquire();
            let b = pool.acquire();
            let c = pool.acquire();
            let addrs = [&*a as *const Context, &*b as *const Context, &*c as *const Context];
            assert_ne!(addrs[0], addrs[1]);
            assert_ne!(addrs[1], addrs[2]);
        }
        assert_eq!(pool.idle(), 2);
    }

    /// Tests that the same allocation comes back after a release.
    #[test]
    fn test_release_returns_allocation() {
        let pool = pool(1);
        let first = {
            let ctx = pool.acquire();
            &*ctx as *const Context
        };
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire();
        assert_eq!(&*ctx as *const Context, first);
        drop(ctx);
        assert_eq!(pool.idle(), 1);
    }
}
