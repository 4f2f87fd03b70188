//! Read-through cache interceptor for the dispatch pipeline
//!
//! Runs immediately around procedure execution:
//!
//! 1. Before: if the procedure is cacheable and its key is stored, inject
//!    the cached value into the event — the dispatcher then skips execution.
//! 2. After: store the freshly produced result under the derived key with
//!    the procedure's TTL and filtered invalidation tags.
//!
//! The before hook registers at priority [`CACHE_BEFORE_PRIORITY`] so that
//! authorization observers (which register with positive priorities) always
//! run first — a cache hit must never bypass an access check. The after
//! hook registers at [`CACHE_AFTER_PRIORITY`] so it runs last and caches
//! the final, post-processed result.
//!
//! Store read failures are fail-open: logged and treated as a miss, so a
//! broken cache never changes an RPC result, only its latency. Store write
//! failures propagate. Tag-attachment failures are logged and ignored; the
//! entry stays written, merely untagged.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::Result;
use crate::dispatcher::{MethodApplyEvent, PipelineObserver};
use crate::store::CacheStore;

/// Before-phase priority: at the bottom of the phase, below authorization.
pub const CACHE_BEFORE_PRIORITY: i32 = 0;

/// After-phase priority: last to run, so the cached value reflects any
/// post-processing done by other observers.
pub const CACHE_AFTER_PRIORITY: i32 = -99;

/// Pipeline observer enforcing the read-through/write-through cache policy.
pub struct CacheInterceptor {
    store: Arc<dyn CacheStore>,
}

impl CacheInterceptor {
    /// Create an interceptor backed by `store`
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PipelineObserver for CacheInterceptor {
    fn before_priority(&self) -> i32 {
        CACHE_BEFORE_PRIORITY
    }

    fn after_priority(&self) -> i32 {
        CACHE_AFTER_PRIORITY
    }

    async fn before_method_apply(&self, event: &mut MethodApplyEvent) -> Result<()> {
        let Some(cacheable) = event.procedure().cacheable() else {
            return Ok(());
        };

        let key = cacheable.cache_key(event.request());
        if key.is_empty() {
            return Ok(());
        }

        match self.store.get(&key).await {
            Ok(Some(value)) => {
                debug!(%key, "Cache hit, serving stored result");
                event.set_result(value);
            }
            Ok(None) => {}
            Err(err) => {
                // Fail open: a broken store must not fail the request
                warn!(%key, error = %err, "Cache read failed, treating as miss");
            }
        }
        Ok(())
    }

    async fn after_method_apply(&self, event: &mut MethodApplyEvent) -> Result<()> {
        let Some(cacheable) = event.procedure().cacheable() else {
            return Ok(());
        };

        let key = cacheable.cache_key(event.request());
        let duration = cacheable.cache_duration(event.request());
        if key.is_empty() || duration <= 0 {
            return Ok(());
        }
        let Some(result) = event.result() else {
            return Ok(());
        };

        let ttl = Duration::from_secs(duration.unsigned_abs());
        self.store.set(&key, result.clone(), ttl).await?;

        let tags: BTreeSet<String> = cacheable
            .cache_tags(event.request())
            .into_iter()
            .flatten()
            .filter(|tag| !tag.is_empty())
            .collect();
        if !tags.is_empty() {
            if let Err(err) = self.store.tag(&key, &tags).await {
                warn!(%key, error = %err, "Tagging failed, entry written untagged");
            }
        }

        debug!(%key, ttl_seconds = duration, "Stored procedure result");
        Ok(())
    }
}
