//! Method dispatch pipeline with before/after extension points
//!
//! The [`Dispatcher`] resolves a procedure from the request's method name
//! and runs it between two hook phases. Observers register with a priority
//! per phase; higher priorities run earlier. A before hook that sets the
//! event result short-circuits the invocation: the procedure is not
//! executed and the after phase is skipped entirely. That is the pipeline
//! contract the cache interceptor relies on — a cache hit never triggers a
//! redundant re-write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::procedure::Procedure;
use crate::{Error, Result};

/// Mutable invocation context passed to pipeline observers.
///
/// In the before phase the result slot starts empty; an observer that fills
/// it short-circuits the invocation. In the after phase it holds the value
/// produced by execution, which observers may still replace (the last
/// observer to run sees the final result — the cache interceptor registers
/// at the lowest after-priority for exactly that reason).
pub struct MethodApplyEvent {
    request: JsonRpcRequest,
    procedure: Arc<dyn Procedure>,
    result: Option<Value>,
}

impl MethodApplyEvent {
    /// Create an event for one invocation with an empty result slot
    #[must_use]
    pub fn new(request: JsonRpcRequest, procedure: Arc<dyn Procedure>) -> Self {
        Self {
            request,
            procedure,
            result: None,
        }
    }

    /// The request being dispatched
    #[must_use]
    pub fn request(&self) -> &JsonRpcRequest {
        &self.request
    }

    /// The resolved procedure
    #[must_use]
    pub fn procedure(&self) -> &dyn Procedure {
        &*self.procedure
    }

    /// The current result, if one has been produced or injected
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Whether the result slot has been filled
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Fill (or replace) the result slot
    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }
}

/// A pipeline extension point running around procedure execution.
///
/// Both hooks default to no-ops so observers can participate in a single
/// phase. Hook errors abort the invocation and surface as JSON-RPC error
/// responses.
#[async_trait]
pub trait PipelineObserver: Send + Sync {
    /// Priority in the before phase; higher runs earlier.
    fn before_priority(&self) -> i32 {
        0
    }

    /// Priority in the after phase; higher runs earlier.
    fn after_priority(&self) -> i32 {
        0
    }

    /// Runs before procedure execution. Setting the event result here
    /// short-circuits the invocation.
    async fn before_method_apply(&self, _event: &mut MethodApplyEvent) -> Result<()> {
        Ok(())
    }

    /// Runs after procedure execution with the produced result in the event.
    async fn after_method_apply(&self, _event: &mut MethodApplyEvent) -> Result<()> {
        Ok(())
    }
}

/// Procedure registry plus observer pipeline.
#[derive(Default)]
pub struct Dispatcher {
    procedures: HashMap<String, Arc<dyn Procedure>>,
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl Dispatcher {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure under a method name
    pub fn register(&mut self, method: impl Into<String>, procedure: Arc<dyn Procedure>) {
        self.procedures.insert(method.into(), procedure);
    }

    /// Add a pipeline observer
    pub fn add_observer(&mut self, observer: Arc<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    /// Dispatch a request, mapping any failure to a JSON-RPC error response
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.apply(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::error(Some(id), err.to_rpc_code(), err.to_string()),
        }
    }

    /// Run the full pipeline for one request and produce its result value
    pub async fn apply(&self, request: JsonRpcRequest) -> Result<Value> {
        let procedure = self
            .procedures
            .get(&request.method)
            .cloned()
            .ok_or_else(|| Error::MethodNotFound(request.method.clone()))?;

        let mut event = MethodApplyEvent::new(request, procedure);

        for observer in self.ordered(|o| o.before_priority()) {
            observer.before_method_apply(&mut event).await?;
            if event.has_result() {
                debug!(
                    method = %event.request.method,
                    "Before hook short-circuited invocation"
                );
                return Ok(event.take_result().unwrap_or(Value::Null));
            }
        }

        let result = Arc::clone(&event.procedure).apply(&event.request).await?;
        event.set_result(result);

        for observer in self.ordered(|o| o.after_priority()) {
            observer.after_method_apply(&mut event).await?;
        }

        Ok(event.take_result().unwrap_or(Value::Null))
    }

    /// Observers sorted by descending priority; registration order breaks ties
    fn ordered(&self, priority: impl Fn(&dyn PipelineObserver) -> i32) -> Vec<&Arc<dyn PipelineObserver>> {
        let mut observers: Vec<_> = self.observers.iter().collect();
        observers.sort_by_key(|o| std::cmp::Reverse(priority(o.as_ref())));
        observers
    }
}
