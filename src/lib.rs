//! Read-through response caching for JSON-RPC method dispatch pipelines.
//!
//! Procedures opt into caching by implementing [`CacheableProcedure`]: a
//! deterministic cache key, a TTL in seconds, and optional invalidation
//! tags, each derived purely from the incoming request. The
//! [`CacheInterceptor`] hooks the dispatch pipeline immediately around
//! execution — serving a stored result on a hit, and storing the produced
//! result with its TTL and tags after a miss. Storage is pluggable through
//! the [`CacheStore`] trait; [`MemoryStore`] is the bundled thread-safe
//! reference implementation.
//!
//! Cache failures never change an RPC result: read errors fail open (the
//! procedure executes normally), and only write errors propagate.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use serde_json::{Value, json};
//!
//! use jsonrpc_cache::{
//!     CacheInterceptor, CacheStore, CacheableProcedure, Dispatcher, JsonRpcRequest,
//!     MemoryStore, Procedure, Result, build_param_cache_key,
//! };
//!
//! struct UserGet;
//!
//! #[async_trait]
//! impl Procedure for UserGet {
//!     async fn apply(&self, _request: &JsonRpcRequest) -> Result<Value> {
//!         Ok(json!({"name": "ada"}))
//!     }
//!     fn cacheable(&self) -> Option<&dyn CacheableProcedure> {
//!         Some(self)
//!     }
//! }
//!
//! impl CacheableProcedure for UserGet {
//!     fn cache_key(&self, request: &JsonRpcRequest) -> String {
//!         build_param_cache_key(&request.method, request.params_or_null())
//!     }
//!     fn cache_duration(&self, _request: &JsonRpcRequest) -> i64 {
//!         3600
//!     }
//!     fn cache_tags(&self, _request: &JsonRpcRequest) -> Vec<Option<String>> {
//!         vec![Some("user".to_string())]
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.register("user.get", Arc::new(UserGet));
//! dispatcher.add_observer(Arc::new(CacheInterceptor::new(store as Arc<dyn CacheStore>)));
//!
//! let request = JsonRpcRequest::new(1, "user.get", Some(json!({"id": 42})));
//! let first = dispatcher.dispatch(request.clone()).await;
//! let second = dispatcher.dispatch(request).await; // served from cache
//! assert_eq!(first.result, second.result);
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;
pub mod error;
pub mod interceptor;
pub mod procedure;
pub mod protocol;
pub mod store;

pub use dispatcher::{Dispatcher, MethodApplyEvent, PipelineObserver};
pub use error::{Error, Result};
pub use interceptor::{CACHE_AFTER_PRIORITY, CACHE_BEFORE_PRIORITY, CacheInterceptor};
pub use procedure::{CacheableProcedure, Procedure, build_param_cache_key};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use store::{CacheStore, MemoryStore, StoreStats, spawn_cleanup_task};
