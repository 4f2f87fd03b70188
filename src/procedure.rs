//! Procedure contract and the cacheable-procedure capability
//!
//! A [`Procedure`] is a single RPC-exposed method handler. Procedures that
//! want their results cached opt in by implementing [`CacheableProcedure`]
//! and overriding [`Procedure::cacheable`] to expose the capability. The
//! interceptor discovers the capability through that method, never by name
//! or type inspection.

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::Result;
use crate::protocol::JsonRpcRequest;

/// A single RPC-exposed method handler.
#[async_trait]
pub trait Procedure: Send + Sync {
    /// Execute the procedure and produce its result.
    async fn apply(&self, request: &JsonRpcRequest) -> Result<Value>;

    /// Expose the caching capability, if this procedure opted in.
    ///
    /// Implementations of [`CacheableProcedure`] override this to
    /// `Some(self)`; everything else keeps the default and bypasses the
    /// cache entirely.
    fn cacheable(&self) -> Option<&dyn CacheableProcedure> {
        None
    }
}

/// Capability contract a procedure implements to opt into response caching.
///
/// All three methods are pure functions of the request: no side effects, and
/// safe to call twice per invocation (once in the before hook, once in the
/// after hook). Key derivation must be deterministic for the lifetime of the
/// TTL: identical request, identical key.
pub trait CacheableProcedure: Procedure {
    /// Cache key for this invocation.
    ///
    /// Return an empty string to disable caching for this invocation.
    /// [`build_param_cache_key`] is the usual implementation, but any
    /// deterministic derivation works.
    fn cache_key(&self, request: &JsonRpcRequest) -> String;

    /// TTL in seconds. A value `<= 0` disables the cache write for this
    /// invocation (a pre-execution read may still happen when the key is
    /// non-empty).
    fn cache_duration(&self, request: &JsonRpcRequest) -> i64;

    /// Invalidation tags to attach to the cache entry.
    ///
    /// `None` and empty-string entries are filtered out silently by the
    /// interceptor, so implementations may yield them freely (e.g. from a
    /// helper that only sometimes produces a tag).
    fn cache_tags(&self, request: &JsonRpcRequest) -> Vec<Option<String>> {
        Vec::new()
    }
}

/// Derive a cache key from a method name and its parameters.
///
/// The key format is `{method}-{params_hash}` where `params_hash` is the
/// SHA-256 hex digest of the canonical JSON encoding of `params`.
/// `serde_json` serializes object keys in sorted order, so semantically
/// identical parameter maps produce the same key regardless of the order
/// the caller inserted them in.
#[must_use]
pub fn build_param_cache_key(method: &str, params: &Value) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{method}-{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[test]
    fn build_param_cache_key_is_deterministic() {
        // GIVEN: identical method and parameters
        // WHEN: deriving the key twice
        // THEN: both keys are identical
        let k1 = build_param_cache_key("user.get", &json!({"id": 42, "detail": true}));
        let k2 = build_param_cache_key("user.get", &json!({"id": 42, "detail": true}));
        assert_eq!(k1, k2);
    }

    #[test]
    fn build_param_cache_key_has_method_prefix_and_hex_hash() {
        let key = build_param_cache_key("user.get", &json!({}));
        let hash = key.strip_prefix("user.get-").expect("method prefix");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn build_param_cache_key_is_order_independent() {
        // GIVEN: the same parameter map built in two insertion orders
        let mut forward = Map::new();
        forward.insert("a".to_string(), json!(1));
        forward.insert("b".to_string(), json!(2));
        let mut reverse = Map::new();
        reverse.insert("b".to_string(), json!(2));
        reverse.insert("a".to_string(), json!(1));

        // WHEN: deriving keys
        // THEN: canonical (sorted) serialization makes them collide
        let k1 = build_param_cache_key("m", &Value::Object(forward));
        let k2 = build_param_cache_key("m", &Value::Object(reverse));
        assert_eq!(k1, k2);
    }

    #[test]
    fn build_param_cache_key_differs_for_different_methods() {
        let k1 = build_param_cache_key("user.get", &json!({"id": 1}));
        let k2 = build_param_cache_key("user.list", &json!({"id": 1}));
        assert_ne!(k1, k2);
    }

    #[test]
    fn build_param_cache_key_differs_for_different_params() {
        let k1 = build_param_cache_key("user.get", &json!({"id": 1}));
        let k2 = build_param_cache_key("user.get", &json!({"id": 2}));
        assert_ne!(k1, k2);
    }

    #[test]
    fn plain_procedure_has_no_cacheable_capability() {
        struct Plain;

        #[async_trait]
        impl Procedure for Plain {
            async fn apply(&self, _request: &JsonRpcRequest) -> Result<Value> {
                Ok(json!(null))
            }
        }

        assert!(Plain.cacheable().is_none());
    }
}
