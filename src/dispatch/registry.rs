//! Method invoker registry.
//!
//! Maps a request's `method_identifier` to the invoker that serves it.
//! Registration may happen at any time, including while traffic is flowing;
//! the map is concurrent so lookups never block on registration.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;

use crate::protocol::Transporter;

/// Errors an invoker may return; sent back to the caller as the reply error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Failed(String),
}

/// A server-side method reachable over the wire.
///
/// Invokers run on the invocation executor and may block.
pub trait ServerMethodInvoker: Send + Sync {
    fn method_identifier(&self) -> &str;

    fn invoke(&self, args: Bytes) -> Result<Bytes, InvokeError>;
}

/// Adapter turning a closure into a [`ServerMethodInvoker`].
pub struct FnMethodInvoker<F> {
    identifier: String,
    f: F,
}

impl<F> FnMethodInvoker<F>
where
    F: Fn(Bytes) -> Result<Bytes, InvokeError> + Send + Sync,
{
    pub fn new(identifier: impl Into<String>, f: F) -> Self {
        Self {
            identifier: identifier.into(),
            f,
        }
    }
}

impl<F> ServerMethodInvoker for FnMethodInvoker<F>
where
    F: Fn(Bytes) -> Result<Bytes, InvokeError> + Send + Sync,
{
    fn method_identifier(&self) -> &str {
        &self.identifier
    }

    fn invoke(&self, args: Bytes) -> Result<Bytes, InvokeError> {
        (self.f)(args)
    }
}

/// Concurrent map of method identifier to invoker. Clones share the map.
#[derive(Clone, Default)]
pub struct MethodInvokerRegistry {
    invokers: Arc<DashMap<String, Arc<dyn ServerMethodInvoker>>>,
}

impl MethodInvokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an invoker, returning the one it replaced, if any.
    pub fn register(
        &self,
        invoker: Arc<dyn ServerMethodInvoker>,
    ) -> Option<Arc<dyn ServerMethodInvoker>> {
        let identifier = invoker.method_identifier().to_string();
        let previous = self.invokers.insert(identifier.clone(), invoker);
        if previous.is_some() {
            tracing::warn!(method = %identifier, "Method invoker replaced");
        } else {
            tracing::debug!(method = %identifier, "Method invoker registered");
        }
        previous
    }

    pub fn get(&self, method_identifier: &str) -> Option<Arc<dyn ServerMethodInvoker>> {
        self.invokers
            .get(method_identifier)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, method_identifier: &str) -> bool {
        self.invokers.contains_key(method_identifier)
    }

    pub fn len(&self) -> usize {
        self.invokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invokers.is_empty()
    }

    /// Run the invoker for `request` and build the reply.
    pub fn invoke(&self, request: &Transporter) -> Transporter {
        let method = request.method_identifier();
        let Some(invoker) = self.get(method) else {
            return request.reply_error(format!("method invoker not found: {}", method));
        };

        let body = request.body.clone();
        match catch_unwind(AssertUnwindSafe(|| invoker.invoke(body))) {
            Ok(Ok(result)) => request.reply(result),
            Ok(Err(e)) => request.reply_error(e.to_string()),
            Err(_) => {
                tracing::error!(method = %method, "Method invoker panicked");
                request.reply_error("method invoker panicked")
            }
        }
    }
}

impl std::fmt::Debug for MethodInvokerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInvokerRegistry")
            .field("invokers", &self.invokers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Arc<dyn ServerMethodInvoker> {
        Arc::new(FnMethodInvoker::new("echo", |args| Ok(args)))
    }

    #[test]
    fn invokes_registered_method() {
        let registry = MethodInvokerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register(echo()).is_none());
        assert!(registry.contains("echo"));

        let reply = registry.invoke(&Transporter::request("echo", 3, "ping"));
        assert_eq!(reply.opaque(), 3);
        assert_eq!(reply.body, Bytes::from_static(b"ping"));
        assert!(!reply.is_error());
    }

    #[test]
    fn unknown_method_is_error_reply() {
        let registry = MethodInvokerRegistry::new();
        let reply = registry.invoke(&Transporter::request("missing", 1, ""));
        assert_eq!(
            reply.header.error.as_deref(),
            Some("method invoker not found: missing")
        );
    }

    #[test]
    fn register_replaces_same_identifier() {
        let registry = MethodInvokerRegistry::new();
        registry.register(echo());
        let replaced = registry.register(Arc::new(FnMethodInvoker::new("echo", |_| {
            Ok(Bytes::from_static(b"v2"))
        })));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);

        let reply = registry.invoke(&Transporter::request("echo", 1, "x"));
        assert_eq!(reply.body, Bytes::from_static(b"v2"));
    }

    #[test]
    fn invoker_failures_become_error_replies() {
        let registry = MethodInvokerRegistry::new();
        registry.register(Arc::new(FnMethodInvoker::new("fail", |_| {
            Err(InvokeError::Failed("no capacity".into()))
        })));
        registry.register(Arc::new(FnMethodInvoker::new("panic", |_| -> Result<Bytes, InvokeError> {
            panic!("bug")
        })));

        let failed = registry.invoke(&Transporter::request("fail", 1, ""));
        assert_eq!(failed.header.error.as_deref(), Some("no capacity"));

        let panicked = registry.invoke(&Transporter::request("panic", 2, ""));
        assert_eq!(panicked.header.error.as_deref(), Some("method invoker panicked"));
    }

    #[test]
    fn clones_share_registrations() {
        let registry = MethodInvokerRegistry::new();
        let clone = registry.clone();
        clone.register(echo());
        assert!(registry.contains("echo"));
    }
}
