//! Collaborators the template functions call out to
//!
//! `lookup` and `getHostByName` never talk to a cluster or a resolver
//! themselves; the embedding application supplies an implementation of
//! [`HostFunctions`]. Calls are synchronous and block the render until they
//! return. No caching or retry happens on this side.

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Failure reported by a host collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait HostFunctions: Send + Sync {
    /// Fetch a live resource; an absent resource is an empty mapping
    fn lookup_kubernetes_resource(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<JsonValue, HostError>;

    /// Resolve a hostname to an address; failure to resolve is `""`
    fn resolve_hostname(&self, host: &str) -> String;
}

/// Host that answers every lookup with nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl HostFunctions for NoopHost {
    fn lookup_kubernetes_resource(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<JsonValue, HostError> {
        tracing::info!(
            api_version,
            kind,
            namespace,
            name,
            "lookup without a cluster connection, returning an empty resource"
        );
        Ok(JsonValue::Object(Map::new()))
    }

    fn resolve_hostname(&self, _host: &str) -> String {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_host() {
        let host = NoopHost;
        let found = host
            .lookup_kubernetes_resource("v1", "Secret", "default", "creds")
            .unwrap();
        assert_eq!(found, serde_json::json!({}));
        assert_eq!(host.resolve_hostname("example.com"), "");
    }
}
