//! The seam between the sync engine and per-platform clients.
//!
//! A connector turns one account's credentials into a [`RemoteState`]
//! snapshot. Connectors are registered per platform; the engine looks them
//! up at sync time so tests can swap in fakes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Account, Platform, RemoteState};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConnectorError {
    pub message: String,
}

impl ConnectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Classify a connector failure as an authentication problem. Auth failures
/// disconnect the account and prompt the user to reconnect; everything else
/// is treated as transient.
pub fn is_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["token", "expired", "invalid", "401", "403", "revoked", "auth"]
        .iter()
        .any(|kw| lower.contains(kw))
}

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn fetch(&self, account: &Account) -> Result<RemoteState, ConnectorError>;
}

/// Per-platform connector lookup, populated once at startup.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<Platform, Arc<dyn RemoteConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, platform: Platform, connector: Arc<dyn RemoteConnector>) {
        self.connectors.insert(platform, connector);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn RemoteConnector>> {
        self.connectors.get(&platform).cloned()
    }
}
