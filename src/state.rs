//! Shared application state handed to the engines at startup. No module owns
//! global mutable state; everything threads through this context.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::connector::ConnectorRegistry;
use crate::db::HubDb;
use crate::notification::{LogNotifier, Notifier};
use crate::settings::Settings;

pub struct HubState {
    pub db: Arc<Mutex<HubDb>>,
    pub settings: Arc<RwLock<Settings>>,
    pub notifier: Arc<dyn Notifier>,
    pub connectors: ConnectorRegistry,
}

impl HubState {
    /// Build state with settings loaded from disk and the log-only notifier.
    pub fn new(db: HubDb, connectors: ConnectorRegistry) -> Self {
        let settings = Settings::load().unwrap_or_else(|e| {
            log::warn!("Failed to load settings, using defaults: {e}");
            Settings::default()
        });
        Self {
            db: Arc::new(Mutex::new(db)),
            settings: Arc::new(RwLock::new(settings)),
            notifier: Arc::new(LogNotifier),
            connectors,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}
