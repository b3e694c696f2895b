//! Periodic sync driver: one background task ticking sync_all_accounts on
//! the configured interval.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::settings::Settings;
use crate::sync::SyncEngine;

pub struct AutoSync {
    engine: Arc<SyncEngine>,
    settings: Arc<RwLock<Settings>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoSync {
    pub fn new(engine: Arc<SyncEngine>, settings: Arc<RwLock<Settings>>) -> Self {
        Self {
            engine,
            settings,
            handle: Mutex::new(None),
        }
    }

    /// Start the periodic loop. No-op if already running. The first tick
    /// happens immediately, preceded by a one-time Gmail connectivity probe.
    /// The interval is re-read from settings each tick so changes apply
    /// without a restart.
    pub fn start(&self) {
        let mut slot = self.handle.lock();
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                log::info!("Auto-sync already running");
                return;
            }
        }

        let engine = self.engine.clone();
        let settings = self.settings.clone();
        log::info!(
            "Starting auto-sync every {}s",
            settings.read().sync_interval_secs
        );
        *slot = Some(tokio::spawn(async move {
            engine.check_gmail_connectivity().await;
            loop {
                engine.sync_all_accounts().await;
                let interval = Duration::from_secs(settings.read().sync_interval_secs.max(1));
                tokio::time::sleep(interval).await;
            }
        }));
    }

    /// Stop the loop. A sync pass already in flight is aborted mid-task; the
    /// single-flight lock clears with it via its guard.
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            log::info!("Auto-sync stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}
