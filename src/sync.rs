//! Account sync orchestrator.
//!
//! One pass fetches every connected account's remote state, merges it into
//! the store, and routes new records through the notification gate. Passes
//! are single-flight: a second trigger while one is running returns a
//! skipped summary instead of piling on. A pass stuck longer than the stale
//! timeout forfeits the lock so a crash inside one account's fetch cannot
//! wedge syncing forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connector::is_auth_error;
use crate::dedup::NotificationGate;
use crate::merge::merge_remote_state;
use crate::state::HubState;
use crate::types::{Account, AccountStatus, Platform, SyncSummary};

/// A sync pass older than this is presumed dead and its lock reclaimed.
/// Shorter than the 5-minute cadence so at most one periodic tick is lost.
const STALE_SYNC_TIMEOUT: Duration = Duration::from_secs(240);

pub struct SyncEngine {
    state: Arc<HubState>,
    gate: Arc<NotificationGate>,
    in_flight: Mutex<Option<Instant>>,
}

struct InFlightGuard<'a>(&'a SyncEngine);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0.in_flight.lock() = None;
    }
}

impl SyncEngine {
    pub fn new(state: Arc<HubState>, gate: Arc<NotificationGate>) -> Self {
        Self {
            state,
            gate,
            in_flight: Mutex::new(None),
        }
    }

    /// Claim the single-flight lock. Returns false when a live pass holds it.
    fn try_begin(&self) -> bool {
        let mut slot = self.in_flight.lock();
        match *slot {
            Some(started) if started.elapsed() < STALE_SYNC_TIMEOUT => false,
            Some(started) => {
                log::warn!(
                    "Reclaiming sync lock held for {}s, previous pass presumed dead",
                    started.elapsed().as_secs()
                );
                *slot = Some(Instant::now());
                true
            }
            None => {
                *slot = Some(Instant::now());
                true
            }
        }
    }

    /// Sync every non-ignored account, one at a time. A failing account is
    /// recorded and skipped; it never aborts the pass.
    pub async fn sync_all_accounts(&self) -> SyncSummary {
        if !self.try_begin() {
            log::info!("Sync already in progress, skipping");
            return SyncSummary::skipped();
        }
        let _guard = InFlightGuard(self);

        let accounts = match self.state.db.lock().get_all_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                log::error!("Failed to load accounts for sync: {e}");
                return SyncSummary {
                    success: false,
                    synced: Vec::new(),
                };
            }
        };

        let mut synced = Vec::new();
        for account in accounts.iter().filter(|a| !a.ignored) {
            match self.sync_account(account).await {
                Ok(()) => synced.push(account.name.clone()),
                Err(e) => {
                    log::warn!("Sync failed for account '{}': {e}", account.name);
                    self.mark_sync_failure(account, &e);
                }
            }
        }

        log::info!("Sync pass complete: {} accounts synced", synced.len());
        SyncSummary {
            success: true,
            synced,
        }
    }

    async fn sync_account(&self, account: &Account) -> Result<(), String> {
        let connector = self
            .state
            .connectors
            .get(account.platform)
            .ok_or_else(|| format!("No connector registered for {}", account.platform.as_str()))?;

        let remote = connector
            .fetch(account)
            .await
            .map_err(|e| e.message)?;

        let merged = {
            let db = self.state.db.lock();
            let local_emails = db.get_emails_for_account(&account.id)?;
            let local_events = db.get_events_for_account(&account.id)?;
            let local_notifications = db.get_notifications_for_account(&account.id)?;
            let local_items = db.get_github_items_for_account(&account.id)?;

            let merged = merge_remote_state(
                remote,
                &local_emails,
                &local_events,
                &local_notifications,
                &local_items,
            );

            db.bulk_upsert_emails(&merged.emails)?;
            db.bulk_upsert_events(&merged.events)?;
            db.bulk_upsert_notifications(&merged.notifications)?;
            db.bulk_upsert_github_items(&merged.items)?;

            db.set_account_sync_state(
                &account.id,
                Some(true),
                AccountStatus::Connected,
                Some(&chrono::Utc::now().to_rfc3339()),
            )?;

            merged
        };

        // Notify outside the db lock; calendar events never notify.
        self.gate.check_new_emails(&merged.emails);
        self.gate.check_new_notifications(&merged.notifications);
        self.gate.check_new_github_activity(&merged.items);

        Ok(())
    }

    /// Classify the failure and update the account row. Auth failures
    /// disconnect the account and prompt the user; transient failures keep
    /// the connection flag so the next pass retries quietly.
    fn mark_sync_failure(&self, account: &Account, message: &str) {
        if is_auth_error(message) {
            let result = self.state.db.lock().set_account_sync_state(
                &account.id,
                Some(false),
                AccountStatus::Disconnected,
                None,
            );
            if let Err(e) = result {
                log::error!("Failed to mark account '{}' disconnected: {e}", account.name);
            }
            self.gate.notify_direct(
                "Account disconnected",
                &format!("{} needs to be reconnected", account.name),
            );
        } else {
            let result = self.state.db.lock().set_account_sync_state(
                &account.id,
                None,
                AccountStatus::Error,
                None,
            );
            if let Err(e) = result {
                log::error!("Failed to mark account '{}' errored: {e}", account.name);
            }
        }
    }

    /// Probe every Google account with a fetch and surface dead tokens
    /// early, without waiting for the next full pass to fail.
    pub async fn check_gmail_connectivity(&self) {
        let accounts = match self.state.db.lock().get_all_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                log::error!("Failed to load accounts for connectivity check: {e}");
                return;
            }
        };

        for account in accounts
            .iter()
            .filter(|a| a.platform == Platform::Google && !a.ignored && a.is_connected)
        {
            let Some(connector) = self.state.connectors.get(Platform::Google) else {
                return;
            };
            if let Err(e) = connector.fetch(account).await {
                if is_auth_error(&e.message) {
                    log::warn!("Gmail connectivity check failed for '{}': {e}", account.name);
                    self.mark_sync_failure(account, &e.message);
                }
            }
        }
    }

    #[cfg(test)]
    fn backdate_in_flight(&self, age: Duration) {
        *self.in_flight.lock() = Instant::now().checked_sub(age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorError, ConnectorRegistry, RemoteConnector};
    use crate::db::HubDb;
    use crate::notification::RecordingNotifier;
    use crate::settings::Settings;
    use crate::types::{Email, RemoteState};
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use tokio::sync::Semaphore;

    struct FixedConnector {
        result: Result<RemoteState, String>,
    }

    #[async_trait]
    impl RemoteConnector for FixedConnector {
        async fn fetch(&self, _account: &Account) -> Result<RemoteState, ConnectorError> {
            self.result
                .clone()
                .map_err(ConnectorError::new)
        }
    }

    /// Connector that parks mid-fetch until released.
    struct ParkedConnector {
        started: Arc<Semaphore>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl RemoteConnector for ParkedConnector {
        async fn fetch(&self, _account: &Account) -> Result<RemoteState, ConnectorError> {
            self.started.add_permits(1);
            if let Ok(p) = self.release.acquire().await {
                p.forget();
            }
            Ok(RemoteState::default())
        }
    }

    fn account(id: &str, platform: Platform) -> Account {
        Account {
            id: id.to_string(),
            platform,
            name: format!("Account {id}"),
            email: None,
            credentials: Some("tok".to_string()),
            is_connected: true,
            status: AccountStatus::Connected,
            last_sync: None,
            ignored: false,
        }
    }

    fn email(id: &str) -> Email {
        Email {
            id: id.to_string(),
            account_id: "a1".to_string(),
            sender: "alice@example.com".to_string(),
            subject: "Hello".to_string(),
            snippet: None,
            received_at: "2026-02-01T09:00:00Z".to_string(),
            is_unread: true,
            ai_summary: None,
            ai_category: None,
            ai_priority: None,
            ai_suggested_reply: None,
            tags: Vec::new(),
        }
    }

    fn engine_with(
        registry: ConnectorRegistry,
    ) -> (Arc<SyncEngine>, Arc<RecordingNotifier>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = HubDb::open_at(dir.path().join("test.db")).unwrap();
        let notifier = RecordingNotifier::new();
        let settings = Arc::new(RwLock::new(Settings::default()));
        let gate = Arc::new(NotificationGate::new(
            dir.path().to_path_buf(),
            notifier.clone(),
            settings.clone(),
        ));
        let state = Arc::new(HubState {
            db: Arc::new(Mutex::new(db)),
            settings,
            notifier: notifier.clone(),
            connectors: registry,
        });
        (Arc::new(SyncEngine::new(state, gate)), notifier, dir)
    }

    #[tokio::test]
    async fn test_successful_pass_updates_account_and_stores_records() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(FixedConnector {
                result: Ok(RemoteState {
                    emails: vec![email("e1")],
                    ..Default::default()
                }),
            }),
        );
        let (engine, notifier, _dir) = engine_with(registry);
        engine
            .state
            .db
            .lock()
            .upsert_account(&account("a1", Platform::Google))
            .unwrap();

        let summary = engine.sync_all_accounts().await;
        assert!(summary.success);
        assert_eq!(summary.synced, vec!["Account a1"]);

        let db = engine.state.db.lock();
        let stored = db.get_account("a1").unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Connected);
        assert!(stored.last_sync.is_some());
        assert_eq!(db.get_emails_for_account("a1").unwrap().len(), 1);
        drop(db);

        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_account_failures_are_isolated() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(FixedConnector {
                result: Err("connection reset by peer".to_string()),
            }),
        );
        registry.register(
            Platform::Slack,
            Arc::new(FixedConnector {
                result: Ok(RemoteState::default()),
            }),
        );
        let (engine, _, _dir) = engine_with(registry);
        {
            let db = engine.state.db.lock();
            db.upsert_account(&account("a1", Platform::Google)).unwrap();
            db.upsert_account(&account("a2", Platform::Slack)).unwrap();
        }

        let summary = engine.sync_all_accounts().await;
        assert!(summary.success);
        assert_eq!(summary.synced, vec!["Account a2"]);

        // Transient failure: errored but still connected.
        let failed = engine.state.db.lock().get_account("a1").unwrap().unwrap();
        assert_eq!(failed.status, AccountStatus::Error);
        assert!(failed.is_connected);
    }

    #[tokio::test]
    async fn test_auth_failure_disconnects_and_prompts() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(FixedConnector {
                result: Err("HTTP 401: token expired".to_string()),
            }),
        );
        let (engine, notifier, _dir) = engine_with(registry);
        engine
            .state
            .db
            .lock()
            .upsert_account(&account("a1", Platform::Google))
            .unwrap();

        engine.sync_all_accounts().await;

        let stored = engine.state.db.lock().get_account("a1").unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Disconnected);
        assert!(!stored.is_connected);
        assert_eq!(notifier.titles(), vec!["Account disconnected"]);
    }

    #[tokio::test]
    async fn test_ignored_accounts_are_skipped() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(FixedConnector {
                result: Ok(RemoteState::default()),
            }),
        );
        registry.register(
            Platform::Slack,
            Arc::new(FixedConnector {
                result: Ok(RemoteState::default()),
            }),
        );
        let (engine, _, _dir) = engine_with(registry);
        {
            let db = engine.state.db.lock();
            db.upsert_account(&account("a1", Platform::Google)).unwrap();
            let mut ignored = account("a2", Platform::Slack);
            ignored.ignored = true;
            db.upsert_account(&ignored).unwrap();
        }

        let summary = engine.sync_all_accounts().await;
        assert!(summary.success);
        assert_eq!(summary.synced, vec!["Account a1"]);
    }

    #[tokio::test]
    async fn test_concurrent_pass_is_skipped() {
        let started = Arc::new(Semaphore::new(0));
        let release = Arc::new(Semaphore::new(0));
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(ParkedConnector {
                started: started.clone(),
                release: release.clone(),
            }),
        );
        let (engine, _, _dir) = engine_with(registry);
        engine
            .state
            .db
            .lock()
            .upsert_account(&account("a1", Platform::Google))
            .unwrap();

        let first = engine.clone();
        let handle = tokio::spawn(async move { first.sync_all_accounts().await });
        started.acquire().await.unwrap().forget();

        // Second trigger while the first pass is mid-fetch.
        let second = engine.sync_all_accounts().await;
        assert!(!second.success);
        assert!(second.synced.is_empty());

        release.add_permits(1);
        let first_summary = handle.await.unwrap();
        assert!(first_summary.success);
    }

    #[tokio::test]
    async fn test_stale_lock_is_reclaimed() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(FixedConnector {
                result: Ok(RemoteState::default()),
            }),
        );
        let (engine, _, _dir) = engine_with(registry);
        engine
            .state
            .db
            .lock()
            .upsert_account(&account("a1", Platform::Google))
            .unwrap();

        // A lock just under the timeout still blocks.
        engine.backdate_in_flight(STALE_SYNC_TIMEOUT - Duration::from_secs(5));
        assert!(!engine.sync_all_accounts().await.success);

        // Past the timeout it is reclaimed and the pass proceeds.
        engine.backdate_in_flight(STALE_SYNC_TIMEOUT + Duration::from_secs(5));
        let summary = engine.sync_all_accounts().await;
        assert!(summary.success);
        assert_eq!(summary.synced.len(), 1);
    }

    #[tokio::test]
    async fn test_connectivity_check_flags_dead_google_tokens() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(FixedConnector {
                result: Err("invalid_grant: token revoked".to_string()),
            }),
        );
        let (engine, notifier, _dir) = engine_with(registry);
        engine
            .state
            .db
            .lock()
            .upsert_account(&account("a1", Platform::Google))
            .unwrap();

        engine.check_gmail_connectivity().await;

        let stored = engine.state.db.lock().get_account("a1").unwrap().unwrap();
        assert!(!stored.is_connected);
        assert_eq!(stored.status, AccountStatus::Disconnected);
        assert_eq!(notifier.titles(), vec!["Account disconnected"]);
    }

    #[tokio::test]
    async fn test_enrichment_survives_sync_pass() {
        let mut registry = ConnectorRegistry::new();
        registry.register(
            Platform::Google,
            Arc::new(FixedConnector {
                result: Ok(RemoteState {
                    emails: vec![email("e1")],
                    ..Default::default()
                }),
            }),
        );
        let (engine, _, _dir) = engine_with(registry);
        {
            let db = engine.state.db.lock();
            db.upsert_account(&account("a1", Platform::Google)).unwrap();
            let mut enriched = email("e1");
            enriched.ai_summary = Some("Greeting from Alice".to_string());
            db.bulk_upsert_emails(&[enriched]).unwrap();
        }

        engine.sync_all_accounts().await;

        let stored = &engine.state.db.lock().get_emails_for_account("a1").unwrap()[0];
        assert_eq!(stored.ai_summary.as_deref(), Some("Greeting from Alice"));
    }
}
