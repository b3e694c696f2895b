//! HubOS core: multi-account synchronization and automation scheduling.
//!
//! This crate is the engine behind the hub UI: it periodically pulls remote
//! state for every connected account (mail, calendar, chat, GitHub), merges
//! it into the local store without clobbering locally-computed AI enrichment,
//! deduplicates user-facing notifications across restarts, and runs
//! user-defined automations on cron schedules under a bounded concurrency
//! pool with cooperative cancellation.
//!
//! Everything platform-specific lives behind seams: [`connector::RemoteConnector`]
//! for per-platform fetching, [`notification::Notifier`] for OS notifications,
//! and [`ai::AiClient`] for LLM calls. The UI/IPC shell consumes the public
//! methods on [`sync::SyncEngine`], [`scheduler::AutomationScheduler`], and
//! [`autosync::AutoSync`].

pub mod ai;
pub mod autosync;
pub mod connector;
pub mod db;
pub mod dedup;
pub mod error;
pub mod merge;
pub mod notification;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod sync;
pub mod types;

pub use error::AutomationError;
pub use state::HubState;
pub use types::{Account, AccountStatus, Platform, SyncSummary};

/// Initialize logging for headless use (`RUST_LOG` controls the level,
/// default `info`). The desktop shell may install its own logger instead;
/// calling this twice is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
