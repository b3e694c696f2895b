//! Core data model: accounts, syncable records, automation definitions.
//!
//! Syncable records (emails, calendar events, platform notifications, GitHub
//! items) carry two kinds of fields: core fields that come from the remote
//! source on every fetch, and locally-owned enrichment fields (AI summaries,
//! priorities, tags) that only this app ever writes. The merge engine and the
//! db upsert layer both guarantee enrichment survives a fresh fetch.

use serde::{Deserialize, Serialize};

// =============================================================================
// Accounts
// =============================================================================

/// A platform a hub account can be linked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Google,
    Outlook,
    Slack,
    Github,
    Whatsapp,
    Telegram,
    Discord,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Google => "google",
            Platform::Outlook => "outlook",
            Platform::Slack => "slack",
            Platform::Github => "github",
            Platform::Whatsapp => "whatsapp",
            Platform::Telegram => "telegram",
            Platform::Discord => "discord",
        }
    }

    pub fn parse(s: &str) -> Option<Platform> {
        match s {
            "google" => Some(Platform::Google),
            "outlook" => Some(Platform::Outlook),
            "slack" => Some(Platform::Slack),
            "github" => Some(Platform::Github),
            "whatsapp" => Some(Platform::Whatsapp),
            "telegram" => Some(Platform::Telegram),
            "discord" => Some(Platform::Discord),
            _ => None,
        }
    }
}

/// Health of an account as observed by the last sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Connected,
    Error,
    Disconnected,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Connected => "connected",
            AccountStatus::Error => "error",
            AccountStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<AccountStatus> {
        match s {
            "connected" => Some(AccountStatus::Connected),
            "error" => Some(AccountStatus::Error),
            "disconnected" => Some(AccountStatus::Disconnected),
            _ => None,
        }
    }
}

/// One linked external identity. Created by the UI when the user links a
/// platform; the sync orchestrator mutates status/is_connected/last_sync
/// after every attempt and never deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub platform: Platform,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Opaque token blob owned by the connector layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    pub is_connected: bool,
    pub status: AccountStatus,
    /// RFC 3339 timestamp of the last successful sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    /// Excluded from sync entirely when true.
    #[serde(default)]
    pub ignored: bool,
}

// =============================================================================
// Syncable records
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    pub account_id: String,
    pub sender: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub received_at: String,
    #[serde(default)]
    pub is_unread: bool,
    // Locally-owned enrichment, never supplied by the remote source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_suggested_reply: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub account_id: String,
    pub title: String,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    // Locally-owned enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_briefing: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ai_action_items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    pub id: String,
    pub account_id: String,
    /// Originating channel/workspace label (e.g. a Slack channel).
    pub source: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub timestamp: String,
    // Locally-owned enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insight: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubItem {
    pub id: String,
    pub account_id: String,
    /// "pr" | "issue" | "mention"; opaque to the core.
    pub kind: String,
    pub title: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub updated_at: String,
    // Locally-owned enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insight: Option<String>,
}

/// What one connector fetch returns for one account. Connectors fill only
/// the entity types their platform has.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteState {
    #[serde(default)]
    pub emails: Vec<Email>,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
    #[serde(default)]
    pub notifications: Vec<NotificationItem>,
    #[serde(default)]
    pub items: Vec<GitHubItem>,
}

/// A single incoming chat message (WhatsApp/Telegram/Discord), delivered
/// per-message by the platform client rather than per-batch by a sync pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub platform: Platform,
    pub sender: String,
    pub body: String,
    #[serde(default)]
    pub is_from_me: bool,
}

// =============================================================================
// Automations
// =============================================================================

/// LLM provider configuration, validated at the boundary before a definition
/// enters the scheduler. Tagged by provider so each variant carries only the
/// fields that provider actually needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum AiProviderConfig {
    Google { api_key: String, model: String },
    Openrouter { api_key: String, model: String },
    Openai { api_key: String, model: String },
    Anthropic { api_key: String, model: String },
    Ollama { host: String, model: String },
    Local { model_path: String },
}

impl AiProviderConfig {
    /// Reject configs with missing required fields before they reach the
    /// scheduler or an AI client.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AiProviderConfig::Google { api_key, model }
            | AiProviderConfig::Openrouter { api_key, model }
            | AiProviderConfig::Openai { api_key, model }
            | AiProviderConfig::Anthropic { api_key, model } => {
                if api_key.trim().is_empty() {
                    return Err(format!("{}: apiKey is required", self.provider_name()));
                }
                if model.trim().is_empty() {
                    return Err(format!("{}: model is required", self.provider_name()));
                }
                Ok(())
            }
            AiProviderConfig::Ollama { host, model } => {
                if host.trim().is_empty() {
                    return Err("ollama: host is required".to_string());
                }
                if model.trim().is_empty() {
                    return Err("ollama: model is required".to_string());
                }
                Ok(())
            }
            AiProviderConfig::Local { model_path } => {
                if model_path.trim().is_empty() {
                    return Err("local: modelPath is required".to_string());
                }
                Ok(())
            }
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            AiProviderConfig::Google { .. } => "google",
            AiProviderConfig::Openrouter { .. } => "openrouter",
            AiProviderConfig::Openai { .. } => "openai",
            AiProviderConfig::Anthropic { .. } => "anthropic",
            AiProviderConfig::Ollama { .. } => "ollama",
            AiProviderConfig::Local { .. } => "local",
        }
    }
}

/// A user-defined automation job. Created/edited by the UI; the scheduler
/// loads these into its in-memory registry on start and on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationDefinition {
    pub id: String,
    pub name: String,
    /// Natural-language task description, also fed to the post-run analysis.
    pub task: String,
    /// 5-field cron expression; absent means manual/startup-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default)]
    pub run_on_startup: bool,
    /// Command line the runner executes (program + args).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Provider for post-run analysis; absent disables analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AiProviderConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<RunOutcome> {
        match s {
            "completed" => Some(RunOutcome::Completed),
            "failed" => Some(RunOutcome::Failed),
            "cancelled" => Some(RunOutcome::Cancelled),
            _ => None,
        }
    }
}

/// History record for one automation run. Inserted when the run starts,
/// finalized when it completes/fails/cancels, so history survives restarts
/// even though the scheduler's running-set is in-memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRun {
    pub id: String,
    pub automation_id: String,
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

impl AutomationRun {
    /// Create the in-progress record persisted at run start.
    pub fn begin(automation_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            automation_id: automation_id.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            outcome: None,
            output: None,
            error: None,
            analysis: None,
        }
    }
}

// =============================================================================
// Sync results
// =============================================================================

/// Result of one `sync_all_accounts` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub success: bool,
    /// Names of accounts whose sync step completed.
    pub synced: Vec<String>,
}

impl SyncSummary {
    pub fn skipped() -> Self {
        Self {
            success: false,
            synced: Vec::new(),
        }
    }
}

/// Aggregate scheduler state exposed to the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub max_concurrent: usize,
    pub running_count: usize,
}
