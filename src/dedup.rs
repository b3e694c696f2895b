//! Notification dedup: decide which freshly-synced records warrant an OS
//! notification, once each, across restarts.
//!
//! Each category keeps a bounded seen-id set persisted as JSON in the state
//! dir. Ids are marked seen BEFORE the notifier is invoked, so a notifier
//! crash can at worst drop a notification, never duplicate one. One new
//! record raises a detail notification; several collapse into an aggregate
//! count.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::notification::Notifier;
use crate::settings::Settings;
use crate::types::{DirectMessage, Email, GitHubItem, NotificationItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyCategory {
    Email,
    Notification,
    Github,
}

impl NotifyCategory {
    fn file_name(&self) -> &'static str {
        match self {
            NotifyCategory::Email => "seen_emails.json",
            NotifyCategory::Notification => "seen_notifications.json",
            NotifyCategory::Github => "seen_github.json",
        }
    }

    /// Email volume dwarfs the other feeds, so it gets a larger window.
    fn bound(&self) -> usize {
        match self {
            NotifyCategory::Email => 1000,
            NotifyCategory::Notification | NotifyCategory::Github => 500,
        }
    }
}

/// Insertion-ordered seen-id set, truncated from the oldest end at its bound.
#[derive(Default)]
struct SeenSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenSet {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: String, bound: usize) {
        if self.ids.insert(id.clone()) {
            self.order.push_back(id);
        }
        while self.order.len() > bound {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
struct SeenFile {
    ids: Vec<String>,
}

struct CategoryState {
    email: SeenSet,
    notification: SeenSet,
    github: SeenSet,
    hydrated: bool,
}

impl CategoryState {
    fn set_mut(&mut self, category: NotifyCategory) -> &mut SeenSet {
        match category {
            NotifyCategory::Email => &mut self.email,
            NotifyCategory::Notification => &mut self.notification,
            NotifyCategory::Github => &mut self.github,
        }
    }
}

/// Gate between merged sync results and the OS notifier.
pub struct NotificationGate {
    state_dir: PathBuf,
    notifier: Arc<dyn Notifier>,
    settings: Arc<RwLock<Settings>>,
    seen: Mutex<CategoryState>,
}

impl NotificationGate {
    pub fn new(
        state_dir: PathBuf,
        notifier: Arc<dyn Notifier>,
        settings: Arc<RwLock<Settings>>,
    ) -> Self {
        Self {
            state_dir,
            notifier,
            settings,
            seen: Mutex::new(CategoryState {
                email: SeenSet::default(),
                notification: SeenSet::default(),
                github: SeenSet::default(),
                hydrated: false,
            }),
        }
    }

    /// Evaluate freshly-merged emails. Returns how many were new.
    pub fn check_new_emails(&self, emails: &[Email]) -> usize {
        let enabled = {
            let s = self.settings.read();
            s.notifications.enabled && s.notifications.email_enabled
        };
        self.check_new_batch(
            NotifyCategory::Email,
            emails.iter().map(|e| {
                (
                    e.id.as_str(),
                    format!("New email from {}", e.sender),
                    e.subject.clone(),
                )
            }),
            "new emails",
            enabled,
        )
    }

    pub fn check_new_notifications(&self, items: &[NotificationItem]) -> usize {
        let enabled = {
            let s = self.settings.read();
            s.notifications.enabled && s.notifications.notification_enabled
        };
        self.check_new_batch(
            NotifyCategory::Notification,
            items.iter().map(|n| {
                (
                    n.id.as_str(),
                    n.title.clone(),
                    n.body.clone().unwrap_or_else(|| n.source.clone()),
                )
            }),
            "new notifications",
            enabled,
        )
    }

    pub fn check_new_github_activity(&self, items: &[GitHubItem]) -> usize {
        let enabled = {
            let s = self.settings.read();
            s.notifications.enabled && s.notifications.github_enabled
        };
        self.check_new_batch(
            NotifyCategory::Github,
            items.iter().map(|i| {
                (
                    i.id.as_str(),
                    format!("GitHub: {}", i.repo),
                    i.title.clone(),
                )
            }),
            "GitHub updates",
            enabled,
        )
    }

    /// Core dedup pass: filter out seen ids, mark the rest seen and persist,
    /// then notify. Marking happens before notifying so repeated syncs stay
    /// idempotent even if the notifier fails.
    fn check_new_batch<'a>(
        &self,
        category: NotifyCategory,
        records: impl Iterator<Item = (&'a str, String, String)>,
        aggregate_label: &str,
        enabled: bool,
    ) -> usize {
        let mut fresh: Vec<(String, String)> = Vec::new();
        {
            let mut state = self.seen.lock();
            self.hydrate_locked(&mut state);
            let bound = category.bound();
            let set = state.set_mut(category);
            for (id, title, body) in records {
                if !set.contains(id) {
                    set.insert(id.to_string(), bound);
                    fresh.push((title, body));
                }
            }
            if !fresh.is_empty() {
                self.persist_locked(&state, category);
            }
        }

        if fresh.is_empty() || !enabled || self.dnd_active() {
            return fresh.len();
        }

        let result = match fresh.as_slice() {
            [(title, body)] => self.notifier.notify(title, body),
            many => self
                .notifier
                .notify("HubOS", &format!("{} {}", many.len(), aggregate_label)),
        };
        if let Err(e) = result {
            log::warn!("Failed to raise notification: {e}");
        }

        fresh.len()
    }

    /// Chat messages arrive one at a time and are not deduplicated: the
    /// platform client already delivers each message exactly once.
    pub fn handle_direct_message(&self, message: &DirectMessage) {
        if message.is_from_me {
            return;
        }
        let enabled = {
            let s = self.settings.read();
            s.notifications.enabled && s.notifications.messages_enabled
        };
        if !enabled || self.dnd_active() {
            return;
        }
        let title = format!("{} ({})", message.sender, message.platform.as_str());
        if let Err(e) = self.notifier.notify(&title, &message.body) {
            log::warn!("Failed to raise message notification: {e}");
        }
    }

    /// Raise a one-off notification (reconnect prompts and the like),
    /// honoring the master switch and DND but no per-category flag.
    pub fn notify_direct(&self, title: &str, body: &str) {
        if !self.settings.read().notifications.enabled || self.dnd_active() {
            return;
        }
        if let Err(e) = self.notifier.notify(title, body) {
            log::warn!("Failed to raise notification: {e}");
        }
    }

    fn dnd_active(&self) -> bool {
        let (start, end) = {
            let s = self.settings.read();
            (
                s.notifications.dnd_start.clone(),
                s.notifications.dnd_end.clone(),
            )
        };
        let (Some(start), Some(end)) = (start, end) else {
            return false;
        };
        let (Some(start), Some(end)) = (parse_hhmm(&start), parse_hhmm(&end)) else {
            return false;
        };
        is_dnd_active(chrono::Local::now().time(), start, end)
    }

    /// Load the persisted seen sets on first use.
    fn hydrate_locked(&self, state: &mut CategoryState) {
        if state.hydrated {
            return;
        }
        state.hydrated = true;
        for category in [
            NotifyCategory::Email,
            NotifyCategory::Notification,
            NotifyCategory::Github,
        ] {
            let path = self.state_dir.join(category.file_name());
            let bound = category.bound();
            let set = state.set_mut(category);
            for id in load_seen_file(&path).ids {
                set.insert(id, bound);
            }
        }
    }

    fn persist_locked(&self, state: &CategoryState, category: NotifyCategory) {
        let set = match category {
            NotifyCategory::Email => &state.email,
            NotifyCategory::Notification => &state.notification,
            NotifyCategory::Github => &state.github,
        };
        let file = SeenFile {
            ids: set.order.iter().cloned().collect(),
        };
        let path = self.state_dir.join(category.file_name());
        if let Err(e) = save_seen_file(&path, &file) {
            log::warn!("Failed to persist seen ids for {path:?}: {e}");
        }
    }
}

fn load_seen_file(path: &Path) -> SeenFile {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => SeenFile::default(),
    }
}

fn save_seen_file(path: &Path, file: &SeenFile) -> Result<(), String> {
    let content = serde_json::to_string(file).map_err(|e| format!("Serialize error: {e}"))?;
    std::fs::write(path, content).map_err(|e| format!("Write error: {e}"))
}

/// Parse "HH:MM" into a time of day.
pub fn parse_hhmm(raw: &str) -> Option<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(raw, "%H:%M").ok()
}

/// DND window check. When start > end the window wraps past midnight
/// (22:00..07:00 covers late evening and early morning).
pub fn is_dnd_active(
    now: chrono::NaiveTime,
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
) -> bool {
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}
