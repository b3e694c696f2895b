//! Merge engine: reconcile a fresh remote fetch with locally-stored records.
//!
//! The remote side is authoritative for core fields (subjects, timestamps,
//! read state) and for membership: records absent from the fetch drop out.
//! The local side is authoritative for AI enrichment, which the remote never
//! carries. Adoption only fills enrichment the incoming record does not
//! already have, so a record annotated mid-flight keeps its newer values.

use std::collections::HashMap;

use crate::types::{CalendarEvent, Email, GitHubItem, NotificationItem, RemoteState};

/// A record the merge engine can reconcile by id.
pub trait Mergeable {
    fn record_id(&self) -> &str;

    /// Copy enrichment from the stored record into `self` for every
    /// enrichment field `self` has unset.
    fn adopt_enrichment(&mut self, local: &Self);
}

impl Mergeable for Email {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn adopt_enrichment(&mut self, local: &Self) {
        if self.ai_summary.is_none() {
            self.ai_summary = local.ai_summary.clone();
        }
        if self.ai_category.is_none() {
            self.ai_category = local.ai_category.clone();
        }
        if self.ai_priority.is_none() {
            self.ai_priority = local.ai_priority;
        }
        if self.ai_suggested_reply.is_none() {
            self.ai_suggested_reply = local.ai_suggested_reply.clone();
        }
        if self.tags.is_empty() {
            self.tags = local.tags.clone();
        }
    }
}

impl Mergeable for CalendarEvent {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn adopt_enrichment(&mut self, local: &Self) {
        if self.ai_briefing.is_none() {
            self.ai_briefing = local.ai_briefing.clone();
        }
        if self.ai_action_items.is_empty() {
            self.ai_action_items = local.ai_action_items.clone();
        }
    }
}

impl Mergeable for NotificationItem {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn adopt_enrichment(&mut self, local: &Self) {
        if self.ai_insight.is_none() {
            self.ai_insight = local.ai_insight.clone();
        }
    }
}

impl Mergeable for GitHubItem {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn adopt_enrichment(&mut self, local: &Self) {
        if self.ai_insight.is_none() {
            self.ai_insight = local.ai_insight.clone();
        }
    }
}

/// Merge one fetched collection against its stored counterpart. Output order
/// and membership follow the remote list.
pub fn merge_records<T: Mergeable>(mut remote: Vec<T>, local: &[T]) -> Vec<T> {
    let by_id: HashMap<&str, &T> = local.iter().map(|r| (r.record_id(), r)).collect();

    for record in &mut remote {
        let id = record.record_id().to_string();
        if let Some(stored) = by_id.get(id.as_str()) {
            record.adopt_enrichment(stored);
        }
    }

    remote
}

/// Merge a whole [`RemoteState`] against the stored collections for one account.
pub fn merge_remote_state(
    remote: RemoteState,
    local_emails: &[Email],
    local_events: &[CalendarEvent],
    local_notifications: &[NotificationItem],
    local_items: &[GitHubItem],
) -> RemoteState {
    RemoteState {
        emails: merge_records(remote.emails, local_emails),
        events: merge_records(remote.events, local_events),
        notifications: merge_records(remote.notifications, local_notifications),
        items: merge_records(remote.items, local_items),
    }
}
