//! Persistence for platform notifications (Slack etc.) and GitHub activity.

use rusqlite::{params, Row};

use super::HubDb;
use crate::types::{GitHubItem, NotificationItem};

fn map_notification_row(row: &Row) -> rusqlite::Result<NotificationItem> {
    Ok(NotificationItem {
        id: row.get("notification_id")?,
        account_id: row.get("account_id")?,
        source: row.get("source")?,
        title: row.get("title")?,
        body: row.get("body")?,
        timestamp: row.get("timestamp")?,
        ai_insight: row.get("ai_insight")?,
    })
}

fn map_github_row(row: &Row) -> rusqlite::Result<GitHubItem> {
    Ok(GitHubItem {
        id: row.get("item_id")?,
        account_id: row.get("account_id")?,
        kind: row.get("kind")?,
        title: row.get("title")?,
        repo: row.get("repo")?,
        url: row.get("url")?,
        updated_at: row.get("updated_at_remote")?,
        ai_insight: row.get("ai_insight")?,
    })
}

impl HubDb {
    pub fn get_notifications_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<NotificationItem>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM notifications WHERE account_id = ?1 ORDER BY timestamp DESC")
            .map_err(|e| format!("Failed to prepare notifications query: {e}"))?;

        let items = stmt
            .query_map(params![account_id], map_notification_row)
            .map_err(|e| format!("Failed to query notifications: {e}"))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(items)
    }

    pub fn bulk_upsert_notifications(&self, items: &[NotificationItem]) -> Result<(), String> {
        self.with_transaction(|db| {
            for item in items {
                db.upsert_notification(item)?;
            }
            Ok(())
        })
    }

    fn upsert_notification(&self, item: &NotificationItem) -> Result<(), String> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO notifications (notification_id, account_id, source, title, body, timestamp,
                                            ai_insight, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(notification_id) DO UPDATE SET
                     account_id = excluded.account_id,
                     source = excluded.source,
                     title = excluded.title,
                     body = excluded.body,
                     timestamp = excluded.timestamp,
                     ai_insight = COALESCE(excluded.ai_insight, ai_insight),
                     updated_at = excluded.updated_at",
                params![
                    item.id,
                    item.account_id,
                    item.source,
                    item.title,
                    item.body,
                    item.timestamp,
                    item.ai_insight,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert notification: {e}"))?;
        Ok(())
    }

    pub fn clear_notifications_for_account(&self, account_id: &str) -> Result<usize, String> {
        self.conn
            .execute(
                "DELETE FROM notifications WHERE account_id = ?1",
                params![account_id],
            )
            .map_err(|e| format!("Failed to clear notifications: {e}"))
    }

    pub fn get_github_items_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<GitHubItem>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT * FROM github_items WHERE account_id = ?1 ORDER BY updated_at_remote DESC",
            )
            .map_err(|e| format!("Failed to prepare github items query: {e}"))?;

        let items = stmt
            .query_map(params![account_id], map_github_row)
            .map_err(|e| format!("Failed to query github items: {e}"))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(items)
    }

    pub fn bulk_upsert_github_items(&self, items: &[GitHubItem]) -> Result<(), String> {
        self.with_transaction(|db| {
            for item in items {
                db.upsert_github_item(item)?;
            }
            Ok(())
        })
    }

    fn upsert_github_item(&self, item: &GitHubItem) -> Result<(), String> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO github_items (item_id, account_id, kind, title, repo, url,
                                           updated_at_remote, ai_insight, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(item_id) DO UPDATE SET
                     account_id = excluded.account_id,
                     kind = excluded.kind,
                     title = excluded.title,
                     repo = excluded.repo,
                     url = excluded.url,
                     updated_at_remote = excluded.updated_at_remote,
                     ai_insight = COALESCE(excluded.ai_insight, ai_insight),
                     updated_at = excluded.updated_at",
                params![
                    item.id,
                    item.account_id,
                    item.kind,
                    item.title,
                    item.repo,
                    item.url,
                    item.updated_at,
                    item.ai_insight,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert github item: {e}"))?;
        Ok(())
    }

    pub fn clear_github_items_for_account(&self, account_id: &str) -> Result<usize, String> {
        self.conn
            .execute(
                "DELETE FROM github_items WHERE account_id = ?1",
                params![account_id],
            )
            .map_err(|e| format!("Failed to clear github items: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn sample_notification(id: &str) -> NotificationItem {
        NotificationItem {
            id: id.to_string(),
            account_id: "a1".to_string(),
            source: "#general".to_string(),
            title: "New message in #general".to_string(),
            body: Some("deploy went out".to_string()),
            timestamp: "2026-02-01T10:00:00Z".to_string(),
            ai_insight: None,
        }
    }

    fn sample_item(id: &str) -> GitHubItem {
        GitHubItem {
            id: id.to_string(),
            account_id: "a1".to_string(),
            kind: "pr".to_string(),
            title: "Fix flaky retry test".to_string(),
            repo: "acme/api".to_string(),
            url: Some("https://github.com/acme/api/pull/42".to_string()),
            updated_at: "2026-02-01T10:00:00Z".to_string(),
            ai_insight: None,
        }
    }

    #[test]
    fn test_notification_upsert_preserves_insight() {
        let (_dir, db) = test_db();
        let mut enriched = sample_notification("n1");
        enriched.ai_insight = Some("Mentions the release you own".to_string());
        db.bulk_upsert_notifications(&[enriched]).unwrap();

        db.bulk_upsert_notifications(&[sample_notification("n1")])
            .unwrap();

        let stored = &db.get_notifications_for_account("a1").unwrap()[0];
        assert!(stored.ai_insight.is_some());
    }

    #[test]
    fn test_github_upsert_and_clear() {
        let (_dir, db) = test_db();
        db.bulk_upsert_github_items(&[sample_item("g1"), sample_item("g2")])
            .unwrap();
        assert_eq!(db.get_github_items_for_account("a1").unwrap().len(), 2);

        assert_eq!(db.clear_github_items_for_account("a1").unwrap(), 2);
        assert!(db.get_github_items_for_account("a1").unwrap().is_empty());
    }
}
