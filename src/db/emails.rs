//! Email persistence. Enrichment columns (ai_summary, ai_category,
//! ai_priority, ai_suggested_reply, tags) use COALESCE on conflict so a bulk
//! upsert from a remote fetch can never null out local analysis.

use rusqlite::{params, Row};

use super::{json_to_list, list_to_json, HubDb};
use crate::types::Email;

fn map_email_row(row: &Row) -> rusqlite::Result<Email> {
    Ok(Email {
        id: row.get("email_id")?,
        account_id: row.get("account_id")?,
        sender: row.get("sender")?,
        subject: row.get("subject")?,
        snippet: row.get("snippet")?,
        received_at: row.get("received_at")?,
        is_unread: row.get::<_, i64>("is_unread")? != 0,
        ai_summary: row.get("ai_summary")?,
        ai_category: row.get("ai_category")?,
        ai_priority: row.get("ai_priority")?,
        ai_suggested_reply: row.get("ai_suggested_reply")?,
        tags: json_to_list(row.get("tags")?),
    })
}

impl HubDb {
    pub fn get_emails_for_account(&self, account_id: &str) -> Result<Vec<Email>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM emails WHERE account_id = ?1 ORDER BY received_at DESC")
            .map_err(|e| format!("Failed to prepare emails query: {e}"))?;

        let emails = stmt
            .query_map(params![account_id], map_email_row)
            .map_err(|e| format!("Failed to query emails: {e}"))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(emails)
    }

    pub fn bulk_upsert_emails(&self, emails: &[Email]) -> Result<(), String> {
        self.with_transaction(|db| {
            for email in emails {
                db.upsert_email(email)?;
            }
            Ok(())
        })
    }

    fn upsert_email(&self, email: &Email) -> Result<(), String> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO emails (email_id, account_id, sender, subject, snippet, received_at, is_unread,
                                     ai_summary, ai_category, ai_priority, ai_suggested_reply, tags,
                                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                 ON CONFLICT(email_id) DO UPDATE SET
                     account_id = excluded.account_id,
                     sender = excluded.sender,
                     subject = excluded.subject,
                     snippet = excluded.snippet,
                     received_at = excluded.received_at,
                     is_unread = excluded.is_unread,
                     ai_summary = COALESCE(excluded.ai_summary, ai_summary),
                     ai_category = COALESCE(excluded.ai_category, ai_category),
                     ai_priority = COALESCE(excluded.ai_priority, ai_priority),
                     ai_suggested_reply = COALESCE(excluded.ai_suggested_reply, ai_suggested_reply),
                     tags = COALESCE(excluded.tags, tags),
                     updated_at = excluded.updated_at",
                params![
                    email.id,
                    email.account_id,
                    email.sender,
                    email.subject,
                    email.snippet,
                    email.received_at,
                    email.is_unread as i64,
                    email.ai_summary,
                    email.ai_category,
                    email.ai_priority,
                    email.ai_suggested_reply,
                    list_to_json(&email.tags),
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert email: {e}"))?;
        Ok(())
    }

    pub fn clear_emails_for_account(&self, account_id: &str) -> Result<usize, String> {
        self.conn
            .execute("DELETE FROM emails WHERE account_id = ?1", params![account_id])
            .map_err(|e| format!("Failed to clear emails: {e}"))
    }
}
