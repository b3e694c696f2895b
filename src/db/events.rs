//! Calendar event persistence.

use rusqlite::{params, Row};

use super::{json_to_list, list_to_json, HubDb};
use crate::types::CalendarEvent;

fn map_event_row(row: &Row) -> rusqlite::Result<CalendarEvent> {
    Ok(CalendarEvent {
        id: row.get("event_id")?,
        account_id: row.get("account_id")?,
        title: row.get("title")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        location: row.get("location")?,
        ai_briefing: row.get("ai_briefing")?,
        ai_action_items: json_to_list(row.get("ai_action_items")?),
    })
}

impl HubDb {
    pub fn get_events_for_account(&self, account_id: &str) -> Result<Vec<CalendarEvent>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM events WHERE account_id = ?1 ORDER BY start_time")
            .map_err(|e| format!("Failed to prepare events query: {e}"))?;

        let events = stmt
            .query_map(params![account_id], map_event_row)
            .map_err(|e| format!("Failed to query events: {e}"))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(events)
    }

    pub fn bulk_upsert_events(&self, events: &[CalendarEvent]) -> Result<(), String> {
        self.with_transaction(|db| {
            for event in events {
                db.upsert_event(event)?;
            }
            Ok(())
        })
    }

    fn upsert_event(&self, event: &CalendarEvent) -> Result<(), String> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO events (event_id, account_id, title, start_time, end_time, location,
                                     ai_briefing, ai_action_items, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(event_id) DO UPDATE SET
                     account_id = excluded.account_id,
                     title = excluded.title,
                     start_time = excluded.start_time,
                     end_time = excluded.end_time,
                     location = excluded.location,
                     ai_briefing = COALESCE(excluded.ai_briefing, ai_briefing),
                     ai_action_items = COALESCE(excluded.ai_action_items, ai_action_items),
                     updated_at = excluded.updated_at",
                params![
                    event.id,
                    event.account_id,
                    event.title,
                    event.start_time,
                    event.end_time,
                    event.location,
                    event.ai_briefing,
                    list_to_json(&event.ai_action_items),
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert event: {e}"))?;
        Ok(())
    }

    pub fn clear_events_for_account(&self, account_id: &str) -> Result<usize, String> {
        self.conn
            .execute("DELETE FROM events WHERE account_id = ?1", params![account_id])
            .map_err(|e| format!("Failed to clear events: {e}"))
    }
}
