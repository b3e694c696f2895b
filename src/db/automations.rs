//! Automation definitions and run history.
//!
//! Command lines and provider configs are stored as JSON TEXT. A definition
//! whose provider JSON fails to parse loads with `provider: None` rather than
//! poisoning the whole list.

use rusqlite::{params, Row};

use super::HubDb;
use crate::types::{AutomationDefinition, AutomationRun, RunOutcome};

fn map_automation_row(row: &Row) -> rusqlite::Result<AutomationDefinition> {
    let command_raw: Option<String> = row.get("command")?;
    let provider_raw: Option<String> = row.get("provider")?;
    Ok(AutomationDefinition {
        id: row.get("id")?,
        name: row.get("name")?,
        task: row.get("task")?,
        schedule: row.get("schedule")?,
        run_on_startup: row.get::<_, i64>("run_on_startup")? != 0,
        command: command_raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        provider: provider_raw.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn map_run_row(row: &Row) -> rusqlite::Result<AutomationRun> {
    let outcome_raw: Option<String> = row.get("outcome")?;
    Ok(AutomationRun {
        id: row.get("id")?,
        automation_id: row.get("automation_id")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
        outcome: outcome_raw.as_deref().and_then(RunOutcome::parse),
        output: row.get("output")?,
        error: row.get("error")?,
        analysis: row.get("analysis")?,
    })
}

impl HubDb {
    pub fn get_all_automations(&self) -> Result<Vec<AutomationDefinition>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM automations ORDER BY created_at")
            .map_err(|e| format!("Failed to prepare automations query: {e}"))?;

        let defs = stmt
            .query_map([], map_automation_row)
            .map_err(|e| format!("Failed to query automations: {e}"))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(defs)
    }

    pub fn get_automation(&self, id: &str) -> Result<Option<AutomationDefinition>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM automations WHERE id = ?1")
            .map_err(|e| format!("Failed to prepare automation query: {e}"))?;

        let mut rows = stmt
            .query_map(params![id], map_automation_row)
            .map_err(|e| format!("Failed to query automation: {e}"))?;

        match rows.next() {
            Some(Ok(def)) => Ok(Some(def)),
            Some(Err(e)) => Err(format!("Failed to read automation row: {e}")),
            None => Ok(None),
        }
    }

    pub fn upsert_automation(&self, def: &AutomationDefinition) -> Result<(), String> {
        let now = chrono::Utc::now().to_rfc3339();
        let command = if def.command.is_empty() {
            None
        } else {
            serde_json::to_string(&def.command).ok()
        };
        let provider = def
            .provider
            .as_ref()
            .and_then(|p| serde_json::to_string(p).ok());

        self.conn
            .execute(
                "INSERT INTO automations (id, name, task, schedule, run_on_startup, command, provider, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     task = excluded.task,
                     schedule = excluded.schedule,
                     run_on_startup = excluded.run_on_startup,
                     command = excluded.command,
                     provider = excluded.provider,
                     updated_at = excluded.updated_at",
                params![
                    def.id,
                    def.name,
                    def.task,
                    def.schedule,
                    def.run_on_startup as i64,
                    command,
                    provider,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert automation: {e}"))?;
        Ok(())
    }

    pub fn delete_automation(&self, id: &str) -> Result<bool, String> {
        let n = self
            .conn
            .execute("DELETE FROM automations WHERE id = ?1", params![id])
            .map_err(|e| format!("Failed to delete automation: {e}"))?;
        Ok(n > 0)
    }

    pub fn insert_automation_run(&self, run: &AutomationRun) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO automation_runs (id, automation_id, started_at, finished_at, outcome, output, error, analysis)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run.id,
                    run.automation_id,
                    run.started_at,
                    run.finished_at,
                    run.outcome.map(|o| o.as_str()),
                    run.output,
                    run.error,
                    run.analysis,
                ],
            )
            .map_err(|e| format!("Failed to insert automation run: {e}"))?;
        Ok(())
    }

    /// Finalize a run record with its outcome and captured output.
    pub fn finish_automation_run(&self, run: &AutomationRun) -> Result<(), String> {
        self.conn
            .execute(
                "UPDATE automation_runs SET
                     finished_at = ?2,
                     outcome = ?3,
                     output = ?4,
                     error = ?5,
                     analysis = ?6
                 WHERE id = ?1",
                params![
                    run.id,
                    run.finished_at,
                    run.outcome.map(|o| o.as_str()),
                    run.output,
                    run.error,
                    run.analysis,
                ],
            )
            .map_err(|e| format!("Failed to finish automation run: {e}"))?;
        Ok(())
    }

    pub fn get_runs_for_automation(
        &self,
        automation_id: &str,
        limit: usize,
    ) -> Result<Vec<AutomationRun>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT * FROM automation_runs WHERE automation_id = ?1
                 ORDER BY started_at DESC LIMIT ?2",
            )
            .map_err(|e| format!("Failed to prepare runs query: {e}"))?;

        let runs = stmt
            .query_map(params![automation_id, limit as i64], map_run_row)
            .map_err(|e| format!("Failed to query runs: {e}"))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(runs)
    }
}
