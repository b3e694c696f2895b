//! Account persistence.

use rusqlite::{params, Row};

use super::HubDb;
use crate::types::{Account, AccountStatus, Platform};

fn map_account_row(row: &Row) -> rusqlite::Result<Account> {
    let platform_raw: String = row.get("platform")?;
    let status_raw: String = row.get("status")?;
    // An unrecognized platform must not masquerade as a real one, or the
    // sync engine would hand the account to the wrong connector.
    let platform = Platform::parse(&platform_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown platform '{platform_raw}'").into(),
        )
    })?;
    Ok(Account {
        id: row.get("id")?,
        platform,
        name: row.get("name")?,
        email: row.get("email")?,
        credentials: row.get("credentials")?,
        is_connected: row.get::<_, i64>("is_connected")? != 0,
        status: AccountStatus::parse(&status_raw).unwrap_or(AccountStatus::Disconnected),
        last_sync: row.get("last_sync")?,
        ignored: row.get::<_, i64>("ignored")? != 0,
    })
}

impl HubDb {
    pub fn get_all_accounts(&self) -> Result<Vec<Account>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM accounts ORDER BY created_at")
            .map_err(|e| format!("Failed to prepare accounts query: {e}"))?;

        let accounts = stmt
            .query_map([], map_account_row)
            .map_err(|e| format!("Failed to query accounts: {e}"))?
            .filter_map(|r| match r {
                Ok(account) => Some(account),
                Err(e) => {
                    log::warn!("Skipping unreadable account row: {e}");
                    None
                }
            })
            .collect();

        Ok(accounts)
    }

    pub fn get_account(&self, id: &str) -> Result<Option<Account>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM accounts WHERE id = ?1")
            .map_err(|e| format!("Failed to prepare account query: {e}"))?;

        let mut rows = stmt
            .query_map(params![id], map_account_row)
            .map_err(|e| format!("Failed to query account: {e}"))?;

        match rows.next() {
            Some(Ok(account)) => Ok(Some(account)),
            Some(Err(e)) => Err(format!("Failed to read account row: {e}")),
            None => Ok(None),
        }
    }

    pub fn upsert_account(&self, account: &Account) -> Result<(), String> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO accounts (id, platform, name, email, credentials, is_connected, status, last_sync, ignored, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     platform = excluded.platform,
                     name = excluded.name,
                     email = excluded.email,
                     credentials = COALESCE(excluded.credentials, credentials),
                     is_connected = excluded.is_connected,
                     status = excluded.status,
                     last_sync = COALESCE(excluded.last_sync, last_sync),
                     ignored = excluded.ignored,
                     updated_at = excluded.updated_at",
                params![
                    account.id,
                    account.platform.as_str(),
                    account.name,
                    account.email,
                    account.credentials,
                    account.is_connected as i64,
                    account.status.as_str(),
                    account.last_sync,
                    account.ignored as i64,
                    now,
                ],
            )
            .map_err(|e| format!("Failed to upsert account: {e}"))?;
        Ok(())
    }

    /// Update only the sync-related columns after a sync attempt.
    /// `None` for is_connected or last_sync leaves the stored value untouched.
    pub fn set_account_sync_state(
        &self,
        id: &str,
        is_connected: Option<bool>,
        status: AccountStatus,
        last_sync: Option<&str>,
    ) -> Result<(), String> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE accounts SET
                     is_connected = COALESCE(?2, is_connected),
                     status = ?3,
                     last_sync = COALESCE(?4, last_sync),
                     updated_at = ?5
                 WHERE id = ?1",
                params![id, is_connected.map(|b| b as i64), status.as_str(), last_sync, now],
            )
            .map_err(|e| format!("Failed to update account sync state: {e}"))?;
        Ok(())
    }
}
