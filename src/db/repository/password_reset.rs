use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;

/// Store the SHA-256 hash of a reset token. The token itself is never stored.
pub fn insert_password_reset(
    conn: &Connection,
    token_hash: &str,
    user_id: &Uuid,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO password_resets (token_hash, user_id, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![token_hash, user_id.to_string(), expires_at.to_rfc3339(), now.to_rfc3339()],
    )?;
    Ok(())
}

/// User owning an unused, unexpired reset token.
pub fn find_valid_password_reset(
    conn: &Connection,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<Uuid>, DatabaseError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT user_id, expires_at FROM password_resets
             WHERE token_hash = ?1 AND used_at IS NULL",
            params![token_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((user_id, expires_at)) => {
            let expires_at = super::parse_datetime(&expires_at)?;
            if expires_at <= now {
                return Ok(None);
            }
            Ok(Some(parse_uuid(&user_id)?))
        }
        None => Ok(None),
    }
}

/// Mark a token used. Returns `false` if it was already consumed.
pub fn consume_password_reset(
    conn: &Connection,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE password_resets SET used_at = ?2 WHERE token_hash = ?1 AND used_at IS NULL",
        params![token_hash, now.to_rfc3339()],
    )?;
    Ok(changed == 1)
}

/// Invalidate every outstanding token for a user (after a successful reset).
pub fn invalidate_password_resets(
    conn: &Connection,
    user_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE password_resets SET used_at = ?2 WHERE user_id = ?1 AND used_at IS NULL",
        params![user_id.to_string(), now.to_rfc3339()],
    )?;
    Ok(())
}
