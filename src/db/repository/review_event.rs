use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

pub fn insert_review_event(conn: &Connection, event: &ReviewEvent) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO review_events (id, recommendation_id, actor_id, from_status, to_status,
         note, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.id.to_string(),
            event.recommendation_id.to_string(),
            event.actor_id.to_string(),
            event.from_status.as_str(),
            event.to_status.as_str(),
            event.note,
            event.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Transition history for one recommendation, oldest first.
pub fn list_review_events(
    conn: &Connection,
    recommendation_id: &Uuid,
) -> Result<Vec<ReviewEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, recommendation_id, actor_id, from_status, to_status, note, created_at
         FROM review_events WHERE recommendation_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![recommendation_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, rec_id, actor_id, from, to, note, created_at) = row?;
        events.push(ReviewEvent {
            id: parse_uuid(&id)?,
            recommendation_id: parse_uuid(&rec_id)?,
            actor_id: parse_uuid(&actor_id)?,
            from_status: ReviewStatus::from_str(&from)?,
            to_status: ReviewStatus::from_str(&to)?,
            note,
            created_at: parse_datetime(&created_at)?,
        });
    }
    Ok(events)
}
