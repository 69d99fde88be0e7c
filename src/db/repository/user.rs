use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_date_opt, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, date_of_birth, gender, phone,
     address, specialization, license_number, years_of_experience, medical_history, allergies,
     current_medications, emergency_contact, created_at, updated_at";

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    let p = &user.profile;
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, date_of_birth, gender, phone,
         address, specialization, license_number, years_of_experience, medical_history, allergies,
         current_medications, emergency_contact, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            user.id.to_string(),
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            p.date_of_birth.map(|d| d.to_string()),
            p.gender.map(|g| g.as_str()),
            p.phone,
            p.address,
            p.specialization,
            p.license_number,
            p.years_of_experience,
            serde_json::to_string(&p.medical_history)?,
            serde_json::to_string(&p.allergies)?,
            serde_json::to_string(&p.current_medications)?,
            p.emergency_contact,
            user.created_at.to_rfc3339(),
            user.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], user_row_from_rusqlite)
        .optional()?;
    row.map(user_from_row).transpose()
}

/// Email lookup is case-insensitive (the column is `COLLATE NOCASE`).
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
    let row = conn
        .query_row(&sql, params![email.trim()], user_row_from_rusqlite)
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn update_user_profile(
    conn: &Connection,
    id: &Uuid,
    name: &str,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET name = ?2, date_of_birth = ?3, gender = ?4, phone = ?5, address = ?6,
         specialization = ?7, license_number = ?8, years_of_experience = ?9, medical_history = ?10,
         allergies = ?11, current_medications = ?12, emergency_contact = ?13, updated_at = ?14
         WHERE id = ?1",
        params![
            id.to_string(),
            name,
            profile.date_of_birth.map(|d| d.to_string()),
            profile.gender.map(|g| g.as_str()),
            profile.phone,
            profile.address,
            profile.specialization,
            profile.license_number,
            profile.years_of_experience,
            serde_json::to_string(&profile.medical_history)?,
            serde_json::to_string(&profile.allergies)?,
            serde_json::to_string(&profile.current_medications)?,
            profile.emergency_contact,
            now.to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn update_password_hash(
    conn: &Connection,
    id: &Uuid,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), password_hash, now.to_rfc3339()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn list_doctors(conn: &Connection) -> Result<Vec<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE role = 'doctor' ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], user_row_from_rusqlite)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(user_from_row(row?)?);
    }
    Ok(users)
}

// Internal row type for User mapping
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    date_of_birth: Option<String>,
    gender: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    specialization: Option<String>,
    license_number: Option<String>,
    years_of_experience: Option<u32>,
    medical_history: String,
    allergies: String,
    current_medications: String,
    emergency_contact: Option<String>,
    created_at: String,
    updated_at: String,
}

fn user_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: row.get(4)?,
        date_of_birth: row.get(5)?,
        gender: row.get(6)?,
        phone: row.get(7)?,
        address: row.get(8)?,
        specialization: row.get(9)?,
        license_number: row.get(10)?,
        years_of_experience: row.get(11)?,
        medical_history: row.get(12)?,
        allergies: row.get(13)?,
        current_medications: row.get(14)?,
        emergency_contact: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid(&row.id)?,
        name: row.name,
        email: row.email,
        password_hash: row.password_hash,
        role: UserRole::from_str(&row.role)?,
        profile: UserProfile {
            date_of_birth: parse_date_opt(row.date_of_birth.as_deref())?,
            gender: row.gender.as_deref().map(Gender::from_str).transpose()?,
            phone: row.phone,
            address: row.address,
            specialization: row.specialization,
            license_number: row.license_number,
            years_of_experience: row.years_of_experience,
            medical_history: serde_json::from_str(&row.medical_history)?,
            allergies: serde_json::from_str(&row.allergies)?,
            current_medications: serde_json::from_str(&row.current_medications)?,
            emergency_contact: row.emergency_contact,
        },
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}
