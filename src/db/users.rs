// src/db/users.rs
use crate::errors::ServerError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub email_notifications: bool,
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>, ServerError> {
    conn.query_row(
        "SELECT id, email, name, email_notifications FROM users WHERE id = ?1",
        params![user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                email_notifications: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn insert_user(
    conn: &Connection,
    email: &str,
    name: Option<&str>,
    email_notifications: bool,
    now: NaiveDateTime,
) -> Result<i64, ServerError> {
    conn.execute(
        "INSERT INTO users (email, name, email_notifications, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![email, name, email_notifications, now],
    )?;
    Ok(conn.last_insert_rowid())
}
