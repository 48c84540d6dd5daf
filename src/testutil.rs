use base64::{engine::general_purpose, Engine as _};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::auth::hash_password;
use crate::state::{AppState, MailConfig};

/// Fresh in-memory database with migrations applied and mail disabled.
/// One connection only: every pool connection of an in-memory SQLite is a
/// separate database.
pub async fn test_state() -> AppState {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    crate::db::run_migrations(&pool).await.unwrap();

    AppState {
        db: pool,
        mail: MailConfig {
            host: String::new(),
            port: 587,
            user: String::new(),
            pass: String::new(),
            from: String::new(),
        },
    }
}

pub async fn insert_user(pool: &SqlitePool, username: &str, password: &str, role: &str, consent: bool) {
    let password_hash = hash_password(password).unwrap();
    sqlx::query(
        "INSERT INTO users (username, password_hash, role, vorname, nachname, email, consent_given) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(password_hash)
    .bind(role)
    .bind("Test")
    .bind(username)
    .bind("")
    .bind(if consent { 1_i64 } else { 0 })
    .execute(pool)
    .await
    .unwrap();
}

pub async fn insert_event(pool: &SqlitePool, id: &str, start: &str, frist: &str, status: &str) {
    sqlx::query(
        "INSERT INTO event (id, title, ort, start, frist, status, category, required_staff) VALUES (?, 'Test', 'Ort', ?, ?, ?, 'CP', 0)",
    )
    .bind(id)
    .bind(start)
    .bind(frist)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
}

pub fn basic_auth_header(username: &str, password: &str) -> (&'static str, String) {
    let token = general_purpose::STANDARD.encode(format!("{username}:{password}"));
    ("Authorization", format!("Basic {token}"))
}
