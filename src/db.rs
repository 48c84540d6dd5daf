use std::{env, fs, path::Path};

use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, AuthUser},
    models::{EventRow, Role, UserRow},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Creates the bootstrap manager account on first start. Profile values
/// match what the planners expect to find on the test account.
pub async fn seed_admin(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "AdminTest".to_string());

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(&username)
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "Test1234".to_string());
    if password == "Test1234" {
        log::warn!("ADMIN_PASSWORD not set. Using the default bootstrap password. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO users
           (username, password_hash, role, vorname, nachname, email, s34a, s34a_art, pschein,
            bewach_id, steuernummer, bsw, sanitaeter, stundensatz, consent_given)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)"#,
    )
    .bind(&username)
    .bind(password_hash)
    .bind(Role::Vorgesetzter.as_str())
    .bind("Admin")
    .bind("Test")
    .bind("")
    .bind("ja")
    .bind("Sachkunde")
    .bind("ja")
    .bind("A-000")
    .bind("ST-000")
    .bind("nein")
    .bind("nein")
    .bind(0.0)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_user(pool: &SqlitePool, username: &str) -> Option<UserRow> {
    sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ? LIMIT 1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .unwrap_or(None)
}

pub async fn fetch_event(pool: &SqlitePool, event_id: &str) -> Option<EventRow> {
    sqlx::query_as::<_, EventRow>("SELECT * FROM event WHERE id = ? LIMIT 1")
        .bind(event_id)
        .fetch_optional(pool)
        .await
        .unwrap_or(None)
}

#[derive(Debug, Serialize)]
pub struct ConsentInfo {
    pub given: bool,
    pub name: String,
    pub date: String,
    pub full_name: String,
}

pub async fn get_user_consent(pool: &SqlitePool, username: &str) -> Result<ConsentInfo, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ? LIMIT 1")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    let Some(user) = row else {
        return Ok(ConsentInfo {
            given: false,
            name: String::new(),
            date: String::new(),
            full_name: String::new(),
        });
    };

    Ok(ConsentInfo {
        given: user.consent_given != 0,
        name: user.consent_name.clone().unwrap_or_default().trim().to_string(),
        date: user.consent_date.clone().unwrap_or_default().trim().to_string(),
        full_name: user.full_name(),
    })
}

/// DSGVO gate: employees may not touch event data before consenting.
/// Managers are exempt; on lookup errors we lock rather than leak.
pub async fn employee_requires_consent(pool: &SqlitePool, auth: &AuthUser) -> bool {
    if auth.role != Role::Mitarbeiter {
        return false;
    }
    match get_user_consent(pool, &auth.username).await {
        Ok(info) => !info.given,
        Err(_) => true,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    MissingOld,
    Conflict,
}

/// The username is the primary key and responses reference it without
/// ON UPDATE CASCADE, so a rename re-inserts the profile under the new key,
/// re-points the responses, then drops the old row — all in one transaction.
pub async fn rename_user(
    pool: &SqlitePool,
    old_username: &str,
    new_username: &str,
) -> Result<RenameOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let old_row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ? LIMIT 1")
        .bind(old_username)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(old_row) = old_row else {
        return Ok(RenameOutcome::MissingOld);
    };

    let clash = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(new_username)
        .fetch_one(&mut *tx)
        .await?;
    if clash > 0 {
        return Ok(RenameOutcome::Conflict);
    }

    sqlx::query(
        r#"INSERT INTO users
           (username, password_hash, role, vorname, nachname, email, s34a, s34a_art, pschein,
            bewach_id, steuernummer, bsw, sanitaeter, stundensatz, consent_given, consent_name, consent_date)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_username)
    .bind(&old_row.password_hash)
    .bind(&old_row.role)
    .bind(&old_row.vorname)
    .bind(&old_row.nachname)
    .bind(&old_row.email)
    .bind(&old_row.s34a)
    .bind(&old_row.s34a_art)
    .bind(&old_row.pschein)
    .bind(&old_row.bewach_id)
    .bind(&old_row.steuernummer)
    .bind(&old_row.bsw)
    .bind(&old_row.sanitaeter)
    .bind(old_row.stundensatz)
    .bind(old_row.consent_given)
    .bind(&old_row.consent_name)
    .bind(&old_row.consent_date)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE response SET username = ? WHERE username = ?")
        .bind(new_username)
        .bind(old_username)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM users WHERE username = ?")
        .bind(old_username)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(RenameOutcome::Renamed)
}
