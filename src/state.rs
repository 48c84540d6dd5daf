use sqlx::SqlitePool;
use std::env;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub mail: MailConfig,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

impl MailConfig {
    pub fn from_env() -> Self {
        let user = env::var("SMTP_USER").unwrap_or_default();
        Self {
            host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            port: env::var("SMTP_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(587),
            pass: env::var("SMTP_PASS").unwrap_or_default(),
            from: env::var("MAIL_FROM").unwrap_or_else(|_| format!("REMINDER – CV Planung <{user}>")),
            user,
        }
    }

    pub fn enabled(&self) -> bool {
        !(self.user.trim().is_empty() || self.pass.trim().is_empty())
    }
}
