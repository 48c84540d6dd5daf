use serde::Serialize;

/// Accounts created at bootstrap; user listings never show them.
pub const BOOTSTRAP_ACCOUNTS: [&str; 2] = ["AdminTest", "TestAdmin"];

pub const EVENT_STATUS_GEPLANT: &str = "geplant";
pub const EVENT_STATUS_OFFEN: &str = "offen";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Mitarbeiter,
    Chef,
    Vorgesetzter,
    VorgesetzterCp,
    Planer,
    PlannerBbs,
}

impl Role {
    /// Canonical token as stored in the users table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Mitarbeiter => "mitarbeiter",
            Role::Chef => "chef",
            Role::Vorgesetzter => "vorgesetzter",
            Role::VorgesetzterCp => "vorgesetzter_cp",
            Role::Planer => "planer",
            Role::PlannerBbs => "planner_bbs",
        }
    }

    /// Accepts canonical tokens plus the display names older frontends send
    /// ("Planner BBS", "Vorgesetzter CP").
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_lowercase().as_str() {
            "mitarbeiter" => Some(Role::Mitarbeiter),
            "chef" => Some(Role::Chef),
            "vorgesetzter" => Some(Role::Vorgesetzter),
            "vorgesetzter cp" | "vorgesetzter_cp" => Some(Role::VorgesetzterCp),
            "planer" => Some(Role::Planer),
            "planner bbs" | "planner_bbs" => Some(Role::PlannerBbs),
            _ => None,
        }
    }

    pub fn is_manager(&self) -> bool {
        !matches!(self, Role::Mitarbeiter)
    }

    /// Personnel records carry sensitive data; vorgesetzter_cp stays out.
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Chef | Role::Vorgesetzter)
    }

    pub fn can_manage_events(&self) -> bool {
        matches!(self, Role::Chef | Role::Vorgesetzter | Role::VorgesetzterCp)
    }
}

/// One user's standing reaction to one event. The wire and database tokens
/// are the German strings the calendar frontend already understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Confirmed,
    DeclinedByManager,
    RemovedByManager,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Accepted => "zugesagt",
            ResponseStatus::Declined => "abgelehnt",
            ResponseStatus::Confirmed => "bestätigt",
            ResponseStatus::DeclinedByManager => "abgelehnt_chef",
            ResponseStatus::RemovedByManager => "entfernt_chef",
        }
    }

    pub fn parse(value: &str) -> Option<ResponseStatus> {
        match value.trim() {
            "zugesagt" => Some(ResponseStatus::Accepted),
            "abgelehnt" => Some(ResponseStatus::Declined),
            "bestätigt" => Some(ResponseStatus::Confirmed),
            "abgelehnt_chef" => Some(ResponseStatus::DeclinedByManager),
            "entfernt_chef" => Some(ResponseStatus::RemovedByManager),
            _ => None,
        }
    }

    /// Counts toward the "somebody wants this shift" indicator.
    pub fn counts_as_application(&self) -> bool {
        matches!(self, ResponseStatus::Accepted | ResponseStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Cp,
    Cv,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cp => "CP",
            Category::Cv => "CV",
        }
    }

    /// Unknown or empty input falls back to CP, as the calendar always did.
    pub fn parse_or_default(value: &str) -> Category {
        match value.trim().to_uppercase().as_str() {
            "CV" => Category::Cv,
            _ => Category::Cp,
        }
    }
}

/// "Sachkunde" is the one qualification spelling the forms keep mangling.
pub fn normalize_s34a_art(value: &str) -> String {
    let s = value.trim();
    if s.eq_ignore_ascii_case("sachkunde") {
        return "Sachkunde".to_string();
    }
    s.to_string()
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub vorname: Option<String>,
    pub nachname: Option<String>,
    pub email: Option<String>,
    pub s34a: Option<String>,
    pub s34a_art: Option<String>,
    pub pschein: Option<String>,
    pub bewach_id: Option<String>,
    pub steuernummer: Option<String>,
    pub bsw: Option<String>,
    pub sanitaeter: Option<String>,
    pub stundensatz: Option<f64>,
    pub consent_given: i64,
    pub consent_name: Option<String>,
    pub consent_date: Option<String>,
}

impl UserRow {
    pub fn full_name(&self) -> String {
        let vorname = self.vorname.as_deref().unwrap_or("").trim();
        let nachname = self.nachname.as_deref().unwrap_or("").trim();
        format!("{vorname} {nachname}").trim().to_string()
    }

    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Mitarbeiter)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventRow {
    pub id: String,
    pub title: Option<String>,
    pub ort: Option<String>,
    pub dienstkleidung: Option<String>,
    pub auftraggeber: Option<String>,
    pub start: Option<String>,
    pub planned_end_time: Option<String>,
    pub frist: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub required_staff: Option<i64>,
    pub use_event_rate: Option<i64>,
    pub stundensatz: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResponseRow {
    pub username: String,
    pub status: Option<String>,
    pub remark: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub rate_override: Option<f64>,
}
