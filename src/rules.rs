//! Derived view fields for the calendar: CSS class tokens, effective hourly
//! rates, staffing counters, deadline checks, and worked-hours arithmetic.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::{Category, EventRow, ResponseStatus, Role, EVENT_STATUS_OFFEN};

/// Response fields as the frontend sees them, null text folded to "".
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub status: String,
    pub remark: String,
    pub start_time: String,
    pub end_time: String,
    pub rate_override: Option<f64>,
}

/// Normalize a status string into a safe CSS class token
/// (e.g. "Bestätigt" -> "bestaetigt").
pub fn css_token(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    if lower.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(lower.len());
    for ch in lower.chars() {
        match ch {
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            'a'..='z' | '0'..='9' | '_' | '-' => out.push(ch),
            _ => {
                if !out.ends_with('-') {
                    out.push('-');
                }
            }
        }
    }
    out.trim_matches('-').to_string()
}

pub fn confirmed_count(responses: &HashMap<String, ResponseView>) -> usize {
    responses
        .values()
        .filter(|r| ResponseStatus::parse(&r.status) == Some(ResponseStatus::Confirmed))
        .count()
}

pub fn has_applications(responses: &HashMap<String, ResponseView>) -> bool {
    responses
        .values()
        .any(|r| ResponseStatus::parse(&r.status).is_some_and(|s| s.counts_as_application()))
}

/// Class list FullCalendar gets per event: category, event status, staffing
/// fill state on released events, and (for employees) the caller's own
/// response status.
pub fn event_class_names(
    event: &EventRow,
    responses: &HashMap<String, ResponseView>,
    own_status: Option<&str>,
) -> Vec<String> {
    let mut classes = Vec::new();

    let category = Category::parse_or_default(event.category.as_deref().unwrap_or(""));
    classes.push(format!("cat-{}", category.as_str().to_lowercase()));

    let status = event.status.as_deref().unwrap_or("");
    let status_token = css_token(status);
    if !status_token.is_empty() {
        classes.push(format!("status-event-{status_token}"));
    }

    // Only released events get the fill indicator: green when the required
    // head count is confirmed, blue while applications are still coming in.
    if status.trim().to_lowercase() == EVENT_STATUS_OFFEN {
        let required = event.required_staff.unwrap_or(0).max(0) as usize;
        if required > 0 && confirmed_count(responses) >= required {
            classes.push("status-event-voll".to_string());
        } else if has_applications(responses) {
            classes.push("status-event-bewerbung".to_string());
        }
    }

    if let Some(own) = own_status {
        let own_token = css_token(own);
        if !own_token.is_empty() {
            classes.push(format!("status-{own_token}"));
        }
    }

    classes
}

/// The hourly rate the caller would earn on this event. Managers plan, they
/// do not earn, so they always see 0. A NULL use_event_rate means the event
/// rate applies; an explicit 0 switches to the profile rate.
pub fn my_rate(role: Role, event: &EventRow, profile_rate: f64) -> f64 {
    if role.is_manager() {
        return 0.0;
    }
    if event.use_event_rate.unwrap_or(1) == 1 {
        event.stundensatz.unwrap_or(0.0)
    } else {
        profile_rate
    }
}

/// Payroll rate for one response: an override beats the event/profile rule.
pub fn effective_rate(
    rate_override: Option<f64>,
    use_event_rate: Option<i64>,
    event_rate: Option<f64>,
    profile_rate: Option<f64>,
) -> f64 {
    if let Some(rate) = rate_override {
        return rate;
    }
    if use_event_rate.unwrap_or(1) == 1 {
        event_rate.unwrap_or(0.0)
    } else {
        profile_rate.unwrap_or(0.0)
    }
}

/// Time-of-day of an event start ("2024-05-01T08:30" -> "08:30"); bare
/// "H:MM" values are zero-padded, anything else defaults to 09:00.
pub fn start_time_of_day(start: &str) -> String {
    static ISO_RE: OnceLock<Regex> = OnceLock::new();
    static BARE_RE: OnceLock<Regex> = OnceLock::new();
    let iso = ISO_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T(\d{2}:\d{2})").unwrap());
    let bare = BARE_RE.get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap());

    let start = start.trim();
    if let Some(caps) = iso.captures(start) {
        return caps[1].to_string();
    }
    if let Some(caps) = bare.captures(start) {
        if let Ok(hour) = caps[1].parse::<u32>() {
            return format!("{hour:02}:{}", &caps[2]);
        }
    }
    "09:00".to_string()
}

pub fn is_calendar_date(value: &str) -> bool {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    DATE_RE
        .get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap())
        .is_match(value)
}

/// A response deadline blocks changes only when it parses; a broken value in
/// the column must not lock employees out.
pub fn deadline_passed(frist: &str, now: NaiveDateTime) -> bool {
    let raw = frist.trim();
    if raw.is_empty() {
        return false;
    }
    let parsed = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"));
    match parsed {
        Ok(deadline) => now > deadline,
        Err(_) => false,
    }
}

/// European date for mail bodies; the caller keeps its placeholder when the
/// stored start does not parse.
pub fn format_date_de(raw: &str) -> Option<String> {
    let raw = raw.trim().replace('Z', "");
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(stamp.format("%d.%m.%Y").to_string());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%d.%m.%Y").to_string())
}

fn parse_hhmm(value: &str) -> Option<i64> {
    let (hours, minutes) = value.trim().split_once(':')?;
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Hours between two HH:MM stamps; spans crossing midnight get a day added.
pub fn worked_hours(start_time: &str, end_time: &str) -> Option<f64> {
    let start = parse_hhmm(start_time)?;
    let end = parse_hhmm(end_time)?;
    let mut minutes = end - start;
    if minutes < 0 {
        minutes += 24 * 60;
    }
    Some(minutes as f64 / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: &str) -> ResponseView {
        ResponseView {
            status: status.to_string(),
            remark: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            rate_override: None,
        }
    }

    fn event(status: &str, category: &str, required: i64) -> EventRow {
        EventRow {
            id: "ev".to_string(),
            title: None,
            ort: None,
            dienstkleidung: None,
            auftraggeber: None,
            start: None,
            planned_end_time: None,
            frist: None,
            status: Some(status.to_string()),
            category: Some(category.to_string()),
            required_staff: Some(required),
            use_event_rate: None,
            stundensatz: None,
        }
    }

    #[test]
    fn css_token_folds_umlauts() {
        assert_eq!(css_token("Bestätigt"), "bestaetigt");
        assert_eq!(css_token("  "), "");
        assert_eq!(css_token("Noch offen!"), "noch-offen");
        assert_eq!(css_token("größer / kleiner"), "groesser-kleiner");
    }

    #[test]
    fn class_names_for_full_event() {
        let mut responses = HashMap::new();
        responses.insert("a".to_string(), response("bestätigt"));
        responses.insert("b".to_string(), response("bestätigt"));
        let classes = event_class_names(&event("offen", "CP", 2), &responses, None);
        assert!(classes.contains(&"cat-cp".to_string()));
        assert!(classes.contains(&"status-event-offen".to_string()));
        assert!(classes.contains(&"status-event-voll".to_string()));
        assert!(!classes.contains(&"status-event-bewerbung".to_string()));
    }

    #[test]
    fn class_names_for_applications() {
        let mut responses = HashMap::new();
        responses.insert("a".to_string(), response("zugesagt"));
        let classes = event_class_names(&event("offen", "CV", 3), &responses, None);
        assert!(classes.contains(&"cat-cv".to_string()));
        assert!(classes.contains(&"status-event-bewerbung".to_string()));
    }

    #[test]
    fn class_names_skip_fill_state_for_planned_events() {
        let mut responses = HashMap::new();
        responses.insert("a".to_string(), response("zugesagt"));
        let classes = event_class_names(&event("geplant", "CP", 1), &responses, None);
        assert!(!classes.iter().any(|c| c.ends_with("voll") || c.ends_with("bewerbung")));
    }

    #[test]
    fn class_names_include_own_status() {
        let classes = event_class_names(&event("offen", "CP", 0), &HashMap::new(), Some("abgelehnt_chef"));
        assert!(classes.contains(&"status-abgelehnt_chef".to_string()));
    }

    #[test]
    fn my_rate_prefers_event_rate() {
        let mut ev = event("offen", "CP", 0);
        ev.stundensatz = Some(14.5);
        // NULL means "event rate applies".
        ev.use_event_rate = None;
        assert_eq!(my_rate(Role::Mitarbeiter, &ev, 12.0), 14.5);
        // An explicit 0 must not be coerced back to 1.
        ev.use_event_rate = Some(0);
        assert_eq!(my_rate(Role::Mitarbeiter, &ev, 12.0), 12.0);
        ev.use_event_rate = Some(1);
        assert_eq!(my_rate(Role::Mitarbeiter, &ev, 12.0), 14.5);
        assert_eq!(my_rate(Role::Chef, &ev, 12.0), 0.0);
    }

    #[test]
    fn effective_rate_override_wins() {
        assert_eq!(effective_rate(Some(20.0), Some(1), Some(14.0), Some(12.0)), 20.0);
        assert_eq!(effective_rate(None, None, Some(14.0), Some(12.0)), 14.0);
        assert_eq!(effective_rate(None, Some(0), Some(14.0), Some(12.0)), 12.0);
        assert_eq!(effective_rate(None, Some(0), Some(14.0), None), 0.0);
    }

    #[test]
    fn start_time_extraction() {
        assert_eq!(start_time_of_day("2024-05-01T08:30"), "08:30");
        assert_eq!(start_time_of_day("7:15"), "07:15");
        assert_eq!(start_time_of_day("garbage"), "09:00");
        assert_eq!(start_time_of_day(""), "09:00");
    }

    #[test]
    fn calendar_date_check() {
        assert!(is_calendar_date("2024-06-01"));
        assert!(!is_calendar_date("2024-6-1"));
        assert!(!is_calendar_date("01.06.2024"));
    }

    #[test]
    fn deadline_checks() {
        let now = NaiveDateTime::parse_from_str("2024-01-01T12:00", "%Y-%m-%dT%H:%M").unwrap();
        assert!(deadline_passed("2024-01-01T10:00", now));
        assert!(!deadline_passed("2024-01-01T14:00", now));
        assert!(!deadline_passed("", now));
        assert!(!deadline_passed("kaputt", now));
    }

    #[test]
    fn date_formatting() {
        assert_eq!(format_date_de("2024-05-01T09:00").as_deref(), Some("01.05.2024"));
        assert_eq!(format_date_de("2024-05-01 09:00").as_deref(), Some("01.05.2024"));
        assert_eq!(format_date_de("2024-05-01").as_deref(), Some("01.05.2024"));
        assert_eq!(format_date_de("unbekannt"), None);
    }

    #[test]
    fn worked_hours_arithmetic() {
        assert_eq!(worked_hours("09:00", "17:30"), Some(8.5));
        assert_eq!(worked_hours("22:00", "06:30"), Some(8.5));
        assert_eq!(worked_hours("08:00", "08:00"), Some(0.0));
        assert_eq!(worked_hours("", "17:00"), None);
        assert_eq!(worked_hours("25:00", "17:00"), None);
    }
}
