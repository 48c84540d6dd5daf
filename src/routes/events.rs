use actix_web::{error::ErrorInternalServerError, web, HttpResponse, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::{
    auth::AuthUser,
    db,
    models::{Category, EventRow, ResponseRow, Role},
    rules::{self, ResponseView},
    state::AppState,
};

use super::consent_required;

pub fn configure(cfg: &mut web::ServiceConfig) {
    // GET and POST share the /events resource: listing is open to every
    // authenticated role, creation is gated inside the admin handler.
    cfg.service(web::resource("/dashboard").route(web::get().to(dashboard)))
        .service(web::resource("/consent_status").route(web::get().to(consent_status)))
        .service(
            web::resource("/events")
                .route(web::get().to(list_events))
                .route(web::post().to(super::admin::create_event)),
        )
        .service(web::resource("/events/report").route(web::get().to(report)));
}

/// The dashboard itself is rendered client-side; the handler only decides
/// which variant the caller gets.
async fn dashboard(auth: web::ReqData<AuthUser>) -> HttpResponse {
    let view = if auth.role.is_manager() { "chef" } else { "mitarbeiter" };
    HttpResponse::Ok().json(json!({
        "user": auth.username.clone(),
        "role": auth.role.as_str(),
        "view": view,
    }))
}

async fn consent_status(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let info = db::get_user_consent(&state.db, &auth.username)
        .await
        .map_err(ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(info))
}

#[derive(Debug, Serialize)]
struct EventView {
    id: String,
    title: Option<String>,
    ort: Option<String>,
    dienstkleidung: Option<String>,
    auftraggeber: Option<String>,
    start: Option<String>,
    planned_end_time: Option<String>,
    frist: Option<String>,
    status: Option<String>,
    category: Option<String>,
    required_staff: Option<i64>,
    use_event_rate: Option<i64>,
    stundensatz: Option<f64>,
    responses: HashMap<String, ResponseView>,
    #[serde(rename = "classNames")]
    class_names: Vec<String>,
    my_rate: f64,
}

async fn list_events(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    if db::employee_requires_consent(&state.db, &auth).await {
        return Ok(consent_required());
    }

    let mut events = sqlx::query_as::<_, EventRow>("SELECT * FROM event")
        .fetch_all(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;

    // Planner BBS only plans the CV calendar.
    if auth.role == Role::PlannerBbs {
        events.retain(|event| {
            Category::parse_or_default(event.category.as_deref().unwrap_or("")) == Category::Cv
        });
    }

    let my_profile_rate = if auth.role.is_manager() {
        0.0
    } else {
        db::fetch_user(&state.db, &auth.username)
            .await
            .and_then(|user| user.stundensatz)
            .unwrap_or(0.0)
    };

    let mut result = Vec::with_capacity(events.len());
    for event in events {
        let rows = sqlx::query_as::<_, ResponseRow>(
            "SELECT username, status, remark, start_time, end_time, rate_override FROM response WHERE event_id = ?",
        )
        .bind(&event.id)
        .fetch_all(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;

        let responses: HashMap<String, ResponseView> = rows
            .into_iter()
            .map(|row| {
                (
                    row.username,
                    ResponseView {
                        status: row.status.unwrap_or_default(),
                        remark: row.remark.unwrap_or_default(),
                        start_time: row.start_time.unwrap_or_default(),
                        end_time: row.end_time.unwrap_or_default(),
                        rate_override: row.rate_override,
                    },
                )
            })
            .collect();

        let own_status = if auth.role.is_manager() {
            None
        } else {
            responses.get(&auth.username).map(|view| view.status.clone())
        };

        let class_names = rules::event_class_names(&event, &responses, own_status.as_deref());
        let my_rate = rules::my_rate(auth.role, &event, my_profile_rate);

        result.push(EventView {
            id: event.id,
            title: event.title,
            ort: event.ort,
            dienstkleidung: event.dienstkleidung,
            auftraggeber: event.auftraggeber,
            start: event.start,
            planned_end_time: event.planned_end_time,
            frist: event.frist,
            status: event.status,
            category: event.category,
            required_staff: event.required_staff,
            use_event_rate: event.use_event_rate,
            stundensatz: event.stundensatz,
            responses,
            class_names,
            my_rate,
        });
    }

    Ok(HttpResponse::Ok().json(result))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    month: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    username: String,
    start_time: Option<String>,
    end_time: Option<String>,
    rate_override: Option<f64>,
    event_id: String,
    title: Option<String>,
    start: Option<String>,
    use_event_rate: Option<i64>,
    event_rate: Option<f64>,
    vorname: Option<String>,
    nachname: Option<String>,
    profile_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ReportEntry {
    event_id: String,
    title: String,
    start: String,
    start_time: String,
    end_time: String,
    hours: f64,
    rate: f64,
    pay: f64,
}

#[derive(Debug, Serialize)]
struct ReportSummary {
    username: String,
    name: String,
    total_hours: f64,
    total_pay: f64,
    entries: Vec<ReportEntry>,
}

const REPORT_QUERY: &str = r#"SELECT r.username, r.start_time, r.end_time, r.rate_override,
       e.id AS event_id, e.title, e.start, e.use_event_rate, e.stundensatz AS event_rate,
       u.vorname, u.nachname, u.stundensatz AS profile_rate
FROM response r
JOIN event e ON e.id = r.event_id
JOIN users u ON u.username = r.username
WHERE r.status = 'bestätigt' AND TRIM(COALESCE(r.end_time, '')) != ''
ORDER BY e.start"#;

const REPORT_QUERY_SELF: &str = r#"SELECT r.username, r.start_time, r.end_time, r.rate_override,
       e.id AS event_id, e.title, e.start, e.use_event_rate, e.stundensatz AS event_rate,
       u.vorname, u.nachname, u.stundensatz AS profile_rate
FROM response r
JOIN event e ON e.id = r.event_id
JOIN users u ON u.username = r.username
WHERE r.status = 'bestätigt' AND TRIM(COALESCE(r.end_time, '')) != '' AND r.username = ?
ORDER BY e.start"#;

/// Worked-hours totals over confirmed, end-timed responses. Managers get
/// every employee keyed by username; employees only ever see themselves.
async fn report(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse> {
    if db::employee_requires_consent(&state.db, &auth).await {
        return Ok(consent_required());
    }

    let month = query
        .month
        .clone()
        .unwrap_or_default()
        .trim()
        .to_string();

    let rows = if auth.role.is_manager() {
        sqlx::query_as::<_, ReportRow>(REPORT_QUERY)
            .fetch_all(&state.db)
            .await
    } else {
        sqlx::query_as::<_, ReportRow>(REPORT_QUERY_SELF)
            .bind(&auth.username)
            .fetch_all(&state.db)
            .await
    }
    .map_err(ErrorInternalServerError)?;

    let mut summaries: HashMap<String, ReportSummary> = HashMap::new();
    for row in rows {
        let start = row.start.clone().unwrap_or_default();
        if !month.is_empty() && !start.starts_with(&month) {
            continue;
        }

        let start_basis = {
            let own = row.start_time.clone().unwrap_or_default();
            if own.trim().is_empty() {
                rules::start_time_of_day(&start)
            } else {
                own.trim().to_string()
            }
        };
        let end_time = row.end_time.clone().unwrap_or_default().trim().to_string();
        // Entries with unusable stamps stay listed with zero hours rather
        // than failing the whole report.
        let hours = rules::worked_hours(&start_basis, &end_time).unwrap_or(0.0);
        let rate = rules::effective_rate(
            row.rate_override,
            row.use_event_rate,
            row.event_rate,
            row.profile_rate,
        );
        let pay = hours * rate;

        let name = {
            let full = format!(
                "{} {}",
                row.vorname.as_deref().unwrap_or("").trim(),
                row.nachname.as_deref().unwrap_or("").trim()
            )
            .trim()
            .to_string();
            if full.is_empty() {
                row.username.clone()
            } else {
                full
            }
        };

        let summary = summaries
            .entry(row.username.clone())
            .or_insert_with(|| ReportSummary {
                username: row.username.clone(),
                name,
                total_hours: 0.0,
                total_pay: 0.0,
                entries: Vec::new(),
            });
        summary.total_hours += hours;
        summary.total_pay += pay;
        summary.entries.push(ReportEntry {
            event_id: row.event_id,
            title: row.title.unwrap_or_default(),
            start,
            start_time: start_basis,
            end_time,
            hours,
            rate,
            pay,
        });
    }

    if auth.role.is_manager() {
        Ok(HttpResponse::Ok().json(summaries))
    } else {
        let own = summaries
            .remove(&auth.username)
            .unwrap_or_else(|| ReportSummary {
                username: auth.username.clone(),
                name: auth.display_name.clone(),
                total_hours: 0.0,
                total_pay: 0.0,
                entries: Vec::new(),
            });
        Ok(HttpResponse::Ok().json(own))
    }
}
