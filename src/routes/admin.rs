use actix_web::{error::ErrorInternalServerError, web, HttpResponse, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    auth::{hash_password, new_id, AuthUser},
    db::{self, RenameOutcome},
    mailer,
    models::{
        normalize_s34a_art, Category, EventRow, ResponseStatus, Role, UserRow,
        BOOTSTRAP_ACCOUNTS, EVENT_STATUS_GEPLANT, EVENT_STATUS_OFFEN,
    },
    rules,
    state::AppState,
};

use super::{bad_request, forbidden, not_found, ok_status};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/users")
            .route(web::get().to(list_users))
            .route(web::post().to(add_user)),
    )
    .service(web::resource("/users_public").route(web::get().to(users_public)))
    .service(web::resource("/users/rename").route(web::post().to(rename_user)))
    .service(
        web::resource("/users/{username}")
            .route(web::put().to(edit_user))
            .route(web::delete().to(delete_user)),
    )
    .service(web::resource("/events/update").route(web::post().to(update_event)))
    .service(web::resource("/events/release").route(web::post().to(release_event)))
    .service(web::resource("/events/duplicate").route(web::post().to(duplicate_event)))
    .service(web::resource("/events/assign_user").route(web::post().to(assign_user)))
    .service(web::resource("/events/remove_user").route(web::post().to(remove_user_from_event)))
    .service(web::resource("/events/confirm").route(web::post().to(confirm_response)))
    .service(web::resource("/events/edit_entry").route(web::post().to(edit_entry)))
    .service(web::resource("/events/send_mail_all").route(web::post().to(send_mail_all)))
    // Parameterized resource last, so the static /events/* paths above win.
    .service(web::resource("/events/{id}").route(web::delete().to(delete_event)));
}

/// Accepts numbers and numeric strings; the calendar forms send both.
fn parse_int(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(default)
        }
        _ => default,
    }
}

/// Rates may arrive as a number, a numeric string, "" (meaning: none) or
/// null; anything else is a validation error.
fn parse_rate(value: Option<&Value>) -> Result<Option<f64>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| ()),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(()),
        _ => Err(()),
    }
}

// ---------------- user administration ----------------

async fn list_users(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    if !auth.role.can_manage_users() {
        return Ok(forbidden());
    }

    let users = sqlx::query_as::<_, UserRow>(
        "SELECT * FROM users WHERE username NOT IN (?, ?) ORDER BY nachname, vorname",
    )
    .bind(BOOTSTRAP_ACCOUNTS[0])
    .bind(BOOTSTRAP_ACCOUNTS[1])
    .fetch_all(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(users))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct PublicUserRow {
    username: String,
    vorname: Option<String>,
    nachname: Option<String>,
}

/// Name-only roster for the planning views; no rates, no qualifications.
async fn users_public(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    if !auth.role.is_manager() {
        return Ok(forbidden());
    }

    let users = sqlx::query_as::<_, PublicUserRow>(
        "SELECT username, vorname, nachname FROM users WHERE username NOT IN (?, ?) ORDER BY nachname, vorname",
    )
    .bind(BOOTSTRAP_ACCOUNTS[0])
    .bind(BOOTSTRAP_ACCOUNTS[1])
    .fetch_all(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(users))
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    username: Option<String>,
    password: Option<String>,
    role: Option<String>,
    vorname: Option<String>,
    nachname: Option<String>,
    email: Option<String>,
    s34a: Option<String>,
    s34a_art: Option<String>,
    pschein: Option<String>,
    bewach_id: Option<String>,
    steuernummer: Option<String>,
    bsw: Option<String>,
    sanitaeter: Option<String>,
    stundensatz: Option<Value>,
}

async fn add_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_users() {
        return Ok(forbidden());
    }

    let payload = payload.into_inner();
    let username = payload.username.unwrap_or_default().trim().to_string();
    if username.is_empty() {
        return Ok(bad_request("username is required"));
    }

    let role = {
        let raw = payload.role.unwrap_or_default();
        if raw.trim().is_empty() {
            Role::Mitarbeiter
        } else {
            match Role::parse(&raw) {
                Some(role) => role,
                None => return Ok(bad_request("Invalid role")),
            }
        }
    };

    let stundensatz = match parse_rate(payload.stundensatz.as_ref()) {
        Ok(rate) => rate,
        Err(()) => return Ok(bad_request("stundensatz invalid")),
    };

    let password_hash = hash_password(&payload.password.unwrap_or_default())
        .map_err(|_| ErrorInternalServerError("hash failure"))?;

    let result = sqlx::query(
        r#"INSERT INTO users
           (username, password_hash, role, vorname, nachname, email, s34a, s34a_art, pschein,
            bewach_id, steuernummer, bsw, sanitaeter, stundensatz)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&username)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(payload.vorname.unwrap_or_default())
    .bind(payload.nachname.unwrap_or_default())
    .bind(payload.email.unwrap_or_default().trim())
    .bind(payload.s34a.unwrap_or_else(|| "nein".to_string()))
    .bind(normalize_s34a_art(&payload.s34a_art.unwrap_or_default()))
    .bind(payload.pschein.unwrap_or_else(|| "nein".to_string()))
    .bind(payload.bewach_id.unwrap_or_default())
    .bind(payload.steuernummer.unwrap_or_default())
    .bind(payload.bsw.unwrap_or_else(|| "nein".to_string()))
    .bind(payload.sanitaeter.unwrap_or_else(|| "nein".to_string()))
    .bind(stundensatz)
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        return Ok(bad_request(&format!("Failed to create user: {err}")));
    }

    Ok(ok_status())
}

async fn edit_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    payload: web::Json<UserPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_users() {
        return Ok(forbidden());
    }

    let username = path.into_inner();
    let Some(user) = db::fetch_user(&state.db, &username).await else {
        return Ok(not_found("User not found"));
    };

    let payload = payload.into_inner();

    let role = match payload.role {
        Some(raw) if !raw.trim().is_empty() => match Role::parse(&raw) {
            Some(role) => role.as_str().to_string(),
            None => return Ok(bad_request("Invalid role")),
        },
        _ => user.role.clone(),
    };

    // An empty s34a_art must not wipe the stored qualification when the form
    // only meant to update another field.
    let s34a_art = match payload.s34a_art {
        Some(raw) if !raw.trim().is_empty() => normalize_s34a_art(&raw),
        _ => user.s34a_art.clone().unwrap_or_default(),
    };

    let password_hash = match payload.password {
        Some(password) if !password.is_empty() => {
            hash_password(&password).map_err(|_| ErrorInternalServerError("hash failure"))?
        }
        _ => user.password_hash.clone(),
    };

    let stundensatz = if payload.stundensatz.is_some() {
        match parse_rate(payload.stundensatz.as_ref()) {
            Ok(rate) => rate,
            Err(()) => return Ok(bad_request("stundensatz invalid")),
        }
    } else {
        user.stundensatz
    };

    sqlx::query(
        r#"UPDATE users SET
           password_hash = ?, role = ?, vorname = ?, nachname = ?, email = ?, s34a = ?, s34a_art = ?,
           pschein = ?, bewach_id = ?, steuernummer = ?, bsw = ?, sanitaeter = ?, stundensatz = ?
           WHERE username = ?"#,
    )
    .bind(password_hash)
    .bind(role)
    .bind(payload.vorname.unwrap_or_else(|| user.vorname.clone().unwrap_or_default()))
    .bind(payload.nachname.unwrap_or_else(|| user.nachname.clone().unwrap_or_default()))
    .bind(
        payload
            .email
            .map(|email| email.trim().to_string())
            .unwrap_or_else(|| user.email.clone().unwrap_or_default()),
    )
    .bind(payload.s34a.unwrap_or_else(|| user.s34a.clone().unwrap_or_default()))
    .bind(s34a_art)
    .bind(payload.pschein.unwrap_or_else(|| user.pschein.clone().unwrap_or_default()))
    .bind(payload.bewach_id.unwrap_or_else(|| user.bewach_id.clone().unwrap_or_default()))
    .bind(payload.steuernummer.unwrap_or_else(|| user.steuernummer.clone().unwrap_or_default()))
    .bind(payload.bsw.unwrap_or_else(|| user.bsw.clone().unwrap_or_default()))
    .bind(payload.sanitaeter.unwrap_or_else(|| user.sanitaeter.clone().unwrap_or_default()))
    .bind(stundensatz)
    .bind(&username)
    .execute(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

async fn delete_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_users() {
        return Ok(forbidden());
    }

    sqlx::query("DELETE FROM users WHERE username = ?")
        .bind(path.into_inner())
        .execute(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
struct RenamePayload {
    old_username: Option<String>,
    new_username: Option<String>,
}

async fn rename_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<RenamePayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_users() {
        return Ok(forbidden());
    }

    let old_username = payload.old_username.clone().unwrap_or_default().trim().to_string();
    let new_username = payload.new_username.clone().unwrap_or_default().trim().to_string();
    if old_username.is_empty() || new_username.is_empty() {
        return Ok(bad_request("old_username and new_username are required"));
    }

    match db::rename_user(&state.db, &old_username, &new_username)
        .await
        .map_err(ErrorInternalServerError)?
    {
        RenameOutcome::Renamed => Ok(ok_status()),
        RenameOutcome::MissingOld => Ok(not_found("Old user not found")),
        RenameOutcome::Conflict => Ok(bad_request("New username already exists")),
    }
}

// ---------------- event administration ----------------

#[derive(Debug, Deserialize)]
pub(crate) struct EventPayload {
    event_id: Option<String>,
    title: Option<String>,
    ort: Option<String>,
    dienstkleidung: Option<String>,
    auftraggeber: Option<String>,
    start: Option<String>,
    planned_end_time: Option<String>,
    frist: Option<String>,
    status: Option<String>,
    category: Option<String>,
    required_staff: Option<Value>,
    use_event_rate: Option<Value>,
    stundensatz: Option<Value>,
}

struct EventFields {
    title: String,
    ort: String,
    dienstkleidung: String,
    auftraggeber: String,
    start: String,
    planned_end_time: String,
    frist: String,
    status: String,
    category: Category,
    required_staff: i64,
    use_event_rate: i64,
    stundensatz: Option<f64>,
}

fn event_fields(payload: EventPayload) -> Result<EventFields, &'static str> {
    let use_event_rate = parse_int(payload.use_event_rate.as_ref(), 1);
    let stundensatz = parse_rate(payload.stundensatz.as_ref()).map_err(|()| "stundensatz invalid")?;
    // A per-event rate makes no sense when the profile rate applies.
    let stundensatz = if use_event_rate == 0 { None } else { stundensatz };

    Ok(EventFields {
        title: payload.title.unwrap_or_default(),
        ort: payload.ort.unwrap_or_default(),
        dienstkleidung: payload.dienstkleidung.unwrap_or_default(),
        auftraggeber: payload.auftraggeber.unwrap_or_default(),
        start: payload.start.unwrap_or_default(),
        planned_end_time: payload.planned_end_time.unwrap_or_default().trim().to_string(),
        frist: payload.frist.unwrap_or_default().trim().to_string(),
        status: payload.status.unwrap_or_else(|| EVENT_STATUS_GEPLANT.to_string()),
        category: Category::parse_or_default(payload.category.as_deref().unwrap_or("")),
        required_staff: parse_int(payload.required_staff.as_ref(), 0),
        use_event_rate,
        stundensatz,
    })
}

pub(crate) async fn create_event(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<EventPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let fields = match event_fields(payload.into_inner()) {
        Ok(fields) => fields,
        Err(message) => return Ok(bad_request(message)),
    };

    sqlx::query(
        r#"INSERT INTO event
           (id, title, ort, dienstkleidung, auftraggeber, start, planned_end_time, frist,
            status, category, required_staff, use_event_rate, stundensatz)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(&fields.title)
    .bind(&fields.ort)
    .bind(&fields.dienstkleidung)
    .bind(&fields.auftraggeber)
    .bind(&fields.start)
    .bind(&fields.planned_end_time)
    .bind(&fields.frist)
    .bind(&fields.status)
    .bind(fields.category.as_str())
    .bind(fields.required_staff)
    .bind(fields.use_event_rate)
    .bind(fields.stundensatz)
    .execute(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

async fn update_event(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<EventPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let payload = payload.into_inner();
    let event_id = payload.event_id.clone().unwrap_or_default().trim().to_string();
    if event_id.is_empty() {
        return Ok(bad_request("event_id is missing"));
    }

    let fields = match event_fields(payload) {
        Ok(fields) => fields,
        Err(message) => return Ok(bad_request(message)),
    };

    let result = sqlx::query(
        r#"UPDATE event SET
           title = ?, ort = ?, dienstkleidung = ?, auftraggeber = ?,
           start = ?, planned_end_time = ?, frist = ?, status = ?, category = ?,
           required_staff = ?, use_event_rate = ?, stundensatz = ?
           WHERE id = ?"#,
    )
    .bind(&fields.title)
    .bind(&fields.ort)
    .bind(&fields.dienstkleidung)
    .bind(&fields.auftraggeber)
    .bind(&fields.start)
    .bind(&fields.planned_end_time)
    .bind(&fields.frist)
    .bind(&fields.status)
    .bind(fields.category.as_str())
    .bind(fields.required_staff)
    .bind(fields.use_event_rate)
    .bind(fields.stundensatz)
    .bind(&event_id)
    .execute(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    if result.rows_affected() == 0 {
        return Ok(not_found("Event not found"));
    }

    Ok(ok_status())
}

async fn delete_event(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    sqlx::query("DELETE FROM event WHERE id = ?")
        .bind(path.into_inner())
        .execute(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    event_id: Option<String>,
}

async fn release_event(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<ReleasePayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let event_id = payload.event_id.clone().unwrap_or_default();
    let result = sqlx::query("UPDATE event SET status = ? WHERE id = ?")
        .bind(EVENT_STATUS_OFFEN)
        .bind(&event_id)
        .execute(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;

    if result.rows_affected() == 0 {
        return Ok(not_found("Event not found"));
    }

    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
struct DuplicatePayload {
    event_id: Option<String>,
    dates: Option<Vec<String>>,
    start: Option<String>,
}

async fn insert_copy(
    conn: &mut sqlx::SqliteConnection,
    src: &EventRow,
    start_val: &str,
) -> Result<String, sqlx::Error> {
    let id = new_id();
    sqlx::query(
        r#"INSERT INTO event
           (id, title, ort, dienstkleidung, auftraggeber, start, planned_end_time, frist,
            status, category, required_staff, use_event_rate, stundensatz)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(src.title.as_deref().unwrap_or(""))
    .bind(src.ort.as_deref().unwrap_or(""))
    .bind(src.dienstkleidung.as_deref().unwrap_or(""))
    .bind(src.auftraggeber.as_deref().unwrap_or(""))
    .bind(start_val)
    .bind(src.planned_end_time.as_deref().unwrap_or(""))
    .bind(src.frist.as_deref().unwrap_or(""))
    .bind(src.status.as_deref().unwrap_or(EVENT_STATUS_GEPLANT))
    .bind(src.category.as_deref().unwrap_or("CP"))
    .bind(src.required_staff.unwrap_or(0))
    .bind(src.use_event_rate.unwrap_or(1))
    .bind(src.stundensatz)
    .execute(conn)
    .await?;
    Ok(id)
}

/// Copies an event onto a list of calendar dates (keeping the source's
/// time-of-day) or onto a single explicit start.
async fn duplicate_event(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<DuplicatePayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let payload = payload.into_inner();
    let source_id = payload.event_id.unwrap_or_default().trim().to_string();
    if source_id.is_empty() {
        return Ok(bad_request("event_id is missing"));
    }

    let Some(src) = db::fetch_event(&state.db, &source_id).await else {
        return Ok(not_found("Event not found"));
    };

    let src_start = src.start.clone().unwrap_or_default().trim().to_string();
    let src_time = rules::start_time_of_day(&src_start);

    let dates = payload.dates.unwrap_or_default();
    if !dates.is_empty() {
        let mut tx = state.db.begin().await.map_err(ErrorInternalServerError)?;
        let mut created = Vec::new();
        for date in &dates {
            let date = date.trim();
            if !rules::is_calendar_date(date) {
                continue;
            }
            let start_val = format!("{date}T{src_time}");
            let id = insert_copy(&mut tx, &src, &start_val)
                .await
                .map_err(ErrorInternalServerError)?;
            created.push(id);
        }

        if created.is_empty() {
            // Dropping the transaction rolls the (empty) unit of work back.
            return Ok(bad_request("No valid dates provided"));
        }

        tx.commit().await.map_err(ErrorInternalServerError)?;
        return Ok(HttpResponse::Ok().json(json!({ "status": "ok", "new_event_ids": created })));
    }

    let start_val = {
        let single = payload.start.unwrap_or_default().trim().to_string();
        if single.is_empty() { src_start } else { single }
    };
    if start_val.is_empty() {
        return Ok(bad_request("start is missing"));
    }

    let mut conn = state.db.acquire().await.map_err(ErrorInternalServerError)?;
    let id = insert_copy(&mut conn, &src, &start_val)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(json!({ "status": "ok", "new_event_id": id })))
}

// ---------------- response administration ----------------

#[derive(Debug, Deserialize)]
struct EntryRefPayload {
    event_id: Option<String>,
    username: Option<String>,
}

async fn upsert_response_status(
    state: &AppState,
    event_id: &str,
    username: &str,
    status: ResponseStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO response (event_id, username, status, remark, start_time, end_time)
           VALUES (?, ?, ?, '', '', '')
           ON CONFLICT(event_id, username) DO UPDATE SET status = excluded.status"#,
    )
    .bind(event_id)
    .bind(username)
    .bind(status.as_str())
    .execute(&state.db)
    .await?;
    Ok(())
}

/// Directly rosters an employee onto an event as confirmed.
async fn assign_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<EntryRefPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let event_id = payload.event_id.clone().unwrap_or_default().trim().to_string();
    let username = payload.username.clone().unwrap_or_default().trim().to_string();
    if event_id.is_empty() || username.is_empty() {
        return Ok(bad_request("event_id and username are required"));
    }

    if db::fetch_event(&state.db, &event_id).await.is_none() {
        return Ok(not_found("Event not found"));
    }
    if db::fetch_user(&state.db, &username).await.is_none() {
        return Ok(not_found("User not found"));
    }

    upsert_response_status(&state, &event_id, &username, ResponseStatus::Confirmed)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

/// Soft removal: the entry stays, flagged entfernt_chef, so the employee no
/// longer sees the event and it does not pop back up as open.
async fn remove_user_from_event(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<EntryRefPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let event_id = payload.event_id.clone().unwrap_or_default().trim().to_string();
    let username = payload.username.clone().unwrap_or_default().trim().to_string();
    if event_id.is_empty() || username.is_empty() {
        return Ok(bad_request("event_id and username are required"));
    }

    upsert_response_status(&state, &event_id, &username, ResponseStatus::RemovedByManager)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
struct ConfirmPayload {
    event_id: Option<String>,
    username: Option<String>,
    decision: Option<String>,
}

/// Manager decision on an application. A rejection is stored as
/// abgelehnt_chef so the UI can tell it apart from the employee's own no.
async fn confirm_response(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<ConfirmPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let event_id = payload.event_id.clone().unwrap_or_default().trim().to_string();
    let username = payload.username.clone().unwrap_or_default().trim().to_string();
    let decision = payload.decision.clone().unwrap_or_default().trim().to_string();

    if event_id.is_empty() || username.is_empty() {
        return Ok(bad_request("event_id and username are required"));
    }

    let status = match decision.as_str() {
        "bestätigt" => ResponseStatus::Confirmed,
        "abgelehnt" => ResponseStatus::DeclinedByManager,
        _ => return Ok(bad_request("Invalid decision")),
    };

    upsert_response_status(&state, &event_id, &username, status)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
struct EditEntryPayload {
    event_id: Option<String>,
    username: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    remark: Option<String>,
    rate_override: Option<Value>,
}

/// Manager edit of a roster entry. Time fields keep their prior value when
/// the form sends them empty; a changed start time or remark triggers a
/// notification mail to the employee.
async fn edit_entry(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<EditEntryPayload>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let payload = payload.into_inner();
    let event_id = payload.event_id.unwrap_or_default().trim().to_string();
    let username = payload.username.unwrap_or_default().trim().to_string();
    let start_time = payload.start_time.unwrap_or_default().trim().to_string();
    let end_time = payload.end_time.unwrap_or_default().trim().to_string();
    let remark = payload.remark.unwrap_or_default().trim().to_string();

    let rate_override = match parse_rate(payload.rate_override.as_ref()) {
        Ok(rate) => rate,
        Err(()) => return Ok(bad_request("rate_override invalid")),
    };

    if event_id.is_empty() || username.is_empty() {
        return Ok(bad_request("event_id and username are required"));
    }

    let old_row = sqlx::query_as::<_, (Option<String>, Option<String>)>(
        "SELECT start_time, remark FROM response WHERE event_id = ? AND username = ?",
    )
    .bind(&event_id)
    .bind(&username)
    .fetch_optional(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    let old_start = old_row
        .as_ref()
        .and_then(|(start, _)| start.clone())
        .unwrap_or_default();
    let old_remark = old_row
        .as_ref()
        .and_then(|(_, remark)| remark.clone())
        .unwrap_or_default();

    if old_row.is_some() {
        sqlx::query(
            r#"UPDATE response SET
               start_time = COALESCE(NULLIF(?, ''), start_time),
               end_time = COALESCE(NULLIF(?, ''), end_time),
               remark = ?,
               rate_override = ?
               WHERE event_id = ? AND username = ?"#,
        )
        .bind(&start_time)
        .bind(&end_time)
        .bind(&remark)
        .bind(rate_override)
        .bind(&event_id)
        .bind(&username)
        .execute(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;
    } else {
        sqlx::query(
            r#"INSERT INTO response (event_id, username, status, remark, start_time, end_time, rate_override)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&event_id)
        .bind(&username)
        .bind(ResponseStatus::Confirmed.as_str())
        .bind(&remark)
        .bind(&start_time)
        .bind(&end_time)
        .bind(rate_override)
        .execute(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;
    }

    let changed_start = !start_time.is_empty() && start_time != old_start;
    let changed_remark = remark != old_remark;

    if changed_start || changed_remark {
        let mail_start = if start_time.is_empty() { old_start } else { start_time };
        let mail_remark = if changed_remark { remark } else { String::new() };
        mailer::notify_entry_change(&state, &event_id, &username, &mail_start, &mail_remark).await;
    }

    Ok(ok_status())
}

/// Broadcast to every employee with a stored address; the body is fixed.
async fn send_mail_all(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    if !auth.role.can_manage_events() {
        return Ok(forbidden());
    }

    let addresses = sqlx::query_scalar::<_, Option<String>>("SELECT email FROM users WHERE role = ?")
        .bind(Role::Mitarbeiter.as_str())
        .fetch_all(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;

    let mut sent = 0;
    for address in addresses {
        let address = address.unwrap_or_default().trim().to_string();
        if address.is_empty() {
            continue;
        }
        match mailer::send_mail(&state.mail, &address, mailer::NEW_EVENTS_SUBJECT, mailer::NEW_EVENTS_BODY).await {
            Ok(()) => sent += 1,
            Err(err) => log::warn!("Broadcast mail to {address} failed: {err}"),
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "status": "ok", "sent": sent })))
}
