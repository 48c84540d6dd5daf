use actix_web::{error::ErrorInternalServerError, web, HttpResponse, Result};
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    db,
    models::{ResponseStatus, Role},
    rules,
    state::AppState,
};

use super::{bad_request, consent_required, forbidden, not_found, ok_status};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/consent").route(web::post().to(set_consent)))
        .service(web::resource("/events/respond").route(web::post().to(respond)))
        .service(web::resource("/events/endtime").route(web::post().to(set_end_time)));
}

#[derive(Debug, Deserialize)]
struct ConsentPayload {
    yes: Option<Value>,
    name: Option<String>,
    date: Option<String>,
}

/// The consent checkbox arrives as whatever the frontend of the day sends:
/// a real bool, "1", "true", "ja", "yes".
fn is_yes(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "ja" | "yes")
        }
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

async fn set_consent(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<ConsentPayload>,
) -> Result<HttpResponse> {
    if auth.role != Role::Mitarbeiter {
        return Ok(forbidden());
    }

    if !is_yes(payload.yes.as_ref()) {
        return Ok(bad_request("Consent must be explicitly confirmed"));
    }
    let name = payload.name.clone().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Ok(bad_request("Name is required"));
    }
    let date = {
        let given = payload.date.clone().unwrap_or_default().trim().to_string();
        if given.is_empty() {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            given
        }
    };

    sqlx::query("UPDATE users SET consent_given = 1, consent_name = ?, consent_date = ? WHERE username = ?")
        .bind(&name)
        .bind(&date)
        .bind(&auth.username)
        .execute(&state.db)
        .await
        .map_err(ErrorInternalServerError)?;

    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
struct RespondPayload {
    event_id: Option<String>,
    response: Option<String>,
    remark: Option<String>,
}

/// Employee reaction to a released event: zugesagt, abgelehnt, or "" to
/// withdraw. Changes are possible until the deadline; confirmed or billed
/// entries can only be touched by a manager.
async fn respond(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<RespondPayload>,
) -> Result<HttpResponse> {
    if auth.role != Role::Mitarbeiter {
        return Ok(forbidden());
    }
    if db::employee_requires_consent(&state.db, &auth).await {
        return Ok(consent_required());
    }

    let event_id = payload.event_id.clone().unwrap_or_default().trim().to_string();
    let response_val = payload.response.clone().unwrap_or_default().trim().to_string();
    let remark = payload.remark.clone().unwrap_or_default().trim().to_string();

    if event_id.is_empty() {
        return Ok(bad_request("event_id is required"));
    }
    if !response_val.is_empty() && ResponseStatus::parse(&response_val).map_or(true, |s| {
        !matches!(s, ResponseStatus::Accepted | ResponseStatus::Declined)
    }) {
        return Ok(bad_request("Invalid response"));
    }

    let Some(event) = db::fetch_event(&state.db, &event_id).await else {
        return Ok(not_found("Event not found"));
    };

    if rules::deadline_passed(
        event.frist.as_deref().unwrap_or(""),
        Local::now().naive_local(),
    ) {
        return Ok(bad_request("The deadline has passed. Changes are no longer possible."));
    }

    let existing = sqlx::query_as::<_, (Option<String>, Option<String>)>(
        "SELECT status, end_time FROM response WHERE event_id = ? AND username = ?",
    )
    .bind(&event_id)
    .bind(&auth.username)
    .fetch_optional(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    if let Some((status, end_time)) = &existing {
        let confirmed = ResponseStatus::parse(status.as_deref().unwrap_or(""))
            == Some(ResponseStatus::Confirmed);
        let billed = !end_time.as_deref().unwrap_or("").trim().is_empty();
        if confirmed || billed {
            return Ok(bad_request(
                "This assignment is already confirmed/billed and can no longer be changed here.",
            ));
        }
    }

    if response_val.is_empty() {
        // Withdrawing clears the fields instead of deleting the row, so the
        // manager dashboard does not keep an empty card around.
        if existing.is_some() {
            sqlx::query(
                "UPDATE response SET status = NULL, remark = NULL WHERE event_id = ? AND username = ?",
            )
            .bind(&event_id)
            .bind(&auth.username)
            .execute(&state.db)
            .await
            .map_err(ErrorInternalServerError)?;
        }
    } else if existing.is_some() {
        sqlx::query("UPDATE response SET status = ?, remark = ? WHERE event_id = ? AND username = ?")
            .bind(&response_val)
            .bind(&remark)
            .bind(&event_id)
            .bind(&auth.username)
            .execute(&state.db)
            .await
            .map_err(ErrorInternalServerError)?;
    } else {
        sqlx::query("INSERT INTO response (event_id, username, status, remark) VALUES (?, ?, ?, ?)")
            .bind(&event_id)
            .bind(&auth.username)
            .bind(&response_val)
            .bind(&remark)
            .execute(&state.db)
            .await
            .map_err(ErrorInternalServerError)?;
    }

    Ok(ok_status())
}

#[derive(Debug, Deserialize)]
struct EndTimePayload {
    event_id: Option<String>,
    end_time: Option<String>,
}

/// Stores the worked end time exactly once; corrections go through the
/// manager edit endpoint.
async fn set_end_time(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    payload: web::Json<EndTimePayload>,
) -> Result<HttpResponse> {
    if auth.role != Role::Mitarbeiter {
        return Ok(forbidden());
    }
    if db::employee_requires_consent(&state.db, &auth).await {
        return Ok(consent_required());
    }

    let event_id = payload.event_id.clone().unwrap_or_default().trim().to_string();
    let end_time = payload.end_time.clone().unwrap_or_default().trim().to_string();
    if event_id.is_empty() || end_time.is_empty() {
        return Ok(bad_request("event_id and end_time are required"));
    }

    let existing = sqlx::query_as::<_, (Option<String>,)>(
        "SELECT end_time FROM response WHERE event_id = ? AND username = ?",
    )
    .bind(&event_id)
    .bind(&auth.username)
    .fetch_optional(&state.db)
    .await
    .map_err(ErrorInternalServerError)?;

    if let Some((stored,)) = &existing {
        if !stored.as_deref().unwrap_or("").trim().is_empty() {
            return Ok(bad_request("End time already saved"));
        }
    }

    if existing.is_some() {
        sqlx::query("UPDATE response SET end_time = ? WHERE event_id = ? AND username = ?")
            .bind(&end_time)
            .bind(&event_id)
            .bind(&auth.username)
            .execute(&state.db)
            .await
            .map_err(ErrorInternalServerError)?;
    } else {
        sqlx::query("INSERT INTO response (event_id, username, end_time) VALUES (?, ?, ?)")
            .bind(&event_id)
            .bind(&auth.username)
            .bind(&end_time)
            .execute(&state.db)
            .await
            .map_err(ErrorInternalServerError)?;
    }

    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::json;

    use crate::testutil;

    #[actix_web::test]
    async fn respond_honors_the_deadline() {
        let state = testutil::test_state().await;
        testutil::insert_user(&state.db, "anna", "pw", "mitarbeiter", true).await;
        testutil::insert_event(&state.db, "past", "2024-02-01T09:00", "2024-01-01T10:00", "offen").await;
        testutil::insert_event(&state.db, "open", "2099-02-01T09:00", "2099-01-01T10:00", "offen").await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events/respond")
            .insert_header(testutil::basic_auth_header("anna", "pw"))
            .set_json(json!({ "event_id": "past", "response": "zugesagt" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/events/respond")
            .insert_header(testutil::basic_auth_header("anna", "pw"))
            .set_json(json!({ "event_id": "open", "response": "zugesagt", "remark": "komme später" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let status = sqlx::query_scalar::<_, Option<String>>(
            "SELECT status FROM response WHERE event_id = 'open' AND username = 'anna'",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(status.as_deref(), Some("zugesagt"));
    }

    #[actix_web::test]
    async fn withdrawing_clears_status_in_place() {
        let state = testutil::test_state().await;
        testutil::insert_user(&state.db, "anna", "pw", "mitarbeiter", true).await;
        testutil::insert_event(&state.db, "ev1", "2099-02-01T09:00", "", "offen").await;
        sqlx::query("INSERT INTO response (event_id, username, status, remark) VALUES ('ev1', 'anna', 'zugesagt', 'x')")
            .execute(&state.db)
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events/respond")
            .insert_header(testutil::basic_auth_header("anna", "pw"))
            .set_json(json!({ "event_id": "ev1", "response": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let row = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT status, remark FROM response WHERE event_id = 'ev1' AND username = 'anna'",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(row, (None, None));
    }

    #[actix_web::test]
    async fn respond_refuses_confirmed_entries() {
        let state = testutil::test_state().await;
        testutil::insert_user(&state.db, "anna", "pw", "mitarbeiter", true).await;
        testutil::insert_event(&state.db, "ev1", "2099-02-01T09:00", "", "offen").await;
        sqlx::query("INSERT INTO response (event_id, username, status) VALUES ('ev1', 'anna', 'bestätigt')")
            .execute(&state.db)
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events/respond")
            .insert_header(testutil::basic_auth_header("anna", "pw"))
            .set_json(json!({ "event_id": "ev1", "response": "abgelehnt" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn end_time_is_write_once() {
        let state = testutil::test_state().await;
        testutil::insert_user(&state.db, "anna", "pw", "mitarbeiter", true).await;
        testutil::insert_event(&state.db, "ev1", "2024-02-01T09:00", "", "offen").await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events/endtime")
            .insert_header(testutil::basic_auth_header("anna", "pw"))
            .set_json(json!({ "event_id": "ev1", "end_time": "17:30" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/events/endtime")
            .insert_header(testutil::basic_auth_header("anna", "pw"))
            .set_json(json!({ "event_id": "ev1", "end_time": "18:00" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let stored = sqlx::query_scalar::<_, Option<String>>(
            "SELECT end_time FROM response WHERE event_id = 'ev1' AND username = 'anna'",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(stored.as_deref(), Some("17:30"));
    }

    #[actix_web::test]
    async fn consent_gate_blocks_event_access() {
        let state = testutil::test_state().await;
        testutil::insert_user(&state.db, "neu", "pw", "mitarbeiter", false).await;
        testutil::insert_event(&state.db, "ev1", "2099-02-01T09:00", "", "offen").await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events/respond")
            .insert_header(testutil::basic_auth_header("neu", "pw"))
            .set_json(json!({ "event_id": "ev1", "response": "zugesagt" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // Consent with a name unlocks it; the date defaults to today.
        let req = test::TestRequest::post()
            .uri("/consent")
            .insert_header(testutil::basic_auth_header("neu", "pw"))
            .set_json(json!({ "yes": true, "name": "Neu Nutzer" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/events/respond")
            .insert_header(testutil::basic_auth_header("neu", "pw"))
            .set_json(json!({ "event_id": "ev1", "response": "zugesagt" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
