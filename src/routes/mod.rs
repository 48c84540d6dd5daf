use actix_web::{middleware::from_fn, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde_json::json;

use crate::auth::{basic_validator, logout_guard};

pub mod admin;
pub mod employee;
pub mod events;
pub mod public;

pub fn configure(cfg: &mut web::ServiceConfig) {
    public::configure(cfg);
    // One authenticated scope at the root; static paths must register before
    // the parameterized /users/{username} and /events/{id} resources.
    cfg.service(
        web::scope("")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .configure(events::configure)
            .configure(employee::configure)
            .configure(admin::configure),
    );
}

pub fn ok_status() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(json!({ "error": "Not permitted" }))
}

pub fn consent_required() -> HttpResponse {
    HttpResponse::Forbidden().json(json!({
        "error": "Please consent to data processing on the start page first."
    }))
}

pub fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": message }))
}

pub fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": message }))
}
