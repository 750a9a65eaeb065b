use crate::state::AppState;
use actix_web::{get, web, HttpResponse};
use serde_json::json;

/// Snapshot of the currently-online usernames.
#[get("/users")]
pub async fn online_users(state: web::Data<AppState>) -> HttpResponse {
    let users = state.registry.online_users().await;
    HttpResponse::Ok().json(json!({ "users": users }))
}
