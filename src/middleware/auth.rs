use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::services::access_service::{Actor, Role};

/// Identity is resolved by the gateway in front of this service; it hands
/// the verified principal down via headers. These layers only read them.
const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";

fn actor_from_headers(req: &Request) -> Option<Actor> {
    let id = req.headers().get(USER_ID_HEADER)?.to_str().ok()?;
    let id = Uuid::parse_str(id).ok()?;
    let role = req.headers().get(USER_ROLE_HEADER)?.to_str().ok()?;
    let role = Role::parse(role)?;
    Some(Actor { id, role })
}

pub async fn require_actor(mut req: Request, next: Next) -> Response {
    let Some(actor) = actor_from_headers(&req) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"missing_identity"})),
        )
            .into_response();
    };
    req.extensions_mut().insert(actor);
    next.run(req).await
}

pub async fn require_staff(mut req: Request, next: Next) -> Response {
    let Some(actor) = actor_from_headers(&req) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"missing_identity"})),
        )
            .into_response();
    };
    if !actor.role.is_staff() {
        return (StatusCode::FORBIDDEN, Json(json!({"error":"forbidden"}))).into_response();
    }
    req.extensions_mut().insert(actor);
    next.run(req).await
}
