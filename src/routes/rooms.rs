//! Room/participant surface (spec.md §6.1 `/rooms`, `/group-invites`).

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};

use crate::auth::AuthUser;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::events::{ChatEvent, EventBus};
use crate::models::*;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::room_service::RoomService;

use super::ClientIp;

#[post("/rooms", format = "json", data = "<body>")]
pub fn create_room(
    db: &State<Db>,
    events: &State<EventBus>,
    rate_limiter: &State<RateLimiter>,
    rate_limit_config: &State<RateLimitConfig>,
    ip: ClientIp,
    user: AuthUser,
    body: Json<CreateRoomRequest>,
) -> AppResult<Json<ChatRoom>> {
    if !rate_limiter.check(&format!("create_room:{}", ip.0), rate_limit_config.rooms_max, rate_limit_config.rooms_window_secs) {
        return Err(AppError::RateLimited { message: "too many rooms created".into(), retry_after_secs: rate_limit_config.rooms_window_secs });
    }
    let svc = RoomService { db, events };
    Ok(Json(svc.create(user.id, body.into_inner())?))
}

#[get("/rooms/<room_id>/participants")]
pub fn list_participants(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    room_id: i64,
) -> AppResult<Json<Vec<Participant>>> {
    let svc = RoomService { db, events };
    Ok(Json(svc.list_participants(user.id, room_id)?))
}

#[post("/rooms/<room_id>/participants", format = "json", data = "<body>")]
pub fn add_participant(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    room_id: i64,
    body: Json<AddParticipantRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let svc = RoomService { db, events };
    svc.add_participant(user.id, room_id, body.into_inner())?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[patch("/rooms/<room_id>/participants/<target_user_id>/role", format = "json", data = "<body>")]
pub fn change_role(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    room_id: i64,
    target_user_id: i64,
    body: Json<ChangeRoleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let svc = RoomService { db, events };
    svc.change_role(user.id, room_id, target_user_id, body.role)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/rooms/<room_id>/participants/<target_user_id>/promote")]
pub fn promote_participant(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    room_id: i64,
    target_user_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    let svc = RoomService { db, events };
    svc.promote(user.id, room_id, target_user_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Removes a participant. When the target is the caller this is a self-leave
/// (spec.md §4.2 `leave`); otherwise it's an owner/admin kick.
#[delete("/rooms/<room_id>/participants/<target_user_id>")]
pub fn kick_participant(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    room_id: i64,
    target_user_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    let svc = RoomService { db, events };
    if target_user_id == user.id {
        svc.leave(user.id, room_id)?;
    } else {
        svc.kick(user.id, room_id, target_user_id)?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Explicit self-leave alias kept for clients that prefer a verb-shaped
/// route over `DELETE .../participants/:self`.
#[post("/rooms/<room_id>/leave")]
pub fn leave_room(db: &State<Db>, events: &State<EventBus>, user: AuthUser, room_id: i64) -> AppResult<Json<serde_json::Value>> {
    let svc = RoomService { db, events };
    svc.leave(user.id, room_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, serde::Deserialize)]
pub struct TypingUpdateRequest {
    pub is_typing: bool,
}

/// `typing:update` (spec.md §4.3): storage-free, best-effort broadcast to
/// every live subscriber of the room. Membership is still required so a
/// non-member can't probe who is in a room by watching for a rejection.
#[post("/rooms/<room_id>/typing", format = "json", data = "<body>")]
pub fn typing_update(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    room_id: i64,
    body: Json<TypingUpdateRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let svc = RoomService { db, events };
    if svc.list_participants(user.id, room_id).is_err() {
        return Err(AppError::Forbidden("not a member of this room".into()));
    }
    events.publish(ChatEvent::Typing { chat_room_id: room_id, user_id: user.id, is_typing: body.is_typing });
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/group-invites/<room_id>?<ttl_secs>")]
pub fn create_invite(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    room_id: i64,
    ttl_secs: Option<i64>,
) -> AppResult<Json<InviteCodeResponse>> {
    let svc = RoomService { db, events };
    let code = svc.create_invite(user.id, room_id, ttl_secs)?;
    Ok(Json(InviteCodeResponse { code }))
}

#[post("/group-invites/<code>/join")]
pub fn join_invite(
    db: &State<Db>,
    events: &State<EventBus>,
    user: AuthUser,
    code: &str,
) -> AppResult<Json<serde_json::Value>> {
    let svc = RoomService { db, events };
    let room_id = svc.join_by_invite(user.id, code)?;
    Ok(Json(serde_json::json!({ "chatRoomId": room_id })))
}
