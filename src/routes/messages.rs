//! Message surface (spec.md §6.1 `/messages`).

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::events::EventBus;
use crate::models::*;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::services::message_service::MessageService;
use crate::signing::UrlSigner;
use crate::translation::{TranslationCache, TranslationProvider};

use super::ClientIp;

#[allow(clippy::too_many_arguments)]
fn service<'a>(
    db: &'a State<Db>,
    events: &'a State<EventBus>,
    config: &'a State<AppConfig>,
    cache: &'a State<TranslationCache>,
    provider: &'a State<Box<dyn TranslationProvider>>,
    signer: &'a State<UrlSigner>,
) -> MessageService<'a> {
    MessageService { db, events, config, cache, provider: provider.as_ref().as_ref(), signer }
}

#[post("/messages/<room_id>", format = "json", data = "<body>")]
#[allow(clippy::too_many_arguments)]
pub fn send_message(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    rate_limiter: &State<RateLimiter>,
    rate_limit_config: &State<RateLimitConfig>,
    ip: ClientIp,
    user: AuthUser,
    room_id: i64,
    body: Json<SendMessageRequest>,
) -> AppResult<Json<MessageView>> {
    let rl = rate_limiter.check_with_info(
        &format!("send_msg:{}", user.id),
        rate_limit_config.messages_max,
        rate_limit_config.messages_window_secs,
    );
    if !rl.allowed {
        return Err(AppError::RateLimited {
            message: "too many messages".into(),
            retry_after_secs: rl.retry_after_secs,
        });
    }
    let _ = ip;
    let svc = service(db, events, config, cache, provider, signer);
    Ok(Json(svc.create(user.id, room_id, body.into_inner())?))
}

#[get("/messages/<room_id>?<limit>&<cursor>")]
pub fn get_messages(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    room_id: i64,
    limit: Option<i64>,
    cursor: Option<i64>,
) -> AppResult<Json<MessagesPage>> {
    let svc = service(db, events, config, cache, provider, signer);
    Ok(Json(svc.list(user.id, room_id, limit.unwrap_or(50), cursor)?))
}

#[patch("/messages/<message_id>/edit", format = "json", data = "<body>")]
pub fn edit_message(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    message_id: i64,
    body: Json<EditMessageRequest>,
) -> AppResult<Json<MessageView>> {
    let svc = service(db, events, config, cache, provider, signer);
    Ok(Json(svc.edit(user.id, message_id, body.into_inner().new_content)?))
}

#[delete("/messages/<message_id>?<scope>")]
pub fn delete_message(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    message_id: i64,
    scope: Option<&str>,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    svc.delete(user.id, message_id, scope.unwrap_or("me"))?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/messages/<room_id>/clear")]
pub fn clear_messages(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    room_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    svc.clear(user.id, room_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/messages/<room_id>/clear-all")]
pub fn clear_all_messages(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    room_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    svc.clear_all(user.id, room_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/messages/<room_id>/schedule", format = "json", data = "<body>")]
pub fn schedule_message(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    room_id: i64,
    body: Json<ScheduleMessageRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    let req = body.into_inner();
    let scheduled_at: chrono::DateTime<chrono::Utc> = req
        .scheduled_at
        .parse()
        .map_err(|_| AppError::Validation("scheduledAt must be an RFC3339 timestamp".into()))?;
    if scheduled_at < chrono::Utc::now() + chrono::Duration::seconds(5) {
        return Err(AppError::Validation("scheduledAt must be at least 5 seconds in the future".into()));
    }
    let id = svc.schedule(user.id, room_id, req.content, req.scheduled_at)?;
    Ok(Json(serde_json::json!({ "id": id })))
}

#[post("/messages/<message_id>/forward", format = "json", data = "<body>")]
pub fn forward_message(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    message_id: i64,
    body: Json<ForwardMessageRequest>,
) -> AppResult<Json<MessageView>> {
    let svc = service(db, events, config, cache, provider, signer);
    Ok(Json(svc.forward(user.id, message_id, body.into_inner().to_room_id)?))
}

#[post("/messages/<message_id>/reactions", format = "json", data = "<body>")]
pub fn add_reaction(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    message_id: i64,
    body: Json<AddReactionRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    let (op, count) = svc.react(user.id, message_id, &body.emoji)?;
    Ok(Json(serde_json::json!({ "op": op, "count": count })))
}

#[delete("/messages/<message_id>/reactions", format = "json", data = "<body>")]
pub fn remove_reaction(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    message_id: i64,
    body: Json<AddReactionRequest>,
) -> AppResult<Json<serde_json::Value>> {
    // Toggling again is the removal path (spec.md §4.7).
    let svc = service(db, events, config, cache, provider, signer);
    let (op, count) = svc.react(user.id, message_id, &body.emoji)?;
    Ok(Json(serde_json::json!({ "op": op, "count": count })))
}

#[patch("/messages/<message_id>/read")]
pub fn mark_read(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    message_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    svc.mark_read(user.id, message_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[post("/messages/<message_id>/copied")]
pub fn notify_copied(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    message_id: i64,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    svc.notify_copied(user.id, message_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[get("/messages/search?<q>&<room_id>&<limit>")]
#[allow(clippy::too_many_arguments)]
pub fn search_messages(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    q: &str,
    room_id: Option<i64>,
    limit: Option<i64>,
) -> AppResult<Json<Vec<MessageView>>> {
    if q.trim().is_empty() || q.len() > 500 {
        return Err(AppError::Validation("q must be 1-500 characters".into()));
    }
    let svc = service(db, events, config, cache, provider, signer);
    Ok(Json(svc.search(user.id, q, room_id, limit.unwrap_or(50))?))
}

#[patch("/messages/read-bulk", format = "json", data = "<body>")]
pub fn read_bulk(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    cache: &State<TranslationCache>,
    provider: &State<Box<dyn TranslationProvider>>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    body: Json<ReadBulkRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let svc = service(db, events, config, cache, provider, signer);
    let marked = svc.read_bulk(user.id, &body.ids)?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}
