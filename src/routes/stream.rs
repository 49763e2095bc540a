//! The real-time gateway (spec.md §4.3 "socket bus"). One SSE endpoint per
//! room, subscribed to the shared `EventBus`, the same shape as the
//! teacher's `message_stream` — only the event catalog and the membership
//! check differ (room membership here, not a trust-based `sender` string).

use rocket::response::stream::{Event, EventStream};
use rocket::{get, State};
use rusqlite::{params, OptionalExtension};
use tokio::time::{interval, Duration};

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::events::{ChatEvent, EventBus};
use crate::models::MessageView;
use crate::signing::UrlSigner;
use crate::translation::{NoopTranslationProvider, TranslationCache};

fn is_participant(db: &Db, chat_room_id: i64, user_id: i64) -> AppResult<bool> {
    let conn = db.conn.lock().unwrap();
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM participants WHERE chat_room_id = ?1 AND user_id = ?2",
            params![chat_room_id, user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

fn is_admin(db: &Db, user_id: i64) -> bool {
    let conn = db.conn.lock().unwrap();
    conn.query_row("SELECT role FROM users WHERE id = ?1", [user_id], |r| r.get::<_, String>(0))
        .map(|r| r == "ADMIN")
        .unwrap_or(false)
}

fn preferred_language(db: &Db, user_id: i64) -> String {
    let conn = db.conn.lock().unwrap();
    conn.query_row("SELECT preferred_language FROM users WHERE id = ?1", [user_id], |r| r.get(0))
        .unwrap_or_else(|_| "en".to_string())
}

/// Replays messages created since `cursor` (exclusive) before switching to
/// live events, the same "catch up then follow" shape as the teacher's
/// `after=<seq>` replay.
fn replay(
    db: &Db,
    chat_room_id: i64,
    cursor: Option<i64>,
    caller_id: i64,
    caller_lang: &str,
    caller_is_admin: bool,
    cache: &TranslationCache,
    provider: &NoopTranslationProvider,
    signer: &UrlSigner,
    ttl_secs: i64,
) -> Vec<MessageView> {
    let Some(after_id) = cursor else { return vec![] };
    let conn = db.conn.lock().unwrap();
    let ids: Vec<i64> = {
        let mut stmt = match conn.prepare(
            "SELECT id FROM messages WHERE chat_room_id = ?1 AND id > ?2 ORDER BY id ASC LIMIT 200",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![chat_room_id, after_id], |r| r.get(0))
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    };
    ids.into_iter()
        .filter_map(|id| {
            crate::services::message_service::build_message_view(
                &conn, id, caller_id, caller_lang, caller_is_admin, cache, provider, signer, ttl_secs,
            )
            .ok()
        })
        .collect()
}

/// `GET /rooms/<chat_room_id>/stream` — subscribes the caller to every
/// `message:upsert`/legacy event for a room they belong to. `cursor` replays
/// anything created since the last message the caller saw.
#[get("/rooms/<chat_room_id>/stream?<cursor>")]
pub fn room_stream(
    db: &State<Db>,
    events: &State<EventBus>,
    config: &State<AppConfig>,
    signer: &State<UrlSigner>,
    user: AuthUser,
    chat_room_id: i64,
    cursor: Option<i64>,
) -> AppResult<EventStream![]> {
    let caller_id = user.id;
    let caller_is_admin = is_admin(db, caller_id);
    if !caller_is_admin && !is_participant(db, chat_room_id, caller_id)? {
        return Err(AppError::Forbidden("not a member of this room".into()));
    }
    let caller_lang = preferred_language(db, caller_id);

    let mut rx = events.sender.subscribe();
    let cache = TranslationCache::new();
    let provider = NoopTranslationProvider;
    let ttl_secs = config.signed_url_ttl_secs;

    let backlog = replay(
        db, chat_room_id, cursor, caller_id, &caller_lang, caller_is_admin, &cache, &provider, signer.inner(), ttl_secs,
    );

    Ok(EventStream! {
        for view in backlog {
            yield Event::json(&view).event("message:upsert");
        }

        let mut heartbeat = interval(Duration::from_secs(15));
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Ok(ChatEvent::MessageUpsert { chat_room_id: rid, view }) if rid == chat_room_id => {
                            yield Event::json(&view).event("message:upsert");
                        }
                        Ok(ChatEvent::LegacyMessageEdited { chat_room_id: rid, view }) if rid == chat_room_id => {
                            yield Event::json(&view).event("message_edited");
                        }
                        Ok(ChatEvent::LegacyMessageDeleted { chat_room_id: rid, message_id }) if rid == chat_room_id => {
                            yield Event::json(&serde_json::json!({"messageId": message_id})).event("message_deleted");
                        }
                        Ok(ChatEvent::ReactionUpdated { chat_room_id: rid, message_id, emoji, op, user_id, count }) if rid == chat_room_id => {
                            yield Event::json(&serde_json::json!({
                                "messageId": message_id,
                                "emoji": emoji,
                                "op": op,
                                "user": user_id,
                                "count": count,
                            })).event("reaction_updated");
                        }
                        Ok(ChatEvent::MessageRead { chat_room_id: rid, message_id, reader_id }) if rid == chat_room_id => {
                            yield Event::json(&serde_json::json!({
                                "messageId": message_id,
                                "reader": reader_id,
                                "readAt": chrono::Utc::now().to_rfc3339(),
                                "chatRoomId": rid,
                            })).event("message_read");
                        }
                        Ok(ChatEvent::MessageCopied { chat_room_id: rid, message_id, user_id }) if rid == chat_room_id => {
                            yield Event::json(&serde_json::json!({"messageId": message_id, "user": user_id})).event("message_copied");
                        }
                        Ok(ChatEvent::Typing { chat_room_id: rid, user_id, is_typing }) if rid == chat_room_id => {
                            yield Event::json(&serde_json::json!({"userId": user_id, "isTyping": is_typing})).event("typing");
                        }
                        Ok(ChatEvent::RoomUpdated { chat_room_id: rid }) if rid == chat_room_id => {
                            yield Event::json(&serde_json::json!({"chatRoomId": rid})).event("room_updated");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        _ => {}
                    }
                }
                _ = heartbeat.tick() => {
                    yield Event::json(&serde_json::json!({"time": chrono::Utc::now().to_rfc3339()})).event("heartbeat");
                }
            }
        }
    })
}
