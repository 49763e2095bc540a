//! Health/ops surface (spec.md §6.1). Adapted from the teacher's
//! `health`/`stats`/catcher trio — the stats query is rewritten from scratch
//! since the teacher's `rooms`/`sender_type` schema has no equivalent here,
//! but the "one cheap aggregate query per metric, `unwrap_or(0)` on error"
//! shape is kept.

use rocket::serde::json::Json;
use rocket::{get, State};

use crate::db::Db;
use crate::routes::AdminUser;

#[get("/health")]
pub fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "messaging-core",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Operational counters for dashboards/smoke-tests. Gated behind
/// `AdminUser` since, unlike the teacher's trust-based LAN service, this
/// backend has real accounts and counts are not meant to be public.
#[get("/stats")]
pub fn stats(db: &State<Db>, _admin: AdminUser) -> Json<serde_json::Value> {
    let conn = db.conn.lock().unwrap();

    let user_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)).unwrap_or(0);
    let room_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM chat_rooms", [], |r| r.get(0)).unwrap_or(0);
    let group_room_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM chat_rooms WHERE is_group = 1", [], |r| r.get(0))
        .unwrap_or(0);
    let message_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0)).unwrap_or(0);
    let tombstoned_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages WHERE deleted_for_all = 1", [], |r| r.get(0))
        .unwrap_or(0);
    let pending_expiry_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM messages WHERE expires_at IS NOT NULL AND deleted_for_all = 0",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);
    let attachment_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM attachments", [], |r| r.get(0)).unwrap_or(0);
    let reaction_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM message_reactions", [], |r| r.get(0)).unwrap_or(0);
    let scheduled_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM scheduled_messages", [], |r| r.get(0))
        .unwrap_or(0);
    let active_senders_1h: i64 = conn
        .query_row(
            "SELECT COUNT(DISTINCT sender_id) FROM messages WHERE created_at > datetime('now', '-1 hour')",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    Json(serde_json::json!({
        "users": user_count,
        "rooms": {
            "total": room_count,
            "group": group_room_count,
            "direct": room_count - group_room_count,
        },
        "messages": {
            "total": message_count,
            "tombstoned": tombstoned_count,
            "pending_expiry": pending_expiry_count,
            "scheduled": scheduled_count,
        },
        "attachments": attachment_count,
        "reactions": reaction_count,
        "active_senders_1h": active_senders_1h,
    }))
}

#[rocket::catch(429)]
pub fn too_many_requests() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Too many requests"}))
}

#[rocket::catch(404)]
pub fn not_found() -> Json<serde_json::Value> {
    Json(serde_json::json!({"error": "Not found"}))
}
