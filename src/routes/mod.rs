// Route module decomposition — each domain area in its own file, the way
// the teacher splits its HTTP surface (spec.md §6.1).

mod auth_routes;
mod messages;
mod rooms;
mod stream;
mod system;
mod uploads;

pub use auth_routes::{forgot_password, login, logout, me, register, reset_password, two_factor_login};
pub use messages::{
    add_reaction, clear_all_messages, clear_messages, delete_message, edit_message, forward_message,
    get_messages, mark_read, notify_copied, read_bulk, remove_reaction, schedule_message, search_messages,
    send_message,
};
pub use rooms::{
    add_participant, change_role, create_invite, create_room, join_invite, kick_participant,
    leave_room, list_participants, promote_participant, typing_update,
};
pub use stream::room_stream;
pub use system::{health, not_found, stats, too_many_requests};
pub use uploads::{complete_upload, download_upload, intent_upload, upload_multipart};

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

/// Best-effort caller IP for rate-limit keys, same resolution order as the
/// teacher's `ClientIp` guard (src/routes/mod.rs).
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| req.remote().map(|r| r.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// Global-admin guard: loads the caller's row and forwards (404s into a 401
/// at the catcher) unless `role = ADMIN`.
pub struct AdminUser {
    pub id: i64,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user = match crate::auth::AuthUser::from_request(req).await {
            Outcome::Success(u) => u,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };
        let db = req.rocket().state::<crate::db::Db>().expect("Db managed");
        let conn = db.conn.lock().unwrap();
        let is_admin: bool = conn
            .query_row("SELECT role FROM users WHERE id = ?1", [user.id], |r| r.get::<_, String>(0))
            .map(|r| r == "ADMIN")
            .unwrap_or(false);
        drop(conn);
        if is_admin {
            Outcome::Success(AdminUser { id: user.id })
        } else {
            Outcome::Error((Status::Forbidden, ()))
        }
    }
}
