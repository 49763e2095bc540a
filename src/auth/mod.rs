pub mod passwords;
pub mod totp;

use rocket::http::{Cookie, CookieJar, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::User;

pub const SESSION_COOKIE: &str = "session";

/// Server-side session table keyed by the opaque token handed out at login.
/// Rocket's private cookie jar keeps the token itself tamper-proof in
/// transit; this map is what lets a logout actually invalidate it, which a
/// purely-signed cookie can't do on its own.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, i64>>,
    /// Short-lived tokens issued between password verification and TOTP
    /// verification for accounts with `two_factor_enabled` (spec.md §6.1
    /// `/auth/2fa/login`). Never touches the private cookie jar.
    mfa_pending: Mutex<HashMap<String, i64>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()), mfa_pending: Mutex::new(HashMap::new()) }
    }

    pub fn create(&self, user_id: i64) -> String {
        let token = crate::db::generate_session_token();
        self.sessions.lock().unwrap().insert(token.clone(), user_id);
        token
    }

    pub fn resolve(&self, token: &str) -> Option<i64> {
        self.sessions.lock().unwrap().get(token).copied()
    }

    pub fn destroy(&self, token: &str) {
        self.sessions.lock().unwrap().remove(token);
    }

    pub fn create_mfa_pending(&self, user_id: i64) -> String {
        let token = format!("mfa_{:032x}", uuid::Uuid::new_v4().as_u128());
        self.mfa_pending.lock().unwrap().insert(token.clone(), user_id);
        token
    }

    /// Consumes the pending token so it can't be replayed.
    pub fn take_mfa_pending(&self, token: &str) -> Option<i64> {
        self.mfa_pending.lock().unwrap().remove(token)
    }
}

pub fn issue_cookie(jar: &CookieJar<'_>, token: String) {
    jar.add_private(Cookie::new(SESSION_COOKIE, token));
}

pub fn clear_cookie(jar: &CookieJar<'_>) {
    jar.remove_private(Cookie::from(SESSION_COOKIE));
}

/// Resolved from the session cookie on every guarded route. Carries just
/// enough to drive authorization checks without a DB round trip in the
/// common case; services re-fetch the full `User` row when they need policy
/// fields like `strict_e2ee` or `plan`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        if is_state_changing(req.method()) && !same_origin(req) {
            return Outcome::Error((Status::Forbidden, ()));
        }
        let Some(token) = req.cookies().get_private(SESSION_COOKIE).map(|c| c.value().to_string())
        else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let store = req.rocket().state::<SessionStore>().expect("SessionStore managed");
        match store.resolve(&token) {
            Some(id) => Outcome::Success(AuthUser { id }),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

fn is_state_changing(method: rocket::http::Method) -> bool {
    use rocket::http::Method::*;
    matches!(method, Post | Put | Patch | Delete)
}

/// CSRF defense for the cookie-authenticated surface (spec.md §2 "HTTP
/// gateway" lists CSRF alongside auth and rate limiting): a same-origin
/// check on the `Origin` header, the lightweight alternative to a
/// synchronizer token that needs no extra cookie or client-side plumbing.
/// Requests without an `Origin` header (same-site navigations, non-browser
/// clients, this crate's own test suite) are left alone — only a *present
/// and mismatched* `Origin` is rejected.
fn same_origin(req: &Request<'_>) -> bool {
    let Some(origin) = req.headers().get_one("Origin") else { return true };
    let Some(host) = req.headers().get_one("Host") else { return false };
    let origin_host = origin.split("://").nth(1).unwrap_or(origin);
    origin_host.eq_ignore_ascii_case(host)
}

/// Loads the full row for an `AuthUser`. Kept as a free function rather than
/// a second request guard so routes that already paid for the session
/// lookup don't pay for it twice under Rocket's guard fairing model.
pub fn load_user(conn: &rusqlite::Connection, user_id: i64) -> rusqlite::Result<User> {
    conn.query_row(
        "SELECT id, username, email, password_hash, role, plan, public_key,
                preferred_language, allow_explicit_content, strict_e2ee,
                show_read_receipts, auto_delete_seconds, two_factor_enabled,
                totp_secret_enc, created_at
         FROM users WHERE id = ?1",
        [user_id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                role: row.get::<_, String>(4)?.parse().unwrap_or(crate::models::UserRole::User),
                plan: row.get::<_, String>(5)?.parse().unwrap_or(crate::models::Plan::Free),
                public_key: row.get(6)?,
                preferred_language: row.get(7)?,
                allow_explicit_content: row.get(8)?,
                strict_e2ee: row.get(9)?,
                show_read_receipts: row.get(10)?,
                auto_delete_seconds: row.get(11)?,
                two_factor_enabled: row.get(12)?,
                totp_secret_enc: row.get(13)?,
                created_at: row.get(14)?,
            })
        },
    )
}
