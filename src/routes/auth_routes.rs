//! Account surface (spec.md §6.1 `/auth/*`): password auth with an optional
//! TOTP second factor, server-revocable sessions, and a forgot/reset-password
//! pair that never confirms whether an email is registered.

use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Value};

use crate::auth::{self, passwords, totp, AuthUser, SessionStore};
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::*;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn public_user(u: &User) -> Value {
    json!({
        "id": u.id,
        "username": u.username,
        "email": u.email,
        "role": u.role,
        "plan": u.plan,
        "publicKey": u.public_key,
        "preferredLanguage": u.preferred_language,
        "allowExplicitContent": u.allow_explicit_content,
        "strictE2ee": u.strict_e2ee,
        "showReadReceipts": u.show_read_receipts,
        "autoDeleteSeconds": u.auto_delete_seconds,
        "twoFactorEnabled": u.two_factor_enabled,
        "createdAt": u.created_at,
    })
}

#[post("/auth/register", format = "json", data = "<body>")]
pub fn register(
    db: &State<Db>,
    sessions: &State<SessionStore>,
    jar: &CookieJar<'_>,
    body: Json<RegisterRequest>,
) -> AppResult<Json<Value>> {
    let username = body.username.trim();
    let email = body.email.trim().to_lowercase();
    if username.is_empty() || username.len() > 64 {
        return Err(AppError::Validation("username must be 1-64 characters".into()));
    }
    if body.password.len() < 8 {
        return Err(AppError::Validation("password must be at least 8 characters".into()));
    }
    let hash = passwords::hash_password(&body.password).map_err(AppError::Internal)?;

    let conn = db.conn.lock().unwrap();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, hash, now],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE") {
            AppError::Conflict("username or email already registered".into())
        } else {
            AppError::from(e)
        }
    })?;
    let user_id = conn.last_insert_rowid();
    let user = auth::load_user(&conn, user_id)?;
    drop(conn);

    let token = sessions.create(user_id);
    auth::issue_cookie(jar, token);
    Ok(Json(public_user(&user)))
}

#[post("/auth/login", format = "json", data = "<body>")]
pub fn login(
    db: &State<Db>,
    sessions: &State<SessionStore>,
    jar: &CookieJar<'_>,
    body: Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let conn = db.conn.lock().unwrap();
    let identifier = body.identifier.trim();
    let user_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1 OR email = ?1",
            [identifier],
            |r| r.get(0),
        )
        .optional()?;
    let Some(user_id) = user_id else {
        return Err(AppError::Unauthorized("invalid credentials".into()));
    };
    let user = auth::load_user(&conn, user_id)?;
    if !passwords::verify_password(&body.password, &user.password_hash) {
        return Err(AppError::Unauthorized("invalid credentials".into()));
    }

    if user.two_factor_enabled {
        let mfa_token = sessions.create_mfa_pending(user_id);
        return Ok(Json(json!({ "mfaRequired": true, "mfaToken": mfa_token })));
    }

    drop(conn);
    let token = sessions.create(user_id);
    auth::issue_cookie(jar, token);
    Ok(Json(public_user(&user)))
}

#[post("/auth/2fa/login", format = "json", data = "<body>")]
pub fn two_factor_login(
    db: &State<Db>,
    sessions: &State<SessionStore>,
    jar: &CookieJar<'_>,
    body: Json<TwoFactorLoginRequest>,
) -> AppResult<Json<Value>> {
    let Some(user_id) = sessions.take_mfa_pending(&body.mfa_token) else {
        return Err(AppError::Unauthorized("mfa challenge expired or invalid".into()));
    };
    let conn = db.conn.lock().unwrap();
    let user = auth::load_user(&conn, user_id)?;
    let Some(secret_b32) = user.totp_secret_enc.as_deref() else {
        return Err(AppError::Validation("two-factor is not configured for this account".into()));
    };
    let Some(secret) = totp::base32_decode(secret_b32) else {
        return Err(AppError::Internal("corrupt totp secret".into()));
    };
    let now = chrono::Utc::now().timestamp() as u64;
    if !totp::verify(&secret, body.code.trim(), now) {
        return Err(AppError::Unauthorized("invalid code".into()));
    }
    drop(conn);

    let token = sessions.create(user_id);
    auth::issue_cookie(jar, token);
    Ok(Json(public_user(&user)))
}

#[post("/auth/logout")]
pub fn logout(sessions: &State<SessionStore>, jar: &CookieJar<'_>) -> Json<Value> {
    if let Some(token) = jar.get_private(auth::SESSION_COOKIE).map(|c| c.value().to_string()) {
        sessions.destroy(&token);
    }
    auth::clear_cookie(jar);
    Json(json!({ "ok": true }))
}

#[get("/auth/me")]
pub fn me(db: &State<Db>, user: AuthUser) -> AppResult<Json<Value>> {
    let conn = db.conn.lock().unwrap();
    let user = auth::load_user(&conn, user.id)?;
    Ok(Json(public_user(&user)))
}

/// Always returns 200 — whether `email` matches an account is never
/// observable from the response (spec.md §7 propagation policy).
#[post("/auth/forgot-password", format = "json", data = "<body>")]
pub fn forgot_password(db: &State<Db>, body: Json<ForgotPasswordRequest>) -> Json<Value> {
    let conn = db.conn.lock().unwrap();
    let email = body.email.trim().to_lowercase();
    let user_id: Option<i64> =
        conn.query_row("SELECT id FROM users WHERE email = ?1", [&email], |r| r.get(0)).optional().unwrap_or(None);

    if let Some(user_id) = user_id {
        let raw_token = crate::db::generate_reset_token();
        let token_hash = passwords::hash_token(&raw_token);
        let now = now_rfc3339();
        let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO password_reset_tokens (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, user_id, now, expires_at],
        );
        // No outbound email transport is in scope here (spec.md §1); the raw
        // token would be delivered by that channel in a full deployment.
        println!("📧 password reset requested for user {user_id}");
    }
    Json(json!({ "ok": true }))
}

#[post("/auth/reset-password", format = "json", data = "<body>")]
pub fn reset_password(db: &State<Db>, body: Json<ResetPasswordRequest>) -> AppResult<Json<Value>> {
    if body.new_password.len() < 8 {
        return Err(AppError::Validation("password must be at least 8 characters".into()));
    }
    let token_hash = passwords::hash_token(&body.token);
    let conn = db.conn.lock().unwrap();
    let now = now_rfc3339();
    let user_id: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM password_reset_tokens
             WHERE token_hash = ?1 AND used_at IS NULL AND expires_at > ?2",
            params![token_hash, now],
            |r| r.get(0),
        )
        .optional()?;
    let Some(user_id) = user_id else {
        return Err(AppError::Validation("reset token is invalid or has expired".into()));
    };
    let hash = passwords::hash_password(&body.new_password).map_err(AppError::Internal)?;
    conn.execute("UPDATE users SET password_hash = ?1 WHERE id = ?2", params![hash, user_id])?;
    conn.execute(
        "UPDATE password_reset_tokens SET used_at = ?1 WHERE token_hash = ?2",
        params![now, token_hash],
    )?;
    Ok(Json(json!({ "ok": true })))
}
