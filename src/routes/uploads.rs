//! Attachment storage (spec.md §4.9, §6.1 `/uploads`). Only a `local` disk
//! driver is wired here — `s3` is accepted by `AppConfig.storage_driver` but
//! has no implementation, matching the spec's stance that a real object
//! store is an external collaborator (see DESIGN.md).

use rocket::data::{Data, ToByteUnit};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::models::Upload;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::signing::{sign_attachment_url, UrlSigner};

use super::ClientIp;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn storage_path(config: &AppConfig, key: &str) -> PathBuf {
    PathBuf::from(&config.storage_bucket).join(key)
}

fn generate_key() -> String {
    format!("{:032x}", uuid::Uuid::new_v4().as_u128())
}

/// Blocked MIME types and filename extensions (spec.md §4.9: "Reject SVG
/// and executable MIME/extension lists"). SVG can carry inline `<script>`;
/// the rest are native-executable formats with no business being attached
/// to a message.
const BLOCKED_MIME_TYPES: &[&str] = &["image/svg+xml", "application/x-msdownload", "application/x-sh"];
const BLOCKED_EXTENSIONS: &[&str] = &["svg", "exe", "bat", "cmd", "sh", "com", "msi", "scr"];

fn reject_disallowed_upload(original_name: &str, mime_type: &str) -> AppResult<()> {
    if BLOCKED_MIME_TYPES.contains(&mime_type.to_ascii_lowercase().as_str()) {
        return Err(AppError::Validation(format!("{mime_type} attachments are not allowed")));
    }
    if let Some(ext) = original_name.rsplit('.').next() {
        if BLOCKED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return Err(AppError::Validation(format!(".{ext} attachments are not allowed")));
        }
    }
    Ok(())
}

fn public_upload(u: &Upload, signer: &UrlSigner, ttl_secs: i64) -> serde_json::Value {
    let now_unix = chrono::Utc::now().timestamp();
    serde_json::json!({
        "id": u.id,
        "key": u.key,
        "originalName": u.original_name,
        "mimeType": u.mime_type,
        "size": u.size,
        "url": sign_attachment_url(signer, &u.key, u.owner_id, ttl_secs, now_unix),
        "createdAt": u.created_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct UploadIntentRequest {
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
}

/// Step 1 of the presigned two-step path: reserve a key and row ahead of the
/// bytes actually arriving (spec.md §4.9).
#[post("/uploads/intent", format = "json", data = "<body>")]
#[allow(clippy::too_many_arguments)]
pub fn intent_upload(
    db: &State<Db>,
    config: &State<AppConfig>,
    signer: &State<UrlSigner>,
    rate_limiter: &State<RateLimiter>,
    rate_limit_config: &State<RateLimitConfig>,
    ip: ClientIp,
    user: AuthUser,
    body: Json<UploadIntentRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if !rate_limiter.check(&format!("upload:{}", ip.0), rate_limit_config.files_max, rate_limit_config.files_window_secs) {
        return Err(AppError::RateLimited { message: "too many uploads".into(), retry_after_secs: rate_limit_config.files_window_secs });
    }
    if body.size <= 0 || body.size > config.max_file_size_bytes {
        return Err(AppError::Validation(format!(
            "file size must be between 1 and {} bytes",
            config.max_file_size_bytes
        )));
    }
    reject_disallowed_upload(&body.original_name, &body.mime_type)?;
    let key = generate_key();
    let now = now_rfc3339();
    let conn = db.conn.lock().unwrap();
    conn.execute(
        "INSERT INTO uploads (owner_id, key, original_name, mime_type, size, driver, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![user.id, key, body.original_name, body.mime_type, body.size, config.storage_driver, now],
    )?;
    let upload_id = conn.last_insert_rowid();
    drop(conn);

    let now_unix = chrono::Utc::now().timestamp();
    let put_url = sign_attachment_url(signer, &key, user.id, config.signed_url_ttl_secs, now_unix);
    Ok(Json(serde_json::json!({ "uploadId": upload_id, "key": key, "putUrl": put_url })))
}

#[derive(Debug, Deserialize)]
pub struct UploadCompleteRequest {
    pub upload_id: i64,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Step 2: the caller confirms the bytes landed at the signed URL from
/// `intent`, and this finalizes the row so it can back an attachment.
#[post("/uploads/complete", format = "json", data = "<body>")]
pub fn complete_upload(
    db: &State<Db>,
    signer: &State<UrlSigner>,
    config: &State<AppConfig>,
    user: AuthUser,
    body: Json<UploadCompleteRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let conn = db.conn.lock().unwrap();
    let (owner_id, key): (i64, String) = conn
        .query_row("SELECT owner_id, key FROM uploads WHERE id = ?1", [body.upload_id], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .optional()?
        .ok_or_else(|| AppError::NotFound("upload not found".into()))?;
    if owner_id != user.id {
        return Err(AppError::Forbidden("not the owner of this upload".into()));
    }
    if let Some(sha) = &body.sha256 {
        conn.execute("UPDATE uploads SET sha256 = ?1 WHERE id = ?2", params![sha, body.upload_id])?;
    }
    let now_unix = chrono::Utc::now().timestamp();
    let url = sign_attachment_url(signer, &key, owner_id, config.signed_url_ttl_secs, now_unix);
    Ok(Json(serde_json::json!({ "ok": true, "key": key, "url": url })))
}

/// Direct multipart path: the bytes arrive in the request body itself
/// (spec.md §4.9 "direct multipart path"). Simplified to a raw-body upload
/// bounded by `max_file_size_bytes` rather than a full multipart parse.
#[post("/uploads?<original_name>&<mime_type>", data = "<data>")]
#[allow(clippy::too_many_arguments)]
pub async fn upload_multipart(
    db: &State<Db>,
    config: &State<AppConfig>,
    signer: &State<UrlSigner>,
    rate_limiter: &State<RateLimiter>,
    rate_limit_config: &State<RateLimitConfig>,
    ip: ClientIp,
    user: AuthUser,
    original_name: &str,
    mime_type: &str,
    data: Data<'_>,
) -> AppResult<Json<serde_json::Value>> {
    if !rate_limiter.check(&format!("upload:{}", ip.0), rate_limit_config.files_max, rate_limit_config.files_window_secs) {
        return Err(AppError::RateLimited { message: "too many uploads".into(), retry_after_secs: rate_limit_config.files_window_secs });
    }
    reject_disallowed_upload(original_name, mime_type)?;
    let limit = config.max_file_size_bytes.max(0) as u64;
    let bytes = data.open(limit.bytes()).into_bytes().await.map_err(|e| AppError::Internal(e.to_string()))?;
    if !bytes.is_complete() {
        return Err(AppError::Validation("file exceeds the maximum upload size".into()));
    }
    let bytes = bytes.into_inner();

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());

    let conn = db.conn.lock().unwrap();

    // Content-addressed dedup: the same owner uploading identical bytes
    // twice (e.g. retry after a dropped response) reuses the existing row
    // instead of writing a second copy to disk (spec.md §4.9 "dedup by
    // (ownerId, sha256)").
    let existing: Option<(i64, String, String, String, i64, String, String)> = conn
        .query_row(
            "SELECT id, key, original_name, mime_type, size, driver, created_at
             FROM uploads WHERE owner_id = ?1 AND sha256 = ?2",
            params![user.id, sha256],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?)),
        )
        .optional()?;
    if let Some((id, key, original_name, mime_type, size, driver, created_at)) = existing {
        let upload = Upload {
            id,
            owner_id: user.id,
            key,
            sha256: Some(sha256),
            original_name,
            mime_type,
            size,
            driver: driver.parse().unwrap_or(crate::models::StorageDriver::Local),
            created_at,
        };
        return Ok(Json(public_upload(&upload, signer, config.signed_url_ttl_secs)));
    }

    let key = generate_key();
    std::fs::create_dir_all(&config.storage_bucket).map_err(|e| AppError::Internal(e.to_string()))?;
    std::fs::write(storage_path(config, &key), &bytes).map_err(|e| AppError::Internal(e.to_string()))?;

    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO uploads (owner_id, key, sha256, original_name, mime_type, size, driver, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![user.id, key, sha256, original_name, mime_type, bytes.len() as i64, config.storage_driver, now],
    )?;
    let id = conn.last_insert_rowid();
    let upload = Upload {
        id,
        owner_id: user.id,
        key,
        sha256: Some(sha256),
        original_name: original_name.to_string(),
        mime_type: mime_type.to_string(),
        size: bytes.len() as i64,
        driver: config.storage_driver.parse().unwrap_or(crate::models::StorageDriver::Local),
        created_at: now,
    };
    Ok(Json(public_upload(&upload, signer, config.signed_url_ttl_secs)))
}

/// ACL-checked, signed-URL-gated download (spec.md §4.9, §8 "signed-URL
/// owner binding"). `owner`/`expires`/`sig` are the query params `mint`
/// appends.
#[get("/uploads/<key>?<owner>&<expires>&<sig>")]
pub fn download_upload(
    db: &State<Db>,
    signer: &State<UrlSigner>,
    config: &State<AppConfig>,
    key: &str,
    owner: i64,
    expires: i64,
    sig: &str,
) -> AppResult<(Status, Vec<u8>)> {
    let now_unix = chrono::Utc::now().timestamp();
    if !signer.verify(key, owner, expires, sig, now_unix) {
        return Err(AppError::Forbidden("signed URL is invalid or has expired".into()));
    }
    let conn = db.conn.lock().unwrap();
    let upload_owner: Option<i64> =
        conn.query_row("SELECT owner_id FROM uploads WHERE key = ?1", [key], |r| r.get(0)).optional()?;
    match upload_owner {
        Some(owner_id) if owner_id == owner => {}
        Some(_) => return Err(AppError::Forbidden("signed URL does not match this attachment's owner".into())),
        None => return Err(AppError::NotFound("upload not found".into())),
    }
    drop(conn);

    let path = storage_path(config, key);
    let bytes = std::fs::read(&path).map_err(|_| AppError::NotFound("upload bytes not found on disk".into()))?;
    Ok((Status::Ok, bytes))
}
