//! The message create/edit/delete/read pipeline (spec.md §4.1, §4.5-§4.8).
//! Structured as a service struct over borrowed managed state, the way
//! `MessageService` separates itself from route handlers in the messaging
//! backend referenced for this shape (see DESIGN.md) — but kept on the
//! teacher's `rusqlite` + `Mutex<Connection>` + broadcast-channel stack
//! rather than that reference's sqlx/Redis pair.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::config::AppConfig;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::events::{ChatEvent, EventBus};
use crate::models::*;
use crate::profanity;
use crate::signing::{sign_attachment_url, UrlSigner};
use crate::translation::{translate_for_targets, TranslationCache, TranslationProvider};

pub struct MessageService<'a> {
    pub db: &'a Db,
    pub events: &'a EventBus,
    pub config: &'a AppConfig,
    pub cache: &'a TranslationCache,
    pub provider: &'a dyn TranslationProvider,
    pub signer: &'a UrlSigner,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Probes a freshly-attached audio file's duration from its on-disk bytes.
/// `url` is the opaque storage key `/uploads` handed back, not an absolute
/// URL, so an external `http(s)://` reference (spec.md §4.9) is left alone.
fn probe_audio_duration_secs(config: &AppConfig, url: &str) -> Option<i64> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }
    let path = std::path::Path::new(&config.storage_bucket).join(url);
    crate::audio_probe::wav_duration_secs(&path)
}

fn load_sender(conn: &Connection, sender_id: i64) -> AppResult<SenderProfile> {
    conn.query_row(
        "SELECT id, preferred_language, allow_explicit_content, auto_delete_seconds, plan, strict_e2ee
         FROM users WHERE id = ?1",
        [sender_id],
        |row| {
            Ok(SenderProfile {
                id: row.get(0)?,
                preferred_language: row.get(1)?,
                allow_explicit_content: row.get(2)?,
                auto_delete_seconds: row.get(3)?,
                plan: row.get::<_, String>(4)?.parse().unwrap_or(Plan::Free),
                strict_e2ee: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::Unauthorized("unknown sender".into()))
}

fn is_participant(conn: &Connection, chat_room_id: i64, user_id: i64) -> AppResult<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM participants WHERE chat_room_id = ?1 AND user_id = ?2 AND archived_at IS NULL",
            params![chat_room_id, user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

fn is_global_admin(conn: &Connection, user_id: i64) -> AppResult<bool> {
    let role: Option<String> = conn
        .query_row("SELECT role FROM users WHERE id = ?1", [user_id], |r| r.get(0))
        .optional()?;
    Ok(role.as_deref() == Some("ADMIN"))
}

fn load_recipients(conn: &Connection, chat_room_id: i64) -> AppResult<Vec<RecipientProfile>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.preferred_language, u.allow_explicit_content, u.public_key
         FROM participants p JOIN users u ON u.id = p.user_id
         WHERE p.chat_room_id = ?1 AND p.archived_at IS NULL",
    )?;
    let rows = stmt.query_map([chat_room_id], |row| {
        Ok(RecipientProfile {
            user_id: row.get(0)?,
            preferred_language: row.get(1)?,
            allow_explicit_content: row.get(2)?,
            public_key: row.get(3)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn find_idempotent(
    conn: &Connection,
    chat_room_id: i64,
    sender_id: i64,
    client_message_id: &str,
) -> AppResult<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM messages WHERE chat_room_id = ?1 AND sender_id = ?2 AND client_message_id = ?3",
            params![chat_room_id, sender_id, client_message_id],
            |r| r.get(0),
        )
        .optional()?)
}

impl<'a> MessageService<'a> {
    /// spec.md §4.1, the 12-step create pipeline.
    pub fn create(
        &self,
        sender_id: i64,
        chat_room_id: i64,
        req: SendMessageRequest,
    ) -> AppResult<MessageView> {
        let mut conn = self.db.conn.lock().unwrap();

        // Step 1: sender resolution.
        let sender = load_sender(&conn, sender_id)?;

        // Step 2: membership.
        if !is_participant(&conn, chat_room_id, sender_id)? {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }

        // Step 3: idempotency.
        if let Some(cid) = req.client_message_id.as_deref().filter(|s| !s.is_empty()) {
            if let Some(existing_id) = find_idempotent(&conn, chat_room_id, sender_id, cid)? {
                let is_admin = is_global_admin(&conn, sender_id)?;
                return self.build_view(&conn, existing_id, sender_id, &sender.preferred_language, is_admin);
            }
        }

        // Validate there is a body at all.
        let has_attachments = !req.attachments_inline.is_empty()
            || req.image_url.is_some()
            || req.audio_url.is_some();
        let content_present = req.content.as_deref().is_some_and(|s| !s.is_empty());
        let ciphertext_present = req.content_ciphertext.as_deref().is_some_and(|s| !s.is_empty());
        if !content_present && !ciphertext_present && !has_attachments {
            return Err(AppError::Validation(
                "message must have content, ciphertext, or an attachment".into(),
            ));
        }

        // Step 4: participants snapshot.
        let recipients = load_recipients(&conn, chat_room_id)?;

        // Step 5: content policy (plaintext only).
        let mut is_explicit = false;
        let mut content = req.content.clone();
        if let Some(text) = content.as_ref() {
            is_explicit = profanity::is_explicit(text);
            let must_clean = is_explicit
                && (!sender.allow_explicit_content
                    || recipients.iter().any(|r| !r.allow_explicit_content));
            if must_clean {
                content = Some(profanity::censor(text));
            }
        }

        // Step 6: translation fan-out (plaintext only).
        let mut translations: Option<HashMap<String, String>> = None;
        if let Some(text) = content.as_ref() {
            if self.config.translation_enabled && text.chars().count() <= self.config.translate_max_input_chars {
                let targets: Vec<String> = {
                    let mut seen = std::collections::HashSet::new();
                    recipients
                        .iter()
                        .map(|r| r.preferred_language.clone())
                        .filter(|lang| seen.insert(lang.clone()))
                        .collect()
                };
                let result = translate_for_targets(
                    self.cache,
                    self.provider,
                    text,
                    &sender.preferred_language,
                    &targets,
                    chat_room_id,
                );
                if !result.is_empty() {
                    translations = Some(result);
                }
            }
        }

        // Step 7: TTL clamp.
        let requested = req.expire_seconds.or(sender.auto_delete_seconds).unwrap_or(0);
        let expires_at = if requested <= 0 {
            None
        } else {
            let plan_max = match sender.plan {
                Plan::Free => self.config.free_plan_max_ttl_secs,
                Plan::Premium => self.config.premium_plan_max_ttl_secs,
            };
            let clamped = requested.clamp(5, plan_max);
            Some((chrono::Utc::now() + chrono::Duration::seconds(clamped)).to_rfc3339())
        };

        // Step 8: ciphertext normalization — stored as the opaque string it arrived as.
        let content_ciphertext = req.content_ciphertext.clone();

        // Step 9: strict E2EE gate.
        let has_body = content.is_some() || content_ciphertext.is_some() || has_attachments;
        if sender.strict_e2ee && has_body {
            let keys_ok = req.encrypted_keys.as_ref().is_some_and(|m| !m.is_empty());
            if content_ciphertext.as_deref().unwrap_or("").is_empty() || !keys_ok {
                return Err(AppError::Validation(
                    "strict end-to-end encryption requires ciphertext and sealed keys".into(),
                ));
            }
        }

        // Step 10: persist atomically. Message row, sealed keys, attachments,
        // and the search index entry all land in one transaction so a crash
        // or constraint failure partway through never leaves a message with
        // missing keys or attachments visible to readers.
        let now = now_rfc3339();
        let audio_duration = req.audio_url.as_deref().and_then(|url| probe_audio_duration_secs(self.config, url));
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages
                (chat_room_id, sender_id, client_message_id, raw_content, content_ciphertext,
                 translations, is_explicit, is_auto_reply, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
            params![
                chat_room_id,
                sender_id,
                req.client_message_id,
                content,
                content_ciphertext,
                translations.as_ref().map(|t| serde_json::to_string(t).unwrap()),
                is_explicit,
                now,
                expires_at,
            ],
        )?;
        let message_id = tx.last_insert_rowid();

        if let Some(keys) = req.encrypted_keys.as_ref() {
            for (user_id_str, sealed) in keys {
                if let Ok(user_id) = user_id_str.parse::<i64>() {
                    tx.execute(
                        "INSERT OR IGNORE INTO message_keys (message_id, user_id, encrypted_key) VALUES (?1, ?2, ?3)",
                        params![message_id, user_id, sealed],
                    )?;
                }
            }
        }

        for att in &req.attachments_inline {
            if matches!(att.kind, AttachmentKind::Audio) && att.duration_sec.is_none() {
                let mut att = att.clone();
                att.duration_sec = probe_audio_duration_secs(self.config, &att.url);
                insert_attachment(&tx, message_id, &att)?;
            } else {
                insert_attachment(&tx, message_id, att)?;
            }
        }
        if let Some(url) = req.image_url.clone() {
            insert_attachment(
                &tx,
                message_id,
                &AttachmentInput {
                    kind: AttachmentKind::Image,
                    url,
                    mime_type: "image/jpeg".into(),
                    width: None,
                    height: None,
                    duration_sec: None,
                    caption: None,
                    thumb_url: None,
                },
            )?;
        }
        if let Some(url) = req.audio_url.clone() {
            insert_attachment(
                &tx,
                message_id,
                &AttachmentInput {
                    kind: AttachmentKind::Audio,
                    url,
                    mime_type: "audio/mpeg".into(),
                    width: None,
                    height: None,
                    duration_sec: audio_duration,
                    caption: None,
                    thumb_url: None,
                },
            )?;
        }

        if content.is_some() {
            crate::db::upsert_fts(&tx, message_id);
        }

        tx.commit()?;

        // Step 11: emit canonical upsert.
        let is_admin = is_global_admin(&conn, sender_id)?;
        let view = self.build_view(&conn, message_id, sender_id, &sender.preferred_language, is_admin)?;
        self.events.publish(ChatEvent::MessageUpsert { chat_room_id, view: view.clone() });

        // Step 12: side channels. None wired in this core (see DESIGN.md).

        Ok(view)
    }

    /// spec.md §4.5 — paginated, visibility-composed read.
    pub fn list(
        &self,
        caller_id: i64,
        chat_room_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> AppResult<MessagesPage> {
        let conn = self.db.conn.lock().unwrap();

        let is_admin = is_global_admin(&conn, caller_id)?;
        if !is_admin && !is_participant(&conn, chat_room_id, caller_id)? {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }

        let cutoff = visibility_cutoff(&conn, chat_room_id, caller_id)?;
        let caller_lang: String = conn
            .query_row("SELECT preferred_language FROM users WHERE id = ?1", [caller_id], |r| r.get(0))
            .unwrap_or_else(|_| "en".to_string());

        let now = now_rfc3339();
        let limit = limit.clamp(1, 100);

        let mut sql = String::from(
            "SELECT id FROM messages
             WHERE chat_room_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        );
        if cutoff.is_some() {
            sql.push_str(" AND created_at > ?3");
        }
        if cursor.is_some() {
            sql.push_str(if cutoff.is_some() { " AND id < ?4" } else { " AND id < ?3" });
        }
        sql.push_str(" ORDER BY id DESC LIMIT ");
        sql.push_str(&(limit + 1).to_string());

        let mut stmt = conn.prepare(&sql)?;
        let ids: Vec<i64> = match (cutoff.as_deref(), cursor) {
            (Some(c), Some(cur)) => stmt
                .query_map(params![chat_room_id, now, c, cur], |r| r.get(0))?
                .filter_map(|r| r.ok())
                .collect(),
            (Some(c), None) => stmt
                .query_map(params![chat_room_id, now, c], |r| r.get(0))?
                .filter_map(|r| r.ok())
                .collect(),
            (None, Some(cur)) => stmt
                .query_map(params![chat_room_id, now, cur], |r| r.get(0))?
                .filter_map(|r| r.ok())
                .collect(),
            (None, None) => stmt
                .query_map(params![chat_room_id, now], |r| r.get(0))?
                .filter_map(|r| r.ok())
                .collect(),
        };
        drop(stmt);

        let has_more = ids.len() as i64 > limit;
        let page_ids: Vec<i64> = ids.into_iter().take(limit as usize).collect();

        let mut items = Vec::with_capacity(page_ids.len());
        for id in &page_ids {
            // Delete-for-me filter (spec.md §4.5 step 6).
            let hidden: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM message_deletions WHERE message_id = ?1 AND user_id = ?2",
                    params![id, caller_id],
                    |r| r.get(0),
                )
                .optional()?;
            if hidden.is_some() {
                continue;
            }
            items.push(self.build_view(&conn, *id, caller_id, &caller_lang, is_admin)?);
        }

        let next_cursor = if has_more { page_ids.last().copied() } else { None };
        Ok(MessagesPage { count: items.len(), items, next_cursor })
    }

    /// Full-text search over plaintext message bodies, scoped to rooms the
    /// caller belongs to. FTS5 with porter stemming, the same word-boundary
    /// + stemming behavior the teacher's `search_messages` provides, with a
    /// `LIKE` fallback on query syntax errors (spec.md §12 — ciphertext is
    /// never indexed, so strict-E2EE rooms are simply absent from results).
    pub fn search(&self, caller_id: i64, query: &str, room_id: Option<i64>, limit: i64) -> AppResult<Vec<MessageView>> {
        let conn = self.db.conn.lock().unwrap();
        let is_admin = is_global_admin(&conn, caller_id)?;
        let limit = limit.clamp(1, 100);
        let caller_lang: String = conn
            .query_row("SELECT preferred_language FROM users WHERE id = ?1", [caller_id], |r| r.get(0))
            .unwrap_or_else(|_| "en".to_string());

        let member_filter = if is_admin {
            String::new()
        } else {
            "AND m.chat_room_id IN (SELECT chat_room_id FROM participants WHERE user_id = :caller)".to_string()
        };
        let room_filter = if room_id.is_some() { "AND m.chat_room_id = :room" } else { "" };

        let sql = format!(
            "SELECT m.id FROM messages_fts f
             JOIN messages m ON m.id = f.message_id
             WHERE messages_fts MATCH :query AND m.deleted_for_all = 0 {member_filter} {room_filter}
             ORDER BY rank LIMIT :limit"
        );
        let ids: Vec<i64> = match conn.prepare(&sql).and_then(|mut stmt| {
            stmt.query_map(
                rusqlite::named_params! { ":query": query, ":caller": caller_id, ":room": room_id.unwrap_or(0), ":limit": limit },
                |r| r.get(0),
            )?
            .collect::<rusqlite::Result<Vec<i64>>>()
        }) {
            Ok(rows) => rows,
            Err(_) => {
                // Fallback: plain substring search, same scoping rules.
                let like = format!("%{}%", query.replace('%', ""));
                let sql = format!(
                    "SELECT id FROM messages m WHERE raw_content LIKE :like AND deleted_for_all = 0 {member_filter} {room_filter}
                     ORDER BY id DESC LIMIT :limit"
                );
                conn.prepare(&sql)?
                    .query_map(
                        rusqlite::named_params! { ":like": like, ":caller": caller_id, ":room": room_id.unwrap_or(0), ":limit": limit },
                        |r| r.get(0),
                    )?
                    .filter_map(|r| r.ok())
                    .collect()
            }
        };

        ids.into_iter().map(|id| self.build_view(&conn, id, caller_id, &caller_lang, is_admin)).collect()
    }

    /// spec.md §4.6 edit.
    pub fn edit(&self, caller_id: i64, message_id: i64, new_content: String) -> AppResult<MessageView> {
        let conn = self.db.conn.lock().unwrap();
        let row = load_edit_guard(&conn, message_id)?;

        if row.sender_id != caller_id {
            return Err(AppError::Forbidden("only the sender may edit this message".into()));
        }
        if row.deleted_for_all {
            return Err(AppError::Forbidden("cannot edit a deleted message".into()));
        }
        if row.has_other_reader {
            return Err(AppError::Forbidden("cannot edit a message another participant has read".into()));
        }
        let age_secs = (chrono::Utc::now() - row.created_at).num_seconds();
        if age_secs > self.config.message_edit_window_secs {
            return Err(AppError::Forbidden("edit window has passed".into()));
        }

        let now = now_rfc3339();
        conn.execute(
            "UPDATE messages SET raw_content = ?1, edited_at = ?2 WHERE id = ?3",
            params![new_content, now, message_id],
        )?;
        crate::db::upsert_fts(&conn, message_id);

        let caller_lang: String = conn
            .query_row("SELECT preferred_language FROM users WHERE id = ?1", [caller_id], |r| r.get(0))
            .unwrap_or_else(|_| "en".to_string());
        let is_admin = is_global_admin(&conn, caller_id)?;
        let view = self.build_view(&conn, message_id, caller_id, &caller_lang, is_admin)?;
        self.events.publish(ChatEvent::MessageUpsert { chat_room_id: row.chat_room_id, view: view.clone() });
        self.events
            .publish(ChatEvent::LegacyMessageEdited { chat_room_id: row.chat_room_id, view: view.clone() });
        Ok(view)
    }

    /// spec.md §4.6 delete. `scope` is `"me"` or `"all"`.
    pub fn delete(&self, caller_id: i64, message_id: i64, scope: &str) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let (chat_room_id, sender_id, deleted_for_all): (i64, i64, bool) = conn
            .query_row(
                "SELECT chat_room_id, sender_id, deleted_for_all FROM messages WHERE id = ?1",
                [message_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("message not found".into()))?;

        if scope == "me" {
            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO message_deletions (message_id, user_id, deleted_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id) DO UPDATE SET deleted_at = excluded.deleted_at",
                params![message_id, caller_id, now],
            )?;
            self.events.publish(ChatEvent::LegacyMessageDeleted { chat_room_id, message_id });
            return Ok(());
        }

        // scope == "all"
        let is_admin = is_global_admin(&conn, caller_id)?;
        if caller_id != sender_id && !is_admin {
            return Err(AppError::Forbidden("only the sender or an admin may delete for everyone".into()));
        }
        if deleted_for_all {
            return Ok(()); // idempotent
        }
        let now = now_rfc3339();
        conn.execute(
            "UPDATE messages SET deleted_for_all = 1, deleted_at = ?1, deleted_by_id = ?2,
                raw_content = NULL, content_ciphertext = NULL, translations = NULL
             WHERE id = ?3",
            params![now, caller_id, message_id],
        )?;
        crate::db::delete_fts(&conn, message_id);

        let caller_lang: String = conn
            .query_row("SELECT preferred_language FROM users WHERE id = ?1", [caller_id], |r| r.get(0))
            .unwrap_or_else(|_| "en".to_string());
        let view = self.build_view(&conn, message_id, caller_id, &caller_lang, is_admin)?;
        self.events.publish(ChatEvent::MessageUpsert { chat_room_id, view });
        self.events.publish(ChatEvent::LegacyMessageDeleted { chat_room_id, message_id });
        Ok(())
    }

    /// spec.md §4.5 step 1 "ThreadClear" — a per-user cutoff.
    pub fn clear(&self, caller_id: i64, chat_room_id: i64) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        if !is_participant(&conn, chat_room_id, caller_id)? {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }
        let latest_id: Option<i64> = conn
            .query_row(
                "SELECT MAX(id) FROM messages WHERE chat_room_id = ?1",
                [chat_room_id],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        let cleared_before = latest_id.unwrap_or(0);
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO thread_clears (chat_room_id, user_id, cleared_before_id, cleared_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_room_id, user_id) DO UPDATE SET
                cleared_before_id = excluded.cleared_before_id, cleared_at = excluded.cleared_at",
            params![chat_room_id, caller_id, cleared_before, now],
        )?;
        Ok(())
    }

    /// Tombstones every non-deleted message in the room (sender-or-admin bulk variant of delete-for-all).
    pub fn clear_all(&self, caller_id: i64, chat_room_id: i64) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let is_admin = is_global_admin(&conn, caller_id)?;
        let role: Option<String> = conn
            .query_row(
                "SELECT role FROM participants WHERE chat_room_id = ?1 AND user_id = ?2",
                params![chat_room_id, caller_id],
                |r| r.get(0),
            )
            .optional()?;
        let is_owner_or_admin = matches!(role.as_deref(), Some("OWNER") | Some("ADMIN"));
        if !is_admin && !is_owner_or_admin {
            return Err(AppError::Forbidden("only a room owner/admin or global admin may clear a room".into()));
        }

        let now = now_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT id FROM messages WHERE chat_room_id = ?1 AND deleted_for_all = 0",
        )?;
        let ids: Vec<i64> = stmt.query_map([chat_room_id], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
        drop(stmt);

        for id in &ids {
            conn.execute(
                "UPDATE messages SET deleted_for_all = 1, deleted_at = ?1, deleted_by_id = ?2,
                    raw_content = NULL, content_ciphertext = NULL, translations = NULL
                 WHERE id = ?3",
                params![now, caller_id, id],
            )?;
            crate::db::delete_fts(&conn, *id);
            let view = self.build_view(&conn, *id, caller_id, "en", is_admin)?;
            self.events.publish(ChatEvent::MessageUpsert { chat_room_id, view });
        }
        Ok(())
    }

    /// spec.md §4.7 reaction toggle.
    pub fn react(&self, caller_id: i64, message_id: i64, emoji: &str) -> AppResult<(ReactionOp, i64)> {
        let conn = self.db.conn.lock().unwrap();
        let (chat_room_id, deleted_for_all): (i64, bool) = conn
            .query_row(
                "SELECT chat_room_id, deleted_for_all FROM messages WHERE id = ?1",
                [message_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("message not found".into()))?;
        if deleted_for_all {
            return Ok((ReactionOp::Noop, 0));
        }
        if !is_participant(&conn, chat_room_id, caller_id)? {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM message_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id, caller_id, emoji],
                |r| r.get(0),
            )
            .optional()?;

        let op = if let Some(reaction_id) = existing {
            conn.execute("DELETE FROM message_reactions WHERE id = ?1", [reaction_id])?;
            ReactionOp::Removed
        } else {
            let now = now_rfc3339();
            conn.execute(
                "INSERT INTO message_reactions (message_id, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![message_id, caller_id, emoji, now],
            )?;
            ReactionOp::Added
        };

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_reactions WHERE message_id = ?1 AND emoji = ?2",
            params![message_id, emoji],
            |r| r.get(0),
        )?;

        let caller_lang: String = conn
            .query_row("SELECT preferred_language FROM users WHERE id = ?1", [caller_id], |r| r.get(0))
            .unwrap_or_else(|_| "en".to_string());
        let is_admin = is_global_admin(&conn, caller_id)?;
        let view = self.build_view(&conn, message_id, caller_id, &caller_lang, is_admin)?;
        self.events.publish(ChatEvent::MessageUpsert { chat_room_id, view });
        self.events.publish(ChatEvent::ReactionUpdated {
            chat_room_id,
            message_id,
            emoji: emoji.to_string(),
            op,
            user_id: caller_id,
            count,
        });
        Ok((op, count))
    }

    /// spec.md §4.8 single read ack.
    pub fn mark_read(&self, caller_id: i64, message_id: i64) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let chat_room_id: i64 = conn
            .query_row("SELECT chat_room_id FROM messages WHERE id = ?1", [message_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::NotFound("message not found".into()))?;
        if !is_participant(&conn, chat_room_id, caller_id)? {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(message_id, user_id) DO UPDATE SET read_at = excluded.read_at",
            params![message_id, caller_id, now],
        )?;
        let caller_lang: String = conn
            .query_row("SELECT preferred_language FROM users WHERE id = ?1", [caller_id], |r| r.get(0))
            .unwrap_or_else(|_| "en".to_string());
        let is_admin = is_global_admin(&conn, caller_id)?;
        let view = self.build_view(&conn, message_id, caller_id, &caller_lang, is_admin)?;
        self.events.publish(ChatEvent::MessageUpsert { chat_room_id, view });
        self.events.publish(ChatEvent::MessageRead { chat_room_id, message_id, reader_id: caller_id });
        Ok(())
    }

    /// spec.md §4.8 bulk read ack, filtered to rooms the caller is in.
    pub fn read_bulk(&self, caller_id: i64, ids: &[i64]) -> AppResult<usize> {
        let conn = self.db.conn.lock().unwrap();
        let mut marked = 0usize;
        let now = now_rfc3339();
        for id in ids {
            let chat_room_id: Option<i64> = conn
                .query_row("SELECT chat_room_id FROM messages WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;
            let Some(chat_room_id) = chat_room_id else { continue };
            if !is_participant(&conn, chat_room_id, caller_id)? {
                continue;
            }
            conn.execute(
                "INSERT INTO message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id) DO UPDATE SET read_at = excluded.read_at",
                params![id, caller_id, now],
            )?;
            self.events.publish(ChatEvent::MessageRead { chat_room_id, message_id: *id, reader_id: caller_id });
            marked += 1;
        }
        Ok(marked)
    }

    /// spec.md §4.3 `message_copied` — a storage-free copy notice. No DB
    /// write; membership is checked so a non-member can't use this to probe
    /// a room's message ids.
    pub fn notify_copied(&self, caller_id: i64, message_id: i64) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let chat_room_id: i64 = conn
            .query_row("SELECT chat_room_id FROM messages WHERE id = ?1", [message_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::NotFound("message not found".into()))?;
        if !is_participant(&conn, chat_room_id, caller_id)? {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }
        drop(conn);
        self.events.publish(ChatEvent::MessageCopied { chat_room_id, message_id, user_id: caller_id });
        Ok(())
    }

    /// spec.md §11 forward — re-runs the create pipeline into another room.
    pub fn forward(&self, caller_id: i64, message_id: i64, to_room_id: i64) -> AppResult<MessageView> {
        let source_content: Option<String> = {
            let conn = self.db.conn.lock().unwrap();
            conn.query_row(
                "SELECT raw_content FROM messages WHERE id = ?1 AND deleted_for_all = 0",
                [message_id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("message not found".into()))?
        };
        self.create(
            caller_id,
            to_room_id,
            SendMessageRequest {
                content: source_content,
                content_ciphertext: None,
                encrypted_keys: None,
                client_message_id: None,
                expire_seconds: None,
                attachments_inline: vec![],
                image_url: None,
                audio_url: None,
            },
        )
    }

    /// spec.md §3 ScheduledMessage — premium-only, write-only in this core.
    pub fn schedule(&self, caller_id: i64, chat_room_id: i64, content: String, scheduled_at: String) -> AppResult<i64> {
        let conn = self.db.conn.lock().unwrap();
        let plan: String = conn
            .query_row("SELECT plan FROM users WHERE id = ?1", [caller_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::Unauthorized("unknown sender".into()))?;
        if plan != "PREMIUM" {
            return Err(AppError::PaymentRequired("scheduled messages require a premium plan".into()));
        }
        if !is_participant(&conn, chat_room_id, caller_id)? {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO scheduled_messages (chat_room_id, sender_id, content, scheduled_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![chat_room_id, caller_id, content, scheduled_at, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn build_view(
        &self,
        conn: &Connection,
        message_id: i64,
        caller_id: i64,
        caller_lang: &str,
        caller_is_admin: bool,
    ) -> AppResult<MessageView> {
        build_message_view(
            conn,
            message_id,
            caller_id,
            caller_lang,
            caller_is_admin,
            self.cache,
            self.provider,
            self.signer,
            self.config.signed_url_ttl_secs,
        )
    }
}

fn insert_attachment(conn: &Connection, message_id: i64, att: &AttachmentInput) -> AppResult<()> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO attachments
            (message_id, kind, url, mime_type, width, height, duration_sec, caption, thumb_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            message_id,
            att.kind.as_str(),
            att.url,
            att.mime_type,
            att.width,
            att.height,
            att.duration_sec,
            att.caption,
            att.thumb_url,
            now,
        ],
    )?;
    Ok(())
}

struct EditGuardRow {
    chat_room_id: i64,
    sender_id: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    deleted_for_all: bool,
    has_other_reader: bool,
}

fn load_edit_guard(conn: &Connection, message_id: i64) -> AppResult<EditGuardRow> {
    let (chat_room_id, sender_id, created_at_str, deleted_for_all): (i64, i64, String, bool) = conn
        .query_row(
            "SELECT chat_room_id, sender_id, created_at, deleted_for_all FROM messages WHERE id = ?1",
            [message_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("message not found".into()))?;

    let has_other_reader: i64 = conn.query_row(
        "SELECT COUNT(*) FROM message_reads WHERE message_id = ?1 AND user_id != ?2",
        params![message_id, sender_id],
        |r| r.get(0),
    )?;

    Ok(EditGuardRow {
        chat_room_id,
        sender_id,
        created_at: created_at_str.parse().map_err(|_| AppError::Internal("bad timestamp".into()))?,
        deleted_for_all,
        has_other_reader: has_other_reader > 0,
    })
}

/// spec.md §3 ThreadClear + participant.archivedAt composition.
fn visibility_cutoff(conn: &Connection, chat_room_id: i64, caller_id: i64) -> AppResult<Option<String>> {
    let archived_at: Option<String> = conn
        .query_row(
            "SELECT archived_at FROM participants WHERE chat_room_id = ?1 AND user_id = ?2",
            params![chat_room_id, caller_id],
            |r| r.get(0),
        )
        .optional()?
        .flatten();
    let cleared_at: Option<String> = conn
        .query_row(
            "SELECT cleared_at FROM thread_clears WHERE chat_room_id = ?1 AND user_id = ?2",
            params![chat_room_id, caller_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok([archived_at, cleared_at].into_iter().flatten().max())
}

/// Builds the canonical read/socket shape (spec.md §4.5 step 5, §6.2) for
/// one message from the caller's point of view. Shared by every mutation
/// that needs to emit an upsert and by the list endpoint.
#[allow(clippy::too_many_arguments)]
pub fn build_message_view(
    conn: &Connection,
    message_id: i64,
    caller_id: i64,
    caller_lang: &str,
    caller_is_admin: bool,
    cache: &TranslationCache,
    provider: &dyn TranslationProvider,
    signer: &UrlSigner,
    signed_url_ttl_secs: i64,
) -> AppResult<MessageView> {
    let row: (i64, i64, String, Option<String>, Option<String>, Option<String>, bool, Option<String>, Option<i64>, Option<String>, Option<String>) =
        conn.query_row(
            "SELECT chat_room_id, sender_id, created_at, expires_at, edited_at, raw_content,
                    deleted_for_all, deleted_at, deleted_by_id, content_ciphertext, translations
             FROM messages WHERE id = ?1",
            [message_id],
            |r| {
                Ok((
                    r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?,
                    r.get(6)?, r.get(7)?, r.get(8)?, r.get(9)?, r.get(10)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("message not found".into()))?;
    let (chat_room_id, sender_id, created_at, expires_at, edited_at, raw_content, deleted_for_all, deleted_at, deleted_by_id, content_ciphertext, translations_json) = row;

    let reaction_summary = load_reaction_summary(conn, message_id)?;
    let my_reactions = load_my_reactions(conn, message_id, caller_id)?;
    let read_by = load_read_by(conn, message_id)?;

    if deleted_for_all {
        return Ok(MessageView {
            id: message_id,
            chat_room_id,
            sender_id,
            created_at,
            expires_at,
            edited_at: None,
            deleted_for_all: true,
            deleted_at,
            deleted_by_id,
            raw_content: None,
            content_ciphertext: None,
            attachments: vec![],
            encrypted_key_for_me: None,
            translated_for_me: None,
            reaction_summary,
            my_reactions,
            read_by,
        });
    }

    // Signed so a copied attachment URL only works for the account that
    // fetched this view, and only for `signed_url_ttl_secs` (spec.md §4.9).
    let now_unix = chrono::Utc::now().timestamp();
    let attachments = load_attachments(conn, message_id)?
        .into_iter()
        .map(|mut a| {
            a.url = sign_attachment_url(signer, &a.url, caller_id, signed_url_ttl_secs, now_unix);
            a
        })
        .collect();
    let encrypted_key_for_me: Option<String> = conn
        .query_row(
            "SELECT encrypted_key FROM message_keys WHERE message_id = ?1 AND user_id = ?2",
            params![message_id, caller_id],
            |r| r.get(0),
        )
        .optional()?;

    let translated_for_me = translations_json
        .as_deref()
        .and_then(|j| serde_json::from_str::<HashMap<String, String>>(j).ok())
        .and_then(|m| m.get(caller_lang).cloned())
        .or_else(|| {
            raw_content.as_ref().and_then(|text| {
                cache
                    .get(text, caller_lang)
                    .or_else(|| provider.translate(text, caller_lang).ok())
            })
        });

    // Omit rawContent when the message has ciphertext and the caller is
    // neither the sender nor an admin (spec.md §4.5 step 5).
    let show_raw = content_ciphertext.is_none() || caller_id == sender_id || caller_is_admin;

    Ok(MessageView {
        id: message_id,
        chat_room_id,
        sender_id,
        created_at,
        expires_at,
        edited_at,
        deleted_for_all: false,
        deleted_at: None,
        deleted_by_id: None,
        raw_content: if show_raw { raw_content } else { None },
        content_ciphertext,
        attachments,
        encrypted_key_for_me,
        translated_for_me,
        reaction_summary,
        my_reactions,
        read_by,
    })
}

fn load_reaction_summary(conn: &Connection, message_id: i64) -> AppResult<HashMap<String, i64>> {
    let mut stmt = conn.prepare(
        "SELECT emoji, COUNT(*) FROM message_reactions WHERE message_id = ?1 GROUP BY emoji",
    )?;
    let rows = stmt.query_map([message_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn load_my_reactions(conn: &Connection, message_id: i64, caller_id: i64) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT emoji FROM message_reactions WHERE message_id = ?1 AND user_id = ?2",
    )?;
    let rows = stmt.query_map(params![message_id, caller_id], |r| r.get(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn load_read_by(conn: &Connection, message_id: i64) -> AppResult<Vec<ReadByEntry>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username FROM message_reads r JOIN users u ON u.id = r.user_id
         WHERE r.message_id = ?1",
    )?;
    let rows = stmt.query_map([message_id], |row| {
        Ok(ReadByEntry { id: row.get(0)?, username: row.get(1)?, avatar_url: None })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn load_attachments(conn: &Connection, message_id: i64) -> AppResult<Vec<Attachment>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, url, mime_type, width, height, duration_sec, caption, thumb_url, created_at
         FROM attachments WHERE message_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([message_id], |row| {
        Ok(Attachment {
            id: row.get(0)?,
            message_id,
            kind: row.get::<_, String>(1)?.parse().unwrap_or(AttachmentKind::File),
            url: row.get(2)?,
            mime_type: row.get(3)?,
            width: row.get(4)?,
            height: row.get(5)?,
            duration_sec: row.get(6)?,
            caption: row.get(7)?,
            thumb_url: row.get(8)?,
            created_at: row.get(9)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}
