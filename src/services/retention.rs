//! Retention & TTL worker (spec.md §4.4). Runs as its own background task
//! with its own SQLite connection, the same way the teacher's
//! `spawn_retention_task` avoids contending on the request-serving
//! `Mutex<Connection>` — print-based status logging included.

use rusqlite::{params, Connection};
use tokio::sync::broadcast;

use crate::events::ChatEvent;
use crate::signing::UrlSigner;
use crate::translation::{NoopTranslationProvider, TranslationCache};

pub struct RetentionSettings {
    pub free_retention_days: i64,
    pub premium_retention_days: Option<i64>,
    pub batch: i64,
    pub interval_ms: u64,
    pub url_signing_secret: String,
    pub signed_url_ttl_secs: i64,
}

pub fn spawn(db_path: String, sender: broadcast::Sender<ChatEvent>, settings: RetentionSettings) {
    tokio::spawn(async move {
        let conn = match Connection::open(&db_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("⚠️ retention worker failed to open database: {e}");
                return;
            }
        };
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;").ok();

        let cache = TranslationCache::new();
        let provider = NoopTranslationProvider;
        let signer = UrlSigner::new(settings.url_signing_secret.clone());

        tokio::time::sleep(std::time::Duration::from_millis(settings.interval_ms)).await;
        loop {
            let expired = expire_pass(&conn, &sender, &cache, &provider, &signer, settings.signed_url_ttl_secs, settings.batch);
            if expired > 0 {
                println!("🧹 retention: tombstoned {expired} expired message(s)");
            }
            let pruned = prune_pass(&conn, settings.free_retention_days, settings.premium_retention_days);
            if pruned > 0 {
                println!("🧹 retention: pruned {pruned} message(s) past plan retention");
            }
            tokio::time::sleep(std::time::Duration::from_millis(settings.interval_ms)).await;
        }
    });
}

/// spec.md §4.4 expire worker: claim up to `batch` candidates, tombstone
/// them atomically, and re-emit an upsert per row.
#[allow(clippy::too_many_arguments)]
fn expire_pass(
    conn: &Connection,
    sender: &broadcast::Sender<ChatEvent>,
    cache: &TranslationCache,
    provider: &NoopTranslationProvider,
    signer: &UrlSigner,
    signed_url_ttl_secs: i64,
    batch: i64,
) -> usize {
    let now = chrono::Utc::now().to_rfc3339();

    let ids: Vec<i64> = {
        let mut stmt = match conn.prepare(
            "SELECT id FROM messages WHERE expires_at IS NOT NULL AND expires_at <= ?1
             AND deleted_for_all = 0 ORDER BY id LIMIT ?2",
        ) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("⚠️ retention: failed to select candidates: {e}");
                return 0;
            }
        };
        match stmt.query_map(params![now, batch], |r| r.get(0)) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(e) => {
                eprintln!("⚠️ retention: failed to read candidates: {e}");
                return 0;
            }
        }
    };
    if ids.is_empty() {
        return 0;
    }

    for id in &ids {
        let result = conn.execute(
            "UPDATE messages SET deleted_for_all = 1, deleted_at = ?1, deleted_by_id = NULL,
                raw_content = NULL, content_ciphertext = NULL, translations = NULL
             WHERE id = ?2",
            params![now, id],
        );
        if let Err(e) = result {
            eprintln!("⚠️ retention: failed to tombstone message {id}: {e}");
            continue;
        }
        crate::db::delete_fts(conn, *id);

        match crate::services::message_service::build_message_view(
            conn, *id, 0, "en", true, cache, provider, signer, signed_url_ttl_secs,
        ) {
            Ok(view) => {
                let _ = sender.send(ChatEvent::MessageUpsert { chat_room_id: view.chat_room_id, view });
            }
            Err(e) => eprintln!("⚠️ retention: failed to rebuild view for message {id}: {e:?}"),
        }
    }
    ids.len()
}

/// spec.md §4.4 plan prune: FREE retains `free_retention_days`; PREMIUM is
/// unlimited unless `premium_retention_days` is configured.
fn prune_pass(conn: &Connection, free_retention_days: i64, premium_retention_days: Option<i64>) -> usize {
    let mut total = 0;

    let free_cutoff = (chrono::Utc::now() - chrono::Duration::days(free_retention_days)).to_rfc3339();
    total += conn
        .execute(
            "DELETE FROM messages WHERE created_at < ?1
             AND sender_id IN (SELECT id FROM users WHERE plan = 'FREE')",
            params![free_cutoff],
        )
        .unwrap_or(0);

    if let Some(days) = premium_retention_days {
        let premium_cutoff = (chrono::Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        total += conn
            .execute(
                "DELETE FROM messages WHERE created_at < ?1
                 AND sender_id IN (SELECT id FROM users WHERE plan = 'PREMIUM')",
                params![premium_cutoff],
            )
            .unwrap_or(0);
    }

    total
}
