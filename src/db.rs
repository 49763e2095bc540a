use rusqlite::{params, Connection};
use std::sync::Mutex;

pub struct Db {
    pub conn: Mutex<Connection>,
}

/// Generate a single-use invite code: `inv_<32 hex chars>`.
pub fn generate_invite_code() -> String {
    format!("inv_{:032x}", uuid::Uuid::new_v4().as_u128())
}

/// Generate an opaque session token stored in the caller's private cookie.
pub fn generate_session_token() -> String {
    format!("sess_{:032x}", uuid::Uuid::new_v4().as_u128())
}

/// Generate a password-reset token. The raw value is handed to the user once;
/// only its hash is persisted (see `auth::passwords::hash_token`).
pub fn generate_reset_token() -> String {
    format!("rst_{:032x}", uuid::Uuid::new_v4().as_u128())
}

impl Db {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("Failed to set pragmas");
        let db = Db { conn: Mutex::new(conn) };
        db.migrate();
        db
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'USER',
                plan TEXT NOT NULL DEFAULT 'FREE',
                public_key TEXT,
                preferred_language TEXT NOT NULL DEFAULT 'en',
                allow_explicit_content INTEGER NOT NULL DEFAULT 0,
                strict_e2ee INTEGER NOT NULL DEFAULT 0,
                show_read_receipts INTEGER NOT NULL DEFAULT 1,
                auto_delete_seconds INTEGER,
                two_factor_enabled INTEGER NOT NULL DEFAULT 0,
                totp_secret_enc TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_rooms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                is_group INTEGER NOT NULL DEFAULT 0,
                owner_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                auto_translate_mode TEXT NOT NULL DEFAULT 'off',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS participants (
                chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role TEXT NOT NULL DEFAULT 'MEMBER',
                archived_at TEXT,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (chat_room_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_participants_user ON participants(user_id);

            CREATE TABLE IF NOT EXISTS thread_clears (
                chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                cleared_before_id INTEGER NOT NULL,
                cleared_at TEXT NOT NULL,
                PRIMARY KEY (chat_room_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                sender_id INTEGER NOT NULL REFERENCES users(id),
                client_message_id TEXT,
                raw_content TEXT,
                content_ciphertext TEXT,
                translations TEXT,
                translated_from TEXT,
                is_explicit INTEGER NOT NULL DEFAULT 0,
                is_auto_reply INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                edited_at TEXT,
                deleted_for_all INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                deleted_by_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_messages_room_id_desc ON messages(chat_room_id, id DESC);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_client_id
                ON messages(chat_room_id, sender_id, client_message_id)
                WHERE client_message_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_messages_expires_at ON messages(expires_at)
                WHERE expires_at IS NOT NULL AND deleted_for_all = 0;

            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                url TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                width INTEGER,
                height INTEGER,
                duration_sec INTEGER,
                caption TEXT,
                thumb_url TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_attachments_message ON attachments(message_id);

            CREATE TABLE IF NOT EXISTS message_keys (
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                encrypted_key TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_message_keys_user ON message_keys(user_id);

            CREATE TABLE IF NOT EXISTS message_reactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                emoji TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(message_id, user_id, emoji)
            );
            CREATE INDEX IF NOT EXISTS idx_reactions_message ON message_reactions(message_id);

            CREATE TABLE IF NOT EXISTS message_reads (
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                read_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_reads_user ON message_reads(user_id);

            CREATE TABLE IF NOT EXISTS message_deletions (
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                deleted_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS scheduled_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                sender_id INTEGER NOT NULL REFERENCES users(id),
                content TEXT NOT NULL,
                scheduled_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_due ON scheduled_messages(scheduled_at);

            CREATE TABLE IF NOT EXISTS invite_codes (
                code TEXT PRIMARY KEY,
                chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT
            );

            CREATE TABLE IF NOT EXISTS uploads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL REFERENCES users(id),
                key TEXT NOT NULL UNIQUE,
                sha256 TEXT,
                original_name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                driver TEXT NOT NULL DEFAULT 'local',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS password_reset_tokens (
                token_hash TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                used_at TEXT
            );
            ",
        )
        .expect("Failed to run migrations");

        // Idempotent ALTER TABLE additions for columns introduced after the
        // tables above first shipped, mirroring how the teacher evolves
        // `messages`/`rooms` without a migration framework.
        conn.execute_batch("ALTER TABLE users ADD COLUMN two_factor_enabled INTEGER NOT NULL DEFAULT 0;").ok();
        conn.execute_batch("ALTER TABLE messages ADD COLUMN is_auto_reply INTEGER NOT NULL DEFAULT 0;").ok();

        // FTS5 index over plaintext message bodies only. Ciphertext never
        // enters this table (spec.md §4.1 step 9, §12).
        conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
                message_id UNINDEXED,
                raw_content,
                tokenize='porter unicode61'
            );",
        )
        .expect("Failed to create FTS5 table");

        rebuild_fts_index(&conn);
    }
}

/// Rebuild the FTS5 index from all plaintext messages. Called on startup.
pub fn rebuild_fts_index(conn: &Connection) {
    conn.execute("DELETE FROM messages_fts", []).ok();
    conn.execute_batch(
        "INSERT INTO messages_fts (message_id, raw_content)
         SELECT id, raw_content FROM messages WHERE raw_content IS NOT NULL;",
    )
    .ok();
}

/// Insert or update a message in the FTS index (call after create/edit).
pub fn upsert_fts(conn: &Connection, message_id: i64) {
    conn.execute("DELETE FROM messages_fts WHERE message_id = ?1", params![message_id]).ok();
    conn.execute(
        "INSERT INTO messages_fts (message_id, raw_content)
         SELECT id, raw_content FROM messages WHERE id = ?1 AND raw_content IS NOT NULL",
        params![message_id],
    )
    .ok();
}

/// Remove a message from the FTS index (call after a delete-for-all tombstone).
pub fn delete_fts(conn: &Connection, message_id: i64) {
    conn.execute("DELETE FROM messages_fts WHERE message_id = ?1", params![message_id]).ok();
}
