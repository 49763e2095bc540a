//! Room/participant state machine (spec.md §4.2).

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::events::{ChatEvent, EventBus};
use crate::models::*;

pub struct RoomService<'a> {
    pub db: &'a Db,
    pub events: &'a EventBus,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn participant_role(conn: &Connection, chat_room_id: i64, user_id: i64) -> AppResult<Option<ParticipantRole>> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM participants WHERE chat_room_id = ?1 AND user_id = ?2",
            params![chat_room_id, user_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(role.and_then(|r| r.parse().ok()))
}

fn is_global_admin(conn: &Connection, user_id: i64) -> AppResult<bool> {
    let role: Option<String> = conn
        .query_row("SELECT role FROM users WHERE id = ?1", [user_id], |r| r.get(0))
        .optional()?;
    Ok(role.as_deref() == Some("ADMIN"))
}

impl<'a> RoomService<'a> {
    pub fn create(&self, owner_id: i64, req: CreateRoomRequest) -> AppResult<ChatRoom> {
        let conn = self.db.conn.lock().unwrap();
        let now = now_rfc3339();
        let mode = req.auto_translate_mode.unwrap_or(AutoTranslateMode::Off);
        conn.execute(
            "INSERT INTO chat_rooms (name, is_group, owner_id, auto_translate_mode, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![req.name, req.is_group, owner_id, mode.as_str(), now],
        )?;
        let room_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO participants (chat_room_id, user_id, role, joined_at) VALUES (?1, ?2, 'OWNER', ?3)",
            params![room_id, owner_id, now],
        )?;
        Ok(ChatRoom {
            id: room_id,
            name: req.name,
            is_group: req.is_group,
            owner_id: Some(owner_id),
            auto_translate_mode: mode,
            created_at: now,
        })
    }

    pub fn add_participant(&self, actor_id: i64, chat_room_id: i64, req: AddParticipantRequest) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let actor_role = participant_role(&conn, chat_room_id, actor_id)?;
        let is_admin = is_global_admin(&conn, actor_id)?;
        if !is_admin && actor_role != Some(ParticipantRole::Owner) {
            return Err(AppError::Forbidden("only the owner or a global admin may add participants".into()));
        }
        let role = req.role.unwrap_or(ParticipantRole::Member);
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO participants (chat_room_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(chat_room_id, user_id) DO UPDATE SET archived_at = NULL",
            params![chat_room_id, req.user_id, role.as_str(), now],
        )?;
        self.events.publish(ChatEvent::RoomUpdated { chat_room_id });
        Ok(())
    }

    /// spec.md §4.2: only OWNER grants ADMIN; OWNER|ADMIN may grant MODERATOR|MEMBER;
    /// owner's own role is immutable; a room must keep at least one OWNER.
    pub fn change_role(&self, actor_id: i64, chat_room_id: i64, target_user_id: i64, new_role: ParticipantRole) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let actor_role = participant_role(&conn, chat_room_id, actor_id)?
            .ok_or_else(|| AppError::Forbidden("not a member of this room".into()))?;
        let target_role = participant_role(&conn, chat_room_id, target_user_id)?
            .ok_or_else(|| AppError::NotFound("target is not a participant".into()))?;

        if target_role == ParticipantRole::Owner {
            return Err(AppError::Forbidden("the owner's role cannot be changed".into()));
        }
        if new_role == ParticipantRole::Owner {
            return Err(AppError::Forbidden("ownership transfer is not supported here".into()));
        }
        if new_role == ParticipantRole::Admin && actor_role != ParticipantRole::Owner {
            return Err(AppError::Forbidden("only the owner may grant admin".into()));
        }
        if actor_role.rank() < ParticipantRole::Admin.rank() {
            return Err(AppError::Forbidden("insufficient role to change roles".into()));
        }

        conn.execute(
            "UPDATE participants SET role = ?1 WHERE chat_room_id = ?2 AND user_id = ?3",
            params![new_role.as_str(), chat_room_id, target_user_id],
        )?;
        self.events.publish(ChatEvent::RoomUpdated { chat_room_id });
        Ok(())
    }

    pub fn promote(&self, actor_id: i64, chat_room_id: i64, target_user_id: i64) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let actor_role = participant_role(&conn, chat_room_id, actor_id)?;
        if actor_role != Some(ParticipantRole::Owner) {
            return Err(AppError::Forbidden("only the owner may promote".into()));
        }
        drop(conn);
        self.change_role(actor_id, chat_room_id, target_user_id, ParticipantRole::Admin)
    }

    pub fn kick(&self, actor_id: i64, chat_room_id: i64, target_user_id: i64) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let actor_role = participant_role(&conn, chat_room_id, actor_id)?;
        let is_admin = is_global_admin(&conn, actor_id)?;
        if !is_admin && actor_role != Some(ParticipantRole::Owner) {
            return Err(AppError::Forbidden("only the owner or a global admin may remove participants".into()));
        }
        let target_role = participant_role(&conn, chat_room_id, target_user_id)?;
        if target_role == Some(ParticipantRole::Owner) {
            return Err(AppError::Forbidden("the owner cannot be removed".into()));
        }
        conn.execute(
            "DELETE FROM participants WHERE chat_room_id = ?1 AND user_id = ?2",
            params![chat_room_id, target_user_id],
        )?;
        self.events.publish(ChatEvent::RoomUpdated { chat_room_id });
        Ok(())
    }

    pub fn leave(&self, actor_id: i64, chat_room_id: i64) -> AppResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let role = participant_role(&conn, chat_room_id, actor_id)?
            .ok_or_else(|| AppError::Forbidden("not a member of this room".into()))?;
        if role == ParticipantRole::Owner {
            return Err(AppError::Forbidden("the owner must transfer ownership before leaving".into()));
        }
        conn.execute(
            "DELETE FROM participants WHERE chat_room_id = ?1 AND user_id = ?2",
            params![chat_room_id, actor_id],
        )?;
        self.events.publish(ChatEvent::RoomUpdated { chat_room_id });
        Ok(())
    }

    pub fn create_invite(&self, actor_id: i64, chat_room_id: i64, ttl_secs: Option<i64>) -> AppResult<String> {
        let conn = self.db.conn.lock().unwrap();
        let actor_role = participant_role(&conn, chat_room_id, actor_id)?;
        let is_admin = is_global_admin(&conn, actor_id)?;
        if !is_admin && actor_role != Some(ParticipantRole::Owner) {
            return Err(AppError::Forbidden("only the owner or a global admin may create invites".into()));
        }
        let code = crate::db::generate_invite_code();
        let now = now_rfc3339();
        let expires_at = ttl_secs.map(|s| (chrono::Utc::now() + chrono::Duration::seconds(s)).to_rfc3339());
        conn.execute(
            "INSERT INTO invite_codes (code, chat_room_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![code, chat_room_id, now, expires_at],
        )?;
        Ok(code)
    }

    pub fn join_by_invite(&self, actor_id: i64, code: &str) -> AppResult<i64> {
        let conn = self.db.conn.lock().unwrap();
        let (chat_room_id, expires_at): (i64, Option<String>) = conn
            .query_row(
                "SELECT chat_room_id, expires_at FROM invite_codes WHERE code = ?1",
                [code],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("invite code not found".into()))?;
        if let Some(expires_at) = expires_at {
            if expires_at < now_rfc3339() {
                return Err(AppError::NotFound("invite code has expired".into()));
            }
        }
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO participants (chat_room_id, user_id, role, joined_at) VALUES (?1, ?2, 'MEMBER', ?3)
             ON CONFLICT(chat_room_id, user_id) DO UPDATE SET archived_at = NULL",
            params![chat_room_id, actor_id, now],
        )?;
        self.events.publish(ChatEvent::RoomUpdated { chat_room_id });
        Ok(chat_room_id)
    }

    pub fn list_participants(&self, caller_id: i64, chat_room_id: i64) -> AppResult<Vec<Participant>> {
        let conn = self.db.conn.lock().unwrap();
        let is_admin = is_global_admin(&conn, caller_id)?;
        if !is_admin && participant_role(&conn, chat_room_id, caller_id)?.is_none() {
            return Err(AppError::Forbidden("not a member of this room".into()));
        }
        let mut stmt = conn.prepare(
            "SELECT chat_room_id, user_id, role, archived_at FROM participants WHERE chat_room_id = ?1",
        )?;
        let rows = stmt.query_map([chat_room_id], |row| {
            Ok(Participant {
                chat_room_id: row.get(0)?,
                user_id: row.get(1)?,
                role: row.get::<_, String>(2)?.parse().unwrap_or(ParticipantRole::Member),
                archived_at: row.get(3)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}
