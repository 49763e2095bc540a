//! Data model (spec.md §3) plus the request/response DTOs the HTTP and
//! socket surfaces exchange. Enums are stored as TEXT columns and round-trip
//! through `to_str`/`from_str`, the same way the teacher stores `driver`,
//! `content_type`, and `room_type` as plain strings rather than reaching for
//! a derive-based SQL enum crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $s:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(format!("invalid {}: {other}", stringify!($name))),
                }
            }
        }
    };
}

string_enum!(UserRole { User => "USER", Admin => "ADMIN" });
string_enum!(Plan { Free => "FREE", Premium => "PREMIUM" });
string_enum!(ParticipantRole {
    Owner => "OWNER",
    Admin => "ADMIN",
    Moderator => "MODERATOR",
    Member => "MEMBER",
});
string_enum!(AutoTranslateMode { Off => "off", Always => "always", Tagged => "tagged" });
string_enum!(AttachmentKind { Image => "IMAGE", Video => "VIDEO", Audio => "AUDIO", File => "FILE" });
string_enum!(StorageDriver { Local => "local", S3 => "s3" });

impl ParticipantRole {
    /// Rank used for "only a higher-ranked actor may change this role" checks (spec.md §4.2).
    pub fn rank(&self) -> u8 {
        match self {
            ParticipantRole::Owner => 3,
            ParticipantRole::Admin => 2,
            ParticipantRole::Moderator => 1,
            ParticipantRole::Member => 0,
        }
    }
}

// --- User ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub preferred_language: String,
    pub allow_explicit_content: bool,
    pub strict_e2ee: bool,
    pub show_read_receipts: bool,
    pub auto_delete_seconds: Option<i64>,
    pub two_factor_enabled: bool,
    #[serde(skip_serializing)]
    pub totp_secret_enc: Option<String>,
    pub created_at: String,
}

/// What a sender resolution needs (spec.md §4.1 step 1) — cheaper than a full `User`.
#[derive(Debug, Clone)]
pub struct SenderProfile {
    pub id: i64,
    pub preferred_language: String,
    pub allow_explicit_content: bool,
    pub auto_delete_seconds: Option<i64>,
    pub plan: Plan,
    pub strict_e2ee: bool,
}

/// A participant snapshot for content-policy and translation fan-out (spec.md §4.1 step 4).
#[derive(Debug, Clone)]
pub struct RecipientProfile {
    pub user_id: i64,
    pub preferred_language: String,
    pub allow_explicit_content: bool,
    pub public_key: Option<String>,
}

// --- ChatRoom ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    pub auto_translate_mode: AutoTranslateMode,
    pub created_at: String,
}

// --- Participant ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub chat_room_id: i64,
    pub user_id: i64,
    pub role: ParticipantRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
}

// --- Message ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_room_id: i64,
    pub sender_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_ciphertext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_from: Option<String>,
    pub is_explicit: bool,
    pub is_auto_reply: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    pub deleted_for_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by_id: Option<i64>,
}

impl Message {
    pub fn has_body(&self) -> bool {
        self.raw_content.as_deref().is_some_and(|s| !s.is_empty())
            || self.content_ciphertext.as_deref().is_some_and(|s| !s.is_empty())
    }
}

// --- Attachment ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub message_id: i64,
    pub kind: AttachmentKind,
    pub url: String,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentInput {
    pub kind: AttachmentKind,
    pub url: String,
    pub mime_type: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub duration_sec: Option<i64>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub thumb_url: Option<String>,
}

// --- MessageReaction ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionOp {
    #[serde(rename = "added")]
    Added,
    #[serde(rename = "removed")]
    Removed,
    #[serde(rename = "noop")]
    Noop,
}

// --- MessageRead ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadByEntry {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

// --- ScheduledMessage ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: i64,
    pub chat_room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub scheduled_at: String,
}

// --- Invite code ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    pub chat_room_id: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

// --- Upload ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub owner_id: i64,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub driver: StorageDriver,
    pub created_at: String,
}

// =====================================================================
// The canonical read/socket shape (spec.md §4.5 step 5, §6.2)
// =====================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub chat_room_id: i64,
    pub sender_id: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    pub deleted_for_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_ciphertext: Option<String>,
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_key_for_me: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_for_me: Option<String>,
    pub reaction_summary: HashMap<String, i64>,
    pub my_reactions: Vec<String>,
    pub read_by: Vec<ReadByEntry>,
}

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_ciphertext: Option<String>,
    #[serde(default)]
    pub encrypted_keys: Option<HashMap<String, String>>,
    #[serde(default)]
    pub client_message_id: Option<String>,
    #[serde(default)]
    pub expire_seconds: Option<i64>,
    #[serde(default)]
    pub attachments_inline: Vec<AttachmentInput>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub new_content: String,
}

#[derive(Debug, Deserialize)]
pub struct AddReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadBulkRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleMessageRequest {
    pub content: String,
    pub scheduled_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ForwardMessageRequest {
    pub to_room_id: i64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub auto_translate_mode: Option<AutoTranslateMode>,
}

#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: i64,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: ParticipantRole,
}

#[derive(Debug, Deserialize)]
pub struct JoinInviteRequest {
    pub code: String,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct MessagesPage {
    pub items: Vec<MessageView>,
    pub next_cursor: Option<i64>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct InviteCodeResponse {
    pub code: String,
}

// --- Auth DTOs ---

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorLoginRequest {
    pub mfa_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}
