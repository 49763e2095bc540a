//! The in-process socket bus (spec.md §4.3). One `broadcast::Sender` fans out
//! every room mutation to all live SSE subscribers, the same pattern the
//! teacher uses for its `ChatEvent`/`EventBus` pair — only the event variants
//! change shape.

use crate::models::{ReactionOp, MessageView};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Canonical event: a message was created, edited, reacted to, had its
    /// read state change, or was tombstoned. Clients always re-render from
    /// the full view rather than patching partial state (spec.md §4.3, §9).
    MessageUpsert { chat_room_id: i64, view: MessageView },
    /// Emitted alongside `MessageUpsert` when `legacy_events` is enabled
    /// (spec.md §11), for clients still on the granular event contract.
    LegacyMessageEdited { chat_room_id: i64, view: MessageView },
    LegacyMessageDeleted { chat_room_id: i64, message_id: i64 },
    /// Auxiliary event (spec.md §6.2) carried alongside the upsert that
    /// already reflects the new `reactionSummary` — kept for clients that
    /// still listen for the granular `reaction_updated` wire event.
    ReactionUpdated { chat_room_id: i64, message_id: i64, emoji: String, op: ReactionOp, user_id: i64, count: i64 },
    /// Auxiliary event (spec.md §6.2) carried alongside the upsert that
    /// already reflects the new `readBy` — kept for the granular
    /// `message_read` wire event.
    MessageRead { chat_room_id: i64, message_id: i64, reader_id: i64 },
    /// spec.md §4.3 `message_copied` — a client-originated copy notice,
    /// relayed back to the room. Scope resolved in DESIGN.md: broadcast to
    /// the room and left for clients to filter by recipient, the same scope
    /// the legacy events already use.
    MessageCopied { chat_room_id: i64, message_id: i64, user_id: i64 },
    Typing { chat_room_id: i64, user_id: i64, is_typing: bool },
    RoomUpdated { chat_room_id: i64 },
}

impl ChatEvent {
    pub fn chat_room_id(&self) -> i64 {
        match self {
            ChatEvent::MessageUpsert { chat_room_id, .. }
            | ChatEvent::LegacyMessageEdited { chat_room_id, .. }
            | ChatEvent::LegacyMessageDeleted { chat_room_id, .. }
            | ChatEvent::ReactionUpdated { chat_room_id, .. }
            | ChatEvent::MessageRead { chat_room_id, .. }
            | ChatEvent::MessageCopied { chat_room_id, .. }
            | ChatEvent::Typing { chat_room_id, .. }
            | ChatEvent::RoomUpdated { chat_room_id } => *chat_room_id,
        }
    }
}

pub struct EventBus {
    pub sender: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    pub fn publish(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}
