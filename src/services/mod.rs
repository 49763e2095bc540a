pub mod message_service;
pub mod retention;
pub mod room_service;
