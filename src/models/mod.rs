pub mod chats;
pub mod chunks;
pub mod jobs;
pub mod messages;
pub mod requests;
pub mod timelines;
