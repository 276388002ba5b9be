pub mod chats;
pub mod health;
pub mod indexing;
pub mod query;
pub mod timelines;
