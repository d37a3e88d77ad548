pub mod attachments;
pub mod chat_stream;
pub mod config;
pub mod engine;
pub mod message;
pub mod request;
pub mod session;
pub mod settings;
pub mod transcript;
