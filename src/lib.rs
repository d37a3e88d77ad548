//! askliam is a terminal chat client for a streaming text/image generation
//! service.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the wire payloads: generation requests, streamed
//!   chunks, error bodies and server metrics.
//! - [`core`] owns the conversation: message history, inference settings,
//!   attachments, the session id, and the engine that drives one streamed
//!   turn at a time.
//! - [`cli`] parses arguments and runs the interactive chat and one-shot
//!   subcommands.
//! - [`utils`] holds clipboard access, transcript logging and URL helpers.
//!
//! The binary (`src/main.rs`) only calls [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
