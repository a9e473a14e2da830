pub mod chat;
pub mod commands;
pub mod config;
pub mod discord;
pub mod engine;
pub mod moderation;
pub mod personas;
pub mod sanitizer;
pub mod trigger;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
