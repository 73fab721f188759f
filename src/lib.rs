// ABOUTME: Root library module for the chat gateway bot
// ABOUTME: Exposes configuration, logging setup, built-in commands, and the ChatClient wiring

pub mod builtin;
pub mod client;
pub mod config;
pub mod logging;

pub use client::ChatClient;
pub use config::Config;

// Re-export member crates for convenience
pub use chatwire_commands as commands;
pub use chatwire_core as gateway;
