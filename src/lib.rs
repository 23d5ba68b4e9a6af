// ABOUTME: Library root for the scopebot binary
// ABOUTME: Built-in commands, platform adapters, and the event loop on top of scopebot-core

pub mod commands;
pub mod handler;
pub mod platform;

// Re-export core modules used by the binary
pub use scopebot_core::{config, metrics, paths};
