//! Core types, config, and errors for Gemini Chat.

pub mod config;
pub mod error;
pub mod types;
