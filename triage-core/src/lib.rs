//! Triage Core
//!
//! Core types shared across the triage controller and the bot client.
//!
//! This crate contains:
//! - Domain types: recipes, incident envelopes, execution results
//! - DTOs: payloads exchanged with the chat-bot

pub mod domain;
pub mod dto;
