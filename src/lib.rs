//! Remobot — a multi-tenant Telegram assistant for apartment renovation
//! projects.
//!
//! The engine runs one message-processing pipeline per tenant bot token,
//! drives multi-step conversations through a per-chat state machine,
//! tracks a 13-stage renovation pipeline with budgets and roles, and
//! answers questions about a project through hybrid retrieval (pgvector +
//! PostgreSQL full-text search) augmented generation.

pub mod ai;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod http;
pub mod logging;
pub mod scheduler;
pub mod services;
pub mod skills;
pub mod telegram;
