//! Yapper - a chat client for hosted and local LLMs behind an OAuth2/OIDC login.
//!
//! This library exposes the core modules for testing and reuse.

pub mod app;
pub mod auth;
pub mod config;
pub mod http;
pub mod llm;
pub mod logging;
pub mod message;
pub mod session;
pub mod settings;
pub mod store;
