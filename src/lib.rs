//! M365 Assistant - plans your day from your Microsoft 365 mailbox and calendar
//!
//! This library provides device-code sign-in with a persistent token cache,
//! a Microsoft Graph client, mailbox and calendar tools, and a bounded
//! tool-calling agent followed by a schedule planner.

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
