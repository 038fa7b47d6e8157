//! Core of the channel relay bot.
//!
//! This crate is framework-agnostic. The chat platform lives behind the ports
//! in [`messaging::port`], implemented by adapter crates (Telegram today).

pub mod annotate;
pub mod audit;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod filter;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod relay;
pub mod router;
pub mod security;
pub mod supervisor;

pub use errors::{Error, Result};
