//! Transport abstractions: what the relay needs from a chat platform, and nothing more.

pub mod port;
pub mod throttled;
pub mod types;
