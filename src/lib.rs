//! Telegram channel multiplexer: relays messages seen in configured source
//! chats to a list of registered destination chats, with inter-delivery
//! pacing, retry on API throttling, and an admin-gated command surface for
//! runtime reconfiguration.

/// Dispatcher wiring and update handlers
pub mod bot;
/// Durable configuration store
pub mod config;
/// The fan-out engine and its delivery boundary
pub mod forwarder;
/// Parsing helpers
pub mod utils;
