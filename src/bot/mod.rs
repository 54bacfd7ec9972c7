/// Dispatcher schema, admin commands and forwarding endpoints
pub mod handlers;
