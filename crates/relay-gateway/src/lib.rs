//! relay-gateway - HTTP front door of llm-relay
//!
//! Serves the chat endpoint backed by the failover router, the scheduled
//! check trigger, the seed operation and two read-only admin views.

pub mod protocol;
pub mod server;

pub use server::{GatewayServer, GatewayState};
