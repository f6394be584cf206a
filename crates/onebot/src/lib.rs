//! Forwarding collaborator: a supervised WebSocket link to the OneBot
//! consumer with heartbeat and unbounded reconnect.

pub mod client;
pub mod error;

pub use {
    client::{ClientConfig, LinkState, TargetClient, TargetHandle},
    error::ForwardError,
};
