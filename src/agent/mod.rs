//! The agent: wires the transport to request dispatch

pub mod lifecycle;

pub use lifecycle::{LifecycleError, MinecraftAgent, MESSAGE_CHANNEL_CAPACITY};
