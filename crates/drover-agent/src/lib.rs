//! drover-agent: agent daemon
//!
//! Registers with the coordinator, holds a persistent WebSocket session
//! through reconnects, heartbeats on a fixed interval, and executes
//! dispatched shell commands.

pub mod backoff;
pub mod register;
pub mod runner;
pub mod supervisor;

pub use supervisor::Supervisor;
