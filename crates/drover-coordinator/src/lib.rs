//! drover-coordinator: command-and-control daemon
//!
//! The coordinator accepts persistent WebSocket sessions from agents,
//! persists commands submitted by operators over HTTP, and routes results
//! back onto the command records as agents report them.

pub mod dispatch;
pub mod http;
pub mod monitor;
pub mod registry;
pub mod session;
pub mod state;

pub use state::CoordinatorState;
