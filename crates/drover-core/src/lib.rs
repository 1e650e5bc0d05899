//! drover-core: Core abstractions and configuration for drover
//!
//! This crate provides shared types, storage contracts, credential helpers,
//! and configuration structures used by the coordinator, agent, and CLI.

pub mod auth;
pub mod config;
pub mod error;
pub mod store;
pub mod time;
pub mod types;

pub use error::DroverError;
pub use types::{AgentRecord, AgentStatus, ClientId, CommandId, CommandRecord, CommandStatus};
