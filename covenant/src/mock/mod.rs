//! The mock provider a consumer test talks to.
//!
//! Each [`MockServer`] binds its own port and serves on a dedicated thread
//! with its own runtime, so tests running in parallel never share state.

mod config;
mod server;
mod state;

pub use config::MockServerConfig;
pub use server::MockServer;
