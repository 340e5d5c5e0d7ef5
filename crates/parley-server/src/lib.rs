//! # parley-server
//!
//! HTTP and WebSocket front end of the Parley chat relay.
//!
//! - `/ws` - the chat protocol, one session per connection
//! - `/health` - liveness probe
//! - `/api/...` - read-only users and message history

pub mod api;
pub mod catalog;
pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{router, run_server, AppState};
