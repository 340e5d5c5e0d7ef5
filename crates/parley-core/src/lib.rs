//! # parley-core
//!
//! Core types and the session hub for the Parley chat relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - The table of live sessions and claimed names
//! - **Hub** - Per-connection protocol state machine and fan-out
//! - **Broker** - Contract of the durable queue plus a non-blocking publisher
//! - **Presence** - Optional hook notified of roster changes and messages
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│     Hub     │────▶│  Registry   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │       │
//!                        ▼       ▼
//!               ┌───────────┐ ┌───────────┐
//!               │ Publisher │ │ Presence  │
//!               └───────────┘ └───────────┘
//!                     │
//!                     ▼
//!               ┌───────────┐
//!               │  Broker   │
//!               └───────────┘
//! ```

pub mod broker;
pub mod hub;
pub mod message;
pub mod presence;
pub mod registry;
pub mod session;

pub use broker::{Broker, BrokerError, DisabledBroker, Publisher};
pub use hub::{FrameOutcome, Hub, HubConfig};
pub use message::ChatMessage;
pub use presence::PresenceHook;
pub use registry::{NameRejection, Registry, Removal, RosterEntry, SessionSnapshot};
pub use session::{ConnectionState, Session, SessionId};
