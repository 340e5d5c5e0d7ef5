//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat relay.
//!
//! Clients and the server exchange JSON objects over a WebSocket. Every
//! object carries a `type` tag that selects the frame variant.
//!
//! ## Frame Types
//!
//! - `setUsername` / `message` / `listUsers` - client requests
//! - `welcome` / `usernameAccepted` / `error` - direct replies
//! - `message` / `userJoined` / `userLeft` / `userList` - broadcasts
//!
//! The crate also defines [`BrokerEntry`], the record written to the durable
//! queue for every chat message.
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientFrame, ServerFrame};
//!
//! let frame = codec::decode(br#"{"type":"setUsername","username":"alice"}"#).unwrap();
//! assert_eq!(frame, ClientFrame::SetUsername { username: "alice".into() });
//!
//! let reply = codec::encode(&ServerFrame::username_accepted("alice")).unwrap();
//! assert!(reply.contains("usernameAccepted"));
//! ```

pub mod codec;
pub mod entry;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use entry::BrokerEntry;
pub use frames::{format_timestamp, ClientFrame, ServerFrame, UserSummary};
