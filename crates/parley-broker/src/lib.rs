//! # parley-broker
//!
//! Redis Streams backend for the Parley durable queue.
//!
//! - [`RedisStreamGateway`] implements [`parley_core::Broker`] and appends
//!   every chat message to the queue stream with `XADD`.
//! - [`StreamConsumer`] reads the stream through a consumer group, one entry
//!   at a time, for the archiver.
//!
//! Each stream entry carries two fields: [`PAYLOAD_FIELD`] holding the JSON
//! encoded [`parley_protocol::BrokerEntry`] and [`DELIVERY_FIELD`] set to
//! [`PERSISTENT`].

pub mod config;
pub mod consumer;
pub mod error;
pub mod gateway;

pub use config::BrokerConfig;
pub use consumer::{Delivery, StreamConsumer};
pub use error::ConsumerError;
pub use gateway::RedisStreamGateway;

/// Stream field holding the JSON encoded entry.
pub const PAYLOAD_FIELD: &str = "payload";

/// Stream field carrying the delivery mode.
pub const DELIVERY_FIELD: &str = "delivery";

/// Delivery mode written with every entry.
pub const PERSISTENT: &str = "persistent";

/// Create the consumer group on `queue`, creating the stream if needed.
///
/// An existing group is left untouched.
pub(crate) async fn ensure_group<C>(
    conn: &mut C,
    queue: &str,
    group: &str,
) -> redis::RedisResult<bool>
where
    C: redis::aio::ConnectionLike + Send,
{
    let result: redis::RedisResult<String> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(queue)
        .arg(group)
        .arg("0")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(false),
        Err(e) => Err(e),
    }
}
