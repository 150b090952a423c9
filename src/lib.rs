/// Broadcast primitive: Backend/Connection traits, in-memory hub, PostgreSQL.
pub mod backend;
/// Process configuration loading.
pub mod config;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Relay: envelopes, Publisher, Subscriber, pull streams.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Broadcast backends.
pub use backend::{Backend, Connection, ListenEvent, MemoryBackend};
#[cfg(feature = "postgres")]
pub use backend::PostgresBackend;
/// config
pub use self::config::{BackendKind, Settings};
/// Logging setup.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Relay API.
pub use pubsub::{
    Envelope, EnvelopeStream, HandlerId, Publisher, PublisherConfig, PublisherStats, State,
    Subscriber, SubscriberConfig, SubscriberStats,
};
/// Error types.
pub use streamrelay_error::{
    EnvelopeError, ErrorExt, PublishError, StatusCode, SubscriberError, TransportError,
};
