//! Error types for the Ferrite pub/sub client.

/// Result type alias for pub/sub client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a subscription handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reply prefix the server uses when a consumer group already exists.
const BUSYGROUP_PREFIX: &str = "BUSYGROUP";

/// Errors that can occur when publishing to or consuming from a topic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred during communication.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The server returned a RESP error response.
    #[error("server error: {0}")]
    Server(String),

    /// The RESP protocol data was malformed or unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The response type did not match what was expected.
    #[error("unexpected response type: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// The expected type description.
        expected: &'static str,
        /// The actual type description.
        actual: String,
    },

    /// The connection to the server was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A timeout occurred waiting for a connection or response.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// An invalid argument was provided to a command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The client configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// A payload could not be serialized for publishing.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The subscription handler returned an error.
    #[error("handler error: {0}")]
    Handler(BoxError),
}

impl Error {
    /// Returns `true` if this is the server's "consumer group already exists" reply.
    pub fn is_busy_group(&self) -> bool {
        matches!(self, Error::Server(msg) if msg.starts_with(BUSYGROUP_PREFIX))
    }
}
