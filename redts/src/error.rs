//! Error types for the redts remote-storage adapter.

use thiserror::Error;

/// The main error type for all redts operations.
///
/// Each variant wraps the error enum of one area of the adapter: the write
/// path, configuration, the read path, wire decoding, connection pooling and
/// the background sender.
#[derive(Error, Debug)]
pub enum RedtsError {
    /// Error on the write path (appender).
    #[error("append error: {0}")]
    Append(#[from] AppendError),

    /// Error in the connection URL or storage options.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error building a range query.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error decoding a reply from the store.
    #[error("reply error: {0}")]
    Reply(#[from] ReplyError),

    /// Error establishing or using a connection pool.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Error executing a pipelined batch.
    #[error("send error: {0}")]
    Send(#[from] SendError),
}

impl RedtsError {
    /// Returns `true` if the error came from the network layer rather than
    /// from the content of a request or reply. Timeouts are I/O errors.
    pub fn is_io(&self) -> bool {
        matches!(self, RedtsError::Reply(ReplyError::Io(_)))
    }

    /// Returns `true` if the I/O error says the peer had already closed the
    /// connection, as opposed to a timeout or a local failure.
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            RedtsError::Reply(ReplyError::Io(e)) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

impl From<std::io::Error> for RedtsError {
    fn from(e: std::io::Error) -> Self {
        RedtsError::Reply(ReplyError::Io(e))
    }
}

/// Errors that can occur while appending samples.
#[derive(Error, Debug)]
pub enum AppendError {
    /// The label set cannot be turned into a series key.
    #[error("invalid label set {labels:?}: {reason}")]
    InvalidLabelSet {
        /// The offending labels as name/value pairs.
        labels: Vec<(String, String)>,
        /// Why the label set was rejected.
        reason: String,
    },

    /// A fast-path append referenced a series this storage has never seen.
    #[error("unknown series reference {reference:#018x}")]
    UnknownReference {
        /// The reference that was not found in the cache.
        reference: u64,
    },
}

/// Errors that can occur while parsing the connection URL.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The connection URL could not be parsed.
    #[error("invalid connection url '{url}': {source}")]
    InvalidUrl {
        /// The URL as configured.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The URL scheme selects no known addressing mode.
    #[error("unsupported scheme '{scheme}' (expected redis or sentinel)")]
    UnsupportedScheme {
        /// The scheme found in the URL.
        scheme: String,
    },

    /// The URL has no host to connect to.
    #[error("connection url '{url}' has no host")]
    MissingHost {
        /// The URL as configured.
        url: String,
    },

    /// A sentinel URL did not name the monitored group.
    #[error("sentinel url '{url}' must name a group, e.g. sentinel://host:26379/mymaster")]
    MissingGroup {
        /// The URL as configured.
        url: String,
    },

    /// A query-string option had a value that could not be parsed.
    #[error("invalid value '{value}' for option '{name}'")]
    InvalidOption {
        /// The option name.
        name: String,
        /// The raw value.
        value: String,
    },
}

/// Errors that can occur while building a range query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The store can only filter on label equality and inequality.
    #[error("unsupported matcher {matcher}: only = and != are supported")]
    UnsupportedMatcher {
        /// The rejected matcher, formatted as `name<op>"value"`.
        matcher: String,
    },
}

/// Errors that can occur while reading a reply off the wire.
#[derive(Error, Debug)]
pub enum ReplyError {
    /// The reply did not have the expected shape.
    #[error("malformed reply: {reason}")]
    Malformed {
        /// Description of the mismatch.
        reason: String,
    },

    /// The store answered with an error reply.
    #[error("server error: {message}")]
    Server {
        /// The error message sent by the store.
        message: String,
    },

    /// The connection failed while reading or writing.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplyError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ReplyError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while establishing or using a connection pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A pool could not be initialized.
    #[error("failed to initialize {pool} pool: {source}")]
    InitFailure {
        /// Which pool failed ("write" or "read").
        pool: &'static str,
        /// The error raised while dialing.
        #[source]
        source: Box<RedtsError>,
    },

    /// A TCP connection could not be established.
    #[error("failed to connect to '{addr}': {source}")]
    Connect {
        /// The address that was dialed.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The coordinator could not tell us the current primary.
    #[error("failed to discover primary for group '{group}' via '{coordinator}': {reason}")]
    Discovery {
        /// The coordinator address.
        coordinator: String,
        /// The monitored group name.
        group: String,
        /// Description of the failure.
        reason: String,
    },

    /// The storage has been closed.
    #[error("storage is closed")]
    Closed,
}

/// Errors that can occur while executing a pipelined batch.
///
/// These never reach a writer: the sender logs them and drops the batch.
#[derive(Error, Debug)]
pub enum SendError {
    /// The pipeline could not be executed.
    #[error("pipeline of {commands} command(s) failed: {source}")]
    Failure {
        /// Number of commands in the batch.
        commands: usize,
        /// The underlying error.
        #[source]
        source: Box<RedtsError>,
    },

    /// The sender thread could not be started.
    #[error("failed to spawn sender thread: {source}")]
    Spawn {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Type alias for `Result<T, RedtsError>`.
pub type Result<T> = std::result::Result<T, RedtsError>;
