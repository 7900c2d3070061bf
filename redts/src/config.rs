//! Storage configuration.
//!
//! The whole adapter is configured from one connection URL. Its scheme picks
//! the addressing mode and its query string carries the tuning options:
//!
//! ```text
//! redis://host[:port][?options]
//! sentinel://coordinator[:port]/<group>[?options]
//! ```
//!
//! | Option               | Default | Meaning                               |
//! |----------------------|---------|---------------------------------------|
//! | `pool_size`          | 10      | connections per pool                  |
//! | `queue_size`         | 100     | batches the submission queue can hold |
//! | `batch_size`         | 500     | initial capacity of each batch        |
//! | `connect_timeout_ms` | 5000    | TCP connect timeout                   |
//! | `io_timeout_ms`      | 10000   | read and write timeout per connection |

use std::time::Duration;

use url::Url;

use crate::appender::DEFAULT_BATCH_CAPACITY;
use crate::error::{ConfigError, Result};

/// Default port of a direct store connection.
pub const DEFAULT_PORT: u16 = 6379;

/// Default port of a failover coordinator.
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

/// Default number of connections per pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default submission queue bound, in batches.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read and write timeout of a connection.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// How connections find the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    /// Connect straight to `addr` (`host:port`).
    Direct {
        /// Store address.
        addr: String,
    },
    /// Ask the coordinator for the current primary of `group` before every
    /// new connection.
    Sentinel {
        /// Coordinator address (`host:port`).
        coordinator: String,
        /// Name of the monitored group.
        group: String,
    },
}

impl Addressing {
    /// Parses the addressing part of a connection URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedScheme`] for schemes other than
    /// `redis` and `sentinel`, and [`ConfigError::MissingHost`] /
    /// [`ConfigError::MissingGroup`] for incomplete URLs.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = || {
            url.host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| ConfigError::MissingHost {
                    url: url.to_string(),
                })
        };

        match url.scheme() {
            "redis" => Ok(Addressing::Direct {
                addr: join_host_port(host()?, url.port().unwrap_or(DEFAULT_PORT)),
            }),
            "sentinel" => {
                let group = url
                    .path_segments()
                    .and_then(|mut segments| segments.next())
                    .filter(|g| !g.is_empty())
                    .ok_or_else(|| ConfigError::MissingGroup {
                        url: url.to_string(),
                    })?;
                Ok(Addressing::Sentinel {
                    coordinator: join_host_port(
                        host()?,
                        url.port().unwrap_or(DEFAULT_SENTINEL_PORT),
                    ),
                    group: group.to_string(),
                })
            }
            other => Err(ConfigError::UnsupportedScheme {
                scheme: other.to_string(),
            }
            .into()),
        }
    }
}

/// Formats a dialable `host:port`, bracketing IPv6 literals.
pub(crate) fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Configuration for a [`Storage`](crate::storage::Storage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Where to connect.
    pub addressing: Addressing,
    /// Connections per pool (write and read pools each get this many).
    pub pool_size: usize,
    /// Maximum number of committed batches waiting for the sender.
    pub queue_capacity: usize,
    /// Initial capacity of each batch.
    pub batch_capacity: usize,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Read and write timeout of every connection. A stalled store fails
    /// the exchange with an I/O error instead of blocking forever.
    pub io_timeout: Duration,
}

impl StorageConfig {
    /// Creates a config with default tuning for the given addressing.
    pub fn new(addressing: Addressing) -> Self {
        Self {
            addressing,
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Parses a connection URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the URL does not parse, the
    /// errors of [`Addressing::from_url`], and [`ConfigError::InvalidOption`]
    /// if an option value is not a positive integer.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use redts::config::{Addressing, StorageConfig};
    ///
    /// let config = StorageConfig::from_url("sentinel://10.0.0.1/mymaster?pool_size=4")?;
    /// assert_eq!(
    ///     config.addressing,
    ///     Addressing::Sentinel {
    ///         coordinator: "10.0.0.1:26379".to_string(),
    ///         group: "mymaster".to_string(),
    ///     }
    /// );
    /// assert_eq!(config.pool_size, 4);
    /// # Ok::<(), redts::RedtsError>(())
    /// ```
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;

        let mut config = Self::new(Addressing::from_url(&url)?);

        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "pool_size" => config.pool_size = parse_positive(&name, &value)?,
                "queue_size" => config.queue_capacity = parse_positive(&name, &value)?,
                "batch_size" => config.batch_capacity = parse_positive(&name, &value)?,
                "connect_timeout_ms" => {
                    config.connect_timeout = Duration::from_millis(parse_positive(&name, &value)?);
                }
                "io_timeout_ms" => {
                    config.io_timeout = Duration::from_millis(parse_positive(&name, &value)?);
                }
                _ => tracing::warn!(option = %name, "ignoring unknown connection option"),
            }
        }

        Ok(config)
    }

    /// Sets the number of connections per pool. Zero is raised to one.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Sets the submission queue bound. Zero is raised to one, since a
    /// zero-capacity queue would shed every batch the sender is not already
    /// waiting for.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    /// Sets the initial batch capacity.
    #[must_use]
    pub fn with_batch_capacity(mut self, batch_capacity: usize) -> Self {
        self.batch_capacity = batch_capacity;
        self
    }

    /// Sets the TCP connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the read and write timeout of every connection.
    #[must_use]
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + Default + PartialOrd,
{
    value
        .parse::<T>()
        .ok()
        .filter(|v| *v > T::default())
        .ok_or_else(|| {
            ConfigError::InvalidOption {
                name: name.to_string(),
                value: value.to_string(),
            }
            .into()
        })
}
