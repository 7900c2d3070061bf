//! Connection pooling.
//!
//! The adapter talks to the store through the [`StoreClient`] trait: run a
//! batch of commands as a pipeline, or run one command and decode its reply
//! straight off the connection. [`Pool`] is the TCP implementation.
//!
//! # Pools
//!
//! A storage uses two pools built by [`create_pools`]:
//!
//! - the **write pool** pipelines: a batch is written in one go and its
//!   replies are read afterwards
//! - the **read pool** does not: every command is its own round trip
//!
//! # Addressing
//!
//! With [`Addressing::Sentinel`] the pool asks the coordinator for the
//! current primary before *every* new connection, so reconnects follow
//! failovers.
//!
//! # Broken connections
//!
//! An idle connection is checked before reuse. If the peer has hung up, the
//! pool drops it together with every other idle connection (they most likely
//! point at the same dead server) and dials a fresh one. A reused connection
//! that turns out to be disconnected while a request is being written is
//! retried once on a fresh connection. Once a request has been written, no
//! failure is retried: the store may already have applied it.
//!
//! Every connection carries a read and write timeout, so a stalled store
//! fails the exchange with an I/O error instead of blocking.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::{Addressing, StorageConfig, join_host_port};
use crate::error::{PoolError, RedtsError, ReplyError, Result};
use crate::resp::{Command, read_array_len, read_discard, read_string};

/// The interface the adapter needs from a pooled store client.
pub trait StoreClient: Send + Sync {
    /// Executes `commands` and reads every reply.
    ///
    /// # Errors
    ///
    /// Returns the first error reply, or the connection error that aborted
    /// the exchange.
    fn pipeline(&self, commands: &[Command]) -> Result<()>;

    /// Executes `command` and hands the reply stream to `decode`.
    ///
    /// # Errors
    ///
    /// Returns connection errors and whatever `decode` returns.
    fn query(
        &self,
        command: &Command,
        decode: &mut dyn FnMut(&mut dyn BufRead) -> Result<()>,
    ) -> Result<()>;
}

/// Tuning for one [`Pool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum number of open connections.
    pub size: usize,
    /// Whether `pipeline` sends all commands before reading replies.
    pub pipelined: bool,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Read and write timeout of every connection.
    pub io_timeout: Duration,
}

/// One TCP connection to the store.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn dial(addr: &str, connect_timeout: Duration, io_timeout: Duration) -> Result<Self> {
        let connect_err = |source| PoolError::Connect {
            addr: addr.to_string(),
            source,
        };

        let mut last_error = None;
        for sock in addr.to_socket_addrs().map_err(connect_err)? {
            match TcpStream::connect_timeout(&sock, connect_timeout) {
                Ok(stream) => {
                    return Self::from_stream(stream, io_timeout)
                        .map_err(|e| connect_err(e).into());
                }
                Err(e) => last_error = Some(e),
            }
        }

        let source = last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
        });
        Err(connect_err(source).into())
    }

    fn from_stream(stream: TcpStream, io_timeout: Duration) -> io::Result<Self> {
        // A zero duration is rejected by the socket calls and means "none".
        let timeout = Some(io_timeout).filter(|t| !t.is_zero());
        stream.set_nodelay(true)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer: BufWriter::new(writer),
        })
    }

    fn send(&mut self, commands: &[Command]) -> Result<()> {
        for cmd in commands {
            cmd.write_to(&mut self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Checks an idle connection without blocking: it is usable only if the
    /// peer has not hung up and no stray reply bytes are waiting on it.
    fn is_alive(&self) -> bool {
        if !self.reader.buffer().is_empty() {
            return false;
        }
        let stream = self.reader.get_ref();
        if stream.set_nonblocking(true).is_err() {
            return false;
        }
        let mut byte = [0u8; 1];
        let idle = matches!(
            stream.peek(&mut byte),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock
        );
        stream.set_nonblocking(false).is_ok() && idle
    }
}

struct PoolState {
    idle: Vec<Connection>,
    /// Idle plus checked-out connections.
    open: usize,
}

/// A bounded pool of blocking TCP connections.
pub struct Pool {
    name: &'static str,
    addressing: Addressing,
    options: PoolOptions,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl Pool {
    /// Opens a pool and dials `options.size` connections up front.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InitFailure`] if any connection (or, with
    /// sentinel addressing, any primary lookup) fails. Connections dialed
    /// before the failure are closed.
    pub fn open(name: &'static str, addressing: Addressing, options: PoolOptions) -> Result<Self> {
        let pool = Self {
            name,
            addressing,
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(options.size),
                open: 0,
            }),
            options,
            available: Condvar::new(),
        };

        for _ in 0..pool.options.size.max(1) {
            let conn = pool.dial().map_err(|e| PoolError::InitFailure {
                pool: name,
                source: Box::new(e),
            })?;
            let mut state = pool.lock();
            state.idle.push(conn);
            state.open += 1;
        }

        tracing::info!(
            pool = name,
            size = pool.options.size,
            pipelined = pool.options.pipelined,
            "connection pool ready"
        );
        Ok(pool)
    }

    /// The pool's name ("write" or "read").
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of open connections, idle or checked out.
    pub fn open_connections(&self) -> usize {
        self.lock().open
    }

    /// Number of idle connections.
    pub fn idle_connections(&self) -> usize {
        self.lock().idle.len()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves the current target address and connects to it.
    fn dial(&self) -> Result<Connection> {
        let addr = match &self.addressing {
            Addressing::Direct { addr } => addr.clone(),
            Addressing::Sentinel { coordinator, group } => {
                discover_primary(coordinator, group, self.options.connect_timeout)?
            }
        };
        tracing::debug!(pool = self.name, %addr, "dialing");
        Connection::dial(&addr, self.options.connect_timeout, self.options.io_timeout)
    }

    /// Takes an idle connection or dials a new one, waiting while the pool
    /// is at capacity. The flag tells whether the connection was reused.
    ///
    /// An idle connection whose peer has hung up is closed along with the
    /// rest of the idle set, and a fresh one is dialed instead.
    fn checkout(&self) -> Result<(Connection, bool)> {
        let mut state = self.lock();
        loop {
            if let Some(conn) = state.idle.pop() {
                if conn.is_alive() {
                    return Ok((conn, true));
                }
                let dropped = state.idle.len() + 1;
                state.idle.clear();
                state.open = state.open.saturating_sub(dropped);
                tracing::debug!(pool = self.name, dropped, "idle connection closed by peer");
                self.available.notify_all();
                continue;
            }
            if state.open < self.options.size.max(1) {
                state.open += 1;
                drop(state);
                return match self.dial() {
                    Ok(conn) => Ok((conn, false)),
                    Err(e) => {
                        self.discard();
                        Err(e)
                    }
                };
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn checkin(&self, conn: Connection) {
        self.lock().idle.push(conn);
        self.available.notify_one();
    }

    /// Forgets a checked-out connection that will not come back.
    fn discard(&self) {
        let mut state = self.lock();
        state.open = state.open.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    fn drop_idle(&self) {
        let mut state = self.lock();
        let dropped = state.idle.len();
        state.idle.clear();
        state.open = state.open.saturating_sub(dropped);
        drop(state);
        self.available.notify_all();
    }

    /// Writes `commands` on a pooled connection and hands it to `receive`
    /// to read the replies.
    ///
    /// A connection that saw any error is closed rather than returned, since
    /// unread reply bytes may remain on it. Only a reused connection found
    /// disconnected while writing is retried, once, on a freshly dialed one.
    /// Failures after the write completed are returned as they are.
    fn exchange<T>(
        &self,
        commands: &[Command],
        mut receive: impl FnMut(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let (mut conn, mut reused) = self.checkout()?;
        loop {
            if let Err(e) = conn.send(commands) {
                drop(conn);
                self.discard();
                if !(reused && e.is_disconnect()) {
                    return Err(e);
                }
                tracing::warn!(pool = self.name, error = %e, "connection broken, retrying once");
                self.drop_idle();
                (conn, _) = self.checkout()?;
                reused = false;
                continue;
            }

            return match receive(&mut conn) {
                Ok(value) => {
                    self.checkin(conn);
                    Ok(value)
                }
                Err(e) => {
                    drop(conn);
                    self.discard();
                    Err(e)
                }
            };
        }
    }
}

impl StoreClient for Pool {
    fn pipeline(&self, commands: &[Command]) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        if !self.options.pipelined {
            for cmd in commands {
                self.exchange(std::slice::from_ref(cmd), |conn| {
                    read_discard(&mut conn.reader)
                })?;
            }
            return Ok(());
        }

        self.exchange(commands, |conn| {
            // Read every reply even after an error reply, so the first
            // failure is reported with the stream fully consumed.
            let mut first_error = None;
            for _ in commands {
                match read_discard(&mut conn.reader) {
                    Ok(()) => {}
                    Err(e @ RedtsError::Reply(ReplyError::Server { .. })) => {
                        first_error.get_or_insert(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            first_error.map_or(Ok(()), Err)
        })
    }

    fn query(
        &self,
        command: &Command,
        decode: &mut dyn FnMut(&mut dyn BufRead) -> Result<()>,
    ) -> Result<()> {
        self.exchange(std::slice::from_ref(command), |conn| decode(&mut conn.reader))
    }
}

/// Asks a coordinator for the address of the current primary of `group`.
/// `timeout` bounds the connect and each read and write.
///
/// # Errors
///
/// Returns [`PoolError::Discovery`] if the coordinator is unreachable, does
/// not know the group, or sends an unexpected reply.
pub fn discover_primary(coordinator: &str, group: &str, timeout: Duration) -> Result<String> {
    let lookup = || -> Result<String> {
        let mut conn = Connection::dial(coordinator, timeout, timeout)?;
        conn.send(&[Command::new("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(group)])?;

        let len = read_array_len(&mut conn.reader)?;
        if len != 2 {
            return Err(ReplyError::malformed(format!(
                "expected [host, port], got {len} element(s)"
            ))
            .into());
        }
        let host = read_string(&mut conn.reader)?;
        let port = read_string(&mut conn.reader)?;
        let port: u16 = port
            .parse()
            .map_err(|_| ReplyError::malformed(format!("invalid port '{port}'")))?;
        Ok(join_host_port(&host, port))
    };

    let primary = lookup().map_err(|e| PoolError::Discovery {
        coordinator: coordinator.to_string(),
        group: group.to_string(),
        reason: e.to_string(),
    })?;
    tracing::debug!(%coordinator, %group, %primary, "discovered primary");
    Ok(primary)
}

/// Builds the write pool (pipelined) and the read pool (one round trip per
/// command) for `config`.
///
/// Both pools are created or neither is: if the read pool fails, the write
/// pool is dropped and its connections closed before the error is returned.
///
/// # Errors
///
/// Returns [`PoolError::InitFailure`] naming the pool that failed.
pub fn create_pools(config: &StorageConfig) -> Result<(Pool, Pool)> {
    let write_options = PoolOptions {
        size: config.pool_size,
        pipelined: true,
        connect_timeout: config.connect_timeout,
        io_timeout: config.io_timeout,
    };
    let read_options = PoolOptions {
        pipelined: false,
        ..write_options.clone()
    };

    let write = Pool::open("write", config.addressing.clone(), write_options)?;
    let read = Pool::open("read", config.addressing.clone(), read_options)?;
    Ok((write, read))
}
