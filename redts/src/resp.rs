//! RESP2 wire primitives.
//!
//! Requests are encoded as arrays of bulk strings. Replies are read
//! incrementally from any [`BufRead`], one typed element at a time, so callers
//! can decode nested replies without materializing them first.
//!
//! Reply framing:
//!
//! | Prefix | Type          | Example                 |
//! |--------|---------------|-------------------------|
//! | `+`    | simple string | `+OK\r\n`               |
//! | `-`    | error         | `-ERR unknown\r\n`      |
//! | `:`    | integer       | `:1000\r\n`             |
//! | `$`    | bulk string   | `$3\r\ncpu\r\n`         |
//! | `*`    | array         | `*2\r\n:1\r\n:2\r\n`    |

use std::fmt;
use std::io::{self, BufRead, Read, Write};

use crate::error::{ReplyError, Result};

/// Longest bulk string accepted from the store (the server's own limit).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest header line accepted from the store, CRLF included.
const MAX_HEADER_LEN: u64 = 64 * 1024;

/// A single store command: a name followed by string arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    parts: Vec<String>,
}

impl Command {
    /// Creates a command with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            parts: vec![name.into()],
        }
    }

    /// Creates a command with room for `args` arguments.
    pub fn with_capacity(name: impl Into<String>, args: usize) -> Self {
        let mut parts = Vec::with_capacity(args + 1);
        parts.push(name.into());
        Self { parts }
    }

    /// Appends an argument, builder style.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.parts.push(arg.into());
        self
    }

    /// Appends an argument in place.
    pub fn push_arg(&mut self, arg: impl Into<String>) {
        self.parts.push(arg.into());
    }

    /// The command name.
    pub fn name(&self) -> &str {
        &self.parts[0]
    }

    /// The arguments, without the command name.
    pub fn args(&self) -> &[String] {
        &self.parts[1..]
    }

    /// Writes the command to `w` as an array of bulk strings.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the writer.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "*{}\r\n", self.parts.len())?;
        for part in &self.parts {
            write!(w, "${}\r\n", part.len())?;
            w.write_all(part.as_bytes())?;
            w.write_all(b"\r\n")?;
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join(" "))
    }
}

/// Reads an array header and returns the number of elements that follow.
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if the next element is not a non-null
/// array, [`ReplyError::Server`] on an error reply, and [`ReplyError::Io`]
/// if the stream fails.
pub fn read_array_len<R: BufRead + ?Sized>(r: &mut R) -> Result<usize> {
    let (prefix, body) = read_header(r)?;
    if prefix != b'*' {
        return Err(unexpected("array", prefix));
    }
    let len = parse_int(&body)?;
    usize::try_from(len).map_err(|_| ReplyError::malformed("null array").into())
}

/// Reads an integer element.
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if the next element is not an integer.
pub fn read_integer<R: BufRead + ?Sized>(r: &mut R) -> Result<i64> {
    let (prefix, body) = read_header(r)?;
    if prefix != b':' {
        return Err(unexpected("integer", prefix));
    }
    parse_int(&body)
}

/// Reads a bulk or simple string element.
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if the next element is not a string, is
/// a null bulk string, or is not valid UTF-8.
pub fn read_string<R: BufRead + ?Sized>(r: &mut R) -> Result<String> {
    let (prefix, body) = read_header(r)?;
    match prefix {
        b'+' => Ok(body),
        b'$' => {
            let len = usize::try_from(parse_int(&body)?)
                .map_err(|_| ReplyError::malformed("null bulk string"))?;
            read_bulk_body(r, len)
        }
        other => Err(unexpected("string", other)),
    }
}

/// Reads and discards one complete reply of any type.
///
/// Used for acknowledgements whose content does not matter.
///
/// # Errors
///
/// Returns [`ReplyError::Server`] if the reply (or any element nested in it)
/// is an error reply.
pub fn read_discard<R: BufRead + ?Sized>(r: &mut R) -> Result<()> {
    let (prefix, body) = read_header(r)?;
    match prefix {
        b'+' | b':' => Ok(()),
        b'$' => {
            if let Ok(len) = usize::try_from(parse_int(&body)?) {
                read_bulk_body(r, len)?;
            }
            Ok(())
        }
        b'*' => {
            // A null array (`*-1`) has no elements.
            let len = usize::try_from(parse_int(&body)?).unwrap_or(0);
            for _ in 0..len {
                read_discard(r)?;
            }
            Ok(())
        }
        other => Err(unexpected("reply", other)),
    }
}

/// Reads one CRLF-terminated header line and splits off its type prefix.
///
/// Error replies are turned into [`ReplyError::Server`] here, so every typed
/// reader reports them the same way.
fn read_header<R: BufRead + ?Sized>(r: &mut R) -> Result<(u8, String)> {
    let mut line = Vec::with_capacity(16);
    let n = Read::take(&mut *r, MAX_HEADER_LEN).read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(ReplyError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before reply",
        ))
        .into());
    }
    if !line.ends_with(b"\r\n") || line.len() < 3 {
        return Err(ReplyError::malformed("header line is not CRLF terminated").into());
    }
    line.truncate(line.len() - 2);

    let prefix = line[0];
    let body = String::from_utf8(line.split_off(1))
        .map_err(|_| ReplyError::malformed("header line is not valid UTF-8"))?;

    if prefix == b'-' {
        return Err(ReplyError::Server { message: body }.into());
    }
    Ok((prefix, body))
}

fn read_bulk_body<R: BufRead + ?Sized>(r: &mut R, len: usize) -> Result<String> {
    if len > MAX_BULK_LEN {
        return Err(ReplyError::malformed(format!(
            "bulk string of {len} bytes exceeds the {MAX_BULK_LEN} byte limit"
        ))
        .into());
    }

    // Grows with the bytes actually received rather than the declared length.
    let want = len + 2;
    let mut buf = Vec::new();
    Read::take(&mut *r, want as u64).read_to_end(&mut buf)?;
    if buf.len() < want {
        return Err(ReplyError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed inside a bulk string",
        ))
        .into());
    }
    if !buf.ends_with(b"\r\n") {
        return Err(ReplyError::malformed("bulk string is not CRLF terminated").into());
    }
    buf.truncate(len);
    String::from_utf8(buf).map_err(|_| ReplyError::malformed("bulk string is not valid UTF-8").into())
}

fn parse_int(body: &str) -> Result<i64> {
    body.parse()
        .map_err(|_| ReplyError::malformed(format!("invalid integer '{body}'")).into())
}

fn unexpected(expected: &str, prefix: u8) -> crate::error::RedtsError {
    ReplyError::malformed(format!(
        "expected {expected}, found element of type '{}'",
        char::from(prefix).escape_default()
    ))
    .into()
}
