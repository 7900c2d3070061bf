//! Range queries.
//!
//! [`StoreQuerier::select`] turns a time window and label matchers into one
//! `TS.MRANGE` command, runs it on the read pool, and decodes the reply into
//! a [`SeriesSet`]. The store filters on label equality and inequality only;
//! any other matcher is rejected before anything is sent.

use crate::decode::decode_mrange;
use crate::error::{QueryError, ReplyError, Result};
use crate::labels::{MatchType, Matcher};
use crate::pool::StoreClient;
use crate::resp::Command;
use crate::series::SeriesSet;

/// Command that queries several series over a time range.
pub const TS_MRANGE: &str = "TS.MRANGE";

/// Marker argument that precedes the filter tokens of `TS.MRANGE`.
pub const FILTER: &str = "FILTER";

/// Formats a matcher as a `TS.MRANGE` filter token (`name=value` or
/// `name!=value`).
///
/// # Errors
///
/// Returns [`QueryError::UnsupportedMatcher`] for regex matchers.
pub fn format_matcher(matcher: &Matcher) -> Result<String> {
    let op = match matcher.kind {
        MatchType::Equal => "=",
        MatchType::NotEqual => "!=",
        MatchType::Regex | MatchType::NotRegex => {
            return Err(QueryError::UnsupportedMatcher {
                matcher: matcher.to_string(),
            }
            .into());
        }
    };
    Ok(format!("{}{op}{}", matcher.name, matcher.value))
}

/// Builds the `TS.MRANGE start end FILTER token...` command.
///
/// # Errors
///
/// Returns [`QueryError::UnsupportedMatcher`] if any matcher is a regex.
pub fn build_mrange(start: i64, end: i64, matchers: &[Matcher]) -> Result<Command> {
    let mut cmd = Command::with_capacity(TS_MRANGE, 3 + matchers.len());
    cmd.push_arg(start.to_string());
    cmd.push_arg(end.to_string());
    cmd.push_arg(FILTER);
    for matcher in matchers {
        cmd.push_arg(format_matcher(matcher)?);
    }
    Ok(cmd)
}

/// Runs range queries against the read pool.
pub struct StoreQuerier<'a> {
    client: &'a dyn StoreClient,
}

impl<'a> StoreQuerier<'a> {
    /// Creates a querier over `client`.
    pub fn new(client: &'a dyn StoreClient) -> Self {
        Self { client }
    }

    /// Returns every series matching `matchers` with its samples in
    /// `[start, end]` (milliseconds).
    ///
    /// # Errors
    ///
    /// - [`QueryError::UnsupportedMatcher`] if a matcher is a regex (nothing
    ///   is sent)
    /// - [`ReplyError::Malformed`] if the reply does not have the expected
    ///   shape (no partial result is returned), or if the client returned
    ///   without handing over a reply
    /// - [`ReplyError::Server`] / [`ReplyError::Io`] on store or connection
    ///   failures
    pub fn select(&self, start: i64, end: i64, matchers: &[Matcher]) -> Result<SeriesSet> {
        let cmd = build_mrange(start, end, matchers)?;

        let mut set = None;
        self.client.query(&cmd, &mut |reply| {
            set = Some(decode_mrange(reply)?);
            Ok(())
        })?;

        let set = set.ok_or_else(|| ReplyError::malformed("no reply decoded"))?;
        tracing::debug!(start, end, series = set.len(), "range query done");
        Ok(set)
    }

    /// Label value discovery is not supported; always empty.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn label_values(&self, _name: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Label name discovery is not supported; always empty.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn label_names(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Releases the querier. Connections belong to the pool, so there is
    /// nothing to tear down.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
