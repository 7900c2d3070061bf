//! Storage-plugin contracts of the host monitoring system.
//!
//! The host drives remote storage through these traits; the adapter's
//! concrete types implement them by delegating to their inherent methods.

use crate::appender::StoreAppender;
use crate::error::{RedtsError, Result};
use crate::labels::{Labels, Matcher};
use crate::querier::StoreQuerier;
use crate::series;

/// Write side of a storage backend.
pub trait Appender {
    /// Appends a sample by label set and returns the series reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the label set is invalid.
    fn add(&mut self, labels: &Labels, timestamp: i64, value: f64) -> Result<u64>;

    /// Appends a sample by series reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is unknown.
    fn add_fast(&mut self, reference: u64, timestamp: i64, value: f64) -> Result<()>;

    /// Submits everything appended since the last commit or rollback.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn commit(&mut self) -> Result<()>;

    /// Discards everything appended since the last commit or rollback.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn rollback(&mut self) -> Result<()>;
}

/// Read side of a storage backend.
pub trait Querier {
    /// The series set returned by [`select`](Self::select).
    type Set: SeriesSet;

    /// Returns the series matching `matchers` within `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be built or executed.
    fn select(&self, start: i64, end: i64, matchers: &[Matcher]) -> Result<Self::Set>;

    /// Returns the known values of label `name`.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn label_values(&self, name: &str) -> Result<Vec<String>>;

    /// Returns the known label names.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn label_names(&self) -> Result<Vec<String>>;

    /// Releases the querier.
    ///
    /// # Errors
    ///
    /// Implementation specific.
    fn close(&mut self) -> Result<()>;
}

/// Forward-only cursor over query results.
pub trait SeriesSet {
    /// The series type yielded by [`at`](Self::at).
    type Series: Series;

    /// Advances the cursor; `false` once exhausted.
    fn next(&mut self) -> bool;

    /// The series under the cursor.
    fn at(&self) -> &Self::Series;

    /// The error that ended iteration, if any.
    fn err(&self) -> Option<&RedtsError>;
}

/// One result series.
pub trait Series {
    /// The sample cursor type.
    type Iter<'a>: SeriesIterator
    where
        Self: 'a;

    /// The labels identifying the series.
    fn labels(&self) -> &Labels;

    /// A fresh cursor over the samples.
    fn iterator(&self) -> Self::Iter<'_>;
}

/// Seekable cursor over the samples of one series.
pub trait SeriesIterator {
    /// Moves to the first sample at or after `t`.
    fn seek(&mut self, t: i64) -> bool;

    /// Advances one sample.
    fn next(&mut self) -> bool;

    /// The `(timestamp, value)` under the cursor.
    fn at(&self) -> (i64, f64);

    /// The error that ended iteration, if any.
    fn err(&self) -> Option<&RedtsError>;
}

impl Appender for StoreAppender<'_> {
    fn add(&mut self, labels: &Labels, timestamp: i64, value: f64) -> Result<u64> {
        StoreAppender::add(self, labels, timestamp, value)
    }

    fn add_fast(&mut self, reference: u64, timestamp: i64, value: f64) -> Result<()> {
        StoreAppender::add_fast(self, reference, timestamp, value)
    }

    fn commit(&mut self) -> Result<()> {
        StoreAppender::commit(self)
    }

    fn rollback(&mut self) -> Result<()> {
        StoreAppender::rollback(self)
    }
}

impl Querier for StoreQuerier<'_> {
    type Set = series::SeriesSet;

    fn select(&self, start: i64, end: i64, matchers: &[Matcher]) -> Result<Self::Set> {
        StoreQuerier::select(self, start, end, matchers)
    }

    fn label_values(&self, name: &str) -> Result<Vec<String>> {
        StoreQuerier::label_values(self, name)
    }

    fn label_names(&self) -> Result<Vec<String>> {
        StoreQuerier::label_names(self)
    }

    fn close(&mut self) -> Result<()> {
        StoreQuerier::close(self)
    }
}

impl SeriesSet for series::SeriesSet {
    type Series = series::SeriesResult;

    fn next(&mut self) -> bool {
        series::SeriesSet::next(self)
    }

    fn at(&self) -> &Self::Series {
        series::SeriesSet::at(self)
    }

    fn err(&self) -> Option<&RedtsError> {
        series::SeriesSet::err(self)
    }
}

impl Series for series::SeriesResult {
    type Iter<'a> = series::SeriesIterator<'a>;

    fn labels(&self) -> &Labels {
        series::SeriesResult::labels(self)
    }

    fn iterator(&self) -> Self::Iter<'_> {
        self.iter()
    }
}

impl SeriesIterator for series::SeriesIterator<'_> {
    fn seek(&mut self, t: i64) -> bool {
        series::SeriesIterator::seek(self, t)
    }

    fn next(&mut self) -> bool {
        series::SeriesIterator::next(self)
    }

    fn at(&self) -> (i64, f64) {
        let sample = series::SeriesIterator::at(self);
        (sample.timestamp, sample.value)
    }

    fn err(&self) -> Option<&RedtsError> {
        series::SeriesIterator::err(self)
    }
}
