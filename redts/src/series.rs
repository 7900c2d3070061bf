//! Decoded query results and their cursors.
//!
//! A range query yields a [`SeriesSet`]: the series in the order the store
//! returned them, walked with a forward-only cursor. Each [`SeriesResult`]
//! holds its samples sorted by timestamp (the store returns them sorted and
//! they are not re-sorted here), which lets [`SeriesIterator::seek`] binary
//! search.
//!
//! Both cursors start *before* their first element: call `next` (or `seek`)
//! before `at`.

use serde::{Deserialize, Serialize};

use crate::error::RedtsError;
use crate::labels::Labels;

/// A single data point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in milliseconds since the epoch.
    pub timestamp: i64,
    /// The sample value.
    pub value: f64,
}

impl Sample {
    /// Creates a new sample.
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One series returned by a range query.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesResult {
    key: String,
    labels: Labels,
    samples: Vec<Sample>,
}

impl SeriesResult {
    /// Creates a series result. `samples` must already be sorted by timestamp.
    pub fn new(key: String, labels: Labels, samples: Vec<Sample>) -> Self {
        Self {
            key,
            labels,
            samples,
        }
    }

    /// The store key of the series.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The labels of the series, in the order the store returned them.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The samples, ascending by timestamp.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the series has no samples in the queried window.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns a seekable cursor over the samples.
    pub fn iter(&self) -> SeriesIterator<'_> {
        SeriesIterator::new(&self.samples)
    }
}

/// Seekable cursor over the samples of one series.
#[derive(Debug, Clone)]
pub struct SeriesIterator<'a> {
    samples: &'a [Sample],
    /// `None` until the first `next`/`seek`.
    pos: Option<usize>,
}

impl<'a> SeriesIterator<'a> {
    /// Creates a cursor positioned before the first sample.
    pub fn new(samples: &'a [Sample]) -> Self {
        Self { samples, pos: None }
    }

    /// Moves to the first sample with `timestamp >= t`.
    ///
    /// Searches the whole sample sequence, so the cursor may move backwards.
    /// Returns `false` if every sample is older than `t`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use redts::series::{Sample, SeriesIterator};
    ///
    /// let samples = [Sample::new(10, 1.0), Sample::new(20, 2.0), Sample::new(30, 3.0)];
    /// let mut it = SeriesIterator::new(&samples);
    /// assert!(it.seek(15));
    /// assert_eq!(it.at().timestamp, 20);
    /// assert!(!it.seek(31));
    /// ```
    pub fn seek(&mut self, t: i64) -> bool {
        let idx = self.samples.partition_point(|s| s.timestamp < t);
        self.pos = Some(idx);
        self.valid()
    }

    /// Advances one sample. Returns `false` once past the last sample.
    pub fn next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p.saturating_add(1));
        self.pos = Some(next.min(self.samples.len()));
        self.valid()
    }

    /// Returns the sample under the cursor.
    ///
    /// # Panics
    ///
    /// Panics if the last `next`/`seek` returned `false` or neither has been
    /// called yet.
    pub fn at(&self) -> Sample {
        match self.pos {
            Some(p) if p < self.samples.len() => self.samples[p],
            _ => panic!("SeriesIterator::at called without a valid position"),
        }
    }

    /// Iteration over decoded samples cannot fail; always `None`.
    pub fn err(&self) -> Option<&RedtsError> {
        None
    }

    fn valid(&self) -> bool {
        self.pos.is_some_and(|p| p < self.samples.len())
    }
}

/// Forward-only cursor over the series returned by one query.
#[derive(Debug, Clone, Default)]
pub struct SeriesSet {
    results: Vec<SeriesResult>,
    pos: Option<usize>,
}

impl SeriesSet {
    /// Creates a set positioned before its first series.
    pub fn new(results: Vec<SeriesResult>) -> Self {
        Self { results, pos: None }
    }

    /// Advances to the next series. Returns `false` once exhausted.
    pub fn next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p.saturating_add(1));
        if next < self.results.len() {
            self.pos = Some(next);
            true
        } else {
            false
        }
    }

    /// Returns the series under the cursor.
    ///
    /// # Panics
    ///
    /// Panics if [`next`](Self::next) has not returned `true` yet.
    pub fn at(&self) -> &SeriesResult {
        match self.pos {
            Some(p) => &self.results[p],
            None => panic!("SeriesSet::at called before next"),
        }
    }

    /// Decoding is all-or-nothing, so a set never carries an error.
    pub fn err(&self) -> Option<&RedtsError> {
        None
    }

    /// Total number of series in the set.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if the query matched no series.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Consumes the set, returning every series regardless of cursor position.
    pub fn into_results(self) -> Vec<SeriesResult> {
        self.results
    }
}

impl IntoIterator for SeriesSet {
    type Item = SeriesResult;
    type IntoIter = std::vec::IntoIter<SeriesResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
