//! Label sets and label matchers.
//!
//! A [`Labels`] value is an ordered sequence of name/value pairs identifying
//! one time series. Order is significant: it drives both the series key
//! layout and the series reference hash, so callers that want stable keys
//! must present labels in a stable order.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

/// Name of the label that carries the metric name.
pub const METRIC_NAME: &str = "__name__";

/// Byte written after every label name and value when hashing, so that
/// `("ab", "c")` and `("a", "bc")` hash differently.
const HASH_SEPARATOR: u8 = 0xff;

/// A single name/value label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered label set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Creates a label set from labels in the given order.
    pub fn new(labels: Vec<Label>) -> Self {
        Self(labels)
    }

    /// Creates a label set from `(name, value)` pairs in the given order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use redts::labels::Labels;
    ///
    /// let labels = Labels::from_pairs([("__name__", "cpu"), ("host", "a")]);
    /// assert_eq!(labels.metric_name(), Some("cpu"));
    /// assert_eq!(labels.get("host"), Some("a"));
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(name, value)| Label::new(name, value))
            .collect()
    }

    /// Number of labels in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set has no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a label at the end of the set.
    pub fn push(&mut self, label: Label) {
        self.0.push(label);
    }

    /// Iterates over the labels in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    /// Returns the labels as a slice.
    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }

    /// Returns the value of the first label with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Returns the value of the metric-name label, if present.
    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME)
    }

    /// Returns the labels as owned `(name, value)` pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect()
    }

    /// Computes the order-sensitive content hash of the label set.
    ///
    /// This is xxHash64 (seed 0) over every name and value, each followed by
    /// a `0xff` separator. The result depends only on label content and
    /// order, so it is stable across processes and releases.
    pub fn hash(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        for label in &self.0 {
            hasher.update(label.name.as_bytes());
            hasher.update(&[HASH_SEPARATOR]);
            hasher.update(label.value.as_bytes());
            hasher.update(&[HASH_SEPARATOR]);
        }
        hasher.digest()
    }
}

impl FromIterator<Label> for Labels {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Labels {
    type Item = Label;
    type IntoIter = std::vec::IntoIter<Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        f.write_str("}")
    }
}

/// The comparison a [`Matcher`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    /// `name="value"`
    Equal,
    /// `name!="value"`
    NotEqual,
    /// `name=~"regex"`
    Regex,
    /// `name!~"regex"`
    NotRegex,
}

impl MatchType {
    /// Returns the operator as written in a selector.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Equal => "=",
            MatchType::NotEqual => "!=",
            MatchType::Regex => "=~",
            MatchType::NotRegex => "!~",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label matcher used to select series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matcher {
    /// The comparison to perform.
    pub kind: MatchType,
    /// Label name to compare.
    pub name: String,
    /// Value (or pattern) to compare against.
    pub value: String,
}

impl Matcher {
    /// Creates a new matcher.
    pub fn new(kind: MatchType, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates an equality matcher.
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MatchType::Equal, name, value)
    }

    /// Creates an inequality matcher.
    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MatchType::NotEqual, name, value)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.kind, self.value)
    }
}
