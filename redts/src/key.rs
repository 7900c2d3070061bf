//! Series key encoding.
//!
//! Every series is stored under a key of the form
//! `<metric-name>{name1=value1,name2=value2,...}` with labels in the order the
//! label set presents them, the metric-name label included. The series
//! reference handed back to writers is the label set's content hash
//! ([`Labels::hash`]), computed independently of the key string.

use crate::error::{AppendError, Result};
use crate::labels::{Labels, METRIC_NAME};

/// Builds the store key and the series reference for a label set.
///
/// # Errors
///
/// Returns [`AppendError::InvalidLabelSet`] if the label set does not contain
/// exactly one metric-name label.
///
/// # Examples
///
/// ```rust
/// use redts::key::key_for;
/// use redts::labels::Labels;
///
/// let labels = Labels::from_pairs([("__name__", "cpu"), ("host", "a")]);
/// let (key, reference) = key_for(&labels)?;
/// assert_eq!(key, "cpu{__name__=cpu,host=a}");
/// assert_eq!(reference, labels.hash());
/// # Ok::<(), redts::RedtsError>(())
/// ```
pub fn key_for(labels: &Labels) -> Result<(String, u64)> {
    let metric_name = metric_name(labels)?;

    let body_len: usize = labels
        .iter()
        .map(|l| l.name.len() + l.value.len() + 2)
        .sum();
    let mut key = String::with_capacity(metric_name.len() + body_len + 2);

    key.push_str(metric_name);
    key.push('{');
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(&label.name);
        key.push('=');
        key.push_str(&label.value);
    }
    key.push('}');

    Ok((key, labels.hash()))
}

fn metric_name(labels: &Labels) -> Result<&str> {
    let mut names = labels.iter().filter(|l| l.name == METRIC_NAME);

    match (names.next(), names.next()) {
        (Some(label), None) => Ok(&label.value),
        (None, _) => Err(invalid(labels, "missing metric name label")),
        (Some(_), Some(_)) => Err(invalid(labels, "duplicate metric name label")),
    }
}

fn invalid(labels: &Labels, reason: &str) -> crate::error::RedtsError {
    AppendError::InvalidLabelSet {
        labels: labels.to_pairs(),
        reason: format!("{reason} '{METRIC_NAME}'"),
    }
    .into()
}
