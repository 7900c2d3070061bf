//! Decoder for the multi-series range query reply.
//!
//! The reply is a nested array:
//!
//! ```text
//! [                                   result set
//!   [ key,                            series entry (3 elements)
//!     [ [name, value], ... ],         label set (2-element pairs)
//!     [ [ts, "value"], ... ] ],       samples (integer, string-encoded float)
//!   ...
//! ]
//! ```
//!
//! Each shape has its own decode function; they compose top-down and read
//! straight from the connection, element by element. Decoding is strict: an
//! arity mismatch anywhere fails the whole reply and nothing partial is
//! returned.

use std::io::BufRead;

use crate::error::{ReplyError, Result};
use crate::labels::{Label, Labels};
use crate::resp::{read_array_len, read_integer, read_string};
use crate::series::{Sample, SeriesResult, SeriesSet};

/// Decodes a whole range query reply into a [`SeriesSet`].
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if any element has the wrong type or
/// arity, [`ReplyError::Server`] if the store replied with an error, and
/// [`ReplyError::Io`] if the stream fails.
///
/// # Examples
///
/// ```rust
/// use redts::decode::decode_mrange;
///
/// let reply = b"*1\r\n*3\r\n$3\r\ncpu\r\n*1\r\n*2\r\n$4\r\nhost\r\n$1\r\na\r\n\
///               *1\r\n*2\r\n:1000\r\n$3\r\n0.5\r\n";
/// let mut set = decode_mrange(&mut &reply[..])?;
/// assert!(set.next());
/// assert_eq!(set.at().key(), "cpu");
/// assert_eq!(set.at().samples()[0].value, 0.5);
/// # Ok::<(), redts::RedtsError>(())
/// ```
pub fn decode_mrange<R: BufRead + ?Sized>(r: &mut R) -> Result<SeriesSet> {
    let count = read_array_len(r)?;
    let mut results = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        results.push(decode_series(r)?);
    }
    Ok(SeriesSet::new(results))
}

/// Decodes one `[key, labels, samples]` series entry.
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if the entry does not have exactly three
/// elements or any nested element is malformed.
pub fn decode_series<R: BufRead + ?Sized>(r: &mut R) -> Result<SeriesResult> {
    expect_arity(r, 3, "series entry")?;
    let key = read_string(r)?;
    let labels = decode_label_set(r)?;
    let samples = decode_samples(r)?;
    Ok(SeriesResult::new(key, labels, samples))
}

/// Decodes a label set: an array of `[name, value]` pairs, order preserved.
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if a pair does not have exactly two
/// elements.
pub fn decode_label_set<R: BufRead + ?Sized>(r: &mut R) -> Result<Labels> {
    let count = read_array_len(r)?;
    let mut labels = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        expect_arity(r, 2, "label pair")?;
        let name = read_string(r)?;
        let value = read_string(r)?;
        labels.push(Label { name, value });
    }
    Ok(Labels::new(labels))
}

/// Decodes an array of samples.
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if any sample is malformed.
pub fn decode_samples<R: BufRead + ?Sized>(r: &mut R) -> Result<Vec<Sample>> {
    let count = read_array_len(r)?;
    let mut samples = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        samples.push(decode_sample(r)?);
    }
    Ok(samples)
}

/// Decodes one `[timestamp, "value"]` sample.
///
/// # Errors
///
/// Returns [`ReplyError::Malformed`] if the tuple does not have exactly two
/// elements, the timestamp is not an integer, or the value does not parse as
/// a float.
pub fn decode_sample<R: BufRead + ?Sized>(r: &mut R) -> Result<Sample> {
    expect_arity(r, 2, "sample")?;
    let timestamp = read_integer(r)?;
    let raw = read_string(r)?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| ReplyError::malformed(format!("sample value '{raw}' is not a number")))?;
    Ok(Sample { timestamp, value })
}

fn expect_arity<R: BufRead + ?Sized>(r: &mut R, expected: usize, what: &str) -> Result<()> {
    let len = read_array_len(r)?;
    if len != expected {
        return Err(ReplyError::malformed(format!(
            "{what} has {len} element(s), expected {expected}"
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RedtsError;

    fn bulk(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(format!("${}\r\n{s}\r\n", s.len()).as_bytes());
    }

    fn encode_series(out: &mut Vec<u8>, series: &SeriesResult) {
        out.extend_from_slice(b"*3\r\n");
        bulk(out, series.key());
        out.extend_from_slice(format!("*{}\r\n", series.labels().len()).as_bytes());
        for label in series.labels() {
            out.extend_from_slice(b"*2\r\n");
            bulk(out, &label.name);
            bulk(out, &label.value);
        }
        out.extend_from_slice(format!("*{}\r\n", series.len()).as_bytes());
        for sample in series.samples() {
            out.extend_from_slice(format!("*2\r\n:{}\r\n", sample.timestamp).as_bytes());
            bulk(out, &sample.value.to_string());
        }
    }

    fn encode_mrange(results: &[SeriesResult]) -> Vec<u8> {
        let mut out = format!("*{}\r\n", results.len()).into_bytes();
        for series in results {
            encode_series(&mut out, series);
        }
        out
    }

    fn is_malformed(err: &RedtsError) -> bool {
        matches!(err, RedtsError::Reply(ReplyError::Malformed { .. }))
    }

    #[test]
    fn test_round_trip_preserves_key_labels_and_samples() {
        let original = vec![
            SeriesResult::new(
                "cpu{__name__=cpu,host=a}".to_string(),
                Labels::from_pairs([("__name__", "cpu"), ("host", "a")]),
                vec![
                    Sample::new(1000, 0.5),
                    Sample::new(2000, -1.25),
                    Sample::new(3000, 1e-7),
                ],
            ),
            SeriesResult::new(
                "mem{zone=z,__name__=mem}".to_string(),
                Labels::from_pairs([("zone", "z"), ("__name__", "mem")]),
                vec![Sample::new(1500, 42.0)],
            ),
        ];

        let bytes = encode_mrange(&original);
        let set = decode_mrange(&mut bytes.as_slice()).unwrap();
        assert_eq!(set.into_results(), original);
    }

    #[test]
    fn test_empty_result_set() {
        let set = decode_mrange(&mut &b"*0\r\n"[..]).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_series_without_labels_or_samples() {
        let reply = b"*1\r\n*3\r\n$1\r\nk\r\n*0\r\n*0\r\n";
        let mut set = decode_mrange(&mut &reply[..]).unwrap();
        assert!(set.next());
        assert!(set.at().labels().is_empty());
        assert!(set.at().is_empty());
    }

    #[test]
    fn test_simple_string_sample_values() {
        let reply = b"*2\r\n:5\r\n+3.5\r\n";
        let sample = decode_sample(&mut &reply[..]).unwrap();
        assert_eq!(sample, Sample::new(5, 3.5));
    }

    #[test]
    fn test_label_pair_of_length_one_is_malformed() {
        let reply = b"*1\r\n*3\r\n$1\r\nk\r\n*1\r\n*1\r\n$4\r\nhost\r\n*0\r\n";
        let err = decode_mrange(&mut &reply[..]).unwrap_err();
        assert!(is_malformed(&err));
        assert!(err.to_string().contains("label pair"));
    }

    #[test]
    fn test_sample_of_length_three_is_malformed() {
        let reply = b"*3\r\n:1\r\n$1\r\n1\r\n$1\r\n2\r\n";
        let err = decode_sample(&mut &reply[..]).unwrap_err();
        assert!(is_malformed(&err));
    }

    #[test]
    fn test_series_entry_of_length_two_is_malformed() {
        let reply = b"*1\r\n*2\r\n$1\r\nk\r\n*0\r\n";
        let err = decode_mrange(&mut &reply[..]).unwrap_err();
        assert!(is_malformed(&err));
    }

    #[test]
    fn test_non_numeric_value_is_malformed() {
        let reply = b"*2\r\n:1\r\n$3\r\nabc\r\n";
        let err = decode_sample(&mut &reply[..]).unwrap_err();
        assert!(is_malformed(&err));
    }

    #[test]
    fn test_string_timestamp_is_malformed() {
        let reply = b"*2\r\n$4\r\n1000\r\n$1\r\n1\r\n";
        assert!(is_malformed(&decode_sample(&mut &reply[..]).unwrap_err()));
    }

    #[test]
    fn test_error_after_valid_series_discards_everything() {
        let mut reply = b"*2\r\n".to_vec();
        encode_series(
            &mut reply,
            &SeriesResult::new("ok".into(), Labels::default(), vec![Sample::new(1, 1.0)]),
        );
        reply.extend_from_slice(b"*3\r\n$3\r\nbad\r\n*1\r\n*3\r\n");
        let err = decode_mrange(&mut reply.as_slice()).unwrap_err();
        assert!(is_malformed(&err));
    }

    #[test]
    fn test_huge_declared_key_length_is_malformed() {
        let reply = b"*1\r\n*3\r\n$4611686018427387903\r\nx\r\n";
        assert!(is_malformed(&decode_mrange(&mut &reply[..]).unwrap_err()));
    }

    #[test]
    fn test_server_error_reply() {
        let reply = b"-ERR TSDB: invalid filter\r\n";
        let err = decode_mrange(&mut &reply[..]).unwrap_err();
        assert!(matches!(err, RedtsError::Reply(ReplyError::Server { .. })));
    }
}
