//! CLI for the redts remote-storage adapter.
//!
//! Provides commands for computing series keys, writing samples, and running
//! range queries against a Redis time-series store.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use redts::key::key_for;
use redts::{Label, Labels, MatchType, Matcher, Storage};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// redts: Redis time-series remote-storage adapter CLI.
#[derive(Parser)]
#[command(name = "redts", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the series key and reference for a label set.
    Key {
        /// Metric name.
        metric: String,

        /// Labels as `name=value`, in order.
        labels: Vec<String>,
    },

    /// Write one sample.
    Write {
        /// Connection URL (`redis://host:port` or `sentinel://host:port/group`).
        url: String,

        /// Metric name.
        metric: String,

        /// Sample value.
        value: f64,

        /// Labels as `name=value`, in order.
        labels: Vec<String>,

        /// Sample timestamp in milliseconds (defaults to now).
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Query samples over a time range.
    Query {
        /// Connection URL (`redis://host:port` or `sentinel://host:port/group`).
        url: String,

        /// Matchers such as `__name__=cpu` or `host!=a`.
        #[arg(required = true)]
        matchers: Vec<String>,

        /// Range to query, ending now (e.g., "1h", "30m", "7d").
        #[arg(long, default_value = "1h")]
        range: String,

        /// Start of the range in milliseconds (overrides `--range`).
        #[arg(long)]
        start: Option<i64>,

        /// End of the range in milliseconds (defaults to now).
        #[arg(long)]
        end: Option<i64>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array of series.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Key { metric, labels } => cmd_key(&metric, &labels),
        Commands::Write {
            url,
            metric,
            value,
            labels,
            timestamp,
        } => cmd_write(&url, &metric, value, &labels, timestamp),
        Commands::Query {
            url,
            matchers,
            range,
            start,
            end,
            format,
        } => cmd_query(&url, &matchers, &range, start, end, &format),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `redts key <metric> [labels...]`.
fn cmd_key(metric: &str, labels: &[String]) -> CliResult<()> {
    let labels = build_labels(metric, labels)?;
    let (key, reference) = key_for(&labels)?;
    println!("key: {key}");
    println!("ref: {reference:016x}");
    Ok(())
}

/// Implements `redts write <url> <metric> <value> [labels...]`.
fn cmd_write(
    url: &str,
    metric: &str,
    value: f64,
    labels: &[String],
    timestamp: Option<i64>,
) -> CliResult<()> {
    let labels = build_labels(metric, labels)?;
    let timestamp = match timestamp {
        Some(ts) => ts,
        None => now_millis()?,
    };

    let storage = Storage::open(Some(url))?.ok_or("no connection URL given")?;
    {
        let mut app = storage.appender()?;
        let reference = app.add(&labels, timestamp, value)?;
        app.commit()?;
        tracing::debug!(reference, timestamp, "sample committed");
    }

    let stats = storage.stats();
    storage.close()?;
    if stats.shed > 0 {
        return Err("submission queue full, sample dropped".into());
    }

    println!("wrote {labels} @ {timestamp} = {value}");
    Ok(())
}

/// Implements `redts query <url> <matchers...>`.
fn cmd_query(
    url: &str,
    matchers: &[String],
    range: &str,
    start: Option<i64>,
    end: Option<i64>,
    format: &OutputFormat,
) -> CliResult<()> {
    let matchers = matchers
        .iter()
        .map(|m| parse_matcher(m))
        .collect::<CliResult<Vec<_>>>()?;

    let end = match end {
        Some(end) => end,
        None => now_millis()?,
    };
    let start = match start {
        Some(start) => start,
        None => {
            let range = i64::try_from(parse_duration(range)?.as_millis())?;
            end.saturating_sub(range)
        }
    };

    let storage = Storage::open(Some(url))?.ok_or("no connection URL given")?;
    let set = storage.querier().select(start, end, &matchers)?;
    tracing::debug!(start, end, series = set.len(), "query returned");

    match format {
        OutputFormat::Csv => {
            println!("series,timestamp_ms,value");
            for series in set.into_results() {
                for sample in series.samples() {
                    println!("{},{},{}", series.key(), sample.timestamp, sample.value);
                }
            }
        }
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = set
                .into_results()
                .iter()
                .map(|series| {
                    serde_json::json!({
                        "key": series.key(),
                        "labels": series.labels(),
                        "samples": series.samples(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    storage.close()?;
    Ok(())
}

/// Builds a label set with the metric name first, followed by `name=value`
/// arguments in the order given.
fn build_labels(metric: &str, labels: &[String]) -> CliResult<Labels> {
    let mut set = Labels::default();
    set.push(Label::new(redts::labels::METRIC_NAME, metric));
    for raw in labels {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("invalid label '{raw}', expected name=value"))?;
        set.push(Label::new(name, unquote(value)));
    }
    Ok(set)
}

/// Parses `name=value`, `name!=value`, `name=~regex` or `name!~regex`.
fn parse_matcher(raw: &str) -> CliResult<Matcher> {
    let idx = raw
        .find(['=', '!'])
        .filter(|&i| i > 0)
        .ok_or_else(|| format!("invalid matcher '{raw}'"))?;
    let (name, rest) = raw.split_at(idx);

    let (kind, value) = if let Some(v) = rest.strip_prefix("!=") {
        (MatchType::NotEqual, v)
    } else if let Some(v) = rest.strip_prefix("!~") {
        (MatchType::NotRegex, v)
    } else if let Some(v) = rest.strip_prefix("=~") {
        (MatchType::Regex, v)
    } else if let Some(v) = rest.strip_prefix('=') {
        (MatchType::Equal, v)
    } else {
        return Err(format!("invalid matcher '{raw}'").into());
    };

    Ok(Matcher::new(kind, name, unquote(value)))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parses a duration string like "1h", "30m", "7d", "60s".
fn parse_duration(s: &str) -> CliResult<Duration> {
    let s = s.trim();
    let Some((idx, _)) = s.char_indices().last() else {
        return Err("empty duration string".into());
    };

    let (num_str, unit) = s.split_at(idx);
    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid duration: '{s}'"))?;

    let scale: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(format!("unknown duration unit '{unit}' in '{s}'").into()),
    };
    let secs = num
        .checked_mul(scale)
        .ok_or_else(|| format!("duration out of range: '{s}'"))?;
    Ok(Duration::from_secs(secs))
}

fn now_millis() -> CliResult<i64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(i64::try_from(elapsed.as_millis())?)
}
