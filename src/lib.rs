//! Tabulates space-delimited `key=value` application logs and reports
//! per-endpoint response-time statistics as JSON lines.
//!
//! Parsing is schema-on-read: the column set is discovered from the first
//! well-formed line instead of being declared up front.
//!
//! Example:
//!
//! Given the log line
//!
//! at=info method=GET path=/api/users/7/get_messages connect=10ms service=20ms dyno=web.1
//!
//! the first two tokens are preamble and dropped, and the rest become fields
//!
//! {path: /api/users/7/get_messages, connect: 10, service: 20, dyno: web.1}
//!
//! with the `ms` unit stripped from the two timing fields. Records are then
//! grouped per endpoint by matching the endpoint name against `path`, and
//! each non-empty group is reduced to one report line:
//!
//! {"request_identifier": "GET /api/users/{user_id}/get_messages", "called": 1,
//!  "response_time_mean": 30, "response_time_median": 30, "dyno_mode": "web.1"}
//!
//! All statistics are computed in exact decimal arithmetic, never through
//! binary floats.
#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// The endpoints reported on, in report order.
pub const DEFAULT_METHODS: [&str; 4] = [
    "count_pending_messages",
    "get_messages",
    "get_friends_progress",
    "get_friends_score",
];

// Fields carrying an `ms` unit suffix in the raw log.
const TIMING_FIELDS: [&str; 2] = ["connect", "service"];

/// Errors raised while computing or serializing an endpoint report.
#[derive(Debug, Error)]
pub enum TallyError {
    /// A timing field could not be read as an integer while computing a
    /// median. The mean path tolerates this; the median path does not.
    #[error("non-numeric value [{value}] in timing field [{field}]")]
    NonNumericTiming {
        /// Name of the offending field, `connect` or `service`.
        field: String,
        /// The raw value as stored in the record.
        value: String,
    },
    /// A report record failed to serialize.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A single parsed log line: field name to field value.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    fields: HashMap<String, String>,
}

impl LogRecord {
    /// The value stored for `name`, or the empty string when the line had no
    /// such field.
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    // Strict integer read, used by the median path only.
    fn timing(&self, field: &str) -> Result<i64, TallyError> {
        let value = self.field(field);
        value.parse().map_err(|_| TallyError::NonNumericTiming {
            field: String::from(field),
            value: String::from(value),
        })
    }
}

/// Parsed log lines in tabular form.
///
/// Columns are the field names of the first parsed line, in encounter order.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LogTable {
    columns: Vec<String>,
    rows: Vec<LogRecord>,
}

impl LogTable {
    /// Parse raw log lines into a table.
    ///
    /// Each line is split on whitespace, the first two tokens are discarded
    /// as preamble, and every remaining token is split on its first `=` into
    /// a field. A token with no `=` becomes a field with an empty value.
    /// Zero-length lines produce no record. Parsing never fails.
    ///
    /// ```
    /// let table = logtally::LogTable::parse(vec![
    ///     "at=info method=GET path=/api/users/7/get_messages connect=10ms service=20ms dyno=web.1",
    /// ]);
    /// assert_eq!(table.len(), 1);
    /// assert_eq!(table.rows()[0].field("connect"), "10");
    /// assert_eq!(table.rows()[0].field("at"), "");
    /// ```
    pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> LogTable {
        let mut table = LogTable::default();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let first_line = table.rows.is_empty();
            let mut record = LogRecord::default();
            for token in line.split_whitespace().skip(2) {
                let (key, value) = match token.split_once('=') {
                    Some((key, value)) => (key, value),
                    None => (token, ""),
                };
                let value = if TIMING_FIELDS.contains(&key) {
                    value.strip_suffix("ms").unwrap_or(value)
                } else {
                    value
                };
                // Columns come from the first parsed line only.
                if first_line && !table.columns.iter().any(|c| c == key) {
                    table.columns.push(String::from(key));
                }
                record.fields.insert(String::from(key), String::from(value));
            }
            table.rows.push(record);
        }
        debug!(
            rows = table.rows.len(),
            columns = table.columns.len(),
            "parsed log table"
        );
        table
    }

    /// Column names discovered from the first parsed line, in encounter
    /// order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All parsed records, in input order.
    pub fn rows(&self) -> &[LogRecord] {
        &self.rows
    }

    /// Number of parsed records.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records whose `path` field contains `method` as a substring, in input
    /// order.
    ///
    /// A path containing several method names matches all of them; the four
    /// production endpoints share no substrings.
    pub fn matching(&self, method: &str) -> Vec<&LogRecord> {
        self.rows
            .iter()
            .filter(|r| r.field("path").contains(method))
            .collect()
    }
}

/// Aggregate response-time statistics over one endpoint's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStats {
    called: usize,
    mean: Decimal,
    median: Decimal,
    dyno_mode: String,
}

impl EndpointStats {
    /// Compute all statistics over a non-empty record subset.
    ///
    /// # Panics
    ///
    /// Panics on an empty subset (decimal division by zero). Callers filter
    /// empty groups out first; see [`Analyzer::reports`].
    pub fn compute(records: &[&LogRecord]) -> Result<EndpointStats, TallyError> {
        Ok(EndpointStats {
            called: records.len(),
            mean: EndpointStats::mean(records),
            median: EndpointStats::median(records)?,
            dyno_mode: EndpointStats::dyno_mode(records),
        })
    }

    /// Mean of `connect + service` over the subset, at full decimal
    /// precision.
    ///
    /// A missing or non-numeric timing value counts as 0. This is
    /// deliberately more lenient than [`EndpointStats::median`].
    pub fn mean(records: &[&LogRecord]) -> Decimal {
        let connect: i64 = records
            .iter()
            .map(|r| r.field("connect").parse().unwrap_or(0))
            .sum();
        let service: i64 = records
            .iter()
            .map(|r| r.field("service").parse().unwrap_or(0))
            .sum();
        Decimal::from(connect + service) / Decimal::from(records.len())
    }

    /// Median of per-record `connect + service` sums.
    ///
    /// A missing or non-numeric timing value in any record fails the whole
    /// computation. For an even-sized subset the median is the exact decimal
    /// mean of the two central sums.
    pub fn median(records: &[&LogRecord]) -> Result<Decimal, TallyError> {
        let mut times = Vec::with_capacity(records.len());
        for record in records {
            times.push(record.timing("connect")? + record.timing("service")?);
        }
        times.sort_unstable();
        let mid = times.len() / 2;
        if times.len() % 2 == 1 {
            Ok(Decimal::from(times[mid]))
        } else {
            Ok(Decimal::from(times[mid - 1] + times[mid]) / Decimal::TWO)
        }
    }

    /// The most frequent `dyno` value in the subset.
    ///
    /// Ties resolve to the dyno encountered first in record order.
    pub fn dyno_mode(records: &[&LogRecord]) -> String {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in records {
            *counts.entry(record.field("dyno")).or_insert(0) += 1;
        }
        let mut best = "";
        let mut best_count = 0;
        for record in records {
            let dyno = record.field("dyno");
            let count = counts[dyno];
            if count > best_count {
                best = dyno;
                best_count = count;
            }
        }
        String::from(best)
    }

    /// How many records the subset held.
    pub fn called(&self) -> usize {
        self.called
    }
}

/// One line of the rendered report.
///
/// Serializes with the fields in exactly this order; the two decimal fields
/// emit as JSON numbers with their full decimal digits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointReport {
    /// Request route the endpoint is served under.
    pub request_identifier: String,
    /// Number of matching log records.
    pub called: usize,
    /// Mean of `connect + service` over the matching records.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub response_time_mean: Decimal,
    /// Median of per-record `connect + service` sums.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub response_time_median: Decimal,
    /// The dyno that served the most matching requests.
    pub dyno_mode: String,
}

impl EndpointReport {
    /// Build the report record for `method` from its computed statistics.
    pub fn new(method: &str, stats: &EndpointStats) -> EndpointReport {
        EndpointReport {
            request_identifier: format!("GET /api/users/{{user_id}}/{}", method),
            called: stats.called,
            response_time_mean: stats.mean,
            response_time_median: stats.median,
            dyno_mode: stats.dyno_mode.clone(),
        }
    }
}

/// Computes the per-endpoint report over a parsed log table.
///
/// Holds the endpoint list to report on; [`DEFAULT_METHODS`] unless
/// overridden through the builder.
#[derive(Debug, Clone)]
pub struct Analyzer {
    methods: Vec<String>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer {
            methods: DEFAULT_METHODS.iter().map(|m| String::from(*m)).collect(),
        }
    }
}

impl Analyzer {
    /// Creates a new Analyzer reporting on [`DEFAULT_METHODS`].
    pub fn new() -> Self {
        Analyzer::default()
    }

    /// Override the endpoint list. Reports keep the order given here.
    pub fn methods(mut self, methods: Vec<&str>) -> Self {
        self.methods = methods.iter().map(|m| String::from(*m)).collect();
        self
    }

    /// Compute one report per endpoint, in the configured method order.
    ///
    /// Endpoints with no matching records are omitted rather than reported
    /// as zeros. A record with a non-numeric timing field fails the whole
    /// report, including endpoints already computed.
    pub fn reports(&self, table: &LogTable) -> Result<Vec<EndpointReport>, TallyError> {
        let mut reports = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            let records = table.matching(method);
            if records.is_empty() {
                debug!(method = method.as_str(), "no matching records, skipping");
                continue;
            }
            let stats = EndpointStats::compute(&records)?;
            reports.push(EndpointReport::new(method, &stats));
        }
        Ok(reports)
    }

    /// Render the full report as JSON lines, one endpoint per line.
    ///
    /// ```
    /// let table = logtally::LogTable::parse(vec![
    ///     "at=info method=GET path=/api/users/7/get_messages connect=10ms service=20ms dyno=web.1",
    /// ]);
    /// let report = logtally::Analyzer::new().render(&table).expect("report renders");
    /// assert_eq!(
    ///     report,
    ///     "{\"request_identifier\":\"GET /api/users/{user_id}/get_messages\",\
    ///      \"called\":1,\"response_time_mean\":30,\"response_time_median\":30,\
    ///      \"dyno_mode\":\"web.1\"}"
    /// );
    /// ```
    pub fn render(&self, table: &LogTable) -> Result<String, TallyError> {
        let reports = self.reports(table)?;
        let mut lines = Vec::with_capacity(reports.len());
        for report in &reports {
            lines.push(serde_json::to_string(report)?);
        }
        Ok(lines.join("\n"))
    }
}
