//! Metric emission
//!
//! The check never talks to a metrics backend directly. Everything it produces
//! goes through a [`MetricSink`]: gauges tagged with `key:value` strings, the
//! `couchdb.can_connect` service check, and non-fatal warnings.
//!
//! [`Aggregator`] is the in-process sink used by the runner and the tests. It
//! stamps each gauge with the unix time at which it was emitted.

pub mod formatter;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

pub use formatter::Formatter;

/// Name of the connectivity service check
pub const SERVICE_CHECK_NAME: &str = "couchdb.can_connect";

/// Service check outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceCheckStatus {
    /// Endpoint reachable
    Ok,
    /// Endpoint failed
    Critical,
}

impl ServiceCheckStatus {
    /// Status label as shown to operators
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCheckStatus::Ok => "OK",
            ServiceCheckStatus::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for ServiceCheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of everything a check run produces
pub trait MetricSink {
    /// Submit a gauge
    fn gauge(&mut self, name: &str, value: f64, tags: &[String]);

    /// Submit a service check status
    fn service_check(
        &mut self,
        name: &str,
        status: ServiceCheckStatus,
        tags: &[String],
        message: &str,
    );

    /// Report a non-fatal problem
    fn warning(&mut self, message: &str);
}

/// A recorded gauge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeSample {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    /// Unix timestamp (seconds) at emission
    pub timestamp: u64,
}

/// A recorded service check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCheck {
    pub name: String,
    pub status: ServiceCheckStatus,
    pub tags: Vec<String>,
    pub message: String,
}

/// In-memory sink
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregator {
    pub gauges: Vec<GaugeSample>,
    pub service_checks: Vec<ServiceCheck>,
    pub warnings: Vec<String>,
}

impl Aggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Gauges with the given name
    pub fn gauges_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a GaugeSample> {
        self.gauges.iter().filter(move |g| g.name == name)
    }

    /// Number of gauges with `name` whose tags are exactly `tags` (any order)
    pub fn gauge_count(&self, name: &str, tags: &[&str]) -> usize {
        self.gauges_named(name)
            .filter(|g| same_tags(&g.tags, tags))
            .count()
    }

    /// Value of the first gauge matching `name` and `tags`
    pub fn gauge_value(&self, name: &str, tags: &[&str]) -> Option<f64> {
        self.gauges_named(name)
            .find(|g| same_tags(&g.tags, tags))
            .map(|g| g.value)
    }

    /// Service checks with the given status
    pub fn service_checks_with_status(
        &self,
        status: ServiceCheckStatus,
    ) -> impl Iterator<Item = &ServiceCheck> {
        self.service_checks.iter().filter(move |s| s.status == status)
    }

    /// Forget everything recorded so far
    pub fn clear(&mut self) {
        self.gauges.clear();
        self.service_checks.clear();
        self.warnings.clear();
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.service_checks.is_empty() && self.warnings.is_empty()
    }
}

fn same_tags(recorded: &[String], expected: &[&str]) -> bool {
    recorded.len() == expected.len() && expected.iter().all(|t| recorded.iter().any(|r| r == t))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl MetricSink for Aggregator {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String]) {
        self.gauges.push(GaugeSample {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
            timestamp: unix_now(),
        });
    }

    fn service_check(
        &mut self,
        name: &str,
        status: ServiceCheckStatus,
        tags: &[String],
        message: &str,
    ) {
        self.service_checks.push(ServiceCheck {
            name: name.to_string(),
            status,
            tags: tags.to_vec(),
            message: message.to_string(),
        });
    }

    fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}

/// Build an `instance:<id>` tag
pub fn instance_tag(id: &str) -> String {
    format!("instance:{}", id)
}

/// Build a `db:<name>` tag
pub fn db_tag(db: &str) -> String {
    format!("db:{}", db)
}
