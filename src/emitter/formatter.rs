//! Run output rendering
//!
//! Renders what an [`Aggregator`] collected during a check run. Text output
//! is one line per gauge:
//!
//! ```text
//! <metric_name> <value> <tag1>,<tag2>,...
//! ```
//!
//! followed by one line per service check and warning. JSON and YAML dump
//! the aggregator as-is.

use super::Aggregator;
use crate::cli::OutputFormat;

/// Output formatter
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    /// Include emission timestamps in text output
    include_timestamp: bool,
}

impl Formatter {
    /// Create a formatter for the given output format
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            include_timestamp: false,
        }
    }

    /// Set whether to include timestamps in text output
    pub fn with_timestamps(mut self, include: bool) -> Self {
        self.include_timestamp = include;
        self
    }

    /// Render a run
    ///
    /// # Errors
    /// Serialization failures for JSON/YAML output
    pub fn format(&self, run: &Aggregator) -> anyhow::Result<String> {
        match self.format {
            OutputFormat::Text => Ok(self.format_text(run)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(run)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(run)?),
        }
    }

    fn format_text(&self, run: &Aggregator) -> String {
        let mut output = String::with_capacity(run.gauges.len() * 80);

        for gauge in &run.gauges {
            output.push_str(&gauge.name);
            output.push(' ');
            output.push_str(&Self::format_value(gauge.value));
            if !gauge.tags.is_empty() {
                output.push(' ');
                output.push_str(&gauge.tags.join(","));
            }
            if self.include_timestamp {
                output.push(' ');
                output.push_str(&gauge.timestamp.to_string());
            }
            output.push('\n');
        }

        for check in &run.service_checks {
            output.push_str(&format!(
                "# SERVICE_CHECK {} {} {} {}\n",
                check.name,
                check.status,
                check.tags.join(","),
                Self::escape_message(&check.message)
            ));
        }

        for warning in &run.warnings {
            output.push_str(&format!("# WARNING {}\n", Self::escape_message(warning)));
        }

        output
    }

    /// Format a numeric value
    ///
    /// Integral values print without a decimal point.
    fn format_value(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value.is_sign_positive() {
                "+Inf".to_string()
            } else {
                "-Inf".to_string()
            }
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            format!("{}", value)
        }
    }

    fn escape_message(message: &str) -> String {
        message.replace('\\', "\\\\").replace('\n', "\\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{MetricSink, ServiceCheckStatus, SERVICE_CHECK_NAME};

    fn sample_run() -> Aggregator {
        let mut run = Aggregator::new();
        let tags = vec!["instance:http://localhost:5984".to_string()];
        run.gauge("couchdb.couchdb.open_databases", 12.0, &tags);
        run.gauge("couchdb.couchdb.request_time", 1.25, &tags);
        run.service_check(
            SERVICE_CHECK_NAME,
            ServiceCheckStatus::Ok,
            &tags,
            "Connection to http://localhost:5984/_stats/ was successful",
        );
        run.warning("Too many databases\nsecond line");
        run
    }

    #[test]
    fn test_text_output() {
        let output = Formatter::new(OutputFormat::Text)
            .format(&sample_run())
            .unwrap();
        assert!(output.contains("couchdb.couchdb.open_databases 12 instance:http://localhost:5984\n"));
        assert!(output.contains("couchdb.couchdb.request_time 1.25 "));
        assert!(output.contains("# SERVICE_CHECK couchdb.can_connect OK"));
        assert!(output.contains("# WARNING Too many databases\\nsecond line"));
    }

    #[test]
    fn test_json_output() {
        let output = Formatter::new(OutputFormat::Json)
            .format(&sample_run())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["gauges"].as_array().map(|a| a.len()), Some(2));
        assert_eq!(parsed["service_checks"][0]["status"], "OK");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(Formatter::format_value(42.0), "42");
        assert_eq!(Formatter::format_value(0.5), "0.5");
        assert_eq!(Formatter::format_value(f64::NAN), "NaN");
        assert_eq!(Formatter::format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_timestamps_in_text() {
        let run = sample_run();
        let ts = run.gauges[0].timestamp.to_string();
        let output = Formatter::new(OutputFormat::Text)
            .with_timestamps(true)
            .format(&run)
            .unwrap();
        assert!(output.lines().next().unwrap().ends_with(&ts));
    }
}
