//! CouchDB check
//!
//! [`CouchDbCheck`] is the entry point the scheduler calls once per run. On
//! the first run it probes the server root for its version and picks the
//! extractor matching that API generation:
//!
//! - `1.x` - [`CouchDb1`]: flat `/_stats/` document plus per-database stats,
//!   filtered through a self-healing blacklist
//! - `2.x` - [`CouchDb2`]: nested `/_node/<name>/_stats` document plus
//!   per-database sizes, filtered through a whitelist
//!
//! The chosen extractor is kept for the lifetime of the check object.

mod v1;
mod v2;

pub use v1::{select_databases, CouchDb1, MAX_DATABASES};
pub use v2::{flatten_stats, CouchDb2};

use serde_json::Value;
use tracing::{info, instrument};
use url::Url;

use crate::collector::{join_url, CouchClient};
use crate::config::Instance;
use crate::emitter::{instance_tag, MetricSink};
use crate::error::{CheckError, CheckResult};

/// Prefix shared by every emitted metric
pub const METRIC_PREFIX: &str = "couchdb";

/// Stat extractor bound to one CouchDB API generation
#[derive(Debug)]
pub enum Extractor {
    V1(CouchDb1),
    V2(CouchDb2),
}

impl Extractor {
    /// Pick the extractor for a server version string
    ///
    /// # Errors
    /// `UnsupportedVersion` for anything but `1.*` and `2.*`
    pub fn for_version(version: &str) -> CheckResult<Self> {
        if version.starts_with("1.") {
            Ok(Extractor::V1(CouchDb1::new()))
        } else if version.starts_with("2.") {
            Ok(Extractor::V2(CouchDb2::new()))
        } else {
            Err(CheckError::UnsupportedVersion(version.to_string()))
        }
    }

    /// API generation label
    pub fn generation(&self) -> &'static str {
        match self {
            Extractor::V1(_) => "1.x",
            Extractor::V2(_) => "2.x",
        }
    }

    async fn check(
        &mut self,
        client: &CouchClient,
        instance: &Instance,
        sink: &mut dyn MetricSink,
    ) -> CheckResult<()> {
        match self {
            Extractor::V1(extractor) => extractor.check(client, instance, sink).await,
            Extractor::V2(extractor) => extractor.check(client, instance, sink).await,
        }
    }
}

/// Version-dispatching CouchDB check
///
/// Not meant to be driven concurrently: callers serialize runs per check.
pub struct CouchDbCheck {
    client: CouchClient,
    extractor: Option<Extractor>,
}

impl CouchDbCheck {
    /// Create a check with its own HTTP client
    pub fn new() -> CheckResult<Self> {
        Ok(Self::with_client(CouchClient::new()?))
    }

    /// Create a check around an existing client
    pub fn with_client(client: CouchClient) -> Self {
        Self {
            client,
            extractor: None,
        }
    }

    /// The resolved extractor, once a version probe succeeded
    pub fn extractor(&self) -> Option<&Extractor> {
        self.extractor.as_ref()
    }

    /// Run the check once for `instance`
    ///
    /// # Errors
    /// Any fatal condition aborts the run; metrics already handed to `sink`
    /// stay there.
    #[instrument(skip_all, fields(instance = %instance.label()))]
    pub async fn check(
        &mut self,
        instance: &Instance,
        sink: &mut dyn MetricSink,
    ) -> CheckResult<()> {
        let server = instance.server.as_deref().ok_or(CheckError::MissingServer)?;

        let extractor = match self.extractor.take() {
            Some(extractor) => extractor,
            None => probe(&self.client, server, instance, sink).await?,
        };

        self.extractor
            .insert(extractor)
            .check(&self.client, instance, sink)
            .await
    }
}

/// Query the server root and select an extractor from its `version`
async fn probe(
    client: &CouchClient,
    server: &str,
    instance: &Instance,
    sink: &mut dyn MetricSink,
) -> CheckResult<Extractor> {
    let tags = vec![instance_tag(instance.name.as_deref().unwrap_or(server))];
    let url = join_url(server, "")?;

    let root = client.get(&url, instance, &tags, true, sink).await?;
    let version = root
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| CheckError::MalformedResponse {
            url: url.to_string(),
            reason: "missing 'version' field".to_string(),
        })?;

    let extractor = Extractor::for_version(version)?;
    info!(
        version,
        generation = extractor.generation(),
        "Detected CouchDB version"
    );
    Ok(extractor)
}

/// True for a stats document carrying nothing
fn is_empty_document(doc: &Value) -> bool {
    match doc {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Decode an `_all_dbs` response
fn database_names(url: &Url, doc: Value) -> CheckResult<Vec<String>> {
    let malformed = || CheckError::MalformedResponse {
        url: url.to_string(),
        reason: "expected an array of database names".to_string(),
    };

    match doc {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                _ => Err(malformed()),
            })
            .collect(),
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_dispatch() {
        assert!(matches!(
            Extractor::for_version("1.6.0"),
            Ok(Extractor::V1(_))
        ));
        assert!(matches!(
            Extractor::for_version("2.3.1"),
            Ok(Extractor::V2(_))
        ));
        assert!(matches!(
            Extractor::for_version("3.0.0"),
            Err(CheckError::UnsupportedVersion(v)) if v == "3.0.0"
        ));
        assert!(Extractor::for_version("10.1").is_err());
        assert!(Extractor::for_version("").is_err());
    }

    #[test]
    fn test_generation_label() {
        assert_eq!(Extractor::for_version("1.6.1").unwrap().generation(), "1.x");
        assert_eq!(Extractor::for_version("2.0.0").unwrap().generation(), "2.x");
    }

    #[test]
    fn test_empty_document() {
        assert!(is_empty_document(&Value::Null));
        assert!(is_empty_document(&json!({})));
        assert!(!is_empty_document(&json!({"couchdb": {}})));
    }

    #[test]
    fn test_database_names() {
        let url = Url::parse("http://localhost:5984/_all_dbs").unwrap();
        assert_eq!(
            database_names(&url, json!(["_users", "kennel"])).unwrap(),
            vec!["_users".to_string(), "kennel".to_string()]
        );
        assert!(database_names(&url, json!({"error": "x"})).is_err());
        assert!(database_names(&url, json!(["ok", 1])).is_err());
    }
}
