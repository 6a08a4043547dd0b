//! CouchDB 1.x extractor
//!
//! Reads the flat runtime statistics document (`/_stats/`), where every
//! leaf is `{"current": <number|null>, ...}` grouped by category, and the
//! per-database info documents for up to [`MAX_DATABASES`] databases.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{database_names, is_empty_document, METRIC_PREFIX};
use crate::collector::{escape_db_name, join_url, CouchClient};
use crate::config::Instance;
use crate::emitter::{db_tag, instance_tag, MetricSink};
use crate::error::{CheckError, CheckResult};

/// Upper bound on databases polled per run
pub const MAX_DATABASES: usize = 50;

/// Per-database fields reported as `couchdb.by_db.<field>`
const DB_FIELDS: &[&str] = &["doc_count", "disk_size"];

/// CouchDB 1.x extractor
///
/// Holds the blacklist of every server it has polled. Entries are only
/// ever added; a restart clears them.
#[derive(Debug, Default)]
pub struct CouchDb1 {
    db_blacklist: HashMap<String, HashSet<String>>,
}

/// Documents collected during one run
struct CouchDbData {
    stats: Value,
    databases: BTreeMap<String, Value>,
}

impl CouchDb1 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Databases excluded from polling for `server`
    pub fn blacklist(&self, server: &str) -> Option<&HashSet<String>> {
        self.db_blacklist.get(server)
    }

    #[instrument(skip_all, fields(server = ?instance.server))]
    pub async fn check(
        &mut self,
        client: &CouchClient,
        instance: &Instance,
        sink: &mut dyn MetricSink,
    ) -> CheckResult<()> {
        let server = instance.server.as_deref().ok_or(CheckError::MissingServer)?;
        let tags = vec![instance_tag(server)];

        let data = self.get_data(client, server, instance, &tags, sink).await?;
        build_metrics(&data, &tags, sink);
        Ok(())
    }

    async fn get_data(
        &mut self,
        client: &CouchClient,
        server: &str,
        instance: &Instance,
        tags: &[String],
        sink: &mut dyn MetricSink,
    ) -> CheckResult<CouchDbData> {
        let url = join_url(server, "/_stats/")?;
        let stats = client.get(&url, instance, tags, true, sink).await?;
        if is_empty_document(&stats) {
            return Err(CheckError::NoStats {
                url: url.to_string(),
            });
        }

        let url = join_url(server, "/_all_dbs/")?;
        let all_dbs = database_names(&url, client.get(&url, instance, tags, false, sink).await?)?;

        let blacklist = self.db_blacklist.entry(server.to_string()).or_default();
        blacklist.extend(instance.db_blacklist.iter().cloned());

        let mut databases = select_databases(all_dbs, blacklist, instance.db_whitelist.as_deref());
        if databases.len() > MAX_DATABASES {
            let message = format!(
                "Too many databases, only the first {} will be checked.",
                MAX_DATABASES
            );
            warn!(found = databases.len(), "{}", message);
            sink.warning(&message);
            databases.truncate(MAX_DATABASES);
        }

        let mut collected = BTreeMap::new();
        for db_name in databases {
            let url = join_url(server, &escape_db_name(&db_name))?;
            match client.get(&url, instance, tags, false, sink).await {
                Ok(Value::Null) => {
                    debug!(db = %db_name, "Empty database document, skipping");
                }
                Ok(db_stats) => {
                    collected.insert(db_name, db_stats);
                }
                Err(e) if e.is_access_denied() => {
                    let message = format!(
                        "Database {} is not readable by the configured user. It will be added to the blacklist. Please restart the agent to clear.",
                        db_name
                    );
                    warn!(db = %db_name, status = ?e.http_status(), "{}", message);
                    sink.warning(&message);
                    blacklist.insert(db_name);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(CouchDbData {
            stats,
            databases: collected,
        })
    }
}

/// Databases to poll: `all_dbs` minus `blacklist`, intersected with the
/// whitelist when one is configured
///
/// An empty whitelist counts as no whitelist. The result follows hash-set
/// iteration order, so which databases survive the [`MAX_DATABASES`] cap is
/// unspecified.
pub fn select_databases(
    all_dbs: Vec<String>,
    blacklist: &HashSet<String>,
    whitelist: Option<&[String]>,
) -> Vec<String> {
    let whitelist: Option<HashSet<&str>> = whitelist
        .filter(|w| !w.is_empty())
        .map(|w| w.iter().map(String::as_str).collect());

    let selected: HashSet<String> = all_dbs
        .into_iter()
        .filter(|db| !blacklist.contains(db))
        .filter(|db| {
            whitelist
                .as_ref()
                .map_or(true, |allowed| allowed.contains(db.as_str()))
        })
        .collect();

    selected.into_iter().collect()
}

fn build_metrics(data: &CouchDbData, tags: &[String], sink: &mut dyn MetricSink) {
    if let Some(categories) = data.stats.as_object() {
        for (category, stats) in categories {
            let Some(stats) = stats.as_object() else {
                continue;
            };
            for (metric, value) in stats {
                match value.get("current").and_then(Value::as_f64) {
                    Some(current) => sink.gauge(
                        &format!("{}.{}.{}", METRIC_PREFIX, category, metric),
                        current,
                        tags,
                    ),
                    None => debug!(category = %category, metric = %metric, "No current value"),
                }
            }
        }
    }

    for (db_name, db_stats) in &data.databases {
        let mut db_tags = tags.to_vec();
        db_tags.push(db_tag(db_name));

        for field in DB_FIELDS {
            if let Some(value) = db_stats.get(*field).and_then(Value::as_f64) {
                sink.gauge(
                    &format!("{}.by_db.{}", METRIC_PREFIX, field),
                    value,
                    &db_tags,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Aggregator;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn test_select_databases_blacklist() {
        let blacklist: HashSet<String> = names(&["_replicator"]).into_iter().collect();
        let selected = select_databases(names(&["_users", "_replicator", "kennel"]), &blacklist, None);
        assert_eq!(sorted(selected), names(&["_users", "kennel"]));
    }

    #[test]
    fn test_select_databases_whitelist() {
        let whitelist = names(&["_users"]);
        let selected = select_databases(
            names(&["_users", "_replicator", "kennel"]),
            &HashSet::new(),
            Some(whitelist.as_slice()),
        );
        assert_eq!(selected, names(&["_users"]));
    }

    #[test]
    fn test_select_databases_blacklist_wins_over_whitelist() {
        let whitelist = names(&["_users", "kennel"]);
        let blacklist: HashSet<String> = names(&["kennel"]).into_iter().collect();
        let selected = select_databases(
            names(&["_users", "_replicator", "kennel"]),
            &blacklist,
            Some(whitelist.as_slice()),
        );
        assert_eq!(selected, names(&["_users"]));
    }

    #[test]
    fn test_select_databases_empty_whitelist_means_all() {
        let selected = select_databases(names(&["a", "b"]), &HashSet::new(), Some(&[] as &[String]));
        assert_eq!(sorted(selected), names(&["a", "b"]));
    }

    #[test]
    fn test_build_metrics_skips_null_current() {
        let data = CouchDbData {
            stats: json!({
                "couchdb": {
                    "open_databases": {"current": 5, "count": 1},
                    "request_time": {"current": null, "count": 0}
                },
                "httpd_status_codes": {
                    "200": {"current": 42.5}
                }
            }),
            databases: BTreeMap::new(),
        };
        let tags = vec![instance_tag("http://localhost:5984")];
        let mut sink = Aggregator::new();

        build_metrics(&data, &tags, &mut sink);

        assert_eq!(sink.gauges.len(), 2);
        assert_eq!(
            sink.gauge_value("couchdb.couchdb.open_databases", &["instance:http://localhost:5984"]),
            Some(5.0)
        );
        assert_eq!(
            sink.gauge_value("couchdb.httpd_status_codes.200", &["instance:http://localhost:5984"]),
            Some(42.5)
        );
        assert_eq!(sink.gauges_named("couchdb.couchdb.request_time").count(), 0);
    }

    #[test]
    fn test_build_metrics_by_db() {
        let mut databases = BTreeMap::new();
        databases.insert(
            "kennel".to_string(),
            json!({"db_name": "kennel", "doc_count": 3, "disk_size": 8290, "doc_del_count": 1}),
        );
        databases.insert(
            "_users".to_string(),
            json!({"doc_count": 1, "disk_size": null}),
        );
        let data = CouchDbData {
            stats: json!({"couchdb": {}}),
            databases,
        };
        let tags = vec![instance_tag("http://localhost:5984")];
        let mut sink = Aggregator::new();

        build_metrics(&data, &tags, &mut sink);

        let kennel = ["instance:http://localhost:5984", "db:kennel"];
        assert_eq!(sink.gauge_value("couchdb.by_db.doc_count", &kennel), Some(3.0));
        assert_eq!(sink.gauge_value("couchdb.by_db.disk_size", &kennel), Some(8290.0));

        let users = ["instance:http://localhost:5984", "db:_users"];
        assert_eq!(sink.gauge_count("couchdb.by_db.doc_count", &users), 1);
        assert_eq!(sink.gauge_count("couchdb.by_db.disk_size", &users), 0);
        assert_eq!(sink.gauges_named("couchdb.by_db.doc_del_count").count(), 0);
    }
}
