//! CouchDB 2.x extractor
//!
//! Node statistics come back as a tree. Leaves are typed nodes:
//!
//! ```json
//! {"couchdb": {"open_databases": {"type": "counter", "value": 12},
//!              "request_time": {"type": "histogram",
//!                               "value": {"min": 1, "percentile": [[50, 12], [90, 45]],
//!                                         "histogram": [[...]]}}}}
//! ```
//!
//! Untyped objects are categories and are walked recursively, extending the
//! dotted metric prefix with their key.

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{database_names, is_empty_document, METRIC_PREFIX};
use crate::collector::{escape_db_name, join_url, CouchClient};
use crate::config::Instance;
use crate::emitter::{db_tag, instance_tag, MetricSink};
use crate::error::{CheckError, CheckResult};

/// Top-level database fields reported as `couchdb.by_db.<field>`
const DB_FIELDS: &[&str] = &["purge_seq", "doc_del_count", "doc_count"];

/// CouchDB 2.x extractor
#[derive(Debug, Default)]
pub struct CouchDb2;

impl CouchDb2 {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip_all, fields(node = ?instance.name))]
    pub async fn check(
        &self,
        client: &CouchClient,
        instance: &Instance,
        sink: &mut dyn MetricSink,
    ) -> CheckResult<()> {
        let server = instance.server.as_deref().ok_or(CheckError::MissingServer)?;
        let name = instance.name.as_deref().ok_or(CheckError::MissingName)?;
        let tags = vec![instance_tag(name)];

        let stats = self
            .get_node_stats(client, server, name, instance, &tags, sink)
            .await?;
        flatten_stats(&stats, METRIC_PREFIX, &tags, sink);

        let url = join_url(server, "/_all_dbs")?;
        let all_dbs = database_names(&url, client.get(&url, instance, &tags, false, sink).await?)?;

        for db in all_dbs {
            let wanted = instance
                .db_whitelist
                .as_ref()
                .map_or(true, |whitelist| whitelist.contains(&db));
            if !wanted {
                continue;
            }

            let db_tags = vec![instance_tag(name), db_tag(&db)];
            let url = join_url(server, &escape_db_name(&db))?;
            let doc = client.get(&url, instance, &db_tags, false, sink).await?;
            build_db_metrics(&doc, &db_tags, sink);
        }

        Ok(())
    }

    async fn get_node_stats(
        &self,
        client: &CouchClient,
        server: &str,
        name: &str,
        instance: &Instance,
        tags: &[String],
        sink: &mut dyn MetricSink,
    ) -> CheckResult<Value> {
        let url = join_url(server, &format!("/_node/{}/_stats", name))?;

        // The node stats call decides the service check for the run
        let stats = client.get(&url, instance, tags, true, sink).await?;
        if is_empty_document(&stats) {
            return Err(CheckError::NoStats {
                url: url.to_string(),
            });
        }

        Ok(stats)
    }
}

/// Flatten a node statistics tree into gauges named `<prefix>.<path>`
pub fn flatten_stats(data: &Value, prefix: &str, tags: &[String], sink: &mut dyn MetricSink) {
    let Some(entries) = data.as_object() else {
        return;
    };

    for (key, value) in entries {
        let Some(node) = value.as_object() else {
            continue;
        };

        match node.get("type") {
            Some(kind) if kind == "histogram" => {
                emit_histogram(&format!("{}.{}", prefix, key), node, tags, sink);
            }
            Some(_) => match node.get("value").and_then(Value::as_f64) {
                Some(v) => sink.gauge(&format!("{}.{}", prefix, key), v, tags),
                None => debug!(prefix, key = %key, "Non-numeric stat value, skipping"),
            },
            None => flatten_stats(value, &format!("{}.{}", prefix, key), tags, sink),
        }
    }
}

fn emit_histogram(
    name: &str,
    node: &Map<String, Value>,
    tags: &[String],
    sink: &mut dyn MetricSink,
) {
    let Some(fields) = node.get("value").and_then(Value::as_object) else {
        debug!(name, "Histogram without a value map, skipping");
        return;
    };

    for (metric, value) in fields {
        match metric.as_str() {
            "histogram" => {}
            "percentile" => {
                for pair in value.as_array().into_iter().flatten() {
                    match pair.as_array().map(Vec::as_slice) {
                        Some([label, v, ..]) => match v.as_f64() {
                            Some(v) => sink.gauge(
                                &format!("{}.percentile.{}", name, percentile_label(label)),
                                v,
                                tags,
                            ),
                            None => debug!(name, "Non-numeric percentile, skipping"),
                        },
                        _ => debug!(name, "Malformed percentile pair, skipping"),
                    }
                }
            }
            _ => match value.as_f64() {
                Some(v) => sink.gauge(&format!("{}.{}", name, metric), v, tags),
                None => debug!(name, metric = %metric, "Non-numeric histogram field, skipping"),
            },
        }
    }
}

/// `50` -> "50", `99.9` -> "99.9", strings verbatim
fn percentile_label(label: &Value) -> String {
    match label {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_db_metrics(doc: &Value, tags: &[String], sink: &mut dyn MetricSink) {
    if let Some(sizes) = doc.get("sizes").and_then(Value::as_object) {
        for (key, value) in sizes {
            if let Some(v) = value.as_f64() {
                sink.gauge(&format!("{}.by_db.{}_size", METRIC_PREFIX, key), v, tags);
            }
        }
    }

    for field in DB_FIELDS {
        match doc.get(*field).and_then(Value::as_f64) {
            Some(v) => sink.gauge(&format!("{}.by_db.{}", METRIC_PREFIX, field), v, tags),
            None => debug!(field, "Database field missing or non-numeric, skipping"),
        }
    }
}
