//! CouchDB HTTP 수집 모듈
//!
//! Fetches JSON documents from CouchDB endpoints and reports connectivity
//! through the `couchdb.can_connect` service check.
//!
//! # Example
//!
//! ```ignore
//! use couchdb_check::collector::{join_url, CouchClient};
//!
//! let client = CouchClient::new()?;
//! let url = join_url("http://localhost:5984", "/_stats/")?;
//! let stats = client.get(&url, &instance, &tags, true, &mut sink).await?;
//! ```

mod client;

pub use client::CouchClient;

use url::Url;

use crate::error::{CheckError, CheckResult};

/// Resolve `path` against the `server` base URL
///
/// Absolute paths (`/_stats/`) replace the server path; relative ones
/// (an escaped database name) are appended to it.
pub fn join_url(server: &str, path: &str) -> CheckResult<Url> {
    Url::parse(server)
        .and_then(|base| base.join(path))
        .map_err(|e| CheckError::InvalidUrl {
            base: server.to_string(),
            path: path.to_string(),
            reason: e.to_string(),
        })
}

/// Percent-encode a database name for use as a path segment
///
/// No character is left unescaped, `/` included.
pub fn escape_db_name(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}
