//! CouchDB HTTP 클라이언트
//!
//! Connection pooling과 요청별 타임아웃을 지원하는 비동기 HTTP 클라이언트입니다.

use reqwest::header::ACCEPT;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::config::Instance;
use crate::emitter::{MetricSink, ServiceCheckStatus, SERVICE_CHECK_NAME};
use crate::error::{CheckError, CheckResult};

/// CouchDB HTTP 클라이언트
///
/// One client serves every instance; timeout and credentials are applied
/// per request from the instance being checked.
#[derive(Clone)]
pub struct CouchClient {
    client: Client,
}

impl CouchClient {
    /// 새 클라이언트 생성
    pub fn new() -> CheckResult<Self> {
        let client = ClientBuilder::new()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(CheckError::ClientInit)?;

        Ok(Self { client })
    }

    /// GET `url` and return the parsed JSON body
    ///
    /// When `primary` is set, exactly one `couchdb.can_connect` service check
    /// is emitted with `service_check_tags`: OK on a 2xx response, CRITICAL on
    /// timeout, non-2xx status or transport failure. Non-primary calls never
    /// touch the service check.
    #[instrument(skip_all, fields(url = %url, primary = primary))]
    pub async fn get(
        &self,
        url: &Url,
        instance: &Instance,
        service_check_tags: &[String],
        primary: bool,
        sink: &mut dyn MetricSink,
    ) -> CheckResult<Value> {
        debug!("Fetching CouchDB stats");

        let outcome = self.fetch(url, instance).await;

        if primary {
            match &outcome {
                Ok(_) => sink.service_check(
                    SERVICE_CHECK_NAME,
                    ServiceCheckStatus::Ok,
                    service_check_tags,
                    &format!("Connection to {} was successful", url),
                ),
                Err(e) => sink.service_check(
                    SERVICE_CHECK_NAME,
                    ServiceCheckStatus::Critical,
                    service_check_tags,
                    &critical_message(url, e),
                ),
            }
        }

        let body = outcome?;

        serde_json::from_slice(&body).map_err(|e| CheckError::MalformedResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch(&self, url: &Url, instance: &Instance) -> CheckResult<Vec<u8>> {
        let timeout = instance.timeout();

        // Ask for JSON explicitly so failures are not redirected to the web UI
        let mut req = self
            .client
            .get(url.clone())
            .header(ACCEPT, "text/json")
            .timeout(timeout);

        if let Some((username, password)) = instance.credentials() {
            req = req.basic_auth(username, Some(password));
        }

        let response = req
            .send()
            .await
            .map_err(|e| CheckError::from_reqwest(url.as_str(), timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::HttpStatus {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CheckError::from_reqwest(url.as_str(), timeout, e))?;

        Ok(body.to_vec())
    }
}

fn critical_message(url: &Url, err: &CheckError) -> String {
    match err {
        CheckError::Timeout { .. } => format!("Request timeout: {}, {}", url, err),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Aggregator;

    #[test]
    fn test_client_new() {
        assert!(CouchClient::new().is_ok());
    }

    #[test]
    fn test_critical_message() {
        let url = Url::parse("http://localhost:5984/").unwrap();
        let err = CheckError::Timeout {
            url: url.to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(critical_message(&url, &err).starts_with("Request timeout: http://localhost:5984/, "));

        let err = CheckError::HttpStatus {
            url: url.to_string(),
            code: 404,
        };
        assert_eq!(
            critical_message(&url, &err),
            "HTTP error status 404 for http://localhost:5984/"
        );
    }

    #[test]
    fn test_connection_refused_is_transport_failure() {
        // Port 9 (discard) is not expected to be listening on the loopback
        let client = CouchClient::new().unwrap();
        let url = Url::parse("http://127.0.0.1:9/_stats/").unwrap();
        let instance = Instance::new("http://127.0.0.1:9").with_timeout(2.0);
        let tags = vec!["instance:http://127.0.0.1:9".to_string()];
        let mut sink = Aggregator::new();

        let result = tokio_test::block_on(client.get(&url, &instance, &tags, true, &mut sink));

        assert!(matches!(result, Err(CheckError::Transport { .. })));
        assert_eq!(
            sink.service_checks_with_status(ServiceCheckStatus::Critical)
                .count(),
            1
        );
    }
}
