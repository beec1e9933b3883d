use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data::{Record, TimeWindow};

/// Equality filter applied next to the time range: `key` must be one of `values`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub key: String,
    pub values: Vec<String>,
}

/// What to retrieve, independent of the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Index (or index pattern) to search
    pub index: String,
    /// Records per backend page
    pub page_size: usize,
    /// Hard ceiling when a page has to be enlarged
    pub max_page_size: usize,
    /// Field used for range filtering and ascending sort
    pub range_field: String,
    pub terms: Vec<Term>,
}

/// A single bounded query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest<'a> {
    pub index: &'a str,
    pub range_field: &'a str,
    pub window: TimeWindow,
    pub terms: &'a [Term],
    pub size: usize,
}

impl<'a> SearchRequest<'a> {
    pub fn new(config: &'a RetrievalConfig, window: TimeWindow, size: usize) -> Self {
        Self {
            index: &config.index,
            range_field: &config.range_field,
            window,
            terms: &config.terms,
            size,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Number of documents matching the query, regardless of page size
    pub total: usize,
    /// At most `size` records, ascending by the range field
    pub records: Vec<Record>,
}

/// A query backend bounded by page size
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SearchError>;
}

/// Elasticsearch `_search` client
#[derive(Debug, Clone)]
pub struct ElasticClient {
    http_client: reqwest::Client,
    addresses: Vec<String>,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticClient {
    pub fn new(
        addresses: Vec<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        let username = username.into();
        Ok(Self {
            http_client,
            addresses: addresses
                .into_iter()
                .map(|a| a.trim_end_matches('/').to_string())
                .collect(),
            username: (!username.is_empty()).then_some(username),
            password: Some(password.into()).filter(|p| !p.is_empty()),
        })
    }

    /// Query one node
    async fn search_on(
        &self,
        addr: &str,
        request: &SearchRequest<'_>,
    ) -> Result<SearchPage, SearchError> {
        let url = format!("{}/{}/_search", addr, request.index);
        let sort = format!("{}:asc", request.range_field);
        let size = request.size.to_string();

        let mut builder = self
            .http_client
            .post(&url)
            .query(&[
                ("size", size.as_str()),
                ("sort", sort.as_str()),
                ("track_total_hits", "true"),
            ])
            .json(&build_search_body(request));

        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_deref());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        if !status.is_success() {
            return Err(SearchError::Backend(describe_error(status.as_u16(), &body)));
        }

        parse_search_response(&body)
    }
}

#[async_trait]
impl SearchBackend for ElasticClient {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SearchError> {
        let mut last_error = SearchError::Backend("no search address configured".to_string());

        for addr in &self.addresses {
            match self.search_on(addr, request).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "Search failed on node");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Bool query: the time range plus one `terms` clause per filter
pub fn build_search_body(request: &SearchRequest<'_>) -> serde_json::Value {
    let mut must = Vec::with_capacity(1 + request.terms.len());

    let mut range = serde_json::Map::new();
    range.insert(
        request.range_field.to_string(),
        serde_json::json!({ "gte": request.window.begin, "lte": request.window.end }),
    );
    must.push(serde_json::json!({ "range": range }));

    for term in request.terms {
        let mut terms = serde_json::Map::new();
        terms.insert(term.key.clone(), serde_json::json!(term.values));
        must.push(serde_json::json!({ "terms": terms }));
    }

    serde_json::json!({ "query": { "bool": { "must": must } } })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    total: TotalHits,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// 7.x reports `{"value": n, "relation": ..}`, 6.x a bare number
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object { value: usize },
    Count(usize),
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: serde_json::Value,
}

pub fn parse_search_response(body: &[u8]) -> Result<SearchPage, SearchError> {
    let response: SearchResponse =
        serde_json::from_slice(body).map_err(|e| SearchError::Decode(e.to_string()))?;

    let total = match response.hits.total {
        TotalHits::Object { value } => value,
        TotalHits::Count(n) => n,
    };

    Ok(SearchPage {
        total,
        records: response
            .hits
            .hits
            .into_iter()
            .map(|hit| Record::new(hit.source))
            .collect(),
    })
}

/// `[status] type: reason` from an error body, or the raw text
fn describe_error(status: u16, body: &[u8]) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    let detail = parsed.as_ref().and_then(|v| v.get("error")).map(|error| {
        match (
            error.get("type").and_then(|t| t.as_str()),
            error.get("reason").and_then(|r| r.as_str()),
        ) {
            (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
            _ => error.to_string(),
        }
    });

    match detail {
        Some(detail) => format!("[{}] {}", status, detail),
        None => format!("[{}] {}", status, String::from_utf8_lossy(body)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn retrieval() -> RetrievalConfig {
        RetrievalConfig {
            index: "logs-*".to_string(),
            page_size: 100,
            max_page_size: 10_000,
            range_field: "@timestamp".to_string(),
            terms: vec![Term {
                key: "level".to_string(),
                values: vec!["error".to_string(), "fatal".to_string()],
            }],
        }
    }

    #[test]
    fn test_search_body() {
        let config = retrieval();
        let request = SearchRequest::new(&config, TimeWindow::new(1000, 2000), 100);
        let body = build_search_body(&request);

        assert_eq!(
            body,
            json!({
                "query": { "bool": { "must": [
                    { "range": { "@timestamp": { "gte": 1000, "lte": 2000 } } },
                    { "terms": { "level": ["error", "fatal"] } }
                ] } }
            })
        );
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "took": 3,
            "timed_out": false,
            "hits": {
                "total": { "value": 250, "relation": "eq" },
                "hits": [
                    { "_index": "logs", "_id": "1", "_source": { "message": "a" } },
                    { "_index": "logs", "_id": "2", "_source": { "message": "b" } }
                ]
            }
        });
        let page = parse_search_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(page.total, 250);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].get_string("message").as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_legacy_total() {
        let body = json!({ "hits": { "total": 7, "hits": [] } });
        let page = parse_search_response(body.to_string().as_bytes()).unwrap();
        assert_eq!(page.total, 7);
        assert!(page.records.is_empty());
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        let err = parse_search_response(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, SearchError::Decode(_)));
    }

    #[test]
    fn test_describe_error() {
        let body = json!({
            "error": { "type": "index_not_found_exception", "reason": "no such index [x]" },
            "status": 404
        });
        assert_eq!(
            describe_error(404, body.to_string().as_bytes()),
            "[404] index_not_found_exception: no such index [x]"
        );
        assert_eq!(describe_error(502, b"upstream down"), "[502] upstream down");
    }

    /// Serve one canned HTTP response on a local port; the request head is
    /// sent back through the returned channel.
    async fn serve_once(
        status: &'static str,
        body: serde_json::Value,
    ) -> (String, tokio::sync::oneshot::Receiver<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            line.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        let _ = tx.send(text[..end].to_string());
                        break;
                    }
                }
            }

            let body = body.to_string();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn test_failover_to_next_node() {
        let (live, request_head) = serve_once(
            "200 OK",
            json!({
                "hits": {
                    "total": { "value": 1, "relation": "eq" },
                    "hits": [{ "_source": { "message": "from second node" } }]
                }
            }),
        )
        .await;
        let client = ElasticClient::new(
            vec!["http://127.0.0.1:1".to_string(), format!("{}/", live)],
            "elastic",
            "changeme",
            Duration::from_secs(5),
        )
        .unwrap();
        let config = retrieval();
        let request = SearchRequest::new(&config, TimeWindow::new(0, 1), 10);

        let page = client.search(&request).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(
            page.records[0].get_string("message").as_deref(),
            Some("from second node")
        );

        let head = request_head.await.unwrap();
        assert!(head.starts_with("POST /logs-*/_search?"), "{}", head);
        assert!(head.contains("size=10"));
        assert!(head.contains("track_total_hits=true"));
        assert!(head.to_ascii_lowercase().contains("authorization: basic"));
    }

    #[tokio::test]
    async fn test_error_status_is_described() {
        let (live, _request_head) = serve_once(
            "404 Not Found",
            json!({
                "error": { "type": "index_not_found_exception", "reason": "no such index [logs-*]" },
                "status": 404
            }),
        )
        .await;
        let client = ElasticClient::new(vec![live], "", "", Duration::from_secs(5)).unwrap();
        let config = retrieval();
        let request = SearchRequest::new(&config, TimeWindow::new(0, 1), 10);

        match client.search(&request).await {
            Err(SearchError::Backend(message)) => assert_eq!(
                message,
                "[404] index_not_found_exception: no such index [logs-*]"
            ),
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_nodes_report_backend_error() {
        let client = ElasticClient::new(
            vec!["not a url".to_string()],
            "",
            "",
            Duration::from_secs(1),
        )
        .unwrap();
        let config = retrieval();
        let request = SearchRequest::new(&config, TimeWindow::new(0, 1), 10);

        let err = client.search(&request).await.unwrap_err();
        assert!(matches!(err, SearchError::Backend(_)));
    }
}
