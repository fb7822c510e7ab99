// Copyright (c) 2025 - Cowboy AI, Inc.

//! NetBox DCIM/IPAM Client
//!
//! Implements [`InventoryClient`] against the NetBox REST API.
//!
//! # Endpoint Mapping
//!
//! ```text
//! list(kind, filter)      = GET     /api/<endpoint>/?<filter>   (follows `next`)
//! create(kind, fields)    = POST    /api/<endpoint>/
//! update(kind, id, f)     = PATCH   /api/<endpoint>/<id>/
//! choices(kind, field)    = OPTIONS /api/<endpoint>/  → actions.POST.<field>.choices
//! health_check()          = GET     /api/status/
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use netbox_sync::client::{InventoryClient, NetBoxClient};
//! use netbox_sync::config::NetBoxConfig;
//! use netbox_sync::session::SessionToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetBoxConfig {
//!         base_url: "http://netbox.example.com".to_string(),
//!         timeout_secs: 30,
//!     };
//!     let token = SessionToken::preissued("your-token-here");
//!
//!     let client = NetBoxClient::new(&config, &token)?;
//!     client.health_check().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use super::{ClientError, ClientResult, Fields, Filter, InventoryClient, Record};
use crate::config::NetBoxConfig;
use crate::schema::ResourceKind;
use crate::session::SessionToken;

/// One page of a NetBox list response
#[derive(Debug, Deserialize)]
struct Page {
    next: Option<String>,
    results: Vec<Record>,
}

/// NetBox REST client bound to one session token
#[derive(Debug, Clone)]
pub struct NetBoxClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl NetBoxClient {
    /// Build an HTTP client authenticated with `token`
    pub fn new(config: &NetBoxConfig, token: &SessionToken) -> ClientResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers(Some(token.key()))?)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}/api/{}/", self.base_url, kind.schema().endpoint)
    }

    fn record_url(&self, kind: ResourceKind, id: i64) -> String {
        format!("{}{}/", self.collection_url(kind), id)
    }

    async fn send(&self, method: Method, url: &str, body: Option<&Fields>) -> ClientResult<Value> {
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, self.timeout))?;
        debug!("NetBox {} {} -> {}", method, url, response.status());
        read_json(response, self.timeout).await
    }
}

/// Headers shared by inventory and session requests
pub(crate) fn default_headers(token: Option<&str>) -> ClientResult<reqwest::header::HeaderMap> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            "Authorization",
            format!("Token {}", token)
                .parse()
                .map_err(|e| ClientError::Transport(format!("Invalid API token: {}", e)))?,
        );
    }
    headers.insert(
        "Content-Type",
        "application/json"
            .parse()
            .map_err(|e| ClientError::Transport(format!("Invalid header: {}", e)))?,
    );
    headers.insert(
        "Accept",
        "application/json"
            .parse()
            .map_err(|e| ClientError::Transport(format!("Invalid header: {}", e)))?,
    );
    Ok(headers)
}

/// Map a `reqwest` failure onto the client error taxonomy
pub(crate) fn classify(err: reqwest::Error, timeout: Duration) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(timeout)
    } else if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else {
        ClientError::Transport(err.to_string())
    }
}

/// Decode a JSON body, turning non-2xx statuses into [`ClientError::Api`]
pub(crate) async fn read_json(response: Response, timeout: Duration) -> ClientResult<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }

    response.json().await.map_err(|e| classify(e, timeout))
}

fn query_string(filter: &Filter) -> String {
    let mut pairs: Vec<String> = filter
        .query_pairs()
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(&k), urlencoding::encode(&v)))
        .collect();
    pairs.push("limit=1000".to_string());
    pairs.join("&")
}

/// Extract choice values from an OPTIONS response
fn parse_choices(body: &Value, field: &str) -> ClientResult<BTreeSet<String>> {
    let choices = body
        .pointer(&format!("/actions/POST/{}/choices", field))
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::Decode(format!("no choices advertised for '{}'", field)))?;

    Ok(choices
        .iter()
        .filter_map(|choice| choice.get("value"))
        .filter_map(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> ClientResult<T> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl InventoryClient for NetBoxClient {
    async fn list(&self, kind: ResourceKind, filter: &Filter) -> ClientResult<Vec<Record>> {
        let mut url = format!("{}?{}", self.collection_url(kind), query_string(filter));
        let mut records = Vec::new();

        loop {
            let page: Page = decode(self.send(Method::GET, &url, None).await?)?;
            records.extend(page.results);
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(records)
    }

    async fn create(&self, kind: ResourceKind, fields: &Fields) -> ClientResult<Record> {
        let url = self.collection_url(kind);
        decode(self.send(Method::POST, &url, Some(fields)).await?)
    }

    async fn update(&self, kind: ResourceKind, id: i64, fields: &Fields) -> ClientResult<Record> {
        let url = self.record_url(kind, id);
        decode(self.send(Method::PATCH, &url, Some(fields)).await?)
    }

    async fn choices(&self, kind: ResourceKind, field: &str) -> ClientResult<BTreeSet<String>> {
        let url = self.collection_url(kind);
        let body = self.send(Method::OPTIONS, &url, None).await?;
        parse_choices(&body, field)
    }

    async fn health_check(&self) -> ClientResult<Option<String>> {
        let url = format!("{}/api/status/", self.base_url);
        let body = self.send(Method::GET, &url, None).await?;
        let version = body
            .get("netbox-version")
            .and_then(Value::as_str)
            .map(str::to_string);
        info!(
            "NetBox health check passed (version {})",
            version.as_deref().unwrap_or("unknown")
        );
        Ok(version)
    }

    fn name(&self) -> &str {
        "netbox"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> NetBoxClient {
        let config = NetBoxConfig {
            base_url: "http://netbox.example.com/".to_string(),
            timeout_secs: 5,
        };
        NetBoxClient::new(&config, &SessionToken::preissued("0123456789abcdef")).unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(
            client.collection_url(ResourceKind::IpAddress),
            "http://netbox.example.com/api/ipam/ip-addresses/"
        );
        assert_eq!(
            client.record_url(ResourceKind::Site, 4),
            "http://netbox.example.com/api/dcim/sites/4/"
        );
    }

    #[test]
    fn test_query_string_encodes_values() {
        let filter = Filter::new()
            .text("prefix", "10.0.0.0/24")
            .reference("site", 3);
        assert_eq!(
            query_string(&filter),
            "prefix=10.0.0.0%2F24&site_id=3&limit=1000"
        );
    }

    #[test]
    fn test_parse_choices() {
        let body = json!({
            "actions": {
                "POST": {
                    "status": {
                        "type": "choice",
                        "choices": [
                            {"value": "active", "display_name": "Active"},
                            {"value": "planned", "display_name": "Planned"}
                        ]
                    }
                }
            }
        });

        let choices = parse_choices(&body, "status").unwrap();
        assert_eq!(
            choices.into_iter().collect::<Vec<_>>(),
            vec!["active".to_string(), "planned".to_string()]
        );
        assert!(matches!(
            parse_choices(&body, "type"),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn test_page_decoding() {
        let page: Page = decode(json!({
            "count": 1,
            "next": null,
            "previous": null,
            "results": [{"id": 1, "name": "NYC1", "slug": "nyc1"}]
        }))
        .unwrap();
        assert!(page.next.is_none());
        assert_eq!(page.results[0].value("slug"), json!("nyc1"));
    }
}
