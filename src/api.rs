//! dummyapi.io client: paginated list walking and per-id detail fan-out.

use reqwest::{Client, Url};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::{ApiConfig, ResourceConfig};
use crate::error::FetchError;
use crate::record::{record_id, Record, RecordSet};

/// Upstream API client.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    app_id: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
        }
    }

    /// Fetch the complete record set for one resource type.
    ///
    /// Walks `page=0,1,..` until a page comes back empty. When the resource
    /// only exposes summary fields in its list view, every distinct id is then
    /// re-fetched from the detail endpoint and the detail payload replaces the
    /// summary row. Duplicate and null ids are left for the normalizer.
    pub async fn fetch_all(&self, resource: &ResourceConfig) -> Result<RecordSet, FetchError> {
        resource.check_page_size();
        let list_url = self.endpoint_url(&resource.path);

        let mut records = RecordSet::new();
        let mut page = 0u32;
        loop {
            let rows = self.fetch_page(&list_url, page, resource.page_size).await?;
            debug!("{} page {}: {} records", resource.kind, page, rows.len());
            if rows.is_empty() {
                break;
            }
            records.extend(rows);
            page += 1;
        }

        info!(
            "Fetched {} {} summaries across {} pages",
            records.len(),
            resource.kind,
            page
        );

        if !resource.needs_detail_fetch {
            return Ok(records);
        }

        let mut seen = HashSet::new();
        let mut detailed = RecordSet::with_capacity(records.len());
        for summary in &records {
            let Some(id) = record_id(summary) else {
                debug!("Skipping detail fetch for {} summary without id", resource.kind);
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            detailed.push(self.fetch_detail(&list_url, &id).await?);
        }

        info!("Fetched {} {} detail records", detailed.len(), resource.kind);
        Ok(detailed)
    }

    /// Fetch one list page and return its `data` array.
    async fn fetch_page(&self, list_url: &str, page: u32, limit: u32) -> Result<Vec<Record>, FetchError> {
        let body = self
            .get_json(list_url, &[("page", page), ("limit", limit)])
            .await?;

        let data = match body {
            Value::Object(mut map) => map.remove("data"),
            _ => None,
        };

        let Some(Value::Array(items)) = data else {
            return Err(FetchError::MalformedPayload {
                url: list_url.to_string(),
                reason: format!("page {} has no `data` array", page),
            });
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(FetchError::MalformedPayload {
                    url: list_url.to_string(),
                    reason: format!("page {} contains a non-object item: {}", page, other),
                }),
            })
            .collect()
    }

    /// Fetch the full payload for a single id.
    async fn fetch_detail(&self, list_url: &str, id: &str) -> Result<Record, FetchError> {
        let url = detail_url(list_url, id)?;
        match self.get_json(&url, &[]).await? {
            Value::Object(record) => Ok(record),
            other => Err(FetchError::MalformedPayload {
                url,
                reason: format!("detail payload is not an object: {}", other),
            }),
        }
    }

    /// Helper: GET a JSON document with the `app-id` header.
    async fn get_json(&self, url: &str, query: &[(&str, u32)]) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(url)
            .header("app-id", &self.app_id)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        let text = resp.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|e| FetchError::MalformedPayload {
            url: url.to_string(),
            reason: format!("invalid JSON: {}", e),
        })
    }

    /// List URL for a resource path, always ending in `/`.
    fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url, path.trim_matches('/'))
    }
}

/// `{list_url}{id}` with the id encoded as a single path segment.
fn detail_url(list_url: &str, id: &str) -> Result<String, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: list_url.to_string(),
        reason,
    };

    let mut url = Url::parse(list_url).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base URL".to_string()))?
        .pop_if_empty()
        .push(id);
    Ok(url.to_string())
}
