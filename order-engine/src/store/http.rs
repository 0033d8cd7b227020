//! HTTP order store
//!
//! - `GET  /api/tenants/{tenant}/orders?filter=active|all`
//! - `PATCH /api/orders/{id}/status`
//!
//! Responses use the `{ code, message, data }` envelope. A 409 on the
//! status write is a conflict. IDs are percent-encoded as single path
//! segments.

use super::{OrderStore, sort_newest_first};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ValidationError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::order::{Order, OrderFilter, OrderStatus, StatusUpdate};
use std::time::Duration;

/// Response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// Body of a 409 response
#[derive(Debug, Deserialize)]
struct ConflictData {
    current_status: Option<OrderStatus>,
}

/// Order store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpOrderStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpOrderStore {
    /// Create a store client. `timeout` bounds each request at the HTTP layer.
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> EngineResult<Self> {
        let base_url = Url::parse(base_url.as_ref()).map_err(|e| {
            EngineError::config(format!("Invalid order store URL {:?}: {}", base_url.as_ref(), e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::config(format!(
                "Order store URL cannot carry a path: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Build from `store_url` / `store_token`
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let base_url = config
            .store_url
            .clone()
            .ok_or_else(|| EngineError::config("Order store URL not configured"))?;
        let timeout = config.fetch_timeout.max(config.mutation_timeout);

        let mut store = Self::new(base_url, timeout)?;
        store.token = config.store_token.clone();
        Ok(store)
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Append `segments` to the base URL, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                EngineError::config(format!(
                    "Order store URL cannot carry a path: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> EngineResult<Option<T>> {
        let body: ApiResponse<T> = response.json().await?;
        if let Some(code) = body.code
            && code != 0
        {
            return Err(EngineError::server(format!(
                "Store error {}: {}",
                code, body.message
            )));
        }
        Ok(body.data)
    }
}

/// Dot segments are dropped when a path is built, so they cannot name a resource
fn is_path_id(id: &str) -> bool {
    !matches!(id, "" | "." | "..")
}

/// Map a non-success status write response
fn status_write_error(
    status: StatusCode,
    order_id: &str,
    update: &StatusUpdate,
    body: &str,
) -> EngineError {
    match status {
        StatusCode::CONFLICT => {
            let actual = serde_json::from_str::<ApiResponse<ConflictData>>(body)
                .ok()
                .and_then(|r| r.data)
                .and_then(|d| d.current_status);
            EngineError::Conflict {
                order_id: order_id.to_string(),
                expected: update.expected_status.unwrap_or(update.status),
                actual,
            }
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            EngineError::timeout(format!("Status write timed out ({}): {}", status, body))
        }
        _ => EngineError::server(format!("Status write failed ({}): {}", status, body)),
    }
}

#[async_trait]
impl OrderStore for HttpOrderStore {
    async fn fetch_orders(&self, tenant_id: &str, filter: OrderFilter) -> EngineResult<Vec<Order>> {
        if !is_path_id(tenant_id) {
            return Err(EngineError::config(format!("Invalid tenant id {:?}", tenant_id)));
        }
        let url = self.endpoint(&["api", "tenants", tenant_id, "orders"])?;
        let request = self
            .client
            .get(url)
            .query(&[("filter", filter.as_str())]);

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::server(format!(
                "Fetch orders failed ({}): {}",
                status, text
            )));
        }

        let mut orders: Vec<Order> = Self::decode(response).await?.unwrap_or_default();
        sort_newest_first(&mut orders);
        tracing::debug!(tenant_id = %tenant_id, count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    async fn update_order_status(&self, order_id: &str, update: StatusUpdate) -> EngineResult<()> {
        if !is_path_id(order_id) {
            return Err(ValidationError::UnknownOrder(order_id.to_string()).into());
        }
        let url = self.endpoint(&["api", "orders", order_id, "status"])?;
        let request = self.client.patch(url).json(&update);

        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_write_error(status, order_id, &update, &text));
        }

        Self::decode::<serde_json::Value>(response).await?;
        Ok(())
    }
}
