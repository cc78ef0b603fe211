//! Payment backend API client.
//!
//! Thin typed wrapper over the backend's request/response endpoints. The
//! event stream itself is consumed by
//! [`StreamConnectionManager`](crate::connection::StreamConnectionManager);
//! this client only builds its URL.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PaymentError;
use crate::models::{
    ActiveConnectionsResponse, InitializePaymentRequest, InitializePaymentResponse, OrderId,
    OrderStatusResponse, PaymentStatus, SimulateFailureRequest,
};
use crate::traits::{Headers, HttpClient, Response};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Reason sent with a simulated failure when none is given.
pub const DEFAULT_FAILURE_REASON: &str = "user cancelled payment";

/// Client for the payment backend.
#[derive(Clone)]
pub struct PaymentApiClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl std::fmt::Debug for PaymentApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PaymentApiClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an order for `amount`.
    pub async fn create_order(
        &self,
        amount: Decimal,
    ) -> Result<InitializePaymentResponse, PaymentError> {
        let url = format!("{}/api/payment/initialize", self.base_url);
        let response = self
            .post_json(&url, &InitializePaymentRequest { amount })
            .await?;
        let created: InitializePaymentResponse = Self::parse(&Self::ensure_success(response)?)?;
        info!("Created order {} for amount {}", created.order_id, amount);
        Ok(created)
    }

    /// Ask the backend to complete the order successfully.
    pub async fn simulate_success(&self, order_id: &OrderId) -> Result<String, PaymentError> {
        let url = self.order_url(order_id, "simulate-success");
        let response = self.post_json(&url, &serde_json::json!({})).await?;
        Ok(Self::ensure_success(response)?.text())
    }

    /// Ask the backend to fail the order with `reason`.
    pub async fn simulate_failure(
        &self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<String, PaymentError> {
        let url = self.order_url(order_id, "simulate-failure");
        let body = SimulateFailureRequest {
            reason: reason.to_string(),
        };
        let response = self.post_json(&url, &body).await?;
        Ok(Self::ensure_success(response)?.text())
    }

    /// Look up the order's current status.
    pub async fn order_status(&self, order_id: &OrderId) -> Result<PaymentStatus, PaymentError> {
        let url = self.order_url(order_id, "status");
        let response = self.http.get(&url, &Self::json_headers()).await?;
        if response.status == 404 {
            return Err(PaymentError::OrderNotFound(order_id.to_string()));
        }

        let body: OrderStatusResponse = Self::parse(&Self::ensure_success(response)?)?;
        PaymentStatus::from_wire(&body.status).ok_or_else(|| {
            PaymentError::InvalidResponse(format!("unknown status '{}'", body.status))
        })
    }

    /// Number of event streams the backend currently serves.
    pub async fn active_connections(&self) -> Result<u32, PaymentError> {
        let url = format!("{}/api/sse/connections", self.base_url);
        let response = self.http.get(&url, &Self::json_headers()).await?;
        let body: ActiveConnectionsResponse = Self::parse(&Self::ensure_success(response)?)?;
        Ok(body.active_connections)
    }

    /// URL of the payment event stream, with a cache-busting timestamp.
    pub fn stream_url(&self) -> String {
        format!(
            "{}/api/sse/payment-events?_={}",
            self.base_url,
            Utc::now().timestamp_millis()
        )
    }

    fn order_url(&self, order_id: &OrderId, action: &str) -> String {
        format!(
            "{}/api/payment/{}/{}",
            self.base_url,
            urlencoding::encode(order_id.as_str()),
            action
        )
    }

    fn json_headers() -> Headers {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    async fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<Response, PaymentError> {
        let body = serde_json::to_string(body)
            .map_err(|e| PaymentError::InvalidResponse(format!("unserializable request: {}", e)))?;
        debug!("POST {} {}", url, body);
        Ok(self.http.post(url, &body, &Self::json_headers()).await?)
    }

    fn ensure_success(response: Response) -> Result<Response, PaymentError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(PaymentError::Rejected {
                status: response.status,
                body: response.text(),
            })
        }
    }

    fn parse<T: DeserializeOwned>(response: &Response) -> Result<T, PaymentError> {
        response
            .json()
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))
    }
}
