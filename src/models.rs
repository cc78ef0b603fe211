//! Data models for the payment backend.
//!
//! Wire payloads use camelCase JSON; statuses travel as `PENDING`, `SUCCESS`
//! and `FAILURE`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `eventType` marker carried by keep-alive payloads.
pub const HEARTBEAT_EVENT_TYPE: &str = "HEARTBEAT";

/// `eventType` marker carried by status payloads.
pub const PAYMENT_STATUS_EVENT_TYPE: &str = "PAYMENT_STATUS";

/// Opaque order identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Status of a payment order.
///
/// A session with no order has no status at all (`Option::None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failure,
}

impl PaymentStatus {
    /// `Success` and `Failure` end the order's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failure)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failure => "FAILURE",
        }
    }

    /// Parse the wire representation, returning `None` for anything else
    /// (including the backend's `NOT_FOUND`).
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILURE" => Some(PaymentStatus::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status update pushed on the `PAYMENT_STATUS` channel (and, redundantly,
/// on the default channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub order_id: OrderId,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix timestamp in milliseconds set by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl PaymentStatusUpdate {
    pub fn new(order_id: impl Into<OrderId>, status: PaymentStatus) -> Self {
        Self {
            event_type: Some(PAYMENT_STATUS_EVENT_TYPE.to_string()),
            order_id: order_id.into(),
            status,
            message: None,
            timestamp: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Body of `POST /api/payment/initialize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializePaymentRequest {
    pub amount: Decimal,
}

/// Response of `POST /api/payment/initialize`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentResponse {
    pub order_id: OrderId,
    pub payment_url: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

/// Body of `POST /api/payment/{orderId}/simulate-failure`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulateFailureRequest {
    pub reason: String,
}

/// Response of `GET /api/payment/{orderId}/status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderStatusResponse {
    pub status: String,
}

/// Response of `GET /api/sse/connections`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConnectionsResponse {
    pub active_connections: u32,
}
