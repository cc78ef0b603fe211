//! Errors from the payment backend's request/response endpoints.

use thiserror::Error;

use crate::traits::HttpError;

/// Error type for order creation, simulation and status lookups.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// The backend answered with a non-success status
    #[error("Payment request failed: {status} - {body}")]
    Rejected { status: u16, body: String },

    /// The request never produced a response
    #[error("Payment request could not be sent: {0}")]
    Transport(#[from] HttpError),

    /// The response body did not have the expected shape
    #[error("Invalid response from payment server: {0}")]
    InvalidResponse(String),

    /// The backend does not know the order
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// An operation needing an order was called without one
    #[error("No active order")]
    NoActiveOrder,

    /// The session was reset or re-initialized while the request was in flight
    #[error("Payment session changed while the request was in flight")]
    Superseded,
}

impl PaymentError {
    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            PaymentError::Rejected { status, .. } => Some(*status),
            PaymentError::OrderNotFound(_) => Some(404),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_includes_status_and_body() {
        let err = PaymentError::Rejected {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Payment request failed: 500 - boom");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_from_http_error() {
        let err: PaymentError = HttpError::ConnectionFailed("refused".to_string()).into();
        assert!(matches!(err, PaymentError::Transport(_)));
        assert!(err.to_string().contains("refused"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(
            PaymentError::OrderNotFound("ORD-1".to_string()).status(),
            Some(404)
        );
    }
}
