//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::{CheckpointError, DomainError, IdentityError, OrderError};
use serde_json::{Value, json};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unknown caller identity.
    Unauthorized,
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Fulfillment or lookup error.
    Domain(DomainError),
    /// Checkout error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, message("Unauthorized")),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, message(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, message(msg)),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn message(msg: impl Into<String>) -> Value {
    json!({ "error": msg.into() })
}

fn internal(msg: String) -> (StatusCode, Value) {
    tracing::error!(error = %msg, "internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, message(msg))
}

fn order_error_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::Forbidden { .. } => StatusCode::FORBIDDEN,
        OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        OrderError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        // The request is fine; the product's catalog price is not.
        OrderError::InvalidPrice { .. } | OrderError::TotalOverflow { .. } => {
            StatusCode::CONFLICT
        }
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, Value) {
    let status = match &err {
        DomainError::Order(order_err) => order_error_status(order_err),
        DomainError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::ConcurrentModification(_) => StatusCode::CONFLICT,
        DomainError::InvalidInput(_) | DomainError::Checkpoint(CheckpointError::Malformed) => {
            StatusCode::BAD_REQUEST
        }
        DomainError::Identity(IdentityError::UnknownIdentity(_) | IdentityError::UnknownRole(_)) => {
            StatusCode::UNAUTHORIZED
        }
        _ => return internal(err.to_string()),
    };
    (status, message(err.to_string()))
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, Value) {
    match &err {
        CheckoutError::InvalidQuantity { .. }
        | CheckoutError::EmptyCart
        | CheckoutError::NoItems => (StatusCode::BAD_REQUEST, message(err.to_string())),
        CheckoutError::Order(order_err) => (order_error_status(order_err), message(err.to_string())),
        CheckoutError::ProductNotFound(_) | CheckoutError::AddressNotFound(_) => {
            (StatusCode::NOT_FOUND, message(err.to_string()))
        }
        CheckoutError::InsufficientStock(details) => (
            StatusCode::CONFLICT,
            json!({ "error": err.to_string(), "details": details }),
        ),
        CheckoutError::StockRace {
            product_id,
            available,
        } => (
            StatusCode::CONFLICT,
            json!({
                "error": err.to_string(),
                "productId": product_id,
                "available": available,
            }),
        ),
        CheckoutError::Checkpoint(_)
        | CheckoutError::Persistence(_)
        | CheckoutError::Serialization(_)
        | CheckoutError::Interrupted(_) => internal(err.to_string()),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_bad_catalog_prices_are_conflicts() {
        let free = CheckoutError::Order(OrderError::InvalidPrice { price: 0 });
        assert_eq!(status_of(free), StatusCode::CONFLICT);

        let overflow = CheckoutError::Order(OrderError::TotalOverflow {
            price: i64::MAX / 2,
            quantity: 3,
        });
        assert_eq!(status_of(overflow), StatusCode::CONFLICT);
    }

    #[test]
    fn test_bad_quantities_are_client_errors() {
        let err = CheckoutError::Order(OrderError::InvalidQuantity { quantity: 0 });
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CheckoutError::EmptyCart), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_interrupted_checkout_is_internal() {
        let err = CheckoutError::Interrupted("task panicked".to_string());
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
