//! CID identity middleware.
//!
//! Every order endpoint runs behind [`require_identity`], which resolves the
//! caller into a [`Principal`] and stores it in the request extensions.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use common::Cid;
use domain::{IdentityError, Principal};
use store::MarketStore;

use crate::error::ApiError;
use crate::routes::orders::AppState;

const CID_SCHEME: &str = "CID";
const CID_HEADER: &str = "x-cid";

/// Resolves the caller's identity or rejects the request with 401.
pub async fn require_identity<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(cid) = cid_from_headers(request.headers()) else {
        metrics::counter!("auth_rejected_total", "reason" => "missing").increment(1);
        return Err(ApiError::Unauthorized);
    };

    let principal: Principal = state.identity.resolve(&cid).await.map_err(|e| match e {
        IdentityError::UnknownIdentity(_) | IdentityError::UnknownRole(_) => {
            metrics::counter!("auth_rejected_total", "reason" => "unknown").increment(1);
            tracing::info!(error = %e, "Rejected identity");
            ApiError::Unauthorized
        }
        IdentityError::Store(e) => ApiError::Internal(e.to_string()),
    })?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Reads a CID from `Authorization: CID <cid>` or, failing that, `X-CID`.
pub fn cid_from_headers(headers: &HeaderMap) -> Option<Cid> {
    let from_authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, value) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case(CID_SCHEME).then_some(value)
        })
        .and_then(|v| Cid::parse(v.trim()).ok());

    from_authorization.or_else(|| {
        headers
            .get(CID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Cid::parse(v.trim()).ok())
    })
}
