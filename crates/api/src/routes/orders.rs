//! Checkout, fulfillment and listing endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use checkout::{AddressChoice, CheckoutLine, CheckoutOrchestrator, RemainingStock};
use common::{OrderId, ProductId};
use domain::{DeliveryAddress, FulfillmentService, IdentityResolver, Order, Principal};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use store::MarketStore;
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: MarketStore> {
    pub checkout: CheckoutOrchestrator<S>,
    pub fulfillment: FulfillmentService<S>,
    pub identity: IdentityResolver<S>,
}

// -- Request types --

/// Delivery address fields accepted by every checkout endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    pub delivery_address: Option<DeliveryAddress>,
    pub address_id: Option<String>,
}

impl AddressFields {
    fn into_choice(self) -> Result<AddressChoice, ApiError> {
        if let Some(address) = self.delivery_address {
            return Ok(AddressChoice::Inline(address));
        }
        match self.address_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Uuid::parse_str(id)
                .map(AddressChoice::Saved)
                .map_err(|_| ApiError::BadRequest("Invalid addressId".to_string())),
            _ => Ok(AddressChoice::Default),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyRequest {
    pub product_id: String,
    pub quantity: Option<i64>,
    #[serde(flatten)]
    pub address: AddressFields,
}

#[derive(Debug, Default, Deserialize)]
pub struct CartCheckoutRequest {
    #[serde(flatten)]
    pub address: AddressFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCheckoutRequest {
    #[serde(default)]
    pub products: Vec<LineRequest>,
    #[serde(flatten)]
    pub address: AddressFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub code: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyResponse {
    pub success: bool,
    pub order: Order,
    pub remaining_stock: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_cleared: Option<bool>,
    pub orders: Vec<Order>,
    pub remaining_stock: Vec<RemainingStock>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub success: bool,
    pub order: Order,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub count: usize,
    pub orders: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(orders: Vec<T>) -> Self {
        Self {
            success: true,
            count: orders.len(),
            orders,
        }
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Parses a body that may be omitted entirely.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid order id".to_string()))
}

fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    id.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid productId".to_string()))
}

fn updated(order: Order) -> Json<OrderResponse> {
    Json(OrderResponse {
        success: true,
        order,
    })
}

// -- Checkout --

/// POST /orders/buy: buy one product, quantity defaults to 1.
#[tracing::instrument(skip_all)]
pub async fn buy<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<BuyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BuyResponse>), ApiError> {
    let req = json_body(payload)?;
    let product_id = parse_product_id(&req.product_id)?;
    let address = req.address.into_choice()?;

    let receipt = state
        .checkout
        .buy_now(&principal, product_id, req.quantity.unwrap_or(1), address)
        .await?;

    let remaining_stock = receipt
        .remaining_stock
        .first()
        .map(|r| r.remaining)
        .unwrap_or_default();
    let order = receipt
        .orders
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("Checkout produced no order".to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(BuyResponse {
            success: true,
            order,
            remaining_stock,
        }),
    ))
}

/// POST /orders/cart-checkout: order the caller's whole cart.
#[tracing::instrument(skip_all)]
pub async fn cart_checkout<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let req: CartCheckoutRequest = optional_body(&body)?;
    let address = req.address.into_choice()?;

    let receipt = state.checkout.checkout_cart(&principal, address).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            success: true,
            cart_cleared: Some(receipt.cart_cleared),
            orders: receipt.orders,
            remaining_stock: receipt.remaining_stock,
        }),
    ))
}

/// POST /orders/checkout: order an explicit list of products.
#[tracing::instrument(skip_all)]
pub async fn batch_checkout<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<BatchCheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let req = json_body(payload)?;
    let lines = req
        .products
        .iter()
        .map(|line| {
            Ok(CheckoutLine::new(
                parse_product_id(&line.product_id)?,
                line.quantity.unwrap_or(1),
            ))
        })
        .collect::<Result<Vec<_>, ApiError>>()?;
    let address = req.address.into_choice()?;

    let receipt = state
        .checkout
        .checkout_batch(&principal, lines, address)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            success: true,
            cart_cleared: None,
            orders: receipt.orders,
            remaining_stock: receipt.remaining_stock,
        }),
    ))
}

// -- Fulfillment --

/// PATCH /orders/{id}/confirm
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn confirm<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(updated(state.fulfillment.confirm(&principal, order_id).await?))
}

/// PATCH /orders/{id}/shipped
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn ship<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(updated(state.fulfillment.ship(&principal, order_id).await?))
}

/// PATCH /orders/{id}/out-for-delivery: a transporter takes the order.
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn accept_for_transport<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let req: AcceptRequest = optional_body(&body)?;
    let order = state
        .fulfillment
        .accept_for_transport(&principal, order_id, req.name, req.phone_number)
        .await?;
    Ok(updated(order))
}

/// PATCH /orders/{id}/picked-up
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn pick_up<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(updated(state.fulfillment.pick_up(&principal, order_id).await?))
}

/// PATCH /orders/{id}/delivered
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn deliver<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(updated(state.fulfillment.deliver(&principal, order_id).await?))
}

/// PATCH /orders/{id}/cancel: buyer cancels, stock is restored.
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn cancel<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let req: CancelRequest = optional_body(&body)?;
    let order = state
        .fulfillment
        .cancel(&principal, order_id, req.reason)
        .await?;
    Ok(updated(order))
}

// -- Views --

/// GET /orders/{id}
pub async fn get<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    Ok(Json(state.fulfillment.get(&principal, order_id).await?))
}

/// POST /orders/scan: look up an order from its checkpoint code.
pub async fn scan<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let req = json_body(payload)?;
    let order = state.fulfillment.scan(&principal, &req.code).await?;
    Ok(updated(order))
}

/// GET /orders/my: the caller's purchases with seller contacts.
pub async fn my_orders<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ListResponse<domain::PurchaseView>>, ApiError> {
    Ok(Json(state.fulfillment.purchases(&principal).await?.into()))
}

/// GET /orders/seller
pub async fn seller_orders<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ListResponse<Order>>, ApiError> {
    Ok(Json(state.fulfillment.sales(&principal).await?.into()))
}

/// GET /orders/shipped: shipped orders waiting for a transporter.
pub async fn shipped_orders<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ListResponse<Order>>, ApiError> {
    Ok(Json(
        state.fulfillment.awaiting_transport(&principal).await?.into(),
    ))
}

/// GET /orders/transporter
pub async fn transporter_orders<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ListResponse<Order>>, ApiError> {
    Ok(Json(state.fulfillment.transports(&principal).await?.into()))
}

/// GET /orders/transport-search?from=<dzongkhag>&to=<dz1,dz2>
///
/// `to` may be comma separated, repeated, or both.
pub async fn transport_search<S: MarketStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ListResponse<domain::TransportCandidate>>, ApiError> {
    let from = params
        .iter()
        .find(|(key, _)| key == "from")
        .map(|(_, value)| value.as_str())
        .unwrap_or_default();
    let to: Vec<String> = params
        .iter()
        .filter(|(key, _)| key == "to")
        .flat_map(|(_, value)| value.split(','))
        .map(str::to_string)
        .collect();

    let matches = state
        .fulfillment
        .transport_search(&principal, from, &to)
        .await?;
    Ok(Json(matches.into()))
}
