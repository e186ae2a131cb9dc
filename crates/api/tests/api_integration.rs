//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Cid, Money, ProductId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{
    AddressBook, AddressRecord, CartLine, CartStore, IdentityStore, InMemoryMarketStore,
    ProductRecord, ProductStore, UserRecord,
};
use tower::ServiceExt;

const BUYER: &str = "11111111111";
const SELLER: &str = "22222222222";
const TRANSPORTER: &str = "33333333333";
const STRANGER: &str = "44444444444";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn cid(value: &str) -> Cid {
    Cid::parse(value).unwrap()
}

fn user(cid_value: &str, name: &str, role: &str, dzongkhag: &str) -> UserRecord {
    UserRecord {
        cid: cid(cid_value),
        name: name.to_string(),
        phone_number: format!("17{}", &cid_value[..6]),
        location: format!("{dzongkhag} town"),
        dzongkhag: dzongkhag.to_string(),
        role: role.to_string(),
    }
}

struct TestApp {
    app: Router,
    store: InMemoryMarketStore,
    product: ProductId,
}

async fn setup() -> TestApp {
    let store = InMemoryMarketStore::new();
    store
        .put_user(user(BUYER, "Karma", "consumer", "Paro"))
        .await
        .unwrap();
    store
        .put_user(user(SELLER, "Dorji", "farmer", "Thimphu"))
        .await
        .unwrap();
    store
        .put_user(user(TRANSPORTER, "Sonam", "transporter", "Thimphu"))
        .await
        .unwrap();
    store
        .put_user(user(STRANGER, "Tashi", "restaurant", "Punakha"))
        .await
        .unwrap();

    let product = ProductId::new();
    store
        .put_product(ProductRecord {
            id: product,
            name: "Red Rice".to_string(),
            price: Money::from_cents(8_000),
            unit: "kg".to_string(),
            stock_quantity: 10,
            seller: cid(SELLER),
            image: String::new(),
        })
        .await
        .unwrap();

    let state = api::create_default_state(store.clone());
    let app = api::create_app(state, get_metrics_handle());
    TestApp {
        app,
        store,
        product,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header("authorization", format!("CID {caller}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn buy(t: &TestApp, quantity: i64) -> String {
    let (status, json) = send(
        &t.app,
        "POST",
        "/orders/buy",
        Some(BUYER),
        Some(json!({ "productId": t.product, "quantity": quantity })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["order"]["id"].as_str().unwrap().to_string()
}

async fn patch(t: &TestApp, order_id: &str, action: &str, caller: &str) -> (StatusCode, Value) {
    send(
        &t.app,
        "PATCH",
        &format!("/orders/{order_id}/{action}"),
        Some(caller),
        None,
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;
    let (status, json) = send(&t.app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;
    buy(&t, 1).await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_placed_total"));
}

mod identity {
    use super::*;

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let t = setup().await;
        let (status, json) = send(&t.app, "GET", "/orders/my", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_unknown_cid_is_unauthorized() {
        let t = setup().await;
        let (status, _) = send(&t.app, "GET", "/orders/my", Some("99999999999"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_role_is_unauthorized() {
        let t = setup().await;
        t.store
            .put_user(user("55555555555", "Ugyen", "wizard", "Haa"))
            .await
            .unwrap();

        let (status, _) = send(&t.app, "GET", "/orders/my", Some("55555555555"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_x_cid_header() {
        let t = setup().await;
        let response = t
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/orders/my")
                    .header("x-cid", BUYER)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

mod purchase {
    use super::*;

    #[tokio::test]
    async fn test_buy_returns_order_and_remaining_stock() {
        let t = setup().await;
        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": t.product, "quantity": 3 })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["success"], true);
        assert_eq!(json["remainingStock"], 7);
        assert_eq!(json["order"]["status"], "placed");
        assert_eq!(json["order"]["quantity"], 3);
        assert_eq!(json["order"]["source"], "single-buy");
        assert!(json["order"]["checkpoint"]["image"]
            .as_str()
            .unwrap()
            .contains("<svg"));
        assert_eq!(t.store.stock_of(t.product).await, Some(7));
    }

    #[tokio::test]
    async fn test_buy_quantity_defaults_to_one() {
        let t = setup().await;
        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": t.product })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["remainingStock"], 9);
    }

    #[tokio::test]
    async fn test_buy_rejects_bad_input() {
        let t = setup().await;

        for quantity in [0, -2, 1000] {
            let (status, _) = send(
                &t.app,
                "POST",
                "/orders/buy",
                Some(BUYER),
                Some(json!({ "productId": t.product, "quantity": quantity })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "quantity {quantity}");
        }

        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": "not-an-id", "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid productId");

        assert_eq!(t.store.stock_of(t.product).await, Some(10));
    }

    #[tokio::test]
    async fn test_buy_unknown_product() {
        let t = setup().await;
        let (status, _) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": ProductId::new(), "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_buy_free_product_is_a_conflict() {
        let t = setup().await;
        let free = ProductId::new();
        t.store
            .put_product(ProductRecord {
                id: free,
                name: "Spoiled Chillies".to_string(),
                price: Money::zero(),
                unit: "kg".to_string(),
                stock_quantity: 10,
                seller: cid(SELLER),
                image: String::new(),
            })
            .await
            .unwrap();

        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": free, "quantity": 2 })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("Invalid price"));
        assert_eq!(t.store.stock_of(free).await, Some(10));
        assert_eq!(t.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_buy_insufficient_stock_lists_details() {
        let t = setup().await;
        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": t.product, "quantity": 11 })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "Insufficient stock for some items");
        assert_eq!(json["details"][0]["requested"], 11);
        assert_eq!(json["details"][0]["available"], 10);
        assert_eq!(json["details"][0]["name"], "Red Rice");
    }

    #[tokio::test]
    async fn test_buy_with_inline_and_saved_addresses() {
        let t = setup().await;
        let saved = uuid::Uuid::new_v4();
        t.store
            .put_address(AddressRecord {
                id: saved,
                owner: cid(BUYER),
                title: "Office".to_string(),
                place: "Bondey".to_string(),
                dzongkhag: "Paro".to_string(),
                is_default: false,
            })
            .await
            .unwrap();

        let (_, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({
                "productId": t.product,
                "quantity": 1,
                "deliveryAddress": { "title": "Home", "place": "Olakha", "dzongkhag": "Thimphu" },
            })),
        )
        .await;
        assert_eq!(json["order"]["deliveryAddress"]["place"], "Olakha");

        let (_, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": t.product, "quantity": 1, "addressId": saved })),
        )
        .await;
        assert_eq!(json["order"]["deliveryAddress"]["title"], "Office");

        let (status, _) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": t.product, "quantity": 1, "addressId": uuid::Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(t.store.stock_of(t.product).await, Some(8));
    }

    #[tokio::test]
    async fn test_cart_checkout_clears_cart() {
        let t = setup().await;
        t.store
            .put_cart(&cid(BUYER), vec![CartLine::new(t.product, 4)])
            .await
            .unwrap();

        let (status, json) =
            send(&t.app, "POST", "/orders/cart-checkout", Some(BUYER), None).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        assert_eq!(json["cartCleared"], true);
        assert_eq!(json["orders"].as_array().unwrap().len(), 1);
        assert_eq!(json["orders"][0]["source"], "cart");

        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/cart-checkout",
            Some(BUYER),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Cart is empty");
    }

    #[tokio::test]
    async fn test_batch_checkout() {
        let t = setup().await;
        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/checkout",
            Some(BUYER),
            Some(json!({ "products": [
                { "productId": t.product, "quantity": 2 },
                { "productId": t.product, "quantity": 5 },
            ]})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED, "{json}");
        assert_eq!(json["orders"].as_array().unwrap().len(), 2);
        assert!(json.get("cartCleared").is_none());
        assert_eq!(t.store.stock_of(t.product).await, Some(3));

        let (status, _) = send(
            &t.app,
            "POST",
            "/orders/checkout",
            Some(BUYER),
            Some(json!({ "products": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let t = setup().await;
        let response = t
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/orders/buy")
                    .header("authorization", format!("CID {BUYER}"))
                    .header("content-type", "application/json")
                    .body(Body::from("{ not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

mod fulfillment {
    use super::*;

    #[tokio::test]
    async fn test_transporter_delivery_flow() {
        let t = setup().await;
        let id = buy(&t, 2).await;

        assert_eq!(patch(&t, &id, "confirm", SELLER).await.0, StatusCode::OK);
        assert_eq!(patch(&t, &id, "shipped", SELLER).await.0, StatusCode::OK);

        let (status, json) = send(
            &t.app,
            "PATCH",
            &format!("/orders/{id}/out-for-delivery"),
            Some(TRANSPORTER),
            Some(json!({ "name": "Sonam Express", "phoneNumber": "17999999" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["order"]["status"], "out-for-delivery");
        assert_eq!(json["order"]["transporter"]["name"], "Sonam Express");
        assert_eq!(json["order"]["transporter"]["cid"], TRANSPORTER);

        assert_eq!(
            patch(&t, &id, "picked-up", TRANSPORTER).await.0,
            StatusCode::OK
        );
        let (status, json) = patch(&t, &id, "delivered", TRANSPORTER).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["order"]["status"], "delivered");
        assert_eq!(json["order"]["statusHistory"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_seller_delivers_directly() {
        let t = setup().await;
        let id = buy(&t, 1).await;
        patch(&t, &id, "confirm", SELLER).await;
        patch(&t, &id, "shipped", SELLER).await;

        let (status, json) = patch(&t, &id, "delivered", SELLER).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["order"]["status"], "delivered");
    }

    #[tokio::test]
    async fn test_wrong_actor_and_wrong_status() {
        let t = setup().await;
        let id = buy(&t, 1).await;

        let (status, _) = patch(&t, &id, "confirm", BUYER).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = patch(&t, &id, "shipped", SELLER).await;
        assert_eq!(status, StatusCode::CONFLICT);

        patch(&t, &id, "confirm", SELLER).await;
        let (status, json) = patch(&t, &id, "confirm", SELLER).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("confirmed"));
    }

    #[tokio::test]
    async fn test_cancel_restores_stock() {
        let t = setup().await;
        let id = buy(&t, 4).await;
        assert_eq!(t.store.stock_of(t.product).await, Some(6));

        let (status, json) = send(
            &t.app,
            "PATCH",
            &format!("/orders/{id}/cancel"),
            Some(BUYER),
            Some(json!({ "reason": "ordered twice" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["order"]["status"], "cancelled");
        assert_eq!(json["order"]["statusHistory"][1]["notes"], "ordered twice");
        assert_eq!(t.store.stock_of(t.product).await, Some(10));

        let (status, _) = patch(&t, &id, "cancel", BUYER).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(t.store.stock_of(t.product).await, Some(10));
    }

    #[tokio::test]
    async fn test_bad_and_unknown_order_ids() {
        let t = setup().await;

        let (status, json) = patch(&t, "12345", "confirm", SELLER).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid order id");

        let unknown = uuid::Uuid::new_v4().to_string();
        let (status, _) = patch(&t, &unknown, "confirm", SELLER).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod views {
    use super::*;

    #[tokio::test]
    async fn test_order_detail_hidden_from_strangers() {
        let t = setup().await;
        let id = buy(&t, 1).await;

        let (status, json) = send(&t.app, "GET", &format!("/orders/{id}"), Some(SELLER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], id.as_str());

        let (status, _) = send(&t.app, "GET", &format!("/orders/{id}"), Some(STRANGER), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_scan_checkpoint_code() {
        let t = setup().await;
        let (_, json) = send(
            &t.app,
            "POST",
            "/orders/buy",
            Some(BUYER),
            Some(json!({ "productId": t.product, "quantity": 1 })),
        )
        .await;
        let code = json["order"]["checkpoint"]["payload"].as_str().unwrap();
        let id = json["order"]["id"].as_str().unwrap();

        let (status, json) = send(
            &t.app,
            "POST",
            "/orders/scan",
            Some(SELLER),
            Some(json!({ "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["order"]["id"], id);

        let (status, _) = send(
            &t.app,
            "POST",
            "/orders/scan",
            Some(STRANGER),
            Some(json!({ "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &t.app,
            "POST",
            "/orders/scan",
            Some(SELLER),
            Some(json!({ "code": "garbage" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_role_scoped_listings() {
        let t = setup().await;
        let id = buy(&t, 1).await;
        buy(&t, 1).await;

        let (status, json) = send(&t.app, "GET", "/orders/my", Some(BUYER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["orders"][0]["seller"]["name"], "Dorji");

        let (_, json) = send(&t.app, "GET", "/orders/seller", Some(SELLER), None).await;
        assert_eq!(json["count"], 2);

        let (_, json) = send(&t.app, "GET", "/orders/seller", Some(STRANGER), None).await;
        assert_eq!(json["count"], 0);

        patch(&t, &id, "confirm", SELLER).await;
        patch(&t, &id, "shipped", SELLER).await;

        let (status, json) = send(&t.app, "GET", "/orders/shipped", Some(TRANSPORTER), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);

        let (status, _) = send(&t.app, "GET", "/orders/shipped", Some(BUYER), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        patch(&t, &id, "out-for-delivery", TRANSPORTER).await;
        let (_, json) = send(&t.app, "GET", "/orders/transporter", Some(TRANSPORTER), None).await;
        assert_eq!(json["count"], 1);
        let (_, json) = send(&t.app, "GET", "/orders/shipped", Some(TRANSPORTER), None).await;
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn test_transport_search() {
        let t = setup().await;
        let id = buy(&t, 1).await;
        patch(&t, &id, "confirm", SELLER).await;
        patch(&t, &id, "shipped", SELLER).await;

        let (status, json) = send(
            &t.app,
            "GET",
            "/orders/transport-search?from=Thimphu&to=Haa,Paro",
            Some(TRANSPORTER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["count"], 1);
        assert_eq!(json["orders"][0]["buyer"]["dzongkhag"], "Paro");

        let (_, json) = send(
            &t.app,
            "GET",
            "/orders/transport-search?from=Thimphu&to=Haa&to=Paro",
            Some(TRANSPORTER),
            None,
        )
        .await;
        assert_eq!(json["count"], 1);

        let (_, json) = send(
            &t.app,
            "GET",
            "/orders/transport-search?from=Paro&to=Thimphu",
            Some(TRANSPORTER),
            None,
        )
        .await;
        assert_eq!(json["count"], 0);

        let (status, json) = send(
            &t.app,
            "GET",
            "/orders/transport-search?from=Thimphu",
            Some(TRANSPORTER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Missing from or to dzongkhag(s)");

        let (status, _) = send(
            &t.app,
            "GET",
            "/orders/transport-search?from=Thimphu&to=Paro",
            Some(BUYER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
