use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use shopfront_api::app::{build_app, services::AppServices};
use shopfront_auth::{JwtClaims, Role};
use shopfront_core::{Currency, UserId};
use shopfront_infra::Stores;
use shopfront_orders::ShippingRates;
use shopfront_payments::{sign, WebhookVerifier, HEADER_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};

const JWT_SECRET: &str = "black-box-secret";
const WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory stores, ephemeral port.
        let rates = ShippingRates { courier_cents: 9_900, locker_cents: 6_000 };
        let services = AppServices::new(Stores::in_memory(), Currency::Zar, rates)
            .with_webhooks(WebhookVerifier::new(WEBHOOK_SECRET, 300).unwrap());
        let app = build_app(Arc::new(services), JWT_SECRET.to_string());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(roles: &[&'static str]) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        roles: roles.iter().map(|r| Role::new(*r)).collect(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn send_webhook(
    client: &reqwest::Client,
    server: &TestServer,
    webhook_id: &str,
    body: &str,
) -> reqwest::Response {
    let ts = Utc::now().timestamp();
    let signature = sign(WEBHOOK_SECRET, webhook_id, ts, body.as_bytes()).unwrap();
    client
        .post(server.url("/webhooks/yoco"))
        .header(HEADER_ID, webhook_id)
        .header(HEADER_TIMESTAMP, ts.to_string())
        .header(HEADER_SIGNATURE, signature)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

/// Attribute -> draft -> published product id.
async fn publish_shirt(client: &reqwest::Client, server: &TestServer, token: &str) -> String {
    let res = client
        .post(server.url("/admin/attributes"))
        .bearer_auth(token)
        .json(&json!({
            "name": "Material",
            "kind": "select",
            "values": [{ "value": "linen" }, { "value": "cotton" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let attribute: Value = res.json().await.unwrap();
    let attribute_id = attribute["id"].as_str().unwrap().to_string();
    let linen = attribute["values"]
        .as_array()
        .unwrap()
        .iter()
        .find(|v| v["value"] == "linen")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(server.url("/admin/drafts"))
        .bearer_auth(token)
        .json(&json!({ "title": "Linen Shirt" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let draft: Value = res.json().await.unwrap();
    assert_eq!(draft["slug"], "linen-shirt");
    let draft_id = draft["id"].as_str().unwrap().to_string();

    let res = client
        .patch(server.url(&format!("/admin/drafts/{draft_id}")))
        .bearer_auth(token)
        .json(&json!({
            "sku": "SHIRT-LINEN",
            "price_cents": 45_000,
            "cost_price_cents": 20_000,
            "stock_quantity": 5,
            "images": [{ "url": "https://cdn.example.com/shirt.jpg", "alt": "front" }],
            "attributes": [{ "attribute_id": attribute_id, "value_ids": [linen] }],
            "supplier": { "name": "Acme Textiles", "sku": "AT-77", "cost_cents": 20_000 },
            "expected_version": draft["version"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(server.url(&format!("/admin/drafts/{draft_id}/publish")))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let outcome: Value = res.json().await.unwrap();
    assert_eq!(outcome["created"], true);
    let product_id = outcome["product_id"].as_str().unwrap().to_string();

    // Republishing updates the same product.
    let res = client
        .post(server.url(&format!("/admin/drafts/{draft_id}/publish")))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let again: Value = res.json().await.unwrap();
    assert_eq!(again["created"], false);
    assert_eq!(again["product_id"].as_str().unwrap(), product_id);

    product_id
}

#[tokio::test]
async fn health_is_public_and_admin_requires_auth() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(server.url("/admin/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn whoami_reports_roles_and_permissions() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(&["fulfillment"]);

    let res = client
        .get(server.url("/admin/whoami"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["roles"], json!(["fulfillment"]));
    assert!(body["permissions"]
        .as_array()
        .unwrap()
        .contains(&json!("shipments.write")));
}

#[tokio::test]
async fn permissions_are_enforced_per_route() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let viewer = mint_jwt(&["viewer"]);

    let res = client
        .get(server.url("/admin/drafts"))
        .bearer_auth(&viewer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(server.url("/admin/drafts"))
        .bearer_auth(&viewer)
        .json(&json!({ "title": "Should not exist" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn invalid_draft_is_rejected_with_field_errors() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(&["catalog_manager"]);

    let res = client
        .post(server.url("/admin/drafts"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Bare" }))
        .send()
        .await
        .unwrap();
    let draft: Value = res.json().await.unwrap();
    let draft_id = draft["id"].as_str().unwrap();

    // No sku, price or images yet.
    let res = client
        .post(server.url(&format!("/admin/drafts/{draft_id}/publish")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"sku"));
    assert!(fields.contains(&"price_cents"));
    assert!(fields.contains(&"images"));
}

#[tokio::test]
async fn publish_checkout_pay_and_track() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(&["admin"]);

    let product_id = publish_shirt(&client, &server, &admin).await;

    // Storefront sees the product without back-office fields.
    let res = client
        .get(server.url("/storefront/products?search=linen"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listing: Value = res.json().await.unwrap();
    assert_eq!(listing["total"], 1);
    let item = &listing["items"][0];
    assert_eq!(item["slug"], "linen-shirt");
    assert_eq!(item["in_stock"], true);
    assert!(item.get("cost_price").is_none());
    assert!(item.get("supplier").is_none());

    let res = client
        .post(server.url("/storefront/checkouts"))
        .json(&json!({
            "customer": { "email": "thandi@example.com", "name": "Thandi M" },
            "delivery": {
                "type": "courier",
                "address": { "line1": "1 Long St", "city": "Cape Town", "postal_code": "8001" },
            },
            "items": [{ "product_id": product_id, "quantity": 2 }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let checkout: Value = res.json().await.unwrap();
    assert_eq!(checkout["grand_total"]["amount_cents"], 99_900);
    let checkout_id = checkout["id"].as_str().unwrap().to_string();

    let payment = json!({
        "id": "evt_pay_1",
        "type": "payment.succeeded",
        "payload": {
            "id": "p_1001",
            "amount": 99_900,
            "currency": "ZAR",
            "status": "succeeded",
            "metadata": { "checkoutId": checkout_id },
        },
    })
    .to_string();

    let res = send_webhook(&client, &server, "evt_pay_1", &payment).await;
    assert_eq!(res.status(), StatusCode::OK);
    let first: Value = res.json().await.unwrap();
    assert_eq!(first["created"], true);
    let order_number = first["order_number"].as_str().unwrap().to_string();
    assert!(order_number.starts_with("SF-"));

    // YoCo retries: same order, nothing new.
    let res = send_webhook(&client, &server, "evt_pay_1", &payment).await;
    assert_eq!(res.status(), StatusCode::OK);
    let replay: Value = res.json().await.unwrap();
    assert_eq!(replay["created"], false);
    assert_eq!(replay["order_number"].as_str().unwrap(), order_number);

    // Stock went down once.
    let res = client
        .get(server.url(&format!("/admin/products/{product_id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let detail: Value = res.json().await.unwrap();
    assert_eq!(detail["product"]["stock_quantity"], 3);

    // One supplier order for the dropshipped line.
    let res = client
        .get(server.url("/admin/supplier-orders?status=pending"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let supplier_orders: Value = res.json().await.unwrap();
    assert_eq!(supplier_orders["total"], 1);
    assert_eq!(supplier_orders["items"][0]["supplier_name"], "Acme Textiles");

    let res = client
        .get(server.url(&format!(
            "/storefront/orders/{order_number}/tracking?email=THANDI@example.com"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let tracking: Value = res.json().await.unwrap();
    assert_eq!(tracking["status"], "paid");
    assert_eq!(tracking["items"][0]["quantity"], 2);

    let res = client
        .get(server.url(&format!(
            "/storefront/orders/{order_number}/tracking?email=someone@else.com"
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = r#"{"id":"evt_x","type":"payment.succeeded","payload":{"id":"p_x","amount":1}}"#;

    let res = client
        .post(server.url("/webhooks/yoco"))
        .header(HEADER_ID, "evt_x")
        .header(HEADER_TIMESTAMP, Utc::now().timestamp().to_string())
        .header(HEADER_SIGNATURE, "v1,bm90LWEtc2lnbmF0dXJl")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Unknown event types are acknowledged.
    let ignored = r#"{"id":"evt_y","type":"payment.created","payload":{"id":"p_y"}}"#;
    let res = send_webhook(&client, &server, "evt_y", ignored).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["ignored"], "payment.created");
}

#[tokio::test]
async fn archived_products_are_not_evaluated_for_promotions() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(&["admin"]);
    let product_id = publish_shirt(&client, &server, &admin).await;
    let cart = json!({ "items": [{ "product_id": product_id, "quantity": 1 }] });

    let res = client
        .post(server.url("/storefront/promotions/evaluate"))
        .json(&cart)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(server.url(&format!("/admin/products/{product_id}/archive")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(server.url("/storefront/promotions/evaluate"))
        .json(&cart)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["fields"][0]["field"], "items[0].product_id");
}
