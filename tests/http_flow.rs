use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use storefront::{
    api::{router, AppState},
    auth::SessionKeys,
    services::{Outbox, Services, Settings},
    store::{MemoryStore, Store},
};
use tower::ServiceExt;

struct App {
    router: Router,
    services: Services,
}

fn app() -> App {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let keys = SessionKeys::new(b"0123456789abcdef0123456789abcdef", Duration::from_secs(600), Duration::from_secs(600));
    let settings = Settings { admin_password: "letmein".into(), storefront_url: "https://shop.test".into() };
    let backend = store.backend();
    let services = Services::new(store, Outbox::logging(), keys.clone(), settings);
    App { router: router(AppState { services: services.clone(), keys, backend }), services }
}

async fn call(app: &App, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let res = app.router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

async fn admin_token(app: &App) -> String {
    let (status, body) = call(app, Method::POST, "/api/v1/admin/login", None, Some(json!({ "pass": "letmein" }))).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_the_backend() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn errors_use_the_envelope() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "statusCode": 401, "success": false, "message": "Unauthorized request" }));

    let (status, body) = call(&app, Method::POST, "/api/v1/admin/login", None, Some(json!({ "pass": "nope" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid Credentials");

    let (status, _) = call(&app, Method::GET, "/api/v1/product/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn browse_cart_checkout_and_cancel() {
    let app = app();
    let admin = admin_token(&app).await;

    let (status, body) = call(&app, Method::POST, "/api/v1/category", Some(&admin), Some(json!({ "name": "Lighting" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let category = body["data"]["id"].as_str().unwrap().to_string();

    let products = json!({ "products": [{
        "name": "Lamp", "description": "Desk lamp", "cost": 300, "price": 500,
        "totalQuantity": 5, "categoryId": category,
    }] });
    let (status, body) = call(&app, Method::POST, "/api/v1/product", Some(&admin), Some(products)).await;
    assert_eq!(status, StatusCode::CREATED);
    let product = body["data"]["successfulUploads"][0]["id"].as_str().unwrap().to_string();

    let signed = app.services.accounts.register("Asha", "asha@example.com", None).await.unwrap();
    let user = signed.token.as_str();

    let (status, body) = call(&app, Method::POST, "/api/v1/cart", Some(user), Some(json!({ "product": product, "quantity": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["finalAmount"].as_f64(), Some(1180.0));
    assert_eq!(body["data"]["taxAmount"].as_f64(), Some(180.0));
    let cart = body["data"]["id"].as_str().unwrap().to_string();

    let address = json!({
        "fullName": "Asha Rao", "phoneNumber": "9800000000", "streetAddress": "12 MG Road",
        "city": "Pune", "state": "MH", "postalCode": "411001", "addressType": "Home",
    });
    let (status, body) = call(&app, Method::POST, "/api/v1/address", Some(user), Some(address)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["country"], "India");
    let address = body["data"]["id"].as_str().unwrap().to_string();

    let order = json!({ "cartId": cart, "addressId": address, "paymentMethod": "UPI" });
    let (status, body) = call(&app, Method::POST, "/api/v1/order", Some(user), Some(order)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid payment method, only COD is available.");

    let order = json!({ "cartId": cart, "addressId": address, "paymentMethod": "COD" });
    let (status, body) = call(&app, Method::POST, "/api/v1/order", Some(user), Some(order)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["orderStatus"], "Pending");
    let order = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = call(&app, Method::GET, &format!("/api/v1/product/{product}"), None, None).await;
    assert_eq!(body["data"]["stock"], 3);
    let (status, _) = call(&app, Method::GET, "/api/v1/cart", Some(user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::GET, "/api/v1/order/user-order", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalOrders"], 1);

    let (status, body) = call(&app, Method::PUT, &format!("/api/v1/order/{order}"), Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["orderStatus"], "Cancelled");
    let (_, body) = call(&app, Method::GET, &format!("/api/v1/product/{product}"), None, None).await;
    assert_eq!(body["data"]["stock"], 5);

    let (status, body) = call(&app, Method::PATCH, &format!("/api/v1/admin/order/{order}"), Some(&admin), Some(json!({ "status": "Shipped" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot change order status from Cancelled to Shipped");
}

#[tokio::test]
async fn admin_routes_reject_customer_tokens() {
    let app = app();
    let signed = app.services.accounts.register("Ravi", "ravi@example.com", None).await.unwrap();
    let (status, _) = call(&app, Method::GET, "/api/v1/coupon", Some(&signed.token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = admin_token(&app).await;
    let (status, body) = call(&app, Method::GET, "/api/v1/coupon", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let uri = format!("/api/v1/admin/user/{}", signed.user.id);
    let (status, _) = call(&app, Method::PATCH, &uri, Some(&admin), Some(json!({ "status": "suspended" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, Method::GET, "/api/v1/auth/me", Some(&signed.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Account is suspended");
}

#[tokio::test]
async fn profile_wishlist_and_admin_user_views() {
    let app = app();
    let admin = admin_token(&app).await;
    let (_, body) = call(&app, Method::POST, "/api/v1/category", Some(&admin), Some(json!({ "name": "Kitchen" }))).await;
    let category = body["data"]["id"].as_str().unwrap().to_string();
    let products = json!({ "products": [{
        "name": "Kettle", "description": "Steel kettle", "cost": 400, "price": 900,
        "totalQuantity": 4, "categoryId": category,
    }] });
    let (_, body) = call(&app, Method::POST, "/api/v1/product", Some(&admin), Some(products)).await;
    let kettle = body["data"]["successfulUploads"][0]["id"].as_str().unwrap().to_string();

    let signed = app.services.accounts.register("Meera", "meera@example.com", None).await.unwrap();
    let user = signed.token.as_str();

    let (status, body) = call(&app, Method::PATCH, "/api/v1/user/profile", Some(user), Some(json!({ "phone": "9811111111", "name": "" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Meera");
    assert_eq!(body["data"]["phone"], "9811111111");

    let (status, body) = call(&app, Method::GET, "/api/v1/user/wishlist", Some(user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No products found in wishlist");

    let uri = format!("/api/v1/user/wishlist/{kettle}");
    let (status, body) = call(&app, Method::PUT, &uri, Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Added to wishlist");
    assert_eq!(body["data"], json!([kettle]));

    let (status, body) = call(&app, Method::GET, "/api/v1/user/wishlist", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalWishlistItems"], 1);
    assert_eq!(body["data"]["products"][0]["name"], "Kettle");

    call(&app, Method::POST, "/api/v1/cart", Some(user), Some(json!({ "product": kettle, "quantity": 2 }))).await;
    let (_, body) = call(&app, Method::GET, "/api/v1/user/profile", Some(user), None).await;
    assert_eq!(body["data"]["totalCartQuantity"], 2);
    assert_eq!(body["data"]["email"], "meera@example.com");

    let (_, body) = call(&app, Method::PUT, &uri, Some(user), None).await;
    assert_eq!(body["message"], "Removed from wishlist");

    let (status, _) = call(&app, Method::GET, "/api/v1/admin/users", Some(user), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = call(&app, Method::GET, "/api/v1/admin/users?search=MEERA", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalUsers"], 1);
    assert_eq!(body["data"]["users"][0]["totalOrders"], 0);

    let (status, body) = call(&app, Method::GET, &format!("/api/v1/admin/user/{}", signed.user.id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "meera@example.com");
    let (status, body) = call(&app, Method::GET, &format!("/api/v1/admin/user/{}", uuid::Uuid::now_v7()), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}
