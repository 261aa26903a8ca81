use super::{WEBHOOK_LIMIT, create_test_service};
use crate::api::handlers::{AppService, api_routes};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Router, Arc<AppService>) {
    let service = Arc::new(create_test_service());
    (api_routes(service.clone()), service)
}

fn bearer(service: &AppService, user_id: &str) -> String {
    let token = service.issue_token(user_id, &format!("User {}", user_id), None).unwrap();
    format!("Bearer {}", token)
}

fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (app, _) = app();
    let (status, body) = send(&app, json_request("GET", "/users/me", None, Value::Null)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (status, _) = send(&app, json_request("GET", "/users/me", Some("Bearer garbage"), Value::Null)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_group_and_expense_flow() {
    let (app, service) = app();
    let alice = bearer(&service, "alice");
    let bob = bearer(&service, "bob");

    for auth in [&alice, &bob] {
        let (status, body) = send(&app, json_request("POST", "/auth/session", Some(auth), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
    }

    let (status, body) = send(
        &app,
        json_request("POST", "/groups", Some(&alice), json!({ "name": "Flat", "member_ids": ["bob"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["currency"], json!("THB"));
    let group_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/expenses",
            Some(&alice),
            json!({
                "group_id": group_id,
                "description": "Internet",
                "amount": "600",
                "split": { "method": "equal", "participants": ["alice", "bob"] }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let debts = body["data"]["debts"].as_array().unwrap();
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0]["debtor_id"], json!("bob"));
    let debt_id = debts[0]["id"].as_str().unwrap().to_string();

    // Only the parties of a debt can pay it
    let carol = bearer(&service, "carol");
    let (status, _) = send(
        &app,
        json_request("POST", &format!("/debts/{}/settle", debt_id), Some(&carol), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/debts/{}/payments", debt_id),
            Some(&bob),
            json!({ "amount": "500" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/debts/{}/settle", debt_id), Some(&bob), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(debt_id));

    let (status, _) = send(&app, json_request("GET", &format!("/groups/{}", group_id), Some(&carol), Value::Null)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_group_is_not_found() {
    let (app, service) = app();
    let alice = bearer(&service, "alice");
    send(&app, json_request("POST", "/auth/session", Some(&alice), json!({}))).await;

    let (status, body) = send(&app, json_request("GET", "/groups/missing", Some(&alice), Value::Null)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_webhook_is_rate_limited() {
    let (app, _) = app();
    let balance = json!({ "source": "line", "user_id": "bob", "text": "balance" });
    let (status, body) = send(&app, json_request("POST", "/webhook", None, balance)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "outcome": "replied", "target_id": "bob" }));

    let event = json!({ "source": "line", "text": "hi" });
    for _ in 1..WEBHOOK_LIMIT {
        let (status, body) = send(&app, json_request("POST", "/webhook", None, event.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], json!("ignored"));
    }
    let (status, body) = send(&app, json_request("POST", "/webhook", None, event)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], json!(false));
}
