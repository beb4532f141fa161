//! API end-to-end tests against a running development server

use reqwest::{multipart, Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api";

/// Seed the database (idempotent) and log in as the default admin
async fn admin_token(client: &Client) -> String {
    client
        .get(format!("{}/seed", BASE_URL))
        .send()
        .await
        .expect("Failed to send seed request");

    login(client, "admin@libris.local", "admin123").await
}

async fn login(client: &Client, email: &str, password: &str) -> String {
    let response = client
        .post(format!("{}/login", BASE_URL))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to send login request");
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

/// Register a fresh member and return (user id, token)
async fn member(client: &Client) -> (i64, String) {
    let email = format!("member-{}@example.com", uuid::Uuid::new_v4());
    let response = client
        .post(format!("{}/register", BASE_URL))
        .json(&json!({ "name": "Test Member", "email": email, "password": "secret123" }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["member_id"].as_str().unwrap().starts_with('A'));
    assert!(body.get("password_hash").is_none());

    let token = login(client, &email, "secret123").await;
    (body["id"].as_i64().unwrap(), token)
}

async fn create_book(client: &Client, token: &str, stock: i32) -> i64 {
    let form = multipart::Form::new()
        .text("title", format!("Test Book {}", uuid::Uuid::new_v4()))
        .text("author", "Test Author")
        .text("stock", stock.to_string());

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No book ID")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_duplicate_email_conflicts() {
    let client = Client::new();
    admin_token(&client).await;

    let response = client
        .post(format!("{}/register", BASE_URL))
        .json(&json!({ "name": "Again", "email": "ADMIN@libris.local", "password": "secret123" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_loan_lifecycle() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, token) = member(&client).await;
    let book_id = create_book(&client, &admin, 2).await;

    // Request
    let response = client
        .post(format!("{}/bookloans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["status"], "PENDING");
    assert_eq!(loan["fine"], 0);
    let loan_id = loan["id"].as_i64().unwrap();

    // A second active request for the same book is refused
    let response = client
        .post(format!("{}/bookloans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Returning before approval is not a valid transition
    let response = client
        .post(format!("{}/bookloans/return", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "id": loan_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("PENDING"));

    // Approve
    let response = client
        .patch(format!("{}/bookloans", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({ "id": loan_id, "status": "APPROVED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["status"], "APPROVED");

    // Return
    let response = client
        .post(format!("{}/bookloans/return", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "id": loan_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["status"], "RETURNED");
    assert!(loan["actual_return_date"].is_string());

    // A return awaiting verification still blocks book deletion
    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The loan survived the refused delete
    let response = client
        .get(format!("{}/returns?status=RETURNED", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let returns: Value = response.json().await.unwrap();
    assert!(returns
        .as_array()
        .unwrap()
        .iter()
        .any(|l| l["id"].as_i64() == Some(loan_id)));

    // Verify
    let response = client
        .patch(format!("{}/returns", BASE_URL))
        .bearer_auth(&admin)
        .json(&json!({ "id": loan_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["status"], "VERIFIED_RETURNED");

    // The book can be deleted once no loan is active
    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
#[ignore]
async fn test_out_of_stock_request_warns_and_cancel() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (_, token) = member(&client).await;
    let book_id = create_book(&client, &admin, 0).await;

    let response = client
        .post(format!("{}/bookloans", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "book_id": book_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.unwrap();
    assert!(loan["warning"].is_string());

    // Pending loans block book deletion
    let response = client
        .delete(format!("{}/books/{}", BASE_URL, book_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/bookloans/cancel", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "id": loan["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let loan: Value = response.json().await.unwrap();
    assert_eq!(loan["status"], "CANCELLED");
}

#[tokio::test]
#[ignore]
async fn test_catalog_filters() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    create_book(&client, &admin, 0).await;

    let response = client
        .get(format!("{}/books?status=available", BASE_URL))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let books: Value = response.json().await.unwrap();
    assert!(books
        .as_array()
        .unwrap()
        .iter()
        .all(|b| b["stock"].as_i64().unwrap() > 0));
}

#[tokio::test]
#[ignore]
async fn test_admin_cannot_delete_self() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let me: Value = client
        .get(format!("{}/me", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = client
        .delete(format!("{}/users/{}", BASE_URL, me["id"]))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_member_stats() {
    let client = Client::new();
    admin_token(&client).await;
    let (_, token) = member(&client).await;

    let response = client
        .get(format!("{}/stats", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["active_loans"], 0);
    assert_eq!(body["outstanding_fines"], 0);
}

/// Create an active admin account and return (user id, token)
async fn extra_admin(client: &Client, admin: &str) -> (i64, String) {
    let email = format!("admin-{}@example.com", uuid::Uuid::new_v4());
    let response = client
        .post(format!("{}/users", BASE_URL))
        .bearer_auth(admin)
        .json(&json!({
            "name": "Second Admin",
            "email": email,
            "password": "secret123",
            "role": "admin"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    let token = login(client, &email, "secret123").await;
    (body["id"].as_i64().unwrap(), token)
}

async fn update_user(client: &Client, token: &str, id: i64, changes: Value) -> StatusCode {
    client
        .put(format!("{}/users/{}", BASE_URL, id))
        .bearer_auth(token)
        .json(&changes)
        .send()
        .await
        .expect("Failed to send request")
        .status()
}

#[tokio::test]
#[ignore]
async fn test_members_cannot_reach_admin_routes() {
    let client = Client::new();
    admin_token(&client).await;
    let (_, token) = member(&client).await;

    for path in ["/users", "/users/1", "/returns", "/reports"] {
        let response = client
            .get(format!("{}{}", BASE_URL, path))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", path);
    }
}

#[tokio::test]
#[ignore]
async fn test_demotion_applies_to_issued_tokens() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (id, token) = extra_admin(&client, &admin).await;

    let response = client
        .get(format!("{}/users", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        update_user(&client, &admin, id, json!({ "role": "user" })).await,
        StatusCode::OK
    );

    // Same token, stored role is now user
    let response = client
        .get(format!("{}/users", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert_eq!(
        update_user(&client, &token, id, json!({ "role": "admin" })).await,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
#[ignore]
async fn test_deactivated_account_token_is_refused() {
    let client = Client::new();
    let admin = admin_token(&client).await;
    let (id, token) = member(&client).await;

    let response = client
        .put(format!("{}/users/{}", BASE_URL, id))
        .bearer_auth(&admin)
        .json(&json!({ "status": "inactive" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// Demotes every other admin; run on its own:
// cargo test --test api_tests test_last_admin_is_kept -- --ignored
#[tokio::test]
#[ignore]
async fn test_last_admin_is_kept() {
    let client = Client::new();
    let admin = admin_token(&client).await;

    let me: Value = client
        .get(format!("{}/me", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let my_id = me["id"].as_i64().unwrap();

    // A non-last admin can be deleted
    let (other, _) = extra_admin(&client, &admin).await;
    let response = client
        .delete(format!("{}/users/{}", BASE_URL, other))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Leave the seeded admin as the only active one
    let admins: Value = client
        .get(format!("{}/users?role=admin&status=active", BASE_URL))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    for user in admins.as_array().unwrap() {
        let id = user["id"].as_i64().unwrap();
        if id != my_id {
            assert_eq!(
                update_user(&client, &admin, id, json!({ "role": "user" })).await,
                StatusCode::OK
            );
        }
    }

    let response = client
        .put(format!("{}/users/{}", BASE_URL, my_id))
        .bearer_auth(&admin)
        .json(&json!({ "role": "user" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "At least one active admin must remain");

    assert_eq!(
        update_user(&client, &admin, my_id, json!({ "status": "inactive" })).await,
        StatusCode::BAD_REQUEST
    );
}
