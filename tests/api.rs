use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::{Value, json};
use splitly_api::auth::TokenKeys;
use splitly_api::build_rocket;
use splitly_api::currency::RateTable;
use splitly_api::db::GroupStore;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

const SECRET: &str = "api-test-secret";

// The pool never connects: these tests only reach routes that fail before
// touching the database, or that don't use it at all.
async fn client() -> Client {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://splitly@localhost/splitly_test")
        .expect("lazy pool");
    let rates = RateTable::with_rates("EUR", [("USD".to_string(), 2.0)]).expect("rates");
    let rocket = build_rocket(GroupStore::new(pool), TokenKeys::from_secret(SECRET), rates)
        .expect("cors configuration");
    Client::tracked(rocket).await.expect("valid rocket")
}

#[rocket::async_test]
async fn health_check_answers() {
    let client = client().await;
    let response = client.get("/api/health").dispatch().await;

    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.into_string().await.as_deref(), Some("OK"));
}

#[rocket::async_test]
async fn group_routes_require_a_token() {
    let client = client().await;

    let response = client.get("/api/groups/current/balances").dispatch().await;

    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn token_signed_with_another_secret_is_refused() {
    let client = client().await;
    let token = TokenKeys::from_secret("someone-else").issue(Uuid::new_v4()).unwrap();

    let response = client
        .get("/api/groups/current")
        .header(Header::new("Authorization", format!("Bearer {token}")))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Unauthorized);
}

#[rocket::async_test]
async fn malformed_member_id_is_a_bad_request() {
    let client = client().await;
    let token = TokenKeys::from_secret(SECRET).issue(Uuid::new_v4()).unwrap();

    let response = client
        .delete("/api/groups/current/members/not-a-uuid")
        .header(Header::new("Authorization", format!("Bearer {token}")))
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn analytics_report_is_served_without_storage() {
    let client = client().await;
    let records = json!([
        { "date": "2024-06-01", "category": "food", "amount": 30.0, "currency": "EUR" },
        { "date": "2024-06-01", "category": "food", "amount": 20.0, "currency": "USD" },
        { "date": "2024-07-02", "category": "transportation", "amount": 15.0 }
    ]);

    let response = client
        .post("/api/analytics?currency=EUR&default_currency=EUR")
        .header(ContentType::JSON)
        .body(records.to_string())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok);
    let report: Value = response.into_json().await.expect("json body");
    assert_eq!(report["currency"], "EUR");
    assert_eq!(report["total"], 55.0);
    assert_eq!(report["monthly"][0]["label"], "Jun 2024");
    assert_eq!(report["highest_day"]["date"], "2024-06-01");
    assert_eq!(report["categories"][0]["label"], "Food & Drinks");
}

#[rocket::async_test]
async fn analytics_with_unknown_target_currency_is_rejected() {
    let client = client().await;
    let records = json!([{ "date": "2024-06-01", "category": "food", "amount": 30.0 }]);

    let response = client
        .post("/api/analytics?currency=GBP")
        .header(ContentType::JSON)
        .body(records.to_string())
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: Value = response.into_json().await.expect("json body");
    assert_eq!(body["error"], "unknown currency code \"GBP\"");
}
