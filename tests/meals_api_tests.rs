use actix_web::{test, web, App};
use serde_json::json;
use std::sync::Arc;

use mealtrack::api::{self, AppState};
use mealtrack::auth::AuthService;
use mealtrack::store::Store;

fn create_app_state(store: Arc<Store>) -> AppState {
    AppState {
        store,
        auth_service: Arc::new(AuthService::new("test_secret".to_string())),
    }
}

macro_rules! test_app {
    ($store:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(create_app_state($store.clone())))
                .configure(api::configure_routes),
        )
        .await
    };
}

macro_rules! register_and_get_token {
    ($app:expr, $username:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "username": $username,
                "password": "password123"
            }))
            .to_request();

        let resp: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        resp["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! upsert_meal {
    ($app:expr, $token:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/meals")
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json($body)
            .to_request();
        test::call_service(&$app, req).await
    }};
}

macro_rules! get_json {
    ($app:expr, $token:expr, $uri:expr) => {{
        let req = test::TestRequest::get()
            .uri(&$uri)
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&$app, req).await;
        body
    }};
}

// ==================== Upsert Tests ====================

#[actix_web::test]
async fn test_upsert_creates_then_updates() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let app = test_app!(store);
    let token = register_and_get_token!(app, "alice");

    let resp = upsert_meal!(app, token, json!({
        "date": "2024-03-01",
        "meal_type": "Breakfast",
        "food_description": "oatmeal",
        "drinks": ["Coffee", "Water"]
    }));
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(created["meal_type"], "breakfast");
    assert_eq!(created["date"], "2024-03-01");
    assert_eq!(created["drinks"], json!(["Water", "Coffee"]));

    let resp = upsert_meal!(app, token, json!({
        "date": "2024-03-01",
        "meal_type": "breakfast",
        "food_description": "toast",
        "drinks": []
    }));
    assert_eq!(resp.status(), 200);
    let updated: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["created_at"], created["created_at"]);
    assert_eq!(updated["food_description"], "toast");
    assert_eq!(updated["drinks"], json!([]));

    let day = get_json!(app, token, "/api/meals/2024-03-01".to_string());
    let day = day.as_array().unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(day[0]["food_description"], "toast");
}

#[actix_web::test]
async fn test_upsert_legacy_water_flag_and_duplicate_drinks() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let app = test_app!(store);
    let token = register_and_get_token!(app, "alice");

    let resp = upsert_meal!(app, token, json!({
        "date": "2024-03-01",
        "meal_type": "lunch",
        "food_description": "soup",
        "had_water": true
    }));
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["drinks"], json!(["Water"]));

    let resp = upsert_meal!(app, token, json!({
        "date": "2024-03-01",
        "meal_type": "dinner",
        "drinks": ["Tea", "tea", "Energy Drink"]
    }));
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["drinks"], json!(["Tea", "Energy Drink"]));
    assert_eq!(body["food_description"], "");
}

#[actix_web::test]
async fn test_upsert_validation() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let app = test_app!(store);
    let token = register_and_get_token!(app, "alice");

    let cases = [
        json!({ "date": "2024-03-01", "meal_type": "brunch" }),
        json!({ "date": "2024-02-30", "meal_type": "lunch" }),
        json!({ "date": "yesterday", "meal_type": "lunch" }),
        json!({ "meal_type": "lunch" }),
        json!({ "date": "2024-03-01" }),
        json!({ "date": "2024-03-01", "meal_type": "lunch", "drinks": ["Beer"] }),
    ];

    for case in cases {
        let resp = upsert_meal!(app, token, &case);
        assert_eq!(resp.status(), 400, "expected 400 for {}", case);
    }

    let history = get_json!(app, token, "/api/meals".to_string());
    assert!(history.as_array().unwrap().is_empty());
}

// ==================== Read Tests ====================

#[actix_web::test]
async fn test_day_view_is_in_slot_order() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let app = test_app!(store);
    let token = register_and_get_token!(app, "alice");

    for slot in ["dinner", "breakfast", "lunch"] {
        upsert_meal!(app, token, json!({ "date": "2024-03-02", "meal_type": slot, "food_description": slot }));
    }
    upsert_meal!(app, token, json!({ "date": "2024-03-03", "meal_type": "lunch" }));

    let day = get_json!(app, token, "/api/meals/2024-03-02".to_string());
    let slots: Vec<&str> = day
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["meal_type"].as_str().unwrap())
        .collect();
    assert_eq!(slots, vec!["breakfast", "lunch", "dinner"]);

    let empty = get_json!(app, token, "/api/meals/2024-01-01".to_string());
    assert!(empty.as_array().unwrap().is_empty());

    let req = test::TestRequest::get()
        .uri("/api/meals/not-a-date")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn test_history_order_and_limit() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let app = test_app!(store);
    let token = register_and_get_token!(app, "alice");

    upsert_meal!(app, token, json!({ "date": "2024-03-01", "meal_type": "dinner", "food_description": "d1" }));
    upsert_meal!(app, token, json!({ "date": "2024-03-03", "meal_type": "dinner", "food_description": "d3" }));
    upsert_meal!(app, token, json!({ "date": "2024-03-03", "meal_type": "breakfast", "food_description": "b3" }));
    upsert_meal!(app, token, json!({ "date": "2024-03-02", "meal_type": "lunch", "food_description": "l2" }));

    let history = get_json!(app, token, "/api/meals".to_string());
    let foods: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["food_description"].as_str().unwrap())
        .collect();
    assert_eq!(foods, vec!["b3", "d3", "l2", "d1"]);

    let page = get_json!(app, token, "/api/meals?limit=2".to_string());
    assert_eq!(page.as_array().unwrap().len(), 2);

    // Limits below one are clamped
    let page = get_json!(app, token, "/api/meals?limit=0".to_string());
    assert_eq!(page.as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/meals?limit=lots")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn test_ledgers_are_per_user() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let app = test_app!(store);
    let alice = register_and_get_token!(app, "alice");
    let bob = register_and_get_token!(app, "bob");

    upsert_meal!(app, alice, json!({ "date": "2024-03-01", "meal_type": "lunch", "food_description": "salad" }));
    let resp = upsert_meal!(app, bob, json!({ "date": "2024-03-01", "meal_type": "lunch", "food_description": "burger" }));
    assert_eq!(resp.status(), 201);

    let alice_day = get_json!(app, alice, "/api/meals/2024-03-01".to_string());
    assert_eq!(alice_day[0]["food_description"], "salad");
    let bob_day = get_json!(app, bob, "/api/meals/2024-03-01".to_string());
    assert_eq!(bob_day[0]["food_description"], "burger");
}

// ==================== Delete Tests ====================

#[actix_web::test]
async fn test_delete_meal_enforces_ownership() {
    let store = Arc::new(Store::new(":memory:").unwrap());
    let app = test_app!(store);
    let alice = register_and_get_token!(app, "alice");
    let bob = register_and_get_token!(app, "bob");

    let resp = upsert_meal!(app, alice, json!({ "date": "2024-03-01", "meal_type": "lunch" }));
    let meal: serde_json::Value = test::read_body_json(resp).await;
    let meal_id = meal["id"].as_str().unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/meals/{}", meal_id))
        .insert_header(("Authorization", format!("Bearer {}", bob)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let history = get_json!(app, alice, "/api/meals".to_string());
    assert_eq!(history.as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/meals/{}", meal_id))
        .insert_header(("Authorization", format!("Bearer {}", alice)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let history = get_json!(app, alice, "/api/meals".to_string());
    assert!(history.as_array().unwrap().is_empty());

    let logs = store.list_logs(1).unwrap();
    assert_eq!(logs[0].action, "meal_deleted");
    assert_eq!(logs[0].details.as_ref().unwrap()["meal_id"], meal_id);
}
