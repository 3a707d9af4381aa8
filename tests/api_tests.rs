// tests/api_tests.rs

use quizhub::{config::Config, routes, state::AppState};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    // Note: For Postgres, you must have a running database.
    // We'll read from DATABASE_URL environment variable.
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
    };

    let state = AppState { pool, config };

    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    address
}

fn unique_email() -> String {
    format!("u_{}@example.com", &uuid::Uuid::new_v4().to_string()[..8])
}

/// Registers a fresh user and logs them in. Returns (email, token).
async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, String) {
    let email = unique_email();
    let password = "password123";

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");

    let token = login["token"].as_str().expect("Token not found").to_string();
    (email, token)
}

/// A quiz with three questions; the first answer of every question is the
/// correct one.
fn math_quiz_payload(name: &str, visibility: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "category": "math",
        "visibility": visibility,
        "questions": [
            {
                "text": "What is 2 + 2?",
                "answers": [
                    { "text": "4", "correct": true },
                    { "text": "5" },
                    { "text": "22" }
                ]
            },
            {
                "text": "What is 3 * 3?",
                "answers": [
                    { "text": "9", "correct": true },
                    { "text": "6" }
                ]
            },
            {
                "text": "What is 10 / 2?",
                "answers": [
                    { "text": "5", "correct": true },
                    { "text": "3" },
                    { "text": "8" }
                ]
            }
        ]
    })
}

async fn create_quiz(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    payload: &serde_json::Value,
) -> i64 {
    let response = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(token)
        .json(payload)
        .send()
        .await
        .expect("Create quiz failed");
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = response.json().await.unwrap();
    body["id"].as_i64().expect("Quiz id not found")
}

#[tokio::test]
async fn health_check_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "email": unique_email(),
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["id"].as_i64().is_some());
    // The password hash must never leak.
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn register_fails_validation() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: not an email address
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "email": "not-an-email",
            "password": "password123"
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email();

    for expected_status in [201, 409] {
        let response = client
            .post(format!("{}/api/auth/register", address))
            .json(&serde_json::json!({ "email": email, "password": "password123" }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), expected_status);
    }
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (email, _token) = register_and_login(&client, &address).await;

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "email": email, "password": "wrong_password" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn quiz_lifecycle_create_show_evaluate_history() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (_email, token) = register_and_login(&client, &address).await;

    let quiz_id = create_quiz(&client, &address, &token, &math_quiz_payload("Math Quiz", "public")).await;

    // Show: questions come back in order, without correct flags.
    let detail: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Show failed")
        .json()
        .await
        .unwrap();

    assert_eq!(detail["name"], "Math Quiz");
    assert_eq!(detail["can_manage"], true);
    let questions = detail["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    for question in questions {
        for answer in question["answers"].as_array().unwrap() {
            assert!(answer.get("correct").is_none(), "correct flag must stay hidden");
        }
    }

    // Evaluate: first two right (first answer is correct by construction),
    // last one wrong.
    let q = |i: usize| questions[i]["id"].as_i64().unwrap();
    let a = |i: usize, j: usize| questions[i]["answers"][j]["id"].as_i64().unwrap();

    let submission = serde_json::json!({
        "answers": {
            q(0).to_string(): a(0, 0),
            q(1).to_string(): a(1, 0),
            q(2).to_string(): a(2, 1)
        }
    });

    let result: serde_json::Value = client
        .post(format!("{}/api/quizzes/{}/evaluation", address, quiz_id))
        .bearer_auth(&token)
        .json(&submission)
        .send()
        .await
        .expect("Evaluation failed")
        .json()
        .await
        .unwrap();

    assert_eq!(result["score"], 2);
    assert_eq!(result["questions_count"], 3);
    let flags: Vec<bool> = result["question_results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["correct"].as_bool().unwrap())
        .collect();
    assert_eq!(flags, vec![true, true, false]);

    // History: the attempt was recorded for the signed-in learner.
    let history: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}/history", address, quiz_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("History failed")
        .json()
        .await
        .unwrap();

    assert_eq!(history["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(history["latest"]["score"], 2);
    assert_eq!(history["best"]["questions_count"], 3);
    assert_eq!(history["best"]["percentage"], 66.7);
    assert_eq!(history["best"]["performance_level"], "yellow");
}

#[tokio::test]
async fn anonymous_visitors_can_take_public_quizzes() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (_email, token) = register_and_login(&client, &address).await;

    let quiz_id = create_quiz(&client, &address, &token, &math_quiz_payload("Open Quiz", "public")).await;

    // No Authorization header anywhere below.
    let detail: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .send()
        .await
        .expect("Show failed")
        .json()
        .await
        .unwrap();
    assert_eq!(detail["can_manage"], false);

    let response = client
        .post(format!("{}/api/quizzes/{}/evaluation", address, quiz_id))
        .json(&serde_json::json!({ "answers": {} }))
        .send()
        .await
        .expect("Evaluation failed");
    assert_eq!(response.status().as_u16(), 200);

    let result: serde_json::Value = response.json().await.unwrap();
    assert_eq!(result["score"], 0);
    assert_eq!(result["questions_count"], 3);
}

#[tokio::test]
async fn private_quizzes_are_hidden_from_strangers() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (_owner_email, owner_token) = register_and_login(&client, &address).await;
    let (_stranger_email, stranger_token) = register_and_login(&client, &address).await;

    let quiz_name = format!("Secret {}", uuid::Uuid::new_v4());
    let quiz_id =
        create_quiz(&client, &address, &owner_token, &math_quiz_payload(&quiz_name, "private")).await;

    // The owner sees it in the index and on the detail page.
    let owner_list: serde_json::Value = client
        .get(format!("{}/api/quizzes", address))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(owner_list.to_string().contains(&quiz_name));

    // A stranger does not see it in the index...
    let stranger_list: serde_json::Value = client
        .get(format!("{}/api/quizzes", address))
        .bearer_auth(&stranger_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!stranger_list.to_string().contains(&quiz_name));

    // ...and is denied on direct access, for show and evaluation alike.
    for request in [
        client
            .get(format!("{}/api/quizzes/{}", address, quiz_id))
            .bearer_auth(&stranger_token),
        client
            .post(format!("{}/api/quizzes/{}/evaluation", address, quiz_id))
            .bearer_auth(&stranger_token)
            .json(&serde_json::json!({ "answers": {} })),
    ] {
        let response = request.send().await.unwrap();
        assert_eq!(response.status().as_u16(), 403);
    }

    // Anonymous visitors are denied as well.
    let response = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn only_the_owner_can_modify_a_quiz() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (_owner_email, owner_token) = register_and_login(&client, &address).await;
    let (_other_email, other_token) = register_and_login(&client, &address).await;

    let quiz_id =
        create_quiz(&client, &address, &owner_token, &math_quiz_payload("Editable", "public")).await;

    // A non-owner can see a public quiz but cannot update or delete it.
    let update = math_quiz_payload("Hijacked", "public");
    let response = client
        .put(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&other_token)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .delete(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // The owner can do both.
    let update = math_quiz_payload("Renamed", "public");
    let response = client
        .put(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&owner_token)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .delete(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn group_sharing_grants_and_revokes_access() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (_owner_email, owner_token) = register_and_login(&client, &address).await;
    let (member_email, member_token) = register_and_login(&client, &address).await;

    let quiz_name = format!("Team Quiz {}", uuid::Uuid::new_v4());
    let quiz_id =
        create_quiz(&client, &address, &owner_token, &math_quiz_payload(&quiz_name, "private")).await;

    // Owner creates a group and invites the member by email.
    let group: serde_json::Value = client
        .post(format!("{}/api/groups", address))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "name": "Team Alpha", "description": "study group" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let group_id = group["id"].as_i64().unwrap();

    let response = client
        .post(format!("{}/api/groups/{}/members", address, group_id))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "email": member_email }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // Not visible yet: membership alone is not enough.
    let response = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Share the quiz with the group; now the member can see and take it,
    // but still not manage it.
    let response = client
        .post(format!("{}/api/quizzes/{}/shares", address, quiz_id))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "group_id": group_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let detail: serde_json::Value = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["name"], quiz_name);
    assert_eq!(detail["can_manage"], false);

    let response = client
        .delete(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Revoking the share hides the quiz again.
    let response = client
        .delete(format!("{}/api/quizzes/{}/shares/{}", address, quiz_id, group_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .get(format!("{}/api/quizzes/{}", address, quiz_id))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn group_management_is_owner_only() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (_owner_email, owner_token) = register_and_login(&client, &address).await;
    let (member_email, member_token) = register_and_login(&client, &address).await;

    let group: serde_json::Value = client
        .post(format!("{}/api/groups", address))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "name": "Team Beta" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let group_id = group["id"].as_i64().unwrap();

    // Inviting an address nobody registered is a 404.
    let response = client
        .post(format!("{}/api/groups/{}/members", address, group_id))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "email": "nobody@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = client
        .post(format!("{}/api/groups/{}/members", address, group_id))
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({ "email": member_email }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // A member can view the group but not rename or delete it.
    let response = client
        .get(format!("{}/api/groups/{}", address, group_id))
        .bearer_auth(&member_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let detail: serde_json::Value = response.json().await.unwrap();
    assert_eq!(detail["can_manage"], false);
    assert!(detail["members"].to_string().contains(&member_email));

    let response = client
        .put(format!("{}/api/groups/{}", address, group_id))
        .bearer_auth(&member_token)
        .json(&serde_json::json!({ "name": "Mine Now" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .delete(format!("{}/api/groups/{}", address, group_id))
        .bearer_auth(&owner_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
}

#[tokio::test]
async fn quiz_creation_requires_authentication_and_valid_payload() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Anonymous create is rejected.
    let response = client
        .post(format!("{}/api/quizzes", address))
        .json(&math_quiz_payload("Nope", "public"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // A question with two correct answers violates the invariant.
    let (_email, token) = register_and_login(&client, &address).await;
    let payload = serde_json::json!({
        "name": "Broken",
        "questions": [
            {
                "text": "Pick one",
                "answers": [
                    { "text": "A", "correct": true },
                    { "text": "B", "correct": true }
                ]
            }
        ]
    });

    let response = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(&token)
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
