// tests/common/mod.rs

use std::sync::Arc;

use assessment_engine::{
    config::Config, engine::grading::ScoringBasis, routes, state::AppState, store::MemoryStore,
};
use serde_json::{Value, json};

#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

#[allow(dead_code)]
pub struct TestUser {
    pub id: i64,
    pub token: String,
}

/// Spawns the app on a random port over a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    let config = Config {
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        log_dir: "logs".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        scoring_basis: ScoringBasis::AnswerKey,
        admin_email: None,
        admin_password: None,
    };

    let state = AppState {
        store: Arc::new(MemoryStore::new()),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

#[allow(dead_code)]
impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    /// Registers a fresh user with the given role and logs them in.
    pub async fn user(&self, role: &str) -> TestUser {
        let email = format!("{}_{}@example.com", role, &uuid::Uuid::new_v4().to_string()[..8]);
        let password = "password123";

        let resp = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({
                "name": format!("Test {}", role),
                "email": email,
                "password": password,
                "role": role,
            }))
            .send()
            .await
            .expect("Register failed");
        assert_eq!(resp.status().as_u16(), 201);

        let login: Value = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .expect("Failed to parse login json");

        TestUser {
            id: login["user_id"].as_i64().expect("user_id not found"),
            token: login["token"].as_str().expect("Token not found").to_string(),
        }
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates a course in `category` owned by `teacher` and returns its id.
    pub async fn course(&self, teacher: &TestUser, category: &str) -> i64 {
        let resp = self
            .post(
                "/courses",
                &teacher.token,
                json!({ "title": "Algebra I", "category": category }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201);
        let course: Value = resp.json().await.unwrap();
        course["id"].as_i64().unwrap()
    }

    /// Enrolls `student` in the course and has `teacher` approve it.
    pub async fn enroll(&self, teacher: &TestUser, student: &TestUser, course_id: i64) {
        let resp = self
            .post(
                "/enrollments",
                &student.token,
                json!({
                    "course_id": course_id,
                    "payment_proof_url": "https://example.com/receipts/1.png",
                }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201);
        let enrollment: Value = resp.json().await.unwrap();
        assert_eq!(enrollment["status"], "pending");

        let id = enrollment["id"].as_i64().unwrap();
        let resp = self
            .put(&format!("/enrollments/{}/review", id), &teacher.token, json!({ "approve": true }))
            .await;
        assert_eq!(resp.status().as_u16(), 200);
    }

    /// Creates and publishes an assessment, returning its id.
    pub async fn assessment(
        &self,
        teacher: &TestUser,
        course_id: i64,
        kind: &str,
        policy: Value,
    ) -> i64 {
        let resp = self
            .post(
                "/assessments",
                &teacher.token,
                json!({
                    "kind": kind,
                    "course_id": course_id,
                    "title": "Week 1",
                    "topic": "Linear equations",
                    "questions": three_questions(),
                    "policy": policy,
                    "publish": true,
                }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201);
        let assessment: Value = resp.json().await.unwrap();
        assessment["id"].as_i64().unwrap()
    }
}

/// Three one-point questions whose answers are A, B, C.
#[allow(dead_code)]
pub fn three_questions() -> Value {
    let question = |number: i32, correct: &str| {
        json!({
            "number": number,
            "text": format!("Question {}", number),
            "options": { "A": "one", "B": "two", "C": "three", "D": "four" },
            "correct_option": correct,
            "points": 1,
            "explanation": "Because.",
        })
    };
    json!([question(1, "A"), question(2, "B"), question(3, "C")])
}
