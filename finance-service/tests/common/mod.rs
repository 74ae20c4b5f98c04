#![allow(dead_code)]

use chrono::Duration;
use finance_service::config::{
    AuthConfig, FcmConfig, FinanceConfig, ImagesConfig, MongoConfig, StorageBackend,
};
use finance_service::middleware::{JwtKeys, Role};
use finance_service::startup::Application;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use uuid::Uuid;

pub const ADMIN_ID: &str = "admin-1";
pub const TEST_SECRET: &str = "finance-test-secret";

/// One base64 png header, enough for the upload checks.
pub const PNG_BASE64: &str = "iVBORw0KGgo=";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub images_path: String,
    keys: JwtKeys,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let images_path = std::env::temp_dir()
            .join(format!("finance-it-images-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();

        let config = FinanceConfig {
            common: CoreConfig {
                port: 0, // Random port for testing
                ..Default::default()
            },
            storage: StorageBackend::Memory,
            mongodb: MongoConfig {
                uri: "mongodb://localhost:27017".to_string(),
                database: "finance_test".to_string(),
            },
            images: ImagesConfig {
                local_path: images_path.clone(),
                public_base_url: "http://localhost/images".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(TEST_SECRET.to_string()),
            },
            fcm: FcmConfig {
                enabled: false,
                project_id: String::new(),
                access_token: Secret::new(String::new()),
            },
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
            images_path,
            keys: JwtKeys::new(&Secret::new(TEST_SECRET.to_string())),
        }
    }

    pub fn token(&self, user_id: &str, role: Role) -> String {
        self.keys
            .issue(user_id, &format!("User {}", user_id), role, Duration::hours(1))
            .expect("Failed to issue token")
    }

    pub fn admin_token(&self) -> String {
        self.token(ADMIN_ID, Role::Administrator)
    }

    pub fn rep_token(&self, user_id: &str) -> String {
        self.token(user_id, Role::Representative)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.address, path)
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, token: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_student(&self, name: &str, representative_id: &str) -> String {
        let response = self
            .post(
                "/students",
                &self.admin_token(),
                &json!({ "name": name, "representative_id": representative_id }),
            )
            .await;
        assert_eq!(response.status(), 201);
        id_of(&data(response).await)
    }

    /// Collection over every active student.
    pub async fn create_collection(&self, name: &str, total: &str) -> Value {
        let response = self
            .post(
                "/collections",
                &self.admin_token(),
                &json!({ "name": name, "total_amount": total, "allows_exemptions": true }),
            )
            .await;
        assert_eq!(response.status(), 201);
        data(response).await
    }

    pub async fn balance(&self) -> Decimal {
        let cash = data(self.get("/petty-cash", &self.admin_token()).await).await;
        amount(&cash["current_balance"])
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.images_path);
    }
}

/// The `data` field of an `ApiResponse` body.
pub async fn data(response: reqwest::Response) -> Value {
    let body: Value = response.json().await.expect("Failed to parse response");
    body["data"].clone()
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("missing id").to_string()
}

/// Decimals travel as strings.
pub fn amount(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("invalid decimal"),
        other => other.to_string().parse().expect("invalid decimal"),
    }
}
