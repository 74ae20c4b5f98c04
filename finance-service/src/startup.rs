//! Application container: wires storage, services and the HTTP router.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{make_request_span, metrics_middleware, request_id_middleware};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{FinanceConfig, StorageBackend};
use crate::handlers::{
    collections, expenses, health_check, metrics_endpoint, payment_requests, petty_cash,
    readiness_check, student_payments, students,
};
use crate::middleware::JwtKeys;
use crate::services::{
    CollectionService, ExpenseService, FcmNotifier, ImageStore, LocalImageStore, LogNotifier,
    MongoDb, Notifications, Notifier, PaymentRequestService, PettyCashLedger, Repositories,
    StudentPaymentService, StudentService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: FinanceConfig,
    pub jwt: JwtKeys,
    /// `None` with the in-memory backend.
    pub db: Option<MongoDb>,
    pub images: Arc<dyn ImageStore>,
    pub students: StudentService,
    pub collections: CollectionService,
    pub student_payments: StudentPaymentService,
    pub payment_requests: PaymentRequestService,
    pub ledger: PettyCashLedger,
    pub expenses: ExpenseService,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    pub async fn build(config: FinanceConfig) -> Result<Self, AppError> {
        let (repos, db) = match config.storage {
            StorageBackend::Mongodb => {
                let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to connect to MongoDB: {}", e);
                        e
                    })?;
                db.initialize_indexes().await.map_err(|e| {
                    tracing::error!("Failed to initialize database indexes: {}", e);
                    e
                })?;
                (Repositories::mongo(&db), Some(db))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, data is lost on restart");
                (Repositories::in_memory(), None)
            }
        };

        let images: Arc<dyn ImageStore> = Arc::new(
            LocalImageStore::new(&config.images.local_path, &config.images.public_base_url)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "Failed to initialize image storage at {}: {}",
                        config.images.local_path,
                        e
                    );
                    e
                })?,
        );

        let notifier: Arc<dyn Notifier> = if config.fcm.enabled {
            tracing::info!(project_id = %config.fcm.project_id, "FCM notifications enabled");
            Arc::new(FcmNotifier::new(config.fcm.clone()))
        } else {
            tracing::warn!("FCM disabled, notifications are only logged");
            Arc::new(LogNotifier::new())
        };
        let notifications = Notifications::new(notifier);

        let ledger = PettyCashLedger::new(repos.clone());
        let students = StudentService::new(repos.clone());
        let collections =
            CollectionService::new(repos.clone(), images.clone(), notifications.clone());
        let student_payments = StudentPaymentService::new(
            repos.clone(),
            ledger.clone(),
            collections.clone(),
            students.clone(),
            images.clone(),
        );
        let payment_requests = PaymentRequestService::new(
            repos.clone(),
            collections.clone(),
            students.clone(),
            student_payments.clone(),
            ledger.clone(),
            images.clone(),
            notifications,
        );
        let expenses = ExpenseService::new(repos, ledger.clone(), images.clone());

        let state = AppState {
            jwt: JwtKeys::new(&config.auth.jwt_secret),
            config: config.clone(),
            db,
            images,
            students,
            collections,
            student_payments,
            payment_requests,
            ledger,
            expenses,
        };

        let router = build_router(state.clone());

        // Port 0 picks a free port, which the tests rely on
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, storage = ?config.storage, "Finance service listening");

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }

    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route(
            "/students/:id",
            get(students::get_student).delete(students::delete_student),
        )
        .route(
            "/collections",
            get(collections::list_collections).post(collections::create_collection),
        )
        .route(
            "/collections/:id",
            get(collections::get_collection)
                .put(collections::update_collection)
                .delete(collections::delete_collection),
        )
        .route("/collections/:id/adjust", post(collections::adjust_collection))
        .route(
            "/collections/:id/recompute",
            post(collections::recompute_collection),
        )
        .route(
            "/collections/:id/payments",
            get(collections::collection_payments),
        )
        .route(
            "/student-payments",
            get(student_payments::list_payments).post(student_payments::record_payment),
        )
        .route(
            "/student-payments/:id",
            get(student_payments::get_payment).put(student_payments::update_payment),
        )
        .route(
            "/student-payments/:id/exonerate",
            post(student_payments::exonerate_payment),
        )
        .route(
            "/payment-requests",
            get(payment_requests::list_requests).post(payment_requests::create_request),
        )
        .route(
            "/payment-requests/:id",
            get(payment_requests::get_request)
                .put(payment_requests::update_request)
                .delete(payment_requests::delete_request),
        )
        .route(
            "/payment-requests/:id/review",
            post(payment_requests::start_review),
        )
        .route(
            "/payment-requests/:id/approve",
            post(payment_requests::approve_request),
        )
        .route(
            "/payment-requests/:id/reject",
            post(payment_requests::reject_request),
        )
        .route(
            "/payment-requests/:id/request-changes",
            post(payment_requests::request_changes),
        )
        .route(
            "/payment-requests/:id/comments",
            post(payment_requests::add_comment),
        )
        .route("/petty-cash", get(petty_cash::get_balance))
        .route("/petty-cash/entries", post(petty_cash::manual_entry))
        .route("/petty-cash/transactions", get(petty_cash::list_transactions))
        .route("/petty-cash/logs", get(petty_cash::list_logs))
        .route(
            "/expenses",
            get(expenses::list_expenses).post(expenses::create_expense),
        )
        .route(
            "/expenses/:id",
            get(expenses::get_expense).delete(expenses::delete_expense),
        )
}

fn build_router(state: AppState) -> Router {
    let images_dir = ServeDir::new(&state.config.images.local_path);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api/v1", api_routes())
        .nest_service("/images", images_dir)
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
