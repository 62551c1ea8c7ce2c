//! Wiki Docs Backend
//!
//! A versioned document store with group-based access control, served as a
//! JSON REST API over SQLite.

mod access;
mod api;
mod auth;
mod codec;
mod config;
mod db;
mod engine;
mod errors;
mod models;
mod notify;
mod query;

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codec::Lz4Codec;
use config::Config;
use db::{DocStore, Transaction};
use engine::{DocumentEngine, PageObserver};
use errors::AppError;
use models::{DocId, Permission, User};
use notify::WebhookNotifier;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DocumentEngine>,
    pub store: DocStore,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the engine, its observers and the store around a database pool.
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self, AppError> {
        let store = DocStore::new(pool);
        let notifier = WebhookNotifier::new(store.clone(), config.public_url.clone())?;
        let observers: Vec<Arc<dyn PageObserver>> = vec![Arc::new(notifier)];
        let engine = DocumentEngine::new(
            store.clone(),
            Arc::new(Lz4Codec),
            observers,
            config.strict_save,
        );

        Ok(Self {
            engine: Arc::new(engine),
            store,
            config: Arc::new(config),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Wiki Docs Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    if config.strict_save {
        tracing::info!("Strict saves enabled: stale edits are rejected");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let state = AppState::new(pool, config.clone())?;

    match &config.admin_password {
        Some(password) => seed_admin(&state.store, password).await?,
        None => {
            if state.store.find_users(&db::Predicate::All).await?.is_empty() {
                tracing::warn!(
                    "No users exist and WIKIDOCS_ADMIN_PASSWORD is unset; nobody can sign in"
                );
            }
        }
    }

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the `admin` account unless a user of that name already exists.
pub async fn seed_admin(store: &DocStore, password: &str) -> Result<(), AppError> {
    if store.find_user_by_name("admin").await?.is_some() {
        return Ok(());
    }

    let admin = User {
        id: DocId::new(),
        name: "admin".to_string(),
        email: "admin@localhost".to_string(),
        password_hash: auth::password::hash_password(password)?,
        permissions: BTreeSet::from([Permission::Admin, Permission::Editor]),
        disabled: false,
    };

    Transaction::begin(store.pool())
        .await?
        .insert(&[admin])
        .await
        .commit()
        .await?;

    tracing::info!("Seeded admin account");
    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Pages
        .route("/pages", get(api::list_pages).post(api::create_page))
        .route("/pages/own", get(api::list_own_pages))
        .route("/pages/{id}", get(api::get_page).post(api::save_page))
        .route("/pages/{id}/history", get(api::get_page_history))
        // Users
        .route("/users", get(api::list_users).post(api::create_user))
        .route("/users/own", get(api::get_own_user))
        .route("/users/{id}", get(api::get_user).delete(api::delete_user))
        .route("/users/{id}/permissions", put(api::update_permissions))
        .route("/password", put(api::update_password))
        // Groups
        .route("/groups", get(api::list_groups).post(api::create_group))
        .route(
            "/groups/{id}",
            get(api::get_group)
                .put(api::update_group)
                .delete(api::delete_group),
        )
        // Projects
        .route("/projects", get(api::list_projects).post(api::create_project))
        .route(
            "/projects/{id}",
            get(api::get_project)
                .put(api::update_project)
                .delete(api::delete_project),
        )
        // Apply Basic auth middleware
        .layer(middleware::from_fn_with_state(
            state.store.clone(),
            auth::basic_auth_layer,
        ));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
