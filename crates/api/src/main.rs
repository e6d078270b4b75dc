use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{FixedOffset, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockletter_core::config::Settings;
use stockletter_core::newsletter::job::{run_newsletter_job, JobOptions, JobReport};
use stockletter_core::storage::users::{self, UserProfile};
use stockletter_core::time::schedule;

const SERVICE_NAME: &str = "Financial Analyst Newsletter Scheduler";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let offset = schedule::newsletter_offset()?;

    let pool: Option<PgPool> = match settings.require_pg_connect_options() {
        Ok(db_options) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_with(db_options)
            .await
        {
            Ok(pool) => match stockletter_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(
                        error = %e,
                        "db migrations failed; starting API in degraded mode"
                    );
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        settings: Arc::new(settings),
        pool,
        offset,
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/send-newsletter", post(send_newsletter))
        .route("/send-newsletter-sync", post(send_newsletter_sync))
        .route("/users/:id/profile", get(get_profile))
        .route("/users/:id/newsletter", put(put_newsletter))
        .route("/users/:id/favorite-stocks", put(put_favorite_stocks))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = stockletter_core::config::env_or("PORT", 8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, current_time = %now(offset), "newsletter api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[derive(Debug, Clone)]
struct AppState {
    settings: Arc<Settings>,
    pool: Option<PgPool>,
    offset: FixedOffset,
}

fn now(offset: FixedOffset) -> String {
    schedule::format_timestamp(Utc::now(), offset)
}

/// `{"detail": ...}` with the given status, the shape every error here takes.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

impl ApiError {
    fn internal(context: &str, err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "{context}");
        Self(StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err}"))
    }

    fn unavailable() -> Self {
        Self(StatusCode::SERVICE_UNAVAILABLE, "database unavailable".to_string())
    }

    fn not_found(user_id: i64) -> Self {
        Self(StatusCode::NOT_FOUND, format!("user {user_id} not found"))
    }
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "running",
        "timezone": state.offset.to_string(),
        "current_time": now(state.offset),
    }))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "database": state.pool.is_some(),
        "timestamp": Utc::now().with_timezone(&state.offset).to_rfc3339(),
    }))
}

async fn send_newsletter(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    tracing::info!("newsletter trigger received");

    let settings = Arc::clone(&state.settings);
    tokio::spawn(async move {
        match run_newsletter_job(&settings, JobOptions::default()).await {
            Ok(report) => {
                tracing::info!(stats = ?report.stats, "background newsletter run finished");
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %format!("{err:#}"), "error in newsletter sending process");
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "Newsletter sending process started",
            "timestamp": now(state.offset),
        })),
    )
}

async fn send_newsletter_sync(
    State(state): State<AppState>,
) -> Result<Json<JobReport>, ApiError> {
    tracing::info!("synchronous newsletter trigger received");
    run_newsletter_job(&state.settings, JobOptions::default())
        .await
        .map(Json)
        .map_err(|e| ApiError::internal("Failed to send newsletter", e))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserProfile>, ApiError> {
    let pool = state.pool.as_ref().ok_or_else(ApiError::unavailable)?;
    users::get_user_profile(pool, user_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load profile", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(user_id))
}

#[derive(Debug, Deserialize)]
struct NewsletterPreference {
    signed_up: bool,
}

async fn put_newsletter(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(body): Json<NewsletterPreference>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.as_ref().ok_or_else(ApiError::unavailable)?;
    let updated = users::update_newsletter_preference(pool, user_id, body.signed_up)
        .await
        .map_err(|e| ApiError::internal("Failed to update newsletter preference", e))?;
    if !updated {
        return Err(ApiError::not_found(user_id));
    }

    tracing::info!(user_id, signed_up = body.signed_up, "newsletter preference updated");
    Ok(Json(json!({
        "id": user_id,
        "signed_up_for_newsletter": body.signed_up,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FavoriteStocks {
    List { fav_stocks: Vec<String> },
    Text { fav_stocks: String },
}

async fn put_favorite_stocks(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(body): Json<FavoriteStocks>,
) -> Result<Json<Value>, ApiError> {
    let pool = state.pool.as_ref().ok_or_else(ApiError::unavailable)?;
    let requested = match body {
        FavoriteStocks::List { fav_stocks } => fav_stocks,
        FavoriteStocks::Text { fav_stocks } => users::parse_ticker_list(&fav_stocks),
    };

    let stored = users::update_favorite_stocks(pool, user_id, &requested)
        .await
        .map_err(|e| ApiError::internal("Failed to update favorite stocks", e))?
        .ok_or_else(|| ApiError::not_found(user_id))?;

    tracing::info!(user_id, count = stored.len(), "favorite stocks updated");
    Ok(Json(json!({ "id": user_id, "fav_stocks": stored })))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
