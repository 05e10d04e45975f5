//! HTTP surface of the music-appreciation backend.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use shared::config::Settings;
use shared::forms::FormsClient;
use shared::llm::{backend_from_settings, ChatBackend};
use shared::retry::RetryPolicy;
use shared::store::{store_from_settings, StudentStore};
use shared::upstream::http_client;
use shared::youtube::YouTubeClient;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod handlers;

/// Everything a handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub llm: Arc<dyn ChatBackend>,
    pub youtube: Arc<YouTubeClient>,
    pub forms: Arc<FormsClient>,
    pub store: Arc<dyn StudentStore>,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self, reqwest::Error> {
        Self::from_settings_with_policy(settings, RetryPolicy::default())
    }

    /// Like [`AppState::from_settings`] with an explicit retry policy for the
    /// LLM calls.
    pub fn from_settings_with_policy(
        settings: Settings,
        policy: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = http_client(&settings)?;
        Ok(Self {
            llm: backend_from_settings(&settings, client.clone(), policy),
            youtube: Arc::new(YouTubeClient::new(client.clone(), &settings)),
            forms: Arc::new(FormsClient::new(client.clone(), &settings)),
            store: store_from_settings(&settings, client),
            settings: Arc::new(settings),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/analyze", post(handlers::analyze))
        .route("/api/youtube-info", post(handlers::youtube_info))
        .route("/api/google-forms", post(handlers::google_forms))
        .route("/api/students-data", get(handlers::students_data))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
