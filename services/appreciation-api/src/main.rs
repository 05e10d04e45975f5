use std::net::SocketAddr;

use appreciation_api::{router, AppState};
use shared::config::Settings;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn flag(set: bool) -> &'static str {
    if set {
        "set"
    } else {
        "missing"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let settings = Settings::new()?;
    info!(
        backend = settings.llm_backend.as_str(),
        openai_key = flag(settings.openai_key().is_some()),
        youtube_key = flag(settings.youtube_key().is_some()),
        form_url = flag(settings.form_url().is_some()),
        sheets_id = flag(settings.sheets_id().is_some()),
        "configuration loaded"
    );
    if settings.openai_key().is_none() && settings.gemini_key().is_none() {
        warn!("no LLM API key configured, /api/analyze will fail");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let state = AppState::from_settings(settings)?;
    info!(store = state.store.kind(), "starting appreciation-api on {addr}");
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await?;
    Ok(())
}
