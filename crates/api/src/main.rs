use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use meetbridge_api::{build_router, state::AppState};
use meetbridge_config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::load()?;
    info!(provider = ?settings.provider_mode, "Starting meetbridge API");

    let translator = meetbridge_providers::create_translator(&settings)?;
    let suggester = meetbridge_providers::create_suggester(&settings)?;
    let corrector = meetbridge_providers::create_corrector(&settings)?;
    let stt_factory = meetbridge_providers::create_stt_factory(&settings)?;

    let listen_addr = settings.listen_addr.clone();
    let state = AppState {
        settings: Arc::new(settings),
        stt_factory,
        translator,
        suggester,
        corrector,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "Listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|value| value == "json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
