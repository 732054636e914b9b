use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use minitube_backend::{app, build_state, config::Config, ffmpeg::FfmpegExtractor, system_info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("minitube_backend=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env();

    system_info::print_startup_info(&config).await;

    let extractor = Arc::new(FfmpegExtractor::new(
        config.ffmpeg_bin.clone(),
        config.thumb_width,
        config.extraction_timeout,
    ));
    let port = config.port;
    let state = build_state(config, extractor).await?;

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("✅ Server running on http://localhost:{}", port);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
